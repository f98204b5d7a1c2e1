//! Key lookup and on-demand key assignment
//!
//! Before anything else the client asks the node set which aggregated
//! public key belongs to an identity. If a quorum agrees there is none,
//! the client asks the nodes to assign one and looks again.

mod assign;
mod lookup;

pub use assign::assign_key;
pub use lookup::lookup_key;
