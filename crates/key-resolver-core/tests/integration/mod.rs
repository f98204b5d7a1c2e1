//! Integration tests module
//!
//! End-to-end resolver flows over `MemoryNodeNetwork`.

pub mod address_flow_test;
pub mod retrieval_flow_test;
