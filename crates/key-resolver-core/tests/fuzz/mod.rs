//! Fuzz tests module
//!
//! Property-based testing using proptest:
//! - Nonce arithmetic
//! - Bit extraction

pub mod nonce_fuzz;
