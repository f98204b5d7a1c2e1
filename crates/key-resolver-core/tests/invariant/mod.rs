//! Invariant tests module

pub mod key_invariant;
