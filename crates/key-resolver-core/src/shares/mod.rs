//! Commitment round and threshold share reconstruction

mod commitment;
mod reconstruct;

pub use commitment::request_commitments;
pub use reconstruct::{
    DecryptedShare, ReconstructedKey, ShareRetrieval, interpolate_at_zero, retrieve_and_reconstruct,
};
