//! Cryptographic primitives
//!
//! Thin helpers over `k256` and `tiny-keccak`: constant-time comparison,
//! OS randomness with bounded retries, point combination, address
//! derivation and the single-use ephemeral keypair that receives shares.

pub mod bits;
pub mod ecies;

pub use bits::extract_bits;

use crate::{Error, Result};
use k256::{
    AffinePoint, EncodedPoint, ProjectivePoint, PublicKey, Scalar, SecretKey,
    elliptic_curve::{
        PrimeField,
        sec1::{FromEncodedPoint, ToEncodedPoint},
    },
};
use rand::{RngCore, rngs::OsRng};
use std::fmt;
use tiny_keccak::{Hasher, Keccak};
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

/// Attempts made against the random source before giving up
pub const RANDOM_RETRY_LIMIT: usize = 1024;

/// Compare two byte strings without an early exit on content
///
/// Differing lengths return immediately; only the length leaks.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut difference = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        difference |= x ^ y;
    }
    std::hint::black_box(difference) == 0
}

/// Fill `n` bytes from the OS CSPRNG
pub fn secure_random_bytes(n: usize) -> Result<Zeroizing<Vec<u8>>> {
    random_bytes_from(&mut OsRng, n)
}

/// Fill `n` bytes from `rng`, retrying up to `RANDOM_RETRY_LIMIT` times
pub fn random_bytes_from<R: RngCore>(rng: &mut R, n: usize) -> Result<Zeroizing<Vec<u8>>> {
    let mut buffer = Zeroizing::new(vec![0u8; n]);
    for attempt in 0..RANDOM_RETRY_LIMIT {
        match rng.try_fill_bytes(&mut buffer) {
            Ok(()) => return Ok(buffer),
            Err(e) => {
                debug!(attempt, error = %e, "Random source failed, retrying");
                buffer.zeroize();
            }
        }
    }
    Err(Error::RandomSourceExhausted)
}

/// Compute Keccak256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut hash = [0u8; 32];
    hasher.finalize(&mut hash);
    hash
}

/// Parse a SEC1-encoded point (compressed or uncompressed)
pub fn parse_point(bytes: &[u8]) -> Result<ProjectivePoint> {
    let encoded = EncodedPoint::from_bytes(bytes).map_err(|e| Error::Crypto(e.to_string()))?;
    let affine: AffinePoint = Option::from(AffinePoint::from_encoded_point(&encoded))
        .ok_or_else(|| Error::Crypto("Invalid curve point".into()))?;
    Ok(ProjectivePoint::from(affine))
}

/// Add public keys on the curve and return the SEC1 encoding of the sum
pub fn combine_public_keys<P: AsRef<[u8]>>(keys: &[P], compressed: bool) -> Result<Vec<u8>> {
    if keys.is_empty() {
        return Err(Error::Crypto("No public keys to combine".into()));
    }
    let mut sum = ProjectivePoint::IDENTITY;
    for key in keys {
        sum += parse_point(key.as_ref())?;
    }
    if sum == ProjectivePoint::IDENTITY {
        return Err(Error::Crypto("Combined public key is the point at infinity".into()));
    }
    Ok(sum.to_affine().to_encoded_point(compressed).as_bytes().to_vec())
}

/// Derive the checksummed account address of a SEC1-encoded public key
///
/// Keccak-256 over the uncompressed point without its `04` prefix;
/// the low 20 bytes are the account identifier.
pub fn derive_address(public_key: &[u8]) -> Result<String> {
    let point = parse_point(public_key)?;
    let encoded = point.to_affine().to_encoded_point(false);
    let hash = keccak256(&encoded.as_bytes()[1..]);
    Ok(to_checksum_address(&hash[12..]))
}

/// EIP-55 mixed-case encoding of a 20-byte address
pub fn to_checksum_address(address: &[u8]) -> String {
    let lower = hex::encode(address);
    let hash = keccak256(lower.as_bytes());
    let mut out = String::with_capacity(2 + lower.len());
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = if i % 2 == 0 {
            hash[i / 2] >> 4
        } else {
            hash[i / 2] & 0x0f
        };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Parse a canonical big-endian hex scalar (left-padded to 64 digits)
pub fn scalar_from_hex(value: &str) -> Result<Zeroizing<Scalar>> {
    let bytes = Zeroizing::new(crate::types::decode_hex32(value)?);
    scalar_from_bytes(&bytes)
}

/// Big-endian hex of a scalar, always 64 digits
pub fn scalar_to_hex(scalar: &Scalar) -> Zeroizing<String> {
    Zeroizing::new(hex::encode(scalar.to_bytes()))
}

/// Parse a canonical 32-byte big-endian scalar
pub(crate) fn scalar_from_bytes(bytes: &[u8; 32]) -> Result<Zeroizing<Scalar>> {
    Option::<Scalar>::from(Scalar::from_repr((*bytes).into()))
        .map(Zeroizing::new)
        .ok_or_else(|| Error::Crypto("Scalar is not reduced modulo the curve order".into()))
}

/// Client-generated keypair that receives encrypted shares
///
/// Single use: owned by one retrieval and dropped (zeroized) at its end.
pub struct EphemeralKeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl EphemeralKeyPair {
    /// Generate a keypair from the OS random source
    pub fn generate() -> Result<Self> {
        let bytes = secure_random_bytes(32)
            .map_err(|e| Error::KeypairGenerationFailed(e.to_string()))?;
        let secret = SecretKey::from_slice(&bytes).map_err(|_| {
            Error::KeypairGenerationFailed("Random bytes are not a valid scalar".into())
        })?;
        let public = secret.public_key();
        Ok(Self { secret, public })
    }

    pub(crate) fn secret(&self) -> &SecretKey {
        &self.secret
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// X coordinate as 64 hex digits
    pub fn public_x_hex(&self) -> String {
        let encoded = self.public.to_encoded_point(false);
        hex::encode(&encoded.as_bytes()[1..33])
    }

    /// Y coordinate as 64 hex digits
    pub fn public_y_hex(&self) -> String {
        let encoded = self.public.to_encoded_point(false);
        hex::encode(&encoded.as_bytes()[33..65])
    }
}

impl fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("secret", &"[REDACTED]")
            .field("public_x", &self.public_x_hex())
            .finish()
    }
}
