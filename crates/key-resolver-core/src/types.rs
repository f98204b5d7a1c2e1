//! Core types for key resolution
//!
//! This module defines the identity, key and result types shared by the
//! lookup, assignment and share retrieval flows. Secret-bearing types are
//! zeroized on drop and redact themselves in `Debug` output.

use crate::crypto;
use crate::{Error, Result};
use k256::{
    ProjectivePoint, Scalar,
    ecdsa::VerifyingKey,
    elliptic_curve::{
        bigint::U256,
        ops::Reduce,
        sec1::ToEncodedPoint,
    },
};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// One key-management node, identified by its ordinal and URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeEndpoint {
    /// Ordinal index; pairs the endpoint with its `NodePublicKey`
    pub index: usize,
    /// Node URL
    pub url: String,
}

impl NodeEndpoint {
    /// Create a new endpoint
    pub fn new(index: usize, url: impl Into<String>) -> Self {
        Self {
            index,
            url: url.into(),
        }
    }

    /// Build endpoints from URLs, numbering them in order
    pub fn from_urls<I, S>(urls: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        urls.into_iter()
            .enumerate()
            .map(|(index, url)| Self::new(index, url))
            .collect()
    }
}

/// Long-term public key of a node (hex affine coordinates)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodePublicKey {
    pub x: String,
    pub y: String,
}

impl NodePublicKey {
    /// Create a node key from hex coordinates
    pub fn new(x: impl Into<String>, y: impl Into<String>) -> Self {
        Self {
            x: x.into(),
            y: y.into(),
        }
    }

    /// Describe an ECDSA verifying key as hex coordinates
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let encoded = key.as_affine().to_encoded_point(false);
        let bytes = encoded.as_bytes();
        Self {
            x: hex::encode(&bytes[1..33]),
            y: hex::encode(&bytes[33..65]),
        }
    }

    /// Parse into an ECDSA verifying key
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        let x = decode_hex32(&self.x)?;
        let y = decode_hex32(&self.y)?;
        VerifyingKey::from_sec1_bytes(&uncompressed(&x, &y))
            .map_err(|e| Error::InvalidConfig(format!("Invalid node public key: {}", e)))
    }
}

/// Stable identity of a user within a verifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerifierIdentity {
    /// Name of the verifier (identity provider)
    pub verifier: String,
    /// User identifier within the verifier
    pub verifier_id: String,
}

impl VerifierIdentity {
    pub fn new(verifier: impl Into<String>, verifier_id: impl Into<String>) -> Self {
        Self {
            verifier: verifier.into(),
            verifier_id: verifier_id.into(),
        }
    }
}

impl fmt::Display for VerifierIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.verifier, self.verifier_id)
    }
}

/// The identity's public key as known to the node network, before any nonce shift
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "CoordinatesHex", into = "CoordinatesHex")]
pub struct AggregatedPublicKey {
    x: [u8; 32],
    y: [u8; 32],
}

impl AggregatedPublicKey {
    /// Parse hex coordinates; short values are left-padded to 64 digits
    pub fn from_hex(x: &str, y: &str) -> Result<Self> {
        let key = Self {
            x: decode_hex32(x)?,
            y: decode_hex32(y)?,
        };
        key.to_point()?;
        Ok(key)
    }

    /// Describe a curve point; the identity has no affine form
    pub fn from_point(point: &ProjectivePoint) -> Result<Self> {
        let encoded = point.to_affine().to_encoded_point(false);
        let (Some(x), Some(y)) = (encoded.x(), encoded.y()) else {
            return Err(Error::Crypto("Point at infinity".into()));
        };
        let mut key = Self {
            x: [0u8; 32],
            y: [0u8; 32],
        };
        key.x.copy_from_slice(x);
        key.y.copy_from_slice(y);
        Ok(key)
    }

    /// X coordinate as 64 hex digits
    pub fn x_hex(&self) -> String {
        hex::encode(self.x)
    }

    /// Y coordinate as 64 hex digits
    pub fn y_hex(&self) -> String {
        hex::encode(self.y)
    }

    /// Uncompressed SEC1 encoding (`04 || x || y`)
    pub fn to_uncompressed(&self) -> Vec<u8> {
        uncompressed(&self.x, &self.y)
    }

    /// Validate the coordinates and return the curve point
    pub fn to_point(&self) -> Result<ProjectivePoint> {
        k256::PublicKey::from_sec1_bytes(&self.to_uncompressed())
            .map(|key| key.to_projective())
            .map_err(|_| Error::Crypto("Public key is not on secp256k1".into()))
    }

    /// Address derived directly from this key
    pub fn address(&self) -> Result<String> {
        crypto::derive_address(&self.to_uncompressed())
    }
}

impl fmt::Debug for AggregatedPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregatedPublicKey")
            .field("x", &self.x_hex())
            .field("y", &self.y_hex())
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
struct CoordinatesHex {
    x: String,
    y: String,
}

impl TryFrom<CoordinatesHex> for AggregatedPublicKey {
    type Error = Error;

    fn try_from(value: CoordinatesHex) -> Result<Self> {
        Self::from_hex(&value.x, &value.y)
    }
}

impl From<AggregatedPublicKey> for CoordinatesHex {
    fn from(key: AggregatedPublicKey) -> Self {
        Self {
            x: key.x_hex(),
            y: key.y_hex(),
        }
    }
}

/// Per-account scalar that shifts the base key pair, reduced modulo the curve order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountNonce(Scalar);

impl AccountNonce {
    /// The zero nonce (no shift)
    pub const ZERO: AccountNonce = AccountNonce(Scalar::ZERO);

    /// Parse a big-endian hex nonce; an empty string means zero
    pub fn from_hex(value: &str) -> Result<Self> {
        let digits = value.trim().trim_start_matches("0x");
        if digits.is_empty() {
            return Ok(Self::ZERO);
        }
        let bytes = decode_hex32(digits)
            .map_err(|e| Error::Metadata(format!("Invalid nonce: {}", e)))?;
        Ok(Self(<Scalar as Reduce<U256>>::reduce_bytes(&bytes.into())))
    }

    pub fn from_scalar(scalar: Scalar) -> Self {
        Self(scalar)
    }

    pub fn scalar(&self) -> &Scalar {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        bool::from(self.0.is_zero())
    }

    /// `nonce · G`
    pub fn public_key(&self) -> ProjectivePoint {
        ProjectivePoint::GENERATOR * self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_bytes())
    }
}

impl Serialize for AccountNonce {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// A secp256k1 private key
///
/// Zeroized on drop. Never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey(Scalar);

impl PrivateKey {
    pub fn from_scalar(scalar: &Scalar) -> Self {
        Self(*scalar)
    }

    /// Parse a canonical big-endian hex scalar
    pub fn from_hex(value: &str) -> Result<Self> {
        crypto::scalar_from_hex(value).map(|scalar| Self(*scalar))
    }

    pub fn scalar(&self) -> &Scalar {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        bool::from(self.0.is_zero())
    }

    /// Hex encoding, always 64 digits wide
    pub fn to_hex(&self) -> Zeroizing<String> {
        crypto::scalar_to_hex(&self.0)
    }

    /// `(key + nonce) mod n`; a zero nonce leaves the key untouched
    pub fn add_nonce(&self, nonce: &AccountNonce) -> Self {
        if nonce.is_zero() {
            return self.clone();
        }
        Self(self.0 + nonce.scalar())
    }

    pub fn public_key(&self) -> Result<AggregatedPublicKey> {
        AggregatedPublicKey::from_point(&(ProjectivePoint::GENERATOR * self.0))
    }

    pub fn address(&self) -> Result<String> {
        self.public_key()?.address()
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey([REDACTED])")
    }
}

/// Keccak-256 of the id token, lowercase hex without prefix
///
/// Binds commitment requests to one token without revealing it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenCommitment(String);

impl TokenCommitment {
    pub fn from_id_token(id_token: &str) -> Self {
        Self(hex::encode(crypto::keccak256(id_token.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `id_token` hashes to this commitment
    pub fn opens_to(&self, id_token: &str) -> bool {
        let expected = Self::from_id_token(id_token);
        crypto::constant_time_eq(self.0.as_bytes(), expected.0.as_bytes())
    }
}

impl fmt::Display for TokenCommitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of address resolution
#[derive(Debug, Clone, Serialize)]
pub struct AddressInfo {
    /// Address of the nonce-adjusted public key
    pub address: String,
    /// Key material, present only for extended lookups
    #[serde(skip_serializing_if = "Option::is_none", flatten)]
    pub details: Option<KeyDetails>,
}

/// Extended address resolution output
#[derive(Debug, Clone, Serialize)]
pub struct KeyDetails {
    /// Aggregated public key before the nonce shift
    pub public_key: AggregatedPublicKey,
    /// Nonce applied to the key
    pub nonce: AccountNonce,
    /// Nonce-adjusted public key (uncompressed SEC1, hex)
    pub effective_public_key: String,
}

/// Result of share retrieval
#[derive(Debug, Clone)]
pub struct RetrievedKey {
    /// Nonce-adjusted private key
    pub private_key: PrivateKey,
    /// Address of the nonce-adjusted public key
    pub public_address: String,
}

/// Decode hex into 32 bytes, left-padding short input
pub(crate) fn decode_hex32(value: &str) -> Result<[u8; 32]> {
    let digits = value.trim_start_matches("0x").trim_start_matches('0');
    if digits.len() > 64 {
        return Err(Error::Deserialization(format!(
            "Hex value longer than 32 bytes ({} digits)",
            digits.len()
        )));
    }
    let padded = format!("{:0>64}", digits);
    let mut out = [0u8; 32];
    hex::decode_to_slice(padded, &mut out)?;
    Ok(out)
}

fn uncompressed(x: &[u8; 32], y: &[u8; 32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(65);
    bytes.push(0x04);
    bytes.extend_from_slice(x);
    bytes.extend_from_slice(y);
    bytes
}
