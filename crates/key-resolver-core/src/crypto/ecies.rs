//! Share encryption to the client's ephemeral key
//!
//! ECDH over secp256k1 between the sender's one-time key and the
//! recipient key; SHA-512 of the shared x-coordinate, first 32 bytes
//! as the ChaCha20-Poly1305 key.

use crate::{Error, Result};
use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit},
};
use k256::{PublicKey, SecretKey, ecdh, elliptic_curve::sec1::ToEncodedPoint};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use zeroize::Zeroizing;

/// One node's key share, encrypted to the client's ephemeral public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedShare {
    /// AEAD ciphertext, hex
    pub ciphertext: String,
    /// Sender's one-time public key, uncompressed SEC1 hex
    pub ephemeral_public_key: String,
    /// 12-byte AEAD nonce, hex
    pub nonce: String,
}

/// Encrypt `plaintext` so only the holder of `recipient`'s secret can read it
pub fn encrypt_share(recipient: &PublicKey, plaintext: &[u8]) -> Result<EncryptedShare> {
    let sender = SecretKey::random(&mut OsRng);
    let key = derive_key(&sender, recipient);
    let cipher = ChaCha20Poly1305::new((&*key).into());

    let nonce_bytes: [u8; 12] = rand::random();
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| Error::Crypto(format!("Share encryption failed: {}", e)))?;

    Ok(EncryptedShare {
        ciphertext: hex::encode(ciphertext),
        ephemeral_public_key: hex::encode(sender.public_key().to_encoded_point(false).as_bytes()),
        nonce: hex::encode(nonce_bytes),
    })
}

/// Decrypt a share with the recipient's secret key
pub fn decrypt_share(recipient: &SecretKey, share: &EncryptedShare) -> Result<Zeroizing<Vec<u8>>> {
    let sender = PublicKey::from_sec1_bytes(&hex::decode(&share.ephemeral_public_key)?)
        .map_err(|_| Error::Crypto("Invalid share ephemeral public key".into()))?;
    let nonce_bytes = hex::decode(&share.nonce)?;
    if nonce_bytes.len() != 12 {
        return Err(Error::Crypto(format!(
            "Share nonce must be 12 bytes, got {}",
            nonce_bytes.len()
        )));
    }
    let ciphertext = hex::decode(&share.ciphertext)?;

    let key = derive_key(recipient, &sender);
    let cipher = ChaCha20Poly1305::new((&*key).into());
    cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
        .map(Zeroizing::new)
        .map_err(|_| Error::Crypto("Share decryption failed".into()))
}

fn derive_key(secret: &SecretKey, public: &PublicKey) -> Zeroizing<[u8; 32]> {
    let shared = ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
    let digest = Sha512::digest(shared.raw_secret_bytes());
    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&digest[..32]);
    key
}
