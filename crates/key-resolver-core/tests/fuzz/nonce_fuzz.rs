//! Fuzz tests for nonce arithmetic
//!
//! Property-based testing that the address predicted from public data
//! matches the address of the nonce-adjusted private key.

use k256::{
    FieldBytes, ProjectivePoint, Scalar,
    elliptic_curve::{bigint::U256, ops::Reduce, sec1::ToEncodedPoint},
};
use key_resolver_core::crypto;
use key_resolver_core::{AccountNonce, PrivateKey};
use proptest::prelude::*;

fn uncompressed(point: ProjectivePoint) -> Vec<u8> {
    point.to_affine().to_encoded_point(false).as_bytes().to_vec()
}

/// Any 32-byte value, reduced modulo the curve order
fn scalar_strategy() -> impl Strategy<Value = Scalar> {
    prop::array::uniform32(any::<u8>())
        .prop_map(|bytes| <Scalar as Reduce<U256>>::reduce_bytes(&FieldBytes::from(bytes)))
}

/// Scalars in the top 2^64 below the curve order
fn near_order_strategy() -> impl Strategy<Value = Scalar> {
    (1u64..u64::MAX).prop_map(|offset| -Scalar::from(offset))
}

// ============================================================================
// Address Prediction
// ============================================================================

proptest! {
    /// The combined public key gives the same address as the shifted private key
    #[test]
    fn shifted_key_matches_combined_public_key(
        key in scalar_strategy(),
        nonce in scalar_strategy(),
    ) {
        prop_assume!(!bool::from(key.is_zero()));
        prop_assume!(!bool::from(nonce.is_zero()));
        prop_assume!(!bool::from((key + nonce).is_zero()));

        let private_key = PrivateKey::from_scalar(&key);
        let nonce = AccountNonce::from_scalar(nonce);
        let shifted = private_key.add_nonce(&nonce);

        let base = uncompressed(ProjectivePoint::GENERATOR * key);
        let combined = crypto::combine_public_keys(
            &[base, uncompressed(nonce.public_key())],
            false,
        ).unwrap();

        prop_assert_eq!(shifted.address().unwrap(), crypto::derive_address(&combined).unwrap());
    }

    /// Sums past the curve order wrap on both the private and the public side
    #[test]
    fn shift_wraps_past_curve_order(
        key in near_order_strategy(),
        nonce_offset in 1u64..u64::MAX,
    ) {
        let nonce = AccountNonce::from_hex(&format!("{:x}", nonce_offset)).unwrap();
        let shifted = PrivateKey::from_scalar(&key).add_nonce(&nonce);
        prop_assume!(!shifted.is_zero());

        prop_assert_eq!(*shifted.scalar(), key + Scalar::from(nonce_offset));
        let combined = crypto::combine_public_keys(
            &[
                uncompressed(ProjectivePoint::GENERATOR * key),
                uncompressed(nonce.public_key()),
            ],
            false,
        ).unwrap();
        prop_assert_eq!(shifted.address().unwrap(), crypto::derive_address(&combined).unwrap());
    }

    /// A zero nonce leaves the key unchanged
    #[test]
    fn zero_nonce_is_identity(key in 1u64..u64::MAX) {
        let private_key = PrivateKey::from_scalar(&Scalar::from(key));
        prop_assert_eq!(private_key.add_nonce(&AccountNonce::ZERO), private_key);
    }
}

// ============================================================================
// Nonce Parsing
// ============================================================================

proptest! {
    /// Leading zeros and a 0x prefix do not change the parsed nonce
    #[test]
    fn nonce_padding_invariant(value in any::<u64>()) {
        let digits = format!("{:x}", value);
        let plain = AccountNonce::from_hex(&digits).unwrap();

        prop_assert_eq!(AccountNonce::from_hex(&format!("0x{}", digits)).unwrap(), plain);
        prop_assert_eq!(AccountNonce::from_hex(&format!("{:0>64}", digits)).unwrap(), plain);
        prop_assert_eq!(*plain.scalar(), Scalar::from(value));
    }

    /// Wide nonces reduce with the same modulus as scalar arithmetic
    #[test]
    fn nonce_reduces_modulo_order(bytes in prop::array::uniform32(any::<u8>())) {
        let nonce = AccountNonce::from_hex(&hex::encode(bytes)).unwrap();
        let reduced = <Scalar as Reduce<U256>>::reduce_bytes(&FieldBytes::from(bytes));
        prop_assert_eq!(*nonce.scalar(), reduced);
    }

    /// Nonces always serialize as 64 hex digits that parse back
    #[test]
    fn nonce_hex_is_fixed_width(bytes in prop::array::uniform32(any::<u8>())) {
        let nonce = AccountNonce::from_hex(&hex::encode(bytes)).unwrap();
        let encoded = nonce.to_hex();

        prop_assert_eq!(encoded.len(), 64);
        prop_assert_eq!(AccountNonce::from_hex(&encoded).unwrap(), nonce);
    }

    /// Extra leading zeros beyond 32 bytes are accepted
    #[test]
    fn nonce_accepts_wide_zero_padding(
        bytes in prop::array::uniform32(any::<u8>()),
        padding in 1usize..32,
    ) {
        let digits = hex::encode(bytes);
        let padded = format!("{}{}", "0".repeat(padding), digits);
        prop_assert_eq!(
            AccountNonce::from_hex(&padded).unwrap(),
            AccountNonce::from_hex(&digits).unwrap()
        );
    }

    /// Non-hex input is rejected, never misread
    #[test]
    fn nonce_rejects_non_hex(junk in "[g-z]{1,16}") {
        prop_assert!(AccountNonce::from_hex(&junk).is_err());
    }
}

#[test]
fn max_nonce_reduces_below_order() {
    let nonce = AccountNonce::from_hex(&"f".repeat(64)).unwrap();
    assert_eq!(
        nonce.to_hex(),
        format!("{:0>64}", "14551231950b75fc4402da1732fc9bebe")
    );
}
