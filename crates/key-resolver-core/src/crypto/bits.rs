//! Bit-range extraction from byte buffers

use crate::{Error, Result};

/// Read `bit_length` bits (at most 64) starting at `start_bit`, most
/// significant bit first, right-aligned in the result
pub fn extract_bits(buffer: &[u8], start_bit: usize, bit_length: usize) -> Result<u64> {
    if bit_length > 64 {
        return Err(Error::Range(format!(
            "Cannot extract {} bits into a 64-bit value",
            bit_length
        )));
    }
    let total_bits = buffer
        .len()
        .checked_mul(8)
        .ok_or_else(|| Error::Range("Buffer too large".into()))?;
    let end_bit = start_bit
        .checked_add(bit_length)
        .filter(|end| *end <= total_bits)
        .ok_or_else(|| {
            Error::Range(format!(
                "Bits {}..{} outside a {}-bit buffer",
                start_bit,
                start_bit.saturating_add(bit_length),
                total_bits
            ))
        })?;
    if bit_length == 0 {
        return Ok(0);
    }

    // An unaligned 64-bit window touches at most 9 bytes
    let bytes = &buffer[start_bit / 8..end_bit.div_ceil(8)];
    let mut window = [0u8; 16];
    window[..bytes.len()].copy_from_slice(bytes);

    let value = u128::from_be_bytes(window) << (start_bit % 8);
    Ok((value >> (128 - bit_length)) as u64)
}
