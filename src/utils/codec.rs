use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use std::io::{Read, Write};

use super::errors::CodecError;

/// Multibase prefix for base64url without padding.
pub const MULTIBASE_PREFIX: char = 'u';

/// Checks that a capacity can be packed into whole bytes.
pub fn validate_capacity(capacity: usize) -> Result<(), CodecError> {
    if capacity == 0 || capacity % 8 != 0 {
        return Err(CodecError::InvalidCapacity(capacity));
    }
    Ok(())
}

// Bit `i` lives in byte `i / 8`, most significant bit first.
fn pack(bits: &[bool]) -> Vec<u8> {
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (i, _) in bits.iter().enumerate().filter(|(_, set)| **set) {
        bytes[i / 8] |= 1 << (7 - (i % 8));
    }
    bytes
}

fn unpack(bytes: &[u8], capacity: usize) -> Vec<bool> {
    (0..capacity)
        .map(|i| {
            bytes
                .get(i / 8)
                .is_some_and(|byte| (byte >> (7 - (i % 8))) & 1 == 1)
        })
        .collect()
}

/// Packs, gzips and base64url-encodes a bitstring, prefixed with `u`.
pub fn encode(bits: &[bool]) -> Result<String, CodecError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&pack(bits))
        .map_err(CodecError::Compress)?;
    let compressed = encoder.finish().map_err(CodecError::Compress)?;

    let mut encoded = String::with_capacity(compressed.len() * 4 / 3 + 2);
    encoded.push(MULTIBASE_PREFIX);
    URL_SAFE_NO_PAD.encode_string(&compressed, &mut encoded);
    Ok(encoded)
}

/// Encodes an all-false bitstring of the given capacity.
pub fn encode_empty(capacity: usize) -> Result<String, CodecError> {
    validate_capacity(capacity)?;
    encode(&vec![false; capacity])
}

/// Decodes an encoded list into exactly `capacity` bits.
///
/// Bits past the end of the decompressed bytes decode to `false`.
pub fn decode(encoded: &str, capacity: usize) -> Result<Vec<bool>, CodecError> {
    let body = encoded.strip_prefix(MULTIBASE_PREFIX).unwrap_or(encoded);
    let body = body.trim_end_matches('=');
    if body.is_empty() {
        return Err(CodecError::Empty);
    }

    let compressed = URL_SAFE_NO_PAD.decode(body)?;
    let mut decoder = GzDecoder::new(&compressed[..]);
    let mut bytes = Vec::new();
    decoder
        .read_to_end(&mut bytes)
        .map_err(CodecError::Decompress)?;

    Ok(unpack(&bytes, capacity))
}
