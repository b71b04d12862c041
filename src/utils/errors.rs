use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("encoded list is empty")]
    Empty,
    #[error("invalid base64url input: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("corrupt compressed stream: {0}")]
    Decompress(io::Error),
    #[error("failed to compress bitstring: {0}")]
    Compress(io::Error),
    #[error("capacity {0} is not a positive multiple of 8")]
    InvalidCapacity(usize),
}
