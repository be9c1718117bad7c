//! Line offset keys shared by the workload and the engine.

use anyhow::{bail, Result};
use bytes::{Buf, Bytes};

/// Encodes the byte offset of an input line as a map input key.
#[inline]
pub fn offset_to_bytes(offset: u64) -> Bytes {
    Bytes::copy_from_slice(&offset.to_be_bytes())
}

/// Decodes a map input key produced by [`offset_to_bytes`].
pub fn offset_from_bytes(mut buf: Bytes) -> Result<u64> {
    if buf.len() != 8 {
        bail!("line offset key must be 8 bytes, got {}", buf.len());
    }
    Ok(buf.get_u64())
}
