//! Canonical byte encoding used as hash pre-images.
//!
//! Hashes must not depend on serializer defaults, so blocks and transactions
//! feed their fields through this encoder in a fixed order:
//! integers are little-endian fixed width, strings and byte slices carry a
//! `u32` little-endian length prefix, and optional values a one-byte
//! presence tag.

use crate::hash::Hash;

/// Accumulates fields into a canonical pre-image.
#[derive(Debug, Default)]
pub struct CanonicalEncoder {
    buf: Vec<u8>,
}

impl CanonicalEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn put_bool(&mut self, value: bool) -> &mut Self {
        self.put_u8(value as u8)
    }

    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn put_u64(&mut self, value: u64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn put_bytes(&mut self, value: &[u8]) -> &mut Self {
        self.put_u32(value.len() as u32);
        self.buf.extend_from_slice(value);
        self
    }

    pub fn put_str(&mut self, value: &str) -> &mut Self {
        self.put_bytes(value.as_bytes())
    }

    pub fn put_opt_str(&mut self, value: Option<&str>) -> &mut Self {
        match value {
            Some(s) => self.put_u8(1).put_str(s),
            None => self.put_u8(0),
        }
    }

    /// Hashes are fixed width, so no length prefix.
    pub fn put_hash(&mut self, value: &Hash) -> &mut Self {
        self.buf.extend_from_slice(value.as_bytes());
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}
