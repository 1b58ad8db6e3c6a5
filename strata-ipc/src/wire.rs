//! Checked little-endian cursor over metadata bytes.
//!
//! Every metadata payload is a fixed-layout little-endian struct. Reads go
//! through [`WireCursor`], which fails with `InvalidFormat` instead of
//! panicking when the metadata is truncated; writes append to a plain
//! `Vec<u8>` through [`bytes::BufMut`].

use strata_buffer::NativeType;
use strata_error::{StrataExpect, StrataResult, strata_bail, strata_err};

pub struct WireCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// The number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn read_bytes(&mut self, len: usize) -> StrataResult<&'a [u8]> {
        if self.remaining() < len {
            strata_bail!(
                InvalidFormat: "metadata truncated: wanted {} bytes, {} remain",
                len,
                self.remaining()
            );
        }
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub fn read<T: NativeType>(&mut self) -> StrataResult<T> {
        Ok(T::from_le_slice(self.read_bytes(T::WIDTH)?))
    }

    /// Read a u32-length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> StrataResult<String> {
        let len = usize::try_from(self.read::<u32>()?)
            .map_err(|_| strata_err!(InvalidFormat: "string length overflows usize"))?;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| strata_err!(InvalidFormat: "name is not valid UTF-8"))
    }
}

/// Append a u32-length-prefixed UTF-8 string.
pub fn put_string(out: &mut Vec<u8>, value: &str) {
    put(
        out,
        u32::try_from(value.len()).strata_expect("name length fits in u32"),
    );
    out.extend_from_slice(value.as_bytes());
}

/// Append one little-endian element.
pub fn put<T: NativeType>(out: &mut Vec<u8>, value: T) {
    value.write_le(out);
}
