#![deny(missing_docs)]
//! Byte buffers for Strata.
//!
//! All array data, message bodies, and memory-mapped file contents are held
//! in a [`ByteBuffer`]: an immutable, cheaply-cloneable range of bytes with
//! shared ownership. Slicing never copies; a slice keeps the backing
//! allocation (or memory mapping) alive for as long as any view of it
//! exists, which is what lets decoded arrays borrow directly from a message
//! body or a mapped file.
//!
//! Element access goes through [`NativeType`], which reads and writes
//! little-endian bytes at arbitrary (unaligned) offsets. The wire format is
//! little-endian, so buffers never need host-alignment or host-endianness
//! guarantees to be interpreted.

use std::fmt::{Debug, Formatter};
use std::ops::Range;

use bytes::Bytes;

mod mmap;
mod native;

pub use native::NativeType;

/// An immutable, cheaply-cloneable byte buffer with shared ownership.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ByteBuffer {
    bytes: Bytes,
}

impl ByteBuffer {
    /// Create an empty buffer. Does not allocate.
    pub const fn empty() -> Self {
        Self {
            bytes: Bytes::new(),
        }
    }

    /// Create a buffer of `len` zero bytes.
    pub fn zeroed(len: usize) -> Self {
        Self {
            bytes: Bytes::from(vec![0u8; len]),
        }
    }

    /// Create a buffer by copying the provided bytes.
    pub fn copy_from(bytes: impl AsRef<[u8]>) -> Self {
        Self {
            bytes: Bytes::copy_from_slice(bytes.as_ref()),
        }
    }

    /// Create a buffer from a slice of native-typed values, written out as
    /// little-endian elements.
    pub fn copy_from_typed<T: NativeType>(values: &[T]) -> Self {
        let mut out = Vec::with_capacity(values.len() * T::WIDTH);
        for value in values {
            value.write_le(&mut out);
        }
        Self {
            bytes: Bytes::from(out),
        }
    }

    /// Length of the buffer in bytes.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Predicate for empty buffers.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Access the buffer as a byte slice.
    #[inline(always)]
    pub fn as_slice(&self) -> &[u8] {
        self.bytes.as_ref()
    }

    /// Return a new view limited to the given byte range, sharing the
    /// backing allocation.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds.
    pub fn slice(&self, range: Range<usize>) -> Self {
        Self {
            bytes: self.bytes.slice(range),
        }
    }

    /// Read the element at `index`, where the buffer is interpreted as a
    /// sequence of little-endian `T` values.
    ///
    /// # Panics
    ///
    /// Panics if `(index + 1) * T::WIDTH` exceeds the buffer length.
    #[inline]
    pub fn get_le<T: NativeType>(&self, index: usize) -> T {
        let start = index * T::WIDTH;
        T::from_le_slice(&self.as_slice()[start..start + T::WIDTH])
    }

    /// The number of whole `T` elements this buffer holds.
    pub fn len_of<T: NativeType>(&self) -> usize {
        self.len() / T::WIDTH
    }

    /// Unwrap the underlying [`Bytes`].
    pub fn into_inner(self) -> Bytes {
        self.bytes
    }
}

impl From<Bytes> for ByteBuffer {
    fn from(bytes: Bytes) -> Self {
        Self { bytes }
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(vec: Vec<u8>) -> Self {
        Self {
            bytes: Bytes::from(vec),
        }
    }
}

impl From<&'static [u8]> for ByteBuffer {
    fn from(slice: &'static [u8]) -> Self {
        Self {
            bytes: Bytes::from_static(slice),
        }
    }
}

impl AsRef<[u8]> for ByteBuffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

const DEBUG_TRUNCATE: usize = 16;

impl Debug for ByteBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut binding = f.debug_struct("ByteBuffer");
        let fields = binding.field("len", &self.len());
        if self.len() <= DEBUG_TRUNCATE {
            fields.field("bytes", &self.as_slice())
        } else {
            fields.field("bytes", &&self.as_slice()[..DEBUG_TRUNCATE])
        }
        .finish()
    }
}
