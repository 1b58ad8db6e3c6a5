//! Zero-copy adoption of memory-mapped regions.

use bytes::Bytes;
use memmap2::Mmap;

use crate::ByteBuffer;

impl From<Mmap> for ByteBuffer {
    fn from(value: Mmap) -> Self {
        // The mapping is owned by the Bytes and unmapped when the last
        // view over it is dropped.
        ByteBuffer::from(Bytes::from_owner(value))
    }
}
