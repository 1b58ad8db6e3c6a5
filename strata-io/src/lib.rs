//! Synchronous byte sinks and sources for the Strata containers.
//!
//! Writers go through [`CountingWriter`], which layers a byte position over
//! any [`std::io::Write`] so container code can record message offsets
//! without seeking. Random-access readers implement [`ReadAt`]; in-memory
//! buffers and memory mappings serve positional reads zero-copy, plain
//! files serve them with a copy.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::{fmt, io};

use memmap2::Mmap;
use strata_buffer::ByteBuffer;

/// A positional writer over any [`Write`], tracking the number of bytes
/// written so far.
pub struct CountingWriter<W: Write> {
    write: W,
    pos: u64,
}

impl<W: Write> CountingWriter<W> {
    /// Wrap a sink, starting the position count at zero.
    pub fn new(write: W) -> Self {
        Self { write, pos: 0 }
    }

    /// The current position in the stream: the total number of bytes
    /// accepted by the sink.
    pub fn tell(&self) -> u64 {
        self.pos
    }

    /// Flush and return the underlying sink.
    pub fn into_inner(mut self) -> io::Result<W> {
        self.write.flush()?;
        Ok(self.write)
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.write.write(buf)?;
        self.pos += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.write.flush()
    }
}

impl<W: Write> fmt::Debug for CountingWriter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountingWriter")
            .field("pos", &self.pos)
            .finish_non_exhaustive()
    }
}

/// A byte source supporting independent positional reads.
///
/// Implementations may share the source between several outstanding views;
/// a returned [`ByteBuffer`] must remain valid for as long as the caller
/// holds it, even if the source handle itself is dropped.
pub trait ReadAt {
    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Fails with [`io::ErrorKind::UnexpectedEof`] if the source ends
    /// before `offset + len`.
    fn read_bytes_at(&self, offset: u64, len: u64) -> io::Result<ByteBuffer>;

    /// Total size of the source in bytes.
    fn size(&self) -> io::Result<u64>;
}

impl ReadAt for ByteBuffer {
    fn read_bytes_at(&self, offset: u64, len: u64) -> io::Result<ByteBuffer> {
        let end = offset.checked_add(len).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "read range overflows u64")
        })?;
        if end > self.len() as u64 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "read of {} bytes at offset {} past end of {}-byte source",
                    len,
                    offset,
                    self.len()
                ),
            ));
        }
        let offset = usize::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset overflows usize"))?;
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length overflows usize"))?;
        Ok(self.slice(offset..offset + len))
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }
}

impl ReadAt for File {
    fn read_bytes_at(&self, offset: u64, len: u64) -> io::Result<ByteBuffer> {
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length overflows usize"))?;
        let mut handle = self;
        handle.seek(SeekFrom::Start(offset))?;
        let mut out = vec![0u8; len];
        handle.read_exact(&mut out)?;
        Ok(ByteBuffer::from(out))
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }
}

/// Memory-map the file at `path` and adopt the mapping as a [`ByteBuffer`].
///
/// The mapping is owned by the returned buffer and all views sliced from
/// it; it is unmapped once the last view is dropped. The file must not be
/// truncated while views exist.
pub fn map_path(path: impl AsRef<Path>) -> io::Result<ByteBuffer> {
    let file = File::open(path.as_ref())?;
    // SAFETY: the mapping is read-only and kept alive by the ByteBuffer;
    // callers are responsible for not truncating the underlying file.
    let mmap = unsafe { Mmap::map(&file)? };
    log::debug!(
        "mapped {} ({} bytes)",
        path.as_ref().display(),
        mmap.len()
    );
    Ok(ByteBuffer::from(mmap))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn counting_writer_tracks_position() {
        let mut writer = CountingWriter::new(Vec::new());
        writer.write_all(&[0u8; 10]).unwrap();
        assert_eq!(writer.tell(), 10);
        writer.write_all(&[1u8; 3]).unwrap();
        assert_eq!(writer.tell(), 13);
        assert_eq!(writer.into_inner().unwrap().len(), 13);
    }

    #[test]
    fn buffer_reads_are_zero_copy() {
        let source = ByteBuffer::copy_from([0u8, 1, 2, 3, 4, 5, 6, 7]);
        let view = source.read_bytes_at(2, 4).unwrap();
        assert_eq!(view.as_slice(), &[2, 3, 4, 5]);
        assert_eq!(view.as_slice().as_ptr(), source.as_slice()[2..].as_ptr());
    }

    #[test]
    fn short_reads_fail() {
        let source = ByteBuffer::copy_from([0u8; 8]);
        let err = source.read_bytes_at(4, 8).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn file_positional_reads() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789").unwrap();
        tmp.flush().unwrap();

        let file = File::open(tmp.path()).unwrap();
        assert_eq!(file.size().unwrap(), 10);
        assert_eq!(file.read_bytes_at(3, 4).unwrap().as_slice(), b"3456");
        // Positional reads are independent of each other.
        assert_eq!(file.read_bytes_at(0, 2).unwrap().as_slice(), b"01");
    }

    #[test]
    fn mapped_files_serve_views_after_handle_drop() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"strata-mapped").unwrap();
        tmp.flush().unwrap();

        let view = {
            let mapped = map_path(tmp.path()).unwrap();
            mapped.slice(7..13)
        };
        assert_eq!(view.as_slice(), b"mapped");
    }
}
