use std::io::Read;

use bytes::{Buf, BytesMut};
use strata_buffer::ByteBuffer;
use strata_error::{StrataResult, strata_bail, strata_err};
use strata_io::ReadAt;

use crate::messages::{DecoderMessage, Message, MessageDecoder, PollRead, parse_metadata};
use crate::{MESSAGE_PREFIX_LENGTH, ReadOptions};

const READ_CHUNK: usize = 8192;

/// A synchronous message reader over any [`Read`] stream.
pub struct SyncMessageReader<R: Read> {
    read: R,
    buffer: BytesMut,
    decoder: MessageDecoder,
}

impl<R: Read> SyncMessageReader<R> {
    /// Wrap a stream, enforcing the given read options on every message.
    pub fn new(read: R, options: ReadOptions) -> Self {
        Self {
            read,
            buffer: BytesMut::new(),
            decoder: MessageDecoder::new(options),
        }
    }

    /// Read the next message.
    ///
    /// Returns `None` on a clean end of input at a message boundary; a
    /// source that ends mid-message is invalid.
    pub fn next_message(&mut self) -> StrataResult<Option<DecoderMessage>> {
        loop {
            match self.decoder.read_next(&mut self.buffer)? {
                PollRead::Some(message) => return Ok(Some(message)),
                PollRead::NeedMore(needed) => {
                    if !self.fill(needed)? {
                        if self.buffer.is_empty() && self.decoder.is_at_boundary() {
                            return Ok(None);
                        }
                        strata_bail!(InvalidFormat: "input ends in the middle of a message");
                    }
                }
            }
        }
    }

    /// Read until the buffer holds `needed` bytes; returns false on EOF.
    fn fill(&mut self, needed: usize) -> StrataResult<bool> {
        let mut chunk = [0u8; READ_CHUNK];
        while self.buffer.remaining() < needed {
            let n = self.read.read(&mut chunk)?;
            if n == 0 {
                return Ok(false);
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
        Ok(true)
    }
}

/// Read one self-delimiting message at `offset` in a random-access source.
///
/// Fails with `InvalidFormat` on a zero, negative, or unparseable length
/// prefix — unlike a stream reader, a caller asking for a message at a
/// known offset never expects the end-of-stream marker there.
pub fn read_message_at(
    source: &impl ReadAt,
    offset: u64,
    options: &ReadOptions,
) -> StrataResult<(Message, ByteBuffer)> {
    let prefix = source.read_bytes_at(offset, MESSAGE_PREFIX_LENGTH as u64)?;
    let metadata_length = prefix.get_le::<u32>(0);
    if metadata_length == 0 || metadata_length > i32::MAX as u32 {
        strata_bail!(
            InvalidFormat: "invalid metadata length prefix {} at offset {}",
            metadata_length as i32,
            offset
        );
    }

    let metadata = source.read_bytes_at(
        offset + MESSAGE_PREFIX_LENGTH as u64,
        metadata_length as u64,
    )?;
    let message = parse_metadata(metadata.as_slice(), options)?;

    let body_offset = offset + MESSAGE_PREFIX_LENGTH as u64 + metadata_length as u64;
    let body = source.read_bytes_at(body_offset, message.body_length)?;
    Ok((message, body))
}
