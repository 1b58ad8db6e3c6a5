use std::io::Write;

use strata_array::{ArrayRef, RecordBatch, Schema, Tensor};
use strata_error::{StrataExpect, StrataResult};
use strata_io::CountingWriter;

use crate::WriteOptions;
use crate::dictionary::DictionaryMemo;
use crate::messages::MessageEncoder;

/// A synchronous message writer over any [`Write`] sink, tracking the
/// stream position so containers can record message offsets.
pub struct SyncMessageWriter<W: Write> {
    write: CountingWriter<W>,
    encoder: MessageEncoder,
}

impl<W: Write> SyncMessageWriter<W> {
    /// Wrap a sink, starting at position zero.
    pub fn new(write: W) -> Self {
        Self {
            write: CountingWriter::new(write),
            encoder: MessageEncoder::default(),
        }
    }

    /// The current position in the stream.
    pub fn tell(&self) -> u64 {
        self.write.tell()
    }

    /// Write a schema message, assigning dictionary ids through `memo`.
    pub fn write_schema(
        &mut self,
        schema: &Schema,
        memo: &mut DictionaryMemo,
        options: &WriteOptions,
    ) -> StrataResult<()> {
        let buffers = self.encoder.encode_schema(schema, memo, options)?;
        self.write_buffers(buffers)
    }

    /// Write a record batch message. Returns `(metadata_length,
    /// body_length)`: the prefix-plus-padded-metadata span and the padded
    /// body span.
    pub fn write_batch(
        &mut self,
        batch: &RecordBatch,
        options: &WriteOptions,
    ) -> StrataResult<(u32, u64)> {
        let buffers = self.encoder.encode_batch_message(batch, options)?;
        self.write_framed(buffers)
    }

    /// Write a dictionary payload message under `id`.
    pub fn write_dictionary(
        &mut self,
        id: i64,
        values: &ArrayRef,
        options: &WriteOptions,
    ) -> StrataResult<(u32, u64)> {
        let buffers = self
            .encoder
            .encode_dictionary_message(id, values, options)?;
        self.write_framed(buffers)
    }

    /// Write a tensor message. Returns `(metadata_length, body_length)`.
    pub fn write_tensor(&mut self, tensor: &Tensor) -> StrataResult<(u32, u64)> {
        let buffers = self.encoder.encode_tensor_message(tensor)?;
        self.write_framed(buffers)
    }

    /// Write the end-of-stream marker.
    pub fn write_eos(&mut self) -> StrataResult<()> {
        let buffers = self.encoder.encode_eos();
        self.write_buffers(buffers)
    }

    /// Write raw bytes outside any message framing. Container formats use
    /// this for their trailers.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> StrataResult<()> {
        self.write.write_all(bytes)?;
        Ok(())
    }

    /// Flush and return the underlying sink.
    pub fn into_inner(self) -> StrataResult<W> {
        Ok(self.write.into_inner()?)
    }

    fn write_buffers(&mut self, buffers: Vec<bytes::Bytes>) -> StrataResult<()> {
        for buffer in buffers {
            self.write.write_all(&buffer)?;
        }
        Ok(())
    }

    /// Write an encoded message, reporting its metadata and body spans.
    /// The encoder lays buffers out as [prefix, metadata, body...].
    fn write_framed(&mut self, buffers: Vec<bytes::Bytes>) -> StrataResult<(u32, u64)> {
        let metadata_length = u32::try_from(buffers[0].len() + buffers[1].len())
            .strata_expect("metadata span fits in u32");
        let body_length = buffers[2..].iter().map(|b| b.len() as u64).sum();
        self.write_buffers(buffers)?;
        Ok((metadata_length, body_length))
    }
}
