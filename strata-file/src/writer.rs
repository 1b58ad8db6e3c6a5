use std::io::Write;

use strata_array::{RecordBatch, SchemaRef};
use strata_error::{StrataResult, strata_bail};
use strata_ipc::WriteOptions;
use strata_ipc::dictionary::DictionaryMemo;
use strata_ipc::messages::SyncMessageWriter;
use strata_ipc::wire::put;

use crate::footer::{Block, write_footer};
use crate::{EOF_SIZE, MAGIC_BYTES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Open,
    SchemaWritten,
    Writing,
    Closed,
}

/// Writes a Strata file: the stream format plus a footer recording the
/// location of every dictionary and record-batch message.
///
/// The writer shares the stream writer's per-message codec; the containers
/// differ only in the trailing index. [`FileWriter::write_batch_with`] with
/// [`WriteOptions::allow_64bit`] set is the large-batch mode: buffers are
/// streamed straight to the sink, so row counts and buffer sizes past the
/// 32-bit range — which the single-shot message path rejects — round-trip
/// through files.
pub struct FileWriter<W: Write> {
    messages: SyncMessageWriter<W>,
    schema: SchemaRef,
    memo: DictionaryMemo,
    options: WriteOptions,
    state: WriterState,
    dictionary_blocks: Vec<Block>,
    record_blocks: Vec<Block>,
}

impl<W: Write> FileWriter<W> {
    /// Open a file writer over `write` for batches of `schema`.
    pub fn try_new(write: W, schema: SchemaRef) -> StrataResult<Self> {
        Self::try_new_with_options(write, schema, WriteOptions::default())
    }

    /// Open a file writer with explicit options.
    pub fn try_new_with_options(
        write: W,
        schema: SchemaRef,
        options: WriteOptions,
    ) -> StrataResult<Self> {
        Ok(Self {
            messages: SyncMessageWriter::new(write),
            schema,
            memo: DictionaryMemo::new(),
            options,
            state: WriterState::Open,
            dictionary_blocks: Vec::new(),
            record_blocks: Vec::new(),
        })
    }

    /// The schema this file carries.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// The current position in the sink.
    pub fn tell(&self) -> u64 {
        self.messages.tell()
    }

    /// Emit the schema message and one DictionaryBatch per distinct
    /// payload, recording the dictionary block locations.
    pub fn write_schema(&mut self) -> StrataResult<()> {
        if self.state != WriterState::Open {
            strata_bail!("schema already written");
        }
        let options = self.options.clone();
        self.messages
            .write_schema(&self.schema, &mut self.memo, &options)?;
        let payloads = self
            .memo
            .iter()
            .map(|(id, values)| (id, values.clone()))
            .collect::<Vec<_>>();
        for (id, values) in payloads {
            let offset = self.messages.tell();
            let (metadata_length, body_length) =
                self.messages.write_dictionary(id, &values, &options)?;
            self.dictionary_blocks.push(Block {
                offset,
                metadata_length,
                body_length,
            });
        }
        self.state = WriterState::SchemaWritten;
        Ok(())
    }

    /// Write one record batch, emitting the schema first if needed.
    pub fn write_batch(&mut self, batch: &RecordBatch) -> StrataResult<()> {
        let options = self.options.clone();
        self.write_batch_with(batch, &options)
    }

    /// Write one record batch with per-batch options. Setting
    /// [`WriteOptions::allow_64bit`] selects the large-batch mode.
    pub fn write_batch_with(
        &mut self,
        batch: &RecordBatch,
        options: &WriteOptions,
    ) -> StrataResult<()> {
        match self.state {
            WriterState::Open => self.write_schema()?,
            WriterState::SchemaWritten | WriterState::Writing => {}
            WriterState::Closed => strata_bail!("file is closed"),
        }
        if batch.schema().as_ref() != self.schema.as_ref() {
            strata_bail!(
                "batch schema {} does not match the file schema {}",
                batch.schema(),
                self.schema
            );
        }
        let offset = self.messages.tell();
        let (metadata_length, body_length) = self.messages.write_batch(batch, options)?;
        self.record_blocks.push(Block {
            offset,
            metadata_length,
            body_length,
        });
        self.state = WriterState::Writing;
        Ok(())
    }

    /// Write the end-of-stream marker, the footer, and the fixed trailer,
    /// closing the file.
    pub fn finish(&mut self) -> StrataResult<()> {
        match self.state {
            WriterState::Open => self.write_schema()?,
            WriterState::SchemaWritten | WriterState::Writing => {}
            WriterState::Closed => strata_bail!("file is already closed"),
        }
        self.messages.write_eos()?;

        // Re-encoding the schema against the session memo reproduces the
        // exact id bindings of the leading schema message.
        let options = self.options.clone();
        let schema_payload =
            strata_ipc::schema::encode_schema(&self.schema, &mut self.memo, &options)?;
        let mut footer = Vec::new();
        write_footer(
            &mut footer,
            &schema_payload,
            &self.dictionary_blocks,
            &self.record_blocks,
        )?;

        let mut trailer = Vec::with_capacity(EOF_SIZE);
        put(
            &mut trailer,
            u32::try_from(footer.len())
                .map_err(|_| strata_error::strata_err!("footer exceeds u32::MAX bytes"))?,
        );
        trailer.extend_from_slice(&MAGIC_BYTES);

        self.messages.write_bytes(&footer)?;
        self.messages.write_bytes(&trailer)?;
        self.state = WriterState::Closed;
        log::debug!(
            "closed file: {} record blocks, {} dictionary blocks, {} bytes",
            self.record_blocks.len(),
            self.dictionary_blocks.len(),
            self.messages.tell()
        );
        Ok(())
    }

    /// Consume the writer, returning the underlying sink.
    ///
    /// Call [`FileWriter::finish`] first; an unfinished file has no
    /// footer.
    pub fn into_inner(self) -> StrataResult<W> {
        self.messages.into_inner()
    }
}
