//! The sequential Stream container protocol.
//!
//! A stream is a schema message, then every dictionary payload the schema
//! references, then zero or more record batches in write order, terminated
//! by the end-of-stream marker. The writer walks Open → SchemaWritten →
//! Writing → Closed; the reader mirrors it with Open → Ready → Done, and
//! Done is terminal.

use std::io::{Read, Write};

use strata_array::{RecordBatch, SchemaRef};
use strata_error::{StrataResult, strata_bail, strata_err};

use crate::batch::decode_batch;
use crate::dictionary::{DictionaryMemo, decode_dictionary};
use crate::messages::{
    DecoderMessage, MessageHeader, MessageType, SyncMessageReader, SyncMessageWriter,
};
use crate::schema::SchemaMessage;
use crate::{ReadOptions, WriteOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Open,
    SchemaWritten,
    Writing,
    Closed,
}

/// Writes a sequence of record batches over one schema to a byte sink.
pub struct StreamWriter<W: Write> {
    messages: SyncMessageWriter<W>,
    schema: SchemaRef,
    memo: DictionaryMemo,
    options: WriteOptions,
    state: WriterState,
}

impl<W: Write> StreamWriter<W> {
    /// Open a stream writer over `write` for batches of `schema`.
    ///
    /// Nothing is written until the schema is emitted, either explicitly
    /// via [`StreamWriter::write_schema`] or implicitly by the first batch
    /// write.
    pub fn try_new(write: W, schema: SchemaRef) -> StrataResult<Self> {
        Self::try_new_with_options(write, schema, WriteOptions::default())
    }

    /// Open a stream writer with explicit options.
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
        })
    }

    /// The schema this stream carries.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// The current position in the sink.
    pub fn tell(&self) -> u64 {
        self.messages.tell()
    }

    /// Emit the schema message followed by one DictionaryBatch per
    /// distinct dictionary payload the schema references.
    pub fn write_schema(&mut self) -> StrataResult<()> {
        if self.state != WriterState::Open {
            strata_bail!("schema already written");
        }
        let options = self.options.clone();
        self.messages
            .write_schema(&self.schema, &mut self.memo, &options)?;
        for (id, values) in self.memo.iter().map(|(id, v)| (id, v.clone())).collect::<Vec<_>>() {
            self.messages.write_dictionary(id, &values, &options)?;
        }
        self.state = WriterState::SchemaWritten;
        Ok(())
    }

    /// Write one record batch, emitting the schema first if needed.
    pub fn write_batch(&mut self, batch: &RecordBatch) -> StrataResult<()> {
        let options = self.options.clone();
        self.write_batch_with(batch, &options)
    }

    /// Write one record batch with per-batch options.
    ///
    /// The stream protocol always enforces the 32-bit layout; batches
    /// beyond it go through the File writer's large-batch mode.
    pub fn write_batch_with(
        &mut self,
        batch: &RecordBatch,
        options: &WriteOptions,
    ) -> StrataResult<()> {
        match self.state {
            WriterState::Open => self.write_schema()?,
            WriterState::SchemaWritten | WriterState::Writing => {}
            WriterState::Closed => strata_bail!("stream is closed"),
        }
        if batch.schema().as_ref() != self.schema.as_ref() {
            strata_bail!(
                "batch schema {} does not match the stream schema {}",
                batch.schema(),
                self.schema
            );
        }
        let options = WriteOptions {
            allow_64bit: false,
            ..options.clone()
        };
        self.messages.write_batch(batch, &options)?;
        self.state = WriterState::Writing;
        Ok(())
    }

    /// Emit the end-of-stream marker and close the stream. The writer
    /// accepts no further batches.
    pub fn finish(&mut self) -> StrataResult<()> {
        match self.state {
            WriterState::Open => self.write_schema()?,
            WriterState::SchemaWritten | WriterState::Writing => {}
            WriterState::Closed => strata_bail!("stream is already closed"),
        }
        self.messages.write_eos()?;
        self.state = WriterState::Closed;
        log::debug!("closed stream at {} bytes", self.messages.tell());
        Ok(())
    }

    /// Consume the writer, returning the underlying sink.
    ///
    /// Call [`StreamWriter::finish`] first; an unfinished stream has no
    /// end-of-stream marker.
    pub fn into_inner(self) -> StrataResult<W> {
        self.messages.into_inner()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    Ready,
    Done,
}

/// Reads record batches from a stream in write order.
#[derive(Debug)]
pub struct StreamReader<R: Read> {
    messages: SyncMessageReader<R>,
    schema: SchemaRef,
    options: ReadOptions,
    state: ReaderState,
    pending: Option<DecoderMessage>,
}

impl<R: Read> StreamReader<R> {
    /// Open a stream for reading: consumes the schema message and every
    /// leading dictionary batch, then resolves the schema against them.
    pub fn try_new(read: R) -> StrataResult<Self> {
        Self::try_new_with_options(read, ReadOptions::default())
    }

    /// Open a stream with explicit options.
    pub fn try_new_with_options(read: R, options: ReadOptions) -> StrataResult<Self> {
        let mut messages = SyncMessageReader::new(read, options.clone());

        let schema_message = match messages.next_message()? {
            Some(DecoderMessage::Message(message, _)) => match message.header {
                MessageHeader::Schema(schema_message) => schema_message,
                other => strata_bail!(
                    InvalidFormat: "expected a schema message to open the stream, found {:?}",
                    message_type_of(&other)
                ),
            },
            Some(DecoderMessage::Eos) | None => {
                strata_bail!(InvalidFormat: "stream ends before its schema message")
            }
        };

        let (memo, pending, state) =
            read_dictionaries(&mut messages, &schema_message, &options)?;
        let schema = SchemaRef::new(schema_message.resolve(&memo)?);
        log::debug!(
            "opened stream: {} ({} dictionaries)",
            schema,
            memo.len()
        );

        Ok(Self {
            messages,
            schema,
            options,
            state,
            pending,
        })
    }

    /// The stream's resolved schema.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// The next batch in write order, or `None` exactly at the
    /// end-of-stream marker. The reader is not restartable: every call
    /// after the marker keeps returning `None`.
    pub fn next_batch(&mut self) -> StrataResult<Option<RecordBatch>> {
        if self.state == ReaderState::Done {
            return Ok(None);
        }
        let message = match self.pending.take() {
            Some(pending) => Some(pending),
            None => self.messages.next_message()?,
        };
        match message {
            Some(DecoderMessage::Message(message, body)) => match message.header {
                MessageHeader::RecordBatch(header) => {
                    Ok(Some(decode_batch(&header, &self.schema, body, &self.options)?))
                }
                other => strata_bail!(
                    InvalidFormat: "expected a record batch message, found {:?}",
                    message_type_of(&other)
                ),
            },
            Some(DecoderMessage::Eos) | None => {
                self.state = ReaderState::Done;
                Ok(None)
            }
        }
    }
}

impl<R: Read> Iterator for StreamReader<R> {
    type Item = StrataResult<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch().transpose()
    }
}

fn message_type_of(header: &MessageHeader) -> MessageType {
    match header {
        MessageHeader::Schema(_) => MessageType::Schema,
        MessageHeader::DictionaryBatch(_) => MessageType::DictionaryBatch,
        MessageHeader::RecordBatch(_) => MessageType::RecordBatch,
        MessageHeader::Tensor(_) => MessageType::Tensor,
    }
}

/// Consume dictionary batches until the first non-dictionary message,
/// registering each payload. Returns the populated memo, the message that
/// ended the run (if any), and the resulting reader state.
fn read_dictionaries<R: Read>(
    messages: &mut SyncMessageReader<R>,
    schema_message: &SchemaMessage,
    options: &ReadOptions,
) -> StrataResult<(DictionaryMemo, Option<DecoderMessage>, ReaderState)> {
    let declared = schema_message.dictionary_decls()?;
    let mut memo = DictionaryMemo::new();

    loop {
        match messages.next_message()? {
            Some(DecoderMessage::Message(message, body)) => {
                let MessageHeader::DictionaryBatch(header) = &message.header else {
                    // The first non-dictionary message belongs to the
                    // batch sequence; hand it back to the reader.
                    return Ok((
                        memo,
                        Some(DecoderMessage::Message(message, body)),
                        ReaderState::Ready,
                    ));
                };
                let (_, value_dtype) = declared.get(&header.id).ok_or_else(|| {
                    strata_err!(
                        InvalidFormat: "dictionary batch for id {} which the schema never references",
                        header.id
                    )
                })?;
                let values = decode_dictionary(header, value_dtype, body, options)?;
                memo.register(header.id, values)?;
            }
            Some(DecoderMessage::Eos) | None => return Ok((memo, None, ReaderState::Done)),
        }
    }
}
