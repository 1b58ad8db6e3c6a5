use std::path::Path;

use strata_array::{RecordBatch, SchemaRef};
use strata_buffer::ByteBuffer;
use strata_error::{StrataResult, strata_bail, strata_err};
use strata_io::ReadAt;
use strata_ipc::ReadOptions;
use strata_ipc::batch::decode_batch;
use strata_ipc::dictionary::{DictionaryMemo, decode_dictionary};
use strata_ipc::messages::{MessageHeader, read_message_at};

use crate::footer::{Block, read_footer};
use crate::{EOF_SIZE, Footer, MAGIC_BYTES};

/// Random-access reader over a Strata file.
///
/// Opening parses the trailing footer, loads every dictionary payload into
/// a fresh memo, and resolves the schema; [`FileReader::get_batch`] then
/// seeks straight to the requested block — no sequential scan, in any
/// access order. Decoded batches hold zero-copy views into the source, so
/// a memory-mapped source stays mapped for as long as any decoded array
/// lives.
#[derive(Debug)]
pub struct FileReader<R: ReadAt> {
    source: R,
    footer: Footer,
    schema: SchemaRef,
    options: ReadOptions,
}

impl FileReader<ByteBuffer> {
    /// Memory-map the file at `path` and open it.
    pub fn open_path(path: impl AsRef<Path>) -> StrataResult<Self> {
        Self::open(strata_io::map_path(path)?)
    }
}

impl<R: ReadAt> FileReader<R> {
    /// Open a file from any random-access source.
    pub fn open(source: R) -> StrataResult<Self> {
        Self::open_with_options(source, ReadOptions::default())
    }

    /// Open a file with explicit options.
    pub fn open_with_options(source: R, options: ReadOptions) -> StrataResult<Self> {
        let size = source.size()?;
        if size < EOF_SIZE as u64 {
            strata_bail!(
                InvalidFormat: "file of {} bytes is too small to hold a trailer",
                size
            );
        }

        let trailer = source.read_bytes_at(size - EOF_SIZE as u64, EOF_SIZE as u64)?;
        let magic: [u8; 4] = trailer.as_slice()[4..]
            .try_into()
            .map_err(|_| strata_err!(InvalidFormat: "short trailer"))?;
        if magic != MAGIC_BYTES {
            strata_bail!(
                InvalidFormat: "bad magic: expected {:?}, found {:?}",
                MAGIC_BYTES,
                magic
            );
        }

        let footer_length = u64::from(trailer.get_le::<u32>(0));
        if footer_length + EOF_SIZE as u64 > size {
            strata_bail!(
                InvalidFormat: "footer of {} bytes does not fit in a {}-byte file",
                footer_length,
                size
            );
        }
        let footer_bytes =
            source.read_bytes_at(size - EOF_SIZE as u64 - footer_length, footer_length)?;
        let footer = read_footer(footer_bytes.as_slice(), &options)?;

        let memo = load_dictionaries(&source, &footer, &options)?;
        let schema = SchemaRef::new(footer.schema_message().resolve(&memo)?);
        log::debug!(
            "opened file: {} record blocks, {} dictionaries",
            footer.record_blocks().len(),
            memo.len()
        );

        Ok(Self {
            source,
            footer,
            schema,
            options,
        })
    }

    /// The file's resolved schema.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// The file's footer index.
    pub fn footer(&self) -> &Footer {
        &self.footer
    }

    /// The number of record batches in the file.
    pub fn count(&self) -> usize {
        self.footer.record_blocks().len()
    }

    /// The number of dictionary payloads in the file.
    pub fn dictionary_count(&self) -> usize {
        self.footer.dictionary_blocks().len()
    }

    /// Read the `i`-th record batch by seeking to its recorded block.
    pub fn get_batch(&self, i: usize) -> StrataResult<RecordBatch> {
        let block = *self
            .footer
            .record_blocks()
            .get(i)
            .ok_or_else(|| strata_err!("batch index {} out of range ({})", i, self.count()))?;
        let (message, body) = self.read_block(block)?;
        let MessageHeader::RecordBatch(header) = &message.header else {
            strata_bail!(
                InvalidFormat: "block {} holds a {:?} message, expected a record batch",
                i,
                message.message_type()
            );
        };
        decode_batch(header, &self.schema, body, &self.options)
    }

    fn read_block(
        &self,
        block: Block,
    ) -> StrataResult<(strata_ipc::messages::Message, ByteBuffer)> {
        let (message, body) = read_message_at(&self.source, block.offset, &self.options)?;
        if message.body_length != block.body_length {
            strata_bail!(
                InvalidFormat: "block at offset {} declares a {}-byte body, message holds {}",
                block.offset,
                block.body_length,
                message.body_length
            );
        }
        Ok((message, body))
    }
}

fn load_dictionaries<R: ReadAt>(
    source: &R,
    footer: &Footer,
    options: &ReadOptions,
) -> StrataResult<DictionaryMemo> {
    let declared = footer.schema_message().dictionary_decls()?;
    let mut memo = DictionaryMemo::new();
    for block in footer.dictionary_blocks() {
        let (message, body) = read_message_at(source, block.offset, options)?;
        let MessageHeader::DictionaryBatch(header) = &message.header else {
            strata_bail!(
                InvalidFormat: "dictionary block at offset {} holds a {:?} message",
                block.offset,
                message.message_type()
            );
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
    Ok(memo)
}
