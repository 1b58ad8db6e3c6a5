use strata_error::{StrataResult, strata_bail};
use strata_ipc::ReadOptions;
use strata_ipc::schema::SchemaMessage;
use strata_ipc::wire::{WireCursor, put};

/// The location of one message within a file: enough to seek to it and
/// read it without scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    /// Byte offset of the message's length prefix from the file start.
    pub offset: u64,
    /// The message's metadata span: length prefix plus padded metadata.
    pub metadata_length: u32,
    /// The message's body span, padding included.
    pub body_length: u64,
}

/// The trailing index of a Strata file: the schema plus the location of
/// every dictionary and record-batch message written.
#[derive(Debug, Clone, PartialEq)]
pub struct Footer {
    pub(crate) schema: SchemaMessage,
    pub(crate) dictionary_blocks: Vec<Block>,
    pub(crate) record_blocks: Vec<Block>,
}

impl Footer {
    /// The unresolved schema stored in the footer.
    pub fn schema_message(&self) -> &SchemaMessage {
        &self.schema
    }

    /// Locations of the dictionary-batch messages, in emission order.
    pub fn dictionary_blocks(&self) -> &[Block] {
        &self.dictionary_blocks
    }

    /// Locations of the record-batch messages, in write order.
    pub fn record_blocks(&self) -> &[Block] {
        &self.record_blocks
    }
}

pub(crate) fn write_footer(
    out: &mut Vec<u8>,
    schema_payload: &[u8],
    dictionary_blocks: &[Block],
    record_blocks: &[Block],
) -> StrataResult<()> {
    out.extend_from_slice(schema_payload);
    write_blocks(out, dictionary_blocks)?;
    write_blocks(out, record_blocks)?;
    Ok(())
}

fn write_blocks(out: &mut Vec<u8>, blocks: &[Block]) -> StrataResult<()> {
    let count = u32::try_from(blocks.len())
        .map_err(|_| strata_error::strata_err!("more than u32::MAX blocks in one file"))?;
    put(out, count);
    for block in blocks {
        put(out, block.offset);
        put(out, block.metadata_length);
        put(out, block.body_length);
    }
    Ok(())
}

pub(crate) fn read_footer(bytes: &[u8], options: &ReadOptions) -> StrataResult<Footer> {
    let mut cursor = WireCursor::new(bytes);
    let schema = strata_ipc::schema::decode_schema_payload(&mut cursor, options)?;
    let dictionary_blocks = read_blocks(&mut cursor)?;
    let record_blocks = read_blocks(&mut cursor)?;
    if cursor.remaining() != 0 {
        strata_bail!(
            InvalidFormat: "footer has {} trailing bytes",
            cursor.remaining()
        );
    }
    Ok(Footer {
        schema,
        dictionary_blocks,
        record_blocks,
    })
}

fn read_blocks(cursor: &mut WireCursor<'_>) -> StrataResult<Vec<Block>> {
    let count = cursor.read::<u32>()?;
    (0..count)
        .map(|_| {
            Ok(Block {
                offset: cursor.read::<u64>()?,
                metadata_length: cursor.read::<u32>()?,
                body_length: cursor.read::<u64>()?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use strata_array::{DataType, Field, PType, Schema};
    use strata_ipc::WriteOptions;
    use strata_ipc::dictionary::DictionaryMemo;

    use super::*;

    #[test]
    fn footer_round_trip() {
        let schema = Schema::new([
            Field::new("a", DataType::Primitive(PType::I32), true),
            Field::new("b", DataType::Utf8, false),
        ]);
        let mut memo = DictionaryMemo::new();
        let payload =
            strata_ipc::schema::encode_schema(&schema, &mut memo, &WriteOptions::default())
                .unwrap();

        let dictionary_blocks = vec![Block {
            offset: 24,
            metadata_length: 40,
            body_length: 64,
        }];
        let record_blocks = vec![
            Block {
                offset: 128,
                metadata_length: 72,
                body_length: 256,
            },
            Block {
                offset: 456,
                metadata_length: 72,
                body_length: 8,
            },
        ];

        let mut out = Vec::new();
        write_footer(&mut out, &payload, &dictionary_blocks, &record_blocks).unwrap();
        let footer = read_footer(&out, &ReadOptions::default()).unwrap();

        assert_eq!(footer.dictionary_blocks(), dictionary_blocks.as_slice());
        assert_eq!(footer.record_blocks(), record_blocks.as_slice());
        assert_eq!(
            footer
                .schema_message()
                .resolve(&DictionaryMemo::new())
                .unwrap(),
            schema
        );
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let schema = Schema::new([Field::new("a", DataType::Bool, true)]);
        let mut memo = DictionaryMemo::new();
        let payload =
            strata_ipc::schema::encode_schema(&schema, &mut memo, &WriteOptions::default())
                .unwrap();

        let mut out = Vec::new();
        write_footer(&mut out, &payload, &[], &[]).unwrap();
        out.push(0xAB);
        let err = read_footer(&out, &ReadOptions::default()).unwrap_err();
        assert!(err.to_string().contains("trailing bytes"));
    }
}
