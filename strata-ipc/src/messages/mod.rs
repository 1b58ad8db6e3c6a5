//! The message envelope: a length-prefixed, version-tagged metadata section
//! followed by an 8-byte-aligned body.

mod decoder;
mod encoder;
mod reader_sync;
mod writer_sync;

pub use decoder::*;
pub use encoder::*;
use num_enum::{IntoPrimitive, TryFromPrimitive};
pub use reader_sync::*;
use strata_error::{StrataResult, strata_err};
pub use writer_sync::*;

use crate::batch::RecordBatchMessage;
use crate::dictionary::DictionaryBatchMessage;
use crate::schema::SchemaMessage;
use crate::tensor::TensorMessage;
use crate::wire::WireCursor;
use crate::ReadOptions;

/// The kinds of message a Strata stream can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MessageType {
    /// A schema header describing the field tree.
    Schema = 0,
    /// A dictionary payload bound to an id.
    DictionaryBatch = 1,
    /// A record batch.
    RecordBatch = 2,
    /// A dense tensor.
    Tensor = 3,
}

/// Wire-format revision tags. Readers accept every version up to
/// [`CURRENT_VERSION`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum MetadataVersion {
    /// Historic revision 1.
    V1 = 1,
    /// Historic revision 2.
    V2 = 2,
    /// The current revision.
    V3 = 3,
}

/// The version written by this library.
pub const CURRENT_VERSION: MetadataVersion = MetadataVersion::V3;

/// A decoded message envelope. Transient: it exists between the wire and
/// the arrays/schemas decoded from it, and is never persisted itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// The format revision the writer used.
    pub version: MetadataVersion,
    /// The kind-specific header payload.
    pub header: MessageHeader,
    /// The length of the message body, padding included.
    pub body_length: u64,
}

/// The kind-specific payload of a message header.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageHeader {
    /// A schema header.
    Schema(SchemaMessage),
    /// A dictionary payload header.
    DictionaryBatch(DictionaryBatchMessage),
    /// A record batch header.
    RecordBatch(RecordBatchMessage),
    /// A tensor header.
    Tensor(TensorMessage),
}

impl Message {
    /// The message's kind tag.
    pub fn message_type(&self) -> MessageType {
        match &self.header {
            MessageHeader::Schema(_) => MessageType::Schema,
            MessageHeader::DictionaryBatch(_) => MessageType::DictionaryBatch,
            MessageHeader::RecordBatch(_) => MessageType::RecordBatch,
            MessageHeader::Tensor(_) => MessageType::Tensor,
        }
    }
}

/// Parse a metadata section (everything after the length prefix).
pub(crate) fn parse_metadata(bytes: &[u8], options: &ReadOptions) -> StrataResult<Message> {
    let mut cursor = WireCursor::new(bytes);

    let raw_version = cursor.read::<u16>()?;
    let version = MetadataVersion::try_from(raw_version).map_err(
        |_| strata_err!(InvalidFormat: "unsupported metadata version {}", raw_version),
    )?;

    let raw_type = cursor.read::<u8>()?;
    let message_type = MessageType::try_from(raw_type)
        .map_err(|_| strata_err!(InvalidFormat: "unknown message type {}", raw_type))?;
    let _reserved = cursor.read::<u8>()?;
    let body_length = cursor.read::<u64>()?;

    let header = match message_type {
        MessageType::Schema => {
            MessageHeader::Schema(crate::schema::decode_schema_payload(&mut cursor, options)?)
        }
        MessageType::DictionaryBatch => {
            let id = cursor.read::<i64>()?;
            let data = crate::batch::read_batch_payload(&mut cursor)?;
            MessageHeader::DictionaryBatch(DictionaryBatchMessage { id, data })
        }
        MessageType::RecordBatch => {
            MessageHeader::RecordBatch(crate::batch::read_batch_payload(&mut cursor)?)
        }
        MessageType::Tensor => {
            MessageHeader::Tensor(crate::tensor::read_tensor_payload(&mut cursor)?)
        }
    };

    Ok(Message {
        version,
        header,
        body_length,
    })
}
