use bytes::Bytes;
use strata_array::{ArrayRef, RecordBatch, Schema, Tensor};
use strata_buffer::ByteBuffer;
use strata_error::{StrataExpect, StrataResult, strata_bail};

use crate::dictionary::DictionaryMemo;
use crate::messages::{CURRENT_VERSION, MessageType};
use crate::wire::put;
use crate::{ALIGNMENT, WriteOptions};

/// Encodes messages into sequences of buffers ready to be written
/// contiguously to a byte sink.
///
/// Each returned sequence is laid out as: the 4-byte metadata length
/// prefix, the padded metadata section, then the body's data segments with
/// their alignment padding. No body assembly happens — large data buffers
/// are passed through by reference count, not copied.
pub struct MessageEncoder {
    /// A reusable buffer of zeros used for padding.
    zeros: Bytes,
}

impl Default for MessageEncoder {
    fn default() -> Self {
        Self {
            zeros: Bytes::from_static(&[0u8; ALIGNMENT]),
        }
    }
}

impl MessageEncoder {
    /// Encode a schema message, assigning dictionary ids through `memo`.
    pub fn encode_schema(
        &mut self,
        schema: &Schema,
        memo: &mut DictionaryMemo,
        options: &WriteOptions,
    ) -> StrataResult<Vec<Bytes>> {
        let payload = crate::schema::encode_schema(schema, memo, options)?;
        Ok(self.finish(MessageType::Schema, payload, 0, vec![]))
    }

    /// Encode a record batch message.
    pub fn encode_batch_message(
        &mut self,
        batch: &RecordBatch,
        options: &WriteOptions,
    ) -> StrataResult<Vec<Bytes>> {
        let encoded = crate::batch::encode_batch(batch, options)?;
        let mut payload = Vec::new();
        crate::batch::write_batch_payload(&mut payload, &encoded.message);
        Ok(self.finish(
            MessageType::RecordBatch,
            payload,
            encoded.body_length,
            encoded.segments,
        ))
    }

    /// Encode a dictionary payload message.
    pub fn encode_dictionary_message(
        &mut self,
        id: i64,
        values: &ArrayRef,
        options: &WriteOptions,
    ) -> StrataResult<Vec<Bytes>> {
        let (message, encoded) = crate::dictionary::encode_dictionary(id, values, options)?;
        let mut payload = Vec::new();
        put(&mut payload, message.id);
        crate::batch::write_batch_payload(&mut payload, &message.data);
        Ok(self.finish(
            MessageType::DictionaryBatch,
            payload,
            encoded.body_length,
            encoded.segments,
        ))
    }

    /// Encode a tensor message. Only contiguous tensors are serializable.
    pub fn encode_tensor_message(&mut self, tensor: &Tensor) -> StrataResult<Vec<Bytes>> {
        if !tensor.is_contiguous() {
            strata_bail!(
                UnsupportedLayout: "tensor strides {:?} are not contiguous for shape {:?}; materialize a contiguous copy before encoding",
                tensor.strides(),
                tensor.shape()
            );
        }
        let mut payload = Vec::new();
        crate::tensor::write_tensor_payload(&mut payload, tensor);
        let body_length = (tensor.data().len() as u64).next_multiple_of(ALIGNMENT as u64);
        Ok(self.finish(
            MessageType::Tensor,
            payload,
            body_length,
            vec![tensor.data().clone()],
        ))
    }

    /// The end-of-stream marker: a message with zero-length metadata.
    pub fn encode_eos(&self) -> Vec<Bytes> {
        vec![Bytes::from_static(&[0u8; 4])]
    }

    /// Assemble the envelope: length prefix, padded metadata, padded body
    /// segments.
    fn finish(
        &mut self,
        message_type: MessageType,
        payload: Vec<u8>,
        body_length: u64,
        segments: Vec<ByteBuffer>,
    ) -> Vec<Bytes> {
        let mut metadata = Vec::with_capacity(payload.len() + 16);
        put(&mut metadata, u16::from(CURRENT_VERSION));
        put(&mut metadata, u8::from(message_type));
        put(&mut metadata, 0u8);
        put(&mut metadata, body_length);
        metadata.extend_from_slice(&payload);

        // Pad so the body starts 8-byte aligned: (4 + metadata) % 8 == 0.
        let unpadded = 4 + metadata.len();
        metadata.resize(metadata.len() + (unpadded.next_multiple_of(ALIGNMENT) - unpadded), 0);

        let metadata_length =
            u32::try_from(metadata.len()).strata_expect("metadata section fits in u32");

        let mut buffers = Vec::with_capacity(2 + 2 * segments.len());
        buffers.push(Bytes::copy_from_slice(&metadata_length.to_le_bytes()));
        buffers.push(Bytes::from(metadata));
        for segment in segments {
            let padding = segment.len().next_multiple_of(ALIGNMENT) - segment.len();
            buffers.push(segment.into_inner());
            if padding > 0 {
                buffers.push(self.zeros.slice(0..padding));
            }
        }
        buffers
    }
}
