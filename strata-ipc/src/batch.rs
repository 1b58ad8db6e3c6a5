//! The record-batch codec.
//!
//! Encoding flattens a batch's columns in pre-order: one [`FieldNode`] per
//! array in the tree, and one [`BufferRef`] per physical buffer, with every
//! buffer placed at an 8-byte-aligned offset in a single logical body.
//! Views are materialized on the way out — validity and boolean bitmaps are
//! re-packed from the view offset with trailing bits zeroed, and
//! variable-length offsets are rebased to start at zero — so a sliced batch
//! encodes bit-identically to the equivalent materialized batch.
//!
//! Decoding walks the schema's type tree against the node and buffer
//! tables, producing arrays whose buffers are zero-copy views into the
//! caller-supplied body. Both directions thread an explicit depth counter
//! through every recursive step; the decoder enforces the *reader's* bound
//! regardless of what the writer used.

use itertools::Itertools;
use strata_array::{ArrayData, ArrayRef, DataType, Field, RecordBatch, SchemaRef, UnionMode, bitmap};
use strata_buffer::ByteBuffer;
use strata_error::{StrataExpect, StrataResult, strata_bail, strata_err};

use crate::wire::{WireCursor, put};
use crate::{ALIGNMENT, ReadOptions, WriteOptions, check_depth};

/// Per-array metadata: logical length and null count, in pre-order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldNode {
    /// The array's logical length.
    pub length: u64,
    /// The array's null count.
    pub null_count: u64,
}

/// The location of one buffer within a message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRef {
    /// Byte offset from the start of the body; always 8-byte aligned.
    pub offset: u64,
    /// Buffer length in bytes, excluding alignment padding.
    pub length: u64,
}

/// The decoded metadata of a RecordBatch message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordBatchMessage {
    /// The batch row count.
    pub num_rows: u64,
    /// Field nodes, one per array in pre-order.
    pub nodes: Vec<FieldNode>,
    /// Buffer locations, one per physical buffer in pre-order.
    pub buffers: Vec<BufferRef>,
}

/// An encoded batch: wire metadata plus the data segments that make up the
/// body.
#[derive(Debug)]
pub struct EncodedBatch {
    /// The batch metadata to embed in a message.
    pub message: RecordBatchMessage,
    /// Total body length, including alignment padding; a multiple of 8.
    pub body_length: u64,
    pub(crate) segments: Vec<ByteBuffer>,
}

/// Accumulates buffers into a logical body, assigning aligned offsets.
#[derive(Default)]
struct BodyBuilder {
    refs: Vec<BufferRef>,
    segments: Vec<ByteBuffer>,
    cursor: u64,
}

impl BodyBuilder {
    fn push(&mut self, buffer: ByteBuffer) {
        let length = buffer.len() as u64;
        self.refs.push(BufferRef {
            offset: self.cursor,
            length,
        });
        self.segments.push(buffer);
        self.cursor = (self.cursor + length).next_multiple_of(ALIGNMENT as u64);
    }
}

/// Flatten a batch into wire metadata and body segments.
///
/// Unless [`WriteOptions::allow_64bit`] is set, fails with
/// `UnsupportedLayout` when the row count or any buffer length exceeds the
/// 32-bit range.
pub fn encode_batch(batch: &RecordBatch, options: &WriteOptions) -> StrataResult<EncodedBatch> {
    encode_columns(batch.columns(), batch.num_rows(), options)
}

pub(crate) fn encode_columns(
    columns: &[ArrayRef],
    num_rows: usize,
    options: &WriteOptions,
) -> StrataResult<EncodedBatch> {
    let mut nodes = Vec::new();
    let mut body = BodyBuilder::default();
    for column in columns {
        flatten_array(column, &mut nodes, &mut body, 0, options.max_depth)?;
    }

    let message = RecordBatchMessage {
        num_rows: num_rows as u64,
        nodes,
        buffers: body.refs,
    };

    if !options.allow_64bit {
        check_32bit_layout(&message)?;
    }

    Ok(EncodedBatch {
        message,
        body_length: body.cursor,
        segments: body.segments,
    })
}

/// The single-shot path cannot represent batches whose row count or buffer
/// lengths exceed the 32-bit range.
pub(crate) fn check_32bit_layout(message: &RecordBatchMessage) -> StrataResult<()> {
    if message.num_rows > i32::MAX as u64 {
        strata_bail!(
            UnsupportedLayout: "batch of {} rows exceeds the 32-bit layout; only the File writer's large-batch mode supports it",
            message.num_rows
        );
    }
    if let Some(oversized) = message.buffers.iter().find(|b| b.length > i32::MAX as u64) {
        strata_bail!(
            UnsupportedLayout: "buffer of {} bytes exceeds the 32-bit layout; only the File writer's large-batch mode supports it",
            oversized.length
        );
    }
    Ok(())
}

fn flatten_array(
    array: &ArrayData,
    nodes: &mut Vec<FieldNode>,
    body: &mut BodyBuilder,
    depth: usize,
    limit: usize,
) -> StrataResult<()> {
    check_depth(depth, limit)?;

    nodes.push(FieldNode {
        length: array.len() as u64,
        null_count: array.null_count() as u64,
    });
    body.push(packed_validity(array));

    match array.dtype() {
        DataType::Bool => {
            body.push(packed_bits(&array.buffers()[0], array.offset(), array.len()));
        }
        DataType::Primitive(ptype) => {
            body.push(sliced_fixed(array, ptype.byte_width()));
        }
        DataType::FixedSizeBinary(width) => {
            body.push(sliced_fixed(array, *width as usize));
        }
        DataType::Utf8 | DataType::Binary => {
            let (offsets, start, end) = rebased_offsets(array);
            body.push(offsets);
            body.push(array.buffers()[1].slice(start..end));
        }
        DataType::List(_) => {
            let (offsets, start, end) = rebased_offsets(array);
            body.push(offsets);
            let items = array.children()[0].slice(start, end - start);
            flatten_array(&items, nodes, body, depth + 1, limit)?;
        }
        DataType::Struct(_) => {
            for child in array.children() {
                flatten_array(child, nodes, body, depth + 1, limit)?;
            }
        }
        DataType::Union(mode, _) => {
            let offset = array.offset();
            let len = array.len();
            body.push(array.buffers()[0].slice(offset..offset + len));
            if *mode == UnionMode::Dense {
                body.push(array.buffers()[1].slice(offset * 4..(offset + len) * 4));
            }
            for child in array.children() {
                flatten_array(child, nodes, body, depth + 1, limit)?;
            }
        }
        DataType::Dictionary(dict) => {
            body.push(sliced_fixed(array, dict.index_type().byte_width()));
        }
    }
    Ok(())
}

/// The canonical validity buffer of a view: absent when no slot is null.
fn packed_validity(array: &ArrayData) -> ByteBuffer {
    if array.null_count() == 0 {
        return ByteBuffer::empty();
    }
    // null_count > 0 implies a bitmap; ArrayData enforces this.
    let Some(bitmap) = array.validity() else {
        strata_error::strata_panic!(
            "array with {} nulls has no validity bitmap",
            array.null_count()
        )
    };
    packed_bits(bitmap, array.offset(), array.len())
}

fn packed_bits(bitmap: &ByteBuffer, offset: usize, len: usize) -> ByteBuffer {
    if len == 0 {
        return ByteBuffer::empty();
    }
    if offset == 0 && len % 8 == 0 {
        // Already canonical: whole bytes, no trailing bits to zero.
        return bitmap.slice(0..len / 8);
    }
    ByteBuffer::from(bitmap::pack_slice(bitmap.as_slice(), offset, len))
}

fn sliced_fixed(array: &ArrayData, width: usize) -> ByteBuffer {
    array.buffers()[0].slice(array.offset() * width..(array.offset() + array.len()) * width)
}

/// The offsets buffer of a view, rebased to start at zero, along with the
/// referenced values range. Zero-copy when the view is already rebased.
fn rebased_offsets(array: &ArrayData) -> (ByteBuffer, usize, usize) {
    if array.is_empty() {
        return (ByteBuffer::empty(), 0, 0);
    }
    let offsets = &array.buffers()[0];
    let start = offsets.get_le::<i32>(array.offset()) as usize;
    let end = offsets.get_le::<i32>(array.offset() + array.len()) as usize;
    if array.offset() == 0 && start == 0 {
        return (offsets.slice(0..(array.len() + 1) * 4), 0, end);
    }
    let rebased = (0..=array.len())
        .map(|i| offsets.get_le::<i32>(array.offset() + i) - start as i32)
        .collect::<Vec<_>>();
    (ByteBuffer::copy_from_typed(&rebased), start, end)
}

impl EncodedBatch {
    /// Assemble the body into one contiguous buffer, padding included.
    pub fn body(&self) -> ByteBuffer {
        let mut out = Vec::with_capacity(usize::try_from(self.body_length).unwrap_or(0));
        for segment in &self.segments {
            out.extend_from_slice(segment.as_slice());
            let padded = out.len().next_multiple_of(ALIGNMENT);
            out.resize(padded, 0);
        }
        ByteBuffer::from(out)
    }
}

pub(crate) fn write_batch_payload(out: &mut Vec<u8>, message: &RecordBatchMessage) {
    put(out, message.num_rows);
    put(
        out,
        u32::try_from(message.nodes.len()).strata_expect("node count fits in u32"),
    );
    for node in &message.nodes {
        put(out, node.length);
        put(out, node.null_count);
    }
    put(
        out,
        u32::try_from(message.buffers.len()).strata_expect("buffer count fits in u32"),
    );
    for buffer in &message.buffers {
        put(out, buffer.offset);
        put(out, buffer.length);
    }
}

pub(crate) fn read_batch_payload(cursor: &mut WireCursor<'_>) -> StrataResult<RecordBatchMessage> {
    let num_rows = cursor.read::<u64>()?;
    let node_count = cursor.read::<u32>()?;
    let nodes = (0..node_count)
        .map(|_| {
            Ok(FieldNode {
                length: cursor.read::<u64>()?,
                null_count: cursor.read::<u64>()?,
            })
        })
        .collect::<StrataResult<Vec<_>>>()?;
    let buffer_count = cursor.read::<u32>()?;
    let buffers = (0..buffer_count)
        .map(|_| {
            Ok(BufferRef {
                offset: cursor.read::<u64>()?,
                length: cursor.read::<u64>()?,
            })
        })
        .collect::<StrataResult<Vec<_>>>()?;
    Ok(RecordBatchMessage {
        num_rows,
        nodes,
        buffers,
    })
}

/// Reconstruct a batch from its metadata and body, producing zero-copy
/// views into `body`.
pub fn decode_batch(
    message: &RecordBatchMessage,
    schema: &SchemaRef,
    body: ByteBuffer,
    options: &ReadOptions,
) -> StrataResult<RecordBatch> {
    let mut walker = BodyWalker {
        nodes: message.nodes.iter(),
        buffers: message.buffers.iter(),
        body,
    };
    let columns: Vec<_> = schema
        .fields()
        .iter()
        .map(|field| walker.read_array(field, 0, options.max_depth))
        .try_collect()?;
    if walker.nodes.next().is_some() || walker.buffers.next().is_some() {
        strata_bail!(InvalidFormat: "batch metadata has unconsumed field nodes or buffers");
    }
    let num_rows = usize::try_from(message.num_rows)
        .map_err(|_| strata_err!(InvalidFormat: "row count {} overflows usize", message.num_rows))?;
    RecordBatch::try_new(schema.clone(), num_rows, columns)
        .map_err(|e| strata_err!(InvalidFormat: "decoded batch is inconsistent: {}", e))
}

/// Decode a single array (used for dictionary payloads).
pub(crate) fn decode_array(
    message: &RecordBatchMessage,
    field: &Field,
    body: ByteBuffer,
    options: &ReadOptions,
) -> StrataResult<ArrayRef> {
    let mut walker = BodyWalker {
        nodes: message.nodes.iter(),
        buffers: message.buffers.iter(),
        body,
    };
    let array = walker.read_array(field, 0, options.max_depth)?;
    if walker.nodes.next().is_some() || walker.buffers.next().is_some() {
        strata_bail!(InvalidFormat: "array metadata has unconsumed field nodes or buffers");
    }
    Ok(array)
}

struct BodyWalker<'a> {
    nodes: std::slice::Iter<'a, FieldNode>,
    buffers: std::slice::Iter<'a, BufferRef>,
    body: ByteBuffer,
}

impl BodyWalker<'_> {
    fn next_node(&mut self) -> StrataResult<FieldNode> {
        self.nodes
            .next()
            .copied()
            .ok_or_else(|| strata_err!(InvalidFormat: "batch metadata is missing a field node"))
    }

    fn next_buffer(&mut self) -> StrataResult<ByteBuffer> {
        let buffer = self
            .buffers
            .next()
            .ok_or_else(|| strata_err!(InvalidFormat: "batch metadata is missing a buffer"))?;
        let end = buffer.offset.checked_add(buffer.length).ok_or_else(
            || strata_err!(InvalidFormat: "buffer range overflows: offset {}", buffer.offset),
        )?;
        if end > self.body.len() as u64 {
            strata_bail!(
                InvalidFormat: "buffer [{}, {}) is out of bounds for a {}-byte body",
                buffer.offset,
                end,
                self.body.len()
            );
        }
        let offset = usize::try_from(buffer.offset)
            .map_err(|_| strata_err!(InvalidFormat: "buffer offset overflows usize"))?;
        let length = usize::try_from(buffer.length)
            .map_err(|_| strata_err!(InvalidFormat: "buffer length overflows usize"))?;
        Ok(self.body.slice(offset..offset + length))
    }

    fn read_array(&mut self, field: &Field, depth: usize, limit: usize) -> StrataResult<ArrayRef> {
        check_depth(depth, limit)?;

        let node = self.next_node()?;
        let len = usize::try_from(node.length)
            .map_err(|_| strata_err!(InvalidFormat: "array length {} overflows usize", node.length))?;

        let validity_buffer = self.next_buffer()?;
        let validity = if validity_buffer.is_empty() {
            None
        } else {
            Some(validity_buffer)
        };

        let mut buffers = Vec::new();
        let mut children = Vec::new();
        match field.dtype() {
            DataType::Bool
            | DataType::Primitive(_)
            | DataType::FixedSizeBinary(_)
            | DataType::Dictionary(_) => {
                buffers.push(self.next_buffer()?);
            }
            DataType::Utf8 | DataType::Binary => {
                buffers.push(self.next_buffer()?);
                buffers.push(self.next_buffer()?);
            }
            DataType::List(item) => {
                buffers.push(self.next_buffer()?);
                children.push(self.read_array(item, depth + 1, limit)?);
            }
            DataType::Struct(fields) => {
                for child in fields.iter() {
                    children.push(self.read_array(child, depth + 1, limit)?);
                }
            }
            DataType::Union(mode, variants) => {
                buffers.push(self.next_buffer()?);
                if *mode == UnionMode::Dense {
                    buffers.push(self.next_buffer()?);
                }
                for (_, child) in variants.iter() {
                    children.push(self.read_array(child, depth + 1, limit)?);
                }
            }
        }

        let array = ArrayData::try_new(field.dtype().clone(), len, 0, validity, buffers, children)
            .map_err(
                |e| strata_err!(InvalidFormat: "invalid {} column {}: {}", field.dtype(), field.name(), e),
            )?;
        if array.null_count() as u64 != node.null_count {
            strata_bail!(
                InvalidFormat: "column {} declares {} nulls but its bitmap holds {}",
                field.name(),
                node.null_count,
                array.null_count()
            );
        }
        Ok(array)
    }
}

/// The exact on-wire size of the message [`encode_batch`] would produce:
/// length prefix, padded metadata, and padded body.
pub fn get_batch_size(batch: &RecordBatch) -> StrataResult<u64> {
    let mut encoder = crate::messages::MessageEncoder::default();
    let buffers = encoder.encode_batch_message(batch, &WriteOptions::default())?;
    Ok(buffers.iter().map(|b| b.len() as u64).sum())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use strata_array::Schema;

    use super::*;

    fn round_trip(batch: &RecordBatch) -> RecordBatch {
        let encoded = encode_batch(batch, &WriteOptions::default()).unwrap();
        decode_batch(
            &encoded.message,
            batch.schema(),
            encoded.body(),
            &ReadOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn buffers_are_aligned_in_the_body() {
        let batch = RecordBatch::from_columns(vec![
            ("a", ArrayData::primitive::<u8>(&[1, 2, 3])),
            ("b", ArrayData::primitive::<i64>(&[4, 5, 6])),
        ])
        .unwrap();
        let encoded = encode_batch(&batch, &WriteOptions::default()).unwrap();
        for buffer in &encoded.message.buffers {
            assert_eq!(buffer.offset % 8, 0);
        }
        assert_eq!(encoded.body_length % 8, 0);
        assert_eq!(encoded.body().len() as u64, encoded.body_length);
    }

    #[test]
    fn sliced_batch_encodes_identically_to_materialized() {
        let child = ArrayData::primitive::<i32>(&[1, 2, 3, 4, 5, 6, 7]);
        let lists = ArrayData::list(
            child,
            &[0, 3, 3, 5, 7],
            Some(&[true, false, true, true]),
        )
        .unwrap();
        let strings = ArrayData::utf8(&[Some("aa"), None, Some("bcd"), Some("e")]);
        let batch = RecordBatch::from_columns(vec![("l", lists), ("s", strings)]).unwrap();

        let sliced = batch.slice(1, 2);
        let materialized = round_trip(&sliced);

        let encode = |b: &RecordBatch| {
            let e = encode_batch(b, &WriteOptions::default()).unwrap();
            let body = e.body().as_slice().to_vec();
            (e.message, body)
        };
        assert_eq!(encode(&sliced), encode(&materialized));
        assert_eq!(sliced, materialized);
    }

    #[test]
    fn zero_row_batch_round_trips_with_absent_buffers() {
        let strings = ArrayData::utf8(&[]);
        let batch = RecordBatch::from_columns(vec![("s", strings)]).unwrap();
        let encoded = encode_batch(&batch, &WriteOptions::default()).unwrap();
        // Validity, offsets and values are all absent.
        assert!(encoded.message.buffers.iter().all(|b| b.length == 0));
        assert_eq!(round_trip(&batch), batch);
    }

    #[test]
    fn oversized_layouts_require_the_64bit_path() {
        // Fabricated metadata stands in for a 2^31-row batch; the check
        // runs against metadata, not materialized data.
        let oversized_rows = RecordBatchMessage {
            num_rows: i32::MAX as u64 + 1,
            nodes: vec![],
            buffers: vec![],
        };
        let err = check_32bit_layout(&oversized_rows).unwrap_err();
        assert!(matches!(
            err,
            strata_error::StrataError::UnsupportedLayout(_)
        ));
        assert!(err.to_string().contains("2147483648 rows"));

        let oversized_buffer = RecordBatchMessage {
            num_rows: 1,
            nodes: vec![],
            buffers: vec![BufferRef {
                offset: 0,
                length: i32::MAX as u64 + 8,
            }],
        };
        assert!(check_32bit_layout(&oversized_buffer).is_err());

        let at_the_edge = RecordBatchMessage {
            num_rows: i32::MAX as u64,
            nodes: vec![],
            buffers: vec![],
        };
        assert!(check_32bit_layout(&at_the_edge).is_ok());
    }

    #[test]
    fn depth_is_enforced_on_decode_even_for_shallow_limits() {
        let child = ArrayData::primitive::<i32>(&[1, 2]);
        let lists = ArrayData::list(child, &[0, 1, 2], None).unwrap();
        let outer = ArrayData::list(lists, &[0, 2], None).unwrap();
        let batch = RecordBatch::from_columns(vec![("l", outer)]).unwrap();

        let encoded = encode_batch(&batch, &WriteOptions::default()).unwrap();
        let err = decode_batch(
            &encoded.message,
            batch.schema(),
            encoded.body(),
            &ReadOptions::with_max_depth(1),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            strata_error::StrataError::RecursionLimitExceeded { depth: 2, limit: 1 }
        ));
    }

    #[test]
    fn corrupt_buffer_ranges_are_rejected() {
        let batch = RecordBatch::from_columns(vec![("a", ArrayData::primitive::<i32>(&[1])) ])
            .unwrap();
        let mut encoded = encode_batch(&batch, &WriteOptions::default()).unwrap();
        encoded.message.buffers[1].length = 1 << 40;
        let err = decode_batch(
            &encoded.message,
            batch.schema(),
            encoded.body(),
            &ReadOptions::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("out of bounds"));
    }

    #[test]
    fn schema_metadata_mismatch_is_rejected() {
        let batch = RecordBatch::from_columns(vec![("a", ArrayData::primitive::<i32>(&[1, 2]))])
            .unwrap();
        let encoded = encode_batch(&batch, &WriteOptions::default()).unwrap();

        // Decode against a wider schema than was written.
        let wider = Arc::new(Schema::new(
            batch
                .schema()
                .fields()
                .iter()
                .cloned()
                .chain([Field::new("extra", DataType::Bool, true)]),
        ));
        let err = decode_batch(
            &encoded.message,
            &wider,
            encoded.body(),
            &ReadOptions::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
