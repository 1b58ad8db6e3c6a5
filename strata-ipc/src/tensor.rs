//! The tensor codec.
//!
//! Tensors are simpler than batches: one fixed-shape dense buffer and a
//! descriptor. Only fully-contiguous row-major tensors are serializable;
//! strided views must be materialized by the caller first.

use strata_array::{PType, Tensor};
use strata_error::{StrataExpect, StrataResult, strata_bail, strata_err};
use strata_io::ReadAt;

use crate::messages::{MessageHeader, read_message_at};
use crate::wire::{WireCursor, put, put_string};
use crate::ReadOptions;

/// The decoded metadata of a Tensor message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorMessage {
    /// The element type.
    pub ptype: PType,
    /// Dimension sizes, outermost first.
    pub shape: Vec<u64>,
    /// Byte strides; empty means row-major.
    pub strides: Vec<u64>,
    /// Dimension names; empty means unnamed.
    pub dim_names: Vec<String>,
}

pub(crate) fn write_tensor_payload(out: &mut Vec<u8>, tensor: &Tensor) {
    put(out, u8::from(tensor.ptype()));
    let ndim = u32::try_from(tensor.shape().len()).strata_expect("dimension count fits in u32");
    put(out, ndim);
    for dim in tensor.shape() {
        put(out, *dim);
    }
    let nstrides =
        u32::try_from(tensor.strides().len()).strata_expect("stride count fits in u32");
    put(out, nstrides);
    for stride in tensor.strides() {
        put(out, *stride);
    }
    let nnames =
        u32::try_from(tensor.dim_names().len()).strata_expect("name count fits in u32");
    put(out, nnames);
    for name in tensor.dim_names() {
        put_string(out, name);
    }
}

pub(crate) fn read_tensor_payload(cursor: &mut WireCursor<'_>) -> StrataResult<TensorMessage> {
    let raw_ptype = cursor.read::<u8>()?;
    let ptype = PType::try_from(raw_ptype)
        .map_err(|_| strata_err!(InvalidFormat: "unknown tensor element type {}", raw_ptype))?;

    let ndim = cursor.read::<u32>()?;
    let shape = (0..ndim)
        .map(|_| cursor.read::<u64>())
        .collect::<StrataResult<Vec<_>>>()?;

    let nstrides = cursor.read::<u32>()?;
    let strides = (0..nstrides)
        .map(|_| cursor.read::<u64>())
        .collect::<StrataResult<Vec<_>>>()?;

    let nnames = cursor.read::<u32>()?;
    let dim_names = (0..nnames)
        .map(|_| cursor.read_string())
        .collect::<StrataResult<Vec<_>>>()?;

    Ok(TensorMessage {
        ptype,
        shape,
        strides,
        dim_names,
    })
}

/// Decode a tensor from its message and body, exposing a zero-copy view
/// over the body source.
pub fn decode_tensor(
    message: &TensorMessage,
    body: strata_buffer::ByteBuffer,
) -> StrataResult<Tensor> {
    let elements = message.shape.iter().product::<u64>();
    let data_length = usize::try_from(elements * message.ptype.byte_width() as u64)
        .map_err(|_| strata_err!(InvalidFormat: "tensor data length overflows usize"))?;
    if body.len() < data_length {
        strata_bail!(
            InvalidFormat: "tensor body of {} bytes cannot hold {} elements of {}",
            body.len(),
            elements,
            message.ptype
        );
    }
    Tensor::try_new(
        message.ptype,
        message.shape.clone(),
        message.strides.clone(),
        message.dim_names.clone(),
        body.slice(0..data_length),
    )
    .map_err(|e| strata_err!(InvalidFormat: "invalid tensor descriptor: {}", e))
}

/// Read the tensor message stored at `offset` in a random-access source.
pub fn read_tensor(source: &impl ReadAt, offset: u64) -> StrataResult<Tensor> {
    let (message, body) = read_message_at(source, offset, &ReadOptions::default())?;
    let MessageHeader::Tensor(tensor_message) = &message.header else {
        strata_bail!(
            InvalidFormat: "expected a tensor message at offset {}, found {:?}",
            offset,
            message.message_type()
        );
    };
    decode_tensor(tensor_message, body)
}
