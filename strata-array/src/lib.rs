//! In-memory columnar data for Strata: schemas, arrays, record batches and
//! tensors.
//!
//! These are the structures the IPC codec serializes. Arrays are immutable
//! buffer-backed views — slicing an array or a batch shares the underlying
//! [`ByteBuffer`](strata_buffer::ByteBuffer)s rather than copying them, and
//! arrays decoded from a message body keep the body alive through the same
//! shared ownership.
//!
//! Dictionary-encoded types carry their payload inside the type (see
//! [`DictionaryType`]); fields that hold clones of one `Arc<DictionaryType>`
//! share a single payload allocation, which the IPC layer uses to emit each
//! distinct dictionary exactly once per session.

mod array;
mod batch;
pub mod bitmap;
mod construct;
mod dtype;
mod equal;
mod field;
mod tensor;

pub use array::{ArrayData, ArrayRef};
pub use batch::RecordBatch;
pub use dtype::{DataType, DictionaryType, NativePType, PType, UnionMode};
pub use field::{Field, FieldName, Schema, SchemaRef};
pub use tensor::Tensor;
