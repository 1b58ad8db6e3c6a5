//! Dictionary management.
//!
//! A [`DictionaryMemo`] is scoped to one write or read session. Writers
//! assign ids on first sight of a payload (by allocation identity, not
//! value equality) and emit each payload exactly once as a DictionaryBatch
//! message; readers populate the memo from those messages and resolve every
//! field referencing an id to the one registered array.

use std::collections::HashMap;
use std::sync::Arc;

use strata_array::{ArrayRef, DataType, Field};
use strata_buffer::ByteBuffer;
use strata_error::{StrataResult, strata_bail, strata_err};

use crate::batch::{EncodedBatch, RecordBatchMessage, encode_columns};
use crate::{ReadOptions, WriteOptions};

/// The decoded metadata of a DictionaryBatch message: an id plus the
/// payload array encoded exactly like a one-column batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryBatchMessage {
    /// The id this payload is registered under.
    pub id: i64,
    /// The payload array's metadata.
    pub data: RecordBatchMessage,
}

/// An id-keyed registry of dictionary payloads, scoped to one session.
#[derive(Debug, Default)]
pub struct DictionaryMemo {
    by_id: HashMap<i64, ArrayRef>,
    order: Vec<i64>,
    identities: HashMap<usize, i64>,
    next_id: i64,
}

impl DictionaryMemo {
    /// A fresh memo for a new session.
    pub fn new() -> Self {
        Self::default()
    }

    /// The id of `values`, assigning the next unused id on first sight.
    /// Returns whether the id was newly assigned.
    ///
    /// Identity is the payload allocation: two equal-valued but separately
    /// allocated arrays get distinct ids.
    pub fn get_or_assign(&mut self, values: &ArrayRef) -> (i64, bool) {
        let identity = Arc::as_ptr(values) as usize;
        if let Some(id) = self.identities.get(&identity) {
            return (*id, false);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.identities.insert(identity, id);
        self.by_id.insert(id, values.clone());
        self.order.push(id);
        (id, true)
    }

    /// Register a decoded payload under `id`.
    ///
    /// Duplicate registration is malformed input: writers never re-emit an
    /// id, and replacement dictionaries are not part of the format.
    pub fn register(&mut self, id: i64, values: ArrayRef) -> StrataResult<()> {
        if self.by_id.contains_key(&id) {
            strata_bail!(InvalidFormat: "dictionary id {} registered twice", id);
        }
        log::debug!("registered dictionary id {} ({} values)", id, values.len());
        self.identities.insert(Arc::as_ptr(&values) as usize, id);
        self.by_id.insert(id, values);
        self.order.push(id);
        Ok(())
    }

    /// The payload registered under `id`. Referencing an unregistered id
    /// is fatal.
    pub fn lookup(&self, id: i64) -> StrataResult<&ArrayRef> {
        self.by_id
            .get(&id)
            .ok_or_else(|| strata_err!(InvalidFormat: "dictionary id {} is not registered", id))
    }

    /// The registered ids, in assignment order.
    pub fn ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.order.iter().copied()
    }

    /// The registered payloads, in assignment order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, &ArrayRef)> + '_ {
        self.order.iter().map(|id| {
            let Some(values) = self.by_id.get(id) else {
                strata_error::strata_panic!("memo order out of sync for id {}", id)
            };
            (*id, values)
        })
    }

    /// The number of registered payloads.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no payload is registered.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Encode one dictionary payload for emission.
pub fn encode_dictionary(
    id: i64,
    values: &ArrayRef,
    options: &WriteOptions,
) -> StrataResult<(DictionaryBatchMessage, EncodedBatch)> {
    let encoded = encode_columns(std::slice::from_ref(values), values.len(), options)?;
    let message = DictionaryBatchMessage {
        id,
        data: encoded.message.clone(),
    };
    Ok((message, encoded))
}

/// Decode a dictionary payload against the value type its schema declared.
pub fn decode_dictionary(
    message: &DictionaryBatchMessage,
    value_dtype: &DataType,
    body: ByteBuffer,
    options: &ReadOptions,
) -> StrataResult<ArrayRef> {
    let field = Field::new("", value_dtype.clone(), true);
    crate::batch::decode_array(&message.data, &field, body, options)
}
