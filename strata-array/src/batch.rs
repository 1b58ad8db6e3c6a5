use std::sync::Arc;

use itertools::Itertools;
use strata_error::{StrataResult, strata_bail};

use crate::field::{Schema, SchemaRef};
use crate::{ArrayData, ArrayRef};

/// A columnar chunk of rows: one array per schema field, all of equal
/// length.
///
/// Batches are immutable; [`RecordBatch::slice`] produces a lightweight
/// view sharing the underlying buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    schema: SchemaRef,
    num_rows: usize,
    columns: Vec<ArrayRef>,
}

impl RecordBatch {
    /// Create a batch, validating that every column matches its field's
    /// type and the batch row count.
    pub fn try_new(
        schema: SchemaRef,
        num_rows: usize,
        columns: Vec<ArrayRef>,
    ) -> StrataResult<Self> {
        if columns.len() != schema.num_fields() {
            strata_bail!(
                "batch has {} columns for a schema of {} fields",
                columns.len(),
                schema.num_fields()
            );
        }
        for (field, column) in schema.fields().iter().zip_eq(columns.iter()) {
            if column.len() != num_rows {
                strata_bail!(
                    "column {} has length {}, expected the batch row count {}",
                    field.name(),
                    column.len(),
                    num_rows
                );
            }
            if column.dtype() != field.dtype() {
                strata_bail!(
                    "column {} has type {}, expected {}",
                    field.name(),
                    column.dtype(),
                    field.dtype()
                );
            }
            if !field.nullable() && column.null_count() > 0 {
                strata_bail!(
                    "column {} has {} nulls but its field is non-nullable",
                    field.name(),
                    column.null_count()
                );
            }
        }
        Ok(Self {
            schema,
            num_rows,
            columns,
        })
    }

    /// Build a batch from named columns, deriving the schema.
    pub fn from_columns(columns: Vec<(&str, ArrayRef)>) -> StrataResult<Self> {
        let num_rows = columns.first().map(|(_, c)| c.len()).unwrap_or_default();
        let schema = Arc::new(Schema::new(columns.iter().map(|(name, column)| {
            crate::Field::new(*name, column.dtype().clone(), true)
        })));
        Self::try_new(schema, num_rows, columns.into_iter().map(|(_, c)| c).collect())
    }

    /// The batch's schema.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// The number of rows.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// The number of columns.
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// The columns, in schema order.
    pub fn columns(&self) -> &[ArrayRef] {
        &self.columns
    }

    /// The column at position `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds.
    pub fn column(&self, idx: usize) -> &ArrayRef {
        &self.columns[idx]
    }

    /// A zero-copy view over rows `[offset, offset + len)`.
    ///
    /// # Panics
    ///
    /// Panics if the range exceeds the batch's row count.
    pub fn slice(&self, offset: usize, len: usize) -> Self {
        Self {
            schema: self.schema.clone(),
            num_rows: len,
            columns: self
                .columns
                .iter()
                .map(|column| column.slice(offset, len))
                .collect(),
        }
    }
}
