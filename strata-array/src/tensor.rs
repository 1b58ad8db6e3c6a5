use strata_buffer::ByteBuffer;
use strata_error::{StrataResult, strata_bail};

use crate::dtype::PType;

/// A dense n-dimensional array of one primitive type over a single
/// contiguous buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    ptype: PType,
    shape: Vec<u64>,
    strides: Vec<u64>,
    dim_names: Vec<String>,
    data: ByteBuffer,
}

impl Tensor {
    /// Create a tensor.
    ///
    /// `strides` are in bytes; an empty `strides` means the canonical
    /// row-major layout. `dim_names` must be empty (unnamed) or name every
    /// dimension. The data buffer must hold exactly the number of elements
    /// the shape describes.
    pub fn try_new(
        ptype: PType,
        shape: Vec<u64>,
        strides: Vec<u64>,
        dim_names: Vec<String>,
        data: ByteBuffer,
    ) -> StrataResult<Self> {
        if !strides.is_empty() && strides.len() != shape.len() {
            strata_bail!(
                "{} strides for a {}-dimensional shape",
                strides.len(),
                shape.len()
            );
        }
        if !dim_names.is_empty() && dim_names.len() != shape.len() {
            strata_bail!(
                "{} dimension names for a {}-dimensional shape",
                dim_names.len(),
                shape.len()
            );
        }
        let tensor = Self {
            ptype,
            shape,
            strides,
            dim_names,
            data,
        };
        if tensor.is_contiguous() {
            let expected = tensor.num_elements() * tensor.ptype.byte_width() as u64;
            if tensor.data.len() as u64 != expected {
                strata_bail!(
                    "tensor data has {} bytes, shape requires {}",
                    tensor.data.len(),
                    expected
                );
            }
        } else {
            // Strided views may address a larger backing buffer; require
            // only that the furthest element is in bounds.
            let span = tensor
                .shape
                .iter()
                .zip(tensor.strides.iter())
                .map(|(dim, stride)| dim.saturating_sub(1) * stride)
                .sum::<u64>()
                + tensor.ptype.byte_width() as u64;
            if (tensor.data.len() as u64) < span {
                strata_bail!(
                    "tensor data has {} bytes, strides address {}",
                    tensor.data.len(),
                    span
                );
            }
        }
        Ok(tensor)
    }

    /// The element type.
    pub fn ptype(&self) -> PType {
        self.ptype
    }

    /// The dimension sizes, outermost first.
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// The byte strides; empty means row-major.
    pub fn strides(&self) -> &[u64] {
        &self.strides
    }

    /// The dimension names; empty means unnamed.
    pub fn dim_names(&self) -> &[String] {
        &self.dim_names
    }

    /// The contiguous element buffer.
    pub fn data(&self) -> &ByteBuffer {
        &self.data
    }

    /// The total number of elements (1 for a zero-dimensional tensor).
    pub fn num_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    /// The canonical row-major byte strides for this shape.
    pub fn contiguous_strides(&self) -> Vec<u64> {
        let mut strides = vec![0u64; self.shape.len()];
        let mut acc = self.ptype.byte_width() as u64;
        for (i, dim) in self.shape.iter().enumerate().rev() {
            strides[i] = acc;
            acc *= dim;
        }
        strides
    }

    /// Whether the strides describe a single fully-contiguous row-major
    /// layout. Only contiguous tensors are serializable.
    pub fn is_contiguous(&self) -> bool {
        self.strides.is_empty() || self.strides == self.contiguous_strides()
    }
}
