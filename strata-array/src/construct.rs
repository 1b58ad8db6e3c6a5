//! Convenience constructors for [`ArrayData`].

use std::sync::Arc;

use strata_buffer::ByteBuffer;
use strata_error::{StrataExpect, StrataResult, strata_bail};

use crate::bitmap;
use crate::dtype::{DataType, DictionaryType, NativePType, UnionMode};
use crate::field::Field;
use crate::{ArrayData, ArrayRef};

/// Build a canonical validity buffer: `None` when every slot is valid.
fn validity_from(valid: &[bool]) -> Option<ByteBuffer> {
    if valid.iter().all(|v| *v) {
        None
    } else {
        Some(ByteBuffer::from(bitmap::from_bools(valid)))
    }
}

impl ArrayData {
    /// A non-nullable primitive array.
    pub fn primitive<T: NativePType>(values: &[T]) -> ArrayRef {
        ArrayData::try_new(
            DataType::Primitive(T::PTYPE),
            values.len(),
            0,
            None,
            vec![ByteBuffer::copy_from_typed(values)],
            vec![],
        )
        .strata_expect("primitive arrays are valid by construction")
    }

    /// A nullable primitive array; `None` slots read as zero under the bitmap.
    pub fn primitive_nullable<T: NativePType>(values: &[Option<T>]) -> ArrayRef {
        let mut raw = Vec::with_capacity(values.len() * T::WIDTH);
        let mut valid = Vec::with_capacity(values.len());
        for value in values {
            valid.push(value.is_some());
            match value {
                Some(v) => v.write_le(&mut raw),
                None => raw.extend(std::iter::repeat_n(0u8, T::WIDTH)),
            }
        }
        ArrayData::try_new(
            DataType::Primitive(T::PTYPE),
            values.len(),
            0,
            validity_from(&valid),
            vec![ByteBuffer::from(raw)],
            vec![],
        )
        .strata_expect("primitive arrays are valid by construction")
    }

    /// A non-nullable boolean array.
    pub fn bools(values: &[bool]) -> ArrayRef {
        ArrayData::try_new(
            DataType::Bool,
            values.len(),
            0,
            None,
            vec![ByteBuffer::from(bitmap::from_bools(values))],
            vec![],
        )
        .strata_expect("bool arrays are valid by construction")
    }

    /// A nullable boolean array.
    pub fn bools_nullable(values: &[Option<bool>]) -> ArrayRef {
        let bits = values.iter().map(|v| v.unwrap_or(false)).collect::<Vec<_>>();
        let valid = values.iter().map(|v| v.is_some()).collect::<Vec<_>>();
        ArrayData::try_new(
            DataType::Bool,
            values.len(),
            0,
            validity_from(&valid),
            vec![ByteBuffer::from(bitmap::from_bools(&bits))],
            vec![],
        )
        .strata_expect("bool arrays are valid by construction")
    }

    /// A nullable UTF-8 string array.
    pub fn utf8(values: &[Option<&str>]) -> ArrayRef {
        Self::var_binary(DataType::Utf8, values.iter().map(|v| v.map(str::as_bytes)))
    }

    /// A nullable binary array.
    pub fn binary(values: &[Option<&[u8]>]) -> ArrayRef {
        Self::var_binary(DataType::Binary, values.iter().copied())
    }

    fn var_binary<'a>(
        dtype: DataType,
        values: impl ExactSizeIterator<Item = Option<&'a [u8]>>,
    ) -> ArrayRef {
        let len = values.len();
        let mut offsets = Vec::with_capacity(len + 1);
        offsets.push(0i32);
        let mut data = Vec::new();
        let mut valid = Vec::with_capacity(len);
        for value in values {
            valid.push(value.is_some());
            if let Some(bytes) = value {
                data.extend_from_slice(bytes);
            }
            let end = i32::try_from(data.len())
                .strata_expect("variable-length data exceeds the i32 offset range");
            offsets.push(end);
        }
        ArrayData::try_new(
            dtype,
            len,
            0,
            validity_from(&valid),
            vec![
                ByteBuffer::copy_from_typed(&offsets),
                ByteBuffer::from(data),
            ],
            vec![],
        )
        .strata_expect("variable-length arrays are valid by construction")
    }

    /// A nullable fixed-width binary array; every present value must have
    /// exactly `width` bytes.
    pub fn fixed_size_binary(width: u32, values: &[Option<&[u8]>]) -> StrataResult<ArrayRef> {
        let mut data = Vec::with_capacity(values.len() * width as usize);
        let mut valid = Vec::with_capacity(values.len());
        for value in values {
            valid.push(value.is_some());
            match value {
                Some(bytes) => {
                    if bytes.len() != width as usize {
                        strata_bail!(
                            "fixed-size binary value of {} bytes, expected {}",
                            bytes.len(),
                            width
                        );
                    }
                    data.extend_from_slice(bytes);
                }
                None => data.extend(std::iter::repeat_n(0u8, width as usize)),
            }
        }
        ArrayData::try_new(
            DataType::FixedSizeBinary(width),
            values.len(),
            0,
            validity_from(&valid),
            vec![ByteBuffer::from(data)],
            vec![],
        )
    }

    /// A list array over `child`, with caller-provided offsets.
    pub fn list(
        child: ArrayRef,
        offsets: &[i32],
        validity: Option<&[bool]>,
    ) -> StrataResult<ArrayRef> {
        let field = Field::new("item", child.dtype().clone(), true);
        Self::list_of(field, child, offsets, validity)
    }

    /// A list array with an explicit element field.
    pub fn list_of(
        field: Field,
        child: ArrayRef,
        offsets: &[i32],
        validity: Option<&[bool]>,
    ) -> StrataResult<ArrayRef> {
        if offsets.is_empty() {
            strata_bail!("list offsets require at least one entry");
        }
        ArrayData::try_new(
            DataType::List(Arc::new(field)),
            offsets.len() - 1,
            0,
            validity.and_then(validity_from),
            vec![ByteBuffer::copy_from_typed(offsets)],
            vec![child],
        )
    }

    /// A struct array over named children of equal length.
    pub fn struct_of(
        children: Vec<(&str, ArrayRef)>,
        validity: Option<&[bool]>,
    ) -> StrataResult<ArrayRef> {
        let len = children.first().map(|(_, c)| c.len()).unwrap_or_default();
        let fields = children
            .iter()
            .map(|(name, child)| Field::new(*name, child.dtype().clone(), true))
            .collect::<Arc<[Field]>>();
        ArrayData::try_new(
            DataType::Struct(fields),
            len,
            0,
            validity.and_then(validity_from),
            vec![],
            children.into_iter().map(|(_, c)| c).collect(),
        )
    }

    /// A sparse union: every child spans the full length, `type_ids[i]`
    /// selects the child supplying slot `i`.
    pub fn sparse_union(
        variants: Vec<(i8, &str, ArrayRef)>,
        type_ids: &[i8],
    ) -> StrataResult<ArrayRef> {
        Self::union_of(UnionMode::Sparse, variants, type_ids, None)
    }

    /// A dense union: `offsets[i]` locates slot `i` inside the child
    /// selected by `type_ids[i]`.
    pub fn dense_union(
        variants: Vec<(i8, &str, ArrayRef)>,
        type_ids: &[i8],
        offsets: &[i32],
    ) -> StrataResult<ArrayRef> {
        Self::union_of(UnionMode::Dense, variants, type_ids, Some(offsets))
    }

    fn union_of(
        mode: UnionMode,
        variants: Vec<(i8, &str, ArrayRef)>,
        type_ids: &[i8],
        offsets: Option<&[i32]>,
    ) -> StrataResult<ArrayRef> {
        let fields = variants
            .iter()
            .map(|(id, name, child)| (*id, Field::new(*name, child.dtype().clone(), true)))
            .collect::<Arc<[(i8, Field)]>>();
        let mut buffers = vec![ByteBuffer::copy_from_typed(type_ids)];
        if let Some(offsets) = offsets {
            if offsets.len() != type_ids.len() {
                strata_bail!(
                    "dense union has {} offsets for {} type ids",
                    offsets.len(),
                    type_ids.len()
                );
            }
            buffers.push(ByteBuffer::copy_from_typed(offsets));
        }
        ArrayData::try_new(
            DataType::Union(mode, fields),
            type_ids.len(),
            0,
            None,
            buffers,
            variants.into_iter().map(|(_, _, c)| c).collect(),
        )
    }

    /// A dictionary-encoded array: `indices` point into the shared payload
    /// of `dict`.
    pub fn dictionary<T: NativePType>(
        dict: Arc<DictionaryType>,
        indices: &[Option<T>],
    ) -> StrataResult<ArrayRef> {
        if T::PTYPE != dict.index_type() {
            strata_bail!(
                "dictionary index type mismatch: {} indices for a {} dictionary",
                T::PTYPE,
                dict.index_type()
            );
        }
        let mut raw = Vec::with_capacity(indices.len() * T::WIDTH);
        let mut valid = Vec::with_capacity(indices.len());
        for index in indices {
            valid.push(index.is_some());
            match index {
                Some(v) => v.write_le(&mut raw),
                None => raw.extend(std::iter::repeat_n(0u8, T::WIDTH)),
            }
        }
        ArrayData::try_new(
            DataType::Dictionary(dict),
            indices.len(),
            0,
            validity_from(&valid),
            vec![ByteBuffer::from(raw)],
            vec![],
        )
    }
}
