use std::ops::Range;
use std::sync::Arc;

use itertools::Itertools;
use strata_buffer::ByteBuffer;
use strata_error::{StrataResult, strata_bail, strata_err, strata_panic};

use crate::bitmap;
use crate::dtype::{DataType, PType, UnionMode};

/// A cheaply-cloneable shared array.
pub type ArrayRef = Arc<ArrayData>;

/// A buffer-backed column of values.
///
/// An array is a view: `offset` and `len` select a logical range over the
/// physical buffers, and slicing produces a new view over the same buffers.
/// Buffer contents per type:
///
/// | type                | buffers                        | children     |
/// |---------------------|--------------------------------|--------------|
/// | Bool                | values bitmap                  | —            |
/// | Primitive           | values                         | —            |
/// | FixedSizeBinary     | values                         | —            |
/// | Utf8 / Binary       | offsets (i32), values          | —            |
/// | List                | offsets (i32)                  | items        |
/// | Struct              | —                              | one per field|
/// | Union (sparse)      | type ids (i8)                  | one per field|
/// | Union (dense)       | type ids (i8), offsets (i32)   | one per field|
/// | Dictionary          | index values                   | —            |
///
/// The validity bitmap is held separately from the value buffers. A
/// dictionary array's payload is reached through its
/// [`DictionaryType`](crate::DictionaryType), not through children.
///
/// Children of Struct and sparse-Union arrays are stored pre-sliced to the
/// parent's logical range; List and dense-Union offsets index into their
/// child's logical coordinates.
#[derive(Debug, Clone)]
pub struct ArrayData {
    dtype: DataType,
    len: usize,
    offset: usize,
    null_count: usize,
    validity: Option<ByteBuffer>,
    buffers: Vec<ByteBuffer>,
    children: Vec<ArrayRef>,
}

impl ArrayData {
    /// Construct an array from raw parts, validating the per-type buffer
    /// and child invariants described on [`ArrayData`].
    pub fn try_new(
        dtype: DataType,
        len: usize,
        offset: usize,
        validity: Option<ByteBuffer>,
        buffers: Vec<ByteBuffer>,
        children: Vec<ArrayRef>,
    ) -> StrataResult<ArrayRef> {
        let null_count = match &validity {
            None => 0,
            Some(bitmap) => {
                if len > 0 {
                    let needed = bitmap::byte_len(offset + len);
                    if bitmap.len() < needed {
                        strata_bail!(
                            "validity bitmap of {} bytes too short for {} slots",
                            bitmap.len(),
                            offset + len
                        );
                    }
                    len - bitmap::count_set_bits(bitmap.as_slice(), offset, len)
                } else {
                    0
                }
            }
        };

        let array = Self {
            dtype,
            len,
            offset,
            null_count,
            validity,
            buffers,
            children,
        };
        array.validate()?;
        Ok(Arc::new(array))
    }

    fn validate(&self) -> StrataResult<()> {
        let end = self.offset + self.len;
        self.check_shape()?;
        match &self.dtype {
            DataType::Bool => {
                if self.len > 0 && self.buffers[0].len() < bitmap::byte_len(end) {
                    strata_bail!("bool values bitmap too short for {} slots", end);
                }
            }
            DataType::Primitive(ptype) => {
                if self.buffers[0].len() < end * ptype.byte_width() {
                    strata_bail!("{} values buffer too short for {} slots", ptype, end);
                }
            }
            DataType::FixedSizeBinary(width) => {
                if self.buffers[0].len() < end * (*width as usize) {
                    strata_bail!("fixed-size binary values buffer too short for {} slots", end);
                }
            }
            DataType::Utf8 | DataType::Binary => {
                self.check_offsets(self.buffers[1].len())?;
            }
            DataType::List(_) => {
                self.check_offsets(self.children[0].len())?;
            }
            DataType::Struct(fields) => {
                for (field, child) in fields.iter().zip_eq(self.children.iter()) {
                    if child.len() != self.len {
                        strata_bail!(
                            "struct child {} has length {}, expected {}",
                            field.name(),
                            child.len(),
                            self.len
                        );
                    }
                    if child.dtype() != field.dtype() {
                        strata_bail!(
                            "struct child {} has type {}, expected {}",
                            field.name(),
                            child.dtype(),
                            field.dtype()
                        );
                    }
                }
            }
            DataType::Union(mode, variants) => {
                if self.len > 0 && self.buffers[0].len() < end {
                    strata_bail!("union type-id buffer too short for {} slots", end);
                }
                if *mode == UnionMode::Sparse {
                    for ((_, field), child) in variants.iter().zip_eq(self.children.iter()) {
                        if child.len() != self.len {
                            strata_bail!(
                                "sparse union child {} has length {}, expected {}",
                                field.name(),
                                child.len(),
                                self.len
                            );
                        }
                    }
                }
                for i in 0..self.len {
                    let type_id = self.buffers[0].get_le::<i8>(self.offset + i);
                    let Some(child_idx) = variants.iter().position(|(id, _)| *id == type_id)
                    else {
                        strata_bail!("union slot {} has undeclared type id {}", i, type_id);
                    };
                    if *mode == UnionMode::Dense {
                        let child_offset = self.buffers[1].get_le::<i32>(self.offset + i);
                        let child_len = self.children[child_idx].len();
                        if child_offset < 0 || child_offset as usize >= child_len {
                            strata_bail!(
                                "dense union slot {} points at {} in a child of length {}",
                                i,
                                child_offset,
                                child_len
                            );
                        }
                    }
                }
            }
            DataType::Dictionary(dict) => {
                let width = dict.index_type().byte_width();
                if self.buffers[0].len() < end * width {
                    strata_bail!("dictionary index buffer too short for {} slots", end);
                }
                for i in 0..self.len {
                    if self.is_valid(i) {
                        let index = self.dictionary_index(i)?;
                        if index >= dict.values().len() {
                            strata_bail!(
                                "dictionary index {} out of range for {} values",
                                index,
                                dict.values().len()
                            );
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn check_shape(&self) -> StrataResult<()> {
        let (nbuffers, nchildren) = match &self.dtype {
            DataType::Bool
            | DataType::Primitive(_)
            | DataType::FixedSizeBinary(_)
            | DataType::Dictionary(_) => (1, 0),
            DataType::Utf8 | DataType::Binary => (2, 0),
            DataType::List(_) => (1, 1),
            DataType::Struct(fields) => (0, fields.len()),
            DataType::Union(UnionMode::Sparse, variants) => (1, variants.len()),
            DataType::Union(UnionMode::Dense, variants) => (2, variants.len()),
        };
        if self.buffers.len() != nbuffers {
            strata_bail!(
                "{} array requires {} buffers, got {}",
                self.dtype,
                nbuffers,
                self.buffers.len()
            );
        }
        if self.children.len() != nchildren {
            strata_bail!(
                "{} array requires {} children, got {}",
                self.dtype,
                nchildren,
                self.children.len()
            );
        }
        Ok(())
    }

    /// Validate the offsets buffer of a variable-length array against the
    /// length of its values space (bytes or child elements).
    fn check_offsets(&self, values_len: usize) -> StrataResult<()> {
        if self.len == 0 {
            // Absent offsets are valid for zero-length arrays.
            return Ok(());
        }
        let offsets = &self.buffers[0];
        let entries = offsets.len_of::<i32>();
        if entries < self.offset + self.len + 1 {
            strata_bail!(
                "offsets buffer has {} entries, need {}",
                entries,
                self.offset + self.len + 1
            );
        }
        let mut prev = offsets.get_le::<i32>(self.offset);
        if prev < 0 {
            strata_bail!("negative offset {}", prev);
        }
        for i in 1..=self.len {
            let next = offsets.get_le::<i32>(self.offset + i);
            if next < prev {
                strata_bail!("offsets decrease at slot {}: {} -> {}", i - 1, prev, next);
            }
            prev = next;
        }
        if prev as usize > values_len {
            strata_bail!(
                "final offset {} exceeds values length {}",
                prev,
                values_len
            );
        }
        Ok(())
    }

    /// The array's logical type.
    pub fn dtype(&self) -> &DataType {
        &self.dtype
    }

    /// The number of logical elements in this view.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the view is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The element offset of this view into its buffers.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The number of null elements in this view.
    pub fn null_count(&self) -> usize {
        self.null_count
    }

    /// The raw validity bitmap, if any. Bit `offset() + i` governs logical
    /// element `i`.
    pub fn validity(&self) -> Option<&ByteBuffer> {
        self.validity.as_ref()
    }

    /// The raw value buffers. See the type table on [`ArrayData`].
    pub fn buffers(&self) -> &[ByteBuffer] {
        &self.buffers
    }

    /// The child arrays. See the type table on [`ArrayData`].
    pub fn children(&self) -> &[ArrayRef] {
        &self.children
    }

    /// Whether element `i` is non-null.
    #[inline]
    pub fn is_valid(&self, i: usize) -> bool {
        match &self.validity {
            None => true,
            Some(bitmap) => bitmap::get_bit(bitmap.as_slice(), self.offset + i),
        }
    }

    /// Whether element `i` is null.
    #[inline]
    pub fn is_null(&self, i: usize) -> bool {
        !self.is_valid(i)
    }

    /// Create a zero-copy view over `[offset, offset + len)` of this array.
    ///
    /// # Panics
    ///
    /// Panics if the range exceeds the array's length.
    pub fn slice(&self, offset: usize, len: usize) -> ArrayRef {
        if offset + len > self.len {
            strata_panic!(
                "slice [{}, {}) out of bounds for array of length {}",
                offset,
                offset + len,
                self.len
            );
        }

        // Struct and sparse-union children live in the parent's logical
        // coordinates and move with the view.
        let children = match &self.dtype {
            DataType::Struct(_) | DataType::Union(UnionMode::Sparse, _) => self
                .children
                .iter()
                .map(|child| child.slice(offset, len))
                .collect(),
            _ => self.children.clone(),
        };

        let new_offset = self.offset + offset;
        let null_count = match &self.validity {
            None => 0,
            Some(bitmap) => {
                len - bitmap::count_set_bits(bitmap.as_slice(), new_offset, len)
            }
        };

        Arc::new(Self {
            dtype: self.dtype.clone(),
            len,
            offset: new_offset,
            null_count,
            validity: self.validity.clone(),
            buffers: self.buffers.clone(),
            children,
        })
    }

    /// The boolean value of element `i` of a Bool array.
    pub fn bool_value(&self, i: usize) -> bool {
        debug_assert!(matches!(self.dtype, DataType::Bool));
        bitmap::get_bit(self.buffers[0].as_slice(), self.offset + i)
    }

    /// The raw little-endian bytes of element `i` of a Primitive or
    /// FixedSizeBinary array.
    pub fn fixed_value(&self, i: usize) -> &[u8] {
        let width = match &self.dtype {
            DataType::Primitive(ptype) => ptype.byte_width(),
            DataType::FixedSizeBinary(width) => *width as usize,
            _ => strata_panic!("fixed_value on {} array", self.dtype),
        };
        let start = (self.offset + i) * width;
        &self.buffers[0].as_slice()[start..start + width]
    }

    /// The value range of element `i` of a variable-length array, in
    /// values-space coordinates (bytes for Utf8/Binary, child elements for
    /// List).
    pub fn value_range(&self, i: usize) -> Range<usize> {
        let offsets = &self.buffers[0];
        let start = offsets.get_le::<i32>(self.offset + i);
        let end = offsets.get_le::<i32>(self.offset + i + 1);
        start as usize..end as usize
    }

    /// The byte content of element `i` of a Utf8 or Binary array.
    pub fn binary_value(&self, i: usize) -> &[u8] {
        debug_assert!(matches!(self.dtype, DataType::Utf8 | DataType::Binary));
        &self.buffers[1].as_slice()[self.value_range(i)]
    }

    /// The discriminant of element `i` of a Union array.
    pub fn type_id(&self, i: usize) -> i8 {
        debug_assert!(matches!(self.dtype, DataType::Union(..)));
        self.buffers[0].get_le::<i8>(self.offset + i)
    }

    /// The child position and array selected by element `i` of a Union.
    pub fn union_child(&self, i: usize) -> (usize, &ArrayRef) {
        let DataType::Union(_, variants) = &self.dtype else {
            strata_panic!("union_child on {} array", self.dtype);
        };
        let type_id = self.type_id(i);
        let idx = variants
            .iter()
            .position(|(id, _)| *id == type_id)
            .unwrap_or_else(|| strata_panic!("undeclared union type id {}", type_id));
        (idx, &self.children[idx])
    }

    /// The child-element index of slot `i` of a dense Union.
    pub fn dense_offset(&self, i: usize) -> usize {
        debug_assert!(matches!(self.dtype, DataType::Union(UnionMode::Dense, _)));
        self.buffers[1].get_le::<i32>(self.offset + i) as usize
    }

    /// The dictionary-values index of element `i` of a Dictionary array.
    pub fn dictionary_index(&self, i: usize) -> StrataResult<usize> {
        let DataType::Dictionary(dict) = &self.dtype else {
            strata_bail!("dictionary_index on {} array", self.dtype);
        };
        let slot = self.offset + i;
        let raw: i64 = match dict.index_type() {
            PType::U8 => self.buffers[0].get_le::<u8>(slot).into(),
            PType::U16 => self.buffers[0].get_le::<u16>(slot).into(),
            PType::U32 => self.buffers[0].get_le::<u32>(slot).into(),
            PType::U64 => i64::try_from(self.buffers[0].get_le::<u64>(slot))
                .map_err(|_| strata_err!("dictionary index exceeds i64 range"))?,
            PType::I8 => self.buffers[0].get_le::<i8>(slot).into(),
            PType::I16 => self.buffers[0].get_le::<i16>(slot).into(),
            PType::I32 => self.buffers[0].get_le::<i32>(slot).into(),
            PType::I64 => self.buffers[0].get_le::<i64>(slot),
            PType::F32 | PType::F64 => {
                strata_bail!("dictionary index type must be an integer")
            }
        };
        usize::try_from(raw).map_err(|_| strata_err!("negative dictionary index {}", raw))
    }
}
