use std::fmt::{Display, Formatter};
use std::sync::Arc;

use itertools::Itertools;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use strata_error::{StrataResult, strata_bail};

use crate::field::Field;
use crate::{ArrayData, ArrayRef};

/// Fixed-width numeric primitive types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum PType {
    /// An unsigned 8-bit integer.
    U8 = 0,
    /// An unsigned 16-bit integer.
    U16 = 1,
    /// An unsigned 32-bit integer.
    U32 = 2,
    /// An unsigned 64-bit integer.
    U64 = 3,
    /// A signed 8-bit integer.
    I8 = 4,
    /// A signed 16-bit integer.
    I16 = 5,
    /// A signed 32-bit integer.
    I32 = 6,
    /// A signed 64-bit integer.
    I64 = 7,
    /// An IEEE-754 single-precision float.
    F32 = 8,
    /// An IEEE-754 double-precision float.
    F64 = 9,
}

impl PType {
    /// The in-memory and on-wire width of one element, in bytes.
    pub const fn byte_width(&self) -> usize {
        match self {
            PType::U8 | PType::I8 => 1,
            PType::U16 | PType::I16 => 2,
            PType::U32 | PType::I32 | PType::F32 => 4,
            PType::U64 | PType::I64 | PType::F64 => 8,
        }
    }

    /// Whether this is a signed or unsigned integer type.
    pub const fn is_int(&self) -> bool {
        !matches!(self, PType::F32 | PType::F64)
    }
}

impl Display for PType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PType::U8 => "u8",
            PType::U16 => "u16",
            PType::U32 => "u32",
            PType::U64 => "u64",
            PType::I8 => "i8",
            PType::I16 => "i16",
            PType::I32 => "i32",
            PType::I64 => "i64",
            PType::F32 => "f32",
            PType::F64 => "f64",
        };
        write!(f, "{}", name)
    }
}

/// A Rust native type with a corresponding [`PType`].
pub trait NativePType: strata_buffer::NativeType {
    /// The logical primitive type of this native type.
    const PTYPE: PType;
}

macro_rules! native_ptype {
    ($($t:ty => $ptype:ident),* $(,)?) => {
        $(
            impl NativePType for $t {
                const PTYPE: PType = PType::$ptype;
            }
        )*
    };
}

native_ptype!(
    u8 => U8, u16 => U16, u32 => U32, u64 => U64,
    i8 => I8, i16 => I16, i32 => I32, i64 => I64,
    f32 => F32, f64 => F64,
);

/// How a union lays out its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum UnionMode {
    /// Every child has the union's full length; the discriminant selects
    /// which child supplies each slot.
    Sparse = 0,
    /// Children are compact; an offsets buffer maps each slot into the
    /// selected child.
    Dense = 1,
}

/// The logical element types of Strata arrays.
#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    /// Bit-packed booleans.
    Bool,
    /// Fixed-width numerics.
    Primitive(PType),
    /// Variable-length UTF-8 strings.
    Utf8,
    /// Variable-length binary values.
    Binary,
    /// Binary values of a single fixed byte width.
    FixedSizeBinary(u32),
    /// Variable-length lists of a single element type.
    List(Arc<Field>),
    /// An ordered collection of named, typed children.
    Struct(Arc<[Field]>),
    /// One of several child types per slot, selected by a discriminant.
    Union(UnionMode, Arc<[(i8, Field)]>),
    /// Integer indices into a shared dictionary of values.
    Dictionary(Arc<DictionaryType>),
}

impl DataType {
    /// Whether values of this type carry an i32 offsets buffer.
    pub fn has_offsets(&self) -> bool {
        matches!(
            self,
            DataType::Utf8 | DataType::Binary | DataType::List(_) | DataType::Union(UnionMode::Dense, _)
        )
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Bool => write!(f, "bool"),
            DataType::Primitive(ptype) => write!(f, "{}", ptype),
            DataType::Utf8 => write!(f, "utf8"),
            DataType::Binary => write!(f, "binary"),
            DataType::FixedSizeBinary(width) => write!(f, "fixed_binary[{}]", width),
            DataType::List(field) => write!(f, "list({})", field.dtype()),
            DataType::Struct(fields) => write!(
                f,
                "{{{}}}",
                fields
                    .iter()
                    .map(|field| format!("{}={}", field.name(), field.dtype()))
                    .join(", ")
            ),
            DataType::Union(mode, children) => write!(
                f,
                "union[{}]({})",
                match mode {
                    UnionMode::Sparse => "sparse",
                    UnionMode::Dense => "dense",
                },
                children
                    .iter()
                    .map(|(type_id, field)| format!("{}:{}", type_id, field.dtype()))
                    .join(", ")
            ),
            DataType::Dictionary(dict) => {
                write!(f, "dict({}, {})", dict.index_type(), dict.value_dtype())
            }
        }
    }
}

/// A dictionary-encoded type: integer indices into a shared values array.
///
/// The dictionary payload lives in the type itself, so that every field (or
/// nested type) holding a clone of the same `Arc<DictionaryType>` shares one
/// payload allocation. The IPC layer relies on that identity to emit each
/// distinct payload exactly once per session.
#[derive(Debug)]
pub struct DictionaryType {
    index_type: PType,
    values: ArrayRef,
}

impl DictionaryType {
    /// Create a dictionary type over the given values payload.
    ///
    /// The index type must be an integer primitive.
    pub fn try_new(index_type: PType, values: ArrayRef) -> StrataResult<Self> {
        if !index_type.is_int() {
            strata_bail!("dictionary index type must be an integer, got {}", index_type);
        }
        Ok(Self { index_type, values })
    }

    /// The primitive type of the index column.
    pub fn index_type(&self) -> PType {
        self.index_type
    }

    /// The shared dictionary payload.
    pub fn values(&self) -> &ArrayRef {
        &self.values
    }

    /// The logical type of the dictionary values.
    pub fn value_dtype(&self) -> &DataType {
        self.values.dtype()
    }

    /// Whether two dictionary types share the same payload allocation, as
    /// opposed to merely holding equal values.
    pub fn same_payload(&self, other: &DictionaryType) -> bool {
        Arc::ptr_eq(&self.values, &other.values)
    }
}

impl PartialEq for DictionaryType {
    fn eq(&self, other: &Self) -> bool {
        // Structural equality: payload contents, not payload identity.
        self.index_type == other.index_type
            && ArrayData::eq(self.values.as_ref(), other.values.as_ref())
    }
}
