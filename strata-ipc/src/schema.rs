//! The schema codec.
//!
//! Encoding serializes the field tree and, for every dictionary-typed node,
//! binds the node to an id in the session's [`DictionaryMemo`] — first
//! sight of a payload (by identity) assigns the next id, repeats reuse it.
//! Decoding is two-phase: the wire yields a [`SchemaMessage`] whose
//! dictionary nodes carry only id and index/value types; once the
//! container has read the dictionary batches into a memo,
//! [`SchemaMessage::resolve`] produces the final
//! [`Schema`] with every field of a given id sharing one payload
//! allocation.

use std::collections::HashMap;
use std::sync::Arc;

use itertools::Itertools;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use strata_array::{DataType, DictionaryType, Field, PType, Schema, UnionMode};
use strata_error::{StrataResult, strata_bail, strata_err};

use crate::dictionary::DictionaryMemo;
use crate::wire::{WireCursor, put, put_string};
use crate::{ReadOptions, WriteOptions, check_depth};

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
enum TypeTag {
    Bool = 1,
    // Renamed from `Primitive` to avoid colliding with num_enum's
    // `TryFromPrimitive::Primitive` associated type (ambiguous_associated_items).
    PrimitiveTag = 2,
    Utf8 = 3,
    Binary = 4,
    FixedSizeBinary = 5,
    List = 6,
    Struct = 7,
    Union = 8,
    Dictionary = 9,
}

/// A decoded schema whose dictionary payloads are not yet attached.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaMessage {
    pub(crate) fields: Vec<FieldDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FieldDecl {
    pub name: String,
    pub nullable: bool,
    pub dtype: TypeDecl,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TypeDecl {
    Bool,
    Primitive(PType),
    Utf8,
    Binary,
    FixedSizeBinary(u32),
    List(Box<FieldDecl>),
    Struct(Vec<FieldDecl>),
    Union(UnionMode, Vec<(i8, FieldDecl)>),
    Dictionary {
        id: i64,
        index_type: PType,
        value: Box<TypeDecl>,
    },
}

/// Serialize a schema payload, assigning dictionary ids through `memo`.
pub fn encode_schema(
    schema: &Schema,
    memo: &mut DictionaryMemo,
    options: &WriteOptions,
) -> StrataResult<Vec<u8>> {
    let mut out = Vec::new();
    put(
        &mut out,
        u32::try_from(schema.num_fields())
            .map_err(|_| strata_err!("schema has more than u32::MAX fields"))?,
    );
    for field in schema.fields() {
        write_field(&mut out, field, memo, 0, options.max_depth)?;
    }
    Ok(out)
}

fn write_field(
    out: &mut Vec<u8>,
    field: &Field,
    memo: &mut DictionaryMemo,
    depth: usize,
    limit: usize,
) -> StrataResult<()> {
    put_string(out, field.name());
    put(out, u8::from(field.nullable()));
    write_type(out, field.dtype(), memo, depth, limit, false)
}

fn write_type(
    out: &mut Vec<u8>,
    dtype: &DataType,
    memo: &mut DictionaryMemo,
    depth: usize,
    limit: usize,
    in_dictionary: bool,
) -> StrataResult<()> {
    check_depth(depth, limit)?;
    match dtype {
        DataType::Bool => put(out, u8::from(TypeTag::Bool)),
        DataType::Primitive(ptype) => {
            put(out, u8::from(TypeTag::PrimitiveTag));
            put(out, u8::from(*ptype));
        }
        DataType::Utf8 => put(out, u8::from(TypeTag::Utf8)),
        DataType::Binary => put(out, u8::from(TypeTag::Binary)),
        DataType::FixedSizeBinary(width) => {
            put(out, u8::from(TypeTag::FixedSizeBinary));
            put(out, *width);
        }
        DataType::List(child) => {
            put(out, u8::from(TypeTag::List));
            write_field(out, child, memo, depth + 1, limit)?;
        }
        DataType::Struct(fields) => {
            put(out, u8::from(TypeTag::Struct));
            put(
                out,
                u32::try_from(fields.len())
                    .map_err(|_| strata_err!("struct has more than u32::MAX children"))?,
            );
            for field in fields.iter() {
                write_field(out, field, memo, depth + 1, limit)?;
            }
        }
        DataType::Union(mode, variants) => {
            put(out, u8::from(TypeTag::Union));
            put(out, u8::from(*mode));
            put(
                out,
                u32::try_from(variants.len())
                    .map_err(|_| strata_err!("union has more than u32::MAX children"))?,
            );
            for (type_id, field) in variants.iter() {
                put(out, *type_id);
                write_field(out, field, memo, depth + 1, limit)?;
            }
        }
        DataType::Dictionary(dict) => {
            if in_dictionary {
                strata_bail!(
                    UnsupportedLayout: "dictionary value types may not themselves be dictionary-encoded"
                );
            }
            let (id, newly_assigned) = memo.get_or_assign(dict.values());
            if newly_assigned {
                log::debug!(
                    "assigned dictionary id {} to a {}-value payload",
                    id,
                    dict.values().len()
                );
            }
            put(out, u8::from(TypeTag::Dictionary));
            put(out, id);
            put(out, u8::from(dict.index_type()));
            write_type(out, dict.value_dtype(), memo, depth + 1, limit, true)?;
        }
    }
    Ok(())
}

/// Parse a schema payload into its unresolved form.
pub fn decode_schema_payload(
    cursor: &mut WireCursor<'_>,
    options: &ReadOptions,
) -> StrataResult<SchemaMessage> {
    let num_fields = cursor.read::<u32>()?;
    let fields: Vec<_> = (0..num_fields)
        .map(|_| read_field(cursor, 0, options.max_depth))
        .try_collect()?;
    Ok(SchemaMessage { fields })
}

fn read_field(cursor: &mut WireCursor<'_>, depth: usize, limit: usize) -> StrataResult<FieldDecl> {
    let name = cursor.read_string()?;
    let nullable = cursor.read::<u8>()? != 0;
    let dtype = read_type(cursor, depth, limit, false)?;
    Ok(FieldDecl {
        name,
        nullable,
        dtype,
    })
}

fn read_type(
    cursor: &mut WireCursor<'_>,
    depth: usize,
    limit: usize,
    in_dictionary: bool,
) -> StrataResult<TypeDecl> {
    check_depth(depth, limit)?;
    let tag = TypeTag::try_from(cursor.read::<u8>()?)
        .map_err(|e| strata_err!(InvalidFormat: "unknown type tag {}", e.number))?;
    Ok(match tag {
        TypeTag::Bool => TypeDecl::Bool,
        TypeTag::PrimitiveTag => TypeDecl::Primitive(read_ptype(cursor)?),
        TypeTag::Utf8 => TypeDecl::Utf8,
        TypeTag::Binary => TypeDecl::Binary,
        TypeTag::FixedSizeBinary => TypeDecl::FixedSizeBinary(cursor.read::<u32>()?),
        TypeTag::List => TypeDecl::List(Box::new(read_field(cursor, depth + 1, limit)?)),
        TypeTag::Struct => {
            let num_children = cursor.read::<u32>()?;
            TypeDecl::Struct(
                (0..num_children)
                    .map(|_| read_field(cursor, depth + 1, limit))
                    .collect::<StrataResult<Vec<_>>>()?,
            )
        }
        TypeTag::Union => {
            let mode = UnionMode::try_from(cursor.read::<u8>()?)
                .map_err(|e| strata_err!(InvalidFormat: "unknown union mode {}", e.number))?;
            let num_children = cursor.read::<u32>()?;
            TypeDecl::Union(
                mode,
                (0..num_children)
                    .map(|_| {
                        let type_id = cursor.read::<i8>()?;
                        Ok((type_id, read_field(cursor, depth + 1, limit)?))
                    })
                    .collect::<StrataResult<Vec<_>>>()?,
            )
        }
        TypeTag::Dictionary => {
            if in_dictionary {
                strata_bail!(InvalidFormat: "dictionary value types may not themselves be dictionary-encoded");
            }
            let id = cursor.read::<i64>()?;
            let index_type = read_ptype(cursor)?;
            let value = Box::new(read_type(cursor, depth + 1, limit, true)?);
            TypeDecl::Dictionary {
                id,
                index_type,
                value,
            }
        }
    })
}

fn read_ptype(cursor: &mut WireCursor<'_>) -> StrataResult<PType> {
    PType::try_from(cursor.read::<u8>()?)
        .map_err(|e| strata_err!(InvalidFormat: "unknown primitive type tag {}", e.number))
}

impl SchemaMessage {
    /// The index and value type of every dictionary id the schema
    /// references. Two fields carrying the same id must agree on both.
    pub fn dictionary_decls(&self) -> StrataResult<HashMap<i64, (PType, DataType)>> {
        let mut decls = HashMap::new();
        for field in &self.fields {
            collect_dictionary_decls(&field.dtype, &mut decls)?;
        }
        Ok(decls)
    }

    /// Attach dictionary payloads from `memo`, producing the final schema.
    ///
    /// Fields referencing the same id resolve to the same payload
    /// allocation. Referencing an id absent from the memo is fatal.
    pub fn resolve(&self, memo: &DictionaryMemo) -> StrataResult<Schema> {
        let mut cache: HashMap<i64, Arc<DictionaryType>> = HashMap::new();
        let fields: Vec<_> = self
            .fields
            .iter()
            .map(|decl| resolve_field(decl, memo, &mut cache))
            .try_collect()?;
        Ok(Schema::new(fields))
    }
}

fn collect_dictionary_decls(
    decl: &TypeDecl,
    decls: &mut HashMap<i64, (PType, DataType)>,
) -> StrataResult<()> {
    match decl {
        TypeDecl::List(child) => collect_dictionary_decls(&child.dtype, decls)?,
        TypeDecl::Struct(children) => {
            for child in children {
                collect_dictionary_decls(&child.dtype, decls)?;
            }
        }
        TypeDecl::Union(_, variants) => {
            for (_, child) in variants {
                collect_dictionary_decls(&child.dtype, decls)?;
            }
        }
        TypeDecl::Dictionary {
            id,
            index_type,
            value,
        } => {
            let value_dtype = plain_datatype(value)?;
            match decls.get(id) {
                None => {
                    decls.insert(*id, (*index_type, value_dtype));
                }
                Some((existing_index, existing_value)) => {
                    if *existing_index != *index_type || *existing_value != value_dtype {
                        strata_bail!(
                            InvalidFormat: "dictionary id {} is declared with conflicting types",
                            id
                        );
                    }
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// Convert a dictionary-free type declaration into a [`DataType`].
fn plain_datatype(decl: &TypeDecl) -> StrataResult<DataType> {
    Ok(match decl {
        TypeDecl::Bool => DataType::Bool,
        TypeDecl::Primitive(ptype) => DataType::Primitive(*ptype),
        TypeDecl::Utf8 => DataType::Utf8,
        TypeDecl::Binary => DataType::Binary,
        TypeDecl::FixedSizeBinary(width) => DataType::FixedSizeBinary(*width),
        TypeDecl::List(child) => DataType::List(Arc::new(plain_field(child)?)),
        TypeDecl::Struct(children) => DataType::Struct(
            children
                .iter()
                .map(plain_field)
                .collect::<StrataResult<Arc<[Field]>>>()?,
        ),
        TypeDecl::Union(mode, variants) => DataType::Union(
            *mode,
            variants
                .iter()
                .map(|(type_id, child)| Ok((*type_id, plain_field(child)?)))
                .collect::<StrataResult<Arc<[(i8, Field)]>>>()?,
        ),
        TypeDecl::Dictionary { .. } => {
            strata_bail!(InvalidFormat: "dictionary value types may not themselves be dictionary-encoded")
        }
    })
}

fn plain_field(decl: &FieldDecl) -> StrataResult<Field> {
    Ok(Field::new(
        decl.name.as_str(),
        plain_datatype(&decl.dtype)?,
        decl.nullable,
    ))
}

fn resolve_field(
    decl: &FieldDecl,
    memo: &DictionaryMemo,
    cache: &mut HashMap<i64, Arc<DictionaryType>>,
) -> StrataResult<Field> {
    Ok(Field::new(
        decl.name.as_str(),
        resolve_datatype(&decl.dtype, memo, cache)?,
        decl.nullable,
    ))
}

fn resolve_datatype(
    decl: &TypeDecl,
    memo: &DictionaryMemo,
    cache: &mut HashMap<i64, Arc<DictionaryType>>,
) -> StrataResult<DataType> {
    Ok(match decl {
        TypeDecl::List(child) => {
            DataType::List(Arc::new(resolve_field(child, memo, cache)?))
        }
        TypeDecl::Struct(children) => DataType::Struct(
            children
                .iter()
                .map(|child| resolve_field(child, memo, cache))
                .collect::<StrataResult<Arc<[Field]>>>()?,
        ),
        TypeDecl::Union(mode, variants) => DataType::Union(
            *mode,
            variants
                .iter()
                .map(|(type_id, child)| Ok((*type_id, resolve_field(child, memo, cache)?)))
                .collect::<StrataResult<Arc<[(i8, Field)]>>>()?,
        ),
        TypeDecl::Dictionary { id, index_type, .. } => {
            let dict = match cache.get(id) {
                Some(dict) => dict.clone(),
                None => {
                    let values = memo.lookup(*id)?.clone();
                    let dict = Arc::new(DictionaryType::try_new(*index_type, values)?);
                    cache.insert(*id, dict.clone());
                    dict
                }
            };
            DataType::Dictionary(dict)
        }
        plain => plain_datatype(plain)?,
    })
}
