use std::fmt::{Display, Formatter};
use std::sync::Arc;

use itertools::Itertools;

use crate::DataType;

/// A name for a field in a schema or struct.
pub type FieldName = Arc<str>;

/// A named, typed slot in a [`Schema`] or nested type.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: FieldName,
    dtype: DataType,
    nullable: bool,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<FieldName>, dtype: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            dtype,
            nullable,
        }
    }

    /// The field's name.
    pub fn name(&self) -> &FieldName {
        &self.name
    }

    /// The field's logical type.
    pub fn dtype(&self) -> &DataType {
        &self.dtype
    }

    /// Whether values of this field may be null.
    pub fn nullable(&self) -> bool {
        self.nullable
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}{}",
            self.name,
            self.dtype,
            if self.nullable { "?" } else { "" }
        )
    }
}

/// An ordered, immutable sequence of fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    fields: Arc<[Field]>,
}

/// A cheaply-cloneable shared schema.
pub type SchemaRef = Arc<Schema>;

impl Schema {
    /// Create a schema from an ordered list of fields.
    pub fn new(fields: impl IntoIterator<Item = Field>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    /// The schema's fields, in order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// The field at position `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of bounds.
    pub fn field(&self, idx: usize) -> &Field {
        &self.fields[idx]
    }

    /// The number of fields.
    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }
}

impl FromIterator<Field> for Schema {
    fn from_iter<T: IntoIterator<Item = Field>>(iter: T) -> Self {
        Self::new(iter)
    }
}

impl Display for Schema {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "schema<{}>", self.fields.iter().join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PType;

    #[test]
    fn structural_equality() {
        let make = || {
            Schema::new([
                Field::new("a", DataType::Primitive(PType::I32), true),
                Field::new("b", DataType::Utf8, false),
            ])
        };
        assert_eq!(make(), make());
        assert_ne!(
            make(),
            Schema::new([Field::new("a", DataType::Primitive(PType::I32), true)])
        );
    }

    #[test]
    fn display() {
        let schema = Schema::new([Field::new("xs", DataType::Primitive(PType::F64), true)]);
        assert_eq!(schema.to_string(), "schema<xs: f64?>");
    }
}
