//! Logical equality over arrays.
//!
//! Two arrays are equal when they have equal types, equal lengths, and
//! element-wise equal values with nulls in the same positions — regardless
//! of view offsets, bitmap padding bits, or offset-buffer rebasing. Floats
//! compare bitwise, preserving the codec's bit-exactness contract (NaN
//! payloads included).

use strata_error::{StrataExpect, strata_panic};

use crate::dtype::{DataType, UnionMode};
use crate::ArrayData;

/// Compare one element of `a` against one element of `b`, including
/// validity. The two arrays must have equal types.
pub(crate) fn element_eq(a: &ArrayData, ai: usize, b: &ArrayData, bi: usize) -> bool {
    match (a.is_valid(ai), b.is_valid(bi)) {
        (false, false) => return true,
        (true, true) => {}
        _ => return false,
    }

    match a.dtype() {
        DataType::Bool => a.bool_value(ai) == b.bool_value(bi),
        DataType::Primitive(_) | DataType::FixedSizeBinary(_) => {
            a.fixed_value(ai) == b.fixed_value(bi)
        }
        DataType::Utf8 | DataType::Binary => a.binary_value(ai) == b.binary_value(bi),
        DataType::List(_) => {
            let ra = a.value_range(ai);
            let rb = b.value_range(bi);
            ra.len() == rb.len()
                && ra
                    .zip(rb)
                    .all(|(ia, ib)| element_eq(&a.children()[0], ia, &b.children()[0], ib))
        }
        DataType::Struct(_) => a
            .children()
            .iter()
            .zip(b.children().iter())
            .all(|(ca, cb)| element_eq(ca, ai, cb, bi)),
        DataType::Union(mode, _) => {
            if a.type_id(ai) != b.type_id(bi) {
                return false;
            }
            let (_, ca) = a.union_child(ai);
            let (_, cb) = b.union_child(bi);
            match mode {
                UnionMode::Sparse => element_eq(ca, ai, cb, bi),
                UnionMode::Dense => element_eq(ca, a.dense_offset(ai), cb, b.dense_offset(bi)),
            }
        }
        DataType::Dictionary(dict) => {
            let DataType::Dictionary(other) = b.dtype() else {
                strata_panic!("dictionary array compared against {}", b.dtype());
            };
            let ia = a
                .dictionary_index(ai)
                .strata_expect("indices validated at construction");
            let ib = b
                .dictionary_index(bi)
                .strata_expect("indices validated at construction");
            element_eq(dict.values(), ia, other.values(), ib)
        }
    }
}

impl PartialEq for ArrayData {
    fn eq(&self, other: &Self) -> bool {
        self.dtype() == other.dtype()
            && self.len() == other.len()
            && self.null_count() == other.null_count()
            && (0..self.len()).all(|i| element_eq(self, i, other, i))
    }
}

#[cfg(test)]
mod tests {
    use crate::ArrayData;

    #[test]
    fn slices_compare_logically() {
        let full = ArrayData::primitive::<i32>(&[0, 1, 2, 3, 4, 5]);
        let a = full.slice(1, 3);
        let b = ArrayData::primitive::<i32>(&[1, 2, 3]);
        assert_eq!(a.as_ref(), b.as_ref());
        assert_ne!(a.as_ref(), full.as_ref());
    }

    #[test]
    fn null_positions_matter() {
        let a = ArrayData::primitive_nullable::<i32>(&[Some(1), None, Some(3)]);
        let b = ArrayData::primitive_nullable::<i32>(&[Some(1), Some(2), Some(3)]);
        assert_ne!(a.as_ref(), b.as_ref());
    }

    #[test]
    fn nulls_compare_equal_regardless_of_masked_bytes() {
        // A null slot's backing bytes are irrelevant.
        let a = ArrayData::primitive_nullable::<i32>(&[None, Some(2)]);
        let b = {
            let full = ArrayData::primitive_nullable::<i32>(&[Some(9), None, Some(2)]);
            full.slice(1, 2)
        };
        assert_eq!(a.as_ref(), b.as_ref());
    }

    #[test]
    fn utf8_offset_rebasing_is_invisible() {
        let full = ArrayData::utf8(&[Some("aa"), Some("bb"), None, Some("cc")]);
        let a = full.slice(1, 3);
        let b = ArrayData::utf8(&[Some("bb"), None, Some("cc")]);
        assert_eq!(a.as_ref(), b.as_ref());
    }

    #[test]
    fn nan_compares_bitwise() {
        let a = ArrayData::primitive::<f64>(&[f64::NAN]);
        let b = ArrayData::primitive::<f64>(&[f64::NAN]);
        assert_eq!(a.as_ref(), b.as_ref());
        let negated = ArrayData::primitive::<f64>(&[-f64::NAN]);
        assert_ne!(a.as_ref(), negated.as_ref());
    }
}
