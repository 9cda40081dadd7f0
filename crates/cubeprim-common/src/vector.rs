use crate::Numeric;
use bytemuck::{Pod, Zeroable};
use derive_more::{Add, Display};

macro_rules! vector_type {
    ($(#[$meta:meta])* $name:ident, $elem:ty, $fmt:literal, [$($field:ident),+]) => {
        $(#[$meta])*
        #[repr(C)]
        #[derive(
            Clone, Copy, Debug, Default, PartialEq, PartialOrd, Pod, Zeroable, Add, Display, new,
        )]
        #[display($fmt)]
        pub struct $name {
            $(
                #[allow(missing_docs)]
                pub $field: $elem,
            )+
        }

        impl $name {
            /// Create a value with every component set to `value`.
            pub fn splat(value: $elem) -> Self {
                Self {
                    $($field: value,)+
                }
            }
        }

        impl Numeric for $name {
            fn from_int(value: i64) -> Self {
                Self::splat(<$elem>::from_int(value))
            }

            fn plus(self, rhs: Self) -> Self {
                Self {
                    $($field: self.$field.plus(rhs.$field),)+
                }
            }

            fn min_value() -> Self {
                Self::splat(<$elem as Numeric>::min_value())
            }

            fn max_value() -> Self {
                Self::splat(<$elem as Numeric>::max_value())
            }
        }
    };
}

vector_type!(
    /// Two single precision floats, ordered lexicographically.
    Float2, f32, "({x}, {y})", [x, y]
);
vector_type!(
    /// Two double precision floats, ordered lexicographically.
    Double2, f64, "({x}, {y})", [x, y]
);
vector_type!(
    /// Two 32 bit integers with wrapping addition.
    Int2, i32, "({x}, {y})", [x, y]
);
vector_type!(
    /// Four 32 bit integers with wrapping addition.
    Int4, i32, "({x}, {y}, {z}, {w})", [x, y, z, w]
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn components_are_added_independently() {
        let lhs = Double2::new(1.5, -2.0);
        let rhs = Double2::new(0.5, 4.0);

        assert_eq!(lhs.plus(rhs), Double2::new(2.0, 2.0));
        assert_eq!(lhs + rhs, Double2::new(2.0, 2.0));
    }

    #[test]
    fn integer_components_wrap() {
        let value = Int4::splat(i32::MAX).plus(Int4::one());

        assert_eq!(value, Int4::splat(i32::MIN));
    }

    #[test]
    fn ordering_is_lexicographic() {
        assert!(Float2::new(1.0, 9.0) < Float2::new(2.0, 0.0));
        assert!(Float2::new(1.0, 0.0) < Float2::new(1.0, 1.0));
    }
}
