use bytemuck::Pod;
use core::fmt::Debug;
use half::{bf16, f16};
use num_traits::{Bounded, WrappingAdd};

/// Plain data that can be stored in device memory and moved between cubes.
///
/// Every `Pod` type that is thread safe and comparable is an element, so custom aggregate types
/// only need to derive `Pod` and `Zeroable`.
pub trait Element: Pod + Send + Sync + Debug + PartialEq + 'static {}

impl<T> Element for T where T: Pod + Send + Sync + Debug + PartialEq + 'static {}

/// An element with an additive identity, bounds and an addition that never traps.
pub trait Numeric: Element + PartialOrd {
    /// Create a value from an integer, truncating or rounding to the element precision.
    fn from_int(value: i64) -> Self;

    /// Addition, wrapping for integer types.
    fn plus(self, rhs: Self) -> Self;

    /// The smallest representable value.
    fn min_value() -> Self;

    /// The largest representable value.
    fn max_value() -> Self;

    /// The additive identity.
    fn zero() -> Self {
        Self::from_int(0)
    }

    /// The value one.
    fn one() -> Self {
        Self::from_int(1)
    }
}

macro_rules! numeric_int {
    ($($ty:ty),*) => {
        $(
            impl Numeric for $ty {
                fn from_int(value: i64) -> Self {
                    value as $ty
                }

                fn plus(self, rhs: Self) -> Self {
                    WrappingAdd::wrapping_add(&self, &rhs)
                }

                fn min_value() -> Self {
                    <$ty as Bounded>::min_value()
                }

                fn max_value() -> Self {
                    <$ty as Bounded>::max_value()
                }
            }
        )*
    };
}

macro_rules! numeric_float {
    ($($ty:ty => |$value:ident| $from:expr),*) => {
        $(
            impl Numeric for $ty {
                fn from_int($value: i64) -> Self {
                    $from
                }

                fn plus(self, rhs: Self) -> Self {
                    self + rhs
                }

                fn min_value() -> Self {
                    <$ty as Bounded>::min_value()
                }

                fn max_value() -> Self {
                    <$ty as Bounded>::max_value()
                }
            }
        )*
    };
}

numeric_int!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);
numeric_float!(
    f32 => |value| value as f32,
    f64 => |value| value as f64,
    f16 => |value| f16::from_f64(value as f64),
    bf16 => |value| bf16::from_f64(value as f64)
);
