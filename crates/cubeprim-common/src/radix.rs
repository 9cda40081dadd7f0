use crate::Element;
use half::{bf16, f16};

/// A key that can be sorted by its bits.
///
/// The radix representation is an unsigned integer whose order matches the key order, so a
/// least significant digit sort over it sorts the keys. Negative zero is mapped onto positive
/// zero.
pub trait RadixKey: Element {
    /// Number of significant bits of the radix representation.
    const BITS: u32;

    /// The order-preserving unsigned representation.
    fn to_radix(self) -> u64;
}

macro_rules! radix_unsigned {
    ($($ty:ty),*) => {
        $(
            impl RadixKey for $ty {
                const BITS: u32 = <$ty>::BITS;

                fn to_radix(self) -> u64 {
                    self as u64
                }
            }
        )*
    };
}

macro_rules! radix_signed {
    ($($ty:ty => $unsigned:ty),*) => {
        $(
            impl RadixKey for $ty {
                const BITS: u32 = <$ty>::BITS;

                fn to_radix(self) -> u64 {
                    ((self as $unsigned) ^ (1 << (<$ty>::BITS - 1))) as u64
                }
            }
        )*
    };
}

macro_rules! radix_float {
    ($($ty:ty => |$value:ident| $bits:expr, $width:literal),*) => {
        $(
            impl RadixKey for $ty {
                const BITS: u32 = $width;

                fn to_radix(self) -> u64 {
                    let $value = self;
                    let bits = $bits as u64;
                    let sign = 1u64 << ($width - 1);

                    if bits == sign {
                        sign
                    } else if bits & sign != 0 {
                        !bits & (u64::MAX >> (64 - $width))
                    } else {
                        bits | sign
                    }
                }
            }
        )*
    };
}

radix_unsigned!(u8, u16, u32, u64);
radix_signed!(i8 => u8, i16 => u16, i32 => u32, i64 => u64);
radix_float!(
    f32 => |value| value.to_bits(), 32,
    f64 => |value| value.to_bits(), 64,
    f16 => |value| value.to_bits(), 16,
    bf16 => |value| value.to_bits(), 16
);
