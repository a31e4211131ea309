use zerocopy::{FromBytes, Immutable, IntoBytes};

/// A primitive value that can be transferred over the bus: `u8`, `u16` or `u32`.
pub trait Primitive:
    Copy + Default + std::fmt::Debug + std::fmt::UpperHex + FromBytes + IntoBytes + Immutable
{
    /// Size of this primitive in bytes.
    const SIZE: u32 = size_of::<Self>() as u32;

    /// Reads this primitive from little endian bytes. `bytes` must be at least `SIZE` long.
    fn read_le_bytes(bytes: &[u8]) -> Self;

    /// Zero extends this primitive into a `u32`.
    fn to_u32(self) -> u32;

    /// Truncates a `u32` into this primitive.
    fn from_u32(value: u32) -> Self;
}

macro_rules! impl_primitive {
    ($($ty:ty),*) => {
        $(
            impl Primitive for $ty {
                #[inline(always)]
                fn read_le_bytes(bytes: &[u8]) -> Self {
                    let mut buf = [0; size_of::<$ty>()];
                    buf.copy_from_slice(&bytes[..size_of::<$ty>()]);
                    <$ty>::from_le_bytes(buf)
                }

                #[inline(always)]
                fn to_u32(self) -> u32 {
                    self as u32
                }

                #[inline(always)]
                fn from_u32(value: u32) -> Self {
                    value as $ty
                }
            }
        )*
    };
}

impl_primitive!(u8, u16, u32);
