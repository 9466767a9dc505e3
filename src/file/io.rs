//! Little-endian primitive access over raw byte slices.
//!
//! CIL stores every multi-byte inline operand and header field in little-endian order. The
//! [`LeBytes`] trait abstracts over the fixed-width integer types so that a single generic
//! reader ([`read_le_at`]) and writer ([`write_le`]) serve the decoder, the method header
//! parser and the target encoders alike.

/// Fixed-width integers that can be read from and written to little-endian bytes.
pub trait LeBytes: Sized + Copy {
    /// Width of the encoded value in bytes.
    const SIZE: usize;

    /// Converts the first [`Self::SIZE`] bytes of `bytes` into a value.
    ///
    /// Callers guarantee `bytes.len() >= Self::SIZE`.
    fn from_le_slice(bytes: &[u8]) -> Self;

    /// Appends the little-endian encoding of `self` to `out`.
    fn append_le(self, out: &mut Vec<u8>);
}

macro_rules! impl_le_bytes {
    ($($ty:ty),* $(,)?) => {
        $(
            impl LeBytes for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn from_le_slice(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..Self::SIZE]);
                    <$ty>::from_le_bytes(raw)
                }

                fn append_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_le_bytes!(u8, i8, u16, i16, u32, i32, u64, i64);

/// Reads a `T` at `offset`, or `None` if fewer than `T::SIZE` bytes remain.
#[must_use]
pub fn read_le_at<T: LeBytes>(data: &[u8], offset: usize) -> Option<T> {
    let end = offset.checked_add(T::SIZE)?;
    data.get(offset..end).map(T::from_le_slice)
}

/// Appends `value` to `out` in little-endian order.
pub fn write_le<T: LeBytes>(out: &mut Vec<u8>, value: T) {
    value.append_le(out);
}

/// Overwrites `T::SIZE` bytes of `data` at `offset`; returns `false` if they do not fit.
pub fn patch_le_at<T: LeBytes>(data: &mut [u8], offset: usize, value: T) -> bool {
    let mut raw = Vec::with_capacity(T::SIZE);
    value.append_le(&mut raw);
    match offset
        .checked_add(T::SIZE)
        .and_then(|end| data.get_mut(offset..end))
    {
        Some(slot) => {
            slot.copy_from_slice(&raw);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_signed_and_unsigned() {
        let data = [0xFF, 0xFE, 0x01, 0x00, 0x00, 0x80];
        assert_eq!(read_le_at::<u8>(&data, 0), Some(0xFF));
        assert_eq!(read_le_at::<i8>(&data, 0), Some(-1));
        assert_eq!(read_le_at::<u16>(&data, 1), Some(0x01FE));
        assert_eq!(read_le_at::<i32>(&data, 2), Some(i32::MIN + 1));
    }

    #[test]
    fn read_past_end_is_none() {
        let data = [1, 2, 3];
        assert_eq!(read_le_at::<u32>(&data, 0), None);
        assert_eq!(read_le_at::<u8>(&data, 3), None);
        assert_eq!(read_le_at::<u8>(&data, usize::MAX), None);
    }

    #[test]
    fn write_then_patch() {
        let mut out = Vec::new();
        write_le(&mut out, 0x1122_3344u32);
        write_le(&mut out, -2i16);
        assert_eq!(out, vec![0x44, 0x33, 0x22, 0x11, 0xFE, 0xFF]);

        assert!(patch_le_at(&mut out, 2, 0xAABBu16));
        assert_eq!(&out[2..4], &[0xBB, 0xAA]);
        assert!(!patch_le_at(&mut out, 5, 0u32));
    }
}
