//! Byte-level access to CIL method bodies.
//!
//! A [`MethodBody`] is a borrowed view of the instruction bytes of one method. It offers
//! random-access little-endian reads that fail with a [`crate::Error::Decode`] instead of
//! panicking when the stream is truncated, and it understands the two ECMA-335 method header
//! encodings (II.25.4) so callers holding a raw body from an assembly can hand it over
//! directly.
//!
//! ```rust
//! use cilaot::file::MethodBody;
//!
//! // Tiny header: code size 2 (`(2 << 2) | 0x2`), followed by `ldc.i4.1; ret`.
//! let raw = [0x0A, 0x17, 0x2A];
//! let body = MethodBody::from_header(&raw)?;
//! assert_eq!(body.code(), &[0x17, 0x2A]);
//! assert_eq!(body.max_stack(), 8);
//! # Ok::<(), cilaot::Error>(())
//! ```

pub mod io;

use crate::{file::io::LeBytes, DecodeErrorKind, Result};

const HEADER_FORMAT_MASK: u8 = 0x03;
const TINY_FORMAT: u8 = 0x02;
const FAT_FORMAT: u8 = 0x03;
const FAT_MORE_SECTS: u16 = 0x08;
const FAT_INIT_LOCALS: u16 = 0x10;
const TINY_MAX_STACK: u16 = 8;

/// A view over the code bytes of a single method.
#[derive(Debug, Clone, Copy)]
pub struct MethodBody<'a> {
    code: &'a [u8],
    max_stack: u16,
    local_var_sig_token: u32,
    init_locals: bool,
    has_extra_sections: bool,
}

impl<'a> MethodBody<'a> {
    /// Wraps raw instruction bytes that carry no method header.
    #[must_use]
    pub fn new(code: &'a [u8]) -> Self {
        MethodBody {
            code,
            max_stack: TINY_MAX_STACK,
            local_var_sig_token: 0,
            init_locals: false,
            has_extra_sections: false,
        }
    }

    /// Parses a tiny or fat method header and returns a view over the code that follows it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Decode`] if the header format bits are invalid or the data
    /// is shorter than the header or the declared code size.
    pub fn from_header(data: &'a [u8]) -> Result<Self> {
        let first: u8 = read(data, 0, "method header")?;
        match first & HEADER_FORMAT_MASK {
            TINY_FORMAT => {
                let size = usize::from(first >> 2);
                let code = data
                    .get(1..1 + size)
                    .ok_or(decode_error!(1, DecodeErrorKind::Truncated("tiny method body")))?;
                Ok(MethodBody::new(code))
            }
            FAT_FORMAT => {
                let flags_and_size: u16 = read(data, 0, "fat method header")?;
                let header_len = usize::from(flags_and_size >> 12) * 4;
                let max_stack: u16 = read(data, 2, "fat method header")?;
                let code_size: u32 = read(data, 4, "fat method header")?;
                let local_var_sig_token: u32 = read(data, 8, "fat method header")?;
                if header_len < 12 {
                    return Err(decode_error!(0, DecodeErrorKind::InvalidHeader(first)));
                }

                let end = header_len + code_size as usize;
                let code = data.get(header_len..end).ok_or(decode_error!(
                    header_len,
                    DecodeErrorKind::Truncated("fat method body")
                ))?;
                Ok(MethodBody {
                    code,
                    max_stack,
                    local_var_sig_token,
                    init_locals: flags_and_size & FAT_INIT_LOCALS != 0,
                    has_extra_sections: flags_and_size & FAT_MORE_SECTS != 0,
                })
            }
            _ => Err(decode_error!(0, DecodeErrorKind::InvalidHeader(first))),
        }
    }

    /// The instruction bytes.
    #[must_use]
    pub fn code(&self) -> &'a [u8] {
        self.code
    }

    /// Length of the instruction stream in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Returns `true` if the body has no instruction bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Declared maximum evaluation stack depth (8 for tiny headers).
    #[must_use]
    pub fn max_stack(&self) -> u16 {
        self.max_stack
    }

    /// Token of the local variable signature, 0 if the method has no locals.
    #[must_use]
    pub fn local_var_sig_token(&self) -> u32 {
        self.local_var_sig_token
    }

    /// Whether locals are zero-initialised on entry.
    #[must_use]
    pub fn init_locals(&self) -> bool {
        self.init_locals
    }

    /// Whether exception-handling data sections follow the code.
    #[must_use]
    pub fn has_extra_sections(&self) -> bool {
        self.has_extra_sections
    }

    /// Reads a little-endian `T` at `offset` within the code bytes.
    ///
    /// `what` names the item being read and ends up in the truncation error.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Decode`] with [`DecodeErrorKind::Truncated`] if fewer than
    /// `T::SIZE` bytes remain at `offset`.
    pub fn read<T: LeBytes>(&self, offset: usize, what: &'static str) -> Result<T> {
        read(self.code, offset, what)
    }
}

fn read<T: LeBytes>(data: &[u8], offset: usize, what: &'static str) -> Result<T> {
    io::read_le_at(data, offset).ok_or(decode_error!(offset, DecodeErrorKind::Truncated(what)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn raw_body_reads() {
        let body = MethodBody::new(&[0x20, 0x78, 0x56, 0x34, 0x12]);
        assert_eq!(body.len(), 5);
        assert_eq!(body.read::<u8>(0, "opcode").unwrap(), 0x20);
        assert_eq!(body.read::<i32>(1, "operand").unwrap(), 0x1234_5678);
        assert!(matches!(
            body.read::<i32>(2, "operand"),
            Err(Error::Decode { offset: 2, kind: DecodeErrorKind::Truncated("operand") })
        ));
    }

    #[test]
    fn fat_header() {
        let mut raw = vec![
            0x1B, 0x30, // flags: fat | more sects | init locals, header size 3
            0x04, 0x00, // max stack
            0x02, 0x00, 0x00, 0x00, // code size
            0x01, 0x00, 0x00, 0x11, // local sig token
        ];
        raw.extend_from_slice(&[0x00, 0x2A, 0xFF]);

        let body = MethodBody::from_header(&raw).unwrap();
        assert_eq!(body.code(), &[0x00, 0x2A]);
        assert_eq!(body.max_stack(), 4);
        assert_eq!(body.local_var_sig_token(), 0x1100_0001);
        assert!(body.init_locals());
        assert!(body.has_extra_sections());
    }

    #[test]
    fn truncated_tiny_body() {
        let err = MethodBody::from_header(&[0x0E, 0x00]).unwrap_err();
        assert!(matches!(
            err,
            Error::Decode { kind: DecodeErrorKind::Truncated(_), .. }
        ));
    }

    #[test]
    fn invalid_format_bits() {
        let err = MethodBody::from_header(&[0x01, 0x00]).unwrap_err();
        assert!(matches!(
            err,
            Error::Decode { kind: DecodeErrorKind::InvalidHeader(0x01), .. }
        ));
    }
}
