//! PDU encoding and decoding.
//!
//! PDU format (all fields big-endian):
//! ```text
//! ┌──────────┬──────────┬──────────┬──────────────────────┐
//! │ len (4B) │ type(4B) │ from(4B) │   type-specific body  │
//! └──────────┴──────────┴──────────┴──────────────────────┘
//! ```
//! `len` counts the whole PDU, header included.
//!
//! Bodies handled here:
//! ```text
//! ERROR     code:i32
//! TEXT_REQ  ident:i32 type:i32
//! TEXT      ident:i32 buflen:i32 bytes[buflen] NUL-padded to 4 bytes
//! ```

use bytes::{Buf, BufMut};
use std::borrow::Cow;

use crate::types::{Error, Result, TextRequest};

/// Header size in bytes.
pub const HEADER_LEN: usize = 12;

/// PDU type: error or handshake.
pub const PDU_ERROR: u32 = 0x7000;
/// PDU type: text request.
pub const PDU_TEXT_REQ: u32 = 0x7008;
/// PDU type: text response.
pub const PDU_TEXT: u32 = 0x7009;

/// Protocol version announced by the collector on connect.
pub const PROTOCOL_VERSION: u32 = 2;

/// Short name for traces.
pub fn type_name(pdu_type: u32) -> &'static str {
    match pdu_type {
        PDU_ERROR => "ERROR",
        PDU_TEXT_REQ => "TEXT_REQ",
        PDU_TEXT => "TEXT",
        _ => "UNKNOWN",
    }
}

/// Decoded PDU header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PduHeader {
    pub len: u32,
    pub pdu_type: u32,
    pub from: u32,
}

impl PduHeader {
    /// Decode and sanity-check a header. `max_len` bounds `len`.
    pub fn decode(mut raw: &[u8], max_len: u32) -> Result<Self> {
        if raw.len() < HEADER_LEN {
            return Err(Error::Ipc);
        }
        let header = Self {
            len: raw.get_u32(),
            pdu_type: raw.get_u32(),
            from: raw.get_u32(),
        };
        if (header.len as usize) < HEADER_LEN {
            return Err(Error::Ipc);
        }
        if header.len > max_len {
            return Err(Error::TooBig);
        }
        Ok(header)
    }

    fn put(&self, buf: &mut Vec<u8>) {
        buf.put_u32(self.len);
        buf.put_u32(self.pdu_type);
        buf.put_u32(self.from);
    }
}

/// A PDU body that can be written to the wire.
pub trait Encode {
    const PDU_TYPE: u32;

    /// Body length in bytes, padding included.
    fn body_len(&self) -> usize;

    fn put_body(&self, buf: &mut Vec<u8>);

    /// Append the complete PDU (header and body) to `buf`.
    fn encode(&self, from: u32, buf: &mut Vec<u8>) {
        let len = HEADER_LEN + self.body_len();
        buf.reserve(len);
        PduHeader {
            len: len as u32,
            pdu_type: Self::PDU_TYPE,
            from,
        }
        .put(buf);
        self.put_body(buf);
    }
}

/// A PDU body that can be read back from a complete PDU.
///
/// Decoders may borrow from the PDU; anything kept past the buffer's pin
/// must be copied out first.
pub trait Decode<'a>: Sized {
    const PDU_TYPE: u32;

    fn decode_body(body: &'a [u8]) -> Result<Self>;

    fn decode(pdu: &'a [u8]) -> Result<Self> {
        let header = PduHeader::decode(pdu, u32::MAX)?;
        if header.pdu_type != Self::PDU_TYPE || header.len as usize != pdu.len() {
            return Err(Error::Ipc);
        }
        Self::decode_body(&pdu[HEADER_LEN..])
    }
}

/// ERROR body: a negative error code, or a non-negative protocol version
/// when sent as the connection handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorPdu {
    pub code: i32,
}

impl Encode for ErrorPdu {
    const PDU_TYPE: u32 = PDU_ERROR;

    fn body_len(&self) -> usize {
        4
    }

    fn put_body(&self, buf: &mut Vec<u8>) {
        buf.put_i32(self.code);
    }
}

impl<'a> Decode<'a> for ErrorPdu {
    const PDU_TYPE: u32 = PDU_ERROR;

    fn decode_body(mut body: &'a [u8]) -> Result<Self> {
        if body.len() != 4 {
            return Err(Error::Ipc);
        }
        Ok(Self {
            code: body.get_i32(),
        })
    }
}

impl ErrorPdu {
    /// Map the carried code onto the library's error set.
    pub fn into_error(self) -> Error {
        Error::from_code(self.code).unwrap_or_else(|| {
            tracing::warn!("peer sent unknown error code {}", self.code);
            Error::Ipc
        })
    }
}

/// TEXT_REQ body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextReqPdu {
    pub ident: u32,
    pub type_bits: u32,
}

impl From<&TextRequest> for TextReqPdu {
    fn from(req: &TextRequest) -> Self {
        Self {
            ident: req.ident,
            type_bits: req.type_bits(),
        }
    }
}

impl Encode for TextReqPdu {
    const PDU_TYPE: u32 = PDU_TEXT_REQ;

    fn body_len(&self) -> usize {
        8
    }

    fn put_body(&self, buf: &mut Vec<u8>) {
        buf.put_u32(self.ident);
        buf.put_u32(self.type_bits);
    }
}

impl<'a> Decode<'a> for TextReqPdu {
    const PDU_TYPE: u32 = PDU_TEXT_REQ;

    fn decode_body(mut body: &'a [u8]) -> Result<Self> {
        if body.len() != 8 {
            return Err(Error::Ipc);
        }
        Ok(Self {
            ident: body.get_u32(),
            type_bits: body.get_u32(),
        })
    }
}

/// TEXT body. Borrows its text from the PDU; text that is not UTF-8 fails
/// to decode with `Ipc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextPdu<'a> {
    pub ident: u32,
    pub text: Cow<'a, str>,
}

fn padded(len: usize) -> usize {
    (len + 3) & !3
}

impl Encode for TextPdu<'_> {
    const PDU_TYPE: u32 = PDU_TEXT;

    fn body_len(&self) -> usize {
        8 + padded(self.text.len())
    }

    fn put_body(&self, buf: &mut Vec<u8>) {
        let bytes = self.text.as_bytes();
        buf.put_u32(self.ident);
        buf.put_i32(bytes.len() as i32);
        buf.put_slice(bytes);
        buf.put_bytes(0, padded(bytes.len()) - bytes.len());
    }
}

impl<'a> Decode<'a> for TextPdu<'a> {
    const PDU_TYPE: u32 = PDU_TEXT;

    fn decode_body(mut body: &'a [u8]) -> Result<Self> {
        if body.len() < 8 {
            return Err(Error::Ipc);
        }
        let ident = body.get_u32();
        let buflen = body.get_i32();
        let buflen = usize::try_from(buflen).map_err(|_| Error::Ipc)?;
        if buflen > body.len() || padded(buflen) != body.len() {
            return Err(Error::Ipc);
        }
        let text = std::str::from_utf8(&body[..buflen]).map_err(|e| {
            tracing::debug!("TEXT for {:#x} is not UTF-8: {}", ident, e);
            Error::Ipc
        })?;
        Ok(Self {
            ident,
            text: Cow::Borrowed(text),
        })
    }
}

impl TextPdu<'_> {
    /// Copy the text out of the PDU.
    pub fn into_owned(self) -> String {
        self.text.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn text_pdu_is_bit_exact() {
        let mut buf = Vec::new();
        TextPdu {
            ident: 0x0f00_0001,
            text: Cow::Borrowed("hello"),
        }
        .encode(0, &mut buf);

        assert_eq!(
            buf,
            vec![
                0, 0, 0, 28, // len
                0, 0, 0x70, 0x09, // type
                0, 0, 0, 0, // from
                0x0f, 0, 0, 1, // ident
                0, 0, 0, 5, // buflen
                b'h', b'e', b'l', b'l', b'o', 0, 0, 0,
            ]
        );
    }

    #[test]
    fn text_req_layout() {
        let mut buf = Vec::new();
        TextReqPdu {
            ident: 7,
            type_bits: 0x6,
        }
        .encode(3, &mut buf);
        assert_eq!(buf.len(), 20);
        assert_eq!(&buf[..12], &[0, 0, 0, 20, 0, 0, 0x70, 0x08, 0, 0, 0, 3]);
        assert_eq!(TextReqPdu::decode(&buf).unwrap().type_bits, 0x6);
    }

    #[test]
    fn empty_text_has_no_padding() {
        let mut buf = Vec::new();
        TextPdu {
            ident: 1,
            text: Cow::Borrowed(""),
        }
        .encode(0, &mut buf);
        assert_eq!(buf.len(), HEADER_LEN + 8);
        let decoded = TextPdu::decode(&buf).unwrap();
        assert!(decoded.text.is_empty());
    }

    #[test]
    fn decoded_text_borrows_from_buffer() {
        let mut buf = Vec::new();
        TextPdu {
            ident: 1,
            text: Cow::Borrowed("disk reads"),
        }
        .encode(0, &mut buf);
        let decoded = TextPdu::decode(&buf).unwrap();
        assert!(matches!(decoded.text, Cow::Borrowed(_)));
        assert_eq!(decoded.into_owned(), "disk reads");
    }

    #[test]
    fn invalid_utf8_text_is_ipc() {
        let mut buf = Vec::new();
        TextPdu {
            ident: 3,
            text: Cow::Borrowed("abcd"),
        }
        .encode(0, &mut buf);
        let text_at = HEADER_LEN + 8;
        buf[text_at] = 0xff;
        buf[text_at + 1] = 0xfe;
        assert_eq!(TextPdu::decode(&buf).unwrap_err(), Error::Ipc);
    }

    #[test]
    fn wrong_type_is_ipc() {
        let mut buf = Vec::new();
        ErrorPdu { code: -12349 }.encode(0, &mut buf);
        assert_eq!(TextPdu::decode(&buf).unwrap_err(), Error::Ipc);
        assert_eq!(ErrorPdu::decode(&buf).unwrap().into_error(), Error::Text);
    }

    #[test]
    fn length_mismatch_is_ipc() {
        let mut buf = Vec::new();
        TextPdu {
            ident: 1,
            text: Cow::Borrowed("abc"),
        }
        .encode(0, &mut buf);
        buf.pop();
        assert_eq!(TextPdu::decode(&buf).unwrap_err(), Error::Ipc);
    }

    #[test]
    fn buflen_beyond_body_is_ipc() {
        let mut buf = Vec::new();
        TextPdu {
            ident: 1,
            text: Cow::Borrowed("abcd"),
        }
        .encode(0, &mut buf);
        buf[19] = 40;
        assert_eq!(TextPdu::decode(&buf).unwrap_err(), Error::Ipc);
    }

    #[test]
    fn header_limits() {
        let short = [0u8, 0, 0, 4, 0, 0, 0x70, 0, 0, 0, 0, 0];
        assert_eq!(PduHeader::decode(&short, 1024).unwrap_err(), Error::Ipc);
        let big = [0u8, 0, 0x10, 0, 0, 0, 0x70, 0, 0, 0, 0, 0];
        assert_eq!(PduHeader::decode(&big, 1024).unwrap_err(), Error::TooBig);
        assert_eq!(PduHeader::decode(&big[..8], 1024).unwrap_err(), Error::Ipc);
    }

    #[test]
    fn unknown_remote_code_collapses_to_ipc() {
        assert_eq!(ErrorPdu { code: -5 }.into_error(), Error::Ipc);
    }

    proptest::proptest! {
        #[test]
        fn text_survives_the_wire(ident in proptest::prelude::any::<u32>(), text in ".{0,64}") {
            let mut buf = Vec::new();
            TextPdu { ident, text: Cow::Borrowed(text.as_str()) }.encode(9, &mut buf);
            proptest::prop_assert_eq!(buf.len() % 4, 0);
            let decoded = TextPdu::decode(&buf).unwrap();
            proptest::prop_assert_eq!(decoded.ident, ident);
            proptest::prop_assert_eq!(decoded.text.as_ref(), text.as_str());
        }
    }
}
