// Copyright (c) 2022-2023 The MobileCoin Foundation

//! TLV codec for SE05x command and response bodies
//!
//! Each field is `TAG || LEN || VALUE` with a one byte tag and a BER-style
//! length (`0x00..=0x7F`, `0x81 LL`, or `0x82 HH LL`).

use byteorder::{BigEndian, ByteOrder};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum::Display;

use crate::ApduError;

/// SE05x TLV tags
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Tag {
    SessionId = 0x10,
    Policy = 0x11,
    MaxAttempts = 0x12,
    ImportAuthData = 0x13,
    ImportAuthKeyId = 0x14,
    PolicyCheck = 0x15,
    Tag1 = 0x41,
    Tag2 = 0x42,
    Tag3 = 0x43,
    Tag4 = 0x44,
    Tag5 = 0x45,
    Tag6 = 0x46,
    Tag7 = 0x47,
    Tag8 = 0x48,
    Tag9 = 0x49,
    Tag10 = 0x4A,
    Tag11 = 0x4B,
    Timestamp = 0x4F,
    Signature = 0x52,
}

/// Encode a TLV length field
pub fn encode_len(len: usize, out: &mut Vec<u8>) -> Result<(), ApduError> {
    match len {
        0..=0x7F => out.push(len as u8),
        0x80..=0xFF => out.extend_from_slice(&[0x81, len as u8]),
        0x100..=0xFFFF => out.extend_from_slice(&[0x82, (len >> 8) as u8, len as u8]),
        _ => return Err(ApduError::InvalidLength),
    }
    Ok(())
}

/// Builder for TLV encoded command bodies
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TlvWriter {
    buff: Vec<u8>,
    err: Option<ApduError>,
}

impl TlvWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw byte field
    pub fn bytes(mut self, tag: Tag, value: &[u8]) -> Self {
        self.buff.push(tag.into());
        if let Err(e) = encode_len(value.len(), &mut self.buff) {
            self.err = Some(e);
            return self;
        }
        self.buff.extend_from_slice(value);
        self
    }

    /// Append a byte field if present
    pub fn opt_bytes(self, tag: Tag, value: Option<&[u8]>) -> Self {
        match value {
            Some(v) => self.bytes(tag, v),
            None => self,
        }
    }

    /// Append a byte field if present and non-empty
    pub fn non_empty(self, tag: Tag, value: &[u8]) -> Self {
        match value.is_empty() {
            true => self,
            false => self.bytes(tag, value),
        }
    }

    pub fn u8(self, tag: Tag, value: u8) -> Self {
        self.bytes(tag, &[value])
    }

    pub fn u16(self, tag: Tag, value: u16) -> Self {
        self.bytes(tag, &value.to_be_bytes())
    }

    pub fn u32(self, tag: Tag, value: u32) -> Self {
        self.bytes(tag, &value.to_be_bytes())
    }

    pub fn opt_u8(self, tag: Tag, value: Option<u8>) -> Self {
        match value {
            Some(v) => self.u8(tag, v),
            None => self,
        }
    }

    pub fn opt_u16(self, tag: Tag, value: Option<u16>) -> Self {
        match value {
            Some(v) => self.u16(tag, v),
            None => self,
        }
    }

    pub fn opt_u32(self, tag: Tag, value: Option<u32>) -> Self {
        match value {
            Some(v) => self.u32(tag, v),
            None => self,
        }
    }

    /// Append untagged bytes
    pub fn raw(mut self, value: &[u8]) -> Self {
        self.buff.extend_from_slice(value);
        self
    }

    /// Complete encoding, returning the body
    pub fn finish(self) -> Result<Vec<u8>, ApduError> {
        match self.err {
            Some(e) => Err(e),
            None => Ok(self.buff),
        }
    }
}

/// Single decoded TLV field
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Tlv<'a> {
    pub tag: u8,
    pub value: &'a [u8],
}

/// Decode a single TLV field, returning the field and the bytes consumed
pub fn decode_one(buff: &[u8]) -> Result<(Tlv<'_>, usize), ApduError> {
    if buff.len() < 2 {
        return Err(ApduError::InvalidLength);
    }

    let tag = buff[0];
    let (len, hdr) = match buff[1] {
        l @ 0..=0x7F => (l as usize, 2),
        0x81 if buff.len() >= 3 => (buff[2] as usize, 3),
        0x82 if buff.len() >= 4 => (BigEndian::read_u16(&buff[2..]) as usize, 4),
        _ => return Err(ApduError::InvalidEncoding),
    };

    if buff.len() < hdr + len {
        return Err(ApduError::InvalidLength);
    }

    Ok((
        Tlv {
            tag,
            value: &buff[hdr..][..len],
        },
        hdr + len,
    ))
}

/// Decoded TLV body, preserving field order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TlvMap<'a> {
    fields: Vec<Tlv<'a>>,
}

impl<'a> TlvMap<'a> {
    /// Parse a complete TLV body
    pub fn parse(mut buff: &'a [u8]) -> Result<Self, ApduError> {
        let mut fields = vec![];

        while !buff.is_empty() {
            let (t, n) = decode_one(buff)?;
            fields.push(t);
            buff = &buff[n..];
        }

        Ok(Self { fields })
    }

    /// Parse the leading TLV fields of a buffer, stopping at the first field
    /// that is not one of `tags`, and returning the unparsed remainder
    pub fn parse_prefix(mut buff: &'a [u8], tags: &[Tag]) -> Result<(Self, &'a [u8]), ApduError> {
        let mut fields = vec![];

        while let Some(t) = buff.first() {
            if !tags.iter().any(|v| u8::from(*v) == *t) {
                break;
            }
            let (t, n) = decode_one(buff)?;
            fields.push(t);
            buff = &buff[n..];
        }

        Ok((Self { fields }, buff))
    }

    /// Fetch a field by tag
    pub fn get(&self, tag: Tag) -> Option<&'a [u8]> {
        let t = u8::from(tag);
        self.fields.iter().find(|f| f.tag == t).map(|f| f.value)
    }

    /// Fetch a mandatory field by tag
    pub fn required(&self, tag: Tag) -> Result<&'a [u8], ApduError> {
        self.get(tag).ok_or(ApduError::MissingTag(tag.into()))
    }

    pub fn u8(&self, tag: Tag) -> Result<u8, ApduError> {
        match self.required(tag)? {
            [v] => Ok(*v),
            _ => Err(ApduError::InvalidLength),
        }
    }

    pub fn u16(&self, tag: Tag) -> Result<u16, ApduError> {
        match self.required(tag)? {
            v if v.len() == 2 => Ok(BigEndian::read_u16(v)),
            _ => Err(ApduError::InvalidLength),
        }
    }

    pub fn u32(&self, tag: Tag) -> Result<u32, ApduError> {
        match self.required(tag)? {
            v if v.len() == 4 => Ok(BigEndian::read_u32(v)),
            _ => Err(ApduError::InvalidLength),
        }
    }

    pub fn opt_u8(&self, tag: Tag) -> Result<Option<u8>, ApduError> {
        match self.get(tag) {
            Some(_) => self.u8(tag).map(Some),
            None => Ok(None),
        }
    }

    pub fn opt_u16(&self, tag: Tag) -> Result<Option<u16>, ApduError> {
        match self.get(tag) {
            Some(_) => self.u16(tag).map(Some),
            None => Ok(None),
        }
    }

    pub fn opt_u32(&self, tag: Tag) -> Result<Option<u32>, ApduError> {
        match self.get(tag) {
            Some(_) => self.u32(tag).map(Some),
            None => Ok(None),
        }
    }

    /// Check whether a tag is present
    pub fn contains(&self, tag: Tag) -> bool {
        self.get(tag).is_some()
    }

    /// Iterate over fields in encoded order
    pub fn iter(&self) -> impl Iterator<Item = &Tlv<'a>> {
        self.fields.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tlv_lengths() {
        let long = [0xaa; 0x1F0];

        let b = TlvWriter::new()
            .u32(Tag::Tag1, 0x7DB0_0001)
            .bytes(Tag::Tag2, &[0x55; 0x90])
            .bytes(Tag::Tag3, &long)
            .finish()
            .unwrap();

        assert_eq!(&b[..6], &[0x41, 0x04, 0x7D, 0xB0, 0x00, 0x01]);
        assert_eq!(&b[6..9], &[0x42, 0x81, 0x90]);
        assert_eq!(&b[9 + 0x90..][..4], &[0x43, 0x82, 0x01, 0xF0]);

        let m = TlvMap::parse(&b).unwrap();
        assert_eq!(m.u32(Tag::Tag1), Ok(0x7DB0_0001));
        assert_eq!(m.get(Tag::Tag2).map(|v| v.len()), Some(0x90));
        assert_eq!(m.get(Tag::Tag3), Some(&long[..]));
        assert_eq!(m.get(Tag::Tag4), None);
        assert_eq!(m.required(Tag::Tag4), Err(ApduError::MissingTag(0x44)));
    }

    #[test]
    fn tlv_truncated() {
        assert_eq!(
            TlvMap::parse(&[0x41, 0x04, 0x01, 0x02]),
            Err(ApduError::InvalidLength)
        );
        assert_eq!(TlvMap::parse(&[0x41, 0x83, 0x00]), Err(ApduError::InvalidEncoding));
    }

    #[test]
    fn tlv_prefix() {
        let b = TlvWriter::new()
            .bytes(Tag::SessionId, &[1, 2, 3, 4, 5, 6, 7, 8])
            .raw(&[0x80, 0x04, 0x00, 0x27])
            .finish()
            .unwrap();

        let (m, rest) = TlvMap::parse_prefix(&b, &[Tag::SessionId]).unwrap();
        assert_eq!(m.get(Tag::SessionId), Some(&[1u8, 2, 3, 4, 5, 6, 7, 8][..]));
        assert_eq!(rest, &[0x80, 0x04, 0x00, 0x27]);
    }
}
