// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Stream framing for APDUs carried over TCP
//!
//! Each message is prefixed with a four byte header (as used by JRCP
//! style remote card proxies):
//!
//! ```text
//! +-----+-----+--------------+
//! | MTY | NAD |   LEN (BE)   |
//! +-----+-----+--------------+
//! |  1  |  1  |      2       |
//! ```

use byteorder::{BigEndian, ByteOrder};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::ApduError;

/// Frame header length
pub const HEADER_LEN: usize = 4;

/// Message types
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MessageType {
    /// APDU command or response
    Apdu = 0x01,
    /// Connection close notification
    Close = 0x02,
}

/// Frame header
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub mty: MessageType,
    pub nad: u8,
    pub len: u16,
}

impl FrameHeader {
    /// Create an APDU frame header for a payload of `len` bytes
    pub fn apdu(len: usize) -> Result<Self, ApduError> {
        let len = u16::try_from(len).map_err(|_| ApduError::InvalidLength)?;
        Ok(Self {
            mty: MessageType::Apdu,
            nad: 0x00,
            len,
        })
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut b = [self.mty.into(), self.nad, 0, 0];
        BigEndian::write_u16(&mut b[2..], self.len);
        b
    }

    pub fn decode(b: &[u8; HEADER_LEN]) -> Result<Self, ApduError> {
        let mty = MessageType::try_from(b[0]).map_err(|_| ApduError::UnknownValue(b[0] as u32))?;
        Ok(Self {
            mty,
            nad: b[1],
            len: BigEndian::read_u16(&b[2..]),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn frame_header() {
        let h = FrameHeader::apdu(0x0107).unwrap();
        assert_eq!(h.encode(), [0x01, 0x00, 0x01, 0x07]);
        assert_eq!(FrameHeader::decode(&h.encode()), Ok(h));

        assert_eq!(FrameHeader::apdu(0x1_0000), Err(ApduError::InvalidLength));
        assert_eq!(
            FrameHeader::decode(&[0x07, 0x00, 0x00, 0x00]),
            Err(ApduError::UnknownValue(7))
        );
    }
}
