// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Applet version information

use byteorder::{BigEndian, ByteOrder};
use encdec::{DecodeOwned, Encode};

use crate::{types::AppletFeatures, ApduError};

/// Applet version, as returned by applet select and `GetVersion`
///
/// ## Encoding
///
/// ```text
/// +-------+-------+-------+---------------+----------------+
/// | MAJOR | MINOR | PATCH | APPLET_CONFIG |   SECURE_BOX   |
/// +-------+-------+-------+---------------+----------------+
/// |   1   |   1   |   1   |     2 (BE)    |     2 (BE)     |
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AppletVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
    /// Enabled applet features
    pub config: AppletFeatures,
    /// SecureBox version
    pub secure_box: u16,
}

impl AppletVersion {
    /// Encoded length
    pub const LEN: usize = 7;

    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
            config: AppletFeatures::all(),
            secure_box: 0,
        }
    }

    /// Packed version for comparisons (`MAJOR << 24 | MINOR << 16 | PATCH << 8`)
    pub const fn as_u32(&self) -> u32 {
        (self.major as u32) << 24 | (self.minor as u32) << 16 | (self.patch as u32) << 8
    }
}

impl core::fmt::Display for AppletVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Encode for AppletVersion {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(Self::LEN)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        if buff.len() < Self::LEN {
            return Err(ApduError::InvalidLength);
        }

        buff[0] = self.major;
        buff[1] = self.minor;
        buff[2] = self.patch;
        self.config.encode(&mut buff[3..])?;
        BigEndian::write_u16(&mut buff[5..], self.secure_box);

        Ok(Self::LEN)
    }
}

impl DecodeOwned for AppletVersion {
    type Output = Self;
    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        if buff.len() < Self::LEN {
            return Err(ApduError::InvalidLength);
        }

        let (config, _) = AppletFeatures::decode_owned(&buff[3..])?;

        Ok((
            Self {
                major: buff[0],
                minor: buff[1],
                patch: buff[2],
                config,
                secure_box: BigEndian::read_u16(&buff[5..]),
            },
            Self::LEN,
        ))
    }
}
