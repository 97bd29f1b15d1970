// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Secure object attributes, as returned by `ReadObjectAttributes`
//!
//! ## Encoding
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           OBJECT_ID                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |   OBJ_TYPE    |   AUTH_IND    |        AUTH_ATTEMPTS          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                          AUTH_OBJ_ID                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |         MAX_ATTEMPTS          |           POLICY...           /
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! /     ...POLICY     |   ORIGIN    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use byteorder::{BigEndian, ByteOrder};
use encdec::{DecodeOwned, Encode};

use crate::{
    policy::PolicySet,
    types::{Origin, SecObjType},
    ApduError,
};

/// Fixed header length preceding the policy
const HEADER_LEN: usize = 14;

/// Secure object attributes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectAttributes {
    /// Object identifier
    pub id: u32,
    /// Object type
    pub obj_type: SecObjType,
    /// Object is an authentication object
    pub auth: bool,
    /// Failed authentication attempts
    pub auth_attempts: u16,
    /// Authentication object that created this object
    pub auth_id: u32,
    /// Maximum authentication attempts (`0` for unlimited)
    pub max_attempts: u16,
    /// Attached policy
    pub policy: PolicySet,
    /// Object origin
    pub origin: Origin,
}

impl Encode for ObjectAttributes {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, Self::Error> {
        Ok(HEADER_LEN + self.policy.encode()?.len() + 1)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        let policy = self.policy.encode()?;
        let len = HEADER_LEN + policy.len() + 1;

        if buff.len() < len {
            return Err(ApduError::InvalidLength);
        }

        BigEndian::write_u32(&mut buff[0..], self.id);
        buff[4] = self.obj_type.into();
        buff[5] = self.auth as u8;
        BigEndian::write_u16(&mut buff[6..], self.auth_attempts);
        BigEndian::write_u32(&mut buff[8..], self.auth_id);
        BigEndian::write_u16(&mut buff[12..], self.max_attempts);
        buff[HEADER_LEN..][..policy.len()].copy_from_slice(&policy);
        buff[len - 1] = self.origin.into();

        Ok(len)
    }
}

impl DecodeOwned for ObjectAttributes {
    type Output = Self;
    type Error = ApduError;

    /// Decode attributes, consuming the whole buffer
    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Self::Error> {
        if buff.len() < HEADER_LEN + 1 {
            return Err(ApduError::InvalidLength);
        }

        let obj_type = SecObjType::try_from(buff[4])
            .map_err(|_| ApduError::UnknownValue(buff[4] as u32))?;
        let origin = Origin::try_from(buff[buff.len() - 1])
            .map_err(|_| ApduError::UnknownValue(buff[buff.len() - 1] as u32))?;

        Ok((
            Self {
                id: BigEndian::read_u32(&buff[0..]),
                obj_type,
                auth: buff[5] != 0,
                auth_attempts: BigEndian::read_u16(&buff[6..]),
                auth_id: BigEndian::read_u32(&buff[8..]),
                max_attempts: BigEndian::read_u16(&buff[12..]),
                policy: PolicySet::decode(&buff[HEADER_LEN..buff.len() - 1])?,
                origin,
            },
            buff.len(),
        ))
    }
}
