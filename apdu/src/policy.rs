// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Object and session policy encodings
//!
//! ## Object policy
//!
//! A policy set is a concatenation of entries, each scoped to one
//! authentication object:
//!
//! ```text
//! +--------+--------------------+-------------------+-------------+
//! | LEN(1) | AUTH_OBJ_ID (4 BE) | ACCESS_RULES (4)  | EXT (LEN-8) |
//! +--------+--------------------+-------------------+-------------+
//! ```
//!
//! An entry with `AUTH_OBJ_ID == 0` applies to every session.
//!
//! ## Session policy
//!
//! ```text
//! +--------+------------------+-----------------+-----------------+
//! | LEN(1) | SESSION_RULES(2) | MAX_APDU (2)?   | MAX_TIME (2)?   |
//! +--------+------------------+-----------------+-----------------+
//! ```

use byteorder::{BigEndian, ByteOrder};

use crate::ApduError;

bitflags::bitflags! {
    /// Object access rules
    pub struct AccessRules: u32 {
        const FORBID_ALL = 0x2000_0000;
        const SIGN = 0x1000_0000;
        const VERIFY = 0x0800_0000;
        const KA = 0x0400_0000;
        const ENC = 0x0200_0000;
        const DEC = 0x0100_0000;
        const KDF = 0x0080_0000;
        const WRAP = 0x0040_0000;
        const READ = 0x0020_0000;
        const WRITE = 0x0010_0000;
        const GEN = 0x0008_0000;
        const DELETE = 0x0004_0000;
        const REQUIRE_SM = 0x0002_0000;
        const REQUIRE_PCR = 0x0001_0000;
        const ATTEST = 0x0000_8000;
        const IMPORT_EXPORT = 0x0000_1000;
        const FORBID_DERIVED_OUTPUT = 0x0000_0800;
    }
}

crate::encdec_bitflags!(AccessRules, u32);

bitflags::bitflags! {
    /// Session access rules
    pub struct SessionRules: u16 {
        const MAX_APDU = 0x8000;
        const MAX_TIME = 0x4000;
        const ALLOW_REFRESH = 0x2000;
    }
}

crate::encdec_bitflags!(SessionRules, u16);

/// Policy entry for a single authentication object
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectPolicy {
    /// Authentication object the rules apply to (`0` for all)
    pub auth_id: u32,
    /// Permitted operations
    pub rules: AccessRules,
    /// Rule extension (eg. PCR object id and expected value)
    pub ext: Vec<u8>,
}

impl ObjectPolicy {
    pub fn new(auth_id: u32, rules: AccessRules) -> Self {
        Self {
            auth_id,
            rules,
            ext: vec![],
        }
    }

    fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), ApduError> {
        let len = 8 + self.ext.len();
        if len > u8::MAX as usize {
            return Err(ApduError::InvalidLength);
        }

        out.push(len as u8);
        out.extend_from_slice(&self.auth_id.to_be_bytes());
        out.extend_from_slice(&self.rules.bits().to_be_bytes());
        out.extend_from_slice(&self.ext);

        Ok(())
    }
}

/// Set of object policies attached on creation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicySet(pub Vec<ObjectPolicy>);

impl PolicySet {
    /// Create a policy set with a single entry
    pub fn single(auth_id: u32, rules: AccessRules) -> Self {
        Self(vec![ObjectPolicy::new(auth_id, rules)])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encode policy entries
    pub fn encode(&self) -> Result<Vec<u8>, ApduError> {
        let mut b = vec![];
        for p in &self.0 {
            p.encode_into(&mut b)?;
        }
        Ok(b)
    }

    /// Decode policy entries
    pub fn decode(mut buff: &[u8]) -> Result<Self, ApduError> {
        let mut v = vec![];

        while let Some(len) = buff.first() {
            let len = *len as usize;
            if len < 8 || buff.len() < len + 1 {
                return Err(ApduError::InvalidLength);
            }

            let e = &buff[1..][..len];
            v.push(ObjectPolicy {
                auth_id: BigEndian::read_u32(&e[..4]),
                rules: AccessRules::from_bits_truncate(BigEndian::read_u32(&e[4..8])),
                ext: e[8..].to_vec(),
            });

            buff = &buff[len + 1..];
        }

        Ok(Self(v))
    }

    /// Find the rules applicable to an authentication object
    ///
    /// Returns `None` when no entry matches (access is unrestricted).
    pub fn rules_for(&self, auth_id: u32) -> Option<AccessRules> {
        self.0
            .iter()
            .find(|p| p.auth_id == auth_id)
            .or_else(|| self.0.iter().find(|p| p.auth_id == 0))
            .map(|p| p.rules)
    }
}

/// Session policy applied on ExchangeSessionData / RefreshSession
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Maximum number of APDUs permitted in the session
    pub max_apdu: Option<u16>,
    /// Maximum session lifetime
    pub max_time: Option<u16>,
    /// Allow session refresh
    pub allow_refresh: bool,
}

impl SessionPolicy {
    /// Session rule bits implied by the policy fields
    pub fn rules(&self) -> SessionRules {
        let mut r = SessionRules::empty();
        r.set(SessionRules::MAX_APDU, self.max_apdu.is_some());
        r.set(SessionRules::MAX_TIME, self.max_time.is_some());
        r.set(SessionRules::ALLOW_REFRESH, self.allow_refresh);
        r
    }

    /// Encode the session policy
    pub fn encode(&self) -> Vec<u8> {
        let mut b = vec![0u8];
        b.extend_from_slice(&self.rules().bits().to_be_bytes());
        if let Some(v) = self.max_apdu {
            b.extend_from_slice(&v.to_be_bytes());
        }
        if let Some(v) = self.max_time {
            b.extend_from_slice(&v.to_be_bytes());
        }
        b[0] = (b.len() - 1) as u8;
        b
    }

    /// Decode a session policy
    pub fn decode(buff: &[u8]) -> Result<Self, ApduError> {
        if buff.len() < 3 || buff[0] as usize != buff.len() - 1 {
            return Err(ApduError::InvalidLength);
        }

        let rules = SessionRules::from_bits_truncate(BigEndian::read_u16(&buff[1..]));
        let mut rest = &buff[3..];
        let mut next = || -> Result<u16, ApduError> {
            if rest.len() < 2 {
                return Err(ApduError::InvalidLength);
            }
            let v = BigEndian::read_u16(rest);
            rest = &rest[2..];
            Ok(v)
        };

        let max_apdu = match rules.contains(SessionRules::MAX_APDU) {
            true => Some(next()?),
            false => None,
        };
        let max_time = match rules.contains(SessionRules::MAX_TIME) {
            true => Some(next()?),
            false => None,
        };

        Ok(Self {
            max_apdu,
            max_time,
            allow_refresh: rules.contains(SessionRules::ALLOW_REFRESH),
        })
    }
}
