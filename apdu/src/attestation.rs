// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Attested read records
//!
//! An attested read (`INS_READ | INS_ATTEST`) carries the usual read TLVs
//! followed by the attestation parameters:
//!
//! | tag | field |
//! |-----|-------|
//! | `TAG_5` | attestation key id (u32) |
//! | `TAG_6` | attestation algorithm (u8) |
//! | `TAG_7` | host random (16 bytes) |
//!
//! The response layout depends on the applet generation.
//!
//! ## TLV layout
//!
//! ```text
//! TAG_1 data | TAG_2 chip id | TAG_3 attributes | TAG_4 object size | TIMESTAMP | TAG_8 command | SIGNATURE
//! ```
//!
//! `TAG_8` echoes the command as received by the element. The signature
//! covers `SHA256(command) || TAG_1 .. TIMESTAMP`.
//!
//! ## Flat layout
//!
//! ```text
//! TAG_1 data | TAG_2 attributes | TAG_3 timestamp | TAG_4 out random | TAG_5 chip id | TAG_6 signature
//! ```
//!
//! The signature covers `data || attributes || timestamp || out random || chip id`.

use sha2::{Digest, Sha256};
use strum::Display;

use crate::{ApduError, Tag, TlvMap, TlvWriter};

/// Length of the host supplied attestation random
pub const ATTEST_RANDOM_LEN: usize = 16;

/// Attestation record layout
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Display)]
pub enum AttestationLayout {
    /// Tagged fields bound to the command digest
    #[default]
    Tlv,
    /// Plain concatenation of fields
    Flat,
}

/// Attestation metadata returned with an attested read
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttestationRecord {
    pub layout: AttestationLayout,
    /// Object data returned by the read
    pub data: Vec<u8>,
    pub chip_id: Vec<u8>,
    /// Encoded object attributes
    pub attributes: Vec<u8>,
    /// Object size (TLV layout only)
    pub obj_size: Option<u16>,
    pub timestamp: Vec<u8>,
    /// Random echoed by the element (flat layout only)
    pub out_random: Vec<u8>,
    /// Command as received by the element (TLV layout only)
    pub cmd: Vec<u8>,
    pub signature: Vec<u8>,
}

impl AttestationRecord {
    fn tlv_body(&self) -> TlvWriter {
        TlvWriter::new()
            .bytes(Tag::Tag1, &self.data)
            .bytes(Tag::Tag2, &self.chip_id)
            .bytes(Tag::Tag3, &self.attributes)
            .opt_u16(Tag::Tag4, self.obj_size)
            .bytes(Tag::Timestamp, &self.timestamp)
    }

    /// Decode an attested read response
    pub fn decode(layout: AttestationLayout, buff: &[u8]) -> Result<Self, ApduError> {
        let t = TlvMap::parse(buff)?;

        let r = match layout {
            AttestationLayout::Tlv => Self {
                layout,
                data: t.required(Tag::Tag1)?.to_vec(),
                chip_id: t.required(Tag::Tag2)?.to_vec(),
                attributes: t.required(Tag::Tag3)?.to_vec(),
                obj_size: t.opt_u16(Tag::Tag4)?,
                timestamp: t.required(Tag::Timestamp)?.to_vec(),
                out_random: vec![],
                cmd: t.required(Tag::Tag8)?.to_vec(),
                signature: t.required(Tag::Signature)?.to_vec(),
            },
            AttestationLayout::Flat => Self {
                layout,
                data: t.required(Tag::Tag1)?.to_vec(),
                attributes: t.required(Tag::Tag2)?.to_vec(),
                timestamp: t.required(Tag::Tag3)?.to_vec(),
                out_random: t.required(Tag::Tag4)?.to_vec(),
                chip_id: t.required(Tag::Tag5)?.to_vec(),
                obj_size: None,
                cmd: vec![],
                signature: t.required(Tag::Tag6)?.to_vec(),
            },
        };

        Ok(r)
    }

    /// Encode the record as an attested read response body
    pub fn encode(&self) -> Result<Vec<u8>, ApduError> {
        match self.layout {
            AttestationLayout::Tlv => self
                .tlv_body()
                .bytes(Tag::Tag8, &self.cmd)
                .bytes(Tag::Signature, &self.signature)
                .finish(),
            AttestationLayout::Flat => TlvWriter::new()
                .bytes(Tag::Tag1, &self.data)
                .bytes(Tag::Tag2, &self.attributes)
                .bytes(Tag::Tag3, &self.timestamp)
                .bytes(Tag::Tag4, &self.out_random)
                .bytes(Tag::Tag5, &self.chip_id)
                .bytes(Tag::Tag6, &self.signature)
                .finish(),
        }
    }

    /// Message covered by the attestation signature
    pub fn signed_message(&self) -> Result<Vec<u8>, ApduError> {
        match self.layout {
            AttestationLayout::Tlv => {
                let mut m = Sha256::digest(&self.cmd).to_vec();
                m.extend_from_slice(&self.tlv_body().finish()?);
                Ok(m)
            }
            AttestationLayout::Flat => Ok([
                &self.data[..],
                &self.attributes,
                &self.timestamp,
                &self.out_random,
                &self.chip_id,
            ]
            .concat()),
        }
    }
}
