// Copyright (c) 2022-2023 The MobileCoin Foundation

//! ECKey session authentication primitives
//!
//! The host proves possession of the static key registered as the session
//! authentication object by signing an ephemeral P-256 public key. The
//! element answers with a card challenge and a receipt. Both sides derive
//! the session keys from the ECDH secret between the host ephemeral key
//! and the element ECKA key.
//!
//! ## INTERNAL AUTHENTICATE body
//!
//! ```text
//! A6 0D <control template> || 7F49 LL <ephemeral public> || 5F37 LL <signature>
//! ```
//!
//! ## Response
//!
//! ```text
//! 85 10 <card challenge> || 86 10 <receipt>
//! ```

use hkdf::Hkdf;
use sha2::Sha256;

use crate::{
    scp03::{cmac, Key, SessionKeys, KEY_LEN},
    tlv::{decode_one, encode_len},
    ApduError,
};

/// INTERNAL AUTHENTICATE instruction
pub const INS_INTERNAL_AUTHENTICATE: u8 = 0x88;

/// Control reference template (SCP parameters, key usage, key type, key length)
pub const CONTROL_TEMPLATE: [u8; 15] = [
    0xA6, 0x0D, 0x90, 0x02, 0x11, 0x00, 0x95, 0x01, 0x3C, 0x80, 0x01, 0x88, 0x81, 0x01, 0x10,
];

/// Card challenge length
pub const CHALLENGE_LEN: usize = 16;

/// Receipt length
pub const RECEIPT_LEN: usize = 16;

const TAG_PUBLIC_KEY: [u8; 2] = [0x7F, 0x49];
const TAG_SIGNATURE: [u8; 2] = [0x5F, 0x37];
const TAG_CHALLENGE: u8 = 0x85;
const TAG_RECEIPT: u8 = 0x86;

/// Keys derived by a successful ECKey authentication
pub struct EcKeySession {
    pub keys: SessionKeys,
    pub receipt: [u8; RECEIPT_LEN],
}

fn push_tlv(out: &mut Vec<u8>, tag: &[u8], value: &[u8]) -> Result<(), ApduError> {
    out.extend_from_slice(tag);
    encode_len(value.len(), out)?;
    out.extend_from_slice(value);
    Ok(())
}

/// Read a two byte tag field, returning the value and remaining bytes
fn take_tlv2<'a>(buff: &'a [u8], tag: &[u8; 2]) -> Result<(&'a [u8], &'a [u8]), ApduError> {
    if buff.first() != Some(&tag[0]) {
        return Err(ApduError::MissingTag(tag[0]));
    }

    let (t, n) = decode_one(&buff[1..])?;
    if t.tag != tag[1] {
        return Err(ApduError::MissingTag(tag[1]));
    }

    Ok((t.value, &buff[1 + n..]))
}

/// Bytes signed by the host static key
pub fn signed_message(ephemeral_public: &[u8]) -> Vec<u8> {
    let mut m = CONTROL_TEMPLATE.to_vec();
    m.extend_from_slice(ephemeral_public);
    m
}

/// Encode the INTERNAL AUTHENTICATE body
pub fn encode_request(ephemeral_public: &[u8], signature: &[u8]) -> Result<Vec<u8>, ApduError> {
    let mut b = CONTROL_TEMPLATE.to_vec();
    push_tlv(&mut b, &TAG_PUBLIC_KEY, ephemeral_public)?;
    push_tlv(&mut b, &TAG_SIGNATURE, signature)?;
    Ok(b)
}

/// Decode the INTERNAL AUTHENTICATE body, returning the ephemeral public
/// key and signature
pub fn decode_request(buff: &[u8]) -> Result<(&[u8], &[u8]), ApduError> {
    let rest = buff
        .strip_prefix(&CONTROL_TEMPLATE[..])
        .ok_or(ApduError::InvalidEncoding)?;

    let (public, rest) = take_tlv2(rest, &TAG_PUBLIC_KEY)?;
    let (signature, rest) = take_tlv2(rest, &TAG_SIGNATURE)?;

    if !rest.is_empty() {
        return Err(ApduError::InvalidLength);
    }

    Ok((public, signature))
}

/// Encode the INTERNAL AUTHENTICATE response
pub fn encode_response(challenge: &[u8; CHALLENGE_LEN], receipt: &[u8; RECEIPT_LEN]) -> Vec<u8> {
    let mut b = vec![TAG_CHALLENGE, CHALLENGE_LEN as u8];
    b.extend_from_slice(challenge);
    b.extend_from_slice(&[TAG_RECEIPT, RECEIPT_LEN as u8]);
    b.extend_from_slice(receipt);
    b
}

/// Decode the INTERNAL AUTHENTICATE response
pub fn decode_response(
    buff: &[u8],
) -> Result<([u8; CHALLENGE_LEN], [u8; RECEIPT_LEN]), ApduError> {
    let (c, n) = decode_one(buff)?;
    let (r, _) = decode_one(&buff[n..])?;

    if c.tag != TAG_CHALLENGE {
        return Err(ApduError::MissingTag(TAG_CHALLENGE));
    }
    if r.tag != TAG_RECEIPT {
        return Err(ApduError::MissingTag(TAG_RECEIPT));
    }

    let challenge = c.value.try_into().map_err(|_| ApduError::InvalidLength)?;
    let receipt = r.value.try_into().map_err(|_| ApduError::InvalidLength)?;

    Ok((challenge, receipt))
}

/// Derive session keys and the expected receipt from the ECDH shared secret
pub fn derive(
    shared_secret: &[u8],
    challenge: &[u8; CHALLENGE_LEN],
    ephemeral_public: &[u8],
) -> Result<EcKeySession, ApduError> {
    let hk = Hkdf::<Sha256>::new(Some(challenge), shared_secret);

    let expand = |info: &[u8]| -> Result<Key, ApduError> {
        let mut k = [0u8; KEY_LEN];
        hk.expand(info, &mut k).map_err(|_| ApduError::InvalidLength)?;
        Ok(k)
    };

    let keys = SessionKeys {
        enc: expand(b"ENC")?,
        mac: expand(b"MAC")?,
        rmac: expand(b"RMAC")?,
    };

    let receipt_key = expand(b"RECEIPT")?;
    let receipt = cmac(&receipt_key, &[&CONTROL_TEMPLATE, ephemeral_public, challenge]);

    Ok(EcKeySession { keys, receipt })
}
