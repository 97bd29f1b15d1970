// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Host-side RSA signature encodings (EMSA-PKCS1-v1_5 and EMSA-PSS)
//!
//! Digest signing on the element is a raw RSA private operation over a
//! block encoded here, and digest verification decodes the result of a raw
//! public operation.

use log::debug;
use se05x_apdu::types::DigestMode;

use crate::{algorithm::host_digest, Error};

const SHA1_PREFIX: &[u8] = &[
    0x30, 0x21, 0x30, 0x09, 0x06, 0x05, 0x2b, 0x0e, 0x03, 0x02, 0x1a, 0x05, 0x00, 0x04, 0x14,
];
const SHA224_PREFIX: &[u8] = &[
    0x30, 0x2d, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x04,
    0x05, 0x00, 0x04, 0x1c,
];
const SHA256_PREFIX: &[u8] = &[
    0x30, 0x31, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01,
    0x05, 0x00, 0x04, 0x20,
];
const SHA384_PREFIX: &[u8] = &[
    0x30, 0x41, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x02,
    0x05, 0x00, 0x04, 0x30,
];
const SHA512_PREFIX: &[u8] = &[
    0x30, 0x51, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x03,
    0x05, 0x00, 0x04, 0x40,
];

/// DER DigestInfo prefix for a digest
pub fn digest_info_prefix(mode: DigestMode) -> &'static [u8] {
    match mode {
        DigestMode::Sha => SHA1_PREFIX,
        DigestMode::Sha224 => SHA224_PREFIX,
        DigestMode::Sha256 => SHA256_PREFIX,
        DigestMode::Sha384 => SHA384_PREFIX,
        DigestMode::Sha512 => SHA512_PREFIX,
        DigestMode::NoHash => &[],
    }
}

/// Modulus length in bytes
pub fn modulus_len(bits: usize) -> usize {
    (bits + 7) / 8
}

/// EMSA-PKCS1-v1_5 encode a digest into a `k` byte block
pub fn pkcs1v15_encode(mode: DigestMode, hash: &[u8], k: usize) -> Result<Vec<u8>, Error> {
    let prefix = digest_info_prefix(mode);
    let t_len = prefix.len() + hash.len();

    if k < t_len + 11 {
        return Err(Error::InvalidArgument("intended encoded message length too short"));
    }

    let mut em = Vec::with_capacity(k);
    em.extend_from_slice(&[0x00, 0x01]);
    em.resize(k - t_len - 1, 0xFF);
    em.push(0x00);
    em.extend_from_slice(prefix);
    em.extend_from_slice(hash);

    Ok(em)
}

fn mgf1(mode: DigestMode, seed: &[u8], len: usize) -> Result<Vec<u8>, Error> {
    let mut mask = Vec::with_capacity(len + mode.output_len());
    let mut counter = 0u32;

    while mask.len() < len {
        let mut b = seed.to_vec();
        b.extend_from_slice(&counter.to_be_bytes());
        mask.extend(host_digest(mode, &b).ok_or(Error::Unsupported("MGF1 digest"))?);
        counter += 1;
    }

    mask.truncate(len);
    Ok(mask)
}

fn pss_hash(mode: DigestMode, m_hash: &[u8], salt: &[u8]) -> Result<Vec<u8>, Error> {
    let mut m = vec![0u8; 8];
    m.extend_from_slice(m_hash);
    m.extend_from_slice(salt);
    host_digest(mode, &m).ok_or(Error::Unsupported("PSS digest"))
}

/// EMSA-PSS encode a digest for a `bits` modulus (salt length equal to the
/// digest length), returning a modulus length block
pub fn pss_encode(mode: DigestMode, m_hash: &[u8], bits: usize, salt: &[u8]) -> Result<Vec<u8>, Error> {
    let h_len = mode.output_len();
    let em_bits = bits - 1;
    let em_len = (em_bits + 7) / 8;

    if m_hash.len() != h_len {
        return Err(Error::InvalidArgument("digest length does not match algorithm"));
    }
    if em_len < h_len + salt.len() + 2 {
        debug!("PSS encoding of {} byte digest does not fit {} bit key", h_len, bits);
        return Err(Error::InvalidArgument("key too small for PSS digest"));
    }

    let h = pss_hash(mode, m_hash, salt)?;

    let mut db = vec![0u8; em_len - salt.len() - h_len - 2];
    db.push(0x01);
    db.extend_from_slice(salt);

    let mask = mgf1(mode, &h, em_len - h_len - 1)?;
    db.iter_mut().zip(mask.iter()).for_each(|(d, m)| *d ^= m);
    db[0] &= 0xFF >> (8 * em_len - em_bits);

    let mut em = Vec::with_capacity(modulus_len(bits));
    if em_len < modulus_len(bits) {
        em.push(0x00);
    }
    em.extend_from_slice(&db);
    em.extend_from_slice(&h);
    em.push(0xBC);

    Ok(em)
}

/// EMSA-PSS verify a decoded block (modulus length, big-endian) against a
/// digest
pub fn pss_verify(mode: DigestMode, m_hash: &[u8], block: &[u8], bits: usize) -> bool {
    let h_len = mode.output_len();
    let s_len = h_len;
    let em_bits = bits - 1;
    let em_len = (em_bits + 7) / 8;

    if m_hash.len() != h_len || block.len() < em_len || em_len < h_len + s_len + 2 {
        return false;
    }

    let (lead, em) = block.split_at(block.len() - em_len);
    if lead.iter().any(|b| *b != 0) || em[em_len - 1] != 0xBC {
        return false;
    }

    let (masked_db, rest) = em.split_at(em_len - h_len - 1);
    let h = &rest[..h_len];

    let top = 0xFFu8 >> (8 * em_len - em_bits);
    if masked_db[0] & !top != 0 {
        return false;
    }

    let mask = match mgf1(mode, h, masked_db.len()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    let mut db: Vec<u8> = masked_db.iter().zip(mask.iter()).map(|(d, m)| d ^ m).collect();
    db[0] &= top;

    let ps_len = em_len - h_len - s_len - 2;
    if db[..ps_len].iter().any(|b| *b != 0) || db[ps_len] != 0x01 {
        return false;
    }

    let salt = &db[db.len() - s_len..];
    matches!(pss_hash(mode, m_hash, salt), Ok(v) if v == h)
}
