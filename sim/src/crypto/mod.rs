// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Element side cryptographic primitives

use hkdf::Hkdf;
use hmac::{digest::KeyInit, Hmac, Mac};
use rand_core::{OsRng, RngCore};
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

use se05x_apdu::types::{DigestMode, MacAlgo};

use crate::Error;

pub mod cipher;
pub mod ec;
pub mod rsa;

/// Fetch `len` random bytes
pub fn random(len: usize) -> Vec<u8> {
    let mut b = vec![0u8; len];
    OsRng.fill_bytes(&mut b);
    b
}

/// Compute a digest
pub fn digest(mode: DigestMode, data: &[u8]) -> Result<Vec<u8>, Error> {
    let d = match mode {
        DigestMode::Sha => Sha1::digest(data).to_vec(),
        DigestMode::Sha224 => Sha224::digest(data).to_vec(),
        DigestMode::Sha256 => Sha256::digest(data).to_vec(),
        DigestMode::Sha384 => Sha384::digest(data).to_vec(),
        DigestMode::Sha512 => Sha512::digest(data).to_vec(),
        DigestMode::NoHash => return Err(Error::Unsupported("digest mode")),
    };
    Ok(d)
}

fn mac_with<M: Mac + KeyInit>(key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut m = <M as KeyInit>::new_from_slice(key).map_err(|_| Error::InvalidData("MAC key length"))?;
    m.update(data);
    Ok(m.finalize().into_bytes().to_vec())
}

/// Compute an HMAC or CMAC
pub fn mac(algo: MacAlgo, key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
    use cmac::Cmac;

    match algo {
        MacAlgo::HmacSha1 => mac_with::<Hmac<Sha1>>(key, data),
        MacAlgo::HmacSha256 => mac_with::<Hmac<Sha256>>(key, data),
        MacAlgo::HmacSha384 => mac_with::<Hmac<Sha384>>(key, data),
        MacAlgo::HmacSha512 => mac_with::<Hmac<Sha512>>(key, data),
        MacAlgo::Cmac128 => match key.len() {
            16 => mac_with::<Cmac<aes::Aes128>>(key, data),
            24 => mac_with::<Cmac<aes::Aes192>>(key, data),
            32 => mac_with::<Cmac<aes::Aes256>>(key, data),
            _ => Err(Error::InvalidData("AES key length")),
        },
        MacAlgo::DesCmac8 => match key.len() {
            8 => mac_with::<Cmac<des::Des>>(key, data),
            16 => mac_with::<Cmac<des::TdesEde2>>(key, data),
            24 => mac_with::<Cmac<des::TdesEde3>>(key, data),
            _ => Err(Error::InvalidData("DES key length")),
        },
    }
}

macro_rules! hkdf_with {
    ($h:ty, $ikm:expr, $salt:expr, $info:expr, $out:expr, $expand_only:expr) => {{
        let hk = match $expand_only {
            true => Hkdf::<$h>::from_prk($ikm).map_err(|_| Error::InvalidData("HKDF PRK length"))?,
            false => Hkdf::<$h>::new($salt, $ikm),
        };
        hk.expand($info, $out).map_err(|_| Error::Length)
    }};
}

/// HKDF (RFC 5869), `expand_only` treats `ikm` as the PRK
pub fn hkdf(
    mode: DigestMode,
    ikm: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    len: usize,
    expand_only: bool,
) -> Result<Vec<u8>, Error> {
    let mut out = vec![0u8; len];

    match mode {
        DigestMode::Sha => hkdf_with!(Sha1, ikm, salt, info, &mut out, expand_only)?,
        DigestMode::Sha224 => hkdf_with!(Sha224, ikm, salt, info, &mut out, expand_only)?,
        DigestMode::Sha256 => hkdf_with!(Sha256, ikm, salt, info, &mut out, expand_only)?,
        DigestMode::Sha384 => hkdf_with!(Sha384, ikm, salt, info, &mut out, expand_only)?,
        DigestMode::Sha512 => hkdf_with!(Sha512, ikm, salt, info, &mut out, expand_only)?,
        DigestMode::NoHash => return Err(Error::Unsupported("HKDF digest")),
    }

    Ok(out)
}

/// Compare a received (possibly truncated) tag with the expected tag
pub fn tag_matches(expected: &[u8], received: &[u8]) -> bool {
    if received.is_empty() || received.len() > expected.len() {
        return false;
    }
    expected
        .iter()
        .zip(received)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
