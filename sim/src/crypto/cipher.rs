// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Symmetric ciphers: AES / DES block modes, CTR and the AEAD modes

use aes::{
    cipher::{
        block_padding::NoPadding, generic_array::GenericArray, BlockDecrypt, BlockDecryptMut,
        BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit, StreamCipher, StreamCipherSeek,
    },
    Aes128, Aes192, Aes256,
};
use aes_gcm::aead::{consts::U12, generic_array::typenum::Unsigned, AeadInPlace, Nonce};
use ccm::consts::{U13, U16};
use des::{Des, TdesEde2, TdesEde3};

use se05x_apdu::types::CipherMode;

use super::tag_matches;
use crate::Error;

/// GCM IV length supported by the element
pub const GCM_IV_LEN: usize = 12;

/// CCM nonce length supported by the element
pub const CCM_NONCE_LEN: usize = 13;

/// CCM tag length supported by the element
pub const CCM_TAG_LEN: usize = 16;

/// Full AEAD tag length
pub const AEAD_TAG_LEN: usize = 16;

type Ctr128<C> = ctr::Ctr128BE<C>;
type Ctr32<C> = ctr::Ctr32BE<C>;

/// Dispatch on AES key length
macro_rules! aes_dispatch {
    ($key:expr, |$c:ident| $body:expr) => {
        match $key.len() {
            16 => {
                type $c = Aes128;
                $body
            }
            24 => {
                type $c = Aes192;
                $body
            }
            32 => {
                type $c = Aes256;
                $body
            }
            _ => Err(Error::InvalidData("AES key length")),
        }
    };
}

/// Dispatch on DES key length (single, two and three key variants)
macro_rules! des_dispatch {
    ($key:expr, |$c:ident| $body:expr) => {
        match $key.len() {
            8 => {
                type $c = Des;
                $body
            }
            16 => {
                type $c = TdesEde2;
                $body
            }
            24 => {
                type $c = TdesEde3;
                $body
            }
            _ => Err(Error::InvalidData("DES key length")),
        }
    };
}

fn ecb<C: KeyInit + BlockEncrypt + BlockDecrypt>(
    key: &[u8],
    data: &[u8],
    encrypt: bool,
) -> Result<Vec<u8>, Error> {
    let c = C::new_from_slice(key).map_err(|_| Error::InvalidData("key length"))?;
    let bs = C::block_size();

    if data.len() % bs != 0 {
        return Err(Error::Length);
    }

    let mut out = data.to_vec();
    for b in out.chunks_mut(bs) {
        let b = GenericArray::from_mut_slice(b);
        match encrypt {
            true => c.encrypt_block(b),
            false => c.decrypt_block(b),
        }
    }

    Ok(out)
}

fn cbc_encrypt<E: KeyIvInit + BlockEncryptMut>(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
    let e = E::new_from_slices(key, iv).map_err(|_| Error::InvalidData("key or IV length"))?;
    Ok(e.encrypt_padded_vec_mut::<NoPadding>(data))
}

fn cbc_decrypt<D: KeyIvInit + BlockDecryptMut>(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
    let d = D::new_from_slices(key, iv).map_err(|_| Error::InvalidData("key or IV length"))?;
    d.decrypt_padded_vec_mut::<NoPadding>(data)
        .map_err(|_| Error::Length)
}

fn keystream<S: KeyIvInit + StreamCipher + StreamCipherSeek>(
    key: &[u8],
    iv: &[u8],
    offset: u64,
    data: &[u8],
) -> Result<Vec<u8>, Error> {
    let mut s = S::new_from_slices(key, iv).map_err(|_| Error::InvalidData("key or IV length"))?;
    s.try_seek(offset).map_err(|_| Error::Length)?;

    let mut out = data.to_vec();
    s.try_apply_keystream(&mut out).map_err(|_| Error::Length)?;
    Ok(out)
}

/// ECB / CBC over block aligned data
pub fn block_mode(
    mode: CipherMode,
    key: &[u8],
    iv: &[u8],
    data: &[u8],
    encrypt: bool,
) -> Result<Vec<u8>, Error> {
    use CipherMode::*;

    if data.len() % mode.block_len() != 0 {
        return Err(Error::Length);
    }

    match (mode, encrypt) {
        (AesEcbNopad, _) => aes_dispatch!(key, |C| ecb::<C>(key, data, encrypt)),
        (DesEcbNopad, _) => des_dispatch!(key, |C| ecb::<C>(key, data, encrypt)),
        (AesCbcNopad, true) => aes_dispatch!(key, |C| cbc_encrypt::<cbc::Encryptor<C>>(key, iv, data)),
        (AesCbcNopad, false) => aes_dispatch!(key, |C| cbc_decrypt::<cbc::Decryptor<C>>(key, iv, data)),
        (DesCbcNopad | DesCbcIso9797M1 | DesCbcIso9797M2, true) => {
            des_dispatch!(key, |C| cbc_encrypt::<cbc::Encryptor<C>>(key, iv, data))
        }
        (DesCbcNopad | DesCbcIso9797M1 | DesCbcIso9797M2, false) => {
            des_dispatch!(key, |C| cbc_decrypt::<cbc::Decryptor<C>>(key, iv, data))
        }
        _ => Err(Error::Unsupported("block cipher mode")),
    }
}

/// Next CBC chaining value after processing `input` into `output`
pub fn cbc_next_iv(mode: CipherMode, encrypt: bool, input: &[u8], output: &[u8]) -> Option<Vec<u8>> {
    let bs = mode.block_len();
    let src = match encrypt {
        true => output,
        false => input,
    };
    match src.len() >= bs {
        true => Some(src[src.len() - bs..].to_vec()),
        false => None,
    }
}

/// ISO 9797-1 padding (methods 1 and 2) to the DES block length
pub fn iso9797_pad(mode: CipherMode, data: &[u8]) -> Vec<u8> {
    let mut d = data.to_vec();

    match mode {
        CipherMode::DesCbcIso9797M1 => {
            if d.is_empty() || d.len() % 8 != 0 {
                d.resize(d.len() + 8 - d.len() % 8, 0);
            }
        }
        CipherMode::DesCbcIso9797M2 => {
            d.push(0x80);
            if d.len() % 8 != 0 {
                d.resize(d.len() + 8 - d.len() % 8, 0);
            }
        }
        _ => (),
    }

    d
}

/// AES CTR from a 16 byte initial counter block, starting `offset` bytes
/// into the key stream
pub fn aes_ctr(key: &[u8], counter: &[u8], offset: u64, data: &[u8]) -> Result<Vec<u8>, Error> {
    aes_dispatch!(key, |C| keystream::<Ctr128<C>>(key, counter, offset, data))
}

/// AEAD variants
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AeadKind {
    Gcm,
    Ccm,
}

impl AeadKind {
    pub fn from_mode(mode: CipherMode) -> Option<Self> {
        match mode {
            CipherMode::AesGcm | CipherMode::AesGcmIntIv => Some(Self::Gcm),
            CipherMode::AesCcm | CipherMode::AesCcmIntIv => Some(Self::Ccm),
            _ => None,
        }
    }

    /// Required IV / nonce length
    pub fn iv_len(&self) -> usize {
        match self {
            Self::Gcm => GCM_IV_LEN,
            Self::Ccm => CCM_NONCE_LEN,
        }
    }

    /// Check a requested tag length
    pub fn check_tag_len(&self, len: usize) -> Result<(), Error> {
        let ok = match self {
            Self::Gcm => (4..=AEAD_TAG_LEN).contains(&len),
            Self::Ccm => len == CCM_TAG_LEN,
        };
        match ok {
            true => Ok(()),
            false => Err(Error::Unsupported("AEAD tag length")),
        }
    }
}

fn seal_with<A: AeadInPlace + KeyInit>(
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    data: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), Error> {
    if nonce.len() != A::NonceSize::USIZE {
        return Err(Error::InvalidData("AEAD nonce length"));
    }

    let a = A::new_from_slice(key).map_err(|_| Error::InvalidData("AES key length"))?;

    let mut buff = data.to_vec();
    let tag = a
        .encrypt_in_place_detached(Nonce::<A>::from_slice(nonce), aad, &mut buff)
        .map_err(|_| Error::Crypto("AEAD seal"))?;

    Ok((buff, tag.to_vec()))
}

/// Encrypt and authenticate, returning the ciphertext and full tag
pub fn aead_seal(
    kind: AeadKind,
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
    data: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), Error> {
    match kind {
        AeadKind::Gcm => aes_dispatch!(key, |C| seal_with::<aes_gcm::AesGcm<C, U12>>(key, iv, aad, data)),
        AeadKind::Ccm => aes_dispatch!(key, |C| seal_with::<ccm::Ccm<C, U16, U13>>(key, iv, aad, data)),
    }
}

/// Apply the AEAD payload key stream from `offset`
///
/// Encryption and decryption of the payload are the same CTR operation,
/// the tag is computed separately by [aead_seal].
pub fn aead_keystream(
    kind: AeadKind,
    key: &[u8],
    iv: &[u8],
    offset: u64,
    data: &[u8],
) -> Result<Vec<u8>, Error> {
    if iv.len() != kind.iv_len() {
        return Err(Error::InvalidData("AEAD nonce length"));
    }

    let mut counter = [0u8; 16];
    match kind {
        AeadKind::Gcm => {
            counter[..GCM_IV_LEN].copy_from_slice(iv);
            counter[15] = 0x02;
            aes_dispatch!(key, |C| keystream::<Ctr32<C>>(key, &counter, offset, data))
        }
        AeadKind::Ccm => {
            // Flags encode L - 1 for a two byte length field
            counter[0] = 0x01;
            counter[1..][..CCM_NONCE_LEN].copy_from_slice(iv);
            counter[15] = 0x01;
            aes_dispatch!(key, |C| keystream::<Ctr128<C>>(key, &counter, offset, data))
        }
    }
}

/// Decrypt and check a (possibly truncated) tag
pub fn aead_open(
    kind: AeadKind,
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
    data: &[u8],
    tag: &[u8],
) -> Result<Option<Vec<u8>>, Error> {
    let plain = aead_keystream(kind, key, iv, 0, data)?;
    let (_, expected) = aead_seal(kind, key, iv, aad, &plain)?;

    match tag_matches(&expected, tag) {
        true => Ok(Some(plain)),
        false => Ok(None),
    }
}

/// Unwrap an RFC 3394 wrapped key
pub fn key_unwrap(kek: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
    let r = match kek.len() {
        16 => aes_kw::Kek::<Aes128>::new(GenericArray::from_slice(kek)).unwrap_vec(data),
        24 => aes_kw::Kek::<Aes192>::new(GenericArray::from_slice(kek)).unwrap_vec(data),
        32 => aes_kw::Kek::<Aes256>::new(GenericArray::from_slice(kek)).unwrap_vec(data),
        _ => return Err(Error::InvalidData("KEK length")),
    };
    r.map_err(|_| Error::InvalidData("key unwrap failed"))
}
