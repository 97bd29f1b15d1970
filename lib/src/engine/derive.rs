// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Key derivation (HKDF and ECDH)

use log::{debug, error, warn};

use se05x_apdu::{
    types::{DigestMode, EcCurve, HkdfMode},
    Exchange,
};

use crate::{
    algorithm::hkdf_digest,
    api::{HkdfRequest, HkdfSalt},
    ecc::{curve_info, parse_key, Reversal},
    key_object::{CipherType, KeyObject, KeyPart},
    Algorithm, Error, KeyStore, Mode, Session,
};

/// Largest HKDF output for a digest (RFC 5869)
fn hkdf_max_len(digest: DigestMode) -> usize {
    255 * digest.output_len()
}

/// HKDF salt source
#[derive(Copy, Clone, Debug)]
pub enum DeriveSalt<'a> {
    None,
    Bytes(&'a [u8]),
    /// Salt held in an object of the deriving session
    Object(&'a KeyObject),
}

/// Key derivation context
pub struct DeriveKey<T> {
    session: Session<T>,
    key: KeyObject,
    /// HKDF digest, `None` for ECDH contexts
    digest: Option<DigestMode>,
}

impl<T: Exchange + Send + Sync> DeriveKey<T> {
    pub fn new(
        store: &KeyStore<T>,
        key: &KeyObject,
        algorithm: Algorithm,
        mode: Mode,
    ) -> Result<Self, Error> {
        store.check_owner(key)?;

        let digest = match (mode, algorithm) {
            (Mode::DeriveKey, a) => {
                Some(hkdf_digest(a).ok_or(Error::Unsupported("HKDF digest algorithm"))?)
            }
            (Mode::ComputeSharedSecret, Algorithm::Ecdh) => {
                match key.cipher {
                    CipherType::EcNistP
                    | CipherType::EcNistK
                    | CipherType::EcBrainpool
                    | CipherType::EcMontgomery => (),
                    _ => return Err(Error::Unsupported("ECDH for key type")),
                }
                if !matches!(key.part, KeyPart::Pair | KeyPart::Private) {
                    return Err(Error::InvalidArgument("ECDH requires a private key"));
                }
                None
            }
            (Mode::ComputeSharedSecret, _) => return Err(Error::Unsupported("key agreement algorithm")),
            _ => return Err(Error::InvalidArgument("invalid mode for derive context")),
        };

        Ok(Self {
            session: store.session().clone(),
            key: key.clone(),
            digest,
        })
    }

    fn hkdf_digest(&self, len: usize) -> Result<DigestMode, Error> {
        let d = self
            .digest
            .ok_or(Error::InvalidArgument("context is bound to key agreement"))?;

        if len == 0 || len > hkdf_max_len(d) || len > u16::MAX as usize {
            error!("Invalid HKDF output length {}", len);
            return Err(Error::InvalidArgument("invalid HKDF output length"));
        }

        Ok(d)
    }

    fn salt<'a>(&self, salt: DeriveSalt<'a>) -> Result<HkdfSalt<'a>, Error> {
        match salt {
            DeriveSalt::None => Ok(HkdfSalt::None),
            DeriveSalt::Bytes(b) => Ok(HkdfSalt::Bytes(b)),
            DeriveSalt::Object(o) if o.session == self.session.tag() => {
                Ok(HkdfSalt::Object(o.key_id))
            }
            DeriveSalt::Object(_) => {
                Err(Error::InvalidArgument("salt object belongs to a different session"))
            }
        }
    }

    async fn hkdf_to_host(
        &self,
        salt: HkdfSalt<'_>,
        info: &[u8],
        len: usize,
        mode: HkdfMode,
    ) -> Result<Vec<u8>, Error> {
        let digest = self.hkdf_digest(len)?;

        let out = self
            .session
            .hkdf(&HkdfRequest {
                key: self.key.key_id,
                digest,
                mode,
                salt,
                info,
                len: len as u16,
                dest: None,
            })
            .await?
            .ok_or_else(|| Error::Encoding("HKDF returned no output".to_string()))?;

        if out.len() != len {
            return Err(Error::Encoding(format!("HKDF returned {} bytes, expected {}", out.len(), len)));
        }

        Ok(out)
    }

    /// HKDF extract and expand, returning the output to the host
    pub async fn derive(&self, salt: DeriveSalt<'_>, info: &[u8], len: usize) -> Result<Vec<u8>, Error> {
        let salt = self.salt(salt)?;

        debug!("HKDF with 0x{:08x} ({} bytes)", self.key.key_id, len);

        self.hkdf_to_host(salt, info, len, HkdfMode::ExtractAndExpand)
            .await
    }

    /// HKDF into a destination object.
    ///
    /// The output stays on the element when the destination exists in this
    /// session, otherwise it is derived to the host and written through the
    /// destination's key store.
    pub async fn one_go(
        &self,
        salt: DeriveSalt<'_>,
        info: &[u8],
        mode: HkdfMode,
        dest_store: &KeyStore<T>,
        dest: &KeyObject,
        len: usize,
    ) -> Result<(), Error> {
        dest_store.check_owner(dest)?;

        let digest = self.hkdf_digest(len)?;
        let salt = self.salt(salt)?;

        if mode == HkdfMode::ExpandOnly && matches!(salt, HkdfSalt::Bytes(_) | HkdfSalt::Object(_)) {
            warn!("Salt ignored for expand-only HKDF");
        }
        let salt = match mode {
            HkdfMode::ExpandOnly => HkdfSalt::None,
            HkdfMode::ExtractAndExpand => salt,
        };

        let same = dest_store.session().same_session(&self.session)
            && self.session.check_object_exists(dest.key_id).await?;

        debug!(
            "HKDF {} 0x{:08x} -> 0x{:08x} (in object: {})",
            mode, self.key.key_id, dest.key_id, same
        );

        if same {
            self.session
                .hkdf(&HkdfRequest {
                    key: self.key.key_id,
                    digest,
                    mode,
                    salt,
                    info,
                    len: len as u16,
                    dest: Some(dest.key_id),
                })
                .await?;
            return Ok(());
        }

        let out = self.hkdf_to_host(salt, info, len, mode).await?;
        dest_store.set_key(dest, &out, len * 8, None).await
    }

    /// HKDF to the host followed by a key store write
    pub async fn derive_key_go(
        &self,
        salt: &[u8],
        info: &[u8],
        dest_store: &KeyStore<T>,
        dest: &KeyObject,
        len: usize,
    ) -> Result<(), Error> {
        dest_store.check_owner(dest)?;

        let salt = match salt.is_empty() {
            true => HkdfSalt::None,
            false => HkdfSalt::Bytes(salt),
        };

        let out = self
            .hkdf_to_host(salt, info, len, HkdfMode::ExtractAndExpand)
            .await?;

        dest_store.set_key(dest, &out, len * 8, None).await
    }

    /// ECDH with a peer public key (SPKI, or raw for curves without one),
    /// storing the shared secret in `dest`
    pub async fn dh(
        &self,
        peer: &[u8],
        dest_store: &KeyStore<T>,
        dest: &KeyObject,
    ) -> Result<(), Error> {
        if self.digest.is_some() {
            return Err(Error::InvalidArgument("context is bound to HKDF"));
        }
        dest_store.check_owner(dest)?;

        let curve: EcCurve = self
            .key
            .curve
            .ok_or(Error::InvalidArgument("ECDH key has no curve"))?;
        let info = curve_info(curve);
        let reverse = info.reversal == Reversal::Both;

        let mut wire = parse_key(&info, KeyPart::Public, peer)?;
        let peer = wire
            .public
            .take()
            .ok_or(Error::InvalidArgument("peer public key missing"))?;

        let same = dest_store.session().same_session(&self.session)
            && self.session.check_object_exists(dest.key_id).await?;

        debug!(
            "ECDH 0x{:08x} ({}) -> 0x{:08x} (in object: {})",
            self.key.key_id, curve, dest.key_id, same
        );

        if same {
            self.session
                .ecdh(self.key.key_id, &peer, Some(dest.key_id), reverse)
                .await?;
            return Ok(());
        }

        let mut secret = self
            .session
            .ecdh(self.key.key_id, &peer, None, false)
            .await?
            .ok_or_else(|| Error::Encoding("ECDH returned no secret".to_string()))?;

        if reverse {
            secret.reverse();
        }

        let bits = secret.len() * 8;
        let r = dest_store.set_key(dest, &secret, bits, None).await;

        use zeroize::Zeroize;
        secret.zeroize();

        r
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hkdf_output_limits() {
        assert_eq!(hkdf_max_len(DigestMode::Sha256), 8160);
        assert_eq!(hkdf_max_len(DigestMode::Sha), 5100);
    }
}
