// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Key object handles
//!
//! A [KeyObject] describes an element object (identifier, part, cipher
//! type and curve) and never holds key material.

use log::{debug, warn};
use strum::Display;

use se05x_apdu::{
    types::{self, EcCurve, SecObjType, TransientIndicator},
    Exchange,
};

use crate::{
    ecc::{cipher_for, curve_for, curve_info},
    Error, KeyStore,
};

/// Host key part
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum KeyPart {
    None,
    /// Single part objects (symmetric keys, binary files, counters...)
    Default,
    Pair,
    Public,
    Private,
}

impl From<KeyPart> for types::KeyPart {
    fn from(p: KeyPart) -> Self {
        match p {
            KeyPart::Pair => types::KeyPart::Pair,
            KeyPart::Public => types::KeyPart::Public,
            KeyPart::Private => types::KeyPart::Private,
            KeyPart::None | KeyPart::Default => types::KeyPart::Na,
        }
    }
}

/// Host cipher type
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum CipherType {
    None,
    EcNistP,
    EcNistK,
    EcBrainpool,
    EcMontgomery,
    EcTwistedEd,
    EcBarretoNaehrig,
    Rsa,
    RsaCrt,
    Aes,
    Des,
    Hmac,
    Cmac,
    Binary,
    Certificate,
    Pcr,
    Counter,
    UserId,
}

impl CipherType {
    /// EC cipher types
    pub fn is_ec(&self) -> bool {
        matches!(
            self,
            CipherType::EcNistP
                | CipherType::EcNistK
                | CipherType::EcBrainpool
                | CipherType::EcMontgomery
                | CipherType::EcTwistedEd
                | CipherType::EcBarretoNaehrig
        )
    }

    /// RSA cipher types
    pub fn is_rsa(&self) -> bool {
        matches!(self, CipherType::Rsa | CipherType::RsaCrt)
    }

    /// Symmetric key types (stored with WriteSymmKey)
    pub fn is_symmetric(&self) -> bool {
        matches!(
            self,
            CipherType::Aes | CipherType::Des | CipherType::Hmac | CipherType::Cmac
        )
    }
}

/// Element object handle
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyObject {
    pub key_id: u32,
    pub part: KeyPart,
    pub cipher: CipherType,
    pub curve: Option<EcCurve>,
    pub persistent: bool,
    /// Size hint (bits for keys, bytes for binary objects)
    pub size: usize,
    /// Tag of the owning session
    pub(crate) session: u64,
}

impl KeyObject {
    /// Describe a new object without creating it on the element.
    ///
    /// The element is queried for existence and a warning logged when the
    /// identifier is already in use.
    pub async fn allocate_handle<T: Exchange + Send + Sync>(
        store: &KeyStore<T>,
        key_id: u32,
        part: KeyPart,
        cipher: CipherType,
        size: usize,
        persistent: bool,
    ) -> Result<Self, Error> {
        debug!(
            "Allocating handle 0x{:08x} ({} {}, {} bits, persistent: {})",
            key_id, cipher, part, size, persistent
        );

        if store.session().check_object_exists(key_id).await? {
            warn!("Object id 0x{:08x} already exists", key_id);
        }

        let curve = match cipher.is_ec() {
            true => curve_for(cipher, size),
            false => None,
        };

        Ok(Self {
            key_id,
            part,
            cipher,
            curve,
            persistent,
            size,
            session: store.session().tag(),
        })
    }

    /// Load a handle for an existing element object
    pub async fn get_handle<T: Exchange + Send + Sync>(
        store: &KeyStore<T>,
        key_id: u32,
    ) -> Result<Self, Error> {
        let s = store.session();

        if !s.check_object_exists(key_id).await? {
            debug!("Object 0x{:08x} not found", key_id);
            return Err(Error::NotFound(key_id));
        }

        let (kind, transient) = s.read_type(key_id).await?;
        let persistent = transient == TransientIndicator::Persistent;

        let (part, cipher, curve, size) = match kind {
            SecObjType::EcKeyPair | SecObjType::EcPrivKey | SecObjType::EcPubKey => {
                let curve = s.curve_get_id(key_id).await?;
                let part = match kind {
                    SecObjType::EcKeyPair => KeyPart::Pair,
                    SecObjType::EcPrivKey => KeyPart::Private,
                    _ => KeyPart::Public,
                };
                (part, cipher_for(curve), Some(curve), curve_info(curve).bits)
            }
            _ => {
                let (part, cipher) = map_type(kind)?;
                let size = s.read_size(key_id).await? as usize;
                let size = match cipher {
                    CipherType::Binary | CipherType::Certificate => size,
                    _ => size * 8,
                };
                (part, cipher, None, size)
            }
        };

        debug!(
            "Loaded handle 0x{:08x}: {:?} -> {} {}",
            key_id, kind, cipher, part
        );

        Ok(Self {
            key_id,
            part,
            cipher,
            curve,
            persistent,
            size,
            session: s.tag(),
        })
    }
}

/// Map a non-EC element object type to host part and cipher type
fn map_type(kind: SecObjType) -> Result<(KeyPart, CipherType), Error> {
    let m = match kind {
        SecObjType::RsaKeyPair => (KeyPart::Pair, CipherType::Rsa),
        SecObjType::RsaKeyPairCrt => (KeyPart::Pair, CipherType::RsaCrt),
        SecObjType::RsaPrivKey => (KeyPart::Private, CipherType::Rsa),
        SecObjType::RsaPrivKeyCrt => (KeyPart::Private, CipherType::RsaCrt),
        SecObjType::RsaPubKey => (KeyPart::Public, CipherType::Rsa),
        SecObjType::AesKey => (KeyPart::Default, CipherType::Aes),
        SecObjType::DesKey => (KeyPart::Default, CipherType::Des),
        SecObjType::HmacKey => (KeyPart::Default, CipherType::Hmac),
        SecObjType::BinaryFile => (KeyPart::Default, CipherType::Binary),
        SecObjType::UserId => (KeyPart::Default, CipherType::UserId),
        SecObjType::Counter => (KeyPart::Default, CipherType::Counter),
        SecObjType::Pcr => (KeyPart::Default, CipherType::Pcr),
        _ => return Err(Error::Unsupported("object type")),
    };
    Ok(m)
}
