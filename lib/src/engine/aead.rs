// Copyright (c) 2022-2023 The MobileCoin Foundation

//! AEAD engine (AES GCM / CCM)

use log::{debug, error};

use se05x_apdu::{
    types::{CipherMode, CryptoContext},
    Exchange,
};

use super::{update_chunks, BlockAccumulator, CryptoObject};
use crate::{
    algorithm::cipher_mode,
    api::{AeadFinal, CcmLengths},
    key_object::{CipherType, KeyObject},
    Algorithm, Error, KeyStore, Mode, Session,
};

/// AES block length
const BLOCK: usize = 16;

/// Default tag length
pub const DEFAULT_TAG_LEN: usize = 16;

/// AEAD operation result
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AeadOutput {
    /// Encryption output with tag and any element generated IV
    Sealed {
        data: Vec<u8>,
        tag: Vec<u8>,
        iv: Option<Vec<u8>>,
    },
    /// Decryption output, tag verified
    Opened(Vec<u8>),
    /// Tag verification failed
    Rejected,
}

/// AEAD context
pub struct Aead<T> {
    session: Session<T>,
    key: KeyObject,
    cipher: CipherMode,
    encrypt: bool,
    tag_len: usize,
    obj: Option<CryptoObject>,
    iv: Option<Vec<u8>>,
    acc: BlockAccumulator,
    /// CCM input is cached in full until finish
    ccm: Vec<u8>,
}

impl<T: Exchange + Send + Sync> Aead<T> {
    pub fn new(
        store: &KeyStore<T>,
        key: &KeyObject,
        algorithm: Algorithm,
        mode: Mode,
    ) -> Result<Self, Error> {
        store.check_owner(key)?;

        let cipher = cipher_mode(algorithm)
            .filter(|m| m.is_aead())
            .ok_or(Error::Unsupported("AEAD algorithm"))?;

        let encrypt = match mode {
            Mode::Encrypt => true,
            Mode::Decrypt => false,
            _ => return Err(Error::InvalidArgument("invalid mode for AEAD context")),
        };

        if key.cipher != CipherType::Aes {
            error!("Key 0x{:08x} ({}) cannot be used with {}", key.key_id, key.cipher, cipher);
            return Err(Error::InvalidArgument("AEAD requires an AES key"));
        }

        if cipher.is_internal_iv() && !encrypt {
            error!("Internal IV mode {} is encrypt only", cipher);
            return Err(Error::Unsupported("decryption with an element generated IV"));
        }

        Ok(Self {
            session: store.session().clone(),
            key: key.clone(),
            cipher,
            encrypt,
            tag_len: DEFAULT_TAG_LEN,
            obj: None,
            iv: None,
            acc: BlockAccumulator::new(BLOCK),
            ccm: vec![],
        })
    }

    /// Set the tag length generated on encryption
    pub fn with_tag_len(mut self, tag_len: usize) -> Result<Self, Error> {
        if !(4..=16).contains(&tag_len) {
            return Err(Error::InvalidArgument("invalid AEAD tag length"));
        }
        self.tag_len = tag_len;
        Ok(self)
    }

    fn expect_tag<'a>(&self, tag: Option<&'a [u8]>) -> Result<Option<&'a [u8]>, Error> {
        match (self.encrypt, tag) {
            (true, _) => Ok(None),
            (false, Some(t)) => Ok(Some(t)),
            (false, None) => Err(Error::InvalidArgument("tag required for decryption")),
        }
    }

    /// Single shot GCM, `tag` is required for decryption
    pub async fn one_go(
        &self,
        iv: Option<&[u8]>,
        aad: &[u8],
        data: &[u8],
        tag: Option<&[u8]>,
    ) -> Result<AeadOutput, Error> {
        if self.cipher.is_ccm() {
            return Err(Error::Unsupported("single shot CCM"));
        }
        let tag = self.expect_tag(tag)?;

        debug!(
            "AEAD one shot {} ({} bytes) with 0x{:08x}",
            self.cipher,
            data.len(),
            self.key.key_id
        );

        let key = self.key.key_id;

        match tag {
            None => {
                let iv = match self.cipher.is_internal_iv() {
                    true => None,
                    false => Some(iv.ok_or(Error::InvalidArgument("IV required"))?),
                };
                let (data, tag, iv) = self
                    .session
                    .aead_one_shot_encrypt(key, self.cipher, data, aad, iv, self.tag_len as u16)
                    .await?;
                Ok(AeadOutput::Sealed { data, tag, iv })
            }
            Some(tag) => {
                let iv = iv.ok_or(Error::InvalidArgument("IV required"))?;
                match self
                    .session
                    .aead_one_shot_decrypt(key, self.cipher, data, aad, iv, tag)
                    .await?
                {
                    Some(d) => Ok(AeadOutput::Opened(d)),
                    None => Ok(AeadOutput::Rejected),
                }
            }
        }
    }

    /// Start a streaming operation, CCM requires the aad and payload
    /// lengths up front
    pub async fn init(
        &mut self,
        iv: Option<&[u8]>,
        ccm: Option<CcmLengths>,
    ) -> Result<Option<Vec<u8>>, Error> {
        if self.obj.is_some() {
            return Err(Error::InvalidArgument("AEAD context already initialised"));
        }

        let ccm = match (self.cipher.is_ccm(), ccm) {
            (true, Some(c)) => Some(c),
            (true, None) => return Err(Error::InvalidArgument("CCM lengths required")),
            (false, _) => None,
        };

        let iv = match self.cipher.is_internal_iv() {
            true => None,
            false => Some(iv.ok_or(Error::InvalidArgument("IV required"))?),
        };

        let obj =
            CryptoObject::ensure(&self.session, CryptoContext::Aead, self.cipher.into()).await?;
        let id = obj.id;
        self.obj = Some(obj);

        let generated = self
            .session
            .aead_init(self.key.key_id, id, self.encrypt, iv, ccm, self.tag_len as u16)
            .await?;

        self.iv = generated.clone();
        Ok(generated)
    }

    fn obj_id(&self) -> Result<u16, Error> {
        self.obj
            .as_ref()
            .map(|o| o.id)
            .ok_or(Error::InvalidArgument("AEAD context not initialised"))
    }

    /// Add associated data
    pub async fn update_aad(&mut self, aad: &[u8]) -> Result<(), Error> {
        let id = self.obj_id()?;

        for c in aad.chunks(BLOCK) {
            self.session.aead_update_aad(id, c).await?;
        }

        Ok(())
    }

    /// Stream payload, returning output for whole blocks (GCM) or nothing
    /// (CCM, processed at finish)
    pub async fn update(&mut self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let id = self.obj_id()?;

        if self.cipher.is_ccm() {
            self.ccm.extend_from_slice(data);
            return Ok(vec![]);
        }

        let whole = self.acc.push(data);
        let mut out = Vec::with_capacity(whole.len());
        for c in update_chunks(&whole, BLOCK) {
            out.extend(self.session.aead_update(id, c, false).await?);
        }

        Ok(out)
    }

    /// Complete the operation, `tag` is required for decryption
    pub async fn finish(&mut self, data: &[u8], tag: Option<&[u8]>) -> Result<AeadOutput, Error> {
        let id = self.obj_id()?;
        let tag = self.expect_tag(tag)?;

        let mut out = self.update(data).await?;

        match self.cipher.is_ccm() {
            true => {
                let cached = std::mem::take(&mut self.ccm);
                if cached.len() <= BLOCK {
                    out.extend(self.session.aead_update(id, &cached, true).await?);
                } else {
                    let (first, rest) = cached.split_at(BLOCK);
                    out.extend(self.session.aead_update(id, first, false).await?);
                    out.extend(self.session.aead_update(id, rest, true).await?);
                }
            }
            false => {
                let tail = self.acc.take();
                if !tail.is_empty() {
                    out.extend(self.session.aead_update(id, &tail, false).await?);
                }
            }
        }

        match self.session.aead_final(id, tag).await? {
            AeadFinal::Tag(t) => Ok(AeadOutput::Sealed {
                data: out,
                tag: t,
                iv: self.iv.take(),
            }),
            AeadFinal::Verified(true) => Ok(AeadOutput::Opened(out)),
            AeadFinal::Verified(false) => {
                error!("AEAD tag verification failed for 0x{:08x}", self.key.key_id);
                Ok(AeadOutput::Rejected)
            }
        }
    }

    /// Release the element crypto object
    pub async fn free(mut self) -> Result<(), Error> {
        use zeroize::Zeroize;
        self.ccm.zeroize();

        match self.obj.take() {
            Some(o) => o.free(&self.session).await,
            None => Ok(()),
        }
    }
}
