// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Symmetric cipher engine (AES / DES)

use log::{debug, error};

use se05x_apdu::{
    types::{CipherMode, CryptoContext},
    Exchange,
};

use super::{update_chunks, BlockAccumulator, CryptoObject};
use crate::{
    algorithm::cipher_mode,
    key_object::{CipherType, KeyObject},
    Algorithm, Error, KeyStore, Mode, Session,
};

/// CTR keystream block length
const CTR_BLOCK: usize = 16;

/// Symmetric cipher context
pub struct Symmetric<T> {
    session: Session<T>,
    key: KeyObject,
    cipher: CipherMode,
    encrypt: bool,
    obj: Option<CryptoObject>,
    acc: BlockAccumulator,
}

impl<T: Exchange + Send + Sync> Symmetric<T> {
    pub fn new(
        store: &KeyStore<T>,
        key: &KeyObject,
        algorithm: Algorithm,
        mode: Mode,
    ) -> Result<Self, Error> {
        store.check_owner(key)?;

        let cipher = cipher_mode(algorithm)
            .filter(|m| !m.is_aead())
            .ok_or(Error::Unsupported("symmetric cipher algorithm"))?;

        let encrypt = match mode {
            Mode::Encrypt => true,
            Mode::Decrypt => false,
            _ => return Err(Error::InvalidArgument("invalid mode for cipher context")),
        };

        let key_ok = match cipher.is_des() {
            true => key.cipher == CipherType::Des,
            false => key.cipher == CipherType::Aes,
        };
        if !key_ok {
            error!("Key 0x{:08x} ({}) cannot be used with {}", key.key_id, key.cipher, cipher);
            return Err(Error::InvalidArgument("key type does not match cipher"));
        }

        Ok(Self {
            session: store.session().clone(),
            key: key.clone(),
            cipher,
            encrypt,
            obj: None,
            acc: BlockAccumulator::new(cipher.block_len()),
        })
    }

    fn is_ctr(&self) -> bool {
        matches!(self.cipher, CipherMode::AesCtr | CipherMode::AesCtrIntIv)
    }

    fn check_iv_gate(&self) -> Result<(), Error> {
        if self.cipher.is_internal_iv() && !self.encrypt {
            error!("Internal IV mode {} is encrypt only", self.cipher);
            return Err(Error::Unsupported("decryption with an element generated IV"));
        }
        Ok(())
    }

    /// Single shot encrypt / decrypt, returning the output and any element
    /// generated IV
    pub async fn one_go(
        &self,
        iv: Option<&[u8]>,
        data: &[u8],
    ) -> Result<(Vec<u8>, Option<Vec<u8>>), Error> {
        self.check_iv_gate()?;

        let block = match self.is_ctr() {
            true => CTR_BLOCK,
            false => self.cipher.block_len(),
        };
        let padded_mode = matches!(
            self.cipher,
            CipherMode::DesCbcIso9797M1 | CipherMode::DesCbcIso9797M2
        );
        if !(padded_mode && self.encrypt) && data.len() % block != 0 {
            error!("Data length {} not a multiple of {}", data.len(), block);
            return Err(Error::InvalidArgument("data length not block aligned"));
        }

        let iv = match self.cipher.is_ecb() || self.cipher.is_internal_iv() {
            true => None,
            false => Some(iv.ok_or(Error::InvalidArgument("IV required"))?),
        };

        debug!(
            "Cipher one shot {} ({} bytes) with 0x{:08x}",
            self.cipher,
            data.len(),
            self.key.key_id
        );

        self.session
            .cipher_one_shot(self.key.key_id, self.cipher, self.encrypt, data, iv)
            .await
    }

    /// Start a streaming operation, returning any element generated IV
    pub async fn init(&mut self, iv: Option<&[u8]>) -> Result<Option<Vec<u8>>, Error> {
        self.check_iv_gate()?;

        if self.obj.is_some() {
            return Err(Error::InvalidArgument("cipher context already initialised"));
        }

        let obj =
            CryptoObject::ensure(&self.session, CryptoContext::Cipher, self.cipher.into()).await?;

        let iv = match self.cipher.is_ecb() || self.cipher.is_internal_iv() {
            true => None,
            false => iv,
        };

        let out = self
            .session
            .cipher_init(self.key.key_id, obj.id, self.encrypt, iv)
            .await;

        // Keep the object for free() even when init failed
        self.obj = Some(obj);
        out
    }

    fn obj_id(&self) -> Result<u16, Error> {
        self.obj
            .as_ref()
            .map(|o| o.id)
            .ok_or(Error::InvalidArgument("cipher context not initialised"))
    }

    /// Stream data, returning output for whole blocks only
    pub async fn update(&mut self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let id = self.obj_id()?;

        let whole = self.acc.push(data);
        let mut out = Vec::with_capacity(whole.len());

        for c in update_chunks(&whole, self.acc.block_len()) {
            out.extend(self.session.cipher_update(id, c).await?);
        }

        Ok(out)
    }

    /// Complete the operation with any remaining data
    pub async fn finish(&mut self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let id = self.obj_id()?;
        let block = self.acc.block_len();

        let mut out = self.update(data).await?;
        let mut tail = self.acc.take();

        if !tail.is_empty() {
            match self.cipher {
                CipherMode::AesEcbNopad | CipherMode::AesCbcNopad => {
                    tail.resize(block, 0);
                }
                CipherMode::DesEcbNopad | CipherMode::DesCbcNopad => {
                    return Err(Error::InvalidArgument("data length not block aligned"));
                }
                _ => (),
            }
        }

        out.extend(self.session.cipher_final(id, &tail).await?);
        Ok(out)
    }

    /// AES CTR over arbitrary length data from an initial counter block
    pub async fn crypt_ctr(&self, counter: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
        if self.cipher != CipherMode::AesCtr {
            return Err(Error::InvalidArgument("crypt_ctr requires AES CTR"));
        }
        if counter.len() != CTR_BLOCK {
            return Err(Error::InvalidArgument("CTR counter block must be 16 bytes"));
        }

        let mut padded = data.to_vec();
        padded.resize(data.len().div_ceil(CTR_BLOCK) * CTR_BLOCK, 0);

        let (mut out, _) = self.one_go(Some(counter), &padded).await?;
        out.truncate(data.len());
        Ok(out)
    }

    /// Release the element crypto object
    pub async fn free(mut self) -> Result<(), Error> {
        match self.obj.take() {
            Some(o) => o.free(&self.session).await,
            None => Ok(()),
        }
    }
}
