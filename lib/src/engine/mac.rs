// Copyright (c) 2022-2023 The MobileCoin Foundation

//! MAC engine (CMAC / HMAC)

use log::{debug, error};

use se05x_apdu::{
    types::{CryptoContext, MacAlgo},
    Exchange,
};

use super::{update_chunks, CryptoObject};
use crate::{
    algorithm::mac_algo,
    key_object::{CipherType, KeyObject},
    Algorithm, Error, KeyStore, Mode, Session,
};

/// MAC context
pub struct Mac<T> {
    session: Session<T>,
    key: KeyObject,
    algo: MacAlgo,
    validate: bool,
    obj: Option<CryptoObject>,
}

impl<T: Exchange + Send + Sync> Mac<T> {
    pub fn new(
        store: &KeyStore<T>,
        key: &KeyObject,
        algorithm: Algorithm,
        mode: Mode,
    ) -> Result<Self, Error> {
        store.check_owner(key)?;

        let algo = mac_algo(algorithm).ok_or(Error::Unsupported("MAC algorithm"))?;

        let validate = match mode {
            Mode::Mac => false,
            Mode::MacValidate => true,
            _ => return Err(Error::InvalidArgument("invalid mode for MAC context")),
        };

        let key_ok = match algo {
            MacAlgo::Cmac128 => matches!(key.cipher, CipherType::Aes | CipherType::Cmac),
            MacAlgo::DesCmac8 => key.cipher == CipherType::Des,
            _ => matches!(key.cipher, CipherType::Hmac | CipherType::Aes),
        };
        if !key_ok {
            error!("Key 0x{:08x} ({}) cannot be used with {}", key.key_id, key.cipher, algo);
            return Err(Error::InvalidArgument("key type does not match MAC algorithm"));
        }

        Ok(Self {
            session: store.session().clone(),
            key: key.clone(),
            algo,
            validate,
            obj: None,
        })
    }

    /// Single shot MAC generation
    pub async fn one_go(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        if self.validate {
            return Err(Error::InvalidArgument("context is bound to validation"));
        }

        debug!("MAC {} ({} bytes) with 0x{:08x}", self.algo, data.len(), self.key.key_id);

        self.session
            .mac_one_shot_generate(self.key.key_id, self.algo, data)
            .await
    }

    /// Single shot MAC validation
    pub async fn one_go_validate(&self, data: &[u8], mac: &[u8]) -> Result<bool, Error> {
        if !self.validate {
            return Err(Error::InvalidArgument("context is bound to generation"));
        }

        debug!("MAC validate {} with 0x{:08x}", self.algo, self.key.key_id);

        self.session
            .mac_one_shot_validate(self.key.key_id, self.algo, data, mac)
            .await
    }

    pub async fn init(&mut self) -> Result<(), Error> {
        if self.obj.is_some() {
            return Err(Error::InvalidArgument("MAC context already initialised"));
        }

        let obj =
            CryptoObject::ensure(&self.session, CryptoContext::Signature, self.algo.into()).await?;
        let id = obj.id;
        self.obj = Some(obj);

        self.session.mac_init(self.key.key_id, id, self.validate).await
    }

    fn obj_id(&self) -> Result<u16, Error> {
        self.obj
            .as_ref()
            .map(|o| o.id)
            .ok_or(Error::InvalidArgument("MAC context not initialised"))
    }

    pub async fn update(&mut self, data: &[u8]) -> Result<(), Error> {
        let id = self.obj_id()?;

        for c in update_chunks(data, 1) {
            self.session.mac_update(id, c).await?;
        }

        Ok(())
    }

    /// Complete MAC generation
    pub async fn finish(&mut self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let id = self.obj_id()?;
        if self.validate {
            return Err(Error::InvalidArgument("context is bound to validation"));
        }

        self.session.mac_final(id, data, None).await
    }

    /// Complete MAC validation
    pub async fn finish_validate(&mut self, data: &[u8], mac: &[u8]) -> Result<bool, Error> {
        let id = self.obj_id()?;
        if !self.validate {
            return Err(Error::InvalidArgument("context is bound to generation"));
        }

        let r = self.session.mac_final(id, data, Some(mac)).await?;
        Ok(r.first() == Some(&u8::from(se05x_apdu::types::SeResult::Success)))
    }

    /// Release the element crypto object
    pub async fn free(mut self) -> Result<(), Error> {
        match self.obj.take() {
            Some(o) => o.free(&self.session).await,
            None => Ok(()),
        }
    }
}
