// Copyright (c) 2022-2023 The MobileCoin Foundation

use log::debug;

use se05x_apdu::{
    types::{CryptoContext, DigestMode},
    Exchange, CIPHER_UPDATE_MAX_DATA,
};

use super::{update_chunks, CryptoObject};
use crate::{algorithm::digest_mode, Algorithm, Error, Mode, Session};

/// Digest context
pub struct Digest<T> {
    session: Session<T>,
    mode: DigestMode,
    obj: Option<CryptoObject>,
}

impl<T: Exchange + Send + Sync> Digest<T> {
    pub fn new(session: &Session<T>, algorithm: Algorithm, mode: Mode) -> Result<Self, Error> {
        if mode != Mode::Digest {
            return Err(Error::InvalidArgument("invalid mode for digest context"));
        }

        let mode = digest_mode(algorithm).ok_or(Error::Unsupported("digest algorithm"))?;

        Ok(Self {
            session: session.clone(),
            mode,
            obj: None,
        })
    }

    /// Output length of the bound digest
    pub fn output_len(&self) -> usize {
        self.mode.output_len()
    }

    /// Single shot digest, streamed when the input exceeds one command
    pub async fn one_go(&mut self, data: &[u8]) -> Result<Vec<u8>, Error> {
        debug!("Digest {} ({} bytes)", self.mode, data.len());

        if data.len() <= CIPHER_UPDATE_MAX_DATA {
            return self.session.digest_one_shot(self.mode, data).await;
        }

        self.init().await?;
        let (head, tail) = data.split_at(data.len() - data.len() % CIPHER_UPDATE_MAX_DATA);
        self.update(head).await?;
        self.finish(tail).await
    }

    pub async fn init(&mut self) -> Result<(), Error> {
        if self.obj.is_none() {
            let obj =
                CryptoObject::ensure(&self.session, CryptoContext::Digest, self.mode.into()).await?;
            self.obj = Some(obj);
        }

        self.session.digest_init(self.obj_id()?).await
    }

    fn obj_id(&self) -> Result<u16, Error> {
        self.obj
            .as_ref()
            .map(|o| o.id)
            .ok_or(Error::InvalidArgument("digest context not initialised"))
    }

    pub async fn update(&mut self, data: &[u8]) -> Result<(), Error> {
        let id = self.obj_id()?;

        for c in update_chunks(data, 1) {
            self.session.digest_update(id, c).await?;
        }

        Ok(())
    }

    pub async fn finish(&mut self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let id = self.obj_id()?;

        let (head, tail) = match data.len() > CIPHER_UPDATE_MAX_DATA {
            true => data.split_at(data.len() - CIPHER_UPDATE_MAX_DATA),
            false => (&data[..0], data),
        };
        self.update(head).await?;

        self.session.digest_final(id, tail).await
    }

    /// Release the element crypto object
    pub async fn free(mut self) -> Result<(), Error> {
        match self.obj.take() {
            Some(o) => o.free(&self.session).await,
            None => Ok(()),
        }
    }
}
