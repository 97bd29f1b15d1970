// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Crypto operation engines
//!
//! Each engine binds a session, key object, [Algorithm](crate::Algorithm)
//! and [Mode](crate::Mode) at construction. Algorithm mapping happens
//! there too, so unsupported combinations fail before any APDU is sent.
//!
//! Streaming operations run on an element crypto object identified by
//! `(context << 8) | subtype`, created on demand and deleted by `free`.

use log::debug;

use se05x_apdu::{types::CryptoContext, Exchange, CIPHER_UPDATE_MAX_DATA};

use crate::{Error, Session};

mod accumulator;
pub use accumulator::BlockAccumulator;

mod asym;
pub use asym::Asymmetric;

mod symm;
pub use symm::Symmetric;

mod aead;
pub use aead::{Aead, AeadOutput};

mod mac;
pub use mac::Mac;

mod digest;
pub use digest::Digest;

mod rng;
pub use rng::Rng;

mod derive;
pub use derive::{DeriveKey, DeriveSalt};

/// Crypto object identifier for a context and subtype
pub fn crypto_object_id(context: CryptoContext, subtype: u8) -> u16 {
    (u8::from(context) as u16) << 8 | subtype as u16
}

/// Element crypto object backing a streaming operation.
///
/// Objects are shared per `(context, subtype)`, so a reused object is
/// deleted by whichever handle frees it first.
#[derive(Debug)]
pub(crate) struct CryptoObject {
    pub id: u16,
}

impl CryptoObject {
    /// Look up or create the crypto object for a context and subtype
    pub async fn ensure<T: Exchange + Send + Sync>(
        session: &Session<T>,
        context: CryptoContext,
        subtype: u8,
    ) -> Result<Self, Error> {
        let id = crypto_object_id(context, subtype);

        let existing = session.read_crypto_object_list().await?;
        if existing.iter().any(|e| e.id == id) {
            debug!("Reusing crypto object 0x{:04x}", id);
            return Ok(Self { id });
        }

        debug!("Creating crypto object 0x{:04x} ({})", id, context);
        session.create_crypto_object(id, context, subtype).await?;

        Ok(Self { id })
    }

    /// Delete the crypto object
    pub async fn free<T: Exchange + Send + Sync>(self, session: &Session<T>) -> Result<(), Error> {
        debug!("Deleting crypto object 0x{:04x}", self.id);
        session.delete_crypto_object(self.id).await
    }
}

/// Split data into element sized update chunks, preserving block alignment
pub(crate) fn update_chunks(data: &[u8], block: usize) -> impl Iterator<Item = &[u8]> {
    let max = CIPHER_UPDATE_MAX_DATA - CIPHER_UPDATE_MAX_DATA % block.max(1);
    data.chunks(max)
}
