// Copyright (c) 2022-2023 The MobileCoin Foundation

use log::debug;

use se05x_apdu::{Exchange, RANDOM_MAX_LEN};

use crate::{Error, Session};

/// Element random number generator
pub struct Rng<T> {
    session: Session<T>,
}

impl<T: Exchange + Send + Sync> Rng<T> {
    pub fn new(session: &Session<T>) -> Self {
        Self {
            session: session.clone(),
        }
    }

    /// Fill a buffer with element random bytes
    pub async fn fill(&self, buff: &mut [u8]) -> Result<(), Error> {
        debug!("Fetching {} random bytes", buff.len());

        for c in buff.chunks_mut(RANDOM_MAX_LEN) {
            let r = self.session.get_random(c.len() as u16).await?;
            c.copy_from_slice(&r);
        }

        Ok(())
    }

    /// Fetch `len` random bytes
    pub async fn get(&self, len: usize) -> Result<Vec<u8>, Error> {
        let mut b = vec![0u8; len];
        self.fill(&mut b).await?;
        Ok(b)
    }
}
