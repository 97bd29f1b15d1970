// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Software SE05x secure element
//!
//! Implements enough of the SE05x applet to exercise the host library
//! end-to-end: object storage with policies, sessions (including
//! authenticated and secure messaging sessions), platform SCP03,
//! attestation and the cryptographic operation set.
//!
//! [Simulator] can be used in-process as an [Exchange] transport, or
//! served over TCP with [server::serve] (see the `se05x-sim` binary).

use async_trait::async_trait;
use log::trace;
use tokio::sync::Mutex;

use se05x_apdu::Exchange;

mod error;
pub use error::Error;

pub mod crypto;

pub mod object;

mod element;
pub use element::{CommandRecord, Element, SimOptions, UID_LEN};

pub mod server;

/// In-process simulator transport
pub struct Simulator {
    element: Mutex<Element>,
}

impl Simulator {
    /// Create a simulator with the provided options
    pub fn new(opts: SimOptions) -> Result<Self, Error> {
        Ok(Self {
            element: Mutex::new(Element::new(opts)?),
        })
    }

    /// Access the underlying element, for inspection or provisioning
    pub async fn element(&self) -> tokio::sync::MutexGuard<'_, Element> {
        self.element.lock().await
    }

    /// Drop sessions and transient content, as on applet deselect
    pub async fn reset(&self) {
        self.element.lock().await.deselect();
    }
}

#[async_trait]
impl Exchange for Simulator {
    type Error = Error;

    async fn exchange(&self, command: &[u8]) -> Result<Vec<u8>, Self::Error> {
        trace!("TX: {}", hex::encode(command));

        let resp = self.element.lock().await.process(command);

        trace!("RX: {}", hex::encode(&resp));

        Ok(resp)
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.reset().await;
        Ok(())
    }
}
