// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Channel transforms and the shared element link
//!
//! The [Link] owns the transport and the link-level [Transform] (plain
//! or platform SCP03). It is shared between a session and any sessions
//! tunnelled through it, with the surrounding mutex acting as the tunnel
//! lock.

use log::{debug, trace};

use se05x_apdu::{scp03::SecureMessaging, ApduError, Command, Exchange, Response};

use crate::Error;

/// Per-channel APDU transform
#[derive(Debug)]
pub enum Transform {
    /// No protection
    Plain,
    /// SCP03 secure messaging (C-DEC, C-MAC, R-ENC, R-MAC)
    Scp03(SecureMessaging),
}

impl Transform {
    /// Protect an outgoing command
    pub fn wrap(&mut self, cmd: &Command) -> Result<Command, ApduError> {
        match self {
            Self::Plain => Ok(cmd.clone()),
            Self::Scp03(sm) => sm.wrap_command(cmd),
        }
    }

    /// Verify and unprotect an incoming response
    pub fn unwrap(&mut self, resp: Response) -> Result<Response, ApduError> {
        match self {
            Self::Plain => Ok(resp),
            Self::Scp03(sm) => sm.unwrap_response(resp),
        }
    }

    /// Check whether the transform protects traffic
    pub fn is_secure(&self) -> bool {
        matches!(self, Self::Scp03(_))
    }
}

/// Link to an element: transport plus link-level transform
pub struct Link<T> {
    t: T,
    transform: Transform,
    closed: bool,
}

impl<T: Exchange + Send + Sync> Link<T> {
    /// Create a plain link over the provided transport
    pub fn new(t: T) -> Self {
        Self {
            t,
            transform: Transform::Plain,
            closed: false,
        }
    }

    /// Install a link transform
    pub fn set_transform(&mut self, transform: Transform) {
        debug!("Installing link transform (secure: {})", transform.is_secure());
        self.transform = transform;
    }

    /// Check whether the link carries platform secure messaging
    pub fn is_secure(&self) -> bool {
        self.transform.is_secure()
    }

    /// Transmit a command through the link transform
    pub async fn transmit(&mut self, cmd: &Command) -> Result<Response, Error> {
        let wrapped = self.transform.wrap(cmd)?;
        let resp = self.raw(&wrapped).await?;
        Ok(self.transform.unwrap(resp)?)
    }

    /// Transmit a command without applying the link transform
    pub async fn raw(&mut self, cmd: &Command) -> Result<Response, Error> {
        if self.closed {
            return Err(Error::Closed);
        }

        trace!("Link TX {:?}", cmd);

        let b = self
            .t
            .exchange(&cmd.encode()?)
            .await
            .map_err(Error::transport)?;

        let r = Response::parse(&b)?;

        trace!("Link RX {:?}", r);

        Ok(r)
    }

    /// Close the underlying transport
    pub async fn close(&mut self) -> Result<(), Error> {
        if self.closed {
            return Ok(());
        }

        self.closed = true;
        self.transform = Transform::Plain;
        self.t.close().await.map_err(Error::transport)
    }

    /// Check whether the link has been closed
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
