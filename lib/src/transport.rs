// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transports for connecting to SE05x elements

use std::{
    fmt::Debug,
    net::{IpAddr, Ipv4Addr, SocketAddr},
};

use async_trait::async_trait;
use log::{debug, trace, warn};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::Mutex,
};

use se05x_apdu::{
    frame::{FrameHeader, MessageType, HEADER_LEN},
    Exchange,
};

use crate::{session::RetryConfig, Error};

/// Default TCP port for remote element proxies / the simulator
pub const DEFAULT_PORT: u16 = 8050;

/// Connect trait for supported transports
#[async_trait]
pub trait Connect: Sized + Send {
    type Options: Debug + Send + Sync;

    /// Connect to the element described by `opts`
    async fn connect(opts: &Self::Options) -> Result<Self, Error>;

    /// Connect with bounded retries
    async fn connect_with_retry(opts: &Self::Options, retry: &RetryConfig) -> Result<Self, Error> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match Self::connect(opts).await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < retry.count() => {
                    warn!(
                        "Connect attempt {}/{} failed: {} (retrying in {:?})",
                        attempt,
                        retry.count(),
                        e,
                        retry.delay()
                    );
                    tokio::time::sleep(retry.delay()).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// TCP connection options
#[derive(Clone, Debug, PartialEq, clap::Parser)]
pub struct TcpOptions {
    /// Element proxy / simulator address
    #[clap(long, default_value = "127.0.0.1")]
    pub addr: IpAddr,

    /// Element proxy / simulator port
    #[clap(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

impl Default for TcpOptions {
    fn default() -> Self {
        Self {
            addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
        }
    }
}

/// TCP transport, exchanging framed APDUs with a remote element
pub struct TcpTransport {
    s: Mutex<TcpStream>,
}

#[async_trait]
impl Connect for TcpTransport {
    type Options = TcpOptions;

    async fn connect(opts: &Self::Options) -> Result<Self, Error> {
        let addr = SocketAddr::new(opts.addr, opts.port);

        debug!("Connecting to {}", addr);

        let s = TcpStream::connect(addr).await?;
        s.set_nodelay(true)?;

        Ok(Self { s: Mutex::new(s) })
    }
}

#[async_trait]
impl Exchange for TcpTransport {
    type Error = Error;

    async fn exchange(&self, command: &[u8]) -> Result<Vec<u8>, Self::Error> {
        let mut s = self.s.lock().await;

        trace!("TX: {}", hex::encode(command));

        // Write framed command
        let h = FrameHeader::apdu(command.len())?;
        s.write_all(&h.encode()).await?;
        s.write_all(command).await?;

        // Read response header
        let mut b = [0u8; HEADER_LEN];
        s.read_exact(&mut b).await?;

        let h = FrameHeader::decode(&b)?;
        if h.mty != MessageType::Apdu {
            return Err(Error::InvalidArgument("unexpected frame type"));
        }

        // Read response body
        let mut resp = vec![0u8; h.len as usize];
        s.read_exact(&mut resp).await?;

        trace!("RX: {}", hex::encode(&resp));

        Ok(resp)
    }

    async fn close(&self) -> Result<(), Self::Error> {
        let mut s = self.s.lock().await;

        let h = FrameHeader {
            mty: MessageType::Close,
            nad: 0,
            len: 0,
        };

        // Remote may already have hung up
        if let Err(e) = s.write_all(&h.encode()).await {
            debug!("Close notification failed: {}", e);
        }
        s.shutdown().await?;

        Ok(())
    }
}
