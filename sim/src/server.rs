// Copyright (c) 2022-2023 The MobileCoin Foundation

//! TCP server exposing a simulated element using the APDU frame format

use std::{net::SocketAddr, sync::Arc};

use log::{debug, info, warn};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

use se05x_apdu::frame::{FrameHeader, MessageType, HEADER_LEN};

use crate::{Error, Simulator};

/// Accept connections on `listener`, serving one client at a time
///
/// Clients share the element state. A close frame or disconnect deselects
/// the applet, dropping sessions and transient object content.
pub async fn serve(listener: TcpListener, sim: Arc<Simulator>) -> Result<(), Error> {
    info!("Listening on {}", listener.local_addr()?);

    loop {
        let (s, addr) = listener.accept().await?;
        s.set_nodelay(true)?;

        debug!("Client connected: {}", addr);

        if let Err(e) = handle(s, addr, &sim).await {
            warn!("Client {} error: {}", addr, e);
        }

        sim.reset().await;
    }
}

/// Exchange frames with a single client until it closes or disconnects
async fn handle(mut s: TcpStream, addr: SocketAddr, sim: &Simulator) -> Result<(), Error> {
    loop {
        let mut b = [0u8; HEADER_LEN];
        match s.read_exact(&mut b).await {
            Ok(_) => (),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("Client {} disconnected", addr);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let h = FrameHeader::decode(&b)?;

        let mut cmd = vec![0u8; h.len as usize];
        s.read_exact(&mut cmd).await?;

        match h.mty {
            MessageType::Apdu => {
                let resp = sim.element().await.process(&cmd);

                let h = FrameHeader::apdu(resp.len())?;
                s.write_all(&h.encode()).await?;
                s.write_all(&resp).await?;
            }
            MessageType::Close => {
                debug!("Client {} closed", addr);
                return Ok(());
            }
        }
    }
}
