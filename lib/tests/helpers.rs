// Copyright (c) 2022-2023 The MobileCoin Foundation

#![allow(dead_code)]

use std::{
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use log::{debug, LevelFilter};
use simplelog::SimpleLogger;

use se05x_sim::{object::Object, SimOptions, Simulator};
use se05x_sss::{
    apdu::{
        types::{Instruction, INS_MASK, P2},
        ApduError, Command, Response, Tag, TlvWriter,
    },
    CipherType, Exchange, KeyObject, KeyPart, KeyStore, Session, SessionConfig,
};

/// Shared in-process simulator transport
pub type Sim = Arc<Simulator>;

pub fn init_logging() {
    let log_level = match std::env::var("LOG_LEVEL").map(|v| LevelFilter::from_str(&v)) {
        Ok(Ok(l)) => l,
        _ => LevelFilter::Debug,
    };

    let _ = SimpleLogger::init(log_level, simplelog::Config::default());
}

/// Setup a simulated element with default options and a plain session
pub async fn setup() -> anyhow::Result<(Sim, KeyStore<Sim>)> {
    setup_with(SimOptions::default()).await
}

/// Setup a simulated element and open a plain session
pub async fn setup_with(opts: SimOptions) -> anyhow::Result<(Sim, KeyStore<Sim>)> {
    init_logging();

    let sim = Arc::new(Simulator::new(opts)?);

    debug!("Opening plain session");
    let s = Session::open(sim.clone(), SessionConfig::default()).await?;

    Ok((sim, KeyStore::new(s)))
}

/// Store an object directly on the element
pub async fn provision(sim: &Sim, o: Object) {
    sim.element().await.provision(o);
}

/// Allocate a persistent handle
pub async fn handle(
    store: &KeyStore<Sim>,
    id: u32,
    part: KeyPart,
    cipher: CipherType,
    size: usize,
) -> anyhow::Result<KeyObject> {
    let h = KeyObject::allocate_handle(store, id, part, cipher, size, true).await?;
    Ok(h)
}

/// Simulator transport recording sent commands, optionally returning
/// ReadObject values one byte short
pub struct Recorder {
    sim: Sim,
    sent: Mutex<Vec<Command>>,
    short_reads: AtomicBool,
}

impl Recorder {
    pub fn new(sim: Sim) -> Self {
        Self {
            sim,
            sent: Mutex::new(vec![]),
            short_reads: AtomicBool::new(false),
        }
    }

    /// Commands sent since the last clear
    pub fn sent(&self) -> Vec<Command> {
        self.sent.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub fn set_short_reads(&self, enabled: bool) {
        self.short_reads.store(enabled, Ordering::SeqCst);
    }
}

/// Drop the last byte of the value field of a successful read response
fn shorten_value(resp: &[u8]) -> Result<Vec<u8>, ApduError> {
    let r = Response::parse(resp)?;
    if !r.is_ok() {
        return Ok(resp.to_vec());
    }

    let mut w = TlvWriter::new();
    for f in r.tlv()?.iter() {
        let tag = Tag::try_from(f.tag).map_err(|_| ApduError::InvalidEncoding)?;
        let v = match tag {
            Tag::Tag1 if !f.value.is_empty() => &f.value[..f.value.len() - 1],
            _ => f.value,
        };
        w = w.bytes(tag, v);
    }

    Ok(Response::ok(w.finish()?).encode())
}

#[async_trait]
impl Exchange for Recorder {
    type Error = se05x_sim::Error;

    async fn exchange(&self, command: &[u8]) -> Result<Vec<u8>, Self::Error> {
        let cmd = Command::decode(command)?;
        let resp = self.sim.exchange(command).await?;

        let is_read = cmd.ins & INS_MASK == u8::from(Instruction::Read) && cmd.p2 == u8::from(P2::Default);
        self.sent.lock().unwrap().push(cmd);

        match is_read && self.short_reads.load(Ordering::SeqCst) {
            true => Ok(shorten_value(&resp)?),
            false => Ok(resp),
        }
    }
}

/// Setup a simulated element behind a [Recorder] and open a plain session
pub async fn setup_recorded() -> anyhow::Result<(Arc<Recorder>, KeyStore<Arc<Recorder>>)> {
    init_logging();

    let sim = Arc::new(Simulator::new(SimOptions::default())?);
    let rec = Arc::new(Recorder::new(sim));

    let s = Session::open(rec.clone(), SessionConfig::default()).await?;

    Ok((rec, KeyStore::new(s)))
}
