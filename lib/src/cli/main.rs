// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Command line utility for interacting with SE05x secure elements

use clap::Parser;
use log::{debug, error, info, LevelFilter};

use se05x_sss::{
    apdu::{
        policy::{AccessRules, PolicySet},
        scp03::StaticKeys,
        types::MemoryType,
        RANDOM_MAX_LEN,
    },
    engine::{Digest, Rng},
    transport::{Connect, TcpOptions, TcpTransport},
    Algorithm, AuthConfig, CipherType, KeyObject, KeyPart, KeyStore, Mode, Session,
    SessionConfig,
};

mod helpers;
use helpers::*;

/// SE05x command line utility
#[derive(Clone, PartialEq, Debug, Parser)]
struct Options {
    #[clap(flatten)]
    tcp: TcpOptions,

    /// Platform SCP03 ENC key (enables platform SCP03)
    #[clap(long, requires_all = [ "scp03_mac", "scp03_dek" ])]
    scp03_enc: Option<HexKey<16>>,

    /// Platform SCP03 MAC key
    #[clap(long)]
    scp03_mac: Option<HexKey<16>>,

    /// Platform SCP03 DEK key
    #[clap(long)]
    scp03_dek: Option<HexKey<16>>,

    /// Platform SCP03 key version
    #[clap(long, default_value = "11")]
    scp03_kvn: u8,

    /// UserID authentication object (enables a UserID session)
    #[clap(long, value_parser = parse_id, requires = "user_secret", conflicts_with = "scp03_enc")]
    user_id: Option<u32>,

    /// UserID secret
    #[clap(long)]
    user_secret: Option<HexData>,

    /// Subcommand to execute
    #[clap(subcommand)]
    cmd: Actions,

    /// Log level
    #[clap(long, default_value = "info")]
    log_level: LevelFilter,
}

#[derive(Clone, PartialEq, Debug, Parser)]
#[non_exhaustive]
enum Actions {
    /// Fetch element information
    Info,

    /// Fetch random bytes from the element
    Random {
        /// Number of bytes
        #[clap(long, default_value = "32")]
        len: usize,
    },

    /// List element objects
    List,

    /// Read an object (public keys, binary files, counters, PCRs)
    Read {
        /// Object id (hex with 0x prefix, or decimal)
        #[clap(long, value_parser = parse_id)]
        id: u32,

        /// Maximum output length
        #[clap(long, default_value = "4096")]
        max_len: usize,
    },

    /// Write (or create) a binary file
    WriteBinary {
        #[clap(long, value_parser = parse_id)]
        id: u32,

        /// Hex encoded content
        #[clap(long)]
        data: HexData,

        /// Create as a transient object
        #[clap(long)]
        transient: bool,
    },

    /// Erase an object
    Erase {
        #[clap(long, value_parser = parse_id)]
        id: u32,
    },

    /// Compute a digest on the element
    Digest {
        /// Digest algorithm (sha1, sha224, sha256, sha384, sha512)
        #[clap(long, default_value = "sha256")]
        alg: Algorithm,

        /// Hex encoded message
        #[clap(long)]
        data: HexData,
    },
}

impl Options {
    fn auth(&self) -> anyhow::Result<AuthConfig> {
        if let (Some(enc), Some(mac), Some(dek)) = (&self.scp03_enc, &self.scp03_mac, &self.scp03_dek) {
            return Ok(AuthConfig::PlatformScp03 {
                keys: StaticKeys {
                    enc: enc.0,
                    mac: mac.0,
                    dek: dek.0,
                },
                kvn: self.scp03_kvn,
            });
        }

        if let (Some(auth_id), Some(secret)) = (self.user_id, &self.user_secret) {
            return Ok(AuthConfig::UserId {
                auth_id,
                secret: secret.0.clone(),
            });
        }

        Ok(AuthConfig::None)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Options::parse();

    // Setup logging
    let _ = simplelog::SimpleLogger::init(args.log_level, simplelog::Config::default());

    let retry = retry_from_env();
    debug!("Connecting to {}:{} ({:?})", args.tcp.addr, args.tcp.port, retry);

    // Connect to the element
    let t = match TcpTransport::connect_with_retry(&args.tcp, &retry).await {
        Ok(v) => v,
        Err(e) => {
            error!("Failed to connect to {}:{}: {}", args.tcp.addr, args.tcp.port, e);
            return Err(e.into());
        }
    };

    let config = SessionConfig {
        retry,
        ..SessionConfig::with_auth(args.auth()?)
    };

    let s = Session::open(t, config).await?;

    // Execute command, closing the session regardless of outcome
    let r = execute(&s, args.cmd).await;

    if let Err(e) = s.close().await {
        error!("Failed to close session: {}", e);
    }

    r
}

/// Execute a command on an open session
async fn execute(s: &Session<TcpTransport>, cmd: Actions) -> anyhow::Result<()> {
    debug!("Executing command: {:?}", cmd);

    match cmd {
        Actions::Info => {
            let v = s.version().await?;
            info!("applet version: {} ({:?})", v, v.config);
            info!("auth type: {:?}", s.auth_type().await);

            match s.uid().await {
                Ok(uid) => {
                    info!("uid: {}", hex::encode(&uid));
                    info!("cert uid: {}", hex::encode(se05x_sss::session::cert_uid(&uid)));
                }
                Err(e) => error!("Failed to read uid: {}", e),
            }

            for m in [MemoryType::Persistent, MemoryType::TransientReset, MemoryType::TransientDeselect] {
                info!("free memory ({}): {}", m, s.free_memory(m).await?);
            }
        }
        Actions::Random { len } => {
            if len > 16 * RANDOM_MAX_LEN {
                return Err(anyhow::anyhow!("Random length {} too large", len));
            }

            let r = Rng::new(s).get(len).await?;
            info!("random: {}", hex::encode(r));
        }
        Actions::List => {
            let objects = s.list_objects().await?;

            info!("{} objects:", objects.len());
            for id in objects {
                match s.read_type(id).await {
                    Ok((kind, transient)) => info!("  0x{:08x}: {} ({})", id, kind, transient),
                    Err(e) => info!("  0x{:08x}: {}", id, e),
                }
            }
        }
        Actions::Read { id, max_len } => {
            let store = KeyStore::new(s.clone());
            let obj = KeyObject::get_handle(&store, id).await?;

            let (data, bits) = store.get_key(&obj, max_len).await?;

            info!("0x{:08x} ({} {}, {} bits)", id, obj.cipher, obj.part, bits);
            info!("{}", hex::encode(data));
        }
        Actions::WriteBinary {
            id,
            data,
            transient,
        } => {
            let store = KeyStore::new(s.clone());
            let obj = KeyObject::allocate_handle(
                &store,
                id,
                KeyPart::Default,
                CipherType::Binary,
                data.0.len(),
                !transient,
            )
            .await?;

            let policy = PolicySet::single(
                0,
                AccessRules::READ | AccessRules::WRITE | AccessRules::DELETE,
            );
            store.set_key(&obj, &data.0, data.0.len() * 8, Some(&policy)).await?;

            info!("Wrote {} bytes to 0x{:08x}", data.0.len(), id);
        }
        Actions::Erase { id } => {
            let store = KeyStore::new(s.clone());
            let obj = KeyObject::get_handle(&store, id).await?;

            store.erase_key(&obj).await?;

            info!("Erased 0x{:08x}", id);
        }
        Actions::Digest { alg, data } => {
            let mut d = Digest::new(s, alg, Mode::Digest)?;
            let h = d.one_go(&data.0).await?;
            d.free().await?;

            info!("{}: {}", alg, hex::encode(h));
        }
    }

    Ok(())
}
