// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::{net::SocketAddr, sync::Arc};

use clap::Parser;
use log::{debug, info, LevelFilter};
use tokio::net::TcpListener;

use se05x_apdu::{attestation::AttestationLayout, scp03::StaticKeys, version::AppletVersion};
use se05x_sim::{server::serve, SimOptions, Simulator};

/// SE05x secure element simulator
///
/// Serves a software element over TCP using the four byte APDU frame
/// format understood by the host library TCP transport.
#[derive(Clone, Debug, PartialEq, Parser)]
pub struct Args {
    /// Listen address
    #[clap(long, default_value = "127.0.0.1:8050", env = "SE05X_SIM_ADDR")]
    listen: SocketAddr,

    /// Applet version reported by the element (major.minor.patch)
    #[clap(long, default_value = "7.2.0")]
    applet_version: String,

    /// Produce flat (pre 6.0 style) attestation records
    #[clap(long)]
    flat_attestation: bool,

    /// Platform SCP03 ENC, MAC and DEK key (hex, shared by all three)
    #[clap(long)]
    platform_key: Option<String>,

    /// Reject applet commands outside platform SCP03
    #[clap(long, requires = "platform_key")]
    require_platform_scp: bool,

    /// Log level
    #[clap(long, default_value = "info")]
    log_level: LevelFilter,
}

fn parse_version(v: &str) -> anyhow::Result<AppletVersion> {
    let p: Vec<u8> = v
        .split('.')
        .map(|s| s.parse::<u8>())
        .collect::<Result<_, _>>()?;

    match p[..] {
        [major, minor, patch] => Ok(AppletVersion::new(major, minor, patch)),
        _ => Err(anyhow::anyhow!("invalid applet version: {}", v)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Setup logging
    let _ = simplelog::SimpleLogger::init(args.log_level, simplelog::Config::default());

    // Build element options
    let mut opts = SimOptions {
        version: parse_version(&args.applet_version)?,
        require_platform_scp: args.require_platform_scp,
        ..Default::default()
    };

    if args.flat_attestation {
        opts.layout = AttestationLayout::Flat;
    }

    if let Some(k) = &args.platform_key {
        let k: [u8; 16] = hex::decode(k)?
            .try_into()
            .map_err(|_| anyhow::anyhow!("platform key must be 16 bytes"))?;
        opts.platform_scp = Some((StaticKeys { enc: k, mac: k, dek: k }, 0x0B));
    }

    info!(
        "Starting simulated element {} (uid: {})",
        opts.version,
        hex::encode(opts.uid)
    );

    let sim = Arc::new(Simulator::new(opts)?);
    let listener = TcpListener::bind(args.listen).await?;

    // Serve until exit signal
    tokio::select!(
        r = serve(listener, sim) => {
            r?;
        }
        // Exit on ctrl + c
        _ = tokio::signal::ctrl_c() => {
            debug!("Exit!");
        },
    );

    Ok(())
}
