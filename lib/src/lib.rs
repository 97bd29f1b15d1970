// Copyright (c) 2022-2023 The MobileCoin Foundation

//! NXP SE05x Secure Element Host Library (and CLI)
//!
//! Layers, leaf first:
//!
//! - [se05x_apdu] command / response framing, TLVs and wire enums
//! - [Session] authentication, secure messaging and the raw command set
//! - [KeyStore] / [KeyObject] secure object management
//! - [engine] crypto operation contexts bound to a key, algorithm and mode
//!
//! ```no_run
//! use se05x_sss::{transport::{Connect, TcpOptions, TcpTransport}, Session, SessionConfig};
//!
//! # async fn example() -> Result<(), se05x_sss::Error> {
//! let t = TcpTransport::connect(&TcpOptions::default()).await?;
//! let s = Session::open(t, SessionConfig::default()).await?;
//!
//! let r = s.get_random(16).await?;
//! # Ok(())
//! # }
//! ```

// async traits not yet safe to use
// see https://github.com/rust-lang/rust/issues/91611
// #![feature(async_fn_in_trait)]

pub use se05x_apdu::{self as apdu, Exchange};

/// Re-export transports for consumer use
pub mod transport;

mod api;
pub use api::{
    AeadFinal, BinaryWrite, CcmLengths, CryptoObjectEntry, EcKeyWrite, HkdfRequest, HkdfSalt,
    RsaKeyWrite, SymmKeyWrite,
};

mod channel;

mod error;
pub use error::Error;

pub mod algorithm;
pub use algorithm::{Algorithm, Mode};

pub mod attestation;

pub mod ecc;

mod ecdaa;
pub use ecdaa::{random_key_id, random_key_policy};

mod eckey;

pub mod rsa_key;

pub mod rsa_pad;

pub mod session;
pub use session::{AuthConfig, AuthState, AuthType, RetryConfig, Session, SessionConfig};

pub mod key_object;
pub use key_object::{CipherType, KeyObject, KeyPart};

pub mod key_store;
pub use key_store::{KeyStore, WriteMode};

pub mod engine;
