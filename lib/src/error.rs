// Copyright (c) 2022-2023 The MobileCoin Foundation

use se05x_apdu::{types::Status, version::AppletVersion, ApduError};

/// SE05x host library error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Underlying transport failed
    #[error("Transport error: {0}")]
    Transport(Box<dyn std::error::Error + Send + Sync>),

    /// Element returned a non-OK status word
    #[error("APDU failed with status 0x{0:04x}")]
    Status(u16),

    /// Malformed command or response encoding
    #[error("APDU encoding error: {0}")]
    Apdu(#[from] ApduError),

    /// Applet older than the supported version
    #[error("Applet version {0} older than required {1}")]
    Version(AppletVersion, AppletVersion),

    /// Object does not exist on the element
    #[error("Object 0x{0:08x} not found")]
    NotFound(u32),

    /// Argument or precondition check failed before any APDU was sent
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Algorithm, mode or object type has no element equivalent
    #[error("Unsupported: {0}")]
    Unsupported(&'static str),

    /// Session authentication failed
    #[error("Authentication failed: {0}")]
    Auth(&'static str),

    /// Output would exceed the caller supplied limit
    #[error("Insufficient buffer (required {0} bytes)")]
    BufferTooSmall(usize),

    /// Object identifier falls in a reserved range
    #[error("Object id 0x{0:08x} is reserved")]
    ReservedId(u32),

    /// Attestation signature could not be verified
    #[error("Attestation verification failed")]
    Attestation,

    /// Existing object was created on a different curve
    #[error("Curve mismatch for object 0x{0:08x}")]
    CurveMismatch(u32),

    /// Key encoding (DER / PKCS) error
    #[error("Key encoding error: {0}")]
    Encoding(String),

    /// Session has been closed
    #[error("Session closed")]
    Closed,

    /// Timeout connecting to the element
    #[error("Timeout waiting for element")]
    Timeout,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap a transport specific error
    pub fn transport(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Box::new(e))
    }

    /// Check whether this error carries the provided status word
    pub fn is_status(&self, s: Status) -> bool {
        matches!(self, Self::Status(v) if *v == s as u16)
    }
}

impl From<der::Error> for Error {
    fn from(e: der::Error) -> Self {
        Self::Encoding(e.to_string())
    }
}

impl From<spki::Error> for Error {
    fn from(e: spki::Error) -> Self {
        Self::Encoding(e.to_string())
    }
}

impl From<pkcs8::Error> for Error {
    fn from(e: pkcs8::Error) -> Self {
        Self::Encoding(e.to_string())
    }
}

impl From<pkcs1::Error> for Error {
    fn from(e: pkcs1::Error) -> Self {
        Self::Encoding(e.to_string())
    }
}

impl From<sec1::Error> for Error {
    fn from(e: sec1::Error) -> Self {
        Self::Encoding(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Timeout
    }
}
