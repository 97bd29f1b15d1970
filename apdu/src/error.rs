// Copyright (c) 2022-2023 The MobileCoin Foundation

/// APDU encoding / decoding errors
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ApduError {
    /// Buffer too short or field length out of range
    #[error("Invalid length")]
    InvalidLength,

    /// Malformed encoding
    #[error("Invalid encoding")]
    InvalidEncoding,

    /// Required TLV tag missing
    #[error("Missing tag 0x{0:02x}")]
    MissingTag(u8),

    /// Unknown enumeration value
    #[error("Unknown value 0x{0:02x}")]
    UnknownValue(u32),

    /// Secure messaging MAC verification failed
    #[error("MAC verification failed")]
    MacMismatch,

    /// Secure messaging padding invalid
    #[error("Invalid secure messaging padding")]
    InvalidPadding,
}

impl From<encdec::Error> for ApduError {
    fn from(e: encdec::Error) -> Self {
        match e {
            encdec::Error::Length => ApduError::InvalidLength,
            _ => ApduError::InvalidEncoding,
        }
    }
}
