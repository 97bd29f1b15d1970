// Copyright (c) 2022-2023 The MobileCoin Foundation

use se05x_apdu::{types::Status, ApduError};

/// Simulated element error, mapped to a status word on the wire
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Object does not exist
    #[error("Object 0x{0:08x} not found")]
    NotFound(u32),

    /// Object policy forbids the operation
    #[error("Access denied: {0}")]
    Denied(&'static str),

    /// Session / secure messaging requirements not met
    #[error("Security status not satisfied")]
    Security,

    /// Element state does not permit the command
    #[error("Conditions not satisfied: {0}")]
    Conditions(&'static str),

    /// Malformed or inconsistent command data
    #[error("Invalid data: {0}")]
    InvalidData(&'static str),

    /// Length field out of range
    #[error("Invalid length")]
    Length,

    /// Algorithm or object type not implemented by the simulator
    #[error("Unsupported: {0}")]
    Unsupported(&'static str),

    /// Unknown instruction
    #[error("Unknown instruction 0x{0:02x}")]
    UnknownCommand(u8),

    /// Cryptographic primitive failure
    #[error("Crypto failure: {0}")]
    Crypto(&'static str),

    /// APDU / TLV decoding error
    #[error("APDU error: {0}")]
    Apdu(#[from] ApduError),

    /// IO error (TCP server)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Status word reported for this error
    pub fn status(&self) -> Status {
        match self {
            Error::NotFound(_) => Status::FileNotFound,
            Error::Denied(_) => Status::CommandNotAllowed,
            Error::Security => Status::SecurityStatus,
            Error::Conditions(_) => Status::ConditionsNotSatisfied,
            Error::InvalidData(_) | Error::Apdu(_) => Status::WrongData,
            Error::Length => Status::WrongLength,
            Error::Unsupported(_) => Status::DataInvalid,
            Error::UnknownCommand(_) => Status::InsNotSupported,
            Error::Crypto(_) | Error::Io(_) => Status::NoPreciseDiagnosis,
        }
    }
}
