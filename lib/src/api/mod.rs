// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Element command set
//!
//! Thin, one-APDU-per-call wrappers over the applet commands, implemented
//! on [Session](crate::Session). Every call fails with
//! [Error::Status](crate::Error::Status) on a non-OK status word; higher
//! layers (key store, crypto engines) compose these calls.

use se05x_apdu::{
    types::{Instruction, INS_AUTH_OBJECT, INS_TRANSIENT, P2},
    Command,
};

mod mgmt;
pub use mgmt::CryptoObjectEntry;

mod object;
pub use object::{BinaryWrite, EcKeyWrite, RsaKeyWrite, SymmKeyWrite};

mod crypto;
pub use crypto::{AeadFinal, CcmLengths, HkdfRequest, HkdfSalt};

/// Build an instruction byte with object modifiers
pub(crate) fn ins(i: Instruction, transient: bool, auth: bool) -> u8 {
    let mut v = u8::from(i);
    if transient {
        v |= INS_TRANSIENT;
    }
    if auth {
        v |= INS_AUTH_OBJECT;
    }
    v
}

/// Build a command with the default class
pub(crate) fn command(ins: impl Into<u8>, p1: impl Into<u8>, p2: P2) -> Command {
    Command::new(ins.into(), p1.into(), p2.into())
}

#[cfg(test)]
mod test {
    use se05x_apdu::types::P1;

    use super::*;

    #[test]
    fn instruction_modifiers() {
        assert_eq!(ins(Instruction::Write, false, false), 0x01);
        assert_eq!(ins(Instruction::Write, true, false), 0x81);
        assert_eq!(ins(Instruction::Write, false, true), 0x41);
        assert_eq!(ins(Instruction::Write, true, true), 0xC1);

        let c = command(Instruction::Mgmt, P1::Default, P2::Exist);
        assert_eq!(c.header(), [0x80, 0x04, 0x00, 0x27]);
    }
}
