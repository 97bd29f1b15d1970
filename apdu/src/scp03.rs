// Copyright (c) 2022-2023 The MobileCoin Foundation

//! GlobalPlatform SCP03 primitives
//!
//! This provides session key derivation, card / host cryptograms, the
//! INITIALIZE UPDATE / EXTERNAL AUTHENTICATE handshake (as a sans-IO state
//! machine for both the host and card sides) and command / response
//! secure messaging with C-DEC, C-MAC, R-ENC and R-MAC.
//!
//! Only AES-128 key sets are supported.

use aes::{
    cipher::{
        block_padding::Iso7816, generic_array::GenericArray, BlockDecryptMut, BlockEncrypt,
        BlockEncryptMut, KeyInit, KeyIvInit,
    },
    Aes128,
};
use cmac::{Cmac, Mac};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{types::Status, ApduError, Command, Response, CLA_SECURE_MESSAGING, SE05X_CLA};

/// SCP03 key length
pub const KEY_LEN: usize = 16;

/// Truncated MAC length
pub const MAC_LEN: usize = 8;

/// Challenge / cryptogram length
pub const CHALLENGE_LEN: usize = 8;

/// SCP03 key
pub type Key = [u8; KEY_LEN];

/// INITIALIZE UPDATE instruction
pub const INS_INITIALIZE_UPDATE: u8 = 0x50;
/// EXTERNAL AUTHENTICATE instruction
pub const INS_EXTERNAL_AUTHENTICATE: u8 = 0x82;
/// Security level requested on EXTERNAL AUTHENTICATE (C-DEC, C-MAC, R-ENC, R-MAC)
pub const SECURITY_LEVEL: u8 = 0x33;

/// SCP identifier reported in key information
const SCP_ID: u8 = 0x03;

/// KDF derivation constants
mod derivation {
    pub const CARD_CRYPTOGRAM: u8 = 0x00;
    pub const HOST_CRYPTOGRAM: u8 = 0x01;
    pub const S_ENC: u8 = 0x04;
    pub const S_MAC: u8 = 0x06;
    pub const S_RMAC: u8 = 0x07;
}

/// Static (long term) SCP03 key set
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct StaticKeys {
    pub enc: Key,
    pub mac: Key,
    pub dek: Key,
}

impl core::fmt::Debug for StaticKeys {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StaticKeys").finish_non_exhaustive()
    }
}

/// Per-session SCP03 keys
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    pub enc: Key,
    pub mac: Key,
    pub rmac: Key,
}

impl core::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionKeys").finish_non_exhaustive()
    }
}

impl SessionKeys {
    /// Derive session keys from the static key set and handshake context
    /// (`HOST_CHALLENGE || CARD_CHALLENGE`)
    pub fn derive(keys: &StaticKeys, context: &[u8]) -> Self {
        let mut s = Self {
            enc: [0u8; KEY_LEN],
            mac: [0u8; KEY_LEN],
            rmac: [0u8; KEY_LEN],
        };

        kdf(&keys.enc, derivation::S_ENC, context, &mut s.enc);
        kdf(&keys.mac, derivation::S_MAC, context, &mut s.mac);
        kdf(&keys.mac, derivation::S_RMAC, context, &mut s.rmac);

        s
    }

    /// Compute the card cryptogram
    pub fn card_cryptogram(&self, context: &[u8]) -> [u8; CHALLENGE_LEN] {
        let mut c = [0u8; CHALLENGE_LEN];
        kdf(&self.mac, derivation::CARD_CRYPTOGRAM, context, &mut c);
        c
    }

    /// Compute the host cryptogram
    pub fn host_cryptogram(&self, context: &[u8]) -> [u8; CHALLENGE_LEN] {
        let mut c = [0u8; CHALLENGE_LEN];
        kdf(&self.mac, derivation::HOST_CRYPTOGRAM, context, &mut c);
        c
    }
}

/// Compute AES-CMAC over a sequence of inputs
pub fn cmac(key: &Key, parts: &[&[u8]]) -> [u8; 16] {
    let mut m = <Cmac<Aes128> as KeyInit>::new(GenericArray::from_slice(key));
    for p in parts {
        m.update(p);
    }

    let mut o = [0u8; 16];
    o.copy_from_slice(&m.finalize().into_bytes());
    o
}

/// NIST SP 800-108 counter mode KDF with AES-CMAC as the PRF, filling `out`
///
/// ```text
/// LABEL (11 x 00) || CONSTANT || 00 || L (2, bits) || i (1) || CONTEXT
/// ```
pub fn kdf(key: &Key, constant: u8, context: &[u8], out: &mut [u8]) {
    let bits = (out.len() * 8) as u16;
    let mut label = [0u8; 16];
    label[11] = constant;
    label[13..15].copy_from_slice(&bits.to_be_bytes());

    for (i, chunk) in out.chunks_mut(16).enumerate() {
        label[15] = (i + 1) as u8;
        let b = cmac(key, &[&label, context]);
        chunk.copy_from_slice(&b[..chunk.len()]);
    }
}

/// Encrypt a single block with AES-128 (ECB)
fn encrypt_block(key: &Key, block: &mut [u8; 16]) {
    let c = Aes128::new(GenericArray::from_slice(key));
    c.encrypt_block(GenericArray::from_mut_slice(block));
}

/// Host side SCP03 handshake
///
/// Call [Handshake::begin] to build INITIALIZE UPDATE, then
/// [Handshake::complete] with the response data to check the card
/// cryptogram and build EXTERNAL AUTHENTICATE.
pub struct Handshake {
    keys: StaticKeys,
    kvn: u8,
    host_challenge: [u8; CHALLENGE_LEN],
}

impl Handshake {
    pub fn new(keys: &StaticKeys, kvn: u8, host_challenge: [u8; CHALLENGE_LEN]) -> Self {
        Self {
            keys: keys.clone(),
            kvn,
            host_challenge,
        }
    }

    /// Build the INITIALIZE UPDATE command
    pub fn begin(&self) -> Command {
        Command::new(INS_INITIALIZE_UPDATE, self.kvn, 0x00)
            .with_data(self.host_challenge.to_vec())
            .expect_response()
    }

    /// Process the INITIALIZE UPDATE response, returning the EXTERNAL
    /// AUTHENTICATE command and the secure messaging context to use on
    /// success
    pub fn complete(self, resp: &[u8]) -> Result<(Command, SecureMessaging), ApduError> {
        // DIV_DATA (10) || KEY_INFO (3) || CARD_CHALLENGE (8) || CARD_CRYPTOGRAM (8) || [SEQ (3)]
        if resp.len() != 29 && resp.len() != 32 {
            return Err(ApduError::InvalidLength);
        }

        let key_info = &resp[10..13];
        if key_info[1] != SCP_ID {
            return Err(ApduError::UnknownValue(key_info[1] as u32));
        }

        let card_challenge = &resp[13..21];
        let card_cryptogram = &resp[21..29];

        let mut context = [0u8; 2 * CHALLENGE_LEN];
        context[..8].copy_from_slice(&self.host_challenge);
        context[8..].copy_from_slice(card_challenge);

        let keys = SessionKeys::derive(&self.keys, &context);

        if keys.card_cryptogram(&context) != card_cryptogram {
            #[cfg(feature = "log")]
            log::error!("SCP03 card cryptogram mismatch");
            return Err(ApduError::MacMismatch);
        }

        let host_cryptogram = keys.host_cryptogram(&context);

        let mut sm = SecureMessaging::new(keys, [0u8; 16]);
        let cmd = Command::new(INS_EXTERNAL_AUTHENTICATE, SECURITY_LEVEL, 0x00)
            .with_data(host_cryptogram.to_vec());

        Ok((sm.mac_only(&cmd)?, sm))
    }
}

/// Card side SCP03 handshake
pub struct CardHandshake {
    keys: SessionKeys,
    context: [u8; 2 * CHALLENGE_LEN],
}

impl CardHandshake {
    /// Respond to INITIALIZE UPDATE, returning the handshake state and
    /// response data
    pub fn respond(
        keys: &StaticKeys,
        cmd: &Command,
        card_challenge: [u8; CHALLENGE_LEN],
        diversification: [u8; 10],
    ) -> Result<(Self, Vec<u8>), ApduError> {
        if cmd.ins != INS_INITIALIZE_UPDATE {
            return Err(ApduError::UnknownValue(cmd.ins as u32));
        }
        if cmd.data.len() != CHALLENGE_LEN {
            return Err(ApduError::InvalidLength);
        }

        let mut context = [0u8; 2 * CHALLENGE_LEN];
        context[..8].copy_from_slice(&cmd.data);
        context[8..].copy_from_slice(&card_challenge);

        let keys = SessionKeys::derive(keys, &context);

        let mut r = Vec::with_capacity(29);
        r.extend_from_slice(&diversification);
        r.extend_from_slice(&[cmd.p1, SCP_ID, 0x00]);
        r.extend_from_slice(&card_challenge);
        r.extend_from_slice(&keys.card_cryptogram(&context));

        Ok((Self { keys, context }, r))
    }

    /// Check EXTERNAL AUTHENTICATE, returning the secure messaging context
    pub fn authenticate(self, cmd: &Command) -> Result<SecureMessaging, ApduError> {
        if cmd.ins != INS_EXTERNAL_AUTHENTICATE {
            return Err(ApduError::UnknownValue(cmd.ins as u32));
        }

        let host_cryptogram = self.keys.host_cryptogram(&self.context);

        let mut sm = SecureMessaging::new(self.keys.clone(), [0u8; 16]);
        let c = sm.verify_mac_only(cmd)?;

        if c.data != host_cryptogram {
            return Err(ApduError::MacMismatch);
        }

        Ok(sm)
    }
}

/// SCP03 secure messaging context
///
/// Tracks the MAC chaining value and the encryption counter. The host
/// side uses [SecureMessaging::wrap_command] and
/// [SecureMessaging::unwrap_response], the card side uses
/// [SecureMessaging::unwrap_command] and [SecureMessaging::wrap_response].
/// The counter starts at one and increments after each response.
#[derive(Clone)]
pub struct SecureMessaging {
    keys: SessionKeys,
    mcv: [u8; 16],
    counter: u32,
}

impl core::fmt::Debug for SecureMessaging {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SecureMessaging")
            .field("counter", &self.counter)
            .finish_non_exhaustive()
    }
}

impl SecureMessaging {
    /// Create a secure messaging context with an initial MAC chaining value
    pub fn new(keys: SessionKeys, mcv: [u8; 16]) -> Self {
        Self {
            keys,
            mcv,
            counter: 1,
        }
    }

    /// Current encryption counter
    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Compute the CBC ICV for the current counter
    fn icv(&self, response: bool) -> [u8; 16] {
        let mut b = [0u8; 16];
        b[12..].copy_from_slice(&self.counter.to_be_bytes());
        if response {
            b[0] = 0x80;
        }
        encrypt_block(&self.keys.enc, &mut b);
        b
    }

    /// Compute the C-MAC over a protected command, updating the chaining value
    fn command_mac(&mut self, cmd: &Command, body: &[u8]) -> Result<[u8; MAC_LEN], ApduError> {
        let lc = Command::lc_bytes(body.len() + MAC_LEN, cmd.le)?;
        self.mcv = cmac(&self.keys.mac, &[&self.mcv, &cmd.header(), &lc, body]);

        let mut m = [0u8; MAC_LEN];
        m.copy_from_slice(&self.mcv[..MAC_LEN]);
        Ok(m)
    }

    /// Compute the R-MAC for a protected response
    fn response_mac(&self, body: &[u8], sw: u16) -> [u8; MAC_LEN] {
        let b = cmac(&self.keys.rmac, &[&self.mcv, body, &sw.to_be_bytes()]);

        let mut m = [0u8; MAC_LEN];
        m.copy_from_slice(&b[..MAC_LEN]);
        m
    }

    /// Check and strip a C-MAC, returning the still-encrypted body
    fn check_command_mac<'a>(&mut self, cmd: &'a Command) -> Result<&'a [u8], ApduError> {
        if cmd.cla & CLA_SECURE_MESSAGING == 0 || cmd.data.len() < MAC_LEN {
            return Err(ApduError::InvalidEncoding);
        }

        let (body, mac) = cmd.data.split_at(cmd.data.len() - MAC_LEN);
        let prev = self.mcv;

        if self.command_mac(cmd, body)? != mac {
            self.mcv = prev;
            #[cfg(feature = "log")]
            log::warn!("C-MAC mismatch for command {:?}", cmd);
            return Err(ApduError::MacMismatch);
        }

        Ok(body)
    }

    /// Apply a C-MAC without encryption (used for EXTERNAL AUTHENTICATE)
    pub fn mac_only(&mut self, cmd: &Command) -> Result<Command, ApduError> {
        let mut c = cmd.clone();
        c.cla |= CLA_SECURE_MESSAGING;

        let mac = self.command_mac(&c, &cmd.data)?;
        c.data.extend_from_slice(&mac);

        Ok(c)
    }

    /// Verify and strip a C-MAC applied with [SecureMessaging::mac_only]
    pub fn verify_mac_only(&mut self, cmd: &Command) -> Result<Command, ApduError> {
        let body = self.check_command_mac(cmd)?.to_vec();

        let mut c = cmd.clone();
        c.cla &= !CLA_SECURE_MESSAGING;
        c.data = body;

        Ok(c)
    }

    /// Protect an outgoing command (host side)
    pub fn wrap_command(&mut self, cmd: &Command) -> Result<Command, ApduError> {
        let mut c = cmd.clone();
        c.cla |= CLA_SECURE_MESSAGING;

        let body = match cmd.data.is_empty() {
            true => vec![],
            false => {
                let icv = self.icv(false);
                cbc::Encryptor::<Aes128>::new(
                    GenericArray::from_slice(&self.keys.enc),
                    GenericArray::from_slice(&icv),
                )
                .encrypt_padded_vec_mut::<Iso7816>(&cmd.data)
            }
        };

        let mac = self.command_mac(&c, &body)?;

        c.data = body;
        c.data.extend_from_slice(&mac);

        Ok(c)
    }

    /// Verify and decrypt an incoming response (host side)
    pub fn unwrap_response(&mut self, resp: Response) -> Result<Response, ApduError> {
        // Error responses may be returned without protection
        if resp.data.len() < MAC_LEN {
            self.counter = self.counter.wrapping_add(1);

            return match resp.sw == Status::Ok as u16 {
                true => Err(ApduError::InvalidLength),
                false => Ok(resp),
            };
        }

        let (body, mac) = resp.data.split_at(resp.data.len() - MAC_LEN);
        if self.response_mac(body, resp.sw) != mac {
            #[cfg(feature = "log")]
            log::warn!("R-MAC mismatch (sw: {:04x})", resp.sw);
            return Err(ApduError::MacMismatch);
        }

        let data = match body.is_empty() {
            true => vec![],
            false => {
                let icv = self.icv(true);
                cbc::Decryptor::<Aes128>::new(
                    GenericArray::from_slice(&self.keys.enc),
                    GenericArray::from_slice(&icv),
                )
                .decrypt_padded_vec_mut::<Iso7816>(body)
                .map_err(|_| ApduError::InvalidPadding)?
            }
        };

        self.counter = self.counter.wrapping_add(1);

        Ok(Response::new(data, resp.sw))
    }

    /// Verify and decrypt an incoming command (card side)
    pub fn unwrap_command(&mut self, cmd: &Command) -> Result<Command, ApduError> {
        let body = self.check_command_mac(cmd)?;

        let data = match body.is_empty() {
            true => vec![],
            false => {
                let icv = self.icv(false);
                cbc::Decryptor::<Aes128>::new(
                    GenericArray::from_slice(&self.keys.enc),
                    GenericArray::from_slice(&icv),
                )
                .decrypt_padded_vec_mut::<Iso7816>(body)
                .map_err(|_| ApduError::InvalidPadding)?
            }
        };

        let mut c = cmd.clone();
        c.cla &= !CLA_SECURE_MESSAGING;
        c.data = data;

        Ok(c)
    }

    /// Protect an outgoing response (card side)
    pub fn wrap_response(&mut self, resp: Response) -> Response {
        if resp.data.is_empty() && resp.sw != Status::Ok as u16 {
            self.counter = self.counter.wrapping_add(1);
            return resp;
        }

        let mut body = match resp.data.is_empty() {
            true => vec![],
            false => {
                let icv = self.icv(true);
                cbc::Encryptor::<Aes128>::new(
                    GenericArray::from_slice(&self.keys.enc),
                    GenericArray::from_slice(&icv),
                )
                .encrypt_padded_vec_mut::<Iso7816>(&resp.data)
            }
        };

        let mac = self.response_mac(&body, resp.sw);
        body.extend_from_slice(&mac);

        self.counter = self.counter.wrapping_add(1);

        Response::new(body, resp.sw)
    }
}

/// Default SCP03 class for protected SE05x commands
pub const SE05X_SM_CLA: u8 = SE05X_CLA | CLA_SECURE_MESSAGING;
