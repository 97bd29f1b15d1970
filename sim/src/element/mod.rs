// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Software element state machine
//!
//! [Element] consumes raw command APDUs and produces raw responses. The
//! layers mirror the applet:
//!
//! 1. applet selection and link level platform SCP03
//! 2. ProcessSessionCmd unwrapping, session authentication and session
//!    secure messaging
//! 3. instruction dispatch to the object, management and crypto handlers
//!
//! Errors raised by handlers are reported as status words, the element
//! itself never fails.

use std::collections::BTreeMap;

use encdec::Encode;
use log::{debug, warn};

use se05x_apdu::{
    attestation::AttestationLayout,
    ids,
    policy::{AccessRules, PolicySet},
    scp03::{CardHandshake, SecureMessaging, StaticKeys, INS_EXTERNAL_AUTHENTICATE, INS_INITIALIZE_UPDATE},
    types::{AppletFeatures, EcCurve, Instruction, Origin, SeResult, SecObjType, Status, INS_MASK, P1, P1_TYPE_MASK, P2},
    version::AppletVersion,
    ApduError, Command, Response, TlvWriter, CLA_SECURE_MESSAGING, SE05X_APPLET_AID,
};

use crate::{
    crypto::{ec::EcMaterial, random},
    object::{Access, Content, Object, ObjectStore},
    Error,
};

mod export;
use export::WrapKey;

mod mgmt;

mod object;

mod operation;
use operation::CryptoObject;

mod session;
use session::{CardSession, SessionId};

/// ISO7816 SELECT instruction
const INS_SELECT: u8 = 0xA4;

/// Element unique identifier length
pub const UID_LEN: usize = 18;

/// Element configuration
#[derive(Clone, Debug)]
pub struct SimOptions {
    /// Version reported on select and `GetVersion`
    pub version: AppletVersion,
    /// Attestation record layout produced by attested reads
    pub layout: AttestationLayout,
    /// Platform SCP03 keys and key version number
    pub platform_scp: Option<(StaticKeys, u8)>,
    /// Reject applet commands outside platform SCP03
    pub require_platform_scp: bool,
    /// Refuse ReadObject on symmetric key values
    pub deny_secret_reads: bool,
    pub uid: [u8; UID_LEN],
}

impl Default for SimOptions {
    fn default() -> Self {
        let mut uid = [0u8; UID_LEN];
        uid[..4].copy_from_slice(&[0x04, 0x00, 0x50, 0x01]);
        uid[4..].copy_from_slice(&random(UID_LEN - 4));

        Self {
            version: AppletVersion::new(7, 2, 0),
            layout: AttestationLayout::default(),
            platform_scp: None,
            require_platform_scp: false,
            deny_secret_reads: false,
            uid,
        }
    }
}

/// Executed command, as recorded in the element history
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CommandRecord {
    /// Command header (CLA, INS, P1, P2) after unwrapping
    pub header: [u8; 4],
    /// Session the command was processed in
    pub session: Option<[u8; 8]>,
    /// Status word returned
    pub sw: u16,
}

/// Platform SCP03 state
enum Platform {
    Plain,
    Handshake(CardHandshake),
    Secure(SecureMessaging),
}

/// Simulated SE05x applet
pub struct Element {
    opts: SimOptions,
    store: ObjectStore,
    crypto_objects: BTreeMap<u16, CryptoObject>,
    sessions: BTreeMap<SessionId, CardSession>,
    platform: Platform,
    features: AppletFeatures,
    attestations: u32,
    wrap_key: WrapKey,
    history: Vec<CommandRecord>,
}

/// OK response carrying TLV fields
fn tlv_response(w: TlvWriter) -> Result<Response, Error> {
    Ok(Response::ok(w.finish()?))
}

/// OK response without data
fn done() -> Result<Response, Error> {
    Ok(Response::ok(vec![]))
}

/// Boolean result byte
fn se_result(ok: bool) -> u8 {
    match ok {
        true => SeResult::Success.into(),
        false => SeResult::Failure.into(),
    }
}

/// Encode an `encdec` value to a vector
fn encoded<E: Encode<Error = ApduError>>(v: &E) -> Result<Vec<u8>, Error> {
    let mut b = vec![0u8; v.encode_len()?];
    let n = v.encode(&mut b)?;
    b.truncate(n);
    Ok(b)
}

impl Element {
    /// Create an element with provisioned attestation, ECKA and UID objects
    pub fn new(opts: SimOptions) -> Result<Self, Error> {
        let mut store = ObjectStore::new();

        store.create_curve(EcCurve::NistP256)?;

        let readable = PolicySet::single(0, AccessRules::READ | AccessRules::ATTEST);

        for id in [ids::ATTESTATION_KEY, ids::KP_ECKEY_USER] {
            let mut o = Object::new(
                id,
                SecObjType::EcKeyPair,
                Content::Ec(EcMaterial::generate(EcCurve::NistP256)?),
            );
            o.policy = readable.clone();
            o.origin = Origin::Provisioned;
            store.insert(o);
        }

        let mut uid = Object::new(ids::UNIQUE_ID, SecObjType::BinaryFile, Content::Binary(opts.uid.to_vec()));
        uid.policy = PolicySet::single(0, AccessRules::READ);
        uid.origin = Origin::Provisioned;
        store.insert(uid);

        debug!("Element {} ready (uid: {})", opts.version, hex::encode(opts.uid));

        Ok(Self {
            features: opts.version.config,
            opts,
            store,
            crypto_objects: BTreeMap::new(),
            sessions: BTreeMap::new(),
            platform: Platform::Plain,
            attestations: 0,
            wrap_key: WrapKey::random(),
            history: vec![],
        })
    }

    /// Handle one command APDU, returning the encoded response
    pub fn process(&mut self, raw: &[u8]) -> Vec<u8> {
        let r = match Command::decode(raw) {
            Ok(c) => self.link(c),
            Err(e) => {
                warn!("Malformed command APDU: {}", e);
                Response::status(Status::WrongLength)
            }
        };

        r.encode()
    }

    /// Applet deselect: drops sessions, platform SCP03 and transient
    /// object content
    pub fn deselect(&mut self) {
        debug!("Deselect ({} open sessions)", self.sessions.len());

        self.sessions.clear();
        self.platform = Platform::Plain;
        self.store.reset_transient();
        self.crypto_objects.values_mut().for_each(|o| o.reset());
    }

    /// Store an object directly, bypassing policy checks
    pub fn provision(&mut self, o: Object) {
        self.store.insert(o);
    }

    pub fn object(&self, id: u32) -> Option<&Object> {
        self.store.get(id).ok()
    }

    pub fn options(&self) -> &SimOptions {
        &self.opts
    }

    /// Commands executed since creation (or the last [Element::clear_history])
    pub fn history(&self) -> &[CommandRecord] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Secure messaging counters of open sessions
    pub fn session_counters(&self) -> Vec<u32> {
        self.sessions
            .values()
            .filter_map(|s| s.sm().map(|sm| sm.counter()))
            .collect()
    }

    /// Number of open sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Platform SCP03 counter, when established
    pub fn platform_counter(&self) -> Option<u32> {
        match &self.platform {
            Platform::Secure(sm) => Some(sm.counter()),
            _ => None,
        }
    }

    fn link(&mut self, cmd: Command) -> Response {
        debug!("command: {:02x?}", cmd.header());

        // Applet selection resets volatile state
        if cmd.cla & 0x80 == 0 && cmd.ins == INS_SELECT {
            return self.select(&cmd);
        }

        let protected = cmd.cla & CLA_SECURE_MESSAGING != 0;

        match (std::mem::replace(&mut self.platform, Platform::Plain), cmd.ins) {
            // Platform SCP03 INITIALIZE UPDATE
            (_, INS_INITIALIZE_UPDATE) if !protected => self.platform_begin(&cmd),

            // Platform SCP03 EXTERNAL AUTHENTICATE
            (Platform::Handshake(hs), INS_EXTERNAL_AUTHENTICATE) => match hs.authenticate(&cmd) {
                Ok(sm) => {
                    debug!("Platform SCP03 established");
                    self.platform = Platform::Secure(sm);
                    Response::ok(vec![])
                }
                Err(e) => {
                    warn!("Platform SCP03 authentication failed: {}", e);
                    Response::status(Status::SecurityStatus)
                }
            },

            // Commands under platform secure messaging
            (Platform::Secure(mut sm), _) => {
                let r = match protected {
                    true => match sm.unwrap_command(&cmd) {
                        Ok(c) => self.execute(c, true),
                        Err(e) => {
                            warn!("Platform C-MAC check failed: {}", e);
                            Response::status(Status::SecurityStatus)
                        }
                    },
                    false => Response::status(Status::SecurityStatus),
                };

                let r = sm.wrap_response(r);
                self.platform = Platform::Secure(sm);
                r
            }

            // Secure messaging without an established channel
            (_, _) if protected => Response::status(Status::SecurityStatus),

            (_, _) if self.opts.require_platform_scp => {
                debug!("Platform SCP03 required");
                Response::status(Status::SecurityStatus)
            }

            (_, _) => self.execute(cmd, false),
        }
    }

    fn select(&mut self, cmd: &Command) -> Response {
        if cmd.p1 != 0x04 || !SE05X_APPLET_AID.starts_with(&cmd.data) || cmd.data.is_empty() {
            return Response::status(Status::FileNotFound);
        }

        self.deselect();

        let v = AppletVersion {
            config: self.features,
            ..self.opts.version
        };

        match encoded(&v) {
            Ok(b) => Response::ok(b),
            Err(e) => Response::status(e.status()),
        }
    }

    fn platform_begin(&mut self, cmd: &Command) -> Response {
        let (keys, kvn) = match &self.opts.platform_scp {
            Some(k) => k,
            None => return Response::status(Status::ConditionsNotSatisfied),
        };

        if cmd.p1 != 0 && cmd.p1 != *kvn {
            warn!("Unknown platform key version 0x{:02x}", cmd.p1);
            return Response::status(Status::FileNotFound);
        }

        match CardHandshake::respond(keys, cmd, self.card_challenge(), self.diversification()) {
            Ok((hs, data)) => {
                self.platform = Platform::Handshake(hs);
                Response::ok(data)
            }
            Err(e) => Response::status(Error::from(e).status()),
        }
    }

    fn card_challenge(&self) -> [u8; 8] {
        let mut c = [0u8; 8];
        c.copy_from_slice(&random(8));
        c
    }

    fn diversification(&self) -> [u8; 10] {
        let mut d = [0u8; 10];
        d.copy_from_slice(&self.opts.uid[..10]);
        d
    }

    /// Execute a command received on the link (after platform unwrapping)
    fn execute(&mut self, cmd: Command, secure: bool) -> Response {
        if cmd.ins & INS_MASK == u8::from(Instruction::Process) {
            return match self.process_session(&cmd, secure) {
                Ok(r) => r,
                Err(e) => {
                    debug!("Session command rejected: {}", e);
                    Response::status(e.status())
                }
            };
        }

        let r = self.dispatch(&cmd, Access { auth_id: 0, secure }, None);
        self.respond(&cmd, None, r)
    }

    /// Convert a handler result to a response, recording the command
    fn respond(&mut self, cmd: &Command, session: Option<SessionId>, r: Result<Response, Error>) -> Response {
        let resp = match r {
            Ok(r) => r,
            Err(e) => {
                debug!(
                    "Command {:02x} {:02x} {:02x} failed: {}",
                    cmd.ins, cmd.p1, cmd.p2, e
                );
                Response::status(e.status())
            }
        };

        self.history.push(CommandRecord {
            header: cmd.header(),
            session,
            sw: resp.sw,
        });

        resp
    }

    /// Dispatch an applet command on behalf of a caller
    fn dispatch(
        &mut self,
        cmd: &Command,
        access: Access,
        session: Option<SessionId>,
    ) -> Result<Response, Error> {
        let ins = Instruction::try_from(cmd.ins & INS_MASK).map_err(|_| Error::UnknownCommand(cmd.ins))?;
        let p1 = P1::try_from(cmd.p1 & P1_TYPE_MASK).map_err(|_| Error::InvalidData("unknown P1"))?;
        let p2 = P2::try_from(cmd.p2).map_err(|_| Error::InvalidData("unknown P2"))?;

        match ins {
            Instruction::Write => self.write(cmd, p1, p2, access),
            Instruction::Read => self.read(cmd, p1, p2, access),
            Instruction::Crypto => self.crypto(cmd, p1, p2, access),
            Instruction::Mgmt => self.mgmt(cmd, p1, p2, access, session),
            Instruction::Process => Err(Error::Conditions("nested session command")),
            Instruction::ImportExternal => Err(Error::Unsupported("external object import")),
        }
    }
}

#[cfg(test)]
mod test {
    use encdec::DecodeOwned;
    use se05x_apdu::{scp03::Handshake, Tag};

    use super::*;

    pub(crate) fn element() -> Element {
        Element::new(SimOptions::default()).unwrap()
    }

    /// Exchange a command, returning the decoded response
    pub(crate) fn call(e: &mut Element, cmd: &Command) -> Response {
        Response::parse(&e.process(&cmd.encode().unwrap())).unwrap()
    }

    fn select() -> Command {
        Command::new(INS_SELECT, 0x04, 0x00)
            .with_cla(0x00)
            .with_data(SE05X_APPLET_AID.to_vec())
            .expect_response()
    }

    #[test]
    fn select_reports_version() {
        let mut e = element();

        let r = call(&mut e, &select());
        assert!(r.is_ok());

        let (v, _) = AppletVersion::decode_owned(&r.data).unwrap();
        assert_eq!(v.as_u32(), AppletVersion::new(7, 2, 0).as_u32());

        let r = call(&mut e, &select().with_data(vec![0xA0, 0x00, 0x00, 0x00, 0x01]));
        assert_eq!(r.sw, u16::from(Status::FileNotFound));
    }

    #[test]
    fn malformed_apdu() {
        let mut e = element();
        let r = Response::parse(&e.process(&[0x80, 0x04])).unwrap();
        assert_eq!(r.sw, u16::from(Status::WrongLength));
    }

    #[test]
    fn unknown_instruction() {
        let mut e = element();
        let r = call(&mut e, &Command::new(0x0A, 0x00, 0x00));
        assert_eq!(r.sw, u16::from(Status::InsNotSupported));
        assert_eq!(e.history().len(), 1);
    }

    #[test]
    fn platform_scp03() {
        let keys = StaticKeys {
            enc: [0x11; 16],
            mac: [0x22; 16],
            dek: [0x33; 16],
        };
        let mut e = Element::new(SimOptions {
            platform_scp: Some((keys.clone(), 0x0B)),
            require_platform_scp: true,
            ..Default::default()
        })
        .unwrap();

        assert!(call(&mut e, &select()).is_ok());

        // Plain applet commands are rejected
        let exists = Command::new(0x04, 0x00, 0x27)
            .with_tlv(TlvWriter::new().u32(Tag::Tag1, ids::UNIQUE_ID))
            .unwrap()
            .expect_response();
        assert_eq!(call(&mut e, &exists).sw, u16::from(Status::SecurityStatus));

        let hs = Handshake::new(&keys, 0x0B, [0x5A; 8]);
        let r = call(&mut e, &hs.begin());
        assert!(r.is_ok());

        let (auth, mut sm) = hs.complete(&r.data).unwrap();
        assert!(call(&mut e, &auth).is_ok());
        assert_eq!(e.platform_counter(), Some(sm.counter()));

        let r = call(&mut e, &sm.wrap_command(&exists).unwrap());
        let r = sm.unwrap_response(r).unwrap();
        assert_eq!(r.tlv().unwrap().u8(Tag::Tag1).unwrap(), u8::from(SeResult::Success));
        assert_eq!(e.platform_counter(), Some(sm.counter()));

        // Reselect drops the channel
        assert!(call(&mut e, &select()).is_ok());
        assert_eq!(e.platform_counter(), None);
    }

    #[test]
    fn platform_wrong_keys() {
        let keys = StaticKeys {
            enc: [0x11; 16],
            mac: [0x22; 16],
            dek: [0x33; 16],
        };
        let mut e = Element::new(SimOptions {
            platform_scp: Some((keys, 0x0B)),
            ..Default::default()
        })
        .unwrap();

        let wrong = StaticKeys {
            enc: [0x44; 16],
            mac: [0x22; 16],
            dek: [0x33; 16],
        };
        let hs = Handshake::new(&wrong, 0x0B, [0x5A; 8]);
        let r = call(&mut e, &hs.begin());
        assert!(r.is_ok());

        // Card cryptogram does not match the host keys
        assert!(hs.complete(&r.data).is_err());
    }
}
