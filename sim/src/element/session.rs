// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Applet sessions: creation, UserID / AESKey / ECKey authentication,
//! session secure messaging and session policies

use log::{debug, info, warn};
use p256::ecdsa::{signature::Verifier, Signature, VerifyingKey};

use se05x_apdu::{
    eckey::{self, INS_INTERNAL_AUTHENTICATE},
    ids,
    policy::SessionPolicy,
    scp03::{CardHandshake, SecureMessaging, StaticKeys, INS_EXTERNAL_AUTHENTICATE, INS_INITIALIZE_UPDATE},
    types::{Instruction, SecObjType, P2},
    Command, Response, Tag, TlvMap, TlvWriter, CLA_SECURE_MESSAGING,
};

use super::{done, tlv_response, Element};
use crate::{crypto::random, object::Access, Error};

/// Session identifier
pub(crate) type SessionId = [u8; 8];

/// Maximum number of concurrently open sessions
pub const MAX_SESSIONS: usize = 4;

/// Authentication method, from the authentication object type
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum SessionKind {
    UserId,
    AesKey,
    EcKey,
}

/// Element side session state
pub(crate) struct CardSession {
    auth_id: u32,
    kind: SessionKind,
    authenticated: bool,
    handshake: Option<CardHandshake>,
    sm: Option<SecureMessaging>,
    policy: SessionPolicy,
    apdus: u32,
}

impl CardSession {
    pub fn sm(&self) -> Option<&SecureMessaging> {
        self.sm.as_ref()
    }
}

fn is_mgmt(cmd: &Command, p2: P2) -> bool {
    cmd.ins & 0x0F == u8::from(Instruction::Mgmt) && cmd.p2 == u8::from(p2)
}

impl Element {
    /// Handle a ProcessSessionCmd, returning the (session protected)
    /// response to the wrapped command
    pub(super) fn process_session(&mut self, cmd: &Command, secure: bool) -> Result<Response, Error> {
        let (t, rest) = TlvMap::parse_prefix(&cmd.data, &[Tag::SessionId])?;
        let id: SessionId = t
            .required(Tag::SessionId)?
            .try_into()
            .map_err(|_| Error::InvalidData("session id length"))?;
        let inner = Command::decode(rest)?;

        let mut sm = match self.sessions.get_mut(&id) {
            Some(s) => s.sm.take(),
            None => {
                debug!("Unknown session {}", hex::encode(id));
                return Err(Error::Security);
            }
        };

        let protected = inner.cla & CLA_SECURE_MESSAGING != 0;

        let r = match (&mut sm, protected) {
            (Some(sm), true) => match sm.unwrap_command(&inner) {
                Ok(c) => {
                    let r = self.session_command(id, &c, true);
                    self.respond(&c, Some(id), r)
                }
                Err(e) => {
                    warn!("Session C-MAC check failed: {}", e);
                    self.respond(&inner, Some(id), Err(Error::Security))
                }
            },
            (Some(_), false) => self.respond(&inner, Some(id), Err(Error::Security)),
            (None, _) => {
                let r = self.session_command(id, &inner, secure);
                self.respond(&inner, Some(id), r)
            }
        };

        let r = match sm {
            Some(mut sm) => {
                let r = sm.wrap_response(r);
                if let Some(s) = self.sessions.get_mut(&id) {
                    s.sm = Some(sm);
                }
                r
            }
            None => r,
        };

        Ok(r)
    }

    fn session_command(&mut self, id: SessionId, cmd: &Command, secure: bool) -> Result<Response, Error> {
        let s = self.sessions.get(&id).ok_or(Error::Security)?;
        let (auth_id, authenticated) = (s.auth_id, s.authenticated);

        // Closing is permitted in any state
        if is_mgmt(cmd, P2::SessionClose) {
            self.sessions.remove(&id);
            debug!("Closed session {}", hex::encode(id));
            return done();
        }

        if !authenticated {
            return self.session_authenticate(id, cmd);
        }

        self.session_limit(id)?;

        self.dispatch(cmd, Access { auth_id, secure }, Some(id))
    }

    /// Apply the session APDU limit
    fn session_limit(&mut self, id: SessionId) -> Result<(), Error> {
        let s = self.sessions.get_mut(&id).ok_or(Error::Security)?;
        s.apdus += 1;

        match s.policy.max_apdu {
            Some(max) if s.apdus > max as u32 => {
                info!("Session {} exceeded {} APDUs", hex::encode(id), max);
                Err(Error::Security)
            }
            _ => Ok(()),
        }
    }

    /// CreateSession, from the default session only
    pub(super) fn session_create(&mut self, t: &TlvMap, session: Option<SessionId>) -> Result<Response, Error> {
        if session.is_some() {
            return Err(Error::Conditions("session create within a session"));
        }

        let auth_id = t.u32(Tag::Tag1)?;
        let o = self.store.get(auth_id)?;

        let kind = match o.obj_type {
            SecObjType::UserId => SessionKind::UserId,
            SecObjType::AesKey => SessionKind::AesKey,
            SecObjType::EcPubKey | SecObjType::EcKeyPair => SessionKind::EcKey,
            _ => return Err(Error::Denied("not an authentication object")),
        };
        if !o.auth {
            return Err(Error::Denied("not an authentication object"));
        }
        if o.is_locked() {
            warn!("Authentication object 0x{:08x} locked", auth_id);
            return Err(Error::Security);
        }
        if self.sessions.len() >= MAX_SESSIONS {
            return Err(Error::Conditions("too many sessions"));
        }

        let mut id = [0u8; 8];
        id.copy_from_slice(&random(8));

        self.sessions.insert(
            id,
            CardSession {
                auth_id,
                kind,
                authenticated: false,
                handshake: None,
                sm: None,
                policy: SessionPolicy::default(),
                apdus: 0,
            },
        );

        debug!("Created {:?} session {} for 0x{:08x}", kind, hex::encode(id), auth_id);

        tlv_response(TlvWriter::new().bytes(Tag::Tag1, &id))
    }

    /// Record an authentication failure against the session auth object
    fn auth_failed(&mut self, auth_id: u32) -> Error {
        if let Ok(o) = self.store.get_mut(auth_id) {
            o.auth_attempts = o.auth_attempts.saturating_add(1);
            warn!(
                "Authentication failed for 0x{:08x} ({}/{})",
                auth_id, o.auth_attempts, o.max_attempts
            );
        }
        Error::Security
    }

    fn auth_succeeded(&mut self, id: SessionId) -> Result<(), Error> {
        let s = self.sessions.get_mut(&id).ok_or(Error::Security)?;
        s.authenticated = true;

        let auth_id = s.auth_id;
        self.store.get_mut(auth_id)?.auth_attempts = 0;

        debug!("Session {} authenticated", hex::encode(id));
        Ok(())
    }

    /// Authentication commands accepted before the session is established
    fn session_authenticate(&mut self, id: SessionId, cmd: &Command) -> Result<Response, Error> {
        let (auth_id, kind) = {
            let s = self.sessions.get(&id).ok_or(Error::Security)?;
            (s.auth_id, s.kind)
        };

        if self.store.get(auth_id)?.is_locked() {
            return Err(Error::Security);
        }

        match (kind, cmd.ins) {
            // VerifySessionUserID
            (SessionKind::UserId, _) if is_mgmt(cmd, P2::SessionUserId) => {
                let secret = cmd.tlv()?.required(Tag::Tag1)?.to_vec();

                let ok = matches!(
                    &self.store.get(auth_id)?.content,
                    crate::object::Content::UserId(v) if *v == secret
                );
                if !ok {
                    return Err(self.auth_failed(auth_id));
                }

                self.auth_succeeded(id)?;
                done()
            }

            // AESKey INITIALIZE UPDATE
            (SessionKind::AesKey, INS_INITIALIZE_UPDATE) => {
                let k = self.store.get(auth_id)?.symmetric()?;
                let key: [u8; 16] = k.try_into().map_err(|_| Error::InvalidData("AESKey length"))?;
                let keys = StaticKeys {
                    enc: key,
                    mac: key,
                    dek: key,
                };

                let (hs, data) = CardHandshake::respond(&keys, cmd, self.card_challenge(), self.diversification())?;

                if let Some(s) = self.sessions.get_mut(&id) {
                    s.handshake = Some(hs);
                }

                Ok(Response::ok(data))
            }

            // AESKey EXTERNAL AUTHENTICATE
            (SessionKind::AesKey, INS_EXTERNAL_AUTHENTICATE) => {
                let hs = self
                    .sessions
                    .get_mut(&id)
                    .and_then(|s| s.handshake.take())
                    .ok_or(Error::Conditions("no pending handshake"))?;

                let sm = match hs.authenticate(cmd) {
                    Ok(sm) => sm,
                    Err(e) => {
                        warn!("AESKey authentication failed: {}", e);
                        return Err(self.auth_failed(auth_id));
                    }
                };

                self.auth_succeeded(id)?;
                if let Some(s) = self.sessions.get_mut(&id) {
                    s.sm = Some(sm);
                }

                done()
            }

            // ECKey INTERNAL AUTHENTICATE
            (SessionKind::EcKey, INS_INTERNAL_AUTHENTICATE) => {
                let (ephemeral, sig) = eckey::decode_request(&cmd.data)?;

                let host = self.store.get(auth_id)?.ec()?;
                let host = VerifyingKey::from_sec1_bytes(host.public.as_deref().unwrap_or_default())
                    .map_err(|_| Error::InvalidData("host ECKey public key"))?;

                let verified = Signature::from_der(sig)
                    .map(|s| host.verify(&eckey::signed_message(ephemeral), &s).is_ok())
                    .unwrap_or(false);
                if !verified {
                    return Err(self.auth_failed(auth_id));
                }

                let shared = self.store.get(ids::KP_ECKEY_USER)?.ec()?.ecdh(ephemeral)?;

                let mut challenge = [0u8; eckey::CHALLENGE_LEN];
                challenge.copy_from_slice(&random(eckey::CHALLENGE_LEN));

                let derived = eckey::derive(&shared, &challenge, ephemeral)?;

                self.auth_succeeded(id)?;
                if let Some(s) = self.sessions.get_mut(&id) {
                    s.sm = Some(SecureMessaging::new(derived.keys.clone(), derived.receipt));
                }

                Ok(Response::ok(eckey::encode_response(&challenge, &derived.receipt)))
            }

            _ => {
                debug!("Command {:02x?} before session authentication", cmd.header());
                Err(Error::Security)
            }
        }
    }

    /// RefreshSession
    pub(super) fn session_refresh(&mut self, t: &TlvMap, session: Option<SessionId>) -> Result<Response, Error> {
        let id = session.ok_or(Error::Conditions("refresh outside a session"))?;
        let s = self.sessions.get_mut(&id).ok_or(Error::Security)?;

        if s.policy != SessionPolicy::default() && !s.policy.allow_refresh {
            return Err(Error::Denied("session refresh not allowed"));
        }

        if let Some(p) = t.get(Tag::Policy) {
            s.policy = SessionPolicy::decode(p)?;
        }
        s.apdus = 0;

        debug!("Refreshed session {} ({:?})", hex::encode(id), s.policy);

        done()
    }

    /// ExchangeSessionData
    pub(super) fn session_policy(&mut self, t: &TlvMap, session: Option<SessionId>) -> Result<Response, Error> {
        let id = session.ok_or(Error::Conditions("session policy outside a session"))?;
        let policy = SessionPolicy::decode(t.required(Tag::Tag1)?)?;

        let s = self.sessions.get_mut(&id).ok_or(Error::Security)?;
        s.policy = policy;
        // The policy exchange itself is not counted
        s.apdus = 0;

        debug!("Session {} policy: {:?}", hex::encode(id), s.policy);

        done()
    }
}
