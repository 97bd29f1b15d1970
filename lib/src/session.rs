// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Session management
//!
//! A [Session] owns the session-level state for one authenticated
//! conversation with the element (session id and optional applet secure
//! messaging) and shares a [Link] with any sessions tunnelled through it.
//!
//! Commands pass through three layers on the way out:
//!
//! 1. session secure messaging (AESKey / ECKey sessions)
//! 2. ProcessSessionCmd wrapping with the session id
//! 3. the link transform (platform SCP03 or plain)
//!
//! Responses are unwound in reverse.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use encdec::DecodeOwned;
use log::{debug, error, info, warn};
use strum::Display;
use tokio::sync::Mutex;

use se05x_apdu::{
    ids,
    policy::SessionPolicy,
    scp03::{Handshake, Key, SecureMessaging, StaticKeys},
    types::{Instruction, P1, P2},
    version::AppletVersion,
    Command, Exchange, Response, Tag, TlvWriter, SE05X_APPLET_AID,
};

use crate::{
    attestation::AttestationLayout,
    channel::{Link, Transform},
    eckey, Error,
};

/// Oldest applet version supported by this library
pub const MIN_APPLET_VERSION: AppletVersion = AppletVersion::new(3, 1, 0);

/// Default platform SCP03 key version number
pub const DEFAULT_PLATFORM_KVN: u8 = 0x0B;

/// Applet version from which platform SCP03 is reported as AESKey
const VERSION_PLATFORM_AESKEY: u32 = 0x0403_0000;

/// Applet version from which ECKey sessions use counter based IVs
const VERSION_ECKEY_COUNTER: u32 = 0x0305_0000;

/// Minimum UserID secret length
pub const USER_ID_MIN_LEN: usize = 4;

static SESSION_TAG: AtomicU64 = AtomicU64::new(1);

/// Bounded retry configuration for connecting / selecting the applet
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RetryConfig {
    count: u32,
    delay: Duration,
}

impl RetryConfig {
    /// Maximum number of attempts
    pub const MAX_COUNT: u32 = 50;

    /// Maximum delay between attempts
    pub const MAX_DELAY: Duration = Duration::from_secs(10);

    /// Create a retry configuration, checking bounds
    pub fn new(count: u32, delay: Duration) -> Result<Self, Error> {
        if count == 0 || count > Self::MAX_COUNT {
            return Err(Error::InvalidArgument("retry count must be within 1..=50"));
        }
        if delay > Self::MAX_DELAY {
            return Err(Error::InvalidArgument("retry delay must not exceed 10s"));
        }

        Ok(Self { count, delay })
    }

    /// Number of attempts
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Delay between attempts
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            count: 1,
            delay: Duration::from_secs(1),
        }
    }
}

/// Negotiated authentication type
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum AuthType {
    None,
    Scp03,
    UserId,
    AesKey,
    EcKey,
    EcKeyCounter,
}

/// Session authentication state
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AuthState {
    Closed,
    /// Transport connected and applet selected
    Connected,
    /// Platform SCP03 established, not yet classified
    PlatformAuthenticated,
    Authenticated(AuthType),
}

impl AuthState {
    /// Classify a platform authenticated channel by applet version
    pub fn classify(self, version: Option<&AppletVersion>) -> Self {
        match self {
            Self::PlatformAuthenticated => match version {
                Some(v) if v.as_u32() >= VERSION_PLATFORM_AESKEY => {
                    Self::Authenticated(AuthType::AesKey)
                }
                _ => Self::Authenticated(AuthType::Scp03),
            },
            s => s,
        }
    }

    /// Authentication type, once authenticated
    pub fn auth_type(&self) -> Option<AuthType> {
        match self {
            Self::Authenticated(t) => Some(*t),
            _ => None,
        }
    }
}

/// Session authentication configuration
#[derive(Clone)]
pub enum AuthConfig {
    /// Plain channel
    None,
    /// Platform SCP03 with static keys
    PlatformScp03 { keys: StaticKeys, kvn: u8 },
    /// UserID session
    UserId { auth_id: u32, secret: Vec<u8> },
    /// AESKey session (SCP03 with a single AES key object)
    AesKey { auth_id: u32, key: Key },
    /// ECKey session with the host static P-256 key
    EcKey {
        auth_id: u32,
        host_key: p256::SecretKey,
    },
}

impl AuthConfig {
    /// Authentication object for session level authentication
    pub fn auth_id(&self) -> Option<u32> {
        match self {
            Self::UserId { auth_id, .. }
            | Self::AesKey { auth_id, .. }
            | Self::EcKey { auth_id, .. } => Some(*auth_id),
            _ => None,
        }
    }
}

impl core::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::PlatformScp03 { kvn, .. } => write!(f, "PlatformScp03 {{ kvn: 0x{kvn:02x} }}"),
            Self::UserId { auth_id, .. } => write!(f, "UserId {{ auth_id: 0x{auth_id:08x} }}"),
            Self::AesKey { auth_id, .. } => write!(f, "AesKey {{ auth_id: 0x{auth_id:08x} }}"),
            Self::EcKey { auth_id, .. } => write!(f, "EcKey {{ auth_id: 0x{auth_id:08x} }}"),
        }
    }
}

/// Session configuration
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub auth: AuthConfig,
    /// Skip applet selection (and the version check)
    pub skip_select: bool,
    /// Session policy applied after authentication
    pub policy: Option<SessionPolicy>,
    pub retry: RetryConfig,
    /// Attestation record layout used by the element
    pub attestation: AttestationLayout,
    /// Oldest accepted applet version
    pub min_version: AppletVersion,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auth: AuthConfig::None,
            skip_select: false,
            policy: None,
            retry: RetryConfig::default(),
            attestation: AttestationLayout::default(),
            min_version: MIN_APPLET_VERSION,
        }
    }
}

impl SessionConfig {
    pub fn with_auth(auth: AuthConfig) -> Self {
        Self {
            auth,
            ..Default::default()
        }
    }
}

/// Mutable session state
pub(crate) struct SessionContext<T> {
    link: Arc<Mutex<Link<T>>>,
    session_id: Option<[u8; 8]>,
    sm: Option<SecureMessaging>,
    state: AuthState,
    version: Option<AppletVersion>,
    auth_id: u32,
    tunnelled: bool,
    attestation: AttestationLayout,
}

impl<T: Exchange + Send + Sync> SessionContext<T> {
    async fn transceive(&mut self, cmd: &Command) -> Result<Response, Error> {
        if self.state == AuthState::Closed {
            return Err(Error::Closed);
        }

        let inner = match &mut self.sm {
            Some(sm) => sm.wrap_command(cmd)?,
            None => cmd.clone(),
        };

        let outer = match &self.session_id {
            Some(id) => Command::new(
                Instruction::Process.into(),
                P1::Default.into(),
                P2::Default.into(),
            )
            .with_tlv(
                TlvWriter::new()
                    .bytes(Tag::SessionId, id)
                    .raw(&inner.encode()?),
            )?
            .expect_response(),
            None => inner,
        };

        let resp = {
            let mut link = self.link.lock().await;
            link.transmit(&outer).await?
        };

        match &mut self.sm {
            Some(sm) => Ok(sm.unwrap_response(resp)?),
            None => Ok(resp),
        }
    }
}

/// Handle to an open element session.
///
/// Cloning the handle shares the underlying session.
pub struct Session<T> {
    ctx: Arc<Mutex<SessionContext<T>>>,
    tag: u64,
}

impl<T> Clone for Session<T> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            tag: self.tag,
        }
    }
}

impl<T: Exchange + Send + Sync> Session<T> {
    fn new(link: Arc<Mutex<Link<T>>>, tunnelled: bool, config: &SessionConfig) -> Self {
        let ctx = SessionContext {
            link,
            session_id: None,
            sm: None,
            state: AuthState::Connected,
            version: None,
            auth_id: 0,
            tunnelled,
            attestation: config.attestation,
        };

        Self {
            ctx: Arc::new(Mutex::new(ctx)),
            tag: SESSION_TAG.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Open a session over the provided transport
    pub async fn open(t: T, config: SessionConfig) -> Result<Self, Error> {
        debug!("Opening session ({:?})", config.auth);

        let link = Arc::new(Mutex::new(Link::new(t)));
        let s = Self::new(link, false, &config);

        if let Err(e) = s.establish(&config).await {
            error!("Session open failed: {}", e);
            s.teardown().await;
            return Err(e);
        }

        Ok(s)
    }

    /// Open a session tunnelled through an existing session's link
    pub async fn open_tunnelled(parent: &Session<T>, config: SessionConfig) -> Result<Self, Error> {
        if config.auth.auth_id().is_none() {
            return Err(Error::InvalidArgument(
                "tunnelled sessions require session level authentication",
            ));
        }

        debug!("Opening tunnelled session ({:?})", config.auth);

        let (link, version) = {
            let p = parent.ctx.lock().await;
            if p.state == AuthState::Closed {
                return Err(Error::Closed);
            }
            (p.link.clone(), p.version)
        };

        let s = Self::new(link, true, &config);
        s.ctx.lock().await.version = version;

        if let Err(e) = s.authenticate(&config).await {
            error!("Tunnelled session open failed: {}", e);
            s.teardown().await;
            return Err(e);
        }

        Ok(s)
    }

    async fn establish(&self, config: &SessionConfig) -> Result<(), Error> {
        if !config.skip_select {
            let v = self.select_with_retry(&config.retry).await?;

            let (reported, required) = (v.as_u32() & 0xFFFF_FF00, config.min_version.as_u32());
            if reported < required {
                error!(
                    "Applet version {} older than required {}",
                    v, config.min_version
                );
                return Err(Error::Version(v, config.min_version));
            } else if reported > required {
                info!(
                    "Applet version {} newer than required {}",
                    v, config.min_version
                );
            }

            self.ctx.lock().await.version = Some(v);
        }

        self.authenticate(config).await
    }

    async fn select_with_retry(&self, retry: &RetryConfig) -> Result<AppletVersion, Error> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.select().await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < retry.count() => {
                    warn!(
                        "Applet select attempt {}/{} failed: {} (retrying in {:?})",
                        attempt,
                        retry.count(),
                        e,
                        retry.delay()
                    );
                    tokio::time::sleep(retry.delay()).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Select the applet, returning the reported version
    async fn select(&self) -> Result<AppletVersion, Error> {
        let cmd = Command::new(0xA4, 0x04, 0x00)
            .with_cla(0x00)
            .with_data(SE05X_APPLET_AID.to_vec())
            .expect_response();

        let r = self.call(cmd).await?;
        let (v, _) = AppletVersion::decode_owned(&r.data)?;

        debug!("Selected applet version {} ({:?})", v, v.config);

        Ok(v)
    }

    async fn authenticate(&self, config: &SessionConfig) -> Result<(), Error> {
        let state = match &config.auth {
            AuthConfig::None => {
                warn!("Communication channel is Plain.");
                warn!("!!!Not recommended for production use.!!!");
                AuthState::Authenticated(AuthType::None)
            }
            AuthConfig::PlatformScp03 { keys, kvn } => {
                let sm = self.scp03_handshake(keys, *kvn).await?;

                let mut ctx = self.ctx.lock().await;
                ctx.link.lock().await.set_transform(Transform::Scp03(sm));

                ctx.state = AuthState::PlatformAuthenticated;
                AuthState::PlatformAuthenticated.classify(ctx.version.as_ref())
            }
            auth => AuthState::Authenticated(self.session_auth(auth).await?),
        };

        debug!("Session state: {:?}", state);
        self.ctx.lock().await.state = state;

        if let Some(p) = &config.policy {
            match config.auth.auth_id() {
                Some(_) => self.exchange_session_data(p).await?,
                None => warn!("Session policy ignored without session level authentication"),
            }
        }

        Ok(())
    }

    /// Session level authentication (UserID, AESKey, ECKey)
    async fn session_auth(&self, auth: &AuthConfig) -> Result<AuthType, Error> {
        let auth_id = auth
            .auth_id()
            .ok_or(Error::InvalidArgument("missing auth object id"))?;

        if let AuthConfig::UserId { secret, .. } = auth {
            if secret.len() < USER_ID_MIN_LEN {
                return Err(Error::InvalidArgument("UserID secret too short"));
            }
        }

        let skip_check = matches!(auth, AuthConfig::UserId { .. }) && auth_id == ids::TRANSPORT;
        if !skip_check && !self.check_object_exists(auth_id).await? {
            error!("Authentication object 0x{:08x} not found", auth_id);
            return Err(Error::NotFound(auth_id));
        }

        // Element ECKA key is read before the session exists
        let ecka = match auth {
            AuthConfig::EcKey { .. } => Some(eckey::read_element_key(self).await?),
            _ => None,
        };

        let id = self.create_session(auth_id).await?;
        debug!("Created session {} for 0x{:08x}", hex::encode(id), auth_id);

        {
            let mut ctx = self.ctx.lock().await;
            ctx.session_id = Some(id);
            ctx.auth_id = auth_id;
        }

        let t = match auth {
            AuthConfig::UserId { secret, .. } => {
                self.verify_session_user_id(secret).await?;
                AuthType::UserId
            }
            AuthConfig::AesKey { key, .. } => {
                let keys = StaticKeys {
                    enc: *key,
                    mac: *key,
                    dek: *key,
                };
                let sm = self.scp03_handshake(&keys, 0x00).await?;
                self.ctx.lock().await.sm = Some(sm);
                AuthType::AesKey
            }
            AuthConfig::EcKey { host_key, .. } => {
                let ecka = ecka.ok_or(Error::Auth("missing element key"))?;
                let sm = eckey::authenticate(self, host_key, &ecka).await?;

                let mut ctx = self.ctx.lock().await;
                ctx.sm = Some(sm);
                match ctx.version {
                    Some(v) if v.as_u32() >= VERSION_ECKEY_COUNTER => AuthType::EcKeyCounter,
                    _ => AuthType::EcKey,
                }
            }
            _ => return Err(Error::InvalidArgument("not a session authentication")),
        };

        Ok(t)
    }

    /// SCP03 handshake over the current channel
    async fn scp03_handshake(&self, keys: &StaticKeys, kvn: u8) -> Result<SecureMessaging, Error> {
        let hs = Handshake::new(keys, kvn, rand::random());

        let r = self.call(hs.begin()).await?;

        let (auth, sm) = hs.complete(&r.data).map_err(|e| {
            error!("SCP03 handshake failed: {}", e);
            Error::Auth("card cryptogram mismatch")
        })?;

        self.call(auth).await?;

        debug!("SCP03 established (kvn: 0x{:02x})", kvn);

        Ok(sm)
    }

    /// Refresh the session, optionally applying a new policy
    pub async fn refresh(&self, policy: Option<&SessionPolicy>) -> Result<(), Error> {
        if self.ctx.lock().await.session_id.is_none() {
            return Err(Error::InvalidArgument("refresh requires a session"));
        }

        debug!("Refreshing session (policy: {:?})", policy);

        self.refresh_session(policy).await
    }

    /// Close the session, and the transport unless tunnelled
    pub async fn close(&self) -> Result<(), Error> {
        let has_session = {
            let ctx = self.ctx.lock().await;
            if ctx.state == AuthState::Closed {
                return Ok(());
            }
            ctx.session_id.is_some()
        };

        debug!("Closing session");

        let r = match has_session {
            true => self.close_session().await,
            false => Ok(()),
        };

        if let Err(e) = &r {
            warn!("CloseSession failed: {}", e);
        }

        self.teardown().await;

        r
    }

    async fn teardown(&self) {
        let mut ctx = self.ctx.lock().await;

        ctx.sm = None;
        ctx.session_id = None;
        ctx.state = AuthState::Closed;

        if !ctx.tunnelled {
            if let Err(e) = ctx.link.lock().await.close().await {
                warn!("Transport close failed: {}", e);
            }
        }
    }

    /// Transmit a command through every session layer
    pub async fn transmit(&self, cmd: &Command) -> Result<Response, Error> {
        self.ctx.lock().await.transceive(cmd).await
    }

    /// Transmit a command, failing on any non-OK status
    pub(crate) async fn call(&self, cmd: Command) -> Result<Response, Error> {
        let r = self.transmit(&cmd).await?;

        if !r.is_ok() {
            debug!(
                "Command {:02x} {:02x} {:02x} failed: 0x{:04x}",
                cmd.ins, cmd.p1, cmd.p2, r.sw
            );
            return Err(Error::Status(r.sw));
        }

        Ok(r)
    }

    /// Tag identifying this session, shared by clones
    pub fn tag(&self) -> u64 {
        self.tag
    }

    /// Check whether two handles refer to the same session
    pub fn same_session(&self, other: &Session<T>) -> bool {
        self.tag == other.tag
    }

    /// Current authentication state
    pub async fn state(&self) -> AuthState {
        self.ctx.lock().await.state
    }

    /// Negotiated authentication type
    pub async fn auth_type(&self) -> Option<AuthType> {
        self.ctx.lock().await.state.auth_type()
    }

    /// Authentication object id (`0` without a session)
    pub async fn auth_id(&self) -> u32 {
        self.ctx.lock().await.auth_id
    }

    /// Check whether a session id has been established
    pub async fn has_session_id(&self) -> bool {
        self.ctx.lock().await.session_id.is_some()
    }

    /// Applet version reported on select
    pub async fn applet_version(&self) -> Option<AppletVersion> {
        self.ctx.lock().await.version
    }

    /// Attestation record layout for this element
    pub async fn attestation_layout(&self) -> AttestationLayout {
        self.ctx.lock().await.attestation
    }

    pub async fn is_tunnelled(&self) -> bool {
        self.ctx.lock().await.tunnelled
    }

    /// Session secure messaging counter (AESKey / ECKey sessions)
    pub async fn sm_counter(&self) -> Option<u32> {
        self.ctx.lock().await.sm.as_ref().map(|sm| sm.counter())
    }

    /// Check whether the link carries platform SCP03
    pub async fn is_platform_secure(&self) -> bool {
        let ctx = self.ctx.lock().await;
        let link = ctx.link.lock().await;
        link.is_secure()
    }

    /// Element unique identifier (18 bytes)
    pub async fn uid(&self) -> Result<[u8; UID_LEN], Error> {
        let uid = self.read_object(ids::UNIQUE_ID, None, None).await?;
        let n = uid.len();
        uid.try_into()
            .map_err(|_| Error::Encoding(format!("unexpected UID length {}", n)))
    }

    /// Certificate UID (10 bytes) derived from the element UID
    pub async fn cert_uid(&self) -> Result<[u8; CERT_UID_LEN], Error> {
        let uid = self.uid().await?;
        Ok(cert_uid(&uid))
    }

    /// Applet version as reported by `GetVersion`
    pub async fn version(&self) -> Result<AppletVersion, Error> {
        self.get_version().await
    }

    /// Free memory in the provided pool
    pub async fn free_memory(&self, kind: se05x_apdu::types::MemoryType) -> Result<u16, Error> {
        self.get_free_memory(kind).await
    }

    /// Configure the applet feature set
    pub async fn set_feature(
        &self,
        features: se05x_apdu::types::AppletFeatures,
    ) -> Result<(), Error> {
        debug!("Setting applet features: {:?}", features);
        self.set_applet_features(features).await
    }
}

/// Element UID length
pub const UID_LEN: usize = 18;

/// Certificate UID length
pub const CERT_UID_LEN: usize = 10;

/// Extract the certificate UID from an element UID
pub fn cert_uid(uid: &[u8; UID_LEN]) -> [u8; CERT_UID_LEN] {
    let mut c = [0u8; CERT_UID_LEN];
    c[0] = uid[2];
    c[1] = uid[3];
    c[2..].copy_from_slice(&uid[8..16]);
    c
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn retry_bounds() {
        assert!(RetryConfig::new(0, Duration::from_secs(1)).is_err());
        assert!(RetryConfig::new(51, Duration::from_secs(1)).is_err());
        assert!(RetryConfig::new(3, Duration::from_secs(11)).is_err());

        let r = RetryConfig::new(50, Duration::from_secs(10)).unwrap();
        assert_eq!(r.count(), 50);
        assert_eq!(r.delay(), Duration::from_secs(10));

        assert_eq!(RetryConfig::default().count(), 1);
    }

    #[test]
    fn platform_classification() {
        let old = AppletVersion::new(3, 1, 0);
        let new = AppletVersion::new(7, 2, 0);

        assert_eq!(
            AuthState::PlatformAuthenticated.classify(Some(&old)),
            AuthState::Authenticated(AuthType::Scp03)
        );
        assert_eq!(
            AuthState::PlatformAuthenticated.classify(Some(&new)),
            AuthState::Authenticated(AuthType::AesKey)
        );
        assert_eq!(
            AuthState::PlatformAuthenticated.classify(None),
            AuthState::Authenticated(AuthType::Scp03)
        );
        assert_eq!(AuthState::Connected.classify(Some(&new)), AuthState::Connected);
    }

    #[test]
    fn cert_uid_offsets() {
        let mut uid = [0u8; UID_LEN];
        for (i, b) in uid.iter_mut().enumerate() {
            *b = i as u8;
        }
        assert_eq!(cert_uid(&uid), [2, 3, 8, 9, 10, 11, 12, 13, 14, 15]);
    }
}
