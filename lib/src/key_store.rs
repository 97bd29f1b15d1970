// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Secure object store
//!
//! Every mutating call first checks whether the target object exists and
//! selects a [WriteMode]: objects are *created* with their policy, size and
//! key part attached, or *updated* with none of these.

use log::{debug, error, warn};

use se05x_apdu::{
    ids,
    policy::PolicySet,
    types::{self, EcCurve, RsaKeyComponent, P1},
    Exchange, BINARY_WRITE_MAX_LEN,
};

use crate::{
    api::{BinaryWrite, EcKeyWrite, RsaKeyWrite, SymmKeyWrite},
    attestation::{AttestParams, AttestedRead},
    ecc::{self, curve_for, curve_info},
    key_object::{CipherType, KeyObject, KeyPart},
    rsa_key::{self, RsaComponents},
    Error, Session,
};

/// Largest binary object the element accepts
pub const BINARY_MAX_LEN: usize = 0xFFFF;

/// Valid AES key lengths (bytes)
pub const AES_KEY_LENS: [usize; 4] = [16, 24, 32, 40];

/// Write strategy, selected by object existence
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WriteMode {
    /// Object is absent, attach policy / size / key part
    Create,
    /// Object exists, attach none of them
    Update,
}

impl WriteMode {
    /// Select the mode for an object
    pub async fn select<T: Exchange + Send + Sync>(
        session: &Session<T>,
        id: u32,
    ) -> Result<Self, Error> {
        match session.check_object_exists(id).await? {
            true => {
                debug!("Key Id 0x{:X} exists", id);
                Ok(Self::Update)
            }
            false => Ok(Self::Create),
        }
    }

    pub fn is_create(&self) -> bool {
        *self == Self::Create
    }

    /// Pass a value through on create only
    pub fn on_create<V>(&self, v: V) -> Option<V> {
        match self {
            Self::Create => Some(v),
            Self::Update => None,
        }
    }
}

/// Binary read chunks must carry exactly the requested length
fn check_chunk(id: u32, offset: usize, expected: usize, chunk: &[u8]) -> Result<(), Error> {
    if chunk.is_empty() || chunk.len() != expected {
        error!(
            "Short read of 0x{:08x} at {}: {} of {} bytes",
            id,
            offset,
            chunk.len(),
            expected
        );
        return Err(Error::Encoding(format!(
            "binary read returned {} of {} bytes",
            chunk.len(),
            expected
        )));
    }
    Ok(())
}

/// Key store bound to a single session
pub struct KeyStore<T> {
    session: Session<T>,
    /// Key encryption key applied to symmetric key writes
    kek: Option<u32>,
}

impl<T: Exchange + Send + Sync> KeyStore<T> {
    pub fn new(session: Session<T>) -> Self {
        Self { session, kek: None }
    }

    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    /// Current key encryption key id
    pub fn kek(&self) -> Option<u32> {
        self.kek
    }

    pub(crate) fn check_owner(&self, obj: &KeyObject) -> Result<(), Error> {
        if obj.session != self.session.tag() {
            return Err(Error::InvalidArgument("object belongs to a different session"));
        }
        Ok(())
    }

    fn check_reserved(&self, id: u32, op: &str) -> Result<(), Error> {
        if ids::is_ecdaa_random(id) {
            warn!("Could not {} key {:X}. It's reserved for ECDAA random key.", op, id);
            return Err(Error::ReservedId(id));
        }
        Ok(())
    }

    /// Store key material (or data) in an object.
    ///
    /// `bits` is the key size used to select EC curves and attached to
    /// created RSA objects.
    pub async fn set_key(
        &self,
        obj: &KeyObject,
        data: &[u8],
        bits: usize,
        policy: Option<&PolicySet>,
    ) -> Result<(), Error> {
        self.check_owner(obj)?;
        self.check_reserved(obj.key_id, "set")?;

        debug!(
            "Set key 0x{:08x} ({} {}, {} bytes)",
            obj.key_id,
            obj.cipher,
            obj.part,
            data.len()
        );

        let r = match obj.cipher {
            c if c.is_ec() => self.set_ec_key(obj, data, bits, policy).await,
            c if c.is_rsa() => self.set_rsa_key(obj, data, bits, policy).await,
            c if c.is_symmetric() => self.set_symm_key(obj, data, bits, policy).await,
            CipherType::Binary | CipherType::Certificate => {
                self.set_binary(obj, data, policy).await
            }
            CipherType::Pcr => self.set_pcr(obj, data, policy).await,
            CipherType::Counter => self.set_counter(obj, data, bits, policy).await,
            CipherType::UserId => self.set_user_id(obj, data, policy).await,
            _ => Err(Error::Unsupported("cipher type")),
        };

        if let Err(e) = &r {
            error!("Set key 0x{:08x} failed: {}", obj.key_id, e);
        }

        r
    }

    fn resolve_curve(&self, obj: &KeyObject, bits: usize) -> Result<EcCurve, Error> {
        obj.curve
            .or_else(|| curve_for(obj.cipher, bits))
            .ok_or(Error::InvalidArgument("no curve for cipher type and size"))
    }

    /// Check an existing object was created on the same curve, returning
    /// the curve to attach to the write
    async fn curve_for_write(
        &self,
        id: u32,
        curve: EcCurve,
        mode: WriteMode,
    ) -> Result<Option<EcCurve>, Error> {
        if mode.is_create() {
            return Ok(Some(curve));
        }

        let existing = self.session.curve_get_id(id).await?;
        if existing != curve {
            warn!("Cannot overwrite object with different curve id");
            return Err(Error::CurveMismatch(id));
        }

        Ok(None)
    }

    async fn set_ec_key(
        &self,
        obj: &KeyObject,
        data: &[u8],
        bits: usize,
        policy: Option<&PolicySet>,
    ) -> Result<(), Error> {
        let curve = self.resolve_curve(obj, bits)?;
        let info = curve_info(curve);

        let key = ecc::parse_key(&info, obj.part, data)?;

        self.session.ensure_curve(curve).await?;

        let mode = WriteMode::select(&self.session, obj.key_id).await?;
        let curve = self.curve_for_write(obj.key_id, curve, mode).await?;

        self.session
            .write_ec_key(&EcKeyWrite {
                id: obj.key_id,
                part: mode.on_create(obj.part.into()).unwrap_or(types::KeyPart::Na),
                transient: !obj.persistent,
                auth: false,
                policy: mode.on_create(policy).flatten(),
                max_attempts: None,
                curve,
                private: key.private.as_deref(),
                public: key.public.as_deref(),
            })
            .await
    }

    async fn set_rsa_key(
        &self,
        obj: &KeyObject,
        data: &[u8],
        bits: usize,
        policy: Option<&PolicySet>,
    ) -> Result<(), Error> {
        let c = match obj.part {
            KeyPart::Pair | KeyPart::Private => rsa_key::parse_private(data)?,
            KeyPart::Public => rsa_key::parse_public(data)?,
            _ => return Err(Error::InvalidArgument("invalid RSA key part")),
        };

        let crt = obj.cipher == CipherType::RsaCrt;
        let components = rsa_write_order(obj.part, crt, &c)?;

        let bits = match bits {
            0 => c.bits(),
            b => b,
        };
        let size = u16::try_from(bits).map_err(|_| Error::InvalidArgument("RSA key size"))?;

        let mode = WriteMode::select(&self.session, obj.key_id).await?;

        for (i, (component, value)) in components.into_iter().enumerate() {
            let first = i == 0;

            let part = match first {
                true => mode.on_create(obj.part.into()),
                false => None,
            };

            self.session
                .write_rsa_key(&RsaKeyWrite {
                    id: obj.key_id,
                    part: part.unwrap_or(types::KeyPart::Na),
                    crt,
                    transient: !obj.persistent,
                    policy: first.then_some(mode.on_create(policy).flatten()).flatten(),
                    size: first.then_some(mode.on_create(size)).flatten(),
                    component: Some((component, value)),
                })
                .await?;
        }

        Ok(())
    }

    async fn set_symm_key(
        &self,
        obj: &KeyObject,
        data: &[u8],
        bits: usize,
        policy: Option<&PolicySet>,
    ) -> Result<(), Error> {
        if bits % 8 != 0 {
            return Err(Error::InvalidArgument("key length must be byte aligned"));
        }

        let kind = match obj.cipher {
            CipherType::Aes => {
                if !AES_KEY_LENS.contains(&data.len()) {
                    return Err(Error::InvalidArgument("invalid AES key length"));
                }
                P1::Aes
            }
            // CMAC keys are stored as AES keys of any length
            CipherType::Cmac => P1::Aes,
            CipherType::Des => P1::Des,
            CipherType::Hmac => P1::Hmac,
            _ => return Err(Error::Unsupported("symmetric key type")),
        };

        let mode = WriteMode::select(&self.session, obj.key_id).await?;

        self.session
            .write_symm_key(&SymmKeyWrite {
                kind,
                id: obj.key_id,
                transient: !obj.persistent,
                auth: false,
                policy: mode.on_create(policy).flatten(),
                max_attempts: None,
                kek: self.kek,
                key: data,
            })
            .await
    }

    async fn set_binary(
        &self,
        obj: &KeyObject,
        data: &[u8],
        policy: Option<&PolicySet>,
    ) -> Result<(), Error> {
        if data.len() >= BINARY_MAX_LEN {
            return Err(Error::InvalidArgument("binary object too large"));
        }

        let mode = WriteMode::select(&self.session, obj.key_id).await?;
        let file_len = data.len() as u16;

        // An empty object still needs a create call
        if data.is_empty() {
            return self
                .session
                .write_binary(&BinaryWrite {
                    id: obj.key_id,
                    transient: !obj.persistent,
                    policy: mode.on_create(policy).flatten(),
                    offset: None,
                    file_len: mode.on_create(file_len),
                    data,
                })
                .await;
        }

        let mut offset = 0usize;

        for (i, chunk) in data.chunks(BINARY_WRITE_MAX_LEN).enumerate() {
            let create = i == 0 && mode.is_create();

            self.session
                .write_binary(&BinaryWrite {
                    id: obj.key_id,
                    transient: !obj.persistent,
                    policy: create.then_some(policy).flatten(),
                    offset: Some(offset as u16),
                    file_len: create.then_some(file_len),
                    data: chunk,
                })
                .await?;

            offset += chunk.len();
        }

        Ok(())
    }

    async fn set_pcr(
        &self,
        obj: &KeyObject,
        data: &[u8],
        policy: Option<&PolicySet>,
    ) -> Result<(), Error> {
        match WriteMode::select(&self.session, obj.key_id).await? {
            WriteMode::Create => {
                self.session
                    .write_pcr(obj.key_id, policy, Some(data), None)
                    .await
            }
            WriteMode::Update => {
                self.session
                    .write_pcr(obj.key_id, None, None, Some(data))
                    .await
            }
        }
    }

    async fn set_counter(
        &self,
        obj: &KeyObject,
        data: &[u8],
        bits: usize,
        policy: Option<&PolicySet>,
    ) -> Result<(), Error> {
        let value = (!data.is_empty()).then_some(data);

        match WriteMode::select(&self.session, obj.key_id).await? {
            WriteMode::Create => {
                let size = match bits {
                    0 => data.len(),
                    b => b / 8,
                };
                if size == 0 || size > 8 {
                    return Err(Error::InvalidArgument("invalid counter size"));
                }

                self.session
                    .write_counter(obj.key_id, policy, Some(size as u16), value)
                    .await
            }
            WriteMode::Update => {
                self.session
                    .write_counter(obj.key_id, None, None, value)
                    .await
            }
        }
    }

    async fn set_user_id(
        &self,
        obj: &KeyObject,
        data: &[u8],
        policy: Option<&PolicySet>,
    ) -> Result<(), Error> {
        if WriteMode::select(&self.session, obj.key_id).await? == WriteMode::Update {
            return Err(Error::InvalidArgument("UserID objects cannot be updated"));
        }

        self.session
            .write_user_id(obj.key_id, policy, None, data)
            .await
    }

    /// Generate a key pair on the element
    pub async fn generate_key(
        &self,
        obj: &KeyObject,
        bits: usize,
        policy: Option<&PolicySet>,
    ) -> Result<(), Error> {
        self.check_owner(obj)?;
        self.check_reserved(obj.key_id, "generate")?;

        if obj.part != KeyPart::Pair {
            return Err(Error::InvalidArgument("only key pairs can be generated"));
        }

        debug!("Generate key 0x{:08x} ({}, {} bits)", obj.key_id, obj.cipher, bits);

        let mode = WriteMode::select(&self.session, obj.key_id).await?;

        match obj.cipher {
            c if c.is_ec() => {
                let curve = self.resolve_curve(obj, bits)?;
                self.session.ensure_curve(curve).await?;

                let curve_field = self.curve_for_write(obj.key_id, curve, mode).await?;

                self.session
                    .write_ec_key(&EcKeyWrite {
                        id: obj.key_id,
                        part: mode
                            .on_create(types::KeyPart::Pair)
                            .unwrap_or(types::KeyPart::Na),
                        transient: !obj.persistent,
                        auth: false,
                        policy: mode.on_create(policy).flatten(),
                        max_attempts: None,
                        curve: curve_field,
                        private: None,
                        public: None,
                    })
                    .await?;

                if curve == EcCurve::BnP256 {
                    debug!("Generate ECDAA Random Key");
                    self.session.ensure_ecdaa_random_key().await?;
                }

                Ok(())
            }
            c if c.is_rsa() => {
                let size =
                    u16::try_from(bits).map_err(|_| Error::InvalidArgument("RSA key size"))?;

                self.session
                    .write_rsa_key(&RsaKeyWrite {
                        id: obj.key_id,
                        part: mode
                            .on_create(types::KeyPart::Pair)
                            .unwrap_or(types::KeyPart::Na),
                        crt: c == CipherType::RsaCrt,
                        transient: !obj.persistent,
                        policy: mode.on_create(policy).flatten(),
                        size: mode.on_create(size),
                        component: None,
                    })
                    .await
            }
            _ => Err(Error::Unsupported("key generation for cipher type")),
        }
    }

    /// Read the public part (or data) of an object, returning the host
    /// encoding and its size in bits
    pub async fn get_key(&self, obj: &KeyObject, max_len: usize) -> Result<(Vec<u8>, usize), Error> {
        self.check_owner(obj)?;

        let (data, bits) = match obj.cipher {
            c if c.is_ec() => {
                let curve = obj.curve.ok_or(Error::InvalidArgument("EC object without curve"))?;
                let info = curve_info(curve);

                let wire = self.session.read_object(obj.key_id, None, None).await?;
                (ecc::encode_public(&info, &wire)?, info.bits)
            }
            c if c.is_rsa() => {
                let n = self.session.read_rsa(obj.key_id, RsaKeyComponent::Mod).await?;
                let e = self
                    .session
                    .read_rsa(obj.key_id, RsaKeyComponent::PubExp)
                    .await?;

                let spki = rsa_key::encode_public(&n, &e)?;
                let bits = rsa_key::parse_public(&spki)?.bits();
                (spki, bits)
            }
            c if c.is_symmetric() || matches!(c, CipherType::Pcr | CipherType::Counter) => {
                let v = self.session.read_object(obj.key_id, None, None).await?;
                let bits = v.len() * 8;
                (v, bits)
            }
            CipherType::Binary | CipherType::Certificate => {
                let v = self.read_binary(obj.key_id, max_len).await?;
                let bits = v.len() * 8;
                (v, bits)
            }
            _ => return Err(Error::Unsupported("cipher type")),
        };

        if data.len() > max_len {
            error!("Insufficient buffer");
            return Err(Error::BufferTooSmall(data.len()));
        }

        Ok((data, bits))
    }

    async fn read_binary(&self, id: u32, max_len: usize) -> Result<Vec<u8>, Error> {
        let size = self.session.read_size(id).await? as usize;
        if size > max_len {
            error!("Insufficient buffer");
            return Err(Error::BufferTooSmall(size));
        }

        let mut data = Vec::with_capacity(size);
        while data.len() < size {
            let n = (size - data.len()).min(BINARY_WRITE_MAX_LEN);
            let chunk = self
                .session
                .read_object(id, Some(data.len() as u16), Some(n as u16))
                .await?;
            check_chunk(id, data.len(), n, &chunk)?;
            data.extend_from_slice(&chunk);
        }

        Ok(data)
    }

    /// Read an object with attestation, returning the host encoding, size
    /// in bits and the attested reads it was assembled from
    pub async fn get_key_with_attestation(
        &self,
        obj: &KeyObject,
        max_len: usize,
        params: &AttestParams,
    ) -> Result<(Vec<u8>, usize, Vec<AttestedRead>), Error> {
        self.check_owner(obj)?;

        let s = &self.session;
        let mut reads = vec![];

        let (data, bits) = match obj.cipher {
            c if c.is_ec() => {
                let curve = obj.curve.ok_or(Error::InvalidArgument("EC object without curve"))?;
                let info = curve_info(curve);

                let r = s
                    .read_object_attested(obj.key_id, None, None, None, params)
                    .await?;
                let v = ecc::encode_public(&info, r.data())?;
                reads.push(r);
                (v, info.bits)
            }
            c if c.is_rsa() => {
                let n = s
                    .read_object_attested(obj.key_id, None, None, Some(RsaKeyComponent::Mod), params)
                    .await?;
                let e = s
                    .read_object_attested(
                        obj.key_id,
                        None,
                        None,
                        Some(RsaKeyComponent::PubExp),
                        params,
                    )
                    .await?;

                let spki = rsa_key::encode_public(n.data(), e.data())?;
                let bits = rsa_key::parse_public(&spki)?.bits();
                reads.push(n);
                reads.push(e);
                (spki, bits)
            }
            c if c.is_symmetric() || matches!(c, CipherType::Pcr | CipherType::Counter) => {
                let r = s
                    .read_object_attested(obj.key_id, None, None, None, params)
                    .await?;
                let v = r.data().to_vec();
                reads.push(r);
                let bits = v.len() * 8;
                (v, bits)
            }
            CipherType::Binary | CipherType::Certificate => {
                let size = s.read_size(obj.key_id).await? as usize;
                if size > max_len {
                    error!("Insufficient buffer");
                    return Err(Error::BufferTooSmall(size));
                }

                let mut v = Vec::with_capacity(size);
                while v.len() < size {
                    let n = (size - v.len()).min(BINARY_WRITE_MAX_LEN);
                    let r = s
                        .read_object_attested(
                            obj.key_id,
                            Some(v.len() as u16),
                            Some(n as u16),
                            None,
                            params,
                        )
                        .await?;
                    check_chunk(obj.key_id, v.len(), n, r.data())?;
                    v.extend_from_slice(r.data());
                    reads.push(r);
                }
                let bits = v.len() * 8;
                (v, bits)
            }
            _ => return Err(Error::Unsupported("cipher type")),
        };

        if data.len() > max_len {
            error!("Insufficient buffer");
            return Err(Error::BufferTooSmall(data.len()));
        }

        Ok((data, bits, reads))
    }

    /// Delete an object
    pub async fn erase_key(&self, obj: &KeyObject) -> Result<(), Error> {
        self.check_owner(obj)?;

        self.session
            .delete_secure_object(obj.key_id)
            .await
            .map_err(|e| {
                error!("Could not delete Key id {:X}", obj.key_id);
                e
            })
    }

    /// Select (or clear) the key encryption key for symmetric key writes
    pub fn open_key(&mut self, kek: Option<&KeyObject>) -> Result<(), Error> {
        match kek {
            Some(k) => {
                self.check_owner(k)?;
                debug!("Using KEK 0x{:08x}", k.key_id);
                self.kek = Some(k.key_id);
            }
            None => self.kek = None,
        }
        Ok(())
    }

    /// Freezing objects is not supported by the element
    pub fn freeze_key(&self, _obj: &KeyObject) -> Result<(), Error> {
        Err(Error::Unsupported("freeze key"))
    }

    fn check_exportable(obj: &KeyObject) -> Result<(), Error> {
        match obj.cipher {
            c if c.is_ec() => Ok(()),
            CipherType::Aes | CipherType::Des => Ok(()),
            _ => Err(Error::Unsupported("export / import for cipher type")),
        }
    }

    /// Export an object as a wrapped blob
    pub async fn export_key(&self, obj: &KeyObject) -> Result<Vec<u8>, Error> {
        self.check_owner(obj)?;
        Self::check_exportable(obj)?;

        self.session
            .export_object(obj.key_id, RsaKeyComponent::Na)
            .await
    }

    /// Import a wrapped blob previously exported from the element
    pub async fn import_key(&self, obj: &KeyObject, blob: &[u8]) -> Result<(), Error> {
        self.check_owner(obj)?;
        self.check_reserved(obj.key_id, "import")?;
        Self::check_exportable(obj)?;

        self.session
            .import_object(obj.key_id, RsaKeyComponent::Na, blob)
            .await
    }
}

/// Components written for an RSA key part, in element order
pub(crate) fn rsa_write_order<'a>(
    part: KeyPart,
    crt: bool,
    c: &'a RsaComponents,
) -> Result<Vec<(RsaKeyComponent, &'a [u8])>, Error> {
    use RsaKeyComponent::*;

    fn req<'a>(v: &'a Option<Vec<u8>>) -> Result<&'a [u8], Error> {
        v.as_deref()
            .ok_or(Error::InvalidArgument("missing RSA key component"))
    }

    let order = match (part, crt) {
        (KeyPart::Pair, true) => vec![
            (P, req(&c.p)?),
            (Q, req(&c.q)?),
            (Dp, req(&c.dp)?),
            (Dq, req(&c.dq)?),
            (InvQ, req(&c.qinv)?),
            (PubExp, &c.e[..]),
            (Mod, &c.n[..]),
        ],
        (KeyPart::Pair, false) => vec![(PubExp, &c.e[..]), (PrivExp, req(&c.d)?), (Mod, &c.n[..])],
        (KeyPart::Private, true) => vec![
            (P, req(&c.p)?),
            (Q, req(&c.q)?),
            (Dp, req(&c.dp)?),
            (Dq, req(&c.dq)?),
            (InvQ, req(&c.qinv)?),
        ],
        (KeyPart::Private, false) => vec![(PrivExp, req(&c.d)?), (Mod, &c.n[..])],
        (KeyPart::Public, _) => vec![(PubExp, &c.e[..]), (Mod, &c.n[..])],
        _ => return Err(Error::InvalidArgument("invalid RSA key part")),
    };

    Ok(order)
}

#[cfg(test)]
mod test {
    use super::*;

    fn components() -> RsaComponents {
        RsaComponents {
            n: vec![1],
            e: vec![2],
            d: Some(vec![3]),
            p: Some(vec![4]),
            q: Some(vec![5]),
            dp: Some(vec![6]),
            dq: Some(vec![7]),
            qinv: Some(vec![8]),
        }
    }

    fn order(part: KeyPart, crt: bool) -> Vec<RsaKeyComponent> {
        let c = components();
        rsa_write_order(part, crt, &c)
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect()
    }

    #[test]
    fn rsa_component_order() {
        use RsaKeyComponent::*;

        assert_eq!(order(KeyPart::Pair, true), vec![P, Q, Dp, Dq, InvQ, PubExp, Mod]);
        assert_eq!(order(KeyPart::Pair, false), vec![PubExp, PrivExp, Mod]);
        assert_eq!(order(KeyPart::Private, true), vec![P, Q, Dp, Dq, InvQ]);
        assert_eq!(order(KeyPart::Private, false), vec![PrivExp, Mod]);
        assert_eq!(order(KeyPart::Public, true), vec![PubExp, Mod]);
        assert_eq!(order(KeyPart::Public, false), vec![PubExp, Mod]);
    }

    #[test]
    fn rsa_missing_components() {
        let mut c = components();
        c.dq = None;
        assert!(rsa_write_order(KeyPart::Pair, true, &c).is_err());
        assert!(rsa_write_order(KeyPart::Pair, false, &c).is_ok());
    }

    #[test]
    fn write_mode_attachments() {
        assert_eq!(WriteMode::Create.on_create(5), Some(5));
        assert_eq!(WriteMode::Update.on_create(5), None);
    }
}
