// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Secure object writes and reads, including attested reads

use byteorder::{BigEndian, ByteOrder};
use log::debug;

use se05x_apdu::{
    attestation::{AttestationLayout, AttestationRecord, ATTEST_RANDOM_LEN},
    policy::{AccessRules, PolicySet},
    types::{
        DigestMode, EcCurve, EcSignatureAlgo, KeyPart, Origin, RsaKeyComponent, SecObjType,
        INS_ATTEST, INS_AUTH_OBJECT, INS_TRANSIENT, P1, P1_KEY_PART_MASK, P2,
    },
    Command, Response, Tag, TlvMap, TlvWriter,
};

use super::{done, encoded, tlv_response, Element};
use crate::{
    crypto::{cipher::key_unwrap, digest, ec::EcMaterial, rsa::RsaMaterial},
    object::{Access, Content, Object},
    Error,
};

/// Maximum UserID secret length
const USER_ID_MAX_LEN: usize = 16;

/// PCR value length
const PCR_LEN: usize = 32;

/// RSA component tags, in write order
const RSA_COMPONENT_TAGS: [(Tag, RsaKeyComponent); 8] = [
    (Tag::Tag3, RsaKeyComponent::P),
    (Tag::Tag4, RsaKeyComponent::Q),
    (Tag::Tag5, RsaKeyComponent::Dp),
    (Tag::Tag6, RsaKeyComponent::Dq),
    (Tag::Tag7, RsaKeyComponent::InvQ),
    (Tag::Tag8, RsaKeyComponent::PubExp),
    (Tag::Tag9, RsaKeyComponent::PrivExp),
    (Tag::Tag10, RsaKeyComponent::Mod),
];

/// Digest applied to attestation messages for a signature algorithm
fn attestation_digest(algo: EcSignatureAlgo) -> Result<DigestMode, Error> {
    match algo {
        EcSignatureAlgo::Sha => Ok(DigestMode::Sha),
        EcSignatureAlgo::Sha224 => Ok(DigestMode::Sha224),
        EcSignatureAlgo::Sha256 => Ok(DigestMode::Sha256),
        EcSignatureAlgo::Sha384 => Ok(DigestMode::Sha384),
        EcSignatureAlgo::Sha512 => Ok(DigestMode::Sha512),
        _ => Err(Error::Unsupported("attestation algorithm")),
    }
}

/// Largest value held by a counter of `size` bytes
fn counter_max(size: usize) -> u64 {
    match size {
        8 => u64::MAX,
        n => (1u64 << (8 * n)) - 1,
    }
}

impl Element {
    pub(super) fn write(&mut self, cmd: &Command, p1: P1, p2: P2, access: Access) -> Result<Response, Error> {
        let t = cmd.tlv()?;

        match (p1, p2) {
            // WriteECKey
            (P1::Ec, P2::Default) => self.write_ec(cmd, &t, access),

            // WriteRSAKey (CRT or raw)
            (P1::Rsa, P2::Default | P2::Raw) => self.write_rsa(cmd, &t, p2 == P2::Default, access),

            // WriteSymmKey
            (P1::Aes | P1::Des | P1::Hmac, P2::Default) => self.write_symmetric(cmd, &t, p1, access),

            // WriteBinary
            (P1::Binary, P2::Default) => self.write_binary(cmd, &t, access),

            // WriteUserID
            (P1::UserId, P2::Default) => self.write_user_id(cmd, &t, access),

            // WriteCounter
            (P1::Counter, P2::Default) => self.write_counter(cmd, &t, access),

            // WritePCR
            (P1::Pcr, P2::Default) => self.write_pcr(cmd, &t, access),

            (P1::Curve, P2::Create) => self.create_curve(&t),
            (P1::CryptoObj, P2::Default) => self.create_crypto_object(&t),
            (P1::Default, P2::Import) => self.import_object(&t, access),

            _ => Err(Error::Unsupported("write command")),
        }
    }

    pub(super) fn read(&mut self, cmd: &Command, p1: P1, p2: P2, access: Access) -> Result<Response, Error> {
        let t = cmd.tlv()?;

        match (p1, p2) {
            // ReadObject, with attestation when flagged
            (P1::Default, P2::Default) if cmd.ins & INS_ATTEST != 0 => self.read_attested(cmd, &t, access),
            (P1::Default, P2::Default) => {
                let data = self.read_data(&t, access)?;
                tlv_response(TlvWriter::new().bytes(Tag::Tag1, &data))
            }

            (P1::Default, P2::Type) => self.read_type(&t),
            (P1::Default, P2::Size) => self.read_size(&t),
            (P1::Default, P2::List) => self.read_id_list(&t),
            (P1::Default, P2::Attributes) => self.read_attributes(&t),
            (P1::Default, P2::Export) => self.export_object(&t, access),

            (P1::Curve, P2::List) => self.read_curve_list(),
            (P1::Curve, P2::Id) => self.read_curve_id(&t),

            (P1::CryptoObj, P2::List) => self.read_crypto_objects(),

            _ => Err(Error::Unsupported("read command")),
        }
    }

    /// Build a new object from creation parameters
    fn new_object(
        &self,
        cmd: &Command,
        t: &TlvMap,
        id: u32,
        obj_type: SecObjType,
        content: Content,
        access: Access,
    ) -> Result<Object, Error> {
        let mut o = Object::new(id, obj_type, content);

        o.transient = cmd.ins & INS_TRANSIENT != 0;
        o.auth = cmd.ins & INS_AUTH_OBJECT != 0;
        o.max_attempts = t.opt_u16(Tag::MaxAttempts)?.unwrap_or(0);
        o.creator = access.auth_id;

        if let Some(p) = t.get(Tag::Policy) {
            o.policy = PolicySet::decode(p)?;
        }

        if o.size() > self.store.free_memory(o.transient) as usize {
            return Err(Error::Conditions("insufficient memory"));
        }

        Ok(o)
    }

    /// Fetch an existing object for update, checking type and policy
    fn updatable(&mut self, id: u32, types: &[SecObjType], rule: AccessRules, access: Access) -> Result<&mut Object, Error> {
        let o = self.store.get_mut(id)?;

        if !types.contains(&o.obj_type) {
            debug!("0x{:08x}: cannot update {:?} object", id, o.obj_type);
            return Err(Error::Conditions("object type mismatch"));
        }
        o.check(&access, rule)?;

        Ok(o)
    }

    fn write_ec(&mut self, cmd: &Command, t: &TlvMap, access: Access) -> Result<Response, Error> {
        let id = t.u32(Tag::Tag1)?;
        let part = KeyPart::try_from(cmd.p1 & P1_KEY_PART_MASK).map_err(|_| Error::InvalidData("key part"))?;
        let private = t.get(Tag::Tag3);
        let public = t.get(Tag::Tag4);
        let generate = private.is_none() && public.is_none();

        if self.store.contains(id) {
            let rule = match generate {
                true => AccessRules::GEN,
                false => AccessRules::WRITE,
            };
            let types = [SecObjType::EcKeyPair, SecObjType::EcPrivKey, SecObjType::EcPubKey];
            let o = self.updatable(id, &types, rule, access)?;

            let curve = match &o.content {
                Content::Ec(m) => m.curve,
                _ => return Err(Error::Conditions("object type mismatch")),
            };
            if matches!(t.opt_u8(Tag::Tag2)?, Some(c) if c != u8::from(curve)) {
                return Err(Error::Conditions("curve mismatch"));
            }

            let (material, origin) = match generate {
                true if o.obj_type == SecObjType::EcPubKey => {
                    return Err(Error::Conditions("cannot generate a public key"))
                }
                true => (EcMaterial::generate(curve)?, Origin::Internal),
                false => {
                    let mut m = EcMaterial {
                        curve,
                        private: private.map(|v| v.to_vec()),
                        public: public.map(|v| v.to_vec()),
                    };
                    m.derive_public()?;
                    (m, Origin::External)
                }
            };

            o.content = Content::Ec(material);
            o.origin = origin;

            debug!("Updated EC key 0x{:08x} ({})", id, origin);
            return done();
        }

        let curve = EcCurve::try_from(t.u8(Tag::Tag2)?).map_err(|_| Error::InvalidData("curve id"))?;
        if !self.store.curve_available(curve) {
            return Err(Error::Conditions("curve not created"));
        }

        let obj_type = match part {
            KeyPart::Pair | KeyPart::Na => SecObjType::EcKeyPair,
            KeyPart::Private => SecObjType::EcPrivKey,
            KeyPart::Public => SecObjType::EcPubKey,
        };

        let (material, origin) = match generate {
            true if obj_type == SecObjType::EcPubKey => {
                return Err(Error::InvalidData("public key value required"))
            }
            true => (EcMaterial::generate(curve)?, Origin::Internal),
            false => {
                let mut m = EcMaterial {
                    curve,
                    private: private.map(|v| v.to_vec()),
                    public: public.map(|v| v.to_vec()),
                };
                m.derive_public()?;
                (m, Origin::External)
            }
        };

        let mut o = self.new_object(cmd, t, id, obj_type, Content::Ec(material), access)?;
        o.origin = origin;
        self.store.insert(o);

        done()
    }

    fn write_rsa(&mut self, cmd: &Command, t: &TlvMap, crt: bool, access: Access) -> Result<Response, Error> {
        let id = t.u32(Tag::Tag1)?;
        let part = KeyPart::try_from(cmd.p1 & P1_KEY_PART_MASK).map_err(|_| Error::InvalidData("key part"))?;

        let mut components = RSA_COMPONENT_TAGS
            .iter()
            .filter_map(|(tag, c)| t.get(*tag).map(|v| (*c, v)));
        let component = components.next();
        if components.next().is_some() {
            return Err(Error::InvalidData("one RSA component per write"));
        }

        if self.store.contains(id) {
            let rule = match component {
                Some(_) => AccessRules::WRITE,
                None => AccessRules::GEN,
            };
            let types = [
                SecObjType::RsaKeyPair,
                SecObjType::RsaKeyPairCrt,
                SecObjType::RsaPrivKey,
                SecObjType::RsaPrivKeyCrt,
                SecObjType::RsaPubKey,
            ];
            let o = self.updatable(id, &types, rule, access)?;
            let public_only = o.obj_type == SecObjType::RsaPubKey;

            let m = match &mut o.content {
                Content::Rsa(m) => m,
                _ => return Err(Error::Conditions("object type mismatch")),
            };

            match component {
                Some((c, v)) => {
                    m.set(c, v)?;
                    o.origin = Origin::External;
                }
                None if public_only => return Err(Error::Conditions("cannot generate a public key")),
                None => {
                    *m = RsaMaterial::generate(m.bits)?;
                    o.origin = Origin::Internal;
                }
            }

            return done();
        }

        let bits = t.u16(Tag::Tag2)? as usize;
        if bits == 0 || bits % 8 != 0 {
            return Err(Error::InvalidData("RSA key size"));
        }

        let obj_type = match (part, crt) {
            (KeyPart::Pair | KeyPart::Na, true) => SecObjType::RsaKeyPairCrt,
            (KeyPart::Pair | KeyPart::Na, false) => SecObjType::RsaKeyPair,
            (KeyPart::Private, true) => SecObjType::RsaPrivKeyCrt,
            (KeyPart::Private, false) => SecObjType::RsaPrivKey,
            (KeyPart::Public, _) => SecObjType::RsaPubKey,
        };

        let (material, origin) = match component {
            Some((c, v)) => {
                let mut m = RsaMaterial::default();
                m.bits = bits;
                m.set(c, v)?;
                (m, Origin::External)
            }
            None if obj_type == SecObjType::RsaPubKey => {
                return Err(Error::InvalidData("public key value required"))
            }
            None => {
                debug!("Generating {} bit RSA key 0x{:08x}", bits, id);
                (RsaMaterial::generate(bits)?, Origin::Internal)
            }
        };

        let mut o = self.new_object(cmd, t, id, obj_type, Content::Rsa(material), access)?;
        o.origin = origin;
        self.store.insert(o);

        done()
    }

    fn write_symmetric(&mut self, cmd: &Command, t: &TlvMap, p1: P1, access: Access) -> Result<Response, Error> {
        let id = t.u32(Tag::Tag1)?;

        let obj_type = match p1 {
            P1::Aes => SecObjType::AesKey,
            P1::Des => SecObjType::DesKey,
            _ => SecObjType::HmacKey,
        };

        let mut key = t.required(Tag::Tag3)?.to_vec();

        // Wrapped with a key encryption key (RFC 3394)
        if let Some(kek) = t.opt_u32(Tag::Tag2)? {
            let k = self.store.get(kek)?;
            k.check(&access, AccessRules::WRAP)?;
            key = key_unwrap(k.symmetric()?, &key)?;
        }

        match obj_type {
            _ if key.is_empty() => return Err(Error::Length),
            SecObjType::DesKey if ![8, 16, 24].contains(&key.len()) => {
                return Err(Error::InvalidData("DES key length"))
            }
            _ => (),
        }

        if self.store.contains(id) {
            let o = self.updatable(id, &[obj_type], AccessRules::WRITE, access)?;
            o.content = Content::Symmetric(key);
            o.origin = Origin::External;
            return done();
        }

        let o = self.new_object(cmd, t, id, obj_type, Content::Symmetric(key), access)?;
        self.store.insert(o);

        done()
    }

    fn write_binary(&mut self, cmd: &Command, t: &TlvMap, access: Access) -> Result<Response, Error> {
        let id = t.u32(Tag::Tag1)?;
        let offset = t.opt_u16(Tag::Tag2)?.unwrap_or(0) as usize;
        let data = t.get(Tag::Tag4).unwrap_or_default();

        if self.store.contains(id) {
            let o = self.updatable(id, &[SecObjType::BinaryFile], AccessRules::WRITE, access)?;
            let v = match &mut o.content {
                Content::Binary(v) => v,
                _ => return Err(Error::Conditions("object type mismatch")),
            };

            if offset + data.len() > v.len() {
                return Err(Error::Length);
            }
            v[offset..][..data.len()].copy_from_slice(data);
            o.origin = Origin::External;

            return done();
        }

        let file_len = t.u16(Tag::Tag3)? as usize;
        if offset + data.len() > file_len {
            return Err(Error::Length);
        }

        let mut v = vec![0u8; file_len];
        v[offset..][..data.len()].copy_from_slice(data);

        let o = self.new_object(cmd, t, id, SecObjType::BinaryFile, Content::Binary(v), access)?;
        self.store.insert(o);

        done()
    }

    fn write_user_id(&mut self, cmd: &Command, t: &TlvMap, access: Access) -> Result<Response, Error> {
        let id = t.u32(Tag::Tag1)?;
        let secret = t.required(Tag::Tag2)?;

        if secret.is_empty() || secret.len() > USER_ID_MAX_LEN {
            return Err(Error::Length);
        }

        if self.store.contains(id) {
            let o = self.updatable(id, &[SecObjType::UserId], AccessRules::WRITE, access)?;
            o.content = Content::UserId(secret.to_vec());
            return done();
        }

        let o = self.new_object(cmd, t, id, SecObjType::UserId, Content::UserId(secret.to_vec()), access)?;
        self.store.insert(o);

        done()
    }

    fn write_counter(&mut self, cmd: &Command, t: &TlvMap, access: Access) -> Result<Response, Error> {
        let id = t.u32(Tag::Tag1)?;
        let value = t.get(Tag::Tag3);

        if self.store.contains(id) {
            let o = self.updatable(id, &[SecObjType::Counter], AccessRules::WRITE, access)?;
            let (size, current) = match &mut o.content {
                Content::Counter { size, value } => (*size, value),
                _ => return Err(Error::Conditions("object type mismatch")),
            };

            let next = match value {
                Some(v) if v.len() != size => return Err(Error::Length),
                Some(v) => BigEndian::read_uint(v, size),
                None => current.checked_add(1).ok_or(Error::Conditions("counter overflow"))?,
            };

            if next < *current {
                return Err(Error::Conditions("counter values only increase"));
            }
            if next > counter_max(size) {
                return Err(Error::Conditions("counter overflow"));
            }

            *current = next;
            return done();
        }

        let size = t.u16(Tag::Tag2)? as usize;
        if !(1..=8).contains(&size) {
            return Err(Error::Length);
        }

        let initial = match value {
            Some(v) if v.len() != size => return Err(Error::Length),
            Some(v) => BigEndian::read_uint(v, size),
            None => 0,
        };

        let o = self.new_object(cmd, t, id, SecObjType::Counter, Content::Counter { size, value: initial }, access)?;
        self.store.insert(o);

        done()
    }

    fn write_pcr(&mut self, cmd: &Command, t: &TlvMap, access: Access) -> Result<Response, Error> {
        let id = t.u32(Tag::Tag1)?;
        let initial = t.get(Tag::Tag2);
        let extend = t.get(Tag::Tag3);

        if self.store.contains(id) {
            let o = self.updatable(id, &[SecObjType::Pcr], AccessRules::WRITE, access)?;
            let v = match &mut o.content {
                Content::Pcr(v) => v,
                _ => return Err(Error::Conditions("object type mismatch")),
            };

            if let Some(i) = initial {
                *v = i.to_vec();
            }
            if let Some(e) = extend {
                *v = digest(DigestMode::Sha256, &[&v[..], e].concat())?;
            }

            return done();
        }

        let mut v = initial.ok_or(Error::InvalidData("PCR initial value required"))?.to_vec();
        if v.len() != PCR_LEN {
            return Err(Error::Length);
        }
        if let Some(e) = extend {
            v = digest(DigestMode::Sha256, &[&v[..], e].concat())?;
        }

        let o = self.new_object(cmd, t, id, SecObjType::Pcr, Content::Pcr(v), access)?;
        self.store.insert(o);

        done()
    }

    /// Object data for ReadObject
    fn read_data(&self, t: &TlvMap, access: Access) -> Result<Vec<u8>, Error> {
        let id = t.u32(Tag::Tag1)?;
        let o = self.store.get(id)?;

        o.check(&access, AccessRules::READ)?;
        o.check_present()?;

        let data = match &o.content {
            Content::Ec(_) if o.obj_type == SecObjType::EcPrivKey => {
                return Err(Error::Denied("private key read"))
            }
            Content::Ec(m) => m.public.clone().ok_or(Error::Conditions("no public key"))?,

            Content::Rsa(m) => {
                let c = RsaKeyComponent::try_from(t.u8(Tag::Tag4)?)
                    .map_err(|_| Error::InvalidData("RSA component"))?;
                m.public_component(c)?.to_vec()
            }

            Content::Symmetric(_) if self.opts.deny_secret_reads => {
                return Err(Error::Denied("secret object read"))
            }
            Content::Symmetric(v) => v.clone(),

            Content::UserId(_) => return Err(Error::Denied("user id read")),

            Content::Binary(v) => {
                let offset = t.opt_u16(Tag::Tag2)?.unwrap_or(0) as usize;
                let len = match t.opt_u16(Tag::Tag3)? {
                    Some(l) => l as usize,
                    None => v.len().saturating_sub(offset),
                };
                if offset + len > v.len() {
                    return Err(Error::Length);
                }
                v[offset..][..len].to_vec()
            }

            Content::Counter { size, value } => value.to_be_bytes()[8 - size..].to_vec(),

            Content::Pcr(v) => v.clone(),
        };

        Ok(data)
    }

    /// ReadObject with attestation
    fn read_attested(&mut self, cmd: &Command, t: &TlvMap, access: Access) -> Result<Response, Error> {
        let data = self.read_data(t, access)?;

        let key_id = t.u32(Tag::Tag5)?;
        let algo = EcSignatureAlgo::try_from(t.u8(Tag::Tag6)?)
            .map_err(|_| Error::InvalidData("attestation algorithm"))?;
        let random = t.required(Tag::Tag7)?;
        if random.len() != ATTEST_RANDOM_LEN {
            return Err(Error::Length);
        }
        let mode = attestation_digest(algo)?;

        let key = self.store.get(key_id)?;
        key.check(&access, AccessRules::ATTEST)?;
        let key = key.ec()?.clone();
        if key.curve != EcCurve::NistP256 {
            return Err(Error::Unsupported("attestation key curve"));
        }

        let id = t.u32(Tag::Tag1)?;
        let o = self.store.get(id)?;
        let attributes = encoded(&o.attributes())?;
        let size = u16::try_from(o.size()).map_err(|_| Error::Length)?;

        self.attestations = self.attestations.wrapping_add(1);
        let mut timestamp = [0u8; 12];
        BigEndian::write_u32(&mut timestamp[8..], self.attestations);

        let layout = self.opts.layout;
        let mut record = AttestationRecord {
            layout,
            data,
            chip_id: self.opts.uid.to_vec(),
            attributes,
            obj_size: match layout {
                AttestationLayout::Tlv => Some(size),
                AttestationLayout::Flat => None,
            },
            timestamp: timestamp.to_vec(),
            out_random: match layout {
                AttestationLayout::Tlv => vec![],
                AttestationLayout::Flat => random.to_vec(),
            },
            cmd: match layout {
                AttestationLayout::Tlv => cmd.encode()?,
                AttestationLayout::Flat => vec![],
            },
            signature: vec![],
        };

        let m = record.signed_message()?;
        record.signature = key.sign(algo, &digest(mode, &m)?)?;

        debug!("Attested read of 0x{:08x} ({})", id, layout);

        Ok(Response::ok(record.encode()?))
    }
}
