// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Secure object storage

use std::collections::BTreeMap;

use log::debug;
use zeroize::Zeroize;

use se05x_apdu::{
    attributes::ObjectAttributes,
    policy::{AccessRules, PolicySet},
    types::{EcCurve, Origin, SecObjType, SetIndicator, CURVE_LIST_LEN},
};

use crate::{
    crypto::{ec::EcMaterial, rsa::RsaMaterial},
    Error,
};

/// Object content, by object class
#[derive(Clone, Debug)]
pub enum Content {
    Ec(EcMaterial),
    Rsa(RsaMaterial),
    /// AES, DES and HMAC keys
    Symmetric(Vec<u8>),
    Binary(Vec<u8>),
    UserId(Vec<u8>),
    Counter { size: usize, value: u64 },
    Pcr(Vec<u8>),
}

impl Content {
    /// Clear volatile content
    fn clear(&mut self) {
        match self {
            Content::Ec(m) => {
                m.private = None;
                m.public = None;
            }
            Content::Rsa(m) => *m = RsaMaterial {
                bits: m.bits,
                n: None,
                e: None,
                d: None,
                p: None,
                q: None,
                dp: None,
                dq: None,
                qinv: None,
            },
            Content::Symmetric(v) | Content::UserId(v) => v.zeroize(),
            Content::Binary(v) | Content::Pcr(v) => v.iter_mut().for_each(|b| *b = 0),
            Content::Counter { value, .. } => *value = 0,
        }
    }
}

/// Caller context for access checks
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Access {
    /// Session authentication object (`0` for the default session)
    pub auth_id: u32,
    /// Command arrived under secure messaging
    pub secure: bool,
}

/// A secure object
#[derive(Clone, Debug)]
pub struct Object {
    pub id: u32,
    pub obj_type: SecObjType,
    pub transient: bool,
    /// Authentication object
    pub auth: bool,
    pub auth_attempts: u16,
    pub max_attempts: u16,
    /// Authentication object of the creating session
    pub creator: u32,
    pub policy: PolicySet,
    pub origin: Origin,
    pub content: Content,
}

/// Byte length of keys on the provided curve
pub fn curve_len(curve: EcCurve) -> usize {
    use EcCurve::*;
    match curve {
        Brainpool160 | Secp160k1 => 20,
        NistP192 | Brainpool192 | Secp192k1 => 24,
        NistP224 | Brainpool224 | Secp224k1 => 28,
        NistP256 | Brainpool256 | Secp256k1 | BnP256 | Ed25519 | MontDh25519 => 32,
        Brainpool320 => 40,
        NistP384 | Brainpool384 => 48,
        MontDh448 => 56,
        Brainpool512 => 64,
        NistP521 => 66,
    }
}

impl Object {
    pub fn new(id: u32, obj_type: SecObjType, content: Content) -> Self {
        Self {
            id,
            obj_type,
            transient: false,
            auth: false,
            auth_attempts: 0,
            max_attempts: 0,
            creator: 0,
            policy: PolicySet::default(),
            origin: Origin::External,
            content,
        }
    }

    /// Encoded attribute view
    pub fn attributes(&self) -> ObjectAttributes {
        ObjectAttributes {
            id: self.id,
            obj_type: self.obj_type,
            auth: self.auth,
            auth_attempts: self.auth_attempts,
            auth_id: self.creator,
            max_attempts: self.max_attempts,
            policy: self.policy.clone(),
            origin: self.origin,
        }
    }

    /// Object size in bytes
    pub fn size(&self) -> usize {
        match &self.content {
            Content::Ec(m) => curve_len(m.curve),
            Content::Rsa(m) => m.modulus_len(),
            Content::Symmetric(v) | Content::Binary(v) | Content::UserId(v) | Content::Pcr(v) => {
                v.len()
            }
            Content::Counter { size, .. } => *size,
        }
    }

    /// Authentication attempts exhausted
    pub fn is_locked(&self) -> bool {
        self.max_attempts > 0 && self.auth_attempts >= self.max_attempts
    }

    /// Check the object policy permits `rule` for the caller
    pub fn check(&self, access: &Access, rule: AccessRules) -> Result<(), Error> {
        let rules = match self.policy.rules_for(access.auth_id) {
            Some(r) => r,
            None => return Ok(()),
        };

        if rules.contains(AccessRules::FORBID_ALL) {
            debug!("0x{:08x}: all access forbidden", self.id);
            return Err(Error::Denied("forbidden by policy"));
        }
        if rules.contains(AccessRules::REQUIRE_SM) && !access.secure {
            debug!("0x{:08x}: secure messaging required", self.id);
            return Err(Error::Security);
        }
        if !rules.contains(rule) {
            debug!("0x{:08x}: {:?} not permitted for 0x{:08x}", self.id, rule, access.auth_id);
            return Err(Error::Denied("not permitted by policy"));
        }

        Ok(())
    }

    /// Check the object holds content (transient objects lose it on reset)
    pub fn check_present(&self) -> Result<(), Error> {
        match self.origin {
            Origin::Na => Err(Error::Conditions("transient object content lost")),
            _ => Ok(()),
        }
    }

    /// Symmetric key bytes
    pub fn symmetric(&self) -> Result<&[u8], Error> {
        self.check_present()?;
        match &self.content {
            Content::Symmetric(k) => Ok(k),
            _ => Err(Error::InvalidData("not a symmetric key")),
        }
    }

    /// EC key material
    pub fn ec(&self) -> Result<&EcMaterial, Error> {
        self.check_present()?;
        match &self.content {
            Content::Ec(m) => Ok(m),
            _ => Err(Error::InvalidData("not an EC key")),
        }
    }

    /// RSA key material
    pub fn rsa(&self) -> Result<&RsaMaterial, Error> {
        self.check_present()?;
        match &self.content {
            Content::Rsa(m) => Ok(m),
            _ => Err(Error::InvalidData("not an RSA key")),
        }
    }

    fn reserved(&self) -> bool {
        (self.id & 0xFFFF_0000) == 0x7FFF_0000 || self.id >= 0xF000_0000
    }
}

/// Element object store, curve table and memory accounting
#[derive(Debug)]
pub struct ObjectStore {
    objects: BTreeMap<u32, Object>,
    curves: [bool; CURVE_LIST_LEN],
}

/// Persistent memory pool size
const PERSISTENT_MEMORY: usize = 32_767;

/// Transient memory pool size
const TRANSIENT_MEMORY: usize = 4_096;

impl Default for ObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore {
    pub fn new() -> Self {
        Self {
            objects: BTreeMap::new(),
            curves: [false; CURVE_LIST_LEN],
        }
    }

    pub fn contains(&self, id: u32) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn get(&self, id: u32) -> Result<&Object, Error> {
        self.objects.get(&id).ok_or(Error::NotFound(id))
    }

    pub fn get_mut(&mut self, id: u32) -> Result<&mut Object, Error> {
        self.objects.get_mut(&id).ok_or(Error::NotFound(id))
    }

    pub fn insert(&mut self, o: Object) {
        debug!("Storing object 0x{:08x} ({:?})", o.id, o.obj_type);
        self.objects.insert(o.id, o);
    }

    pub fn remove(&mut self, id: u32) -> Result<Object, Error> {
        self.objects.remove(&id).ok_or(Error::NotFound(id))
    }

    /// Object identifiers, optionally filtered by type
    pub fn ids(&self, filter: Option<SecObjType>) -> Vec<u32> {
        self.objects
            .values()
            .filter(|o| filter.map(|f| f == o.obj_type).unwrap_or(true))
            .map(|o| o.id)
            .collect()
    }

    /// Clear transient object content (applet deselect / reset)
    pub fn reset_transient(&mut self) {
        for o in self.objects.values_mut().filter(|o| o.transient) {
            o.content.clear();
            o.origin = Origin::Na;
        }
    }

    /// Remove every non-reserved object and all curves
    pub fn delete_all(&mut self) {
        self.objects.retain(|_, o| o.reserved());
        self.curves = [false; CURVE_LIST_LEN];
    }

    fn curve_index(curve: EcCurve) -> Option<usize> {
        let i = u8::from(curve) as usize;
        match (1..=CURVE_LIST_LEN).contains(&i) {
            true => Some(i - 1),
            false => None,
        }
    }

    /// Check a curve is usable (reserved curves always are)
    pub fn curve_available(&self, curve: EcCurve) -> bool {
        match Self::curve_index(curve) {
            Some(i) => self.curves[i],
            None => curve.is_reserved(),
        }
    }

    pub fn create_curve(&mut self, curve: EcCurve) -> Result<(), Error> {
        let i = Self::curve_index(curve).ok_or(Error::InvalidData("curve id"))?;
        if self.curves[i] {
            return Err(Error::Conditions("curve exists"));
        }
        self.curves[i] = true;
        Ok(())
    }

    pub fn delete_curve(&mut self, curve: EcCurve) -> Result<(), Error> {
        let i = Self::curve_index(curve).ok_or(Error::InvalidData("curve id"))?;
        if !self.curves[i] {
            return Err(Error::NotFound(u8::from(curve) as u32));
        }
        if self
            .objects
            .values()
            .any(|o| matches!(&o.content, Content::Ec(m) if m.curve == curve))
        {
            return Err(Error::Conditions("curve in use"));
        }
        self.curves[i] = false;
        Ok(())
    }

    /// Curve list indicators
    pub fn curve_list(&self) -> Vec<u8> {
        self.curves
            .iter()
            .map(|set| match set {
                true => SetIndicator::Set.into(),
                false => SetIndicator::NotSet.into(),
            })
            .collect()
    }

    /// Free bytes in the persistent or transient pool
    pub fn free_memory(&self, transient: bool) -> u16 {
        let pool = match transient {
            true => TRANSIENT_MEMORY,
            false => PERSISTENT_MEMORY,
        };
        let used: usize = self
            .objects
            .values()
            .filter(|o| o.transient == transient)
            .map(|o| o.size())
            .sum();

        pool.saturating_sub(used).min(u16::MAX as usize) as u16
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn binary(id: u32, len: usize) -> Object {
        Object::new(id, SecObjType::BinaryFile, Content::Binary(vec![0xAA; len]))
    }

    #[test]
    fn policy_checks() {
        let mut o = binary(0x100, 4);
        let default = Access {
            auth_id: 0,
            secure: false,
        };

        // Empty policy is unrestricted
        assert!(o.check(&default, AccessRules::READ).is_ok());

        o.policy = PolicySet::single(0, AccessRules::READ);
        assert!(o.check(&default, AccessRules::READ).is_ok());
        assert!(matches!(o.check(&default, AccessRules::WRITE), Err(Error::Denied(_))));

        o.policy = PolicySet::single(0, AccessRules::READ | AccessRules::REQUIRE_SM);
        assert!(matches!(o.check(&default, AccessRules::READ), Err(Error::Security)));
        assert!(o
            .check(&Access { auth_id: 0, secure: true }, AccessRules::READ)
            .is_ok());

        o.policy = PolicySet::single(0, AccessRules::FORBID_ALL | AccessRules::READ);
        assert!(o.check(&default, AccessRules::READ).is_err());

        // Policy for another authentication object does not apply
        o.policy = PolicySet::single(0x10, AccessRules::READ);
        assert!(o.check(&default, AccessRules::WRITE).is_ok());
    }

    #[test]
    fn transient_reset() {
        let mut s = ObjectStore::new();

        let mut t = binary(0x200, 4);
        t.transient = true;
        s.insert(t);
        s.insert(binary(0x201, 4));

        s.reset_transient();

        let t = s.get(0x200).unwrap();
        assert_eq!(t.origin, Origin::Na);
        assert!(matches!(&t.content, Content::Binary(v) if v == &vec![0u8; 4]));
        assert_eq!(s.get(0x201).unwrap().origin, Origin::External);
    }

    #[test]
    fn delete_all_keeps_reserved() {
        let mut s = ObjectStore::new();
        s.insert(binary(0x7FFF_0206, 18));
        s.insert(binary(0xF000_0012, 4));
        s.insert(binary(0x1234, 4));
        s.create_curve(EcCurve::NistP256).unwrap();

        s.delete_all();

        assert_eq!(s.ids(None), vec![0x7FFF_0206, 0xF000_0012]);
        assert!(!s.curve_available(EcCurve::NistP256));
        assert!(s.curve_available(EcCurve::Ed25519));
    }

    #[test]
    fn curves() {
        let mut s = ObjectStore::new();

        s.create_curve(EcCurve::NistP256).unwrap();
        assert!(matches!(s.create_curve(EcCurve::NistP256), Err(Error::Conditions(_))));
        assert!(s.create_curve(EcCurve::Ed25519).is_err());

        let l = s.curve_list();
        assert_eq!(l.len(), CURVE_LIST_LEN);
        assert_eq!(l[2], u8::from(SetIndicator::Set));
        assert_eq!(l[0], u8::from(SetIndicator::NotSet));

        s.delete_curve(EcCurve::NistP256).unwrap();
        assert!(s.delete_curve(EcCurve::NistP256).is_err());
    }

    #[test]
    fn memory_accounting() {
        let mut s = ObjectStore::new();
        let before = s.free_memory(false);

        s.insert(binary(0x300, 100));
        assert_eq!(s.free_memory(false), before - 100);
        assert_eq!(s.free_memory(true), TRANSIENT_MEMORY as u16);
    }
}
