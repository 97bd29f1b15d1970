// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Object export and import
//!
//! Exported blobs are only meaningful to the element instance that
//! produced them: `iv || AES-CBC(serialized object) || CMAC(iv || ct)`
//! under a per-instance wrapping key.

use byteorder::{BigEndian, ByteOrder};
use log::debug;
use zeroize::{Zeroize, Zeroizing};

use se05x_apdu::{
    policy::{AccessRules, PolicySet},
    types::{CipherMode, EcCurve, MacAlgo, Origin, SecObjType},
    Response, Tag, TlvMap, TlvWriter,
};

use super::{done, tlv_response, Element};
use crate::{
    crypto::{cipher::block_mode, ec::EcMaterial, mac, random, tag_matches},
    object::{Access, Content, Object},
    Error,
};

const BLOCK_LEN: usize = 16;

/// Per-instance export wrapping keys
pub(crate) struct WrapKey {
    enc: [u8; 16],
    mac: [u8; 16],
}

impl Drop for WrapKey {
    fn drop(&mut self) {
        self.enc.zeroize();
        self.mac.zeroize();
    }
}

impl WrapKey {
    pub fn random() -> Self {
        let mut k = Self {
            enc: [0u8; 16],
            mac: [0u8; 16],
        };
        k.enc.copy_from_slice(&random(16));
        k.mac.copy_from_slice(&random(16));
        k
    }

    fn seal(&self, plain: &[u8]) -> Result<Vec<u8>, Error> {
        let mut padded = Zeroizing::new(plain.to_vec());
        padded.push(0x80);
        let n = padded.len();
        padded.resize(n + (BLOCK_LEN - n % BLOCK_LEN) % BLOCK_LEN, 0);

        let iv = random(BLOCK_LEN);
        let ct = block_mode(CipherMode::AesCbcNopad, &self.enc, &iv, &padded, true)?;

        let mut blob = [iv, ct].concat();
        let tag = mac(MacAlgo::Cmac128, &self.mac, &blob)?;
        blob.extend_from_slice(&tag);

        Ok(blob)
    }

    fn open(&self, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>, Error> {
        if blob.len() < 3 * BLOCK_LEN || blob.len() % BLOCK_LEN != 0 {
            return Err(Error::Length);
        }

        let (body, tag) = blob.split_at(blob.len() - BLOCK_LEN);
        if !tag_matches(&mac(MacAlgo::Cmac128, &self.mac, body)?, tag) {
            return Err(Error::Security);
        }

        let (iv, ct) = body.split_at(BLOCK_LEN);
        let mut plain = Zeroizing::new(block_mode(CipherMode::AesCbcNopad, &self.enc, iv, ct, false)?);

        // ISO 9797 method 2 padding
        let end = plain
            .iter()
            .rposition(|b| *b != 0)
            .filter(|i| plain[*i] == 0x80)
            .ok_or(Error::InvalidData("export padding"))?;
        plain.truncate(end);

        Ok(plain)
    }
}

fn put_field(b: &mut Vec<u8>, v: &[u8]) -> Result<(), Error> {
    let len = u16::try_from(v.len()).map_err(|_| Error::Length)?;
    b.extend_from_slice(&len.to_be_bytes());
    b.extend_from_slice(v);
    Ok(())
}

fn take_field<'a>(b: &mut &'a [u8]) -> Result<&'a [u8], Error> {
    if b.len() < 2 {
        return Err(Error::InvalidData("truncated export"));
    }
    let len = usize::from(BigEndian::read_u16(b));
    if b.len() < 2 + len {
        return Err(Error::InvalidData("truncated export"));
    }
    let (v, rest) = b[2..].split_at(len);
    *b = rest;
    Ok(v)
}

/// Serialize exportable object content
fn serialize(o: &Object) -> Result<Zeroizing<Vec<u8>>, Error> {
    let mut b = Zeroizing::new(vec![u8::from(o.obj_type)]);

    match &o.content {
        Content::Ec(m) => {
            b.push(m.curve.into());
            put_field(&mut b, m.private.as_deref().unwrap_or_default())?;
            put_field(&mut b, m.public.as_deref().unwrap_or_default())?;
        }
        Content::Symmetric(k) => {
            b.push(0);
            put_field(&mut b, k)?;
            put_field(&mut b, &[])?;
        }
        _ => return Err(Error::Unsupported("export of this object type")),
    }

    put_field(&mut b, &o.policy.encode()?)?;

    Ok(b)
}

/// Rebuild an object from serialized content
fn deserialize(id: u32, mut b: &[u8]) -> Result<Object, Error> {
    if b.len() < 2 {
        return Err(Error::InvalidData("truncated export"));
    }
    let obj_type = SecObjType::try_from(b[0]).map_err(|_| Error::InvalidData("object type"))?;
    let curve = b[1];
    b = &b[2..];

    let first = take_field(&mut b)?.to_vec();
    let second = take_field(&mut b)?.to_vec();
    let policy = PolicySet::decode(take_field(&mut b)?)?;

    let non_empty = |v: Vec<u8>| (!v.is_empty()).then_some(v);

    let content = match obj_type {
        SecObjType::EcKeyPair | SecObjType::EcPrivKey | SecObjType::EcPubKey => Content::Ec(EcMaterial {
            curve: EcCurve::try_from(curve).map_err(|_| Error::InvalidData("curve id"))?,
            private: non_empty(first),
            public: non_empty(second),
        }),
        SecObjType::AesKey | SecObjType::DesKey | SecObjType::HmacKey => Content::Symmetric(first),
        _ => return Err(Error::InvalidData("object type")),
    };

    let mut o = Object::new(id, obj_type, content);
    o.policy = policy;
    o.origin = Origin::External;
    Ok(o)
}

impl Element {
    pub(super) fn export_object(&self, t: &TlvMap, access: Access) -> Result<Response, Error> {
        let id = t.u32(Tag::Tag1)?;
        let o = self.store.get(id)?;

        o.check(&access, AccessRules::IMPORT_EXPORT)?;
        o.check_present()?;

        let blob = self.wrap_key.seal(&serialize(o)?)?;

        debug!("Exported 0x{:08x} ({} byte blob)", id, blob.len());

        tlv_response(TlvWriter::new().bytes(Tag::Tag1, &blob))
    }

    pub(super) fn import_object(&mut self, t: &TlvMap, access: Access) -> Result<Response, Error> {
        let id = t.u32(Tag::Tag1)?;
        let plain = self.wrap_key.open(t.required(Tag::Tag3)?)?;
        let mut imported = deserialize(id, &plain)?;

        if let Ok(existing) = self.store.get(id) {
            if existing.obj_type != imported.obj_type {
                return Err(Error::Conditions("object type mismatch"));
            }
            existing.check(&access, AccessRules::WRITE)?;

            // Keep the identity and lifetime of the existing object
            imported.transient = existing.transient;
            imported.auth = existing.auth;
            imported.auth_attempts = existing.auth_attempts;
        }

        debug!("Imported 0x{:08x} ({})", id, imported.obj_type);

        self.store.insert(imported);
        done()
    }
}

#[cfg(test)]
mod test {
    use se05x_apdu::{
        types::{Instruction, Status, P1, P2},
        Command,
    };

    use super::*;
    use crate::element::test::{call, element};

    fn export(id: u32) -> Command {
        Command::new(Instruction::Read.into(), P1::Default.into(), P2::Export.into())
            .with_tlv(TlvWriter::new().u32(Tag::Tag1, id).u8(Tag::Tag2, 0))
            .unwrap()
            .expect_response()
    }

    fn import(id: u32, blob: &[u8]) -> Command {
        Command::new(Instruction::Write.into(), P1::Default.into(), P2::Import.into())
            .with_tlv(TlvWriter::new().u32(Tag::Tag1, id).u8(Tag::Tag2, 0).bytes(Tag::Tag3, blob))
            .unwrap()
    }

    #[test]
    fn wrap_key_rejects_tampering() {
        let k = WrapKey::random();
        let blob = k.seal(b"0123456789abcdef").unwrap();
        assert_eq!(blob.len(), 4 * BLOCK_LEN);
        assert_eq!(&k.open(&blob).unwrap()[..], b"0123456789abcdef");

        let mut bad = blob.clone();
        bad[20] ^= 0x01;
        assert!(matches!(k.open(&bad), Err(Error::Security)));

        // Blobs are bound to the instance
        assert!(matches!(WrapKey::random().open(&blob), Err(Error::Security)));
    }

    #[test]
    fn export_import_ec_key() {
        let mut e = element();

        let mut o = Object::new(
            0x700,
            SecObjType::EcKeyPair,
            Content::Ec(EcMaterial::generate(EcCurve::NistP256).unwrap()),
        );
        o.policy = PolicySet::single(0, AccessRules::IMPORT_EXPORT | AccessRules::SIGN | AccessRules::WRITE);
        let public = o.ec().unwrap().public.clone();
        e.provision(o);

        let r = call(&mut e, &export(0x700));
        assert!(r.is_ok());
        let blob = r.tlv().unwrap().required(Tag::Tag1).unwrap().to_vec();

        assert!(call(&mut e, &import(0x701, &blob)).is_ok());

        let imported = e.object(0x701).unwrap();
        assert_eq!(imported.obj_type, SecObjType::EcKeyPair);
        assert_eq!(imported.ec().unwrap().public, public);
        assert!(imported.policy.rules_for(0).unwrap().contains(AccessRules::SIGN));

        // Corrupted blobs fail authentication
        let mut bad = blob;
        bad[0] ^= 0xFF;
        assert_eq!(call(&mut e, &import(0x702, &bad)).sw, u16::from(Status::SecurityStatus));
        assert!(e.object(0x702).is_none());
    }

    #[test]
    fn export_requires_policy() {
        let mut e = element();

        let mut o = Object::new(0x710, SecObjType::AesKey, Content::Symmetric(vec![0x42; 16]));
        o.policy = PolicySet::single(0, AccessRules::ENC);
        e.provision(o);

        assert_eq!(call(&mut e, &export(0x710)).sw, u16::from(Status::CommandNotAllowed));

        // Binary files are not exportable
        let mut o = Object::new(0x711, SecObjType::BinaryFile, Content::Binary(vec![1, 2, 3]));
        o.policy = PolicySet::single(0, AccessRules::IMPORT_EXPORT);
        e.provision(o);

        assert_eq!(call(&mut e, &export(0x711)).sw, u16::from(Status::DataInvalid));
    }
}
