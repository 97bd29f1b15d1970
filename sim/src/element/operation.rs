// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Cryptographic operations and the crypto objects holding multi-step state

use log::debug;
use zeroize::Zeroizing;

use se05x_apdu::{
    policy::AccessRules,
    types::{
        CipherMode, CryptoContext, DigestMode, EcSignatureAlgo, MacAlgo, Origin, RsaEncryptionAlgo, RsaSignatureAlgo,
        SecObjType, P1, P2,
    },
    Command, Response, Tag, TlvMap, TlvWriter,
};

use super::{done, se_result, tlv_response, Element};
use crate::{
    crypto::{
        cipher::{self, AeadKind},
        digest, hkdf, mac, random, tag_matches,
    },
    object::{Access, Content, Object},
    Error,
};

/// Operation state held by a crypto object between steps
enum Operation {
    Digest {
        mode: DigestMode,
        data: Vec<u8>,
    },
    Cipher {
        mode: CipherMode,
        key: Zeroizing<Vec<u8>>,
        encrypt: bool,
        /// CBC chaining value or CTR initial counter block
        iv: Vec<u8>,
        /// Bytes processed so far
        offset: u64,
    },
    Mac {
        algo: MacAlgo,
        key: Zeroizing<Vec<u8>>,
        validate: bool,
        data: Vec<u8>,
    },
    Aead(AeadState),
}

struct AeadState {
    kind: AeadKind,
    key: Zeroizing<Vec<u8>>,
    encrypt: bool,
    iv: Vec<u8>,
    tag_len: usize,
    aad: Vec<u8>,
    /// Plaintext when encrypting, ciphertext when decrypting
    payload: Vec<u8>,
    /// Declared CCM AAD and payload lengths
    lengths: Option<(usize, usize)>,
}

/// Crypto object: a typed context slot for multi-step operations
pub(crate) struct CryptoObject {
    context: CryptoContext,
    subtype: u8,
    op: Option<Operation>,
}

impl CryptoObject {
    fn new(context: CryptoContext, subtype: u8) -> Self {
        Self {
            context,
            subtype,
            op: None,
        }
    }

    /// Abandon any operation in progress
    pub fn reset(&mut self) {
        self.op = None;
    }
}

/// Check a crypto object subtype is valid for its context
fn subtype_valid(context: CryptoContext, subtype: u8) -> bool {
    match context {
        CryptoContext::Digest => DigestMode::try_from(subtype).map_or(false, |m| m != DigestMode::NoHash),
        CryptoContext::Cipher => CipherMode::try_from(subtype).map_or(false, |m| !m.is_aead()),
        CryptoContext::Aead => CipherMode::try_from(subtype).map_or(false, |m| m.is_aead()),
        CryptoContext::Signature => MacAlgo::try_from(subtype).is_ok(),
    }
}

fn cipher_mode(v: u8) -> Result<CipherMode, Error> {
    CipherMode::try_from(v).map_err(|_| Error::InvalidData("cipher mode"))
}

fn digest_mode(v: u8) -> Result<DigestMode, Error> {
    DigestMode::try_from(v).map_err(|_| Error::InvalidData("digest mode"))
}

fn mac_algo(v: u8) -> Result<MacAlgo, Error> {
    MacAlgo::try_from(v).map_err(|_| Error::InvalidData("MAC algorithm"))
}

fn direction_rule(encrypt: bool) -> AccessRules {
    match encrypt {
        true => AccessRules::ENC,
        false => AccessRules::DEC,
    }
}

fn ctr_mode(mode: CipherMode) -> bool {
    matches!(mode, CipherMode::AesCtr | CipherMode::AesCtrIntIv)
}

/// Key object types usable with a MAC algorithm
fn mac_key_types(algo: MacAlgo) -> &'static [SecObjType] {
    match algo {
        MacAlgo::Cmac128 => &[SecObjType::AesKey],
        MacAlgo::DesCmac8 => &[SecObjType::DesKey],
        _ => &[SecObjType::HmacKey, SecObjType::AesKey],
    }
}

/// Secret bytes of a key derivation input
fn secret(o: &Object) -> Result<Zeroizing<Vec<u8>>, Error> {
    o.check_present()?;
    match &o.content {
        Content::Symmetric(v) | Content::Binary(v) => Ok(Zeroizing::new(v.clone())),
        _ => Err(Error::InvalidData("not a secret object")),
    }
}

/// Reject derivations that would return output to the host when the
/// key policy keeps derived material on the element
fn check_derived_output(o: &Object, access: &Access, dest: Option<u32>) -> Result<(), Error> {
    let forbidden = o
        .policy
        .rules_for(access.auth_id)
        .map_or(false, |r| r.contains(AccessRules::FORBID_DERIVED_OUTPUT));

    match (forbidden, dest) {
        (true, None) => Err(Error::Denied("derived output must stay on the element")),
        _ => Ok(()),
    }
}

/// IV for a cipher operation, returning the generated IV for internal-IV modes
fn cipher_iv(mode: CipherMode, encrypt: bool, supplied: Option<&[u8]>) -> Result<(Vec<u8>, Option<Vec<u8>>), Error> {
    if mode.is_ecb() {
        return Ok((vec![], None));
    }

    if mode.is_internal_iv() {
        if !encrypt {
            return Err(Error::Conditions("decryption with an element generated IV"));
        }
        let iv = random(16);
        return Ok((iv.clone(), Some(iv)));
    }

    let iv = supplied.ok_or(Error::InvalidData("IV required"))?;
    let expected = match ctr_mode(mode) {
        true => 16,
        false => mode.block_len(),
    };
    if iv.len() != expected {
        return Err(Error::Length);
    }

    Ok((iv.to_vec(), None))
}

/// Nonce for an AEAD operation, generated on encryption in internal-IV modes
fn aead_iv(
    kind: AeadKind,
    mode: CipherMode,
    encrypt: bool,
    supplied: Option<&[u8]>,
) -> Result<(Vec<u8>, Option<Vec<u8>>), Error> {
    match (supplied, mode.is_internal_iv() && encrypt) {
        (_, true) => {
            let iv = random(kind.iv_len());
            Ok((iv.clone(), Some(iv)))
        }
        (Some(iv), false) if iv.len() == kind.iv_len() => Ok((iv.to_vec(), None)),
        (Some(_), false) => Err(Error::InvalidData("AEAD nonce length")),
        (None, false) => Err(Error::InvalidData("AEAD nonce required")),
    }
}

/// Apply a block or stream cipher mode to `data`
fn cipher_apply(
    mode: CipherMode,
    key: &[u8],
    iv: &[u8],
    offset: u64,
    data: &[u8],
    encrypt: bool,
) -> Result<Vec<u8>, Error> {
    match ctr_mode(mode) {
        true => cipher::aes_ctr(key, iv, offset, data),
        false => cipher::block_mode(mode, key, iv, data, encrypt),
    }
}

impl Element {
    pub(super) fn crypto(&mut self, cmd: &Command, p1: P1, p2: P2, access: Access) -> Result<Response, Error> {
        let t = cmd.tlv()?;

        match (p1, p2) {
            // ECDSASign / EdDSASign / RSASign
            (P1::Signature, P2::Sign) => self.sign(&t, access),
            // ECDSAVerify / EdDSAVerify / RSAVerify
            (P1::Signature, P2::Verify) => self.verify(&t, access),
            // ECDAASign
            (P1::Signature, P2::SignEcdaa) => self.sign_ecdaa(&t, access),

            // RSAEncrypt / RSADecrypt
            (P1::Rsa, P2::EncryptOneshot | P2::DecryptOneshot) => {
                self.rsa_crypt(&t, p2 == P2::EncryptOneshot, access)
            }

            // CipherOneShot
            (P1::Cipher, P2::EncryptOneshot | P2::DecryptOneshot) => {
                self.cipher_one_shot(&t, p2 == P2::EncryptOneshot, access)
            }
            // CipherInit
            (P1::Cipher, P2::Encrypt | P2::Decrypt) => self.cipher_init(&t, p2 == P2::Encrypt, access),
            // CipherUpdate / CipherFinal
            (P1::Cipher, P2::Update | P2::Final) => self.cipher_step(&t, p2 == P2::Final),

            // MACOneShot
            (P1::Mac, P2::GenerateOneshot | P2::ValidateOneshot) => {
                self.mac_one_shot(&t, p2 == P2::ValidateOneshot, access)
            }
            // MACInit
            (P1::Mac, P2::Generate | P2::Validate) => self.mac_init(&t, p2 == P2::Validate, access),
            // MACUpdate / MACFinal
            (P1::Mac, P2::Update | P2::Final) => self.mac_step(&t, p2 == P2::Final),

            // DigestOneShot
            (P1::Default, P2::Oneshot) => {
                let mode = digest_mode(t.u8(Tag::Tag1)?)?;
                tlv_response(TlvWriter::new().bytes(Tag::Tag1, &digest(mode, t.required(Tag::Tag2)?)?))
            }
            // DigestInit
            (P1::Default, P2::Init) => self.digest_init(&t),
            // DigestUpdate / DigestFinal
            (P1::Default, P2::Update | P2::Final) => self.digest_step(&t, p2 == P2::Final),

            // HKDF
            (P1::Default, P2::Hkdf | P2::HkdfExpandOnly) => self.hkdf(&t, p2 == P2::HkdfExpandOnly, access),

            // AEADOneShot
            (P1::Aead, P2::EncryptOneshot | P2::DecryptOneshot) => {
                self.aead_one_shot(&t, p2 == P2::EncryptOneshot, access)
            }
            // AEADInit
            (P1::Aead, P2::Encrypt | P2::Decrypt) => self.aead_init(&t, p2 == P2::Encrypt, access),
            // AEADUpdate (AAD or payload)
            (P1::Aead, P2::Update) => self.aead_update(&t),
            // AEADFinal
            (P1::Aead, P2::Final) => self.aead_final(&t),

            // ECDHGenerateSharedSecret
            (P1::Ec, P2::Dh | P2::DhReverse) => self.ecdh(&t, p2 == P2::DhReverse, access),

            _ => Err(Error::Unsupported("crypto command")),
        }
    }

    pub(super) fn create_crypto_object(&mut self, t: &TlvMap) -> Result<Response, Error> {
        let id = t.u16(Tag::Tag1)?;
        let context = CryptoContext::try_from(t.u8(Tag::Tag2)?).map_err(|_| Error::InvalidData("crypto context"))?;
        let subtype = t.u8(Tag::Tag3)?;

        if !subtype_valid(context, subtype) {
            return Err(Error::InvalidData("crypto object subtype"));
        }
        if self.crypto_objects.contains_key(&id) {
            return Err(Error::Conditions("crypto object exists"));
        }

        debug!("Create crypto object 0x{:04x} ({}, 0x{:02x})", id, context, subtype);

        self.crypto_objects.insert(id, CryptoObject::new(context, subtype));
        done()
    }

    pub(super) fn read_crypto_objects(&self) -> Result<Response, Error> {
        let mut list = Vec::with_capacity(self.crypto_objects.len() * 4);
        for (id, o) in &self.crypto_objects {
            list.extend_from_slice(&id.to_be_bytes());
            list.push(o.context.into());
            list.push(o.subtype);
        }
        tlv_response(TlvWriter::new().bytes(Tag::Tag1, &list))
    }

    /// Crypto object referenced by Tag2, with its context checked
    fn crypto_object(&mut self, t: &TlvMap, context: CryptoContext) -> Result<&mut CryptoObject, Error> {
        let id = t.u16(Tag::Tag2)?;
        let o = self
            .crypto_objects
            .get_mut(&id)
            .ok_or(Error::NotFound(u32::from(id)))?;

        match o.context == context {
            true => Ok(o),
            false => Err(Error::Conditions("crypto object context mismatch")),
        }
    }

    /// Symmetric key bytes, checking the key type and policy
    fn symmetric_key(
        &self,
        id: u32,
        types: &[SecObjType],
        rule: AccessRules,
        access: &Access,
    ) -> Result<Zeroizing<Vec<u8>>, Error> {
        let o = self.store.get(id)?;
        if !types.contains(&o.obj_type) {
            return Err(Error::InvalidData("key type"));
        }
        o.check(access, rule)?;
        Ok(Zeroizing::new(o.symmetric()?.to_vec()))
    }

    fn cipher_key(&self, id: u32, mode: CipherMode, encrypt: bool, access: &Access) -> Result<Zeroizing<Vec<u8>>, Error> {
        let types: &[SecObjType] = match mode.is_des() {
            true => &[SecObjType::DesKey],
            false => &[SecObjType::AesKey],
        };
        self.symmetric_key(id, types, direction_rule(encrypt), access)
    }

    fn sign(&mut self, t: &TlvMap, access: Access) -> Result<Response, Error> {
        let o = self.store.get(t.u32(Tag::Tag1)?)?;
        o.check(&access, AccessRules::SIGN)?;

        let algo = t.u8(Tag::Tag2)?;
        let data = t.required(Tag::Tag3)?;

        let sig = match &o.content {
            Content::Ec(_) => {
                let algo = EcSignatureAlgo::try_from(algo).map_err(|_| Error::InvalidData("signature algorithm"))?;
                if algo == EcSignatureAlgo::Ecdaa {
                    return Err(Error::InvalidData("ECDAA requires a random key"));
                }
                o.ec()?.sign(algo, data)?
            }
            Content::Rsa(_) => {
                let algo = RsaSignatureAlgo::try_from(algo).map_err(|_| Error::InvalidData("signature algorithm"))?;
                o.rsa()?.sign(algo, data)?
            }
            _ => return Err(Error::InvalidData("not a signing key")),
        };

        tlv_response(TlvWriter::new().bytes(Tag::Tag1, &sig))
    }

    fn verify(&mut self, t: &TlvMap, access: Access) -> Result<Response, Error> {
        let o = self.store.get(t.u32(Tag::Tag1)?)?;
        o.check(&access, AccessRules::VERIFY)?;

        let algo = t.u8(Tag::Tag2)?;
        let data = t.required(Tag::Tag3)?;
        let sig = t.required(Tag::Tag5)?;

        let ok = match &o.content {
            Content::Ec(_) => {
                let algo = EcSignatureAlgo::try_from(algo).map_err(|_| Error::InvalidData("signature algorithm"))?;
                o.ec()?.verify(algo, data, sig)?
            }
            Content::Rsa(_) => {
                let algo = RsaSignatureAlgo::try_from(algo).map_err(|_| Error::InvalidData("signature algorithm"))?;
                o.rsa()?.verify(algo, data, sig)?
            }
            _ => return Err(Error::InvalidData("not a verification key")),
        };

        tlv_response(TlvWriter::new().u8(Tag::Tag1, se_result(ok)))
    }

    fn sign_ecdaa(&mut self, t: &TlvMap, access: Access) -> Result<Response, Error> {
        if t.u8(Tag::Tag2)? != u8::from(EcSignatureAlgo::Ecdaa) {
            return Err(Error::InvalidData("signature algorithm"));
        }

        let random_id = t.u32(Tag::Tag4)?;
        let data = t.required(Tag::Tag3)?;

        let sig = {
            let key = self.store.get(t.u32(Tag::Tag1)?)?;
            key.check(&access, AccessRules::SIGN)?;

            let r = self.store.get(random_id)?;
            if r.obj_type != SecObjType::EcPrivKey {
                return Err(Error::InvalidData("ECDAA random key type"));
            }

            key.ec()?.ecdaa_sign(r.ec()?, data)?
        };

        // Random keys are single use
        let r = self.store.get_mut(random_id)?;
        if let Content::Ec(m) = &mut r.content {
            m.private = None;
            m.public = None;
        }
        r.origin = Origin::Na;

        tlv_response(TlvWriter::new().bytes(Tag::Tag1, &sig))
    }

    fn rsa_crypt(&mut self, t: &TlvMap, encrypt: bool, access: Access) -> Result<Response, Error> {
        let o = self.store.get(t.u32(Tag::Tag1)?)?;
        o.check(&access, direction_rule(encrypt))?;

        let algo = RsaEncryptionAlgo::try_from(t.u8(Tag::Tag2)?).map_err(|_| Error::InvalidData("RSA algorithm"))?;
        let data = t.required(Tag::Tag3)?;

        let out = match encrypt {
            true => o.rsa()?.encrypt(algo, data)?,
            false => o.rsa()?.decrypt(algo, data)?,
        };

        tlv_response(TlvWriter::new().bytes(Tag::Tag1, &out))
    }

    fn cipher_one_shot(&mut self, t: &TlvMap, encrypt: bool, access: Access) -> Result<Response, Error> {
        let mode = cipher_mode(t.u8(Tag::Tag2)?)?;
        if mode.is_aead() {
            return Err(Error::InvalidData("AEAD mode in cipher command"));
        }

        let key = self.cipher_key(t.u32(Tag::Tag1)?, mode, encrypt, &access)?;
        let (iv, generated) = cipher_iv(mode, encrypt, t.get(Tag::Tag4))?;

        let data = match encrypt {
            true => cipher::iso9797_pad(mode, t.required(Tag::Tag3)?),
            false => t.required(Tag::Tag3)?.to_vec(),
        };

        let out = cipher_apply(mode, &key, &iv, 0, &data, encrypt)?;

        tlv_response(
            TlvWriter::new()
                .bytes(Tag::Tag1, &out)
                .opt_bytes(Tag::Tag4, generated.as_deref()),
        )
    }

    fn cipher_init(&mut self, t: &TlvMap, encrypt: bool, access: Access) -> Result<Response, Error> {
        let mode = cipher_mode(self.crypto_object(t, CryptoContext::Cipher)?.subtype)?;

        let key = self.cipher_key(t.u32(Tag::Tag1)?, mode, encrypt, &access)?;
        let (iv, generated) = cipher_iv(mode, encrypt, t.get(Tag::Tag4))?;

        self.crypto_object(t, CryptoContext::Cipher)?.op = Some(Operation::Cipher {
            mode,
            key,
            encrypt,
            iv,
            offset: 0,
        });

        tlv_response(TlvWriter::new().opt_bytes(Tag::Tag4, generated.as_deref()))
    }

    fn cipher_step(&mut self, t: &TlvMap, last: bool) -> Result<Response, Error> {
        let data = t.required(Tag::Tag3)?;
        let obj = self.crypto_object(t, CryptoContext::Cipher)?;

        let out = match &mut obj.op {
            Some(Operation::Cipher {
                mode,
                key,
                encrypt,
                iv,
                offset,
            }) => {
                let mode = *mode;

                // ISO 9797 M1 adds no block after aligned data, except for empty input
                let input = match (last && *encrypt, mode) {
                    (true, CipherMode::DesCbcIso9797M1) if data.is_empty() && *offset > 0 => vec![],
                    (true, CipherMode::DesCbcIso9797M1 | CipherMode::DesCbcIso9797M2) => {
                        cipher::iso9797_pad(mode, data)
                    }
                    _ => data.to_vec(),
                };

                let out = cipher_apply(mode, key, iv, *offset, &input, *encrypt)?;

                if !ctr_mode(mode) && !mode.is_ecb() {
                    if let Some(next) = cipher::cbc_next_iv(mode, *encrypt, &input, &out) {
                        *iv = next;
                    }
                }
                *offset += input.len() as u64;

                out
            }
            _ => return Err(Error::Conditions("no cipher operation in progress")),
        };

        if last {
            obj.op = None;
        }

        tlv_response(TlvWriter::new().non_empty(Tag::Tag1, &out))
    }

    fn mac_one_shot(&mut self, t: &TlvMap, validate: bool, access: Access) -> Result<Response, Error> {
        let algo = mac_algo(t.u8(Tag::Tag2)?)?;
        let rule = match validate {
            true => AccessRules::VERIFY,
            false => AccessRules::SIGN,
        };
        let key = self.symmetric_key(t.u32(Tag::Tag1)?, mac_key_types(algo), rule, &access)?;

        let m = mac(algo, &key, t.required(Tag::Tag3)?)?;

        match validate {
            true => {
                let ok = tag_matches(&m, t.required(Tag::Tag5)?);
                tlv_response(TlvWriter::new().u8(Tag::Tag1, se_result(ok)))
            }
            false => tlv_response(TlvWriter::new().bytes(Tag::Tag1, &m)),
        }
    }

    fn mac_init(&mut self, t: &TlvMap, validate: bool, access: Access) -> Result<Response, Error> {
        let algo = mac_algo(self.crypto_object(t, CryptoContext::Signature)?.subtype)?;
        let rule = match validate {
            true => AccessRules::VERIFY,
            false => AccessRules::SIGN,
        };
        let key = self.symmetric_key(t.u32(Tag::Tag1)?, mac_key_types(algo), rule, &access)?;

        self.crypto_object(t, CryptoContext::Signature)?.op = Some(Operation::Mac {
            algo,
            key,
            validate,
            data: vec![],
        });

        done()
    }

    fn mac_step(&mut self, t: &TlvMap, last: bool) -> Result<Response, Error> {
        let chunk = t.required(Tag::Tag3)?;
        let obj = self.crypto_object(t, CryptoContext::Signature)?;

        let (algo, key, validate, data) = match &mut obj.op {
            Some(Operation::Mac {
                algo,
                key,
                validate,
                data,
            }) => {
                data.extend_from_slice(chunk);
                (*algo, key, *validate, data)
            }
            _ => return Err(Error::Conditions("no MAC operation in progress")),
        };

        if !last {
            return done();
        }

        let m = mac(algo, key, data)?;
        obj.op = None;

        match validate {
            true => {
                let ok = tag_matches(&m, t.required(Tag::Tag5)?);
                tlv_response(TlvWriter::new().u8(Tag::Tag1, se_result(ok)))
            }
            false => tlv_response(TlvWriter::new().bytes(Tag::Tag1, &m)),
        }
    }

    fn digest_init(&mut self, t: &TlvMap) -> Result<Response, Error> {
        let obj = self.crypto_object(t, CryptoContext::Digest)?;
        let mode = digest_mode(obj.subtype)?;

        obj.op = Some(Operation::Digest { mode, data: vec![] });
        done()
    }

    fn digest_step(&mut self, t: &TlvMap, last: bool) -> Result<Response, Error> {
        let chunk = t.required(Tag::Tag3)?;
        let obj = self.crypto_object(t, CryptoContext::Digest)?;

        let (mode, data) = match &mut obj.op {
            Some(Operation::Digest { mode, data }) => {
                data.extend_from_slice(chunk);
                (*mode, data)
            }
            _ => return Err(Error::Conditions("no digest operation in progress")),
        };

        if !last {
            return done();
        }

        let d = digest(mode, data)?;
        obj.op = None;

        tlv_response(TlvWriter::new().bytes(Tag::Tag1, &d))
    }

    fn aead_key(&self, id: u32, encrypt: bool, access: &Access) -> Result<Zeroizing<Vec<u8>>, Error> {
        self.symmetric_key(id, &[SecObjType::AesKey], direction_rule(encrypt), access)
    }

    fn aead_one_shot(&mut self, t: &TlvMap, encrypt: bool, access: Access) -> Result<Response, Error> {
        let mode = cipher_mode(t.u8(Tag::Tag2)?)?;
        let kind = AeadKind::from_mode(mode).ok_or(Error::InvalidData("AEAD mode"))?;

        let key = self.aead_key(t.u32(Tag::Tag1)?, encrypt, &access)?;
        let data = t.required(Tag::Tag3)?;
        let aad = t.get(Tag::Tag4).unwrap_or_default();

        match encrypt {
            true => {
                let tag_len = usize::from(t.u16(Tag::Tag6)?);
                kind.check_tag_len(tag_len)?;

                let (iv, generated) = aead_iv(kind, mode, true, t.get(Tag::Tag5))?;
                let (ct, tag) = cipher::aead_seal(kind, &key, &iv, aad, data)?;

                tlv_response(
                    TlvWriter::new()
                        .non_empty(Tag::Tag1, &ct)
                        .bytes(Tag::Tag2, &tag[..tag_len])
                        .opt_bytes(Tag::Tag5, generated.as_deref()),
                )
            }
            false => {
                let (iv, _) = aead_iv(kind, mode, false, t.get(Tag::Tag5))?;
                let tag = t.required(Tag::Tag6)?;

                match cipher::aead_open(kind, &key, &iv, aad, data, tag)? {
                    Some(pt) => tlv_response(
                        TlvWriter::new()
                            .non_empty(Tag::Tag1, &pt)
                            .u8(Tag::Tag2, se_result(true)),
                    ),
                    None => tlv_response(TlvWriter::new().u8(Tag::Tag2, se_result(false))),
                }
            }
        }
    }

    fn aead_init(&mut self, t: &TlvMap, encrypt: bool, access: Access) -> Result<Response, Error> {
        let mode = cipher_mode(self.crypto_object(t, CryptoContext::Aead)?.subtype)?;
        let kind = AeadKind::from_mode(mode).ok_or(Error::InvalidData("AEAD mode"))?;

        let key = self.aead_key(t.u32(Tag::Tag1)?, encrypt, &access)?;

        let tag_len = usize::from(t.u16(Tag::Tag6)?);
        kind.check_tag_len(tag_len)?;

        let (iv, generated) = aead_iv(kind, mode, encrypt, t.get(Tag::Tag3))?;

        let lengths = match kind {
            AeadKind::Ccm => Some((usize::from(t.u16(Tag::Tag4)?), usize::from(t.u16(Tag::Tag5)?))),
            AeadKind::Gcm => None,
        };

        self.crypto_object(t, CryptoContext::Aead)?.op = Some(Operation::Aead(AeadState {
            kind,
            key,
            encrypt,
            iv,
            tag_len,
            aad: vec![],
            payload: vec![],
            lengths,
        }));

        tlv_response(TlvWriter::new().opt_bytes(Tag::Tag3, generated.as_deref()))
    }

    fn aead_update(&mut self, t: &TlvMap) -> Result<Response, Error> {
        let aad = t.get(Tag::Tag4);
        let data = t.get(Tag::Tag3);
        let last = t.opt_u8(Tag::Tag7)? == Some(1);

        let obj = self.crypto_object(t, CryptoContext::Aead)?;
        let st = match &mut obj.op {
            Some(Operation::Aead(st)) => st,
            _ => return Err(Error::Conditions("no AEAD operation in progress")),
        };

        match (aad, data) {
            (Some(aad), None) => {
                if !st.payload.is_empty() {
                    return Err(Error::Conditions("AAD after payload"));
                }
                st.aad.extend_from_slice(aad);
                done()
            }
            (None, Some(data)) => {
                let out = cipher::aead_keystream(st.kind, &st.key, &st.iv, st.payload.len() as u64, data)?;
                st.payload.extend_from_slice(data);

                if let (true, Some((aad_len, payload_len))) = (last, st.lengths) {
                    if st.aad.len() != aad_len || st.payload.len() != payload_len {
                        return Err(Error::Length);
                    }
                }

                tlv_response(TlvWriter::new().non_empty(Tag::Tag1, &out))
            }
            _ => Err(Error::InvalidData("AEAD update requires AAD or payload")),
        }
    }

    fn aead_final(&mut self, t: &TlvMap) -> Result<Response, Error> {
        let obj = self.crypto_object(t, CryptoContext::Aead)?;

        let st = match obj.op.take() {
            Some(Operation::Aead(st)) => st,
            other => {
                obj.op = other;
                return Err(Error::Conditions("no AEAD operation in progress"));
            }
        };

        if let Some((aad_len, payload_len)) = st.lengths {
            if st.aad.len() != aad_len || st.payload.len() != payload_len {
                return Err(Error::Length);
            }
        }

        let plain = match st.encrypt {
            true => Zeroizing::new(st.payload.clone()),
            false => Zeroizing::new(cipher::aead_keystream(st.kind, &st.key, &st.iv, 0, &st.payload)?),
        };
        let (_, tag) = cipher::aead_seal(st.kind, &st.key, &st.iv, &st.aad, &plain)?;

        match (st.encrypt, t.get(Tag::Tag5)) {
            (true, _) => tlv_response(TlvWriter::new().bytes(Tag::Tag1, &tag[..st.tag_len])),
            (false, Some(received)) => {
                let ok = received.len() == st.tag_len && tag_matches(&tag, received);
                tlv_response(TlvWriter::new().u8(Tag::Tag2, se_result(ok)))
            }
            (false, None) => Err(Error::InvalidData("AEAD tag required")),
        }
    }

    fn hkdf(&mut self, t: &TlvMap, expand_only: bool, access: Access) -> Result<Response, Error> {
        let dest = t.opt_u32(Tag::Tag7)?;
        let mode = digest_mode(t.u8(Tag::Tag2)?)?;

        let ikm = {
            let o = self.store.get(t.u32(Tag::Tag1)?)?;
            o.check(&access, AccessRules::KDF)?;
            check_derived_output(o, &access, dest)?;
            secret(o)?
        };

        let salt = match (t.get(Tag::Tag3), t.opt_u32(Tag::Tag6)?) {
            (Some(s), _) => Some(Zeroizing::new(s.to_vec())),
            (None, Some(id)) => Some(secret(self.store.get(id)?)?),
            (None, None) => None,
        };

        let len = usize::from(t.u16(Tag::Tag5)?);
        if len == 0 {
            return Err(Error::Length);
        }

        let out = hkdf(
            mode,
            &ikm,
            salt.as_ref().map(|s| s.as_slice()),
            t.get(Tag::Tag4).unwrap_or_default(),
            len,
            expand_only,
        )?;

        self.derived_output(dest, out, &access)
    }

    fn ecdh(&mut self, t: &TlvMap, reverse: bool, access: Access) -> Result<Response, Error> {
        let dest = t.opt_u32(Tag::Tag7)?;

        let shared = {
            let o = self.store.get(t.u32(Tag::Tag1)?)?;
            o.check(&access, AccessRules::KA)?;
            check_derived_output(o, &access, dest)?;

            let mut s = o.ec()?.ecdh(t.required(Tag::Tag2)?)?;
            if reverse {
                s.reverse();
            }
            s
        };

        self.derived_output(dest, shared, &access)
    }

    /// Return derived material, or store it in a destination object
    fn derived_output(&mut self, dest: Option<u32>, out: Vec<u8>, access: &Access) -> Result<Response, Error> {
        let out = Zeroizing::new(out);

        let id = match dest {
            Some(id) => id,
            None => return tlv_response(TlvWriter::new().bytes(Tag::Tag1, &out)),
        };

        let o = self.store.get_mut(id)?;
        o.check(access, AccessRules::WRITE)?;

        match &mut o.content {
            Content::Symmetric(v) | Content::Binary(v) => *v = out.to_vec(),
            _ => return Err(Error::InvalidData("derived output object type")),
        }
        o.origin = Origin::Internal;

        debug!("Derived {} bytes into 0x{:08x}", out.len(), id);

        done()
    }
}

#[cfg(test)]
mod test {
    use se05x_apdu::types::{EcCurve, Instruction, KeyPart, Status};

    use super::*;
    use crate::{
        crypto::ec::EcMaterial,
        element::test::{call, element},
        object::Object,
    };

    fn crypto(p1: P1, p2: P2, w: TlvWriter) -> Command {
        Command::new(Instruction::Crypto.into(), p1.into(), p2.into())
            .with_tlv(w)
            .unwrap()
            .expect_response()
    }

    fn crypto_object(e: &mut Element, id: u16, context: CryptoContext, subtype: u8) {
        let c = Command::new(Instruction::Write.into(), P1::CryptoObj.into(), P2::Default.into())
            .with_tlv(
                TlvWriter::new()
                    .u16(Tag::Tag1, id)
                    .u8(Tag::Tag2, context.into())
                    .u8(Tag::Tag3, subtype),
            )
            .unwrap();
        assert!(call(e, &c).is_ok());
    }

    fn symmetric(e: &mut Element, id: u32, obj_type: SecObjType, key: &[u8]) {
        e.provision(Object::new(id, obj_type, Content::Symmetric(key.to_vec())));
    }

    fn tag1(r: &Response) -> Vec<u8> {
        assert!(r.is_ok(), "status: {:04x}", r.sw);
        r.tlv().unwrap().get(Tag::Tag1).unwrap_or_default().to_vec()
    }

    #[test]
    fn digest_streaming() {
        let mut e = element();
        crypto_object(&mut e, 0x10, CryptoContext::Digest, DigestMode::Sha256.into());

        let data = [0x5au8; 300];
        let one_shot = tag1(&call(
            &mut e,
            &crypto(
                P1::Default,
                P2::Oneshot,
                TlvWriter::new().u8(Tag::Tag1, DigestMode::Sha256.into()).bytes(Tag::Tag2, &data),
            ),
        ));
        assert_eq!(one_shot.len(), 32);

        let init = crypto(P1::Default, P2::Init, TlvWriter::new().u16(Tag::Tag2, 0x10));
        assert!(call(&mut e, &init).is_ok());

        let update = crypto(
            P1::Default,
            P2::Update,
            TlvWriter::new().u16(Tag::Tag2, 0x10).bytes(Tag::Tag3, &data[..200]),
        );
        assert!(call(&mut e, &update).is_ok());

        let fin = crypto(
            P1::Default,
            P2::Final,
            TlvWriter::new().u16(Tag::Tag2, 0x10).bytes(Tag::Tag3, &data[200..]),
        );
        assert_eq!(tag1(&call(&mut e, &fin)), one_shot);

        // Operation is finished
        assert_eq!(call(&mut e, &update).sw, u16::from(Status::ConditionsNotSatisfied));
    }

    #[test]
    fn crypto_object_list() {
        let mut e = element();
        crypto_object(&mut e, 0x20, CryptoContext::Cipher, CipherMode::AesCbcNopad.into());
        crypto_object(&mut e, 0x21, CryptoContext::Signature, MacAlgo::HmacSha256.into());

        let list = Command::new(Instruction::Read.into(), P1::CryptoObj.into(), P2::List.into()).expect_response();
        assert_eq!(
            tag1(&call(&mut e, &list)),
            vec![0x00, 0x20, 0x02, 0x0D, 0x00, 0x21, 0x03, 0x19]
        );

        // Duplicate ids and mismatched subtypes are rejected
        let dup = Command::new(Instruction::Write.into(), P1::CryptoObj.into(), P2::Default.into())
            .with_tlv(
                TlvWriter::new()
                    .u16(Tag::Tag1, 0x20)
                    .u8(Tag::Tag2, CryptoContext::Digest.into())
                    .u8(Tag::Tag3, DigestMode::Sha256.into()),
            )
            .unwrap();
        assert_eq!(call(&mut e, &dup).sw, u16::from(Status::ConditionsNotSatisfied));

        let bad = Command::new(Instruction::Write.into(), P1::CryptoObj.into(), P2::Default.into())
            .with_tlv(
                TlvWriter::new()
                    .u16(Tag::Tag1, 0x22)
                    .u8(Tag::Tag2, CryptoContext::Cipher.into())
                    .u8(Tag::Tag3, CipherMode::AesGcm.into()),
            )
            .unwrap();
        assert_eq!(call(&mut e, &bad).sw, u16::from(Status::WrongData));
    }

    #[test]
    fn cbc_streaming_matches_one_shot() {
        let mut e = element();
        symmetric(&mut e, 0x300, SecObjType::AesKey, &[0x11; 16]);
        crypto_object(&mut e, 0x30, CryptoContext::Cipher, CipherMode::AesCbcNopad.into());

        let iv = [0x22u8; 16];
        let data = [0x33u8; 64];

        let one_shot = tag1(&call(
            &mut e,
            &crypto(
                P1::Cipher,
                P2::EncryptOneshot,
                TlvWriter::new()
                    .u32(Tag::Tag1, 0x300)
                    .u8(Tag::Tag2, CipherMode::AesCbcNopad.into())
                    .bytes(Tag::Tag3, &data)
                    .bytes(Tag::Tag4, &iv),
            ),
        ));

        let init = crypto(
            P1::Cipher,
            P2::Encrypt,
            TlvWriter::new().u32(Tag::Tag1, 0x300).u16(Tag::Tag2, 0x30).bytes(Tag::Tag4, &iv),
        );
        assert!(call(&mut e, &init).is_ok());

        let mut out = tag1(&call(
            &mut e,
            &crypto(
                P1::Cipher,
                P2::Update,
                TlvWriter::new().u16(Tag::Tag2, 0x30).bytes(Tag::Tag3, &data[..32]),
            ),
        ));
        out.extend(tag1(&call(
            &mut e,
            &crypto(
                P1::Cipher,
                P2::Final,
                TlvWriter::new().u16(Tag::Tag2, 0x30).bytes(Tag::Tag3, &data[32..]),
            ),
        )));

        assert_eq!(out, one_shot);

        // Unaligned block mode input
        let bad = crypto(
            P1::Cipher,
            P2::EncryptOneshot,
            TlvWriter::new()
                .u32(Tag::Tag1, 0x300)
                .u8(Tag::Tag2, CipherMode::AesCbcNopad.into())
                .bytes(Tag::Tag3, &data[..15])
                .bytes(Tag::Tag4, &iv),
        );
        assert_eq!(call(&mut e, &bad).sw, u16::from(Status::WrongLength));
    }

    #[test]
    fn ctr_internal_iv() {
        let mut e = element();
        symmetric(&mut e, 0x310, SecObjType::AesKey, &[0x44; 32]);

        let r = call(
            &mut e,
            &crypto(
                P1::Cipher,
                P2::EncryptOneshot,
                TlvWriter::new()
                    .u32(Tag::Tag1, 0x310)
                    .u8(Tag::Tag2, CipherMode::AesCtrIntIv.into())
                    .bytes(Tag::Tag3, b"seven"),
            ),
        );
        let ct = tag1(&r);
        let iv = r.tlv().unwrap().required(Tag::Tag4).unwrap().to_vec();
        assert_eq!(ct.len(), 5);

        // Decrypting with the returned counter block recovers the plaintext
        let r = call(
            &mut e,
            &crypto(
                P1::Cipher,
                P2::DecryptOneshot,
                TlvWriter::new()
                    .u32(Tag::Tag1, 0x310)
                    .u8(Tag::Tag2, CipherMode::AesCtr.into())
                    .bytes(Tag::Tag3, &ct)
                    .bytes(Tag::Tag4, &iv),
            ),
        );
        assert_eq!(tag1(&r), b"seven");

        // Decryption in internal IV mode is refused
        let r = call(
            &mut e,
            &crypto(
                P1::Cipher,
                P2::DecryptOneshot,
                TlvWriter::new()
                    .u32(Tag::Tag1, 0x310)
                    .u8(Tag::Tag2, CipherMode::AesCtrIntIv.into())
                    .bytes(Tag::Tag3, &ct),
            ),
        );
        assert_eq!(r.sw, u16::from(Status::ConditionsNotSatisfied));
    }

    #[test]
    fn des_iso_padding() {
        let mut e = element();
        symmetric(&mut e, 0x320, SecObjType::DesKey, &[0x0123456789abcdefu64.to_be_bytes(); 2].concat());
        crypto_object(&mut e, 0x32, CryptoContext::Cipher, CipherMode::DesCbcIso9797M2.into());

        let iv = [0u8; 8];
        let init = crypto(
            P1::Cipher,
            P2::Encrypt,
            TlvWriter::new().u32(Tag::Tag1, 0x320).u16(Tag::Tag2, 0x32).bytes(Tag::Tag4, &iv),
        );
        assert!(call(&mut e, &init).is_ok());

        // Aligned input gains a full padding block
        let r = call(
            &mut e,
            &crypto(
                P1::Cipher,
                P2::Final,
                TlvWriter::new().u16(Tag::Tag2, 0x32).bytes(Tag::Tag3, &[0x55; 8]),
            ),
        );
        assert_eq!(tag1(&r).len(), 16);

        // AES keys do not work with DES modes
        symmetric(&mut e, 0x321, SecObjType::AesKey, &[0x01; 16]);
        let r = call(
            &mut e,
            &crypto(
                P1::Cipher,
                P2::EncryptOneshot,
                TlvWriter::new()
                    .u32(Tag::Tag1, 0x321)
                    .u8(Tag::Tag2, CipherMode::DesCbcIso9797M1.into())
                    .bytes(Tag::Tag3, &[0x55; 3])
                    .bytes(Tag::Tag4, &iv),
            ),
        );
        assert_eq!(r.sw, u16::from(Status::WrongData));
    }

    #[test]
    fn gcm_streaming_matches_one_shot() {
        let mut e = element();
        symmetric(&mut e, 0x330, SecObjType::AesKey, &[0x66; 16]);
        crypto_object(&mut e, 0x33, CryptoContext::Aead, CipherMode::AesGcm.into());

        let iv = [0x77u8; 12];
        let aad = b"header";
        let data = [0x88u8; 40];

        let r = call(
            &mut e,
            &crypto(
                P1::Aead,
                P2::EncryptOneshot,
                TlvWriter::new()
                    .u32(Tag::Tag1, 0x330)
                    .u8(Tag::Tag2, CipherMode::AesGcm.into())
                    .bytes(Tag::Tag3, &data)
                    .bytes(Tag::Tag4, aad)
                    .bytes(Tag::Tag5, &iv)
                    .u16(Tag::Tag6, 16),
            ),
        );
        let ct = tag1(&r);
        let tag = r.tlv().unwrap().required(Tag::Tag2).unwrap().to_vec();

        let init = crypto(
            P1::Aead,
            P2::Encrypt,
            TlvWriter::new()
                .u32(Tag::Tag1, 0x330)
                .u16(Tag::Tag2, 0x33)
                .bytes(Tag::Tag3, &iv)
                .u16(Tag::Tag6, 16),
        );
        assert!(call(&mut e, &init).is_ok());

        let r = call(
            &mut e,
            &crypto(P1::Aead, P2::Update, TlvWriter::new().u16(Tag::Tag2, 0x33).bytes(Tag::Tag4, aad)),
        );
        assert!(r.is_ok());

        let mut out = vec![];
        for chunk in [&data[..32], &data[32..]] {
            out.extend(tag1(&call(
                &mut e,
                &crypto(P1::Aead, P2::Update, TlvWriter::new().u16(Tag::Tag2, 0x33).bytes(Tag::Tag3, chunk)),
            )));
        }
        assert_eq!(out, ct);

        let r = call(&mut e, &crypto(P1::Aead, P2::Final, TlvWriter::new().u16(Tag::Tag2, 0x33)));
        assert_eq!(tag1(&r), tag);

        // One-shot decryption detects a corrupted tag
        let mut bad = tag.clone();
        bad[0] ^= 1;
        let r = call(
            &mut e,
            &crypto(
                P1::Aead,
                P2::DecryptOneshot,
                TlvWriter::new()
                    .u32(Tag::Tag1, 0x330)
                    .u8(Tag::Tag2, CipherMode::AesGcm.into())
                    .bytes(Tag::Tag3, &ct)
                    .bytes(Tag::Tag4, aad)
                    .bytes(Tag::Tag5, &iv)
                    .bytes(Tag::Tag6, &bad),
            ),
        );
        assert_eq!(r.tlv().unwrap().u8(Tag::Tag2).unwrap(), se_result(false));
    }

    #[test]
    fn ccm_declared_lengths() {
        let mut e = element();
        symmetric(&mut e, 0x340, SecObjType::AesKey, &[0x99; 16]);
        crypto_object(&mut e, 0x34, CryptoContext::Aead, CipherMode::AesCcm.into());

        let init = crypto(
            P1::Aead,
            P2::Encrypt,
            TlvWriter::new()
                .u32(Tag::Tag1, 0x340)
                .u16(Tag::Tag2, 0x34)
                .bytes(Tag::Tag3, &[0x01; 13])
                .u16(Tag::Tag4, 0)
                .u16(Tag::Tag5, 20)
                .u16(Tag::Tag6, 16),
        );
        assert!(call(&mut e, &init).is_ok());

        // Payload shorter than declared
        let r = call(
            &mut e,
            &crypto(
                P1::Aead,
                P2::Update,
                TlvWriter::new()
                    .u16(Tag::Tag2, 0x34)
                    .bytes(Tag::Tag3, &[0x02; 10])
                    .u8(Tag::Tag7, 1),
            ),
        );
        assert_eq!(r.sw, u16::from(Status::WrongLength));
    }

    #[test]
    fn mac_streaming_and_validation() {
        let mut e = element();
        symmetric(&mut e, 0x350, SecObjType::HmacKey, &[0x0b; 20]);
        crypto_object(&mut e, 0x35, CryptoContext::Signature, MacAlgo::HmacSha256.into());

        let expected = mac(MacAlgo::HmacSha256, &[0x0b; 20], b"Hi There").unwrap();

        let init = crypto(P1::Mac, P2::Generate, TlvWriter::new().u32(Tag::Tag1, 0x350).u16(Tag::Tag2, 0x35));
        assert!(call(&mut e, &init).is_ok());
        let update = crypto(P1::Mac, P2::Update, TlvWriter::new().u16(Tag::Tag2, 0x35).bytes(Tag::Tag3, b"Hi "));
        assert!(call(&mut e, &update).is_ok());
        let fin = crypto(P1::Mac, P2::Final, TlvWriter::new().u16(Tag::Tag2, 0x35).bytes(Tag::Tag3, b"There"));
        assert_eq!(tag1(&call(&mut e, &fin)), expected);

        let validate = |m: &[u8]| {
            crypto(
                P1::Mac,
                P2::ValidateOneshot,
                TlvWriter::new()
                    .u32(Tag::Tag1, 0x350)
                    .u8(Tag::Tag2, MacAlgo::HmacSha256.into())
                    .bytes(Tag::Tag3, b"Hi There")
                    .bytes(Tag::Tag5, m),
            )
        };
        assert_eq!(tag1(&call(&mut e, &validate(&expected))), vec![se_result(true)]);
        assert_eq!(tag1(&call(&mut e, &validate(&expected[..16]))), vec![se_result(true)]);
        assert_eq!(tag1(&call(&mut e, &validate(&[0u8; 32]))), vec![se_result(false)]);
    }

    #[test]
    fn hkdf_into_object() {
        let mut e = element();
        symmetric(&mut e, 0x360, SecObjType::HmacKey, &[0x0b; 22]);
        symmetric(&mut e, 0x361, SecObjType::AesKey, &[0; 16]);

        let salt: Vec<u8> = (0..=0x0cu8).collect();
        let info: Vec<u8> = (0xf0..=0xf9u8).collect();

        let req = |dest: Option<u32>| {
            crypto(
                P1::Default,
                P2::Hkdf,
                TlvWriter::new()
                    .u32(Tag::Tag1, 0x360)
                    .u8(Tag::Tag2, DigestMode::Sha256.into())
                    .bytes(Tag::Tag3, &salt)
                    .bytes(Tag::Tag4, &info)
                    .u16(Tag::Tag5, 16)
                    .opt_u32(Tag::Tag7, dest),
            )
        };

        // RFC 5869 test case 1, truncated
        let okm = tag1(&call(&mut e, &req(None)));
        assert_eq!(hex::encode(&okm), "3cb25f25faacd57a90434f64d0362f2a");

        let r = call(&mut e, &req(Some(0x361)));
        assert!(r.is_ok());
        assert!(r.data.is_empty());
        assert_eq!(e.object(0x361).unwrap().symmetric().unwrap(), &okm[..]);

        // Keys may forbid returning derived material
        let mut o = Object::new(0x362, SecObjType::HmacKey, Content::Symmetric(vec![0x0b; 22]));
        o.policy = se05x_apdu::policy::PolicySet::single(
            0,
            AccessRules::KDF | AccessRules::FORBID_DERIVED_OUTPUT,
        );
        e.provision(o);

        let r = call(
            &mut e,
            &crypto(
                P1::Default,
                P2::Hkdf,
                TlvWriter::new()
                    .u32(Tag::Tag1, 0x362)
                    .u8(Tag::Tag2, DigestMode::Sha256.into())
                    .u16(Tag::Tag5, 16),
            ),
        );
        assert_eq!(r.sw, u16::from(Status::CommandNotAllowed));
    }

    #[test]
    fn sign_verify_and_ecdh() {
        let mut e = element();
        let k = EcMaterial::generate(EcCurve::NistP256).unwrap();
        let peer = EcMaterial::generate(EcCurve::NistP256).unwrap();
        e.provision(Object::new(0x370, SecObjType::EcKeyPair, Content::Ec(k.clone())));

        let digest = digest(DigestMode::Sha256, b"message").unwrap();
        let sig = tag1(&call(
            &mut e,
            &crypto(
                P1::Signature,
                P2::Sign,
                TlvWriter::new()
                    .u32(Tag::Tag1, 0x370)
                    .u8(Tag::Tag2, EcSignatureAlgo::Sha256.into())
                    .bytes(Tag::Tag3, &digest),
            ),
        ));

        let verify = crypto(
            P1::Signature,
            P2::Verify,
            TlvWriter::new()
                .u32(Tag::Tag1, 0x370)
                .u8(Tag::Tag2, EcSignatureAlgo::Sha256.into())
                .bytes(Tag::Tag3, &digest)
                .bytes(Tag::Tag5, &sig),
        );
        assert_eq!(tag1(&call(&mut e, &verify)), vec![se_result(true)]);

        let shared = tag1(&call(
            &mut e,
            &crypto(
                P1::Ec,
                P2::Dh,
                TlvWriter::new()
                    .u32(Tag::Tag1, 0x370)
                    .bytes(Tag::Tag2, peer.public.as_ref().unwrap()),
            ),
        ));
        assert_eq!(shared, peer.ecdh(k.public.as_ref().unwrap()).unwrap());

        let reversed = tag1(&call(
            &mut e,
            &crypto(
                P1::Ec,
                P2::DhReverse,
                TlvWriter::new()
                    .u32(Tag::Tag1, 0x370)
                    .bytes(Tag::Tag2, peer.public.as_ref().unwrap()),
            ),
        ));
        assert_eq!(reversed.iter().rev().copied().collect::<Vec<_>>(), shared);
    }

    #[test]
    fn ecdaa_random_key_single_use() {
        let mut e = element();
        e.provision(Object::new(
            0x380,
            SecObjType::EcKeyPair,
            Content::Ec(EcMaterial::generate(EcCurve::BnP256).unwrap()),
        ));
        e.provision(Object::new(
            0x381,
            SecObjType::EcPrivKey,
            Content::Ec(EcMaterial::generate(EcCurve::BnP256).unwrap()),
        ));

        let sign = crypto(
            P1::Signature,
            P2::SignEcdaa,
            TlvWriter::new()
                .u32(Tag::Tag1, 0x380)
                .u8(Tag::Tag2, EcSignatureAlgo::Ecdaa.into())
                .bytes(Tag::Tag3, &[0x42; 32])
                .u32(Tag::Tag4, 0x381),
        );
        assert!(!tag1(&call(&mut e, &sign)).is_empty());
        assert_eq!(e.object(0x381).unwrap().origin, Origin::Na);

        assert_eq!(call(&mut e, &sign).sw, u16::from(Status::ConditionsNotSatisfied));

        // Regenerating the random key makes it usable again
        let regen = Command::new(
            Instruction::Write.into(),
            P1::Ec.with_part(KeyPart::Na),
            P2::Default.into(),
        )
        .with_tlv(TlvWriter::new().u32(Tag::Tag1, 0x381))
        .unwrap();
        assert!(call(&mut e, &regen).is_ok());
        assert!(call(&mut e, &sign).is_ok());
    }

    #[test]
    fn deselect_drops_operations() {
        let mut e = element();
        crypto_object(&mut e, 0x40, CryptoContext::Digest, DigestMode::Sha.into());

        let init = crypto(P1::Default, P2::Init, TlvWriter::new().u16(Tag::Tag2, 0x40));
        assert!(call(&mut e, &init).is_ok());

        e.deselect();

        let fin = crypto(P1::Default, P2::Final, TlvWriter::new().u16(Tag::Tag2, 0x40).bytes(Tag::Tag3, b"x"));
        assert_eq!(call(&mut e, &fin).sw, u16::from(Status::ConditionsNotSatisfied));
    }
}
