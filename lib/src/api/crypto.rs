// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Cryptographic operation commands

use se05x_apdu::{
    types::{
        CipherMode, DigestMode, EcSignatureAlgo, HkdfMode, Instruction, MacAlgo,
        RsaEncryptionAlgo, RsaSignatureAlgo, SeResult, P1, P2,
    },
    Exchange, Tag, TlvWriter,
};

use super::command;
use crate::{Error, Session};

/// CCM length parameters, fixed at init
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CcmLengths {
    pub aad: u16,
    pub payload: u16,
}

/// Result of an AEAD final
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AeadFinal {
    /// Encryption tag
    Tag(Vec<u8>),
    /// Decryption tag check result
    Verified(bool),
}

/// HKDF salt source
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HkdfSalt<'a> {
    None,
    Bytes(&'a [u8]),
    /// Salt held in an element object
    Object(u32),
}

/// HKDF request
#[derive(Copy, Clone, Debug)]
pub struct HkdfRequest<'a> {
    /// Input key material object
    pub key: u32,
    pub digest: DigestMode,
    pub mode: HkdfMode,
    pub salt: HkdfSalt<'a>,
    pub info: &'a [u8],
    pub len: u16,
    /// Store the output in this object instead of returning it
    pub dest: Option<u32>,
}

fn result(v: u8) -> bool {
    v == u8::from(SeResult::Success)
}

fn direction(encrypt: bool, oneshot: bool) -> P2 {
    match (encrypt, oneshot) {
        (true, true) => P2::EncryptOneshot,
        (false, true) => P2::DecryptOneshot,
        (true, false) => P2::Encrypt,
        (false, false) => P2::Decrypt,
    }
}

impl<T: Exchange + Send + Sync> Session<T> {
    async fn sign_raw(&self, id: u32, algo: u8, data: &[u8]) -> Result<Vec<u8>, Error> {
        let cmd = command(Instruction::Crypto, P1::Signature, P2::Sign)
            .with_tlv(
                TlvWriter::new()
                    .u32(Tag::Tag1, id)
                    .u8(Tag::Tag2, algo)
                    .bytes(Tag::Tag3, data),
            )?
            .expect_response();

        let r = self.call(cmd).await?;
        Ok(r.tlv()?.required(Tag::Tag1)?.to_vec())
    }

    async fn verify_raw(&self, id: u32, algo: u8, data: &[u8], sig: &[u8]) -> Result<bool, Error> {
        let cmd = command(Instruction::Crypto, P1::Signature, P2::Verify)
            .with_tlv(
                TlvWriter::new()
                    .u32(Tag::Tag1, id)
                    .u8(Tag::Tag2, algo)
                    .bytes(Tag::Tag3, data)
                    .bytes(Tag::Tag5, sig),
            )?
            .expect_response();

        let r = self.call(cmd).await?;
        Ok(result(r.tlv()?.u8(Tag::Tag1)?))
    }

    /// ECDSA / EdDSA sign, returning a DER (ECDSA) or raw (EdDSA) signature
    pub async fn ec_sign(&self, id: u32, algo: EcSignatureAlgo, data: &[u8]) -> Result<Vec<u8>, Error> {
        self.sign_raw(id, algo.into(), data).await
    }

    /// ECDSA / EdDSA verify
    pub async fn ec_verify(
        &self,
        id: u32,
        algo: EcSignatureAlgo,
        data: &[u8],
        sig: &[u8],
    ) -> Result<bool, Error> {
        self.verify_raw(id, algo.into(), data, sig).await
    }

    /// ECDAA sign with the provided random key, returning `r || s`
    pub async fn ecdaa_sign(
        &self,
        id: u32,
        data: &[u8],
        random_id: u32,
    ) -> Result<Vec<u8>, Error> {
        let cmd = command(Instruction::Crypto, P1::Signature, P2::SignEcdaa)
            .with_tlv(
                TlvWriter::new()
                    .u32(Tag::Tag1, id)
                    .u8(Tag::Tag2, EcSignatureAlgo::Ecdaa.into())
                    .bytes(Tag::Tag3, data)
                    .u32(Tag::Tag4, random_id),
            )?
            .expect_response();

        let r = self.call(cmd).await?;
        Ok(r.tlv()?.required(Tag::Tag1)?.to_vec())
    }

    /// RSA sign (hash performed on the element)
    pub async fn rsa_sign(&self, id: u32, algo: RsaSignatureAlgo, data: &[u8]) -> Result<Vec<u8>, Error> {
        self.sign_raw(id, algo.into(), data).await
    }

    /// RSA verify (hash performed on the element)
    pub async fn rsa_verify(
        &self,
        id: u32,
        algo: RsaSignatureAlgo,
        data: &[u8],
        sig: &[u8],
    ) -> Result<bool, Error> {
        self.verify_raw(id, algo.into(), data, sig).await
    }

    /// RSA encrypt (public key operation)
    pub async fn rsa_encrypt(
        &self,
        id: u32,
        algo: RsaEncryptionAlgo,
        data: &[u8],
    ) -> Result<Vec<u8>, Error> {
        self.rsa_crypt(id, algo, true, data).await
    }

    /// RSA decrypt (private key operation)
    pub async fn rsa_decrypt(
        &self,
        id: u32,
        algo: RsaEncryptionAlgo,
        data: &[u8],
    ) -> Result<Vec<u8>, Error> {
        self.rsa_crypt(id, algo, false, data).await
    }

    async fn rsa_crypt(
        &self,
        id: u32,
        algo: RsaEncryptionAlgo,
        encrypt: bool,
        data: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let cmd = command(Instruction::Crypto, P1::Rsa, direction(encrypt, true))
            .with_tlv(
                TlvWriter::new()
                    .u32(Tag::Tag1, id)
                    .u8(Tag::Tag2, algo.into())
                    .bytes(Tag::Tag3, data),
            )?
            .expect_response();

        let r = self.call(cmd).await?;
        Ok(r.tlv()?.required(Tag::Tag1)?.to_vec())
    }

    /// Single shot cipher, returning the output and any element generated IV
    pub async fn cipher_one_shot(
        &self,
        key: u32,
        mode: CipherMode,
        encrypt: bool,
        data: &[u8],
        iv: Option<&[u8]>,
    ) -> Result<(Vec<u8>, Option<Vec<u8>>), Error> {
        let cmd = command(Instruction::Crypto, P1::Cipher, direction(encrypt, true))
            .with_tlv(
                TlvWriter::new()
                    .u32(Tag::Tag1, key)
                    .u8(Tag::Tag2, mode.into())
                    .bytes(Tag::Tag3, data)
                    .opt_bytes(Tag::Tag4, iv),
            )?
            .expect_response();

        let r = self.call(cmd).await?;
        let t = r.tlv()?;

        Ok((
            t.required(Tag::Tag1)?.to_vec(),
            t.get(Tag::Tag4).map(|v| v.to_vec()),
        ))
    }

    /// Start a streaming cipher on a crypto object, returning any element
    /// generated IV
    pub async fn cipher_init(
        &self,
        key: u32,
        obj: u16,
        encrypt: bool,
        iv: Option<&[u8]>,
    ) -> Result<Option<Vec<u8>>, Error> {
        let cmd = command(Instruction::Crypto, P1::Cipher, direction(encrypt, false))
            .with_tlv(
                TlvWriter::new()
                    .u32(Tag::Tag1, key)
                    .u16(Tag::Tag2, obj)
                    .opt_bytes(Tag::Tag4, iv),
            )?
            .expect_response();

        let r = self.call(cmd).await?;
        Ok(r.tlv()?.get(Tag::Tag4).map(|v| v.to_vec()))
    }

    /// Process whole blocks of a streaming cipher
    pub async fn cipher_update(&self, obj: u16, data: &[u8]) -> Result<Vec<u8>, Error> {
        self.cipher_step(obj, P2::Update, data).await
    }

    /// Complete a streaming cipher
    pub async fn cipher_final(&self, obj: u16, data: &[u8]) -> Result<Vec<u8>, Error> {
        self.cipher_step(obj, P2::Final, data).await
    }

    async fn cipher_step(&self, obj: u16, p2: P2, data: &[u8]) -> Result<Vec<u8>, Error> {
        let cmd = command(Instruction::Crypto, P1::Cipher, p2)
            .with_tlv(
                TlvWriter::new()
                    .u16(Tag::Tag2, obj)
                    .bytes(Tag::Tag3, data),
            )?
            .expect_response();

        let r = self.call(cmd).await?;
        Ok(r.tlv()?.get(Tag::Tag1).unwrap_or_default().to_vec())
    }

    /// Single shot MAC generation
    pub async fn mac_one_shot_generate(
        &self,
        key: u32,
        algo: MacAlgo,
        data: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let cmd = command(Instruction::Crypto, P1::Mac, P2::GenerateOneshot)
            .with_tlv(
                TlvWriter::new()
                    .u32(Tag::Tag1, key)
                    .u8(Tag::Tag2, algo.into())
                    .bytes(Tag::Tag3, data),
            )?
            .expect_response();

        let r = self.call(cmd).await?;
        Ok(r.tlv()?.required(Tag::Tag1)?.to_vec())
    }

    /// Single shot MAC validation
    pub async fn mac_one_shot_validate(
        &self,
        key: u32,
        algo: MacAlgo,
        data: &[u8],
        mac: &[u8],
    ) -> Result<bool, Error> {
        let cmd = command(Instruction::Crypto, P1::Mac, P2::ValidateOneshot)
            .with_tlv(
                TlvWriter::new()
                    .u32(Tag::Tag1, key)
                    .u8(Tag::Tag2, algo.into())
                    .bytes(Tag::Tag3, data)
                    .bytes(Tag::Tag5, mac),
            )?
            .expect_response();

        let r = self.call(cmd).await?;
        Ok(result(r.tlv()?.u8(Tag::Tag1)?))
    }

    /// Start a streaming MAC on a crypto object
    pub async fn mac_init(&self, key: u32, obj: u16, validate: bool) -> Result<(), Error> {
        let p2 = match validate {
            true => P2::Validate,
            false => P2::Generate,
        };

        let cmd = command(Instruction::Crypto, P1::Mac, p2)
            .with_tlv(TlvWriter::new().u32(Tag::Tag1, key).u16(Tag::Tag2, obj))?;

        self.call(cmd).await?;
        Ok(())
    }

    pub async fn mac_update(&self, obj: u16, data: &[u8]) -> Result<(), Error> {
        let cmd = command(Instruction::Crypto, P1::Mac, P2::Update)
            .with_tlv(TlvWriter::new().u16(Tag::Tag2, obj).bytes(Tag::Tag3, data))?;

        self.call(cmd).await?;
        Ok(())
    }

    /// Complete a streaming MAC, returning the MAC (generate) or the
    /// result byte (validate)
    pub async fn mac_final(&self, obj: u16, data: &[u8], mac: Option<&[u8]>) -> Result<Vec<u8>, Error> {
        let cmd = command(Instruction::Crypto, P1::Mac, P2::Final)
            .with_tlv(
                TlvWriter::new()
                    .u16(Tag::Tag2, obj)
                    .bytes(Tag::Tag3, data)
                    .opt_bytes(Tag::Tag5, mac),
            )?
            .expect_response();

        let r = self.call(cmd).await?;
        Ok(r.tlv()?.required(Tag::Tag1)?.to_vec())
    }

    /// Single shot digest
    pub async fn digest_one_shot(&self, mode: DigestMode, data: &[u8]) -> Result<Vec<u8>, Error> {
        let cmd = command(Instruction::Crypto, P1::Default, P2::Oneshot)
            .with_tlv(
                TlvWriter::new()
                    .u8(Tag::Tag1, mode.into())
                    .bytes(Tag::Tag2, data),
            )?
            .expect_response();

        let r = self.call(cmd).await?;
        Ok(r.tlv()?.required(Tag::Tag1)?.to_vec())
    }

    pub async fn digest_init(&self, obj: u16) -> Result<(), Error> {
        let cmd = command(Instruction::Crypto, P1::Default, P2::Init)
            .with_tlv(TlvWriter::new().u16(Tag::Tag2, obj))?;

        self.call(cmd).await?;
        Ok(())
    }

    pub async fn digest_update(&self, obj: u16, data: &[u8]) -> Result<(), Error> {
        let cmd = command(Instruction::Crypto, P1::Default, P2::Update)
            .with_tlv(TlvWriter::new().u16(Tag::Tag2, obj).bytes(Tag::Tag3, data))?;

        self.call(cmd).await?;
        Ok(())
    }

    pub async fn digest_final(&self, obj: u16, data: &[u8]) -> Result<Vec<u8>, Error> {
        let cmd = command(Instruction::Crypto, P1::Default, P2::Final)
            .with_tlv(TlvWriter::new().u16(Tag::Tag2, obj).bytes(Tag::Tag3, data))?
            .expect_response();

        let r = self.call(cmd).await?;
        Ok(r.tlv()?.required(Tag::Tag1)?.to_vec())
    }

    /// Single shot AEAD encryption, returning ciphertext, tag and any
    /// element generated IV
    #[allow(clippy::too_many_arguments)]
    pub async fn aead_one_shot_encrypt(
        &self,
        key: u32,
        mode: CipherMode,
        data: &[u8],
        aad: &[u8],
        iv: Option<&[u8]>,
        tag_len: u16,
    ) -> Result<(Vec<u8>, Vec<u8>, Option<Vec<u8>>), Error> {
        let cmd = command(Instruction::Crypto, P1::Aead, P2::EncryptOneshot)
            .with_tlv(
                TlvWriter::new()
                    .u32(Tag::Tag1, key)
                    .u8(Tag::Tag2, mode.into())
                    .bytes(Tag::Tag3, data)
                    .non_empty(Tag::Tag4, aad)
                    .opt_bytes(Tag::Tag5, iv)
                    .u16(Tag::Tag6, tag_len),
            )?
            .expect_response();

        let r = self.call(cmd).await?;
        let t = r.tlv()?;

        Ok((
            t.get(Tag::Tag1).unwrap_or_default().to_vec(),
            t.required(Tag::Tag2)?.to_vec(),
            t.get(Tag::Tag5).map(|v| v.to_vec()),
        ))
    }

    /// Single shot AEAD decryption, returning the plaintext when the tag
    /// verifies
    pub async fn aead_one_shot_decrypt(
        &self,
        key: u32,
        mode: CipherMode,
        data: &[u8],
        aad: &[u8],
        iv: &[u8],
        tag: &[u8],
    ) -> Result<Option<Vec<u8>>, Error> {
        let cmd = command(Instruction::Crypto, P1::Aead, P2::DecryptOneshot)
            .with_tlv(
                TlvWriter::new()
                    .u32(Tag::Tag1, key)
                    .u8(Tag::Tag2, mode.into())
                    .bytes(Tag::Tag3, data)
                    .non_empty(Tag::Tag4, aad)
                    .bytes(Tag::Tag5, iv)
                    .bytes(Tag::Tag6, tag),
            )?
            .expect_response();

        let r = self.call(cmd).await?;
        let t = r.tlv()?;

        match result(t.u8(Tag::Tag2)?) {
            true => Ok(Some(t.get(Tag::Tag1).unwrap_or_default().to_vec())),
            false => Ok(None),
        }
    }

    /// Start a streaming AEAD operation, returning any element generated IV
    pub async fn aead_init(
        &self,
        key: u32,
        obj: u16,
        encrypt: bool,
        iv: Option<&[u8]>,
        ccm: Option<CcmLengths>,
        tag_len: u16,
    ) -> Result<Option<Vec<u8>>, Error> {
        let cmd = command(Instruction::Crypto, P1::Aead, direction(encrypt, false))
            .with_tlv(
                TlvWriter::new()
                    .u32(Tag::Tag1, key)
                    .u16(Tag::Tag2, obj)
                    .opt_bytes(Tag::Tag3, iv)
                    .opt_u16(Tag::Tag4, ccm.map(|c| c.aad))
                    .opt_u16(Tag::Tag5, ccm.map(|c| c.payload))
                    .u16(Tag::Tag6, tag_len),
            )?
            .expect_response();

        let r = self.call(cmd).await?;
        Ok(r.tlv()?.get(Tag::Tag3).map(|v| v.to_vec()))
    }

    pub async fn aead_update_aad(&self, obj: u16, aad: &[u8]) -> Result<(), Error> {
        let cmd = command(Instruction::Crypto, P1::Aead, P2::Update)
            .with_tlv(TlvWriter::new().u16(Tag::Tag2, obj).bytes(Tag::Tag4, aad))?;

        self.call(cmd).await?;
        Ok(())
    }

    /// Process AEAD payload, `last` marking the final CCM update
    pub async fn aead_update(&self, obj: u16, data: &[u8], last: bool) -> Result<Vec<u8>, Error> {
        let cmd = command(Instruction::Crypto, P1::Aead, P2::Update)
            .with_tlv(
                TlvWriter::new()
                    .u16(Tag::Tag2, obj)
                    .bytes(Tag::Tag3, data)
                    .opt_u8(Tag::Tag7, last.then_some(1)),
            )?
            .expect_response();

        let r = self.call(cmd).await?;
        Ok(r.tlv()?.get(Tag::Tag1).unwrap_or_default().to_vec())
    }

    /// Complete a streaming AEAD operation
    pub async fn aead_final(&self, obj: u16, tag: Option<&[u8]>) -> Result<AeadFinal, Error> {
        let cmd = command(Instruction::Crypto, P1::Aead, P2::Final)
            .with_tlv(
                TlvWriter::new()
                    .u16(Tag::Tag2, obj)
                    .opt_bytes(Tag::Tag5, tag),
            )?
            .expect_response();

        let r = self.call(cmd).await?;
        let t = r.tlv()?;

        match tag {
            Some(_) => Ok(AeadFinal::Verified(result(t.u8(Tag::Tag2)?))),
            None => Ok(AeadFinal::Tag(t.required(Tag::Tag1)?.to_vec())),
        }
    }

    /// HKDF on the element
    pub async fn hkdf(&self, req: &HkdfRequest<'_>) -> Result<Option<Vec<u8>>, Error> {
        let p2 = match req.mode {
            HkdfMode::ExtractAndExpand => P2::Hkdf,
            HkdfMode::ExpandOnly => P2::HkdfExpandOnly,
        };

        let (salt, salt_id) = match req.salt {
            HkdfSalt::None => (None, None),
            HkdfSalt::Bytes(b) => (Some(b), None),
            HkdfSalt::Object(id) => (None, Some(id)),
        };

        let cmd = command(Instruction::Crypto, P1::Default, p2)
            .with_tlv(
                TlvWriter::new()
                    .u32(Tag::Tag1, req.key)
                    .u8(Tag::Tag2, req.digest.into())
                    .opt_bytes(Tag::Tag3, salt)
                    .non_empty(Tag::Tag4, req.info)
                    .u16(Tag::Tag5, req.len)
                    .opt_u32(Tag::Tag6, salt_id)
                    .opt_u32(Tag::Tag7, req.dest),
            )?
            .expect_response();

        let r = self.call(cmd).await?;
        Ok(r.tlv()?.get(Tag::Tag1).map(|v| v.to_vec()))
    }

    /// ECDH with a peer public key, storing the secret in `dest` when
    /// provided (byte reversed on store when `reverse` is set)
    pub async fn ecdh(
        &self,
        key: u32,
        peer: &[u8],
        dest: Option<u32>,
        reverse: bool,
    ) -> Result<Option<Vec<u8>>, Error> {
        let p2 = match reverse {
            true => P2::DhReverse,
            false => P2::Dh,
        };

        let cmd = command(Instruction::Crypto, P1::Ec, p2)
            .with_tlv(
                TlvWriter::new()
                    .u32(Tag::Tag1, key)
                    .bytes(Tag::Tag2, peer)
                    .opt_u32(Tag::Tag7, dest),
            )?
            .expect_response();

        let r = self.call(cmd).await?;
        Ok(r.tlv()?.get(Tag::Tag1).map(|v| v.to_vec()))
    }
}
