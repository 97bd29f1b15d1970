// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Secure object write / read commands

use se05x_apdu::{
    policy::PolicySet,
    types::{EcCurve, Instruction, KeyPart, RsaKeyComponent, P1, P2},
    Exchange, Tag, TlvWriter,
};

use super::{command, ins};
use crate::{Error, Session};

/// WriteECKey parameters
///
/// A `Pair` write with no key material generates the key on the element.
#[derive(Clone, Debug)]
pub struct EcKeyWrite<'a> {
    pub id: u32,
    pub part: KeyPart,
    pub transient: bool,
    /// Create as an authentication object
    pub auth: bool,
    pub policy: Option<&'a PolicySet>,
    pub max_attempts: Option<u16>,
    /// Curve, sent only when creating
    pub curve: Option<EcCurve>,
    pub private: Option<&'a [u8]>,
    pub public: Option<&'a [u8]>,
}

/// WriteRSAKey parameters, carrying at most one key component
#[derive(Clone, Debug)]
pub struct RsaKeyWrite<'a> {
    pub id: u32,
    pub part: KeyPart,
    /// CRT (`true`) or plain key format
    pub crt: bool,
    pub transient: bool,
    pub policy: Option<&'a PolicySet>,
    /// Key size in bits, sent only when creating
    pub size: Option<u16>,
    pub component: Option<(RsaKeyComponent, &'a [u8])>,
}

/// WriteSymmKey parameters (AES, DES, HMAC)
#[derive(Clone, Debug)]
pub struct SymmKeyWrite<'a> {
    pub kind: P1,
    pub id: u32,
    pub transient: bool,
    pub auth: bool,
    pub policy: Option<&'a PolicySet>,
    pub max_attempts: Option<u16>,
    /// Key encryption key the value is wrapped with
    pub kek: Option<u32>,
    pub key: &'a [u8],
}

/// WriteBinary parameters
#[derive(Clone, Debug)]
pub struct BinaryWrite<'a> {
    pub id: u32,
    pub transient: bool,
    pub policy: Option<&'a PolicySet>,
    pub offset: Option<u16>,
    /// Total file length, sent only when creating
    pub file_len: Option<u16>,
    pub data: &'a [u8],
}

/// TLV tag carrying an RSA key component
pub(crate) fn rsa_component_tag(c: RsaKeyComponent) -> Option<Tag> {
    use RsaKeyComponent::*;
    match c {
        P => Some(Tag::Tag3),
        Q => Some(Tag::Tag4),
        Dp => Some(Tag::Tag5),
        Dq => Some(Tag::Tag6),
        InvQ => Some(Tag::Tag7),
        PubExp => Some(Tag::Tag8),
        PrivExp => Some(Tag::Tag9),
        Mod => Some(Tag::Tag10),
        Na => None,
    }
}

fn encode_policy(p: Option<&PolicySet>) -> Result<Option<Vec<u8>>, Error> {
    match p {
        Some(p) if !p.is_empty() => Ok(Some(p.encode()?)),
        _ => Ok(None),
    }
}

impl<T: Exchange + Send + Sync> Session<T> {
    /// Write (create, update or generate) an EC key
    pub async fn write_ec_key(&self, w: &EcKeyWrite<'_>) -> Result<(), Error> {
        let policy = encode_policy(w.policy)?;

        let cmd = command(
            ins(Instruction::Write, w.transient, w.auth),
            P1::Ec.with_part(w.part),
            P2::Default,
        )
        .with_tlv(
            TlvWriter::new()
                .opt_bytes(Tag::Policy, policy.as_deref())
                .opt_u16(Tag::MaxAttempts, w.max_attempts)
                .u32(Tag::Tag1, w.id)
                .opt_u8(Tag::Tag2, w.curve.map(u8::from))
                .opt_bytes(Tag::Tag3, w.private)
                .opt_bytes(Tag::Tag4, w.public),
        )?;

        self.call(cmd).await?;
        Ok(())
    }

    /// Write (create, update or generate) an RSA key component
    pub async fn write_rsa_key(&self, w: &RsaKeyWrite<'_>) -> Result<(), Error> {
        let policy = encode_policy(w.policy)?;

        let mut t = TlvWriter::new()
            .opt_bytes(Tag::Policy, policy.as_deref())
            .u32(Tag::Tag1, w.id)
            .opt_u16(Tag::Tag2, w.size);

        if let Some((c, v)) = w.component {
            let tag = rsa_component_tag(c).ok_or(Error::InvalidArgument("invalid RSA component"))?;
            t = t.bytes(tag, v);
        }

        let p2 = match w.crt {
            true => P2::Default,
            false => P2::Raw,
        };

        let cmd = command(
            ins(Instruction::Write, w.transient, false),
            P1::Rsa.with_part(w.part),
            p2,
        )
        .with_tlv(t)?;

        self.call(cmd).await?;
        Ok(())
    }

    /// Write an AES / DES / HMAC key
    pub async fn write_symm_key(&self, w: &SymmKeyWrite<'_>) -> Result<(), Error> {
        let policy = encode_policy(w.policy)?;

        let cmd = command(ins(Instruction::Write, w.transient, w.auth), w.kind, P2::Default)
            .with_tlv(
                TlvWriter::new()
                    .opt_bytes(Tag::Policy, policy.as_deref())
                    .opt_u16(Tag::MaxAttempts, w.max_attempts)
                    .u32(Tag::Tag1, w.id)
                    .opt_u32(Tag::Tag2, w.kek)
                    .bytes(Tag::Tag3, w.key),
            )?;

        self.call(cmd).await?;
        Ok(())
    }

    /// Write a binary file chunk
    pub async fn write_binary(&self, w: &BinaryWrite<'_>) -> Result<(), Error> {
        let policy = encode_policy(w.policy)?;

        let cmd = command(ins(Instruction::Write, w.transient, false), P1::Binary, P2::Default)
            .with_tlv(
                TlvWriter::new()
                    .opt_bytes(Tag::Policy, policy.as_deref())
                    .u32(Tag::Tag1, w.id)
                    .opt_u16(Tag::Tag2, w.offset)
                    .opt_u16(Tag::Tag3, w.file_len)
                    .non_empty(Tag::Tag4, w.data),
            )?;

        self.call(cmd).await?;
        Ok(())
    }

    /// Create a UserID authentication object
    pub async fn write_user_id(
        &self,
        id: u32,
        policy: Option<&PolicySet>,
        max_attempts: Option<u16>,
        secret: &[u8],
    ) -> Result<(), Error> {
        let policy = encode_policy(policy)?;

        let cmd = command(ins(Instruction::Write, false, true), P1::UserId, P2::Default)
            .with_tlv(
                TlvWriter::new()
                    .opt_bytes(Tag::Policy, policy.as_deref())
                    .opt_u16(Tag::MaxAttempts, max_attempts)
                    .u32(Tag::Tag1, id)
                    .bytes(Tag::Tag2, secret),
            )?;

        self.call(cmd).await?;
        Ok(())
    }

    /// Create a counter (with `size`) or set / increment it
    pub async fn write_counter(
        &self,
        id: u32,
        policy: Option<&PolicySet>,
        size: Option<u16>,
        value: Option<&[u8]>,
    ) -> Result<(), Error> {
        let policy = encode_policy(policy)?;

        let cmd = command(Instruction::Write, P1::Counter, P2::Default).with_tlv(
            TlvWriter::new()
                .opt_bytes(Tag::Policy, policy.as_deref())
                .u32(Tag::Tag1, id)
                .opt_u16(Tag::Tag2, size)
                .opt_bytes(Tag::Tag3, value),
        )?;

        self.call(cmd).await?;
        Ok(())
    }

    /// Create a PCR with an initial value, or extend it
    pub async fn write_pcr(
        &self,
        id: u32,
        policy: Option<&PolicySet>,
        initial: Option<&[u8]>,
        extend: Option<&[u8]>,
    ) -> Result<(), Error> {
        let policy = encode_policy(policy)?;

        let cmd = command(Instruction::Write, P1::Pcr, P2::Default).with_tlv(
            TlvWriter::new()
                .opt_bytes(Tag::Policy, policy.as_deref())
                .u32(Tag::Tag1, id)
                .opt_bytes(Tag::Tag2, initial)
                .opt_bytes(Tag::Tag3, extend),
        )?;

        self.call(cmd).await?;
        Ok(())
    }

    /// Read an object (or a range of a binary object)
    pub async fn read_object(
        &self,
        id: u32,
        offset: Option<u16>,
        len: Option<u16>,
    ) -> Result<Vec<u8>, Error> {
        let cmd = command(Instruction::Read, P1::Default, P2::Default)
            .with_tlv(
                TlvWriter::new()
                    .u32(Tag::Tag1, id)
                    .opt_u16(Tag::Tag2, offset)
                    .opt_u16(Tag::Tag3, len),
            )?
            .expect_response();

        let r = self.call(cmd).await?;
        Ok(r.tlv()?.required(Tag::Tag1)?.to_vec())
    }

    /// Read a public RSA key component
    pub async fn read_rsa(&self, id: u32, component: RsaKeyComponent) -> Result<Vec<u8>, Error> {
        let cmd = command(Instruction::Read, P1::Default, P2::Default)
            .with_tlv(
                TlvWriter::new()
                    .u32(Tag::Tag1, id)
                    .u8(Tag::Tag4, component.into()),
            )?
            .expect_response();

        let r = self.call(cmd).await?;
        Ok(r.tlv()?.required(Tag::Tag1)?.to_vec())
    }

    /// Export a wrapped object
    pub async fn export_object(&self, id: u32, component: RsaKeyComponent) -> Result<Vec<u8>, Error> {
        let cmd = command(Instruction::Read, P1::Default, P2::Export)
            .with_tlv(
                TlvWriter::new()
                    .u32(Tag::Tag1, id)
                    .u8(Tag::Tag2, component.into()),
            )?
            .expect_response();

        let r = self.call(cmd).await?;
        Ok(r.tlv()?.required(Tag::Tag1)?.to_vec())
    }

    /// Import a wrapped object
    pub async fn import_object(
        &self,
        id: u32,
        component: RsaKeyComponent,
        blob: &[u8],
    ) -> Result<(), Error> {
        let cmd = command(Instruction::Write, P1::Default, P2::Import).with_tlv(
            TlvWriter::new()
                .u32(Tag::Tag1, id)
                .u8(Tag::Tag2, component.into())
                .bytes(Tag::Tag3, blob),
        )?;

        self.call(cmd).await?;
        Ok(())
    }
}
