// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Management, metadata and session commands

use byteorder::{BigEndian, ByteOrder};
use encdec::{DecodeOwned, Encode};
use log::debug;

use se05x_apdu::{
    attributes::ObjectAttributes,
    policy::SessionPolicy,
    types::{
        AppletFeatures, CryptoContext, EcCurve, Instruction, MemoryType, SeResult, SecObjType,
        SetIndicator, TransientIndicator, CURVE_LIST_LEN, P1, P2,
    },
    version::AppletVersion,
    Exchange, Tag, TlvWriter,
};

use super::command;
use crate::{Error, Session};

/// Entry in the element crypto object list
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CryptoObjectEntry {
    pub id: u16,
    pub context: CryptoContext,
    pub subtype: u8,
}

impl<T: Exchange + Send + Sync> Session<T> {
    /// Check whether an object exists
    pub async fn check_object_exists(&self, id: u32) -> Result<bool, Error> {
        let cmd = command(Instruction::Mgmt, P1::Default, P2::Exist)
            .with_tlv(TlvWriter::new().u32(Tag::Tag1, id))?
            .expect_response();

        let r = self.call(cmd).await?;
        let v = r.tlv()?.u8(Tag::Tag1)?;

        Ok(v == u8::from(SeResult::Success))
    }

    /// Delete a secure object
    pub async fn delete_secure_object(&self, id: u32) -> Result<(), Error> {
        let cmd = command(Instruction::Mgmt, P1::Default, P2::DeleteObject)
            .with_tlv(TlvWriter::new().u32(Tag::Tag1, id))?;

        self.call(cmd).await?;
        Ok(())
    }

    /// Delete every non-reserved object and curve
    pub async fn delete_all(&self) -> Result<(), Error> {
        self.call(command(Instruction::Mgmt, P1::Default, P2::DeleteAll))
            .await?;
        Ok(())
    }

    /// Read object type and transient indicator
    pub async fn read_type(&self, id: u32) -> Result<(SecObjType, TransientIndicator), Error> {
        let cmd = command(Instruction::Read, P1::Default, P2::Type)
            .with_tlv(TlvWriter::new().u32(Tag::Tag1, id))?
            .expect_response();

        let r = self.call(cmd).await?;
        let t = r.tlv()?;

        let (ty, ti) = (t.u8(Tag::Tag1)?, t.u8(Tag::Tag2)?);
        let ty = SecObjType::try_from(ty).map_err(|_| Error::Unsupported("unknown object type"))?;
        let ti = TransientIndicator::try_from(ti)
            .map_err(|_| Error::Unsupported("unknown transient indicator"))?;

        Ok((ty, ti))
    }

    /// Read object size in bytes
    pub async fn read_size(&self, id: u32) -> Result<u16, Error> {
        let cmd = command(Instruction::Read, P1::Default, P2::Size)
            .with_tlv(TlvWriter::new().u32(Tag::Tag1, id))?
            .expect_response();

        let r = self.call(cmd).await?;
        Ok(r.tlv()?.u16(Tag::Tag1)?)
    }

    /// Read one page of object identifiers, returning a more-available flag
    pub async fn read_id_list(&self, offset: u16, filter: u8) -> Result<(bool, Vec<u32>), Error> {
        let cmd = command(Instruction::Read, P1::Default, P2::List)
            .with_tlv(
                TlvWriter::new()
                    .u16(Tag::Tag1, offset)
                    .u8(Tag::Tag2, filter),
            )?
            .expect_response();

        let r = self.call(cmd).await?;
        let t = r.tlv()?;

        let more = t.u8(Tag::Tag1)? == 1;
        let ids = t.required(Tag::Tag2)?;
        if ids.len() % 4 != 0 {
            return Err(Error::Encoding("misaligned id list".to_string()));
        }

        Ok((more, ids.chunks(4).map(BigEndian::read_u32).collect()))
    }

    /// Read every object identifier
    pub async fn list_objects(&self) -> Result<Vec<u32>, Error> {
        let mut ids = vec![];

        loop {
            let offset = u16::try_from(ids.len()).map_err(|_| Error::InvalidArgument("id list too long"))?;
            let (more, page) = self.read_id_list(offset, 0xFF).await?;
            ids.extend(page);
            if !more {
                break;
            }
        }

        Ok(ids)
    }

    /// Read object attributes
    pub async fn read_attributes(&self, id: u32) -> Result<ObjectAttributes, Error> {
        let cmd = command(Instruction::Read, P1::Default, P2::Attributes)
            .with_tlv(TlvWriter::new().u32(Tag::Tag1, id))?
            .expect_response();

        let r = self.call(cmd).await?;
        let (a, _) = ObjectAttributes::decode_owned(r.tlv()?.required(Tag::Tag1)?)?;

        Ok(a)
    }

    /// Fetch the applet version
    pub async fn get_version(&self) -> Result<AppletVersion, Error> {
        let cmd = command(Instruction::Mgmt, P1::Default, P2::Version).expect_response();

        let r = self.call(cmd).await?;
        let (v, _) = AppletVersion::decode_owned(r.tlv()?.required(Tag::Tag1)?)?;

        Ok(v)
    }

    /// Fetch random bytes (at most [RANDOM_MAX_LEN](se05x_apdu::RANDOM_MAX_LEN))
    pub async fn get_random(&self, len: u16) -> Result<Vec<u8>, Error> {
        let cmd = command(Instruction::Mgmt, P1::Default, P2::Random)
            .with_tlv(TlvWriter::new().u16(Tag::Tag1, len))?
            .expect_response();

        let r = self.call(cmd).await?;
        let b = r.tlv()?.required(Tag::Tag1)?.to_vec();

        if b.len() != len as usize {
            return Err(Error::Encoding(format!("requested {} random bytes, got {}", len, b.len())));
        }

        Ok(b)
    }

    /// Fetch free memory for the provided pool
    pub async fn get_free_memory(&self, kind: MemoryType) -> Result<u16, Error> {
        let cmd = command(Instruction::Mgmt, P1::Default, P2::Memory)
            .with_tlv(TlvWriter::new().u8(Tag::Tag1, kind.into()))?
            .expect_response();

        let r = self.call(cmd).await?;
        Ok(r.tlv()?.u16(Tag::Tag1)?)
    }

    /// Configure the applet variant
    pub async fn set_applet_features(&self, features: AppletFeatures) -> Result<(), Error> {
        let mut b = [0u8; 2];
        features.encode(&mut b)?;

        let cmd = command(Instruction::Mgmt, P1::Default, P2::Variant)
            .with_tlv(TlvWriter::new().bytes(Tag::Tag1, &b))?;

        self.call(cmd).await?;
        Ok(())
    }

    /// Create a session for the provided authentication object
    pub(crate) async fn create_session(&self, auth_id: u32) -> Result<[u8; 8], Error> {
        let cmd = command(Instruction::Mgmt, P1::Default, P2::SessionCreate)
            .with_tlv(TlvWriter::new().u32(Tag::Tag1, auth_id))?
            .expect_response();

        let r = self.call(cmd).await?;
        let id = r.tlv()?.required(Tag::Tag1)?;

        id.try_into()
            .map_err(|_| Error::Encoding("invalid session id length".to_string()))
    }

    pub(crate) async fn close_session(&self) -> Result<(), Error> {
        self.call(command(Instruction::Mgmt, P1::Default, P2::SessionClose))
            .await?;
        Ok(())
    }

    pub(crate) async fn refresh_session(&self, policy: Option<&SessionPolicy>) -> Result<(), Error> {
        let p = policy.map(|p| p.encode());

        let cmd = command(Instruction::Mgmt, P1::Default, P2::SessionRefresh)
            .with_tlv(TlvWriter::new().opt_bytes(Tag::Policy, p.as_deref()))?;

        self.call(cmd).await?;
        Ok(())
    }

    /// Apply a session policy (ExchangeSessionData)
    pub(crate) async fn exchange_session_data(&self, policy: &SessionPolicy) -> Result<(), Error> {
        debug!("Applying session policy: {:?}", policy);

        let cmd = command(Instruction::Mgmt, P1::Default, P2::SessionPolicy)
            .with_tlv(TlvWriter::new().bytes(Tag::Tag1, &policy.encode()))?;

        self.call(cmd).await?;
        Ok(())
    }

    pub(crate) async fn verify_session_user_id(&self, secret: &[u8]) -> Result<(), Error> {
        let cmd = command(Instruction::Mgmt, P1::Default, P2::SessionUserId)
            .with_tlv(TlvWriter::new().bytes(Tag::Tag1, secret))?;

        self.call(cmd).await?;
        Ok(())
    }

    /// Read the applet curve list
    pub async fn read_curve_list(&self) -> Result<Vec<SetIndicator>, Error> {
        let cmd = command(Instruction::Read, P1::Curve, P2::List).expect_response();

        let r = self.call(cmd).await?;
        let l = r.tlv()?.required(Tag::Tag1)?;

        if l.len() != CURVE_LIST_LEN {
            return Err(Error::Encoding(format!("unexpected curve list length {}", l.len())));
        }

        l.iter()
            .map(|v| {
                SetIndicator::try_from(*v)
                    .map_err(|_| Error::Encoding(format!("invalid curve indicator 0x{:02x}", v)))
            })
            .collect()
    }

    /// Provision a curve on the element
    pub async fn create_curve(&self, curve: EcCurve) -> Result<(), Error> {
        let cmd = command(Instruction::Write, P1::Curve, P2::Create)
            .with_tlv(TlvWriter::new().u8(Tag::Tag1, curve.into()))?;

        self.call(cmd).await?;
        Ok(())
    }

    /// Remove a provisioned curve
    pub async fn delete_curve(&self, curve: EcCurve) -> Result<(), Error> {
        let cmd = command(Instruction::Mgmt, P1::Curve, P2::DeleteObject)
            .with_tlv(TlvWriter::new().u8(Tag::Tag1, curve.into()))?;

        self.call(cmd).await?;
        Ok(())
    }

    /// Fetch the curve an EC object was created on
    pub async fn curve_get_id(&self, id: u32) -> Result<EcCurve, Error> {
        let cmd = command(Instruction::Read, P1::Curve, P2::Id)
            .with_tlv(TlvWriter::new().u32(Tag::Tag1, id))?
            .expect_response();

        let r = self.call(cmd).await?;
        let c = r.tlv()?.u8(Tag::Tag1)?;

        EcCurve::try_from(c).map_err(|_| Error::Unsupported("unknown curve id"))
    }

    /// List crypto objects
    pub async fn read_crypto_object_list(&self) -> Result<Vec<CryptoObjectEntry>, Error> {
        let cmd = command(Instruction::Read, P1::CryptoObj, P2::List).expect_response();

        let r = self.call(cmd).await?;
        let l = r.tlv()?.required(Tag::Tag1)?;

        if l.len() % 4 != 0 {
            return Err(Error::Encoding("misaligned crypto object list".to_string()));
        }

        l.chunks(4)
            .map(|c| {
                let context = CryptoContext::try_from(c[2])
                    .map_err(|_| Error::Encoding(format!("unknown crypto context 0x{:02x}", c[2])))?;
                Ok(CryptoObjectEntry {
                    id: BigEndian::read_u16(c),
                    context,
                    subtype: c[3],
                })
            })
            .collect()
    }

    /// Create a crypto object
    pub async fn create_crypto_object(
        &self,
        id: u16,
        context: CryptoContext,
        subtype: u8,
    ) -> Result<(), Error> {
        let cmd = command(Instruction::Write, P1::CryptoObj, P2::Default).with_tlv(
            TlvWriter::new()
                .u16(Tag::Tag1, id)
                .u8(Tag::Tag2, context.into())
                .u8(Tag::Tag3, subtype),
        )?;

        self.call(cmd).await?;
        Ok(())
    }

    /// Delete a crypto object
    pub async fn delete_crypto_object(&self, id: u16) -> Result<(), Error> {
        let cmd = command(Instruction::Mgmt, P1::CryptoObj, P2::DeleteObject)
            .with_tlv(TlvWriter::new().u16(Tag::Tag1, id))?;

        self.call(cmd).await?;
        Ok(())
    }
}
