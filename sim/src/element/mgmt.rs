// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Management commands and object metadata reads

use byteorder::{BigEndian, ByteOrder};
use encdec::DecodeOwned;
use log::debug;

use se05x_apdu::{
    policy::AccessRules,
    types::{AppletFeatures, EcCurve, MemoryType, SecObjType, TransientIndicator, P1, P2},
    version::AppletVersion,
    Command, Response, Tag, TlvMap, TlvWriter, RANDOM_MAX_LEN,
};

use super::{done, encoded, se_result, session::SessionId, tlv_response, Element};
use crate::{
    crypto::random,
    object::{Access, Content},
    Error,
};

/// Identifiers returned per ReadIDList page
pub const ID_LIST_PAGE: usize = 32;

/// Object type filter selecting every object
const FILTER_ALL: u8 = 0xFF;

impl Element {
    pub(super) fn mgmt(
        &mut self,
        cmd: &Command,
        p1: P1,
        p2: P2,
        access: Access,
        session: Option<SessionId>,
    ) -> Result<Response, Error> {
        let t = cmd.tlv()?;

        match (p1, p2) {
            // CheckObjectExists
            (P1::Default, P2::Exist) => {
                let id = t.u32(Tag::Tag1)?;
                tlv_response(TlvWriter::new().u8(Tag::Tag1, se_result(self.store.contains(id))))
            }

            // DeleteSecureObject
            (P1::Default, P2::DeleteObject) => {
                let id = t.u32(Tag::Tag1)?;
                self.store.get(id)?.check(&access, AccessRules::DELETE)?;
                self.store.remove(id)?;

                debug!("Deleted object 0x{:08x}", id);
                done()
            }

            // DeleteAll
            (P1::Default, P2::DeleteAll) => {
                self.store.delete_all();
                self.crypto_objects.clear();
                done()
            }

            // GetVersion
            (P1::Default, P2::Version) => {
                let v = AppletVersion {
                    config: self.features,
                    ..self.opts.version
                };
                tlv_response(TlvWriter::new().bytes(Tag::Tag1, &encoded(&v)?))
            }

            // GetRandom
            (P1::Default, P2::Random) => {
                let len = t.u16(Tag::Tag1)? as usize;
                if len == 0 || len > RANDOM_MAX_LEN {
                    return Err(Error::Length);
                }
                tlv_response(TlvWriter::new().bytes(Tag::Tag1, &random(len)))
            }

            // GetFreeMemory
            (P1::Default, P2::Memory) => {
                let kind = MemoryType::try_from(t.u8(Tag::Tag1)?)
                    .map_err(|_| Error::InvalidData("memory type"))?;
                let free = self.store.free_memory(kind != MemoryType::Persistent);
                tlv_response(TlvWriter::new().u16(Tag::Tag1, free))
            }

            // SetAppletFeatures
            (P1::Default, P2::Variant) => {
                let (f, _) = AppletFeatures::decode_owned(t.required(Tag::Tag1)?)?;
                debug!("Applet features: {:?}", f);
                self.features = f;
                done()
            }

            (P1::Default, P2::SessionCreate) => self.session_create(&t, session),
            (P1::Default, P2::SessionRefresh) => self.session_refresh(&t, session),
            (P1::Default, P2::SessionPolicy) => self.session_policy(&t, session),
            (P1::Default, P2::SessionUserId) => Err(Error::Conditions("session already authenticated")),
            (P1::Default, P2::SessionClose) => Err(Error::Conditions("no session to close")),

            // DeleteECCurve
            (P1::Curve, P2::DeleteObject) => {
                self.store.delete_curve(curve(&t)?)?;
                done()
            }

            // DeleteCryptoObject
            (P1::CryptoObj, P2::DeleteObject) => {
                let id = t.u16(Tag::Tag1)?;
                self.crypto_objects
                    .remove(&id)
                    .ok_or(Error::NotFound(id as u32))?;
                done()
            }

            _ => Err(Error::Unsupported("management command")),
        }
    }

    /// ReadType
    pub(super) fn read_type(&self, t: &TlvMap) -> Result<Response, Error> {
        let o = self.store.get(t.u32(Tag::Tag1)?)?;

        let transient = match o.transient {
            true => TransientIndicator::Transient,
            false => TransientIndicator::Persistent,
        };

        tlv_response(
            TlvWriter::new()
                .u8(Tag::Tag1, o.obj_type.into())
                .u8(Tag::Tag2, transient.into()),
        )
    }

    /// ReadSize
    pub(super) fn read_size(&self, t: &TlvMap) -> Result<Response, Error> {
        let o = self.store.get(t.u32(Tag::Tag1)?)?;
        let size = u16::try_from(o.size()).map_err(|_| Error::Length)?;

        tlv_response(TlvWriter::new().u16(Tag::Tag1, size))
    }

    /// ReadIDList, one page from `offset`
    pub(super) fn read_id_list(&self, t: &TlvMap) -> Result<Response, Error> {
        let offset = t.u16(Tag::Tag1)? as usize;
        let filter = match t.u8(Tag::Tag2)? {
            FILTER_ALL => None,
            f => Some(SecObjType::try_from(f).map_err(|_| Error::InvalidData("object type filter"))?),
        };

        let ids = self.store.ids(filter);
        let page: Vec<u32> = ids.iter().skip(offset).take(ID_LIST_PAGE).copied().collect();
        let more = offset + page.len() < ids.len();

        let mut b = vec![0u8; page.len() * 4];
        for (c, id) in b.chunks_mut(4).zip(&page) {
            BigEndian::write_u32(c, *id);
        }

        tlv_response(
            TlvWriter::new()
                .u8(Tag::Tag1, se_result(more))
                .bytes(Tag::Tag2, &b),
        )
    }

    /// ReadObjectAttributes
    pub(super) fn read_attributes(&self, t: &TlvMap) -> Result<Response, Error> {
        let o = self.store.get(t.u32(Tag::Tag1)?)?;
        tlv_response(TlvWriter::new().bytes(Tag::Tag1, &encoded(&o.attributes())?))
    }

    /// ReadECCurveList
    pub(super) fn read_curve_list(&self) -> Result<Response, Error> {
        tlv_response(TlvWriter::new().bytes(Tag::Tag1, &self.store.curve_list()))
    }

    /// GetECCurveID
    pub(super) fn read_curve_id(&self, t: &TlvMap) -> Result<Response, Error> {
        let o = self.store.get(t.u32(Tag::Tag1)?)?;
        match &o.content {
            Content::Ec(m) => tlv_response(TlvWriter::new().u8(Tag::Tag1, m.curve.into())),
            _ => Err(Error::InvalidData("not an EC key")),
        }
    }

    /// CreateECCurve
    pub(super) fn create_curve(&mut self, t: &TlvMap) -> Result<Response, Error> {
        self.store.create_curve(curve(t)?)?;
        done()
    }
}

/// Curve identifier from Tag1
pub(super) fn curve(t: &TlvMap) -> Result<EcCurve, Error> {
    EcCurve::try_from(t.u8(Tag::Tag1)?).map_err(|_| Error::InvalidData("curve id"))
}
