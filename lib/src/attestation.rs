// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Attested reads and host-side attestation verification

use log::{debug, error};
use p256::ecdsa::{signature::hazmat::PrehashVerifier, Signature, VerifyingKey};
use sha2::{Digest, Sha256};

pub use se05x_apdu::attestation::{AttestationLayout, AttestationRecord, ATTEST_RANDOM_LEN};
use se05x_apdu::{
    ids,
    types::{EcSignatureAlgo, Instruction, RsaKeyComponent, SecObjType, INS_ATTEST, P1, P2},
    Command, Exchange, Tag, TlvWriter,
};

use crate::{api::command, Error, Session};

/// Attestation parameters for an attested read
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AttestParams {
    /// Attestation key object
    pub key: u32,
    pub algo: EcSignatureAlgo,
    /// Host freshness random
    pub random: [u8; ATTEST_RANDOM_LEN],
}

impl AttestParams {
    /// Attest with the element attestation key and a fresh random
    pub fn new(algo: EcSignatureAlgo) -> Self {
        Self {
            key: ids::ATTESTATION_KEY,
            algo,
            random: rand::random(),
        }
    }
}

/// Result of an attested read
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttestedRead {
    pub params: AttestParams,
    pub record: AttestationRecord,
}

impl AttestedRead {
    /// Data returned by the read
    pub fn data(&self) -> &[u8] {
        &self.record.data
    }
}

/// Verify an attested read against an attestation public key (SEC1 encoded
/// NIST P-256 point).
///
/// The signed message is always prehashed with SHA-256 and, for the TLV
/// layout, binds the command echoed back by the element.
pub fn verify_record(public: &[u8], read: &AttestedRead) -> Result<(), Error> {
    if read.params.algo != EcSignatureAlgo::Sha256 {
        error!("Cannot verify attestation using {}", read.params.algo);
        return Err(Error::Unsupported("attestation algorithm"));
    }

    let key = VerifyingKey::from_sec1_bytes(public).map_err(|_| {
        error!("Invalid attestation public key");
        Error::Attestation
    })?;

    if read.record.layout == AttestationLayout::Flat
        && read.record.out_random != read.params.random
    {
        error!("Attestation random mismatch");
        return Err(Error::Attestation);
    }

    let m = read.record.signed_message()?;
    let h = Sha256::digest(&m);

    let sig = Signature::from_der(&read.record.signature).map_err(|_| Error::Attestation)?;

    key.verify_prehash(&h, &sig).map_err(|_| {
        error!("Attestation signature verification failed");
        Error::Attestation
    })
}

/// Verify an attested read using the element attestation key.
///
/// The attestation public key is fetched from the attestation object and
/// held on the host only for the duration of the check. RSA attestation
/// keys are rejected.
pub async fn verify_attestation<T: Exchange + Send + Sync>(
    session: &Session<T>,
    read: &AttestedRead,
) -> Result<(), Error> {
    debug!(
        "Verifying attestation from 0x{:08x} ({})",
        read.params.key, read.record.layout
    );

    let (obj_type, _) = session.read_type(read.params.key).await?;
    match obj_type {
        SecObjType::EcKeyPair | SecObjType::EcPubKey => (),
        SecObjType::RsaKeyPair
        | SecObjType::RsaKeyPairCrt
        | SecObjType::RsaPrivKey
        | SecObjType::RsaPrivKeyCrt
        | SecObjType::RsaPubKey => {
            error!("RSA attestation key 0x{:08x}", read.params.key);
            return Err(Error::Unsupported("RSA attestation key"));
        }
        _ => return Err(Error::InvalidArgument("attestation key type")),
    }

    let public = session.read_object(read.params.key, None, None).await?;

    verify_record(&public, read)
}

impl<T: Exchange + Send + Sync> Session<T> {
    /// Read an object with attestation
    pub async fn read_object_attested(
        &self,
        id: u32,
        offset: Option<u16>,
        len: Option<u16>,
        component: Option<RsaKeyComponent>,
        params: &AttestParams,
    ) -> Result<AttestedRead, Error> {
        let cmd: Command = command(
            u8::from(Instruction::Read) | INS_ATTEST,
            P1::Default,
            P2::Default,
        )
        .with_tlv(
            TlvWriter::new()
                .u32(Tag::Tag1, id)
                .opt_u16(Tag::Tag2, offset)
                .opt_u16(Tag::Tag3, len)
                .opt_u8(Tag::Tag4, component.map(u8::from))
                .u32(Tag::Tag5, params.key)
                .u8(Tag::Tag6, params.algo.into())
                .bytes(Tag::Tag7, &params.random),
        )?
        .expect_response();

        let layout = self.attestation_layout().await;

        let r = self.call(cmd).await?;
        let record = AttestationRecord::decode(layout, &r.data)?;

        Ok(AttestedRead {
            params: *params,
            record,
        })
    }
}

#[cfg(test)]
mod test {
    use p256::ecdsa::{signature::hazmat::PrehashSigner, SigningKey};
    use rand_core::OsRng;

    use super::*;

    fn signed(layout: AttestationLayout, key: &SigningKey) -> AttestedRead {
        let params = AttestParams::new(EcSignatureAlgo::Sha256);

        let mut record = AttestationRecord {
            layout,
            data: vec![0xAB; 32],
            chip_id: vec![0x01; 18],
            attributes: vec![0x02; 15],
            obj_size: Some(32),
            timestamp: vec![0x03; 12],
            out_random: params.random.to_vec(),
            cmd: vec![0x80, 0x22, 0x00, 0x00, 0x00],
            signature: vec![],
        };
        if layout == AttestationLayout::Tlv {
            record.out_random.clear();
        } else {
            record.obj_size = None;
            record.cmd.clear();
        }

        let m = record.signed_message().unwrap();
        let h = Sha256::digest(&m);
        let sig: Signature = key.sign_prehash(&h).unwrap();
        record.signature = sig.to_der().as_bytes().to_vec();

        AttestedRead { params, record }
    }

    #[test]
    fn verify_both_layouts() {
        let key = SigningKey::random(&mut OsRng);
        let public = key.verifying_key().to_encoded_point(false);

        for layout in [AttestationLayout::Tlv, AttestationLayout::Flat] {
            let mut r = signed(layout, &key);
            verify_record(public.as_bytes(), &r).unwrap();

            r.record.data[0] ^= 0xFF;
            assert!(matches!(
                verify_record(public.as_bytes(), &r),
                Err(Error::Attestation)
            ));
        }
    }

    #[test]
    fn flat_random_mismatch() {
        let key = SigningKey::random(&mut OsRng);
        let public = key.verifying_key().to_encoded_point(false);

        let mut r = signed(AttestationLayout::Flat, &key);
        r.params.random[0] ^= 0x01;

        assert!(matches!(
            verify_record(public.as_bytes(), &r),
            Err(Error::Attestation)
        ));
    }

    #[test]
    fn tlv_command_is_bound() {
        let key = SigningKey::random(&mut OsRng);
        let public = key.verifying_key().to_encoded_point(false);

        let mut r = signed(AttestationLayout::Tlv, &key);
        r.record.cmd[1] ^= 0x01;

        assert!(matches!(
            verify_record(public.as_bytes(), &r),
            Err(Error::Attestation)
        ));
    }

    #[test]
    fn only_sha256_attestation() {
        let key = SigningKey::random(&mut OsRng);
        let public = key.verifying_key().to_encoded_point(false);

        let mut r = signed(AttestationLayout::Tlv, &key);
        r.params.algo = EcSignatureAlgo::Sha384;

        assert!(matches!(
            verify_record(public.as_bytes(), &r),
            Err(Error::Unsupported(_))
        ));
    }
}
