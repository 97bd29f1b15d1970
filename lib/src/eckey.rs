// Copyright (c) 2022-2023 The MobileCoin Foundation

//! ECKey session authentication (host side)

use log::{debug, error};
use p256::{
    ecdh::EphemeralSecret,
    ecdsa::{signature::Signer, Signature, SigningKey},
    EncodedPoint, PublicKey, SecretKey,
};
use rand_core::OsRng;

use se05x_apdu::{
    eckey::{self, INS_INTERNAL_AUTHENTICATE},
    ids,
    scp03::SecureMessaging,
    types::EcSignatureAlgo,
    Command, Exchange,
};

use crate::{
    attestation::{verify_attestation, AttestParams},
    Error, Session,
};

/// Read and attest the element ECKA public key
pub(crate) async fn read_element_key<T: Exchange + Send + Sync>(
    session: &Session<T>,
) -> Result<Vec<u8>, Error> {
    let params = AttestParams::new(EcSignatureAlgo::Sha256);

    let read = session
        .read_object_attested(ids::KP_ECKEY_USER, None, None, None, &params)
        .await?;

    verify_attestation(session, &read).await?;

    debug!("Element ECKA key: {}", hex::encode(read.data()));

    Ok(read.record.data)
}

/// Run INTERNAL AUTHENTICATE, returning the session secure messaging
/// context on success
pub(crate) async fn authenticate<T: Exchange + Send + Sync>(
    session: &Session<T>,
    host_key: &SecretKey,
    element_key: &[u8],
) -> Result<SecureMessaging, Error> {
    let element_key = PublicKey::from_sec1_bytes(element_key)
        .map_err(|_| Error::Auth("invalid element ECKA key"))?;

    let ephemeral = EphemeralSecret::random(&mut OsRng);
    let ephemeral_public = EncodedPoint::from(ephemeral.public_key());

    let signer = SigningKey::from(host_key);
    let sig: Signature = signer.sign(&eckey::signed_message(ephemeral_public.as_bytes()));

    let body = eckey::encode_request(ephemeral_public.as_bytes(), sig.to_der().as_bytes())?;
    let cmd = Command::new(INS_INTERNAL_AUTHENTICATE, 0x00, 0x00)
        .with_data(body)
        .expect_response();

    let r = session.call(cmd).await?;
    let (challenge, receipt) = eckey::decode_response(&r.data)?;

    let shared = ephemeral.diffie_hellman(&element_key);
    let derived = eckey::derive(
        shared.raw_secret_bytes().as_slice(),
        &challenge,
        ephemeral_public.as_bytes(),
    )?;

    if derived.receipt != receipt {
        error!("ECKey receipt mismatch");
        return Err(Error::Auth("receipt mismatch"));
    }

    Ok(SecureMessaging::new(derived.keys, derived.receipt))
}
