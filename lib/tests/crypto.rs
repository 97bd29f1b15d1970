// Copyright (c) 2022-2023 The MobileCoin Foundation

use p256::ecdsa::{signature::Verifier, Signature, VerifyingKey};
use pkcs8::{DecodePublicKey, EncodePublicKey};
use rand_core::OsRng;
use sha2::{Digest as _, Sha256};

use se05x_sss::{
    apdu::{ids, types::HkdfMode},
    engine::{Aead, AeadOutput, Asymmetric, DeriveKey, DeriveSalt, Digest, Mac, Rng, Symmetric},
    Algorithm, CcmLengths, CipherType, Error, KeyPart, Mode,
};

mod helpers;
use helpers::{handle, setup, Sim};

const AES_KEY: [u8; 16] = [
    0x2b, 0x7e, 0x15, 0x16, 0x28, 0xae, 0xd2, 0xa6, 0xab, 0xf7, 0x15, 0x88, 0x09, 0xcf, 0x4f, 0x3c,
];

fn host_cbc(key: &[u8; 16], iv: &[u8; 16], data: &[u8]) -> Vec<u8> {
    use cbc::cipher::{block_padding::NoPadding, BlockEncryptMut, KeyIvInit};

    cbc::Encryptor::<aes::Aes128>::new(key.into(), iv.into()).encrypt_padded_vec_mut::<NoPadding>(data)
}

fn host_ecb256(key: &[u8], block: &[u8; 16]) -> anyhow::Result<Vec<u8>> {
    use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};

    let c = aes::Aes256::new_from_slice(key).map_err(|_| anyhow::anyhow!("invalid AES key"))?;
    let mut b = GenericArray::clone_from_slice(block);
    c.encrypt_block(&mut b);
    Ok(b.to_vec())
}

fn host_cmac(key: &[u8], data: &[u8]) -> anyhow::Result<Vec<u8>> {
    use cmac::{Cmac, Mac};

    let mut m = Cmac::<aes::Aes128>::new_from_slice(key).map_err(|_| anyhow::anyhow!("invalid CMAC key"))?;
    m.update(data);
    Ok(m.finalize().into_bytes().to_vec())
}

fn host_hmac(key: &[u8], data: &[u8]) -> anyhow::Result<Vec<u8>> {
    use hmac::{Hmac, Mac};

    let mut m = Hmac::<Sha256>::new_from_slice(key).map_err(|_| anyhow::anyhow!("invalid HMAC key"))?;
    m.update(data);
    Ok(m.finalize().into_bytes().to_vec())
}

async fn aes_key(store: &se05x_sss::KeyStore<Sim>, id: u32) -> anyhow::Result<se05x_sss::KeyObject> {
    let k = handle(store, id, KeyPart::Default, CipherType::Aes, 128).await?;
    store.set_key(&k, &AES_KEY, 128, None).await?;
    Ok(k)
}

#[tokio::test]
async fn ecdsa_sign_verify() -> anyhow::Result<()> {
    let (_sim, store) = setup().await?;

    let key = handle(&store, 0x7800_0001, KeyPart::Pair, CipherType::EcNistP, 256).await?;
    store.generate_key(&key, 256, None).await?;

    let (spki, _) = store.get_key(&key, 256).await?;
    let public = p256::PublicKey::from_public_key_der(&spki)?;

    let message = b"sign me please";

    let signer = Asymmetric::new(&store, &key, Algorithm::EcdsaSha256, Mode::Sign)?;
    let sig = signer.sign(message).await?;

    // Host verification of the element signature
    VerifyingKey::from(&public).verify(message, &Signature::from_der(&sig)?)?;

    let verifier = Asymmetric::new(&store, &key, Algorithm::EcdsaSha256, Mode::Verify)?;
    assert!(verifier.verify(message, &sig).await?);
    assert!(!verifier.verify(b"something else", &sig).await?);

    // Digest length must match the algorithm
    assert!(matches!(
        signer.sign_digest(&[0u8; 20]).await,
        Err(Error::InvalidArgument(_))
    ));

    // Operations must match the context mode
    assert!(matches!(
        signer.verify(message, &sig).await,
        Err(Error::InvalidArgument(_))
    ));

    // EdDSA is not available on NIST keys
    assert!(matches!(
        Asymmetric::new(&store, &key, Algorithm::EdDsa, Mode::Sign),
        Err(Error::Unsupported(_))
    ));

    Ok(())
}

#[tokio::test]
async fn eddsa_sign_verify() -> anyhow::Result<()> {
    let (_sim, store) = setup().await?;

    let key = handle(&store, 0x7800_0002, KeyPart::Pair, CipherType::EcTwistedEd, 256).await?;
    store.generate_key(&key, 256, None).await?;

    let (spki, _) = store.get_key(&key, 256).await?;
    let public = ed25519_dalek::VerifyingKey::from_public_key_der(&spki)?;

    let message = b"an arbitrary length message, signed without prehashing";

    let signer = Asymmetric::new(&store, &key, Algorithm::EdDsa, Mode::Sign)?;
    let sig = signer.sign(message).await?;
    assert_eq!(sig.len(), 64);

    // Signatures are returned in host byte order
    public.verify_strict(message, &ed25519_dalek::Signature::from_slice(&sig)?)?;

    let verifier = Asymmetric::new(&store, &key, Algorithm::EdDsa, Mode::Verify)?;
    assert!(verifier.verify(message, &sig).await?);

    let mut bad = sig.clone();
    bad[0] ^= 0x01;
    assert!(!verifier.verify(message, &bad).await?);

    Ok(())
}

#[tokio::test]
async fn rsa_sign_and_encrypt() -> anyhow::Result<()> {
    use pkcs1::EncodeRsaPrivateKey;
    use rsa::{Pkcs1v15Encrypt, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};

    let (_sim, store) = setup().await?;

    let host = RsaPrivateKey::new(&mut OsRng, 1024)?;
    let der = host.to_pkcs1_der()?;

    let key = handle(&store, 0x7800_0003, KeyPart::Pair, CipherType::Rsa, 1024).await?;
    store.set_key(&key, der.as_bytes(), 1024, None).await?;

    let (spki, bits) = store.get_key(&key, 1024).await?;
    assert_eq!(bits, 1024);
    assert_eq!(RsaPublicKey::from_public_key_der(&spki)?, host.to_public_key());

    let message = b"rsa signed message";

    let signer = Asymmetric::new(&store, &key, Algorithm::RsaPkcs1Sha256, Mode::Sign)?;
    let sig = signer.sign(message).await?;

    host.to_public_key()
        .verify(Pkcs1v15Sign::new::<Sha256>(), &Sha256::digest(message), &sig)?;

    let verifier = Asymmetric::new(&store, &key, Algorithm::RsaPkcs1Sha256, Mode::Verify)?;
    assert!(verifier.verify(message, &sig).await?);

    // PSS round trip on the element
    let signer = Asymmetric::new(&store, &key, Algorithm::RsaPssSha256, Mode::Sign)?;
    let sig = signer.sign(message).await?;
    let verifier = Asymmetric::new(&store, &key, Algorithm::RsaPssSha256, Mode::Verify)?;
    assert!(verifier.verify(message, &sig).await?);

    // Host encrypt, element decrypt
    let ct = host
        .to_public_key()
        .encrypt(&mut OsRng, Pkcs1v15Encrypt, b"secret")?;
    let dec = Asymmetric::new(&store, &key, Algorithm::RsaPkcs1v15, Mode::Decrypt)?;
    assert_eq!(dec.decrypt(&ct).await?, b"secret".to_vec());

    // Element encrypt, host decrypt
    let enc = Asymmetric::new(&store, &key, Algorithm::RsaPkcs1v15, Mode::Encrypt)?;
    let ct = enc.encrypt(b"another secret").await?;
    assert_eq!(host.decrypt(Pkcs1v15Encrypt, &ct)?, b"another secret".to_vec());

    Ok(())
}

#[tokio::test]
async fn ecdaa_random_keys() -> anyhow::Result<()> {
    let (_sim, store) = setup().await?;

    let key = handle(&store, 0x7800_0004, KeyPart::Pair, CipherType::EcBarretoNaehrig, 256).await?;
    store.generate_key(&key, 256, None).await?;

    // Key generation provisions the random key
    assert!(store.session().check_object_exists(ids::ECDAA_RANDOM_START).await?);

    let signer = Asymmetric::new(&store, &key, Algorithm::Ecdaa, Mode::Sign)?;

    let digest = Sha256::digest(b"ecdaa message");
    let a = signer.sign_digest(&digest).await?;
    let b = signer.sign_digest(&digest).await?;

    // Each signature consumes a fresh random key
    assert!(!a.is_empty());
    assert_ne!(a, b);

    let verifier = Asymmetric::new(&store, &key, Algorithm::Ecdaa, Mode::Verify)?;
    assert!(matches!(
        verifier.verify_digest(&digest, &a).await,
        Err(Error::Unsupported(_))
    ));

    Ok(())
}

#[tokio::test]
async fn aes_cbc() -> anyhow::Result<()> {
    let (_sim, store) = setup().await?;
    let key = aes_key(&store, 0x7900_0001).await?;

    let iv = [0x0Fu8; 16];
    let data: Vec<u8> = (0..64u8).collect();
    let expected = host_cbc(&AES_KEY, &iv, &data);

    let enc = Symmetric::new(&store, &key, Algorithm::AesCbc, Mode::Encrypt)?;
    let (ct, generated) = enc.one_go(Some(&iv), &data).await?;
    assert_eq!(ct, expected);
    assert_eq!(generated, None);

    // Unaligned single shot input is rejected on the host
    assert!(matches!(
        enc.one_go(Some(&iv), &data[..17]).await,
        Err(Error::InvalidArgument(_))
    ));

    // Streaming with unaligned updates
    let mut enc = Symmetric::new(&store, &key, Algorithm::AesCbc, Mode::Encrypt)?;
    enc.init(Some(&iv)).await?;
    let mut out = enc.update(&data[..20]).await?;
    out.extend(enc.update(&data[20..50]).await?);
    out.extend(enc.finish(&data[50..]).await?);
    enc.free().await?;
    assert_eq!(out, expected);

    let dec = Symmetric::new(&store, &key, Algorithm::AesCbc, Mode::Decrypt)?;
    assert_eq!(dec.one_go(Some(&iv), &ct).await?.0, data);

    // Crypto objects are released by free
    assert!(store.session().read_crypto_object_list().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn aes_ctr() -> anyhow::Result<()> {
    let (sim, store) = setup().await?;
    let key = aes_key(&store, 0x7900_0002).await?;

    let data = [0x5Au8; 32];

    // Element generated counter block
    let enc = Symmetric::new(&store, &key, Algorithm::AesCtrIntIv, Mode::Encrypt)?;
    let (ct, iv) = enc.one_go(None, &data).await?;
    let iv = iv.ok_or(anyhow::anyhow!("missing generated IV"))?;
    assert_eq!(iv.len(), 16);

    let dec = Symmetric::new(&store, &key, Algorithm::AesCtr, Mode::Decrypt)?;
    assert_eq!(dec.one_go(Some(&iv), &ct).await?.0, data.to_vec());

    // Decryption with an element IV is refused before reaching the element
    let before = sim.element().await.history().to_vec();

    let mut dec = Symmetric::new(&store, &key, Algorithm::AesCtrIntIv, Mode::Decrypt)?;
    assert!(matches!(dec.one_go(None, &ct).await, Err(Error::Unsupported(_))));
    assert!(matches!(dec.init(None).await, Err(Error::Unsupported(_))));
    dec.free().await?;

    assert_eq!(sim.element().await.history(), &before[..]);

    // Arbitrary length CTR
    let counter = [0u8; 16];
    let msg = b"twenty byte message!";
    let enc = Symmetric::new(&store, &key, Algorithm::AesCtr, Mode::Encrypt)?;
    let ct = enc.crypt_ctr(&counter, msg).await?;
    assert_eq!(ct.len(), msg.len());

    let dec = Symmetric::new(&store, &key, Algorithm::AesCtr, Mode::Decrypt)?;
    assert_eq!(dec.crypt_ctr(&counter, &ct).await?, msg.to_vec());

    Ok(())
}

#[tokio::test]
async fn aes_gcm() -> anyhow::Result<()> {
    let (_sim, store) = setup().await?;
    let key = aes_key(&store, 0x7900_0003).await?;

    let iv = [0x01u8; 12];
    let aad = b"header data";
    let data: Vec<u8> = (0..100u8).collect();

    let enc = Aead::new(&store, &key, Algorithm::AesGcm, Mode::Encrypt)?;
    let (ct, tag) = match enc.one_go(Some(&iv), aad, &data, None).await? {
        AeadOutput::Sealed { data, tag, iv: None } => (data, tag),
        r => anyhow::bail!("unexpected output: {:?}", r),
    };
    assert_eq!(ct.len(), data.len());
    assert_eq!(tag.len(), 16);

    // Streaming matches the single shot output
    let mut enc = Aead::new(&store, &key, Algorithm::AesGcm, Mode::Encrypt)?;
    enc.init(Some(&iv), None).await?;
    enc.update_aad(aad).await?;
    let mut out = enc.update(&data[..33]).await?;
    out.extend(enc.update(&data[33..70]).await?);
    match enc.finish(&data[70..], None).await? {
        AeadOutput::Sealed { data, tag: t, .. } => {
            out.extend(data);
            assert_eq!(t, tag);
        }
        r => anyhow::bail!("unexpected output: {:?}", r),
    }
    enc.free().await?;
    assert_eq!(out, ct);

    let dec = Aead::new(&store, &key, Algorithm::AesGcm, Mode::Decrypt)?;
    assert_eq!(
        dec.one_go(Some(&iv), aad, &ct, Some(&tag)).await?,
        AeadOutput::Opened(data.clone())
    );

    let mut bad = tag.clone();
    bad[3] ^= 0x80;
    assert_eq!(
        dec.one_go(Some(&iv), aad, &ct, Some(&bad)).await?,
        AeadOutput::Rejected
    );

    // Tags are required for decryption
    assert!(matches!(
        dec.one_go(Some(&iv), aad, &ct, None).await,
        Err(Error::InvalidArgument(_))
    ));

    // Element generated IV
    let enc = Aead::new(&store, &key, Algorithm::AesGcmIntIv, Mode::Encrypt)?;
    let (ct, tag, iv) = match enc.one_go(None, aad, &data, None).await? {
        AeadOutput::Sealed {
            data,
            tag,
            iv: Some(iv),
        } => (data, tag, iv),
        r => anyhow::bail!("unexpected output: {:?}", r),
    };
    assert_eq!(
        dec.one_go(Some(&iv), aad, &ct, Some(&tag)).await?,
        AeadOutput::Opened(data)
    );

    Ok(())
}

#[tokio::test]
async fn aes_ccm() -> anyhow::Result<()> {
    let (_sim, store) = setup().await?;
    let key = aes_key(&store, 0x7900_0004).await?;

    let nonce = [0x07u8; 13];
    let aad = b"ccm header";
    let data = b"ccm protected payload, longer than one block".to_vec();
    let lengths = CcmLengths {
        aad: aad.len() as u16,
        payload: data.len() as u16,
    };

    // Single shot CCM is not available
    let enc = Aead::new(&store, &key, Algorithm::AesCcm, Mode::Encrypt)?;
    assert!(matches!(
        enc.one_go(Some(&nonce), aad, &data, None).await,
        Err(Error::Unsupported(_))
    ));

    // Lengths must be declared up front
    let mut enc = Aead::new(&store, &key, Algorithm::AesCcm, Mode::Encrypt)?;
    assert!(matches!(
        enc.init(Some(&nonce), None).await,
        Err(Error::InvalidArgument(_))
    ));

    enc.init(Some(&nonce), Some(lengths)).await?;
    enc.update_aad(aad).await?;
    assert!(enc.update(&data[..10]).await?.is_empty());
    let (ct, tag) = match enc.finish(&data[10..], None).await? {
        AeadOutput::Sealed { data, tag, .. } => (data, tag),
        r => anyhow::bail!("unexpected output: {:?}", r),
    };
    enc.free().await?;
    assert_eq!(ct.len(), data.len());

    let mut dec = Aead::new(&store, &key, Algorithm::AesCcm, Mode::Decrypt)?;
    dec.init(Some(&nonce), Some(lengths)).await?;
    dec.update_aad(aad).await?;
    assert_eq!(
        dec.finish(&ct, Some(&tag)).await?,
        AeadOutput::Opened(data.clone())
    );
    dec.free().await?;

    Ok(())
}

#[tokio::test]
async fn mac_operations() -> anyhow::Result<()> {
    let (_sim, store) = setup().await?;

    let data: Vec<u8> = (0..200u8).collect();

    // AES CMAC
    let key = aes_key(&store, 0x7A00_0001).await?;
    let expected = host_cmac(&AES_KEY, &data)?;

    let m = Mac::new(&store, &key, Algorithm::Cmac128, Mode::Mac)?;
    assert_eq!(m.one_go(&data).await?, expected);

    let mut m = Mac::new(&store, &key, Algorithm::Cmac128, Mode::Mac)?;
    m.init().await?;
    m.update(&data[..77]).await?;
    assert_eq!(m.finish(&data[77..]).await?, expected);
    m.free().await?;

    let v = Mac::new(&store, &key, Algorithm::Cmac128, Mode::MacValidate)?;
    assert!(v.one_go_validate(&data, &expected).await?);
    assert!(!v.one_go_validate(&data[1..], &expected).await?);

    // Validation contexts cannot generate
    assert!(matches!(v.one_go(&data).await, Err(Error::InvalidArgument(_))));

    let mut v = Mac::new(&store, &key, Algorithm::Cmac128, Mode::MacValidate)?;
    v.init().await?;
    v.update(&data[..100]).await?;
    assert!(v.finish_validate(&data[100..], &expected).await?);
    v.free().await?;

    // HMAC SHA-256
    let hmac_key = [0x0Bu8; 32];
    let hk = handle(&store, 0x7A00_0002, KeyPart::Default, CipherType::Hmac, 256).await?;
    store.set_key(&hk, &hmac_key, 256, None).await?;

    let m = Mac::new(&store, &hk, Algorithm::HmacSha256, Mode::Mac)?;
    assert_eq!(m.one_go(&data).await?, host_hmac(&hmac_key, &data)?);

    // Key type must match the algorithm
    assert!(matches!(
        Mac::new(&store, &hk, Algorithm::Cmac128, Mode::Mac),
        Err(Error::InvalidArgument(_))
    ));

    Ok(())
}

#[tokio::test]
async fn digests_and_random() -> anyhow::Result<()> {
    let (_sim, store) = setup().await?;
    let s = store.session();

    let small = b"abc";
    let mut d = Digest::new(s, Algorithm::Sha256, Mode::Digest)?;
    assert_eq!(d.output_len(), 32);
    assert_eq!(d.one_go(small).await?, Sha256::digest(small).to_vec());

    // Large inputs are streamed
    let large: Vec<u8> = (0..1500u32).map(|i| i as u8).collect();
    let mut d = Digest::new(s, Algorithm::Sha256, Mode::Digest)?;
    assert_eq!(d.one_go(&large).await?, Sha256::digest(&large).to_vec());
    d.free().await?;

    let mut d = Digest::new(s, Algorithm::Sha256, Mode::Digest)?;
    d.init().await?;
    d.update(&large[..600]).await?;
    assert_eq!(s.read_crypto_object_list().await?.len(), 1);
    assert_eq!(d.finish(&large[600..]).await?, Sha256::digest(&large).to_vec());
    d.free().await?;

    assert!(s.read_crypto_object_list().await?.is_empty());

    assert!(matches!(
        Digest::new(s, Algorithm::AesCbc, Mode::Digest),
        Err(Error::Unsupported(_))
    ));

    // Random requests larger than one command are split
    let r = Rng::new(s).get(1200).await?;
    assert_eq!(r.len(), 1200);
    assert!(r.iter().any(|b| *b != 0));

    Ok(())
}

#[tokio::test]
async fn hkdf_derivation() -> anyhow::Result<()> {
    let (_sim, store) = setup().await?;

    // RFC 5869 test case 1
    let ikm = [0x0Bu8; 22];
    let salt: Vec<u8> = (0x00..=0x0Cu8).collect();
    let info: Vec<u8> = (0xF0..=0xF9u8).collect();
    let okm = hex::decode(
        "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865",
    )?;

    let ik = handle(&store, 0x7B00_0001, KeyPart::Default, CipherType::Hmac, 176).await?;
    store.set_key(&ik, &ikm, 176, None).await?;

    let kdf = DeriveKey::new(&store, &ik, Algorithm::HmacSha256, Mode::DeriveKey)?;
    assert_eq!(kdf.derive(DeriveSalt::Bytes(&salt), &info, 42).await?, okm);

    assert!(matches!(
        kdf.derive(DeriveSalt::None, &info, 0).await,
        Err(Error::InvalidArgument(_))
    ));

    // Salt held in an element object
    let sk = handle(&store, 0x7B00_0002, KeyPart::Default, CipherType::Hmac, 104).await?;
    store.set_key(&sk, &salt, 104, None).await?;
    assert_eq!(kdf.derive(DeriveSalt::Object(&sk), &info, 42).await?, okm);

    // Output kept on the element, checked through an HMAC with the result
    let dest = handle(&store, 0x7B00_0003, KeyPart::Default, CipherType::Hmac, 256).await?;
    store.set_key(&dest, &[0u8; 32], 256, None).await?;

    kdf.one_go(
        DeriveSalt::Bytes(&salt),
        &info,
        HkdfMode::ExtractAndExpand,
        &store,
        &dest,
        32,
    )
    .await?;

    let m = Mac::new(&store, &dest, Algorithm::HmacSha256, Mode::Mac)?;
    assert_eq!(m.one_go(b"check").await?, host_hmac(&okm[..32], b"check")?);

    // Output to a new object goes through the host
    let mut expected = [0u8; 32];
    hkdf::Hkdf::<Sha256>::new(None, &ikm)
        .expand(b"aes", &mut expected)
        .map_err(|_| anyhow::anyhow!("HKDF expand failed"))?;

    let aes = handle(&store, 0x7B00_0004, KeyPart::Default, CipherType::Aes, 256).await?;
    kdf.derive_key_go(&[], b"aes", &store, &aes, 32).await?;

    let block = [0x42u8; 16];
    let e = Symmetric::new(&store, &aes, Algorithm::AesEcb, Mode::Encrypt)?;
    assert_eq!(e.one_go(None, &block).await?.0, host_ecb256(&expected, &block)?);

    Ok(())
}

#[tokio::test]
async fn ecdh_shared_secret() -> anyhow::Result<()> {
    let (_sim, store) = setup().await?;

    let key = handle(&store, 0x7C00_0001, KeyPart::Pair, CipherType::EcNistP, 256).await?;
    store.generate_key(&key, 256, None).await?;
    let element_public = p256::PublicKey::from_public_key_der(&store.get_key(&key, 256).await?.0)?;

    let peer = p256::SecretKey::random(&mut OsRng);
    let peer_spki = peer.public_key().to_public_key_der()?;

    let shared = p256::ecdh::diffie_hellman(peer.to_nonzero_scalar(), element_public.as_affine());
    let shared = shared.raw_secret_bytes().to_vec();

    let dh = DeriveKey::new(&store, &key, Algorithm::Ecdh, Mode::ComputeSharedSecret)?;

    // Secret stays on the element
    let dest = handle(&store, 0x7C00_0002, KeyPart::Default, CipherType::Hmac, 256).await?;
    store.set_key(&dest, &[0u8; 32], 256, None).await?;
    dh.dh(peer_spki.as_bytes(), &store, &dest).await?;

    let m = Mac::new(&store, &dest, Algorithm::HmacSha256, Mode::Mac)?;
    assert_eq!(m.one_go(b"agreed").await?, host_hmac(&shared, b"agreed")?);

    // Secret written to a new object through the host
    let aes = handle(&store, 0x7C00_0003, KeyPart::Default, CipherType::Aes, 256).await?;
    dh.dh(peer_spki.as_bytes(), &store, &aes).await?;

    let block = [0x24u8; 16];
    let e = Symmetric::new(&store, &aes, Algorithm::AesEcb, Mode::Encrypt)?;
    assert_eq!(e.one_go(None, &block).await?.0, host_ecb256(&shared, &block)?);

    // Key agreement contexts cannot run HKDF
    assert!(matches!(
        dh.derive(DeriveSalt::None, b"", 16).await,
        Err(Error::InvalidArgument(_))
    ));

    // Public keys cannot agree
    let public = handle(&store, 0x7C00_0004, KeyPart::Public, CipherType::EcNistP, 256).await?;
    assert!(matches!(
        DeriveKey::new(&store, &public, Algorithm::Ecdh, Mode::ComputeSharedSecret),
        Err(Error::InvalidArgument(_))
    ));

    Ok(())
}

#[tokio::test]
async fn streaming_split_points() -> anyhow::Result<()> {
    let (_sim, store) = setup().await?;
    let key = aes_key(&store, 0x7D00_0001).await?;

    // CBC
    let iv = [0x0Fu8; 16];
    let data: Vec<u8> = (0..48u8).collect();
    let expected = host_cbc(&AES_KEY, &iv, &data);

    for i in 0..=data.len() {
        let mut enc = Symmetric::new(&store, &key, Algorithm::AesCbc, Mode::Encrypt)?;
        enc.init(Some(&iv)).await?;
        let mut out = enc.update(&data[..i]).await?;
        out.extend(enc.finish(&data[i..]).await?);
        enc.free().await?;
        assert_eq!(out, expected, "CBC split at {}", i);
    }

    // GCM
    let nonce = [0x01u8; 12];
    let aad = b"split header";
    let data: Vec<u8> = (0..40u8).collect();

    let enc = Aead::new(&store, &key, Algorithm::AesGcm, Mode::Encrypt)?;
    let (ct, tag) = match enc.one_go(Some(&nonce), aad, &data, None).await? {
        AeadOutput::Sealed { data, tag, .. } => (data, tag),
        r => anyhow::bail!("unexpected output: {:?}", r),
    };

    for i in 0..=data.len() {
        let mut enc = Aead::new(&store, &key, Algorithm::AesGcm, Mode::Encrypt)?;
        enc.init(Some(&nonce), None).await?;
        enc.update_aad(aad).await?;
        let mut out = enc.update(&data[..i]).await?;
        match enc.finish(&data[i..], None).await? {
            AeadOutput::Sealed { data, tag: t, .. } => {
                out.extend(data);
                assert_eq!(t, tag, "GCM tag split at {}", i);
            }
            r => anyhow::bail!("unexpected output: {:?}", r),
        }
        enc.free().await?;
        assert_eq!(out, ct, "GCM split at {}", i);
    }

    // CCM
    let nonce = [0x07u8; 13];
    let data = b"ccm payload split at every offset".to_vec();
    let lengths = CcmLengths {
        aad: aad.len() as u16,
        payload: data.len() as u16,
    };

    let mut sealed = None;
    for i in 0..=data.len() {
        let mut enc = Aead::new(&store, &key, Algorithm::AesCcm, Mode::Encrypt)?;
        enc.init(Some(&nonce), Some(lengths)).await?;
        enc.update_aad(aad).await?;
        let mut out = enc.update(&data[..i]).await?;
        let tag = match enc.finish(&data[i..], None).await? {
            AeadOutput::Sealed { data, tag, .. } => {
                out.extend(data);
                tag
            }
            r => anyhow::bail!("unexpected output: {:?}", r),
        };
        enc.free().await?;

        match &sealed {
            None => sealed = Some((out, tag)),
            Some(s) => assert_eq!(s, &(out, tag), "CCM split at {}", i),
        }
    }

    // CMAC
    let data: Vec<u8> = (0..50u8).collect();
    let expected = host_cmac(&AES_KEY, &data)?;

    for i in 0..=data.len() {
        let mut m = Mac::new(&store, &key, Algorithm::Cmac128, Mode::Mac)?;
        m.init().await?;
        m.update(&data[..i]).await?;
        assert_eq!(m.finish(&data[i..]).await?, expected, "CMAC split at {}", i);
        m.free().await?;
    }

    assert!(store.session().read_crypto_object_list().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn sha256_empty_input() -> anyhow::Result<()> {
    let (_sim, store) = setup().await?;
    let s = store.session();

    let expected =
        hex::decode("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")?;

    let mut d = Digest::new(s, Algorithm::Sha256, Mode::Digest)?;
    assert_eq!(d.one_go(&[]).await?, expected);

    d.init().await?;
    assert_eq!(d.finish(&[]).await?, expected);
    d.free().await?;

    Ok(())
}

#[tokio::test]
async fn shared_crypto_objects() -> anyhow::Result<()> {
    let (_sim, store) = setup().await?;
    let s = store.session();

    let mut a = Digest::new(s, Algorithm::Sha256, Mode::Digest)?;
    a.init().await?;
    assert_eq!(s.read_crypto_object_list().await?.len(), 1);

    // A second context reuses the object
    let mut b = Digest::new(s, Algorithm::Sha256, Mode::Digest)?;
    b.init().await?;
    assert_eq!(s.read_crypto_object_list().await?.len(), 1);

    // Freeing either context deletes it
    b.free().await?;
    assert!(s.read_crypto_object_list().await?.is_empty());

    assert!(a.finish(b"abc").await.is_err());

    Ok(())
}
