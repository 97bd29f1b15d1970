// Copyright (c) 2022-2023 The MobileCoin Foundation

use p256::pkcs8::{DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rand_core::OsRng;
use sha2::{Digest, Sha256};

use se05x_sim::{crypto::ec::EcMaterial, SimOptions};
use se05x_sss::{
    apdu::{
        attestation::AttestationLayout,
        ids,
        policy::{AccessRules, PolicySet},
        types::{
            EcCurve, EcSignatureAlgo, Instruction, SecObjType, Status, TransientIndicator, INS_MASK,
            P1, P1_TYPE_MASK,
        },
        Tag,
    },
    attestation::{verify_attestation, AttestParams},
    CipherType, Error, KeyObject, KeyPart, KeyStore, Session, SessionConfig,
};

mod helpers;
use helpers::{handle, setup, setup_recorded, setup_with, Recorder, Sim};

/// Tags of each write sent for an object class
fn write_tags(rec: &Recorder, class: P1) -> Vec<Vec<u8>> {
    rec.sent()
        .iter()
        .filter(|c| c.ins & INS_MASK == u8::from(Instruction::Write))
        .filter(|c| c.p1 & P1_TYPE_MASK == u8::from(class))
        .map(|c| c.tlv().unwrap().iter().map(|t| t.tag).collect())
        .collect()
}

/// Count of ReadObject value reads sent
fn value_reads(rec: &Recorder) -> usize {
    rec.sent()
        .iter()
        .filter(|c| c.ins & INS_MASK == u8::from(Instruction::Read) && c.p2 == 0)
        .count()
}

fn reversed(b: &[u8]) -> Vec<u8> {
    b.iter().rev().copied().collect()
}

/// EC key material as stored on the element
async fn wire_key(sim: &Sim, id: u32) -> anyhow::Result<EcMaterial> {
    let e = sim.element().await;
    let o = e.object(id).ok_or(anyhow::anyhow!("object 0x{:08x} missing", id))?;
    Ok(o.ec()?.clone())
}

#[tokio::test]
async fn binary_objects() -> anyhow::Result<()> {
    let (_sim, store) = setup().await?;
    let s = store.session();

    // Spans several write / read chunks
    let data: Vec<u8> = (0..1200u32).map(|i| (i % 251) as u8).collect();

    let obj = handle(&store, 0x7100_0001, KeyPart::Default, CipherType::Binary, data.len()).await?;
    store.set_key(&obj, &data, data.len() * 8, None).await?;

    let (v, bits) = store.get_key(&obj, 2048).await?;
    assert_eq!(v, data);
    assert_eq!(bits, data.len() * 8);

    assert!(matches!(
        store.get_key(&obj, 100).await,
        Err(Error::BufferTooSmall(1200))
    ));

    assert_eq!(
        s.read_type(0x7100_0001).await?,
        (SecObjType::BinaryFile, TransientIndicator::Persistent)
    );
    assert_eq!(s.read_size(0x7100_0001).await?, 1200);

    let h = KeyObject::get_handle(&store, 0x7100_0001).await?;
    assert_eq!(h.cipher, CipherType::Binary);
    assert_eq!(h.part, KeyPart::Default);
    assert_eq!(h.size, 1200);
    assert!(h.persistent);

    store.erase_key(&obj).await?;
    assert!(!s.check_object_exists(0x7100_0001).await?);
    assert!(matches!(
        KeyObject::get_handle(&store, 0x7100_0001).await,
        Err(Error::NotFound(0x7100_0001))
    ));

    // Oversized objects are rejected on the host
    let big = handle(&store, 0x7100_0002, KeyPart::Default, CipherType::Binary, 0).await?;
    assert!(matches!(
        store.set_key(&big, &vec![0u8; 0xFFFF], 0, None).await,
        Err(Error::InvalidArgument(_))
    ));

    Ok(())
}

#[tokio::test]
async fn binary_chunk_boundaries() -> anyhow::Result<()> {
    let (rec, store) = setup_recorded().await?;

    for (i, len) in [0usize, 1, 499, 500, 501, 1000, 1001].into_iter().enumerate() {
        let id = 0x7100_0100 + i as u32;
        let data: Vec<u8> = (0..len).map(|v| (v % 253) as u8).collect();
        let chunks = (len + 499) / 500;

        let obj = KeyObject::allocate_handle(&store, id, KeyPart::Default, CipherType::Binary, len, true).await?;

        rec.clear();
        store.set_key(&obj, &data, len * 8, None).await?;
        assert_eq!(write_tags(&rec, P1::Binary).len(), chunks.max(1), "writes for {} bytes", len);
        assert_eq!(store.session().read_size(id).await? as usize, len);

        rec.clear();
        let (v, bits) = store.get_key(&obj, 2048).await?;
        assert_eq!(v, data, "read back {} bytes", len);
        assert_eq!(bits, len * 8);
        assert_eq!(value_reads(&rec), chunks, "reads for {} bytes", len);

        // Same length update in place
        let updated: Vec<u8> = data.iter().map(|b| b ^ 0xFF).collect();
        store.set_key(&obj, &updated, len * 8, None).await?;
        assert_eq!(store.get_key(&obj, 2048).await?.0, updated);
    }

    let big = KeyObject::allocate_handle(&store, 0x7100_01FF, KeyPart::Default, CipherType::Binary, 0, true).await?;
    for len in [0xFFFF, 0x10000] {
        assert!(matches!(
            store.set_key(&big, &vec![0u8; len], 0, None).await,
            Err(Error::InvalidArgument(_))
        ));
    }
    assert!(!store.session().check_object_exists(0x7100_01FF).await?);

    Ok(())
}

#[tokio::test]
async fn short_binary_reads() -> anyhow::Result<()> {
    let (rec, store) = setup_recorded().await?;

    let data = vec![0x3Cu8; 600];
    let obj = KeyObject::allocate_handle(&store, 0x7100_0200, KeyPart::Default, CipherType::Binary, data.len(), true).await?;
    store.set_key(&obj, &data, 0, None).await?;
    assert_eq!(store.get_key(&obj, 1024).await?.0, data);

    // Chunks shorter than requested end the read
    rec.set_short_reads(true);

    assert!(matches!(
        store.get_key(&obj, 1024).await,
        Err(Error::Encoding(_))
    ));

    let params = AttestParams::new(EcSignatureAlgo::Sha256);
    assert!(matches!(
        store.get_key_with_attestation(&obj, 1024, &params).await,
        Err(Error::Encoding(_))
    ));

    // Including a one byte chunk returned empty
    rec.set_short_reads(false);
    let one = KeyObject::allocate_handle(&store, 0x7100_0201, KeyPart::Default, CipherType::Binary, 1, true).await?;
    store.set_key(&one, &[0x01], 8, None).await?;
    rec.set_short_reads(true);
    assert!(matches!(store.get_key(&one, 16).await, Err(Error::Encoding(_))));

    Ok(())
}

#[tokio::test]
async fn create_and_update_fields() -> anyhow::Result<()> {
    use pkcs1::EncodeRsaPrivateKey;
    use rsa::RsaPrivateKey;

    let (rec, store) = setup_recorded().await?;

    let policy = PolicySet::single(0, AccessRules::READ | AccessRules::WRITE | AccessRules::DELETE);
    let policy_tag = u8::from(Tag::Policy);

    let ec = p256::SecretKey::random(&mut OsRng).to_pkcs8_der()?;
    let rsa_der = RsaPrivateKey::new(&mut OsRng, 1024)?.to_pkcs1_der()?;
    let bin = vec![0x42u8; 700];
    let aes = [0x11u8; 16];

    // (id, part, cipher, size, bits, data, class, size tag)
    let cases: [(u32, KeyPart, CipherType, usize, usize, &[u8], P1, Option<Tag>); 4] = [
        (0x7A10_0001, KeyPart::Pair, CipherType::EcNistP, 256, 256, ec.as_bytes(), P1::Ec, Some(Tag::Tag2)),
        (0x7A10_0002, KeyPart::Pair, CipherType::Rsa, 1024, 1024, rsa_der.as_bytes(), P1::Rsa, Some(Tag::Tag2)),
        (0x7A10_0003, KeyPart::Default, CipherType::Binary, bin.len(), 0, &bin[..], P1::Binary, Some(Tag::Tag3)),
        (0x7A10_0004, KeyPart::Default, CipherType::Aes, 128, 128, &aes[..], P1::Aes, None),
    ];

    for (id, part, cipher, size, bits, data, class, size_tag) in cases {
        let obj = KeyObject::allocate_handle(&store, id, part, cipher, size, true).await?;

        rec.clear();
        store.set_key(&obj, data, bits, Some(&policy)).await?;

        let created = write_tags(&rec, class);
        assert!(!created.is_empty());
        assert!(created[0].contains(&policy_tag), "{:?} create has no policy", cipher);
        if let Some(t) = size_tag {
            assert!(created[0].contains(&u8::from(t)), "{:?} create has no size", cipher);
        }
        for w in &created[1..] {
            assert!(!w.contains(&policy_tag));
        }

        rec.clear();
        store.set_key(&obj, data, bits, Some(&policy)).await?;

        let updated = write_tags(&rec, class);
        assert_eq!(updated.len(), created.len(), "{:?} update count", cipher);
        for w in &updated {
            assert!(!w.contains(&policy_tag), "{:?} update carries policy", cipher);
            if let Some(t) = size_tag {
                assert!(!w.contains(&u8::from(t)), "{:?} update carries size", cipher);
            }
        }

        assert_eq!(store.session().read_attributes(id).await?.policy, policy);
    }

    Ok(())
}

#[tokio::test]
async fn rsa_crt_overwrite() -> anyhow::Result<()> {
    use pkcs1::EncodeRsaPrivateKey;
    use rsa::{RsaPrivateKey, RsaPublicKey};

    let (_sim, store) = setup().await?;

    let first = RsaPrivateKey::new(&mut OsRng, 1024)?;
    let second = RsaPrivateKey::new(&mut OsRng, 1024)?;

    let obj = handle(&store, 0x7200_0020, KeyPart::Pair, CipherType::RsaCrt, 1024).await?;

    store.set_key(&obj, first.to_pkcs1_der()?.as_bytes(), 1024, None).await?;
    let (spki, bits) = store.get_key(&obj, 1024).await?;
    assert_eq!(bits, 1024);
    assert_eq!(RsaPublicKey::from_public_key_der(&spki)?, first.to_public_key());

    // Second set updates the existing object component by component
    store.set_key(&obj, second.to_pkcs1_der()?.as_bytes(), 1024, None).await?;
    let (spki, _) = store.get_key(&obj, 1024).await?;
    assert_eq!(RsaPublicKey::from_public_key_der(&spki)?, second.to_public_key());

    assert_eq!(
        store.session().read_type(0x7200_0020).await?.0,
        SecObjType::RsaKeyPairCrt
    );

    Ok(())
}

#[tokio::test]
async fn ec_curve_byte_order() -> anyhow::Result<()> {
    use pkcs8::{der::Encode, AlgorithmIdentifierRef, ObjectIdentifier, PrivateKeyInfo};

    let (sim, store) = setup().await?;

    // Ed25519, public key reversed
    let sk = ed25519_dalek::SigningKey::generate(&mut OsRng);
    let vk = sk.verifying_key();

    let ed = handle(&store, 0x7200_0030, KeyPart::Pair, CipherType::EcTwistedEd, 256).await?;
    store.set_key(&ed, sk.to_pkcs8_der()?.as_bytes(), 256, None).await?;

    let m = wire_key(&sim, 0x7200_0030).await?;
    assert_eq!(m.private.as_deref(), Some(&sk.to_bytes()[..]));
    assert_eq!(m.public, Some(reversed(vk.as_bytes())));

    let (spki, _) = store.get_key(&ed, 256).await?;
    assert_eq!(ed25519_dalek::VerifyingKey::from_public_key_der(&spki)?, vk);

    // X25519, both parts reversed
    let secret = x25519_dalek::StaticSecret::random_from_rng(OsRng);
    let public = x25519_dalek::PublicKey::from(&secret);
    let scalar = [&[0x04u8, 0x20][..], &secret.to_bytes()[..]].concat();

    let der = PrivateKeyInfo {
        algorithm: AlgorithmIdentifierRef {
            oid: ObjectIdentifier::new_unwrap("1.3.101.110"),
            parameters: None,
        },
        private_key: &scalar,
        public_key: Some(&public.as_bytes()[..]),
    }
    .to_der()?;

    let x = handle(&store, 0x7200_0031, KeyPart::Pair, CipherType::EcMontgomery, 256).await?;
    store.set_key(&x, &der, 256, None).await?;

    let m = wire_key(&sim, 0x7200_0031).await?;
    assert_eq!(m.private, Some(reversed(&secret.to_bytes())));
    assert_eq!(m.public, Some(reversed(public.as_bytes())));

    let (encoded, _) = store.get_key(&x, 256).await?;
    let decoded = spki::SubjectPublicKeyInfoRef::try_from(&encoded[..])?;
    assert_eq!(decoded.subject_public_key.raw_bytes(), public.as_bytes());

    // Barreto-Naehrig, raw 32 + 32 byte pair without reversal
    let private: Vec<u8> = (1..=32u8).collect();
    let public: Vec<u8> = (33..=64u8).collect();

    let bn = handle(&store, 0x7200_0032, KeyPart::Pair, CipherType::EcBarretoNaehrig, 256).await?;
    store.set_key(&bn, &[private.clone(), public.clone()].concat(), 256, None).await?;

    let m = wire_key(&sim, 0x7200_0032).await?;
    assert_eq!(m.private, Some(private));
    assert_eq!(m.public, Some(public.clone()));
    assert_eq!(store.get_key(&bn, 256).await?, (public, 256));

    Ok(())
}

#[tokio::test]
async fn counters_and_pcrs() -> anyhow::Result<()> {
    let (_sim, store) = setup().await?;

    let counter = handle(&store, 0x7100_0010, KeyPart::Default, CipherType::Counter, 32).await?;
    store.set_key(&counter, &[0, 0, 0, 5], 0, None).await?;
    assert_eq!(store.get_key(&counter, 8).await?, (vec![0, 0, 0, 5], 32));

    // Empty writes increment
    store.set_key(&counter, &[], 0, None).await?;
    assert_eq!(store.get_key(&counter, 8).await?.0, vec![0, 0, 0, 6]);

    // Counters never decrease
    let r = store.set_key(&counter, &[0, 0, 0, 1], 0, None).await;
    assert!(matches!(r, Err(e) if e.is_status(Status::ConditionsNotSatisfied)));

    let pcr = handle(&store, 0x7100_0011, KeyPart::Default, CipherType::Pcr, 256).await?;
    store.set_key(&pcr, &[0u8; 32], 256, None).await?;
    store.set_key(&pcr, b"measurement", 256, None).await?;

    let expected = Sha256::new()
        .chain_update([0u8; 32])
        .chain_update(b"measurement")
        .finalize();

    let (v, bits) = store.get_key(&pcr, 64).await?;
    assert_eq!(&v[..], &expected[..]);
    assert_eq!(bits, 256);

    Ok(())
}

#[tokio::test]
async fn ec_keys() -> anyhow::Result<()> {
    let (_sim, store) = setup().await?;

    let sk = p256::SecretKey::random(&mut OsRng);
    let pair_der = sk.to_pkcs8_der()?;
    let public_der = sk.public_key().to_public_key_der()?;

    // Key pair import
    let pair = handle(&store, 0x7200_0001, KeyPart::Pair, CipherType::EcNistP, 256).await?;
    assert_eq!(pair.curve, Some(EcCurve::NistP256));
    store.set_key(&pair, pair_der.as_bytes(), 256, None).await?;

    let (spki, bits) = store.get_key(&pair, 256).await?;
    assert_eq!(bits, 256);
    assert_eq!(p256::PublicKey::from_public_key_der(&spki)?, sk.public_key());

    // Public key import
    let public = handle(&store, 0x7200_0002, KeyPart::Public, CipherType::EcNistP, 256).await?;
    store.set_key(&public, public_der.as_bytes(), 256, None).await?;
    assert_eq!(store.get_key(&public, 256).await?.0, spki);

    let h = KeyObject::get_handle(&store, 0x7200_0002).await?;
    assert_eq!(h.part, KeyPart::Public);
    assert_eq!(h.cipher, CipherType::EcNistP);
    assert_eq!(h.curve, Some(EcCurve::NistP256));

    // On-element generation
    let generated = handle(&store, 0x7200_0003, KeyPart::Pair, CipherType::EcNistP, 256).await?;
    store.generate_key(&generated, 256, None).await?;
    let (g, _) = store.get_key(&generated, 256).await?;
    assert_ne!(g, spki);

    // Only pairs can be generated
    assert!(matches!(
        store.generate_key(&public, 256, None).await,
        Err(Error::InvalidArgument(_))
    ));

    // Reserved ECDAA random key identifiers
    let reserved = handle(
        &store,
        ids::ECDAA_RANDOM_START + 5,
        KeyPart::Pair,
        CipherType::EcNistP,
        256,
    )
    .await?;
    assert!(matches!(
        store.set_key(&reserved, pair_der.as_bytes(), 256, None).await,
        Err(Error::ReservedId(_))
    ));

    // Freezing is not available
    assert!(matches!(store.freeze_key(&pair), Err(Error::Unsupported(_))));

    Ok(())
}

#[tokio::test]
async fn symmetric_keys() -> anyhow::Result<()> {
    let (_sim, store) = setup().await?;

    let aes = handle(&store, 0x7300_0001, KeyPart::Default, CipherType::Aes, 128).await?;

    assert!(matches!(
        store.set_key(&aes, &[0x11; 15], 120, None).await,
        Err(Error::InvalidArgument(_))
    ));

    store.set_key(&aes, &[0x11; 16], 128, None).await?;

    let h = KeyObject::get_handle(&store, 0x7300_0001).await?;
    assert_eq!(h.cipher, CipherType::Aes);
    assert_eq!(h.size, 128);

    assert_eq!(store.get_key(&aes, 64).await?, (vec![0x11; 16], 128));

    // Overwrite in place
    store.set_key(&aes, &[0x22; 16], 128, None).await?;
    assert_eq!(store.get_key(&aes, 64).await?.0, vec![0x22; 16]);

    // Elements may refuse secret reads
    let (_sim, store) = setup_with(SimOptions {
        deny_secret_reads: true,
        ..Default::default()
    })
    .await?;

    let aes = handle(&store, 0x7300_0001, KeyPart::Default, CipherType::Aes, 128).await?;
    store.set_key(&aes, &[0x11; 16], 128, None).await?;

    let r = store.get_key(&aes, 64).await;
    assert!(matches!(r, Err(e) if e.is_status(Status::CommandNotAllowed)));

    Ok(())
}

#[tokio::test]
async fn object_policies() -> anyhow::Result<()> {
    let (_sim, store) = setup().await?;

    let policy = PolicySet::single(0, AccessRules::WRITE | AccessRules::DELETE);

    let obj = handle(&store, 0x7400_0001, KeyPart::Default, CipherType::Binary, 4).await?;
    store.set_key(&obj, &[1, 2, 3, 4], 32, Some(&policy)).await?;

    // Reads are not granted
    let r = store.get_key(&obj, 16).await;
    assert!(matches!(r, Err(e) if e.is_status(Status::CommandNotAllowed)));

    let attrs = store.session().read_attributes(0x7400_0001).await?;
    assert_eq!(attrs.policy, policy);

    store.erase_key(&obj).await?;

    // Without DELETE the object stays
    let policy = PolicySet::single(0, AccessRules::READ);
    store.set_key(&obj, &[1, 2, 3, 4], 32, Some(&policy)).await?;
    assert!(store.erase_key(&obj).await.is_err());
    assert_eq!(store.get_key(&obj, 16).await?.0, vec![1, 2, 3, 4]);

    Ok(())
}

#[tokio::test]
async fn transient_objects() -> anyhow::Result<()> {
    let (sim, store) = setup().await?;

    let obj = KeyObject::allocate_handle(&store, 0x7400_0010, KeyPart::Default, CipherType::Binary, 4, false).await?;
    store.set_key(&obj, &[9, 9, 9, 9], 32, None).await?;

    assert_eq!(
        store.session().read_type(0x7400_0010).await?.1,
        TransientIndicator::Transient
    );
    assert_eq!(store.get_key(&obj, 16).await?.0, vec![9, 9, 9, 9]);

    // Content is lost on deselect, the object remains
    store.session().close().await?;

    let s = Session::open(sim.clone(), SessionConfig::default()).await?;
    let store = KeyStore::new(s);

    assert!(store.session().check_object_exists(0x7400_0010).await?);
    let h = KeyObject::get_handle(&store, 0x7400_0010).await?;
    assert!(!h.persistent);

    let r = store.get_key(&h, 16).await;
    assert!(matches!(r, Err(e) if e.is_status(Status::ConditionsNotSatisfied)));

    Ok(())
}

#[tokio::test]
async fn attested_reads() -> anyhow::Result<()> {
    for layout in [AttestationLayout::Tlv, AttestationLayout::Flat] {
        let (sim, _) = setup_with(SimOptions {
            layout,
            ..Default::default()
        })
        .await?;

        let s = Session::open(
            sim.clone(),
            SessionConfig {
                attestation: layout,
                ..Default::default()
            },
        )
        .await?;
        let store = KeyStore::new(s);

        let obj = handle(&store, 0x7500_0001, KeyPart::Pair, CipherType::EcNistP, 256).await?;
        store.generate_key(&obj, 256, None).await?;

        let params = AttestParams::new(EcSignatureAlgo::Sha256);
        let (v, bits, reads) = store.get_key_with_attestation(&obj, 256, &params).await?;

        assert_eq!(v, store.get_key(&obj, 256).await?.0);
        assert_eq!(bits, 256);
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].record.layout, layout);

        verify_attestation(store.session(), &reads[0]).await?;

        // Modified data fails verification
        let mut bad = reads[0].clone();
        bad.record.data[1] ^= 0x01;
        assert!(matches!(
            verify_attestation(store.session(), &bad).await,
            Err(Error::Attestation)
        ));

        // The command echoed by the element is signed
        if layout == AttestationLayout::Tlv {
            let mut bad = reads[0].clone();
            bad.record.cmd[5] ^= 0x01;
            assert!(matches!(
                verify_attestation(store.session(), &bad).await,
                Err(Error::Attestation)
            ));
        }

        // Binary objects are attested per chunk
        let data = vec![0x5Au8; 700];
        let bin = handle(&store, 0x7500_0002, KeyPart::Default, CipherType::Binary, data.len()).await?;
        store.set_key(&bin, &data, 0, None).await?;

        let (v, _, reads) = store.get_key_with_attestation(&bin, 1024, &params).await?;
        assert_eq!(v, data);
        assert_eq!(reads.len(), 2);
        for r in &reads {
            verify_attestation(store.session(), r).await?;
        }

        store.session().close().await?;
    }

    Ok(())
}

#[tokio::test]
async fn rsa_attestation_key() -> anyhow::Result<()> {
    use pkcs1::EncodeRsaPrivateKey;
    use rsa::RsaPrivateKey;

    let (_sim, store) = setup().await?;

    let host = RsaPrivateKey::new(&mut OsRng, 1024)?;
    let der = host.to_pkcs1_der()?;
    let rsa = handle(&store, 0x7500_0010, KeyPart::Pair, CipherType::Rsa, 1024).await?;
    store.set_key(&rsa, der.as_bytes(), 1024, None).await?;

    let obj = handle(&store, 0x7500_0011, KeyPart::Pair, CipherType::EcNistP, 256).await?;
    store.generate_key(&obj, 256, None).await?;

    let params = AttestParams::new(EcSignatureAlgo::Sha256);
    let (_, _, reads) = store.get_key_with_attestation(&obj, 256, &params).await?;
    verify_attestation(store.session(), &reads[0]).await?;

    // RSA attestation keys are not verified on the host
    let mut read = reads[0].clone();
    read.params.key = 0x7500_0010;
    assert!(matches!(
        verify_attestation(store.session(), &read).await,
        Err(Error::Unsupported(_))
    ));

    Ok(())
}

#[tokio::test]
async fn export_import() -> anyhow::Result<()> {
    let (_sim, store) = setup().await?;

    let policy = PolicySet::single(
        0,
        AccessRules::IMPORT_EXPORT
            | AccessRules::READ
            | AccessRules::WRITE
            | AccessRules::DELETE
            | AccessRules::SIGN,
    );

    let obj = handle(&store, 0x7600_0001, KeyPart::Pair, CipherType::EcNistP, 256).await?;
    store.generate_key(&obj, 256, Some(&policy)).await?;
    let (public, _) = store.get_key(&obj, 256).await?;

    let blob = store.export_key(&obj).await?;

    store.erase_key(&obj).await?;
    assert!(!store.session().check_object_exists(0x7600_0001).await?);

    store.import_key(&obj, &blob).await?;
    assert_eq!(store.get_key(&obj, 256).await?.0, public);

    // Blobs are authenticated
    let mut bad = blob.clone();
    let n = bad.len();
    bad[n - 1] ^= 0x01;
    let other = handle(&store, 0x7600_0002, KeyPart::Pair, CipherType::EcNistP, 256).await?;
    let r = store.import_key(&other, &bad).await;
    assert!(matches!(r, Err(e) if e.is_status(Status::SecurityStatus)));

    // Binary objects cannot be exported
    let bin = handle(&store, 0x7600_0003, KeyPart::Default, CipherType::Binary, 4).await?;
    assert!(matches!(
        store.export_key(&bin).await,
        Err(Error::Unsupported(_))
    ));

    Ok(())
}

#[tokio::test]
async fn delete_all_objects() -> anyhow::Result<()> {
    let (_sim, store) = setup().await?;
    let s = store.session();

    for id in [0x7700_0001, 0x7700_0002] {
        let obj = handle(&store, id, KeyPart::Default, CipherType::Binary, 4).await?;
        store.set_key(&obj, &[0; 4], 32, None).await?;
    }

    let ids_before = s.list_objects().await?;
    assert!(ids_before.contains(&0x7700_0001));

    s.delete_all().await?;

    let ids_after = s.list_objects().await?;
    assert!(!ids_after.contains(&0x7700_0001));
    assert!(!ids_after.contains(&0x7700_0002));

    // Provisioned objects survive
    assert!(ids_after.contains(&ids::UNIQUE_ID));
    assert!(ids_after.contains(&ids::ATTESTATION_KEY));

    Ok(())
}
