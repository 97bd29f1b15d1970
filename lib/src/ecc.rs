// Copyright (c) 2022-2023 The MobileCoin Foundation

//! EC key encodings
//!
//! Converts between host key encodings (PKCS#8, SEC1, SPKI, RFC 8410 and
//! raw Barreto-Naehrig keys) and the element wire representation.
//!
//! The element expects Montgomery and Edwards keys little-endian. Which
//! parts are reversed is a fixed per-curve table ([Reversal]) rather than
//! a general rule:
//!
//! | curve | pair: private | pair: public | public | private |
//! |-------|---------------|--------------|--------|---------|
//! | Weierstrass | - | - | - | - |
//! | Barreto-Naehrig | - | - | - | - |
//! | Ed25519 | - | reversed | reversed | - |
//! | X25519 / X448 | reversed | reversed | reversed | - |

use der::{
    asn1::{BitString, ObjectIdentifier, OctetStringRef},
    Any, Decode, Encode,
};
use log::debug;
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned, SubjectPublicKeyInfoRef};

use se05x_apdu::types::EcCurve;

use crate::{
    key_object::{CipherType, KeyPart},
    Error,
};

/// id-ecPublicKey
pub const ID_EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

const ID_ED25519: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");
const ID_X25519: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.110");
const ID_X448: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.111");

/// Byte reversal applied between host and wire encodings
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Reversal {
    None,
    /// Public key reversed, private key as-is
    PublicOnly,
    /// Private and public key reversed
    Both,
}

/// Key encoding family
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Encoding {
    /// id-ecPublicKey with named curve parameters
    Weierstrass(ObjectIdentifier),
    /// RFC 8410 algorithm identifier without parameters
    Rfc8410(ObjectIdentifier),
    /// Raw bytes, no header
    Raw,
}

/// Per-curve key parameters
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CurveInfo {
    pub curve: EcCurve,
    pub bits: usize,
    pub private_len: usize,
    pub public_len: usize,
    pub reversal: Reversal,
    pub encoding: Encoding,
}

const fn weierstrass(curve: EcCurve, bits: usize, n: usize, oid: &str) -> CurveInfo {
    CurveInfo {
        curve,
        bits,
        private_len: n,
        public_len: 1 + 2 * n,
        reversal: Reversal::None,
        encoding: Encoding::Weierstrass(ObjectIdentifier::new_unwrap(oid)),
    }
}

/// Curve parameter table
pub fn curve_info(curve: EcCurve) -> CurveInfo {
    use EcCurve::*;

    match curve {
        NistP192 => weierstrass(curve, 192, 24, "1.2.840.10045.3.1.1"),
        NistP224 => weierstrass(curve, 224, 28, "1.3.132.0.33"),
        NistP256 => weierstrass(curve, 256, 32, "1.2.840.10045.3.1.7"),
        NistP384 => weierstrass(curve, 384, 48, "1.3.132.0.34"),
        NistP521 => weierstrass(curve, 521, 66, "1.3.132.0.35"),
        Brainpool160 => weierstrass(curve, 160, 20, "1.3.36.3.3.2.8.1.1.1"),
        Brainpool192 => weierstrass(curve, 192, 24, "1.3.36.3.3.2.8.1.1.3"),
        Brainpool224 => weierstrass(curve, 224, 28, "1.3.36.3.3.2.8.1.1.5"),
        Brainpool256 => weierstrass(curve, 256, 32, "1.3.36.3.3.2.8.1.1.7"),
        Brainpool320 => weierstrass(curve, 320, 40, "1.3.36.3.3.2.8.1.1.9"),
        Brainpool384 => weierstrass(curve, 384, 48, "1.3.36.3.3.2.8.1.1.11"),
        Brainpool512 => weierstrass(curve, 512, 64, "1.3.36.3.3.2.8.1.1.13"),
        Secp160k1 => weierstrass(curve, 160, 20, "1.3.132.0.9"),
        Secp192k1 => weierstrass(curve, 192, 24, "1.3.132.0.31"),
        Secp224k1 => weierstrass(curve, 224, 28, "1.3.132.0.32"),
        Secp256k1 => weierstrass(curve, 256, 32, "1.3.132.0.10"),
        BnP256 => CurveInfo {
            curve,
            bits: 256,
            private_len: 32,
            public_len: 32,
            reversal: Reversal::None,
            encoding: Encoding::Raw,
        },
        Ed25519 => CurveInfo {
            curve,
            bits: 256,
            private_len: 32,
            public_len: 32,
            reversal: Reversal::PublicOnly,
            encoding: Encoding::Rfc8410(ID_ED25519),
        },
        MontDh25519 => CurveInfo {
            curve,
            bits: 256,
            private_len: 32,
            public_len: 32,
            reversal: Reversal::Both,
            encoding: Encoding::Rfc8410(ID_X25519),
        },
        MontDh448 => CurveInfo {
            curve,
            bits: 448,
            private_len: 56,
            public_len: 56,
            reversal: Reversal::Both,
            encoding: Encoding::Rfc8410(ID_X448),
        },
    }
}

/// Resolve the curve for a cipher type and key size
pub fn curve_for(cipher: CipherType, bits: usize) -> Option<EcCurve> {
    use EcCurve::*;

    let c = match (cipher, bits) {
        (CipherType::EcNistP, 192) => NistP192,
        (CipherType::EcNistP, 224) => NistP224,
        (CipherType::EcNistP, 256) => NistP256,
        (CipherType::EcNistP, 384) => NistP384,
        (CipherType::EcNistP, 521) => NistP521,
        (CipherType::EcBrainpool, 160) => Brainpool160,
        (CipherType::EcBrainpool, 192) => Brainpool192,
        (CipherType::EcBrainpool, 224) => Brainpool224,
        (CipherType::EcBrainpool, 256) => Brainpool256,
        (CipherType::EcBrainpool, 320) => Brainpool320,
        (CipherType::EcBrainpool, 384) => Brainpool384,
        (CipherType::EcBrainpool, 512) => Brainpool512,
        (CipherType::EcNistK, 160) => Secp160k1,
        (CipherType::EcNistK, 192) => Secp192k1,
        (CipherType::EcNistK, 224) => Secp224k1,
        (CipherType::EcNistK, 256) => Secp256k1,
        (CipherType::EcBarretoNaehrig, 256) => BnP256,
        (CipherType::EcTwistedEd, 256) => Ed25519,
        (CipherType::EcMontgomery, 256) => MontDh25519,
        (CipherType::EcMontgomery, 448) => MontDh448,
        _ => return None,
    };

    Some(c)
}

/// Cipher type for a curve
pub fn cipher_for(curve: EcCurve) -> CipherType {
    use EcCurve::*;

    match curve {
        NistP192 | NistP224 | NistP256 | NistP384 | NistP521 => CipherType::EcNistP,
        Brainpool160 | Brainpool192 | Brainpool224 | Brainpool256 | Brainpool320
        | Brainpool384 | Brainpool512 => CipherType::EcBrainpool,
        Secp160k1 | Secp192k1 | Secp224k1 | Secp256k1 => CipherType::EcNistK,
        BnP256 => CipherType::EcBarretoNaehrig,
        Ed25519 => CipherType::EcTwistedEd,
        MontDh25519 | MontDh448 => CipherType::EcMontgomery,
    }
}

/// Strip at most one leading zero and check the expected length
pub fn canonical(v: &[u8], expected: usize) -> Result<&[u8], Error> {
    let v = match v {
        [0, rest @ ..] if v.len() == expected + 1 => rest,
        _ => v,
    };

    if v.len() != expected {
        debug!("Key length {} does not match expected {}", v.len(), expected);
        return Err(Error::InvalidArgument("key length does not match curve"));
    }

    Ok(v)
}

fn reversed(v: &[u8]) -> Vec<u8> {
    v.iter().rev().copied().collect()
}

/// EC key material in wire order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WireEcKey {
    pub private: Option<Vec<u8>>,
    pub public: Option<Vec<u8>>,
}

impl Drop for WireEcKey {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        if let Some(p) = &mut self.private {
            p.zeroize();
        }
    }
}

fn check_curve_oid(info: &CurveInfo, oid: ObjectIdentifier) -> Result<(), Error> {
    let expected = match info.encoding {
        Encoding::Weierstrass(o) | Encoding::Rfc8410(o) => o,
        Encoding::Raw => return Err(Error::InvalidArgument("raw key expected")),
    };

    if oid != expected {
        debug!("Key curve {} does not match {}", oid, expected);
        return Err(Error::InvalidArgument("key curve does not match object"));
    }

    Ok(())
}

/// Parse a key pair, returning (private, public) in host order
fn parse_pair(info: &CurveInfo, der: &[u8]) -> Result<(Vec<u8>, Vec<u8>), Error> {
    match info.encoding {
        Encoding::Weierstrass(_) => {
            let (private, public) = match pkcs8::PrivateKeyInfo::try_from(der) {
                Ok(pk) => {
                    pk.algorithm.assert_algorithm_oid(ID_EC_PUBLIC_KEY)?;
                    check_curve_oid(info, pk.algorithm.parameters_oid()?)?;
                    let ec = sec1::EcPrivateKey::try_from(pk.private_key)?;
                    (ec.private_key.to_vec(), ec.public_key.map(|v| v.to_vec()))
                }
                Err(_) => {
                    let ec = sec1::EcPrivateKey::try_from(der)?;
                    if let Some(oid) = ec.parameters.and_then(|p| p.named_curve()) {
                        check_curve_oid(info, oid)?;
                    }
                    (ec.private_key.to_vec(), ec.public_key.map(|v| v.to_vec()))
                }
            };

            let public = public.ok_or(Error::InvalidArgument("key pair has no public key"))?;
            Ok((private, public))
        }
        Encoding::Rfc8410(oid) => {
            let pk = pkcs8::PrivateKeyInfo::try_from(der)?;
            pk.algorithm.assert_algorithm_oid(oid)?;

            let private = OctetStringRef::from_der(pk.private_key)?.as_bytes().to_vec();
            let public = pk
                .public_key
                .ok_or(Error::InvalidArgument("key pair has no public key"))?
                .to_vec();

            Ok((private, public))
        }
        Encoding::Raw => {
            let n = info.private_len;
            if der.len() != n + info.public_len {
                return Err(Error::InvalidArgument("key length does not match curve"));
            }
            Ok((der[..n].to_vec(), der[n..].to_vec()))
        }
    }
}

/// Parse a private key (DER encoded, or a raw scalar)
fn parse_private(info: &CurveInfo, der: &[u8]) -> Result<Vec<u8>, Error> {
    if info.encoding == Encoding::Raw {
        return Ok(der.to_vec());
    }

    match parse_pair(info, der) {
        Ok((private, _)) => Ok(private),
        Err(_) => Ok(der.to_vec()),
    }
}

/// Decode a public key to host order bytes
pub fn decode_public(info: &CurveInfo, der: &[u8]) -> Result<Vec<u8>, Error> {
    match info.encoding {
        Encoding::Raw => Ok(der.to_vec()),
        Encoding::Weierstrass(_) => {
            let spki = SubjectPublicKeyInfoRef::try_from(der)?;
            spki.algorithm.assert_algorithm_oid(ID_EC_PUBLIC_KEY)?;
            check_curve_oid(info, spki.algorithm.parameters_oid()?)?;
            Ok(spki.subject_public_key.raw_bytes().to_vec())
        }
        Encoding::Rfc8410(oid) => {
            let spki = SubjectPublicKeyInfoRef::try_from(der)?;
            spki.algorithm.assert_algorithm_oid(oid)?;
            Ok(spki.subject_public_key.raw_bytes().to_vec())
        }
    }
}

/// Parse a host key encoding into wire order key material
pub fn parse_key(info: &CurveInfo, part: KeyPart, der: &[u8]) -> Result<WireEcKey, Error> {
    match part {
        KeyPart::Pair => {
            let (private, public) = parse_pair(info, der)?;

            let private = match info.encoding {
                Encoding::Raw => private,
                _ => canonical(&private, info.private_len)?.to_vec(),
            };
            let public = canonical(&public, info.public_len)?;

            let (private, public) = match info.reversal {
                Reversal::None => (private, public.to_vec()),
                Reversal::PublicOnly => (private, reversed(public)),
                Reversal::Both => (reversed(&private), reversed(public)),
            };

            Ok(WireEcKey {
                private: Some(private),
                public: Some(public),
            })
        }
        KeyPart::Public => {
            let public = decode_public(info, der)?;
            let public = match info.encoding {
                Encoding::Raw => public,
                _ => canonical(&public, info.public_len)?.to_vec(),
            };

            let public = match info.reversal {
                Reversal::None => public,
                _ => reversed(&public),
            };

            Ok(WireEcKey {
                private: None,
                public: Some(public),
            })
        }
        KeyPart::Private => {
            if info.curve == EcCurve::MontDh448 {
                return Err(Error::Unsupported("X448 private key import"));
            }

            let private = parse_private(info, der)?;
            let private = match info.encoding {
                Encoding::Raw => private,
                _ => canonical(&private, info.private_len)?.to_vec(),
            };

            Ok(WireEcKey {
                private: Some(private),
                public: None,
            })
        }
        _ => Err(Error::InvalidArgument("invalid EC key part")),
    }
}

/// Encode a wire order public key for the host (SPKI, or raw for BN)
pub fn encode_public(info: &CurveInfo, wire: &[u8]) -> Result<Vec<u8>, Error> {
    let (algorithm, public) = match info.encoding {
        Encoding::Raw => return Ok(wire.to_vec()),
        Encoding::Weierstrass(curve) => (
            AlgorithmIdentifierOwned {
                oid: ID_EC_PUBLIC_KEY,
                parameters: Some(Any::encode_from(&curve)?),
            },
            wire.to_vec(),
        ),
        Encoding::Rfc8410(oid) => (
            AlgorithmIdentifierOwned {
                oid,
                parameters: None,
            },
            reversed(wire),
        ),
    };

    let spki = SubjectPublicKeyInfoOwned {
        algorithm,
        subject_public_key: BitString::from_bytes(&public)?,
    };

    Ok(spki.to_der()?)
}
