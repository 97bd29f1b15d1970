// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Elliptic curve keys as stored on the element
//!
//! Key material is held in element wire order: Edwards public keys and
//! Montgomery keys are little endian (byte reversed relative to the host
//! encodings), NIST keys are SEC1 / big endian scalars.

use p256::{
    ecdsa::{
        signature::hazmat::{PrehashSigner, PrehashVerifier},
        Signature, SigningKey, VerifyingKey,
    },
    elliptic_curve::sec1::ToEncodedPoint,
};
use rand_core::OsRng;
use sha2::{Digest, Sha512};

use se05x_apdu::types::{EcCurve, EcSignatureAlgo};

use super::random;
use crate::Error;

/// Key material for an EC object
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EcMaterial {
    pub curve: EcCurve,
    pub private: Option<Vec<u8>>,
    pub public: Option<Vec<u8>>,
}

fn reversed(b: &[u8]) -> Vec<u8> {
    b.iter().rev().copied().collect()
}

fn array32(b: &[u8]) -> Result<[u8; 32], Error> {
    b.try_into().map_err(|_| Error::InvalidData("key length"))
}

/// Swap the byte order of each 32 byte half of an Ed25519 signature
fn reverse_halves(sig: &[u8]) -> Result<Vec<u8>, Error> {
    if sig.len() != 64 {
        return Err(Error::InvalidData("Ed25519 signature length"));
    }
    Ok([reversed(&sig[..32]), reversed(&sig[32..])].concat())
}

/// Pseudo public key for BN curve objects
fn bn_public(private: &[u8]) -> Vec<u8> {
    Sha512::digest(private)[..32].to_vec()
}

impl EcMaterial {
    /// Generate a key pair on the provided curve
    pub fn generate(curve: EcCurve) -> Result<Self, Error> {
        let (private, public) = match curve {
            EcCurve::NistP256 => {
                let sk = p256::SecretKey::random(&mut OsRng);
                let pk = sk.public_key().to_encoded_point(false);
                (sk.to_bytes().to_vec(), pk.as_bytes().to_vec())
            }
            EcCurve::Ed25519 => {
                let sk = ed25519_dalek::SigningKey::generate(&mut OsRng);
                (sk.to_bytes().to_vec(), reversed(&sk.verifying_key().to_bytes()))
            }
            EcCurve::MontDh25519 => {
                let sk = x25519_dalek::StaticSecret::random_from_rng(OsRng);
                let pk = x25519_dalek::PublicKey::from(&sk);
                (reversed(&sk.to_bytes()), reversed(pk.as_bytes()))
            }
            EcCurve::BnP256 => {
                let sk = random(32);
                let pk = bn_public(&sk);
                (sk, pk)
            }
            _ => return Err(Error::Unsupported("key generation on curve")),
        };

        Ok(Self {
            curve,
            private: Some(private),
            public: Some(public),
        })
    }

    /// Complete missing public key material from the private key
    pub fn derive_public(&mut self) -> Result<(), Error> {
        let private = match (&self.private, &self.public) {
            (Some(p), None) => p,
            _ => return Ok(()),
        };

        let public = match self.curve {
            EcCurve::NistP256 => {
                let sk = p256::SecretKey::from_slice(private)
                    .map_err(|_| Error::InvalidData("P-256 private key"))?;
                sk.public_key().to_encoded_point(false).as_bytes().to_vec()
            }
            EcCurve::Ed25519 => {
                let sk = ed25519_dalek::SigningKey::from_bytes(&array32(private)?);
                reversed(&sk.verifying_key().to_bytes())
            }
            EcCurve::MontDh25519 => {
                let sk = x25519_dalek::StaticSecret::from(array32(&reversed(private))?);
                reversed(x25519_dalek::PublicKey::from(&sk).as_bytes())
            }
            EcCurve::BnP256 => bn_public(private),
            _ => return Ok(()),
        };

        self.public = Some(public);
        Ok(())
    }

    fn private(&self) -> Result<&[u8], Error> {
        self.private.as_deref().ok_or(Error::Denied("no private key"))
    }

    fn public(&self) -> Result<&[u8], Error> {
        self.public.as_deref().ok_or(Error::Denied("no public key"))
    }

    /// Sign `data` (a digest for ECDSA, the message for EdDSA)
    pub fn sign(&self, algo: EcSignatureAlgo, data: &[u8]) -> Result<Vec<u8>, Error> {
        match (self.curve, algo) {
            (EcCurve::Ed25519, EcSignatureAlgo::Ed25519Pure) => {
                use ed25519_dalek::Signer;

                let sk = ed25519_dalek::SigningKey::from_bytes(&array32(self.private()?)?);
                reverse_halves(&sk.sign(data).to_bytes())
            }
            (EcCurve::NistP256, a) if ecdsa_digest_len(a).is_some() => {
                check_digest_len(a, data)?;

                let sk = SigningKey::from_slice(self.private()?)
                    .map_err(|_| Error::InvalidData("P-256 private key"))?;
                let sig: Signature = sk
                    .sign_prehash(data)
                    .map_err(|_| Error::Crypto("ECDSA sign"))?;

                Ok(sig.to_der().as_bytes().to_vec())
            }
            _ => Err(Error::Unsupported("EC signature algorithm for curve")),
        }
    }

    /// Verify a signature over `data`
    pub fn verify(&self, algo: EcSignatureAlgo, data: &[u8], sig: &[u8]) -> Result<bool, Error> {
        match (self.curve, algo) {
            (EcCurve::Ed25519, EcSignatureAlgo::Ed25519Pure) => {
                use ed25519_dalek::Verifier;

                let pk = ed25519_dalek::VerifyingKey::from_bytes(&array32(&reversed(self.public()?))?)
                    .map_err(|_| Error::InvalidData("Ed25519 public key"))?;
                let sig = match reverse_halves(sig) {
                    Ok(s) => ed25519_dalek::Signature::from_slice(&s),
                    Err(_) => return Ok(false),
                };

                Ok(sig.map(|s| pk.verify(data, &s).is_ok()).unwrap_or(false))
            }
            (EcCurve::NistP256, a) if ecdsa_digest_len(a).is_some() => {
                check_digest_len(a, data)?;

                let pk = VerifyingKey::from_sec1_bytes(self.public()?)
                    .map_err(|_| Error::InvalidData("P-256 public key"))?;
                let sig = match Signature::from_der(sig) {
                    Ok(s) => s,
                    Err(_) => return Ok(false),
                };

                Ok(pk.verify_prehash(data, &sig).is_ok())
            }
            _ => Err(Error::Unsupported("EC signature algorithm for curve")),
        }
    }

    /// ECDAA signature with a random key (`r || s`)
    pub fn ecdaa_sign(&self, random_key: &EcMaterial, data: &[u8]) -> Result<Vec<u8>, Error> {
        if self.curve != EcCurve::BnP256 || random_key.curve != EcCurve::BnP256 {
            return Err(Error::Unsupported("ECDAA requires BN keys"));
        }

        let mut h = Sha512::new();
        h.update(b"ECDAA");
        h.update(self.private()?);
        h.update(random_key.private()?);
        h.update(data);

        Ok(h.finalize().to_vec())
    }

    /// Shared secret with a peer public key, in element output order
    pub fn ecdh(&self, peer: &[u8]) -> Result<Vec<u8>, Error> {
        match self.curve {
            EcCurve::NistP256 => {
                let sk = p256::SecretKey::from_slice(self.private()?)
                    .map_err(|_| Error::InvalidData("P-256 private key"))?;
                let pk = p256::PublicKey::from_sec1_bytes(peer)
                    .map_err(|_| Error::InvalidData("P-256 peer key"))?;

                let s = p256::ecdh::diffie_hellman(sk.to_nonzero_scalar(), pk.as_affine());
                Ok(s.raw_secret_bytes().to_vec())
            }
            EcCurve::MontDh25519 => {
                let sk = x25519_dalek::StaticSecret::from(array32(&reversed(self.private()?))?);
                let pk = x25519_dalek::PublicKey::from(array32(&reversed(peer))?);

                Ok(reversed(sk.diffie_hellman(&pk).as_bytes()))
            }
            _ => Err(Error::Unsupported("ECDH on curve")),
        }
    }
}

fn ecdsa_digest_len(algo: EcSignatureAlgo) -> Option<Option<usize>> {
    use EcSignatureAlgo::*;
    match algo {
        Plain => Some(None),
        Sha => Some(Some(20)),
        Sha224 => Some(Some(28)),
        Sha256 => Some(Some(32)),
        Sha384 => Some(Some(48)),
        Sha512 => Some(Some(64)),
        Ed25519Pure | Ecdaa => None,
    }
}

fn check_digest_len(algo: EcSignatureAlgo, data: &[u8]) -> Result<(), Error> {
    match ecdsa_digest_len(algo) {
        Some(Some(n)) if n != data.len() => Err(Error::Length),
        Some(None) if data.len() < 16 => Err(Error::Length),
        Some(_) => Ok(()),
        None => Err(Error::Unsupported("ECDSA algorithm")),
    }
}
