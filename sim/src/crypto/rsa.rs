// Copyright (c) 2022-2023 The MobileCoin Foundation

//! RSA keys as stored on the element, held as individual big endian
//! components so partially written keys can be represented

use rand_core::OsRng;
use rsa::{
    traits::{PrivateKeyParts, PublicKeyParts},
    BigUint, Oaep, Pkcs1v15Encrypt, Pkcs1v15Sign, Pss, RsaPrivateKey, RsaPublicKey,
};
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512};
use zeroize::Zeroize;

use se05x_apdu::types::{DigestMode, RsaEncryptionAlgo, RsaKeyComponent, RsaSignatureAlgo};

use super::digest;
use crate::Error;

/// RSA key components
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RsaMaterial {
    /// Key size in bits
    pub bits: usize,
    pub n: Option<Vec<u8>>,
    pub e: Option<Vec<u8>>,
    pub d: Option<Vec<u8>>,
    pub p: Option<Vec<u8>>,
    pub q: Option<Vec<u8>>,
    pub dp: Option<Vec<u8>>,
    pub dq: Option<Vec<u8>>,
    pub qinv: Option<Vec<u8>>,
}

impl core::fmt::Debug for RsaMaterial {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RsaMaterial")
            .field("bits", &self.bits)
            .field("n", &self.n.as_ref().map(hex::encode))
            .field("e", &self.e.as_ref().map(hex::encode))
            .finish_non_exhaustive()
    }
}

impl Drop for RsaMaterial {
    fn drop(&mut self) {
        let private = [&mut self.d, &mut self.p, &mut self.q, &mut self.dp, &mut self.dq, &mut self.qinv];
        for v in private.into_iter().flatten() {
            v.zeroize();
        }
    }
}

macro_rules! with_digest {
    ($mode:expr, |$h:ident| $body:expr) => {
        match $mode {
            DigestMode::Sha => {
                type $h = Sha1;
                $body
            }
            DigestMode::Sha224 => {
                type $h = Sha224;
                $body
            }
            DigestMode::Sha256 => {
                type $h = Sha256;
                $body
            }
            DigestMode::Sha384 => {
                type $h = Sha384;
                $body
            }
            DigestMode::Sha512 => {
                type $h = Sha512;
                $body
            }
            DigestMode::NoHash => Err(Error::Unsupported("RSA digest")),
        }
    };
}

fn uint(b: &[u8]) -> BigUint {
    BigUint::from_bytes_be(b)
}

/// Left pad to the modulus length
fn pad_to(mut v: Vec<u8>, len: usize) -> Vec<u8> {
    if v.len() < len {
        let mut p = vec![0u8; len - v.len()];
        p.append(&mut v);
        return p;
    }
    v
}

impl RsaMaterial {
    /// Generate a key of `bits` length
    pub fn generate(bits: usize) -> Result<Self, Error> {
        let k = RsaPrivateKey::new(&mut OsRng, bits).map_err(|_| Error::Crypto("RSA key generation"))?;

        let primes = k.primes();
        if primes.len() != 2 {
            return Err(Error::Crypto("RSA key generation"));
        }

        let mut m = Self {
            bits,
            n: Some(k.n().to_bytes_be()),
            e: Some(k.e().to_bytes_be()),
            d: Some(k.d().to_bytes_be()),
            p: Some(primes[0].to_bytes_be()),
            q: Some(primes[1].to_bytes_be()),
            dp: None,
            dq: None,
            qinv: None,
        };
        m.complete_crt()?;

        Ok(m)
    }

    /// Fill CRT exponents and coefficient from `p`, `q` and `d`
    fn complete_crt(&mut self) -> Result<(), Error> {
        let (p, q, d) = match (&self.p, &self.q, &self.d) {
            (Some(p), Some(q), Some(d)) => (uint(p), uint(q), uint(d)),
            _ => return Ok(()),
        };
        let one = BigUint::from(1u32);
        let two = BigUint::from(2u32);

        if p <= two || q <= two {
            return Err(Error::InvalidData("RSA prime"));
        }

        self.dp = Some((&d % (&p - &one)).to_bytes_be());
        self.dq = Some((&d % (&q - &one)).to_bytes_be());
        // p is prime so q^(p-2) is the inverse of q mod p
        self.qinv = Some(q.modpow(&(&p - &two), &p).to_bytes_be());

        Ok(())
    }

    /// Store a component value
    pub fn set(&mut self, component: RsaKeyComponent, value: &[u8]) -> Result<(), Error> {
        use RsaKeyComponent::*;

        let slot = match component {
            Mod => &mut self.n,
            PubExp => &mut self.e,
            PrivExp => &mut self.d,
            P => &mut self.p,
            Q => &mut self.q,
            Dp => &mut self.dp,
            Dq => &mut self.dq,
            InvQ => &mut self.qinv,
            Na => return Err(Error::InvalidData("RSA component")),
        };
        *slot = Some(value.to_vec());

        Ok(())
    }

    /// Fetch a public component
    pub fn public_component(&self, component: RsaKeyComponent) -> Result<&[u8], Error> {
        let v = match component {
            RsaKeyComponent::Mod => &self.n,
            RsaKeyComponent::PubExp => &self.e,
            _ => return Err(Error::Denied("private RSA component")),
        };
        v.as_deref().ok_or(Error::Conditions("RSA component not set"))
    }

    /// Modulus length in bytes
    pub fn modulus_len(&self) -> usize {
        match &self.n {
            Some(n) => n.len(),
            None => self.bits / 8,
        }
    }

    fn public_key(&self) -> Result<RsaPublicKey, Error> {
        match (&self.n, &self.e) {
            (Some(n), Some(e)) => RsaPublicKey::new(uint(n), uint(e))
                .map_err(|_| Error::InvalidData("RSA public key")),
            _ => Err(Error::Conditions("RSA public key incomplete")),
        }
    }

    fn private_key(&self) -> Result<RsaPrivateKey, Error> {
        let (n, e, d) = match (&self.n, &self.e, &self.d) {
            (Some(n), Some(e), Some(d)) => (uint(n), uint(e), uint(d)),
            _ => return Err(Error::Unsupported("RSA padding with CRT-only private key")),
        };

        let primes = match (&self.p, &self.q) {
            (Some(p), Some(q)) => vec![uint(p), uint(q)],
            _ => vec![],
        };

        RsaPrivateKey::from_components(n, e, d, primes)
            .map_err(|_| Error::InvalidData("RSA private key"))
    }

    /// Raw public key operation `m^e mod n`
    pub fn raw_public(&self, m: &[u8]) -> Result<Vec<u8>, Error> {
        let (n, e) = match (&self.n, &self.e) {
            (Some(n), Some(e)) => (uint(n), uint(e)),
            _ => return Err(Error::Conditions("RSA public key incomplete")),
        };

        let m = uint(m);
        if m >= n {
            return Err(Error::InvalidData("RSA input out of range"));
        }

        Ok(pad_to(m.modpow(&e, &n).to_bytes_be(), self.modulus_len()))
    }

    /// Raw private key operation, via CRT when only CRT components are held
    pub fn raw_private(&self, c: &[u8]) -> Result<Vec<u8>, Error> {
        let c = uint(c);

        let out = match (&self.n, &self.d) {
            (Some(n), Some(d)) => {
                let n = uint(n);
                if c >= n {
                    return Err(Error::InvalidData("RSA input out of range"));
                }
                c.modpow(&uint(d), &n)
            }
            _ => {
                let (p, q, dp, dq, qinv) = match (&self.p, &self.q, &self.dp, &self.dq, &self.qinv) {
                    (Some(p), Some(q), Some(dp), Some(dq), Some(qinv)) => {
                        (uint(p), uint(q), uint(dp), uint(dq), uint(qinv))
                    }
                    _ => return Err(Error::Conditions("RSA private key incomplete")),
                };

                if c >= &p * &q {
                    return Err(Error::InvalidData("RSA input out of range"));
                }

                let m1 = c.modpow(&dp, &p);
                let m2 = c.modpow(&dq, &q);

                // h = qinv * (m1 - m2) mod p
                let diff = (&m1 + &p - (&m2 % &p)) % &p;
                let h = (&qinv * diff) % &p;

                m2 + h * q
            }
        };

        Ok(pad_to(out.to_bytes_be(), self.modulus_len()))
    }

    /// Hash and sign
    pub fn sign(&self, algo: RsaSignatureAlgo, msg: &[u8]) -> Result<Vec<u8>, Error> {
        let hashed = digest(algo.digest(), msg)?;
        let k = self.private_key()?;

        let sig = match algo.is_pss() {
            true => with_digest!(algo.digest(), |H| k
                .sign_with_rng(&mut OsRng, Pss::new::<H>(), &hashed)
                .map_err(|_| Error::Crypto("RSA PSS sign"))),
            false => with_digest!(algo.digest(), |H| k
                .sign(Pkcs1v15Sign::new::<H>(), &hashed)
                .map_err(|_| Error::Crypto("RSA PKCS#1 sign"))),
        }?;

        Ok(sig)
    }

    /// Hash and verify
    pub fn verify(&self, algo: RsaSignatureAlgo, msg: &[u8], sig: &[u8]) -> Result<bool, Error> {
        let hashed = digest(algo.digest(), msg)?;
        let k = self.public_key()?;

        let ok = match algo.is_pss() {
            true => with_digest!(algo.digest(), |H| Ok(k
                .verify(Pss::new::<H>(), &hashed, sig)
                .is_ok())),
            false => with_digest!(algo.digest(), |H| Ok(k
                .verify(Pkcs1v15Sign::new::<H>(), &hashed, sig)
                .is_ok())),
        }?;

        Ok(ok)
    }

    pub fn encrypt(&self, algo: RsaEncryptionAlgo, data: &[u8]) -> Result<Vec<u8>, Error> {
        match algo {
            RsaEncryptionAlgo::NoPad => self.raw_public(data),
            RsaEncryptionAlgo::Pkcs1 => self
                .public_key()?
                .encrypt(&mut OsRng, Pkcs1v15Encrypt, data)
                .map_err(|_| Error::Length),
            RsaEncryptionAlgo::Oaep => self
                .public_key()?
                .encrypt(&mut OsRng, Oaep::new::<Sha1>(), data)
                .map_err(|_| Error::Length),
        }
    }

    pub fn decrypt(&self, algo: RsaEncryptionAlgo, data: &[u8]) -> Result<Vec<u8>, Error> {
        match algo {
            RsaEncryptionAlgo::NoPad => self.raw_private(data),
            RsaEncryptionAlgo::Pkcs1 => self
                .private_key()?
                .decrypt(Pkcs1v15Encrypt, data)
                .map_err(|_| Error::Crypto("RSA decryption")),
            RsaEncryptionAlgo::Oaep => self
                .private_key()?
                .decrypt(Oaep::new::<Sha1>(), data)
                .map_err(|_| Error::Crypto("RSA decryption")),
        }
    }
}
