// Copyright (c) 2022-2023 The MobileCoin Foundation

//! RSA key encodings

use der::{
    asn1::{BitString, Null, ObjectIdentifier, UintRef},
    Any, Encode,
};
use pkcs1::{RsaPrivateKey, RsaPublicKey};
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned, SubjectPublicKeyInfoRef};
use zeroize::Zeroize;

use crate::Error;

/// rsaEncryption
pub const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

/// RSA key components as unsigned big-endian integers
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RsaComponents {
    pub n: Vec<u8>,
    pub e: Vec<u8>,
    pub d: Option<Vec<u8>>,
    pub p: Option<Vec<u8>>,
    pub q: Option<Vec<u8>>,
    pub dp: Option<Vec<u8>>,
    pub dq: Option<Vec<u8>>,
    pub qinv: Option<Vec<u8>>,
}

impl Drop for RsaComponents {
    fn drop(&mut self) {
        for v in [
            &mut self.d,
            &mut self.p,
            &mut self.q,
            &mut self.dp,
            &mut self.dq,
            &mut self.qinv,
        ]
        .into_iter()
        .flatten()
        {
            v.zeroize();
        }
    }
}

impl RsaComponents {
    /// Modulus length in bits
    pub fn bits(&self) -> usize {
        match self.n.first() {
            Some(b) => self.n.len() * 8 - b.leading_zeros() as usize,
            None => 0,
        }
    }
}

fn private_components(k: &RsaPrivateKey) -> RsaComponents {
    RsaComponents {
        n: k.modulus.as_bytes().to_vec(),
        e: k.public_exponent.as_bytes().to_vec(),
        d: Some(k.private_exponent.as_bytes().to_vec()),
        p: Some(k.prime1.as_bytes().to_vec()),
        q: Some(k.prime2.as_bytes().to_vec()),
        dp: Some(k.exponent1.as_bytes().to_vec()),
        dq: Some(k.exponent2.as_bytes().to_vec()),
        qinv: Some(k.coefficient.as_bytes().to_vec()),
    }
}

/// Parse a PKCS#1 or PKCS#8 encoded RSA private key
pub fn parse_private(der: &[u8]) -> Result<RsaComponents, Error> {
    if let Ok(k) = RsaPrivateKey::try_from(der) {
        return Ok(private_components(&k));
    }

    let pk = pkcs8::PrivateKeyInfo::try_from(der)?;
    pk.algorithm.assert_algorithm_oid(RSA_ENCRYPTION)?;

    let k = RsaPrivateKey::try_from(pk.private_key)?;
    Ok(private_components(&k))
}

/// Parse an SPKI or PKCS#1 encoded RSA public key
pub fn parse_public(der: &[u8]) -> Result<RsaComponents, Error> {
    let k = match SubjectPublicKeyInfoRef::try_from(der) {
        Ok(spki) => {
            spki.algorithm.assert_algorithm_oid(RSA_ENCRYPTION)?;
            let raw = spki
                .subject_public_key
                .as_bytes()
                .ok_or(Error::InvalidArgument("unaligned public key"))?;
            RsaPublicKey::try_from(raw)?
        }
        Err(_) => RsaPublicKey::try_from(der)?,
    };

    Ok(RsaComponents {
        n: k.modulus.as_bytes().to_vec(),
        e: k.public_exponent.as_bytes().to_vec(),
        d: None,
        p: None,
        q: None,
        dp: None,
        dq: None,
        qinv: None,
    })
}

/// Assemble an SPKI from modulus and public exponent
pub fn encode_public(n: &[u8], e: &[u8]) -> Result<Vec<u8>, Error> {
    let k = RsaPublicKey {
        modulus: UintRef::new(n)?,
        public_exponent: UintRef::new(e)?,
    };

    let spki = SubjectPublicKeyInfoOwned {
        algorithm: AlgorithmIdentifierOwned {
            oid: RSA_ENCRYPTION,
            parameters: Some(Any::encode_from(&Null)?),
        },
        subject_public_key: BitString::from_bytes(&k.to_der()?)?,
    };

    Ok(spki.to_der()?)
}
