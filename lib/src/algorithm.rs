// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Host algorithm identifiers and their element equivalents
//!
//! Each mapping is total over [Algorithm] and returns `None` where the
//! element has no equivalent, so unsupported combinations fail before any
//! APDU is sent.

use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use strum::{Display, EnumIter, EnumString};

use se05x_apdu::types::{
    CipherMode, DigestMode, EcSignatureAlgo, MacAlgo, RsaEncryptionAlgo, RsaSignatureAlgo,
};

/// Host algorithm identifiers
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Algorithm {
    AesEcb,
    AesCbc,
    AesCtr,
    /// AES CTR with an element generated IV (encrypt only)
    AesCtrIntIv,
    AesGcm,
    AesGcmIntIv,
    AesCcm,
    AesCcmIntIv,
    DesEcb,
    DesCbc,
    DesCbcIso9797M1,
    DesCbcIso9797M2,

    Cmac128,
    HmacSha1,
    HmacSha256,
    HmacSha384,
    HmacSha512,
    DesCmac8,

    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,

    EcdsaSha1,
    EcdsaSha224,
    EcdsaSha256,
    EcdsaSha384,
    EcdsaSha512,
    /// Pure Ed25519
    EdDsa,
    Ecdaa,

    RsaPkcs1Sha1,
    RsaPkcs1Sha224,
    RsaPkcs1Sha256,
    RsaPkcs1Sha384,
    RsaPkcs1Sha512,
    RsaPssSha1,
    RsaPssSha224,
    RsaPssSha256,
    RsaPssSha384,
    RsaPssSha512,
    /// PKCS#1 v1.5 signature padding over a caller supplied value
    RsaPkcs1NoHash,
    /// Raw RSA
    RsaNoPadding,

    RsaOaepSha1,
    RsaOaepSha224,
    RsaOaepSha256,
    RsaOaepSha384,
    RsaOaepSha512,
    RsaPkcs1v15,

    /// ECDH shared secret
    Ecdh,
}

/// Operation mode bound to a context
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum Mode {
    Encrypt,
    Decrypt,
    Sign,
    Verify,
    Mac,
    MacValidate,
    Digest,
    DeriveKey,
    ComputeSharedSecret,
}

impl Algorithm {
    /// RSA algorithms
    pub fn is_rsa(&self) -> bool {
        use Algorithm::*;
        matches!(
            self,
            RsaPkcs1Sha1
                | RsaPkcs1Sha224
                | RsaPkcs1Sha256
                | RsaPkcs1Sha384
                | RsaPkcs1Sha512
                | RsaPssSha1
                | RsaPssSha224
                | RsaPssSha256
                | RsaPssSha384
                | RsaPssSha512
                | RsaPkcs1NoHash
                | RsaNoPadding
                | RsaOaepSha1
                | RsaOaepSha224
                | RsaOaepSha256
                | RsaOaepSha384
                | RsaOaepSha512
                | RsaPkcs1v15
        )
    }

    /// Hash associated with a digest, signature or HMAC algorithm
    pub fn digest(&self) -> Option<DigestMode> {
        use Algorithm::*;
        match self {
            Sha1 | EcdsaSha1 | RsaPkcs1Sha1 | RsaPssSha1 | RsaOaepSha1 | HmacSha1 => {
                Some(DigestMode::Sha)
            }
            Sha224 | EcdsaSha224 | RsaPkcs1Sha224 | RsaPssSha224 | RsaOaepSha224 => {
                Some(DigestMode::Sha224)
            }
            Sha256 | EcdsaSha256 | RsaPkcs1Sha256 | RsaPssSha256 | RsaOaepSha256 | HmacSha256
            | Ecdaa => Some(DigestMode::Sha256),
            Sha384 | EcdsaSha384 | RsaPkcs1Sha384 | RsaPssSha384 | RsaOaepSha384 | HmacSha384 => {
                Some(DigestMode::Sha384)
            }
            Sha512 | EcdsaSha512 | RsaPkcs1Sha512 | RsaPssSha512 | RsaOaepSha512 | HmacSha512 => {
                Some(DigestMode::Sha512)
            }
            _ => None,
        }
    }

    /// Required digest length for sign / verify, `None` where any length
    /// is accepted
    pub fn digest_len(&self) -> Option<usize> {
        match self {
            Self::RsaPkcs1NoHash | Self::RsaNoPadding | Self::EdDsa => None,
            a => a.digest().map(|d| d.output_len()),
        }
    }
}

/// Element digest mode
pub fn digest_mode(a: Algorithm) -> Option<DigestMode> {
    use Algorithm::*;
    match a {
        Sha1 | Sha224 | Sha256 | Sha384 | Sha512 => a.digest(),
        _ => None,
    }
}

/// Element EC signature algorithm
pub fn ec_signature_algo(a: Algorithm) -> Option<EcSignatureAlgo> {
    use Algorithm::*;
    match a {
        Sha1 | EcdsaSha1 => Some(EcSignatureAlgo::Sha),
        Sha224 | EcdsaSha224 => Some(EcSignatureAlgo::Sha224),
        Sha256 | EcdsaSha256 => Some(EcSignatureAlgo::Sha256),
        Sha384 | EcdsaSha384 => Some(EcSignatureAlgo::Sha384),
        Sha512 | EcdsaSha512 => Some(EcSignatureAlgo::Sha512),
        EdDsa => Some(EcSignatureAlgo::Ed25519Pure),
        Ecdaa => Some(EcSignatureAlgo::Ecdaa),
        _ => None,
    }
}

/// Element RSA signature algorithm (hash performed on the element)
pub fn rsa_signature_algo(a: Algorithm) -> Option<RsaSignatureAlgo> {
    use Algorithm::*;
    match a {
        RsaPkcs1Sha1 => Some(RsaSignatureAlgo::Pkcs1Sha1),
        RsaPkcs1Sha224 => Some(RsaSignatureAlgo::Pkcs1Sha224),
        RsaPkcs1Sha256 => Some(RsaSignatureAlgo::Pkcs1Sha256),
        RsaPkcs1Sha384 => Some(RsaSignatureAlgo::Pkcs1Sha384),
        RsaPkcs1Sha512 => Some(RsaSignatureAlgo::Pkcs1Sha512),
        RsaPssSha1 => Some(RsaSignatureAlgo::PssSha1),
        RsaPssSha224 => Some(RsaSignatureAlgo::PssSha224),
        RsaPssSha256 => Some(RsaSignatureAlgo::PssSha256),
        RsaPssSha384 => Some(RsaSignatureAlgo::PssSha384),
        RsaPssSha512 => Some(RsaSignatureAlgo::PssSha512),
        _ => None,
    }
}

/// Element RSA encryption algorithm
pub fn rsa_encryption_algo(a: Algorithm) -> Option<RsaEncryptionAlgo> {
    use Algorithm::*;
    match a {
        RsaOaepSha1 => Some(RsaEncryptionAlgo::Oaep),
        RsaOaepSha224 | RsaOaepSha256 | RsaOaepSha384 | RsaOaepSha512 => None,
        RsaPkcs1v15 => Some(RsaEncryptionAlgo::Pkcs1),
        a if a.is_rsa() => Some(RsaEncryptionAlgo::NoPad),
        _ => None,
    }
}

/// Element cipher mode (symmetric and AEAD)
pub fn cipher_mode(a: Algorithm) -> Option<CipherMode> {
    use Algorithm::*;
    match a {
        AesEcb => Some(CipherMode::AesEcbNopad),
        AesCbc => Some(CipherMode::AesCbcNopad),
        AesCtr => Some(CipherMode::AesCtr),
        AesCtrIntIv => Some(CipherMode::AesCtrIntIv),
        AesGcm => Some(CipherMode::AesGcm),
        AesGcmIntIv => Some(CipherMode::AesGcmIntIv),
        AesCcm => Some(CipherMode::AesCcm),
        AesCcmIntIv => Some(CipherMode::AesCcmIntIv),
        DesEcb => Some(CipherMode::DesEcbNopad),
        DesCbc => Some(CipherMode::DesCbcNopad),
        DesCbcIso9797M1 => Some(CipherMode::DesCbcIso9797M1),
        DesCbcIso9797M2 => Some(CipherMode::DesCbcIso9797M2),
        _ => None,
    }
}

/// Element MAC algorithm
pub fn mac_algo(a: Algorithm) -> Option<MacAlgo> {
    use Algorithm::*;
    match a {
        Cmac128 => Some(MacAlgo::Cmac128),
        HmacSha1 => Some(MacAlgo::HmacSha1),
        HmacSha256 => Some(MacAlgo::HmacSha256),
        HmacSha384 => Some(MacAlgo::HmacSha384),
        HmacSha512 => Some(MacAlgo::HmacSha512),
        DesCmac8 => Some(MacAlgo::DesCmac8),
        _ => None,
    }
}

/// HKDF digest for an HMAC algorithm
pub fn hkdf_digest(a: Algorithm) -> Option<DigestMode> {
    use Algorithm::*;
    match a {
        HmacSha1 | HmacSha256 | HmacSha384 | HmacSha512 => a.digest(),
        _ => None,
    }
}

/// Compute a digest on the host
pub fn host_digest(mode: DigestMode, m: &[u8]) -> Option<Vec<u8>> {
    let h = match mode {
        DigestMode::Sha => Sha1::digest(m).to_vec(),
        DigestMode::Sha224 => Sha224::digest(m).to_vec(),
        DigestMode::Sha256 => Sha256::digest(m).to_vec(),
        DigestMode::Sha384 => Sha384::digest(m).to_vec(),
        DigestMode::Sha512 => Sha512::digest(m).to_vec(),
        DigestMode::NoHash => return None,
    };
    Some(h)
}

#[cfg(test)]
mod test {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn maps_are_total() {
        for a in Algorithm::iter() {
            let _ = (
                digest_mode(a),
                ec_signature_algo(a),
                rsa_signature_algo(a),
                rsa_encryption_algo(a),
                cipher_mode(a),
                mac_algo(a),
                hkdf_digest(a),
            );
        }
    }

    #[test]
    fn rsa_encryption_mapping() {
        assert_eq!(rsa_encryption_algo(Algorithm::RsaOaepSha1), Some(RsaEncryptionAlgo::Oaep));
        assert_eq!(rsa_encryption_algo(Algorithm::RsaOaepSha256), None);
        assert_eq!(rsa_encryption_algo(Algorithm::RsaPkcs1v15), Some(RsaEncryptionAlgo::Pkcs1));
        assert_eq!(rsa_encryption_algo(Algorithm::RsaNoPadding), Some(RsaEncryptionAlgo::NoPad));
        assert_eq!(rsa_encryption_algo(Algorithm::RsaPssSha256), Some(RsaEncryptionAlgo::NoPad));
        assert_eq!(rsa_encryption_algo(Algorithm::AesCbc), None);
    }

    #[test]
    fn digest_lengths() {
        assert_eq!(Algorithm::EcdsaSha1.digest_len(), Some(20));
        assert_eq!(Algorithm::Sha224.digest_len(), Some(28));
        assert_eq!(Algorithm::RsaPssSha384.digest_len(), Some(48));
        assert_eq!(Algorithm::Ecdaa.digest_len(), Some(32));
        assert_eq!(Algorithm::RsaNoPadding.digest_len(), None);
        assert_eq!(Algorithm::RsaPkcs1NoHash.digest_len(), None);
    }

    #[test]
    fn signature_mapping() {
        assert_eq!(ec_signature_algo(Algorithm::Sha256), Some(EcSignatureAlgo::Sha256));
        assert_eq!(ec_signature_algo(Algorithm::EcdsaSha256), Some(EcSignatureAlgo::Sha256));
        assert_eq!(ec_signature_algo(Algorithm::AesGcm), None);
        assert_eq!(rsa_signature_algo(Algorithm::RsaPssSha512), Some(RsaSignatureAlgo::PssSha512));
        assert_eq!(rsa_signature_algo(Algorithm::EcdsaSha256), None);
    }

    #[test]
    fn host_digest_lengths() {
        for m in [
            DigestMode::Sha,
            DigestMode::Sha224,
            DigestMode::Sha256,
            DigestMode::Sha384,
            DigestMode::Sha512,
        ] {
            assert_eq!(host_digest(m, b"abc").map(|h| h.len()), Some(m.output_len()));
        }
        assert_eq!(host_digest(DigestMode::NoHash, b"abc"), None);
    }

    #[test]
    fn parse_names() {
        assert_eq!("sha256".parse::<Algorithm>(), Ok(Algorithm::Sha256));
        assert_eq!("aes-ctr-int-iv".parse::<Algorithm>(), Ok(Algorithm::AesCtrIntIv));
    }
}
