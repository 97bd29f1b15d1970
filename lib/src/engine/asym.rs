// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Asymmetric sign / verify / encrypt / decrypt

use log::{debug, error};

use se05x_apdu::{
    types::{DigestMode, EcSignatureAlgo, RsaEncryptionAlgo},
    Exchange,
};

use crate::{
    algorithm::{ec_signature_algo, host_digest, rsa_encryption_algo, rsa_signature_algo},
    key_object::{CipherType, KeyObject},
    rsa_pad::{modulus_len, pkcs1v15_encode, pss_encode, pss_verify},
    Algorithm, Error, KeyStore, Mode, Session,
};

/// Ed25519 signature half length
const ED25519_HALF: usize = 32;

/// Asymmetric operation context
pub struct Asymmetric<T> {
    session: Session<T>,
    key: KeyObject,
    algorithm: Algorithm,
    mode: Mode,
}

/// Reverse each half of an Ed25519 signature (`R || S`) between host and
/// element byte order
fn reverse_halves(sig: &[u8]) -> Result<Vec<u8>, Error> {
    if sig.len() != 2 * ED25519_HALF {
        return Err(Error::InvalidArgument("invalid Ed25519 signature length"));
    }

    let mut s = sig.to_vec();
    s[..ED25519_HALF].reverse();
    s[ED25519_HALF..].reverse();
    Ok(s)
}

impl<T: Exchange + Send + Sync> Asymmetric<T> {
    /// Bind a key, algorithm and mode
    pub fn new(
        store: &KeyStore<T>,
        key: &KeyObject,
        algorithm: Algorithm,
        mode: Mode,
    ) -> Result<Self, Error> {
        store.check_owner(key)?;

        if !matches!(mode, Mode::Sign | Mode::Verify | Mode::Encrypt | Mode::Decrypt) {
            return Err(Error::InvalidArgument("invalid mode for asymmetric context"));
        }

        let ok = match key.cipher {
            CipherType::Rsa | CipherType::RsaCrt => algorithm.is_rsa(),
            CipherType::EcNistP | CipherType::EcNistK | CipherType::EcBrainpool => {
                ec_signature_algo(algorithm).is_some() && algorithm != Algorithm::EdDsa
            }
            CipherType::EcTwistedEd => algorithm == Algorithm::EdDsa,
            CipherType::EcBarretoNaehrig => algorithm == Algorithm::Ecdaa,
            CipherType::EcMontgomery => return Err(Error::Unsupported("Montgomery signatures")),
            _ => false,
        };

        if !ok {
            error!("Algorithm {} not valid for {} key", algorithm, key.cipher);
            return Err(Error::Unsupported("algorithm for key type"));
        }

        Ok(Self {
            session: store.session().clone(),
            key: key.clone(),
            algorithm,
            mode,
        })
    }

    fn check_mode(&self, m: Mode) -> Result<(), Error> {
        match self.mode == m {
            true => Ok(()),
            false => Err(Error::InvalidArgument("operation does not match context mode")),
        }
    }

    fn check_digest_len(&self, digest: &[u8]) -> Result<(), Error> {
        match self.algorithm.digest_len() {
            Some(n) if n != digest.len() => {
                error!("Digest length {} invalid for {}", digest.len(), self.algorithm);
                Err(Error::InvalidArgument("digest length does not match algorithm"))
            }
            _ => Ok(()),
        }
    }

    fn modulus_len(&self) -> Result<usize, Error> {
        match self.key.size {
            0 => Err(Error::InvalidArgument("RSA key size unknown")),
            b => Ok(modulus_len(b)),
        }
    }

    fn digest_mode(&self) -> DigestMode {
        self.algorithm.digest().unwrap_or(DigestMode::NoHash)
    }

    /// Encode an RSA signature block for a digest
    fn rsa_encode(&self, digest: &[u8]) -> Result<Vec<u8>, Error> {
        use Algorithm::*;

        let k = self.modulus_len()?;

        match self.algorithm {
            RsaPkcs1Sha1 | RsaPkcs1Sha224 | RsaPkcs1Sha256 | RsaPkcs1Sha384 | RsaPkcs1Sha512 => {
                pkcs1v15_encode(self.digest_mode(), digest, k)
            }
            RsaPkcs1NoHash => pkcs1v15_encode(DigestMode::NoHash, digest, k),
            RsaPssSha1 | RsaPssSha224 | RsaPssSha256 | RsaPssSha384 | RsaPssSha512 => {
                let salt: Vec<u8> = (0..digest.len()).map(|_| rand::random()).collect();
                pss_encode(self.digest_mode(), digest, self.key.size, &salt)
            }
            RsaNoPadding => match digest.len() == k {
                true => Ok(digest.to_vec()),
                false => Err(Error::InvalidArgument("raw RSA input must match modulus length")),
            },
            _ => Err(Error::Unsupported("RSA signature algorithm")),
        }
    }

    /// Sign a precomputed digest
    pub async fn sign_digest(&self, digest: &[u8]) -> Result<Vec<u8>, Error> {
        self.check_mode(Mode::Sign)?;
        self.check_digest_len(digest)?;

        debug!(
            "Sign digest with 0x{:08x} ({})",
            self.key.key_id, self.algorithm
        );

        match self.key.cipher {
            CipherType::Rsa | CipherType::RsaCrt => {
                let block = self.rsa_encode(digest)?;
                self.session
                    .rsa_decrypt(self.key.key_id, RsaEncryptionAlgo::NoPad, &block)
                    .await
            }
            CipherType::EcTwistedEd => {
                let sig = self
                    .session
                    .ec_sign(self.key.key_id, EcSignatureAlgo::Ed25519Pure, digest)
                    .await?;
                reverse_halves(&sig)
            }
            CipherType::EcBarretoNaehrig => {
                let random = self.session.ensure_ecdaa_random_key().await?;
                self.session
                    .ecdaa_sign(self.key.key_id, digest, random)
                    .await
            }
            _ => {
                let algo = ec_signature_algo(self.algorithm)
                    .ok_or(Error::Unsupported("EC signature algorithm"))?;
                self.session.ec_sign(self.key.key_id, algo, digest).await
            }
        }
    }

    /// Verify a signature over a precomputed digest
    pub async fn verify_digest(&self, digest: &[u8], sig: &[u8]) -> Result<bool, Error> {
        self.check_mode(Mode::Verify)?;
        self.check_digest_len(digest)?;

        debug!(
            "Verify digest with 0x{:08x} ({})",
            self.key.key_id, self.algorithm
        );

        match self.key.cipher {
            CipherType::Rsa | CipherType::RsaCrt => {
                let k = self.modulus_len()?;
                let block = self
                    .session
                    .rsa_encrypt(self.key.key_id, RsaEncryptionAlgo::NoPad, sig)
                    .await?;

                // Restore leading zeros dropped by the element
                let mut padded = vec![0u8; k.saturating_sub(block.len())];
                padded.extend_from_slice(&block);

                let ok = match self.algorithm {
                    a if rsa_signature_algo(a).map(|s| s.is_pss()) == Some(true) => {
                        pss_verify(self.digest_mode(), digest, &padded, self.key.size)
                    }
                    _ => self.rsa_encode(digest)? == padded,
                };
                Ok(ok)
            }
            CipherType::EcTwistedEd => {
                let sig = reverse_halves(sig)?;
                self.session
                    .ec_verify(self.key.key_id, EcSignatureAlgo::Ed25519Pure, digest, &sig)
                    .await
            }
            CipherType::EcBarretoNaehrig => Err(Error::Unsupported("ECDAA verification")),
            _ => {
                let algo = ec_signature_algo(self.algorithm)
                    .ok_or(Error::Unsupported("EC signature algorithm"))?;
                self.session
                    .ec_verify(self.key.key_id, algo, digest, sig)
                    .await
            }
        }
    }

    fn host_hash(&self, message: &[u8]) -> Result<Vec<u8>, Error> {
        match self.algorithm {
            Algorithm::EdDsa => Ok(message.to_vec()),
            a => a
                .digest()
                .and_then(|d| host_digest(d, message))
                .ok_or(Error::Unsupported("hash-and-sign algorithm")),
        }
    }

    /// Hash and sign a message
    pub async fn sign(&self, message: &[u8]) -> Result<Vec<u8>, Error> {
        self.check_mode(Mode::Sign)?;

        match rsa_signature_algo(self.algorithm) {
            Some(algo) if self.key.cipher.is_rsa() => {
                self.session.rsa_sign(self.key.key_id, algo, message).await
            }
            _ => self.sign_digest(&self.host_hash(message)?).await,
        }
    }

    /// Hash and verify a message
    pub async fn verify(&self, message: &[u8], sig: &[u8]) -> Result<bool, Error> {
        self.check_mode(Mode::Verify)?;

        match rsa_signature_algo(self.algorithm) {
            Some(algo) if self.key.cipher.is_rsa() => {
                self.session
                    .rsa_verify(self.key.key_id, algo, message, sig)
                    .await
            }
            _ => self.verify_digest(&self.host_hash(message)?, sig).await,
        }
    }

    fn encryption_algo(&self) -> Result<RsaEncryptionAlgo, Error> {
        if !self.key.cipher.is_rsa() {
            return Err(Error::Unsupported("asymmetric encryption for key type"));
        }
        rsa_encryption_algo(self.algorithm).ok_or(Error::Unsupported("RSA encryption algorithm"))
    }

    pub async fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        self.check_mode(Mode::Encrypt)?;
        let algo = self.encryption_algo()?;

        self.session
            .rsa_encrypt(self.key.key_id, algo, data)
            .await
    }

    pub async fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        self.check_mode(Mode::Decrypt)?;
        let algo = self.encryption_algo()?;

        self.session
            .rsa_decrypt(self.key.key_id, algo, data)
            .await
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ed25519_halves() {
        let sig: Vec<u8> = (0..64).collect();
        let r = reverse_halves(&sig).unwrap();

        assert_eq!(r[0], 31);
        assert_eq!(r[31], 0);
        assert_eq!(r[32], 63);
        assert_eq!(r[63], 32);
        assert_eq!(reverse_halves(&r).unwrap(), sig);

        assert!(reverse_halves(&sig[..63]).is_err());
    }
}
