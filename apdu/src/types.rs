// Copyright (c) 2022-2023 The MobileCoin Foundation

//! SE05x wire enumerations

use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum::{Display, EnumIter};

/// Instruction codes (low nibble of INS)
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Instruction {
    /// Create or update a secure object
    Write = 0x01,
    /// Read a secure object or its metadata
    Read = 0x02,
    /// Cryptographic operation
    Crypto = 0x03,
    /// Management (sessions, existence, deletion, random)
    Mgmt = 0x04,
    /// Process a wrapped session command
    Process = 0x05,
    /// Import an externally wrapped object
    ImportExternal = 0x06,
}

/// Transient object modifier
pub const INS_TRANSIENT: u8 = 0x80;
/// Authentication object modifier
pub const INS_AUTH_OBJECT: u8 = 0x40;
/// Attested read modifier
pub const INS_ATTEST: u8 = 0x20;
/// Mask selecting the base instruction
pub const INS_MASK: u8 = 0x0F;

/// Key part bits of P1
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum KeyPart {
    Na = 0x00,
    Pair = 0x60,
    Private = 0x40,
    Public = 0x20,
}

/// Mask selecting the key part bits of P1
pub const P1_KEY_PART_MASK: u8 = 0x60;
/// Mask selecting the object type bits of P1
pub const P1_TYPE_MASK: u8 = 0x1F;

/// P1 object / operation classes
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum P1 {
    Default = 0x00,
    Ec = 0x01,
    Rsa = 0x02,
    Aes = 0x03,
    Des = 0x04,
    Hmac = 0x05,
    Binary = 0x06,
    UserId = 0x07,
    Counter = 0x08,
    Pcr = 0x09,
    Curve = 0x0B,
    Signature = 0x0C,
    Mac = 0x0D,
    Cipher = 0x0E,
    Tls = 0x0F,
    CryptoObj = 0x10,
    Aead = 0x11,
    Unused = 0x80,
}

impl P1 {
    /// Combine an object class with a key part
    pub fn with_part(self, part: KeyPart) -> u8 {
        u8::from(self) | u8::from(part)
    }
}

/// P2 operation selectors
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum P2 {
    Default = 0x00,
    Generate = 0x03,
    Create = 0x04,
    Size = 0x07,
    Sign = 0x09,
    Verify = 0x0A,
    Init = 0x0B,
    Update = 0x0C,
    Final = 0x0D,
    Oneshot = 0x0E,
    Dh = 0x0F,
    Import = 0x18,
    Export = 0x19,
    SessionCreate = 0x1B,
    SessionClose = 0x1C,
    SessionRefresh = 0x1E,
    SessionPolicy = 0x1F,
    Version = 0x20,
    Memory = 0x22,
    List = 0x25,
    Type = 0x26,
    Exist = 0x27,
    DeleteObject = 0x28,
    DeleteAll = 0x2A,
    SessionUserId = 0x2C,
    Hkdf = 0x2D,
    HkdfExpandOnly = 0x2F,
    Mac = 0x32,
    CurveList = 0x34,
    SignEcdaa = 0x35,
    Id = 0x36,
    EncryptOneshot = 0x37,
    DecryptOneshot = 0x38,
    Attributes = 0x3B,
    Variant = 0x3F,
    DeleteCurve = 0x41,
    Encrypt = 0x42,
    Decrypt = 0x43,
    Validate = 0x44,
    GenerateOneshot = 0x45,
    ValidateOneshot = 0x46,
    CryptoList = 0x47,
    Random = 0x49,
    Scp = 0x52,
    Sanity = 0x58,
    DhReverse = 0x59,
    /// Plain (non-CRT) RSA key format
    Raw = 0x7C,
}

/// Response status words
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum Status {
    Ok = 0x9000,
    WrongLength = 0x6700,
    SecurityStatus = 0x6982,
    DataInvalid = 0x6984,
    ConditionsNotSatisfied = 0x6985,
    CommandNotAllowed = 0x6986,
    WrongData = 0x6A80,
    FileNotFound = 0x6A82,
    InsNotSupported = 0x6D00,
    ClaNotSupported = 0x6E00,
    NoPreciseDiagnosis = 0x6F00,
}

/// Boolean result byte
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SeResult {
    Success = 0x01,
    Failure = 0x02,
}

/// Curve list indicator
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SetIndicator {
    NotSet = 0x01,
    Set = 0x02,
}

/// Persistent / transient object indicator
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum TransientIndicator {
    Persistent = 0x01,
    Transient = 0x02,
}

/// Object origin reported in attributes
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Origin {
    Na = 0x00,
    External = 0x01,
    Internal = 0x02,
    Provisioned = 0x03,
}

/// Secure object types
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SecObjType {
    EcKeyPair = 0x01,
    EcPrivKey = 0x02,
    EcPubKey = 0x03,
    RsaKeyPair = 0x04,
    RsaKeyPairCrt = 0x05,
    RsaPrivKey = 0x06,
    RsaPrivKeyCrt = 0x07,
    RsaPubKey = 0x08,
    AesKey = 0x09,
    DesKey = 0x0A,
    BinaryFile = 0x0B,
    UserId = 0x0C,
    Counter = 0x0D,
    Pcr = 0x0F,
    Curve = 0x10,
    HmacKey = 0x11,
}

/// Elliptic curves known to the applet
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumIter, IntoPrimitive, TryFromPrimitive,
)]
#[repr(u8)]
pub enum EcCurve {
    NistP192 = 0x01,
    NistP224 = 0x02,
    NistP256 = 0x03,
    NistP384 = 0x04,
    NistP521 = 0x05,
    Brainpool160 = 0x06,
    Brainpool192 = 0x07,
    Brainpool224 = 0x08,
    Brainpool256 = 0x09,
    Brainpool320 = 0x0A,
    Brainpool384 = 0x0B,
    Brainpool512 = 0x0C,
    Secp160k1 = 0x0D,
    Secp192k1 = 0x0E,
    Secp224k1 = 0x0F,
    Secp256k1 = 0x10,
    BnP256 = 0x11,
    Ed25519 = 0x40,
    MontDh25519 = 0x41,
    MontDh448 = 0x43,
}

impl EcCurve {
    /// Curves that are built in to the applet and never listed / created
    pub fn is_reserved(&self) -> bool {
        matches!(self, Self::Ed25519 | Self::MontDh25519 | Self::MontDh448)
    }
}

/// Number of entries in the applet curve list
pub const CURVE_LIST_LEN: usize = 0x11;

/// Digest modes
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum DigestMode {
    NoHash = 0x00,
    Sha = 0x01,
    Sha256 = 0x04,
    Sha384 = 0x05,
    Sha512 = 0x06,
    Sha224 = 0x07,
}

impl DigestMode {
    /// Digest output length in bytes
    pub fn output_len(&self) -> usize {
        match self {
            Self::NoHash => 0,
            Self::Sha => 20,
            Self::Sha224 => 28,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }
}

/// MAC algorithms
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MacAlgo {
    HmacSha1 = 0x18,
    HmacSha256 = 0x19,
    HmacSha384 = 0x1A,
    HmacSha512 = 0x1B,
    Cmac128 = 0x31,
    DesCmac8 = 0x7A,
}

/// EC signature algorithms
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum EcSignatureAlgo {
    Plain = 0x09,
    Sha = 0x11,
    Sha256 = 0x21,
    Sha384 = 0x22,
    Sha224 = 0x25,
    Sha512 = 0x26,
    Ed25519Pure = 0xA3,
    Ecdaa = 0xF4,
}

/// RSA signature algorithms
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum RsaSignatureAlgo {
    Pkcs1Sha1 = 0x0A,
    PssSha1 = 0x15,
    Pkcs1Sha224 = 0x27,
    Pkcs1Sha256 = 0x28,
    Pkcs1Sha384 = 0x29,
    Pkcs1Sha512 = 0x2A,
    PssSha224 = 0x2B,
    PssSha256 = 0x2C,
    PssSha384 = 0x2D,
    PssSha512 = 0x2E,
}

impl RsaSignatureAlgo {
    /// Digest used by the signature algorithm
    pub fn digest(&self) -> DigestMode {
        use RsaSignatureAlgo::*;
        match self {
            Pkcs1Sha1 | PssSha1 => DigestMode::Sha,
            Pkcs1Sha224 | PssSha224 => DigestMode::Sha224,
            Pkcs1Sha256 | PssSha256 => DigestMode::Sha256,
            Pkcs1Sha384 | PssSha384 => DigestMode::Sha384,
            Pkcs1Sha512 | PssSha512 => DigestMode::Sha512,
        }
    }

    /// Check for PSS padding
    pub fn is_pss(&self) -> bool {
        use RsaSignatureAlgo::*;
        matches!(self, PssSha1 | PssSha224 | PssSha256 | PssSha384 | PssSha512)
    }
}

/// RSA encryption algorithms
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum RsaEncryptionAlgo {
    Pkcs1 = 0x0A,
    NoPad = 0x0C,
    Oaep = 0x0F,
}

/// RSA key components for read / write / export
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum RsaKeyComponent {
    Mod = 0x00,
    PubExp = 0x01,
    PrivExp = 0x02,
    P = 0x03,
    Q = 0x04,
    Dp = 0x05,
    Dq = 0x06,
    InvQ = 0x07,
    Na = 0xFF,
}

/// Cipher and AEAD modes
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum CipherMode {
    DesCbcNopad = 0x01,
    DesCbcIso9797M1 = 0x02,
    DesCbcIso9797M2 = 0x03,
    DesEcbNopad = 0x05,
    AesCbcNopad = 0x0D,
    AesEcbNopad = 0x0E,
    AesGcm = 0xB0,
    AesCtr = 0xF0,
    AesGcmIntIv = 0xF3,
    AesCcm = 0xF4,
    AesCcmIntIv = 0xF5,
    AesCtrIntIv = 0xF6,
}

impl CipherMode {
    /// Block length used for streaming aggregation
    pub fn block_len(&self) -> usize {
        use CipherMode::*;
        match self {
            DesCbcNopad | DesCbcIso9797M1 | DesCbcIso9797M2 | DesEcbNopad => 8,
            _ => 16,
        }
    }

    /// Modes operating on a DES key
    pub fn is_des(&self) -> bool {
        self.block_len() == 8
    }

    /// Modes without an IV
    pub fn is_ecb(&self) -> bool {
        matches!(self, Self::AesEcbNopad | Self::DesEcbNopad)
    }

    /// Modes where the element generates the IV
    pub fn is_internal_iv(&self) -> bool {
        matches!(self, Self::AesGcmIntIv | Self::AesCcmIntIv | Self::AesCtrIntIv)
    }

    /// AEAD modes
    pub fn is_aead(&self) -> bool {
        use CipherMode::*;
        matches!(self, AesGcm | AesGcmIntIv | AesCcm | AesCcmIntIv)
    }

    /// CCM modes
    pub fn is_ccm(&self) -> bool {
        matches!(self, Self::AesCcm | Self::AesCcmIntIv)
    }
}

/// Crypto object contexts
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum CryptoContext {
    Digest = 0x01,
    Cipher = 0x02,
    Signature = 0x03,
    Aead = 0x04,
}

/// HKDF modes
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum HkdfMode {
    ExtractAndExpand = 0x01,
    ExpandOnly = 0x02,
}

/// Memory pools reported by GetFreeMemory
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum MemoryType {
    Persistent = 0x01,
    TransientReset = 0x02,
    TransientDeselect = 0x03,
}

bitflags::bitflags! {
    /// Applet feature / variant selection
    pub struct AppletFeatures: u16 {
        const ECDAA = 0x0001;
        const ECDSA_ECDH_ECDHE = 0x0002;
        const EDDSA = 0x0004;
        const DH_MONT = 0x0008;
        const HMAC = 0x0010;
        const RSA_PLAIN = 0x0020;
        const RSA_CRT = 0x0040;
        const AES = 0x0080;
        const DES = 0x0100;
        const PBKDF = 0x0200;
        const TLS = 0x0400;
        const MIFARE = 0x0800;
        const I2CM = 0x2000;
    }
}

crate::encdec_bitflags!(AppletFeatures, u16);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn p1_key_part() {
        assert_eq!(P1::Ec.with_part(KeyPart::Pair), 0x61);
        assert_eq!(P1::Rsa.with_part(KeyPart::Public), 0x22);
        assert_eq!(P1::Aes.with_part(KeyPart::Na), 0x03);
    }

    #[test]
    fn cipher_mode_blocks() {
        assert_eq!(CipherMode::DesEcbNopad.block_len(), 8);
        assert_eq!(CipherMode::AesCtr.block_len(), 16);
        assert!(CipherMode::AesCtrIntIv.is_internal_iv());
        assert!(!CipherMode::AesCtr.is_internal_iv());
        assert!(CipherMode::AesCcmIntIv.is_aead() && CipherMode::AesCcmIntIv.is_ccm());
    }

    #[test]
    fn features_encoding() {
        use encdec::{DecodeOwned, Encode};

        let f = AppletFeatures::ECDAA | AppletFeatures::AES | AppletFeatures::I2CM;
        let mut b = [0u8; 2];
        assert_eq!(f.encode(&mut b), Ok(2));
        assert_eq!(b, [0x20, 0x81]);
        assert_eq!(AppletFeatures::decode_owned(&b), Ok((f, 2)));
    }
}
