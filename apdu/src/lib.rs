// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Protocol / APDU definitions for NXP SE05x secure elements
//!
//! This module provides the wire-level vocabulary shared by the host library
//! and the software element: instruction / parameter / tag constants, the
//! TLV codec used for command and response bodies, ISO7816 command framing
//! (with extended length support), object and session policy encodings,
//! and the GlobalPlatform SCP03 primitives used for secure messaging.
//!
//! All multi-byte integer fields are big-endian, as on the card.
//!

use async_trait::async_trait;

mod error;
pub use error::ApduError;

pub mod command;
pub use command::{Command, Response};

pub mod tlv;
pub use tlv::{Tag, TlvMap, TlvWriter};

pub mod types;

pub mod policy;

pub mod attributes;

pub mod version;

pub mod scp03;

pub mod eckey;

pub mod attestation;

pub mod frame;

/// SE05x applet APDU class
pub const SE05X_CLA: u8 = 0x80;

/// Secure messaging class bit (set on SCP03 protected commands)
pub const CLA_SECURE_MESSAGING: u8 = 0x04;

/// SE05x IoT applet AID
pub const SE05X_APPLET_AID: [u8; 16] = [
    0xA0, 0x00, 0x00, 0x03, 0x96, 0x54, 0x53, 0x00, 0x00, 0x00, 0x01, 0x03, 0x00, 0x00, 0x00, 0x00,
];

/// Maximum payload for a single binary write / read chunk
pub const BINARY_WRITE_MAX_LEN: usize = 500;

/// Maximum payload forwarded per cipher / AEAD update
pub const CIPHER_UPDATE_MAX_DATA: usize = 512;

/// Maximum length of a single GetRandom request
pub const RANDOM_MAX_LEN: usize = 512;

/// Reserved object identifiers
pub mod ids {
    /// Transport lock / default UserID authentication object
    pub const TRANSPORT: u32 = 0x7FFF_0200;
    /// Element ECKA key pair used for ECKey sessions
    pub const KP_ECKEY_USER: u32 = 0x7FFF_0201;
    /// Element ECKA key pair used for key import
    pub const KP_ECKEY_IMPORT: u32 = 0x7FFF_0202;
    /// Applet feature configuration object
    pub const FEATURE: u32 = 0x7FFF_0204;
    /// Factory reset authentication object
    pub const FACTORY_RESET: u32 = 0x7FFF_0205;
    /// Element unique identifier
    pub const UNIQUE_ID: u32 = 0x7FFF_0206;
    /// Platform SCP03 key set
    pub const PLATFORM_SCP: u32 = 0x7FFF_0207;
    /// Element attestation key pair (NIST P-256)
    pub const ATTESTATION_KEY: u32 = 0xF000_0012;

    /// First identifier of the ECDAA random key range
    pub const ECDAA_RANDOM_START: u32 = 0x7DB0_0000;
    /// Last identifier of the ECDAA random key range
    pub const ECDAA_RANDOM_END: u32 = 0x7DB0_FFFF;

    /// Check whether an identifier falls in the ECDAA random key range
    pub const fn is_ecdaa_random(id: u32) -> bool {
        id & 0xFFFF_0000 == ECDAA_RANDOM_START
    }
}

/// Byte transport to an SE05x element.
///
/// Implementations send a fully framed command APDU and return the raw
/// response (data followed by the two status bytes).
#[async_trait]
pub trait Exchange {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Transmit a command APDU and wait for the response
    async fn exchange(&self, command: &[u8]) -> Result<Vec<u8>, Self::Error>;

    /// Close the underlying connection
    async fn close(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

#[async_trait]
impl<T: Exchange + Send + Sync> Exchange for std::sync::Arc<T> {
    type Error = T::Error;

    async fn exchange(&self, command: &[u8]) -> Result<Vec<u8>, Self::Error> {
        T::exchange(self, command).await
    }

    async fn close(&self) -> Result<(), Self::Error> {
        T::close(self).await
    }
}

/// Helper macro for encoding `bitflags` types as big-endian integers
#[macro_export]
macro_rules! encdec_bitflags {
    ($b:ty, $n:ty) => {
        impl encdec::Encode for $b {
            type Error = $crate::ApduError;

            fn encode(&self, buff: &mut [u8]) -> Result<usize, Self::Error> {
                let bits = self.bits().to_be_bytes();
                if buff.len() < bits.len() {
                    return Err($crate::ApduError::InvalidLength);
                }
                buff[..bits.len()].copy_from_slice(&bits);
                Ok(bits.len())
            }

            fn encode_len(&self) -> Result<usize, Self::Error> {
                Ok(core::mem::size_of::<$n>())
            }
        }

        impl encdec::DecodeOwned for $b {
            type Output = $b;
            type Error = $crate::ApduError;

            fn decode_owned(buff: &[u8]) -> Result<(Self, usize), Self::Error> {
                const N: usize = core::mem::size_of::<$n>();
                if buff.len() < N {
                    return Err($crate::ApduError::InvalidLength);
                }
                let mut b = [0u8; N];
                b.copy_from_slice(&buff[..N]);
                Ok((<$b>::from_bits_truncate(<$n>::from_be_bytes(b)), N))
            }
        }
    };
}
