// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::time::Duration;

use log::warn;

use se05x_sss::RetryConfig;

/// Environment variable setting the applet select / connect attempt count
pub const RETRY_COUNT_ENV: &str = "SE05X_RETRY_COUNT";

/// Environment variable setting the delay between attempts (ms)
pub const RETRY_DELAY_ENV: &str = "SE05X_RETRY_DELAY_MS";

/// Hex encoded byte string argument
#[derive(Clone, PartialEq, Debug)]
pub struct HexData(pub Vec<u8>);

impl std::str::FromStr for HexData {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim_start_matches("0x");
        hex::decode(s).map(HexData)
    }
}

impl AsRef<[u8]> for HexData {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for HexData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

/// Fixed length hex encoded key argument
#[derive(Clone, PartialEq, Debug)]
pub struct HexKey<const N: usize = 16>(pub [u8; N]);

impl<const N: usize> std::str::FromStr for HexKey<N> {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut b = [0u8; N];

        hex::decode_to_slice(s.trim_start_matches("0x"), &mut b)?;

        Ok(HexKey(b))
    }
}

/// Parse an object id in hex (with or without `0x`) or decimal
pub fn parse_id(s: &str) -> Result<u32, std::num::ParseIntError> {
    match s.strip_prefix("0x") {
        Some(h) => u32::from_str_radix(h, 16),
        None => s.parse(),
    }
}

/// Load the retry configuration from the environment, falling back to
/// defaults for missing or out of range values
pub fn retry_from_env() -> RetryConfig {
    retry_from(
        std::env::var(RETRY_COUNT_ENV).ok().as_deref(),
        std::env::var(RETRY_DELAY_ENV).ok().as_deref(),
    )
}

fn retry_from(count: Option<&str>, delay: Option<&str>) -> RetryConfig {
    let d = RetryConfig::default();

    let count = match count.map(str::parse::<u32>) {
        Some(Ok(c)) => c,
        Some(Err(e)) => {
            warn!("Ignoring invalid {}: {}", RETRY_COUNT_ENV, e);
            d.count()
        }
        None => d.count(),
    };

    let delay = match delay.map(str::parse::<u64>) {
        Some(Ok(ms)) => Duration::from_millis(ms),
        Some(Err(e)) => {
            warn!("Ignoring invalid {}: {}", RETRY_DELAY_ENV, e);
            d.delay()
        }
        None => d.delay(),
    };

    match RetryConfig::new(count, delay) {
        Ok(r) => r,
        Err(e) => {
            warn!("Ignoring retry configuration: {}", e);
            d
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn retry_env_values() {
        let r = retry_from(Some("5"), Some("250"));
        assert_eq!(r.count(), 5);
        assert_eq!(r.delay(), Duration::from_millis(250));

        assert_eq!(retry_from(None, None), RetryConfig::default());
        assert_eq!(retry_from(Some("abc"), None), RetryConfig::default());

        // Out of bounds falls back entirely
        assert_eq!(retry_from(Some("500"), Some("10")), RetryConfig::default());
        assert_eq!(retry_from(Some("2"), Some("20000")), RetryConfig::default());
    }

    #[test]
    fn object_ids() {
        assert_eq!(parse_id("0x7FFF0206"), Ok(0x7FFF_0206));
        assert_eq!(parse_id("42"), Ok(42));
        assert!(parse_id("0xZZ").is_err());
    }

    #[test]
    fn hex_args() {
        assert_eq!("0x0102".parse::<HexData>().unwrap().0, vec![1, 2]);
        assert!("010".parse::<HexData>().is_err());
        assert!("0011".parse::<HexKey<16>>().is_err());
    }
}
