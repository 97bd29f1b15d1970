// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Command / response APDU framing
//!
//! ## Command encoding
//!
//! ```text
//! +-----+-----+----+----+------------------+--------+-------+
//! | CLA | INS | P1 | P2 | Lc (1 or 3 bytes)|  DATA  | Le(2) |
//! +-----+-----+----+----+------------------+--------+-------+
//! ```
//!
//! A short (single byte) Lc is used only when the body is shorter than
//! `0xFF` bytes and no response data is expected, otherwise the extended
//! form `00 HH LL` is used. An empty body is encoded as a single `00` and
//! expected responses append a two byte `00 00` Le. Bodies longer than
//! `0xFFFF` bytes cannot be framed.

use byteorder::{BigEndian, ByteOrder};

use crate::{types::Status, ApduError, TlvMap, TlvWriter, SE05X_CLA};

/// Command APDU
#[derive(Clone, PartialEq, Eq)]
pub struct Command {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Vec<u8>,
    /// Response data expected (append extended Le)
    pub le: bool,
}

impl core::fmt::Debug for Command {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "Command {{ {:02x} {:02x} {:02x} {:02x}, {} bytes, le: {} }}",
            self.cla,
            self.ins,
            self.p1,
            self.p2,
            self.data.len(),
            self.le
        )
    }
}

impl Command {
    /// Create a new SE05x applet command with an empty body
    pub fn new(ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla: SE05X_CLA,
            ins,
            p1,
            p2,
            data: vec![],
            le: false,
        }
    }

    /// Set the command class
    pub fn with_cla(mut self, cla: u8) -> Self {
        self.cla = cla;
        self
    }

    /// Set the command body
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    /// Set the command body from a TLV writer
    pub fn with_tlv(mut self, w: TlvWriter) -> Result<Self, ApduError> {
        self.data = w.finish()?;
        Ok(self)
    }

    /// Mark the command as expecting response data
    pub fn expect_response(mut self) -> Self {
        self.le = true;
        self
    }

    /// Command header bytes
    pub fn header(&self) -> [u8; 4] {
        [self.cla, self.ins, self.p1, self.p2]
    }

    /// Encode the Lc field for a body of `len` bytes
    pub fn lc_bytes(len: usize, le: bool) -> Result<Vec<u8>, ApduError> {
        match (len, le) {
            (0, _) => Ok(vec![]),
            (n, false) if n < 0xFF => Ok(vec![n as u8]),
            (n, _) if n <= 0xFFFF => Ok(vec![0x00, (n >> 8) as u8, n as u8]),
            _ => Err(ApduError::InvalidLength),
        }
    }

    /// Encode a complete command APDU
    pub fn encode(&self) -> Result<Vec<u8>, ApduError> {
        let mut buff = Vec::with_capacity(self.data.len() + 9);

        buff.extend_from_slice(&self.header());

        match self.data.len() {
            0 => buff.push(0x00),
            n => {
                buff.extend_from_slice(&Self::lc_bytes(n, self.le)?);
                buff.extend_from_slice(&self.data);
            }
        }

        if self.le {
            buff.extend_from_slice(&[0x00, 0x00]);
        }

        Ok(buff)
    }

    /// Decode a command APDU produced by [Command::encode]
    pub fn decode(buff: &[u8]) -> Result<Self, ApduError> {
        if buff.len() < 4 {
            return Err(ApduError::InvalidLength);
        }

        let (h, body) = buff.split_at(4);
        let mut c = Self {
            cla: h[0],
            ins: h[1],
            p1: h[2],
            p2: h[3],
            data: vec![],
            le: false,
        };

        match body {
            // No body, no Le
            [] | [0x00] => (),
            // Empty body with extended Le
            [0x00, 0x00, 0x00] => c.le = true,
            // Extended Lc
            [0x00, rest @ ..] if rest.len() >= 2 => {
                let n = BigEndian::read_u16(rest) as usize;
                let rest = &rest[2..];
                match rest.len() {
                    l if l == n => (),
                    l if l == n + 2 => c.le = true,
                    _ => return Err(ApduError::InvalidLength),
                }
                c.data = rest[..n].to_vec();
            }
            // Short Lc
            [n, rest @ ..] if rest.len() == *n as usize => {
                c.data = rest.to_vec();
            }
            _ => return Err(ApduError::InvalidLength),
        }

        Ok(c)
    }

    /// Parse the command body as TLV fields
    pub fn tlv(&self) -> Result<TlvMap<'_>, ApduError> {
        TlvMap::parse(&self.data)
    }
}

/// Response APDU
#[derive(Clone, PartialEq, Eq)]
pub struct Response {
    pub data: Vec<u8>,
    pub sw: u16,
}

impl core::fmt::Debug for Response {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Response {{ sw: {:04x}, {} bytes }}", self.sw, self.data.len())
    }
}

impl Response {
    /// Create a response with the provided data and status
    pub fn new(data: Vec<u8>, sw: u16) -> Self {
        Self { data, sw }
    }

    /// Create a successful response
    pub fn ok(data: Vec<u8>) -> Self {
        Self::new(data, Status::Ok as u16)
    }

    /// Create an error response with no data
    pub fn status(s: Status) -> Self {
        Self::new(vec![], s as u16)
    }

    /// Split a raw response into data and status word
    pub fn parse(buff: &[u8]) -> Result<Self, ApduError> {
        if buff.len() < 2 {
            return Err(ApduError::InvalidLength);
        }

        let (d, sw) = buff.split_at(buff.len() - 2);

        Ok(Self {
            data: d.to_vec(),
            sw: BigEndian::read_u16(sw),
        })
    }

    /// Encode response data and status word
    pub fn encode(&self) -> Vec<u8> {
        let mut b = self.data.clone();
        b.extend_from_slice(&self.sw.to_be_bytes());
        b
    }

    /// Check for `SW_NO_ERROR`
    pub fn is_ok(&self) -> bool {
        self.sw == Status::Ok as u16
    }

    /// Parse response data as TLV fields
    pub fn tlv(&self) -> Result<TlvMap<'_>, ApduError> {
        TlvMap::parse(&self.data)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn short_frame() {
        let c = Command::new(0x04, 0x00, 0x27).with_data(vec![0x41, 0x04, 1, 2, 3, 4]);
        let b = c.encode().unwrap();

        assert_eq!(
            b,
            [0x80, 0x04, 0x00, 0x27, 0x06, 0x41, 0x04, 1, 2, 3, 4]
        );
        assert_eq!(Command::decode(&b), Ok(c));
    }

    #[test]
    fn extended_frame_with_le() {
        let c = Command::new(0x04, 0x00, 0x27)
            .with_data(vec![0x41, 0x04, 1, 2, 3, 4])
            .expect_response();
        let b = c.encode().unwrap();

        assert_eq!(
            b,
            [0x80, 0x04, 0x00, 0x27, 0x00, 0x00, 0x06, 0x41, 0x04, 1, 2, 3, 4, 0x00, 0x00]
        );
        assert_eq!(Command::decode(&b), Ok(c));
    }

    #[test]
    fn extended_frame_long_body() {
        let c = Command::new(0x01, 0x06, 0x00).with_data(vec![0xab; 0xFF]);
        let b = c.encode().unwrap();

        assert_eq!(&b[4..7], &[0x00, 0x00, 0xFF]);
        assert_eq!(b.len(), 4 + 3 + 0xFF);
        assert_eq!(Command::decode(&b), Ok(c));
    }

    #[test]
    fn oversized_body() {
        let c = Command::new(0x01, 0x06, 0x00).with_data(vec![0xab; 0xFFFF]);
        assert_eq!(c.encode().map(|b| b.len()), Ok(4 + 3 + 0xFFFF));

        let c = Command::new(0x01, 0x06, 0x00).with_data(vec![0xab; 0x10000]);
        assert_eq!(c.encode(), Err(ApduError::InvalidLength));
        assert_eq!(Command::lc_bytes(0x10000, true), Err(ApduError::InvalidLength));
    }

    #[test]
    fn empty_frames() {
        let c = Command::new(0x04, 0x00, 0x20);
        assert_eq!(c.encode().unwrap(), [0x80, 0x04, 0x00, 0x20, 0x00]);
        assert_eq!(Command::decode(&c.encode().unwrap()), Ok(c.clone()));

        let c = c.expect_response();
        assert_eq!(c.encode().unwrap(), [0x80, 0x04, 0x00, 0x20, 0x00, 0x00, 0x00]);
        assert_eq!(Command::decode(&c.encode().unwrap()), Ok(c));
    }

    #[test]
    fn response_split() {
        let r = Response::parse(&[0x41, 0x01, 0x01, 0x90, 0x00]).unwrap();
        assert!(r.is_ok());
        assert_eq!(r.data, [0x41, 0x01, 0x01]);
        assert_eq!(r.encode(), [0x41, 0x01, 0x01, 0x90, 0x00]);

        assert_eq!(Response::parse(&[0x90]), Err(ApduError::InvalidLength));
    }
}
