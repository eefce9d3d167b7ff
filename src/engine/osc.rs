//! Open Sound Control 1.0 messages
//!
//! Only the argument types scsynth exchanges with a client are supported:
//! int32, float32, string and blob. Bundles are not decoded.

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

/// Errors decoding an OSC packet
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OscError {
    #[error("packet truncated")]
    Truncated,

    #[error("string is not terminated or not UTF-8")]
    BadString,

    #[error("address must start with '/': {0:?}")]
    BadAddress(String),

    #[error("unsupported argument type '{0}'")]
    UnsupportedType(char),

    #[error("bundles are not supported")]
    Bundle,
}

/// A single message argument
#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    Int(i32),
    Float(f32),
    Str(String),
    Blob(Vec<u8>),
}

impl OscArg {
    fn tag(&self) -> char {
        match self {
            OscArg::Int(_) => 'i',
            OscArg::Float(_) => 'f',
            OscArg::Str(_) => 's',
            OscArg::Blob(_) => 'b',
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            OscArg::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OscArg::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i32> for OscArg {
    fn from(v: i32) -> Self {
        OscArg::Int(v)
    }
}

impl From<f32> for OscArg {
    fn from(v: f32) -> Self {
        OscArg::Float(v)
    }
}

impl From<&str> for OscArg {
    fn from(v: &str) -> Self {
        OscArg::Str(v.to_string())
    }
}

impl From<String> for OscArg {
    fn from(v: String) -> Self {
        OscArg::Str(v)
    }
}

impl From<Vec<u8>> for OscArg {
    fn from(v: Vec<u8>) -> Self {
        OscArg::Blob(v)
    }
}

/// An OSC message: an address pattern and its arguments
#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub addr: String,
    pub args: Vec<OscArg>,
}

impl OscMessage {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument
    pub fn arg(mut self, arg: impl Into<OscArg>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Encode as a UDP packet
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64);
        write_string(&mut buf, &self.addr);

        let mut tags = String::with_capacity(self.args.len() + 1);
        tags.push(',');
        tags.extend(self.args.iter().map(OscArg::tag));
        write_string(&mut buf, &tags);

        // Writes into a Vec cannot fail
        for arg in &self.args {
            match arg {
                OscArg::Int(v) => {
                    let _ = buf.write_i32::<BigEndian>(*v);
                }
                OscArg::Float(v) => {
                    let _ = buf.write_f32::<BigEndian>(*v);
                }
                OscArg::Str(s) => write_string(&mut buf, s),
                OscArg::Blob(data) => {
                    let _ = buf.write_i32::<BigEndian>(data.len() as i32);
                    buf.extend_from_slice(data);
                    pad(&mut buf);
                }
            }
        }
        buf
    }

    /// Decode a packet holding a single message
    pub fn decode(packet: &[u8]) -> Result<Self, OscError> {
        if packet.starts_with(b"#bundle") {
            return Err(OscError::Bundle);
        }
        let mut cur = Cursor::new(packet);
        let addr = read_string(&mut cur)?;
        if !addr.starts_with('/') {
            return Err(OscError::BadAddress(addr));
        }

        // Some senders omit the type tag string when there are no arguments
        if cur.position() as usize >= packet.len() {
            return Ok(Self::new(addr));
        }
        let tags = read_string(&mut cur)?;
        let tags = tags.strip_prefix(',').ok_or(OscError::BadString)?;

        let mut args = Vec::with_capacity(tags.len());
        for tag in tags.chars() {
            let arg = match tag {
                'i' => OscArg::Int(cur.read_i32::<BigEndian>().map_err(|_| OscError::Truncated)?),
                'f' => OscArg::Float(cur.read_f32::<BigEndian>().map_err(|_| OscError::Truncated)?),
                's' => OscArg::Str(read_string(&mut cur)?),
                'b' => {
                    let len = cur.read_i32::<BigEndian>().map_err(|_| OscError::Truncated)?;
                    let len = usize::try_from(len).map_err(|_| OscError::Truncated)?;
                    let mut data = vec![0u8; len];
                    cur.read_exact(&mut data).map_err(|_| OscError::Truncated)?;
                    skip_padding(&mut cur, len);
                    OscArg::Blob(data)
                }
                other => return Err(OscError::UnsupportedType(other)),
            };
            args.push(arg);
        }
        Ok(Self { addr, args })
    }
}

fn pad(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

/// Null-terminated, padded to a multiple of four bytes
fn write_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
    pad(buf);
}

fn read_string(cur: &mut Cursor<&[u8]>) -> Result<String, OscError> {
    let start = cur.position() as usize;
    let rest = &cur.get_ref()[start..];
    let len = rest.iter().position(|b| *b == 0).ok_or(OscError::BadString)?;
    let s = std::str::from_utf8(&rest[..len])
        .map_err(|_| OscError::BadString)?
        .to_string();
    let padded = (len + 4) & !3;
    if start + padded > cur.get_ref().len() {
        return Err(OscError::Truncated);
    }
    cur.set_position((start + padded) as u64);
    Ok(s)
}

fn skip_padding(cur: &mut Cursor<&[u8]>, len: usize) {
    let extra = (4 - len % 4) % 4;
    cur.set_position(cur.position() + extra as u64);
}
