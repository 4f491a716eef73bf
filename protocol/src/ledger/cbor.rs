//! # Minimal CBOR
//!
//! Just enough RFC 8949 to speak the ledger's wire format: unsigned and
//! negative integers, byte and text strings (definite and chunked), arrays
//! and maps (definite and indefinite), tags, and the simple values
//! `false`/`true`/`null`/`undefined`. Floats are rejected.
//!
//! The [`Encoder`] writes exactly the bytes it is told to write and nothing
//! else: byte-for-byte reproducibility matters more here than convenience,
//! because hashes of these encodings are compared on-chain.
//!
//! The decoder produces a [`Cbor`] tree. Definite and indefinite containers
//! decode to the same variant; callers that must preserve the original bytes
//! (COSE protected headers) keep them as a byte string.

use thiserror::Error;

/// Nesting limit for decoding untrusted input.
pub const MAX_DEPTH: usize = 64;

const MAJOR_UNSIGNED: u8 = 0;
const MAJOR_NEGATIVE: u8 = 1;
const MAJOR_BYTES: u8 = 2;
const MAJOR_TEXT: u8 = 3;
const MAJOR_ARRAY: u8 = 4;
const MAJOR_MAP: u8 = 5;
const MAJOR_TAG: u8 = 6;
const MAJOR_SIMPLE: u8 = 7;

const INDEFINITE: u8 = 31;
const BREAK: u8 = 0xff;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Decoding failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CborError {
    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("{0} trailing bytes after item")]
    TrailingBytes(usize),

    #[error("invalid initial byte 0x{0:02x}")]
    InvalidHead(u8),

    #[error("nesting deeper than {MAX_DEPTH}")]
    DepthExceeded,

    #[error("text string is not valid UTF-8")]
    InvalidUtf8,

    #[error("unsupported simple value or float (0x{0:02x})")]
    Unsupported(u8),

    #[error("chunk of an indefinite string has the wrong type")]
    InvalidChunk,

    #[error("length {0} does not fit in memory")]
    LengthOverflow(u64),
}

// ---------------------------------------------------------------------------
// Value tree
// ---------------------------------------------------------------------------

/// A decoded CBOR item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cbor {
    /// Major type 0.
    Unsigned(u64),
    /// Major type 1, holding `n` where the value is `-1 - n`.
    Negative(u64),
    Bytes(Vec<u8>),
    Text(String),
    Array(Vec<Cbor>),
    Map(Vec<(Cbor, Cbor)>),
    Tag(u64, Box<Cbor>),
    Bool(bool),
    Null,
    Undefined,
}

impl Cbor {
    /// Integer view of `Unsigned`/`Negative`.
    pub fn as_int(&self) -> Option<i128> {
        match self {
            Cbor::Unsigned(n) => Some(i128::from(*n)),
            Cbor::Negative(n) => Some(-1 - i128::from(*n)),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Cbor::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cbor::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Cbor]> {
        match self {
            Cbor::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Cbor, Cbor)]> {
        match self {
            Cbor::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Looks up a map entry by key.
    pub fn map_get(&self, key: &Cbor) -> Option<&Cbor> {
        self.as_map()?
            .iter()
            .find_map(|(k, v)| (k == key).then_some(v))
    }

    /// Definite-length encoding of this tree.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.item(self);
        enc.into_bytes()
    }
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/// Append-only CBOR writer.
#[derive(Debug, Default, Clone)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn head(&mut self, major: u8, value: u64) -> &mut Self {
        let m = major << 5;
        match value {
            0..=23 => self.buf.push(m | value as u8),
            24..=0xff => {
                self.buf.push(m | 24);
                self.buf.push(value as u8);
            }
            0x100..=0xffff => {
                self.buf.push(m | 25);
                self.buf.extend_from_slice(&(value as u16).to_be_bytes());
            }
            0x1_0000..=0xffff_ffff => {
                self.buf.push(m | 26);
                self.buf.extend_from_slice(&(value as u32).to_be_bytes());
            }
            _ => {
                self.buf.push(m | 27);
                self.buf.extend_from_slice(&value.to_be_bytes());
            }
        }
        self
    }

    pub fn unsigned(&mut self, value: u64) -> &mut Self {
        self.head(MAJOR_UNSIGNED, value)
    }

    /// Any integer. Values outside the 64-bit head range become bignums
    /// (tags 2 and 3).
    pub fn int(&mut self, value: i128) -> &mut Self {
        if value >= 0 {
            match u64::try_from(value) {
                Ok(v) => self.head(MAJOR_UNSIGNED, v),
                Err(_) => self.tag(2).bytes(&big_endian_magnitude(value as u128)),
            }
        } else {
            let magnitude = (-1 - value) as u128;
            match u64::try_from(magnitude) {
                Ok(v) => self.head(MAJOR_NEGATIVE, v),
                Err(_) => self.tag(3).bytes(&big_endian_magnitude(magnitude)),
            }
        }
    }

    pub fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.head(MAJOR_BYTES, bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Indefinite-length byte string split into chunks of `chunk` bytes.
    pub fn bytes_chunked(&mut self, bytes: &[u8], chunk: usize) -> &mut Self {
        self.buf.push((MAJOR_BYTES << 5) | INDEFINITE);
        for piece in bytes.chunks(chunk.max(1)) {
            self.bytes(piece);
        }
        self.end()
    }

    pub fn text(&mut self, text: &str) -> &mut Self {
        self.head(MAJOR_TEXT, text.len() as u64);
        self.buf.extend_from_slice(text.as_bytes());
        self
    }

    pub fn array(&mut self, len: usize) -> &mut Self {
        self.head(MAJOR_ARRAY, len as u64)
    }

    pub fn array_indefinite(&mut self) -> &mut Self {
        self.buf.push((MAJOR_ARRAY << 5) | INDEFINITE);
        self
    }

    pub fn map(&mut self, len: usize) -> &mut Self {
        self.head(MAJOR_MAP, len as u64)
    }

    /// Closes an indefinite-length container.
    pub fn end(&mut self) -> &mut Self {
        self.buf.push(BREAK);
        self
    }

    pub fn tag(&mut self, tag: u64) -> &mut Self {
        self.head(MAJOR_TAG, tag)
    }

    pub fn bool(&mut self, value: bool) -> &mut Self {
        self.buf.push(if value { 0xf5 } else { 0xf4 });
        self
    }

    pub fn null(&mut self) -> &mut Self {
        self.buf.push(0xf6);
        self
    }

    /// Splices already-encoded CBOR.
    pub fn raw(&mut self, encoded: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(encoded);
        self
    }

    /// Writes a decoded tree back out with definite lengths.
    pub fn item(&mut self, item: &Cbor) -> &mut Self {
        match item {
            Cbor::Unsigned(n) => self.head(MAJOR_UNSIGNED, *n),
            Cbor::Negative(n) => self.head(MAJOR_NEGATIVE, *n),
            Cbor::Bytes(b) => self.bytes(b),
            Cbor::Text(t) => self.text(t),
            Cbor::Array(items) => {
                self.array(items.len());
                for i in items {
                    self.item(i);
                }
                self
            }
            Cbor::Map(entries) => {
                self.map(entries.len());
                for (k, v) in entries {
                    self.item(k);
                    self.item(v);
                }
                self
            }
            Cbor::Tag(tag, inner) => {
                self.tag(*tag);
                self.item(inner)
            }
            Cbor::Bool(b) => self.bool(*b),
            Cbor::Null => self.null(),
            Cbor::Undefined => {
                self.buf.push(0xf7);
                self
            }
        }
    }
}

fn big_endian_magnitude(value: u128) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
    bytes[first..].to_vec()
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Decodes exactly one item spanning all of `bytes`.
pub fn decode(bytes: &[u8]) -> Result<Cbor, CborError> {
    let (item, used) = decode_prefix(bytes)?;
    if used != bytes.len() {
        return Err(CborError::TrailingBytes(bytes.len() - used));
    }
    Ok(item)
}

/// Decodes one item from the front of `bytes`, returning it and the number
/// of bytes consumed.
pub fn decode_prefix(bytes: &[u8]) -> Result<(Cbor, usize), CborError> {
    let mut reader = Reader { bytes, pos: 0 };
    let item = reader.item(0)?;
    Ok((item, reader.pos))
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

enum Head {
    Definite(u64),
    Indefinite,
}

impl<'a> Reader<'a> {
    fn byte(&mut self) -> Result<u8, CborError> {
        let b = *self.bytes.get(self.pos).ok_or(CborError::UnexpectedEof)?;
        self.pos += 1;
        Ok(b)
    }

    fn peek(&self) -> Result<u8, CborError> {
        self.bytes.get(self.pos).copied().ok_or(CborError::UnexpectedEof)
    }

    fn take(&mut self, len: u64) -> Result<&'a [u8], CborError> {
        let len = usize::try_from(len).map_err(|_| CborError::LengthOverflow(len))?;
        let end = self.pos.checked_add(len).ok_or(CborError::LengthOverflow(len as u64))?;
        let slice = self.bytes.get(self.pos..end).ok_or(CborError::UnexpectedEof)?;
        self.pos = end;
        Ok(slice)
    }

    fn argument(&mut self, initial: u8) -> Result<Head, CborError> {
        let info = initial & 0x1f;
        let value = match info {
            0..=23 => u64::from(info),
            24 => u64::from(self.byte()?),
            25 => u64::from(u16::from_be_bytes([self.byte()?, self.byte()?])),
            26 => {
                let s = self.take(4)?;
                u64::from(u32::from_be_bytes([s[0], s[1], s[2], s[3]]))
            }
            27 => {
                let s = self.take(8)?;
                let mut arr = [0u8; 8];
                arr.copy_from_slice(s);
                u64::from_be_bytes(arr)
            }
            INDEFINITE => return Ok(Head::Indefinite),
            _ => return Err(CborError::InvalidHead(initial)),
        };
        Ok(Head::Definite(value))
    }

    fn at_break(&mut self) -> Result<bool, CborError> {
        if self.peek()? == BREAK {
            self.pos += 1;
            return Ok(true);
        }
        Ok(false)
    }

    fn chunks(&mut self, major: u8) -> Result<Vec<u8>, CborError> {
        let mut out = Vec::new();
        while !self.at_break()? {
            let initial = self.byte()?;
            if initial >> 5 != major {
                return Err(CborError::InvalidChunk);
            }
            match self.argument(initial)? {
                Head::Definite(len) => out.extend_from_slice(self.take(len)?),
                Head::Indefinite => return Err(CborError::InvalidChunk),
            }
        }
        Ok(out)
    }

    fn item(&mut self, depth: usize) -> Result<Cbor, CborError> {
        if depth > MAX_DEPTH {
            return Err(CborError::DepthExceeded);
        }
        let initial = self.byte()?;
        let major = initial >> 5;

        if major == MAJOR_SIMPLE {
            return match initial & 0x1f {
                20 => Ok(Cbor::Bool(false)),
                21 => Ok(Cbor::Bool(true)),
                22 => Ok(Cbor::Null),
                23 => Ok(Cbor::Undefined),
                _ => Err(CborError::Unsupported(initial)),
            };
        }

        let head = self.argument(initial)?;
        match (major, head) {
            (MAJOR_UNSIGNED, Head::Definite(n)) => Ok(Cbor::Unsigned(n)),
            (MAJOR_NEGATIVE, Head::Definite(n)) => Ok(Cbor::Negative(n)),
            (MAJOR_BYTES, Head::Definite(len)) => Ok(Cbor::Bytes(self.take(len)?.to_vec())),
            (MAJOR_BYTES, Head::Indefinite) => Ok(Cbor::Bytes(self.chunks(MAJOR_BYTES)?)),
            (MAJOR_TEXT, head) => {
                let raw = match head {
                    Head::Definite(len) => self.take(len)?.to_vec(),
                    Head::Indefinite => self.chunks(MAJOR_TEXT)?,
                };
                String::from_utf8(raw)
                    .map(Cbor::Text)
                    .map_err(|_| CborError::InvalidUtf8)
            }
            (MAJOR_ARRAY, Head::Definite(len)) => {
                let mut items = Vec::new();
                for _ in 0..len {
                    items.push(self.item(depth + 1)?);
                }
                Ok(Cbor::Array(items))
            }
            (MAJOR_ARRAY, Head::Indefinite) => {
                let mut items = Vec::new();
                while !self.at_break()? {
                    items.push(self.item(depth + 1)?);
                }
                Ok(Cbor::Array(items))
            }
            (MAJOR_MAP, Head::Definite(len)) => {
                let mut entries = Vec::new();
                for _ in 0..len {
                    let key = self.item(depth + 1)?;
                    let value = self.item(depth + 1)?;
                    entries.push((key, value));
                }
                Ok(Cbor::Map(entries))
            }
            (MAJOR_MAP, Head::Indefinite) => {
                let mut entries = Vec::new();
                while !self.at_break()? {
                    let key = self.item(depth + 1)?;
                    let value = self.item(depth + 1)?;
                    entries.push((key, value));
                }
                Ok(Cbor::Map(entries))
            }
            (MAJOR_TAG, Head::Definite(tag)) => {
                Ok(Cbor::Tag(tag, Box::new(self.item(depth + 1)?)))
            }
            _ => Err(CborError::InvalidHead(initial)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
