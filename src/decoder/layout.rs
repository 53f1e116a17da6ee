//! Bounds-checked little-endian reader shared by the account decoders
//!
//! Every read returns `None` instead of panicking when the buffer is too
//! short, so a truncated or hostile account can only make a decoder give up.

use solana_sdk::pubkey::Pubkey;

/// Upper bounds for the three length-prefixed metadata strings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLimits {
    pub name: usize,
    pub symbol: usize,
    pub uri: usize,
}

impl FieldLimits {
    /// Bounds enforced on the legacy metadata account
    pub const LEGACY: FieldLimits = FieldLimits {
        name: 100,
        symbol: 20,
        uri: 200,
    };

    /// Extension and event payloads: bounded only by the remaining buffer
    pub const UNBOUNDED: FieldLimits = FieldLimits {
        name: usize::MAX,
        symbol: usize::MAX,
        uri: usize::MAX,
    };
}

/// Name, symbol and uri read in sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataStrings {
    pub name: String,
    pub symbol: String,
    /// Empty uri is legal and maps to `None`
    pub uri: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Reader positioned at `offset`, or `None` when the offset is past the end
    pub fn at(buf: &'a [u8], offset: usize) -> Option<Self> {
        if offset > buf.len() {
            return None;
        }
        Some(Self { buf, pos: offset })
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn skip(&mut self, n: usize) -> Option<()> {
        self.read_bytes(n).map(|_| ())
    }

    pub fn read_bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let slice = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        self.read_bytes(1).map(|b| b[0])
    }

    pub fn read_u16_le(&mut self) -> Option<u16> {
        let bytes = self.read_bytes(2)?;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32_le(&mut self) -> Option<u32> {
        let bytes: [u8; 4] = self.read_bytes(4)?.try_into().ok()?;
        Some(u32::from_le_bytes(bytes))
    }

    pub fn read_u64_le(&mut self) -> Option<u64> {
        let bytes: [u8; 8] = self.read_bytes(8)?.try_into().ok()?;
        Some(u64::from_le_bytes(bytes))
    }

    pub fn read_pubkey(&mut self) -> Option<Pubkey> {
        let bytes: [u8; 32] = self.read_bytes(32)?.try_into().ok()?;
        Some(Pubkey::new_from_array(bytes))
    }

    /// Read a u32-LE length followed by that many UTF-8 bytes
    ///
    /// The length is checked against `max_len` and the remaining buffer
    /// before any byte of the string is consumed.
    pub fn read_prefixed_str(&mut self, max_len: usize) -> Option<&'a str> {
        let mut ahead = self.clone();
        let len = ahead.read_u32_le()? as usize;
        if len > max_len || len > ahead.remaining() {
            return None;
        }
        let bytes = ahead.read_bytes(len)?;
        let text = std::str::from_utf8(bytes).ok()?;
        *self = ahead;
        Some(text)
    }

    /// Read name, symbol and uri; an empty name or symbol aborts
    pub fn read_metadata_strings(&mut self, limits: FieldLimits) -> Option<MetadataStrings> {
        let name = self.read_prefixed_str(limits.name)?;
        let symbol = self.read_prefixed_str(limits.symbol)?;
        let uri = self.read_prefixed_str(limits.uri)?;
        if name.is_empty() || symbol.is_empty() {
            return None;
        }
        Some(MetadataStrings {
            name: name.to_string(),
            symbol: symbol.to_string(),
            uri: (!uri.is_empty()).then(|| uri.to_string()),
        })
    }
}

/// Append a u32-LE length-prefixed string
pub fn write_prefixed_str(out: &mut Vec<u8>, value: &str) {
    out.extend_from_slice(&(value.len() as u32).to_le_bytes());
    out.extend_from_slice(value.as_bytes());
}

/// Encode name, symbol and uri in the shared length-prefixed layout
pub fn encode_metadata_strings(name: &str, symbol: &str, uri: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(12 + name.len() + symbol.len() + uri.len());
    write_prefixed_str(&mut out, name);
    write_prefixed_str(&mut out, symbol);
    write_prefixed_str(&mut out, uri);
    out
}
