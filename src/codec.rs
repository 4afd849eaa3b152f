//! Reversible public codes for sequential ids.
//!
//! A raw id `n` is first turned into `(n - 1)² + offset` where `offset = base^(min_length - 1)`, then written in the
//! alphabet's positional notation. The offset makes even the first ids produce codes of at least `min_length` symbols,
//! and since only perfect squares above the offset are valid most forged codes are rejected without a lookup.

use crate::config::AlphabetKind;
use crate::config::CodecConfig;
use crate::error::CodecError;

pub const BASE62_SYMBOLS: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
pub const BASE52_SYMBOLS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
pub const DEFAULT_MIN_LENGTH: u32 = 6;

/// Positional numeral system over a set of distinct printable ASCII symbols. The first symbol is zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alphabet {
    symbols: Vec<u8>,
    index:   [Option<u8>; 128],
}

impl Alphabet {
    pub fn new(symbols: &str) -> Result<Self, CodecError> {
        if symbols.len() < 2 {
            return Err(CodecError::InvalidAlphabet(format!(
                "needs at least two symbols, got {}",
                symbols.len()
            )));
        }
        let mut index = [None; 128];
        for (pos, byte) in symbols.bytes().enumerate() {
            if !byte.is_ascii_graphic() {
                return Err(CodecError::InvalidAlphabet(format!(
                    "symbol at position {pos} is not printable ASCII"
                )));
            }
            let slot = &mut index[byte as usize];
            if slot.is_some() {
                return Err(CodecError::InvalidAlphabet(format!("duplicate symbol '{}'", byte as char)));
            }
            // At most 94 printable symbols, so the position fits.
            *slot = Some(pos as u8);
        }
        Ok(Self {
            symbols: symbols.as_bytes().to_vec(),
            index,
        })
    }

    /// Digits, then upper case, then lower case letters.
    pub fn base62() -> Self {
        Self::builtin(BASE62_SYMBOLS)
    }

    /// Letters only.
    pub fn base52() -> Self {
        Self::builtin(BASE52_SYMBOLS)
    }

    fn builtin(symbols: &'static str) -> Self {
        let mut index = [None; 128];
        for (pos, byte) in symbols.bytes().enumerate() {
            index[byte as usize] = Some(pos as u8);
        }
        Self {
            symbols: symbols.as_bytes().to_vec(),
            index,
        }
    }

    pub fn base(&self) -> u32 {
        self.symbols.len() as u32
    }

    pub fn zero(&self) -> char {
        self.symbols[0] as char
    }

    pub fn symbols(&self) -> &str {
        // Only ASCII ever gets in.
        std::str::from_utf8(&self.symbols).unwrap_or_default()
    }

    fn digit(&self, symbol: char) -> Option<u128> {
        if symbol.is_ascii() {
            self.index[symbol as usize].map(u128::from)
        }
        else {
            None
        }
    }

    /// Zero is the zero symbol; other values never start with it.
    pub fn encode(&self, mut value: u128) -> String {
        if value == 0 {
            return self.zero().to_string();
        }
        let base = u128::from(self.base());
        let mut digits = Vec::new();
        while value > 0 {
            digits.push(self.symbols[(value % base) as usize]);
            value /= base;
        }
        digits.iter().rev().map(|&b| b as char).collect()
    }

    /// `None` on empty input, unknown symbols or overflow.
    pub fn decode(&self, encoded: &str) -> Option<u128> {
        if encoded.is_empty() {
            return None;
        }
        let base = u128::from(self.base());
        encoded
            .chars()
            .try_fold(0u128, |acc, symbol| acc.checked_mul(base)?.checked_add(self.digit(symbol)?))
    }
}

impl Default for Alphabet {
    fn default() -> Self {
        Self::base62()
    }
}

/// Maps raw ids `1..` to public codes and back.
///
/// ```
/// use ttl_schemes::codec::ReversibleIdCodec;
///
/// let codec = ReversibleIdCodec::default();
/// assert_eq!(codec.encode(1).unwrap(), "100000");
/// assert_eq!(codec.decode("100000"), Some(1));
/// assert_eq!(codec.decode("100001"), Some(2));
/// assert_eq!(codec.decode("100002"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReversibleIdCodec {
    alphabet:   Alphabet,
    min_length: u32,
    offset:     u128,
}

impl Default for ReversibleIdCodec {
    fn default() -> Self {
        let alphabet = Alphabet::base62();
        // 62^5 is nowhere near u128::MAX.
        let offset = u128::from(alphabet.base()).pow(DEFAULT_MIN_LENGTH - 1);
        Self {
            alphabet,
            min_length: DEFAULT_MIN_LENGTH,
            offset,
        }
    }
}

impl ReversibleIdCodec {
    pub fn new(alphabet: Alphabet, min_length: u32) -> Result<Self, CodecError> {
        let offset = min_length
            .checked_sub(1)
            .and_then(|exp| u128::from(alphabet.base()).checked_pow(exp))
            .ok_or(CodecError::MinLength {
                min_length,
                base: alphabet.base(),
            })?;
        Ok(Self {
            alphabet,
            min_length,
            offset,
        })
    }

    pub fn from_config(config: &CodecConfig) -> Result<Self, CodecError> {
        let alphabet = match &config.alphabet {
            AlphabetKind::Base62 => Alphabet::base62(),
            AlphabetKind::Base52 => Alphabet::base52(),
            AlphabetKind::Custom(symbols) => Alphabet::new(symbols)?,
        };
        Self::new(alphabet, config.min_length)
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub fn min_length(&self) -> u32 {
        self.min_length
    }

    pub fn offset(&self) -> u128 {
        self.offset
    }

    /// `(raw_id - 1)² + offset`.
    pub fn prepare(&self, raw_id: u64) -> Result<u128, CodecError> {
        if raw_id == 0 {
            return Err(CodecError::ZeroId);
        }
        let n = u128::from(raw_id - 1);
        n.checked_mul(n)
            .and_then(|square| square.checked_add(self.offset))
            .ok_or(CodecError::Overflow(raw_id))
    }

    /// Inverse of [`prepare`](Self::prepare). `None` unless `prepared - offset` is a perfect square.
    pub fn resolve(&self, prepared: u128) -> Option<u64> {
        let square = prepared.checked_sub(self.offset)?;
        let root = square.isqrt();
        if root * root != square {
            return None;
        }
        u64::try_from(root + 1).ok()
    }

    pub fn encode(&self, raw_id: u64) -> Result<String, CodecError> {
        Ok(self.alphabet.encode(self.prepare(raw_id)?))
    }

    /// The raw id behind `code`, or `None` if no raw id encodes to it.
    pub fn decode(&self, code: &str) -> Option<u64> {
        if code.starts_with(self.alphabet.zero()) {
            return None;
        }
        self.resolve(self.alphabet.decode(code)?)
    }
}
