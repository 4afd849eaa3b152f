//! Key derivation.
//!
//! A key has the layout `[prefix ":"] [scope ":"] namespace ":" body [":" suffix]`. The body is the serialized
//! prekey: one type-tagged token per [`KeyPart`], tokens joined with `-`. Every other segment is escaped so that it
//! never contains `:`, which keeps the layout unambiguous.
//!
//! | part          | token                                    |
//! | ------------- | ---------------------------------------- |
//! | string        | `s` + lowercase hex of the UTF-8 bytes   |
//! | integer ≥ 0   | `i` + decimal digits                     |
//! | integer < 0   | `m` + decimal digits of the absolute     |
//! | bool          | `b1` / `b0`                              |
//! | none          | `z`                                      |
//! | float         | `f` + hex of the IEEE-754 bits           |
//! | tuple         | `t` + arity, then the children's tokens  |
//!
//! Keys longer than the configured maximum get their body and suffix replaced with `h` followed by a SHA-256 digest.

use serde_json::Value;
use sha2::Digest;
use sha2::Sha256;
use std::fmt::Write;

use crate::error::KeyError;

/// Memcached won't take anything longer.
pub const MAX_KEY_LENGTH: usize = 250;
/// A fully hashed key is 65 bytes; leave a little room for the prefix.
pub const MIN_KEY_LENGTH: usize = 72;
pub const DEFAULT_PREKEY: &str = "default";

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Str(String),
    Int(i128),
    Bool(bool),
    Float(f64),
    None,
    Tuple(Vec<KeyPart>),
}

/// One prekey component.
///
/// Built through `From` conversions for strings, integers, booleans, options, vectors and tuples. Floats go through
/// the fallible [`KeyPart::float`] and JSON values through `TryFrom<Value>`, so an unusable component is rejected
/// before a key is ever built from it.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyPart(Part);

impl KeyPart {
    pub fn none() -> Self {
        Self(Part::None)
    }

    pub fn float(v: f64) -> Result<Self, KeyError> {
        if !v.is_finite() {
            return Err(KeyError::NonFiniteFloat(v));
        }
        // -0.0 and 0.0 are the same number to whoever built the prekey.
        Ok(Self(Part::Float(if v == 0.0 { 0.0 } else { v })))
    }

    /// Any displayable value, e.g. an enum variant, stored by its string form.
    pub fn display(v: impl std::fmt::Display) -> Self {
        Self(Part::Str(v.to_string()))
    }

    pub fn tuple<I, T>(parts: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<KeyPart>,
    {
        Self(Part::Tuple(parts.into_iter().map(Into::into).collect()))
    }

    fn write_token(&self, out: &mut String) {
        match &self.0 {
            Part::Str(s) => {
                out.push('s');
                out.push_str(&hex::encode(s.as_bytes()));
            }
            Part::Int(i) if *i < 0 => {
                let _ = write!(out, "m{}", i.unsigned_abs());
            }
            Part::Int(i) => {
                let _ = write!(out, "i{i}");
            }
            Part::Bool(b) => out.push_str(if *b { "b1" } else { "b0" }),
            Part::Float(f) => {
                let _ = write!(out, "f{:016x}", f.to_bits());
            }
            Part::None => out.push('z'),
            Part::Tuple(parts) => {
                let _ = write!(out, "t{}", parts.len());
                for part in parts {
                    out.push('-');
                    part.write_token(out);
                }
            }
        }
    }
}

impl From<&str> for KeyPart {
    fn from(v: &str) -> Self {
        Self(Part::Str(v.to_string()))
    }
}

impl From<String> for KeyPart {
    fn from(v: String) -> Self {
        Self(Part::Str(v))
    }
}

impl From<&String> for KeyPart {
    fn from(v: &String) -> Self {
        Self(Part::Str(v.clone()))
    }
}

impl From<char> for KeyPart {
    fn from(v: char) -> Self {
        Self(Part::Str(v.to_string()))
    }
}

impl From<bool> for KeyPart {
    fn from(v: bool) -> Self {
        Self(Part::Bool(v))
    }
}

macro_rules! int_key_part {
    ($($t:ty),*) => {
        $(
            impl From<$t> for KeyPart {
                fn from(v: $t) -> Self {
                    Self(Part::Int(v as i128))
                }
            }
        )*
    };
}

int_key_part!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, usize);

impl<T> From<Option<T>> for KeyPart
where
    T: Into<KeyPart>,
{
    fn from(v: Option<T>) -> Self {
        v.map_or_else(KeyPart::none, Into::into)
    }
}

impl<T> From<Vec<T>> for KeyPart
where
    T: Into<KeyPart>,
{
    fn from(v: Vec<T>) -> Self {
        KeyPart::tuple(v)
    }
}

impl<A, B> From<(A, B)> for KeyPart
where
    A: Into<KeyPart>,
    B: Into<KeyPart>,
{
    fn from((a, b): (A, B)) -> Self {
        Self(Part::Tuple(vec![a.into(), b.into()]))
    }
}

impl<A, B, C> From<(A, B, C)> for KeyPart
where
    A: Into<KeyPart>,
    B: Into<KeyPart>,
    C: Into<KeyPart>,
{
    fn from((a, b, c): (A, B, C)) -> Self {
        Self(Part::Tuple(vec![a.into(), b.into(), c.into()]))
    }
}

impl TryFrom<Value> for KeyPart {
    type Error = KeyError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Ok(match value {
            Value::Null => KeyPart::none(),
            Value::Bool(b) => b.into(),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    i.into()
                }
                else if let Some(u) = n.as_u64() {
                    u.into()
                }
                else {
                    KeyPart::float(n.as_f64().ok_or(KeyError::Unsupported("JSON number"))?)?
                }
            }
            Value::String(s) => s.into(),
            Value::Array(items) => Self(Part::Tuple(
                items.into_iter().map(KeyPart::try_from).collect::<Result<Vec<_>, _>>()?,
            )),
            Value::Object(_) => return Err(KeyError::Unsupported("JSON object")),
        })
    }
}

/// The ordered list of key parts identifying one resource within a scheme.
#[derive(Debug, Clone, PartialEq)]
pub struct Prekey(Vec<KeyPart>);

impl Prekey {
    /// An empty list of parts is the same as the default prekey.
    pub fn from_parts(parts: Vec<KeyPart>) -> Self {
        if parts.is_empty() {
            Self::default()
        }
        else {
            Self(parts)
        }
    }

    /// A JSON array becomes one part per element, any other value a single part.
    pub fn try_from_json(value: Value) -> Result<Self, KeyError> {
        match value {
            Value::Array(items) => Ok(Self::from_parts(
                items.into_iter().map(KeyPart::try_from).collect::<Result<Vec<_>, _>>()?,
            )),
            other => Ok(Self(vec![KeyPart::try_from(other)?])),
        }
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }
}

impl Default for Prekey {
    fn default() -> Self {
        Self(vec![KeyPart::from(DEFAULT_PREKEY)])
    }
}

impl From<KeyPart> for Prekey {
    fn from(part: KeyPart) -> Self {
        Self(vec![part])
    }
}

/// Serializes the parts into the key body. Injective: distinct part lists never produce the same body.
pub fn serialize_parts(parts: &[KeyPart]) -> String {
    if parts.is_empty() {
        return "_".to_string();
    }
    let mut body = String::new();
    for (idx, part) in parts.iter().enumerate() {
        if idx > 0 {
            body.push('-');
        }
        part.write_token(&mut body);
    }
    body
}

/// Keeps `[A-Za-z0-9_]`, turns every other byte into `%XX`.
pub fn escape_segment(segment: &str) -> String {
    let mut escaped = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' {
            escaped.push(byte as char);
        }
        else {
            let _ = write!(escaped, "%{byte:02X}");
        }
    }
    if escaped.is_empty() {
        escaped.push('_');
    }
    escaped
}

fn digest(text: &str) -> String {
    format!("h{}", hex::encode(Sha256::digest(text.as_bytes())))
}

/// The last path segment of a type name with generic arguments stripped; the default scheme namespace.
pub fn type_namespace<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBuilder {
    prefix:     Option<String>,
    max_length: usize,
    // Scope used by a sibling builder; a namespace spelled the same gets its first byte escaped.
    reserved:   Option<String>,
}

impl Default for KeyBuilder {
    fn default() -> Self {
        Self {
            prefix:     None,
            max_length: MAX_KEY_LENGTH,
            reserved:   None,
        }
    }
}

impl KeyBuilder {
    pub fn new(prefix: Option<&str>, max_length: usize) -> Self {
        Self {
            prefix:     prefix.filter(|p| !p.is_empty()).map(escape_segment),
            max_length: max_length.max(MIN_KEY_LENGTH),
            reserved:   None,
        }
    }

    /// Keep keys of this builder apart from those of `self.scoped(scope)`.
    pub fn reserving(mut self, scope: &str) -> Self {
        self.reserved = Some(escape_segment(scope));
        self
    }

    /// A builder whose keys live under an extra `scope` segment right after the prefix.
    pub fn scoped(&self, scope: &str) -> Self {
        let scope = escape_segment(scope);
        Self {
            prefix:     Some(match &self.prefix {
                Some(prefix) => format!("{prefix}:{scope}"),
                None => scope,
            }),
            max_length: self.max_length,
            reserved:   None,
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn build(&self, namespace: &str, components: &[KeyPart], suffix: Option<&str>) -> String {
        let mut head = String::new();
        if let Some(prefix) = &self.prefix {
            head.push_str(prefix);
            head.push(':');
        }
        let namespace = escape_segment(namespace);
        match &self.reserved {
            // Alphanumerics are never escaped otherwise, so this spelling is unique to the reserved name.
            Some(reserved) if *reserved == namespace && !namespace.starts_with('%') => {
                let _ = write!(head, "%{:02X}", namespace.as_bytes()[0]);
                head.push_str(&namespace[1..]);
            }
            _ => head.push_str(&namespace),
        }

        let mut tail = serialize_parts(components);
        if let Some(suffix) = suffix {
            tail.push(':');
            tail.push_str(&escape_segment(suffix));
        }

        if head.len() + 1 + tail.len() <= self.max_length {
            return format!("{head}:{tail}");
        }

        let key = format!("{head}:{}", digest(&tail));
        if key.len() <= self.max_length {
            key
        }
        else {
            digest(&format!("{head}:{tail}"))
        }
    }
}

/// Builds a key with the default builder: no prefix, [`MAX_KEY_LENGTH`] bound.
pub fn build_key(namespace: &str, components: &[KeyPart], suffix: Option<&str>) -> String {
    KeyBuilder::default().build(namespace, components, suffix)
}
