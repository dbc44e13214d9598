//! Decoding of discriminated unions.
//!
//! A discriminated union is a closed Rust enum with one variant per known
//! discriminator literal. [`Polymorphic`] describes the table; [`decode`]
//! reads only the discriminator field from a generic JSON value, picks the
//! variant and deserializes the full payload into it.
//!
//! Unknown or absent discriminators decode to the fallback variant when the
//! set is [`VariantSetKind::Extensible`] and fail with
//! [`RuntimeError::UnknownDiscriminator`] when it is
//! [`VariantSetKind::Fixed`].
//!
//! Types implement `Serialize`/`Deserialize` through [`serialize`] and
//! [`deserialize`], so polymorphic values nested inside other models decode
//! the same way. Nested collections that may hold `null` use `Option<T>`
//! elements, which keeps them as `None` like [`decode_array`] and
//! [`decode_map`] do.

use std::collections::HashMap;

use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{Result, RuntimeError};

/// How a variant set treats discriminator values it does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantSetKind {
    /// Unknown values decode into the fallback variant.
    Extensible,
    /// Unknown values are an error.
    Fixed,
}

/// A discriminated union.
pub trait Polymorphic: Sized {
    /// Name of the JSON field holding the discriminator.
    const DISCRIMINATOR: &'static str;

    /// Unknown-value behaviour.
    const KIND: VariantSetKind;

    /// Every known discriminator literal.
    const VARIANTS: &'static [&'static str];

    /// Deserialize `value` as the variant for `literal`, one of
    /// [`Self::VARIANTS`].
    fn decode_known(literal: &str, value: Value) -> serde_json::Result<Self>;

    /// Deserialize `value` as the fallback variant. Only called for
    /// extensible sets; fixed sets keep the default.
    fn decode_fallback(value: Value) -> serde_json::Result<Self> {
        let _ = value;
        Err(<serde_json::Error as serde::de::Error>::custom(format!(
            "no fallback variant for discriminator '{}'",
            Self::DISCRIMINATOR
        )))
    }

    /// Encode as JSON, discriminator included.
    fn to_value(&self) -> serde_json::Result<Value>;
}

/// Decode a raw payload. Empty and `null` payloads decode to `None`.
pub fn decode<T: Polymorphic>(raw: &[u8]) -> Result<Option<T>> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let value: Value = serde_json::from_slice(raw)?;
    decode_value(value)
}

/// Decode an already-parsed JSON value. `null` decodes to `None`.
pub fn decode_value<T: Polymorphic>(value: Value) -> Result<Option<T>> {
    if value.is_null() {
        return Ok(None);
    }

    let literal = value
        .get(T::DISCRIMINATOR)
        .and_then(Value::as_str)
        .map(str::to_owned);

    match literal {
        Some(literal) if T::VARIANTS.contains(&literal.as_str()) => {
            Ok(Some(T::decode_known(&literal, value)?))
        }
        literal => match T::KIND {
            VariantSetKind::Extensible => Ok(Some(T::decode_fallback(value)?)),
            VariantSetKind::Fixed => Err(RuntimeError::UnknownDiscriminator {
                field: T::DISCRIMINATOR.to_string(),
                value: literal,
            }),
        },
    }
}

/// Decode a JSON array of polymorphic values. `null` elements stay `None`.
pub fn decode_array<T: Polymorphic>(raw: &[u8]) -> Result<Option<Vec<Option<T>>>> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let values: Option<Vec<Value>> = serde_json::from_slice(raw)?;
    values
        .map(|values| values.into_iter().map(decode_value::<T>).collect())
        .transpose()
}

/// Decode a JSON object of polymorphic values. `null` entries stay `None`.
pub fn decode_map<T: Polymorphic>(raw: &[u8]) -> Result<Option<HashMap<String, Option<T>>>> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let values: Option<HashMap<String, Value>> = serde_json::from_slice(raw)?;
    values
        .map(|values| {
            values
                .into_iter()
                .map(|(k, v)| decode_value::<T>(v).map(|t| (k, t)))
                .collect()
        })
        .transpose()
}

/// Encode a variant payload and stamp its discriminator.
///
/// Used by [`Polymorphic::to_value`] implementations for known variants.
pub fn encode_variant<V: Serialize>(field: &str, literal: &str, variant: &V) -> serde_json::Result<Value> {
    let mut value = serde_json::to_value(variant)?;
    match value.as_object_mut() {
        Some(map) => {
            map.insert(field.to_string(), Value::String(literal.to_string()));
            Ok(value)
        }
        None => Err(<serde_json::Error as serde::de::Error>::custom(format!(
            "variant '{}' did not encode as a JSON object",
            literal
        ))),
    }
}

/// Encode the fallback variant of an extensible set.
///
/// A fallback carrying a known literal would decode back as that variant, so
/// it is rejected.
pub fn encode_fallback<T: Polymorphic, V: Serialize>(literal: Option<&str>, fallback: &V) -> serde_json::Result<Value> {
    if let Some(literal) = literal {
        if T::VARIANTS.contains(&literal) {
            return Err(<serde_json::Error as serde::ser::Error>::custom(format!(
                "fallback value carries known discriminator '{}'",
                literal
            )));
        }
    }
    serde_json::to_value(fallback)
}

/// `Serialize` glue for polymorphic types.
pub fn serialize<T: Polymorphic, S: Serializer>(value: &T, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    value
        .to_value()
        .map_err(S::Error::custom)?
        .serialize(serializer)
}

/// `Deserialize` glue for polymorphic types.
pub fn deserialize<'de, T: Polymorphic, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<T, D::Error> {
    let value = Value::deserialize(deserializer)?;
    match decode_value(value) {
        Ok(Some(decoded)) => Ok(decoded),
        Ok(None) => Err(D::Error::custom(format!(
            "expected an object with '{}', found null",
            T::DISCRIMINATOR
        ))),
        Err(e) => Err(D::Error::custom(e)),
    }
}
