//! Fish: a fixed discriminated union.
//!
//! Unlike birds there is no fallback variant; an unknown or missing `kind`
//! is a decode error.

use corvid_runtime::polymorphic::{self, encode_variant};
use corvid_runtime::{ClientOptions, Context, Method, Polymorphic, Result, Url, VariantSetKind};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::client::ClientCore;

const ROUTE: [&str; 5] = ["type", "model", "inheritance", "fixed-discriminator", "model"];

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Salmon {
    pub age: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friends: Option<Vec<Option<Fish>>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shark {
    pub age: i32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sharktype: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Fish {
    Salmon(Salmon),
    Shark(Shark),
}

impl Fish {
    pub fn age(&self) -> i32 {
        match self {
            Fish::Salmon(f) => f.age,
            Fish::Shark(f) => f.age,
        }
    }
}

impl Polymorphic for Fish {
    const DISCRIMINATOR: &'static str = "kind";
    const KIND: VariantSetKind = VariantSetKind::Fixed;
    const VARIANTS: &'static [&'static str] = &["salmon", "shark"];

    fn decode_known(literal: &str, value: Value) -> serde_json::Result<Self> {
        match literal {
            "salmon" => serde_json::from_value(value).map(Fish::Salmon),
            "shark" => serde_json::from_value(value).map(Fish::Shark),
            other => Err(<serde_json::Error as serde::de::Error>::unknown_variant(
                other,
                Self::VARIANTS,
            )),
        }
    }

    fn to_value(&self) -> serde_json::Result<Value> {
        match self {
            Fish::Salmon(f) => encode_variant(Self::DISCRIMINATOR, "salmon", f),
            Fish::Shark(f) => encode_variant(Self::DISCRIMINATOR, "shark", f),
        }
    }
}

impl Serialize for Fish {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        polymorphic::serialize(self, serializer)
    }
}

impl<'de> Deserialize<'de> for Fish {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        polymorphic::deserialize(deserializer)
    }
}

pub struct FishClient {
    core: ClientCore,
}

impl FishClient {
    pub const NAME: &'static str = "FishClient";

    pub fn new(endpoint: &str, options: &ClientOptions) -> Result<Self> {
        Ok(Self {
            core: ClientCore::new(Self::NAME, endpoint, options, None)?,
        })
    }

    pub fn endpoint(&self) -> &Url {
        self.core.endpoint()
    }

    pub async fn get_model(&self, ctx: &Context) -> Result<Option<Fish>> {
        let request = self.core.request(Method::GET, &ROUTE, "GetModel")?;
        let response = self.core.send(ctx, &request, &[200]).await?;
        polymorphic::decode(response.body())
    }

    pub async fn put_model(&self, ctx: &Context, fish: &Fish) -> Result<()> {
        let request = self
            .core
            .request(Method::PUT, &ROUTE, "PutModel")?
            .with_json(fish)?;
        self.core.send(ctx, &request, &[204]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corvid_runtime::RuntimeError;
    use serde_json::json;

    #[test]
    fn test_fixed_set_rejects_unknown_kind() {
        let err = polymorphic::decode::<Fish>(br#"{"kind": "trout", "age": 1}"#).unwrap_err();
        match err {
            RuntimeError::UnknownDiscriminator { field, value } => {
                assert_eq!(field, "kind");
                assert_eq!(value.as_deref(), Some("trout"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_fixed_set_rejects_missing_kind() {
        let err = polymorphic::decode::<Fish>(br#"{"age": 1}"#).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::UnknownDiscriminator { value: None, .. }
        ));
    }

    #[test]
    fn test_nested_fish_decode() {
        let fish: Fish = serde_json::from_value(json!({
            "kind": "salmon",
            "age": 3,
            "friends": [{"kind": "shark", "age": 7, "sharktype": "goblin"}]
        }))
        .unwrap();
        let Fish::Salmon(salmon) = fish else {
            panic!("expected salmon");
        };
        assert_eq!(salmon.friends.unwrap()[0].as_ref().map(Fish::age), Some(7));
    }

    #[test]
    fn test_null_payload_is_none() {
        assert_eq!(polymorphic::decode::<Fish>(b"null").unwrap(), None);
        assert_eq!(polymorphic::decode::<Fish>(b"").unwrap(), None);
    }
}
