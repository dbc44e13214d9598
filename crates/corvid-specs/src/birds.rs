//! Birds: an extensible discriminated union.
//!
//! `kind` selects the variant. Values this client does not know decode into
//! [`Bird::Unknown`] instead of failing, so newer services stay readable.

use std::collections::HashMap;

use corvid_runtime::polymorphic::{self, encode_variant};
use corvid_runtime::{
    ClientOptions, Context, Method, Polymorphic, Result, Url, VariantSetKind,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::client::ClientCore;

const ROUTE: [&str; 4] = ["type", "model", "inheritance", "single-discriminator"];

// ─────────────────────────────────────────────────────────────────────────────
// Models
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeaGull {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wingspan: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sparrow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wingspan: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goose {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wingspan: Option<i32>,
}

/// The recursive variant: its fields hold other birds. `null` entries in
/// `friends` and `hate` are kept as `None`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eagle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wingspan: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friends: Option<Vec<Option<Bird>>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hate: Option<HashMap<String, Option<Bird>>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner: Option<Box<Bird>>,
}

/// A bird whose `kind` is absent or not one this client knows. Encoding
/// one whose `kind` names a known variant fails.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnknownBird {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub wingspan: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Bird {
    SeaGull(SeaGull),
    Sparrow(Sparrow),
    Goose(Goose),
    Eagle(Eagle),
    Unknown(UnknownBird),
}

impl Bird {
    /// The discriminator value, if any.
    pub fn kind(&self) -> Option<&str> {
        match self {
            Bird::SeaGull(_) => Some("seagull"),
            Bird::Sparrow(_) => Some("sparrow"),
            Bird::Goose(_) => Some("goose"),
            Bird::Eagle(_) => Some("eagle"),
            Bird::Unknown(b) => b.kind.as_deref(),
        }
    }

    pub fn wingspan(&self) -> Option<i32> {
        match self {
            Bird::SeaGull(b) => b.wingspan,
            Bird::Sparrow(b) => b.wingspan,
            Bird::Goose(b) => b.wingspan,
            Bird::Eagle(b) => b.wingspan,
            Bird::Unknown(b) => b.wingspan,
        }
    }
}

impl Polymorphic for Bird {
    const DISCRIMINATOR: &'static str = "kind";
    const KIND: VariantSetKind = VariantSetKind::Extensible;
    const VARIANTS: &'static [&'static str] = &["seagull", "sparrow", "goose", "eagle"];

    fn decode_known(literal: &str, value: Value) -> serde_json::Result<Self> {
        match literal {
            "seagull" => serde_json::from_value(value).map(Bird::SeaGull),
            "sparrow" => serde_json::from_value(value).map(Bird::Sparrow),
            "goose" => serde_json::from_value(value).map(Bird::Goose),
            "eagle" => serde_json::from_value(value).map(Bird::Eagle),
            other => Err(<serde_json::Error as serde::de::Error>::unknown_variant(
                other,
                Self::VARIANTS,
            )),
        }
    }

    fn decode_fallback(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value).map(Bird::Unknown)
    }

    fn to_value(&self) -> serde_json::Result<Value> {
        match self {
            Bird::SeaGull(b) => encode_variant(Self::DISCRIMINATOR, "seagull", b),
            Bird::Sparrow(b) => encode_variant(Self::DISCRIMINATOR, "sparrow", b),
            Bird::Goose(b) => encode_variant(Self::DISCRIMINATOR, "goose", b),
            Bird::Eagle(b) => encode_variant(Self::DISCRIMINATOR, "eagle", b),
            Bird::Unknown(b) => polymorphic::encode_fallback::<Self, _>(b.kind.as_deref(), b),
        }
    }
}

impl Serialize for Bird {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        polymorphic::serialize(self, serializer)
    }
}

impl<'de> Deserialize<'de> for Bird {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        polymorphic::deserialize(deserializer)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

/// Client for the single-discriminator bird endpoints.
pub struct BirdsClient {
    core: ClientCore,
}

impl BirdsClient {
    pub const NAME: &'static str = "BirdsClient";

    pub fn new(endpoint: &str, options: &ClientOptions) -> Result<Self> {
        Ok(Self {
            core: ClientCore::new(Self::NAME, endpoint, options, None)?,
        })
    }

    pub fn endpoint(&self) -> &Url {
        self.core.endpoint()
    }

    pub async fn get_model(&self, ctx: &Context) -> Result<Option<Bird>> {
        self.get(ctx, "model", "GetModel").await
    }

    pub async fn put_model(&self, ctx: &Context, bird: &Bird) -> Result<()> {
        self.put(ctx, "model", "PutModel", bird).await
    }

    pub async fn get_recursive_model(&self, ctx: &Context) -> Result<Option<Bird>> {
        self.get(ctx, "recursivemodel", "GetRecursiveModel").await
    }

    pub async fn put_recursive_model(&self, ctx: &Context, bird: &Bird) -> Result<()> {
        self.put(ctx, "recursivemodel", "PutRecursiveModel", bird).await
    }

    /// The service omits `kind`; the payload decodes as [`Bird::Unknown`].
    pub async fn get_missing_discriminator(&self, ctx: &Context) -> Result<Option<Bird>> {
        self.get(ctx, "missingdiscriminator", "GetMissingDiscriminator")
            .await
    }

    /// The service sends an unrecognized `kind`; the payload decodes as
    /// [`Bird::Unknown`] with the raw value kept.
    pub async fn get_wrong_discriminator(&self, ctx: &Context) -> Result<Option<Bird>> {
        self.get(ctx, "wrongdiscriminator", "GetWrongDiscriminator")
            .await
    }

    async fn get(&self, ctx: &Context, leaf: &str, operation: &str) -> Result<Option<Bird>> {
        let request = self.core.request(Method::GET, &route(leaf), operation)?;
        let response = self.core.send(ctx, &request, &[200]).await?;
        polymorphic::decode(response.body())
    }

    async fn put(&self, ctx: &Context, leaf: &str, operation: &str, bird: &Bird) -> Result<()> {
        let request = self
            .core
            .request(Method::PUT, &route(leaf), operation)?
            .with_json(bird)?;
        self.core.send(ctx, &request, &[204]).await?;
        Ok(())
    }
}

fn route(leaf: &str) -> Vec<&str> {
    let mut segments = ROUTE.to_vec();
    segments.push(leaf);
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_known_kind_selects_variant() {
        let bird: Bird = serde_json::from_value(json!({"kind": "sparrow", "wingspan": 2})).unwrap();
        assert_eq!(bird, Bird::Sparrow(Sparrow { wingspan: Some(2) }));
        assert_eq!(bird.kind(), Some("sparrow"));
    }

    #[test]
    fn test_unknown_kind_keeps_raw_value() {
        let bird: Bird = serde_json::from_value(json!({"kind": "albatross", "wingspan": 9})).unwrap();
        assert_eq!(
            bird,
            Bird::Unknown(UnknownBird {
                kind: Some("albatross".into()),
                wingspan: Some(9),
            })
        );
    }

    #[test]
    fn test_missing_kind_is_unknown() {
        let bird: Bird = serde_json::from_value(json!({"wingspan": 1})).unwrap();
        assert_eq!(bird.kind(), None);
        assert_eq!(bird.wingspan(), Some(1));
    }

    #[test]
    fn test_recursive_eagle_decodes_nested_birds() {
        let raw = json!({
            "kind": "eagle",
            "wingspan": 5,
            "friends": [{"kind": "seagull", "wingspan": 2}],
            "hate": {"key3": {"kind": "sparrow", "wingspan": 1}},
            "partner": {"kind": "goose", "wingspan": 2}
        });
        let Bird::Eagle(eagle) = serde_json::from_value(raw).unwrap() else {
            panic!("expected eagle");
        };
        assert_eq!(
            eagle.friends.unwrap()[0],
            Some(Bird::SeaGull(SeaGull { wingspan: Some(2) }))
        );
        assert_eq!(
            eagle.hate.unwrap()["key3"].as_ref().and_then(Bird::kind),
            Some("sparrow")
        );
        assert_eq!(eagle.partner.unwrap().kind(), Some("goose"));
    }

    #[test]
    fn test_nested_nulls_are_kept() {
        let raw = json!({
            "kind": "eagle",
            "friends": [null, {"kind": "goose"}],
            "hate": {"old": null, "key3": {"kind": "sparrow"}}
        });
        let Bird::Eagle(eagle) = serde_json::from_value(raw).unwrap() else {
            panic!("expected eagle");
        };

        let friends = eagle.friends.unwrap();
        assert_eq!(friends.len(), 2);
        assert!(friends[0].is_none());
        assert_eq!(friends[1], Some(Bird::Goose(Goose::default())));

        let hate = eagle.hate.unwrap();
        assert!(hate["old"].is_none());
        assert_eq!(hate["key3"].as_ref().and_then(Bird::kind), Some("sparrow"));
    }

    #[test]
    fn test_unknown_with_known_kind_does_not_encode() {
        let impostor = Bird::Unknown(UnknownBird {
            kind: Some("eagle".into()),
            wingspan: Some(1),
        });
        assert!(serde_json::to_value(&impostor).is_err());

        let unknown = Bird::Unknown(UnknownBird {
            kind: Some("condor".into()),
            wingspan: Some(1),
        });
        let value = serde_json::to_value(&unknown).unwrap();
        assert_eq!(value, json!({"kind": "condor", "wingspan": 1}));
        assert_eq!(serde_json::from_value::<Bird>(value).unwrap(), unknown);
    }

    #[test]
    fn test_encode_stamps_kind() {
        let value = serde_json::to_value(Bird::Goose(Goose { wingspan: Some(3) })).unwrap();
        assert_eq!(value, json!({"kind": "goose", "wingspan": 3}));
    }

    #[test]
    fn test_route_segments() {
        assert_eq!(
            route("model").join("/"),
            "type/model/inheritance/single-discriminator/model"
        );
    }
}
