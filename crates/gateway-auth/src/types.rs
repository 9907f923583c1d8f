use std::collections::HashMap;

use serde::Deserialize;

/// Raw token claims as presented by the identity provider. Field names match
/// the wire format; `CallerContext` derivation happens in `claims.rs`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawClaims {
    pub sub: String,
    #[serde(default)]
    pub iss: String,
    #[serde(default)]
    pub aud: AudienceClaim,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub jti: Option<String>,
    #[serde(default, rename = "preferred_username")]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "given_name")]
    pub given_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default, rename = "realm_access")]
    pub realm_access: Option<RealmAccess>,
    #[serde(default, rename = "resource_access")]
    pub resource_access: HashMap<String, ResourceAccessEntry>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RealmAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ResourceAccessEntry {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// `aud` may be a single string or an array of strings on the wire.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(untagged)]
pub enum AudienceClaim {
    #[default]
    Empty,
    Single(String),
    Many(Vec<String>),
}

impl AudienceClaim {
    pub fn contains(&self, value: &str) -> bool {
        match self {
            AudienceClaim::Empty => false,
            AudienceClaim::Single(s) => s == value,
            AudienceClaim::Many(list) => list.iter().any(|a| a == value),
        }
    }
}
