use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::ValidationError;

/// Registered identity of this host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerIdentity {
    pub uuid: String,
    pub name: String,
    pub user: String,
}

/// A certificate as issued by the entitlement service for one grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateBundle {
    #[serde(deserialize_with = "id_string")]
    pub serial: String,
    pub cert: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub product_ids: Vec<String>,
}

/// Pool reference embedded in an entitlement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolRef {
    #[serde(default, deserialize_with = "opt_id_string")]
    pub id: Option<String>,
    /// Absent when the server omits it or sends something other than a string.
    #[serde(default, deserialize_with = "opt_string")]
    pub product_id: Option<String>,
}

/// Server-side entitlement grant for this consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementGrant {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub pool: PoolRef,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
    #[serde(default, deserialize_with = "opt_datetime")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "opt_datetime")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub certificates: Vec<CertificateBundle>,
}

impl EntitlementGrant {
    pub fn product_id(&self) -> Option<&str> {
        self.pool.product_id.as_deref()
    }

    pub fn pool_id(&self) -> Option<&str> {
        self.pool.id.as_deref()
    }
}

/// A subscription pool the consumer could bind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, deserialize_with = "opt_string")]
    pub product_id: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub product_name: Option<String>,
    /// Negative means unlimited.
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub consumed: i64,
    #[serde(default, deserialize_with = "opt_datetime")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "opt_datetime")]
    pub end_date: Option<DateTime<Utc>>,
}

/// A locally materialized entitlement certificate.
///
/// The serialized form is the metadata sidecar; credential bytes live in
/// their own files and are never part of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub serial: String,
    pub entitlement_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_id: Option<String>,
    #[serde(default)]
    pub product_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub content: Vec<u8>,
    #[serde(skip)]
    pub key: Vec<u8>,
}

impl Certificate {
    /// Materialize one issued bundle of a grant.
    pub fn from_grant(grant: &EntitlementGrant, bundle: &CertificateBundle) -> Self {
        let product_ids = if bundle.product_ids.is_empty() {
            grant.product_id().map(str::to_string).into_iter().collect()
        } else {
            bundle.product_ids.clone()
        };
        Self {
            serial: bundle.serial.clone(),
            entitlement_id: grant.id.clone(),
            pool_id: grant.pool.id.clone(),
            product_ids,
            start: grant.start_date,
            end: grant.end_date,
            content: bundle.cert.as_bytes().to_vec(),
            key: bundle.key.as_bytes().to_vec(),
        }
    }

    pub fn covers(&self, product_id: &str) -> bool {
        self.product_ids.iter().any(|p| p == product_id)
    }

    /// True when `at` falls inside the validity window. Open ends are unbounded.
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| s <= at) && self.end.map_or(true, |e| at < e)
    }
}

/// A product installed on this host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledProduct {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl InstalledProduct {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Exactly one way of choosing what to subscribe to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeSelector {
    Product(String),
    Token(String),
    Pool(String),
}

impl SubscribeSelector {
    /// Build a selector from the three optional flags; exactly one must be set.
    /// An empty value counts as not given.
    pub fn from_flags(
        product: Option<&str>,
        token: Option<&str>,
        pool: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let set = |v: Option<&str>| v.filter(|s| !s.is_empty()).map(str::to_string);
        let mut given = [
            set(product).map(Self::Product),
            set(token).map(Self::Token),
            set(pool).map(Self::Pool),
        ]
        .into_iter()
        .flatten();

        match (given.next(), given.next()) {
            (None, _) => Err(ValidationError::new(
                "Error: Need one of --product, --regtoken or --pool. Try --help",
            )),
            (Some(selector), None) => Ok(selector),
            (Some(_), Some(_)) => Err(ValidationError::new(
                "Error: --product, --regtoken and --pool are mutually exclusive. Try --help",
            )),
        }
    }
}

impl fmt::Display for SubscribeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscribeSelector::Product(p) => write!(f, "product {p}"),
            SubscribeSelector::Token(_) => write!(f, "registration token"),
            SubscribeSelector::Pool(p) => write!(f, "pool {p}"),
        }
    }
}

fn active_by_default() -> bool {
    true
}

fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let v = serde_json::Value::deserialize(deserializer)?;
    match v {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

fn opt_id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let v = serde_json::Value::deserialize(deserializer)?;
    Ok(match v {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn opt_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let v = serde_json::Value::deserialize(deserializer)?;
    Ok(v.as_str().map(str::to_string))
}

/// Accepts RFC 3339 and the `+0000` offset form; anything else reads as absent.
fn opt_datetime<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let v = serde_json::Value::deserialize(deserializer)?;
    Ok(v.as_str().and_then(parse_timestamp))
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|n| n.and_utc())
}
