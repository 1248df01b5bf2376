use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use subman_core::config::ServerConfig;
use subman_core::errors::RemoteError;
use subman_core::traits::EntitlementService;
use subman_core::types::{CertificateBundle, ConsumerIdentity, EntitlementGrant, Pool};
use tracing::debug;

/// JSON-over-HTTP client for the entitlement service.
pub struct HttpEntitlementService {
    client: Client,
    base: Url,
}

/// Consumer record as returned by registration.
#[derive(Debug, Deserialize)]
struct ConsumerRecord {
    uuid: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

impl HttpEntitlementService {
    pub fn new(server: &ServerConfig) -> Result<Self, RemoteError> {
        let base = Url::parse(&server.base_url())
            .map_err(|e| RemoteError::Transport(format!("invalid server address: {e}")))?;
        let client = Client::builder()
            .timeout(server.timeout_secs.map(Duration::from_secs))
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        Ok(Self { client, base })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::Transport(format!("cannot build path on {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn entitlements_url(&self, consumer_id: &str) -> Result<Url, RemoteError> {
        self.url(&["consumers", consumer_id, "entitlements"])
    }

    fn bind(
        &self,
        consumer_id: &str,
        selector: (&str, &str),
    ) -> Result<Vec<CertificateBundle>, RemoteError> {
        let url = self.entitlements_url(consumer_id)?;
        let body: Value = self.send_json(self.client.post(url).query(&[selector]))?;
        bundles_from_value(body)
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = request
            .send()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        let status = response.status();
        debug!(status = status.as_u16(), url = %response.url(), "entitlement service response");
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().unwrap_or_default();
        Err(RemoteError::Rejected {
            status: status.as_u16(),
            message: rejection_message(&text),
        })
    }

    fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RemoteError> {
        self.send(request)?
            .json()
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

impl EntitlementService for HttpEntitlementService {
    fn register_consumer(
        &self,
        username: &str,
        password: &str,
        payload: &Value,
    ) -> Result<ConsumerIdentity, RemoteError> {
        let url = self.url(&["consumers"])?;
        let record: ConsumerRecord = self.send_json(
            self.client
                .post(url)
                .basic_auth(username, Some(password))
                .json(payload),
        )?;
        Ok(ConsumerIdentity {
            name: record.name.unwrap_or_default(),
            user: record.username.unwrap_or_else(|| username.to_string()),
            uuid: record.uuid,
        })
    }

    fn bind_by_product(
        &self,
        consumer_id: &str,
        product_id: &str,
    ) -> Result<Vec<CertificateBundle>, RemoteError> {
        self.bind(consumer_id, ("product", product_id))
    }

    fn bind_by_reg_number(
        &self,
        consumer_id: &str,
        token: &str,
    ) -> Result<Vec<CertificateBundle>, RemoteError> {
        self.bind(consumer_id, ("token", token))
    }

    fn bind_by_entitlement_pool(
        &self,
        consumer_id: &str,
        pool_id: &str,
    ) -> Result<Vec<CertificateBundle>, RemoteError> {
        self.bind(consumer_id, ("pool", pool_id))
    }

    fn get_entitlement_list(&self, consumer_id: &str) -> Result<Vec<EntitlementGrant>, RemoteError> {
        let url = self.entitlements_url(consumer_id)?;
        self.send_json(self.client.get(url))
    }

    fn unbind_by_entitlement_id(
        &self,
        consumer_id: &str,
        entitlement_id: &str,
    ) -> Result<(), RemoteError> {
        let url = self.url(&["consumers", consumer_id, "entitlements", entitlement_id])?;
        self.send(self.client.delete(url)).map(drop)
    }

    fn unbind_all(&self, consumer_id: &str) -> Result<(), RemoteError> {
        let url = self.entitlements_url(consumer_id)?;
        self.send(self.client.delete(url)).map(drop)
    }

    fn get_pools(&self, consumer_id: &str) -> Result<Vec<Pool>, RemoteError> {
        let url = self.url(&["pools"])?;
        self.send_json(self.client.get(url).query(&[("consumer", consumer_id)]))
    }
}

/// Certificates from a bind response.
///
/// The service answers either with bundles directly or with entitlements
/// that carry their bundles under `certificates`.
pub fn bundles_from_value(body: Value) -> Result<Vec<CertificateBundle>, RemoteError> {
    let items = match body {
        Value::Array(items) => items,
        Value::Null => return Ok(Vec::new()),
        single => vec![single],
    };

    let mut bundles = Vec::new();
    for item in items {
        if let Some(certs) = item.get("certificates") {
            let nested: Vec<CertificateBundle> = serde_json::from_value(certs.clone())
                .map_err(|e| RemoteError::Decode(format!("certificate list: {e}")))?;
            bundles.extend(nested);
        } else if item.get("cert").is_some() {
            let bundle: CertificateBundle = serde_json::from_value(item)
                .map_err(|e| RemoteError::Decode(format!("certificate: {e}")))?;
            bundles.push(bundle);
        }
    }
    Ok(bundles)
}

/// Prefer the service's `displayMessage` over the raw body.
fn rejection_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("displayMessage")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}
