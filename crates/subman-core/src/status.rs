use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{Certificate, InstalledProduct};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubscriptionStatus {
    Subscribed,
    Expired,
    NotSubscribed,
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionStatus::Subscribed => write!(f, "Subscribed"),
            SubscriptionStatus::Expired => write!(f, "Expired"),
            SubscriptionStatus::NotSubscribed => write!(f, "Not Subscribed"),
        }
    }
}

/// Installed product joined against the local certificates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductStatus {
    pub product_id: String,
    pub product_name: String,
    pub status: SubscriptionStatus,
    /// Latest end date among covering certificates.
    pub expires: Option<DateTime<Utc>>,
}

/// Compute display status for every installed product, in installed order.
pub fn product_status(
    installed: &[InstalledProduct],
    certificates: &[Certificate],
    now: DateTime<Utc>,
) -> Vec<ProductStatus> {
    installed
        .iter()
        .map(|product| {
            let covering: Vec<&Certificate> = certificates
                .iter()
                .filter(|c| c.covers(&product.id))
                .collect();

            let status = if covering.is_empty() {
                SubscriptionStatus::NotSubscribed
            } else if covering.iter().any(|c| c.is_valid_at(now)) {
                SubscriptionStatus::Subscribed
            } else {
                SubscriptionStatus::Expired
            };

            ProductStatus {
                product_id: product.id.clone(),
                product_name: product.display_name().to_string(),
                status,
                expires: covering.iter().filter_map(|c| c.end).max(),
            }
        })
        .collect()
}

/// Installed products without any currently valid certificate.
pub fn unentitled_products<'a>(
    installed: &'a [InstalledProduct],
    certificates: &[Certificate],
    now: DateTime<Utc>,
) -> Vec<&'a InstalledProduct> {
    installed
        .iter()
        .filter(|p| {
            !certificates
                .iter()
                .any(|c| c.covers(&p.id) && c.is_valid_at(now))
        })
        .collect()
}
