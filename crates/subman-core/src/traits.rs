use serde_json::Value;

use crate::errors::{RemoteError, StoreError};
use crate::types::{
    Certificate, CertificateBundle, ConsumerIdentity, EntitlementGrant, InstalledProduct, Pool,
};

/// The remote entitlement service.
///
/// Every call may fail with a transport error or a service rejection;
/// callers treat both the same way.
pub trait EntitlementService {
    fn register_consumer(
        &self,
        username: &str,
        password: &str,
        payload: &Value,
    ) -> Result<ConsumerIdentity, RemoteError>;

    fn bind_by_product(
        &self,
        consumer_id: &str,
        product_id: &str,
    ) -> Result<Vec<CertificateBundle>, RemoteError>;

    fn bind_by_reg_number(
        &self,
        consumer_id: &str,
        token: &str,
    ) -> Result<Vec<CertificateBundle>, RemoteError>;

    fn bind_by_entitlement_pool(
        &self,
        consumer_id: &str,
        pool_id: &str,
    ) -> Result<Vec<CertificateBundle>, RemoteError>;

    /// Grants in server order.
    fn get_entitlement_list(&self, consumer_id: &str) -> Result<Vec<EntitlementGrant>, RemoteError>;

    fn unbind_by_entitlement_id(
        &self,
        consumer_id: &str,
        entitlement_id: &str,
    ) -> Result<(), RemoteError>;

    fn unbind_all(&self, consumer_id: &str) -> Result<(), RemoteError>;

    /// Pools this consumer could bind.
    fn get_pools(&self, consumer_id: &str) -> Result<Vec<Pool>, RemoteError>;
}

impl<T: EntitlementService + ?Sized> EntitlementService for &T {
    fn register_consumer(
        &self,
        username: &str,
        password: &str,
        payload: &Value,
    ) -> Result<ConsumerIdentity, RemoteError> {
        (**self).register_consumer(username, password, payload)
    }

    fn bind_by_product(
        &self,
        consumer_id: &str,
        product_id: &str,
    ) -> Result<Vec<CertificateBundle>, RemoteError> {
        (**self).bind_by_product(consumer_id, product_id)
    }

    fn bind_by_reg_number(
        &self,
        consumer_id: &str,
        token: &str,
    ) -> Result<Vec<CertificateBundle>, RemoteError> {
        (**self).bind_by_reg_number(consumer_id, token)
    }

    fn bind_by_entitlement_pool(
        &self,
        consumer_id: &str,
        pool_id: &str,
    ) -> Result<Vec<CertificateBundle>, RemoteError> {
        (**self).bind_by_entitlement_pool(consumer_id, pool_id)
    }

    fn get_entitlement_list(&self, consumer_id: &str) -> Result<Vec<EntitlementGrant>, RemoteError> {
        (**self).get_entitlement_list(consumer_id)
    }

    fn unbind_by_entitlement_id(
        &self,
        consumer_id: &str,
        entitlement_id: &str,
    ) -> Result<(), RemoteError> {
        (**self).unbind_by_entitlement_id(consumer_id, entitlement_id)
    }

    fn unbind_all(&self, consumer_id: &str) -> Result<(), RemoteError> {
        (**self).unbind_all(consumer_id)
    }

    fn get_pools(&self, consumer_id: &str) -> Result<Vec<Pool>, RemoteError> {
        (**self).get_pools(consumer_id)
    }
}

/// Counts from one refresh pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub removed: usize,
    pub written: usize,
}

/// Local identity and certificate storage.
pub trait CertificateStore {
    fn identity_exists(&self) -> bool;

    fn read_identity(&self) -> Result<ConsumerIdentity, StoreError>;

    fn persist(&self, consumer: &ConsumerIdentity) -> Result<(), StoreError>;

    /// Replace every local entitlement certificate with those carried by `grants`.
    fn refresh(&self, grants: &[EntitlementGrant]) -> Result<RefreshSummary, StoreError>;

    /// Entitlement certificates currently on disk, sorted by serial.
    fn certificates(&self) -> Result<Vec<Certificate>, StoreError>;

    fn installed_products(&self) -> Result<Vec<InstalledProduct>, StoreError>;
}
