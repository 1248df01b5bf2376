#![no_main]
use libfuzzer_sys::fuzz_target;
use subman_core::types::{Certificate, EntitlementGrant};

fuzz_target!(|data: &[u8]| {
    if let Ok(grants) = serde_json::from_slice::<Vec<EntitlementGrant>>(data) {
        for grant in &grants {
            let _ = grant.product_id();
            for bundle in &grant.certificates {
                let _ = Certificate::from_grant(grant, bundle);
            }
        }
    }
});
