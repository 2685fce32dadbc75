use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::UserId;
use crate::domain::ports::VendorDirectory;
use crate::domain::tax::VendorTaxProfile;
use crate::error::Result;

/// In-memory vendor tax-profile directory. Vendors without an explicit
/// profile read as unregistered with zero turnover.
#[derive(Default, Clone)]
pub struct InMemoryVendorDirectory {
    profiles: Arc<RwLock<HashMap<UserId, VendorTaxProfile>>>,
}

impl InMemoryVendorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_profile(&self, vendor: UserId, profile: VendorTaxProfile) {
        self.profiles.write().await.insert(vendor, profile);
    }
}

#[async_trait]
impl VendorDirectory for InMemoryVendorDirectory {
    async fn tax_profile(&self, vendor: &UserId) -> Result<VendorTaxProfile> {
        Ok(self
            .profiles
            .read()
            .await
            .get(vendor)
            .cloned()
            .unwrap_or_default())
    }
}
