use crate::{errors::ServiceError, store::ProcurementStore};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Vendor facts the procurement engine depends on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VendorDirectory: Send + Sync {
    async fn is_active(&self, vendor_id: Uuid) -> Result<bool, ServiceError>;

    /// Trimmed contact email, `None` when absent or blank.
    async fn contact_email(&self, vendor_id: Uuid) -> Result<Option<String>, ServiceError>;
}

/// Answers vendor questions from the vendor table.
#[derive(Clone)]
pub struct StoreVendorDirectory {
    store: Arc<dyn ProcurementStore>,
}

impl StoreVendorDirectory {
    pub fn new(store: Arc<dyn ProcurementStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl VendorDirectory for StoreVendorDirectory {
    async fn is_active(&self, vendor_id: Uuid) -> Result<bool, ServiceError> {
        Ok(self
            .store
            .get_vendor(vendor_id)
            .await?
            .map(|v| v.is_active)
            .unwrap_or(false))
    }

    async fn contact_email(&self, vendor_id: Uuid) -> Result<Option<String>, ServiceError> {
        let vendor = self
            .store
            .get_vendor(vendor_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Vendor {}", vendor_id)))?;
        Ok(vendor.contact_email().map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Vendor;
    use crate::store::InMemoryProcurementStore;
    use chrono::Utc;

    fn vendor(email: Option<&str>, is_active: bool) -> Vendor {
        Vendor {
            id: Uuid::new_v4(),
            company_name: "Acme Aggregates".into(),
            contact_name: None,
            contact_email: email.map(str::to_string),
            contact_phone: None,
            is_active,
            payment_terms: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn blank_email_counts_as_missing() {
        let store = Arc::new(InMemoryProcurementStore::new());
        let blank = store.insert_vendor(vendor(Some("   "), true)).await.unwrap();
        let good = store
            .insert_vendor(vendor(Some(" orders@acme.test "), false))
            .await
            .unwrap();
        let directory = StoreVendorDirectory::new(store);

        assert_eq!(directory.contact_email(blank.id).await.unwrap(), None);
        assert_eq!(
            directory.contact_email(good.id).await.unwrap().as_deref(),
            Some("orders@acme.test")
        );
        assert!(directory.is_active(blank.id).await.unwrap());
        assert!(!directory.is_active(good.id).await.unwrap());
        assert!(!directory.is_active(Uuid::new_v4()).await.unwrap());
    }
}
