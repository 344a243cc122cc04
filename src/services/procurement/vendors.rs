use super::ProcurementService;
use crate::{auth::Principal, errors::ServiceError, models::Vendor};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct NewVendor {
    #[validate(length(min = 1, max = 255))]
    pub company_name: String,
    pub contact_name: Option<String>,
    #[validate(email)]
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub payment_terms: Option<String>,
}

impl ProcurementService {
    #[instrument(skip(self, actor, input), fields(actor_id = %actor.id))]
    pub async fn create_vendor(
        &self,
        actor: &Principal,
        input: NewVendor,
    ) -> Result<Vendor, ServiceError> {
        input.validate()?;
        self.require_purchase_department(actor)?;
        let now = Utc::now();
        let vendor = Vendor {
            id: Uuid::new_v4(),
            company_name: input.company_name,
            contact_name: input.contact_name,
            contact_email: input.contact_email,
            contact_phone: input.contact_phone,
            is_active: true,
            payment_terms: input.payment_terms,
            created_at: now,
            updated_at: now,
        };
        let vendor = self.store.insert_vendor(vendor).await?;
        slog::info!(self.audit, "vendor created";
            "vendor_id" => %vendor.id, "company" => &vendor.company_name, "actor_id" => %actor.id);
        Ok(vendor)
    }

    pub async fn get_vendor(&self, id: Uuid) -> Result<Vendor, ServiceError> {
        self.store
            .get_vendor(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Vendor {}", id)))
    }

    /// Inactive vendors cannot receive new orders; existing orders are untouched.
    #[instrument(skip(self, actor), fields(actor_id = %actor.id, vendor_id = %id))]
    pub async fn set_vendor_active(
        &self,
        actor: &Principal,
        id: Uuid,
        active: bool,
    ) -> Result<Vendor, ServiceError> {
        self.require_purchase_department(actor)?;
        let mut vendor = self.get_vendor(id).await?;
        if vendor.is_active == active {
            return Ok(vendor);
        }
        vendor.is_active = active;
        let vendor = self.store.update_vendor(vendor).await?;
        slog::info!(self.audit, "vendor activation changed";
            "vendor_id" => %vendor.id, "active" => vendor.is_active, "actor_id" => %actor.id);
        Ok(vendor)
    }
}
