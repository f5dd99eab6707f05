use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    app_error::{AppError, AppResult},
    domain::entities::payment_method::{PaymentMethod, PaymentMethodKind},
};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewPaymentMethod {
    #[validate(length(min = 1, max = 255))]
    pub gateway_payment_method_id: String,
    pub kind: PaymentMethodKind,
    pub brand: Option<String>,
    #[validate(length(equal = 4))]
    pub last4: Option<String>,
    #[validate(range(min = 1, max = 12))]
    pub exp_month: Option<i32>,
    #[validate(range(min = 2000, max = 2200))]
    pub exp_year: Option<i32>,
    #[serde(default)]
    pub make_default: bool,
}

#[async_trait]
pub trait PaymentMethodRepo: Send + Sync {
    async fn list_by_tenant(&self, tenant_id: Uuid) -> AppResult<Vec<PaymentMethod>>;
    async fn get_default(&self, tenant_id: Uuid) -> AppResult<Option<PaymentMethod>>;
    /// Insert, or refresh the row with the same gateway id.
    async fn upsert(&self, tenant_id: Uuid, input: &NewPaymentMethod) -> AppResult<PaymentMethod>;
    /// Make `id` the only default for the tenant, in one transaction.
    async fn set_default(&self, tenant_id: Uuid, id: Uuid) -> AppResult<()>;
    async fn delete(&self, tenant_id: Uuid, id: Uuid) -> AppResult<()>;
    /// Cards whose expiry month falls in `[from, to]` (first-of-month dates),
    /// paged by id.
    async fn list_cards_expiring(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        after: Option<Uuid>,
        limit: i64,
    ) -> AppResult<Vec<PaymentMethod>>;
}

#[derive(Clone)]
pub struct PaymentMethodUseCases {
    repo: Arc<dyn PaymentMethodRepo>,
}

impl PaymentMethodUseCases {
    pub fn new(repo: Arc<dyn PaymentMethodRepo>) -> Self {
        Self { repo }
    }

    pub async fn list(&self, tenant_id: Uuid) -> AppResult<Vec<PaymentMethod>> {
        self.repo.list_by_tenant(tenant_id).await
    }

    /// Mirror a gateway payment method. The tenant's first method becomes default.
    pub async fn add(&self, tenant_id: Uuid, input: NewPaymentMethod) -> AppResult<PaymentMethod> {
        input
            .validate()
            .map_err(|e| AppError::InvalidInput(e.to_string()))?;

        let had_default = self.repo.get_default(tenant_id).await?.is_some();
        let mut method = self.repo.upsert(tenant_id, &input).await?;
        if input.make_default || !had_default {
            self.repo.set_default(tenant_id, method.id).await?;
            method.is_default = true;
        }
        Ok(method)
    }

    pub async fn set_default(&self, tenant_id: Uuid, id: Uuid) -> AppResult<()> {
        self.find(tenant_id, id).await?;
        self.repo.set_default(tenant_id, id).await
    }

    /// Remove a method; the newest remaining one inherits the default flag.
    pub async fn remove(&self, tenant_id: Uuid, id: Uuid) -> AppResult<()> {
        let method = self.find(tenant_id, id).await?;
        self.repo.delete(tenant_id, id).await?;

        if method.is_default
            && let Some(next) = self
                .repo
                .list_by_tenant(tenant_id)
                .await?
                .into_iter()
                .max_by_key(|m| m.created_at)
        {
            self.repo.set_default(tenant_id, next.id).await?;
        }
        Ok(())
    }

    async fn find(&self, tenant_id: Uuid, id: Uuid) -> AppResult<PaymentMethod> {
        self.repo
            .list_by_tenant(tenant_id)
            .await?
            .into_iter()
            .find(|m| m.id == id)
            .ok_or(AppError::NotFound)
    }
}
