use thiserror::Error;

use crate::domain::entities::{
    billing_cycle::BillingCycle,
    resource::{LimitViolation, Resource},
    subscription_state::UnclassifiableSubscription,
};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Missing or invalid tenant context")]
    MissingTenant,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Not found")]
    NotFound,

    #[error("{0}")]
    BusinessRule(String),

    #[error("Current usage exceeds the limits of the selected plan")]
    DowngradeBlocked { violations: Vec<LimitViolation> },

    #[error("Billing error: {0}")]
    Billing(String),

    #[error("A default payment method is required")]
    PaymentMethodRequired,

    #[error("No gateway price configured for plan {plan} ({cycle})")]
    PriceNotConfigured { plan: String, cycle: BillingCycle },

    #[error("Free plan '{0}' is missing from the catalog")]
    FreePlanMissing(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{resource} limit of {limit} reached")]
    UsageLimitReached {
        resource: Resource,
        current: i64,
        limit: i64,
    },

    #[error("Feature '{feature}' requires the {required_plan} plan")]
    FeatureUnavailable {
        feature: String,
        required_plan: String,
    },

    #[error("Unknown feature '{0}'")]
    UnknownFeature(String),

    #[error("Invalid subscription state: {0}")]
    InvalidSubscriptionState(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Transient failures worth another attempt by whoever triggered the call.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Database(_)
                | AppError::Internal(_)
                | AppError::Billing(_)
                | AppError::Configuration(_)
                | AppError::FreePlanMissing(_)
        )
    }
}

impl From<UnclassifiableSubscription> for AppError {
    fn from(err: UnclassifiableSubscription) -> Self {
        AppError::InvalidSubscriptionState(err.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    DatabaseError,
    InvalidInput,
    MissingTenant,
    InvalidSignature,
    NotFound,
    BusinessRule,
    DowngradeBlocked,
    BillingError,
    PaymentMethodRequired,
    PriceNotConfigured,
    FreePlanMissing,
    ConfigurationError,
    UsageLimitReached,
    FeatureUnavailable,
    UnknownFeature,
    InvalidSubscriptionState,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::MissingTenant => "MISSING_TENANT",
            ErrorCode::InvalidSignature => "INVALID_SIGNATURE",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::BusinessRule => "BUSINESS_RULE",
            ErrorCode::DowngradeBlocked => "DOWNGRADE_BLOCKED",
            ErrorCode::BillingError => "BILLING_ERROR",
            ErrorCode::PaymentMethodRequired => "PAYMENT_METHOD_REQUIRED",
            ErrorCode::PriceNotConfigured => "PRICE_NOT_CONFIGURED",
            ErrorCode::FreePlanMissing => "FREE_PLAN_MISSING",
            ErrorCode::ConfigurationError => "CONFIGURATION_ERROR",
            ErrorCode::UsageLimitReached => "USAGE_LIMIT_REACHED",
            ErrorCode::FeatureUnavailable => "FEATURE_UNAVAILABLE",
            ErrorCode::UnknownFeature => "unknown_feature",
            ErrorCode::InvalidSubscriptionState => "INVALID_SUBSCRIPTION_STATE",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl AppError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::InvalidInput(_) => ErrorCode::InvalidInput,
            AppError::MissingTenant => ErrorCode::MissingTenant,
            AppError::InvalidSignature => ErrorCode::InvalidSignature,
            AppError::NotFound => ErrorCode::NotFound,
            AppError::BusinessRule(_) => ErrorCode::BusinessRule,
            AppError::DowngradeBlocked { .. } => ErrorCode::DowngradeBlocked,
            AppError::Billing(_) => ErrorCode::BillingError,
            AppError::PaymentMethodRequired => ErrorCode::PaymentMethodRequired,
            AppError::PriceNotConfigured { .. } => ErrorCode::PriceNotConfigured,
            AppError::FreePlanMissing(_) => ErrorCode::FreePlanMissing,
            AppError::Configuration(_) => ErrorCode::ConfigurationError,
            AppError::UsageLimitReached { .. } => ErrorCode::UsageLimitReached,
            AppError::FeatureUnavailable { .. } => ErrorCode::FeatureUnavailable,
            AppError::UnknownFeature(_) => ErrorCode::UnknownFeature,
            AppError::InvalidSubscriptionState(_) => ErrorCode::InvalidSubscriptionState,
            AppError::Internal(_) => ErrorCode::InternalError,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
