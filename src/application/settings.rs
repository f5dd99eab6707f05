/// Business knobs the billing use cases read. Built from `AppConfig`.
#[derive(Debug, Clone)]
pub struct BillingSettings {
    pub free_plan_slug: String,
    /// Fraction of a limit (0..1) at which a usage warning is sent.
    pub usage_warning_threshold: f64,
    /// Limit applied when a tenant's plan cannot be resolved.
    pub default_limit: i64,
    pub max_payment_attempts: i32,
    pub job_chunk_size: i64,
    pub trial_reminder_days: i64,
    pub downgrade_reminder_days: i64,
    pub card_expiry_reminder_days: i64,
}

impl Default for BillingSettings {
    fn default() -> Self {
        Self {
            free_plan_slug: "free".to_string(),
            usage_warning_threshold: 0.8,
            default_limit: 50,
            max_payment_attempts: 3,
            job_chunk_size: 100,
            trial_reminder_days: 3,
            downgrade_reminder_days: 3,
            card_expiry_reminder_days: 30,
        }
    }
}
