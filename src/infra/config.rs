use std::net::SocketAddr;

use axum::http::HeaderValue;
use env_helpers::get_env_default;
use secrecy::SecretString;
use strum::{Display, EnumString};

use crate::{
    application::{settings::BillingSettings, use_cases::reconciliation::JobKind},
    infra::error::InfraError,
};

/// Which payment gateway adapter to wire in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum GatewayKind {
    Stripe,
    /// In-process gateway for local development. Never charges anything.
    Dummy,
}

/// Cron expressions (with seconds) for each reconciliation job.
#[derive(Debug, Clone)]
pub struct JobSchedules {
    pub expire_trials: String,
    pub apply_scheduled_downgrades: String,
    pub remind_trials_ending: String,
    pub remind_scheduled_downgrades: String,
    pub remind_expiring_cards: String,
    pub recalculate_usage: String,
}

impl JobSchedules {
    pub fn cron_for(&self, kind: JobKind) -> &str {
        match kind {
            JobKind::ExpireTrials => &self.expire_trials,
            JobKind::ApplyScheduledDowngrades => &self.apply_scheduled_downgrades,
            JobKind::RemindTrialsEnding => &self.remind_trials_ending,
            JobKind::RemindScheduledDowngrades => &self.remind_scheduled_downgrades,
            JobKind::RemindExpiringCards => &self.remind_expiring_cards,
            JobKind::RecalculateUsage => &self.recalculate_usage,
        }
    }
}

impl Default for JobSchedules {
    fn default() -> Self {
        Self {
            expire_trials: "0 0 * * * *".to_string(),
            apply_scheduled_downgrades: "0 5 * * * *".to_string(),
            remind_trials_ending: "0 0 9 * * *".to_string(),
            remind_scheduled_downgrades: "0 10 9 * * *".to_string(),
            remind_expiring_cards: "0 20 9 * * *".to_string(),
            recalculate_usage: "0 30 3 * * *".to_string(),
        }
    }
}

pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub cors_origin: HeaderValue,
    pub payment_gateway: GatewayKind,
    pub stripe_secret_key: SecretString,
    pub stripe_webhook_secret: SecretString,
    pub gateway_timeout_secs: u64,
    /// Maximum age of a signed webhook timestamp.
    pub webhook_tolerance_secs: i64,
    pub billing: BillingSettings,
    pub schedules: JobSchedules,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, InfraError> {
        let database_url = required("DATABASE_URL")?;
        let bind_addr: SocketAddr =
            get_env_default("BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3001)));
        let cors_origin: HeaderValue =
            get_env_default("CORS_ORIGIN", String::from("http://localhost:3000"))
                .parse()
                .map_err(|_| InfraError::ConfigInvalid { var: "CORS_ORIGIN" })?;

        let payment_gateway: GatewayKind =
            get_env_default("PAYMENT_GATEWAY", String::from("stripe"))
                .parse()
                .map_err(|_| InfraError::ConfigInvalid {
                    var: "PAYMENT_GATEWAY",
                })?;

        // Stripe credentials are only mandatory when Stripe is the gateway.
        let stripe_secret = |var: &'static str| match payment_gateway {
            GatewayKind::Stripe => required(var),
            GatewayKind::Dummy => Ok(std::env::var(var).unwrap_or_default()),
        };
        let stripe_secret_key = SecretString::new(stripe_secret("STRIPE_SECRET_KEY")?.into());
        let stripe_webhook_secret =
            SecretString::new(stripe_secret("STRIPE_WEBHOOK_SECRET")?.into());

        let defaults = BillingSettings::default();
        let billing = BillingSettings {
            free_plan_slug: get_env_default("FREE_PLAN_SLUG", defaults.free_plan_slug),
            usage_warning_threshold: get_env_default(
                "USAGE_WARNING_THRESHOLD",
                defaults.usage_warning_threshold,
            ),
            default_limit: get_env_default("DEFAULT_RESERVATION_LIMIT", defaults.default_limit),
            max_payment_attempts: get_env_default(
                "MAX_PAYMENT_ATTEMPTS",
                defaults.max_payment_attempts,
            ),
            job_chunk_size: get_env_default("JOB_CHUNK_SIZE", defaults.job_chunk_size),
            trial_reminder_days: get_env_default(
                "TRIAL_REMINDER_DAYS",
                defaults.trial_reminder_days,
            ),
            downgrade_reminder_days: get_env_default(
                "DOWNGRADE_REMINDER_DAYS",
                defaults.downgrade_reminder_days,
            ),
            card_expiry_reminder_days: get_env_default(
                "CARD_EXPIRY_REMINDER_DAYS",
                defaults.card_expiry_reminder_days,
            ),
        };
        if !(0.0..=1.0).contains(&billing.usage_warning_threshold) {
            return Err(InfraError::ConfigInvalid {
                var: "USAGE_WARNING_THRESHOLD",
            });
        }
        if billing.job_chunk_size < 1 {
            return Err(InfraError::ConfigInvalid {
                var: "JOB_CHUNK_SIZE",
            });
        }

        let cron = JobSchedules::default();
        let schedules = JobSchedules {
            expire_trials: get_env_default("CRON_EXPIRE_TRIALS", cron.expire_trials),
            apply_scheduled_downgrades: get_env_default(
                "CRON_APPLY_SCHEDULED_DOWNGRADES",
                cron.apply_scheduled_downgrades,
            ),
            remind_trials_ending: get_env_default(
                "CRON_REMIND_TRIALS_ENDING",
                cron.remind_trials_ending,
            ),
            remind_scheduled_downgrades: get_env_default(
                "CRON_REMIND_SCHEDULED_DOWNGRADES",
                cron.remind_scheduled_downgrades,
            ),
            remind_expiring_cards: get_env_default(
                "CRON_REMIND_EXPIRING_CARDS",
                cron.remind_expiring_cards,
            ),
            recalculate_usage: get_env_default(
                "CRON_RECALCULATE_USAGE",
                cron.recalculate_usage,
            ),
        };

        Ok(Self {
            database_url,
            bind_addr,
            cors_origin,
            payment_gateway,
            stripe_secret_key,
            stripe_webhook_secret,
            gateway_timeout_secs: get_env_default("GATEWAY_TIMEOUT_SECS", 10),
            webhook_tolerance_secs: get_env_default("WEBHOOK_TOLERANCE_SECS", 300),
            billing,
            schedules,
        })
    }
}

fn required(var: &'static str) -> Result<String, InfraError> {
    std::env::var(var).map_err(|_| InfraError::ConfigMissing { var })
}
