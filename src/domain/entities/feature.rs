use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Serialize;
use strum::{AsRefStr, Display, EnumIter, EnumString};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    AsRefStr,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FeatureCategory {
    Booking,
    Notifications,
    Branding,
    Analytics,
    Integrations,
    Operations,
    Support,
}

/// A capability a plan can switch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeatureDefinition {
    pub key: &'static str,
    pub name: &'static str,
    pub category: FeatureCategory,
    /// Slug of the cheapest plan that enables the feature.
    pub required_plan: &'static str,
}

const fn feature(
    key: &'static str,
    name: &'static str,
    category: FeatureCategory,
    required_plan: &'static str,
) -> FeatureDefinition {
    FeatureDefinition {
        key,
        name,
        category,
        required_plan,
    }
}

pub static FEATURES: &[FeatureDefinition] = &[
    feature("online_booking", "Online booking page", FeatureCategory::Booking, "free"),
    feature("deposits", "Booking deposits", FeatureCategory::Booking, "pro"),
    feature("email_reminders", "Email reminders", FeatureCategory::Notifications, "free"),
    feature("sms_reminders", "SMS reminders", FeatureCategory::Notifications, "basic"),
    feature("custom_branding", "Custom branding", FeatureCategory::Branding, "basic"),
    feature("portfolio", "Portfolio gallery", FeatureCategory::Branding, "basic"),
    feature("custom_domain", "Custom domain", FeatureCategory::Branding, "pro"),
    feature("reports", "Reports", FeatureCategory::Analytics, "basic"),
    feature("calendar_sync", "Calendar sync", FeatureCategory::Integrations, "basic"),
    feature("api_access", "API access", FeatureCategory::Integrations, "pro"),
    feature("multi_location", "Multiple locations", FeatureCategory::Operations, "pro"),
    feature("priority_support", "Priority support", FeatureCategory::Support, "pro"),
];

static BY_KEY: Lazy<HashMap<&'static str, &'static FeatureDefinition>> =
    Lazy::new(|| FEATURES.iter().map(|f| (f.key, f)).collect());

pub fn find_feature(key: &str) -> Option<&'static FeatureDefinition> {
    BY_KEY.get(key).copied()
}
