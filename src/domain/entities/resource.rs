use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// A countable resource a plan can put a numeric limit on.
///
/// Reservations are metered per billing period through usage records; the
/// other resources are limited by their live row count.
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
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Resource {
    Reservations,
    Users,
    Services,
    Clients,
}

impl Resource {
    /// True when the limit applies to a per-period counter rather than a live count.
    pub fn is_metered(&self) -> bool {
        matches!(self, Resource::Reservations)
    }

    /// Resources checked against a target plan before a downgrade is accepted.
    pub fn downgrade_checked() -> &'static [Resource] {
        &[Resource::Users, Resource::Services, Resource::Clients]
    }
}

/// A resource whose live count exceeds a target plan's limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LimitViolation {
    pub resource: Resource,
    pub current: i64,
    pub limit: i64,
}
