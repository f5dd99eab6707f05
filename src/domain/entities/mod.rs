pub mod billing_cycle;
pub mod feature;
pub mod invoice;
pub mod notification;
pub mod payment_method;
pub mod plan;
pub mod resource;
pub mod subscription;
pub mod subscription_state;
pub mod tenant;
pub mod usage_record;
