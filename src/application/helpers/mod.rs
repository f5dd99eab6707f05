pub mod batch;
pub mod money;
