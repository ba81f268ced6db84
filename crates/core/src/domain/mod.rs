pub mod diagnosis;
pub mod metrics;
