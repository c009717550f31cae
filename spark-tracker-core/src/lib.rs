pub mod config;
pub mod helpers;
pub mod kubernetes;
pub mod resources;
pub mod spark;

pub const RESOURCE_GROUP: &str = "spark-tracker.dev";

pub const CONTROLLER_FIELD_MANAGER: &str = "spark-tracker-controller";

/// Held by tracked pods until their final state has been recorded.
pub const TRACKING_FINALIZER: &str = "spark-tracker.dev/application-tracking";
