use std::sync::Arc;

use spark_tracker_core::{config::ControllerConfig, kubernetes::store::ResourceStore};

use crate::controller::provider::InfoSourceProvider;

pub struct ReconcilerContext {
    pub store: Arc<dyn ResourceStore>,
    pub info_provider: Arc<dyn InfoSourceProvider>,
    pub config: Arc<ControllerConfig>,
}
