use std::sync::Arc;

use kube::Client;
use spark_tracker_core::{config::ControllerConfig, kubernetes::store::KubeStore};

use self::{
    pod::start_pod_controller, provider::ClusterInfoSourceProvider,
    reconciler::context::ReconcilerContext,
};

pub mod pod;
pub mod provider;
pub mod reconciler;

pub async fn main_controller(client: Client, config: ControllerConfig) {
    let config = Arc::new(config);

    let reconciler_context = ReconcilerContext {
        store: Arc::new(KubeStore::new(client.clone())),
        info_provider: Arc::new(ClusterInfoSourceProvider::new(
            client.clone(),
            config.clone(),
        )),
        config,
    };

    start_pod_controller(client, reconciler_context.into()).await
}
