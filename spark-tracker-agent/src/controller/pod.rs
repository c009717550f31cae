use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    runtime::{watcher::Config, Controller},
    Api, Client,
};
use log::info;
use spark_tracker_core::{kubernetes::GetApi, resources::labels::APPLICATION_ID_LABEL};

use crate::helpers::log_reconciliation_result;

use super::reconciler::{context::ReconcilerContext, reconcile_pod, reconcile_pod_error};

pub async fn start_pod_controller(client: Client, context: Arc<ReconcilerContext>) {
    let pods: Api<Pod> = match context.config.namespace.as_deref() {
        Some(namespace) => client.namespaced_api(namespace),
        None => client.global_api(),
    };

    info!(
        "Watching spark pods in {}...",
        context
            .config
            .namespace
            .as_deref()
            .map(|namespace| format!("'{namespace}' namespace"))
            .unwrap_or_else(|| "all namespaces".to_owned())
    );

    // only pods carrying the label at all, values are checked while reconciling
    let watcher_config = Config::default().labels(APPLICATION_ID_LABEL);

    Controller::new(pods, watcher_config)
        .shutdown_on_signal()
        .run(reconcile_pod, reconcile_pod_error, context)
        .for_each(log_reconciliation_result)
        .await;

    info!("Pod controller stopped");
}
