use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::{api::ListParams, Client};
use log::{debug, warn};
use spark_tracker_core::{
    config::ControllerConfig,
    helpers::RequireMetadata,
    kubernetes::operations::list_resources,
    spark::{
        api::{RestClient, SparkApi},
        manager::{ApplicationInfoManager, ApplicationInfoSource, ManagerError},
        transport::{HttpTransport, ProxyTarget, ProxyTransport, Transport},
    },
};

/// Locates the REST API endpoints able to describe a driver's application.
#[async_trait]
pub trait InfoSourceProvider: Send + Sync {
    async fn info_source(&self, driver: &Pod)
        -> Result<Box<dyn ApplicationInfoSource>, ManagerError>;
}

/// Resolves the history server service of the driver's namespace and the
/// driver pod itself against the cluster.
pub struct ClusterInfoSourceProvider {
    client: Client,
    config: Arc<ControllerConfig>,
}

impl ClusterInfoSourceProvider {
    pub fn new(client: Client, config: Arc<ControllerConfig>) -> Self {
        Self { client, config }
    }

    async fn history_server_client(&self, namespace: &str) -> Option<Arc<dyn SparkApi>> {
        let params = ListParams::default().labels(&self.config.history_server_selector);
        let services = match list_resources::<Service>(&self.client, namespace, &params).await {
            Ok(services) => services,
            Err(error) => {
                warn!("Couldn't look up the history server in '{namespace}' namespace! Reason: {error}");
                return None;
            }
        };

        let name = services.into_iter().find_map(|service| service.metadata.name)?;
        let host = format!("{name}.{namespace}.svc");
        let transport = self.transport(
            ProxyTarget::Service,
            namespace,
            &name,
            Some(host),
            self.config.history_server_port,
        )?;

        Some(Arc::new(RestClient::history_server(transport)))
    }

    fn driver_client(&self, driver: &Pod) -> Option<Arc<dyn SparkApi>> {
        if !is_serving(driver) {
            return None;
        }

        let namespace = driver.require_namespace_or(()).ok()?;
        let name = driver.require_name_or(()).ok()?;
        let pod_ip = driver
            .status
            .as_ref()
            .and_then(|status| status.pod_ip.to_owned());
        let transport = self.transport(
            ProxyTarget::Pod,
            namespace,
            name,
            pod_ip,
            self.config.driver_ui_port,
        )?;

        Some(Arc::new(RestClient::driver(transport)))
    }

    /// `direct_host` is only used when direct addressing is enabled.
    fn transport(
        &self,
        target: ProxyTarget,
        namespace: &str,
        name: &str,
        direct_host: Option<String>,
        port: u16,
    ) -> Option<Box<dyn Transport>> {
        if !self.config.direct_http {
            return Some(Box::new(ProxyTransport::new(
                self.client.clone(),
                target,
                namespace,
                name,
                port,
                self.config.api_timeout,
            )));
        }

        let Some(host) = direct_host else {
            debug!("'{name}' in '{namespace}' has no address yet");
            return None;
        };

        match HttpTransport::new(&host, port, self.config.api_timeout) {
            Ok(transport) => Some(Box::new(transport)),
            Err(error) => {
                warn!("Couldn't create a HTTP client for '{host}'! Reason: {error}");
                None
            }
        }
    }
}

#[async_trait]
impl InfoSourceProvider for ClusterInfoSourceProvider {
    async fn info_source(
        &self,
        driver: &Pod,
    ) -> Result<Box<dyn ApplicationInfoSource>, ManagerError> {
        let namespace = driver.require_namespace_or(ManagerError::NoClient)?;
        let history_server = self.history_server_client(namespace).await;
        let driver = self.driver_client(driver);

        Ok(Box::new(ApplicationInfoManager::new(history_server, driver)?))
    }
}

/// Whether the driver's primary container is running and the pod passes its
/// readiness probe.
pub fn is_serving(driver: &Pod) -> bool {
    let Some(status) = driver.status.as_ref() else {
        return false;
    };

    let running = status
        .container_statuses
        .as_ref()
        .and_then(|statuses| statuses.first())
        .and_then(|status| status.state.as_ref())
        .is_some_and(|state| state.running.is_some());

    let ready = status
        .conditions
        .iter()
        .flatten()
        .any(|condition| condition.type_ == "Ready" && condition.status == "True");

    running && ready
}
