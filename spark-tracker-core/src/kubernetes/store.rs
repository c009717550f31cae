//! Capability through which the reconciler reads and writes cluster state.
//!
//! Every write is conditioned on the version of the object it was computed
//! from. A stale write fails with [`StoreError::Conflict`] and the whole
//! reconcile is retried by the controller.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::{api::PatchParams, Client};
use thiserror::Error;

use crate::{resources::crd::v1alpha1::application::SparkApplication, CONTROLLER_FIELD_MANAGER};

use super::operations::{create_resource, merge_patch_resource, try_get_resource};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Object is missing metadata!")]
    MissingObjectMetadata,
    #[error("The object was modified concurrently! Reason: {}", .0)]
    Conflict(String),
    #[error("Kubernetes API request failed! Reason: {}", .0)]
    Api(kube::Error),
    #[error("Couldn't compute the patch! Reason: {}", .0)]
    Serialization(serde_json::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<kube::Error> for StoreError {
    fn from(error: kube::Error) -> Self {
        match error {
            kube::Error::Api(response) if response.code == 409 => {
                StoreError::Conflict(response.message)
            }
            error => StoreError::Api(error),
        }
    }
}

#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, StoreError>;

    /// Patches `original` into `modified`, returning the stored result.
    async fn patch_pod(&self, original: &Pod, modified: &Pod) -> Result<Pod, StoreError>;

    async fn get_application(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<SparkApplication>, StoreError>;

    async fn create_application(
        &self,
        application: &SparkApplication,
    ) -> Result<SparkApplication, StoreError>;

    async fn patch_application(
        &self,
        original: &SparkApplication,
        modified: &SparkApplication,
    ) -> Result<SparkApplication, StoreError>;
}

pub struct KubeStore {
    client: Client,
    patch_params: PatchParams,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            patch_params: PatchParams {
                field_manager: Some(CONTROLLER_FIELD_MANAGER.to_owned()),
                ..Default::default()
            },
        }
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, StoreError> {
        Ok(try_get_resource(&self.client, name, namespace).await?)
    }

    async fn patch_pod(&self, original: &Pod, modified: &Pod) -> Result<Pod, StoreError> {
        merge_patch_resource(&self.client, original, modified, &self.patch_params).await
    }

    async fn get_application(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<SparkApplication>, StoreError> {
        Ok(try_get_resource(&self.client, name, namespace).await?)
    }

    async fn create_application(
        &self,
        application: &SparkApplication,
    ) -> Result<SparkApplication, StoreError> {
        create_resource(&self.client, application).await
    }

    async fn patch_application(
        &self,
        original: &SparkApplication,
        modified: &SparkApplication,
    ) -> Result<SparkApplication, StoreError> {
        merge_patch_resource(&self.client, original, modified, &self.patch_params).await
    }
}
