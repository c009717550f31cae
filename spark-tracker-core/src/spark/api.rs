use std::fmt::Display;

use async_trait::async_trait;
use log::debug;
#[cfg(test)]
use mockall::automock;
use serde::de::DeserializeOwned;
use thiserror::Error;

use super::{
    model::{
        ApplicationResponse, EnvironmentResponse, ExecutorResponse, StageResponse,
        StreamingStatisticsResponse,
    },
    transport::{Transport, TransportError},
};

pub const API_ROOT: &str = "api/v1";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Couldn't reach the spark API! Reason: {}", .0)]
    Transport(TransportError),
    #[error("Couldn't decode '{}' response! Reason: {}", .path, .source)]
    Decode {
        path: String,
        source: serde_json::Error,
    },
}

/// Typed access to the monitoring REST API of a spark application.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SparkApi: Send + Sync {
    async fn get_application(&self, application_id: &str)
        -> Result<ApplicationResponse, ApiError>;

    async fn get_environment(&self, application_id: &str)
        -> Result<EnvironmentResponse, ApiError>;

    async fn get_stages(&self, application_id: &str) -> Result<Vec<StageResponse>, ApiError>;

    async fn get_all_executors(
        &self,
        application_id: &str,
    ) -> Result<Vec<ExecutorResponse>, ApiError>;

    async fn get_streaming_statistics(
        &self,
        application_id: &str,
    ) -> Result<StreamingStatisticsResponse, ApiError>;

    /// driver metrics registry dump (`/metrics/json`)
    async fn get_metrics(&self) -> Result<serde_json::Value, ApiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientOrigin {
    Driver,
    HistoryServer,
}

impl Display for ClientOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientOrigin::Driver => f.write_str("driver"),
            ClientOrigin::HistoryServer => f.write_str("history server"),
        }
    }
}

/// [`SparkApi`] over any [`Transport`]. Driver and history server clients
/// differ only in their origin and the transport they were given.
pub struct RestClient {
    origin: ClientOrigin,
    transport: Box<dyn Transport>,
}

impl RestClient {
    pub fn new(origin: ClientOrigin, transport: Box<dyn Transport>) -> Self {
        Self { origin, transport }
    }

    pub fn driver(transport: Box<dyn Transport>) -> Self {
        Self::new(ClientOrigin::Driver, transport)
    }

    pub fn history_server(transport: Box<dyn Transport>) -> Self {
        Self::new(ClientOrigin::HistoryServer, transport)
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        debug!(
            "Querying {} ({}) for '{path}'",
            self.origin,
            self.transport.endpoint()
        );

        let body = self.transport.get(path).await.map_err(ApiError::Transport)?;

        serde_json::from_slice(&body).map_err(|source| ApiError::Decode {
            path: path.to_owned(),
            source,
        })
    }
}

pub fn application_path(application_id: &str) -> String {
    format!("{API_ROOT}/applications/{application_id}")
}

#[async_trait]
impl SparkApi for RestClient {
    async fn get_application(
        &self,
        application_id: &str,
    ) -> Result<ApplicationResponse, ApiError> {
        self.fetch(&application_path(application_id)).await
    }

    async fn get_environment(
        &self,
        application_id: &str,
    ) -> Result<EnvironmentResponse, ApiError> {
        self.fetch(&format!("{}/environment", application_path(application_id)))
            .await
    }

    async fn get_stages(&self, application_id: &str) -> Result<Vec<StageResponse>, ApiError> {
        self.fetch(&format!("{}/stages", application_path(application_id)))
            .await
    }

    async fn get_all_executors(
        &self,
        application_id: &str,
    ) -> Result<Vec<ExecutorResponse>, ApiError> {
        self.fetch(&format!("{}/allexecutors", application_path(application_id)))
            .await
    }

    async fn get_streaming_statistics(
        &self,
        application_id: &str,
    ) -> Result<StreamingStatisticsResponse, ApiError> {
        self.fetch(&format!(
            "{}/streaming/statistics",
            application_path(application_id)
        ))
        .await
    }

    async fn get_metrics(&self) -> Result<serde_json::Value, ApiError> {
        self.fetch("metrics/json").await
    }
}
