use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use derive_builder::Builder;
use log::{info, warn};
use thiserror::Error;

use crate::resources::crd::v1alpha1::application::Attempt;

use super::{
    api::{ApiError, SparkApi},
    model::{ApplicationResponse, AttemptResponse},
    stages::{StageAggregationState, StageMetricsUpdate},
};

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Could not get spark api client!")]
    NoClient,
    #[error("Spark API call failed! Reason: {}", .0)]
    Api(ApiError),
}

/// Normalized view of a spark application assembled from its REST API.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationInfo {
    pub application_name: String,
    pub attempts: Vec<Attempt>,
    pub spark_properties: BTreeMap<String, String>,
    pub stage_metrics: StageMetricsUpdate,
}

/// Source of [`ApplicationInfo`] for a single application.
#[async_trait]
pub trait ApplicationInfoSource: Send + Sync {
    /// `stage_state` is the aggregation state recorded by the previous poll, if any.
    async fn get_application_info(
        &self,
        application_id: &str,
        stage_state: Option<&StageAggregationState>,
    ) -> Result<ApplicationInfo, ManagerError>;
}

/// Queries the history server when one is available and falls back to the
/// driver once if the history server can't describe the application.
#[derive(Builder)]
#[builder(pattern = "owned", build_fn(validate = "Self::validate"))]
pub struct ApplicationInfoManager {
    #[builder(setter(strip_option), default)]
    history_server: Option<Arc<dyn SparkApi>>,
    #[builder(setter(strip_option), default)]
    driver: Option<Arc<dyn SparkApi>>,
}

impl ApplicationInfoManagerBuilder {
    fn validate(&self) -> Result<(), String> {
        let is_set = |client: &Option<Option<Arc<dyn SparkApi>>>| matches!(client, Some(Some(_)));

        if is_set(&self.history_server) || is_set(&self.driver) {
            Ok(())
        } else {
            Err(ManagerError::NoClient.to_string())
        }
    }
}

impl ApplicationInfoManager {
    pub fn new(
        history_server: Option<Arc<dyn SparkApi>>,
        driver: Option<Arc<dyn SparkApi>>,
    ) -> Result<Self, ManagerError> {
        let mut builder = ApplicationInfoManagerBuilder::default();

        if let Some(history_server) = history_server {
            builder = builder.history_server(history_server);
        }

        if let Some(driver) = driver {
            builder = builder.driver(driver);
        }

        builder.build().map_err(|_| ManagerError::NoClient)
    }

    async fn fetch_application(
        &self,
        application_id: &str,
    ) -> Result<(ApplicationResponse, &Arc<dyn SparkApi>), ManagerError> {
        let (preferred, fallback) = match (&self.history_server, &self.driver) {
            (Some(history_server), driver) => (history_server, driver.as_ref()),
            (None, Some(driver)) => (driver, None),
            (None, None) => return Err(ManagerError::NoClient),
        };

        match preferred.get_application(application_id).await {
            Ok(application) => Ok((application, preferred)),
            Err(error) => match fallback {
                Some(driver) => {
                    warn!(
                        "History server couldn't describe '{application_id}', falling back to the driver! Reason: {error}"
                    );

                    let application = driver
                        .get_application(application_id)
                        .await
                        .map_err(ManagerError::Api)?;

                    Ok((application, driver))
                }
                None => Err(ManagerError::Api(error)),
            },
        }
    }
}

#[async_trait]
impl ApplicationInfoSource for ApplicationInfoManager {
    async fn get_application_info(
        &self,
        application_id: &str,
        stage_state: Option<&StageAggregationState>,
    ) -> Result<ApplicationInfo, ManagerError> {
        let (application, client) = self.fetch_application(application_id).await?;

        let environment = client
            .get_environment(application_id)
            .await
            .map_err(ManagerError::Api)?;
        let stages = client
            .get_stages(application_id)
            .await
            .map_err(ManagerError::Api)?;

        info!(
            "Fetched '{application_id}' info: {} attempt(s), {} stage(s) in window",
            application.attempts.len(),
            stages.len()
        );

        Ok(ApplicationInfo {
            application_name: application.name,
            attempts: application.attempts.into_iter().map(Attempt::from).collect(),
            spark_properties: flatten_properties(environment.spark_properties),
            stage_metrics: StageMetricsUpdate::compute(&stages, stage_state),
        })
    }
}

/// Turns `[key, value]` tuples into a map, dropping malformed tuples.
pub fn flatten_properties(tuples: Vec<Vec<String>>) -> BTreeMap<String, String> {
    let mut properties = BTreeMap::new();

    for tuple in tuples {
        match <[String; 2]>::try_from(tuple) {
            Ok([key, value]) => {
                properties.insert(key, value);
            }
            Err(tuple) => warn!("Dropping malformed spark property {tuple:?}"),
        }
    }

    properties
}

impl From<AttemptResponse> for Attempt {
    fn from(attempt: AttemptResponse) -> Self {
        Self {
            start_time_epoch: attempt.start_time_epoch,
            end_time_epoch: attempt.end_time_epoch,
            last_updated_epoch: attempt.last_updated_epoch,
            completed: attempt.completed,
            app_spark_version: attempt.app_spark_version,
        }
    }
}
