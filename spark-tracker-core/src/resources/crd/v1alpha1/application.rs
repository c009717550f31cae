use std::{collections::BTreeMap, fmt::Display};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{CustomResource, Resource};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::{resources::snapshot::PodSnapshot, spark::stages::StageAggregationState};

/// Mirrors the lifecycle and runtime metrics of a single spark application run.
/// The resource is named after the application id.
#[skip_serializing_none]
#[derive(CustomResource, Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[kube(
    group = "spark-tracker.dev",
    version = "v1alpha1",
    kind = "SparkApplication",
    shortname = "sparkapp",
    namespaced,
    derive = "Default",
    derive = "PartialEq"
)]
pub struct SparkApplicationSpec {
    /// id of the application run, immutable once set
    pub application_id: String,
    /// name reported by the application, the driver pod name until then
    #[serde(default)]
    pub application_name: String,
    /// how the application was launched
    pub heritage: Option<Heritage>,
    /// latest known state of the driver pod
    pub driver: Option<PodSnapshot>,
    /// executor pods in order of first appearance, unique by uid
    #[serde(default)]
    pub executors: Vec<PodSnapshot>,
    /// flattened spark configuration reported by the application
    #[serde(default)]
    pub spark_properties: BTreeMap<String, String>,
    #[serde(default)]
    pub run_statistics: RunStatistics,
    /// bookkeeping of the incremental stage metrics aggregation
    pub stage_metrics: Option<StageAggregationState>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Heritage {
    Submit,
    Operator,
    Jupyter,
}

impl Heritage {
    /// Whether the driver pod is left for this controller to own.
    /// Operator launched drivers are already owned by the operator's resource.
    pub fn allows_ownership(&self) -> bool {
        matches!(self, Heritage::Submit | Heritage::Jupyter)
    }
}

impl Display for Heritage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Heritage::Submit => f.write_str("submit"),
            Heritage::Operator => f.write_str("operator"),
            Heritage::Jupyter => f.write_str("jupyter"),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunStatistics {
    pub total_input_bytes: i64,
    pub total_output_bytes: i64,
    pub total_executor_cpu_time: i64,
    #[serde(default)]
    pub attempts: Vec<Attempt>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    pub start_time_epoch: i64,
    pub end_time_epoch: i64,
    pub last_updated_epoch: i64,
    pub completed: bool,
    #[serde(default)]
    pub app_spark_version: String,
}

impl SparkApplication {
    /// An empty application record for `application_id` in `namespace`.
    pub fn template(namespace: &str, application_id: &str) -> Self {
        let mut application = SparkApplication::new(
            application_id,
            SparkApplicationSpec {
                application_id: application_id.to_owned(),
                ..Default::default()
            },
        );
        application.metadata.namespace = Some(namespace.to_owned());

        application
    }

    /// Non-controlling owner reference that blocks the owner's deletion
    /// until the dependent is gone. `None` until the resource has a uid.
    pub fn dependent_owner_reference(&self) -> Option<OwnerReference> {
        let mut reference = self.controller_owner_ref(&())?;

        reference.controller = Some(false);
        reference.block_owner_deletion = Some(true);

        Some(reference)
    }
}
