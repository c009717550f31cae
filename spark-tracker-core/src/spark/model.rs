//! Payloads returned by the spark monitoring REST API (`/api/v1`).
//!
//! Only the fields this crate consumes are modelled, everything else is ignored.

use serde::Deserialize;

#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationResponse {
    pub id: String,
    pub name: String,
    pub attempts: Vec<AttemptResponse>,
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AttemptResponse {
    pub attempt_id: Option<String>,
    pub start_time_epoch: i64,
    pub end_time_epoch: i64,
    pub last_updated_epoch: i64,
    pub duration: i64,
    pub spark_user: String,
    pub completed: bool,
    pub app_spark_version: String,
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvironmentResponse {
    pub runtime: RuntimeResponse,
    /// key/value tuples, well formed entries have exactly two elements
    pub spark_properties: Vec<Vec<String>>,
    pub hadoop_properties: Vec<Vec<String>>,
    pub system_properties: Vec<Vec<String>>,
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeResponse {
    pub java_version: String,
    pub java_home: String,
    pub scala_version: String,
}

#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum StageStatus {
    Active,
    Complete,
    Pending,
    Failed,
    Skipped,
    #[default]
    #[serde(other)]
    Unknown,
}

impl StageStatus {
    /// Finalized stages won't report different metrics anymore.
    pub fn is_finalized(&self) -> bool {
        matches!(
            self,
            StageStatus::Complete | StageStatus::Failed | StageStatus::Skipped
        )
    }
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct StageResponse {
    pub status: StageStatus,
    pub stage_id: i64,
    pub attempt_id: i64,
    pub name: String,
    pub num_tasks: i64,
    pub input_bytes: i64,
    pub output_bytes: i64,
    pub executor_cpu_time: i64,
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutorResponse {
    pub id: String,
    pub host_port: String,
    pub is_active: bool,
    pub total_cores: i64,
    pub active_tasks: i64,
    pub failed_tasks: i64,
    pub completed_tasks: i64,
    pub total_tasks: i64,
    pub total_duration: i64,
    pub total_input_bytes: i64,
    pub total_shuffle_read: i64,
    pub total_shuffle_write: i64,
    pub max_memory: i64,
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamingStatisticsResponse {
    pub start_time: String,
    pub batch_duration: i64,
    pub num_receivers: i64,
    pub num_active_receivers: i64,
    pub num_inactive_receivers: i64,
    pub num_total_completed_batches: i64,
    pub num_retained_completed_batches: i64,
    pub num_active_batches: i64,
    pub num_processed_records: i64,
    pub num_received_records: i64,
    pub avg_input_rate: Option<f64>,
    pub avg_scheduling_delay: Option<i64>,
    pub avg_processing_time: Option<i64>,
    pub avg_total_delay: Option<i64>,
}
