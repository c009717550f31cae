//! In-memory stand-ins for the cluster and the spark REST API.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use k8s_openapi::{
    api::core::v1::{Pod, PodStatus},
    apimachinery::pkg::apis::meta::v1::Time,
    chrono::{TimeZone, Utc},
    serde::{de::DeserializeOwned, Serialize},
};
use kube::{core::ObjectMeta, Resource};
use serde_json::Value;
use spark_tracker_core::{
    config::ControllerConfig,
    kubernetes::{
        patch::optimistic_merge_patch,
        store::{ResourceStore, StoreError},
    },
    resources::crd::v1alpha1::application::SparkApplication,
    spark::{
        api::{ApiError, SparkApi},
        manager::{ApplicationInfoManager, ApplicationInfoSource, ManagerError},
        model::{
            ApplicationResponse, AttemptResponse, EnvironmentResponse, ExecutorResponse,
            StageResponse, StageStatus, StreamingStatisticsResponse,
        },
        transport::TransportError,
    },
};

use crate::controller::provider::InfoSourceProvider;

use super::context::ReconcilerContext;

pub const NAMESPACE: &str = "jobs";

pub fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

pub fn pod(name: &str, uid: &str, phase: &str, labels: BTreeMap<String, String>) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_owned()),
            namespace: Some(NAMESPACE.to_owned()),
            uid: Some(uid.to_owned()),
            labels: Some(labels),
            ..Default::default()
        },
        status: Some(PodStatus {
            phase: Some(phase.to_owned()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn stage(id: i64, status: StageStatus, input: i64, output: i64, cpu: i64) -> StageResponse {
    StageResponse {
        status,
        stage_id: id,
        input_bytes: input,
        output_bytes: output,
        executor_cpu_time: cpu,
        ..Default::default()
    }
}

pub fn context(store: &InMemoryStore, api: &ScriptedSparkApi) -> ReconcilerContext {
    with_provider(store, ScriptedProvider { api: Some(api.clone()) })
}

/// Context of a namespace with neither a history server nor a serving driver.
pub fn context_without_clients(store: &InMemoryStore) -> ReconcilerContext {
    with_provider(store, ScriptedProvider { api: None })
}

fn with_provider(store: &InMemoryStore, provider: ScriptedProvider) -> ReconcilerContext {
    ReconcilerContext {
        store: Arc::new(store.clone()),
        info_provider: Arc::new(provider),
        config: Arc::new(ControllerConfig::default()),
    }
}

#[derive(Default)]
struct StoreState {
    pods: BTreeMap<String, Value>,
    applications: BTreeMap<String, Value>,
    last_version: u64,
    patches: usize,
    conflict_on_next_application_patch: bool,
}

impl StoreState {
    fn next_version(&mut self) -> String {
        self.last_version += 1;
        self.last_version.to_string()
    }
}

/// Single namespace object store applying merge patches the way the API
/// server does, including resource version checks.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryStore {
    pub fn insert_pod(&self, mut pod: Pod) {
        let mut state = self.state.lock().unwrap();
        pod.metadata.resource_version = Some(state.next_version());
        let name = pod.metadata.name.clone().unwrap();

        state.pods.insert(name, serde_json::to_value(pod).unwrap());
    }

    pub fn pod(&self, name: &str) -> Pod {
        let state = self.state.lock().unwrap();

        serde_json::from_value(state.pods[name].clone()).unwrap()
    }

    pub fn mark_deleting(&self, name: &str) {
        self.update_pod(name, |pod| {
            pod.metadata.deletion_timestamp =
                Some(Time(Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap()))
        });
    }

    pub fn set_phase(&self, name: &str, phase: &str) {
        self.update_pod(name, |pod| {
            pod.status.get_or_insert_with(Default::default).phase = Some(phase.to_owned())
        });
    }

    /// Number of non-empty patches applied so far.
    pub fn patch_count(&self) -> usize {
        self.state.lock().unwrap().patches
    }

    pub fn conflict_on_next_application_patch(&self) {
        self.state.lock().unwrap().conflict_on_next_application_patch = true;
    }

    fn update_pod(&self, name: &str, update: impl FnOnce(&mut Pod)) {
        let mut pod = self.pod(name);
        update(&mut pod);
        self.insert_pod(pod);
    }
}

fn conflict(name: &str) -> StoreError {
    StoreError::Conflict(format!("the object '{name}' has been modified"))
}

fn get<K: DeserializeOwned>(objects: &BTreeMap<String, Value>, name: &str) -> Option<K> {
    objects
        .get(name)
        .map(|value| serde_json::from_value(value.clone()).unwrap())
}

fn patch<K>(
    objects: &mut BTreeMap<String, Value>,
    next_version: String,
    original: &K,
    modified: &K,
) -> Result<Option<K>, StoreError>
where
    K: Resource + Serialize + DeserializeOwned + Clone,
{
    let name = original.meta().name.clone().unwrap_or_default();
    let Some(patch) = optimistic_merge_patch(original, modified).map_err(StoreError::Serialization)?
    else {
        return Ok(None);
    };

    let stored = objects
        .get_mut(&name)
        .ok_or_else(|| StoreError::Conflict(format!("'{name}' not found")))?;

    if patch["metadata"]["resourceVersion"] != stored["metadata"]["resourceVersion"] {
        return Err(conflict(&name));
    }

    json_patch::merge(stored, &patch);
    stored["metadata"]["resourceVersion"] = Value::String(next_version);

    Ok(Some(serde_json::from_value(stored.clone()).unwrap()))
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn get_pod(&self, _namespace: &str, name: &str) -> Result<Option<Pod>, StoreError> {
        Ok(get(&self.state.lock().unwrap().pods, name))
    }

    async fn patch_pod(&self, original: &Pod, modified: &Pod) -> Result<Pod, StoreError> {
        let mut state = self.state.lock().unwrap();
        let version = state.next_version();

        match patch(&mut state.pods, version, original, modified)? {
            Some(patched) => {
                state.patches += 1;
                Ok(patched)
            }
            None => Ok(original.clone()),
        }
    }

    async fn get_application(
        &self,
        _namespace: &str,
        name: &str,
    ) -> Result<Option<SparkApplication>, StoreError> {
        Ok(get(&self.state.lock().unwrap().applications, name))
    }

    async fn create_application(
        &self,
        application: &SparkApplication,
    ) -> Result<SparkApplication, StoreError> {
        let mut state = self.state.lock().unwrap();
        let name = application
            .meta()
            .name
            .clone()
            .ok_or(StoreError::MissingObjectMetadata)?;

        if state.applications.contains_key(&name) {
            return Err(conflict(&name));
        }

        let mut created = application.clone();
        created.metadata.uid = Some(format!("uid-{name}"));
        created.metadata.resource_version = Some(state.next_version());
        state
            .applications
            .insert(name, serde_json::to_value(&created).unwrap());

        Ok(created)
    }

    async fn patch_application(
        &self,
        original: &SparkApplication,
        modified: &SparkApplication,
    ) -> Result<SparkApplication, StoreError> {
        let mut state = self.state.lock().unwrap();

        if std::mem::take(&mut state.conflict_on_next_application_patch) {
            return Err(conflict("application"));
        }

        let version = state.next_version();

        match patch(&mut state.applications, version, original, modified)? {
            Some(patched) => {
                state.patches += 1;
                Ok(patched)
            }
            None => Ok(original.clone()),
        }
    }
}

#[derive(Default)]
struct ApiState {
    available: bool,
    name: String,
    stages: Vec<StageResponse>,
}

/// Spark REST API double serving whatever it was last told to.
#[derive(Clone, Default)]
pub struct ScriptedSparkApi {
    state: Arc<Mutex<ApiState>>,
}

impl ScriptedSparkApi {
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn serve(&self, name: &str, stages: Vec<StageResponse>) {
        let mut state = self.state.lock().unwrap();
        state.available = true;
        state.name = name.to_owned();
        state.stages = stages;
    }

    pub fn fail(&self) {
        self.state.lock().unwrap().available = false;
    }

    fn respond<T>(&self, response: impl FnOnce(&ApiState) -> T) -> Result<T, ApiError> {
        let state = self.state.lock().unwrap();

        if state.available {
            Ok(response(&state))
        } else {
            Err(ApiError::Transport(TransportError::InvalidRequest(
                "driver is unreachable".to_owned(),
            )))
        }
    }
}

#[async_trait]
impl SparkApi for ScriptedSparkApi {
    async fn get_application(&self, application_id: &str) -> Result<ApplicationResponse, ApiError> {
        self.respond(|state| ApplicationResponse {
            id: application_id.to_owned(),
            name: state.name.clone(),
            attempts: vec![AttemptResponse {
                start_time_epoch: 1685613600000,
                end_time_epoch: -1,
                last_updated_epoch: 1685613660000,
                app_spark_version: "3.4.0".to_owned(),
                ..Default::default()
            }],
        })
    }

    async fn get_environment(&self, _application_id: &str) -> Result<EnvironmentResponse, ApiError> {
        self.respond(|state| EnvironmentResponse {
            spark_properties: vec![vec!["spark.app.name".to_owned(), state.name.clone()]],
            ..Default::default()
        })
    }

    async fn get_stages(&self, _application_id: &str) -> Result<Vec<StageResponse>, ApiError> {
        self.respond(|state| state.stages.clone())
    }

    async fn get_all_executors(
        &self,
        _application_id: &str,
    ) -> Result<Vec<ExecutorResponse>, ApiError> {
        self.respond(|_| Vec::new())
    }

    async fn get_streaming_statistics(
        &self,
        _application_id: &str,
    ) -> Result<StreamingStatisticsResponse, ApiError> {
        self.respond(|_| StreamingStatisticsResponse::default())
    }

    async fn get_metrics(&self) -> Result<Value, ApiError> {
        self.respond(|_| Value::Null)
    }
}

struct ScriptedProvider {
    api: Option<ScriptedSparkApi>,
}

#[async_trait]
impl InfoSourceProvider for ScriptedProvider {
    async fn info_source(
        &self,
        _driver: &Pod,
    ) -> Result<Box<dyn ApplicationInfoSource>, ManagerError> {
        let driver = self
            .api
            .clone()
            .map(|api| Arc::new(api) as Arc<dyn SparkApi>);

        Ok(Box::new(ApplicationInfoManager::new(None, driver)?))
    }
}
