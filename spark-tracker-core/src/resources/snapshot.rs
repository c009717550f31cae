use k8s_openapi::api::core::v1::{ContainerState, ContainerStatus, Pod};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::helpers::IsDeleting;

/// Point-in-time view of a driver or executor pod as recorded on the application.
#[skip_serializing_none]
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodSnapshot {
    pub uid: String,
    pub namespace: String,
    pub name: String,
    pub phase: Option<String>,
    #[serde(default)]
    pub container_statuses: Vec<ContainerStatusSnapshot>,
    /// set once the pod's deletion was requested, never reset afterwards
    #[serde(default)]
    pub deleted: bool,
}

#[skip_serializing_none]
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatusSnapshot {
    pub name: String,
    pub ready: bool,
    pub restart_count: i32,
    pub state: ContainerPhase,
    pub reason: Option<String>,
    pub exit_code: Option<i32>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum ContainerPhase {
    #[default]
    Unknown,
    Waiting,
    Running,
    Terminated,
}

impl PodSnapshot {
    pub fn from_pod(pod: &Pod) -> Self {
        let status = pod.status.as_ref();

        Self {
            uid: pod.metadata.uid.to_owned().unwrap_or_default(),
            namespace: pod.metadata.namespace.to_owned().unwrap_or_default(),
            name: pod.metadata.name.to_owned().unwrap_or_default(),
            phase: status.and_then(|status| status.phase.to_owned()),
            container_statuses: status
                .and_then(|status| status.container_statuses.as_ref())
                .map(|statuses| statuses.iter().map(ContainerStatusSnapshot::from).collect())
                .unwrap_or_default(),
            deleted: pod.is_deleting(),
        }
    }

    /// Takes the current state of `pod` while keeping the deletion mark sticky.
    pub fn refreshed(&self, pod: &Pod) -> Self {
        let mut snapshot = Self::from_pod(pod);
        snapshot.deleted |= self.deleted;

        snapshot
    }

    pub fn is_running(&self) -> bool {
        self.phase.as_deref() == Some("Running")
    }
}

impl From<&ContainerStatus> for ContainerStatusSnapshot {
    fn from(status: &ContainerStatus) -> Self {
        let (state, reason, exit_code) = match status.state.as_ref() {
            Some(ContainerState {
                running: Some(_), ..
            }) => (ContainerPhase::Running, None, None),
            Some(ContainerState {
                terminated: Some(terminated),
                ..
            }) => (
                ContainerPhase::Terminated,
                terminated.reason.to_owned(),
                Some(terminated.exit_code),
            ),
            Some(ContainerState {
                waiting: Some(waiting),
                ..
            }) => (ContainerPhase::Waiting, waiting.reason.to_owned(), None),
            _ => (ContainerPhase::Unknown, None, None),
        };

        Self {
            name: status.name.to_owned(),
            ready: status.ready,
            restart_count: status.restart_count,
            state,
            reason,
            exit_code,
        }
    }
}
