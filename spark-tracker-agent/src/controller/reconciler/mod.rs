use std::{sync::Arc, time::Duration};

use k8s_openapi::api::core::v1::Pod;
use kube::{runtime::controller::Action, Resource};
use log::{debug, info, warn};
use spark_tracker_core::{
    helpers::{IsDeleting, RequireMetadata},
    resources::{
        crd::v1alpha1::application::SparkApplication,
        labels::{GetLabel, SparkRole, APPLICATION_ID_LABEL, ROLE_LABEL},
    },
    TRACKING_FINALIZER,
};

use self::{
    application::{handle_driver_pod, handle_executor_pod},
    context::ReconcilerContext,
    error::ReconcilerError,
};

pub mod application;
pub mod context;
pub mod error;

#[cfg(test)]
mod fake;

const DEFAULT_ERROR_REQUEUE_SECS: u64 = 10;
const CONFLICT_ERROR_REQUEUE_SECS: u64 = 1;

/// What the controller should do with a pod after it was reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    NoRequeue,
    RequeueNow,
    RequeueAfter(Duration),
}

impl ReconcileOutcome {
    pub fn requests_requeue(&self) -> bool {
        !matches!(self, ReconcileOutcome::NoRequeue)
    }
}

impl From<ReconcileOutcome> for Action {
    fn from(outcome: ReconcileOutcome) -> Self {
        match outcome {
            ReconcileOutcome::NoRequeue => Action::await_change(),
            ReconcileOutcome::RequeueNow => Action::requeue(Duration::ZERO),
            ReconcileOutcome::RequeueAfter(delay) => Action::requeue(delay),
        }
    }
}

pub async fn reconcile_pod(
    object: Arc<Pod>,
    context: Arc<ReconcilerContext>,
) -> Result<Action, ReconcilerError> {
    let namespace = object.require_namespace_or(ReconcilerError::MissingObjectMetadata)?;
    let name = object.require_name_or(ReconcilerError::MissingObjectMetadata)?;

    Ok(reconcile(namespace, name, &context).await?.into())
}

pub fn reconcile_pod_error(
    _object: Arc<Pod>,
    error: &ReconcilerError,
    _context: Arc<ReconcilerContext>,
) -> Action {
    Action::requeue(Duration::from_secs(if error.is_conflict() {
        CONFLICT_ERROR_REQUEUE_SECS
    } else {
        DEFAULT_ERROR_REQUEUE_SECS
    }))
}

/// Brings the application resource in line with the current state of a
/// single driver or executor pod.
pub async fn reconcile(
    namespace: &str,
    name: &str,
    context: &ReconcilerContext,
) -> Result<ReconcileOutcome, ReconcilerError> {
    let Some(mut pod) = context.store.get_pod(namespace, name).await? else {
        debug!("Pod '{name}' in '{namespace}' namespace is gone, nothing to do");
        return Ok(ReconcileOutcome::NoRequeue);
    };

    let application_id = match pod.get_label(APPLICATION_ID_LABEL) {
        None => return Ok(ReconcileOutcome::NoRequeue),
        Some("") => {
            warn!("Pod '{name}' in '{namespace}' namespace has an empty application id, skipping");
            return Ok(ReconcileOutcome::NoRequeue);
        }
        Some(application_id) => application_id.to_owned(),
    };

    let role = match pod.get_label(ROLE_LABEL).map(str::parse::<SparkRole>) {
        Some(Ok(role)) => role,
        _ => {
            warn!(
                "Pod '{name}' of '{application_id}' has an unrecognized '{ROLE_LABEL}' label, skipping"
            );
            return Ok(ReconcileOutcome::NoRequeue);
        }
    };

    if !pod.is_deleting() && !has_finalizer(&pod) {
        context
            .store
            .patch_pod(&pod, &with_finalizer(&pod))
            .await
            .map_err(ReconcilerError::Finalizer)?;

        info!("Started tracking {role} pod '{name}' of '{application_id}'");

        return Ok(ReconcileOutcome::RequeueNow);
    }

    let application = context
        .store
        .get_application(namespace, &application_id)
        .await?;

    if application.is_none() && pod.is_deleting() && is_cascade_delete(&pod, role, &application_id)
    {
        info!("'{application_id}' is gone, releasing {role} pod '{name}'");
        release_pod(&pod, context).await?;

        return Ok(ReconcileOutcome::NoRequeue);
    }

    let outcome = match role {
        SparkRole::Driver => {
            handle_driver_pod(&mut pod, &application_id, application, context).await?
        }
        SparkRole::Executor => {
            handle_executor_pod(&pod, &application_id, application, context).await?
        }
    };

    if pod.is_deleting() && !outcome.requests_requeue() {
        release_pod(&pod, context).await?;
        info!("Stopped tracking {role} pod '{name}' of '{application_id}'");
    }

    Ok(outcome)
}

/// A deleted pod whose application resource is missing. Drivers are only
/// released when they are owned by the resource, executors never own one.
fn is_cascade_delete(pod: &Pod, role: SparkRole, application_id: &str) -> bool {
    match role {
        SparkRole::Driver => is_owned_by_application(pod, application_id),
        SparkRole::Executor => true,
    }
}

pub fn is_owned_by_application(pod: &Pod, application_id: &str) -> bool {
    let kind = SparkApplication::kind(&());

    pod.metadata
        .owner_references
        .iter()
        .flatten()
        .any(|reference| reference.kind == kind && reference.name == application_id)
}

async fn release_pod(pod: &Pod, context: &ReconcilerContext) -> Result<(), ReconcilerError> {
    if !has_finalizer(pod) {
        return Ok(());
    }

    context
        .store
        .patch_pod(pod, &without_finalizer(pod))
        .await
        .map_err(ReconcilerError::Finalizer)?;

    Ok(())
}

fn has_finalizer(pod: &Pod) -> bool {
    pod.metadata
        .finalizers
        .iter()
        .flatten()
        .any(|finalizer| finalizer == TRACKING_FINALIZER)
}

fn with_finalizer(pod: &Pod) -> Pod {
    let mut modified = pod.clone();

    modified
        .metadata
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(TRACKING_FINALIZER.to_owned());

    modified
}

fn without_finalizer(pod: &Pod) -> Pod {
    let mut modified = pod.clone();
    let finalizers: Vec<String> = pod
        .metadata
        .finalizers
        .iter()
        .flatten()
        .filter(|finalizer| *finalizer != TRACKING_FINALIZER)
        .cloned()
        .collect();

    modified.metadata.finalizers = if finalizers.is_empty() {
        None
    } else {
        Some(finalizers)
    };

    modified
}
