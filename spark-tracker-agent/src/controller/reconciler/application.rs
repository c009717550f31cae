use k8s_openapi::api::core::v1::Pod;
use log::{info, warn};
use spark_tracker_core::{
    helpers::{IsDeleting, RequireMetadata},
    resources::{
        crd::v1alpha1::application::{SparkApplication, SparkApplicationSpec},
        heritage::classify_heritage,
        snapshot::PodSnapshot,
    },
    spark::manager::{ApplicationInfo, ManagerError},
};

use super::{context::ReconcilerContext, error::ReconcilerError, ReconcileOutcome};

/// Records the driver's state and the application's runtime info, creating
/// the application resource on first sight. `pod` is replaced with its stored
/// version when it has to be patched.
pub async fn handle_driver_pod(
    pod: &mut Pod,
    application_id: &str,
    existing: Option<SparkApplication>,
    context: &ReconcilerContext,
) -> Result<ReconcileOutcome, ReconcilerError> {
    let namespace = pod.require_namespace_or(ReconcilerError::MissingObjectMetadata)?;
    let pod_name = pod.require_name_or(ReconcilerError::MissingObjectMetadata)?;

    let mut application = existing
        .clone()
        .unwrap_or_else(|| SparkApplication::template(namespace, application_id));
    let spec = &mut application.spec;

    spec.driver = Some(match spec.driver.as_ref() {
        Some(previous) if previous.uid == pod.metadata.uid.as_deref().unwrap_or_default() => {
            previous.refreshed(pod)
        }
        _ => PodSnapshot::from_pod(pod),
    });

    let heritage = match spec.heritage {
        Some(heritage) => heritage,
        None => {
            let labels = pod.metadata.labels.clone().unwrap_or_default();
            let heritage = classify_heritage(&labels).map_err(ReconcilerError::Heritage)?;
            spec.heritage = Some(heritage);

            heritage
        }
    };

    let fetch_failure = match fetch_application_info(pod, application_id, spec, context).await {
        Ok(info) => {
            apply_application_info(spec, info);
            None
        }
        Err(error) => {
            warn!("Couldn't fetch '{application_id}' info, recording local state only! Reason: {error}");
            Some(error)
        }
    };

    if spec.application_name.is_empty() {
        spec.application_name = pod_name.to_owned();
    }

    let driver_running = spec.driver.as_ref().is_some_and(PodSnapshot::is_running);
    let retry_fetch =
        !pod.is_deleting() && should_retry_fetch(fetch_failure.as_ref(), driver_running);

    let application = match existing {
        Some(original) => context.store.patch_application(&original, &application).await?,
        None => context.store.create_application(&application).await?,
    };

    let has_owners = pod
        .metadata
        .owner_references
        .as_ref()
        .is_some_and(|references| !references.is_empty());

    if heritage.allows_ownership() && !has_owners {
        if let Some(reference) = application.dependent_owner_reference() {
            let mut modified = pod.clone();
            modified.metadata.owner_references = Some(vec![reference]);

            *pod = context
                .store
                .patch_pod(pod, &modified)
                .await
                .map_err(ReconcilerError::OwnerReference)?;

            info!("Driver pod of '{application_id}' is now owned by its application resource");
        }
    }

    Ok(if retry_fetch || driver_running {
        ReconcileOutcome::RequeueAfter(context.config.running_requeue)
    } else {
        ReconcileOutcome::NoRequeue
    })
}

/// Records the executor's state on an existing application resource.
pub async fn handle_executor_pod(
    pod: &Pod,
    application_id: &str,
    existing: Option<SparkApplication>,
    context: &ReconcilerContext,
) -> Result<ReconcileOutcome, ReconcilerError> {
    let uid = pod.require_uid_or(ReconcilerError::MissingObjectMetadata)?;
    let original =
        existing.ok_or_else(|| ReconcilerError::ApplicationNotFound(application_id.to_owned()))?;

    let mut application = original.clone();
    let executors = &mut application.spec.executors;

    match executors.iter_mut().find(|executor| executor.uid == uid) {
        Some(executor) => *executor = executor.refreshed(pod),
        None => executors.push(PodSnapshot::from_pod(pod)),
    }

    context
        .store
        .patch_application(&original, &application)
        .await?;

    Ok(ReconcileOutcome::NoRequeue)
}

/// A finished driver won't start serving again, so a missing client is final
/// for it. Deleting drivers are never held back by a failed fetch.
fn should_retry_fetch(failure: Option<&ManagerError>, driver_running: bool) -> bool {
    match failure {
        None => false,
        Some(ManagerError::NoClient) => driver_running,
        Some(_) => true,
    }
}

async fn fetch_application_info(
    driver: &Pod,
    application_id: &str,
    spec: &SparkApplicationSpec,
    context: &ReconcilerContext,
) -> Result<ApplicationInfo, ManagerError> {
    context
        .info_provider
        .info_source(driver)
        .await?
        .get_application_info(application_id, spec.stage_metrics.as_ref())
        .await
}

fn apply_application_info(spec: &mut SparkApplicationSpec, info: ApplicationInfo) {
    if !info.application_name.is_empty() {
        spec.application_name = info.application_name;
    }

    spec.spark_properties = info.spark_properties;
    spec.run_statistics.attempts = info.attempts;
    spec.stage_metrics = Some(info.stage_metrics.apply(&mut spec.run_statistics));
}
