use std::{fmt::Display, future::Ready};

use kube::{
    runtime::{
        controller::{Action, Error as ControllerError},
        reflector::ObjectRef,
        watcher::Error as WatcherError,
    },
    Resource,
};
use log::{debug, error, info, warn};
use spark_tracker_core::helpers::pretty_type_name;

/// Logs the outcome of a single reconciliation, meant to drain the
/// controller's result stream.
pub fn log_reconciliation_result<T, E>(
    result: Result<(ObjectRef<T>, Action), ControllerError<E, WatcherError>>,
) -> Ready<()>
where
    T: Resource,
    E: Display,
{
    let kind = pretty_type_name::<T>().to_lowercase();

    match result {
        Ok((object, action)) => info!(
            "Reconciled {kind} {}, next action: {action:?}",
            describe(&object.name, object.namespace.as_deref())
        ),
        Err(ControllerError::ObjectNotFound(object)) => debug!(
            "{kind} {} is gone",
            describe(&object.name, object.namespace.as_deref())
        ),
        Err(ControllerError::ReconcilerFailed(reconciler_error, object)) => warn!(
            "Couldn't reconcile {kind} {}! {reconciler_error}",
            describe(&object.name, object.namespace.as_deref())
        ),
        Err(ControllerError::QueueError(watcher_error)) => {
            error!("Watcher has failed! {watcher_error}")
        }
    }

    std::future::ready(())
}

fn describe(name: &str, namespace: Option<&str>) -> String {
    match namespace {
        Some(namespace) => format!("'{name}' in '{namespace}' namespace"),
        None => format!("'{name}'"),
    }
}
