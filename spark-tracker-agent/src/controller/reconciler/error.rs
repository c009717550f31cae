use spark_tracker_core::{kubernetes::store::StoreError, resources::heritage::HeritageError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Object is missing metadata!")]
    MissingObjectMetadata,
    #[error("Couldn't write the spark application resource! Reason: {}", .0)]
    Store(StoreError),
    #[error("Couldn't update the tracking finalizer! Reason: {}", .0)]
    Finalizer(StoreError),
    #[error("Couldn't set the driver pod owner reference! Reason: {}", .0)]
    OwnerReference(StoreError),
    #[error("Spark application cr not found: '{}'!", .0)]
    ApplicationNotFound(String),
    #[error("Driver pod heritage is unknown! Reason: {}", .0)]
    Heritage(HeritageError),
}

impl ReconcilerError {
    /// Whether the failure was caused by a concurrent modification.
    pub fn is_conflict(&self) -> bool {
        match self {
            ReconcilerError::Store(error)
            | ReconcilerError::Finalizer(error)
            | ReconcilerError::OwnerReference(error) => error.is_conflict(),
            _ => false,
        }
    }
}

impl From<StoreError> for ReconcilerError {
    fn from(error: StoreError) -> Self {
        ReconcilerError::Store(error)
    }
}
