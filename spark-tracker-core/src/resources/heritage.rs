use std::collections::BTreeMap;

use thiserror::Error;

use super::{
    crd::v1alpha1::application::Heritage,
    labels::{
        has_label_value, APPLICATION_ID_LABEL, JUPYTER_GATEWAY_LABEL, JUPYTER_GATEWAY_VALUE,
        LAUNCHED_BY_OPERATOR_LABEL, LAUNCHED_BY_OPERATOR_VALUE,
    },
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeritageError {
    #[error("Could not determine heritage!")]
    Undetermined,
}

/// Classifies how an application was launched from its driver pod labels.
pub fn classify_heritage(labels: &BTreeMap<String, String>) -> Result<Heritage, HeritageError> {
    if has_label_value(labels, JUPYTER_GATEWAY_LABEL, JUPYTER_GATEWAY_VALUE) {
        return Ok(Heritage::Jupyter);
    }

    if has_label_value(labels, LAUNCHED_BY_OPERATOR_LABEL, LAUNCHED_BY_OPERATOR_VALUE) {
        return Ok(Heritage::Operator);
    }

    if labels.contains_key(APPLICATION_ID_LABEL) {
        return Ok(Heritage::Submit);
    }

    Err(HeritageError::Undetermined)
}
