use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use kube::Resource;

/// carries the id of the spark application a pod belongs to
pub const APPLICATION_ID_LABEL: &str = "spark-app-selector";
/// `driver` or `executor`
pub const ROLE_LABEL: &str = "spark-role";

pub const JUPYTER_GATEWAY_LABEL: &str = "app";
pub const JUPYTER_GATEWAY_VALUE: &str = "enterprise-gateway";
pub const LAUNCHED_BY_OPERATOR_LABEL: &str = "sparkoperator.k8s.io/launched-by-spark-operator";
pub const LAUNCHED_BY_OPERATOR_VALUE: &str = "true";

pub const DRIVER_ROLE: &str = "driver";
pub const EXECUTOR_ROLE: &str = "executor";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SparkRole {
    Driver,
    Executor,
}

impl FromStr for SparkRole {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            DRIVER_ROLE => Ok(SparkRole::Driver),
            EXECUTOR_ROLE => Ok(SparkRole::Executor),
            _ => Err(()),
        }
    }
}

impl Display for SparkRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SparkRole::Driver => f.write_str(DRIVER_ROLE),
            SparkRole::Executor => f.write_str(EXECUTOR_ROLE),
        }
    }
}

pub trait GetLabel {
    fn get_label(&self, key: &str) -> Option<&str>;
}

impl<T: Resource> GetLabel for T {
    fn get_label(&self, key: &str) -> Option<&str> {
        self.meta()
            .labels
            .as_ref()
            .and_then(|labels| labels.get(key))
            .map(String::as_str)
    }
}

pub fn has_label_value(labels: &BTreeMap<String, String>, key: &str, value: &str) -> bool {
    labels.get(key).map(String::as_str) == Some(value)
}
