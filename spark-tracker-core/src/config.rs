use std::{borrow::Cow, env::VarError, str::FromStr, time::Duration};

use thiserror::Error;

pub const NAMESPACE_ENV: &str = "SPARK_TRACKER_NAMESPACE";
pub const API_TIMEOUT_ENV: &str = "SPARK_TRACKER_API_TIMEOUT_SECS";
pub const RUNNING_REQUEUE_ENV: &str = "SPARK_TRACKER_RUNNING_REQUEUE_SECS";
pub const DRIVER_UI_PORT_ENV: &str = "SPARK_TRACKER_DRIVER_UI_PORT";
pub const HISTORY_SERVER_PORT_ENV: &str = "SPARK_TRACKER_HISTORY_SERVER_PORT";
pub const HISTORY_SERVER_SELECTOR_ENV: &str = "SPARK_TRACKER_HISTORY_SERVER_SELECTOR";
pub const DIRECT_HTTP_ENV: &str = "SPARK_TRACKER_DIRECT_HTTP";

pub const DEFAULT_API_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_RUNNING_REQUEUE_SECS: u64 = 10;
pub const DEFAULT_DRIVER_UI_PORT: u16 = 4040;
pub const DEFAULT_HISTORY_SERVER_PORT: u16 = 18080;
pub const DEFAULT_HISTORY_SERVER_SELECTOR: &str = "app.kubernetes.io/name=spark-history-server";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// namespace to watch, all namespaces when unset
    pub namespace: Option<String>,
    /// deadline applied to every call made against the job's REST API
    pub api_timeout: Duration,
    /// delay before revisiting a driver that is still running
    pub running_requeue: Duration,
    pub driver_ui_port: u16,
    pub history_server_port: u16,
    pub history_server_selector: String,
    /// address pods and services directly instead of going through the API server proxy
    pub direct_http: bool,
}

#[derive(Debug, Error)]
pub enum FromError {
    #[error("Env var unavailable: {}", .0)]
    VarUnset(VarError),
    #[error("'{}' couldn't be parsed!", .0)]
    InvalidValue(Cow<'static, str>),
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            api_timeout: Duration::from_secs(DEFAULT_API_TIMEOUT_SECS),
            running_requeue: Duration::from_secs(DEFAULT_RUNNING_REQUEUE_SECS),
            driver_ui_port: DEFAULT_DRIVER_UI_PORT,
            history_server_port: DEFAULT_HISTORY_SERVER_PORT,
            history_server_selector: DEFAULT_HISTORY_SERVER_SELECTOR.to_owned(),
            direct_http: false,
        }
    }
}

impl ControllerConfig {
    pub fn from_env() -> Result<Self, FromError> {
        Self::from_lookup(|key| std::env::var(key))
    }

    pub fn from_lookup(
        lookup: impl Fn(&'static str) -> Result<String, VarError>,
    ) -> Result<Self, FromError> {
        let defaults = Self::default();

        Ok(Self {
            namespace: optional(&lookup, NAMESPACE_ENV)?.filter(|ns| !ns.is_empty()),
            api_timeout: parsed::<u64>(&lookup, API_TIMEOUT_ENV)?
                .map(Duration::from_secs)
                .unwrap_or(defaults.api_timeout),
            running_requeue: parsed::<u64>(&lookup, RUNNING_REQUEUE_ENV)?
                .map(Duration::from_secs)
                .unwrap_or(defaults.running_requeue),
            driver_ui_port: parsed(&lookup, DRIVER_UI_PORT_ENV)?
                .unwrap_or(defaults.driver_ui_port),
            history_server_port: parsed(&lookup, HISTORY_SERVER_PORT_ENV)?
                .unwrap_or(defaults.history_server_port),
            history_server_selector: optional(&lookup, HISTORY_SERVER_SELECTOR_ENV)?
                .unwrap_or(defaults.history_server_selector),
            direct_http: parsed(&lookup, DIRECT_HTTP_ENV)?.unwrap_or(defaults.direct_http),
        })
    }
}

fn optional(
    lookup: &impl Fn(&'static str) -> Result<String, VarError>,
    key: &'static str,
) -> Result<Option<String>, FromError> {
    match lookup(key) {
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(error) => Err(FromError::VarUnset(error)),
    }
}

fn parsed<T: FromStr>(
    lookup: &impl Fn(&'static str) -> Result<String, VarError>,
    key: &'static str,
) -> Result<Option<T>, FromError> {
    optional(lookup, key)?
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|_| FromError::InvalidValue(key.into()))
        })
        .transpose()
}
