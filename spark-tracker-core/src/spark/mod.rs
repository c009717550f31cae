//! Acquisition of runtime information from a spark application's REST API.
//!
//! [`transport`] moves bytes, [`api`] turns them into typed responses,
//! [`manager`] picks a client and assembles an [`manager::ApplicationInfo`],
//! and [`stages`] keeps cumulative stage metrics correct across polls.

pub mod api;
pub mod manager;
pub mod model;
pub mod stages;
pub mod transport;
