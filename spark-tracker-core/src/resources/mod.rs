pub mod crd;
pub mod heritage;
pub mod labels;
pub mod snapshot;
