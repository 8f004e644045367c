pub mod commands;
pub mod k8s;
pub mod manifest;
pub mod telemetry;
