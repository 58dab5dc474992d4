pub mod analysis;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fingerprint;
pub mod metrics_api;
pub mod model;
pub mod provenance;
pub mod report;
pub mod storage;
pub mod trace;
pub mod verify;
