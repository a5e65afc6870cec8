#![allow(clippy::result_large_err)]

pub mod app;
pub mod cache;
pub mod circuit;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod observe;
pub mod probe;
pub mod reconcile;
pub mod scoring;
pub mod select;
pub mod store;
pub mod telemetry;
pub mod triage;
