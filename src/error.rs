//! Error types for the alert engine.

use sea_orm::DbErr;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Failures of the alert store.
#[derive(Debug, Error)]
pub enum AlertError {
    /// Referenced alert id does not exist.
    #[error("alert {0} not found")]
    NotFound(Uuid),

    /// Another open alert already holds this lineage.
    #[error("alert lineage {0} already has an open alert")]
    Conflict(String),

    /// Request rejected at construction.
    #[error("invalid alert request: {0}")]
    InvalidRequest(String),

    /// Underlying store read or write failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] DbErr),
}

/// A domain data gateway call failed.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("database error: {0}")]
    Database(#[from] DbErr),

    #[error("inconsistent herd data: {0}")]
    Inconsistent(String),
}

/// Failures of the external priority classifier. Never fatal to alert creation.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier is not configured")]
    Disabled,

    #[error("classifier timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("classifier API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("unrecognized classifier answer: {0}")]
    InvalidResponse(String),
}

/// Failure of one evaluator run for one property.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("upstream data error: {0}")]
    Upstream(#[from] GatewayError),

    #[error("evaluation timed out after {0:?}")]
    Timeout(Duration),

    #[error("rule {rule} is not handled by the {evaluator} evaluator")]
    UnsupportedRule {
        rule: &'static str,
        evaluator: &'static str,
    },
}

/// Invalid or missing environment configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}
