//! Control API errors.

use axum::http::StatusCode;

use crate::config::validation::ValidationError;
use crate::net::ListenerError;
use crate::registry::RegistryError;

/// Why a control operation was refused or failed.
///
/// Every variant except `Listener` is returned before any state change.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("configuration rejected: {}", join(.0))]
    InvalidConfig(Vec<ValidationError>),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("health check failed for backend {index} ({url}) of group {path:?} on port {port}")]
    HealthCheckFailed {
        port: u16,
        path: String,
        index: usize,
        url: String,
    },

    #[error("no healthy backend in group {path:?} on port {port}")]
    NoHealthyBackend { port: u16, path: String },

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ControlError {
    /// HTTP status used when the error crosses the admin API.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ControlError::Invalid(_) | ControlError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            ControlError::Registry(e) => match e {
                RegistryError::NoSuchPort(_) | RegistryError::NoSuchGroup { .. } => {
                    StatusCode::NOT_FOUND
                }
                RegistryError::PortExists(_)
                | RegistryError::DuplicateGroup { .. }
                | RegistryError::BackendChanged { .. } => StatusCode::CONFLICT,
                RegistryError::BackendIndexOutOfRange { .. } => StatusCode::BAD_REQUEST,
            },
            ControlError::HealthCheckFailed { .. } | ControlError::NoHealthyBackend { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ControlError::Listener(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ControlError::Invalid(_) | ControlError::InvalidConfig(_) => "INVALID_CONFIG",
            ControlError::Registry(e) => match e {
                RegistryError::NoSuchPort(_) => "NO_SUCH_PORT",
                RegistryError::PortExists(_) => "PORT_EXISTS",
                RegistryError::NoSuchGroup { .. } => "NO_SUCH_GROUP",
                RegistryError::DuplicateGroup { .. } => "DUPLICATE_GROUP",
                RegistryError::BackendIndexOutOfRange { .. } => "INDEX_OUT_OF_RANGE",
                RegistryError::BackendChanged { .. } => "BACKEND_CHANGED",
            },
            ControlError::HealthCheckFailed { .. } => "HEALTH_CHECK_FAILED",
            ControlError::NoHealthyBackend { .. } => "NO_HEALTHY_BACKEND",
            ControlError::Listener(_) => "LISTENER_FAILED",
        }
    }
}
