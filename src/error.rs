use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KilnError {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config from {path}: {message}")]
    ConfigParse { path: String, message: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("failed to initialize the HTTP client")]
    HttpClient {
        #[source]
        source: reqwest::Error,
    },

    #[error("request to the VM API failed while {operation}")]
    Request {
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("VM API returned {status} while {operation}")]
    Response {
        operation: String,
        status: reqwest::StatusCode,
    },

    #[error("could not parse {what} from the VM API: {message}")]
    Parse { what: String, message: String },

    #[error("provisioning failed: {message}")]
    Provision { message: String },

    #[error("build halted during {step}")]
    Halted { step: String },
}

impl KilnError {
    /// Request error tagged with the operation that was being attempted.
    pub fn request(operation: &str, source: reqwest::Error) -> Self {
        Self::Request {
            operation: operation.into(),
            source,
        }
    }

    /// Response error for an unexpected HTTP status.
    pub fn response(operation: &str, status: reqwest::StatusCode) -> Self {
        Self::Response {
            operation: operation.into(),
            status,
        }
    }
}
