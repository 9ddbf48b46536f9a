use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AccessError {
    /// The decision outcome. Explicit and default denials are indistinguishable.
    #[error("access denied")]
    #[diagnostic(code(perimeter::access::denied))]
    Denied,

    #[error("Protected entity: {0}")]
    #[diagnostic(
        code(perimeter::access::protected_entity),
        help("Built-in roles and policies cannot be modified or deleted")
    )]
    ProtectedEntity(String),

    #[error("Malformed request: {0}")]
    #[diagnostic(
        code(perimeter::access::malformed_request),
        help("A request needs a subject, at least one concrete object (\"type:key\") and an action")
    )]
    MalformedRequest(String),

    #[error("Not found: {0}")]
    #[diagnostic(code(perimeter::access::not_found))]
    NotFound(String),

    #[error("Invalid identifier `{0}`")]
    #[diagnostic(
        code(perimeter::access::invalid_identifier),
        help("Resource identifiers use the form \"type:key\"; role and policy keys are UUIDs")
    )]
    InvalidIdentifier(String),

    #[error("Database error: {0}")]
    #[diagnostic(code(perimeter::access::db))]
    Db(#[from] sea_orm::DbErr),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(perimeter::access::serde))]
    Serde(#[from] serde_json::Error),

    #[error("Failed to load policy file `{path}`")]
    #[diagnostic(
        code(perimeter::access::policy_load),
        help("Check that the file exists and contains valid KDL syntax")
    )]
    PolicyLoadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid policy: {0}")]
    #[diagnostic(
        code(perimeter::access::invalid_policy),
        help("Each policy file must contain `policy \"<name>\" effect=\"allow|deny\" {{ ... }}` nodes")
    )]
    InvalidPolicy(String),

    #[error("KDL parse error: {0}")]
    #[diagnostic(
        code(perimeter::access::kdl_parse),
        help("Check your KDL file syntax, see https://kdl.dev")
    )]
    KdlParse(String),

    #[error("I/O error: {0}")]
    #[diagnostic(code(perimeter::access::io))]
    Io(#[from] std::io::Error),
}

impl AccessError {
    pub fn is_denied(&self) -> bool {
        matches!(self, AccessError::Denied)
    }
}

impl IntoResponse for AccessError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AccessError::Denied => (StatusCode::FORBIDDEN, self.to_string()),
            AccessError::MalformedRequest(_) | AccessError::InvalidIdentifier(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            AccessError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AccessError::ProtectedEntity(_) => (StatusCode::CONFLICT, self.to_string()),
            _ => {
                tracing::error!(error = %self, "access decision could not be determined");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };
        let body = json!({ "error": message });
        (status, Json(body)).into_response()
    }
}
