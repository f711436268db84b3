use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use leaf_dl::LeafError;
use serde_json::json;
use thiserror::Error;

/// Request failures and the HTTP status they map to.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("Unsupported file provided.")]
    UnsupportedMediaType { file_name: String },
    #[error("unknown model '{name}'")]
    UnknownModel { name: String },
    #[error("missing multipart field '{0}'")]
    MissingField(&'static str),
    #[error("malformed multipart request: {0}")]
    Multipart(String),
    #[error("cannot decode the image: {0}")]
    InvalidImage(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::UnknownModel { .. } => StatusCode::NOT_FOUND,
            Self::MissingField(_) | Self::Multipart(_) | Self::InvalidImage(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<LeafError> for ServeError {
    fn from(err: LeafError) -> Self {
        match err {
            LeafError::UnsupportedExtension { file_name, .. } => {
                Self::UnsupportedMediaType { file_name }
            }
            LeafError::Image(err) => Self::InvalidImage(err.to_string()),
            err => Self::Internal(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for ServeError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<LeafError>() {
            Ok(err) => err.into(),
            Err(err) => Self::Internal(format!("{:#}", err)),
        }
    }
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        let err: ServeError = LeafError::UnsupportedExtension {
            file_name: "leaf.gif".into(),
            expected: vec!["jpg".into(), "png".into()],
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(err.to_string(), "Unsupported file provided.");

        let err: ServeError = anyhow::Error::from(LeafError::ShapeMismatch {
            expected: vec![1, 4],
            actual: vec![1, 3],
        })
        .into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = ServeError::UnknownModel {
            name: "vgg".into(),
        };
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}
