use crate::{
    common::*,
    error::ServeError,
    service::{InferenceService, PredictResponse},
};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    routing::{get, post},
    Json, Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Name of the multipart field carrying the image.
const FILE_FIELD: &str = "file";

#[derive(Debug, Clone, Deserialize)]
pub struct PredictQuery {
    pub model: String,
}

/// Builds the HTTP routes over a loaded service.
pub fn router(service: InferenceService, max_upload_size: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(home))
        .route("/predict", post(predict))
        .layer(DefaultBodyLimit::max(max_upload_size))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

async fn home() -> Json<&'static str> {
    Json("API is working as expected")
}

async fn predict(
    State(service): State<InferenceService>,
    Query(PredictQuery { model }): Query<PredictQuery>,
    mut multipart: Multipart,
) -> Result<Json<PredictResponse>, ServeError> {
    // fail fast before reading the upload
    service.package(&model)?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ServeError::Multipart(err.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_owned();
        let bytes = field
            .bytes()
            .await
            .map_err(|err| ServeError::Multipart(err.body_text()))?;
        let response = service.predict(&model, &file_name, bytes.to_vec()).await?;
        info!("'{}' is predicted as '{}' by {}", file_name, response.prediction, model);
        return Ok(Json(response));
    }

    Err(ServeError::MissingField(FILE_FIELD))
}
