use anyhow::Result;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use leaf_dl::{
    checkpoint::CheckpointRecord,
    dataset::ClassCatalog,
    model::{Model, ModelConfig, ResModelConfig},
    optim::AdamaxInit,
    processor::PreprocessSpec,
};
use semver::Version;
use serde_json::Value;
use serve::{
    config::{Config, ModelEntry, ServerConfig},
    routes,
    service::InferenceService,
};
use std::io::Cursor;
use tch::{nn, Device};
use tempfile::TempDir;
use tower::ServiceExt;

const CLASSES: [&str; 4] = [
    "apple_black_rot",
    "apple_cedar_rust",
    "apple_healthy",
    "apple_scab",
];

fn model_config() -> ModelConfig {
    ModelConfig::ResModel(ResModelConfig {
        base_channels: 4,
        stage_blocks: vec![1],
        dropout: 0.0,
    })
}

/// Writes the artifacts a training run leaves behind and serves them.
fn build_app(dir: &TempDir) -> Result<Router> {
    let catalog = ClassCatalog::from_names(CLASSES)?;
    let transform = PreprocessSpec {
        image_size: 32,
        ..Default::default()
    };
    let classes_file = dir.path().join("classes.json");
    let transform_file = dir.path().join("transform.json");
    let checkpoint_file = dir.path().join("model.ckpt");
    catalog.save(&classes_file)?;
    transform.save(&transform_file)?;

    let vs = nn::VarStore::new(Device::Cpu);
    let _model = Model::new(&vs.root(), &model_config(), catalog.len())?;
    let optimizer = AdamaxInit::default().build(&vs, 1e-3)?;
    CheckpointRecord::capture(3, 0.5, &vs, &optimizer).save(&checkpoint_file)?;

    let config = Config {
        version: Version::new(0, 1, 0),
        server: ServerConfig::default(),
        device: Some(Device::Cpu),
        transform_file,
        classes_file,
        models: vec![ModelEntry {
            model: model_config(),
            checkpoint_file,
        }],
    };
    config.validate()?;
    let service = InferenceService::load(&config)?;
    Ok(routes::router(service, 1 << 20))
}

fn jpeg_bytes() -> Result<Vec<u8>> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_fn(48, 40, |x, y| {
        Rgb([(x * 5) as u8, 120, (y * 6) as u8])
    }));
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Jpeg(90))?;
    Ok(bytes)
}

fn upload(uri: &str, field: &str, file_name: &str, bytes: &[u8]) -> Result<Request<Body>> {
    let boundary = "leafdlboundary";
    let mut body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
        boundary = boundary,
        field = field,
        file_name = file_name,
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))?;
    Ok(request)
}

async fn send(app: Router, request: Request<Body>) -> Result<(StatusCode, Value)> {
    let response = app.oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    Ok((status, value))
}

#[tokio::test]
async fn home_reports_liveness() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let app = build_app(&dir)?;
    let request = Request::builder().uri("/").body(Body::empty())?;

    let (status, body) = send(app, request).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::from("API is working as expected"));
    Ok(())
}

#[tokio::test]
async fn predict_jpg_returns_catalog_label() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let app = build_app(&dir)?;
    let bytes = jpeg_bytes()?;

    let request = upload("/predict?model=res-model", "file", "leaf.jpg", &bytes)?;
    let (status, body) = send(app.clone(), request).await?;
    assert_eq!(status, StatusCode::OK);
    let label = body["prediction"].as_str().unwrap().to_owned();
    assert!(CLASSES.contains(&label.as_str()));

    // the same upload under an upper-case name gets the same answer
    let request = upload("/predict?model=res-model", "file", "LEAF.JPG", &bytes)?;
    let (status, body) = send(app, request).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prediction"].as_str(), Some(label.as_str()));
    Ok(())
}

#[tokio::test]
async fn reject_unsupported_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let app = build_app(&dir)?;

    let request = upload("/predict?model=res-model", "file", "leaf.gif", b"GIF89a")?;
    let (status, body) = send(app, request).await?;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["detail"].as_str(), Some("Unsupported file provided."));
    Ok(())
}

#[tokio::test]
async fn reject_undecodable_image() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let app = build_app(&dir)?;

    let request = upload("/predict?model=res-model", "file", "leaf.png", b"not a png")?;
    let (status, _) = send(app, request).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn unknown_model_is_not_found() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let app = build_app(&dir)?;

    let request = upload("/predict?model=vgg", "file", "leaf.jpg", &jpeg_bytes()?)?;
    let (status, _) = send(app, request).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn missing_file_field_is_bad_request() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let app = build_app(&dir)?;

    let request = upload("/predict?model=res-model", "image", "leaf.jpg", &jpeg_bytes()?)?;
    let (status, body) = send(app, request).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"].as_str(), Some("missing multipart field 'file'"));
    Ok(())
}
