use std::path::PathBuf;
use thiserror::Error;

/// Typed failures raised by the dataset, preprocessing and inference stages.
#[derive(Debug, Error)]
pub enum LeafError {
    #[error("no class directory under '{}' matches the class filter", dir.display())]
    ClassNotFound { dir: PathBuf },
    #[error("class '{class}' has no valid image file under '{}'", dir.display())]
    EmptyClass { class: String, dir: PathBuf },
    #[error(
        "class '{class}' has {count} samples, fewer than the {subsets} subsets to stratify into"
    )]
    DegenerateStratification {
        class: String,
        count: usize,
        subsets: usize,
    },
    #[error("invalid split: {reason}")]
    InvalidSplit { reason: String },
    #[error("unsupported file '{file_name}', expect one of {expected:?}")]
    UnsupportedExtension {
        file_name: String,
        expected: Vec<String>,
    },
    #[error("cannot preview {requested} images from a batch of size {batch_size}")]
    PreviewExceedsBatch { requested: usize, batch_size: usize },
    #[error("expect shape {expected:?}, but get {actual:?}")]
    ShapeMismatch { expected: Vec<i64>, actual: Vec<i64> },
    #[error("checkpoint '{}' has no entry '{key}'", path.display())]
    MissingCheckpointEntry { path: PathBuf, key: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Torch(#[from] tch::TchError),
}
