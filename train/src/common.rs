//! Common imports from external crates.

pub use anyhow::{bail, ensure, format_err, Context, Error, Result};
pub use chrono::Local;
pub use futures::{
    future::FutureExt,
    stream::{self, Stream, StreamExt, TryStreamExt},
};
pub use image::RgbImage;
pub use indexmap::IndexMap;
pub use itertools::Itertools;
pub use leaf_dl::{
    batch::Batch,
    checkpoint::{BestTracker, CheckpointRecord, CheckpointSlot},
    dataset::{
        AcceptAll, AllowListFilter, ClassCatalog, ClassFilter, DatasetSplit, ExtensionFilter,
        FolderDataset, KeywordFilter, RegexFilter, StratifiedSplitInit, SubsetKind,
    },
    evaluation::{ClassificationReport, ConfusionMatrix, EvaluationAccumulator},
    model::{Model, ModelConfig},
    optim::{Adamax, AdamaxInit},
    processor::{BatchPreview, PreprocessSpec, ResizeFilter, SampleTransform, TrainTransformInit},
};
pub use noisy_float::prelude::*;
pub use rand::{prelude::*, rngs::StdRng, seq::SliceRandom};
pub use serde::{Deserialize, Serialize};
pub use std::{
    borrow::Cow,
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
pub use tch::{nn, Device, Kind, Tensor};
pub use tch_goodies::Ratio;
pub use tch_tensor_like::TensorLike;
pub use tfrecord::{EventWriter, EventWriterInit};
pub use tokio::sync::mpsc;
pub use tracing::{debug, info, info_span, warn};

pub type Fallible<T> = Result<T, Error>;
