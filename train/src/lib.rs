//! The training program for the leaf disease classifier.

pub mod common;
pub mod config;
pub mod data_loader;
pub mod logging;
pub mod report;
pub mod train;
pub mod utils;

use crate::{
    common::*,
    config::Config,
    data_loader::DataLoaderInit,
    logging::MetricsSink,
    report::{HistoryWriter, SplitSummary},
    train::Loaders,
};

/// The entry of training program. Returns the run directory.
pub async fn start(config: Arc<Config>) -> Result<PathBuf> {
    let start_time = Local::now();
    let logging_dir: Arc<Path> = {
        let dir = config
            .logging
            .dir
            .join(format!("{}", start_time.format(utils::FILE_STRFTIME)));
        dir.into_boxed_path().into()
    };
    let checkpoint_dir: Arc<Path> = logging_dir.join("checkpoints").into_boxed_path().into();

    // create dirs and save config
    {
        tokio::fs::create_dir_all(&*logging_dir).await?;
        tokio::fs::create_dir_all(&*checkpoint_dir).await?;
        let path = logging_dir.join("config.json5");
        let text = serde_json::to_string_pretty(&*config)?;
        tokio::fs::write(&path, text).await?;
    }
    info!("run directory: {}", logging_dir.display());

    // load dataset
    info!("loading dataset");
    let (catalog, loaders, preview) = {
        let config = config.clone();
        let logging_dir = logging_dir.clone();
        tokio::task::spawn_blocking(move || prepare_data(&config, &logging_dir)).await??
    };

    // start logger
    let (logging_tx, logging_rx) = mpsc::unbounded_channel();
    let logging_future = logging::logging_worker(logging_dir.clone(), logging_rx).await?;

    // training worker
    let training_worker_future = {
        let config = config.clone();
        let checkpoint_dir = checkpoint_dir.clone();
        let metrics = MetricsSink::new(logging_tx);
        let runtime = tokio::runtime::Handle::current();
        let num_classes = catalog.len();
        let history = HistoryWriter::create(logging_dir.join("history.csv"))?;

        tokio::task::spawn_blocking(move || {
            train::training_worker(
                config,
                checkpoint_dir,
                num_classes,
                loaders,
                preview,
                metrics,
                history,
                runtime,
            )
        })
        .map(|result| Fallible::Ok(result??))
    };

    let (test_output, ()) = futures::try_join!(training_worker_future, logging_future)?;

    // report
    let report = report::write_evaluation_report(&logging_dir, &catalog, &test_output.accumulator)?;
    info!("classification report on the test subset\n{}", report);

    Ok(logging_dir.to_path_buf())
}

type PreparedData = (ClassCatalog, Loaders, Option<(BatchPreview, PreprocessSpec)>);

/// Indexes and splits the dataset, persists the artifacts the serving side
/// needs, and builds the data loaders.
fn prepare_data(config: &Config, logging_dir: &Path) -> Result<PreparedData> {
    let Config {
        dataset: ref dataset_config,
        preprocessor: ref preprocessor_config,
        ref training,
        ref logging,
        ..
    } = *config;

    let class_filter = dataset_config.class_filter.build()?;
    let dataset = FolderDataset::load(
        &dataset_config.root_dir,
        &*class_filter,
        &dataset_config.file_filter(),
    )
    .with_context(|| {
        format!(
            "failed to load dataset '{}'",
            dataset_config.root_dir.display()
        )
    })?;
    let catalog = dataset.catalog();
    info!(
        "found {} samples in {} classes",
        dataset.len(),
        catalog.len()
    );

    let split = dataset_config.split.clone().build()?.split_dataset(&dataset)?;
    let summary = SplitSummary::new(&dataset, &split, dataset_config.split.seed);
    summary.log();

    let spec = preprocessor_config.preprocess_spec();
    spec.validate()?;
    let train_transform =
        TrainTransformInit::from(&preprocessor_config.augmentation).build(spec.clone())?;

    let batch_size = training.batch_size.get();
    let preview = logging
        .preview_images
        .map(|num_images| BatchPreview::new(num_images, batch_size))
        .transpose()?
        .map(|preview| (preview, spec.clone()));

    // persist artifacts
    catalog.save(logging_dir.join("classes.json"))?;
    spec.save(logging_dir.join("transform.json"))?;
    summary.save(logging_dir.join("split.json"))?;

    // build loaders
    let subset = |kind: SubsetKind| {
        split
            .get(kind)
            .iter()
            .map(|&index| dataset.samples()[index].clone())
            .collect_vec()
    };
    let loader_init = |shuffle: bool| DataLoaderInit {
        batch_size,
        num_workers: preprocessor_config.num_workers.get(),
        shuffle,
        seed: training.seed,
        reshuffle_seed_each_epoch: training.reshuffle_seed_each_epoch,
    };
    let eval_transform: Arc<dyn SampleTransform> = Arc::new(spec);

    let loaders = Loaders {
        train: loader_init(true).build(subset(SubsetKind::Train), Arc::new(train_transform))?,
        val: loader_init(false).build(subset(SubsetKind::Val), eval_transform.clone())?,
        test: loader_init(false).build(subset(SubsetKind::Test), eval_transform)?,
    };

    Ok((catalog.clone(), loaders, preview))
}
