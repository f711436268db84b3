//! The training loop.

use crate::{
    common::*,
    config::{Config, TrainingConfig},
    data_loader::DataLoader,
    logging::MetricsSink,
    report::{EpochRecord, HistoryWriter},
    utils::{self, LrScheduler, RateCounter},
};
use tokio::runtime::Handle;

/// The data loaders of the three subsets.
#[derive(Debug)]
pub struct Loaders {
    pub train: DataLoader,
    pub val: DataLoader,
    pub test: DataLoader,
}

/// The result of a no-grad pass over a subset.
#[derive(Debug)]
pub struct EvaluationOutput {
    pub accumulator: EvaluationAccumulator,
    pub mean_loss: f64,
}

impl EvaluationOutput {
    pub fn accuracy(&self) -> f64 {
        self.accumulator.accuracy().unwrap_or(0.0)
    }
}

/// Per-epoch training state.
#[derive(Debug, Default)]
struct EpochMetrics {
    accumulator: EvaluationAccumulator,
    loss_sum: f64,
    last_loss: f64,
    num_batches: usize,
}

/// Runs the training epochs and the final test pass on the current thread.
///
/// Batches are awaited through `runtime`, so this must run on a blocking
/// thread.
pub fn training_worker(
    config: Arc<Config>,
    checkpoint_dir: Arc<Path>,
    num_classes: usize,
    mut loaders: Loaders,
    preview: Option<(BatchPreview, PreprocessSpec)>,
    metrics: MetricsSink,
    mut history: HistoryWriter,
    runtime: Handle,
) -> Result<EvaluationOutput> {
    let Config {
        model: ref model_config,
        training:
            TrainingConfig {
                epochs,
                seed,
                device,
                optimizer: ref optimizer_config,
                ref lr_schedule,
                ref load_checkpoint,
                ..
            },
        ..
    } = *config;
    let device = leaf_dl::serde_opt_device::resolve(device);
    info!("use device {:?}", device);

    // init model
    info!("initializing model");
    tch::manual_seed(seed as i64);
    let mut vs = nn::VarStore::new(device);
    let model = Model::new(&vs.root(), model_config, num_classes)?;
    let mut optimizer =
        AdamaxInit::from(optimizer_config).build(&vs, optimizer_config.lr.raw())?;

    // load checkpoint
    let init_epoch = match utils::try_load_checkpoint(load_checkpoint)? {
        Some(record) => {
            record.restore_model(&mut vs)?;
            optimizer.load_state(&record.optimizer_state)?;
            info!("resume after epoch {}", record.epoch);
            record.epoch + 1
        }
        None => 0,
    };

    loaders.train.skip_epochs(init_epoch);
    loaders.val.skip_epochs(init_epoch);

    let mut lr_scheduler = LrScheduler::new(lr_schedule, optimizer_config.lr, init_epoch)?;
    optimizer.set_lr(lr_scheduler.lr());

    let batches_per_epoch = loaders.train.num_batches();
    let mut best_val = BestTracker::new();
    let mut rate_counter = RateCounter::with_second_intertal();

    info!("start training");

    for epoch in init_epoch..epochs {
        let mut train_metrics = EpochMetrics::default();
        let mut stream = loaders.train.epoch_stream(epoch);

        while let Some(batch) = runtime.block_on(stream.next()) {
            let batch = batch?;
            let Batch {
                index,
                images,
                labels,
                ..
            } = batch.to_device(device);

            if epoch == init_epoch && index == 0 {
                info!(
                    "batch shape: images {:?}, labels {:?}",
                    images.size(),
                    labels.size()
                );
                if let Some((preview, spec)) = &preview {
                    metrics.image("preview/train", preview.render(&images, spec)?)?;
                }
            }

            // forward pass
            let output = model.forward_t(&images, true)?;
            let loss = output.nll_loss(&labels);

            // optimizer
            optimizer.backward_step(&loss);

            let loss_value = f64::from(&loss);
            let num_correct = train_metrics.accumulator.add_batch(&output, &labels)?;
            let accuracy = num_correct as f64 / labels.size()[0] as f64;
            train_metrics.loss_sum += loss_value;
            train_metrics.last_loss = loss_value;
            train_metrics.num_batches += 1;

            let step = epoch * batches_per_epoch + index;
            metrics.scalar("train/loss", step, loss_value)?;
            metrics.scalar("train/accuracy", step, accuracy)?;

            // print message
            rate_counter.add(1.0);
            if let Some(batch_rate) = rate_counter.rate() {
                info!(
                    "epoch: {}\tstep: {}\tlr: {:.5}\tloss: {:.5}\t{:.2} batches/s",
                    epoch,
                    step,
                    lr_scheduler.lr(),
                    loss_value,
                    batch_rate
                );
            } else {
                debug!(
                    "epoch: {}\tstep: {}\tlr: {:.5}\tloss: {:.5}",
                    epoch,
                    step,
                    lr_scheduler.lr(),
                    loss_value
                );
            }
        }
        ensure!(
            train_metrics.num_batches > 0,
            "epoch {} produced no training batch",
            epoch
        );

        // save the latest checkpoint
        let record =
            CheckpointRecord::capture(epoch, train_metrics.last_loss, &vs, &optimizer);
        utils::save_checkpoint(&record, &checkpoint_dir, CheckpointSlot::Latest)?;
        let epoch_lr = lr_scheduler.lr();

        // update lr
        optimizer.set_lr(lr_scheduler.next());

        // validation
        let val_output = evaluate(
            &model,
            &mut loaders.val,
            epoch,
            device,
            &runtime,
            preview
                .as_ref()
                .filter(|_| epoch == init_epoch)
                .map(|(preview, spec)| (preview, spec, &metrics)),
        )?;
        let val_accuracy = val_output.accuracy();

        if best_val.update(val_accuracy) {
            let path =
                utils::save_checkpoint(&record, &checkpoint_dir, CheckpointSlot::BestValidation)?;
            info!(
                "validation accuracy improved to {:.4}, saved '{}'",
                val_accuracy,
                path.display()
            );
        }

        // epoch summary
        let train_accuracy = train_metrics.accumulator.accuracy().unwrap_or(0.0);
        let train_loss = train_metrics.loss_sum / train_metrics.num_batches as f64;
        metrics.scalar("epoch/train_accuracy", epoch, train_accuracy)?;
        metrics.scalar("epoch/train_loss", epoch, train_loss)?;
        metrics.scalar("epoch/val_accuracy", epoch, val_accuracy)?;
        metrics.scalar("epoch/val_loss", epoch, val_output.mean_loss)?;
        metrics.scalar("params/learning_rate", epoch, epoch_lr)?;
        history.write(&EpochRecord {
            epoch,
            learning_rate: epoch_lr,
            train_loss,
            train_accuracy,
            val_loss: val_output.mean_loss,
            val_accuracy,
        })?;

        info!(
            "epoch [{}/{}]: train accuracy = {:.4}\ttrain loss = {:.4}\tvalidation accuracy = {:.4}\tvalidation loss = {:.4}",
            epoch,
            epochs,
            train_accuracy,
            train_loss,
            val_accuracy,
            val_output.mean_loss
        );
    }

    // test
    info!("evaluating on the test subset");
    let test_output = evaluate(&model, &mut loaders.test, epochs, device, &runtime, None)?;
    info!(
        "test accuracy = {:.4}\ttest loss = {:.4}",
        test_output.accuracy(),
        test_output.mean_loss
    );

    Ok(test_output)
}

/// Runs the model in evaluation mode over every batch of a loader.
pub fn evaluate(
    model: &Model,
    loader: &mut DataLoader,
    epoch: usize,
    device: Device,
    runtime: &Handle,
    preview: Option<(&BatchPreview, &PreprocessSpec, &MetricsSink)>,
) -> Result<EvaluationOutput> {
    let mut accumulator = EvaluationAccumulator::new();
    let mut loss_sum = 0.0;
    let mut num_batches = 0;
    let mut stream = loader.epoch_stream(epoch);

    while let Some(batch) = runtime.block_on(stream.next()) {
        let Batch {
            index,
            images,
            labels,
            ..
        } = batch?.to_device(device);

        if let (0, Some((preview, spec, metrics))) = (index, preview) {
            metrics.image("preview/val", preview.render(&images, spec)?)?;
        }

        let (output, loss) = tch::no_grad(|| -> Result<_> {
            let output = model.forward_t(&images, false)?;
            let loss = f64::from(&output.nll_loss(&labels));
            Ok((output, loss))
        })?;

        accumulator.add_batch(&output, &labels)?;
        loss_sum += loss;
        num_batches += 1;
    }

    let mean_loss = if num_batches > 0 {
        loss_sum / num_batches as f64
    } else {
        0.0
    };

    Ok(EvaluationOutput {
        accumulator,
        mean_loss,
    })
}
