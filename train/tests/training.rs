use anyhow::Result;
use image::{Rgb, RgbImage};
use leaf_dl::checkpoint::{CheckpointRecord, CheckpointSlot};
use std::{fs, path::Path, sync::Arc};
use train::{config::Config, report};

const CLASSES: [&str; 4] = [
    "apple_black_rot",
    "apple_healthy",
    "apple_rust",
    "apple_scab",
];

fn create_dataset(root: &Path, per_class: usize) -> Result<()> {
    for (class_index, class) in CLASSES.iter().enumerate() {
        let dir = root.join(class);
        fs::create_dir_all(&dir)?;
        for index in 0..per_class {
            let color = Rgb([
                (class_index * 60) as u8,
                (index * 20) as u8,
                (255 - class_index * 60) as u8,
            ]);
            RgbImage::from_pixel(20, 20, color).save(dir.join(format!("{:02}.png", index)))?;
        }
    }

    // ignored by the class filter and the extension filter
    fs::create_dir_all(root.join("grape_healthy"))?;
    RgbImage::new(4, 4).save(root.join("grape_healthy").join("00.png"))?;
    fs::write(root.join(CLASSES[0]).join("notes.txt"), "not an image")?;
    Ok(())
}

fn config(data_dir: &Path, logging_dir: &Path, epochs: usize) -> Result<Config> {
    let text = format!(
        r#"{{
            dataset: {{ root_dir: "{data}" }},
            preprocessor: {{ image_size: 16, num_workers: 2 }},
            model: {{ kind: "ResModel", base_channels: 4, stage_blocks: [1] }},
            training: {{
                epochs: {epochs},
                batch_size: 4,
                seed: 7,
                device: "cpu",
                optimizer: {{ lr: 0.01, weight_decay: 0.0001 }},
                lr_schedule: {{ type: "StepDecay", step_size: 2, gamma: 0.5 }},
            }},
            logging: {{ dir: "{logs}", preview_images: 2 }},
        }}"#,
        data = data_dir.display(),
        logs = logging_dir.display(),
        epochs = epochs,
    );
    Ok(json5::from_str(&text)?)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn one_epoch_is_reproducible() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let data_dir = dir.path().join("data");
    create_dataset(&data_dir, 10)?;

    let lhs_dir = train::start(Arc::new(config(&data_dir, &dir.path().join("lhs"), 1)?)).await?;
    let rhs_dir = train::start(Arc::new(config(&data_dir, &dir.path().join("rhs"), 1)?)).await?;

    for file in [
        "config.json5",
        "classes.json",
        "transform.json",
        "split.json",
        "confusion_matrix.csv",
        "classification_report.json",
        "classification_report.txt",
        "history.csv",
    ] {
        assert!(lhs_dir.join(file).is_file(), "missing {}", file);
    }
    assert!(lhs_dir.join("images").join("preview_train.png").is_file());
    assert_eq!(
        fs::read_to_string(lhs_dir.join("split.json"))?,
        fs::read_to_string(rhs_dir.join("split.json"))?
    );

    let checkpoint = |run_dir: &Path, slot: CheckpointSlot| {
        CheckpointRecord::load(run_dir.join("checkpoints").join(slot.file_name()))
    };
    let lhs = checkpoint(&lhs_dir, CheckpointSlot::Latest)?;
    let rhs = checkpoint(&rhs_dir, CheckpointSlot::Latest)?;
    assert_eq!(lhs.epoch, 0);
    assert_eq!(lhs.model_state.len(), rhs.model_state.len());
    for ((lhs_name, lhs_tensor), (rhs_name, rhs_tensor)) in
        lhs.model_state.iter().zip(&rhs.model_state)
    {
        assert_eq!(lhs_name, rhs_name);
        assert!(lhs_tensor.equal(rhs_tensor), "{} differs", lhs_name);
    }

    // the first epoch always improves on the empty best
    assert!(checkpoint(&lhs_dir, CheckpointSlot::BestValidation).is_ok());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn best_checkpoint_follows_validation_peak() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let data_dir = dir.path().join("data");
    create_dataset(&data_dir, 10)?;

    let run_dir = train::start(Arc::new(config(&data_dir, &dir.path().join("logs"), 3)?)).await?;
    let history = report::read_history(run_dir.join("history.csv"))?;
    assert_eq!(
        history.iter().map(|record| record.epoch).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );

    // the first epoch reaching the highest accuracy, later ties do not count
    let best_epoch = history
        .iter()
        .fold(None, |best: Option<&report::EpochRecord>, record| match best {
            Some(best) if record.val_accuracy <= best.val_accuracy => Some(best),
            _ => Some(record),
        })
        .map(|record| record.epoch)
        .unwrap();

    let checkpoints = run_dir.join("checkpoints");
    let best = CheckpointRecord::load(checkpoints.join(CheckpointSlot::BestValidation.file_name()))?;
    let latest = CheckpointRecord::load(checkpoints.join(CheckpointSlot::Latest.file_name()))?;
    assert_eq!(best.epoch, best_epoch);
    assert_eq!(latest.epoch, 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_classes_abort_before_training() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let data_dir = dir.path().join("data");
    fs::create_dir_all(data_dir.join("grape_healthy"))?;

    let result = train::start(Arc::new(config(&data_dir, &dir.path().join("logs"), 1)?)).await;
    let err = result.unwrap_err();
    assert!(err
        .chain()
        .any(|cause| matches!(
            cause.downcast_ref::<leaf_dl::LeafError>(),
            Some(leaf_dl::LeafError::ClassNotFound { .. })
        )));
    Ok(())
}
