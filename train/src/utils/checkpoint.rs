use crate::{common::*, config::LoadCheckpoint};

/// Saves a record into its slot under the checkpoint directory.
pub fn save_checkpoint(
    record: &CheckpointRecord,
    checkpoint_dir: &Path,
    slot: CheckpointSlot,
) -> Result<PathBuf> {
    let path = checkpoint_dir.join(slot.file_name());
    record
        .save(&path)
        .with_context(|| format!("failed to save checkpoint '{}'", path.display()))?;
    Ok(path)
}

/// Load a checkpoint record with specified checkpoint loading method.
pub fn try_load_checkpoint(load_checkpoint: &LoadCheckpoint) -> Result<Option<CheckpointRecord>> {
    let path = match load_checkpoint {
        LoadCheckpoint::Disabled => {
            info!("checkpoint loading is disabled");
            return Ok(None);
        }
        LoadCheckpoint::FromFile { file } => file,
    };

    ensure!(path.is_file(), "{} is not a file", path.display());
    info!("load checkpoint file {}", path.display());
    let record = CheckpointRecord::load(path)
        .with_context(|| format!("failed to load checkpoint '{}'", path.display()))?;
    Ok(Some(record))
}
