//! Batched, prefetching sample loading.

use crate::common::*;
use futures::stream::BoxStream;
use leaf_dl::dataset::Sample;

/// Options of a [DataLoader].
#[derive(Debug, Clone)]
pub struct DataLoaderInit {
    pub batch_size: usize,
    /// The number of batches loaded concurrently on the blocking pool.
    pub num_workers: usize,
    /// Shuffle the sample order every epoch.
    pub shuffle: bool,
    pub seed: u64,
    /// Re-seed the order generator with `seed + epoch` every epoch.
    pub reshuffle_seed_each_epoch: bool,
}

impl DataLoaderInit {
    pub fn build(
        self,
        samples: Vec<Sample>,
        transform: Arc<dyn SampleTransform>,
    ) -> Result<DataLoader> {
        let Self {
            batch_size,
            num_workers,
            shuffle,
            seed,
            reshuffle_seed_each_epoch,
        } = self;

        ensure!(batch_size > 0, "batch_size must be positive");
        ensure!(num_workers > 0, "num_workers must be positive");
        ensure!(!samples.is_empty(), "cannot load batches from an empty subset");

        Ok(DataLoader {
            samples: Arc::new(samples),
            transform,
            batch_size,
            num_workers,
            shuffle,
            seed,
            reshuffle_seed_each_epoch,
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

/// Loads the samples of a subset in batches.
///
/// The sample order and the per-sample augmentation seeds are drawn from one
/// generator, so the produced batches only depend on the seed and the epoch
/// sequence, regardless of how many batches load concurrently.
#[derive(Debug)]
pub struct DataLoader {
    samples: Arc<Vec<Sample>>,
    transform: Arc<dyn SampleTransform>,
    batch_size: usize,
    num_workers: usize,
    shuffle: bool,
    seed: u64,
    reshuffle_seed_each_epoch: bool,
    rng: StdRng,
}

impl DataLoader {
    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    /// The number of batches per epoch. The last batch may be smaller.
    pub fn num_batches(&self) -> usize {
        (self.samples.len() + self.batch_size - 1) / self.batch_size
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Advances the generator past `num_epochs` epochs without loading
    /// anything, so a resumed run sees the same order as an uninterrupted one.
    pub fn skip_epochs(&mut self, num_epochs: usize) {
        for epoch in 0..num_epochs {
            self.epoch_plan(epoch);
        }
    }

    /// Produces the batches of an epoch in order.
    pub fn epoch_stream(&mut self, epoch: usize) -> BoxStream<'static, Result<Batch>> {
        let chunks: Vec<Vec<(usize, u64)>> = self
            .epoch_plan(epoch)
            .into_iter()
            .chunks(self.batch_size)
            .into_iter()
            .map(|chunk| chunk.collect())
            .collect();

        let samples = self.samples.clone();
        let transform = self.transform.clone();

        stream::iter(chunks.into_iter().enumerate())
            .map(move |(index, chunk)| {
                let samples = samples.clone();
                let transform = transform.clone();

                async move {
                    tokio::task::spawn_blocking(move || {
                        load_batch(epoch, index, &samples, &*transform, chunk)
                    })
                    .await?
                }
            })
            .buffered(self.num_workers)
            .boxed()
    }
}

impl DataLoader {
    /// Draws the sample order and the per-sample seeds of an epoch.
    fn epoch_plan(&mut self, epoch: usize) -> Vec<(usize, u64)> {
        if self.reshuffle_seed_each_epoch {
            self.rng = StdRng::seed_from_u64(self.seed.wrapping_add(epoch as u64));
        }
        let rng = &mut self.rng;

        let mut order: Vec<usize> = (0..self.samples.len()).collect();
        if self.shuffle {
            order.shuffle(&mut *rng);
        }
        let seeds: Vec<u64> = order.iter().map(|_| rng.gen()).collect();
        order.into_iter().zip(seeds).collect()
    }
}

fn load_batch(
    epoch: usize,
    index: usize,
    samples: &[Sample],
    transform: &dyn SampleTransform,
    chunk: Vec<(usize, u64)>,
) -> Result<Batch> {
    let (tensors, sample_indexes): (Vec<_>, Vec<_>) = chunk
        .into_iter()
        .map(|(sample_index, seed)| -> Result<_> {
            let Sample { path, label } = &samples[sample_index];
            let image = image::open(path)
                .with_context(|| format!("failed to load image '{}'", path.display()))?;
            let mut rng = StdRng::seed_from_u64(seed);
            let tensor = transform.forward(image, &mut rng)?;
            Ok(((tensor, *label), sample_index))
        })
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .unzip();

    Batch::collate(epoch, index, tensors, sample_indexes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn write_samples(dir: &Path, count: usize) -> Result<Vec<Sample>> {
        (0..count)
            .map(|index| -> Result<Sample> {
                let path = dir.join(format!("{}.png", index));
                RgbImage::from_pixel(12, 10, Rgb([index as u8 * 10, 100, 50])).save(&path)?;
                Ok(Sample {
                    path,
                    label: index % 2,
                })
            })
            .collect()
    }

    fn loader(samples: Vec<Sample>, shuffle: bool) -> Result<DataLoader> {
        let spec = PreprocessSpec {
            image_size: 8,
            ..Default::default()
        };
        DataLoaderInit {
            batch_size: 3,
            num_workers: 2,
            shuffle,
            seed: 1,
            reshuffle_seed_each_epoch: false,
        }
        .build(samples, Arc::new(spec))
    }

    #[tokio::test]
    async fn batches_cover_every_sample() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let samples = write_samples(dir.path(), 7)?;
        let mut loader = loader(samples, true)?;
        assert_eq!(loader.num_batches(), 3);

        let batches: Vec<Batch> = loader.epoch_stream(0).try_collect().await?;
        assert_eq!(
            batches.iter().map(|batch| batch.len()).collect_vec(),
            vec![3, 3, 1]
        );
        assert_eq!(batches[0].images.size(), vec![3, 3, 8, 8]);

        let mut indexes = batches
            .iter()
            .flat_map(|batch| batch.sample_indexes.clone())
            .collect_vec();
        indexes.sort_unstable();
        assert_eq!(indexes, (0..7).collect_vec());
        Ok(())
    }

    #[tokio::test]
    async fn order_is_seeded() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let samples = write_samples(dir.path(), 9)?;

        let order = |batches: Vec<Batch>| {
            batches
                .into_iter()
                .flat_map(|batch| batch.sample_indexes)
                .collect_vec()
        };

        let mut lhs = loader(samples.clone(), true)?;
        let mut rhs = loader(samples.clone(), true)?;
        let lhs_first = order(lhs.epoch_stream(0).try_collect().await?);
        let rhs_first = order(rhs.epoch_stream(0).try_collect().await?);
        assert_eq!(lhs_first, rhs_first);

        // the generator advances across epochs
        let lhs_second = order(lhs.epoch_stream(1).try_collect().await?);
        assert_ne!(lhs_first, lhs_second);

        // skipping an epoch matches streaming it
        let mut resumed = loader(samples.clone(), true)?;
        resumed.skip_epochs(1);
        let resumed_second = order(resumed.epoch_stream(1).try_collect().await?);
        assert_eq!(resumed_second, lhs_second);

        let mut sequential = loader(samples, false)?;
        let in_order = order(sequential.epoch_stream(0).try_collect().await?);
        assert_eq!(in_order, (0..9).collect_vec());
        Ok(())
    }
}
