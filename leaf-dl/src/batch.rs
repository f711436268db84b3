use crate::common::*;

/// A collated mini-batch of samples.
#[derive(Debug, TensorLike)]
pub struct Batch {
    #[tensor_like(copy)]
    pub epoch: usize,
    /// Position of the batch within its epoch.
    #[tensor_like(copy)]
    pub index: usize,
    /// `[batch, 3, size, size]` float images.
    pub images: Tensor,
    /// `[batch]` int64 class indexes.
    pub labels: Tensor,
    /// Dataset positions of the samples.
    #[tensor_like(clone)]
    pub sample_indexes: Vec<usize>,
}

impl Batch {
    /// Stacks `[3, size, size]` images and their labels.
    pub fn collate(
        epoch: usize,
        index: usize,
        samples: Vec<(Tensor, usize)>,
        sample_indexes: Vec<usize>,
    ) -> Result<Self> {
        ensure!(!samples.is_empty(), "cannot collate an empty batch");
        ensure!(
            samples.len() == sample_indexes.len(),
            "got {} samples but {} sample indexes",
            samples.len(),
            sample_indexes.len()
        );

        let shape = samples[0].0.size();
        ensure!(
            samples.iter().all(|(image, _)| image.size() == shape),
            "images in a batch must have the same shape"
        );

        let (images, labels): (Vec<_>, Vec<_>) = samples
            .into_iter()
            .map(|(image, label)| (image, label as i64))
            .unzip();
        let images = Tensor::stack(&images, 0);
        let labels = Tensor::of_slice(&labels);

        Ok(Self {
            epoch,
            index,
            images,
            labels,
            sample_indexes,
        })
    }

    pub fn len(&self) -> usize {
        self.sample_indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_indexes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collate_stacks_images() -> Result<()> {
        let samples = (0..3)
            .map(|label| (Tensor::zeros(&[3, 4, 4], (Kind::Float, Device::Cpu)), label))
            .collect();
        let batch = Batch::collate(0, 2, samples, vec![10, 11, 12])?;

        assert_eq!(batch.images.size(), vec![3, 3, 4, 4]);
        assert_eq!(Vec::<i64>::from(&batch.labels), vec![0, 1, 2]);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.index, 2);
        Ok(())
    }

    #[test]
    fn collate_rejects_mixed_shapes() {
        let samples = vec![
            (Tensor::zeros(&[3, 4, 4], (Kind::Float, Device::Cpu)), 0),
            (Tensor::zeros(&[3, 2, 2], (Kind::Float, Device::Cpu)), 1),
        ];
        assert!(Batch::collate(0, 0, samples, vec![0, 1]).is_err());
    }
}
