//! The immutable prediction package shared by the serving handlers.

use crate::{
    checkpoint::CheckpointRecord,
    common::*,
    dataset::{ClassCatalog, ExtensionFilter},
    error::LeafError,
    evaluation::argmax_first,
    model::{Model, ModelConfig, ModelVariant},
    processor::PreprocessSpec,
};

/// The predicted class of an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub index: usize,
    pub label: String,
}

/// Files and options to assemble an [InferencePackage].
#[derive(Debug, Clone)]
pub struct InferencePackageInit<'a> {
    pub model: &'a ModelConfig,
    pub checkpoint_file: &'a Path,
    pub transform_file: &'a Path,
    pub classes_file: &'a Path,
    pub device: Device,
}

impl InferencePackageInit<'_> {
    pub fn load(self) -> Result<InferencePackage> {
        let Self {
            model: model_config,
            checkpoint_file,
            transform_file,
            classes_file,
            device,
        } = self;

        let transform = PreprocessSpec::load(transform_file)?;
        let catalog = ClassCatalog::load(classes_file)?;

        let mut vs = nn::VarStore::new(device);
        let model = Model::new(&vs.root(), model_config, catalog.len())?;
        let record = CheckpointRecord::load(checkpoint_file)
            .with_context(|| format!("failed to load checkpoint '{}'", checkpoint_file.display()))?;
        record.restore_model(&mut vs)?;
        info!(
            "loaded {} from '{}' (epoch {}, loss {:.5})",
            model_config.variant(),
            checkpoint_file.display(),
            record.epoch,
            record.loss
        );

        InferencePackage::from_parts(vs, model, model_config.variant(), transform, catalog)
    }
}

/// A loaded model together with its transform and class catalog.
///
/// It is built once and never mutated afterwards.
#[derive(Debug)]
pub struct InferencePackage {
    vs: nn::VarStore,
    model: Model,
    variant: ModelVariant,
    transform: PreprocessSpec,
    catalog: ClassCatalog,
    extensions: ExtensionFilter,
}

impl InferencePackage {
    pub fn from_parts(
        mut vs: nn::VarStore,
        model: Model,
        variant: ModelVariant,
        transform: PreprocessSpec,
        catalog: ClassCatalog,
    ) -> Result<Self> {
        transform.validate()?;
        ensure!(
            model.num_classes() == catalog.len(),
            "the model predicts {} classes, but the catalog has {}",
            model.num_classes(),
            catalog.len()
        );
        vs.freeze();

        Ok(Self {
            vs,
            model,
            variant,
            transform,
            catalog,
            extensions: ExtensionFilter::default(),
        })
    }

    pub fn device(&self) -> Device {
        self.vs.device()
    }

    pub fn variant(&self) -> ModelVariant {
        self.variant
    }

    pub fn transform(&self) -> &PreprocessSpec {
        &self.transform
    }

    pub fn catalog(&self) -> &ClassCatalog {
        &self.catalog
    }

    /// Rejects file names without an accepted image extension.
    pub fn check_file_name(&self, file_name: &str) -> Result<(), LeafError> {
        self.extensions.check_name(file_name)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, LeafError> {
        Ok(image::load_from_memory(bytes)?)
    }

    pub fn predict(&self, image: &DynamicImage) -> Result<Prediction> {
        let input = self
            .transform
            .forward(image)?
            .unsqueeze(0)
            .to_device(self.device());
        let output = tch::no_grad(|| self.model.forward_t(&input, false))?;

        let scores = Vec::<f32>::from(&output.to_device(Device::Cpu).view([-1]));
        let index = argmax_first(&scores).ok_or_else(|| format_err!("model output is not comparable"))?;
        let label = self
            .catalog
            .name(index)
            .ok_or_else(|| format_err!("class index {} is out of range", index))?
            .to_string();

        Ok(Prediction { index, label })
    }

    /// Checks the file name, decodes and classifies an uploaded image.
    pub fn predict_file(&self, file_name: &str, bytes: &[u8]) -> Result<Prediction> {
        self.check_file_name(file_name)?;
        let image = self.decode(bytes)?;
        self.predict(&image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResModelConfig;
    use image::Rgb;

    fn tiny_package() -> Result<InferencePackage> {
        let vs = nn::VarStore::new(Device::Cpu);
        let config = ModelConfig::ResModel(ResModelConfig {
            base_channels: 4,
            stage_blocks: vec![1],
            dropout: 0.0,
        });
        let catalog = ClassCatalog::from_names(["apple_a", "apple_b", "apple_c"])?;
        let model = Model::new(&vs.root(), &config, catalog.len())?;
        let transform = PreprocessSpec {
            image_size: 32,
            ..Default::default()
        };
        InferencePackage::from_parts(vs, model, config.variant(), transform, catalog)
    }

    #[test]
    fn predict_returns_catalog_label() -> Result<()> {
        let package = tiny_package()?;
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 30, Rgb([30, 160, 40])));

        let prediction = package.predict(&image)?;
        assert_eq!(package.catalog().name(prediction.index), Some(prediction.label.as_str()));

        // identical input yields identical output
        assert_eq!(package.predict(&image)?, prediction);
        Ok(())
    }

    #[test]
    fn reject_unsupported_file() -> Result<()> {
        let package = tiny_package()?;
        let err = package.predict_file("leaf.gif", b"GIF89a").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LeafError>(),
            Some(LeafError::UnsupportedExtension { .. })
        ));
        assert!(package.check_file_name("LEAF.JPG").is_ok());
        assert!(matches!(
            package.decode(b"not an image"),
            Err(LeafError::Image(_))
        ));
        Ok(())
    }

    #[test]
    fn reject_mismatched_catalog() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let config = ModelConfig::default();
        let model = Model::new(&vs.root(), &config, 2)?;
        let catalog = ClassCatalog::from_names(["apple_a", "apple_b", "apple_c"])?;
        assert!(InferencePackage::from_parts(
            vs,
            model,
            config.variant(),
            PreprocessSpec::default(),
            catalog
        )
        .is_err());
        Ok(())
    }
}
