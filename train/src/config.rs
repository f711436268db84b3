//! Training program configuration format.

use crate::common::*;

pub use dataset::*;
pub use logging::*;
pub use preprocessor::*;
pub use training::*;

/// The main training configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub dataset: DatasetConfig,
    pub preprocessor: PreprocessorConfig,
    #[serde(default)]
    pub model: ModelConfig,
    pub training: TrainingConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let text = std::fs::read_to_string(path)?;
        let config = json5::from_str(&text)?;
        Ok(config)
    }
}

mod dataset {
    use super::*;

    /// Dataset options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct DatasetConfig {
        /// The directory containing one sub-directory per class.
        pub root_dir: PathBuf,
        /// Selects the class directories to train on.
        #[serde(default)]
        pub class_filter: ClassFilterConfig,
        /// Accepted image file extensions, case-insensitive.
        #[serde(default = "default_extensions")]
        pub extensions: Vec<String>,
        /// The train/validation/test partition.
        #[serde(default)]
        pub split: StratifiedSplitInit,
    }

    impl DatasetConfig {
        pub fn file_filter(&self) -> ExtensionFilter {
            ExtensionFilter::new(&self.extensions)
        }
    }

    /// Class directory selection.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(tag = "type")]
    pub enum ClassFilterConfig {
        /// Keep directories whose name contains the keyword.
        Keyword { keyword: String },
        /// Keep directories whose name matches the regular expression.
        Regex { pattern: String },
        /// Keep the listed directories only.
        Whitelist { classes: Vec<String> },
        /// Keep every directory.
        All,
    }

    impl Default for ClassFilterConfig {
        fn default() -> Self {
            Self::Keyword {
                keyword: KeywordFilter::default().keyword().to_string(),
            }
        }
    }

    impl ClassFilterConfig {
        pub fn build(&self) -> Result<Box<dyn ClassFilter>> {
            let filter: Box<dyn ClassFilter> = match self {
                Self::Keyword { keyword } => Box::new(KeywordFilter::new(keyword.as_str())),
                Self::Regex { pattern } => Box::new(
                    RegexFilter::new(pattern)
                        .with_context(|| format!("invalid class pattern '{}'", pattern))?,
                ),
                Self::Whitelist { classes } => Box::new(AllowListFilter::new(classes)),
                Self::All => Box::new(AcceptAll),
            };
            Ok(filter)
        }
    }

    fn default_extensions() -> Vec<String> {
        ExtensionFilter::default().extensions().to_vec()
    }
}

mod preprocessor {
    use super::*;

    /// Data preprocessing options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PreprocessorConfig {
        /// The side length of input images.
        pub image_size: NonZeroUsize,
        #[serde(default = "default_mean")]
        pub mean: [f64; 3],
        #[serde(default = "default_std")]
        pub std: [f64; 3],
        #[serde(default)]
        pub filter: ResizeFilter,
        /// The number of batches loaded ahead of the training loop.
        pub num_workers: NonZeroUsize,
        #[serde(default)]
        pub augmentation: AugmentationConfig,
    }

    impl PreprocessorConfig {
        /// The deterministic transform used for validation, test and serving.
        pub fn preprocess_spec(&self) -> PreprocessSpec {
            PreprocessSpec {
                image_size: self.image_size.get(),
                mean: self.mean,
                std: self.std,
                filter: self.filter,
            }
        }
    }

    /// Random augmentation of training samples.
    #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct AugmentationConfig {
        /// Center-crop the source image to this size first.
        pub center_crop: Option<usize>,
        /// The pair of minimum and maximum cropped area in ratio unit.
        pub crop_scale: (R64, R64),
        /// The pair of minimum and maximum crop aspect ratio.
        pub crop_ratio: (R64, R64),
        pub brightness: Option<R64>,
        pub contrast: Option<R64>,
        pub saturation: Option<R64>,
        /// The probability to apply horizontal flip.
        pub horizontal_flip_prob: Ratio,
        /// The probability to apply vertical flip.
        pub vertical_flip_prob: Ratio,
        /// The maximum degrees of random rotation.
        pub rotate_degrees: Option<R64>,
        /// The probability to convert to grayscale.
        pub grayscale_prob: Ratio,
    }

    impl Default for AugmentationConfig {
        fn default() -> Self {
            let TrainTransformInit {
                center_crop,
                crop_scale,
                crop_ratio,
                brightness,
                contrast,
                saturation,
                horizontal_flip_prob,
                vertical_flip_prob,
                rotate_degrees,
                grayscale_prob,
            } = TrainTransformInit::default();

            Self {
                center_crop,
                crop_scale,
                crop_ratio,
                brightness,
                contrast,
                saturation,
                horizontal_flip_prob,
                vertical_flip_prob,
                rotate_degrees,
                grayscale_prob,
            }
        }
    }

    impl From<&AugmentationConfig> for TrainTransformInit {
        fn from(config: &AugmentationConfig) -> Self {
            let AugmentationConfig {
                center_crop,
                crop_scale,
                crop_ratio,
                brightness,
                contrast,
                saturation,
                horizontal_flip_prob,
                vertical_flip_prob,
                rotate_degrees,
                grayscale_prob,
            } = config.clone();

            Self {
                center_crop,
                crop_scale,
                crop_ratio,
                brightness,
                contrast,
                saturation,
                horizontal_flip_prob,
                vertical_flip_prob,
                rotate_degrees,
                grayscale_prob,
            }
        }
    }

    fn default_mean() -> [f64; 3] {
        leaf_dl::processor::DEFAULT_MEAN
    }

    fn default_std() -> [f64; 3] {
        leaf_dl::processor::DEFAULT_STD
    }
}

mod training {
    use super::*;

    /// The training options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct TrainingConfig {
        pub epochs: usize,
        pub batch_size: NonZeroUsize,
        /// Seeds the weight initialization and the sample order.
        pub seed: u64,
        /// If set, the sample order of each epoch is drawn from a generator
        /// seeded by `seed + epoch`.
        #[serde(default)]
        pub reshuffle_seed_each_epoch: bool,
        /// The training device. Use CUDA when available if unset.
        #[serde(default, with = "leaf_dl::serde_opt_device")]
        pub device: Option<Device>,
        pub optimizer: OptimizerConfig,
        /// Learning rate scheduling strategy.
        pub lr_schedule: LearningRateSchedule,
        /// Checkpoint file loading method.
        #[serde(default)]
        pub load_checkpoint: LoadCheckpoint,
    }

    /// The Adamax optimizer options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct OptimizerConfig {
        pub lr: R64,
        #[serde(default = "default_weight_decay")]
        pub weight_decay: R64,
        #[serde(default = "default_beta1")]
        pub beta1: R64,
        #[serde(default = "default_beta2")]
        pub beta2: R64,
        #[serde(default = "default_eps")]
        pub eps: R64,
    }

    impl From<&OptimizerConfig> for AdamaxInit {
        fn from(config: &OptimizerConfig) -> Self {
            Self {
                beta1: config.beta1.raw(),
                beta2: config.beta2.raw(),
                eps: config.eps.raw(),
                weight_decay: config.weight_decay.raw(),
            }
        }
    }

    /// The learning rate scheduling strategy.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(tag = "type")]
    pub enum LearningRateSchedule {
        /// Use constant learning rate.
        Constant,
        /// Multiply the learning rate by `gamma` every `step_size` epochs.
        StepDecay { step_size: NonZeroUsize, gamma: R64 },
    }

    impl Default for LearningRateSchedule {
        fn default() -> Self {
            Self::StepDecay {
                step_size: NonZeroUsize::new(2).unwrap(),
                gamma: r64(0.5),
            }
        }
    }

    /// Checkpoint file loading method.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(tag = "type")]
    pub enum LoadCheckpoint {
        /// Disable checkpoint file loading.
        Disabled,
        /// Load the checkpoint file at specified path.
        FromFile { file: PathBuf },
    }

    impl Default for LoadCheckpoint {
        fn default() -> Self {
            Self::Disabled
        }
    }

    fn default_weight_decay() -> R64 {
        r64(0.0)
    }

    fn default_beta1() -> R64 {
        r64(0.9)
    }

    fn default_beta2() -> R64 {
        r64(0.999)
    }

    fn default_eps() -> R64 {
        r64(1e-8)
    }
}

mod logging {
    use super::*;

    /// Data logging options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct LoggingConfig {
        /// The directory where run directories are created.
        pub dir: PathBuf,
        /// The number of images drawn into the batch previews.
        #[serde(default)]
        pub preview_images: Option<usize>,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() -> Result<()> {
        let config: Config = json5::from_str(
            r#"{
                dataset: { root_dir: "data" },
                preprocessor: { image_size: 224, num_workers: 2 },
                training: {
                    epochs: 10,
                    batch_size: 32,
                    seed: 42,
                    device: "cpu",
                    optimizer: { lr: 0.001 },
                    lr_schedule: { type: "StepDecay", step_size: 2, gamma: 0.5 },
                },
                logging: { dir: "logs" },
            }"#,
        )?;

        assert_eq!(
            config.dataset.class_filter,
            ClassFilterConfig::Keyword {
                keyword: "apple".into()
            }
        );
        assert_eq!(config.dataset.split, StratifiedSplitInit::default());
        assert_eq!(config.training.device, Some(Device::Cpu));
        assert!(matches!(
            config.training.load_checkpoint,
            LoadCheckpoint::Disabled
        ));
        assert_eq!(config.preprocessor.preprocess_spec(), PreprocessSpec::default());
        Ok(())
    }

    #[test]
    fn build_class_filters() -> Result<()> {
        let filter = ClassFilterConfig::Regex {
            pattern: "^apple_".into(),
        }
        .build()?;
        assert!(filter.matches("apple_scab"));
        assert!(!filter.matches("grape_rot"));

        assert!(ClassFilterConfig::Regex {
            pattern: "(".into()
        }
        .build()
        .is_err());
        Ok(())
    }
}
