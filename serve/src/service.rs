//! Loaded models shared by the request handlers.

use crate::{common::*, config::Config, error::ServeError};

/// The body of a successful prediction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub prediction: String,
}

/// Read-only prediction packages keyed by model variant.
#[derive(Debug, Clone)]
pub struct InferenceService {
    packages: Arc<HashMap<ModelVariant, Arc<InferencePackage>>>,
}

impl InferenceService {
    /// Loads every configured model with the shared transform and catalog.
    pub fn load(config: &Config) -> Result<Self> {
        let device = leaf_dl::serde_opt_device::resolve(config.device);
        info!("use device {:?}", device);

        let packages = config
            .models
            .iter()
            .map(|entry| {
                InferencePackageInit {
                    model: &entry.model,
                    checkpoint_file: &entry.checkpoint_file,
                    transform_file: &config.transform_file,
                    classes_file: &config.classes_file,
                    device,
                }
                .load()
                .with_context(|| format!("failed to load model '{}'", entry.model.variant()))
            })
            .collect::<Result<Vec<_>>>()?;

        Self::from_packages(packages)
    }

    pub fn from_packages(packages: impl IntoIterator<Item = InferencePackage>) -> Result<Self> {
        let mut map = HashMap::new();
        for package in packages {
            let variant = package.variant();
            if map.insert(variant, Arc::new(package)).is_some() {
                bail!("model variant '{}' is loaded more than once", variant);
            }
        }
        ensure!(!map.is_empty(), "no model is loaded");

        Ok(Self {
            packages: Arc::new(map),
        })
    }

    pub fn variants(&self) -> impl Iterator<Item = ModelVariant> + '_ {
        self.packages.keys().copied()
    }

    pub fn package(&self, name: &str) -> Result<&Arc<InferencePackage>, ServeError> {
        name.parse::<ModelVariant>()
            .ok()
            .and_then(|variant| self.packages.get(&variant))
            .ok_or_else(|| ServeError::UnknownModel {
                name: name.to_owned(),
            })
    }

    /// Classifies an uploaded file with the named model.
    ///
    /// The file name is checked before the bytes are decoded.
    pub async fn predict(
        &self,
        model: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<PredictResponse, ServeError> {
        let package = self.package(model)?.clone();
        package.check_file_name(file_name)?;

        let prediction = tokio::task::spawn_blocking(move || -> Result<_, ServeError> {
            let image = package.decode(&bytes)?;
            Ok(package.predict(&image)?)
        })
        .await
        .map_err(|err| ServeError::Internal(err.to_string()))??;

        Ok(PredictResponse {
            prediction: prediction.label,
        })
    }
}
