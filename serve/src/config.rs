use crate::common::*;

pub static CONFIG_VERSION: Lazy<VersionReq> = Lazy::new(|| VersionReq::parse("0.1.0").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(deserialize_with = "deserialize_version")]
    pub version: Version,
    pub server: ServerConfig,
    /// The device the models run on. Uses CUDA when available if unset.
    #[serde(default, with = "leaf_dl::serde_opt_device")]
    pub device: Option<Device>,
    /// The `transform.json` written by the training program.
    pub transform_file: PathBuf,
    /// The `classes.json` written by the training program.
    pub classes_file: PathBuf,
    pub models: Vec<ModelEntry>,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let text = fs::read_to_string(path)?;
        let config: Self = json5::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.models.is_empty(), "at least one model must be configured");
        let duplicated = self
            .models
            .iter()
            .map(|entry| entry.model.variant())
            .fold(HashMap::new(), |mut counts, variant| {
                *counts.entry(variant).or_insert(0usize) += 1;
                counts
            })
            .into_iter()
            .find(|(_, count)| *count > 1);
        if let Some((variant, _)) = duplicated {
            bail!("model variant '{}' is configured more than once", variant);
        }
        Ok(())
    }
}

/// Listening address and request limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: usize,
}

impl ServerConfig {
    pub fn addr(&self) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listening address '{}:{}'", self.host, self.port))?;
        Ok(addr)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_size: default_max_upload_size(),
        }
    }
}

/// A servable model and its weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub model: ModelConfig,
    /// A checkpoint written by the training program.
    pub checkpoint_file: PathBuf,
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8000
}

fn default_max_upload_size() -> usize {
    16 * 1024 * 1024
}

fn deserialize_version<'de, D>(deserializer: D) -> Result<Version, D::Error>
where
    D: Deserializer<'de>,
{
    let version = Version::deserialize(deserializer)?;
    if !CONFIG_VERSION.matches(&version) {
        return Err(D::Error::custom(format!(
            "incompatible version: get '{}', but expect '{}'",
            version, *CONFIG_VERSION
        )));
    }
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        version: "0.1.0",
        server: { port: 9000 },
        device: "cpu",
        transform_file: "runs/latest/transform.json",
        classes_file: "runs/latest/classes.json",
        models: [
            {
                model: { kind: "ResModel", base_channels: 32, stage_blocks: [1, 1, 1, 1] },
                checkpoint_file: "runs/latest/checkpoints/last_best_val_epoch_model_state.ckpt",
            },
        ],
    }"#;

    #[test]
    fn parse_config() -> Result<()> {
        let config: Config = json5::from_str(CONFIG)?;
        config.validate()?;
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.addr()?.port(), 9000);
        assert_eq!(config.device, Some(Device::Cpu));
        assert_eq!(config.models[0].model.variant(), ModelVariant::ResModel);
        Ok(())
    }

    #[test]
    fn reject_incompatible_version() {
        let text = CONFIG.replace(r#"version: "0.1.0""#, r#"version: "2.0.0""#);
        assert!(json5::from_str::<Config>(&text).is_err());
    }

    #[test]
    fn reject_duplicated_models() -> Result<()> {
        let mut config: Config = json5::from_str(CONFIG)?;
        config.models.push(config.models[0].clone());
        assert!(config.validate().is_err());
        Ok(())
    }
}
