use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Classifier settings. Defaults mirror the shipped demo model; any field can
/// be overridden by a `labelscope.json` next to the data directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Opaque identifier handed to the artifact source (a file name for the
    /// local source, a blob id for remote ones).
    pub model_artifact: String,
    /// Labels sidecar override; defaults to `<model>.labels.txt` next to the
    /// resolved artifact.
    pub labels_path: Option<PathBuf>,
    /// Square input edge the model expects.
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    /// Upper bound on one-time model initialization.
    #[serde(default = "default_init_timeout_secs")]
    pub init_timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_artifact: "classifier.onnx".to_string(),
            labels_path: None,
            input_size: 224,
            init_timeout_secs: 120,
        }
    }
}

fn default_input_size() -> u32 {
    224
}

fn default_init_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppPaths {
    pub root: PathBuf,
    pub models_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub content_table_path: PathBuf,
}

impl AppPaths {
    /// Resolves the data directory: `LABELSCOPE_DATA_DIR` when set, `./data`
    /// otherwise. Subdirectories are created eagerly.
    pub fn discover() -> Result<Self, crate::error::Error> {
        let root = match std::env::var_os("LABELSCOPE_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => PathBuf::from("data"),
        };
        Self::at(&root)
    }

    pub fn at(root: &Path) -> Result<Self, crate::error::Error> {
        let models_dir = root.join("models");
        let cache_dir = root.join("cache");
        let content_table_path = root.join("content.json");

        std::fs::create_dir_all(&models_dir)?;
        std::fs::create_dir_all(&cache_dir)?;

        Ok(Self {
            root: root.to_path_buf(),
            models_dir,
            cache_dir,
            content_table_path,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

impl Settings {
    /// Loads settings from `<root>/labelscope.json`, falling back to defaults
    /// when the file does not exist.
    pub fn load(root: &Path) -> Result<Self, crate::error::Error> {
        let path = root.join("labelscope.json");
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path)?;
        let settings = serde_json::from_str(&contents)?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }
}
