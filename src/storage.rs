use crate::error::{Result, SessionError};
use crate::records::ApiConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Fixed key the API config blob is stored under.
pub const API_CONFIG_KEY: &str = "apiConfig";

pub trait ConfigStore: Send + Sync {
  /// `Ok(None)` when nothing has been saved yet.
  fn load(&self) -> Result<Option<ApiConfig>>;
  fn save(&self, config: &ApiConfig) -> Result<()>;
}

/// Stores the config as `<data_dir>/apiConfig.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
  data_dir: PathBuf,
}

impl JsonFileStore {
  pub fn new(data_dir: impl Into<PathBuf>) -> Self {
    Self {
      data_dir: data_dir.into(),
    }
  }

  pub fn path(&self) -> PathBuf {
    self.data_dir.join(format!("{API_CONFIG_KEY}.json"))
  }
}

pub fn data_file_path(data_dir: &Path, file_name: &str) -> Result<PathBuf> {
  if !data_dir.exists() {
    fs::create_dir_all(data_dir).map_err(|e| SessionError::io(data_dir, e))?;
  }
  Ok(data_dir.join(file_name))
}

impl ConfigStore for JsonFileStore {
  fn load(&self) -> Result<Option<ApiConfig>> {
    let path = self.path();
    if !path.exists() {
      return Ok(None);
    }
    let raw = fs::read_to_string(&path).map_err(|e| SessionError::io(&path, e))?;
    let config: ApiConfig = serde_json::from_str(&raw)?;
    Ok(Some(config))
  }

  fn save(&self, config: &ApiConfig) -> Result<()> {
    let path = data_file_path(&self.data_dir, &format!("{API_CONFIG_KEY}.json"))?;
    let raw = serde_json::to_string_pretty(config)?;
    fs::write(&path, raw).map_err(|e| SessionError::io(&path, e))
  }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
  saved: Mutex<Option<ApiConfig>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_config(config: ApiConfig) -> Self {
    Self {
      saved: Mutex::new(Some(config)),
    }
  }

  pub fn saved(&self) -> Option<ApiConfig> {
    self.saved.lock().map(|guard| guard.clone()).unwrap_or_default()
  }
}

impl ConfigStore for MemoryStore {
  fn load(&self) -> Result<Option<ApiConfig>> {
    Ok(self.saved())
  }

  fn save(&self, config: &ApiConfig) -> Result<()> {
    if let Ok(mut guard) = self.saved.lock() {
      *guard = Some(config.clone());
    }
    Ok(())
  }
}
