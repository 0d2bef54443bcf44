use std::{fs::File, io::BufReader, path::{Path, PathBuf}};

use serde::Deserialize;

use crate::{errors::Result, storage::spatial::DEFAULT_CELL_SIZE_E7};

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct UserConfig {
    /// `.osm` file, optionally xz compressed (`.osm.xz`).
    pub data_path: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_cell_size")]
    pub cell_size_e7: i32,
    #[serde(default)]
    pub dump_storage: bool,
    /// Minimum level written by the JSON logger.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_output_dir() -> String {
    "output".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cell_size() -> i32 {
    DEFAULT_CELL_SIZE_E7
}

impl UserConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: UserConfig = serde_json::from_str(json)?;
        config.validated()
    }

    /// Directory holding the cached pipeline outputs for `data_path`: one per input file,
    /// under `output_dir`.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let input_name = Path::new(&self.data_path)
            .file_name()
            .ok_or_else(|| format!("data_path {:?} does not name a file", self.data_path))?;
        Ok(Path::new(&self.output_dir).join(input_name))
    }

    fn validated(self) -> Result<Self> {
        if self.cell_size_e7 <= 0 {
            return Err(format!("cell_size_e7 must be positive, got {}", self.cell_size_e7).into());
        }
        Ok(self)
    }
}

pub fn load_user_config(path: &Path) -> Result<UserConfig> {
    let file = File::open(path)?;
    let config: UserConfig = serde_json::from_reader(BufReader::new(file))?;
    config.validated()
}
