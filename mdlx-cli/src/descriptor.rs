use serde::{Deserialize, Serialize};

use std::path::PathBuf;

#[derive(Default, Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct Config {
    /// Directories searched for inputs that are not on disk as given.
    /// Later entries take precedence.
    pub archive_paths: Vec<PathBuf>,
    /// Version written into converted models.
    pub format_version: Option<u32>,
}
