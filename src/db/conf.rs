//! Code for supporting the build configuration file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::common::GenomeRelease;
use crate::sa::store::DataSourceVersion;

/// One input file of a build together with the version of its data source.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct InputDef {
    /// Path to the (possibly compressed) item TSV file, relative to the configuration.
    pub path: String,
    /// Version of the data source the file was exported from.
    pub data_version: DataSourceVersion,
}

/// Top-level build configuration.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct BuildConf {
    /// The genome release of all inputs.
    pub genome_release: GenomeRelease,
    /// The input files.
    #[serde(default)]
    pub inputs: Vec<InputDef>,
}

impl BuildConf {
    /// Load configuration from the JSON file at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            anyhow::anyhow!("could not read configuration {:?}: {}", path.as_ref(), e)
        })?;
        serde_json::from_str(&content).map_err(|e| {
            anyhow::anyhow!("could not parse configuration {:?}: {}", path.as_ref(), e)
        })
    }

    /// Paths of the inputs, relative ones resolved against `base_dir`.
    pub fn input_paths(&self, base_dir: &Path) -> Vec<PathBuf> {
        self.inputs
            .iter()
            .map(|input| base_dir.join(&input.path))
            .collect()
    }

    /// Data source versions for the store header.
    pub fn data_versions(&self) -> Vec<DataSourceVersion> {
        self.inputs
            .iter()
            .map(|input| input.data_version.clone())
            .collect()
    }
}
