/// Spawn manifests
///
/// A manifest describes one spawn in TOML so it can be looked up or run from
/// the command line:
///
/// ```toml
/// name = "compile-a"
/// arguments = ["cc", "-c", "src/a.c", "-o", "out/a.o"]
/// inputs = ["src/a.c", "src/a.h"]
/// outputs = ["out/a.o"]
/// timeout_secs = 60
///
/// [env]
/// PATH = "/usr/bin:/bin"
///
/// [platform]
/// OSFamily = "linux"
///
/// [execution_info]
/// no-remote-cache = ""
///
/// [virtual_inputs]
/// "a.params" = "-O2"
/// ```
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::spawn::{ActionInput, InputMapping, Spawn};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct SpawnManifest {
    /// Used to name the captured stdout/stderr files
    #[serde(default = "default_name")]
    pub name: String,

    pub arguments: Vec<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Input files relative to the exec root
    #[serde(default)]
    pub inputs: Vec<String>,

    /// In-memory inputs: path -> contents
    #[serde(default)]
    pub virtual_inputs: BTreeMap<String, String>,

    #[serde(default)]
    pub outputs: Vec<String>,

    #[serde(default)]
    pub platform: BTreeMap<String, String>,

    #[serde(default)]
    pub execution_info: BTreeMap<String, String>,

    pub timeout_secs: Option<u64>,
}

fn default_name() -> String {
    "spawn".to_string()
}

impl SpawnManifest {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read manifest: {}", path.as_ref().display()))?;

        let manifest: SpawnManifest = toml::from_str(&content)
            .with_context(|| format!("Failed to parse manifest: {}", path.as_ref().display()))?;

        Ok(manifest)
    }

    pub fn to_spawn(&self) -> Spawn {
        let mut spawn = Spawn::new(self.arguments.iter().cloned());
        for (name, value) in &self.env {
            spawn = spawn.with_env(name.as_str(), value.as_str());
        }
        for output in &self.outputs {
            spawn = spawn.with_output(output.as_str());
        }
        for (name, value) in &self.platform {
            spawn = spawn.with_platform_property(name.as_str(), value.as_str());
        }
        for (key, value) in &self.execution_info {
            spawn = spawn.with_execution_info(key.as_str(), value.as_str());
        }
        spawn
    }

    pub fn input_mapping(&self) -> InputMapping {
        let files = self
            .inputs
            .iter()
            .map(|path| (PathBuf::from(path), ActionInput::file(path.as_str())));
        let virtual_inputs = self.virtual_inputs.iter().map(|(path, contents)| {
            (
                PathBuf::from(path),
                ActionInput::virtual_input(path.as_str(), contents.as_bytes().to_vec()),
            )
        });
        files.chain(virtual_inputs).collect()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}
