//! JSON pipeline manifests: declarative helpers the CLI can plan and run.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use kiln_types::HelperMode;

/// A whole manifest file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub fragments: Vec<HelperSpec>,
    #[serde(default)]
    pub builders: Vec<HelperSpec>,
}

/// One declarative helper.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelperSpec {
    pub key: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub mode: HelperMode,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub origin: Option<String>,
    /// Fragments write this under their key; defaults to `true`.
    #[serde(default)]
    pub value: Option<Value>,
    /// Stop the chain after this helper.
    #[serde(default)]
    pub halt: bool,
}

impl Manifest {
    pub fn parse(source: &str) -> anyhow::Result<Self> {
        let manifest: Manifest = serde_json::from_str(source)?;
        manifest.check()?;
        Ok(manifest)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read manifest {}: {e}", path.display()))?;
        let mut manifest = Self::parse(&source)?;
        if manifest.name.is_empty() {
            manifest.name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "pipeline".to_string());
        }
        Ok(manifest)
    }

    /// Keys must be non-empty, and a helper may not depend on itself.
    /// Duplicate keys are allowed: the registry decides whether they conflict.
    fn check(&self) -> anyhow::Result<()> {
        for (section, specs) in [("fragments", &self.fragments), ("builders", &self.builders)] {
            for (i, spec) in specs.iter().enumerate() {
                if spec.key.trim().is_empty() {
                    anyhow::bail!("{section}[{i}] has an empty key");
                }
                let deps: HashSet<&str> = spec.depends_on.iter().map(String::as_str).collect();
                if deps.contains(spec.key.as_str()) {
                    anyhow::bail!("{section}[{i}] (\"{}\") depends on itself", spec.key);
                }
            }
        }
        Ok(())
    }
}
