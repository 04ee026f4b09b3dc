//! Declarative role manifest.
//!
//! A manifest lists roles and the rules each role holds. It is the input to catalog
//! synchronization and is read from YAML or JSON.
//!
//! ```rust
//! use gatekeeper::manifest::Manifest;
//!
//! let manifest = Manifest::from_yaml_str(
//!     "roles:\n  - id: member\n    name: Member\n    rules:\n      - { action: read, subject: Team }\n",
//! )
//! .expect("manifest");
//! assert_eq!(manifest.roles.len(), 1);
//! ```
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use warden_authz::{Compilation, RoleDefinition, compile};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub roles: Vec<RoleDefinition>,
}

impl Manifest {
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let manifest: Manifest =
            serde_yaml::from_str(contents).with_context(|| "parse manifest yaml")?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        let manifest: Manifest =
            serde_json::from_str(contents).with_context(|| "parse manifest json")?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Load from a file; `.json` files are parsed as JSON, anything else as YAML.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("read manifest: {}", path.display()))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&contents)
        } else {
            Self::from_yaml_str(&contents)
        }
    }

    /// Document-level checks. Individual rules are validated by the compiler instead.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for role in &self.roles {
            if role.id.as_str().trim().is_empty() {
                bail!("role id must not be empty");
            }
            if !seen.insert(&role.id) {
                bail!("duplicate role id {}", role.id);
            }
        }
        Ok(())
    }

    /// Compile every role together, surfacing rule diagnostics before anything is stored.
    pub fn compile(&self) -> Compilation {
        compile(&self.roles)
    }
}
