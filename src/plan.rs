//! Plan file loading.
//!
//! A plan is a TOML file of `[[unit]]` tables produced by the
//! configuration-resolution side of the toolchain. This module only checks
//! structural soundness (ids unique, file parseable); whether the plan makes
//! business sense is the producer's problem, and acyclicity is checked by
//! the scheduler.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use schedkit::{CommandAction, InstallUnit, UnitSpec};

#[derive(Debug, Deserialize)]
pub struct PlanFile {
    #[serde(default)]
    pub unit: Vec<UnitEntry>,
}

/// One `[[unit]]` table.
#[derive(Debug, Deserialize)]
pub struct UnitEntry {
    /// Stable identifier, unique within the plan
    pub id: String,

    /// Package name; defaults to the id
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub version: Option<String>,

    /// Extra installer options, folded into the cache fingerprint
    #[serde(default)]
    pub options: BTreeMap<String, String>,

    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Installer program to run (supports ~)
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Kill the install and fail after this long
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl UnitEntry {
    fn into_unit(self) -> InstallUnit {
        let name = self.name.unwrap_or_else(|| self.id.clone());

        let mut spec = UnitSpec::new(&name);
        if let Some(version) = self.version {
            spec = spec.with_version(version);
        }
        for (key, value) in self.options {
            spec = spec.with_option(key, value);
        }

        let program = shellexpand::tilde(&self.command).to_string();
        let mut action = CommandAction::new(program, self.args).with_unit_name(name);
        if let Some(secs) = self.timeout_secs {
            action = action.with_timeout(Duration::from_secs(secs));
        }

        InstallUnit::new(self.id, spec, Arc::new(action)).with_dependencies(self.depends_on)
    }
}

/// Load and validate a plan file.
pub fn load(path: &Path) -> Result<Vec<InstallUnit>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read plan file: {}", path.display()))?;

    let plan: PlanFile = toml::from_str(&content)
        .with_context(|| format!("Invalid plan file: {}", path.display()))?;

    if plan.unit.is_empty() {
        bail!("Plan file {} contains no units", path.display());
    }

    let mut seen = BTreeSet::new();
    for entry in &plan.unit {
        if entry.id.trim().is_empty() {
            bail!("Plan file {} contains a unit with an empty id", path.display());
        }
        if !seen.insert(entry.id.as_str()) {
            bail!("Duplicate unit id '{}' in {}", entry.id, path.display());
        }
    }

    Ok(plan.unit.into_iter().map(UnitEntry::into_unit).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_plan(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_basic_plan() {
        let file = write_plan(
            r#"
            [[unit]]
            id = "git"
            command = "apt-get"
            args = ["install", "-y", "git"]

            [[unit]]
            id = "tig"
            version = "2.5"
            depends_on = ["git"]
            command = "apt-get"
            args = ["install", "-y", "tig"]
            timeout_secs = 300
            "#,
        );

        let units = load(file.path()).unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].id, "git");
        assert!(units[0].depends_on.is_empty());
        assert_eq!(units[1].spec.version.as_deref(), Some("2.5"));
        assert!(units[1].depends_on.contains("git"));
    }

    #[test]
    fn test_name_defaults_to_id() {
        let file = write_plan(
            r#"
            [[unit]]
            id = "ripgrep"
            command = "cargo"
            args = ["install", "ripgrep"]
            "#,
        );

        let units = load(file.path()).unwrap();
        assert_eq!(units[0].spec.name, "ripgrep");
    }

    #[test]
    fn test_options_are_part_of_spec() {
        let file = write_plan(
            r#"
            [[unit]]
            id = "node"
            command = "mise"
            args = ["install", "node"]

            [unit.options]
            channel = "lts"
            "#,
        );

        let units = load(file.path()).unwrap();
        assert_eq!(
            units[0].spec.options.get("channel").map(String::as_str),
            Some("lts")
        );
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let file = write_plan(
            r#"
            [[unit]]
            id = "git"
            command = "true"

            [[unit]]
            id = "git"
            command = "true"
            "#,
        );

        let err = load(file.path()).unwrap_err();
        assert!(err.to_string().contains("Duplicate unit id 'git'"));
    }

    #[test]
    fn test_empty_plan_rejected() {
        let file = write_plan("");
        assert!(load(file.path()).is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(load(Path::new("/nonexistent/plan.toml")).is_err());
    }
}
