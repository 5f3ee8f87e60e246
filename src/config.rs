use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::schema::EntityType;

/// Provider-imposed cap on operations per committed batch.
pub const MAX_BATCH_OPS: usize = 450;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub csv: CsvConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub backup: BackupConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CsvConfig {
    /// Directory holding the source CSV files.
    pub dir: PathBuf,
    /// Per-entity file-name overrides (defaults are `<collection>.csv`).
    #[serde(default)]
    pub files: CsvFilesConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CsvFilesConfig {
    pub allergens: Option<String>,
    pub symptom_weights: Option<String>,
    pub risk_rules: Option<String>,
    pub user_seeds: Option<String>,
    pub user_reports: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_batch_size() -> usize {
    MAX_BATCH_OPS
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackupConfig {
    #[serde(default = "default_backup_dir")]
    pub dir: PathBuf,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: default_backup_dir(),
        }
    }
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("backups")
}

impl Config {
    /// Source CSV path for an entity: the configured override, or the
    /// entity's default file name under `csv.dir`.
    pub fn csv_path(&self, entity: EntityType) -> PathBuf {
        let file = match entity {
            EntityType::Allergen => self.csv.files.allergens.as_deref(),
            EntityType::SymptomWeight => self.csv.files.symptom_weights.as_deref(),
            EntityType::RiskRule => self.csv.files.risk_rules.as_deref(),
            EntityType::UserSeed => self.csv.files.user_seeds.as_deref(),
            EntityType::UserReport => self.csv.files.user_reports.as_deref(),
        };
        self.csv.dir.join(file.unwrap_or(entity.default_csv_file()))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.sync.batch_size == 0 {
        anyhow::bail!("sync.batch_size must be > 0");
    }
    if config.sync.batch_size > MAX_BATCH_OPS {
        anyhow::bail!(
            "sync.batch_size must be <= {} (provider batch limit)",
            MAX_BATCH_OPS
        );
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let file = write_config(
            r#"
[store]
path = "data/store.sqlite"

[csv]
dir = "data/csv"
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.sync.batch_size, MAX_BATCH_OPS);
        assert_eq!(config.backup.dir, PathBuf::from("backups"));
        assert_eq!(
            config.csv_path(EntityType::Allergen),
            PathBuf::from("data/csv/allergens.csv")
        );
    }

    #[test]
    fn test_file_override_wins() {
        let file = write_config(
            r#"
[store]
path = "s.sqlite"

[csv]
dir = "in"

[csv.files]
allergens = "알레르겐_목록.csv"
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(
            config.csv_path(EntityType::Allergen),
            PathBuf::from("in/알레르겐_목록.csv")
        );
        assert_eq!(
            config.csv_path(EntityType::RiskRule),
            PathBuf::from("in/risk_rules.csv")
        );
    }

    #[test]
    fn test_batch_size_validation() {
        let zero = write_config("[store]\npath = 's'\n[csv]\ndir = 'd'\n[sync]\nbatch_size = 0\n");
        assert!(load_config(zero.path()).is_err());

        let huge =
            write_config("[store]\npath = 's'\n[csv]\ndir = 'd'\n[sync]\nbatch_size = 900\n");
        assert!(load_config(huge.path()).is_err());
    }
}
