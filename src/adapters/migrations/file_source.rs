//! Migrations read from a directory of SQL files.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::ports::{MigrationScript, MigrationSource, MigrationSourceError};

const UP_SUFFIX: &str = ".sql";
const DOWN_SUFFIX: &str = ".down.sql";

/// Reads `<version>_<name>.sql` files, each with an optional
/// `<version>_<name>.down.sql` companion.
///
/// A missing directory holds no migrations.
#[derive(Debug, Clone)]
pub struct FileMigrationSource {
    directory: PathBuf,
}

impl FileMigrationSource {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn read(&self, stem: &str) -> Result<MigrationScript, MigrationSourceError> {
        let (version, name) = parse_stem(stem)?;
        let up = fs::read_to_string(self.directory.join(format!("{}{}", stem, UP_SUFFIX)))?;
        let down_path = self.directory.join(format!("{}{}", stem, DOWN_SUFFIX));
        let down = if down_path.is_file() {
            Some(fs::read_to_string(down_path)?)
        } else {
            None
        };

        Ok(MigrationScript {
            version,
            name,
            checksum: checksum(&up),
            up,
            down,
        })
    }
}

impl MigrationSource for FileMigrationSource {
    fn migrations(&self) -> Result<Vec<MigrationScript>, MigrationSourceError> {
        if !self.directory.is_dir() {
            return Ok(Vec::new());
        }

        let mut stems = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if file_name.ends_with(DOWN_SUFFIX) {
                continue;
            }
            if let Some(stem) = file_name.strip_suffix(UP_SUFFIX) {
                stems.push(stem.to_string());
            }
        }

        let mut migrations = stems
            .iter()
            .map(|stem| self.read(stem))
            .collect::<Result<Vec<_>, _>>()?;
        migrations.sort_by(|a, b| compare_versions(&a.version, &b.version));

        let mut seen = HashSet::new();
        for migration in &migrations {
            if !seen.insert(migration.version.trim_start_matches('0')) {
                return Err(MigrationSourceError::DuplicateVersion(migration.version.clone()));
            }
        }
        Ok(migrations)
    }
}

/// Hex SHA-256 of a script
pub fn checksum(script: &str) -> String {
    hex::encode(Sha256::digest(script.as_bytes()))
}

fn parse_stem(stem: &str) -> Result<(String, String), MigrationSourceError> {
    let invalid = || MigrationSourceError::InvalidName(format!("{}{}", stem, UP_SUFFIX));
    let (version, name) = stem.split_once('_').ok_or_else(invalid)?;
    if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) || name.is_empty() {
        return Err(invalid());
    }
    Ok((version.to_string(), name.to_string()))
}

/// Numeric order on digit strings of any length
fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
