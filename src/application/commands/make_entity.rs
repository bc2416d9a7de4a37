//! `make:entity` - write an entity scaffold into the entities directory.

use std::path::{Path, PathBuf};

use super::CommandResult;
use crate::config::EntitiesConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MakeEntityCommand {
    /// Entity name in any case, e.g. `BlogPost` or `blog_post`
    pub name: String,
    /// Replace an existing file
    pub force: bool,
}

impl MakeEntityCommand {
    pub const NAME: &'static str = "make:entity";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            force: false,
        }
    }
}

pub struct MakeEntityHandler {
    directory: PathBuf,
}

impl MakeEntityHandler {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Handler writing into the first configured entities directory
    pub fn from_config(base_path: &Path, config: &EntitiesConfig) -> Self {
        let directory = config
            .primary_directory()
            .map(|directory| base_path.join(directory))
            .unwrap_or_else(|| base_path.join("src/entities"));
        Self::new(directory)
    }

    pub fn handle(&self, cmd: MakeEntityCommand) -> CommandResult {
        let Some(words) = split_words(&cmd.name) else {
            return CommandResult::new().error(format!(
                "Invalid entity name '{}': use letters, digits and underscores",
                cmd.name
            ));
        };
        let type_name: String = words.iter().map(|word| capitalize(word)).collect();
        let role = words.join("_");

        let path = self.directory.join(format!("{}.rs", role));
        if path.exists() && !cmd.force {
            return CommandResult::new().error(format!(
                "Entity file already exists: {} (use --force to overwrite)",
                path.display()
            ));
        }

        let written = std::fs::create_dir_all(&self.directory)
            .and_then(|_| std::fs::write(&path, scaffold(&type_name, &role)));
        match written {
            Ok(()) => CommandResult::new()
                .ok(format!("Entity {} created: {}", type_name, path.display()))
                .info(format!("Register it with EntityRegistry::register::<{}>()", type_name)),
            Err(e) => CommandResult::new().error(format!("Failed to write {}: {}", path.display(), e)),
        }
    }
}

/// Lowercase words of an identifier, split on underscores and case changes.
fn split_words(name: &str) -> Option<Vec<String>> {
    let valid = name.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return None;
    }

    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    for c in name.chars() {
        if c == '_' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_ascii_uppercase() && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        current.push(c.to_ascii_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    Some(words)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn scaffold(type_name: &str, role: &str) -> String {
    format!(
        r#"use cycle_bridge::domain::{{field, ColumnDef, Entity, EntityDescriptor, EntityError, Record, Value}};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct {type_name} {{
    pub id: Option<i64>,
}}

impl Entity for {type_name} {{
    const ROLE: &'static str = "{role}";

    fn describe() -> EntityDescriptor {{
        EntityDescriptor::new(Self::ROLE, module_path!())
            .table("{role}s")
            .column(ColumnDef::primary("id"))
    }}

    fn to_record(&self) -> Record {{
        let mut record = Record::new();
        record.insert("id".into(), self.id.into());
        record
    }}

    fn from_record(record: &Record) -> Result<Self, EntityError> {{
        Ok(Self {{
            id: field(record, "id")?,
        }})
    }}

    fn primary_key(&self) -> Option<Value> {{
        self.id.map(Value::Int)
    }}

    fn set_primary_key(&mut self, value: Value) {{
        self.id = value.as_i64();
    }}
}}
"#
    )
}
