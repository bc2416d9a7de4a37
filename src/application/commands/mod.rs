//! Console commands.
//!
//! Each command is a plain value handled by its handler, in the same
//! command/handler split the rest of the application uses:
//!
//! - `make:entity` - [`MakeEntityCommand`] / [`MakeEntityHandler`]
//! - `cycle:schema` - [`SchemaCommand`] / [`SchemaHandler`]
//! - `cycle:migrate` - [`MigrateCommand`] / [`MigrateHandler`]
//!
//! Handlers never fail; they return a [`CommandResult`] carrying an exit
//! code and the lines to print.

mod make_entity;
mod migrate;
mod schema;

pub use make_entity::{MakeEntityCommand, MakeEntityHandler};
pub use migrate::{MigrateCommand, MigrateHandler};
pub use schema::{SchemaCommand, SchemaHandler};

use std::fmt;
use std::path::{Path, PathBuf};

use colored::Colorize;

use super::container::ServiceRegistry;
use super::provider::services;
use crate::adapters::migrations::Migrator;
use crate::config::CycleConfig;
use crate::domain::schema::Schema;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Ok,
    Error,
    Info,
}

/// One line of command output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub kind: LineKind,
    pub text: String,
}

impl fmt::Display for OutputLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            LineKind::Ok => write!(f, "{} {}", "[OK]".green().bold(), self.text),
            LineKind::Error => write!(f, "{} {}", "[ERROR]".red().bold(), self.text),
            LineKind::Info => write!(f, "[INFO] {}", self.text),
        }
    }
}

/// Exit code plus output of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_code: i32,
    pub lines: Vec<OutputLine>,
}

impl CommandResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok(mut self, text: impl Into<String>) -> Self {
        self.push(LineKind::Ok, text);
        self
    }

    pub fn info(mut self, text: impl Into<String>) -> Self {
        self.push(LineKind::Info, text);
        self
    }

    /// Add an error line and mark the command as failed
    pub fn error(mut self, text: impl Into<String>) -> Self {
        self.push(LineKind::Error, text);
        self.exit_code = 1;
        self
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Errors go to stderr, everything else to stdout.
    pub fn print(&self) {
        for line in &self.lines {
            match line.kind {
                LineKind::Error => eprintln!("{}", line),
                _ => println!("{}", line),
            }
        }
    }

    fn push(&mut self, kind: LineKind, text: impl Into<String>) {
        self.lines.push(OutputLine {
            kind,
            text: text.into(),
        });
    }
}

/// A parsed console invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleCommand {
    MakeEntity(MakeEntityCommand),
    Schema(SchemaCommand),
    Migrate(MigrateCommand),
}

impl CycleCommand {
    pub fn name(&self) -> &'static str {
        match self {
            CycleCommand::MakeEntity(_) => MakeEntityCommand::NAME,
            CycleCommand::Schema(_) => SchemaCommand::NAME,
            CycleCommand::Migrate(_) => MigrateCommand::NAME,
        }
    }
}

/// The console commands, bound as `cycle.commands` in console context.
#[derive(Debug, Clone)]
pub struct CommandRegistry {
    base_path: PathBuf,
}

impl CommandRegistry {
    pub const COMMANDS: [(&'static str, &'static str); 3] = [
        (MakeEntityCommand::NAME, "Generate an entity scaffold"),
        (SchemaCommand::NAME, "Show schema information or synchronize tables"),
        (MigrateCommand::NAME, "Run or roll back migrations"),
    ];

    pub fn new(base_path: &Path) -> Self {
        Self {
            base_path: base_path.to_path_buf(),
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        Self::COMMANDS.iter().map(|(name, _)| *name).collect()
    }

    pub fn description(&self, name: &str) -> Option<&'static str> {
        Self::COMMANDS
            .iter()
            .find(|(command, _)| *command == name)
            .map(|(_, description)| *description)
    }

    /// Resolve the services a command needs and run its handler.
    pub async fn execute(&self, registry: &ServiceRegistry, command: CycleCommand) -> CommandResult {
        tracing::debug!(command = command.name(), "running console command");
        match command {
            CycleCommand::MakeEntity(cmd) => match registry.make::<CycleConfig>(services::CONFIG) {
                Ok(config) => MakeEntityHandler::from_config(&self.base_path, &config.entities).handle(cmd),
                Err(e) => CommandResult::new().error(e.to_string()),
            },
            CycleCommand::Schema(cmd) => {
                let resolved = registry
                    .make::<Schema>(services::SCHEMA)
                    .and_then(|schema| Ok((schema, registry.make::<Migrator>(services::MIGRATOR)?)));
                match resolved {
                    Ok((schema, migrator)) => SchemaHandler::new(schema, migrator).handle(cmd).await,
                    Err(e) => CommandResult::new().error(e.to_string()),
                }
            }
            CycleCommand::Migrate(cmd) => match registry.make::<Migrator>(services::MIGRATOR) {
                Ok(migrator) => MigrateHandler::new(migrator).handle(cmd).await,
                Err(e) => CommandResult::new().error(e.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_line_marks_failure() {
        let result = CommandResult::new().info("checking").error("boom");
        assert_eq!(result.exit_code, 1);
        assert!(!result.is_success());
        assert_eq!(result.lines.len(), 2);
    }

    #[test]
    fn lines_are_tagged() {
        colored::control::set_override(false);
        let result = CommandResult::new().ok("done").info("note").error("bad");
        let rendered: Vec<String> = result.lines.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["[OK] done", "[INFO] note", "[ERROR] bad"]);
    }

    #[test]
    fn registry_lists_the_three_commands() {
        let registry = CommandRegistry::new(Path::new("."));
        assert_eq!(registry.names(), vec!["make:entity", "cycle:schema", "cycle:migrate"]);
        assert!(registry.description("cycle:migrate").is_some());
        assert!(registry.description("cycle:seed").is_none());
    }

    #[tokio::test]
    async fn missing_services_fail_the_command() {
        let registry = CommandRegistry::new(Path::new("."));
        let result = registry
            .execute(
                &ServiceRegistry::new(),
                CycleCommand::Migrate(MigrateCommand::default()),
            )
            .await;
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.lines[0].kind, LineKind::Error);
    }
}
