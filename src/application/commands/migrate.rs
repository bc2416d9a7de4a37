//! `cycle:migrate` - apply, roll back or list migrations.

use std::sync::Arc;

use super::CommandResult;
use crate::adapters::migrations::Migrator;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrateCommand {
    /// Revert the last applied migration
    pub rollback: bool,
    /// List applied and pending migrations without changing anything
    pub status: bool,
}

impl MigrateCommand {
    pub const NAME: &'static str = "cycle:migrate";
}

pub struct MigrateHandler {
    migrator: Arc<Migrator>,
}

impl MigrateHandler {
    pub fn new(migrator: Arc<Migrator>) -> Self {
        Self { migrator }
    }

    pub async fn handle(&self, cmd: MigrateCommand) -> CommandResult {
        if cmd.status {
            return self.status().await;
        }
        if cmd.rollback {
            return match self.migrator.rollback().await {
                Ok(Some(migration)) => CommandResult::new().ok(format!("Rolled back {}", migration)),
                Ok(None) => CommandResult::new().info("Nothing to roll back"),
                Err(e) => CommandResult::new().error(format!("Rollback failed: {}", e)),
            };
        }

        match self.migrator.run().await {
            Ok(applied) if applied.is_empty() => CommandResult::new().info("Nothing to migrate"),
            Ok(applied) => applied
                .iter()
                .fold(CommandResult::new(), |result, migration| {
                    result.info(format!("Migrated {}", migration))
                })
                .ok(format!("{} migrations applied", applied.len())),
            Err(e) => CommandResult::new().error(format!("Migration failed: {}", e)),
        }
    }

    async fn status(&self) -> CommandResult {
        match self.migrator.status().await {
            Ok(status) => {
                let result = status.applied.iter().fold(CommandResult::new(), |result, migration| {
                    result.info(format!(
                        "Applied  {}_{} ({})",
                        migration.version, migration.name, migration.applied_at
                    ))
                });
                let result = status
                    .pending
                    .iter()
                    .fold(result, |result, migration| result.info(format!("Pending  {}", migration)));
                result.ok(format!(
                    "{} applied, {} pending",
                    status.applied.len(),
                    status.pending.len()
                ))
            }
            Err(e) => CommandResult::new().error(format!("Failed to read migration status: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::database::DatabaseManager;
    use crate::config::{ConnectionConfig, DatabaseConfig, Environment, MigrationsConfig};
    use std::path::Path;

    fn handler(dir: &Path, environment: Environment, safe: bool) -> MigrateHandler {
        let database = Arc::new(DatabaseManager::new(DatabaseConfig::single(
            "default",
            ConnectionConfig::memory(),
        )));
        let config = MigrationsConfig {
            directory: dir.to_path_buf(),
            safe,
            ..Default::default()
        };
        MigrateHandler::new(Arc::new(Migrator::new(database, config, environment)))
    }

    #[tokio::test]
    async fn run_then_status_then_rollback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1_create_posts.sql"), "CREATE TABLE posts (id INTEGER PRIMARY KEY);").unwrap();
        std::fs::write(dir.path().join("1_create_posts.down.sql"), "DROP TABLE posts;").unwrap();
        let handler = handler(dir.path(), Environment::Testing, true);

        let run = handler.handle(MigrateCommand::default()).await;
        assert!(run.is_success(), "{:?}", run);
        assert_eq!(run.lines.last().unwrap().text, "1 migrations applied");

        let again = handler.handle(MigrateCommand::default()).await;
        assert_eq!(again.lines[0].text, "Nothing to migrate");

        let status = handler
            .handle(MigrateCommand {
                status: true,
                ..Default::default()
            })
            .await;
        assert_eq!(status.lines.last().unwrap().text, "1 applied, 0 pending");

        let rollback = handler
            .handle(MigrateCommand {
                rollback: true,
                ..Default::default()
            })
            .await;
        assert_eq!(rollback.lines[0].text, "Rolled back 1_create_posts");
    }

    #[tokio::test]
    async fn safe_mode_blocks_production_rollback() {
        let dir = tempfile::tempdir().unwrap();
        let handler = handler(dir.path(), Environment::Production, true);

        let result = handler
            .handle(MigrateCommand {
                rollback: true,
                ..Default::default()
            })
            .await;
        assert_eq!(result.exit_code, 1);
    }
}
