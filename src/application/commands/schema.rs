//! `cycle:schema` - describe the compiled schema or create its tables.

use std::sync::Arc;

use super::CommandResult;
use crate::adapters::migrations::Migrator;
use crate::domain::schema::Schema;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaCommand {
    /// Create missing tables instead of printing the schema
    pub sync: bool,
}

impl SchemaCommand {
    pub const NAME: &'static str = "cycle:schema";
}

pub struct SchemaHandler {
    schema: Arc<Schema>,
    migrator: Arc<Migrator>,
}

impl SchemaHandler {
    pub fn new(schema: Arc<Schema>, migrator: Arc<Migrator>) -> Self {
        Self { schema, migrator }
    }

    pub async fn handle(&self, cmd: SchemaCommand) -> CommandResult {
        if cmd.sync {
            return match self.migrator.sync_schema(&self.schema).await {
                Ok(tables) => tables
                    .iter()
                    .fold(CommandResult::new(), |result, table| result.info(format!("Table {}", table)))
                    .ok(format!("Schema synchronized ({} tables)", tables.len())),
                Err(e) => CommandResult::new().error(format!("Schema synchronization failed: {}", e)),
            };
        }

        if self.schema.is_empty() {
            return CommandResult::new().info("No entities registered");
        }

        let mut result = CommandResult::new();
        for entity in self.schema.entities() {
            result = result.info(format!(
                "{} -> {} ({} columns, {} relations)",
                entity.role,
                entity.table,
                entity.typecast.len(),
                entity.relations.len()
            ));
        }
        result.ok(format!(
            "{} entities, {} tables",
            self.schema.len(),
            self.schema.tables().count()
        ))
    }
}
