//! SQL rendering differences between drivers.

use crate::config::Driver;
use crate::domain::schema::TableSchema;
use crate::domain::{ColumnDef, ColumnType, Value};

/// Per-driver SQL rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    driver: Driver,
}

impl Dialect {
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }

    pub fn driver(&self) -> Driver {
        self.driver
    }

    /// Quote an identifier
    pub fn quote(&self, ident: &str) -> String {
        match self.driver {
            Driver::Mysql => format!("`{}`", ident.replace('`', "``")),
            Driver::Postgres | Driver::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Placeholder for the `n`th bound parameter, 1-based
    pub fn placeholder(&self, n: usize) -> String {
        match self.driver {
            Driver::Postgres => format!("${}", n),
            Driver::Mysql | Driver::Sqlite => "?".to_string(),
        }
    }

    /// Generated keys come back through `RETURNING` instead of `last_insert_id`
    pub fn returns_generated_key(&self) -> bool {
        matches!(self.driver, Driver::Postgres)
    }

    fn column_type(&self, kind: ColumnType) -> &'static str {
        match (self.driver, kind) {
            (Driver::Sqlite, ColumnType::Primary) => "INTEGER PRIMARY KEY AUTOINCREMENT",
            (Driver::Postgres, ColumnType::Primary) => "BIGSERIAL PRIMARY KEY",
            (Driver::Mysql, ColumnType::Primary) => "BIGINT AUTO_INCREMENT PRIMARY KEY",
            (Driver::Sqlite, ColumnType::Integer) => "INTEGER",
            (_, ColumnType::Integer) => "BIGINT",
            (Driver::Sqlite, ColumnType::Float) => "REAL",
            (Driver::Postgres, ColumnType::Float) => "DOUBLE PRECISION",
            (Driver::Mysql, ColumnType::Float) => "DOUBLE",
            (Driver::Sqlite, ColumnType::Boolean) => "INTEGER",
            (_, ColumnType::Boolean) => "BOOLEAN",
            (_, ColumnType::String) => "VARCHAR(255)",
            (_, ColumnType::Text) => "TEXT",
        }
    }

    fn literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => match self.driver {
                Driver::Sqlite => i64::from(*b).to_string(),
                Driver::Mysql | Driver::Postgres => b.to_string().to_uppercase(),
            },
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }

    fn column_definition(&self, column: &ColumnDef) -> String {
        let mut sql = format!("{} {}", self.quote(&column.name), self.column_type(column.kind));
        if column.is_primary() {
            return sql;
        }
        if !column.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&self.literal(default));
        }
        sql
    }

    /// `CREATE TABLE IF NOT EXISTS` for a rendered table, followed by its indexes.
    ///
    /// Foreign keys are rendered as constraints; tables must be created in
    /// dependency order on drivers that check them eagerly.
    pub fn create_table(&self, table: &TableSchema) -> Vec<String> {
        let mut parts: Vec<String> = table
            .columns
            .iter()
            .map(|column| self.column_definition(column))
            .collect();
        for fk in &table.foreign_keys {
            parts.push(format!(
                "FOREIGN KEY ({}) REFERENCES {} ({})",
                self.quote(&fk.column),
                self.quote(&fk.references_table),
                self.quote(&fk.references_column)
            ));
        }

        let mut statements = vec![format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.quote(&table.name),
            parts.join(", ")
        )];

        for index in &table.indexes {
            let columns: Vec<String> = index.columns.iter().map(|c| self.quote(c)).collect();
            let unique = if index.unique { "UNIQUE " } else { "" };
            // MySQL has no IF NOT EXISTS for indexes
            let guard = match self.driver {
                Driver::Mysql => "",
                Driver::Postgres | Driver::Sqlite => "IF NOT EXISTS ",
            };
            statements.push(format!(
                "CREATE {}INDEX {}{} ON {} ({})",
                unique,
                guard,
                self.quote(&index.name),
                self.quote(&table.name),
                columns.join(", ")
            ));
        }
        statements
    }

    /// Insert statement for the given columns
    pub fn insert(&self, table: &str, columns: &[&str], primary_key: &str) -> String {
        let names: Vec<String> = columns.iter().map(|c| self.quote(c)).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|n| self.placeholder(n)).collect();
        let mut sql = if columns.is_empty() {
            match self.driver {
                Driver::Mysql => format!("INSERT INTO {} () VALUES ()", self.quote(table)),
                Driver::Postgres | Driver::Sqlite => {
                    format!("INSERT INTO {} DEFAULT VALUES", self.quote(table))
                }
            }
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.quote(table),
                names.join(", "),
                placeholders.join(", ")
            )
        };
        if self.returns_generated_key() {
            sql.push_str(&format!(" RETURNING {}", self.quote(primary_key)));
        }
        sql
    }

    /// Update by primary key; the key is bound last
    pub fn update(&self, table: &str, columns: &[&str], primary_key: &str) -> String {
        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = {}", self.quote(c), self.placeholder(i + 1)))
            .collect();
        format!(
            "UPDATE {} SET {} WHERE {} = {}",
            self.quote(table),
            assignments.join(", "),
            self.quote(primary_key),
            self.placeholder(columns.len() + 1)
        )
    }

    /// `LIMIT`/`OFFSET` suffix, with a leading space when non-empty
    pub fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        let mut sql = String::new();
        match (limit, offset, self.driver) {
            (Some(limit), _, _) => sql.push_str(&format!(" LIMIT {}", limit)),
            // SQLite and MySQL only accept OFFSET after a LIMIT
            (None, Some(_), Driver::Sqlite) => sql.push_str(" LIMIT -1"),
            (None, Some(_), Driver::Mysql) => sql.push_str(&format!(" LIMIT {}", u64::MAX)),
            _ => {}
        }
        if let Some(offset) = offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
        sql
    }

    pub fn delete(&self, table: &str, primary_key: &str) -> String {
        format!(
            "DELETE FROM {} WHERE {} = {}",
            self.quote(table),
            self.quote(primary_key),
            self.placeholder(1)
        )
    }
}
