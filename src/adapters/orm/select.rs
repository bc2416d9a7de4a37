//! Default repository: plain `SELECT`s against the entity's table.

use std::sync::Arc;

use async_trait::async_trait;

use crate::adapters::database::{decode_row, Connection};
use crate::domain::schema::EntitySchema;
use crate::domain::{Record, Value};
use crate::ports::{Criteria, OrmEvent, OrmEventPublisher, Repository, RepositoryError};

/// Repository used for every role without a custom override.
pub struct SelectRepository {
    entity: EntitySchema,
    connection: Arc<Connection>,
    events: Option<Arc<dyn OrmEventPublisher>>,
}

impl SelectRepository {
    pub fn new(
        entity: EntitySchema,
        connection: Arc<Connection>,
        events: Option<Arc<dyn OrmEventPublisher>>,
    ) -> Self {
        Self {
            entity,
            connection,
            events,
        }
    }

    pub fn entity(&self) -> &EntitySchema {
        &self.entity
    }

    fn check_column(&self, column: &str) -> Result<(), RepositoryError> {
        if self.entity.has_column(column) {
            Ok(())
        } else {
            Err(RepositoryError::UnknownColumn {
                role: self.entity.role.clone(),
                column: column.to_string(),
            })
        }
    }

    /// Build `SELECT <columns|COUNT(*)> FROM <table> WHERE ...`
    fn select(&self, criteria: &Criteria, count: bool) -> Result<(String, Vec<Value>), RepositoryError> {
        let dialect = self.connection.dialect();
        let mut params: Vec<Value> = Vec::new();
        let mut conditions: Vec<String> = Vec::new();

        if let Some(discriminator) = self.entity.discriminator.as_ref().filter(|d| d.filter) {
            params.push(Value::from(discriminator.value.as_str()));
            conditions.push(format!(
                "{} = {}",
                dialect.quote(&discriminator.column),
                dialect.placeholder(params.len())
            ));
        }

        for (column, value) in &criteria.filters {
            self.check_column(column)?;
            if value.is_null() {
                conditions.push(format!("{} IS NULL", dialect.quote(column)));
            } else {
                params.push(value.clone());
                conditions.push(format!(
                    "{} = {}",
                    dialect.quote(column),
                    dialect.placeholder(params.len())
                ));
            }
        }

        let projection = if count {
            "COUNT(*)".to_string()
        } else {
            self.entity
                .columns()
                .map(|c| dialect.quote(c))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut sql = format!("SELECT {} FROM {}", projection, dialect.quote(&self.entity.table));
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        if !count {
            if !criteria.order.is_empty() {
                let mut order = Vec::with_capacity(criteria.order.len());
                for (column, direction) in &criteria.order {
                    self.check_column(column)?;
                    order.push(format!("{} {}", dialect.quote(column), direction.as_sql()));
                }
                sql.push_str(" ORDER BY ");
                sql.push_str(&order.join(", "));
            }
            sql.push_str(&dialect.limit_clause(criteria.limit, criteria.offset));
        }

        Ok((sql, params))
    }

    fn loaded(&self, count: usize) {
        if count == 0 {
            return;
        }
        if let Some(events) = &self.events {
            events.publish(OrmEvent::EntityLoaded {
                role: self.entity.role.clone(),
                count,
            });
        }
    }
}

#[async_trait]
impl Repository for SelectRepository {
    fn role(&self) -> &str {
        &self.entity.role
    }

    async fn find_by_pk(&self, pk: &Value) -> Result<Option<Record>, RepositoryError> {
        let criteria = Criteria::new().where_eq(self.entity.primary_key.clone(), pk.clone());
        self.find_one(&criteria).await
    }

    async fn find_one(&self, criteria: &Criteria) -> Result<Option<Record>, RepositoryError> {
        let (sql, params) = self.select(&criteria.clone().limit(1), false)?;
        let row = self.connection.fetch_optional(&sql, &params).await?;
        let record = row
            .map(|row| decode_row(&row, &self.entity.typecast))
            .transpose()
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        self.loaded(usize::from(record.is_some()));
        Ok(record)
    }

    async fn find_all(&self, criteria: &Criteria) -> Result<Vec<Record>, RepositoryError> {
        let (sql, params) = self.select(criteria, false)?;
        let records = self
            .connection
            .fetch_all(&sql, &params)
            .await?
            .iter()
            .map(|row| decode_row(row, &self.entity.typecast))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        self.loaded(records.len());
        Ok(records)
    }

    async fn count(&self, criteria: &Criteria) -> Result<u64, RepositoryError> {
        let (sql, params) = self.select(&criteria.unpaged(), true)?;
        let count = self.connection.fetch_scalar(&sql, &params).await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}
