//! Entity manager: a pending change set applied by `run()`.
//!
//! Entities handed to `persist` are wrapped in a [`Tracked`] handle shared
//! between the caller and the manager, so generated primary keys assigned
//! during `run()` are visible to the caller afterwards.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::adapters::database::ConnectionTransaction;
use crate::domain::schema::EntitySchema;
use crate::domain::{Entity, EntityError, Record, Value};
use crate::ports::{Operation, OrmEvent, RepositoryError, TypedRepository, UnitOfWork};

use super::Orm;

/// Shared handle to an entity tracked by an [`EntityManager`].
pub struct Tracked<E>(Arc<RwLock<E>>);

impl<E> Clone for Tracked<E> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<E: fmt::Debug> fmt::Debug for Tracked<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Tracked").field(&*self.read()).finish()
    }
}

impl<E> Tracked<E> {
    pub fn new(entity: E) -> Self {
        Self(Arc::new(RwLock::new(entity)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, E> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, E> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E: Clone> Tracked<E> {
    /// Snapshot of the current state
    pub fn get(&self) -> E {
        self.read().clone()
    }
}

trait PendingEntity: Send + Sync {
    fn role(&self) -> &'static str;
    fn record(&self) -> Record;
    fn primary_key(&self) -> Option<Value>;
    fn assign_key(&self, key: Value);
}

impl<E: Entity> PendingEntity for Tracked<E> {
    fn role(&self) -> &'static str {
        E::ROLE
    }

    fn record(&self) -> Record {
        self.read().to_record()
    }

    fn primary_key(&self) -> Option<Value> {
        self.read().primary_key().filter(|pk| !pk.is_null())
    }

    fn assign_key(&self, key: Value) {
        self.write().set_primary_key(key);
    }
}

enum Change {
    Persist(Box<dyn PendingEntity>),
    Delete(Box<dyn PendingEntity>),
}

/// Tracks inserts, updates and deletes until `run()`.
///
/// One manager per request or job; it is never shared between unrelated
/// units of work.
pub struct EntityManager {
    orm: Arc<Orm>,
    pending: Mutex<Vec<Change>>,
}

impl fmt::Debug for EntityManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityManager")
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl EntityManager {
    pub fn new(orm: Arc<Orm>) -> Self {
        Self {
            orm,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn orm(&self) -> &Arc<Orm> {
        &self.orm
    }

    /// Queue an insert (no primary key yet) or update, returning the tracked handle.
    pub fn persist<E: Entity>(&self, entity: E) -> Tracked<E> {
        let tracked = Tracked::new(entity);
        self.persist_tracked(&tracked);
        tracked
    }

    /// Queue an already tracked entity again, e.g. after modifying it.
    pub fn persist_tracked<E: Entity>(&self, tracked: &Tracked<E>) {
        self.queue(Change::Persist(Box::new(tracked.clone())));
    }

    /// Queue a delete.
    ///
    /// # Errors
    ///
    /// `NotPersisted` if the entity has no primary key.
    pub fn delete<E: Entity>(&self, tracked: &Tracked<E>) -> Result<(), EntityError> {
        if PendingEntity::primary_key(tracked).is_none() {
            return Err(EntityError::NotPersisted(E::ROLE.to_string()));
        }
        self.queue(Change::Delete(Box::new(tracked.clone())));
        Ok(())
    }

    /// Queue a delete for an entity loaded outside this manager.
    pub fn delete_entity<E: Entity>(&self, entity: E) -> Result<Tracked<E>, EntityError> {
        let tracked = Tracked::new(entity);
        self.delete(&tracked)?;
        Ok(tracked)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    /// Typed repository for `E`
    pub fn repository<E: Entity>(&self) -> Result<TypedRepository<E>, RepositoryError> {
        Ok(TypedRepository::new(self.orm.repository(E::ROLE)?))
    }

    fn queue(&self, change: Change) {
        self.lock().push(change);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Change>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn apply(
        &self,
        tx: &mut ConnectionTransaction<'_>,
        change: &Change,
        assigned: &mut Vec<(usize, Value)>,
        index: usize,
    ) -> Result<Operation, RepositoryError> {
        let dialect = tx.dialect();
        match change {
            Change::Persist(entity) => {
                let schema = self.orm.entity_schema(entity.role())?;
                let record = entity.record();
                match entity.primary_key() {
                    None => {
                        let (columns, params) = write_columns(schema, record)?;
                        let names: Vec<&str> = columns.iter().map(String::as_str).collect();
                        let sql = dialect.insert(&schema.table, &names, &schema.primary_key);
                        if let Some(key) = tx.insert(&sql, &params).await? {
                            assigned.push((index, Value::Int(key)));
                        }
                        Ok(Operation::Insert)
                    }
                    Some(pk) => {
                        let (columns, mut params) = write_columns(schema, record)?;
                        if columns.is_empty() {
                            return Ok(Operation::Update);
                        }
                        let names: Vec<&str> = columns.iter().map(String::as_str).collect();
                        let sql = dialect.update(&schema.table, &names, &schema.primary_key);
                        params.push(pk);
                        tx.execute(&sql, &params).await?;
                        Ok(Operation::Update)
                    }
                }
            }
            Change::Delete(entity) => {
                let schema = self.orm.entity_schema(entity.role())?;
                let pk = entity
                    .primary_key()
                    .ok_or_else(|| EntityError::NotPersisted(entity.role().to_string()))?;
                let sql = dialect.delete(&schema.table, &schema.primary_key);
                tx.execute(&sql, &[pk]).await?;
                Ok(Operation::Delete)
            }
        }
    }
}

/// Columns and values to write, excluding the primary key.
fn write_columns(schema: &EntitySchema, record: Record) -> Result<(Vec<String>, Vec<Value>), RepositoryError> {
    let mut columns = Vec::with_capacity(record.len() + 1);
    let mut params = Vec::with_capacity(record.len() + 1);
    for (column, value) in record {
        if column == schema.primary_key {
            continue;
        }
        if !schema.has_column(&column) {
            return Err(RepositoryError::UnknownColumn {
                role: schema.role.clone(),
                column,
            });
        }
        columns.push(column);
        params.push(value);
    }
    if let Some(discriminator) = &schema.discriminator {
        columns.push(discriminator.column.clone());
        params.push(Value::from(discriminator.value.as_str()));
    }
    Ok((columns, params))
}

#[async_trait]
impl UnitOfWork for EntityManager {
    fn has_changes(&self) -> bool {
        !self.lock().is_empty()
    }

    /// Apply every queued change in one transaction.
    ///
    /// Generated keys are written back only after commit. On failure the
    /// transaction is rolled back and the changes stay queued.
    async fn run(&self) -> Result<(), RepositoryError> {
        let changes = std::mem::take(&mut *self.lock());
        if changes.is_empty() {
            return Ok(());
        }

        let result = async {
            let connection = self.orm.database().default_connection()?;
            let mut tx = connection.begin().await?;
            let mut assigned = Vec::new();
            let mut applied = Vec::with_capacity(changes.len());
            for (index, change) in changes.iter().enumerate() {
                let operation = self.apply(&mut tx, change, &mut assigned, index).await?;
                applied.push(operation);
            }
            tx.commit().await?;
            Ok::<_, RepositoryError>((assigned, applied))
        }
        .await;

        match result {
            Ok((assigned, applied)) => {
                for (index, key) in assigned {
                    if let Some(Change::Persist(entity)) = changes.get(index) {
                        entity.assign_key(key);
                    }
                }
                for (change, operation) in changes.iter().zip(applied) {
                    let role = match change {
                        Change::Persist(entity) | Change::Delete(entity) => entity.role(),
                    };
                    self.orm.emit(OrmEvent::EntityPersisted {
                        role: role.to_string(),
                        operation,
                    });
                }
                tracing::debug!(changes = changes.len(), "unit of work committed");
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Unit of work rolled back: {}", e);
                let mut pending = self.lock();
                let queued_meanwhile = std::mem::take(&mut *pending);
                pending.extend(changes);
                pending.extend(queued_meanwhile);
                Err(e)
            }
        }
    }

    fn clean(&self) {
        let discarded = std::mem::take(&mut *self.lock()).len();
        if discarded > 0 {
            tracing::debug!(discarded, "pending changes discarded");
        }
    }
}
