use crate::{
    Connection, ConnectionConfig, Criteria, DataError, Driver, Error, ErrorClass, Executor,
    OrderBy, Pagination, QueryResult, Record, Result, RowLabeled, SqlWriter, Value,
    truncate_long,
};
use std::{
    mem,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{runtime::Handle, sync::RwLock};

/// Cardinality normalization: no row is `None`, one row is returned, more is an error.
pub fn one_or_none(rows: Vec<RowLabeled>) -> Result<Option<RowLabeled>> {
    let mut rows = rows.into_iter();
    match (rows.next(), rows.next()) {
        (None, ..) => Ok(None),
        (Some(row), None) => Ok(Some(row)),
        (Some(..), Some(..)) => Err(DataError::MultipleRows.into()),
    }
}

/// Named logical database offering CRUD operations on top of a [`Connection`].
///
/// Statements are built with the driver's [`SqlWriter`] and sent through [`Database::query`].
/// When the connection reports a transport failure it is replaced in the background, the
/// error is still returned to the caller. Cloning is cheap and clones share the connection.
/// Once closed (from any clone) the database never reconnects.
pub struct Database<C: Connection> {
    name: Arc<str>,
    config: Arc<ConnectionConfig>,
    connection: Arc<RwLock<Arc<C>>>,
    closed: Arc<AtomicBool>,
}

impl<C: Connection> Clone for Database<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            config: self.config.clone(),
            connection: self.connection.clone(),
            closed: self.closed.clone(),
        }
    }
}

impl<C: Connection> Database<C> {
    pub async fn connect(config: ConnectionConfig, name: impl Into<Arc<str>>) -> Result<Self> {
        let name = name.into();
        let connection = C::connect(config.url.clone()).await?;
        log::info!("[{}] - Connected using the {} driver", name, <C::Driver as Driver>::NAME);
        Ok(Self::from_connection(connection, config, name))
    }

    /// Wrap an already established connection.
    pub fn from_connection(
        connection: C,
        config: ConnectionConfig,
        name: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            name: name.into(),
            config: config.into(),
            connection: Arc::new(RwLock::new(Arc::new(connection))),
            closed: Default::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// The connection currently in use.
    pub async fn connection(&self) -> Arc<C> {
        self.connection.read().await.clone()
    }

    pub fn sql_writer(&self) -> <C::Driver as Driver>::SqlWriter {
        C::Driver::default().sql_writer()
    }

    pub async fn find(&self, id: impl Into<Value>, table: &str) -> Result<Option<RowLabeled>> {
        self.find_one_by(&Criteria::by_id(id), table).await
    }

    pub async fn find_by(
        &self,
        criteria: &Criteria,
        order_by: &OrderBy,
        table: &str,
    ) -> Result<Vec<RowLabeled>> {
        self.find_by_paginated(criteria, order_by, None, None, table)
            .await
    }

    pub async fn find_by_paginated(
        &self,
        criteria: &Criteria,
        order_by: &OrderBy,
        limit: Option<u64>,
        offset: Option<u64>,
        table: &str,
    ) -> Result<Vec<RowLabeled>> {
        let sql = self.sql_writer().build_select(
            criteria,
            order_by,
            Pagination::from_parts(limit, offset),
            table,
        );
        self.query(sql).await.map(QueryResult::into_rows)
    }

    pub async fn find_all(&self, order_by: &OrderBy, table: &str) -> Result<Vec<RowLabeled>> {
        self.find_all_paginated(order_by, None, None, table).await
    }

    pub async fn find_all_paginated(
        &self,
        order_by: &OrderBy,
        limit: Option<u64>,
        offset: Option<u64>,
        table: &str,
    ) -> Result<Vec<RowLabeled>> {
        self.find_by_paginated(&Criteria::new(), order_by, limit, offset, table)
            .await
    }

    pub async fn find_one_by(&self, criteria: &Criteria, table: &str) -> Result<Option<RowLabeled>> {
        self.find_by(criteria, &OrderBy::new(), table)
            .await
            .and_then(one_or_none)
    }

    pub async fn count(&self, table: &str) -> Result<u64> {
        self.count_by(&Criteria::new(), table).await
    }

    pub async fn count_by(&self, criteria: &Criteria, table: &str) -> Result<u64> {
        let sql = self.sql_writer().build_count(criteria, table);
        let rows = self.query(sql).await?.into_rows();
        rows.first()
            .and_then(|row| row.get_column("count"))
            .and_then(Value::as_u64)
            .ok_or_else(|| DataError::MissingCount.into())
    }

    /// Insert the record and store the generated identifier in its `id` field.
    ///
    /// The record is modified only when the insert succeeds.
    pub async fn insert<'r>(&self, record: &'r mut Record, table: &str) -> Result<&'r mut Record> {
        let sql = self.sql_writer().build_insert(record, table);
        let result = self.query(sql).await?;
        let id = result
            .affected()
            .and_then(|v| v.last_affected_id)
            .map_or(Value::Null, Value::UInt64);
        record.set_id(id);
        Ok(record)
    }

    pub async fn update(
        &self,
        criteria: &Criteria,
        record: &Record,
        table: &str,
    ) -> Result<QueryResult> {
        if record.is_empty() {
            return Err(DataError::EmptyRecord(table.into()).into());
        }
        let sql = self.sql_writer().build_update(criteria, record, table);
        self.query(sql).await
    }

    pub async fn delete(&self, id: impl Into<Value>, table: &str) -> Result<QueryResult> {
        self.delete_by(&Criteria::by_id(id), table).await
    }

    pub async fn delete_by(&self, criteria: &Criteria, table: &str) -> Result<QueryResult> {
        let sql = self.sql_writer().build_delete(criteria, table);
        self.query(sql).await
    }

    /// Run a statement, every other operation goes through here.
    ///
    /// Errors are returned unchanged, transport failures also schedule a reconnection.
    pub async fn query(&self, sql: impl Into<String>) -> Result<QueryResult> {
        let sql = sql.into();
        log::debug!("[{}] - {}", self.name, truncate_long!(sql));
        let connection = self.connection().await;
        let result = connection.run(sql.clone()).await;
        if let Err(e) = &result {
            self.on_error(connection.classify(e), e, &sql);
        }
        result
    }

    /// Replace the connection with a new one, then release the previous.
    ///
    /// Does nothing on a closed database. A connection opened while the database was being
    /// closed is released right away.
    pub async fn reconnect(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        let connection = Arc::new(C::connect(self.config.url.clone()).await?);
        let previous = {
            let mut current = self.connection.write().await;
            if self.is_closed() {
                None
            } else {
                Some(mem::replace(&mut *current, connection.clone()))
            }
        };
        let Some(previous) = previous else {
            log::debug!("[{}] - Closed while reconnecting", self.name);
            return connection.disconnect().await;
        };
        log::info!("[{}] - Reconnected", self.name);
        if let Err(e) = previous.disconnect().await {
            log::warn!("[{}] - Could not release the previous connection: {:#}", self.name, e);
        }
        Ok(())
    }

    /// Release the connection, later errors no longer trigger a reconnection.
    pub async fn close(&self) -> Result<()> {
        // Set under the write lock so a reconnection cannot swap in a connection afterwards
        let connection = {
            let current = self.connection.write().await;
            if self.closed.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
            current.clone()
        };
        connection.disconnect().await
    }

    fn on_error(&self, class: ErrorClass, error: &Error, sql: &str) {
        match class {
            ErrorClass::ConnectionLost => {
                log::warn!("[{}] - Connection lost, reconnecting: {:#}", self.name, error);
                self.spawn_reconnect(Duration::ZERO);
            }
            ErrorClass::Transient => {
                let delay = self.config.reconnect.delay;
                log::warn!(
                    "[{}] - Connection failed, reconnecting in {:?}: {:#}",
                    self.name,
                    delay,
                    error
                );
                self.spawn_reconnect(delay);
            }
            ErrorClass::Benign => {
                log::debug!("[{}] - {:#}", self.name, error);
            }
            ErrorClass::Unknown => {
                log::error!(
                    "[{}] - {:#}\nWhile running the query:\n{}",
                    self.name,
                    error,
                    truncate_long!(sql)
                );
            }
        }
    }

    fn spawn_reconnect(&self, delay: Duration) {
        if self.is_closed() {
            log::debug!("[{}] - Closed, not reconnecting", self.name);
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            log::error!("[{}] - Cannot reconnect outside of a tokio runtime", self.name);
            return;
        };
        let database = self.clone();
        runtime.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Err(e) = database.reconnect().await {
                log::error!("[{}] - Reconnection failed: {:#}", database.name, e);
            }
        });
    }
}
