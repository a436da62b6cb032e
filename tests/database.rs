#[cfg(test)]
mod tests {
    use log::LevelFilter;
    use std::{
        borrow::Cow,
        collections::{HashMap, VecDeque},
        env, io,
        sync::{
            Arc, LazyLock, Mutex,
            atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        },
        time::Duration,
    };
    use tally::{
        Connection, ConnectionConfig, Criteria, DataError, Database, Driver, Error, Executor,
        MySQLSqlWriter, OrderBy, QueryResult, Record, Registry, Result, RowLabeled, RowsAffected,
        TransportError, Value,
        future::{join, join_all},
        one_or_none,
    };

    fn init_logs() {
        let mut logger = env_logger::builder();
        logger
            .is_test(true)
            .format_file(true)
            .format_line_number(true);
        if env::var("RUST_LOG").is_err() {
            logger.filter_level(LevelFilter::Warn);
        }
        let _ = logger.try_init();
    }

    /// State shared by every connection opened to the same url.
    #[derive(Default)]
    struct Backend {
        queries: Mutex<Vec<String>>,
        responses: Mutex<VecDeque<Result<QueryResult>>>,
        connects: AtomicUsize,
        /// Generations of the connections released, in order.
        released: Mutex<Vec<usize>>,
        refuse: AtomicBool,
        connect_delay_ms: AtomicU64,
    }

    impl Backend {
        fn respond(&self, response: Result<QueryResult>) {
            self.responses.lock().unwrap().push_back(response);
        }
        fn queries(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }
        fn connects(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }
        fn disconnects(&self) -> usize {
            self.released.lock().unwrap().len()
        }
        fn released(&self) -> Vec<usize> {
            self.released.lock().unwrap().clone()
        }
    }

    static BACKENDS: LazyLock<Mutex<HashMap<String, Arc<Backend>>>> =
        LazyLock::new(Default::default);

    fn backend(url: &str) -> Arc<Backend> {
        BACKENDS
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .clone()
    }

    #[derive(Default, Clone, Copy)]
    struct MockDriver;

    impl Driver for MockDriver {
        type Connection = MockConnection;
        type SqlWriter = MySQLSqlWriter;

        const NAME: &'static str = "mock";
        fn sql_writer(&self) -> Self::SqlWriter {
            MySQLSqlWriter::new()
        }
    }

    struct MockConnection {
        backend: Arc<Backend>,
        generation: usize,
    }

    impl Executor for MockConnection {
        type Driver = MockDriver;

        async fn run(&self, query: String) -> Result<QueryResult> {
            self.backend.queries.lock().unwrap().push(query);
            self.backend
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(QueryResult::Rows(Vec::new())))
        }
    }

    impl Connection for MockConnection {
        async fn connect(url: Cow<'static, str>) -> Result<Self> {
            let backend = backend(&url);
            let delay = backend.connect_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            let generation = backend.connects.fetch_add(1, Ordering::SeqCst) + 1;
            if backend.refuse.load(Ordering::SeqCst) {
                return Err(io::Error::from(io::ErrorKind::ConnectionRefused).into());
            }
            Ok(MockConnection {
                backend,
                generation,
            })
        }

        async fn disconnect(&self) -> Result<()> {
            self.backend.released.lock().unwrap().push(self.generation);
            Ok(())
        }
    }

    async fn database(url: &'static str) -> (Database<MockConnection>, Arc<Backend>) {
        init_logs();
        let database = Database::connect(ConnectionConfig::new(url), "test")
            .await
            .expect("Could not connect the mock");
        (database, backend(url))
    }

    fn rows(rows: impl IntoIterator<Item = RowLabeled>) -> Result<QueryResult> {
        Ok(QueryResult::Rows(rows.into_iter().collect()))
    }

    #[tokio::test]
    async fn find_composes_sql() {
        let (database, backend) = database("mock://find_composes_sql").await;
        backend.respond(rows([]));
        let result = database.find(1, "demo").await.expect("Find failed");
        assert_eq!(result, None);
        assert_eq!(
            backend.queries(),
            ["SELECT * FROM `demo` WHERE `id` = 1"]
        );
    }

    #[tokio::test]
    async fn find_yields_database_error() {
        let (database, backend) = database("mock://find_yields_database_error").await;
        backend.respond(Err(Error::msg("DB error")));
        let error = database.find(1, "demo").await.unwrap_err();
        assert_eq!(error.to_string(), "DB error");
        assert_eq!(backend.connects(), 1);
    }

    #[tokio::test]
    async fn find_cardinality() {
        let (database, backend) = database("mock://find_cardinality").await;
        let expected = RowLabeled::from([("prop", Value::Int64(203))]);

        backend.respond(rows([]));
        assert_eq!(database.find(1, "demo").await.unwrap(), None);

        backend.respond(rows([expected.clone()]));
        assert_eq!(database.find(1, "demo").await.unwrap(), Some(expected.clone()));

        backend.respond(rows([expected.clone(), expected.clone()]));
        let error = database.find(1, "demo").await.unwrap_err();
        assert_eq!(error.to_string(), "Multiple rows found.");
        assert_eq!(error.downcast_ref(), Some(&DataError::MultipleRows));
    }

    #[test]
    fn one_or_none_normalizes() {
        let row = RowLabeled::from([("a", Value::Null)]);
        assert_eq!(one_or_none(vec![]).unwrap(), None);
        assert_eq!(one_or_none(vec![row.clone()]).unwrap(), Some(row.clone()));
        assert!(one_or_none(vec![row.clone(), row.clone(), row]).is_err());
    }

    #[tokio::test]
    async fn find_variants_compose_sql() {
        let (database, backend) = database("mock://find_variants_compose_sql").await;
        let criteria = Criteria::new().with("demo_field", "test");
        database
            .find_by(&criteria, &OrderBy::new().desc("field"), "demo")
            .await
            .unwrap();
        database
            .find_by_paginated(
                &criteria,
                &OrderBy::parse([("field", "desc")]).unwrap(),
                Some(100),
                Some(200),
                "demo",
            )
            .await
            .unwrap();
        database
            .find_all(&OrderBy::new().asc("field"), "demo")
            .await
            .unwrap();
        database
            .find_all_paginated(&OrderBy::new().asc("field"), Some(100), Some(200), "demo")
            .await
            .unwrap();
        database
            .find_all_paginated(&OrderBy::new(), Some(100), None, "demo")
            .await
            .unwrap();
        database.find_one_by(&criteria, "demo").await.unwrap();
        assert_eq!(
            backend.queries(),
            [
                "SELECT * FROM `demo` WHERE `demo_field` LIKE 'test' ORDER BY `field` DESC",
                "SELECT * FROM `demo` WHERE `demo_field` LIKE 'test' ORDER BY `field` DESC LIMIT 100 OFFSET 200",
                "SELECT * FROM `demo` ORDER BY `field` ASC",
                "SELECT * FROM `demo` ORDER BY `field` ASC LIMIT 100 OFFSET 200",
                "SELECT * FROM `demo`",
                "SELECT * FROM `demo` WHERE `demo_field` LIKE 'test'",
            ]
        );
    }

    #[tokio::test]
    async fn insert_sets_generated_id() {
        let (database, backend) = database("mock://insert_sets_generated_id").await;
        backend.respond(Ok(RowsAffected {
            rows_affected: 1,
            last_affected_id: Some(23543),
        }
        .into()));
        let mut record = Record::new().with("param", 23);
        let address = &raw const record;
        let result = database.insert(&mut record, "demo").await.unwrap();
        assert!(std::ptr::eq(result, address));
        assert_eq!(
            *result,
            Record::new().with("param", 23).with("id", 23543u64)
        );
        assert_eq!(
            backend.queries(),
            ["INSERT INTO `demo` (`param`) VALUES (23)"]
        );
    }

    #[tokio::test]
    async fn insert_failure_keeps_record() {
        let (database, backend) = database("mock://insert_failure_keeps_record").await;
        backend.respond(Err(TransportError::new("ER_DUP_ENTRY", "Duplicate entry '1'").into()));
        let mut record = Record::new().with("lala", 1).with("test2", "demo");
        assert!(database.insert(&mut record, "demo").await.is_err());
        assert_eq!(record, Record::new().with("lala", 1).with("test2", "demo"));
        assert_eq!(record.id(), None);
        assert_eq!(
            backend.queries(),
            ["INSERT INTO `demo` (`lala`, `test2`) VALUES (1, 'demo')"]
        );
    }

    #[tokio::test]
    async fn update_and_delete() {
        let (database, backend) = database("mock://update_and_delete").await;
        let affected = RowsAffected {
            rows_affected: 1,
            last_affected_id: None,
        };
        backend.respond(Ok(affected.into()));
        let result = database
            .update(&Criteria::by_id(1), &Record::new().with("lala", 1), "demo")
            .await
            .unwrap();
        assert_eq!(result, QueryResult::Affected(affected));
        database.delete(1, "demo").await.unwrap();
        database
            .delete_by(&Criteria::new().with("name", Value::Null), "demo")
            .await
            .unwrap();
        assert_eq!(
            backend.queries(),
            [
                "UPDATE `demo` SET `lala` = 1 WHERE `id` = 1",
                "DELETE FROM `demo` WHERE `id` = 1",
                "DELETE FROM `demo` WHERE `name` IS NULL",
            ]
        );
    }

    #[tokio::test]
    async fn update_without_columns() {
        let (database, backend) = database("mock://update_without_columns").await;
        let error = database
            .update(&Criteria::by_id(1), &Record::new(), "demo")
            .await
            .unwrap_err();
        assert_eq!(
            error.downcast_ref(),
            Some(&DataError::EmptyRecord("demo".into()))
        );
        assert!(backend.queries().is_empty());
    }

    #[tokio::test]
    async fn count() {
        let (database, backend) = database("mock://count").await;
        backend.respond(rows([RowLabeled::from([("count", Value::Int64(12))])]));
        assert_eq!(database.count("demo").await.unwrap(), 12);
        backend.respond(rows([RowLabeled::from([("count", Value::UInt64(3))])]));
        assert_eq!(
            database
                .count_by(&Criteria::new().with("kind", "book"), "demo")
                .await
                .unwrap(),
            3
        );
        backend.respond(rows([]));
        let error = database.count("demo").await.unwrap_err();
        assert_eq!(error.downcast_ref(), Some(&DataError::MissingCount));
        assert_eq!(
            backend.queries(),
            [
                "SELECT COUNT(*) AS count FROM `demo`",
                "SELECT COUNT(*) AS count FROM `demo` WHERE `kind` LIKE 'book'",
                "SELECT COUNT(*) AS count FROM `demo`",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_when_connection_is_lost() {
        let (database, backend) = database("mock://reconnect_when_connection_is_lost").await;
        backend.respond(Err(TransportError::new(
            "PROTOCOL_CONNECTION_LOST",
            "Connection lost: The server closed the connection.",
        )
        .into()));
        let error = database.query("SELECT 1").await.unwrap_err();
        assert_eq!(
            error.downcast_ref::<TransportError>().map(|e| e.code.as_str()),
            Some("PROTOCOL_CONNECTION_LOST")
        );
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(backend.connects(), 2);
        assert_eq!(backend.disconnects(), 1);
        assert_eq!(database.connection().await.generation, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_after_delay_on_broken_pipe() {
        let (database, backend) = database("mock://reconnect_after_delay_on_broken_pipe").await;
        backend.respond(Err(io::Error::from(io::ErrorKind::BrokenPipe).into()));
        assert!(database.query("SELECT 1").await.is_err());
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(backend.connects(), 1);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(backend.connects(), 2);
        assert_eq!(database.connection().await.generation, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_delay_is_configurable() {
        init_logs();
        let url = "mock://reconnect_delay_is_configurable";
        let config = ConnectionConfig::new(url).with_reconnect_delay(Duration::from_secs(5));
        let database = Database::<MockConnection>::connect(config, "slow")
            .await
            .unwrap();
        let backend = backend(url);
        backend.respond(Err(TransportError::new("ECONNREFUSED", "connect ECONNREFUSED").into()));
        assert!(database.query("SELECT 1").await.is_err());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(backend.connects(), 1);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(backend.connects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn benign_and_unknown_errors_do_not_reconnect() {
        let (database, backend) =
            database("mock://benign_and_unknown_errors_do_not_reconnect").await;
        backend.respond(Err(TransportError::new(
            "ER_BAD_NULL_ERROR",
            "Column 'name' cannot be null",
        )
        .into()));
        backend.respond(Err(io::Error::other("Something else").into()));
        let error = database
            .insert(&mut Record::new().with("name", Value::Null), "demo")
            .await
            .unwrap_err();
        assert_eq!(
            error.downcast_ref::<TransportError>().map(|e| e.code.as_str()),
            Some("ER_BAD_NULL_ERROR")
        );
        let error = database.query("SELECT 1").await.unwrap_err();
        assert_eq!(error.to_string(), "Something else");
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(backend.connects(), 1);
        assert_eq!(backend.disconnects(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_reconnection_is_not_surfaced() {
        let (database, backend) = database("mock://failed_reconnection_is_not_surfaced").await;
        backend.refuse.store(true, Ordering::SeqCst);
        backend.respond(Err(io::Error::from(io::ErrorKind::ConnectionReset).into()));
        assert!(database.query("SELECT 1").await.is_err());
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(backend.connects(), 2);
        // Still on the first connection
        assert_eq!(database.connection().await.generation, 1);
        backend.respond(rows([RowLabeled::from([("x", Value::Int64(1))])]));
        let result = database.query("SELECT 1 AS x").await.unwrap();
        assert_eq!(result.into_rows().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_queries() {
        let (database, backend) = database("mock://concurrent_queries").await;
        let results = join_all((0..8).map(|i| {
            let database = database.clone();
            async move { database.find(i, "demo").await }
        }))
        .await;
        assert!(results.iter().all(|v| matches!(v, Ok(None))));
        assert_eq!(backend.queries().len(), 8);
    }

    #[tokio::test]
    async fn registry() {
        init_logs();
        let url = "mock://registry";
        let registry = Registry::<MockConnection>::new();
        let first = registry
            .create_connection(ConnectionConfig::new(url), "main")
            .await
            .unwrap();
        let second = registry
            .create_connection(ConnectionConfig::new("mock://registry_ignored"), "main")
            .await
            .unwrap();
        assert_eq!(first.name(), "main");
        assert_eq!(second.config().url, url);
        let backend = backend(url);
        assert_eq!(backend.connects(), 1);
        assert!(registry.get_connection("main").await.is_some());
        assert!(registry.get_connection("other").await.is_none());
        assert_eq!(registry.names().await, ["main"]);

        registry.close_connection("main").await.unwrap();
        assert_eq!(backend.disconnects(), 1);
        assert!(registry.get_connection("main").await.is_none());
        registry.close_connection("main").await.unwrap();
        assert_eq!(backend.disconnects(), 1);

        let third = registry
            .create_connection(ConnectionConfig::new(url), "main")
            .await
            .unwrap();
        assert_eq!(third.connection().await.generation, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_database_does_not_reconnect() {
        let (database, backend) = database("mock://closed_database_does_not_reconnect").await;
        let clone = database.clone();
        database.close().await.unwrap();
        assert!(clone.is_closed());
        backend.respond(Err(io::Error::from(io::ErrorKind::ConnectionReset).into()));
        assert!(clone.query("SELECT 1").await.is_err());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(backend.connects(), 1);
        clone.reconnect().await.unwrap();
        assert_eq!(backend.connects(), 1);
        // Closing again releases nothing
        clone.close().await.unwrap();
        assert_eq!(backend.released(), [1]);
    }

    #[tokio::test(start_paused = true)]
    async fn close_connection_cancels_scheduled_reconnect() {
        init_logs();
        let url = "mock://close_connection_cancels_scheduled_reconnect";
        let registry = Registry::<MockConnection>::new();
        let database = registry
            .create_connection(ConnectionConfig::new(url), "main")
            .await
            .unwrap();
        let backend = backend(url);
        backend.respond(Err(io::Error::from(io::ErrorKind::BrokenPipe).into()));
        assert!(database.query("SELECT 1").await.is_err());
        registry.close_connection("main").await.unwrap();
        drop(database);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(backend.connects(), 1);
        assert_eq!(backend.released(), [1]);
        assert!(registry.get_connection("main").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn close_while_reconnecting_releases_new_connection() {
        let (database, backend) =
            database("mock://close_while_reconnecting_releases_new_connection").await;
        backend.connect_delay_ms.store(50, Ordering::SeqCst);
        backend.respond(Err(TransportError::new("PROTOCOL_CONNECTION_LOST", "lost").into()));
        assert!(database.query("SELECT 1").await.is_err());
        // Let the reconnection start connecting
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        database.close().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(backend.connects(), 2);
        assert_eq!(backend.released(), [1, 2]);
        assert_eq!(database.connection().await.generation, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn registry_connects_outside_the_lock() {
        init_logs();
        let slow_url = "mock://registry_connects_outside_the_lock_slow";
        backend(slow_url)
            .connect_delay_ms
            .store(10_000, Ordering::SeqCst);
        let registry = Arc::new(Registry::<MockConnection>::new());
        let slow = tokio::spawn({
            let registry = registry.clone();
            async move {
                registry
                    .create_connection(ConnectionConfig::new(slow_url), "slow")
                    .await
                    .map(|_| ())
            }
        });
        tokio::task::yield_now().await;
        let fast = tokio::time::timeout(
            Duration::from_secs(1),
            registry.create_connection(
                ConnectionConfig::new("mock://registry_connects_outside_the_lock_fast"),
                "fast",
            ),
        )
        .await;
        assert!(matches!(fast, Ok(Ok(..))));
        assert_eq!(registry.names().await, ["fast"]);
        slow.await.unwrap().unwrap();
        assert_eq!(registry.names().await, ["fast", "slow"]);
    }

    #[tokio::test(start_paused = true)]
    async fn registry_concurrent_create_keeps_one() {
        init_logs();
        let url = "mock://registry_concurrent_create_keeps_one";
        let backend = backend(url);
        backend.connect_delay_ms.store(10, Ordering::SeqCst);
        let registry = Registry::<MockConnection>::new();
        let (a, b) = join(
            registry.create_connection(ConnectionConfig::new(url), "dup"),
            registry.create_connection(ConnectionConfig::new(url), "dup"),
        )
        .await;
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(backend.connects(), 2);
        assert_eq!(backend.disconnects(), 1);
        assert_eq!(
            a.connection().await.generation,
            b.connection().await.generation
        );
        assert_eq!(registry.names().await, ["dup"]);
        assert!(!a.is_closed());
    }
}
