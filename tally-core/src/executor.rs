use crate::{Driver, Error, ErrorClass, QueryResult, Result};
use std::future::Future;

/// Runs statement text against a database.
///
/// Implementations are expected to be pool-like: `run` takes `&self` and concurrent calls
/// may be in flight at the same time, there is no ordering guarantee between them.
pub trait Executor: Send + Sync + Sized + 'static {
    type Driver: Driver;

    /// Send the query and return either the rows read or the rows affected.
    fn run(&self, query: String) -> impl Future<Output = Result<QueryResult>> + Send;

    /// Decide how the database reacts to an error returned by `run`.
    fn classify(&self, error: &Error) -> ErrorClass {
        ErrorClass::of(error)
    }
}
