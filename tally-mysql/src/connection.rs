use crate::{MySQLDriver, RowWrap};
use mysql_async::{
    DriverError, IoError, Opts, OptsBuilder, Pool, ServerError, prelude::Queryable,
};
use std::borrow::Cow;
use tally_core::{
    Connection, Context, Driver, Error, ErrorClass, Executor, QueryResult, Result, RowsAffected,
    truncate_long,
};
use url::Url;

/// Statement executed on every new physical connection, literals are written in UTC.
pub const TIME_ZONE_INIT: &str = "SET time_zone = '+00:00'";

const ER_DUP_ENTRY: u16 = 1062;
const ER_BAD_NULL_ERROR: u16 = 1048;
const ER_SERVER_SHUTDOWN: u16 = 1053;
const ER_CONNECTION_KILLED: u16 = 1927;
const CR_SERVER_GONE_ERROR: u16 = 2006;
const CR_SERVER_LOST: u16 = 2013;

/// Connection pool to a MySQL (or MariaDB) server.
#[derive(Clone)]
pub struct MySQLConnection {
    pub(crate) pool: Pool,
}

impl MySQLConnection {
    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

impl Executor for MySQLConnection {
    type Driver = MySQLDriver;

    async fn run(&self, query: String) -> Result<QueryResult> {
        let mut connection = self.pool.get_conn().await?;
        let result = connection.query_iter(query.as_str()).await?;
        if result.columns().is_some_and(|v| !v.is_empty()) {
            let rows = result.collect_and_drop::<RowWrap>().await?;
            Ok(QueryResult::Rows(rows.into_iter().map(|v| v.0).collect()))
        } else {
            let affected = RowsAffected {
                rows_affected: result.affected_rows(),
                last_affected_id: result.last_insert_id(),
            };
            result.drop_result().await?;
            Ok(affected.into())
        }
    }

    fn classify(&self, error: &Error) -> ErrorClass {
        error
            .chain()
            .find_map(|cause| cause.downcast_ref::<mysql_async::Error>())
            .map(classify_error)
            .filter(|v| *v != ErrorClass::Unknown)
            .unwrap_or_else(|| ErrorClass::of(error))
    }
}

pub fn classify_error(error: &mysql_async::Error) -> ErrorClass {
    match error {
        mysql_async::Error::Server(ServerError { code, .. }) => match *code {
            ER_DUP_ENTRY | ER_BAD_NULL_ERROR => ErrorClass::Benign,
            ER_SERVER_SHUTDOWN | ER_CONNECTION_KILLED | CR_SERVER_GONE_ERROR | CR_SERVER_LOST => {
                ErrorClass::ConnectionLost
            }
            _ => ErrorClass::Unknown,
        },
        mysql_async::Error::Driver(DriverError::ConnectionClosed)
        | mysql_async::Error::Driver(DriverError::PoolDisconnected) => ErrorClass::ConnectionLost,
        mysql_async::Error::Io(IoError::Io(e)) => ErrorClass::from_io_kind(e.kind()),
        _ => ErrorClass::Unknown,
    }
}

impl Connection for MySQLConnection {
    async fn connect(url: Cow<'static, str>) -> Result<MySQLConnection> {
        let context = || format!("While trying to connect to `{}`", truncate_long!(url));
        let prefix = format!("{}://", <Self::Driver as Driver>::NAME);
        if !url.starts_with(&prefix) {
            let error = Error::msg(format!(
                "MySQL connection url must start with `{}`",
                &prefix
            ))
            .context(context());
            log::error!("{:#}", error);
            return Err(error);
        }
        let parsed = Url::parse(&url).with_context(context)?;
        let opts = Opts::from_url(parsed.as_str()).with_context(context)?;
        let pool = Pool::new(OptsBuilder::from_opts(opts).init(vec![TIME_ZONE_INIT]));
        // Fail early if the server is not reachable, the connection goes back to the pool
        drop(pool.get_conn().await.with_context(context)?);
        Ok(MySQLConnection { pool })
    }

    async fn disconnect(&self) -> Result<()> {
        self.pool.clone().disconnect().await.map_err(Into::into)
    }
}
