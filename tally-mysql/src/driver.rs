use crate::{MySQLConnection, MySQLSqlWriter};
use tally_core::Driver;

#[derive(Clone, Copy, Default)]
pub struct MySQLDriver;

impl Driver for MySQLDriver {
    type Connection = MySQLConnection;
    type SqlWriter = MySQLSqlWriter;

    const NAME: &'static str = "mysql";
    fn sql_writer(&self) -> Self::SqlWriter {
        MySQLSqlWriter::default()
    }
}
