mod connection;
mod driver;
mod row_wrap;
mod sql_writer;

pub use connection::*;
pub use driver::*;
pub(crate) use row_wrap::*;
pub use sql_writer::*;

pub type MySQLDatabase = tally_core::Database<MySQLConnection>;
pub type MySQLRegistry = tally_core::Registry<MySQLConnection>;
