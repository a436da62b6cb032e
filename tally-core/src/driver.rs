use crate::{Connection, SqlWriter};

pub trait Driver: Default + Send + Sync + 'static {
    type Connection: Connection<Driver = Self>;
    type SqlWriter: SqlWriter;

    const NAME: &'static str;
    fn sql_writer(&self) -> Self::SqlWriter;
}
