mod as_value;
mod config;
mod connection;
mod database;
mod driver;
mod error;
mod executor;
mod fields;
mod query;
mod registry;
mod sql_writer;
mod util;
mod value;

pub use ::anyhow::Context;
pub use as_value::*;
pub use config::*;
pub use connection::*;
pub use database::*;
pub use driver::*;
pub use error::*;
pub use executor::*;
pub use fields::*;
pub use query::*;
pub use registry::*;
pub use sql_writer::*;
pub use util::*;
pub use value::*;
pub use ::futures::future;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
