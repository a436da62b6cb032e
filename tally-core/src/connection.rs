use crate::{Executor, Result};
use std::{borrow::Cow, future::Future};

pub trait Connection: Executor {
    /// Create a connection (usually a pool) to the given URL.
    fn connect(url: Cow<'static, str>) -> impl Future<Output = Result<Self>> + Send;

    /// Release the underlying resources, in flight queries are allowed to complete.
    fn disconnect(&self) -> impl Future<Output = Result<()>> + Send;
}
