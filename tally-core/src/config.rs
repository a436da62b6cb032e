use crate::{Context, Result};
use std::{borrow::Cow, env, time::Duration};

/// When to retry after a transient transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Wait before reconnecting after a broken pipe or a refused connection.
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub url: Cow<'static, str>,
    pub reconnect: ReconnectPolicy,
}

impl ConnectionConfig {
    pub fn new(url: impl Into<Cow<'static, str>>) -> Self {
        Self {
            url: url.into(),
            reconnect: Default::default(),
        }
    }

    /// Read the connection url from an environment variable.
    pub fn from_env(var: &str) -> Result<Self> {
        let url = env::var(var)
            .with_context(|| format!("Missing connection url in the environment variable `{var}`"))?;
        Ok(Self::new(url))
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect.delay = delay;
        self
    }
}
