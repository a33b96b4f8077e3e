use std::future::Future;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::adapter::TurnContext;

/// Continuation of the turn pipeline handed to a middleware.
///
/// `run` consumes the value, so a middleware can forward a turn at most once.
pub struct Next<'a> {
    run: Box<dyn FnOnce() -> BoxFuture<'a, anyhow::Result<()>> + Send + 'a>,
}

impl<'a> Next<'a> {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'a,
    {
        Self {
            run: Box::new(move || Box::pin(f())),
        }
    }

    /// Terminal continuation for the end of a pipeline.
    pub fn noop() -> Self {
        Self::new(|| async { Ok(()) })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        (self.run)().await
    }
}

/// Hook executed for every inbound turn before the bot's own logic.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn on_turn(&self, context: &dyn TurnContext, next: Next<'_>) -> anyhow::Result<()>;
}
