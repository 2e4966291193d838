//! Named actions that jobs and schedule entries can refer to by string.

use crate::error::QueueResult;
use crate::job::JobContext;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A unit of application logic addressable by name.
#[async_trait]
pub trait Action: Send + Sync {
    async fn handle(&self, ctx: JobContext) -> QueueResult<()>;
}

struct FnAction<F>(F);

#[async_trait]
impl<F, Fut> Action for FnAction<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync,
    Fut: Future<Output = QueueResult<()>> + Send,
{
    async fn handle(&self, ctx: JobContext) -> QueueResult<()> {
        (self.0)(ctx).await
    }
}

/// Action lookup table.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action; a later registration under the same name replaces
    /// the earlier one.
    pub fn register(&mut self, name: impl Into<String>, action: impl Action + 'static) {
        self.actions.insert(name.into(), Arc::new(action));
    }

    /// Register an async closure as an action.
    pub fn register_fn<F, Fut>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = QueueResult<()>> + Send + 'static,
    {
        self.register(name, FnAction(f));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueueError;
    use crate::job::JobData;

    struct Greeter;

    #[async_trait]
    impl Action for Greeter {
        async fn handle(&self, ctx: JobContext) -> QueueResult<()> {
            if ctx.payload.is_null() {
                Err(QueueError::failed("nobody to greet"))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_register_and_invoke() {
        let mut actions = ActionRegistry::new();
        actions.register("Greet", Greeter);
        actions.register_fn("Noop", |_ctx| async { Ok(()) });

        assert_eq!(actions.names(), vec!["Greet", "Noop"]);

        let greet = actions.get("Greet").unwrap();
        let ctx = JobContext::new("Greet", 1, 1, serde_json::json!({"name": "Ada"}));
        assert!(greet.handle(ctx).await.is_ok());

        let ctx = JobContext::new("Greet", 1, 1, JobData::Null);
        assert!(greet.handle(ctx).await.is_err());

        assert!(actions.get("Missing").is_none());
    }
}
