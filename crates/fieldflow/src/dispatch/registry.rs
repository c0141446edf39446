use std::{any::Any, collections::HashMap, future::Future, pin::Pin, sync::Arc, time::Duration};

use serde_json::Value;
use tokio::{sync::Semaphore, task::JoinSet, time::timeout};
use uuid::Uuid;

use crate::dispatch::error::{DispatchError, TaskError};
use crate::queue::error_codes::ErrorCode;
use crate::queue::task::{TaskKind, TaskPayload};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
type HandlerFn = dyn Fn(Value, TaskContext) -> BoxFuture<'static, Result<(), TaskError>> + Send + Sync;

/// What a handler knows about the delivery it is serving.
#[derive(Clone, Debug)]
pub struct TaskContext {
    pub task_id: Uuid,
    pub attempt_no: i32,
    pub max_attempts: i32,
    pub worker_id: String,
}

#[derive(Clone)]
pub struct HandlerEntry {
    handler: Arc<HandlerFn>,
    semaphore: Option<Arc<Semaphore>>,
    timeout: Option<Duration>,
}

#[derive(Clone, Debug, Default)]
pub struct HandlerOptions {
    max_concurrency: Option<usize>,
    timeout: Option<Duration>,
}

impl HandlerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = Some(n);
        self
    }

    pub fn timeout(mut self, dur: Duration) -> Self {
        self.timeout = Some(dur);
        self
    }
}

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskKind, HandlerEntry>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed handler. The payload is decoded before the handler runs;
    /// a payload that does not decode fails the attempt with `BAD_PAYLOAD`.
    pub fn register<P, F, Fut>(&mut self, handler: F)
    where
        P: TaskPayload,
        F: Fn(P, TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        self.register_with_options(handler, HandlerOptions::new());
    }

    pub fn register_with_options<P, F, Fut>(&mut self, handler: F, opts: HandlerOptions)
    where
        P: TaskPayload,
        F: Fn(P, TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let erased = move |payload: Value, ctx: TaskContext| -> BoxFuture<'static, Result<(), TaskError>> {
            match serde_json::from_value::<P>(payload) {
                Ok(p) => Box::pin(handler(p, ctx)),
                Err(e) => Box::pin(std::future::ready(Err(TaskError::bad_payload(format!(
                    "payload does not match {}: {e}",
                    P::KIND
                ))))),
            }
        };
        self.insert(P::KIND, Arc::new(erased), opts);
    }

    /// Register a handler that takes the raw JSON payload, addressed by its wire name.
    /// Names that are not a known task type are rejected.
    pub fn register_raw<F>(
        &mut self,
        task_type: &str,
        handler: F,
        opts: HandlerOptions,
    ) -> Result<(), DispatchError>
    where
        F: Fn(Value, TaskContext) -> BoxFuture<'static, Result<(), TaskError>>
            + Send
            + Sync
            + 'static,
    {
        let kind: TaskKind = task_type.parse()?;
        self.insert(kind, Arc::new(handler), opts);
        Ok(())
    }

    fn insert(&mut self, kind: TaskKind, handler: Arc<HandlerFn>, opts: HandlerOptions) {
        let semaphore = opts
            .max_concurrency
            .map(|n| Arc::new(Semaphore::new(n.max(1))));
        self.handlers.insert(
            kind,
            HandlerEntry {
                handler,
                semaphore,
                timeout: opts.timeout,
            },
        );
    }

    pub fn handler_for(&self, kind: TaskKind) -> Option<HandlerEntry> {
        self.handlers.get(&kind).cloned()
    }

    /// Every task type must have a handler before a dispatcher may start.
    pub fn ensure_complete(&self) -> Result<(), DispatchError> {
        let missing: Vec<TaskKind> = TaskKind::ALL
            .into_iter()
            .filter(|k| !self.handlers.contains_key(k))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DispatchError::MissingHandlers(missing))
        }
    }
}

impl HandlerEntry {
    /// Runs the handler on its own task so a panic surfaces as `PANIC` instead of
    /// unwinding through the worker slot. Dropping the returned future aborts the handler.
    pub async fn run(&self, payload: Value, ctx: TaskContext) -> Result<(), TaskError> {
        let _permit = match &self.semaphore {
            Some(sem) => Some(
                sem.clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| TaskError::new(ErrorCode::Unknown, "handler semaphore closed"))?,
            ),
            None => None,
        };

        let mut set = JoinSet::new();
        set.spawn((self.handler)(payload, ctx));

        let joined = match self.timeout {
            Some(dur) => match timeout(dur, set.join_next()).await {
                Ok(joined) => joined,
                Err(_) => {
                    return Err(TaskError::new(
                        ErrorCode::Timeout,
                        format!("handler timeout after {}ms", dur.as_millis()),
                    ));
                }
            },
            None => set.join_next().await,
        };

        match joined {
            Some(Ok(res)) => res,
            Some(Err(e)) if e.is_panic() => Err(TaskError::new(
                ErrorCode::Panic,
                panic_message(e.into_panic()),
            )),
            Some(Err(e)) => Err(TaskError::new(ErrorCode::Unknown, e.to_string())),
            None => Err(TaskError::new(ErrorCode::Unknown, "handler task vanished")),
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}

pub fn boxed<'a, T>(fut: impl Future<Output = T> + Send + 'a) -> BoxFuture<'a, T> {
    Box::pin(fut)
}
