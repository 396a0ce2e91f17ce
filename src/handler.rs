//! The user-supplied handler invoked by the runner loop.
//!
//! `spec.md` §6: "(instance) -> success | failure", with access to both the
//! instance's own identity and the parent definition's metadata. The
//! original resolves "the instance carries its parent definition" as a
//! single composite value (`examples/original_source/pkg/task_instance.go`
//! embeds `TaskDefinition` directly in `TaskInstance`, and
//! `scheduler.go`'s `Handler func(taskInstance TaskInstance) error` takes
//! it as one argument); [`TaskExecution`] is that same composite, kept as a
//! standalone type instead of embedding the definition in the persisted
//! [`TaskInstance`] row so the `Store` trait isn't forced to carry a
//! redundant join on every CRUD call. Modeled as a plain trait with a
//! blanket impl for async closures/fns, the same pattern the teacher
//! reaches for when a single callback needs to be `Send + Sync + 'static`
//! and boxed (see the `tower::Service`-shaped dispatch paths in
//! `scheduler/src/sched/dispatch.rs`).

use std::future::Future;
use std::pin::Pin;

use crate::{TaskDefinition, TaskInstance};

/// The engine never inspects the contents of a failure (`spec.md` §7:
/// "treated as 'do nothing'"), so any boxed error works.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send>>;

/// The instance due for execution together with the definition that
/// produced it, handed to [`Handler::call`] as a single value.
#[derive(Debug, Clone)]
pub struct TaskExecution {
    pub instance: TaskInstance,
    pub definition: TaskDefinition,
}

pub trait Handler: Send + Sync + 'static {
    fn call(&self, execution: TaskExecution) -> HandlerFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(TaskExecution) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn call(&self, execution: TaskExecution) -> HandlerFuture {
        Box::pin(self(execution))
    }
}
