//! The scheduler engine: three cooperating periodic loops plus graceful
//! shutdown (`spec.md` §4.E, §4.F).

mod janitor;
mod projector;
mod runner;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::SchedulerConfig;
use crate::error::{StoreError, ValidationError};
use crate::handler::Handler;
use crate::ids::TaskDefinitionId;
use crate::shutdown::Shutdown;
use crate::store::Store;
use crate::TaskDefinition;

/// `new_scheduler(schedule_window, runner_window, cleanup_window, handler,
/// store)` from `spec.md` §6, reshaped into a constructor on the type that
/// owns the three loops.
pub struct Scheduler<S: Store> {
    config: SchedulerConfig,
    handler: Arc<dyn Handler>,
    store: Arc<S>,
    shutdown: Shutdown,
}

impl<S: Store + 'static> Scheduler<S> {
    /// Calls `store.initialize()` eagerly, matching both the original's
    /// `NewScheduler` and the teacher's `EventScheduler::new` +
    /// `initializeStore` split.
    pub async fn new<H: Handler>(
        config: SchedulerConfig,
        handler: H,
        store: S,
    ) -> Result<Self, StoreError> {
        store.initialize().await?;
        Ok(Self {
            config,
            handler: Arc::new(handler),
            store: Arc::new(store),
            shutdown: Shutdown::default(),
        })
    }

    /// Validates, substitutes a zero `expire_after` with the projector
    /// window, recomputes `next_fire_time`/`recurring` from the trigger,
    /// and generates a fresh id if none was set (`spec.md` §4.B).
    pub async fn upsert_definition(
        &self,
        mut definition: TaskDefinition,
    ) -> Result<(), DefinitionError> {
        definition.validate()?;
        definition.prepare_for_upsert(self.config.schedule_window);
        self.store.upsert_definition(definition).await?;
        Ok(())
    }

    pub async fn get_definitions(
        &self,
        ids: &[TaskDefinitionId],
    ) -> Result<Vec<TaskDefinition>, StoreError> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            out.push(self.store.get_definition(*id).await?);
        }
        Ok(out)
    }

    pub async fn delete_definition(&self, id: TaskDefinitionId) -> Result<(), StoreError> {
        self.store.delete_definition(id).await
    }

    pub async fn delete_definitions(&self, ids: &[TaskDefinitionId]) -> Result<(), StoreError> {
        self.store.delete_definitions(ids).await
    }

    /// Gives direct access to the store for callers who need operations
    /// §4.F doesn't wrap (list/metadata-query/instance CRUD).
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Spawns the projector, runner and janitor loops plus an OS-signal
    /// listener, then blocks until [`Self::stop`] is called or a
    /// termination signal is received. Already-dispatched handler
    /// invocations run to completion after shutdown is observed
    /// (`spec.md` §5).
    #[tracing::instrument(skip_all)]
    pub async fn run(&self) {
        let projector = tokio::spawn(projector::run_loop(
            self.store.clone(),
            self.config.schedule_window,
            self.shutdown.clone(),
        ));
        let runner = tokio::spawn(runner::run_loop(
            self.store.clone(),
            self.handler.clone(),
            self.config.schedule_window,
            self.config.runner_window,
            self.shutdown.clone(),
        ));
        let janitor = tokio::spawn(janitor::run_loop(
            self.store.clone(),
            self.config.cleanup_window,
            self.shutdown.clone(),
        ));
        let signal_listener = tokio::spawn(wait_for_termination_signal(self.shutdown.clone()));

        let mut wait_for_shutdown = self.shutdown.clone();
        wait_for_shutdown.recv().await;
        info!("scheduler shutting down");

        signal_listener.abort();
        join_loop(projector, "projector").await;
        join_loop(runner, "runner").await;
        join_loop(janitor, "janitor").await;
        info!("scheduler stopped");
    }

    /// Signals the three loops and `run()`'s caller to stop. Has the same
    /// observable effect as receiving a termination signal.
    pub fn stop(&self) {
        self.shutdown.broadcast_shutdown();
    }
}

async fn join_loop(handle: JoinHandle<()>, name: &'static str) {
    if let Err(e) = handle.await {
        if !e.is_cancelled() {
            warn!(loop_name = name, error = %e, "scheduler loop panicked");
        }
    }
}

#[cfg(unix)]
async fn wait_for_termination_signal(shutdown: Shutdown) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            warn!("received SIGINT, shutting down");
        }
        _ = sigterm.recv() => {
            warn!("received SIGTERM, shutting down");
        }
    }
    shutdown.broadcast_shutdown();
}

#[cfg(not(unix))]
async fn wait_for_termination_signal(shutdown: Shutdown) {
    let _ = tokio::signal::ctrl_c().await;
    warn!("received termination signal, shutting down");
    shutdown.broadcast_shutdown();
}

/// Errors from [`Scheduler::upsert_definition`]: validation failures are
/// returned synchronously with no state change (`spec.md` §7); store
/// failures propagate too since upsert is a direct call, not a loop tick.
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
