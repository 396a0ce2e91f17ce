//! An embeddable task scheduler: cron and one-shot triggers, lease-based
//! at-least-once dispatch, pluggable persistence.
//!
//! The engine runs three cooperating loops (projector, runner, janitor)
//! over a [`Store`] implementation. Bring your own store adapter by
//! implementing [`Store`]; [`store::memory::MemoryStore`] is the reference
//! adapter used by this crate's own tests.

mod config;
mod definition;
mod error;
mod handler;
mod ids;
mod instance;
mod sched;
mod shutdown;
mod store;
mod trigger;

pub use config::SchedulerConfig;
pub use definition::TaskDefinition;
pub use error::{StoreError, TriggerError, ValidationError};
pub use handler::{Handler, HandlerError, HandlerFuture, TaskExecution};
pub use ids::{TaskDefinitionId, TaskInstanceId};
pub use instance::TaskInstance;
pub use sched::{DefinitionError, Scheduler};
pub use store::memory::{MemoryStore, MetadataQuery};
pub use store::Store;
pub use trigger::Trigger;
