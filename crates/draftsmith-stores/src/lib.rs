//! draftsmith-stores - storage and notification implementations
//!
//! - `task_store`: in-memory TaskStore with the atomic claim
//! - `notifier`: broadcast-based TaskNotifier (push hint; the runtime's
//!   catch-up scan provides the correctness backstop)

mod notifier;
mod task_store;

pub use notifier::{BroadcastNotifier, TaskEvent, TaskEventKind, TaskNotifier};
pub use task_store::InMemoryTaskStore;
