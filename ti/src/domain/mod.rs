//! Domain types for the task index

mod id;
mod priority;
mod task;

pub use id::{slugify, task_id};
pub use priority::Priority;
pub use task::{
    DateField, HeaderMeta, TaskId, TaskKind, TaskMeta, TaskPosition, TaskPriority, TaskRecord, TaskStatus,
};
