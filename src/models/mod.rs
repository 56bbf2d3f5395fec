//! Projection types for briefing sources.
//!
//! Every query result crossing a layer boundary is one of these explicit
//! projections with a fixed field set — raw heterogeneous store rows never
//! leave the storage module.

mod agent;
mod mark;
mod message;
mod note;
mod promotion;
mod task;

pub use agent::{AgentStatus, AgentSummary};
pub use mark::{Mark, MarkId, MarkStatus};
pub use message::{MessageStatus, MessageSummary};
pub use note::{ContextEntry, HIGH_VALUE_ENTRY_TYPES, WILDCARD_ADDRESSEE};
pub use promotion::PromotionCandidate;
pub use task::{TaskStatus, TaskSummary};
