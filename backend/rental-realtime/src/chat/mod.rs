//! Chat Session/Message Reconciler

pub mod models;
pub mod reconcile;
pub mod reconciler;

pub use models::{ChatMessage, ChatSession, MessageId, SessionStatus};
pub use reconcile::MergeOutcome;
pub use reconciler::ChatReconciler;
