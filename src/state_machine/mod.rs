mod process;
mod transition;

pub use process::{
    ActionType, AuditEntry, DocumentKind, DocumentRef, LinkState, LinkedDocument, Position,
    ProcessId, ProcessInstance, ProcessView,
};
pub use transition::{Action, Replayed, Transition, TransitionEngine};
