//! Session coordination against the host page
//!
//! - [`SessionCoordinator`]: mask-then-submit and in-place encrypt cycles
//! - [`DecodeWatcher`]: decodes tokens in rendered responses
//! - Collaborator traits standing in for the host's input box, send
//!   control and response tree

mod apply;
mod collaborators;
mod coordinator;
mod decoder;
mod scheduler;
mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use apply::{force_apply, restore_text, ApplyReport};
pub use collaborators::{
    set_text, ChangeNotification, HostPage, InputElement, InputKind, NodeId, RenderSurface,
    SubmitControl,
};
pub use coordinator::{CycleOutcome, SessionCoordinator};
pub use decoder::{DecodeWatcher, NodeOutcome, Origin, RenderEvent};
pub use scheduler::{InstantScheduler, Scheduler, TokioScheduler};
pub use state::{
    CyclePhase, ProtectionSettings, ProtectionState, SessionContext, SessionGuard, SessionLock,
};
