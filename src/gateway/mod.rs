//! Local HTTP API for PromptGuard
//!
//! Lets host glue (a browser extension or any other client) mask and
//! unmask text and flip the protection toggles over HTTP.

mod handler;
mod server;

pub use handler::{guard_router, GuardState, MaskResponse, TokenStatsResponse, UnmaskResponse};
pub use server::{build_app, serve};
