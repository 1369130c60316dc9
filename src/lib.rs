//! PromptGuard - reversible PII tokenization for chat prompts
//!
//! PromptGuard sits between a user and a chat application. Personal data
//! typed into the input box is replaced with placeholder tokens before it
//! is sent, and tokens that come back in rendered responses are restored
//! to their original values.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────── host page ────────────────────────────┐
//! │   input box          send control          rendered responses    │
//! └──────┬───────────────────▲───────────────────────┬───────▲───────┘
//!        │ text              │ trigger               │ events│ rewrite
//! ┌──────▼───────────────────┴──────────┐   ┌────────▼───────┴───────┐
//! │        Session Coordinator          │   │     Decode Watcher     │
//! │  Idle → Detecting → Masking → Send  │   │  mpsc events, reveal   │
//! └──────┬──────────────────────────────┘   └────────┬───────────────┘
//!        │                                           │
//! ┌──────▼─────────────┐  ┌──────────────────┐  ┌────▼───────────────┐
//! │   Masking Engine   │──│ Pattern Registry │──│  Unmasking Engine  │
//! └──────┬─────────────┘  └──────────────────┘  └────▲───────────────┘
//!        │ new tokens                                │ token map
//! ┌──────▼───────────────────────────────────────────┴───────────────┐
//! │                 Token Store (cache + persistence)                 │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`privacy`]: Pattern registry, token syntax, masking and unmasking
//! - [`store`]: Token store and persistence backends
//! - [`session`]: Session coordinator, decode watcher, host collaborators
//! - [`gateway`]: Local HTTP API
//! - [`config`]: Configuration management

pub mod config;
pub mod error;
pub mod gateway;
pub mod guard;
pub mod privacy;
pub mod session;
pub mod store;

pub use config::PromptGuardConfig;
pub use error::{Error, Result};
pub use guard::PromptGuard;
