//! Token persistence
//!
//! A [`TokenStore`] owns every token → value pair, caching them in memory
//! and merging them into a [`Persistence`] backend under one key.

mod persistence;
mod token_store;

pub use persistence::{FilePersistence, MemoryPersistence, Persistence};
pub use token_store::TokenStore;
