//! `completion` crate — the contract between the workflow engine and the chat
//! client that actually talks to a model.
//!
//! The engine only ever sees a [`CompletionClient`] trait object; transport,
//! retries and key rotation live behind it.

pub mod error;
pub mod traits;
pub mod mock;

pub use error::CompletionError;
pub use traits::{CompletionClient, Message, Model, Role};
