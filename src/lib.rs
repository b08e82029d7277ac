#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod auth;
pub mod client;
pub mod config;
pub mod conversation;
pub mod error;
pub mod protocol;

pub use client::{AskResponse, GeminiClient};
pub use config::Config;
pub use conversation::{ConversationRegistry, ConversationState};
pub use error::{Error, Result};
