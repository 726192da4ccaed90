//! Build personal data assistants that keep structured records through
//! conversation.
//!
//! Docent wires a chat model to a schema-validated document store and a set of
//! tools for reading and writing it. Users talk to the assistant in plain
//! language; the assistant talks to the store (and to any connected external
//! tool providers) and reports back. Each session keeps its own transcript,
//! bound to the identity that opened it, with a sliding window so long
//! conversations stay within the model's context.
//!
//! # Quick Start
//!
//! ## A minimal assistant
//!
//! ```no_run
//! use docent::agent::Assistant;
//! use docent::gateway::{AnthropicConfig, AnthropicGateway};
//!
//! #[tokio::main]
//! async fn main() -> docent::Result<()> {
//!     let api_key = std::env::var("ANTHROPIC_API_KEY").unwrap_or_default();
//!     let gateway = AnthropicGateway::new(AnthropicConfig::new(
//!         api_key,
//!         "claude-3-5-sonnet-20241022",
//!     ));
//!
//!     let assistant = Assistant::builder().backend(gateway).build().await?;
//!
//!     let outcome = assistant
//!         .handle_message("kitchen-chat", "ann", "Remember that we are out of olive oil.")
//!         .await?;
//!     println!("{}", outcome.reply);
//!     Ok(())
//! }
//! ```
//!
//! ## Assembled from configuration
//!
//! A full deployment reads a config file, layers environment overrides on
//! top, and connects the providers it lists:
//!
//! ```no_run
//! use docent::agent::Assistant;
//! use docent::config::DocentConfig;
//! use docent::session::MemorySessionStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> docent::Result<()> {
//!     let config = DocentConfig::from_file("docent.toml")?.merge_with_env()?;
//!     config.validate()?;
//!
//!     let _log_guard = docent::logging::init_logging(&config.logging)?;
//!
//!     let mut builder = Assistant::builder()
//!         .backend_shared(config.gateway.build_backend()?)
//!         .window(config.conversation.window_config())
//!         .round_config(config.rounds.round_config())
//!         .session_store(Arc::new(MemorySessionStore::with_expiry(
//!             config.sessions.expiry_policy(),
//!         )));
//!     for provider in &config.providers {
//!         builder = builder.provider(provider.name.as_str(), provider.to_transport());
//!     }
//!     let assistant = builder.build().await?;
//!
//!     let outcome = assistant
//!         .handle_message("kitchen-chat", "ann", "What do we still need for dinner?")
//!         .await?;
//!     println!("{}", outcome.reply);
//!
//!     assistant.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture Overview
//!
//! - **[`agent::Assistant`]** - Front door: sessions, identity checks, and the
//!   round loop that alternates model calls with tool execution
//! - **[`gateway::ModelBackend`]** - Trait over chat model APIs, with
//!   Anthropic and Ollama implementations
//! - **[`registry::Registry`]** - Catalog of callable tools plus prompts and
//!   resources contributed by providers
//! - **[`store::DocumentStore`]** - In-memory collections with inferred
//!   schemas, validated inserts, and filtered queries
//! - **[`provider::ProviderClient`]** - JSON-RPC client for external tool
//!   servers over stdio or websocket
//!
//! # Module Organization
//!
//! - [`agent`] - Assistant surface and the per-message round loop
//! - [`config`] - File and environment configuration
//! - [`conversation`] - Sliding-window transcript truncation
//! - [`dispatch`] - Tool invocation with identity injection
//! - [`error`] - Crate-wide error type
//! - [`gateway`] - Model backends
//! - [`logging`] - Subscriber setup and credential masking
//! - [`provider`] - External tool provider client and transports
//! - [`registry`] - Tool, prompt, and resource catalog
//! - [`session`] - Session records, stores, and expiry policies
//! - [`store`] - Schema-validated document collections and their tools
//! - [`types`] - Turns, transcripts, and content blocks

pub mod agent;
pub mod config;
pub mod conversation;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod provider;
pub mod registry;
pub mod session;
pub mod store;
pub mod types;

pub use error::DocentError;
pub use types::*;

pub type Result<T> = std::result::Result<T, DocentError>;
