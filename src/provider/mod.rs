//! Connectivity to external capability providers.
//!
//! A provider is a separate process or service that advertises tools,
//! prompts, and resources over JSON-RPC. This module holds the wire types,
//! the stdio and WebSocket transports, the request/response client, and the
//! adapter that surfaces provider tools through the registry.

pub mod adapter;
pub mod client;
pub mod error;
pub mod transport;
pub mod types;

pub use adapter::{
    register_provider_prompts, register_provider_resources, register_provider_tools, ProviderTool,
};
pub use client::{ProviderClient, ProviderClientConfig, ProviderSession};
pub use error::ProviderError;
pub use transport::{
    create_test_channels, StdioConfig, StdioTransport, Transport, TransportChannels,
    TransportFactory, WebSocketTransport,
};
pub use types::{
    CallToolResult, Content, GetPromptResult, InitializeResult, PromptInfo, PromptMessage,
    ReadResourceResult, ResourceContent, ResourceInfo, ServerCapabilities, ToolInfo,
};
