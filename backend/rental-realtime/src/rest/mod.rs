//! REST collaborator: envelope types, the `ChatApi` contract and its HTTP client.

pub mod client;
pub mod http;
pub mod models;

pub use client::ChatApi;
pub use http::HttpChatApi;
pub use models::{ApiResponse, ChatMessageDto, ChatSessionDto};
