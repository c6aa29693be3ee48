//! LLM provider seam
//!
//! The orchestration core never performs a network call itself; it consumes
//! an injected [`provider::LLMProvider`] for summarization and LLM-assisted
//! classification.

pub mod provider;

pub use provider::{
    FinishReason, LLMError, LLMProvider, LLMRequest, LLMResponse, Message, MessageRole, ToolCall,
    ToolDefinition, Usage,
};
