mod error;
mod keypool;
pub mod providers;
mod router;
mod types;

pub use error::LlmError;
pub use keypool::ShuffledKeyPool;
pub use router::{LlmRouter, RouterConfig, RouterMetrics};
pub use types::{
    ChatMessage, ChatRole, ContentPart, LlmResponse, ToolCall, ToolSchema, Usage,
};
