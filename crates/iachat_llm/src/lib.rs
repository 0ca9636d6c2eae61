pub mod canned;
pub mod model;
pub mod openai;

pub use canned::StaticChatModel;
pub use model::{ChatMessage, ChatModel, Completion, CompletionRequest, LlmError, Role};
pub use openai::OpenAiChatModel;
