pub mod chat_llm;
pub mod db;
pub mod vlm;

pub use chat_llm::OpenAiChatAdapter;
pub use db::DbAdapter;
pub use vlm::VlmParserAdapter;
