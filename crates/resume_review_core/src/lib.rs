pub mod domain;
pub mod ports;
pub mod prompt;

pub use domain::{
    ChatRole, ChatSummary, ChatTurn, Document, DocumentStatus, ParseJobStatus, PromptMessage,
    PromptRole, User, UserCredentials,
};
pub use ports::{
    ChatCompletionService, DatabaseService, DocumentParserService, PortError, PortResult,
};
