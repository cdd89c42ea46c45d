pub mod ai;
pub mod config;
pub mod error;
pub mod gateway;
pub mod media;
pub mod mode;
pub mod state;
pub mod store;

// Re-export main types for convenience
pub use ai::GeminiClient;
pub use config::Config;
pub use error::{ChatError, Result, SubmitRejected};
pub use gateway::{GeminiGateway, GeneratedImage, GenerationGateway, ImageOutcome};
pub use media::PendingImage;
pub use mode::Mode;
pub use state::{Message, MessageId, Part, Role};
pub use store::{ConversationStore, PendingTurn, TurnReply};
