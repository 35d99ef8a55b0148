pub mod completion;
pub mod error;
pub mod prompts;
pub mod report;
pub mod retrieval;
pub mod sse;
pub mod storage;
pub mod transcript;

// Re-export commonly used types
pub use completion::{CompletionBackend, CompletionClient, PromptRequest, ResponseFormat};
pub use error::{ComplianceError, Result};
pub use report::{ANNEX_TOPICS, Report, ReportStatus, RiskAssessment, RiskLevel};
pub use retrieval::{GuidanceSource, WeaviateRetriever};
pub use sse::{DeltaDecoder, delta_stream};
pub use storage::{InMemorySessionStore, SessionStore};
pub use transcript::{ConversationData, TranscriptMessage, WebhookPayload, flatten_transcript};
