//! Writing-session core for Novel-IDE.
//!
//! [`WritingSession`] owns the in-memory state of one writing session: the
//! document, outline and chapters, chat history, corpus, characters, world
//! settings and API configuration. It drives a [`GenerationApi`] for every
//! AI-backed operation and keeps per-operation busy flags while calls run.
//! [`OpenAiClient`] is the production implementation against an
//! OpenAI-compatible chat completions endpoint.

pub mod ai_types;
pub mod analyzer;
pub mod api;
pub mod error;
pub mod lexicon;
pub mod logging;
pub mod openai;
pub mod outline;
pub mod prompt_config;
pub mod records;
pub mod session;
pub mod state;
pub mod storage;

#[cfg(test)]
mod testing;

pub use api::{ChapterRequest, ChunkSink, GeneralContentRequest, GenerationApi, OutlineRequest};
pub use error::{Result, SessionError};
pub use openai::OpenAiClient;
pub use records::{
  ApiConfig, ApiConfigPatch, ArticleStats, Chapter, Character, CharacterDraft, ChatMessage, CorpusEntry,
  Template, WorldSetting,
};
pub use session::WritingSession;
pub use state::{SessionState, Task};
pub use storage::{ConfigStore, JsonFileStore, MemoryStore};
