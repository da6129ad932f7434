use crate::ai_types::{ArticleAnalysis, SummaryOptions};
use crate::error::Result;
use crate::records::{ApiConfig, Character, ChatMessage, CorpusEntry, Template, WorldSetting};
use async_trait::async_trait;

/// Receives `(delta, full_text)` for every streamed chunk, in arrival order.
pub type ChunkSink<'a> = &'a mut (dyn FnMut(&str, &str) + Send);

#[derive(Debug, Clone, Default)]
pub struct OutlineRequest {
  pub theme: String,
  pub keywords: String,
  pub template: Option<Template>,
}

#[derive(Debug, Clone, Default)]
pub struct ChapterRequest {
  pub title: String,
  pub outline: String,
  pub previous_content: String,
  pub template: Option<Template>,
  pub characters: Vec<Character>,
  pub world_settings: Vec<WorldSetting>,
}

#[derive(Debug, Clone, Default)]
pub struct GeneralContentRequest {
  pub keywords: String,
  pub template: Option<Template>,
  pub outline: String,
  pub word_limit: Option<u32>,
}

/// The remote text-generation capability a session drives.
#[async_trait]
pub trait GenerationApi: Send + Sync {
  async fn generate_outline(&self, req: &OutlineRequest) -> Result<String>;

  async fn generate_outline_stream(&self, req: &OutlineRequest, on_chunk: ChunkSink<'_>) -> Result<String>;

  async fn generate_chapter_content(&self, req: &ChapterRequest) -> Result<String>;

  async fn chat_with_ai(&self, message: &str, history: &[ChatMessage]) -> Result<String>;

  async fn generate_summary(&self, content: &str, options: &SummaryOptions) -> Result<String>;

  async fn get_writing_advice(&self, content: &str) -> Result<String>;

  async fn generate_personalized_content(&self, prompt: &str, corpus: &[CorpusEntry]) -> Result<String>;

  async fn generate_general_content(&self, req: &GeneralContentRequest) -> Result<String>;

  async fn generate_general_content_stream(
    &self,
    req: &GeneralContentRequest,
    on_chunk: ChunkSink<'_>,
  ) -> Result<String>;

  async fn generate_text_stream(&self, prompt: &str, on_chunk: Option<ChunkSink<'_>>) -> Result<String>;

  async fn analyze_article(&self, content: &str) -> Result<ArticleAnalysis>;

  async fn validate_api_key(&self) -> Result<bool>;

  fn update_config(&self, config: &ApiConfig);
}
