//! Scripted `GenerationApi` for unit tests.

use crate::ai_types::{ArticleAnalysis, SummaryOptions};
use crate::api::{ChapterRequest, ChunkSink, GeneralContentRequest, GenerationApi, OutlineRequest};
use crate::error::{Result, SessionError};
use crate::records::{ApiConfig, ChatMessage, CorpusEntry};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

type Probe = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub struct FakeApi {
  pub fail: AtomicBool,
  pub key_valid: AtomicBool,
  pub reply: Mutex<String>,
  pub chunks: Mutex<Vec<String>>,
  pub analysis: Mutex<Option<ArticleAnalysis>>,
  pub calls: Mutex<Vec<String>>,
  pub chapter_requests: Mutex<Vec<ChapterRequest>>,
  pub analyzed: Mutex<Vec<String>>,
  pub config_updates: Mutex<Vec<ApiConfig>>,
  probe: Mutex<Option<Probe>>,
}

impl FakeApi {
  pub fn replying(reply: &str) -> Self {
    let api = Self::default();
    *api.reply.lock().unwrap() = reply.to_string();
    api
  }

  pub fn failing() -> Self {
    let api = Self::default();
    api.fail.store(true, Ordering::SeqCst);
    api
  }

  pub fn with_chunks(self, chunks: &[&str]) -> Self {
    *self.chunks.lock().unwrap() = chunks.iter().map(|c| c.to_string()).collect();
    self
  }

  pub fn with_analysis(self, analysis: ArticleAnalysis) -> Self {
    *self.analysis.lock().unwrap() = Some(analysis);
    self
  }

  /// Runs `probe` in the middle of every call, before it settles.
  pub fn set_probe(&self, probe: impl Fn() + Send + Sync + 'static) {
    *self.probe.lock().unwrap() = Some(Box::new(probe));
  }

  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }

  fn settle(&self, op: &str) -> Result<String> {
    self.calls.lock().unwrap().push(op.to_string());
    if let Some(probe) = self.probe.lock().unwrap().as_ref() {
      probe();
    }
    if self.fail.load(Ordering::SeqCst) {
      return Err(SessionError::api(format!("{op} failed")));
    }
    Ok(self.reply.lock().unwrap().clone())
  }

  fn stream(&self, op: &str, mut on_chunk: Option<ChunkSink<'_>>) -> Result<String> {
    self.calls.lock().unwrap().push(op.to_string());
    let chunks = self.chunks.lock().unwrap().clone();
    let mut full = String::new();
    for chunk in chunks {
      full.push_str(&chunk);
      if let Some(sink) = on_chunk.as_mut() {
        sink(&chunk, &full);
      }
      if let Some(probe) = self.probe.lock().unwrap().as_ref() {
        probe();
      }
    }
    if self.fail.load(Ordering::SeqCst) {
      return Err(SessionError::api(format!("{op} failed")));
    }
    Ok(full)
  }
}

#[async_trait]
impl GenerationApi for FakeApi {
  async fn generate_outline(&self, _req: &OutlineRequest) -> Result<String> {
    self.settle("outline")
  }

  async fn generate_outline_stream(&self, _req: &OutlineRequest, on_chunk: ChunkSink<'_>) -> Result<String> {
    self.stream("outline_stream", Some(on_chunk))
  }

  async fn generate_chapter_content(&self, req: &ChapterRequest) -> Result<String> {
    self.chapter_requests.lock().unwrap().push(req.clone());
    self.settle("chapter")
  }

  async fn chat_with_ai(&self, _message: &str, _history: &[ChatMessage]) -> Result<String> {
    self.settle("chat")
  }

  async fn generate_summary(&self, _content: &str, _options: &SummaryOptions) -> Result<String> {
    self.settle("summary")
  }

  async fn get_writing_advice(&self, _content: &str) -> Result<String> {
    self.settle("advice")
  }

  async fn generate_personalized_content(&self, _prompt: &str, _corpus: &[CorpusEntry]) -> Result<String> {
    self.settle("personalized")
  }

  async fn generate_general_content(&self, _req: &GeneralContentRequest) -> Result<String> {
    self.settle("general")
  }

  async fn generate_general_content_stream(
    &self,
    _req: &GeneralContentRequest,
    on_chunk: ChunkSink<'_>,
  ) -> Result<String> {
    self.stream("general_stream", Some(on_chunk))
  }

  async fn generate_text_stream(&self, _prompt: &str, on_chunk: Option<ChunkSink<'_>>) -> Result<String> {
    self.stream("text_stream", on_chunk)
  }

  async fn analyze_article(&self, content: &str) -> Result<ArticleAnalysis> {
    self.calls.lock().unwrap().push("analyze".to_string());
    self.analyzed.lock().unwrap().push(content.to_string());
    if let Some(probe) = self.probe.lock().unwrap().as_ref() {
      probe();
    }
    self
      .analysis
      .lock()
      .unwrap()
      .clone()
      .ok_or_else(|| SessionError::api("analysis unavailable"))
  }

  async fn validate_api_key(&self) -> Result<bool> {
    self.calls.lock().unwrap().push("validate".to_string());
    if self.fail.load(Ordering::SeqCst) {
      return Err(SessionError::api("validate failed"));
    }
    Ok(self.key_valid.load(Ordering::SeqCst))
  }

  fn update_config(&self, config: &ApiConfig) {
    self.config_updates.lock().unwrap().push(config.clone());
  }
}
