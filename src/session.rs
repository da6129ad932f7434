//! The writing session: in-memory novel state plus the calls that fill it
//! from a `GenerationApi`.
//!
//! Every remote operation follows the same shape. Preconditions are checked
//! first and fail without touching state. Then the busy flag goes up, the
//! call runs, and the result lands in state. The flag comes down when the
//! guard drops, whichever way the call ended. The state lock is never held
//! across an `.await`.

use crate::ai_types::{ArticleAnalysis, SummaryOptions};
use crate::analyzer::{char_len, compute_stats};
use crate::api::{ChapterRequest, ChunkSink, GeneralContentRequest, GenerationApi, OutlineRequest};
use crate::error::{Result, SessionError};
use crate::lexicon::{default_lexicon, Lexicon};
use crate::outline::parse_outline;
use crate::records::{
  ApiConfig, ApiConfigPatch, ArticleStats, Chapter, Character, CharacterDraft, ChatMessage, CorpusEntry,
  Template, WorldSetting,
};
use crate::state::{lock_state, BusyGuard, SessionState, SharedState, Task};
use crate::storage::{data_file_path, ConfigStore};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Stripped length above which the remote analysis pass runs.
pub const AI_REFINE_MIN_CHARS: usize = 100;
pub const CHAT_FALLBACK_REPLY: &str = "抱歉，AI暂时无法回应，请稍后再试。";
pub const CORPUS_EXPORT_FILE: &str = "corpus.json";

const EMPTY_EDITOR_MARKUP: &str = "<p><br></p>";

#[derive(Clone)]
pub struct WritingSession {
  state: SharedState,
  api: Arc<dyn GenerationApi>,
  store: Arc<dyn ConfigStore>,
  lexicon: Arc<Lexicon>,
}

impl WritingSession {
  /// Builds a session and loads the saved API config once. A missing or
  /// unreadable blob leaves the defaults in place.
  pub fn new(api: Arc<dyn GenerationApi>, store: Arc<dyn ConfigStore>) -> Self {
    let mut state = SessionState::default();
    match store.load() {
      Ok(Some(config)) => {
        api.update_config(&config);
        state.api_config = config;
      }
      Ok(None) => {}
      Err(e) => tracing::error!(error = %e, "load api config failed"),
    }
    Self {
      state: Arc::new(Mutex::new(state)),
      api,
      store,
      lexicon: Arc::new(default_lexicon().clone()),
    }
  }

  pub fn with_lexicon(mut self, lexicon: Lexicon) -> Self {
    self.lexicon = Arc::new(lexicon);
    self
  }

  fn read<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
    f(&lock_state(&self.state))
  }

  fn write<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
    f(&mut lock_state(&self.state))
  }

  pub fn snapshot(&self) -> SessionState {
    self.read(|st| st.clone())
  }

  pub fn is_busy(&self, task: Task) -> bool {
    self.read(|st| st.busy.is_busy(task))
  }

  pub fn is_configured(&self) -> bool {
    self.read(|st| st.is_configured())
  }

  pub fn api_config(&self) -> ApiConfig {
    self.read(|st| st.api_config.clone())
  }

  pub fn api_key_valid(&self) -> Option<bool> {
    self.read(|st| st.api_key_valid)
  }

  pub fn current_text(&self) -> String {
    self.read(|st| st.current_text.clone())
  }

  pub fn word_count(&self) -> usize {
    self.read(|st| st.word_count())
  }

  pub fn reading_time(&self) -> usize {
    self.read(|st| st.reading_time())
  }

  pub fn stats(&self) -> ArticleStats {
    self.read(|st| st.stats.clone())
  }

  pub fn generated_content(&self) -> String {
    self.read(|st| st.generated_content.clone())
  }

  pub fn outline(&self) -> String {
    self.read(|st| st.outline.clone())
  }

  pub fn chapters(&self) -> Vec<Chapter> {
    self.read(|st| st.chapters.clone())
  }

  pub fn chat_history(&self) -> Vec<ChatMessage> {
    self.read(|st| st.chat_history.clone())
  }

  pub fn corpus(&self) -> Vec<CorpusEntry> {
    self.read(|st| st.corpus.clone())
  }

  pub fn characters(&self) -> Vec<Character> {
    self.read(|st| st.characters.clone())
  }

  pub fn world_settings(&self) -> Vec<WorldSetting> {
    self.read(|st| st.world_settings.clone())
  }

  pub fn article_summary(&self) -> String {
    self.read(|st| st.article_summary.clone())
  }

  pub fn writing_advice(&self) -> String {
    self.read(|st| st.writing_advice.clone())
  }

  // ---- document ----

  pub async fn set_current_text(&self, text: impl Into<String>) {
    let text = text.into();
    self.write(|st| st.current_text = text);
    self.refresh_stats().await;
  }

  /// Appends the scratch buffer to the document as a new paragraph.
  /// Does nothing while the buffer is empty.
  pub async fn append_generated(&self) {
    let appended = self.write(|st| {
      if st.generated_content.is_empty() {
        return false;
      }
      if st.current_text.is_empty() || st.current_text == EMPTY_EDITOR_MARKUP {
        st.current_text = format!("<p>{}</p>", st.generated_content);
      } else {
        st.current_text.push_str(&format!("{EMPTY_EDITOR_MARKUP}<p>{}</p>", st.generated_content));
      }
      true
    });
    if appended {
      self.refresh_stats().await;
    }
  }

  pub async fn clear_current_text(&self) {
    self.write(|st| st.current_text.clear());
    self.refresh_stats().await;
  }

  /// Local heuristic pass, then the remote pass when configured and the
  /// stripped text is long enough. Remote failures keep the local values.
  pub async fn refresh_stats(&self) {
    let (revision, stripped, configured) = self.write(|st| {
      st.revision += 1;
      let stripped = st.stripped_text();
      st.stats = compute_stats(&stripped, &self.lexicon);
      (st.revision, stripped, st.is_configured())
    });

    if configured && char_len(&stripped) > AI_REFINE_MIN_CHARS {
      self.refine_stats(revision, &stripped).await;
    }
  }

  async fn refine_stats(&self, revision: u64, stripped: &str) {
    match self.api.analyze_article(stripped).await {
      Ok(analysis) => self.write(|st| {
        if st.revision != revision {
          tracing::debug!(revision, current = st.revision, "dropping stale article analysis");
          return;
        }
        merge_analysis(&mut st.stats, analysis);
      }),
      Err(e) => tracing::warn!(error = %e, "article analysis failed, keeping local stats"),
    }
  }

  pub fn set_generated_content(&self, content: impl Into<String>) {
    let content = content.into();
    self.write(|st| st.generated_content = content);
  }

  // ---- outline & chapters ----

  pub fn set_outline(&self, outline: impl Into<String>) {
    let outline = outline.into();
    self.write(|st| st.outline = outline);
  }

  pub fn clear_outline(&self) {
    self.write(|st| {
      st.outline.clear();
      st.chapters.clear();
    });
  }

  /// Replaces the chapter list with a fresh parse of the outline.
  pub fn parse_outline_to_chapters(&self) -> Vec<Chapter> {
    self.write(|st| {
      st.chapters = parse_outline(&st.outline);
      st.chapters.clone()
    })
  }

  pub fn select_chapter(&self, chapter: Option<Chapter>) {
    self.write(|st| st.selected_chapter = chapter);
  }

  pub fn update_chapter_content(&self, chapter_id: u32, content: impl Into<String>) -> bool {
    let content = content.into();
    self.write(|st| match st.chapters.iter_mut().find(|c| c.id == chapter_id) {
      Some(chapter) => {
        chapter.content = content;
        true
      }
      None => false,
    })
  }

  pub fn set_chapter_generated(&self, chapter_id: u32, text: impl Into<String>) -> bool {
    let text = text.into();
    self.write(|st| set_chapter_generated_in(st, chapter_id, text))
  }

  // ---- chat ----

  pub fn add_chat_message(&self, content: impl Into<String>, is_user: bool) -> ChatMessage {
    let message = ChatMessage::new(content, is_user);
    self.write(|st| st.chat_history.push(message.clone()));
    message
  }

  pub fn set_chat_input(&self, input: impl Into<String>) {
    let input = input.into();
    self.write(|st| st.chat_input = input);
  }

  pub fn clear_chat_history(&self) {
    self.write(|st| st.chat_history.clear());
  }

  // ---- templates & keywords ----

  pub fn set_templates(&self, templates: Vec<Template>) {
    self.write(|st| st.templates = templates);
  }

  pub fn set_template(&self, template: Option<Template>) {
    self.write(|st| st.selected_template = template);
  }

  pub fn set_keywords(&self, keywords: impl Into<String>) {
    let keywords = keywords.into();
    self.write(|st| st.keywords = keywords);
  }

  pub fn set_article_summary(&self, summary: impl Into<String>) {
    let summary = summary.into();
    self.write(|st| st.article_summary = summary);
  }

  // ---- corpus ----

  pub fn add_corpus(&self, content: impl Into<String>) -> CorpusEntry {
    let entry = CorpusEntry::new(content);
    self.write(|st| st.corpus.push(entry.clone()));
    entry
  }

  pub fn remove_corpus(&self, id: &str) -> bool {
    self.write(|st| match st.corpus.iter().position(|e| e.id == id) {
      Some(idx) => {
        st.corpus.remove(idx);
        true
      }
      None => false,
    })
  }

  pub fn export_corpus(&self) -> Result<String> {
    let corpus = self.corpus();
    Ok(serde_json::to_string_pretty(&corpus)?)
  }

  /// Writes the corpus as `corpus.json` under `dir` and returns the path.
  pub fn export_corpus_to(&self, dir: &Path) -> Result<PathBuf> {
    let raw = self.export_corpus()?;
    let path = data_file_path(dir, CORPUS_EXPORT_FILE)?;
    std::fs::write(&path, raw).map_err(|e| SessionError::io(&path, e))?;
    Ok(path)
  }

  /// Replaces the corpus with the entries in a JSON export. A file that does
  /// not parse leaves the current corpus untouched.
  pub async fn import_corpus(&self, path: &Path) -> Result<Vec<CorpusEntry>> {
    let raw = tokio::fs::read_to_string(path)
      .await
      .map_err(|e| SessionError::io(path, e))?;
    let entries: Vec<CorpusEntry> = serde_json::from_str(&raw).map_err(SessionError::BadCorpusFormat)?;
    self.write(|st| st.corpus = entries.clone());
    Ok(entries)
  }

  /// Adds the whole text of a file as one corpus entry.
  pub async fn add_corpus_from_file(&self, path: &Path) -> Result<String> {
    let content = tokio::fs::read_to_string(path)
      .await
      .map_err(|e| SessionError::io(path, e))?;
    self.add_corpus(content.clone());
    Ok(content)
  }

  // ---- characters & world settings ----

  pub fn add_character(&self, draft: CharacterDraft) -> Character {
    let character = Character::from_draft(draft);
    self.write(|st| st.characters.push(character.clone()));
    character
  }

  pub fn remove_character(&self, id: &str) -> bool {
    self.write(|st| {
      let before = st.characters.len();
      st.characters.retain(|c| c.id != id);
      st.characters.len() != before
    })
  }

  pub fn add_world_setting(&self, fields: Map<String, Value>) -> WorldSetting {
    let setting = WorldSetting::new(fields);
    self.write(|st| st.world_settings.push(setting.clone()));
    setting
  }

  pub fn remove_world_setting(&self, id: &str) -> bool {
    self.write(|st| {
      let before = st.world_settings.len();
      st.world_settings.retain(|s| s.id != id);
      st.world_settings.len() != before
    })
  }

  pub fn update_world_setting(&self, id: &str, patch: Map<String, Value>) -> bool {
    self.write(|st| match st.world_settings.iter_mut().find(|s| s.id == id) {
      Some(setting) => {
        setting.merge(patch);
        true
      }
      None => false,
    })
  }

  // ---- api config ----

  /// Merges `patch` into the config, hands the result to the API client and
  /// persists it. Local state is updated even if persisting fails.
  pub fn update_api_config(&self, patch: ApiConfigPatch) -> Result<()> {
    let config = self.write(|st| {
      st.api_config.merge(patch);
      st.api_key_valid = None;
      st.api_config.clone()
    });
    self.api.update_config(&config);
    self.store.save(&config).map_err(|e| {
      tracing::error!(error = %e, "save api config failed");
      e
    })
  }

  /// Asks the remote side whether the key works. Errors count as invalid.
  /// The outcome is recorded separately and does not change `is_configured`.
  pub async fn validate_api_key(&self) -> bool {
    let valid = match self.api.validate_api_key().await {
      Ok(v) => v,
      Err(e) => {
        tracing::warn!(error = %e, "api key validation failed");
        false
      }
    };
    self.write(|st| st.api_key_valid = Some(valid));
    valid
  }

  fn ensure_configured(&self) -> Result<()> {
    if self.is_configured() {
      Ok(())
    } else {
      Err(SessionError::NotConfigured)
    }
  }

  fn ensure_document(&self) -> Result<()> {
    if self.read(|st| st.current_text.is_empty()) {
      return Err(SessionError::EmptyDocument);
    }
    Ok(())
  }

  fn outline_request(&self, theme: &str) -> OutlineRequest {
    self.read(|st| OutlineRequest {
      theme: theme.to_string(),
      keywords: st.keywords.clone(),
      template: st.selected_template.clone(),
    })
  }

  // ---- generation ----

  pub async fn generate_outline(&self, theme: &str) -> Result<String> {
    self.ensure_configured()?;
    let req = self.outline_request(theme);
    let _busy = BusyGuard::enter(&self.state, Task::Outline);

    let outline = self.api.generate_outline(&req).await.map_err(|e| {
      tracing::error!(error = %e, "generate outline failed");
      e
    })?;
    self.write(|st| {
      st.outline = outline.clone();
      st.chapters = parse_outline(&st.outline);
    });
    Ok(outline)
  }

  /// Streams an outline. The stored outline always holds the full text
  /// received so far; chapters are parsed once the stream completes.
  pub async fn generate_outline_stream(&self, theme: &str, on_chunk: Option<ChunkSink<'_>>) -> Result<String> {
    self.ensure_configured()?;
    let req = self.outline_request(theme);
    let _busy = BusyGuard::enter(&self.state, Task::Outline);
    self.write(|st| st.outline.clear());

    let state = Arc::clone(&self.state);
    let mut forward = on_chunk;
    let mut sink = move |delta: &str, full: &str| {
      lock_state(&state).outline = full.to_string();
      if let Some(f) = forward.as_mut() {
        f(delta, full);
      }
    };
    let outline = self.api.generate_outline_stream(&req, &mut sink).await.map_err(|e| {
      tracing::error!(error = %e, "stream outline failed");
      e
    })?;
    self.parse_outline_to_chapters();
    Ok(outline)
  }

  /// Writes one chapter from its outline entry. The text goes to the chapter
  /// record and to the scratch buffer.
  pub async fn generate_chapter(&self, chapter: &Chapter) -> Result<String> {
    self.ensure_configured()?;
    let req = self.read(|st| ChapterRequest {
      title: chapter.title.clone(),
      outline: chapter.content.clone(),
      previous_content: st.stripped_text(),
      template: st.selected_template.clone(),
      characters: st.characters.clone(),
      world_settings: st.world_settings.clone(),
    });
    let _busy = BusyGuard::enter(&self.state, Task::Chapter);

    let text = self.api.generate_chapter_content(&req).await.map_err(|e| {
      tracing::error!(error = %e, chapter = chapter.id, "generate chapter failed");
      e
    })?;
    self.write(|st| {
      set_chapter_generated_in(st, chapter.id, text.clone());
      st.generated_content = text.clone();
    });
    Ok(text)
  }

  /// Sends `message` with the current history and appends the reply. On
  /// failure a fallback reply is appended before the error is returned.
  pub async fn send_chat_message(&self, message: &str) -> Result<String> {
    self.ensure_configured()?;
    let history = self.chat_history();
    let _busy = BusyGuard::enter(&self.state, Task::Chat);

    match self.api.chat_with_ai(message, &history).await {
      Ok(reply) => {
        self.add_chat_message(reply.clone(), false);
        Ok(reply)
      }
      Err(e) => {
        tracing::error!(error = %e, "chat failed");
        self.add_chat_message(CHAT_FALLBACK_REPLY, false);
        Err(e)
      }
    }
  }

  pub async fn generate_summary(&self, options: &SummaryOptions) -> Result<String> {
    self.ensure_configured()?;
    self.ensure_document()?;
    let content = self.read(|st| st.stripped_text());
    let _busy = BusyGuard::enter(&self.state, Task::Summary);

    let summary = self.api.generate_summary(&content, options).await.map_err(|e| {
      tracing::error!(error = %e, "generate summary failed");
      e
    })?;
    self.write(|st| st.article_summary = summary.clone());
    Ok(summary)
  }

  pub async fn get_writing_advice(&self) -> Result<String> {
    self.ensure_configured()?;
    self.ensure_document()?;
    let content = self.read(|st| st.stripped_text());
    let _busy = BusyGuard::enter(&self.state, Task::Advice);

    let advice = self.api.get_writing_advice(&content).await.map_err(|e| {
      tracing::error!(error = %e, "get writing advice failed");
      e
    })?;
    self.write(|st| st.writing_advice = advice.clone());
    Ok(advice)
  }

  /// Generates text in the voice of the corpus samples.
  pub async fn generate_personalized_content(&self, prompt: &str) -> Result<String> {
    self.ensure_configured()?;
    let corpus = self.corpus();
    if corpus.is_empty() {
      return Err(SessionError::EmptyCorpus);
    }
    let _busy = BusyGuard::enter(&self.state, Task::Generating);

    let text = self
      .api
      .generate_personalized_content(prompt, &corpus)
      .await
      .map_err(|e| {
        tracing::error!(error = %e, "generate personalized content failed");
        e
      })?;
    self.write(|st| st.generated_content = text.clone());
    Ok(text)
  }

  pub async fn generate_general_content(&self, req: &GeneralContentRequest) -> Result<String> {
    self.ensure_configured()?;
    let _busy = BusyGuard::enter(&self.state, Task::Generating);

    let text = self.api.generate_general_content(req).await.map_err(|e| {
      tracing::error!(error = %e, "generate content failed");
      e
    })?;
    self.write(|st| st.generated_content = text.clone());
    Ok(text)
  }

  /// Streams general content into the scratch buffer, which is cleared
  /// first and then holds the full text received so far.
  pub async fn generate_general_content_stream(
    &self,
    req: &GeneralContentRequest,
    on_chunk: Option<ChunkSink<'_>>,
  ) -> Result<String> {
    self.ensure_configured()?;
    let _busy = BusyGuard::enter(&self.state, Task::Generating);
    self.write(|st| st.generated_content.clear());

    let state = Arc::clone(&self.state);
    let mut forward = on_chunk;
    let mut sink = move |delta: &str, full: &str| {
      lock_state(&state).generated_content = full.to_string();
      tracing::trace!(chars = delta.chars().count(), "content chunk");
      if let Some(f) = forward.as_mut() {
        f(delta, full);
      }
    };
    let text = self
      .api
      .generate_general_content_stream(req, &mut sink)
      .await
      .map_err(|e| {
        tracing::error!(error = %e, "stream content failed");
        e
      })?;
    tracing::debug!(chars = text.chars().count(), "content stream finished");
    Ok(text)
  }

  /// Free-form generation that leaves session buffers alone; the caller
  /// gets the chunks and the final text.
  pub async fn generate_text(&self, prompt: &str, on_chunk: Option<ChunkSink<'_>>) -> Result<String> {
    self.ensure_configured()?;
    let _busy = BusyGuard::enter(&self.state, Task::Generating);

    self.api.generate_text_stream(prompt, on_chunk).await.map_err(|e| {
      tracing::error!(error = %e, "generate text failed");
      e
    })
  }
}

fn set_chapter_generated_in(st: &mut SessionState, chapter_id: u32, text: String) -> bool {
  match st.chapters.iter_mut().find(|c| c.id == chapter_id) {
    Some(chapter) => {
      chapter.generated_text = text;
      chapter.is_completed = true;
      true
    }
    None => false,
  }
}

/// Remote values win where present; empty strings and a zero score count as
/// absent.
fn merge_analysis(stats: &mut ArticleStats, analysis: ArticleAnalysis) {
  if let Some(sentiment) = analysis.sentiment.filter(|s| !s.trim().is_empty()) {
    stats.sentiment = sentiment;
  }
  if let Some(tags) = analysis.tags {
    stats.tags = tags;
  }
  if let Some(category) = analysis.category.filter(|s| !s.trim().is_empty()) {
    stats.category = category;
  }
  if let Some(score) = analysis.score.filter(|s| *s > 0) {
    stats.score = score;
  }
  stats.ai_analysis = Some(analysis.raw);
}
