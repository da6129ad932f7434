use crate::analyzer::{char_len, reading_time, strip_markup};
use crate::records::{
  ApiConfig, ArticleStats, Chapter, Character, ChatMessage, CorpusEntry, Template, WorldSetting,
};
use std::sync::{Arc, Mutex, MutexGuard};

/// Operations that carry a busy flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
  Outline,
  Chapter,
  Chat,
  Generating,
  Summary,
  Advice,
}

impl Task {
  fn slot(self) -> usize {
    match self {
      Task::Outline => 0,
      Task::Chapter => 1,
      Task::Chat => 2,
      Task::Generating => 3,
      Task::Summary => 4,
      Task::Advice => 5,
    }
  }
}

/// In-flight counters; a flag reads true while at least one call of that
/// kind is running. Advisory only, nothing blocks on them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusyFlags {
  in_flight: [u32; 6],
}

impl BusyFlags {
  pub fn is_busy(&self, task: Task) -> bool {
    self.in_flight[task.slot()] > 0
  }

  pub fn any(&self) -> bool {
    self.in_flight.iter().any(|n| *n > 0)
  }

  fn enter(&mut self, task: Task) {
    self.in_flight[task.slot()] += 1;
  }

  fn leave(&mut self, task: Task) {
    let slot = &mut self.in_flight[task.slot()];
    *slot = slot.saturating_sub(1);
  }
}

#[derive(Debug, Clone, Default)]
pub struct SessionState {
  pub current_text: String,
  pub generated_content: String,
  pub outline: String,
  pub chapters: Vec<Chapter>,
  pub selected_chapter: Option<Chapter>,
  pub chat_history: Vec<ChatMessage>,
  pub chat_input: String,
  pub templates: Vec<Template>,
  pub selected_template: Option<Template>,
  pub keywords: String,
  pub corpus: Vec<CorpusEntry>,
  pub characters: Vec<Character>,
  pub world_settings: Vec<WorldSetting>,
  pub api_config: ApiConfig,
  pub api_key_valid: Option<bool>,
  pub article_summary: String,
  pub writing_advice: String,
  pub stats: ArticleStats,
  pub busy: BusyFlags,
  /// Bumped on every document mutation.
  pub revision: u64,
}

impl SessionState {
  pub fn is_configured(&self) -> bool {
    self.api_config.is_configured()
  }

  pub fn stripped_text(&self) -> String {
    strip_markup(&self.current_text)
  }

  pub fn word_count(&self) -> usize {
    char_len(&self.stripped_text())
  }

  pub fn reading_time(&self) -> usize {
    reading_time(self.word_count())
  }
}

pub(crate) type SharedState = Arc<Mutex<SessionState>>;

pub(crate) fn lock_state(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
  state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Holds a busy flag up for its lifetime. Dropping it, on any path, lowers
/// the flag again.
pub(crate) struct BusyGuard {
  state: SharedState,
  task: Task,
}

impl BusyGuard {
  pub(crate) fn enter(state: &SharedState, task: Task) -> Self {
    lock_state(state).busy.enter(task);
    Self {
      state: Arc::clone(state),
      task,
    }
  }
}

impl Drop for BusyGuard {
  fn drop(&mut self) {
    lock_state(&self.state).busy.leave(self.task);
  }
}
