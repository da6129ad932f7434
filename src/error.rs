use std::io;
use std::path::Path;

use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
  #[error("API key is not configured")]
  NotConfigured,
  #[error("document is empty, write something first")]
  EmptyDocument,
  #[error("corpus is empty, add corpus entries first")]
  EmptyCorpus,
  #[error("corpus file has a bad format: {0}")]
  BadCorpusFormat(#[source] serde_json::Error),
  #[error("generation failed: {0}")]
  Api(String),
  #[error("http request failed: {0}")]
  Http(#[from] reqwest::Error),
  #[error("unexpected http status {status}: {body}")]
  HttpStatus { status: StatusCode, body: String },
  #[error("failed to parse json: {0}")]
  Json(#[from] serde_json::Error),
  #[error("io error at `{path}`: {source}")]
  Io {
    path: String,
    #[source]
    source: io::Error,
  },
  #[error("invalid lexicon: {0}")]
  Lexicon(#[from] toml::de::Error),
}

impl SessionError {
  pub fn io(path: &Path, source: io::Error) -> Self {
    SessionError::Io {
      path: path.display().to_string(),
      source,
    }
  }

  pub fn api(message: impl Into<String>) -> Self {
    SessionError::Api(message.into())
  }

  /// Precondition failures are raised before any state is touched.
  pub fn is_precondition(&self) -> bool {
    matches!(
      self,
      SessionError::NotConfigured | SessionError::EmptyDocument | SessionError::EmptyCorpus
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn precondition_errors_are_classified() {
    assert!(SessionError::NotConfigured.is_precondition());
    assert!(SessionError::EmptyDocument.is_precondition());
    assert!(SessionError::EmptyCorpus.is_precondition());
    assert!(!SessionError::api("boom").is_precondition());
  }

  #[test]
  fn io_error_carries_path() {
    let err = SessionError::io(Path::new("/tmp/corpus.json"), io::Error::from(io::ErrorKind::NotFound));
    assert!(err.to_string().contains("/tmp/corpus.json"));
  }
}
