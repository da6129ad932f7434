//! `GenerationApi` over an OpenAI-compatible `/chat/completions` endpoint.

use crate::ai_types::{ArticleAnalysis, PromptMessage, SummaryOptions};
use crate::api::{ChapterRequest, ChunkSink, GeneralContentRequest, GenerationApi, OutlineRequest};
use crate::error::{Result, SessionError};
use crate::prompt_config::{prompts, render};
use crate::records::{ApiConfig, Character, ChatMessage, CorpusEntry, Template, WorldSetting};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::RwLock;

const CORPUS_SAMPLE_MAX_CHARS: usize = 2000;

pub struct OpenAiClient {
  http: reqwest::Client,
  config: RwLock<ApiConfig>,
}

impl OpenAiClient {
  pub fn new(config: ApiConfig) -> Self {
    Self {
      http: reqwest::Client::new(),
      config: RwLock::new(config),
    }
  }

  pub fn config(&self) -> ApiConfig {
    match self.config.read() {
      Ok(guard) => guard.clone(),
      Err(poisoned) => poisoned.into_inner().clone(),
    }
  }

  fn configured(&self) -> Result<ApiConfig> {
    let cfg = self.config();
    if cfg.api_key.trim().is_empty() {
      return Err(SessionError::NotConfigured);
    }
    Ok(cfg)
  }

  async fn complete(&self, messages: Vec<PromptMessage>) -> Result<String> {
    let cfg = self.configured()?;
    let resp = self
      .http
      .post(completions_url(&cfg))
      .bearer_auth(cfg.api_key.trim())
      .json(&request_body(&cfg, &messages, false))
      .send()
      .await?;
    let status = resp.status();
    if !status.is_success() {
      let body = resp.text().await?;
      return Err(SessionError::HttpStatus { status, body });
    }
    let value: serde_json::Value = resp.json().await?;
    value["choices"][0]["message"]["content"]
      .as_str()
      .map(|s| s.to_string())
      .ok_or_else(|| SessionError::api("missing choices[0].message.content"))
  }

  async fn complete_stream(
    &self,
    messages: Vec<PromptMessage>,
    mut on_chunk: Option<ChunkSink<'_>>,
  ) -> Result<String> {
    let cfg = self.configured()?;
    let resp = self
      .http
      .post(completions_url(&cfg))
      .bearer_auth(cfg.api_key.trim())
      .json(&request_body(&cfg, &messages, true))
      .send()
      .await?;
    let status = resp.status();
    if !status.is_success() {
      let body = resp.text().await?;
      return Err(SessionError::HttpStatus { status, body });
    }

    let mut decoder = SseDecoder::default();
    let mut full_text = String::new();
    let mut body_stream = resp.bytes_stream();
    while let Some(item) = body_stream.next().await {
      let bytes = item?;
      for delta in decoder.push(&bytes) {
        full_text.push_str(&delta);
        if let Some(sink) = on_chunk.as_mut() {
          sink(&delta, &full_text);
        }
      }
    }
    for delta in decoder.finish() {
      full_text.push_str(&delta);
      if let Some(sink) = on_chunk.as_mut() {
        sink(&delta, &full_text);
      }
    }
    tracing::debug!(chars = full_text.chars().count(), "stream finished");
    Ok(full_text)
  }
}

fn completions_url(cfg: &ApiConfig) -> String {
  format!("{}/chat/completions", cfg.base_url.trim_end_matches('/'))
}

fn request_body(cfg: &ApiConfig, messages: &[PromptMessage], stream: bool) -> serde_json::Value {
  let mut body = serde_json::json!({
    "model": cfg.selected_model,
    "messages": messages,
    "temperature": cfg.temperature,
    "stream": stream
  });
  if let Some(max_tokens) = cfg.max_tokens {
    body["max_tokens"] = serde_json::json!(max_tokens);
  }
  body
}

fn sse_take_line(buffer: &mut Vec<u8>) -> Option<String> {
  let pos = buffer.iter().position(|b| *b == b'\n')?;
  let line_bytes: Vec<u8> = buffer.drain(..=pos).collect();
  let mut line = String::from_utf8_lossy(&line_bytes[..pos]).into_owned();
  if line.ends_with('\r') {
    line.pop();
  }
  Some(line)
}

/// Content delta carried by one SSE line. Malformed `data:` payloads are
/// logged and skipped.
fn sse_delta(line: &str) -> Option<String> {
  let data = line.strip_prefix("data:")?.trim();
  if data.is_empty() || data == "[DONE]" {
    return None;
  }
  let value: serde_json::Value = match serde_json::from_str(data) {
    Ok(v) => v,
    Err(e) => {
      tracing::warn!(error = %e, line = %clamp_text(data, 200), "skipping malformed stream line");
      return None;
    }
  };
  value["choices"][0]["delta"]["content"]
    .as_str()
    .filter(|s| !s.is_empty())
    .map(|s| s.to_string())
}

/// Incremental `text/event-stream` reader yielding content deltas. Bytes are
/// buffered until a full line arrives so multi-byte chars split across
/// network chunks decode intact.
#[derive(Debug, Default)]
struct SseDecoder {
  buffer: Vec<u8>,
}

impl SseDecoder {
  fn push(&mut self, bytes: &[u8]) -> Vec<String> {
    self.buffer.extend_from_slice(bytes);
    let mut out = Vec::new();
    while let Some(line) = sse_take_line(&mut self.buffer) {
      out.extend(sse_delta(&line));
    }
    out
  }

  fn finish(&mut self) -> Vec<String> {
    let rest = std::mem::take(&mut self.buffer);
    let rest = String::from_utf8_lossy(&rest);
    sse_delta(rest.trim()).into_iter().collect()
  }
}

fn extract_json_block(raw: &str) -> Option<&str> {
  let start = raw.find('{')?;
  let end = raw.rfind('}')?;
  if end <= start {
    return None;
  }
  Some(&raw[start..=end])
}

fn clamp_text(text: &str, max_chars: usize) -> String {
  let mut out = String::new();
  for (idx, ch) in text.chars().enumerate() {
    if idx >= max_chars {
      out.push_str("...");
      break;
    }
    out.push(ch);
  }
  out
}

fn template_name(template: &Option<Template>) -> String {
  template
    .as_ref()
    .map(|t| {
      if t.description.is_empty() {
        t.name.clone()
      } else {
        format!("{}（{}）", t.name, t.description)
      }
    })
    .unwrap_or_else(|| "无".to_string())
}

fn describe_fields(fields: &serde_json::Map<String, serde_json::Value>) -> String {
  fields
    .iter()
    .filter_map(|(k, v)| match v {
      serde_json::Value::String(s) if !s.trim().is_empty() => Some(format!("{k}: {}", s.trim())),
      serde_json::Value::Number(n) => Some(format!("{k}: {n}")),
      _ => None,
    })
    .collect::<Vec<_>>()
    .join("；")
}

fn describe_characters(characters: &[Character]) -> String {
  if characters.is_empty() {
    return "无".to_string();
  }
  characters
    .iter()
    .map(|c| {
      let mut line = format!("- {}", describe_fields(&c.fields));
      if !c.traits.is_empty() {
        line.push_str(&format!("；性格: {}", c.traits.join("、")));
      }
      line
    })
    .collect::<Vec<_>>()
    .join("\n")
}

fn describe_world_settings(settings: &[WorldSetting]) -> String {
  if settings.is_empty() {
    return "无".to_string();
  }
  settings
    .iter()
    .map(|s| format!("- {}", describe_fields(&s.fields)))
    .collect::<Vec<_>>()
    .join("\n")
}

fn with_system(prompt: String) -> Vec<PromptMessage> {
  vec![PromptMessage::system(prompts().system.as_str()), PromptMessage::user(prompt)]
}

fn outline_messages(req: &OutlineRequest) -> Vec<PromptMessage> {
  let template = template_name(&req.template);
  with_system(render(
    &prompts().outline,
    &[("theme", req.theme.as_str()), ("keywords", req.keywords.as_str()), ("template", template.as_str())],
  ))
}

fn chapter_messages(req: &ChapterRequest) -> Vec<PromptMessage> {
  let template = template_name(&req.template);
  let characters = describe_characters(&req.characters);
  let world = describe_world_settings(&req.world_settings);
  let previous = if req.previous_content.trim().is_empty() {
    "无".to_string()
  } else {
    req.previous_content.clone()
  };
  with_system(render(
    &prompts().chapter,
    &[
      ("title", req.title.as_str()),
      ("outline", req.outline.as_str()),
      ("template", template.as_str()),
      ("characters", characters.as_str()),
      ("world_settings", world.as_str()),
      ("previous", previous.as_str()),
    ],
  ))
}

fn chat_messages(message: &str, history: &[ChatMessage]) -> Vec<PromptMessage> {
  let mut out = vec![PromptMessage::system(prompts().system.as_str())];
  out.extend(history.iter().map(|m| {
    if m.is_user {
      PromptMessage::user(m.content.as_str())
    } else {
      PromptMessage::assistant(m.content.as_str())
    }
  }));
  let already_sent = history.last().is_some_and(|m| m.is_user && m.content == message);
  if !already_sent {
    out.push(PromptMessage::user(message));
  }
  out
}

fn summary_messages(content: &str, options: &SummaryOptions) -> Vec<PromptMessage> {
  let mut extra = String::new();
  if let Some(max) = options.max_length {
    extra.push_str(&format!("摘要不超过{max}字。"));
  }
  if let Some(style) = options.style.as_deref().filter(|s| !s.trim().is_empty()) {
    extra.push_str(&format!("风格：{}。", style.trim()));
  }
  with_system(render(&prompts().summary, &[("options", extra.as_str()), ("content", content)]))
}

fn personalized_messages(prompt: &str, corpus: &[CorpusEntry]) -> Vec<PromptMessage> {
  let samples = corpus
    .iter()
    .enumerate()
    .map(|(idx, e)| format!("【样本{}】\n{}", idx + 1, clamp_text(e.content.trim(), CORPUS_SAMPLE_MAX_CHARS)))
    .collect::<Vec<_>>()
    .join("\n\n");
  with_system(render(&prompts().personalized, &[("corpus", samples.as_str()), ("prompt", prompt)]))
}

fn general_messages(req: &GeneralContentRequest) -> Vec<PromptMessage> {
  let template = template_name(&req.template);
  let word_limit = req
    .word_limit
    .map(|n| format!("约{n}字"))
    .unwrap_or_else(|| "不限".to_string());
  with_system(render(
    &prompts().general,
    &[
      ("keywords", req.keywords.as_str()),
      ("template", template.as_str()),
      ("outline", req.outline.as_str()),
      ("word_limit", word_limit.as_str()),
    ],
  ))
}

fn parse_analysis(raw: &str) -> Result<ArticleAnalysis> {
  let json = extract_json_block(raw).ok_or_else(|| SessionError::api("analysis reply has no json object"))?;
  let value: serde_json::Value = serde_json::from_str(json)?;
  Ok(ArticleAnalysis::from_value(value))
}

#[async_trait]
impl GenerationApi for OpenAiClient {
  async fn generate_outline(&self, req: &OutlineRequest) -> Result<String> {
    self.complete(outline_messages(req)).await
  }

  async fn generate_outline_stream(&self, req: &OutlineRequest, on_chunk: ChunkSink<'_>) -> Result<String> {
    self.complete_stream(outline_messages(req), Some(on_chunk)).await
  }

  async fn generate_chapter_content(&self, req: &ChapterRequest) -> Result<String> {
    self.complete(chapter_messages(req)).await
  }

  async fn chat_with_ai(&self, message: &str, history: &[ChatMessage]) -> Result<String> {
    self.complete(chat_messages(message, history)).await
  }

  async fn generate_summary(&self, content: &str, options: &SummaryOptions) -> Result<String> {
    self.complete(summary_messages(content, options)).await
  }

  async fn get_writing_advice(&self, content: &str) -> Result<String> {
    self
      .complete(with_system(render(&prompts().advice, &[("content", content)])))
      .await
  }

  async fn generate_personalized_content(&self, prompt: &str, corpus: &[CorpusEntry]) -> Result<String> {
    self.complete(personalized_messages(prompt, corpus)).await
  }

  async fn generate_general_content(&self, req: &GeneralContentRequest) -> Result<String> {
    self.complete(general_messages(req)).await
  }

  async fn generate_general_content_stream(
    &self,
    req: &GeneralContentRequest,
    on_chunk: ChunkSink<'_>,
  ) -> Result<String> {
    self.complete_stream(general_messages(req), Some(on_chunk)).await
  }

  async fn generate_text_stream(&self, prompt: &str, on_chunk: Option<ChunkSink<'_>>) -> Result<String> {
    self.complete_stream(with_system(prompt.to_string()), on_chunk).await
  }

  async fn analyze_article(&self, content: &str) -> Result<ArticleAnalysis> {
    let raw = self
      .complete(with_system(render(&prompts().analysis, &[("content", content)])))
      .await?;
    parse_analysis(&raw)
  }

  async fn validate_api_key(&self) -> Result<bool> {
    let cfg = self.config();
    if cfg.api_key.trim().is_empty() {
      return Ok(false);
    }
    let url = format!("{}/models", cfg.base_url.trim_end_matches('/'));
    let resp = self.http.get(url).bearer_auth(cfg.api_key.trim()).send().await?;
    Ok(resp.status().is_success())
  }

  fn update_config(&self, config: &ApiConfig) {
    match self.config.write() {
      Ok(mut guard) => *guard = config.clone(),
      Err(poisoned) => *poisoned.into_inner() = config.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn configured() -> ApiConfig {
    ApiConfig {
      api_key: "sk-test".to_string(),
      base_url: "https://example.test/v1/".to_string(),
      ..ApiConfig::default()
    }
  }

  #[test]
  fn url_trims_trailing_slash() {
    assert_eq!(completions_url(&configured()), "https://example.test/v1/chat/completions");
  }

  #[test]
  fn body_includes_max_tokens_only_when_set() {
    let msgs = vec![PromptMessage::user("hi")];
    let mut cfg = configured();
    let body = request_body(&cfg, &msgs, true);
    assert!(body.get("max_tokens").is_none());
    assert_eq!(body["stream"], json!(true));
    assert_eq!(body["model"], json!("gpt-3.5-turbo"));

    cfg.max_tokens = Some(1024);
    let body = request_body(&cfg, &msgs, false);
    assert_eq!(body["max_tokens"], json!(1024));
  }

  #[test]
  fn sse_decoder_handles_split_lines() {
    let mut decoder = SseDecoder::default();
    let first = decoder.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\r\ndata: {\"choices\":[{\"del");
    assert_eq!(first, vec!["Hel"]);
    let second = decoder.push(b"ta\":{\"content\":\"lo\"}}]}\n\n: keepalive\ndata: [DONE]\n");
    assert_eq!(second, vec!["lo"]);
    assert!(decoder.finish().is_empty());
  }

  #[test]
  fn sse_decoder_flushes_unterminated_tail() {
    let mut decoder = SseDecoder::default();
    assert!(decoder.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"end\"}}]}").is_empty());
    assert_eq!(decoder.finish(), vec!["end"]);
  }

  #[test]
  fn sse_decoder_skips_malformed_lines_and_keeps_going() {
    let mut decoder = SseDecoder::default();
    let out = decoder.push(
      b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\ndata: {oops\ndata: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n",
    );
    assert_eq!(out, vec!["a", "b"]);
  }

  #[test]
  fn sse_decoder_keeps_multibyte_chars_split_across_chunks() {
    let line = "data: {\"choices\":[{\"delta\":{\"content\":\"你好\"}}]}\n".as_bytes();
    let cut = line.iter().position(|b| *b == 0xE4).unwrap() + 1;
    let mut decoder = SseDecoder::default();
    assert!(decoder.push(&line[..cut]).is_empty());
    assert_eq!(decoder.push(&line[cut..]), vec!["你好"]);
  }

  #[test]
  fn analysis_is_pulled_out_of_chatty_reply() {
    let raw = "好的，分析如下：\n```json\n{\"sentiment\":\"negative\",\"tags\":[\"mystery\"],\"score\":72}\n```";
    let analysis = parse_analysis(raw).unwrap();
    assert_eq!(analysis.sentiment.as_deref(), Some("negative"));
    assert_eq!(analysis.tags, Some(vec!["mystery".to_string()]));
    assert_eq!(analysis.score, Some(72));
    assert!(parse_analysis("no json here").is_err());
  }

  #[test]
  fn chat_messages_do_not_repeat_pending_user_turn() {
    let history = vec![ChatMessage::new("hello", true), ChatMessage::new("hi there", false)];
    let msgs = chat_messages("next", &history);
    assert_eq!(msgs.len(), 4);
    assert_eq!(msgs[2].role, "assistant");
    assert_eq!(msgs[3], PromptMessage::user("next"));

    let history = vec![ChatMessage::new("next", true)];
    let msgs = chat_messages("next", &history);
    assert_eq!(msgs.len(), 2);
  }

  #[test]
  fn outline_prompt_carries_theme_and_template() {
    let req = OutlineRequest {
      theme: "星际远航".to_string(),
      keywords: "飞船".to_string(),
      template: Some(Template {
        id: "t1".to_string(),
        name: "科幻".to_string(),
        ..Template::default()
      }),
    };
    let msgs = outline_messages(&req);
    assert_eq!(msgs[0].role, "system");
    assert!(msgs[1].content.contains("星际远航"));
    assert!(msgs[1].content.contains("科幻"));
  }

  #[test]
  fn user_text_with_braces_reaches_the_prompt_verbatim() {
    let req = OutlineRequest {
      theme: "写一个关于{keywords}的故事".to_string(),
      keywords: "剑".to_string(),
      template: None,
    };
    let msgs = outline_messages(&req);
    assert!(msgs[1].content.contains("主题：写一个关于{keywords}的故事"));
    assert!(msgs[1].content.contains("关键词：剑"));

    let corpus = vec![CorpusEntry::new("样本里写着{prompt}")];
    let msgs = personalized_messages("雨夜", &corpus);
    assert!(msgs[1].content.contains("样本里写着{prompt}"));
  }

  #[test]
  fn personalized_prompt_clamps_samples() {
    let corpus = vec![CorpusEntry::new("字".repeat(CORPUS_SAMPLE_MAX_CHARS + 10))];
    let msgs = personalized_messages("写一段雨夜", &corpus);
    assert!(msgs[1].content.contains("【样本1】"));
    assert!(msgs[1].content.contains("..."));
    assert!(msgs[1].content.contains("写一段雨夜"));
  }

  #[test]
  fn update_config_replaces_snapshot() {
    let client = OpenAiClient::new(ApiConfig::default());
    assert!(matches!(client.configured(), Err(SessionError::NotConfigured)));
    client.update_config(&configured());
    assert_eq!(client.config().api_key, "sk-test");
  }

  #[tokio::test]
  async fn calls_without_key_fail_before_network() {
    let client = OpenAiClient::new(ApiConfig::default());
    let err = client.get_writing_advice("text").await.unwrap_err();
    assert!(matches!(err, SessionError::NotConfigured));
    assert!(!client.validate_api_key().await.unwrap());
  }
}
