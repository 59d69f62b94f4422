//! OpenAI-compatible chat completions client (OpenRouter by default).

use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

use councildb_core::config::LlmSettings;
use councildb_core::traits::{GenerationOptions, TextGenerator};
use councildb_core::types::Message;
use councildb_core::{Error, Result};

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: ChatContent,
}

#[derive(Deserialize, Default)]
struct ChatContent {
    #[serde(default)]
    content: Option<String>,
}

/// One server-sent-event line of a streamed completion.
#[derive(Debug, PartialEq, Eq)]
pub enum SseLine {
    Delta(String),
    Done,
    Skip,
}

pub fn parse_sse_line(line: &str) -> Result<SseLine> {
    let Some(data) = line.trim().strip_prefix("data:") else { return Ok(SseLine::Skip) };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }
    let chunk: StreamChunk =
        serde_json::from_str(data).map_err(|e| Error::Provider(format!("malformed stream chunk: {e}")))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|s| !s.is_empty())
        .map_or(SseLine::Skip, SseLine::Delta))
}

pub struct OpenAiChatGenerator {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl OpenAiChatGenerator {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
            api_key,
            timeout,
        })
    }

    /// API key is read from the environment variable the settings name.
    pub fn from_settings(settings: &LlmSettings) -> Result<Self> {
        let api_key = std::env::var(&settings.api_key_env).ok().filter(|k| !k.is_empty());
        Self::new(&settings.base_url, &settings.model, api_key, Duration::from_millis(settings.timeout_ms))
    }

    async fn send(&self, messages: &[Message], options: GenerationOptions, stream: bool) -> Result<Response> {
        let body = ChatRequest {
            model: &self.model,
            messages: messages.iter().map(|m| ChatMessage { role: m.role.as_str(), content: &m.content }).collect(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream,
        };
        let mut req = self.client.post(&self.endpoint).header(CONTENT_TYPE, "application/json").json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await.map_err(|e| classify(&e, self.timeout))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Provider(format!("chat endpoint returned {status}: {text}")));
        }
        Ok(resp)
    }

    /// Content deltas as they arrive.
    pub async fn generate_stream(
        &self,
        messages: &[Message],
        options: GenerationOptions,
    ) -> Result<BoxStream<'static, Result<String>>> {
        let resp = self.send(messages, options, true).await?;
        Ok(sse_deltas(resp.bytes_stream(), self.timeout))
    }
}

#[async_trait]
impl TextGenerator for OpenAiChatGenerator {
    async fn generate(&self, messages: &[Message], options: GenerationOptions) -> Result<String> {
        let resp = self.send(messages, options, false).await?;
        let body = resp.text().await.map_err(|e| classify(&e, self.timeout))?;
        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| Error::Provider(format!("malformed chat response: {e}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Provider("chat response has no content".into()))?;
        debug!(chars = content.len(), "completion received");
        Ok(content)
    }
}

fn classify(e: &reqwest::Error, timeout: Duration) -> Error {
    if e.is_timeout() {
        Error::Timeout(timeout)
    } else {
        Error::Provider(format!("chat request failed: {e}"))
    }
}

struct SseState<S> {
    bytes: S,
    buf: Vec<u8>,
    pending: VecDeque<String>,
    done: bool,
}

impl<S> SseState<S> {
    fn drain_lines(&mut self) -> Result<()> {
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            match parse_sse_line(&String::from_utf8_lossy(&line))? {
                SseLine::Delta(d) => self.pending.push_back(d),
                SseLine::Done => {
                    self.done = true;
                    self.buf.clear();
                }
                SseLine::Skip => {}
            }
        }
        Ok(())
    }
}

fn sse_deltas<S, B>(bytes: S, timeout: Duration) -> BoxStream<'static, Result<String>>
where
    S: Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = SseState { bytes: Box::pin(bytes), buf: Vec::new(), pending: VecDeque::new(), done: false };
    stream::try_unfold(state, move |mut st| async move {
        loop {
            if let Some(delta) = st.pending.pop_front() {
                return Ok(Some((delta, st)));
            }
            if st.done {
                return Ok(None);
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    st.buf.extend_from_slice(chunk.as_ref());
                    st.drain_lines()?;
                }
                Some(Err(e)) => return Err(classify(&e, timeout)),
                None => {
                    st.buf.push(b'\n');
                    st.drain_lines()?;
                    st.done = true;
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_lines_parse() {
        let line = r#"data: {"choices":[{"delta":{"content":"Olá"}}]}"#;
        assert_eq!(parse_sse_line(line).unwrap(), SseLine::Delta("Olá".into()));
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), SseLine::Done);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), SseLine::Skip);
        assert_eq!(parse_sse_line(r#"data: {"choices":[{"delta":{}}]}"#).unwrap(), SseLine::Skip);
        assert!(parse_sse_line("data: {oops").is_err());
    }
}
