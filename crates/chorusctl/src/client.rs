//! HTTP client for communicating with chorusd.

use anyhow::{anyhow, Context, Result};
use chorus_common::{
    AnswerRequest, AnswerResponse, ErrorBody, HealthResponse, SessionOutcome, SessionReader,
    StreamFrame,
};
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;

/// Client for communicating with chorusd
pub struct DaemonClient {
    http: reqwest::Client,
    base_url: String,
}

impl DaemonClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn unreachable(&self, e: reqwest::Error) -> anyhow::Error {
        anyhow!(
            "Cannot reach chorusd at {}: {}\n\nIs the daemon running?",
            self.base_url,
            e
        )
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let resp = self
            .http
            .get(self.url("/health"))
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;
        let resp = check_status(resp).await?;
        resp.json().await.context("Invalid health response")
    }

    /// Ask for a complete answer in one response
    pub async fn answer(&self, request: &AnswerRequest) -> Result<AnswerResponse> {
        let resp = self
            .http
            .post(self.url("/answer"))
            .json(request)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;
        let resp = check_status(resp).await?;
        resp.json().await.context("Invalid answer response")
    }

    /// Ask for a streamed answer. `on_frame` sees every frame as it arrives;
    /// the reassembled session is validated before returning.
    pub async fn answer_stream<F>(&self, request: &AnswerRequest, mut on_frame: F) -> Result<SessionOutcome>
    where
        F: FnMut(&StreamFrame),
    {
        let resp = self
            .http
            .post(self.url("/answer/stream"))
            .json(request)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        // Rejected requests still carry an error frame when the body is NDJSON
        let is_ndjson = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("application/x-ndjson"))
            .unwrap_or(false);
        let resp = if is_ndjson { resp } else { check_status(resp).await? };

        let mut reader = SessionReader::new();
        let mut lines = LineSplitter::default();
        let mut stream = resp.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk.context("Stream interrupted")?;
            for line in lines.push(&bytes) {
                if let Some(frame) = reader.push_line(&line)? {
                    on_frame(&frame);
                }
            }
        }
        if let Some(line) = lines.finish() {
            if let Some(frame) = reader.push_line(&line)? {
                on_frame(&frame);
            }
        }

        Ok(reader.finish()?)
    }
}

/// Turn a non-success response into an error carrying the daemon's message
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|e| e.error)
        .unwrap_or(body);
    Err(anyhow!("chorusd returned {}: {}", status, message))
}

/// Splits a byte stream into complete UTF-8 lines
#[derive(Debug, Default)]
struct LineSplitter {
    buffer: Vec<u8>,
}

impl LineSplitter {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..pos]).into_owned());
        }
        lines
    }

    /// Trailing bytes without a final newline, if any
    fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splitter_joins_partial_lines() {
        let mut lines = LineSplitter::default();
        assert!(lines.push(b"{\"type\":\"del").is_empty());
        assert_eq!(
            lines.push(b"ta\",\"text\":\"hi\"}\n{\"type\""),
            vec!["{\"type\":\"delta\",\"text\":\"hi\"}".to_string()]
        );
        assert_eq!(lines.finish(), Some("{\"type\"".to_string()));
        assert_eq!(lines.finish(), None);
    }

    #[test]
    fn test_splitter_keeps_multibyte_chars() {
        let mut lines = LineSplitter::default();
        let text = "caf\u{e9}\n".as_bytes();
        let (a, b) = text.split_at(4);
        assert!(lines.push(a).is_empty());
        assert_eq!(lines.push(b), vec!["caf\u{e9}".to_string()]);
    }

    #[test]
    fn test_url_join() {
        let client = DaemonClient::new("http://127.0.0.1:8080/").unwrap();
        assert_eq!(client.url("/health"), "http://127.0.0.1:8080/health");
    }
}
