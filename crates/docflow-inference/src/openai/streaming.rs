//! Incremental decoding of streamed chat answers.
//!
//! OpenAI-compatible endpoints stream completions as server-sent events,
//! one `data:` line per delta. The network hands us arbitrary byte
//! chunks, so an event can arrive split across two reads; [`SseDecoder`]
//! buffers input until a full line is available and yields each answer
//! delta exactly once. After the `[DONE]` marker everything else on the
//! wire is ignored.

use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde::Deserialize;

use docflow_core::{Error, Result};

/// Stream of answer text deltas.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// One streamed completion chunk as it appears on the wire.
#[derive(Debug, Deserialize)]
struct AnswerChunk {
    #[serde(default)]
    choices: Vec<AnswerChoice>,
}

#[derive(Debug, Deserialize)]
struct AnswerChoice {
    delta: AnswerDelta,
}

#[derive(Debug, Default, Deserialize)]
struct AnswerDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Line-buffering SSE decoder.
///
/// Feed raw network bytes in, take completed answer deltas out. Partial
/// lines are held until the terminating newline arrives.
#[derive(Default)]
pub struct SseDecoder {
    buffer: String,
    finished: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the `[DONE]` marker has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Consume one network chunk, returning the deltas it completed.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Result<String>> {
        if self.finished {
            return Vec::new();
        }
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut deltas = Vec::new();
        while let Some(end) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=end).collect();
            if let Some(delta) = self.decode_line(line.trim()) {
                deltas.push(delta);
            }
            if self.finished {
                break;
            }
        }
        deltas
    }

    fn decode_line(&mut self, line: &str) -> Option<Result<String>> {
        // Blank separators and ": keepalive" comments carry no data.
        if line.is_empty() || line.starts_with(':') {
            return None;
        }
        let data = line.strip_prefix("data:")?.trim_start();
        if data == "[DONE]" {
            self.finished = true;
            return None;
        }

        match serde_json::from_str::<AnswerChunk>(data) {
            Ok(chunk) => {
                let text: String = chunk
                    .choices
                    .into_iter()
                    .filter_map(|choice| choice.delta.content)
                    .collect();
                // Role-only and empty deltas produce nothing.
                if text.is_empty() {
                    None
                } else {
                    Some(Ok(text))
                }
            }
            Err(e) => Some(Err(Error::Inference(format!("Bad SSE payload: {}", e)))),
        }
    }
}

/// Turn a raw response byte stream into a stream of answer deltas.
pub fn decode_token_stream(
    source: impl Stream<Item = std::result::Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
) -> TokenStream {
    let deltas = source
        .scan(SseDecoder::new(), |decoder, chunk| {
            let out = match chunk {
                Ok(bytes) => decoder.feed(&bytes),
                Err(e) => vec![Err(Error::Inference(format!("Stream error: {}", e)))],
            };
            futures::future::ready(Some(futures::stream::iter(out)))
        })
        .flatten();
    Box::pin(deltas)
}

/// Streaming generation trait extension.
#[async_trait::async_trait]
pub trait StreamingGeneration: Send + Sync {
    /// Generate text with streaming response.
    async fn generate_stream(&self, prompt: &str) -> Result<TokenStream>;

    /// Generate text with system context and streaming response.
    async fn generate_with_system_stream(&self, system: &str, prompt: &str) -> Result<TokenStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta_line(content: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"index\":0,\"delta\":{{\"content\":\"{}\"}},\"finish_reason\":null}}]}}\n",
            content
        )
    }

    fn feed_str(decoder: &mut SseDecoder, input: &str) -> Vec<Result<String>> {
        decoder.feed(input.as_bytes())
    }

    #[test]
    fn test_single_delta_decoded() {
        let mut decoder = SseDecoder::new();
        let deltas = feed_str(&mut decoder, &delta_line("The rent"));
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].as_deref().unwrap(), "The rent");
    }

    #[test]
    fn test_event_split_across_reads_is_reassembled() {
        let line = delta_line("is $2,400");
        let (head, tail) = line.split_at(line.len() / 2);

        let mut decoder = SseDecoder::new();
        assert!(feed_str(&mut decoder, head).is_empty());
        let deltas = feed_str(&mut decoder, tail);
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].as_deref().unwrap(), "is $2,400");
    }

    #[test]
    fn test_done_marker_ends_decoding() {
        let mut decoder = SseDecoder::new();
        feed_str(&mut decoder, "data: [DONE]\n");
        assert!(decoder.is_finished());
        // Anything after the marker is discarded.
        assert!(feed_str(&mut decoder, &delta_line("late")).is_empty());
    }

    #[test]
    fn test_keepalive_and_blank_lines_skipped() {
        let mut decoder = SseDecoder::new();
        assert!(feed_str(&mut decoder, ": keepalive\n\n").is_empty());
        assert!(!decoder.is_finished());
    }

    #[test]
    fn test_role_only_delta_yields_nothing() {
        let mut decoder = SseDecoder::new();
        let deltas = feed_str(
            &mut decoder,
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"},\"finish_reason\":null}]}\n",
        );
        assert!(deltas.is_empty());
    }

    #[test]
    fn test_malformed_payload_surfaces_error() {
        let mut decoder = SseDecoder::new();
        let deltas = feed_str(&mut decoder, "data: {not json}\n");
        assert_eq!(deltas.len(), 1);
        assert!(deltas[0].is_err());
    }

    #[test]
    fn test_one_read_may_complete_several_deltas() {
        let mut decoder = SseDecoder::new();
        let input = format!("{}\n{}", delta_line("The deposit "), delta_line("is one month."));
        let deltas = feed_str(&mut decoder, &input);
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].as_deref().unwrap(), "The deposit ");
        assert_eq!(deltas[1].as_deref().unwrap(), "is one month.");
    }

    #[tokio::test]
    async fn test_decoded_stream_reconstructs_answer() {
        let chunks: Vec<std::result::Result<bytes::Bytes, reqwest::Error>> = vec![
            Ok(bytes::Bytes::from(delta_line("The lease runs "))),
            Ok(bytes::Bytes::from(delta_line("for twelve months [1]."))),
            Ok(bytes::Bytes::from("data: [DONE]\n")),
        ];

        let mut stream = decode_token_stream(futures::stream::iter(chunks));
        let mut answer = String::new();
        while let Some(delta) = stream.next().await {
            answer.push_str(&delta.unwrap());
        }
        assert_eq!(answer, "The lease runs for twelve months [1].");
    }
}
