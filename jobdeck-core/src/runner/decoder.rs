//! Stream protocol decoder
//!
//! Turns the raw body of a run response into [`JobStreamEvent`]s.
//!
//! # Framing
//!
//! A frame is one line starting with the literal prefix `data: ` followed by
//! a single-line JSON event. Lines are separated by `\n` (a trailing `\r` is
//! tolerated).
//!
//! # Error Handling
//!
//! - **Partial chunks**: bytes are buffered until a newline arrives, so an
//!   event split across network chunks (even inside a multi-byte character)
//!   decodes exactly as if it had arrived whole.
//! - **Non-frame lines** (keep-alives, comments, blank separators): dropped
//!   silently.
//! - **Malformed frames**: logged as a warning, line skipped, decoding
//!   continues.
//! - **Unterminated final line**: decoded as one last candidate when the
//!   source ends.
//!
//! The decoder never interprets `done`; deciding what end-of-run means is the
//! coordinator's job.

use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use serde::Deserialize;
use std::collections::VecDeque;

use crate::error::Result;

/// Literal prefix that marks a frame line.
pub const FRAME_PREFIX: &str = "data: ";

/// One event of the run progress stream.
///
/// The `type` tag selects the variant; `project` names the target project
/// path for every variant except [`JobStreamEvent::Done`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum JobStreamEvent {
    /// Outcome of the project's gating command
    PreCheck {
        project: String,
        #[serde(default)]
        skipped: bool,
        #[serde(default, rename = "preCheckOutput")]
        pre_check_output: Option<String>,
    },
    /// Main step started
    Start { project: String },
    /// Output fragment to append
    Content {
        project: String,
        #[serde(default)]
        text: String,
    },
    /// Main step finished, possibly with an error
    Complete {
        project: String,
        #[serde(default, rename = "needsHuman")]
        needs_human: Option<bool>,
        #[serde(default)]
        error: Option<String>,
    },
    /// Project failed
    Error {
        project: String,
        #[serde(default)]
        error: Option<String>,
    },
    /// Whole run finished
    Done,
}

impl JobStreamEvent {
    /// Project path this event targets, if any.
    pub fn project(&self) -> Option<&str> {
        match self {
            JobStreamEvent::PreCheck { project, .. }
            | JobStreamEvent::Start { project }
            | JobStreamEvent::Content { project, .. }
            | JobStreamEvent::Complete { project, .. }
            | JobStreamEvent::Error { project, .. } => Some(project),
            JobStreamEvent::Done => None,
        }
    }

    /// Wire name of the event type.
    pub fn kind(&self) -> &'static str {
        match self {
            JobStreamEvent::PreCheck { .. } => "pre-check",
            JobStreamEvent::Start { .. } => "start",
            JobStreamEvent::Content { .. } => "content",
            JobStreamEvent::Complete { .. } => "complete",
            JobStreamEvent::Error { .. } => "error",
            JobStreamEvent::Done => "done",
        }
    }
}

/// Counters for what the decoder saw.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecoderStats {
    /// Frames decoded into events
    pub frames: usize,
    /// Non-frame lines dropped
    pub ignored: usize,
    /// Frames whose JSON failed to parse
    pub malformed: usize,
}

/// Incremental line decoder.
///
/// Feed it raw chunks with [`push`](Self::push); call
/// [`finish`](Self::finish) once the source is exhausted.
#[derive(Debug, Default)]
pub struct EventDecoder {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already searched for a newline
    scanned: usize,
    stats: DecoderStats,
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every event completed by it, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<JobStreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut consumed = 0;
        let mut search_from = self.scanned;
        while let Some(offset) = self.buffer[search_from..].iter().position(|&b| b == b'\n') {
            let end = search_from + offset;
            let line = String::from_utf8_lossy(&self.buffer[consumed..end]).into_owned();
            consumed = end + 1;
            search_from = consumed;
            if let Some(event) = self.decode_line(&line) {
                events.push(event);
            }
        }
        self.buffer.drain(..consumed);
        self.scanned = self.buffer.len();

        events
    }

    /// Flush the trailing unterminated fragment, if any.
    pub fn finish(&mut self) -> Option<JobStreamEvent> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        self.scanned = 0;
        self.decode_line(&line)
    }

    /// Bytes held back waiting for a newline.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    fn decode_line(&mut self, line: &str) -> Option<JobStreamEvent> {
        let line = line.strip_suffix('\r').unwrap_or(line);

        let Some(payload) = line.strip_prefix(FRAME_PREFIX) else {
            self.stats.ignored += 1;
            if !line.is_empty() {
                tracing::trace!(line, "Ignoring non-frame line");
            }
            return None;
        };

        match serde_json::from_str::<JobStreamEvent>(payload) {
            Ok(event) => {
                self.stats.frames += 1;
                Some(event)
            }
            Err(e) => {
                self.stats.malformed += 1;
                tracing::warn!(error = %e, frame = payload, "Dropping malformed frame");
                None
            }
        }
    }
}

/// Byte source for a run: any fallible stream of chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Lazy event sequence over a byte source.
pub struct EventStream {
    source: ByteStream,
    decoder: EventDecoder,
    ready: VecDeque<JobStreamEvent>,
    exhausted: bool,
}

impl EventStream {
    pub fn new(source: ByteStream) -> Self {
        Self {
            source,
            decoder: EventDecoder::new(),
            ready: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Wrap any chunk stream.
    pub fn from_stream<S>(source: S) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        Self::new(source.boxed())
    }

    /// Next decoded event, or `None` once the source has ended.
    ///
    /// Cancel-safe: dropping the returned future loses no decoded events.
    pub async fn next_event(&mut self) -> Result<Option<JobStreamEvent>> {
        loop {
            if let Some(event) = self.ready.pop_front() {
                return Ok(Some(event));
            }
            if self.exhausted {
                return Ok(None);
            }

            match self.source.next().await {
                Some(Ok(chunk)) => {
                    self.ready.extend(self.decoder.push(&chunk));
                }
                Some(Err(e)) => return Err(e),
                None => {
                    self.exhausted = true;
                    self.ready.extend(self.decoder.finish());
                }
            }
        }
    }

    pub fn stats(&self) -> DecoderStats {
        self.decoder.stats()
    }

    /// Adapt into a `futures` stream of events.
    pub fn into_stream(self) -> impl Stream<Item = Result<JobStreamEvent>> + Send {
        futures::stream::unfold(Some(self), |state| async move {
            let mut events = state?;
            match events.next_event().await {
                Ok(Some(event)) => Some((Ok(event), Some(events))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    const START_A: &str = "data: {\"type\":\"start\",\"project\":\"/a\"}\n";

    fn decode_all(chunks: &[&[u8]]) -> (Vec<JobStreamEvent>, DecoderStats) {
        let mut decoder = EventDecoder::new();
        let mut events = Vec::new();
        for chunk in chunks {
            events.extend(decoder.push(chunk));
        }
        events.extend(decoder.finish());
        (events, decoder.stats())
    }

    #[test]
    fn test_parse_every_event_kind() {
        let body = concat!(
            "data: {\"type\":\"pre-check\",\"project\":\"/a\",\"skipped\":false,\"preCheckOutput\":\"2 files\"}\n",
            "data: {\"type\":\"start\",\"project\":\"/a\"}\n",
            "data: {\"type\":\"content\",\"project\":\"/a\",\"text\":\"hi\"}\n",
            "data: {\"type\":\"complete\",\"project\":\"/a\",\"needsHuman\":true}\n",
            "data: {\"type\":\"error\",\"project\":\"/b\",\"error\":\"exit 1\"}\n",
            "data: {\"type\":\"done\"}\n",
        );
        let (events, stats) = decode_all(&[body.as_bytes()]);

        assert_eq!(
            events,
            vec![
                JobStreamEvent::PreCheck {
                    project: "/a".to_string(),
                    skipped: false,
                    pre_check_output: Some("2 files".to_string()),
                },
                JobStreamEvent::Start {
                    project: "/a".to_string()
                },
                JobStreamEvent::Content {
                    project: "/a".to_string(),
                    text: "hi".to_string(),
                },
                JobStreamEvent::Complete {
                    project: "/a".to_string(),
                    needs_human: Some(true),
                    error: None,
                },
                JobStreamEvent::Error {
                    project: "/b".to_string(),
                    error: Some("exit 1".to_string()),
                },
                JobStreamEvent::Done,
            ]
        );
        assert_eq!(stats.frames, 6);
        assert_eq!(events[4].project(), Some("/b"));
        assert_eq!(events[5].project(), None);
        assert_eq!(events[5].kind(), "done");
    }

    #[test]
    fn test_split_at_every_boundary() {
        let body = "data: {\"type\":\"content\",\"project\":\"/a\",\"text\":\"héllo wörld ✓\"}\n";
        let bytes = body.as_bytes();
        let (whole, _) = decode_all(&[bytes]);
        assert_eq!(whole.len(), 1);

        for split in 1..bytes.len() {
            let (head, tail) = bytes.split_at(split);
            let (events, _) = decode_all(&[head, tail]);
            assert_eq!(events, whole, "split at byte {}", split);
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let body = format!("{}{}", START_A, "data: {\"type\":\"done\"}\n");
        let chunks: Vec<&[u8]> = body.as_bytes().chunks(1).collect();
        let (events, _) = decode_all(&chunks);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], JobStreamEvent::Done);
    }

    #[test]
    fn test_filters_comments_and_malformed_frames() {
        let body = concat!(
            ": keep-alive\n",
            "\n",
            "data: {\"type\":\"start\",\"project\":\"/a\"}\n",
            "event: progress\n",
            "data: {not json\n",
            "data:{\"type\":\"start\",\"project\":\"/no-space\"}\n",
            "data: {\"type\":\"content\",\"project\":\"/a\",\"text\":\"x\"}\n",
            "data: {\"type\":\"teleport\",\"project\":\"/a\"}\n",
            "data: {\"type\":\"done\"}\n",
        );
        let (events, stats) = decode_all(&[body.as_bytes()]);

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].kind(), "start");
        assert_eq!(events[1].kind(), "content");
        assert_eq!(events[2].kind(), "done");
        assert_eq!(stats.frames, 3);
        assert_eq!(stats.malformed, 2);
        assert_eq!(stats.ignored, 4);
    }

    #[test]
    fn test_crlf_lines() {
        let body = "data: {\"type\":\"start\",\"project\":\"/a\"}\r\n\r\n";
        let (events, _) = decode_all(&[body.as_bytes()]);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_incomplete_line_is_held_back() {
        let mut decoder = EventDecoder::new();
        let events = decoder.push(b"data: {\"type\":\"start\",");
        assert!(events.is_empty());
        assert_eq!(decoder.pending_bytes(), 22);

        let events = decoder.push(b"\"project\":\"/a\"}\ndata: {\"ty");
        assert_eq!(events.len(), 1);
        assert_eq!(decoder.pending_bytes(), 10);
    }

    #[test]
    fn test_long_frame_in_small_chunks_scans_only_new_bytes() {
        let text = "x".repeat(64 * 1024);
        let body = format!(
            "data: {{\"type\":\"content\",\"project\":\"/a\",\"text\":\"{}\"}}\n{}",
            text, START_A
        );

        let mut decoder = EventDecoder::new();
        let mut events = Vec::new();
        for chunk in body.as_bytes().chunks(3) {
            events.extend(decoder.push(chunk));
            assert_eq!(decoder.scanned, decoder.pending_bytes());
        }

        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            JobStreamEvent::Content {
                project: "/a".to_string(),
                text,
            }
        );
        assert_eq!(decoder.pending_bytes(), 0);
    }

    #[test]
    fn test_unterminated_final_line_flushed_on_finish() {
        let (events, _) = decode_all(&[b"data: {\"type\":\"done\"}"]);
        assert_eq!(events, vec![JobStreamEvent::Done]);

        let (events, stats) = decode_all(&[b"data: {\"type\":\"do"]);
        assert!(events.is_empty());
        assert_eq!(stats.malformed, 1);
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let body = "data: {\"type\":\"done\",\"project\":\"\",\"elapsedMs\":12}\n";
        let (events, _) = decode_all(&[body.as_bytes()]);
        assert_eq!(events, vec![JobStreamEvent::Done]);
    }

    #[tokio::test]
    async fn test_event_stream_over_chunks() {
        let chunks: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"data: {\"type\":\"start\",\"pro")),
            Ok(Bytes::from_static(b"ject\":\"/a\"}\n: ping\n")),
            Ok(Bytes::from_static(b"data: {\"type\":\"done\"}\n")),
        ];
        let mut events = EventStream::from_stream(futures::stream::iter(chunks));

        assert_eq!(
            events.next_event().await.unwrap(),
            Some(JobStreamEvent::Start {
                project: "/a".to_string()
            })
        );
        assert_eq!(events.next_event().await.unwrap(), Some(JobStreamEvent::Done));
        assert_eq!(events.next_event().await.unwrap(), None);
        assert_eq!(events.next_event().await.unwrap(), None);
        assert_eq!(events.stats().ignored, 1);
    }

    #[tokio::test]
    async fn test_event_stream_surfaces_source_errors() {
        let chunks: Vec<Result<Bytes>> = vec![
            Ok(Bytes::from_static(START_A.as_bytes())),
            Err(Error::Transport("connection reset".to_string())),
        ];
        let collected: Vec<Result<JobStreamEvent>> =
            EventStream::from_stream(futures::stream::iter(chunks))
                .into_stream()
                .collect()
                .await;

        assert_eq!(collected.len(), 2);
        assert!(collected[0].is_ok());
        assert!(matches!(collected[1], Err(Error::Transport(_))));
    }
}
