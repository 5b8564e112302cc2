//! Stream event vocabulary shared by every backend.
//!
//! A model provider, a browser automation backend, or the ACP content
//! mapper all produce the same discriminated [`StreamEvent`] values, so the
//! rest of the pipeline is backend-agnostic. Events travel over a bounded
//! channel ([`EventStream`]); dropping or closing the producer half ends
//! consumption, which is the engine's natural cancellation point.
//!
//! # Example
//!
//! ```
//! use femtoloop::events::{EventStream, StreamEvent, StopReason};
//!
//! # tokio_test::block_on(async {
//! let (producer, mut stream) = EventStream::channel(8);
//! producer.send(StreamEvent::Text { text: "hi".into() }).await.unwrap();
//! producer.send(StreamEvent::Stop { reason: StopReason::Complete }).await.unwrap();
//! drop(producer);
//!
//! assert!(matches!(stream.next().await, Some(StreamEvent::Text { .. })));
//! assert!(matches!(stream.next().await, Some(StreamEvent::Stop { .. })));
//! assert!(stream.next().await.is_none());
//! # });
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{FemtoError, Result};

/// Terminal classification of why a generation pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model requested tool execution and expects a follow-up turn.
    ToolUse,
    /// The output token limit was reached.
    MaxTokens,
    /// A configured stop sequence was produced.
    StopSequence,
    /// The provider reported an error.
    Error,
    /// Natural completion.
    Complete,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ToolUse => write!(f, "tool_use"),
            Self::MaxTokens => write!(f, "max_tokens"),
            Self::StopSequence => write!(f, "stop_sequence"),
            Self::Error => write!(f, "error"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// Token usage counters for one request or one accumulated pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt
    pub prompt_tokens: u32,
    /// Tokens in the completion
    pub completion_tokens: u32,
    /// Total tokens (prompt + completion)
    pub total_tokens: u32,
}

impl Usage {
    /// Create usage counters from prompt and completion counts.
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Accumulate another usage report into this one.
    pub fn add(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// One event in a backend's response stream.
///
/// Tool-call arguments arrive fragmented: a `ToolCallStart` names the call,
/// zero or more `ToolCallChunk`s deliver argument fragments in order, and
/// `ToolCallEnd` carries the complete reassembled argument string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Assistant-visible text delta.
    Text { text: String },
    /// Model reasoning/thinking delta.
    Reasoning { text: String },
    /// A tool call was proposed; arguments will follow in fragments.
    ToolCallStart { id: String, name: String },
    /// One argument fragment for an in-flight tool call.
    ToolCallChunk { id: String, fragment: String },
    /// The tool call's arguments are complete.
    ToolCallEnd {
        id: String,
        complete_arguments: String,
    },
    /// The backend reported an error.
    Error { message: String },
    /// Token usage report.
    Usage(Usage),
    /// The pass reached a terminal state.
    Stop { reason: StopReason },
    /// Inline image payload (base64) produced by the backend.
    ImageData { mime_type: String, data: String },
    /// The backend is rate limited; a retry hint in seconds.
    RateLimit { retry_after_secs: u64 },
}

/// Default buffer size for event channels.
const DEFAULT_BUFFER_SIZE: usize = 256;

/// Producer half of an [`EventStream`].
///
/// Sending applies backpressure (the channel is bounded); dropping the
/// producer closes the stream and ends consumption.
#[derive(Clone)]
pub struct EventProducer {
    tx: mpsc::Sender<StreamEvent>,
}

impl EventProducer {
    /// Send one event, waiting for channel capacity.
    ///
    /// # Errors
    /// Returns an error if the consumer half has been dropped.
    pub async fn send(&self, event: StreamEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| FemtoError::Session("event stream consumer dropped".into()))
    }
}

/// Consumer half of a backend's event sequence.
///
/// Single-consumer by construction: the receiver is owned, not shared.
pub struct EventStream {
    rx: mpsc::Receiver<StreamEvent>,
}

impl EventStream {
    /// Create a bounded producer/consumer pair.
    pub fn channel(buffer: usize) -> (EventProducer, EventStream) {
        let (tx, rx) = mpsc::channel(buffer);
        (EventProducer { tx }, EventStream { rx })
    }

    /// Build a pre-filled stream from a fixed event script.
    ///
    /// The producer half is dropped immediately, so the stream ends after
    /// the scripted events. Useful for tests and replay.
    pub fn from_events(events: Vec<StreamEvent>) -> EventStream {
        let capacity = events.len().max(1);
        let (producer, stream) = Self::channel(capacity);
        for event in events {
            // Capacity covers the full script, so try_send cannot fail here.
            let _ = producer.tx.try_send(event);
        }
        stream
    }

    /// Receive the next event, or `None` when the stream is exhausted.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    /// Close the stream from the consumer side, aborting the producer.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

impl Default for EventStream {
    fn default() -> Self {
        Self::from_events(Vec::new())
    }
}
