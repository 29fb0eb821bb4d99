//! Incremental extraction of JSON messages from raw process output.
//!
//! Agent CLIs write a mix of complete JSON objects and free-form text, and the
//! sandbox transport delivers that output in arbitrarily sized chunks. The
//! [`JsonStreamExtractor`] reassembles the chunks and yields each complete
//! object exactly once, in order, no matter where the chunk boundaries fall.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One item recovered from an output stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A complete JSON object.
    Json(Value),
    /// Output that did not parse as JSON.
    Text(String),
}

/// Streaming extractor for brace-delimited JSON objects.
///
/// Scan state survives between pushes, so every byte is examined once.
#[derive(Debug, Default)]
pub struct JsonStreamExtractor {
    buffer: String,
    /// Offset into `buffer` up to which bytes have been scanned.
    scanned: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
    /// The previous scan consumed an object that ended the buffer; a newline
    /// opening the next chunk belongs to that object.
    skip_leading_newline: bool,
    #[cfg(test)]
    examined: usize,
}

impl JsonStreamExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every message completed by it.
    pub fn push(&mut self, chunk: &str) -> Vec<StreamEvent> {
        let cleaned = chunk.replace('\0', "");
        if cleaned.is_empty() {
            return Vec::new();
        }

        let mut incoming = cleaned.as_str();
        if self.skip_leading_newline {
            self.skip_leading_newline = false;
            if let Some(rest) = incoming.strip_prefix('\n') {
                incoming = rest;
            }
        }
        self.buffer.push_str(incoming);

        let (events, consumed) = self.scan();
        if consumed > 0 {
            self.skip_leading_newline = consumed == self.buffer.len()
                && self.buffer.as_bytes()[consumed - 1] == b'}';
            self.buffer.drain(..consumed);
            self.scanned -= consumed;
        }
        events
    }

    /// Emits whatever non-whitespace content remains as raw text.
    pub fn flush(&mut self) -> Option<StreamEvent> {
        let remaining = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        self.depth = 0;
        self.in_string = false;
        self.escaped = false;
        self.skip_leading_newline = false;
        if remaining.trim().is_empty() {
            None
        } else {
            Some(StreamEvent::Text(remaining))
        }
    }

    /// Returns the bytes still waiting for a closing brace.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Scans the unscanned tail of the buffer. Returns the completed events
    /// and the length of the buffer prefix they consumed.
    fn scan(&mut self) -> (Vec<StreamEvent>, usize) {
        let bytes = self.buffer.as_bytes();
        let mut events = Vec::new();
        let mut start = 0;
        let mut i = self.scanned;

        #[cfg(test)]
        {
            self.examined += bytes.len() - i;
        }

        while i < bytes.len() {
            let c = bytes[i];
            if self.escaped {
                self.escaped = false;
            } else if c == b'\\' && self.in_string {
                self.escaped = true;
            } else if c == b'"' {
                self.in_string = !self.in_string;
            } else if !self.in_string {
                match c {
                    b'{' => self.depth += 1,
                    b'}' if self.depth > 0 => {
                        self.depth -= 1;
                        if self.depth == 0 {
                            // '}' is ASCII, so i + 1 is a char boundary.
                            let span = &self.buffer[start..=i];
                            events.push(parse_span(span));
                            start = i + 1;
                            if bytes.get(start) == Some(&b'\n') {
                                start += 1;
                                i += 1;
                            }
                        }
                    }
                    _ => {}
                }
            }
            i += 1;
        }

        self.scanned = i;
        (events, start)
    }
}

fn parse_span(span: &str) -> StreamEvent {
    match serde_json::from_str::<Value>(span) {
        Ok(value) => StreamEvent::Json(value),
        Err(_) => StreamEvent::Text(span.to_string()),
    }
}

/// Kind tag of a [`StreamingMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Start,
    Git,
    End,
    ToolCall,
    ToolResult,
    Text,
}

/// Lifecycle or tool event in the shared wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl StreamingMessage {
    /// Creates a message stamped with the current time in milliseconds.
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            sandbox_id: None,
            output: None,
            message: None,
            timestamp: Some(chrono::Utc::now().timestamp_millis()),
        }
    }

    pub fn with_sandbox_id(mut self, id: impl Into<String>) -> Self {
        self.sandbox_id = Some(id.into());
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// `type` values accepted when parsing newline-delimited structured output:
/// the wire kinds plus the event types agent CLIs emit natively.
pub const STRUCTURED_MESSAGE_TYPES: &[&str] = &[
    "start",
    "git",
    "end",
    "tool_call",
    "tool_result",
    "text",
    "assistant",
    "user",
    "system",
    "result",
];

/// Command-line flags that make an agent CLI emit structured output.
const STRUCTURED_OUTPUT_FLAGS: &[&str] = &[
    "--output-format stream-json",
    "--output-format=stream-json",
    "--output-format json",
    "--output-format=json",
    "--json",
];

/// Returns true when structured output should be parsed for `command`.
pub fn wants_structured_output(command: &str, requested: bool) -> bool {
    requested
        || STRUCTURED_OUTPUT_FLAGS
            .iter()
            .any(|flag| command.contains(flag))
}

/// Parses newline-delimited JSON, keeping objects with a recognized `type`.
pub fn parse_structured_output(stdout: &str) -> Vec<Value> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .filter(|value| {
            value
                .get("type")
                .and_then(Value::as_str)
                .is_some_and(|t| STRUCTURED_MESSAGE_TYPES.contains(&t))
        })
        .collect()
}
