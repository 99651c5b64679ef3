//! Line classifier - filters raw log lines down to structured payload
//! lines and delivers them to both the accumulator and a live sink

use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;

lazy_static! {
    /// Optional `[<13-digit millis>]` prefix written by the log writer
    static ref TIMESTAMP_PREFIX: Regex = Regex::new(r"^\[(\d{13})\](.*)$").unwrap();
}

/// Callback receiving each accepted line together with the agent id
pub type OutputSink = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Decide whether a raw line is a structured payload line.
///
/// Returns the line with any timestamp prefix removed, or None when the
/// line is framing or noise: section delimiters, `Finished:` / `Exit
/// code:` trailers, the system init control message, and anything that is
/// not a well-formed JSON object.
pub fn classify_line(raw: &str) -> Option<&str> {
    if raw.trim().is_empty() {
        return None;
    }

    let content = match TIMESTAMP_PREFIX.captures(raw) {
        Some(caps) => caps.get(2).map(|m| m.as_str()).unwrap_or(""),
        None => raw,
    };

    if content.starts_with("===")
        || content.starts_with("Finished:")
        || content.starts_with("Exit code:")
        || (content.contains("\"type\":\"system\"") && content.contains("\"subtype\":\"init\""))
    {
        return None;
    }

    if !content.trim_start().starts_with('{') {
        return None;
    }

    if serde_json::from_str::<serde_json::Value>(content).is_err() {
        return None;
    }

    Some(content)
}

/// Accumulates accepted lines and streams them to an optional sink
///
/// Both destinations receive every accepted line: a streaming consumer
/// never sees a different set of lines than the final batched output.
pub struct OutputCollector {
    agent_id: String,
    output: String,
    sink: Option<OutputSink>,
}

impl OutputCollector {
    pub fn new(agent_id: impl Into<String>, sink: Option<OutputSink>) -> Self {
        Self {
            agent_id: agent_id.into(),
            output: String::new(),
            sink,
        }
    }

    /// Classify one raw line; accepted lines land in the accumulator and
    /// are delivered synchronously to the sink.
    pub fn push_line(&mut self, raw: &str) {
        if let Some(content) = classify_line(raw) {
            self.output.push_str(content);
            self.output.push('\n');

            if let Some(sink) = &self.sink {
                sink(content, &self.agent_id);
            }
        }
    }

    /// Append a raw chunk without classification (isolated execution
    /// consumes streams directly, with no line reassembly).
    pub fn push_chunk(&mut self, chunk: &str) {
        self.output.push_str(chunk);

        if let Some(sink) = &self.sink {
            sink(chunk, &self.agent_id);
        }
    }

    /// Accumulated output so far
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Consume the collector, returning the accumulated output
    pub fn into_output(self) -> String {
        self.output
    }
}
