//! Line-delimited JSON fragment decoding
//!
//! The generation backend streams one JSON object per line. `LineDecoder`
//! splits arbitrary byte chunks into lines; `decode_fragment` turns one line
//! into a fragment under a per-fragment skip policy:
//! - a well-formed fragment is returned as is
//! - valid JSON of the wrong shape is skipped
//! - anything else gets one loose pass that pulls out the `response` string,
//!   and is dropped if that fails too

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{RagError, Result};

/// Maximum bytes buffered while waiting for a newline (1MB)
pub const MAX_BUFFER_SIZE: usize = 1_048_576;

/// One streamed piece of a generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamFragment {
    pub response: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<i64>>,
}

impl StreamFragment {
    fn text_only(response: String) -> Self {
        Self {
            response,
            model: String::new(),
            done: false,
            context: None,
        }
    }
}

/// Splits a byte stream into complete lines
#[derive(Debug)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    max_buffer_size: usize,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::with_capacity(MAX_BUFFER_SIZE)
    }

    pub fn with_capacity(max_buffer_size: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            max_buffer_size,
        }
    }

    /// Append `bytes` and return every line completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..pos]);
            let text = text.trim();
            if !text.is_empty() {
                lines.push(text.to_string());
            }
        }

        if self.buffer.len() > self.max_buffer_size {
            return Err(RagError::DecodeError(format!(
                "Buffer overflow: {} bytes without a line break exceeds maximum {}",
                self.buffer.len(),
                self.max_buffer_size
            )));
        }

        Ok(lines)
    }

    /// Trailing line without a final newline, if any
    pub fn finish(&mut self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.buffer).trim().to_string();
        self.buffer.clear();
        if rest.is_empty() {
            None
        } else {
            Some(rest)
        }
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode one line, or `None` if it is skipped
pub fn decode_fragment(line: &str) -> Option<StreamFragment> {
    match serde_json::from_str::<StreamFragment>(line) {
        Ok(fragment) => Some(fragment),
        Err(_) => match serde_json::from_str::<serde_json::Value>(line) {
            Ok(value) => {
                match value.get("error").and_then(|e| e.as_str()) {
                    Some(error) => warn!(error, "Backend reported an error mid-stream"),
                    None => debug!("Skipping fragment with unexpected shape"),
                }
                None
            }
            Err(_) => {
                let loose = extract_response_text(line).map(StreamFragment::text_only);
                if loose.is_none() {
                    debug!(len = line.len(), "Dropping undecodable fragment");
                }
                loose
            }
        },
    }
}

/// Pull the string value of the first `"response"` key out of text that is
/// not valid JSON
fn extract_response_text(line: &str) -> Option<String> {
    let key = "\"response\"";
    let after_key = &line[line.find(key)? + key.len()..];
    let after_colon = after_key.trim_start().strip_prefix(':')?.trim_start();
    let body = after_colon.strip_prefix('"')?;

    let mut escaped = false;
    for (i, ch) in body.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => {
                let literal = &after_colon[..i + 2];
                return serde_json::from_str::<String>(literal).ok();
            }
            _ => {}
        }
    }
    None
}
