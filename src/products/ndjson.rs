use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use crate::error::ClientError;

const MAX_LINE_PREVIEW: usize = 120;

/// Newline-delimited JSON decoding over arbitrary chunk boundaries.
///
/// The bytes after the last `\n` of a chunk stay in a carry-over buffer and
/// are prepended to the next chunk. Lines are split as bytes, so a UTF-8
/// sequence cut by a chunk boundary is reassembled before decoding.
#[derive(Debug)]
pub struct NdjsonDecoder<T> {
    carry: Vec<u8>,
    _record: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Default for NdjsonDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> NdjsonDecoder<T> {
    pub fn new() -> Self {
        Self {
            carry: Vec::new(),
            _record: PhantomData,
        }
    }

    /// Decode every line completed by `chunk`, in order. Blank lines are skipped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<T, ClientError>> {
        self.carry.extend_from_slice(chunk);
        let Some(last_newline) = self.carry.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };

        let rest = self.carry.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.carry, rest);
        complete
            .split(|b| *b == b'\n')
            .filter_map(decode_line)
            .collect()
    }

    /// The body ended: decode a final line that had no trailing newline.
    pub fn finish(&mut self) -> Option<Result<T, ClientError>> {
        let tail = std::mem::take(&mut self.carry);
        decode_line(&tail)
    }
}

fn decode_line<T: DeserializeOwned>(line: &[u8]) -> Option<Result<T, ClientError>> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    Some(serde_json::from_slice(line).map_err(|e| ClientError::RecordParse {
        line: preview(line),
        reason: e.to_string(),
    }))
}

fn preview(line: &[u8]) -> String {
    let text = String::from_utf8_lossy(line);
    match text.char_indices().nth(MAX_LINE_PREVIEW) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.into_owned(),
    }
}
