use serde::{Deserialize, Serialize};

/// Marks the graceful end of a progress stream. Not JSON.
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Parsing,
    Importing,
    Completed,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Parsing, Phase::Importing, Phase::Completed];

    pub fn from_status(status: &str) -> Option<Self> {
        match status {
            "parsing" => Some(Phase::Parsing),
            "importing" => Some(Phase::Importing),
            "completed" => Some(Phase::Completed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Parsing => "parsing",
            Phase::Importing => "importing",
            Phase::Completed => "completed",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::Parsing => "Parsing CSV",
            Phase::Importing => "Importing / Staging",
            Phase::Completed => "Finalizing",
        }
    }
}

/// One typed event from a job's progress subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobUpdate {
    Progress {
        phase: Phase,
        processed: u64,
        total: u64,
        message: Option<String>,
    },
    /// A status the server reports between phases (`pending`, `staging`).
    Status {
        status: String,
        message: Option<String>,
    },
    Failed {
        error: String,
    },
    /// The `[DONE]` sentinel.
    Ended,
    /// The stream stopped without the sentinel.
    Disconnected {
        reason: String,
    },
}

#[derive(Debug, Deserialize)]
struct ProgressPayload {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    processed: Option<u64>,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Decode one `data:` payload.
pub fn decode_payload(data: &str) -> Result<JobUpdate, String> {
    let data = data.trim();
    if data == DONE_SENTINEL {
        return Ok(JobUpdate::Ended);
    }

    let payload: ProgressPayload =
        serde_json::from_str(data).map_err(|e| format!("invalid progress payload: {e}"))?;
    let message = payload.message.filter(|m| !m.trim().is_empty());

    if let Some(error) = payload.error.filter(|e| !e.trim().is_empty()) {
        return Ok(JobUpdate::Failed { error });
    }

    let Some(status) = payload.status else {
        return Err("progress payload has neither status nor error".to_string());
    };

    if matches!(status.as_str(), "failed" | "error") {
        return Ok(JobUpdate::Failed {
            error: message.unwrap_or_else(|| "import failed".to_string()),
        });
    }

    Ok(match Phase::from_status(&status) {
        Some(phase) => JobUpdate::Progress {
            phase,
            processed: payload.processed.unwrap_or(0),
            total: payload.total.unwrap_or(0),
            message,
        },
        None => JobUpdate::Status { status, message },
    })
}

/// Incremental `text/event-stream` framing.
///
/// Bytes are buffered until a full line is available; `data:` lines of one
/// event are joined with `\n` and the event is emitted on the blank line that
/// terminates it.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns the payloads of every event it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            let mut line = &self.buffer[start..end];
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
            let line = String::from_utf8_lossy(line).into_owned();
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
            start = end + 1;
        }
        self.buffer.drain(..start);
        events
    }

    fn process_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            if self.data.is_empty() {
                return None;
            }
            return Some(std::mem::take(&mut self.data).join("\n"));
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            self.data.push(value.to_string());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"status\":\"pars").is_empty());
        assert!(decoder.push(b"ing\"}\n").is_empty());
        let events = decoder.push(b"\ndata: [DONE]\n\n");
        assert_eq!(events, vec![r#"{"status":"parsing"}"#, "[DONE]"]);
    }

    #[test]
    fn comments_fields_and_crlf() {
        let mut decoder = SseDecoder::new();
        let events =
            decoder.push(b": keep-alive\r\nevent: progress\r\nid: 3\r\ndata: a\r\ndata:b\r\n\r\n");
        assert_eq!(events, vec!["a\nb"]);
    }

    #[test]
    fn blank_lines_without_data_emit_nothing() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"\n\n\nretry: 500\n\n").is_empty());
    }

    #[test]
    fn decodes_phase_progress() {
        let update =
            decode_payload(r#"{"status":"parsing","processed":5000,"total":5000,"error":null}"#)
                .unwrap();
        assert_eq!(
            update,
            JobUpdate::Progress {
                phase: Phase::Parsing,
                processed: 5000,
                total: 5000,
                message: None,
            }
        );
    }

    #[test]
    fn decodes_sentinel_and_errors() {
        assert_eq!(decode_payload("[DONE]").unwrap(), JobUpdate::Ended);
        assert_eq!(
            decode_payload(r#"{"error":"bad header"}"#).unwrap(),
            JobUpdate::Failed {
                error: "bad header".to_string()
            }
        );
        assert_eq!(
            decode_payload(r#"{"status":"failed","processed":0,"total":0}"#).unwrap(),
            JobUpdate::Failed {
                error: "import failed".to_string()
            }
        );
    }

    #[test]
    fn intermediate_statuses_do_not_become_phases() {
        assert_eq!(
            decode_payload(r#"{"status":"staging","processed":10,"total":10}"#).unwrap(),
            JobUpdate::Status {
                status: "staging".to_string(),
                message: None
            }
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode_payload("not json").is_err());
        assert!(decode_payload(r#"{"processed":1}"#).is_err());
    }
}
