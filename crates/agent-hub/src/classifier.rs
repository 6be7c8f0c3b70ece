//! Classification of decoded event-stream lines into run events.
//!
//! Frames look like `data: {"message": "..."}`. The backend is an independent
//! producer, so anything that does not fit the frame shape is reported as
//! [`RunEvent::Unparseable`] and never aborts a run.

/// Marker every protocol frame starts with.
pub const DATA_MARKER: &str = "data:";
/// Message value that closes the stream.
pub const STREAM_END: &str = "STREAM_END";
/// Message prefix carrying the final result.
pub const FINAL_OUTPUT_PREFIX: &str = "FINAL_OUTPUT:";
/// Message prefix marking a backend failure.
pub const ERROR_PREFIX: &str = "ERROR:";

/// One classified protocol line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunEvent {
    /// Human-readable progress line appended to the run log.
    Progress { text: String },
    /// Final result with [`FINAL_OUTPUT_PREFIX`] stripped.
    FinalOutput { payload: String },
    /// Backend error; `message` keeps the [`ERROR_PREFIX`].
    Error { message: String },
    /// End-of-stream sentinel.
    StreamEnd,
    /// Line that is not a well-formed frame.
    Unparseable { raw_line: String, reason: String },
}

impl RunEvent {
    fn unparseable(line: &str, reason: impl Into<String>) -> Self {
        Self::Unparseable {
            raw_line: line.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(serde::Deserialize)]
struct FramePayload {
    message: String,
}

/// Classifies one decoded line.
pub fn classify_line(line: &str) -> RunEvent {
    let Some(payload) = line.strip_prefix(DATA_MARKER) else {
        return RunEvent::unparseable(line, "missing data marker");
    };
    let frame: FramePayload = match serde_json::from_str(payload.trim()) {
        Ok(frame) => frame,
        Err(e) => return RunEvent::unparseable(line, format!("invalid frame payload: {e}")),
    };
    classify_message(frame.message)
}

fn classify_message(message: String) -> RunEvent {
    if message == STREAM_END {
        return RunEvent::StreamEnd;
    }
    if let Some(rest) = message.strip_prefix(FINAL_OUTPUT_PREFIX) {
        return RunEvent::FinalOutput {
            payload: rest.to_string(),
        };
    }
    if message.starts_with(ERROR_PREFIX) {
        return RunEvent::Error { message };
    }
    RunEvent::Progress { text: message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_lines_keep_text_verbatim() {
        assert_eq!(
            classify_line(r#"data: {"message":"Calling SEOEnhancementTool ..."}"#),
            RunEvent::Progress {
                text: "Calling SEOEnhancementTool ...".into()
            }
        );
        assert_eq!(
            classify_line(r#"data:{"message":"  padded  "}"#),
            RunEvent::Progress {
                text: "  padded  ".into()
            }
        );
    }

    #[test]
    fn final_output_strips_prefix() {
        assert_eq!(
            classify_line(r#"data: {"message":"FINAL_OUTPUT:/img/out.png"}"#),
            RunEvent::FinalOutput {
                payload: "/img/out.png".into()
            }
        );
    }

    #[test]
    fn error_keeps_full_message() {
        let event = classify_line(r#"data: {"message":"ERROR: model unavailable"}"#);
        assert_eq!(
            event,
            RunEvent::Error {
                message: "ERROR: model unavailable".into()
            }
        );
    }

    #[test]
    fn sentinel_is_stream_end() {
        let event = classify_line(r#"data: {"message":"STREAM_END"}"#);
        assert_eq!(event, RunEvent::StreamEnd);
    }

    #[test]
    fn noise_is_unparseable() {
        for line in [
            "not-a-data-line",
            "",
            ": keepalive",
            "event: message",
            "data: {not json}",
            r#"data: {"msg":"wrong field"}"#,
            r#"data: {"message": 42}"#,
            " data: {\"message\":\"leading space\"}",
        ] {
            assert!(
                matches!(classify_line(line), RunEvent::Unparseable { ref raw_line, .. } if raw_line == line),
                "expected unparseable for {line:?}"
            );
        }
    }

    #[test]
    fn sentinel_must_match_exactly() {
        assert_eq!(
            classify_line(r#"data: {"message":"STREAM_END soon"}"#),
            RunEvent::Progress {
                text: "STREAM_END soon".into()
            }
        );
    }
}
