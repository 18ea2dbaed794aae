//! Answers routed back to the channel that submitted a command

use crate::frame::{Frame, FrameError};

/// Text reply for payloads no parser accepted
pub const UNKNOWN_COMMAND: &str = "UNKNOWN COMMAND\r\n";

/// Reply to a single command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Binary answer frame
    Frame(Frame),
    /// CRLF terminated text
    Text(String),
}

impl Answer {
    /// Text answer, CRLF appended when missing
    pub fn text(text: impl Into<String>) -> Self {
        let mut text = text.into();
        if !text.ends_with("\r\n") {
            text.push_str("\r\n");
        }
        Self::Text(text)
    }

    /// Text answer for a failed but recognised command
    pub fn error(reason: impl std::fmt::Display) -> Self {
        Self::text(format!("ERROR: {}", reason))
    }

    /// Acknowledgement of a set command
    pub fn ok() -> Self {
        Self::text("OK")
    }

    pub fn unknown_command() -> Self {
        Self::Text(UNKNOWN_COMMAND.to_string())
    }

    /// Bytes to write to the originating channel
    pub fn to_bytes(&self) -> Result<Vec<u8>, FrameError> {
        match self {
            Answer::Frame(frame) => frame.encode(),
            Answer::Text(text) => Ok(text.as_bytes().to_vec()),
        }
    }
}

impl From<Frame> for Answer {
    fn from(frame: Frame) -> Self {
        Answer::Frame(frame)
    }
}
