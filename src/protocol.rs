//! AMI frame assembly and parsing

use crate::{
    constants::{FRAME_TERMINATOR, LINE_TERMINATOR, MAX_FRAME_SIZE},
    error::{AmiError, AmiResult},
    message::AmiMessage,
};

/// Accumulates inbound lines until they form one complete frame.
///
/// Lines arrive LF-terminated from the socket reader; a bare LF is widened
/// to CRLF so frames always end in `\r\n\r\n`. Blank lines before the first
/// header (keepalive noise between frames) are dropped.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buffer: String,
}

impl FrameAssembler {
    /// Create an empty assembler
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    /// Feed one line; returns the raw frame once its terminator arrives.
    pub fn push_line(&mut self, line: &str) -> AmiResult<Option<String>> {
        let content = line
            .strip_suffix('\n')
            .unwrap_or(line);
        let content = content
            .strip_suffix('\r')
            .unwrap_or(content);

        if content.is_empty() && self.buffer.is_empty() {
            return Ok(None);
        }

        if self.buffer.len() + content.len() + LINE_TERMINATOR.len() > MAX_FRAME_SIZE {
            self.buffer.clear();
            return Err(AmiError::protocol_error(format!(
                "frame exceeds {} bytes without a terminator",
                MAX_FRAME_SIZE
            )));
        }

        self.buffer
            .push_str(content);
        self.buffer
            .push_str(LINE_TERMINATOR);

        if self
            .buffer
            .ends_with(FRAME_TERMINATOR)
        {
            Ok(Some(std::mem::take(&mut self.buffer)))
        } else {
            Ok(None)
        }
    }

    /// `true` if part of a frame is buffered.
    pub fn is_partial(&self) -> bool {
        !self.buffer
            .is_empty()
    }
}

/// Parse one raw frame into an [`AmiMessage`].
///
/// Each line splits on its first `:`; name and value are trimmed. Parsing
/// stops at the first blank line. A non-blank line without `:` before the
/// terminator rejects the whole frame.
pub fn parse_frame(raw: &str) -> AmiResult<AmiMessage> {
    let mut message = AmiMessage::new();

    for line in raw.split('\n') {
        let line = line
            .strip_suffix('\r')
            .unwrap_or(line);
        if line
            .trim()
            .is_empty()
        {
            break;
        }

        match line.split_once(':') {
            Some((name, value)) => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(AmiError::InvalidHeader {
                        header: line.to_string(),
                    });
                }
                message.push_header(name, value.trim());
            }
            None => {
                return Err(AmiError::InvalidHeader {
                    header: line.to_string(),
                });
            }
        }
    }

    Ok(message)
}

/// Render `(name, value)` pairs as a frame: one CRLF-terminated line per
/// header and an empty line at the end.
pub(crate) fn render_frame<'a>(headers: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut out = String::new();
    for (name, value) in headers {
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
        out.push_str(LINE_TERMINATOR);
    }
    out.push_str(LINE_TERMINATOR);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(asm: &mut FrameAssembler, data: &str) -> Vec<String> {
        let mut frames = Vec::new();
        for line in data.split_inclusive('\n') {
            if let Some(frame) = asm
                .push_line(line)
                .unwrap()
            {
                frames.push(frame);
            }
        }
        frames
    }

    #[test]
    fn test_assembles_on_blank_line() {
        let mut asm = FrameAssembler::new();
        let frames = feed(
            &mut asm,
            "Response: Success\r\nActionID: X-1\r\nPing: Pong\r\n\r\n",
        );
        assert_eq!(
            frames,
            vec!["Response: Success\r\nActionID: X-1\r\nPing: Pong\r\n\r\n".to_string()]
        );
        assert!(!asm.is_partial());
    }

    #[test]
    fn test_incomplete_frame_stays_buffered() {
        let mut asm = FrameAssembler::new();
        let frames = feed(&mut asm, "Event: PeerEntry\r\nObjectName: 100\r\n");
        assert!(frames.is_empty());
        assert!(asm.is_partial());

        let frames = feed(&mut asm, "\r\n");
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_two_frames_back_to_back() {
        let mut asm = FrameAssembler::new();
        let frames = feed(
            &mut asm,
            "Event: PeerEntry\r\n\r\nEvent: PeerlistComplete\r\n\r\n",
        );
        assert_eq!(frames.len(), 2);
        assert!(frames[1].starts_with("Event: PeerlistComplete"));
    }

    #[test]
    fn test_leading_blank_lines_skipped() {
        let mut asm = FrameAssembler::new();
        let frames = feed(&mut asm, "\r\n\r\nResponse: Success\r\n\r\n");
        assert_eq!(frames, vec!["Response: Success\r\n\r\n".to_string()]);
    }

    #[test]
    fn test_bare_lf_is_normalized() {
        let mut asm = FrameAssembler::new();
        let frames = feed(&mut asm, "Response: Success\nMessage: ok\n\n");
        assert_eq!(
            frames,
            vec!["Response: Success\r\nMessage: ok\r\n\r\n".to_string()]
        );
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut asm = FrameAssembler::new();
        let line = format!("X-Big: {}\r\n", "a".repeat(MAX_FRAME_SIZE));
        assert!(asm
            .push_line(&line)
            .is_err());
        assert!(!asm.is_partial());
    }

    #[test]
    fn test_parse_frame_fields() {
        let msg = parse_frame("Response: Success\r\nMessage:   Authentication accepted  \r\n\r\n")
            .unwrap();
        assert_eq!(msg.get("Response"), "Success");
        assert_eq!(msg.get("Message"), "Authentication accepted");
    }

    #[test]
    fn test_parse_splits_on_first_colon() {
        let msg = parse_frame("Event: Newchannel\r\nChannel: PJSIP/100-0001\r\nCallerIDName: a:b:c\r\n\r\n")
            .unwrap();
        assert_eq!(msg.get("CallerIDName"), "a:b:c");
    }

    #[test]
    fn test_parse_duplicate_names_append() {
        let msg = parse_frame("Event: VarSet\r\nVariable: a=1\r\nVariable: b=2\r\n\r\n").unwrap();
        assert_eq!(msg.values("Variable"), vec!["a=1", "b=2"]);
    }

    #[test]
    fn test_parse_stops_at_blank_line() {
        let msg = parse_frame("Response: Success\r\n\r\nEvent: Trailing\r\n\r\n").unwrap();
        assert_eq!(msg.len(), 1);
        assert!(!msg.contains("Event"));
    }

    #[test]
    fn test_parse_garbage_line_aborts() {
        let err = parse_frame("Response: Success\r\nthis line has no separator\r\n\r\n").unwrap_err();
        assert!(
            matches!(err, AmiError::InvalidHeader { ref header } if header == "this line has no separator")
        );
    }

    #[test]
    fn test_parse_empty_value_allowed() {
        let msg = parse_frame("Event: Newchannel\r\nAccountCode:\r\n\r\n").unwrap();
        assert!(msg.contains("AccountCode"));
        assert_eq!(msg.get("AccountCode"), "");
    }

    #[test]
    fn test_render_frame() {
        let frame = render_frame([("Action", "Ping"), ("ActionID", "X-1")]);
        assert_eq!(frame, "Action: Ping\r\nActionID: X-1\r\n\r\n");
    }
}
