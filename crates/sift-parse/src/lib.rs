// sipsift - The Siphon SIP Traffic Inspector
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Line-oriented SIP grammar for the storage engine.
//!
//! The grammar compiles every per-field pattern once at construction and is
//! pure afterwards: all matching runs against a borrowed payload, so it can
//! be shared freely between the capture thread and consumer reads.
//!
//! # Example
//! ```
//! use sift_parse::SipGrammar;
//! use sift_core::Transport;
//!
//! let grammar = SipGrammar::new();
//! let payload = b"OPTIONS sip:ping@example.com SIP/2.0\r\nCall-ID: k3x@h1\r\n\r\n";
//! assert_eq!(grammar.call_id(std::str::from_utf8(payload).unwrap()).unwrap(), "k3x@h1");
//! ```

use regex::{Regex, RegexBuilder};
use sift_core::{HeaderFields, ReqResp, Transport, MAX_SIP_PAYLOAD};
use smol_str::SmolStr;

mod media;

pub use media::{media_descriptors, MediaDescriptor};

/// Outcome of payload validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    /// The payload is not a SIP message at all.
    NotSip,
    /// SIP start detected but the body is still incomplete (stream only).
    Partial,
    /// Exactly one complete SIP message.
    Complete,
    /// A complete message followed by more bytes; the first message spans
    /// `head_len` bytes and the caller re-validates the remainder.
    Multiple { head_len: usize },
}

/// Compiled per-field patterns for SIP payload inspection.
///
/// Patterns are case-insensitive and CRLF-line oriented, and accept the
/// compact header forms (`i:`, `f:`, `t:`, `l:`).
#[derive(Debug)]
pub struct SipGrammar {
    valid: Regex,
    method: Regex,
    response: Regex,
    call_id: Regex,
    x_call_id: Regex,
    cseq: Regex,
    from: Regex,
    to: Regex,
    to_tag: Regex,
    content_length: Regex,
    body: Regex,
    reason: Regex,
    warning: Regex,
}

impl SipGrammar {
    pub fn new() -> Self {
        Self {
            valid: line_pattern(
                r"\A(?:(?:REGISTER|INVITE|SUBSCRIBE|NOTIFY|OPTIONS|PUBLISH|MESSAGE|CANCEL|BYE|ACK|PRACK|INFO|REFER|UPDATE) \S+ SIP/2\.0|SIP/2\.0 \d{3})",
            ),
            method: line_pattern(r"\A([A-Za-z]+) [^ :\r\n]+:\S* SIP/2\.0"),
            response: line_pattern(r"\ASIP/2\.0 ((\d{3})(?: [^\r\n]*)?)"),
            call_id: line_pattern(r"^(?:Call-ID|i):[ \t]*([^\r\n]+)"),
            x_call_id: line_pattern(r"^(?:X-Call-ID|X-CID):[ \t]*([^\r\n]+)"),
            cseq: line_pattern(r"^CSeq:[ \t]*(\d+)[ \t]+([A-Za-z]+)"),
            from: line_pattern(r"^(?:From|f):[^:\r\n]+:((?:([^@;>\r\n]+)@)?[^;>\r\n]+)"),
            to: line_pattern(r"^(?:To|t):[^:\r\n]+:((?:([^@;>\r\n]+)@)?[^;>\r\n]+)"),
            to_tag: line_pattern(r"^(?:To|t):[^\r\n]*;[ \t]*tag="),
            content_length: line_pattern(r"^(?:Content-Length|l):[ \t]*(\d+)[ \t]*\r?$"),
            body: line_pattern(r"\r\n\r\n((?s:.*))\z"),
            reason: line_pattern(r#"^Reason:[ \t]*[^\r\n"]*;[ \t]*text="([^\r\n"]+)""#),
            warning: line_pattern(r"^Warning:[ \t]*(\d+)"),
        }
    }

    /// Classifies a raw payload.
    ///
    /// Datagram payloads are complete once the start-line matches. Stream
    /// payloads additionally need a Content-Length header and a body of
    /// exactly that many bytes; surplus bytes mean a second message is
    /// pipelined behind the first.
    pub fn validate(&self, payload: &[u8], transport: Transport) -> Validation {
        if payload.is_empty() || payload.len() > MAX_SIP_PAYLOAD {
            return Validation::NotSip;
        }
        let text = match std::str::from_utf8(payload) {
            Ok(text) => text,
            Err(_) => return Validation::NotSip,
        };
        if !self.valid.is_match(text) {
            return Validation::NotSip;
        }
        if !transport.is_stream() {
            return Validation::Complete;
        }

        let declared = match self.content_length(text) {
            Some(len) => len,
            None => return Validation::Partial,
        };
        let body = match self.body.captures(text).and_then(|c| c.get(1)) {
            Some(body) => body,
            None => return Validation::Partial,
        };

        let got = body.as_str().len();
        if declared > got {
            Validation::Partial
        } else if declared < got {
            Validation::Multiple {
                head_len: body.start() + declared,
            }
        } else {
            Validation::Complete
        }
    }

    /// Cheap Call-ID extraction, the pre-admission path.
    pub fn call_id(&self, payload: &str) -> Option<SmolStr> {
        self.capture_trimmed(&self.call_id, payload)
    }

    /// X-Call-ID (or X-CID) extraction.
    pub fn x_call_id(&self, payload: &str) -> Option<SmolStr> {
        self.capture_trimmed(&self.x_call_id, payload)
    }

    /// Decodes the start line into a request method or response code.
    ///
    /// For responses, the second element carries the literal status text
    /// when it differs from the well-known table; `None` means the payload
    /// has no usable start line.
    pub fn req_resp(&self, payload: &str) -> Option<(ReqResp, Option<SmolStr>)> {
        if let Some(caps) = self.method.captures(payload) {
            let token = caps.get(1)?.as_str();
            return ReqResp::from_start_token(token).map(|rr| (rr, None));
        }

        let caps = self.response.captures(payload)?;
        let code: u16 = caps.get(2)?.as_str().parse().ok()?;
        let text = caps.get(1)?.as_str().trim_end();
        let literal = match sift_core::default_status_text(code) {
            Some(default) if default == text => None,
            _ => Some(SmolStr::new(text)),
        };
        Some((ReqResp::Response(code), literal))
    }

    /// CSeq number and method token.
    pub fn cseq(&self, payload: &str) -> Option<(u32, SmolStr)> {
        let caps = self.cseq.captures(payload)?;
        let num = caps.get(1)?.as_str().parse().ok()?;
        Some((num, SmolStr::new(caps.get(2)?.as_str())))
    }

    /// Whether the To header carries a tag, meaning the dialog was already
    /// established when this message was sent.
    pub fn to_tag_present(&self, payload: &str) -> bool {
        self.to_tag.is_match(payload)
    }

    /// Full From/To parse for the message record.
    ///
    /// A missing From or To is recorded as `<malformed>` rather than
    /// rejecting the message; captures regularly contain such traffic and
    /// it is exactly what an inspector needs to show.
    pub fn header_fields(&self, payload: &str) -> HeaderFields {
        let (sip_from, from_user) = self.uri_parts(&self.from, payload);
        let (sip_to, to_user) = self.uri_parts(&self.to, payload);
        HeaderFields {
            sip_from,
            sip_to,
            from_user,
            to_user,
            to_tag: self.to_tag_present(payload),
        }
    }

    /// Reason header text, parsed for INVITE dialogs only.
    pub fn reason_text(&self, payload: &str) -> Option<SmolStr> {
        self.capture_trimmed(&self.reason, payload)
    }

    /// Warning header code, parsed for INVITE dialogs only.
    pub fn warning_code(&self, payload: &str) -> Option<u16> {
        self.warning
            .captures(payload)
            .and_then(|caps| caps.get(1))
            .and_then(|code| code.as_str().parse().ok())
    }

    /// Message body, everything after the header terminator.
    pub fn body<'p>(&self, payload: &'p str) -> Option<&'p str> {
        self.body
            .captures(payload)
            .and_then(|caps| caps.get(1))
            .map(|body| body.as_str())
    }

    fn content_length(&self, payload: &str) -> Option<usize> {
        self.content_length
            .captures(payload)
            .and_then(|caps| caps.get(1))
            .and_then(|len| len.as_str().parse().ok())
    }

    fn uri_parts(&self, pattern: &Regex, payload: &str) -> (SmolStr, Option<SmolStr>) {
        match pattern.captures(payload) {
            Some(caps) => {
                let full = caps
                    .get(1)
                    .map(|m| SmolStr::new(m.as_str().trim()))
                    .unwrap_or_else(|| SmolStr::new_static("<malformed>"));
                let user = caps.get(2).map(|m| SmolStr::new(m.as_str()));
                (full, user)
            }
            None => (SmolStr::new_static("<malformed>"), None),
        }
    }

    fn capture_trimmed(&self, pattern: &Regex, payload: &str) -> Option<SmolStr> {
        let caps = pattern.captures(payload)?;
        let value = caps.get(1)?.as_str().trim();
        if value.is_empty() {
            None
        } else {
            Some(SmolStr::new(value))
        }
    }
}

impl Default for SipGrammar {
    fn default() -> Self {
        Self::new()
    }
}

fn line_pattern(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .multi_line(true)
        .build()
        .expect("static grammar pattern")
}
