// sipsift - The Siphon SIP Traffic Inspector
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use bytes::Bytes;
use once_cell::sync::OnceCell;
use smol_str::SmolStr;
use std::time::SystemTime;

use crate::endpoint::{Endpoint, Transport};
use crate::method::ReqResp;
use crate::packet::CapturedPacket;

/// From/To fields of a message, parsed on first attribute access.
///
/// High-volume captures store thousands of messages that are never
/// inspected; deferring this parse keeps admission on the cheap path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderFields {
    /// Full From URI (user@host), `<malformed>` when the header is absent.
    pub sip_from: SmolStr,
    /// Full To URI, `<malformed>` when the header is absent.
    pub sip_to: SmolStr,
    /// User part of the From URI, when one is present.
    pub from_user: Option<SmolStr>,
    /// User part of the To URI, when one is present.
    pub to_user: Option<SmolStr>,
    /// Whether the To header carried a tag parameter.
    pub to_tag: bool,
}

/// A SIP message owned by exactly one call.
///
/// Everything needed for admission decisions (request/response code, CSeq,
/// Call-ID linkage) is parsed before the message is stored; the remaining
/// header fields stay raw until first access. Once stored, a message is
/// immutable.
#[derive(Debug)]
pub struct SipMessage {
    req_resp: ReqResp,
    resp_text: Option<SmolStr>,
    cseq: Option<u32>,
    cseq_method: Option<SmolStr>,
    call_id: SmolStr,
    x_call_id: Option<SmolStr>,
    src: Endpoint,
    dst: Endpoint,
    transport: Transport,
    ts: SystemTime,
    payload: Bytes,
    fields: OnceCell<HeaderFields>,
}

impl SipMessage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        packet: CapturedPacket,
        req_resp: ReqResp,
        resp_text: Option<SmolStr>,
        cseq: Option<(u32, SmolStr)>,
        call_id: SmolStr,
        x_call_id: Option<SmolStr>,
    ) -> Self {
        let (cseq_num, cseq_method) = match cseq {
            Some((num, method)) => (Some(num), Some(method)),
            None => (None, None),
        };
        Self {
            req_resp,
            resp_text,
            cseq: cseq_num,
            cseq_method,
            call_id,
            x_call_id,
            src: packet.src,
            dst: packet.dst,
            transport: packet.transport,
            ts: packet.ts,
            payload: packet.payload,
            fields: OnceCell::new(),
        }
    }

    pub fn req_resp(&self) -> ReqResp {
        self.req_resp
    }

    pub fn is_request(&self) -> bool {
        self.req_resp.is_request()
    }

    pub fn cseq(&self) -> Option<u32> {
        self.cseq
    }

    pub fn cseq_method(&self) -> Option<&str> {
        self.cseq_method.as_deref()
    }

    pub fn call_id(&self) -> &SmolStr {
        &self.call_id
    }

    pub fn x_call_id(&self) -> Option<&SmolStr> {
        self.x_call_id.as_ref()
    }

    pub fn src(&self) -> Endpoint {
        self.src
    }

    pub fn dst(&self) -> Endpoint {
        self.dst
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn ts(&self) -> SystemTime {
        self.ts
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload as text. Payloads are validated as UTF-8 before storage, so
    /// this only falls back to empty on a message constructed by hand.
    pub fn payload_str(&self) -> &str {
        std::str::from_utf8(&self.payload).unwrap_or_default()
    }

    /// Renders the request method or response code, preferring a literal
    /// non-default reason phrase when the wire carried one.
    pub fn method_display(&self) -> SmolStr {
        match &self.resp_text {
            Some(text) => text.clone(),
            None => self.req_resp.display_str(),
        }
    }

    /// Lazily parsed header fields, if the parse already ran.
    pub fn header_fields(&self) -> Option<&HeaderFields> {
        self.fields.get()
    }

    /// Returns the parsed header fields, running `parse` on first access.
    ///
    /// The parse is idempotent: concurrent callers under a shared registry
    /// lock observe a single initialization.
    pub fn header_fields_or_parse(
        &self,
        parse: impl FnOnce(&str) -> HeaderFields,
    ) -> &HeaderFields {
        self.fields.get_or_init(|| parse(self.payload_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;
    use std::net::{IpAddr, Ipv4Addr};

    fn packet() -> CapturedPacket {
        CapturedPacket::new(
            Endpoint::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 5060),
            Endpoint::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), 5060),
            Transport::Udp,
            SystemTime::UNIX_EPOCH,
            &b"INVITE sip:bob@example.com SIP/2.0\r\n\r\n"[..],
        )
    }

    #[test]
    fn lazy_fields_parse_once() {
        let msg = SipMessage::new(
            packet(),
            ReqResp::Request(Method::Invite),
            None,
            Some((1, SmolStr::new_static("INVITE"))),
            SmolStr::new_static("abc@host"),
            None,
        );
        assert!(msg.header_fields().is_none());

        let mut calls = 0;
        for _ in 0..2 {
            msg.header_fields_or_parse(|_| {
                calls += 1;
                HeaderFields {
                    sip_from: SmolStr::new_static("alice@example.com"),
                    sip_to: SmolStr::new_static("bob@example.com"),
                    from_user: Some(SmolStr::new_static("alice")),
                    to_user: Some(SmolStr::new_static("bob")),
                    to_tag: false,
                }
            });
        }
        assert_eq!(calls, 1);
        assert!(msg.header_fields().is_some());
    }

    #[test]
    fn method_display_prefers_literal_reason() {
        let msg = SipMessage::new(
            packet(),
            ReqResp::Response(200),
            Some(SmolStr::new_static("200 Everything Is Fine")),
            None,
            SmolStr::new_static("abc@host"),
            None,
        );
        assert_eq!(msg.method_display(), "200 Everything Is Fine");
    }
}
