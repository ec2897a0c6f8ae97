// sipsift - The Siphon SIP Traffic Inspector
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Media stream tracking and attribute rendering against stored calls.

use std::time::{Duration, SystemTime};

use sift_core::{Attr, CapturedPacket, Endpoint, Transport};
use sift_store::{CallRegistry, CaptureOpts, MatchOpts, SortOpts};

fn ts(seq: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + seq)
}

fn packet(seq: u64, payload: String) -> CapturedPacket {
    CapturedPacket::new(
        Endpoint::parse("192.0.2.1:5060").unwrap(),
        Endpoint::parse("192.0.2.2:5060").unwrap(),
        Transport::Udp,
        ts(seq),
        payload,
    )
}

fn invite_with_sdp(call_id: &str, media_port: u16) -> String {
    let body = format!(
        "v=0\r\n\
         o=alice 1 1 IN IP4 198.51.100.1\r\n\
         s=-\r\n\
         c=IN IP4 198.51.100.1\r\n\
         t=0 0\r\n\
         m=audio {media_port} RTP/AVP 0\r\n\
         a=rtpmap:0 PCMU/8000\r\n"
    );
    format!(
        "INVITE sip:bob@example.com SIP/2.0\r\n\
         From: <sip:alice@example.com>;tag=1\r\n\
         To: <sip:bob@example.com>\r\n\
         Call-ID: {call_id}\r\n\
         CSeq: 1 INVITE\r\n\
         Content-Type: application/sdp\r\n\
         Content-Length: {}\r\n\r\n{body}",
        body.len()
    )
}

fn rtp_registry() -> CallRegistry {
    CallRegistry::new(
        CaptureOpts {
            rtp: true,
            ..CaptureOpts::default()
        },
        MatchOpts::default(),
        SortOpts::default(),
    )
    .unwrap()
}

#[test]
fn sdp_announces_streams() {
    let reg = rtp_registry();
    reg.check_packet(packet(0, invite_with_sdp("m1", 49170)))
        .unwrap();

    let calls = reg.calls();
    let call = calls.get("m1").unwrap();
    assert_eq!(call.streams().len(), 1);
    let stream = &call.streams()[0];
    assert_eq!(stream.dst().to_string(), "198.51.100.1:49170");
    assert_eq!(stream.media_type(), "audio");
    assert_eq!(stream.format_code(), 0);
    assert!(stream.src().is_none(), "source unknown until RTP arrives");
    assert_eq!(stream.packet_count(), 0);
}

#[test]
fn duplicate_media_coalesces() {
    let reg = rtp_registry();
    reg.check_packet(packet(0, invite_with_sdp("m2", 49170)))
        .unwrap();
    // Retransmitted INVITE announces the same stream again.
    reg.check_packet(packet(5, invite_with_sdp("m2", 49170)))
        .unwrap();

    let calls = reg.calls();
    let call = calls.get("m2").unwrap();
    assert_eq!(call.streams().len(), 1, "same endpoint+format coalesces");
    assert_eq!(call.streams()[0].last_seen(), ts(5));
    assert_eq!(call.streams()[0].first_seen(), ts(0));
    assert_eq!(call.msgs().len(), 2, "the repeat is still stored");
}

#[test]
fn rtp_packets_count_against_streams() {
    let reg = rtp_registry();
    reg.check_packet(packet(0, invite_with_sdp("m3", 49170)))
        .unwrap();
    reg.has_changed();

    let media_src = Endpoint::parse("203.0.113.7:31000").unwrap();
    let media_dst = Endpoint::parse("198.51.100.1:49170").unwrap();
    assert!(reg.rtp_packet(media_src, media_dst, ts(10)));
    assert!(reg.rtp_packet(media_src, media_dst, ts(11)));
    let unknown_dst = Endpoint::parse("198.51.100.9:4000").unwrap();
    assert!(!reg.rtp_packet(media_src, unknown_dst, ts(12)));
    assert!(reg.has_changed());

    let calls = reg.calls();
    let call = calls.get("m3").unwrap();
    assert_eq!(call.streams()[0].packet_count(), 2);
    assert_eq!(call.streams()[0].src(), Some(media_src));
    assert_eq!(
        calls.attribute(call, Attr::RtpCount).as_deref(),
        Some("2")
    );
}

#[test]
fn rtp_tracking_disabled_by_default() {
    let reg = CallRegistry::new(
        CaptureOpts::default(),
        MatchOpts::default(),
        SortOpts::default(),
    )
    .unwrap();
    reg.check_packet(packet(0, invite_with_sdp("m4", 49170)))
        .unwrap();

    let media_src = Endpoint::parse("203.0.113.7:31000").unwrap();
    let media_dst = Endpoint::parse("198.51.100.1:49170").unwrap();
    assert!(!reg.rtp_packet(media_src, media_dst, ts(10)));
    assert_eq!(reg.calls().get("m4").unwrap().rtp_packet_total(), 0);
}

#[test]
fn call_attributes_render() {
    let reg = rtp_registry();
    reg.check_packet(packet(0, invite_with_sdp("attr-call", 49170)))
        .unwrap();

    let calls = reg.calls();
    let call = calls.get("attr-call").unwrap();
    let attr = |a| calls.attribute(call, a);

    assert_eq!(attr(Attr::CallId).as_deref(), Some("attr-call"));
    assert_eq!(attr(Attr::XCallId), None);
    assert_eq!(attr(Attr::From).as_deref(), Some("alice"));
    assert_eq!(attr(Attr::To).as_deref(), Some("bob"));
    assert_eq!(attr(Attr::SipFrom).as_deref(), Some("alice@example.com"));
    assert_eq!(attr(Attr::SipTo).as_deref(), Some("bob@example.com"));
    assert_eq!(attr(Attr::Src).as_deref(), Some("192.0.2.1:5060"));
    assert_eq!(attr(Attr::Dst).as_deref(), Some("192.0.2.2:5060"));
    assert_eq!(attr(Attr::Method).as_deref(), Some("INVITE"));
    assert_eq!(attr(Attr::CSeq).as_deref(), Some("1"));
    assert_eq!(attr(Attr::MsgCount).as_deref(), Some("1"));
    assert_eq!(attr(Attr::State).as_deref(), Some("CALL SETUP"));
    assert_eq!(attr(Attr::Transport).as_deref(), Some("UDP"));
    assert_eq!(attr(Attr::TotalDuration).as_deref(), Some("0:00:00"));
    assert_eq!(attr(Attr::ConvDuration), None, "no conversation yet");
    assert_eq!(attr(Attr::Reason), None);
    assert!(attr(Attr::Date).is_some());
    assert!(attr(Attr::Time).is_some());
}

#[test]
fn call_list_line_carries_summary_fields() {
    let reg = rtp_registry();
    reg.check_packet(packet(0, invite_with_sdp("line-call", 49170)))
        .unwrap();

    let calls = reg.calls();
    let call = calls.get("line-call").unwrap();
    let line = calls.call_list_line(call);
    assert!(line.contains("INVITE"));
    assert!(line.contains("alice@example.com"));
    assert!(line.contains("192.0.2.1:5060"));
    assert!(line.contains("CALL SETUP"));
}
