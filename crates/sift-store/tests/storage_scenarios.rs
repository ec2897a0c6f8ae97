// sipsift - The Siphon SIP Traffic Inspector
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end storage scenarios: admission, dialog grouping, rotation,
//! filtering and X-Call-ID linkage.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use sift_core::{Attr, CallState, CapturedPacket, Endpoint, Transport};
use sift_store::{
    CallRegistry, CaptureOpts, FilterExpr, FilterField, MatchOpts, SortOpts, Verdict,
};

fn registry(capture: CaptureOpts, matching: MatchOpts) -> CallRegistry {
    CallRegistry::new(capture, matching, SortOpts::default()).unwrap()
}

fn packet(seq: u64, payload: String) -> CapturedPacket {
    CapturedPacket::new(
        Endpoint::parse("192.0.2.1:5060").unwrap(),
        Endpoint::parse("192.0.2.2:5060").unwrap(),
        Transport::Udp,
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + seq),
        payload,
    )
}

fn request(method: &str, call_id: &str, from: &str, to: &str, cseq: u32, extra: &str) -> String {
    format!(
        "{method} sip:{to} SIP/2.0\r\n\
         Via: SIP/2.0/UDP client.example.com;branch=z9hG4bK{cseq}\r\n\
         From: <sip:{from}>;tag=f-{call_id}\r\n\
         To: <sip:{to}>\r\n\
         Call-ID: {call_id}\r\n\
         CSeq: {cseq} {method}\r\n\
         {extra}Content-Length: 0\r\n\r\n"
    )
}

fn response(code: u16, reason: &str, call_id: &str, cseq: u32, method: &str) -> String {
    format!(
        "SIP/2.0 {code} {reason}\r\n\
         From: <sip:alice@example.com>;tag=f-{call_id}\r\n\
         To: <sip:bob@example.com>;tag=t-{call_id}\r\n\
         Call-ID: {call_id}\r\n\
         CSeq: {cseq} {method}\r\n\
         Content-Length: 0\r\n\r\n"
    )
}

fn invite(call_id: &str, from: &str) -> String {
    request("INVITE", call_id, from, "bob@example.com", 1, "")
}

#[test]
fn admission_invite_only() {
    let reg = registry(
        CaptureOpts::default(),
        MatchOpts {
            invite: true,
            ..MatchOpts::default()
        },
    );

    let options = request(
        "OPTIONS",
        "abc@h",
        "alice@example.com",
        "bob@example.com",
        1,
        "",
    );
    assert!(reg.check_packet(packet(0, options)).is_none());
    assert_eq!(reg.stats().total, 0);
    assert!(!reg.has_changed());

    let stored = reg.check_packet(packet(1, invite("abc@h", "alice@example.com")));
    assert_eq!(stored.unwrap().call_id, "abc@h");
    assert_eq!(reg.stats().total, 1);
    assert!(reg.has_changed());
    assert!(!reg.has_changed(), "flag clears atomically on poll");
}

#[test]
fn dialog_append_keeps_arrival_order() {
    let reg = registry(CaptureOpts::default(), MatchOpts::default());

    reg.check_packet(packet(0, invite("x1", "alice@example.com")))
        .unwrap();
    reg.check_packet(packet(1, response(100, "Trying", "x1", 1, "INVITE")))
        .unwrap();
    reg.check_packet(packet(2, response(200, "OK", "x1", 1, "INVITE")))
        .unwrap();

    let calls = reg.calls();
    let call = calls.get("x1").unwrap();
    assert_eq!(call.msgs().len(), 3);
    let codes: Vec<u16> = call.msgs().iter().map(|m| m.req_resp().code()).collect();
    assert_eq!(codes, [2, 100, 200]);
    for pair in call.msgs().windows(2) {
        assert!(pair[0].ts() <= pair[1].ts(), "messages arrival-ordered");
    }
    assert_eq!(reg.stats().total, 1);
}

#[test]
fn rotation_evicts_oldest() {
    let reg = registry(
        CaptureOpts {
            limit: 2,
            rotate: true,
            ..CaptureOpts::default()
        },
        MatchOpts::default(),
    );

    for (seq, id) in ["c1", "c2", "c3"].iter().enumerate() {
        reg.check_packet(packet(seq as u64, invite(id, "alice@example.com")))
            .unwrap();
    }

    assert!(reg.has_changed());
    let calls = reg.calls();
    let order: Vec<String> = calls.iter_all().map(|c| c.call_id().to_string()).collect();
    assert_eq!(order, ["c2", "c3"]);
    assert!(calls.get("c1").is_none());
    assert!(calls.get("c2").is_some() && calls.get("c3").is_some());
}

#[test]
fn without_rotation_new_call_is_dropped() {
    let reg = registry(
        CaptureOpts {
            limit: 2,
            rotate: false,
            ..CaptureOpts::default()
        },
        MatchOpts::default(),
    );

    for (seq, id) in ["c1", "c2", "c3"].iter().enumerate() {
        let _ = reg.check_packet(packet(seq as u64, invite(id, "alice@example.com")));
    }

    let calls = reg.calls();
    let order: Vec<String> = calls.iter_all().map(|c| c.call_id().to_string()).collect();
    assert_eq!(order, ["c1", "c2"]);
    assert!(calls.get("c3").is_none());
    drop(calls);
    assert_eq!(reg.dropped(), 1);
}

#[test]
fn rotation_skips_locked_calls() {
    let reg = registry(
        CaptureOpts {
            limit: 2,
            rotate: true,
            ..CaptureOpts::default()
        },
        MatchOpts::default(),
    );

    reg.check_packet(packet(0, invite("keep", "alice@example.com")))
        .unwrap();
    reg.check_packet(packet(1, invite("old", "alice@example.com")))
        .unwrap();
    assert!(reg.lock_call("keep", true));

    reg.check_packet(packet(2, invite("new", "alice@example.com")))
        .unwrap();

    let calls = reg.calls();
    assert!(calls.get("keep").is_some(), "locked call survives rotation");
    assert!(calls.get("old").is_none());
    assert!(calls.get("new").is_some());
}

#[test]
fn filter_verdict_cache_follows_filter_changes() {
    let reg = registry(CaptureOpts::default(), MatchOpts::default());

    reg.check_packet(packet(0, invite("a1", "alice@example.com")))
        .unwrap();
    reg.check_packet(packet(1, invite("b1", "bob@example.com")))
        .unwrap();

    reg.filter_set(FilterField::From, Some(FilterExpr::new("alice")))
        .unwrap();
    assert_eq!(reg.stats().displayed, 1);
    {
        let calls = reg.calls();
        assert_eq!(calls.get("a1").unwrap().verdict(), Verdict::Pass);
        assert_eq!(calls.get("b1").unwrap().verdict(), Verdict::Reject);
    }

    reg.filter_set(FilterField::From, Some(FilterExpr::new("bob")))
        .unwrap();
    let stats = reg.stats();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.displayed, 1, "bob call passes, alice rejects");
    let calls = reg.calls();
    assert_eq!(calls.get("b1").unwrap().verdict(), Verdict::Pass);
    assert_eq!(calls.get("a1").unwrap().verdict(), Verdict::Reject);
}

#[test]
fn bad_filter_pattern_preserves_state() {
    let reg = registry(CaptureOpts::default(), MatchOpts::default());
    reg.filter_set(FilterField::From, Some(FilterExpr::new("alice")))
        .unwrap();

    let err = reg.filter_set(FilterField::From, Some(FilterExpr::new("al(ice")));
    assert!(err.is_err());
    assert_eq!(
        reg.filter_get(FilterField::From).map(|f| f.expr),
        Some("alice".into()),
        "prior filter untouched on compile failure"
    );
}

#[test]
fn x_call_id_resolves_late() {
    let reg = registry(CaptureOpts::default(), MatchOpts::default());

    let leg_b = request(
        "INVITE",
        "B",
        "gw@b2bua.example.com",
        "bob@example.com",
        1,
        "X-Call-ID: A\r\n",
    );
    reg.check_packet(packet(0, leg_b)).unwrap();

    {
        let calls = reg.calls();
        let b = calls.get("B").unwrap();
        assert_eq!(b.x_call_id().unwrap(), "A");
        assert!(calls.xcall(b).is_none(), "link unresolved until A exists");
    }

    reg.check_packet(packet(1, invite("A", "alice@example.com")))
        .unwrap();

    let calls = reg.calls();
    let b = calls.get("B").unwrap();
    let a = calls.xcall(b).expect("link resolves once A is stored");
    assert_eq!(a.call_id(), "A");
    assert_eq!(a.xcalls(), ["B"], "reverse link adopted on creation");
}

#[test]
fn payload_filter_ors_over_messages() {
    let reg = registry(CaptureOpts::default(), MatchOpts::default());

    reg.check_packet(packet(0, invite("full", "alice@example.com")))
        .unwrap();
    reg.check_packet(packet(1, response(200, "OK", "full", 1, "INVITE")))
        .unwrap();
    reg.check_packet(packet(
        2,
        request("BYE", "full", "alice@example.com", "bob@example.com", 2, ""),
    ))
    .unwrap();

    reg.check_packet(packet(3, invite("short", "alice@example.com")))
        .unwrap();
    reg.check_packet(packet(4, response(200, "OK", "short", 1, "INVITE")))
        .unwrap();

    reg.filter_set(FilterField::Payload, Some(FilterExpr::new("bye")))
        .unwrap();
    assert_eq!(reg.stats().displayed, 1);
    let calls = reg.calls();
    assert!(calls.matches_filters(calls.get("full").unwrap()));
    assert!(!calls.matches_filters(calls.get("short").unwrap()));
}

#[test]
fn complete_only_drops_mid_dialog_starts() {
    let reg = registry(
        CaptureOpts::default(),
        MatchOpts {
            complete: true,
            ..MatchOpts::default()
        },
    );

    let mid_dialog = request(
        "BYE",
        "old-dialog",
        "alice@example.com",
        "bob@example.com;tag=established",
        7,
        "",
    );
    assert!(reg.check_packet(packet(0, mid_dialog)).is_none());
    assert_eq!(reg.stats().total, 0);

    reg.check_packet(packet(1, invite("fresh", "alice@example.com")))
        .unwrap();
    assert_eq!(reg.stats().total, 1);
}

#[test]
fn match_expression_gates_admission() {
    let reg = registry(
        CaptureOpts::default(),
        MatchOpts {
            mexpr: Some("alice".into()),
            micase: true,
            ..MatchOpts::default()
        },
    );

    assert!(reg
        .check_packet(packet(0, invite("no-match", "carol@example.com")))
        .is_none());
    assert!(reg
        .check_packet(packet(1, invite("match", "ALICE@example.com")))
        .is_some());
    assert_eq!(reg.stats().total, 1);

    let inverted = CallRegistry::new(
        CaptureOpts::default(),
        MatchOpts {
            mexpr: Some("alice".into()),
            minvert: true,
            ..MatchOpts::default()
        },
        SortOpts::default(),
    )
    .unwrap();
    assert!(inverted
        .check_packet(packet(0, invite("match", "alice@example.com")))
        .is_none());
    assert!(inverted
        .check_packet(packet(1, invite("other", "carol@example.com")))
        .is_some());
}

#[test]
fn bad_match_expression_fails_init() {
    let err = CallRegistry::new(
        CaptureOpts::default(),
        MatchOpts {
            mexpr: Some("al(ice".into()),
            ..MatchOpts::default()
        },
        SortOpts::default(),
    );
    assert!(err.is_err());
}

#[test]
fn indices_are_strictly_increasing() {
    let reg = registry(
        CaptureOpts {
            limit: 2,
            rotate: true,
            ..CaptureOpts::default()
        },
        MatchOpts::default(),
    );

    for seq in 0..5u64 {
        reg.check_packet(packet(seq, invite(&format!("c{seq}"), "alice@example.com")))
            .unwrap();
    }

    let calls = reg.calls();
    let indices: Vec<u64> = calls.iter_all().map(|c| c.index()).collect();
    assert_eq!(indices, [4, 5], "indices survive rotation and never reuse");
}

#[test]
fn dialog_state_machine() {
    let reg = registry(CaptureOpts::default(), MatchOpts::default());

    reg.check_packet(packet(0, invite("s1", "alice@example.com")))
        .unwrap();
    {
        let calls = reg.calls();
        let call = calls.get("s1").unwrap();
        assert_eq!(call.state(), Some(CallState::Setup));
        assert!(calls.is_active(call));
    }

    reg.check_packet(packet(1, response(200, "OK", "s1", 1, "INVITE")))
        .unwrap();
    reg.check_packet(packet(
        2,
        request("ACK", "s1", "alice@example.com", "bob@example.com", 1, ""),
    ))
    .unwrap();
    {
        let calls = reg.calls();
        assert_eq!(calls.get("s1").unwrap().state(), Some(CallState::InCall));
    }

    reg.check_packet(packet(
        3,
        request("BYE", "s1", "alice@example.com", "bob@example.com", 2, ""),
    ))
    .unwrap();
    let calls = reg.calls();
    let call = calls.get("s1").unwrap();
    assert_eq!(call.state(), Some(CallState::Completed));
    assert!(
        !calls.is_active(call),
        "terminal dialog leaves the active list"
    );
    assert_eq!(
        calls.attribute(call, Attr::State).as_deref(),
        Some("COMPLETED")
    );
}

#[test]
fn cancelled_dialog_leaves_active() {
    let reg = registry(CaptureOpts::default(), MatchOpts::default());

    reg.check_packet(packet(0, invite("c1", "alice@example.com")))
        .unwrap();
    reg.check_packet(packet(
        1,
        request("CANCEL", "c1", "alice@example.com", "bob@example.com", 1, ""),
    ))
    .unwrap();

    let calls = reg.calls();
    let call = calls.get("c1").unwrap();
    assert_eq!(call.state(), Some(CallState::Cancelled));
    assert_eq!(calls.active().count(), 0);
}

#[test]
fn soft_clear_keeps_matching_calls() {
    let reg = registry(CaptureOpts::default(), MatchOpts::default());

    reg.check_packet(packet(0, invite("a1", "alice@example.com")))
        .unwrap();
    reg.check_packet(packet(1, invite("b1", "bob@example.com")))
        .unwrap();
    reg.filter_set(FilterField::From, Some(FilterExpr::new("alice")))
        .unwrap();
    reg.has_changed();

    reg.clear_soft();

    assert!(reg.has_changed());
    let calls = reg.calls();
    assert!(calls.get("a1").is_some());
    assert!(calls.get("b1").is_none());
    assert_eq!(calls.len(), 1);
}

#[test]
fn clear_removes_everything() {
    let reg = registry(CaptureOpts::default(), MatchOpts::default());
    reg.check_packet(packet(0, invite("a1", "alice@example.com")))
        .unwrap();
    reg.has_changed();

    reg.clear();

    assert!(reg.has_changed());
    assert_eq!(reg.stats().total, 0);
    assert!(reg.calls().is_empty());
}

#[test]
fn sort_view_follows_sort_key() {
    let reg = registry(CaptureOpts::default(), MatchOpts::default());

    reg.check_packet(packet(0, invite("zulu", "zoe@example.com")))
        .unwrap();
    reg.check_packet(packet(1, invite("alpha", "amy@example.com")))
        .unwrap();

    reg.set_sort_options(SortOpts {
        by: Attr::SipFrom,
        asc: true,
    });
    {
        let calls = reg.calls();
        let order: Vec<String> = calls.iter().map(|c| c.call_id().to_string()).collect();
        assert_eq!(order, ["alpha", "zulu"]);
        assert_eq!(calls.get_index(0).unwrap().call_id(), "alpha");
    }

    reg.set_sort_options(SortOpts {
        by: Attr::SipFrom,
        asc: false,
    });
    let calls = reg.calls();
    let order: Vec<String> = calls.iter().map(|c| c.call_id().to_string()).collect();
    assert_eq!(order, ["zulu", "alpha"]);
}

#[test]
fn message_header_summary() {
    let reg = registry(CaptureOpts::default(), MatchOpts::default());
    let stored = reg
        .check_packet(packet(0, invite("hdr@test", "alice@example.com")))
        .unwrap();

    let calls = reg.calls();
    let call = calls.get(stored.call_id.as_str()).unwrap();
    let header = calls.msg_header(&call.msgs()[stored.msg_index]);
    assert!(header.contains("192.0.2.1:5060 -> 192.0.2.2:5060"));
    assert!(header.contains("INVITE"));
    assert!(header.ends_with("hdr@test"));
}

#[test]
fn concurrent_reads_during_capture() {
    let reg = Arc::new(registry(CaptureOpts::default(), MatchOpts::default()));

    let writer = {
        let reg = Arc::clone(&reg);
        std::thread::spawn(move || {
            for seq in 0..200u64 {
                let id = format!("load-{}", seq % 20);
                let _ = reg.check_packet(packet(seq, invite(&id, "alice@example.com")));
            }
        })
    };
    let reader = {
        let reg = Arc::clone(&reg);
        std::thread::spawn(move || {
            let mut seen = 0usize;
            for _ in 0..200 {
                let stats = reg.stats();
                assert!(stats.displayed <= stats.total);
                seen = seen.max(reg.calls().iter().count());
            }
            seen
        })
    };

    writer.join().unwrap();
    assert!(reader.join().unwrap() <= 20);
    assert_eq!(reg.stats().total, 20);
}
