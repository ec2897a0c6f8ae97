// sipsift - The Siphon SIP Traffic Inspector
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Feeds a couple of synthetic dialogs through the registry and prints
//! the resulting call list, the way a capture frontend would drive it.
//!
//! Run with: cargo run --example synthetic_feed

use anyhow::Result;
use std::time::{Duration, SystemTime};

use sift_core::{Attr, CapturedPacket, Endpoint, Transport};
use sift_store::{CallRegistry, CaptureOpts, FilterExpr, FilterField, MatchOpts, SortOpts};

fn packet(seq: u64, src: &str, dst: &str, payload: String) -> Result<CapturedPacket> {
    let parse = |s| Endpoint::parse(s).ok_or_else(|| anyhow::anyhow!("bad endpoint {s}"));
    Ok(CapturedPacket::new(
        parse(src)?,
        parse(dst)?,
        Transport::Udp,
        SystemTime::now() + Duration::from_millis(seq * 20),
        payload,
    ))
}

fn dialog(call_id: &str, from: &str, to: &str) -> Vec<String> {
    let head = |line: &str, cseq: &str| {
        format!(
            "{line}\r\n\
             From: <sip:{from}>;tag=t-{call_id}\r\n\
             To: <sip:{to}>\r\n\
             Call-ID: {call_id}\r\n\
             CSeq: {cseq}\r\n\
             Content-Length: 0\r\n\r\n"
        )
    };
    vec![
        head(&format!("INVITE sip:{to} SIP/2.0"), "1 INVITE"),
        head("SIP/2.0 180 Ringing", "1 INVITE"),
        head("SIP/2.0 200 OK", "1 INVITE"),
        head(&format!("ACK sip:{to} SIP/2.0"), "1 ACK"),
        head(&format!("BYE sip:{to} SIP/2.0"), "2 BYE"),
    ]
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sift_store=debug".into()),
        )
        .init();

    let registry = CallRegistry::new(
        CaptureOpts::default(),
        MatchOpts::default(),
        SortOpts::default(),
    )?;

    let mut seq = 0;
    for (call_id, from, to) in [
        ("a84b4c76@pbx", "alice@example.com", "bob@example.com"),
        ("77fa0c21@pbx", "carol@example.net", "dave@example.net"),
    ] {
        for payload in dialog(call_id, from, to) {
            let _ = registry.check_packet(packet(seq, "192.0.2.1:5060", "192.0.2.2:5060", payload)?);
            seq += 1;
        }
    }

    registry.filter_set(FilterField::From, Some(FilterExpr::new("example.com")))?;

    let stats = registry.stats();
    println!("captured {} calls, {} displayed\n", stats.total, stats.displayed);

    let calls = registry.calls();
    for call in calls.iter() {
        println!("{}", calls.call_list_line(call));
        for msg in call.msgs() {
            println!("    {}", calls.msg_header(msg));
        }
        if let Some(state) = calls.attribute(call, Attr::State) {
            println!("    state: {state}");
        }
    }

    Ok(())
}
