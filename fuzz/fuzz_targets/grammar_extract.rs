// sipsift - The Siphon SIP Traffic Inspector
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

#![no_main]
use libfuzzer_sys::fuzz_target;
use sift_parse::{media_descriptors, SipGrammar};

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let grammar = SipGrammar::new();
    let _ = grammar.call_id(text);
    let _ = grammar.x_call_id(text);
    let _ = grammar.req_resp(text);
    let _ = grammar.cseq(text);
    let _ = grammar.header_fields(text);
    let _ = grammar.reason_text(text);
    let _ = grammar.warning_code(text);
    let _ = media_descriptors(text);
});
