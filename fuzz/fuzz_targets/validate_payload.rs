// sipsift - The Siphon SIP Traffic Inspector
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

#![no_main]
use libfuzzer_sys::fuzz_target;
use sift_core::Transport;
use sift_parse::{SipGrammar, Validation};

fuzz_target!(|data: &[u8]| {
    let grammar = SipGrammar::new();
    // Validation must classify, never panic, on arbitrary bytes.
    let _ = grammar.validate(data, Transport::Udp);
    match grammar.validate(data, Transport::Tcp) {
        Validation::Multiple { head_len } => {
            // The declared head must stay within the payload and the
            // remainder must re-validate without panicking.
            assert!(head_len <= data.len());
            let _ = grammar.validate(&data[head_len..], Transport::Tcp);
        }
        _ => {}
    }
});
