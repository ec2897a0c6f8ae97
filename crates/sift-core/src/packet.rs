// sipsift - The Siphon SIP Traffic Inspector
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use bytes::Bytes;
use std::time::SystemTime;

use crate::endpoint::{Endpoint, Transport};

/// Fully assembled packet delivered by the capture frontend.
///
/// The capture layer owns reassembly: by the time a packet reaches the
/// storage engine its payload is a single contiguous buffer. The storage
/// engine never mutates a packet; accepted payloads are moved into the
/// resulting [`SipMessage`](crate::SipMessage).
#[derive(Debug, Clone)]
pub struct CapturedPacket {
    pub src: Endpoint,
    pub dst: Endpoint,
    pub transport: Transport,
    pub ts: SystemTime,
    pub payload: Bytes,
}

impl CapturedPacket {
    pub fn new(
        src: Endpoint,
        dst: Endpoint,
        transport: Transport,
        ts: SystemTime,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            src,
            dst,
            transport,
            ts,
            payload: payload.into(),
        }
    }

    /// Payload as text, if it is valid UTF-8.
    pub fn payload_utf8(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}
