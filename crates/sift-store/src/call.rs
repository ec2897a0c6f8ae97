// sipsift - The Siphon SIP Traffic Inspector
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use smol_str::SmolStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::SystemTime;

use sift_core::{CallState, Endpoint, Method, ReqResp, SipMessage};
use sift_parse::MediaDescriptor;

/// Cached result of evaluating the filter set against a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Verdict {
    Unknown = 0,
    Pass = 1,
    Reject = 2,
}

/// An RTP stream announced by a call's SDP, owned by exactly one call.
///
/// The source endpoint stays unknown until the media plane actually
/// delivers a packet; SDP only predicts the destination.
#[derive(Debug, Clone)]
pub struct RtpStream {
    pub(crate) src: Option<Endpoint>,
    pub(crate) dst: Endpoint,
    pub(crate) media_type: SmolStr,
    pub(crate) format_code: u32,
    pub(crate) formats: Vec<(u32, SmolStr)>,
    pub(crate) first_seen: SystemTime,
    pub(crate) last_seen: SystemTime,
    pub(crate) packet_count: u64,
}

impl RtpStream {
    pub fn src(&self) -> Option<Endpoint> {
        self.src
    }

    pub fn dst(&self) -> Endpoint {
        self.dst
    }

    pub fn media_type(&self) -> &SmolStr {
        &self.media_type
    }

    pub fn format_code(&self) -> u32 {
        self.format_code
    }

    pub fn formats(&self) -> &[(u32, SmolStr)] {
        &self.formats
    }

    pub fn first_seen(&self) -> SystemTime {
        self.first_seen
    }

    pub fn last_seen(&self) -> SystemTime {
        self.last_seen
    }

    pub fn packet_count(&self) -> u64 {
        self.packet_count
    }
}

/// A dialog: every message sharing one Call-ID, plus its media streams.
///
/// Calls are owned by the registry and only mutated under its write lock.
/// The filter verdict is an atomic so consumer reads can memoize their
/// evaluation without upgrading the lock.
#[derive(Debug)]
pub struct Call {
    pub(crate) index: u64,
    pub(crate) call_id: SmolStr,
    pub(crate) x_call_id: Option<SmolStr>,
    pub(crate) xcalls: Vec<SmolStr>,
    pub(crate) msgs: Vec<SipMessage>,
    pub(crate) streams: Vec<RtpStream>,
    pub(crate) state: Option<CallState>,
    pub(crate) invite_cseq: Option<u32>,
    pub(crate) conv_start: Option<usize>,
    pub(crate) conv_end: Option<usize>,
    pub(crate) reason_text: Option<SmolStr>,
    pub(crate) warning: Option<u16>,
    pub(crate) locked: bool,
    pub(crate) filtered: AtomicU8,
}

impl Call {
    pub(crate) fn new(index: u64, call_id: SmolStr, x_call_id: Option<SmolStr>) -> Self {
        Self {
            index,
            call_id,
            x_call_id,
            xcalls: Vec::new(),
            msgs: Vec::new(),
            streams: Vec::new(),
            state: None,
            invite_cseq: None,
            conv_start: None,
            conv_end: None,
            reason_text: None,
            warning: None,
            locked: false,
            filtered: AtomicU8::new(Verdict::Unknown as u8),
        }
    }

    /// Monotonic creation index, never reused.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn call_id(&self) -> &SmolStr {
        &self.call_id
    }

    /// X-Call-ID linkage target, kept as a string. Resolution happens by
    /// registry lookup, so a link to a not-yet-captured or evicted call
    /// simply stays unresolved.
    pub fn x_call_id(&self) -> Option<&SmolStr> {
        self.x_call_id.as_ref()
    }

    /// Call-IDs of calls whose X-Call-ID points at this one.
    pub fn xcalls(&self) -> &[SmolStr] {
        &self.xcalls
    }

    pub fn msgs(&self) -> &[SipMessage] {
        &self.msgs
    }

    pub fn streams(&self) -> &[RtpStream] {
        &self.streams
    }

    pub fn state(&self) -> Option<CallState> {
        self.state
    }

    pub fn reason_text(&self) -> Option<&SmolStr> {
        self.reason_text.as_ref()
    }

    pub fn warning(&self) -> Option<u16> {
        self.warning
    }

    /// Locked calls are exempt from rotation eviction.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn first_msg(&self) -> Option<&SipMessage> {
        self.msgs.first()
    }

    pub fn last_msg(&self) -> Option<&SipMessage> {
        self.msgs.last()
    }

    /// Whether this dialog was started by INVITE. Only those calls carry
    /// state, media and the Reason/Warning extras.
    pub fn is_invite(&self) -> bool {
        matches!(
            self.first_msg().map(SipMessage::req_resp),
            Some(ReqResp::Request(Method::Invite))
        )
    }

    /// Whether the dialog is still expected to receive media.
    pub fn is_active(&self) -> bool {
        self.state.is_some_and(|state| state.is_active())
    }

    /// Total RTP packets observed across all streams.
    pub fn rtp_packet_total(&self) -> u64 {
        self.streams.iter().map(|s| s.packet_count).sum()
    }

    pub fn verdict(&self) -> Verdict {
        match self.filtered.load(Ordering::Relaxed) {
            1 => Verdict::Pass,
            2 => Verdict::Reject,
            _ => Verdict::Unknown,
        }
    }

    pub(crate) fn set_verdict(&self, verdict: Verdict) {
        self.filtered.store(verdict as u8, Ordering::Relaxed);
    }

    pub(crate) fn invalidate_verdict(&self) {
        self.filtered.store(Verdict::Unknown as u8, Ordering::Relaxed);
    }

    /// Appends a message in arrival order. Returns the message index
    /// within the call.
    pub(crate) fn push_message(&mut self, msg: SipMessage) -> usize {
        self.msgs.push(msg);
        self.invalidate_verdict();
        self.msgs.len() - 1
    }

    /// Folds SDP media descriptors into the stream list. A descriptor for
    /// an already-known destination and format refreshes the existing
    /// stream instead of inserting a duplicate.
    pub(crate) fn ingest_media(&mut self, descriptors: Vec<MediaDescriptor>, ts: SystemTime) {
        for descriptor in descriptors {
            let Some(ip) = descriptor.address else {
                continue;
            };
            let dst = Endpoint::new(ip, descriptor.port);
            match self
                .streams
                .iter_mut()
                .find(|s| s.dst == dst && s.format_code == descriptor.preferred_format)
            {
                Some(existing) => {
                    existing.last_seen = ts;
                    if existing.formats.is_empty() {
                        existing.formats = descriptor.formats;
                    }
                }
                None => {
                    self.streams.push(RtpStream {
                        src: None,
                        dst,
                        media_type: descriptor.media_type,
                        format_code: descriptor.preferred_format,
                        formats: descriptor.formats,
                        first_seen: ts,
                        last_seen: ts,
                        packet_count: 0,
                    });
                    self.invalidate_verdict();
                }
            }
        }
    }

    /// Advances the dialog state machine with the message at `msg_index`.
    pub(crate) fn apply_state(&mut self, msg_index: usize) {
        if !self.is_invite() {
            return;
        }
        let rr = self.msgs[msg_index].req_resp();
        let cseq = self.msgs[msg_index].cseq();
        let code = rr.code();

        match self.state {
            Some(CallState::Setup) => {
                if rr == ReqResp::Request(Method::Ack) && self.invite_cseq == cseq {
                    self.state = Some(CallState::InCall);
                    self.conv_start = Some(msg_index);
                } else if rr == ReqResp::Request(Method::Cancel) {
                    self.state = Some(CallState::Cancelled);
                } else if code == 480 || code == 486 || code == 600 {
                    self.state = Some(CallState::Busy);
                } else if code > 400 && self.invite_cseq == cseq {
                    self.state = Some(CallState::Rejected);
                } else if code > 300 {
                    self.state = Some(CallState::Diverted);
                }
            }
            Some(CallState::InCall) => {
                if rr == ReqResp::Request(Method::Bye) {
                    self.state = Some(CallState::Completed);
                    self.conv_end = Some(msg_index);
                }
            }
            // Terminal states: a fresh INVITE (e.g. after an auth
            // challenge) restarts the setup phase.
            Some(_) | None => {
                if rr == ReqResp::Request(Method::Invite) {
                    self.invite_cseq = cseq;
                    self.state = Some(CallState::Setup);
                }
            }
        }
    }
}
