// sipsift - The Siphon SIP Traffic Inspector
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The call registry: admission, rotation, indices and consumer views.
//!
//! Single writer, many readers. The capture frontend feeds packets
//! through [`CallRegistry::check_packet`] under the registry write lock;
//! consumers take short-lived [`CallsView`] read guards to traverse the
//! call set. Parsing and regex matching never touch the lock.

use parking_lot::{RwLock, RwLockReadGuard};
use regex::{Regex, RegexBuilder};
use smol_str::SmolStr;
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::SystemTime;
use tracing::debug;

use sift_core::{
    CapturedPacket, Endpoint, Method, ReqResp, SipMessage, Transport, MAX_SIP_PAYLOAD,
};
use sift_parse::{media_descriptors, SipGrammar, Validation};

use crate::attr;
use crate::call::Call;
use crate::filter::{Filter, FilterExpr, FilterField, FilterSet};
use crate::sort::{compare, SortOpts};

/// Capture policy: how many calls to keep and what to do at the limit.
#[derive(Debug, Clone)]
pub struct CaptureOpts {
    /// Max number of calls in the registry.
    pub limit: u32,
    /// Evict the oldest non-locked call when the limit is reached.
    pub rotate: bool,
    /// Track RTP packets against announced streams.
    pub rtp: bool,
    /// Packet trace file, written by the capture frontend.
    pub outfile: Option<String>,
}

impl Default for CaptureOpts {
    fn default() -> Self {
        Self {
            limit: 20000,
            rotate: false,
            rtp: false,
            outfile: None,
        }
    }
}

/// Admission policy for new dialogs.
#[derive(Debug, Clone, Default)]
pub struct MatchOpts {
    /// Only store dialogs starting with INVITE.
    pub invite: bool,
    /// Only store dialogs captured from their start (no To-tag on the
    /// first message).
    pub complete: bool,
    /// Payload match expression; non-matching payloads never open a call.
    pub mexpr: Option<String>,
    /// Invert the match expression result.
    pub minvert: bool,
    /// Match case-insensitively.
    pub micase: bool,
}

/// Counters reported to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Calls currently stored.
    pub total: usize,
    /// Calls passing the active filter set.
    pub displayed: usize,
}

/// Acceptance handle returned by [`CallRegistry::check_packet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub call_id: SmolStr,
    pub msg_index: usize,
}

/// Storage configuration failure.
///
/// The only user-visible error: a match or filter expression that does
/// not compile. Per-packet problems are counted, never surfaced.
#[derive(Debug)]
pub enum StorageError {
    InvalidPattern { expr: String, source: regex::Error },
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPattern { expr, source } => {
                write!(f, "invalid match pattern {:?}: {}", expr, source)
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidPattern { source, .. } => Some(source),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    calls: HashMap<SmolStr, Call>,
    /// Creation order, by index.
    all: Vec<SmolStr>,
    /// Current sort order.
    display: Vec<SmolStr>,
    /// Calls still expected to receive media.
    active: Vec<SmolStr>,
    filters: FilterSet,
    sort: SortOpts,
    last_index: u64,
}

/// Owns every call captured so far.
///
/// All structural mutation happens under one write lock, so the indices
/// (`by call-id` map, creation order, sort order, active list) can never
/// disagree with each other. The change flag and dropped counter are
/// atomics readable without the lock.
#[derive(Debug)]
pub struct CallRegistry {
    grammar: SipGrammar,
    capture: CaptureOpts,
    matching: MatchOpts,
    match_regex: Option<Regex>,
    inner: RwLock<Inner>,
    changed: AtomicBool,
    dropped: AtomicU64,
}

impl CallRegistry {
    /// Builds a registry, compiling the match expression up front.
    ///
    /// Fails only on a bad expression; nothing is committed in that case.
    pub fn new(
        capture: CaptureOpts,
        matching: MatchOpts,
        sort: SortOpts,
    ) -> Result<Self, StorageError> {
        let match_regex = match &matching.mexpr {
            Some(expr) => Some(
                RegexBuilder::new(expr)
                    .case_insensitive(matching.micase)
                    .build()
                    .map_err(|source| StorageError::InvalidPattern {
                        expr: expr.clone(),
                        source,
                    })?,
            ),
            None => None,
        };
        Ok(Self {
            grammar: SipGrammar::new(),
            capture,
            matching,
            match_regex,
            inner: RwLock::new(Inner {
                sort,
                ..Inner::default()
            }),
            changed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        })
    }

    pub fn grammar(&self) -> &SipGrammar {
        &self.grammar
    }

    pub fn capture_opts(&self) -> &CaptureOpts {
        &self.capture
    }

    pub fn match_opts(&self) -> &MatchOpts {
        &self.matching
    }

    pub fn match_expression(&self) -> Option<&str> {
        self.matching.mexpr.as_deref()
    }

    /// Classifies a raw payload without touching the registry.
    pub fn validate(&self, payload: &[u8], transport: Transport) -> Validation {
        self.grammar.validate(payload, transport)
    }

    /// Stores a validated packet: appends to the matching call or opens a
    /// new one, subject to admission policy and the capture limit.
    ///
    /// Returns the acceptance handle, or None when the packet was dropped
    /// for any reason. Parse failures and capacity drops are counted in
    /// [`dropped`](Self::dropped).
    pub fn check_packet(&self, packet: CapturedPacket) -> Option<StoredMessage> {
        if packet.payload.is_empty() || packet.payload.len() > MAX_SIP_PAYLOAD {
            return self.drop_packet("oversized or empty payload");
        }
        let payload = packet.payload.clone();
        let Ok(text) = std::str::from_utf8(&payload) else {
            return self.drop_packet("payload is not valid UTF-8");
        };
        let Some(call_id) = self.grammar.call_id(text) else {
            return self.drop_packet("payload carries no Call-ID");
        };
        let Some((req_resp, resp_text)) = self.grammar.req_resp(text) else {
            return self.drop_packet("payload has no usable start line");
        };
        let cseq = self.grammar.cseq(text);
        let x_call_id = self.grammar.x_call_id(text);
        let ts = packet.ts;

        let mut guard = self.inner.write();
        let inner = &mut *guard;

        if let Some(call) = inner.calls.get_mut(&call_id) {
            let msg =
                SipMessage::new(packet, req_resp, resp_text, cseq, call_id.clone(), x_call_id);
            let msg_index = call.push_message(msg);
            if call.is_invite() {
                self.invite_extras(call, msg_index, text, ts);
            }
            let active = call.is_active();
            Self::sync_active(inner, &call_id, active);
            self.changed.store(true, Ordering::SeqCst);
            return Some(StoredMessage { call_id, msg_index });
        }

        // Admission of a new dialog.
        if !self.match_expression_ok(text) {
            debug!(call_id = %call_id, "call rejected by match expression");
            return None;
        }
        if self.matching.invite && req_resp != ReqResp::Request(Method::Invite) {
            debug!(call_id = %call_id, "non-INVITE dialog start dropped");
            return None;
        }
        if self.matching.complete && self.grammar.to_tag_present(text) {
            debug!(call_id = %call_id, "mid-dialog capture dropped");
            return None;
        }
        if inner.all.len() as u32 >= self.capture.limit
            && (!self.capture.rotate || !Self::rotate_locked(inner))
        {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(
                call_id = %call_id,
                limit = self.capture.limit,
                "capture limit reached, call dropped"
            );
            return None;
        }

        inner.last_index += 1;
        let mut call = Call::new(inner.last_index, call_id.clone(), x_call_id.clone());
        let msg = SipMessage::new(packet, req_resp, resp_text, cseq, call_id.clone(), x_call_id);
        let msg_index = call.push_message(msg);
        if let Some(first) = call.first_msg() {
            first.header_fields_or_parse(|p| self.grammar.header_fields(p));
        }
        if call.is_invite() {
            self.invite_extras(&mut call, msg_index, text, ts);
        }

        // X-Call-ID linkage, both directions: attach this call to its
        // parent when the parent is already stored, and adopt earlier
        // calls whose link pointed at this Call-ID before it existed.
        if let Some(parent_id) = call.x_call_id.clone() {
            if let Some(parent) = inner.calls.get_mut(&parent_id) {
                parent.xcalls.push(call_id.clone());
            }
        }
        for (other_id, other) in inner.calls.iter() {
            if other.x_call_id.as_ref() == Some(&call_id) {
                call.xcalls.push(other_id.clone());
            }
        }

        let active = call.is_active();
        inner.calls.insert(call_id.clone(), call);
        inner.all.push(call_id.clone());
        Self::insert_display_sorted(inner, &self.grammar, &call_id);
        if active {
            inner.active.push(call_id.clone());
        }
        debug!(call_id = %call_id, index = inner.last_index, "new call stored");
        self.changed.store(true, Ordering::SeqCst);
        Some(StoredMessage { call_id, msg_index })
    }

    /// Records an RTP packet against the stream it was announced for.
    ///
    /// No-op unless RTP tracking was enabled in the capture options.
    pub fn rtp_packet(&self, src: Endpoint, dst: Endpoint, ts: SystemTime) -> bool {
        if !self.capture.rtp {
            return false;
        }
        let mut inner = self.inner.write();
        for call in inner.calls.values_mut() {
            let stream = call
                .streams
                .iter_mut()
                .find(|s| s.dst == dst && (s.src.is_none() || s.src == Some(src)));
            if let Some(stream) = stream {
                if stream.src.is_none() {
                    stream.src = Some(src);
                }
                stream.packet_count += 1;
                stream.last_seen = ts;
                call.invalidate_verdict();
                self.changed.store(true, Ordering::SeqCst);
                return true;
            }
        }
        false
    }

    /// Current totals. `displayed` evaluates pending filter verdicts as a
    /// side effect, using the per-call cache.
    pub fn stats(&self) -> Stats {
        let inner = self.inner.read();
        let displayed = inner
            .all
            .iter()
            .filter_map(|id| inner.calls.get(id))
            .filter(|call| inner.filters.check_call(&self.grammar, call))
            .count();
        Stats {
            total: inner.all.len(),
            displayed,
        }
    }

    /// Returns whether the call set changed since the last poll, clearing
    /// the flag atomically.
    pub fn has_changed(&self) -> bool {
        self.changed.swap(false, Ordering::SeqCst)
    }

    /// Packets dropped for parse or capacity reasons.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Takes a read guard over the call set for traversal.
    pub fn calls(&self) -> CallsView<'_> {
        CallsView {
            inner: self.inner.read(),
            grammar: &self.grammar,
        }
    }

    /// Removes every call.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.calls.clear();
        inner.all.clear();
        inner.display.clear();
        inner.active.clear();
        self.changed.store(true, Ordering::SeqCst);
    }

    /// Removes the calls that do not pass the current filter set.
    pub fn clear_soft(&self) {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let doomed: Vec<SmolStr> = inner
            .all
            .iter()
            .filter(|id| match inner.calls.get(*id) {
                Some(call) => !inner.filters.check_call(&self.grammar, call),
                None => true,
            })
            .cloned()
            .collect();
        if doomed.is_empty() {
            return;
        }
        for call_id in &doomed {
            Self::remove_call(inner, call_id);
        }
        debug!(removed = doomed.len(), "soft clear");
        self.changed.store(true, Ordering::SeqCst);
    }

    /// Evicts the oldest non-locked call, freeing room below the limit.
    pub fn rotate(&self) {
        let mut inner = self.inner.write();
        if Self::rotate_locked(&mut inner) {
            self.changed.store(true, Ordering::SeqCst);
        }
    }

    /// Marks a call as exempt from rotation (or clears the exemption).
    pub fn lock_call(&self, call_id: &str, locked: bool) -> bool {
        let mut inner = self.inner.write();
        match inner.calls.get_mut(call_id) {
            Some(call) => {
                call.locked = locked;
                true
            }
            None => false,
        }
    }

    /// Installs or clears a display filter.
    ///
    /// The expression is compiled before anything changes; on error the
    /// previous filter state is preserved untouched. Success resets every
    /// call's cached verdict.
    pub fn filter_set(
        &self,
        field: FilterField,
        spec: Option<FilterExpr>,
    ) -> Result<(), StorageError> {
        let compiled = match spec {
            Some(spec) => Some(Filter::compile(spec)?),
            None => None,
        };
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        inner.filters.set(field, compiled);
        inner.filters.reset_verdicts(inner.calls.values());
        Ok(())
    }

    /// Current expression for a filter field.
    pub fn filter_get(&self, field: FilterField) -> Option<FilterExpr> {
        self.inner.read().filters.get(field).cloned()
    }

    /// Changes the sort key and re-sorts the displayed sequence.
    pub fn set_sort_options(&self, sort: SortOpts) {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        inner.sort = sort;
        let mut display = std::mem::take(&mut inner.display);
        display.sort_by(|a, b| match (inner.calls.get(a), inner.calls.get(b)) {
            (Some(ca), Some(cb)) => compare(&self.grammar, ca, cb, sort),
            _ => CmpOrdering::Equal,
        });
        inner.display = display;
    }

    pub fn sort_options(&self) -> SortOpts {
        self.inner.read().sort
    }

    fn invite_extras(&self, call: &mut Call, msg_index: usize, text: &str, ts: SystemTime) {
        call.ingest_media(media_descriptors(text), ts);
        call.apply_state(msg_index);
        if let Some(reason) = self.grammar.reason_text(text) {
            call.reason_text = Some(reason);
        }
        if let Some(code) = self.grammar.warning_code(text) {
            call.warning = Some(code);
        }
    }

    fn match_expression_ok(&self, payload: &str) -> bool {
        match &self.match_regex {
            Some(regex) => regex.is_match(payload) != self.matching.minvert,
            None => true,
        }
    }

    fn sync_active(inner: &mut Inner, call_id: &SmolStr, active: bool) {
        let present = inner.active.iter().any(|id| id == call_id);
        if active && !present {
            inner.active.push(call_id.clone());
        } else if !active && present {
            inner.active.retain(|id| id != call_id);
        }
    }

    fn rotate_locked(inner: &mut Inner) -> bool {
        let oldest = inner
            .all
            .iter()
            .find(|id| inner.calls.get(*id).is_some_and(|call| !call.is_locked()))
            .cloned();
        match oldest {
            Some(call_id) => {
                debug!(call_id = %call_id, "rotating out oldest call");
                Self::remove_call(inner, &call_id);
                true
            }
            None => false,
        }
    }

    fn remove_call(inner: &mut Inner, call_id: &SmolStr) {
        inner.calls.remove(call_id);
        inner.all.retain(|id| id != call_id);
        inner.display.retain(|id| id != call_id);
        inner.active.retain(|id| id != call_id);
        // Reverse links to the removed call go stale; its own Call-ID may
        // still be referenced as an unresolved string and re-resolve if
        // the call reappears.
        for call in inner.calls.values_mut() {
            call.xcalls.retain(|id| id != call_id);
        }
    }

    fn insert_display_sorted(inner: &mut Inner, grammar: &SipGrammar, call_id: &SmolStr) {
        let Some(call) = inner.calls.get(call_id) else {
            return;
        };
        let sort = inner.sort;
        let pos = inner
            .display
            .partition_point(|other_id| match inner.calls.get(other_id) {
                Some(other) => compare(grammar, other, call, sort) != CmpOrdering::Greater,
                None => true,
            });
        inner.display.insert(pos, call_id.clone());
    }

    fn drop_packet(&self, why: &'static str) -> Option<StoredMessage> {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        debug!(why, "packet dropped");
        None
    }
}

/// Shared-lock view over the call set.
///
/// Holding a view blocks writers, so consumers should keep traversals
/// short and drop the view between polls.
pub struct CallsView<'r> {
    inner: RwLockReadGuard<'r, Inner>,
    grammar: &'r SipGrammar,
}

impl CallsView<'_> {
    pub fn len(&self) -> usize {
        self.inner.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.all.is_empty()
    }

    /// Calls in the current sort order.
    pub fn iter(&self) -> impl Iterator<Item = &Call> + '_ {
        self.inner
            .display
            .iter()
            .filter_map(move |id| self.inner.calls.get(id))
    }

    /// Calls in creation order.
    pub fn iter_all(&self) -> impl Iterator<Item = &Call> + '_ {
        self.inner
            .all
            .iter()
            .filter_map(move |id| self.inner.calls.get(id))
    }

    /// Calls still expected to receive media.
    pub fn active(&self) -> impl Iterator<Item = &Call> + '_ {
        self.inner
            .active
            .iter()
            .filter_map(move |id| self.inner.calls.get(id))
    }

    /// O(1) lookup by Call-ID.
    pub fn get(&self, call_id: &str) -> Option<&Call> {
        self.inner.calls.get(call_id)
    }

    /// Lookup by position in the current sort order.
    pub fn get_index(&self, index: usize) -> Option<&Call> {
        self.inner
            .display
            .get(index)
            .and_then(|id| self.inner.calls.get(id))
    }

    pub fn is_active(&self, call: &Call) -> bool {
        self.inner.active.iter().any(|id| id == call.call_id())
    }

    /// Resolves the X-Call-ID back-reference, if the linked call exists.
    pub fn xcall<'v>(&'v self, call: &Call) -> Option<&'v Call> {
        self.inner.calls.get(call.x_call_id()?.as_str())
    }

    /// Renders a call attribute; None when unset.
    pub fn attribute(&self, call: &Call, attr: sift_core::Attr) -> Option<String> {
        attr::attribute(self.grammar, call, attr)
    }

    /// Whether the call passes the active filter set.
    pub fn matches_filters(&self, call: &Call) -> bool {
        self.inner.filters.check_call(self.grammar, call)
    }

    /// ngrep-style one-line message summary.
    pub fn msg_header(&self, msg: &SipMessage) -> String {
        attr::msg_header(msg)
    }

    /// One-line call summary, as matched by the call-list-line filter.
    pub fn call_list_line(&self, call: &Call) -> String {
        attr::call_list_line(self.grammar, call)
    }
}
