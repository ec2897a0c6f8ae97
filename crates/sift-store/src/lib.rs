// sipsift - The Siphon SIP Traffic Inspector
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! SIP call storage for sipsift.
//!
//! Groups captured SIP messages into calls by Call-ID, enforces the
//! capture policy (admission rules, limit, rotation), and exposes the
//! call set through filtered, sorted, change-notified views.
//!
//! # Example
//! ```
//! use sift_core::{CapturedPacket, Endpoint, Transport};
//! use sift_store::{CallRegistry, CaptureOpts, MatchOpts, SortOpts};
//! use std::time::SystemTime;
//!
//! let registry = CallRegistry::new(
//!     CaptureOpts::default(),
//!     MatchOpts::default(),
//!     SortOpts::default(),
//! )
//! .unwrap();
//!
//! let payload = b"OPTIONS sip:ping@example.com SIP/2.0\r\n\
//!     Call-ID: ping-1@probe\r\n\
//!     CSeq: 1 OPTIONS\r\n\r\n";
//! let packet = CapturedPacket::new(
//!     Endpoint::parse("192.0.2.1:5060").unwrap(),
//!     Endpoint::parse("192.0.2.2:5060").unwrap(),
//!     Transport::Udp,
//!     SystemTime::now(),
//!     &payload[..],
//! );
//! let stored = registry.check_packet(packet).unwrap();
//! assert_eq!(stored.call_id, "ping-1@probe");
//! assert_eq!(registry.stats().total, 1);
//! ```

use once_cell::sync::OnceCell;

mod attr;
mod call;
mod filter;
mod registry;
mod sort;

pub use call::{Call, RtpStream, Verdict};
pub use filter::{FilterExpr, FilterField, FILTER_FIELDS};
pub use registry::{
    CallRegistry, CallsView, CaptureOpts, MatchOpts, Stats, StorageError, StoredMessage,
};
pub use sort::SortOpts;

static DEFAULT_REGISTRY: OnceCell<CallRegistry> = OnceCell::new();

/// Initializes the process-default registry.
///
/// Embedders that do not want to thread a [`CallRegistry`] instance
/// through their capture pipeline can use this single shared one. The
/// first successful call wins; later calls return the existing instance
/// unchanged.
pub fn init(
    capture: CaptureOpts,
    matching: MatchOpts,
    sort: SortOpts,
) -> Result<&'static CallRegistry, StorageError> {
    if let Some(existing) = DEFAULT_REGISTRY.get() {
        return Ok(existing);
    }
    let registry = CallRegistry::new(capture, matching, sort)?;
    Ok(DEFAULT_REGISTRY.get_or_init(|| registry))
}

/// The process-default registry, if [`init`] has been called.
pub fn default_registry() -> Option<&'static CallRegistry> {
    DEFAULT_REGISTRY.get()
}
