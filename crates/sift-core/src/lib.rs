// sipsift - The Siphon SIP Traffic Inspector
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core data model for the sipsift storage engine.
//!
//! This crate provides the foundational types shared by the parser and the
//! call storage:
//! - **Methods and codes**: [`Method`] with its fixed wire numbering and
//!   [`ReqResp`] covering both requests and response status codes
//! - **Capture boundary**: [`CapturedPacket`], [`Endpoint`], [`Transport`]
//! - **Messages**: [`SipMessage`], the immutable-once-stored message record
//!   with lazily parsed header fields
//! - **Attributes**: [`Attr`], the closed set of renderable call fields
//! - **Dialog progress**: [`CallState`]
//!
//! Strings derived from headers use [`SmolStr`](smol_str::SmolStr) and raw
//! payloads use [`Bytes`](bytes::Bytes), so message records stay cheap to
//! move between the capture thread and consumers.

pub mod attr;
pub mod endpoint;
pub mod method;
pub mod msg;
pub mod packet;
pub mod state;

pub use attr::Attr;
pub use endpoint::{Endpoint, Transport};
pub use method::{default_status_text, Method, ReqResp};
pub use msg::{HeaderFields, SipMessage};
pub use packet::CapturedPacket;
pub use state::CallState;

/// Largest payload the storage engine will look at, in bytes.
///
/// Anything larger is treated as not-SIP by the validator and dropped by
/// the registry without parsing.
pub const MAX_SIP_PAYLOAD: usize = 10240;
