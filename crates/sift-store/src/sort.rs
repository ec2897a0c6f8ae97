// sipsift - The Siphon SIP Traffic Inspector
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::cmp::Ordering;

use sift_core::Attr;
use sift_parse::SipGrammar;

use crate::attr::attribute;
use crate::call::Call;

/// Active sort key for the displayed call sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOpts {
    pub by: Attr,
    pub asc: bool,
}

impl Default for SortOpts {
    fn default() -> Self {
        Self {
            by: Attr::Date,
            asc: true,
        }
    }
}

/// Compares two calls under the given sort key.
///
/// The message count compares numerically; everything else compares the
/// rendered attribute strings, with unset values ordered first. Ties
/// always break on the creation index, so the displayed order is total
/// and stable across re-sorts.
pub(crate) fn compare(grammar: &SipGrammar, a: &Call, b: &Call, opts: SortOpts) -> Ordering {
    let key = match opts.by {
        Attr::MsgCount => a.msgs().len().cmp(&b.msgs().len()),
        _ => {
            let av = attribute(grammar, a, opts.by);
            let bv = attribute(grammar, b, opts.by);
            match (av, bv) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(av), Some(bv)) => av.cmp(&bv),
            }
        }
    };
    let key = if opts.asc { key } else { key.reverse() };
    key.then_with(|| a.index().cmp(&b.index()))
}
