// sipsift - The Siphon SIP Traffic Inspector
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-field display filters with a memoized per-call verdict.

use regex::{Regex, RegexBuilder};
use sift_core::Attr;
use sift_parse::SipGrammar;

use crate::attr;
use crate::call::{Call, Verdict};
use crate::registry::StorageError;

/// Fields a display filter can match against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterField {
    /// Full From URI of the call
    From,
    /// Full To URI of the call
    To,
    /// Initiating source endpoint
    Source,
    /// Initiating destination endpoint
    Destination,
    /// Method or response code of the first message
    Method,
    /// Raw payload of any message in the call
    Payload,
    /// Rendered one-line call summary
    CallListLine,
}

/// All filter fields, in slot order.
pub const FILTER_FIELDS: [FilterField; 7] = [
    FilterField::From,
    FilterField::To,
    FilterField::Source,
    FilterField::Destination,
    FilterField::Method,
    FilterField::Payload,
    FilterField::CallListLine,
];

impl FilterField {
    fn slot(&self) -> usize {
        FILTER_FIELDS
            .iter()
            .position(|field| field == self)
            .unwrap_or_default()
    }
}

/// A filter expression before compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterExpr {
    pub expr: String,
    pub icase: bool,
    pub invert: bool,
}

impl FilterExpr {
    /// Case-insensitive, non-inverted filter; the common configuration.
    pub fn new(expr: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            icase: true,
            invert: false,
        }
    }

    pub fn case_sensitive(mut self) -> Self {
        self.icase = false;
        self
    }

    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }
}

#[derive(Debug)]
pub(crate) struct Filter {
    spec: FilterExpr,
    regex: Regex,
}

impl Filter {
    pub(crate) fn compile(spec: FilterExpr) -> Result<Self, StorageError> {
        let regex = RegexBuilder::new(&spec.expr)
            .case_insensitive(spec.icase)
            .build()
            .map_err(|source| StorageError::InvalidPattern {
                expr: spec.expr.clone(),
                source,
            })?;
        Ok(Self { spec, regex })
    }

    fn matches(&self, data: &str) -> bool {
        self.regex.is_match(data) != self.spec.invert
    }
}

/// The active filters, one optional slot per field.
#[derive(Debug, Default)]
pub(crate) struct FilterSet {
    slots: [Option<Filter>; FILTER_FIELDS.len()],
}

impl FilterSet {
    pub(crate) fn set(&mut self, field: FilterField, filter: Option<Filter>) {
        self.slots[field.slot()] = filter;
    }

    pub(crate) fn get(&self, field: FilterField) -> Option<&FilterExpr> {
        self.slots[field.slot()].as_ref().map(|f| &f.spec)
    }

    /// Evaluates the AND of all enabled filters against a call, using the
    /// memoized verdict when one is cached.
    ///
    /// Payload filters OR over every message payload; all other fields
    /// match the call attribute, with an unset attribute treated as the
    /// empty string.
    pub(crate) fn check_call(&self, grammar: &SipGrammar, call: &Call) -> bool {
        if call.msgs().is_empty() {
            return false;
        }
        match call.verdict() {
            Verdict::Pass => return true,
            Verdict::Reject => return false,
            Verdict::Unknown => {}
        }

        let mut verdict = Verdict::Pass;
        for (slot, filter) in self.slots.iter().enumerate() {
            let Some(filter) = filter else { continue };
            let field = FILTER_FIELDS[slot];

            let matched = match field {
                FilterField::Payload => {
                    call.msgs().iter().any(|msg| filter.matches(msg.payload_str()))
                }
                FilterField::CallListLine => {
                    filter.matches(&attr::call_list_line(grammar, call))
                }
                _ => {
                    let attr_id = match field {
                        FilterField::From => Attr::SipFrom,
                        FilterField::To => Attr::SipTo,
                        FilterField::Source => Attr::Src,
                        FilterField::Destination => Attr::Dst,
                        _ => Attr::Method,
                    };
                    let data = attr::attribute(grammar, call, attr_id).unwrap_or_default();
                    filter.matches(&data)
                }
            };

            if !matched {
                verdict = Verdict::Reject;
                break;
            }
        }

        call.set_verdict(verdict);
        verdict == Verdict::Pass
    }

    /// Forces re-evaluation of every call on next access.
    pub(crate) fn reset_verdicts<'c>(&self, calls: impl Iterator<Item = &'c Call>) {
        for call in calls {
            call.invalidate_verdict();
        }
    }
}
