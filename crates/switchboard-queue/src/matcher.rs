// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ranked identity matching between an incoming conversation and known ones.
//!
//! Strategies are tried in rank order over the whole list, so an exact id
//! match anywhere always beats an origin match earlier in the list.

use switchboard_core::ConversationRecord;

/// How a candidate was matched to an existing record, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchKind {
    ExactId,
    CrossId,
    Origin,
}

/// Gate for origin matches.
///
/// Two conversations from the same origin only count as one when their
/// message counts are close or they started close together. This can still
/// conflate distinct near-simultaneous conversations from one origin.
#[derive(Debug, Clone, Copy)]
pub struct MatchPolicy {
    pub message_delta: usize,
    pub start_window_ms: i64,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            message_delta: 3,
            start_window_ms: 60_000,
        }
    }
}

/// Index and strategy of the best match for `candidate` in `existing`.
pub fn find_match(
    existing: &[ConversationRecord],
    candidate: &ConversationRecord,
    policy: MatchPolicy,
) -> Option<(usize, MatchKind)> {
    find_id_match(existing, candidate).or_else(|| {
        existing
            .iter()
            .position(|r| origin_matches(r, candidate, policy))
            .map(|i| (i, MatchKind::Origin))
    })
}

/// Like [`find_match`] but without the origin heuristic.
pub fn find_id_match(
    existing: &[ConversationRecord],
    candidate: &ConversationRecord,
) -> Option<(usize, MatchKind)> {
    if let Some(i) = existing
        .iter()
        .position(|r| r.conversation_id == candidate.conversation_id)
    {
        return Some((i, MatchKind::ExactId));
    }
    existing
        .iter()
        .position(|r| cross_matches(r, candidate))
        .map(|i| (i, MatchKind::CrossId))
}

/// Whether two records name the same conversation by either identifier.
pub fn same_identity(a: &ConversationRecord, b: &ConversationRecord) -> bool {
    a.conversation_id == b.conversation_id || cross_matches(a, b)
}

#[derive(Debug, Clone, Copy)]
enum Tier {
    SameId,
    AliasedToItem,
    OtherId,
    Origin,
}

impl Tier {
    const ALL: [Tier; 4] = [Tier::SameId, Tier::AliasedToItem, Tier::OtherId, Tier::Origin];

    fn kind(self) -> MatchKind {
        match self {
            Tier::SameId => MatchKind::ExactId,
            Tier::AliasedToItem | Tier::OtherId => MatchKind::CrossId,
            Tier::Origin => MatchKind::Origin,
        }
    }

    fn matches(self, known: &ConversationRecord, item: &ConversationRecord, policy: MatchPolicy) -> bool {
        match self {
            Tier::SameId => known.conversation_id == item.conversation_id,
            Tier::AliasedToItem => known.alias_id.as_deref() == Some(item.conversation_id.as_str()),
            Tier::OtherId => cross_matches(known, item),
            Tier::Origin => origin_matches(known, item, policy),
        }
    }
}

/// Pair snapshot items with known records, one to one.
///
/// Claims are made a tier at a time across all items: the record carrying the
/// item's id, then a record aliased to it, then any other id relation, and
/// only then an origin match. Within a tier earlier items claim first, and a
/// claimed record is out of reach for every later claim.
pub fn claim_targets(
    known: &[ConversationRecord],
    items: &[&ConversationRecord],
    policy: MatchPolicy,
) -> Vec<Option<(usize, MatchKind)>> {
    let mut targets: Vec<Option<(usize, MatchKind)>> = vec![None; items.len()];
    let mut claimed = vec![false; known.len()];

    for tier in Tier::ALL {
        for (target, item) in targets.iter_mut().zip(items) {
            if target.is_some() {
                continue;
            }
            let found = known
                .iter()
                .enumerate()
                .position(|(i, k)| !claimed[i] && tier.matches(k, item, policy));
            if let Some(i) = found {
                claimed[i] = true;
                *target = Some((i, tier.kind()));
            }
        }
    }
    targets
}

fn cross_matches(a: &ConversationRecord, b: &ConversationRecord) -> bool {
    let a_alias = a.alias_id.as_deref();
    let b_alias = b.alias_id.as_deref();
    a_alias == Some(b.conversation_id.as_str())
        || b_alias == Some(a.conversation_id.as_str())
        || (a_alias.is_some() && a_alias == b_alias)
}

fn origin_matches(a: &ConversationRecord, b: &ConversationRecord, policy: MatchPolicy) -> bool {
    match (&a.origin, &b.origin) {
        (Some(x), Some(y)) if x == y => {
            a.messages.len().abs_diff(b.messages.len()) <= policy.message_delta
                || (a.start_time - b.start_time).abs() <= policy.start_window_ms
        }
        _ => false,
    }
}
