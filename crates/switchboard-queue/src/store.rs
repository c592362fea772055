// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Canonical in-memory queue and active-conversation projection.
//!
//! [`QueueStore`] is plain synchronous state. It never publishes anything
//! itself; the reconciliation service owns it behind a mutex and republishes
//! after each mutation.

use std::collections::HashSet;

use switchboard_core::{
    ConversationRecord, EpochMillis, MessageId, MessageRecord, MessageSender, RawConversation,
    RawMessage, SwitchboardError,
};
use tracing::{debug, info};

use crate::matcher::{MatchKind, claim_targets, find_id_match, find_match, same_identity};
use crate::normalize::{self, Candidate, is_admissible};
use crate::settings::QueueSettings;

/// Counts from one snapshot merge.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotReport {
    pub admitted: usize,
    pub merged: usize,
    pub rejected: usize,
    /// Conversations assigned to the current agent that the snapshot omitted.
    pub restored: usize,
}

/// Which single-conversation event is being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Updated,
    Assigned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationOutcome {
    Admitted,
    Merged,
    /// An update for a conversation nobody knows about.
    Ignored,
    /// A `conversation:new` that duplicates something already known.
    Ghost,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Appended,
    /// Confirmed a pending optimistic record in place.
    Promoted,
    Duplicate,
    Invalid,
    UnknownConversation,
}

#[derive(Debug, Clone, Copy)]
enum Assignment {
    /// Keep an existing assignment unless the incoming record names one.
    Sticky,
    /// Take the incoming assignment as is.
    Explicit,
}

#[derive(Debug)]
pub struct QueueStore {
    settings: QueueSettings,
    queue: Vec<ConversationRecord>,
    active: Option<ConversationRecord>,
    recent_message_ids: HashSet<String>,
}

impl QueueStore {
    pub fn new(settings: QueueSettings) -> Self {
        Self {
            settings,
            queue: Vec::new(),
            active: None,
            recent_message_ids: HashSet::new(),
        }
    }

    pub fn queue(&self) -> &[ConversationRecord] {
        &self.queue
    }

    pub fn active(&self) -> Option<&ConversationRecord> {
        self.active.as_ref()
    }

    /// Look up by either identity field, falling back to the active projection.
    pub fn find_by_id(&self, id: &str) -> Option<&ConversationRecord> {
        self.queue
            .iter()
            .find(|r| r.answers_to(id))
            .or_else(|| self.active.as_ref().filter(|a| a.answers_to(id)))
    }

    fn normalize(&self, raw: RawConversation, now: EpochMillis) -> Option<Candidate> {
        normalize::conversation(raw, now, self.settings.default_priority)
    }

    /// Rebuild the queue from a snapshot.
    ///
    /// Items naming the same conversation by id are folded together first.
    /// Each folded item then claims at most one previous record so local
    /// state survives (sticky assignment, optimistic messages, identity), and
    /// a matched record keeps answering to the id the server sent. Items that
    /// match nothing are admitted when they have messages or an origin.
    /// Conversations assigned to `me` that the snapshot left out are put back.
    ///
    /// Applying the same snapshot twice leaves the queue as one apply did.
    pub fn apply_snapshot(
        &mut self,
        items: Vec<RawConversation>,
        me: Option<&str>,
        now: EpochMillis,
    ) -> SnapshotReport {
        let mut report = SnapshotReport::default();
        let mut candidates = Vec::with_capacity(items.len());
        for raw in items {
            match self.normalize(raw, now) {
                Some(candidate) => candidates.push(candidate),
                None => report.rejected += 1,
            }
        }
        let groups = fold_by_identity(candidates);

        let previous = std::mem::take(&mut self.queue);
        let targets = {
            let records: Vec<&ConversationRecord> =
                groups.iter().map(|g| &g.candidate.record).collect();
            claim_targets(&previous, &records, self.settings.match_policy)
        };

        let mut next: Vec<ConversationRecord> = Vec::with_capacity(groups.len());
        for (group, target) in groups.into_iter().zip(targets) {
            let Folded { candidate, folded } = group;
            match target {
                Some((i, kind)) => {
                    let item_id = candidate.record.conversation_id.clone();
                    let mut record = merge(&previous[i], candidate, Assignment::Sticky);
                    if record.conversation_id != item_id {
                        record.alias_id = Some(item_id);
                    }
                    if kind != MatchKind::ExactId {
                        debug!(conversation_id = %record.conversation_id, ?kind, "snapshot item matched a known conversation");
                    }
                    report.merged += 1 + folded;
                    next.push(record);
                }
                None if candidate.is_admissible() => {
                    report.admitted += 1;
                    report.merged += folded;
                    next.push(candidate.record);
                }
                None => {
                    debug!(
                        conversation_id = %candidate.record.conversation_id,
                        "rejecting conversation with no messages and no origin"
                    );
                    report.rejected += 1 + folded;
                }
            }
        }

        if let Some(me) = me {
            for old in previous {
                if old.assigned_agent_id.as_deref() != Some(me) {
                    continue;
                }
                let present = next.iter().any(|r| {
                    r.answers_to(&old.conversation_id)
                        || old.alias_id.as_deref().is_some_and(|a| r.answers_to(a))
                });
                if !present {
                    debug!(conversation_id = %old.conversation_id, "restoring own conversation missing from snapshot");
                    next.push(old);
                    report.restored += 1;
                }
            }
        }

        self.queue = next;
        if let Some(active) = self.active.take() {
            self.active = Some(match self.queue.iter().find(|r| r.answers_to(&active.conversation_id)) {
                Some(record) => project(&active, record),
                None => active,
            });
        }
        report
    }

    /// Apply `conversation:updated` or `conversation:assigned`.
    ///
    /// Updates only touch known conversations. Assignments may introduce one,
    /// and make it active when it belongs to `me` (or when `me` is unknown).
    pub fn apply_update(
        &mut self,
        raw: RawConversation,
        kind: UpdateKind,
        me: Option<&str>,
        now: EpochMillis,
    ) -> ConversationOutcome {
        let Some(candidate) = self.normalize(raw, now) else {
            return ConversationOutcome::Invalid;
        };
        let assignment = match kind {
            UpdateKind::Updated => Assignment::Sticky,
            UpdateKind::Assigned => Assignment::Explicit,
        };

        let (index, outcome) = match find_match(&self.queue, &candidate.record, self.settings.match_policy) {
            Some((i, _)) => {
                self.queue[i] = merge(&self.queue[i], candidate, assignment);
                (i, ConversationOutcome::Merged)
            }
            None if kind == UpdateKind::Updated => {
                return match self.active.as_mut().filter(|a| a.answers_to(&candidate.record.conversation_id)) {
                    Some(active) => {
                        *active = merge(active, candidate, assignment);
                        ConversationOutcome::Merged
                    }
                    None => ConversationOutcome::Ignored,
                };
            }
            None if !candidate.is_admissible() => return ConversationOutcome::Invalid,
            None => {
                self.queue.push(candidate.record);
                (self.queue.len() - 1, ConversationOutcome::Admitted)
            }
        };

        let record = &self.queue[index];
        let mine = match (me, record.assigned_agent_id.as_deref()) {
            (None, _) => true,
            (Some(me), assigned) => assigned == Some(me),
        };
        if kind == UpdateKind::Assigned && mine {
            self.active = Some(match &self.active {
                Some(active) if active.answers_to(&record.conversation_id) => project(active, record),
                _ => record.clone(),
            });
        } else {
            self.sync_active(index);
        }
        outcome
    }

    /// Apply `conversation:new`, rejecting ghosts.
    pub fn apply_new_conversation(&mut self, raw: RawConversation, now: EpochMillis) -> ConversationOutcome {
        let Some(candidate) = self.normalize(raw, now) else {
            return ConversationOutcome::Invalid;
        };

        if let Some((i, _)) = find_id_match(&self.queue, &candidate.record) {
            self.queue[i] = merge(&self.queue[i], candidate, Assignment::Sticky);
            self.sync_active(i);
            return ConversationOutcome::Merged;
        }

        if !candidate.record.has_messages() {
            debug!(conversation_id = %candidate.record.conversation_id, "ghost conversation: no messages");
            return ConversationOutcome::Ghost;
        }
        if let Some(origin) = &candidate.record.origin
            && let Some(existing) = self.queue.iter().find(|r| r.origin.as_ref() == Some(origin))
        {
            debug!(
                conversation_id = %candidate.record.conversation_id,
                existing = %existing.conversation_id,
                "ghost conversation: origin already in queue"
            );
            return ConversationOutcome::Ghost;
        }

        info!(conversation_id = %candidate.record.conversation_id, "new conversation");
        self.queue.push(candidate.record);
        ConversationOutcome::Admitted
    }

    /// Apply `message:new` to the conversation and the active projection.
    pub fn apply_new_message(
        &mut self,
        conversation_id: &str,
        raw: RawMessage,
        now: EpochMillis,
    ) -> MessageOutcome {
        let Some(message) = normalize::message(raw, conversation_id, now) else {
            debug!(conversation_id, "dropping invalid message");
            return MessageOutcome::Invalid;
        };
        let id = message.id.as_str().to_owned();
        if self.recent_message_ids.contains(&id) {
            debug!(conversation_id, message_id = %id, "duplicate message");
            return MessageOutcome::Duplicate;
        }
        self.remember(id);

        let mut outcome = MessageOutcome::UnknownConversation;
        if let Some(record) = self.queue.iter_mut().find(|r| r.answers_to(conversation_id)) {
            outcome = insert_message(&mut record.messages, message.clone());
        }
        if let Some(active) = self.active.as_mut().filter(|a| a.answers_to(conversation_id)) {
            let projected = insert_message(&mut active.messages, message);
            if outcome == MessageOutcome::UnknownConversation {
                outcome = projected;
            }
        }
        outcome
    }

    /// Apply `conversation:completed`. Returns whether anything changed.
    pub fn apply_completed(&mut self, conversation_id: &str) -> bool {
        let before = self.queue.len();
        self.queue.retain(|r| !r.answers_to(conversation_id));
        let was_active = self
            .active
            .as_ref()
            .is_some_and(|a| a.answers_to(conversation_id));
        if was_active {
            self.active = None;
        }
        before != self.queue.len() || was_active
    }

    /// Second-line duplicate sweep. Returns how many records were dropped.
    ///
    /// Assigned records win first (one per id), then records with messages
    /// whose origin no assigned record claims, then message-less records that
    /// still carry an origin. Survivors keep their relative order.
    pub fn dedup_pass(&mut self) -> usize {
        let keep = {
            let mut keep = vec![false; self.queue.len()];
            let mut ids: HashSet<&str> = HashSet::new();
            let mut claimed: HashSet<&str> = HashSet::new();

            for (i, r) in self.queue.iter().enumerate() {
                if r.assigned_agent_id.is_some() && ids.insert(&r.conversation_id) {
                    keep[i] = true;
                    if let Some(origin) = &r.origin {
                        claimed.insert(origin);
                    }
                }
            }
            for (i, r) in self.queue.iter().enumerate() {
                if keep[i] || !r.has_messages() || ids.contains(r.conversation_id.as_str()) {
                    continue;
                }
                if r.origin.as_deref().is_some_and(|o| claimed.contains(o)) {
                    continue;
                }
                ids.insert(&r.conversation_id);
                keep[i] = true;
            }
            for (i, r) in self.queue.iter().enumerate() {
                if !keep[i] && !r.has_messages() && is_admissible(r) && ids.insert(&r.conversation_id) {
                    keep[i] = true;
                }
            }
            keep
        };

        let before = self.queue.len();
        let mut flags = keep.into_iter();
        self.queue.retain(|_| flags.next().unwrap_or(true));
        let removed = before - self.queue.len();
        if removed > 0 {
            info!(removed, remaining = self.queue.len(), "dedup pass dropped duplicates");
        }
        removed
    }

    pub fn set_active(&mut self, record: Option<ConversationRecord>) {
        self.active = record.map(normalize::sanitize);
    }

    /// Splice a freshly pulled conversation into place, keeping local identity.
    pub fn splice_refreshed(&mut self, raw: RawConversation, now: EpochMillis) -> Option<ConversationRecord> {
        let candidate = self.normalize(raw, now)?;
        match find_id_match(&self.queue, &candidate.record) {
            Some((i, _)) => {
                self.queue[i] = merge(&self.queue[i], candidate, Assignment::Sticky);
                self.sync_active(i);
                Some(self.queue[i].clone())
            }
            None => {
                let active = self
                    .active
                    .as_mut()
                    .filter(|a| a.answers_to(&candidate.record.conversation_id))?;
                *active = merge(active, candidate, Assignment::Sticky);
                Some(active.clone())
            }
        }
    }

    /// Merge pulled history into the conversation and the active projection.
    pub fn merge_history(
        &mut self,
        conversation_id: &str,
        raw: Vec<RawMessage>,
        now: EpochMillis,
    ) -> Vec<MessageRecord> {
        let fetched = normalize::messages(raw, conversation_id, now);
        let mut merged = None;
        if let Some(record) = self.queue.iter_mut().find(|r| r.answers_to(conversation_id)) {
            for message in &fetched {
                insert_message(&mut record.messages, message.clone());
            }
            merged = Some(record.messages.clone());
        }
        if let Some(active) = self.active.as_mut().filter(|a| a.answers_to(conversation_id)) {
            for message in &fetched {
                insert_message(&mut active.messages, message.clone());
            }
            merged = Some(active.messages.clone());
        }
        merged.unwrap_or(fetched)
    }

    /// Record a message the agent is sending before the server confirms it.
    pub fn push_optimistic(
        &mut self,
        conversation_id: &str,
        text: &str,
        agent_id: Option<&str>,
        now: EpochMillis,
    ) -> Result<MessageRecord, SwitchboardError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SwitchboardError::ValidationRejected(
                "cannot send an empty message".into(),
            ));
        }
        if self.find_by_id(conversation_id).is_none() {
            return Err(SwitchboardError::ValidationRejected(format!(
                "unknown conversation {conversation_id}"
            )));
        }

        let correlation = uuid::Uuid::new_v4().to_string();
        let message = MessageRecord {
            id: MessageId::Pending(correlation.clone()),
            correlation_id: Some(correlation),
            conversation_id: conversation_id.to_owned(),
            sender: MessageSender::Agent,
            text: text.to_owned(),
            timestamp: now,
            agent_id: agent_id.map(str::to_owned),
            attachment_ref: None,
            delivery_error: None,
        };
        if let Some(record) = self.queue.iter_mut().find(|r| r.answers_to(conversation_id)) {
            insert_sorted(&mut record.messages, message.clone());
        }
        if let Some(active) = self.active.as_mut().filter(|a| a.answers_to(conversation_id)) {
            insert_sorted(&mut active.messages, message.clone());
        }
        Ok(message)
    }

    /// Promote a pending record once the server assigned `server_id`.
    pub fn confirm_message(&mut self, correlation_id: &str, server_id: &str) -> bool {
        self.remember(server_id.to_owned());
        let mut found = false;
        for messages in self.message_lists() {
            let duplicate = messages
                .iter()
                .any(|m| m.id.as_str() == server_id && m.correlation_id.as_deref() != Some(correlation_id));
            if duplicate {
                // The echo already landed as its own record.
                let before = messages.len();
                messages.retain(|m| m.correlation_id.as_deref() != Some(correlation_id));
                found |= messages.len() != before;
                continue;
            }
            if let Some(m) = messages
                .iter_mut()
                .find(|m| m.correlation_id.as_deref() == Some(correlation_id))
            {
                m.id = MessageId::Confirmed(server_id.to_owned());
                m.delivery_error = None;
                found = true;
            }
        }
        found
    }

    /// Annotate a pending record with why delivery failed.
    pub fn fail_message(&mut self, correlation_id: &str, error: &str) -> bool {
        let mut found = false;
        for messages in self.message_lists() {
            if let Some(m) = messages
                .iter_mut()
                .find(|m| m.correlation_id.as_deref() == Some(correlation_id) && m.id.is_pending())
            {
                m.delivery_error = Some(error.to_owned());
                found = true;
            }
        }
        found
    }

    /// Clear a failed record's error so it can be sent again.
    pub fn retry_message(&mut self, correlation_id: &str) -> Option<MessageRecord> {
        let mut retried = None;
        for messages in self.message_lists() {
            if let Some(m) = messages
                .iter_mut()
                .find(|m| m.correlation_id.as_deref() == Some(correlation_id) && m.id.is_pending())
            {
                m.delivery_error = None;
                retried = Some(m.clone());
            }
        }
        retried
    }

    /// Drop everything held locally.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.active = None;
        self.recent_message_ids.clear();
    }

    fn message_lists(&mut self) -> impl Iterator<Item = &mut Vec<MessageRecord>> {
        self.queue
            .iter_mut()
            .map(|r| &mut r.messages)
            .chain(self.active.as_mut().map(|a| &mut a.messages))
    }

    fn remember(&mut self, id: String) {
        self.recent_message_ids.insert(id.clone());
        if self.recent_message_ids.len() > self.settings.recent_message_capacity {
            debug!("clearing recent message id cache");
            self.recent_message_ids.clear();
            self.recent_message_ids.insert(id);
        }
    }

    fn sync_active(&mut self, index: usize) {
        let record = &self.queue[index];
        if let Some(active) = self.active.as_mut()
            && active.answers_to(&record.conversation_id)
        {
            *active = project(active, record);
        }
    }
}

/// One conversation as a snapshot names it, after folding repeats.
struct Folded {
    candidate: Candidate,
    /// Further items folded into this one.
    folded: usize,
}

/// Fold snapshot items that name the same conversation by id, until no two
/// remaining items do. Origins play no part here.
fn fold_by_identity(candidates: Vec<Candidate>) -> Vec<Folded> {
    let mut groups: Vec<Folded> = candidates
        .into_iter()
        .map(|candidate| Folded { candidate, folded: 0 })
        .collect();
    while let Some((i, j)) = first_identity_pair(&groups) {
        let later = groups.remove(j);
        let base = groups.remove(i);
        groups.insert(
            i,
            Folded {
                candidate: fold(base.candidate, later.candidate),
                folded: base.folded + later.folded + 1,
            },
        );
    }
    groups
}

fn first_identity_pair(groups: &[Folded]) -> Option<(usize, usize)> {
    (0..groups.len()).find_map(|i| {
        (i + 1..groups.len())
            .find(|&j| same_identity(&groups[i].candidate.record, &groups[j].candidate.record))
            .map(|j| (i, j))
    })
}

fn fold(base: Candidate, later: Candidate) -> Candidate {
    let start_provided = base.start_provided || later.start_provided;
    let priority_provided = base.priority_provided || later.priority_provided;
    let tags_provided = base.tags_provided || later.tags_provided;
    Candidate {
        record: merge(&base.record, later, Assignment::Sticky),
        start_provided,
        priority_provided,
        tags_provided,
    }
}

/// The active projection of `record`, keeping history only the projection has.
fn project(active: &ConversationRecord, record: &ConversationRecord) -> ConversationRecord {
    ConversationRecord {
        messages: merge_messages(&active.messages, record.messages.clone()),
        ..record.clone()
    }
}

fn merge(existing: &ConversationRecord, incoming: Candidate, assignment: Assignment) -> ConversationRecord {
    let Candidate {
        record: new,
        start_provided,
        priority_provided,
        tags_provided,
    } = incoming;

    let alias_id = existing
        .alias_id
        .clone()
        .or(new.alias_id.filter(|a| *a != existing.conversation_id))
        .or_else(|| {
            (new.conversation_id != existing.conversation_id).then(|| new.conversation_id.clone())
        });

    let assigned_agent_id = match assignment {
        Assignment::Sticky => new
            .assigned_agent_id
            .or_else(|| existing.assigned_agent_id.clone()),
        Assignment::Explicit => new.assigned_agent_id,
    };

    let mut metadata = existing.metadata.clone();
    metadata.extend(new.metadata);

    ConversationRecord {
        conversation_id: existing.conversation_id.clone(),
        alias_id,
        origin: new.origin.or_else(|| existing.origin.clone()),
        start_time: if start_provided { new.start_time } else { existing.start_time },
        priority: if priority_provided { new.priority } else { existing.priority },
        tags: if tags_provided { new.tags } else { existing.tags.clone() },
        assigned_agent_id,
        messages: merge_messages(&existing.messages, new.messages),
        metadata,
    }
}

/// Union by id. Pending local records survive until an agent message with
/// the same text shows up, which then inherits the correlation id.
fn merge_messages(existing: &[MessageRecord], incoming: Vec<MessageRecord>) -> Vec<MessageRecord> {
    if incoming.is_empty() {
        return existing.to_vec();
    }
    let mut merged = incoming;
    let mut leftover = Vec::new();
    for local in existing {
        match merged.iter_mut().find(|m| m.id.as_str() == local.id.as_str()) {
            Some(m) => {
                if m.correlation_id.is_none() {
                    m.correlation_id = local.correlation_id.clone();
                }
            }
            None => leftover.push(local),
        }
    }
    // Id matches settle first so echo pairing does not depend on order.
    for local in leftover {
        if local.id.is_pending()
            && let Some(m) = merged
                .iter_mut()
                .find(|m| m.correlation_id.is_none() && is_echo_of(m, local))
        {
            m.correlation_id = local.correlation_id.clone();
            continue;
        }
        merged.push(local.clone());
    }
    merged.sort_by_key(|m| m.timestamp);
    merged
}

fn is_echo_of(candidate: &MessageRecord, pending: &MessageRecord) -> bool {
    candidate.sender == MessageSender::Agent
        && !candidate.id.is_pending()
        && candidate.text.trim() == pending.text.trim()
        && (candidate.agent_id.is_none() || candidate.agent_id == pending.agent_id)
}

fn insert_message(messages: &mut Vec<MessageRecord>, message: MessageRecord) -> MessageOutcome {
    if messages.iter().any(|m| m.id.as_str() == message.id.as_str()) {
        return MessageOutcome::Duplicate;
    }
    if let Some(pending) = messages
        .iter_mut()
        .find(|m| m.id.is_pending() && is_echo_of(&message, m))
    {
        pending.id = message.id;
        pending.delivery_error = None;
        return MessageOutcome::Promoted;
    }
    insert_sorted(messages, message);
    MessageOutcome::Appended
}

fn insert_sorted(messages: &mut Vec<MessageRecord>, message: MessageRecord) {
    let at = messages.partition_point(|m| m.timestamp <= message.timestamp);
    messages.insert(at, message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> QueueStore {
        QueueStore::new(QueueSettings::default())
    }

    fn raw(value: serde_json::Value) -> RawConversation {
        serde_json::from_value(value).unwrap()
    }

    fn msg(value: serde_json::Value) -> RawMessage {
        serde_json::from_value(value).unwrap()
    }

    fn with_messages(id: &str, origin: &str, n: usize) -> RawConversation {
        let messages: Vec<_> = (0..n)
            .map(|i| json!({"id": format!("{id}-m{i}"), "from": "user", "text": "hola", "timestamp": 1_000 + i}))
            .collect();
        raw(json!({"conversationId": id, "from": origin, "startTime": 1_000, "messages": messages}))
    }

    #[test]
    fn merge_keeps_unprovided_fields() {
        let mut s = store();
        s.apply_snapshot(
            vec![raw(json!({"conversationId": "c-1", "from": "+1", "startTime": 50, "priority": 5, "tags": ["vip"]}))],
            None,
            0,
        );
        s.apply_update(raw(json!({"conversationId": "c-1"})), UpdateKind::Updated, None, 999);
        let r = &s.queue()[0];
        assert_eq!(r.start_time, 50);
        assert_eq!(r.priority, 5);
        assert!(r.tags.contains("vip"));
    }

    #[test]
    fn cross_id_keeps_local_identity() {
        let mut s = store();
        s.apply_snapshot(vec![with_messages("c-1", "+1", 1)], None, 0);
        s.apply_update(
            raw(json!({"conversationId": "c-1-server", "id": "c-1", "priority": 1})),
            UpdateKind::Updated,
            None,
            0,
        );
        assert_eq!(s.queue().len(), 1);
        assert_eq!(s.queue()[0].conversation_id, "c-1");
        assert_eq!(s.queue()[0].alias_id.as_deref(), Some("c-1-server"));
        assert!(s.find_by_id("c-1-server").is_some());
    }

    #[test]
    fn update_for_unknown_conversation_is_ignored() {
        let mut s = store();
        let outcome = s.apply_update(with_messages("c-1", "+1", 1), UpdateKind::Updated, None, 0);
        assert_eq!(outcome, ConversationOutcome::Ignored);
        assert!(s.queue().is_empty());
    }

    #[test]
    fn assignment_admits_and_activates_own_conversation() {
        let mut s = store();
        let mut c = with_messages("c-1", "+1", 1);
        c.assigned_agent = Some("a-1".into());
        assert_eq!(
            s.apply_update(c, UpdateKind::Assigned, Some("a-1"), 0),
            ConversationOutcome::Admitted
        );
        assert_eq!(s.active().unwrap().conversation_id, "c-1");

        let mut other = with_messages("c-2", "+2", 1);
        other.assigned_agent = Some("a-9".into());
        s.apply_update(other, UpdateKind::Assigned, Some("a-1"), 0);
        assert_eq!(s.active().unwrap().conversation_id, "c-1");
    }

    #[test]
    fn message_append_keeps_order_and_rejects_repeats() {
        let mut s = store();
        s.apply_snapshot(vec![with_messages("c-1", "+1", 2)], None, 0);
        s.set_active(s.find_by_id("c-1").cloned());

        let early = msg(json!({"id": "x", "from": "user", "text": "late arrival", "timestamp": 1_000}));
        assert_eq!(s.apply_new_message("c-1", early.clone(), 0), MessageOutcome::Appended);
        assert_eq!(s.apply_new_message("c-1", early, 0), MessageOutcome::Duplicate);

        let r = s.find_by_id("c-1").unwrap();
        let ts: Vec<_> = r.messages.iter().map(|m| m.timestamp).collect();
        assert_eq!(ts, vec![1_000, 1_000, 1_001]);
        assert_eq!(s.active().unwrap().messages.len(), 3);
    }

    #[test]
    fn recent_id_cache_is_cleared_past_capacity() {
        let mut s = QueueStore::new(QueueSettings {
            recent_message_capacity: 2,
            ..QueueSettings::default()
        });
        for id in ["a", "b", "c"] {
            s.apply_new_message("c-1", msg(json!({"id": id, "from": "user", "text": "t"})), 0);
        }
        // The third insert overflowed and wiped the cache down to itself.
        assert_eq!(s.recent_message_ids.len(), 1);
        assert!(s.recent_message_ids.contains("c"));
    }

    #[test]
    fn optimistic_message_is_promoted_by_echo() {
        let mut s = store();
        s.apply_snapshot(vec![with_messages("c-1", "+1", 1)], None, 0);
        let pending = s.push_optimistic("c-1", "  on my way ", Some("a-1"), 5_000).unwrap();
        assert_eq!(pending.text, "on my way");
        assert!(pending.id.is_pending());

        let echo = msg(json!({"id": "srv-1", "from": "agent", "agentId": "a-1", "text": "on my way", "timestamp": 5_100}));
        assert_eq!(s.apply_new_message("c-1", echo, 0), MessageOutcome::Promoted);

        let messages = &s.find_by_id("c-1").unwrap().messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].id, MessageId::Confirmed("srv-1".into()));
        assert_eq!(messages[1].correlation_id, pending.correlation_id);

        // Confirmation after the echo is a no-op on content.
        assert!(s.confirm_message(pending.correlation_id.as_deref().unwrap(), "srv-1"));
        assert_eq!(s.find_by_id("c-1").unwrap().messages.len(), 2);
    }

    #[test]
    fn confirmation_before_echo_suppresses_the_echo() {
        let mut s = store();
        s.apply_snapshot(vec![with_messages("c-1", "+1", 1)], None, 0);
        let pending = s.push_optimistic("c-1", "hola", Some("a-1"), 5_000).unwrap();
        let correlation = pending.correlation_id.unwrap();
        assert!(s.confirm_message(&correlation, "srv-7"));

        let echo = msg(json!({"id": "srv-7", "from": "agent", "text": "hola", "timestamp": 5_001}));
        assert_eq!(s.apply_new_message("c-1", echo, 0), MessageOutcome::Duplicate);
        assert_eq!(s.find_by_id("c-1").unwrap().messages.len(), 2);
    }

    #[test]
    fn failed_message_can_be_retried() {
        let mut s = store();
        s.apply_snapshot(vec![with_messages("c-1", "+1", 1)], None, 0);
        let pending = s.push_optimistic("c-1", "hola", Some("a-1"), 5_000).unwrap();
        let correlation = pending.correlation_id.unwrap();

        assert!(s.fail_message(&correlation, "server said no"));
        let failed = s.find_by_id("c-1").unwrap().messages[1].clone();
        assert_eq!(failed.delivery_error.as_deref(), Some("server said no"));

        let retried = s.retry_message(&correlation).unwrap();
        assert_eq!(retried.text, "hola");
        assert!(retried.delivery_error.is_none());
    }

    #[test]
    fn empty_optimistic_text_is_rejected() {
        let mut s = store();
        s.apply_snapshot(vec![with_messages("c-1", "+1", 1)], None, 0);
        assert!(matches!(
            s.push_optimistic("c-1", "   ", None, 0),
            Err(SwitchboardError::ValidationRejected(_))
        ));
        assert_eq!(s.find_by_id("c-1").unwrap().messages.len(), 1);
    }

    #[test]
    fn dedup_prefers_assigned_then_messages() {
        let mut s = store();
        let mut assigned = with_messages("c-1", "+1", 1);
        assigned.assigned_agent = Some("a-1".into());
        s.queue = vec![
            normalize::conversation(with_messages("c-2", "+1", 2), 0, 2).unwrap().record,
            normalize::conversation(assigned, 0, 2).unwrap().record,
            normalize::conversation(with_messages("c-3", "+3", 1), 0, 2).unwrap().record,
            normalize::conversation(with_messages("c-3", "+3", 1), 0, 2).unwrap().record,
        ];
        assert_eq!(s.dedup_pass(), 2);
        let ids: Vec<_> = s.queue().iter().map(|r| r.conversation_id.as_str()).collect();
        assert_eq!(ids, vec!["c-1", "c-3"]);
        assert_eq!(s.dedup_pass(), 0);
    }

    #[test]
    fn history_merge_skips_known_ids() {
        let mut s = store();
        s.apply_snapshot(vec![with_messages("c-1", "+1", 1)], None, 0);
        let merged = s.merge_history(
            "c-1",
            vec![
                msg(json!({"id": "c-1-m0", "from": "user", "text": "hola", "timestamp": 1_000})),
                msg(json!({"id": "older", "from": "bot", "text": "bienvenido", "timestamp": 900})),
                msg(json!({"id": "bad", "from": "bot", "text": ""})),
            ],
            0,
        );
        let ids: Vec<_> = merged.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["older", "c-1-m0"]);
    }

    fn summary(s: &QueueStore) -> Vec<(String, Option<String>, Option<String>, usize)> {
        s.queue()
            .iter()
            .map(|r| {
                (
                    r.conversation_id.clone(),
                    r.alias_id.clone(),
                    r.assigned_agent_id.clone(),
                    r.messages.len(),
                )
            })
            .collect()
    }

    #[test]
    fn repeated_snapshot_items_fold_before_admission() {
        let snapshot = || {
            vec![
                raw(json!({"conversationId": "c-1", "assignedAgent": "a-1", "messages": []})),
                with_messages("c-1", "+1", 1),
            ]
        };
        let mut s = store();
        let report = s.apply_snapshot(snapshot(), None, 0);
        assert_eq!(report.admitted, 1);
        assert_eq!(report.merged, 1);
        assert_eq!(report.rejected, 0);
        let once = summary(&s);
        assert_eq!(once, vec![("c-1".into(), None, Some("a-1".into()), 1)]);

        s.apply_snapshot(snapshot(), None, 0);
        assert_eq!(summary(&s), once);
    }

    #[test]
    fn origin_match_cannot_take_a_record_claimed_by_id() {
        let mut s = store();
        let mut known = with_messages("c-2", "+1", 1);
        known.id = Some("c-1".into());
        s.apply_snapshot(vec![known], None, 0);
        assert_eq!(s.queue()[0].alias_id.as_deref(), Some("c-1"));

        let snapshot = || vec![with_messages("c-0", "+1", 1), with_messages("c-1", "+0", 1)];
        s.apply_snapshot(snapshot(), None, 0);
        let once = summary(&s);
        let ids: Vec<_> = once.iter().map(|(id, ..)| id.as_str()).collect();
        assert_eq!(ids, vec!["c-0", "c-2"]);
        assert_eq!(s.find_by_id("c-1").unwrap().conversation_id, "c-2");
        assert_eq!(s.find_by_id("c-2").unwrap().origin.as_deref(), Some("+0"));

        s.apply_snapshot(snapshot(), None, 0);
        assert_eq!(summary(&s), once);
    }

    #[test]
    fn origin_matched_record_answers_to_the_new_id() {
        let mut s = store();
        let mut known = with_messages("c-1", "+1", 2);
        known.id = Some("legacy-1".into());
        s.apply_snapshot(vec![known], None, 0);

        let snapshot = || vec![with_messages("c-9", "+1", 2)];
        let report = s.apply_snapshot(snapshot(), None, 0);
        assert_eq!(report.merged, 1);
        let record = &s.queue()[0];
        assert_eq!(record.conversation_id, "c-1");
        assert_eq!(record.alias_id.as_deref(), Some("c-9"));

        let once = summary(&s);
        s.apply_snapshot(snapshot(), None, 0);
        assert_eq!(summary(&s), once);
    }

    #[test]
    fn ghost_without_messages_is_dropped() {
        let mut s = store();
        let empty = raw(json!({"conversationId": "c-9", "from": "+9", "messages": []}));
        assert_eq!(s.apply_new_conversation(empty, 0), ConversationOutcome::Ghost);
        assert!(s.queue().is_empty());
    }

    #[tracing_test::traced_test]
    #[test]
    fn ghost_by_origin_is_logged_and_dropped() {
        let mut s = store();
        s.apply_snapshot(vec![with_messages("c-1", "+100", 1)], None, 0);
        let outcome = s.apply_new_conversation(with_messages("c-2", "+100", 1), 0);
        assert_eq!(outcome, ConversationOutcome::Ghost);
        assert_eq!(s.queue().len(), 1);
        assert!(logs_contain("origin already in queue"));
    }
}
