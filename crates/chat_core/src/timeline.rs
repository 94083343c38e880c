use std::{collections::HashSet, time::Duration as StdDuration};

use chrono::{DateTime, Duration, Utc};
use shared::{
    domain::{MessageId, UserId},
    protocol::ChatMessage,
};
use uuid::Uuid;

/// Client-side delivery state of one timeline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    /// Locally created, not yet acknowledged by the server.
    Pending,
    /// Acknowledged by the server; carries a real message id.
    Confirmed,
    /// The send was rejected or timed out. Stays visible so the user can
    /// retry.
    Failed,
}

/// One row of a room's message list. `local_id` is stable across the
/// pending-to-confirmed promotion, so a renderer can key rows on it.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub local_id: Uuid,
    pub message_id: Option<MessageId>,
    pub sender_id: UserId,
    pub sender_nickname: Option<String>,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub state: DeliveryState,
}

impl TimelineEntry {
    fn pending(sender_id: UserId, content: String, now: DateTime<Utc>) -> Self {
        Self {
            local_id: Uuid::new_v4(),
            message_id: None,
            sender_id,
            sender_nickname: None,
            content,
            sent_at: now,
            state: DeliveryState::Pending,
        }
    }

    fn confirmed(message: ChatMessage) -> Self {
        Self {
            local_id: Uuid::new_v4(),
            message_id: Some(message.id),
            sender_id: message.sender_id,
            sender_nickname: message.sender_nickname,
            content: message.content,
            sent_at: message.sent_at,
            state: DeliveryState::Confirmed,
        }
    }

    /// Total order key: `(sent_at, id)`, with unconfirmed entries sorting
    /// after confirmed ones carrying the same timestamp.
    fn sort_key(&self) -> (DateTime<Utc>, i64, Uuid) {
        let id = self.message_id.map_or(i64::MAX, |id| id.0);
        (self.sent_at, id, self.local_id)
    }
}

/// The canonical ordered, duplicate-free message list for one room.
///
/// All three inputs flow through here: live-pushed frames, history pages,
/// and locally created optimistic entries. Insertion is a sorted merge, so
/// applying a late-arriving history page after several live messages yields
/// the same list as applying it first.
#[derive(Debug)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
    seen_ids: HashSet<MessageId>,
    tolerance: Duration,
}

impl Timeline {
    /// `tolerance` is the clock-skew window used when matching a confirmed
    /// message against an optimistic entry.
    pub fn new(tolerance: StdDuration) -> Self {
        Self {
            entries: Vec::new(),
            seen_ids: HashSet::new(),
            tolerance: Duration::from_std(tolerance).unwrap_or_else(|_| Duration::seconds(5)),
        }
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Id of the oldest server-confirmed message currently loaded; the
    /// cursor for paging further back.
    pub fn oldest_confirmed_id(&self) -> Option<MessageId> {
        self.entries.iter().find_map(|entry| entry.message_id)
    }

    /// Merges one server-confirmed message from any source (live push or
    /// history page). Returns whether the list changed.
    ///
    /// A message id seen before is dropped. Otherwise the oldest `Pending`
    /// entry with the same sender and content within the tolerance window
    /// is promoted in place, adopting the server id and timestamp; without
    /// a match the message is inserted at its sorted position. Two
    /// confirmed messages never collapse unless their server ids are equal,
    /// so rapid identical sends stay distinct.
    pub fn apply_confirmed(&mut self, message: ChatMessage) -> bool {
        if !self.seen_ids.insert(message.id) {
            return false;
        }

        if let Some(index) = self.find_pending_match(&message) {
            let mut entry = self.entries.remove(index);
            entry.message_id = Some(message.id);
            entry.sender_nickname = message.sender_nickname;
            entry.content = message.content;
            entry.sent_at = message.sent_at;
            entry.state = DeliveryState::Confirmed;
            self.insert_sorted(entry);
        } else {
            self.insert_sorted(TimelineEntry::confirmed(message));
        }
        true
    }

    /// Merges a whole history page. Returns whether the list changed.
    pub fn merge_page(&mut self, page: Vec<ChatMessage>) -> bool {
        let mut changed = false;
        for row in page {
            if self.apply_confirmed(row) {
                changed = true;
            }
        }
        changed
    }

    /// Inserts an optimistic entry for a message the user just submitted
    /// and returns its local id.
    pub fn insert_pending(
        &mut self,
        sender_id: UserId,
        content: String,
        now: DateTime<Utc>,
    ) -> Uuid {
        let entry = TimelineEntry::pending(sender_id, content, now);
        let local_id = entry.local_id;
        self.insert_sorted(entry);
        local_id
    }

    /// Flips a still-pending entry to `Failed`. Returns whether anything
    /// changed (a promoted or already-failed entry is left alone).
    pub fn mark_failed(&mut self, local_id: Uuid) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|entry| entry.local_id == local_id)
        {
            Some(entry) if entry.state == DeliveryState::Pending => {
                entry.state = DeliveryState::Failed;
                true
            }
            _ => false,
        }
    }

    /// Removes a `Failed` entry so it can be re-submitted. Pending and
    /// confirmed entries are not removable.
    pub fn remove_failed(&mut self, local_id: Uuid) -> Option<TimelineEntry> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.local_id == local_id && entry.state == DeliveryState::Failed)?;
        Some(self.entries.remove(index))
    }

    fn find_pending_match(&self, message: &ChatMessage) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| {
                entry.state == DeliveryState::Pending
                    && entry.sender_id == message.sender_id
                    && entry.content == message.content
                    && self.within_tolerance(entry.sent_at, message.sent_at)
            })
            .min_by_key(|(_, entry)| entry.sent_at)
            .map(|(index, _)| index)
    }

    fn within_tolerance(&self, local: DateTime<Utc>, server: DateTime<Utc>) -> bool {
        let delta = if server >= local {
            server - local
        } else {
            local - server
        };
        delta <= self.tolerance
    }

    fn insert_sorted(&mut self, entry: TimelineEntry) {
        let key = entry.sort_key();
        let index = self.entries.partition_point(|held| held.sort_key() <= key);
        self.entries.insert(index, entry);
    }
}

#[cfg(test)]
#[path = "tests/timeline_tests.rs"]
mod tests;
