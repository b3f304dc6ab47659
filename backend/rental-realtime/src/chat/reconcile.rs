/// Merge rules between the push channel and the REST store
///
/// A session's message list is the merge of two logs keyed by confirmed id:
/// - REST records confirm identity and win on content
/// - Push records are hints: appended when unseen, never overwrite
/// - Read state only moves from unread to read
///
/// No function here lets two entries share a confirmed id.
use super::models::{ChatMessage, MessageId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// New entry added
    Inserted,
    /// A pending entry was replaced in place by its confirmed record
    Confirmed,
    /// The confirmed record was already present; the pending entry was dropped
    Collapsed,
    /// Existing confirmed entry refreshed from REST
    Updated,
    /// Already present, nothing changed
    Duplicate,
}

fn position_of(messages: &[ChatMessage], id: i64) -> Option<usize> {
    messages
        .iter()
        .position(|m| m.id == MessageId::Confirmed(id))
}

/// Overwrite `existing` with the REST record, keeping read state monotonic.
fn absorb(existing: &mut ChatMessage, record: ChatMessage) -> bool {
    let is_read = existing.is_read || record.is_read;
    let merged = ChatMessage { is_read, ..record };
    if *existing == merged {
        false
    } else {
        *existing = merged;
        true
    }
}

/// Apply the REST confirmation of the message sent under `temp_id`.
pub fn confirm(messages: &mut Vec<ChatMessage>, temp_id: u64, record: ChatMessage) -> MergeOutcome {
    let Some(id) = record.id.confirmed() else {
        return MergeOutcome::Duplicate;
    };
    let pending = messages
        .iter()
        .position(|m| m.id == MessageId::Pending(temp_id));

    match (pending, position_of(messages, id)) {
        (Some(p), Some(existing)) => {
            // Push delivered the confirmed copy first
            absorb(&mut messages[existing], record);
            messages.remove(p);
            MergeOutcome::Collapsed
        }
        (Some(p), None) => {
            messages[p] = record;
            MergeOutcome::Confirmed
        }
        (None, Some(existing)) => {
            if absorb(&mut messages[existing], record) {
                MergeOutcome::Updated
            } else {
                MergeOutcome::Duplicate
            }
        }
        (None, None) => {
            messages.push(record);
            MergeOutcome::Inserted
        }
    }
}

/// Apply a push-delivered message. Appends in arrival order unless the
/// confirmed id is already known.
pub fn apply_push(messages: &mut Vec<ChatMessage>, message: ChatMessage) -> MergeOutcome {
    match message.id.confirmed() {
        Some(id) if position_of(messages, id).is_some() => MergeOutcome::Duplicate,
        Some(_) => {
            messages.push(message);
            MergeOutcome::Inserted
        }
        None => MergeOutcome::Duplicate,
    }
}

/// Merge a page of REST history. Returns how many entries were new.
///
/// The list is re-sorted by creation time afterwards; the sort is stable so
/// entries with equal timestamps keep their relative order.
pub fn merge_history(messages: &mut Vec<ChatMessage>, page: Vec<ChatMessage>) -> usize {
    let mut inserted = 0;
    for record in page {
        let Some(id) = record.id.confirmed() else {
            continue;
        };
        match position_of(messages, id) {
            Some(existing) => {
                absorb(&mut messages[existing], record);
            }
            None => {
                messages.push(record);
                inserted += 1;
            }
        }
    }
    messages.sort_by_key(|m| m.created_at);
    inserted
}

/// Flip the read flag of confirmed message `id`. Returns whether it changed.
pub fn mark_read(messages: &mut [ChatMessage], id: i64) -> bool {
    match messages
        .iter_mut()
        .find(|m| m.id == MessageId::Confirmed(id))
    {
        Some(message) if !message.is_read => {
            message.is_read = true;
            true
        }
        _ => false,
    }
}

/// Flag the pending message `temp_id` as rejected by the REST store.
pub fn mark_send_failed(messages: &mut [ChatMessage], temp_id: u64) -> bool {
    match messages
        .iter_mut()
        .find(|m| m.id == MessageId::Pending(temp_id))
    {
        Some(message) => {
            message.send_failed = true;
            true
        }
        None => false,
    }
}
