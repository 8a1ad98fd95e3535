//! Pending-request correlator.
//!
//! Maps a [`MessageId`] to the caller waiting for its response and releases
//! exactly one response per registration.
//!
//! # Concurrency
//!
//! The table is touched by every caller issuing a request and by the
//! connection's receive pump. All access goes through one mutex; no lock is
//! ever held across an `.await`, so contention is limited to a HashMap
//! insert/remove.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::oneshot;

use crate::{LinkError, MessageId, Packet, Result};

/// Receiving side of a registration.
///
/// Completes with the response packet, or with [`LinkError::Disconnected`]
/// when the connection is lost first. The sender is dropped without a value
/// when the registration is removed.
pub type ResponseSlot = oneshot::Receiver<Result<Packet>>;

/// Acquire a mutex guard, intentionally ignoring poisoning.
///
/// The table holds no invariants spanning entries; the worst outcome of a
/// panic mid-update is one dropped or unmatched response.
pub(crate) fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // ---
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

struct Table {
    slots: HashMap<MessageId, oneshot::Sender<Result<Packet>>>,
    last_id: MessageId,
}

/// Tracks outstanding requests and matches responses to them.
pub struct Correlator {
    // ---
    label: String,
    table: Mutex<Table>,
}

impl Correlator {
    // ---
    /// Create an empty correlator; `label` tags its log lines.
    pub fn new(label: impl Into<String>) -> Self {
        // ---
        Self {
            label: label.into(),
            table: Mutex::new(Table {
                slots: HashMap::new(),
                last_id: MessageId::INVALID,
            }),
        }
    }

    /// Register a caller-chosen id.
    ///
    /// # Errors
    ///
    /// [`LinkError::DuplicateMessageId`] if `id` is already outstanding,
    /// [`LinkError::InvalidMessageId`] for the reserved zero id.
    pub fn register(&self, id: MessageId) -> Result<ResponseSlot> {
        // ---
        if !id.is_valid() {
            return Err(LinkError::InvalidMessageId);
        }

        let mut table = lock_ignore_poison(&self.table);
        if table.slots.contains_key(&id) {
            return Err(LinkError::DuplicateMessageId(id));
        }

        let (tx, rx) = oneshot::channel();
        table.slots.insert(id, tx);
        Ok(rx)
    }

    /// Assign the next free id and register it in one step.
    ///
    /// Ids count up from 1, wrap past `u32::MAX` back to 1, and skip any id
    /// that is still outstanding.
    ///
    /// # Errors
    ///
    /// [`LinkError::IdsExhausted`] if every non-zero id is outstanding.
    pub fn register_next(&self) -> Result<(MessageId, ResponseSlot)> {
        // ---
        let mut table = lock_ignore_poison(&self.table);

        let start = table.last_id;
        let mut candidate = start.next();
        while table.slots.contains_key(&candidate) {
            candidate = candidate.next();
            if candidate == start.next() {
                return Err(LinkError::IdsExhausted);
            }
        }

        let (tx, rx) = oneshot::channel();
        table.slots.insert(candidate, tx);
        table.last_id = candidate;
        Ok((candidate, rx))
    }

    /// Deliver a response to the caller registered under its id.
    ///
    /// Returns `true` if the packet was handed to a waiting caller. An
    /// unmatched packet (unknown id, or a caller that already timed out) is
    /// logged and dropped.
    pub fn resolve(&self, packet: Packet) -> bool {
        // ---
        let id = packet.message_id();
        let tx = lock_ignore_poison(&self.table).slots.remove(&id);

        match tx {
            Some(tx) => {
                if tx.send(Ok(packet)).is_err() {
                    crate::log_debug!(self.label, "caller for message id {id} stopped waiting, response discarded");
                    return false;
                }
                true
            }
            None => {
                crate::log_warn!(self.label, "no pending request for message id {id}, dropping packet");
                false
            }
        }
    }

    /// Remove a registration without delivering anything.
    ///
    /// Used for timeout and send-failure cleanup.
    pub fn remove(&self, id: MessageId) -> bool {
        // ---
        lock_ignore_poison(&self.table).slots.remove(&id).is_some()
    }

    /// Release every waiting caller with [`LinkError::Disconnected`].
    ///
    /// Returns the number of registrations that were failed.
    pub fn fail_all(&self) -> usize {
        // ---
        let drained: Vec<_> = lock_ignore_poison(&self.table).slots.drain().collect();
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Err(LinkError::Disconnected));
        }
        if count > 0 {
            crate::log_info!(self.label, "released {count} pending requests after disconnect");
        }
        count
    }

    /// `true` if `id` is outstanding.
    pub fn contains(&self, id: MessageId) -> bool {
        lock_ignore_poison(&self.table).slots.contains_key(&id)
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        lock_ignore_poison(&self.table).slots.len()
    }

    /// `true` when nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn set_last_id(&self, id: MessageId) {
        lock_ignore_poison(&self.table).last_id = id;
    }
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("label", &self.label)
            .field("outstanding", &self.len())
            .finish()
    }
}
