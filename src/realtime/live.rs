//! Consumer-side lists fed by realtime events.
//!
//! Delivery is at-least-once: a reconnect may replay an event the list has
//! already seen. Every list here is keyed by the record's natural key, so a
//! replay replaces the existing entry instead of adding a second one.

use super::event::{ClinicRecord, NotificationEvent, RealtimeEvent, RecordId, TicketRecord};

/// A record with a natural key.
pub trait Keyed {
    fn key(&self) -> &RecordId;
}

impl Keyed for TicketRecord {
    fn key(&self) -> &RecordId {
        &self.ticket_id
    }
}

impl Keyed for ClinicRecord {
    fn key(&self) -> &RecordId {
        &self.record_id
    }
}

impl Keyed for NotificationEvent {
    fn key(&self) -> &RecordId {
        NotificationEvent::key(self)
    }
}

/// Newest-first list with at most one entry per key.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveList<T> {
    items: Vec<T>,
}

impl<T> Default for LiveList<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Keyed> LiveList<T> {
    /// List from an initial fetch, keeping the first occurrence of each key.
    pub fn from_backlog(items: impl IntoIterator<Item = T>) -> Self {
        let mut list = Self::default();
        for item in items {
            if list.position(item.key()).is_none() {
                list.items.push(item);
            }
        }
        list
    }

    fn position(&self, key: &RecordId) -> Option<usize> {
        self.items.iter().position(|item| item.key() == key)
    }

    /// Adds a new record at the front, or replaces it in place if the key is
    /// already present. Returns `true` when the record was not seen before.
    pub fn insert(&mut self, item: T) -> bool {
        match self.position(item.key()) {
            Some(idx) => {
                self.items[idx] = item;
                false
            }
            None => {
                self.items.insert(0, item);
                true
            }
        }
    }

    /// Replaces an existing record; unknown keys are ignored.
    pub fn update(&mut self, item: T) -> bool {
        match self.position(item.key()) {
            Some(idx) => {
                self.items[idx] = item;
                true
            }
            None => false,
        }
    }

    /// Mutates the record with `key` in place.
    pub fn patch(&mut self, key: &RecordId, f: impl FnOnce(&mut T)) -> bool {
        match self.position(key) {
            Some(idx) => {
                f(&mut self.items[idx]);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, key: &RecordId) -> Option<&T> {
        self.position(key).map(|idx| &self.items[idx])
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Ticket list of the support screen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TicketBoard {
    tickets: LiveList<TicketRecord>,
}

impl TicketBoard {
    pub fn from_backlog(tickets: impl IntoIterator<Item = TicketRecord>) -> Self {
        Self {
            tickets: LiveList::from_backlog(tickets),
        }
    }

    /// Applies a ticket event. Returns `true` if the board changed.
    pub fn apply(&mut self, event: &RealtimeEvent) -> bool {
        match event {
            RealtimeEvent::NewTicket(ticket) => {
                self.tickets.insert(ticket.clone());
                true
            }
            RealtimeEvent::TicketUpdated(ticket) => self.tickets.update(ticket.clone()),
            RealtimeEvent::StatusChanged { ticket_id, status } => self
                .tickets
                .patch(ticket_id, |t| t.status = Some(status.clone())),
            RealtimeEvent::AssignmentChanged { ticket_id, user_id } => self
                .tickets
                .patch(ticket_id, |t| t.assigned_to_user_id = Some(RecordId::new(user_id.clone()))),
            _ => false,
        }
    }

    pub fn get(&self, id: &RecordId) -> Option<&TicketRecord> {
        self.tickets.get(id)
    }

    pub fn tickets(&self) -> &[TicketRecord] {
        self.tickets.items()
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }
}

/// Clinic records pushed while the clinic screen is open.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClinicFeed {
    records: LiveList<ClinicRecord>,
}

impl ClinicFeed {
    pub fn apply(&mut self, event: &RealtimeEvent) -> bool {
        match event {
            RealtimeEvent::NewClinicRecord(record) => self.records.insert(record.clone()),
            _ => false,
        }
    }

    pub fn records(&self) -> &[ClinicRecord] {
        self.records.items()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Notification bell: backlog plus pushes, with read tracking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationInbox {
    entries: LiveList<NotificationEvent>,
}

impl NotificationInbox {
    pub fn from_backlog(backlog: impl IntoIterator<Item = NotificationEvent>) -> Self {
        Self {
            entries: LiveList::from_backlog(backlog),
        }
    }

    pub fn apply(&mut self, event: &RealtimeEvent) -> bool {
        match event {
            RealtimeEvent::Notification(n) => {
                // a replayed push must not flip an acknowledged entry back to unread
                let read = self.entries.get(n.key()).is_some_and(|existing| existing.read);
                let mut n = n.clone();
                n.read |= read;
                self.entries.insert(n)
            }
            _ => false,
        }
    }

    pub fn mark_read(&mut self, key: &RecordId) -> bool {
        self.entries.patch(key, |n| n.read = true)
    }

    pub fn mark_all_read(&mut self) {
        for n in self.entries.items.iter_mut() {
            n.read = true;
        }
    }

    pub fn unread_count(&self) -> usize {
        self.entries.iter().filter(|n| !n.read).count()
    }

    pub fn entries(&self) -> &[NotificationEvent] {
        self.entries.items()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
