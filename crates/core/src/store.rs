use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::approval::{ApprovalEvent, ApprovalStatus, EventId, NewApprovalEvent};
use crate::domain::subject::SubjectRef;

const HISTORY_PAGE_SIZE: u32 = 256;

/// Precondition checked atomically with an append.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppendGuard {
    Unconditional,
    /// The subject's latest event id must still be this value (`None` means
    /// the subject has no events yet).
    ExpectLatest(Option<EventId>),
}

/// Position in a subject's history; pages resume strictly after it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryCursor {
    pub created_at: DateTime<Utc>,
    pub id: EventId,
}

impl From<&ApprovalEvent> for HistoryCursor {
    fn from(event: &ApprovalEvent) -> Self {
        Self { created_at: event.created_at, id: event.id }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("append conflict on {subject}: latest status is now {current:?}")]
    Conflict { subject: SubjectRef, current: Option<ApprovalStatus> },
    #[error("subject {0} not found")]
    SubjectNotFound(SubjectRef),
    #[error("store write failed: {0}")]
    Write(String),
    #[error("store read failed: {0}")]
    Read(String),
}

/// Timestamp for an event that must sort after `latest`. Requested times at
/// or before the latest event move to one microsecond past it.
pub fn stamp_after(requested: DateTime<Utc>, latest: Option<&ApprovalEvent>) -> DateTime<Utc> {
    match latest {
        Some(latest) if requested <= latest.created_at => {
            latest.created_at + Duration::microseconds(1)
        }
        _ => requested,
    }
}

/// Guarded appends and auto-stamped appends always become the subject's
/// latest event. Explicit timestamps on unconditional appends are kept as is.
pub fn must_follow_latest(event: &NewApprovalEvent, guard: AppendGuard) -> bool {
    matches!(guard, AppendGuard::ExpectLatest(_)) || event.created_at.is_none()
}

/// Append-only log of approval events, one stream per subject.
#[async_trait]
pub trait ApprovalEventStore: Send + Sync {
    async fn append(
        &self,
        event: NewApprovalEvent,
        guard: AppendGuard,
    ) -> Result<ApprovalEvent, StoreError>;

    async fn latest(&self, subject: &SubjectRef) -> Result<Option<ApprovalEvent>, StoreError>;

    /// Oldest first, starting strictly after `after` when given.
    async fn history_page(
        &self,
        subject: &SubjectRef,
        after: Option<&HistoryCursor>,
        limit: u32,
    ) -> Result<Vec<ApprovalEvent>, StoreError>;

    async fn history(&self, subject: &SubjectRef) -> Result<Vec<ApprovalEvent>, StoreError> {
        let mut events = Vec::new();
        let mut cursor: Option<HistoryCursor> = None;
        loop {
            let page = self.history_page(subject, cursor.as_ref(), HISTORY_PAGE_SIZE).await?;
            let exhausted = page.len() < HISTORY_PAGE_SIZE as usize;
            cursor = page.last().map(HistoryCursor::from);
            events.extend(page);
            if exhausted || cursor.is_none() {
                return Ok(events);
            }
        }
    }
}

#[derive(Default)]
struct MemoryLog {
    events: Vec<ApprovalEvent>,
}

impl MemoryLog {
    fn latest(&self, subject: &SubjectRef) -> Option<&ApprovalEvent> {
        self.events
            .iter()
            .filter(|event| &event.subject == subject)
            .max_by_key(|event| event.recency_key())
    }

    fn next_id(&self) -> EventId {
        EventId(self.events.iter().map(|event| event.id.0).max().unwrap_or(0) + 1)
    }
}

/// Store backed by process memory. Used by tests and embedders that do not
/// need durability.
#[derive(Default)]
pub struct InMemoryApprovalEventStore {
    log: RwLock<MemoryLog>,
    known_subjects: Option<HashSet<SubjectRef>>,
    append_calls: AtomicUsize,
}

impl InMemoryApprovalEventStore {
    /// Only the listed subjects resolve; anything else is `SubjectNotFound`.
    pub fn with_subjects(subjects: impl IntoIterator<Item = SubjectRef>) -> Self {
        Self { known_subjects: Some(subjects.into_iter().collect()), ..Self::default() }
    }

    pub async fn events(&self) -> Vec<ApprovalEvent> {
        self.log.read().await.events.clone()
    }

    pub fn append_calls(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }

    fn ensure_known(&self, subject: &SubjectRef) -> Result<(), StoreError> {
        match &self.known_subjects {
            Some(known) if !known.contains(subject) => {
                Err(StoreError::SubjectNotFound(subject.clone()))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ApprovalEventStore for InMemoryApprovalEventStore {
    async fn append(
        &self,
        event: NewApprovalEvent,
        guard: AppendGuard,
    ) -> Result<ApprovalEvent, StoreError> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_known(&event.subject)?;

        let mut log = self.log.write().await;
        let latest = log.latest(&event.subject).cloned();
        if let AppendGuard::ExpectLatest(expected) = guard {
            if latest.as_ref().map(|latest| latest.id) != expected {
                return Err(StoreError::Conflict {
                    subject: event.subject.clone(),
                    current: latest.map(|latest| latest.status),
                });
            }
        }

        let id = match event.id {
            Some(id) if log.events.iter().any(|existing| existing.id == id) => {
                return Err(StoreError::Write(format!("event id {id} already exists")));
            }
            Some(id) => id,
            None => log.next_id(),
        };
        let requested = event.created_at.unwrap_or_else(Utc::now);
        let created_at = if must_follow_latest(&event, guard) {
            stamp_after(requested, latest.as_ref())
        } else {
            requested
        };
        let stored = event.into_event(id, created_at);
        log.events.push(stored.clone());
        Ok(stored)
    }

    async fn latest(&self, subject: &SubjectRef) -> Result<Option<ApprovalEvent>, StoreError> {
        self.ensure_known(subject)?;
        Ok(self.log.read().await.latest(subject).cloned())
    }

    async fn history_page(
        &self,
        subject: &SubjectRef,
        after: Option<&HistoryCursor>,
        limit: u32,
    ) -> Result<Vec<ApprovalEvent>, StoreError> {
        self.ensure_known(subject)?;
        let log = self.log.read().await;
        let mut events: Vec<ApprovalEvent> = log
            .events
            .iter()
            .filter(|event| &event.subject == subject)
            .filter(|event| match after {
                Some(cursor) => event.recency_key() > (cursor.created_at, cursor.id),
                None => true,
            })
            .cloned()
            .collect();
        events.sort_by_key(|event| event.recency_key());
        events.truncate(limit as usize);
        Ok(events)
    }
}
