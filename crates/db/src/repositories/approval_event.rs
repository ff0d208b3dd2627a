use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use tracing::{debug, warn};

use ratify_core::domain::approval::{
    ActorId, ApprovalAction, ApprovalEvent, ApprovalStatus, EventId, NewApprovalEvent,
};
use ratify_core::domain::subject::{SubjectId, SubjectRef, SubjectType};
use ratify_core::store::{
    must_follow_latest, stamp_after, AppendGuard, ApprovalEventStore, HistoryCursor, StoreError,
};

use super::RepositoryError;
use crate::DbPool;

/// `approval_event` rows. Guarded appends are single statements, so the
/// latest-id precondition and the insert are atomic under SQLite's write lock.
/// Rows are immutable, so a latest event read before a successful guarded
/// insert is still the latest when the insert lands.
pub struct SqlApprovalEventStore {
    pool: DbPool,
}

impl SqlApprovalEventStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert(
        &self,
        event: &NewApprovalEvent,
        created_at: &str,
        guard: AppendGuard,
    ) -> Result<sqlx::sqlite::SqliteQueryResult, RepositoryError> {
        let result = match guard {
            AppendGuard::Unconditional => {
                sqlx::query(
                    "INSERT INTO approval_event (
                        id,
                        subject_type,
                        subject_id,
                        status,
                        action,
                        actor_id,
                        binary_flag,
                        created_at
                     ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(event.id.map(|id| id.0))
                .bind(event.subject.subject_type.as_str())
                .bind(&event.subject.subject_id.0)
                .bind(event.status.as_str())
                .bind(event.action.as_str())
                .bind(&event.actor_id.0)
                .bind(event.binary_flag)
                .bind(created_at)
                .execute(&self.pool)
                .await?
            }
            AppendGuard::ExpectLatest(expected) => {
                sqlx::query(
                    "INSERT INTO approval_event (
                        id,
                        subject_type,
                        subject_id,
                        status,
                        action,
                        actor_id,
                        binary_flag,
                        created_at
                     )
                     SELECT ?, ?, ?, ?, ?, ?, ?, ?
                     WHERE (
                        SELECT id
                        FROM approval_event
                        WHERE subject_type = ? AND subject_id = ?
                        ORDER BY created_at DESC, id DESC
                        LIMIT 1
                     ) IS ?",
                )
                .bind(event.id.map(|id| id.0))
                .bind(event.subject.subject_type.as_str())
                .bind(&event.subject.subject_id.0)
                .bind(event.status.as_str())
                .bind(event.action.as_str())
                .bind(&event.actor_id.0)
                .bind(event.binary_flag)
                .bind(created_at)
                .bind(event.subject.subject_type.as_str())
                .bind(&event.subject.subject_id.0)
                .bind(expected.map(|id| id.0))
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result)
    }
}

#[async_trait]
impl ApprovalEventStore for SqlApprovalEventStore {
    async fn append(
        &self,
        event: NewApprovalEvent,
        guard: AppendGuard,
    ) -> Result<ApprovalEvent, StoreError> {
        let requested = event.created_at.unwrap_or_else(Utc::now).trunc_subsecs(6);
        let created_at = if must_follow_latest(&event, guard) {
            let latest = self.latest(&event.subject).await?;
            if let AppendGuard::ExpectLatest(expected) = guard {
                if latest.as_ref().map(|latest| latest.id) != expected {
                    return Err(conflict(event, latest.map(|latest| latest.status)));
                }
            }
            stamp_after(requested, latest.as_ref())
        } else {
            requested
        };

        let result = self
            .insert(&event, &encode_timestamp(&created_at), guard)
            .await
            .map_err(RepositoryError::into_write)?;

        if result.rows_affected() == 0 {
            let current = self.latest(&event.subject).await?.map(|latest| latest.status);
            return Err(conflict(event, current));
        }

        let id = event.id.unwrap_or(EventId(result.last_insert_rowid()));
        let stored = event.into_event(id, created_at);
        debug!(
            event_name = "db.approval_event.appended",
            event_id = stored.id.0,
            subject_type = %stored.subject.subject_type,
            subject_id = %stored.subject.subject_id,
            status = %stored.status,
            action = %stored.action,
            actor_id = %stored.actor_id,
            "approval event appended"
        );
        Ok(stored)
    }

    async fn latest(&self, subject: &SubjectRef) -> Result<Option<ApprovalEvent>, StoreError> {
        let row = sqlx::query(
            "SELECT id, subject_type, subject_id, status, action, actor_id, binary_flag, created_at
             FROM approval_event
             WHERE subject_type = ? AND subject_id = ?
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
        )
        .bind(subject.subject_type.as_str())
        .bind(&subject.subject_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| RepositoryError::from(error).into_read())?;

        row.map(event_from_row).transpose().map_err(RepositoryError::into_read)
    }

    async fn history_page(
        &self,
        subject: &SubjectRef,
        after: Option<&HistoryCursor>,
        limit: u32,
    ) -> Result<Vec<ApprovalEvent>, StoreError> {
        let rows = if let Some(cursor) = after {
            let cursor_at = encode_timestamp(&cursor.created_at);
            sqlx::query(
                "SELECT id, subject_type, subject_id, status, action, actor_id, binary_flag, created_at
                 FROM approval_event
                 WHERE subject_type = ? AND subject_id = ?
                   AND (created_at > ? OR (created_at = ? AND id > ?))
                 ORDER BY created_at ASC, id ASC
                 LIMIT ?",
            )
            .bind(subject.subject_type.as_str())
            .bind(&subject.subject_id.0)
            .bind(&cursor_at)
            .bind(&cursor_at)
            .bind(cursor.id.0)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query(
                "SELECT id, subject_type, subject_id, status, action, actor_id, binary_flag, created_at
                 FROM approval_event
                 WHERE subject_type = ? AND subject_id = ?
                 ORDER BY created_at ASC, id ASC
                 LIMIT ?",
            )
            .bind(subject.subject_type.as_str())
            .bind(&subject.subject_id.0)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|error| RepositoryError::from(error).into_read())?;

        rows.into_iter()
            .map(event_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(RepositoryError::into_read)
    }
}

fn conflict(event: NewApprovalEvent, current: Option<ApprovalStatus>) -> StoreError {
    warn!(
        event_name = "db.approval_event.append_conflict",
        subject_type = %event.subject.subject_type,
        subject_id = %event.subject.subject_id,
        action = %event.action,
        observed_status = current.map(|status| status.as_str()).unwrap_or("none"),
        "approval event append lost the race for this subject"
    );
    StoreError::Conflict { subject: event.subject, current }
}

/// Fixed-width UTC text so lexical order in SQL matches time order.
fn encode_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_err(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

fn event_from_row(row: SqliteRow) -> Result<ApprovalEvent, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(decode_err)?;
    let subject_type: String = row.try_get("subject_type").map_err(decode_err)?;
    let subject_id: String = row.try_get("subject_id").map_err(decode_err)?;
    let status: String = row.try_get("status").map_err(decode_err)?;
    let action: String = row.try_get("action").map_err(decode_err)?;
    let actor_id: String = row.try_get("actor_id").map_err(decode_err)?;
    let binary_flag: i64 = row.try_get("binary_flag").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;

    let status = ApprovalStatus::parse(&status)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown approval status `{status}`")))?;
    let action = ApprovalAction::parse(&action)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown approval action `{action}`")))?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| {
            RepositoryError::Decode(format!("invalid created_at `{created_at}`: {error}"))
        })?;

    Ok(ApprovalEvent {
        id: EventId(id),
        subject: SubjectRef {
            subject_type: SubjectType::new(subject_type),
            subject_id: SubjectId(subject_id),
        },
        status,
        action,
        actor_id: ActorId(actor_id),
        binary_flag,
        created_at,
    })
}
