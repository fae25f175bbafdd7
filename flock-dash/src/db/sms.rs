//! Broadcast message log

use flock_common::db::models::{new_id, MemberStatus, RecipientStatus, SmsMessage, SmsRecipient};
use flock_common::time::now;
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

use crate::error::{ApiError, ApiResult};
use crate::pagination::{calculate_pagination, Page};

/// A phone number to message, with the member it came from if any
#[derive(Debug, Clone, FromRow)]
pub struct Contact {
    pub member_id: Option<String>,
    pub phone: Option<String>,
}

/// Outcome of one recipient after sending
#[derive(Debug, Clone)]
pub struct RecipientOutcome {
    pub phone: String,
    pub member_id: Option<String>,
    pub status: RecipientStatus,
    pub provider_ref: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageDetail {
    #[serde(flatten)]
    pub message: SmsMessage,
    pub recipients: Vec<SmsRecipient>,
}

pub async fn contacts_all_active(pool: &SqlitePool) -> ApiResult<Vec<Contact>> {
    let rows = sqlx::query_as::<_, Contact>(
        "SELECT id AS member_id, phone FROM members WHERE status = 'active' ORDER BY last_name, first_name",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn contacts_by_department(pool: &SqlitePool, department_id: &str) -> ApiResult<Vec<Contact>> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM departments WHERE id = ?)")
        .bind(department_id)
        .fetch_one(pool)
        .await?;
    if !exists {
        return Err(ApiError::BadRequest(format!("department {} does not exist", department_id)));
    }
    let rows = sqlx::query_as::<_, Contact>(
        "SELECT id AS member_id, phone FROM members WHERE department_id = ? ORDER BY last_name, first_name",
    )
    .bind(department_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn contacts_by_status(pool: &SqlitePool, status: MemberStatus) -> ApiResult<Vec<Contact>> {
    let rows = sqlx::query_as::<_, Contact>(
        "SELECT id AS member_id, phone FROM members WHERE status = ? ORDER BY last_name, first_name",
    )
    .bind(status)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// The members assigned to a shepherd
pub async fn contacts_by_shepherd(pool: &SqlitePool, shepherd_id: &str) -> ApiResult<Vec<Contact>> {
    let rows = sqlx::query_as::<_, Contact>(
        r#"
        SELECT m.id AS member_id, m.phone FROM shepherd_assignments a
        JOIN members m ON m.id = a.member_id
        WHERE a.shepherd_id = ?
        ORDER BY m.last_name, m.first_name
        "#,
    )
    .bind(shepherd_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Contacts for explicit member ids; unknown ids are an error
pub async fn contacts_by_ids(pool: &SqlitePool, ids: &[String]) -> ApiResult<Vec<Contact>> {
    let mut contacts = Vec::with_capacity(ids.len());
    for id in ids {
        let contact = sqlx::query_as::<_, Contact>("SELECT id AS member_id, phone FROM members WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::BadRequest(format!("member {} does not exist", id)))?;
        contacts.push(contact);
    }
    Ok(contacts)
}

/// Member owning a normalised phone, for linking ad-hoc numbers
pub async fn member_for_phone(pool: &SqlitePool, phone: &str) -> ApiResult<Option<String>> {
    let id = sqlx::query_scalar("SELECT id FROM members WHERE phone = ?")
        .bind(phone)
        .fetch_optional(pool)
        .await?;
    Ok(id)
}

/// Persist a sent broadcast with every recipient outcome
pub async fn log_message(
    pool: &SqlitePool,
    body: &str,
    audience: &serde_json::Value,
    segments: i64,
    skipped: i64,
    outcomes: &[RecipientOutcome],
    sent_by: Option<&str>,
) -> ApiResult<SmsMessage> {
    let sent = outcomes.iter().filter(|o| o.status == RecipientStatus::Sent).count() as i64;
    let failed = outcomes.len() as i64 - sent;
    let id = new_id();

    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"
        INSERT INTO sms_messages (id, body, audience, segments, recipient_count, sent_count, failed_count, skipped_count, sent_by, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(body)
    .bind(audience.to_string())
    .bind(segments)
    .bind(outcomes.len() as i64)
    .bind(sent)
    .bind(failed)
    .bind(skipped)
    .bind(sent_by)
    .bind(now())
    .execute(&mut *tx)
    .await?;

    for outcome in outcomes {
        sqlx::query(
            r#"
            INSERT INTO sms_recipients (message_id, phone, member_id, status, provider_ref, error)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&outcome.phone)
        .bind(&outcome.member_id)
        .bind(outcome.status)
        .bind(&outcome.provider_ref)
        .bind(&outcome.error)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    get_message(pool, &id).await
}

pub async fn get_message(pool: &SqlitePool, id: &str) -> ApiResult<SmsMessage> {
    sqlx::query_as::<_, SmsMessage>("SELECT * FROM sms_messages WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("message {}", id)))
}

pub async fn get_message_detail(pool: &SqlitePool, id: &str) -> ApiResult<MessageDetail> {
    let message = get_message(pool, id).await?;
    let recipients = sqlx::query_as::<_, SmsRecipient>(
        "SELECT * FROM sms_recipients WHERE message_id = ? ORDER BY status, phone",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;
    Ok(MessageDetail { message, recipients })
}

pub async fn list_messages(pool: &SqlitePool, page: Option<i64>, page_size: Option<i64>) -> ApiResult<Page<SmsMessage>> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sms_messages")
        .fetch_one(pool)
        .await?;
    let pagination = calculate_pagination(total, page, page_size);

    let items = sqlx::query_as::<_, SmsMessage>(
        "SELECT * FROM sms_messages ORDER BY created_at DESC LIMIT ? OFFSET ?",
    )
    .bind(pagination.page_size)
    .bind(pagination.offset)
    .fetch_all(pool)
    .await?;

    Ok(Page::new(items, total, pagination))
}
