//! SMS broadcast orchestration
//!
//! Resolves an audience to unique normalised phone numbers, sends them in
//! gateway-sized batches and logs every recipient outcome. A failed batch
//! fails only its own recipients.

use std::collections::HashSet;

use flock_common::db::models::{MemberStatus, RecipientStatus};
use flock_common::db::settings::get_setting;
use flock_common::phone::normalize_phone;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, warn};

use super::sms_gateway::{segment_count, SmsGateway, MAX_BODY_CHARS};
use crate::db::sms::{self, Contact, MessageDetail, RecipientOutcome};
use crate::error::{ApiError, ApiResult};

/// Who a broadcast goes to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Audience {
    AllActive,
    Department { id: String },
    Status { status: MemberStatus },
    Shepherd { id: String },
    Members { ids: Vec<String> },
    Phones { numbers: Vec<String> },
}

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub body: String,
    pub audience: Audience,
}

/// Gateway, sender and limits for one broadcast
pub struct Broadcaster<'a> {
    pub pool: &'a SqlitePool,
    pub gateway: &'a dyn SmsGateway,
    pub sender_id: &'a str,
    pub country_code: &'a str,
    pub batch_size: usize,
}

/// Unique deliverable numbers plus how many contacts had none
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Recipients {
    pub targets: Vec<(String, Option<String>)>,
    pub skipped: i64,
}

/// Normalise and de-duplicate contacts; the first contact for a number wins
pub fn dedupe_contacts(contacts: Vec<Contact>, country_code: &str) -> Recipients {
    let mut seen = HashSet::new();
    let mut recipients = Recipients::default();

    for contact in contacts {
        let phone = contact
            .phone
            .as_deref()
            .and_then(|raw| normalize_phone(raw, country_code));
        match phone {
            Some(phone) => {
                if seen.insert(phone.clone()) {
                    recipients.targets.push((phone, contact.member_id));
                }
            }
            None => recipients.skipped += 1,
        }
    }

    recipients
}

/// Message text with the configured signature appended
pub fn compose_body(body: &str, signature: Option<&str>) -> ApiResult<String> {
    let body = body.trim();
    if body.is_empty() {
        return Err(ApiError::BadRequest("message body is required".to_string()));
    }

    let full = match signature.map(str::trim).filter(|s| !s.is_empty()) {
        Some(sig) => format!("{}\n{}", body, sig),
        None => body.to_string(),
    };

    let len = full.chars().count();
    if len > MAX_BODY_CHARS {
        return Err(ApiError::BadRequest(format!(
            "message is {} characters (including signature); the limit is {}",
            len, MAX_BODY_CHARS
        )));
    }
    Ok(full)
}

impl Broadcaster<'_> {
    async fn contacts(&self, audience: &Audience) -> ApiResult<Vec<Contact>> {
        match audience {
            Audience::AllActive => sms::contacts_all_active(self.pool).await,
            Audience::Department { id } => sms::contacts_by_department(self.pool, id).await,
            Audience::Status { status } => sms::contacts_by_status(self.pool, *status).await,
            Audience::Shepherd { id } => sms::contacts_by_shepherd(self.pool, id).await,
            Audience::Members { ids } => sms::contacts_by_ids(self.pool, ids).await,
            Audience::Phones { numbers } => {
                let mut contacts = Vec::with_capacity(numbers.len());
                for raw in numbers {
                    let member_id = match normalize_phone(raw, self.country_code) {
                        Some(phone) => sms::member_for_phone(self.pool, &phone).await?,
                        None => None,
                    };
                    contacts.push(Contact {
                        member_id,
                        phone: Some(raw.clone()),
                    });
                }
                Ok(contacts)
            }
        }
    }

    /// Send `request` and return the logged message with recipients
    pub async fn send(&self, request: BroadcastRequest, sent_by: Option<&str>) -> ApiResult<MessageDetail> {
        let signature = get_setting(self.pool, "sms_signature").await?;
        let body = compose_body(&request.body, signature.as_deref())?;

        let contacts = self.contacts(&request.audience).await?;
        let recipients = dedupe_contacts(contacts, self.country_code);
        if recipients.targets.is_empty() {
            return Err(ApiError::BadRequest(
                "no recipients with a valid phone number".to_string(),
            ));
        }

        let mut outcomes = Vec::with_capacity(recipients.targets.len());
        for (batch_no, batch) in recipients.targets.chunks(self.batch_size.max(1)).enumerate() {
            let phones: Vec<String> = batch.iter().map(|(phone, _)| phone.clone()).collect();

            match self.gateway.send_batch(self.sender_id, &phones, &body).await {
                Ok(deliveries) => {
                    for (phone, member_id) in batch {
                        let delivery = deliveries.iter().find(|d| &d.phone == phone);
                        outcomes.push(RecipientOutcome {
                            phone: phone.clone(),
                            member_id: member_id.clone(),
                            status: if delivery.is_some() {
                                RecipientStatus::Sent
                            } else {
                                RecipientStatus::Failed
                            },
                            provider_ref: delivery.and_then(|d| d.provider_ref.clone()),
                            error: delivery
                                .is_none()
                                .then(|| "not accepted by gateway".to_string()),
                        });
                    }
                }
                Err(e) => {
                    warn!(
                        gateway = self.gateway.name(),
                        batch = batch_no,
                        size = batch.len(),
                        "SMS batch failed: {}",
                        e
                    );
                    for (phone, member_id) in batch {
                        outcomes.push(RecipientOutcome {
                            phone: phone.clone(),
                            member_id: member_id.clone(),
                            status: RecipientStatus::Failed,
                            provider_ref: None,
                            error: Some(e.to_string()),
                        });
                    }
                }
            }
        }

        let audience = serde_json::to_value(&request.audience)
            .map_err(|e| ApiError::Internal(format!("audience encoding: {}", e)))?;
        let message = sms::log_message(
            self.pool,
            &body,
            &audience,
            segment_count(&body),
            recipients.skipped,
            &outcomes,
            sent_by,
        )
        .await?;

        info!(
            message_id = %message.id,
            gateway = self.gateway.name(),
            sent = message.sent_count,
            failed = message.failed_count,
            skipped = message.skipped_count,
            "Broadcast finished"
        );

        sms::get_message_detail(self.pool, &message.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(member: Option<&str>, phone: Option<&str>) -> Contact {
        Contact {
            member_id: member.map(str::to_string),
            phone: phone.map(str::to_string),
        }
    }

    #[test]
    fn test_dedupe_contacts() {
        let recipients = dedupe_contacts(
            vec![
                contact(Some("a"), Some("024 123 4567")),
                contact(Some("b"), Some("+233241234567")),
                contact(Some("c"), None),
                contact(Some("d"), Some("not a phone")),
                contact(None, Some("0201112223")),
            ],
            "233",
        );
        assert_eq!(
            recipients.targets,
            vec![
                ("233241234567".to_string(), Some("a".to_string())),
                ("233201112223".to_string(), None),
            ]
        );
        assert_eq!(recipients.skipped, 2);
    }

    #[test]
    fn test_compose_body() {
        assert_eq!(compose_body("  Hello  ", None).unwrap(), "Hello");
        assert_eq!(compose_body("Hello", Some("- Grace Chapel")).unwrap(), "Hello\n- Grace Chapel");
        assert_eq!(compose_body("Hello", Some("   ")).unwrap(), "Hello");
        assert!(compose_body("   ", None).is_err());
        assert!(compose_body(&"x".repeat(MAX_BODY_CHARS), None).is_ok());
        assert!(compose_body(&"x".repeat(MAX_BODY_CHARS), Some("sig")).is_err());
    }

    #[test]
    fn test_audience_wire_format() {
        let audience: Audience =
            serde_json::from_str(r#"{"type":"department","id":"d1"}"#).unwrap();
        assert!(matches!(audience, Audience::Department { ref id } if id == "d1"));

        let audience: Audience = serde_json::from_str(r#"{"type":"all_active"}"#).unwrap();
        assert!(matches!(audience, Audience::AllActive));

        let audience: Audience =
            serde_json::from_str(r#"{"type":"status","status":"new_convert"}"#).unwrap();
        assert!(matches!(audience, Audience::Status { status: MemberStatus::NewConvert }));
    }
}
