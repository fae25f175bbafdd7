//! Database models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::auth::Role;

/// Generate a new primary key
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Declares a TEXT-backed enum with `as_str`, `Display` and `FromStr`
///
/// The string forms match the CHECK constraints in the schema.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
        #[serde(rename_all = "snake_case")]
        #[sqlx(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == wanted)
                    .ok_or_else(|| crate::Error::InvalidInput(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        s.trim()
                    )))
            }
        }
    };
}

text_enum!(
    /// Membership status of a congregant
    MemberStatus {
        Active => "active",
        Inactive => "inactive",
        Visitor => "visitor",
        NewConvert => "new_convert",
    }
);

text_enum!(Gender { Male => "male", Female => "female" });

text_enum!(
    /// How a tithe was paid
    PaymentMethod {
        Cash => "cash",
        MobileMoney => "mobile_money",
        Bank => "bank",
        Cheque => "cheque",
        Other => "other",
    }
);

text_enum!(
    FollowUpKind {
        Call => "call",
        Visit => "visit",
        Prayer => "prayer",
        Counselling => "counselling",
        Other => "other",
    }
);

text_enum!(
    /// Follow-up lifecycle; completed and cancelled are terminal
    FollowUpStatus {
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
        Cancelled => "cancelled",
    }
);

text_enum!(RecipientStatus { Sent => "sent", Failed => "failed" });

text_enum!(
    /// Spreadsheet dataset handled by sync
    SyncDataset {
        Members => "members",
        Tithes => "tithes",
        Attendance => "attendance",
    }
);

text_enum!(
    /// Why a sync row was not inserted
    IssueKind {
        Duplicate => "duplicate",
        Invalid => "invalid",
        Failed => "failed",
    }
);

text_enum!(
    IssueStatus {
        Open => "open",
        Overwritten => "overwritten",
        Created => "created",
        Dismissed => "dismissed",
    }
);

impl FollowUpStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, FollowUpStatus::Completed | FollowUpStatus::Cancelled)
    }

    /// Whether moving from `self` to `next` is allowed
    pub fn can_transition_to(self, next: FollowUpStatus) -> bool {
        use FollowUpStatus::*;
        match (self, next) {
            (Pending, InProgress | Completed | Cancelled) => true,
            (InProgress, Completed | Cancelled) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

/// Dashboard account (password fields never serialised)
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: String,
    pub username: String,
    pub display_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub password_salt: String,
    pub role: Role,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Member {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub gender: Option<Gender>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
    pub occupation: Option<String>,
    pub status: MemberStatus,
    pub department_id: Option<String>,
    pub is_shepherd: bool,
    pub photo_url: Option<String>,
    pub joined_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Member {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Department {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub leader_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A church service at which attendance is taken
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Service {
    pub id: String,
    pub service_date: NaiveDate,
    pub service_type: String,
    pub visitor_count: i64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Tithe {
    pub id: String,
    pub member_id: String,
    pub amount_cents: i64,
    pub paid_on: NaiveDate,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Offering {
    pub id: String,
    pub service_date: NaiveDate,
    pub offering_type: String,
    pub amount_cents: i64,
    pub notes: Option<String>,
    pub recorded_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Expense {
    pub id: String,
    pub category: String,
    pub description: Option<String>,
    pub amount_cents: i64,
    pub spent_on: NaiveDate,
    pub recorded_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct FollowUp {
    pub id: String,
    pub member_id: String,
    pub shepherd_id: Option<String>,
    pub kind: FollowUpKind,
    pub status: FollowUpStatus,
    pub due_on: NaiveDate,
    pub notes: Option<String>,
    pub outcome: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SmsMessage {
    pub id: String,
    pub body: String,
    pub audience: String,
    pub segments: i64,
    pub recipient_count: i64,
    pub sent_count: i64,
    pub failed_count: i64,
    pub skipped_count: i64,
    pub sent_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SmsRecipient {
    pub message_id: String,
    pub phone: String,
    pub member_id: Option<String>,
    pub status: RecipientStatus,
    pub provider_ref: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SyncRun {
    pub id: String,
    pub dataset: SyncDataset,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_rows: i64,
    pub inserted: i64,
    pub duplicates: i64,
    pub invalid: i64,
    pub failed: i64,
    pub started_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SyncIssue {
    pub id: String,
    pub run_id: String,
    pub dataset: SyncDataset,
    pub row_number: i64,
    pub kind: IssueKind,
    pub reason: String,
    /// JSON object of header -> cell text
    pub payload: sqlx::types::Json<serde_json::Map<String, serde_json::Value>>,
    pub existing_id: Option<String>,
    pub status: IssueStatus,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
