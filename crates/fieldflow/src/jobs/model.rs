use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use uuid::Uuid;

use crate::queue::model::ParseEnumError;

/// Enums stored as TEXT columns: `as_str` is the column value and the serde name.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident, $label:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $label,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = ParseEnumError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }
    };
}

text_enum!(
    /// Lifecycle of a service job.
    JobStatus, "job status" {
        New => "new",
        Quoted => "quoted",
        WaitingParts => "waiting_parts",
        Scheduled => "scheduled",
        InProgress => "in_progress",
        Complete => "complete",
        Cancelled => "cancelled",
    }
);

text_enum!(ProductType, "product type" {
    Pool => "pool",
    Spa => "spa",
    Solar => "solar",
    GasHotWater => "gas_hot_water",
    Other => "other",
});

text_enum!(Urgency, "urgency" {
    Routine => "routine",
    Urgent => "urgent",
    Emergency => "emergency",
});

text_enum!(
    /// Who caused a status change.
    Actor, "actor" {
        System => "system",
        User => "user",
    }
);

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Cancelled)
    }

    /// Position along the service pipeline. `None` for cancelled.
    pub fn pipeline_rank(&self) -> Option<u8> {
        match self {
            JobStatus::New => Some(0),
            JobStatus::Quoted => Some(1),
            JobStatus::WaitingParts => Some(2),
            JobStatus::Scheduled => Some(3),
            JobStatus::InProgress => Some(4),
            JobStatus::Complete => Some(5),
            JobStatus::Cancelled => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Job {
    pub id: Uuid,
    pub job_number: String,
    pub customer_id: Uuid,
    #[sqlx(try_from = "String")]
    pub product_type: ProductType,
    #[sqlx(try_from = "String")]
    pub urgency: Urgency,
    pub issue_description: String,
    #[sqlx(try_from = "String")]
    pub status: JobStatus,
    pub assigned_technician: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub calendar_event_id: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub quoted_amount_cents: Option<i64>,
    pub final_amount_cents: Option<i64>,
    pub completion_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub suburb: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row of the append-only status ledger.
#[derive(Debug, Clone, Serialize)]
pub struct StatusHistoryEntry {
    pub id: Uuid,
    pub job_id: Uuid,
    pub seq: i32,
    pub from_status: Option<JobStatus>,
    pub to_status: JobStatus,
    pub actor: Actor,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

// Written by hand: `from_status` is a nullable enum column.
impl<'r> FromRow<'r, PgRow> for StatusHistoryEntry {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let decode = |column: &str, e: ParseEnumError| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        };

        let from_status = row
            .try_get::<Option<String>, _>("from_status")?
            .map(|s| s.parse::<JobStatus>())
            .transpose()
            .map_err(|e| decode("from_status", e))?;
        let to_status = row
            .try_get::<String, _>("to_status")?
            .parse::<JobStatus>()
            .map_err(|e| decode("to_status", e))?;
        let actor = row
            .try_get::<String, _>("actor")?
            .parse::<Actor>()
            .map_err(|e| decode("actor", e))?;

        Ok(Self {
            id: row.try_get("id")?,
            job_id: row.try_get("job_id")?,
            seq: row.try_get("seq")?,
            from_status,
            to_status,
            actor,
            note: row.try_get("note")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_values_parse_back() {
        for s in JobStatus::ALL {
            assert_eq!(s.as_str().parse::<JobStatus>().unwrap(), *s);
        }
        assert_eq!("gas_hot_water".parse::<ProductType>().unwrap(), ProductType::GasHotWater);
        assert!("boiler".parse::<ProductType>().is_err());
        assert_eq!(
            serde_json::to_string(&JobStatus::WaitingParts).unwrap(),
            "\"waiting_parts\""
        );
    }

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Complete.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Scheduled.is_terminal());
        assert_eq!(JobStatus::Cancelled.pipeline_rank(), None);
    }
}
