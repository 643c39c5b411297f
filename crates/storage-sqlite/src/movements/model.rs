//! Database model for movements.

use chrono::{DateTime, SecondsFormat, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::corrupt;
use snapledger_core::constants::DATE_FORMAT;
use snapledger_core::movements::{Movement, MovementDetails};
use snapledger_core::Result;

/// Database model for movements. Trade, income and cash fields live in the
/// `details` JSON; `movement_date` is derived from `executed_at` on write.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::movements)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[serde(rename_all = "camelCase")]
pub struct MovementDB {
    pub id: String,
    pub account_id: String,
    pub currency: String,
    pub kind: String,
    pub executed_at: String,
    pub movement_date: String,
    pub sequence: i64,
    pub details: String,
    pub created_at: String,
}

/// Fixed-width UTC timestamp; sorts the same as text and as time.
pub(crate) fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl MovementDB {
    pub fn from_domain(movement: &Movement) -> Result<Self> {
        let details = serde_json::to_string(&movement.details)
            .map_err(|e| corrupt("movements", format!("{}: {}", movement.id, e)))?;
        Ok(Self {
            id: movement.id.clone(),
            account_id: movement.account_id.clone(),
            currency: movement.currency.clone(),
            kind: movement.kind().as_str().to_string(),
            executed_at: format_instant(&movement.executed_at),
            movement_date: movement.normalized_date().format(DATE_FORMAT).to_string(),
            sequence: movement.sequence,
            details,
            created_at: format_instant(&Utc::now()),
        })
    }
}

impl TryFrom<MovementDB> for Movement {
    type Error = snapledger_core::Error;

    fn try_from(db: MovementDB) -> Result<Self> {
        let executed_at = DateTime::parse_from_rfc3339(&db.executed_at)
            .map_err(|e| corrupt("movements", format!("{} executed_at: {}", db.id, e)))?
            .with_timezone(&Utc);
        let details: MovementDetails = serde_json::from_str(&db.details)
            .map_err(|e| corrupt("movements", format!("{} details: {}", db.id, e)))?;
        Ok(Movement {
            id: db.id,
            account_id: db.account_id,
            currency: db.currency,
            executed_at,
            sequence: db.sequence,
            details,
        })
    }
}
