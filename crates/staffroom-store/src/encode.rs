//! Encoding and decoding between domain types and the plain-text columns
//! stored in SQLite.
//!
//! Timestamps are RFC 3339 strings, descriptors are compact JSON arrays and
//! statuses are lowercase words. Status and location are split into two
//! columns on write and recombined into an [`Attendance`] on read.

use chrono::{DateTime, Utc};
use staffroom_core::{Attendance, Descriptor, Identity, IdentityId};

use crate::{Error, Result};

// --- DateTime<Utc> ---

pub fn encode_dt(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::DateParse(e.to_string()))
}

// --- Attendance ---

pub fn encode_attendance(a: &Attendance) -> (&'static str, Option<&str>) {
    let status = match a {
        Attendance::In { .. } => "in",
        Attendance::Out { .. } => "out",
        Attendance::Class { .. } => "class",
    };
    (status, a.location())
}

pub fn decode_attendance(
    id: IdentityId,
    status: &str,
    location: Option<String>,
) -> Result<Attendance> {
    let missing = |what: &str| Error::Corrupt {
        id,
        reason: format!("status {what:?} without a location"),
    };
    match status {
        "in" => Ok(Attendance::In {
            room: location.ok_or_else(|| missing("in"))?,
        }),
        "out" => Ok(Attendance::Out { destination: location }),
        "class" => Ok(Attendance::Class {
            room: location.ok_or_else(|| missing("class"))?,
        }),
        other => Err(Error::Corrupt {
            id,
            reason: format!("unknown status {other:?}"),
        }),
    }
}

// --- Descriptor ---

pub fn encode_descriptor(d: &Descriptor) -> Result<String> {
    Ok(serde_json::to_string(d.values())?)
}

pub fn decode_descriptor(id: IdentityId, s: &str) -> Result<Descriptor> {
    let values: Vec<f64> = serde_json::from_str(s)?;
    Descriptor::new(values).map_err(|e| Error::Corrupt {
        id,
        reason: e.to_string(),
    })
}

// --- Row ---

/// Column values as read from `identities`, before decoding.
pub struct RawIdentity {
    pub id: IdentityId,
    pub name: String,
    pub seat_code: String,
    pub department: Option<String>,
    pub descriptor: Option<String>,
    pub status: String,
    pub location: Option<String>,
    pub last_seen: String,
}

/// Column list matching [`RawIdentity::from_row`].
pub const IDENTITY_COLUMNS: &str =
    "id, name, seat_code, department, descriptor, status, location, last_seen";

impl RawIdentity {
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            seat_code: row.get(2)?,
            department: row.get(3)?,
            descriptor: row.get(4)?,
            status: row.get(5)?,
            location: row.get(6)?,
            last_seen: row.get(7)?,
        })
    }

    pub fn decode(self) -> Result<Identity> {
        let descriptor = self
            .descriptor
            .as_deref()
            .map(|s| decode_descriptor(self.id, s))
            .transpose()?;
        Ok(Identity {
            id: self.id,
            attendance: decode_attendance(self.id, &self.status, self.location)?,
            last_seen: decode_dt(&self.last_seen)?,
            name: self.name,
            seat_code: self.seat_code,
            department: self.department,
            descriptor,
        })
    }
}
