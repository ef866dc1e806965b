//! Read-only roster snapshot for display: headcount and seats grouped into
//! zones by seat-code prefix. Zones never influence matching.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::types::{Identity, IdentityId, Status};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Headcount {
    pub total: usize,
    pub present: usize,
    pub away: usize,
    pub in_class: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Seat {
    pub id: IdentityId,
    pub name: String,
    pub seat_code: String,
    pub department: Option<String>,
    pub status: Status,
    pub location: Option<String>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Zone {
    pub key: String,
    pub seats: Vec<Seat>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Board {
    pub headcount: Headcount,
    pub zones: Vec<Zone>,
}

/// Zone key for a seat code: its first character, upper-cased.
pub fn zone_key(seat_code: &str) -> String {
    seat_code
        .trim()
        .chars()
        .next()
        .map(|c| c.to_uppercase().collect())
        .unwrap_or_default()
}

impl Board {
    pub fn from_identities(identities: &[Identity]) -> Self {
        let mut headcount = Headcount {
            total: identities.len(),
            ..Default::default()
        };
        let mut zones: BTreeMap<String, Vec<Seat>> = BTreeMap::new();

        for identity in identities {
            match identity.status() {
                Status::In => headcount.present += 1,
                Status::Out => headcount.away += 1,
                Status::Class => headcount.in_class += 1,
            }
            zones
                .entry(zone_key(&identity.seat_code))
                .or_default()
                .push(Seat {
                    id: identity.id,
                    name: identity.name.clone(),
                    seat_code: identity.seat_code.clone(),
                    department: identity.department.clone(),
                    status: identity.status(),
                    location: identity.location().map(str::to_string),
                    last_seen: identity.last_seen,
                });
        }

        let zones = zones
            .into_iter()
            .map(|(key, mut seats)| {
                seats.sort_by(|a, b| a.seat_code.cmp(&b.seat_code).then(a.id.cmp(&b.id)));
                Zone { key, seats }
            })
            .collect();

        Self { headcount, zones }
    }
}
