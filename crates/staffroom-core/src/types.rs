use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Identifier assigned by the persistence layer on creation. Never reused.
pub type IdentityId = i64;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DescriptorError {
    #[error("descriptor is empty")]
    Empty,
    #[error("descriptor value at index {index} is not finite")]
    NonFinite { index: usize },
}

/// Face descriptor produced by the external feature extractor
/// (typically 128-dimensional).
///
/// Always non-empty with finite values; constructed only through [`Descriptor::new`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Descriptor(Vec<f64>);

impl Descriptor {
    pub fn new(values: Vec<f64>) -> Result<Self, DescriptorError> {
        if values.is_empty() {
            return Err(DescriptorError::Empty);
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(DescriptorError::NonFinite { index });
        }
        Ok(Self(values))
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Euclidean distance between two descriptors.
    ///
    /// Vectors of different length are compared as if the shorter one
    /// were padded with zeros.
    pub fn euclidean_distance(&self, other: &Descriptor) -> f64 {
        let len = self.0.len().max(other.0.len());
        (0..len)
            .map(|i| {
                let a = self.0.get(i).copied().unwrap_or(0.0);
                let b = other.0.get(i).copied().unwrap_or(0.0);
                (a - b).powi(2)
            })
            .sum::<f64>()
            .sqrt()
    }
}

impl TryFrom<Vec<f64>> for Descriptor {
    type Error = DescriptorError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

/// Attendance status of an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// Present in the shared room.
    In,
    /// Away at a named destination.
    Out,
    /// Teaching in a classroom.
    Class,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::In => "IN",
            Status::Out => "OUT",
            Status::Class => "CLASS",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "in" => Ok(Status::In),
            "out" => Ok(Status::Out),
            "class" => Ok(Status::Class),
            other => Err(format!("unknown status: {other:?}")),
        }
    }
}

/// Status and location, always set together.
///
/// The location's meaning depends on the status: the shared room when
/// `In`, the destination when `Out`, the classroom when `Class`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attendance {
    In { room: String },
    /// `destination` is `None` only for identities that have never left
    /// through a transition (fresh enrollments).
    Out { destination: Option<String> },
    Class { room: String },
}

impl Attendance {
    pub fn status(&self) -> Status {
        match self {
            Attendance::In { .. } => Status::In,
            Attendance::Out { .. } => Status::Out,
            Attendance::Class { .. } => Status::Class,
        }
    }

    pub fn location(&self) -> Option<&str> {
        match self {
            Attendance::In { room } | Attendance::Class { room } => Some(room),
            Attendance::Out { destination } => destination.as_deref(),
        }
    }
}

impl Default for Attendance {
    fn default() -> Self {
        Attendance::Out { destination: None }
    }
}

/// An enrolled person.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub id: IdentityId,
    pub name: String,
    /// Seat code; the first character groups seats into zones.
    pub seat_code: String,
    pub department: Option<String>,
    /// Absent identities are never considered by the matcher.
    pub descriptor: Option<Descriptor>,
    pub attendance: Attendance,
    /// Time of the most recent transition (or enrollment).
    pub last_seen: DateTime<Utc>,
}

impl Identity {
    pub fn status(&self) -> Status {
        self.attendance.status()
    }

    pub fn location(&self) -> Option<&str> {
        self.attendance.location()
    }
}

/// Client-facing shape. The descriptor is biometric data and never leaves
/// the daemon through listings.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdentityJson<'a> {
    id: IdentityId,
    name: &'a str,
    seat_code: &'a str,
    department: Option<&'a str>,
    status: Status,
    location: Option<&'a str>,
    last_seen: DateTime<Utc>,
    enrolled: bool,
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        IdentityJson {
            id: self.id,
            name: &self.name,
            seat_code: &self.seat_code,
            department: self.department.as_deref(),
            status: self.status(),
            location: self.location(),
            last_seen: self.last_seen,
            enrolled: self.descriptor.is_some(),
        }
        .serialize(serializer)
    }
}

/// Enrollment fields as collected by the operator, not yet validated.
#[derive(Debug, Clone, Default)]
pub struct NewIdentity {
    pub name: String,
    pub seat_code: String,
    pub department: Option<String>,
    pub descriptor: Option<Descriptor>,
}

impl NewIdentity {
    /// Check required fields and normalize whitespace.
    ///
    /// Fails with [`Error::IncompleteEnrollment`] before any persistence call.
    pub fn validate(self) -> Result<Enrollment> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::IncompleteEnrollment("name"));
        }
        let seat_code = self.seat_code.trim();
        if seat_code.is_empty() {
            return Err(Error::IncompleteEnrollment("seat code"));
        }
        let descriptor = self
            .descriptor
            .ok_or(Error::IncompleteEnrollment("descriptor"))?;

        Ok(Enrollment {
            name: name.to_string(),
            seat_code: seat_code.to_string(),
            department: non_empty(self.department.as_deref()),
            descriptor,
        })
    }
}

/// A validated enrollment, ready to be persisted.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Enrollment {
    pub name: String,
    pub seat_code: String,
    pub department: Option<String>,
    pub descriptor: Descriptor,
}

/// Administrative edit of descriptive fields.
///
/// Attendance is deliberately absent: it changes only through transitions.
/// An empty `department` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IdentityPatch {
    pub name: Option<String>,
    pub seat_code: Option<String>,
    pub department: Option<String>,
}

impl IdentityPatch {
    /// Trim values and reject blank required fields.
    pub fn normalized(self) -> Result<Self> {
        let name = match self.name {
            Some(n) if n.trim().is_empty() => return Err(Error::EmptyField("name")),
            Some(n) => Some(n.trim().to_string()),
            None => None,
        };
        let seat_code = match self.seat_code {
            Some(s) if s.trim().is_empty() => return Err(Error::EmptyField("seat code")),
            Some(s) => Some(s.trim().to_string()),
            None => None,
        };
        Ok(Self {
            name,
            seat_code,
            department: self.department.map(|d| d.trim().to_string()),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.seat_code.is_none() && self.department.is_none()
    }

    pub fn apply(&self, identity: &mut Identity) {
        if let Some(name) = &self.name {
            identity.name = name.clone();
        }
        if let Some(seat_code) = &self.seat_code {
            identity.seat_code = seat_code.clone();
        }
        if let Some(department) = &self.department {
            identity.department = non_empty(Some(department));
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
