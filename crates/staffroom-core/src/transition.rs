//! Attendance state machine.
//!
//! The engine is pure: it looks at a match outcome or a manual action plus
//! the identity's current attendance and emits a [`TransitionCommand`] for
//! the persistence layer to apply. Status and location always change
//! together.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::matcher::MatchOutcome;
use crate::places::Places;
use crate::types::{Attendance, Descriptor, Identity, IdentityId};

/// Instruction to overwrite an identity's attendance.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionCommand {
    pub identity_id: IdentityId,
    pub attendance: Attendance,
    /// Becomes the identity's `last_seen`.
    pub at: DateTime<Utc>,
}

/// Unmatched scan: the captured descriptor must be paired with operator
/// supplied details and enrolled. It is never re-captured.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrollmentRequest {
    pub descriptor: Descriptor,
    /// Nearest distance seen; `null` in JSON when nobody is enrolled.
    pub distance: f64,
}

/// What a scan leads to.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanDecision {
    Transition(TransitionCommand),
    /// The identity is in the room; a destination must be chosen before it
    /// can be checked out.
    DestinationRequired { identity_id: IdentityId },
    Enroll(EnrollmentRequest),
}

/// Direct operator action that bypasses scanning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualAction {
    MarkIn,
    /// Free text; need not be one of the enumerated destinations.
    MarkOut { destination: String },
    MarkInClass { classroom: String },
}

#[derive(Debug, Clone, Default)]
pub struct AttendanceEngine {
    places: Places,
}

impl AttendanceEngine {
    pub fn new(places: Places) -> Self {
        Self { places }
    }

    pub fn places(&self) -> &Places {
        &self.places
    }

    /// Decide what a scan does.
    ///
    /// A matched identity that is `Out` or `In class` is checked in
    /// directly. A matched identity already `In` is only checked out when
    /// `destination` is supplied, and it must belong to the enumerated set.
    pub fn apply_scan_result(
        &self,
        probe: &Descriptor,
        outcome: &MatchOutcome,
        destination: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ScanDecision> {
        let identity = match outcome {
            MatchOutcome::NoMatch { distance } => {
                return Ok(ScanDecision::Enroll(EnrollmentRequest {
                    descriptor: probe.clone(),
                    distance: *distance,
                }));
            }
            MatchOutcome::Matched { identity, .. } => identity,
        };

        match &identity.attendance {
            Attendance::Out { .. } | Attendance::Class { .. } => {
                Ok(ScanDecision::Transition(self.check_in(identity.id, now)))
            }
            Attendance::In { .. } => match destination {
                None => Ok(ScanDecision::DestinationRequired {
                    identity_id: identity.id,
                }),
                Some(chosen) => {
                    let canonical = self
                        .places
                        .find(chosen)
                        .ok_or_else(|| Error::UnknownDestination(chosen.to_string()))?;
                    Ok(ScanDecision::Transition(TransitionCommand {
                        identity_id: identity.id,
                        attendance: Attendance::Out {
                            destination: Some(canonical.to_string()),
                        },
                        at: now,
                    }))
                }
            },
        }
    }

    /// Decide what a manual action does. Any current state may be left.
    pub fn apply_manual_action(
        &self,
        identity: &Identity,
        action: &ManualAction,
        now: DateTime<Utc>,
    ) -> Result<TransitionCommand> {
        let attendance = match action {
            ManualAction::MarkIn => return Ok(self.check_in(identity.id, now)),
            ManualAction::MarkOut { destination } => Attendance::Out {
                destination: Some(required(destination, "destination")?),
            },
            ManualAction::MarkInClass { classroom } => Attendance::Class {
                room: required(classroom, "classroom")?,
            },
        };

        Ok(TransitionCommand {
            identity_id: identity.id,
            attendance,
            at: now,
        })
    }

    fn check_in(&self, identity_id: IdentityId, now: DateTime<Utc>) -> TransitionCommand {
        TransitionCommand {
            identity_id,
            attendance: Attendance::In {
                room: self.places.room().to_string(),
            },
            at: now,
        }
    }
}

fn required(value: &str, what: &'static str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::IncompleteManualTransition(what));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn desc(values: &[f64]) -> Descriptor {
        Descriptor::new(values.to_vec()).unwrap()
    }

    fn identity(attendance: Attendance) -> Identity {
        Identity {
            id: 42,
            name: "Anil".into(),
            seat_code: "A3".into(),
            department: Some("Chemistry".into()),
            descriptor: Some(desc(&[0.2, 0.4])),
            attendance,
            last_seen: Utc::now() - Duration::hours(1),
        }
    }

    fn matched(attendance: Attendance) -> MatchOutcome {
        MatchOutcome::Matched {
            identity: identity(attendance),
            distance: 0.0,
        }
    }

    #[test]
    fn test_scan_checks_in_when_out() {
        let engine = AttendanceEngine::default();
        let now = Utc::now();
        let decision = engine
            .apply_scan_result(&desc(&[0.2, 0.4]), &matched(Attendance::default()), None, now)
            .unwrap();
        assert_eq!(
            decision,
            ScanDecision::Transition(TransitionCommand {
                identity_id: 42,
                attendance: Attendance::In { room: "Staff Room".into() },
                at: now,
            })
        );
    }

    #[test]
    fn test_scan_checks_in_from_class_ignoring_destination() {
        let engine = AttendanceEngine::default();
        let now = Utc::now();
        let outcome = matched(Attendance::Class { room: "Lab-201".into() });
        let decision = engine
            .apply_scan_result(&desc(&[0.2, 0.4]), &outcome, Some("Library"), now)
            .unwrap();
        let ScanDecision::Transition(cmd) = decision else {
            panic!("expected a transition");
        };
        assert_eq!(cmd.attendance, Attendance::In { room: "Staff Room".into() });
    }

    #[test]
    fn test_scan_when_in_requires_destination() {
        let engine = AttendanceEngine::default();
        let outcome = matched(Attendance::In { room: "Staff Room".into() });
        let decision = engine
            .apply_scan_result(&desc(&[0.2, 0.4]), &outcome, None, Utc::now())
            .unwrap();
        assert_eq!(decision, ScanDecision::DestinationRequired { identity_id: 42 });
    }

    #[test]
    fn test_scan_when_in_with_destination_checks_out() {
        let engine = AttendanceEngine::default();
        let now = Utc::now();
        let outcome = matched(Attendance::In { room: "Staff Room".into() });
        let decision = engine
            .apply_scan_result(&desc(&[0.2, 0.4]), &outcome, Some("library"), now)
            .unwrap();
        assert_eq!(
            decision,
            ScanDecision::Transition(TransitionCommand {
                identity_id: 42,
                attendance: Attendance::Out { destination: Some("Library".into()) },
                at: now,
            })
        );
    }

    #[test]
    fn test_scan_rejects_destination_outside_set() {
        let engine = AttendanceEngine::default();
        let outcome = matched(Attendance::In { room: "Staff Room".into() });
        let err = engine
            .apply_scan_result(&desc(&[0.2, 0.4]), &outcome, Some("Gym"), Utc::now())
            .unwrap_err();
        assert!(matches!(err, Error::UnknownDestination(d) if d == "Gym"));
    }

    #[test]
    fn test_no_match_requests_enrollment_with_probe() {
        let engine = AttendanceEngine::default();
        let probe = desc(&[0.9, 0.1]);
        let decision = engine
            .apply_scan_result(&probe, &MatchOutcome::NoMatch { distance: 0.9 }, None, Utc::now())
            .unwrap();
        assert_eq!(
            decision,
            ScanDecision::Enroll(EnrollmentRequest { descriptor: probe, distance: 0.9 })
        );
    }

    #[test]
    fn test_mark_in_from_any_state() {
        let engine = AttendanceEngine::default();
        let now = Utc::now();
        for attendance in [
            Attendance::default(),
            Attendance::In { room: "Staff Room".into() },
            Attendance::Class { room: "BMS-401".into() },
        ] {
            let cmd = engine
                .apply_manual_action(&identity(attendance), &ManualAction::MarkIn, now)
                .unwrap();
            assert_eq!(cmd.attendance, Attendance::In { room: "Staff Room".into() });
            assert_eq!(cmd.at, now);
        }
    }

    #[test]
    fn test_mark_out_accepts_free_text() {
        let engine = AttendanceEngine::default();
        let action = ManualAction::MarkOut { destination: " Dentist ".into() };
        let cmd = engine
            .apply_manual_action(
                &identity(Attendance::In { room: "Staff Room".into() }),
                &action,
                Utc::now(),
            )
            .unwrap();
        assert_eq!(cmd.attendance, Attendance::Out { destination: Some("Dentist".into()) });
    }

    #[test]
    fn test_mark_out_without_destination_rejected() {
        let engine = AttendanceEngine::default();
        let action = ManualAction::MarkOut { destination: "   ".into() };
        let err = engine
            .apply_manual_action(&identity(Attendance::default()), &action, Utc::now())
            .unwrap_err();
        assert!(matches!(err, Error::IncompleteManualTransition("destination")));
    }

    #[test]
    fn test_mark_in_class() {
        let engine = AttendanceEngine::default();
        let cmd = engine
            .apply_manual_action(
                &identity(Attendance::default()),
                &ManualAction::MarkInClass { classroom: "Lab-201".into() },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(cmd.attendance, Attendance::Class { room: "Lab-201".into() });

        let err = engine
            .apply_manual_action(
                &identity(Attendance::default()),
                &ManualAction::MarkInClass { classroom: String::new() },
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::IncompleteManualTransition("classroom")));
    }

    #[test]
    fn test_custom_room_name() {
        let engine = AttendanceEngine::new(Places::new("Faculty Lounge", Vec::new()));
        let cmd = engine
            .apply_manual_action(
                &identity(Attendance::default()),
                &ManualAction::MarkIn,
                Utc::now(),
            )
            .unwrap();
        assert_eq!(cmd.attendance.location(), Some("Faculty Lounge"));
    }
}
