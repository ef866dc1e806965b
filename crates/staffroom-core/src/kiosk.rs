//! The kiosk: ties the matcher, the attendance engine and a store together
//! and tracks destination prompts that are waiting on the operator.
//!
//! A `Kiosk` is meant to have exactly one owner that serializes every call
//! (the daemon runs it on a dedicated thread), so transitions for any
//! identity are applied strictly one after another.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::board::Board;
use crate::error::{Error, Result};
use crate::matcher::{EuclideanMatcher, MatchOutcome, Matcher, MATCH_THRESHOLD};
use crate::places::Places;
use crate::store::IdentityStore;
use crate::transition::{
    AttendanceEngine, EnrollmentRequest, ManualAction, ScanDecision, TransitionCommand,
};
use crate::types::{Descriptor, Identity, IdentityId, IdentityPatch, NewIdentity, Status};

pub const DEFAULT_PROMPT_TIMEOUT_SECS: i64 = 60;

/// Result of a scan, as reported to the operator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScanOutcome {
    CheckedIn(Identity),
    /// A departure prompt is now open; complete it with
    /// [`Kiosk::choose_destination`] or abandon it with [`Kiosk::cancel_prompt`].
    DestinationRequired {
        identity: Identity,
        places: Vec<String>,
    },
    EnrollmentRequired(EnrollmentRequest),
}

/// A scan of someone already in the room, waiting for a destination.
#[derive(Debug, Clone)]
struct PendingDeparture {
    probe: Descriptor,
    distance: f64,
    opened_at: DateTime<Utc>,
}

/// Kiosk state over a store `S` and a matcher `M`.
///
/// A destination prompt stays open until it is answered with
/// [`Kiosk::choose_destination`], cancelled with [`Kiosk::cancel_prompt`],
/// or left unanswered past the prompt timeout. Expiry is an automatic
/// cancellation: the prompt is dropped and no attendance change is applied.
pub struct Kiosk<S, M = EuclideanMatcher> {
    store: S,
    matcher: M,
    engine: AttendanceEngine,
    threshold: f64,
    prompt_timeout: Duration,
    prompts: HashMap<IdentityId, PendingDeparture>,
}

impl<S: IdentityStore> Kiosk<S> {
    pub fn new(store: S, places: Places) -> Self {
        Self::with_matcher(store, EuclideanMatcher, places)
    }
}

impl<S: IdentityStore, M: Matcher> Kiosk<S, M> {
    pub fn with_matcher(store: S, matcher: M, places: Places) -> Self {
        Self {
            store,
            matcher,
            engine: AttendanceEngine::new(places),
            threshold: MATCH_THRESHOLD,
            prompt_timeout: Duration::seconds(DEFAULT_PROMPT_TIMEOUT_SECS),
            prompts: HashMap::new(),
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_prompt_timeout(mut self, timeout: Duration) -> Self {
        self.prompt_timeout = timeout;
        self
    }

    pub fn places(&self) -> &Places {
        self.engine.places()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn pending_prompts(&self) -> usize {
        self.prompts.len()
    }

    /// Resolve a descriptor without touching any state.
    pub fn match_descriptor(&self, probe: &Descriptor) -> Result<MatchOutcome> {
        let gallery = self.store.list().map_err(Error::persistence)?;
        let outcome = self.matcher.resolve(probe, &gallery, self.threshold);
        tracing::debug!(
            candidates = gallery.len(),
            distance = outcome.distance(),
            matched = outcome.identity().map(|i| i.id),
            "descriptor resolved"
        );
        Ok(outcome)
    }

    /// Handle one capture. `None` means the extractor found no face.
    pub fn scan(&mut self, probe: Option<Descriptor>, now: DateTime<Utc>) -> Result<ScanOutcome> {
        let probe = probe.ok_or(Error::NoFaceDetected)?;
        self.expire_prompts(now);

        let outcome = self.match_descriptor(&probe)?;
        if let Some(identity) = outcome.identity() {
            self.ensure_idle(identity.id)?;
        }

        match self.engine.apply_scan_result(&probe, &outcome, None, now)? {
            ScanDecision::Transition(command) => {
                let identity = self.commit(&command)?;
                tracing::info!(id = identity.id, name = %identity.name, "checked in by scan");
                Ok(ScanOutcome::CheckedIn(identity))
            }
            ScanDecision::DestinationRequired { identity_id } => {
                let identity = outcome
                    .identity()
                    .cloned()
                    .ok_or(Error::UnknownIdentity(identity_id))?;
                self.prompts.insert(
                    identity_id,
                    PendingDeparture {
                        probe,
                        distance: outcome.distance(),
                        opened_at: now,
                    },
                );
                tracing::info!(id = identity_id, "destination prompt opened");
                Ok(ScanOutcome::DestinationRequired {
                    identity,
                    places: self.places().destinations().to_vec(),
                })
            }
            ScanDecision::Enroll(request) => {
                tracing::info!(distance = request.distance, "no match; enrollment required");
                Ok(ScanOutcome::EnrollmentRequired(request))
            }
        }
    }

    /// Complete a departure prompt. A missing or blank destination selects
    /// the default. On failure the prompt stays open so the operator can
    /// retry.
    pub fn choose_destination(
        &mut self,
        id: IdentityId,
        destination: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Identity> {
        self.expire_prompts(now);
        let pending = self.prompts.get(&id).cloned().ok_or(Error::NoPendingPrompt(id))?;

        let Some(identity) = self.store.get(id).map_err(Error::persistence)? else {
            self.prompts.remove(&id);
            return Err(Error::UnknownIdentity(id));
        };
        if identity.status() != Status::In {
            tracing::warn!(
                id,
                status = %identity.status(),
                "identity left the room while prompt was open"
            );
            self.prompts.remove(&id);
            return Err(Error::NoPendingPrompt(id));
        }

        let chosen = destination
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| self.places().default_destination())
            .to_string();
        let outcome = MatchOutcome::Matched {
            identity,
            distance: pending.distance,
        };
        let command = match self
            .engine
            .apply_scan_result(&pending.probe, &outcome, Some(&chosen), now)?
        {
            ScanDecision::Transition(command) => command,
            _ => return Err(Error::NoPendingPrompt(id)),
        };

        let identity = self.commit(&command)?;
        self.prompts.remove(&id);
        tracing::info!(id, destination = ?identity.location(), "checked out by scan");
        Ok(identity)
    }

    /// Abandon a departure prompt. Never changes attendance.
    pub fn cancel_prompt(&mut self, id: IdentityId) -> bool {
        let cancelled = self.prompts.remove(&id).is_some();
        if cancelled {
            tracing::info!(id, "destination prompt cancelled");
        }
        cancelled
    }

    /// Persist a new identity from an unmatched scan.
    pub fn enroll(&mut self, new: NewIdentity, now: DateTime<Utc>) -> Result<Identity> {
        let enrollment = new.validate()?;
        let identity = self
            .store
            .create(&enrollment, now)
            .map_err(Error::persistence)?;
        tracing::info!(
            id = identity.id,
            name = %identity.name,
            seat = %identity.seat_code,
            "enrolled"
        );
        Ok(identity)
    }

    pub fn apply_manual_action(
        &mut self,
        id: IdentityId,
        action: &ManualAction,
        now: DateTime<Utc>,
    ) -> Result<Identity> {
        self.expire_prompts(now);
        self.ensure_idle(id)?;

        let identity = self
            .store
            .get(id)
            .map_err(Error::persistence)?
            .ok_or(Error::UnknownIdentity(id))?;
        let command = self.engine.apply_manual_action(&identity, action, now)?;
        let identity = self.commit(&command)?;
        tracing::info!(
            id,
            status = %identity.status(),
            location = ?identity.location(),
            "manual transition"
        );
        Ok(identity)
    }

    /// Administrative edit of name, seat code or department.
    pub fn update(&mut self, id: IdentityId, patch: IdentityPatch) -> Result<Identity> {
        let patch = patch.normalized()?;
        let updated = if patch.is_empty() {
            self.store.get(id)
        } else {
            self.store.update(id, &patch)
        };
        updated
            .map_err(Error::persistence)?
            .ok_or(Error::UnknownIdentity(id))
    }

    pub fn remove(&mut self, id: IdentityId) -> Result<()> {
        if !self.store.delete(id).map_err(Error::persistence)? {
            return Err(Error::UnknownIdentity(id));
        }
        self.prompts.remove(&id);
        tracing::info!(id, "identity removed");
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<Identity>> {
        self.store.list().map_err(Error::persistence)
    }

    pub fn board(&self) -> Result<Board> {
        Ok(Board::from_identities(&self.list()?))
    }

    fn commit(&mut self, command: &TransitionCommand) -> Result<Identity> {
        self.store
            .apply(command)
            .map_err(Error::persistence)?
            .ok_or(Error::UnknownIdentity(command.identity_id))
    }

    fn ensure_idle(&self, id: IdentityId) -> Result<()> {
        if self.prompts.contains_key(&id) {
            return Err(Error::TransitionInProgress(id));
        }
        Ok(())
    }

    /// Cancel prompts older than the timeout. Never touches the store.
    fn expire_prompts(&mut self, now: DateTime<Utc>) {
        let timeout = self.prompt_timeout;
        self.prompts.retain(|id, pending| {
            let live = now - pending.opened_at < timeout;
            if !live {
                tracing::info!(id, "destination prompt expired");
            }
            live
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::types::Attendance;

    fn desc(values: &[f64]) -> Descriptor {
        Descriptor::new(values.to_vec()).unwrap()
    }

    fn kiosk() -> Kiosk<MemoryStore> {
        Kiosk::new(MemoryStore::default(), Places::default())
    }

    fn enroll(k: &mut Kiosk<MemoryStore>, name: &str, seat: &str, values: &[f64]) -> Identity {
        k.enroll(
            NewIdentity {
                name: name.into(),
                seat_code: seat.into(),
                department: None,
                descriptor: Some(desc(values)),
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_scenario_enroll_then_scan_checks_in() {
        let mut k = kiosk();
        let d = [0.1, 0.2, 0.3];
        let x = enroll(&mut k, "Xavier", "A1", &d);
        assert_eq!(x.status(), Status::Out);

        let outcome = k.match_descriptor(&desc(&d)).unwrap();
        assert_eq!(outcome.identity().map(|i| i.id), Some(x.id));
        assert_eq!(outcome.distance(), 0.0);

        let now = Utc::now();
        let ScanOutcome::CheckedIn(x) = k.scan(Some(desc(&d)), now).unwrap() else {
            panic!("expected check-in");
        };
        assert_eq!(x.attendance, Attendance::In { room: "Staff Room".into() });
        assert_eq!(x.last_seen, now);
    }

    #[test]
    fn test_scenario_scan_while_in_prompts_for_destination() {
        let mut k = kiosk();
        let d = [0.1, 0.2, 0.3];
        let x = enroll(&mut k, "Xavier", "A1", &d);
        k.scan(Some(desc(&d)), Utc::now()).unwrap();

        let outcome = k.scan(Some(desc(&d)), Utc::now()).unwrap();
        let ScanOutcome::DestinationRequired { identity, places } = outcome else {
            panic!("expected a destination prompt");
        };
        assert_eq!(identity.id, x.id);
        assert_eq!(places, Places::default().destinations());
        // Still in the room until a destination is supplied.
        assert_eq!(k.list().unwrap()[0].status(), Status::In);

        let x = k.choose_destination(x.id, Some("Library"), Utc::now()).unwrap();
        assert_eq!(x.attendance, Attendance::Out { destination: Some("Library".into()) });
        assert_eq!(k.pending_prompts(), 0);
    }

    #[test]
    fn test_scenario_unmatched_scan_requests_enrollment() {
        let mut k = kiosk();
        let x = enroll(&mut k, "Xavier", "A1", &[0.0, 0.0]);
        let before = k.list().unwrap();

        let outcome = k.scan(Some(desc(&[0.0, 0.9])), Utc::now()).unwrap();
        let ScanOutcome::EnrollmentRequired(request) = outcome else {
            panic!("expected enrollment");
        };
        assert!((request.distance - 0.9).abs() < 1e-12);
        assert_eq!(request.descriptor, desc(&[0.0, 0.9]));
        assert_eq!(k.list().unwrap(), before);
        assert_eq!(k.list().unwrap()[0].id, x.id);
    }

    #[test]
    fn test_scenario_mark_in_class() {
        let mut k = kiosk();
        let y = enroll(&mut k, "Yamini", "B2", &[0.4, 0.4]);

        let y = k
            .apply_manual_action(
                y.id,
                &ManualAction::MarkInClass { classroom: "Lab-201".into() },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(y.attendance, Attendance::Class { room: "Lab-201".into() });

        let err = k
            .apply_manual_action(
                y.id,
                &ManualAction::MarkInClass { classroom: "".into() },
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::IncompleteManualTransition("classroom")));
        assert_eq!(k.list().unwrap()[0], y);
    }

    #[test]
    fn test_no_face_detected() {
        let mut k = kiosk();
        assert!(matches!(k.scan(None, Utc::now()), Err(Error::NoFaceDetected)));
    }

    #[test]
    fn test_empty_gallery_requests_enrollment() {
        let mut k = kiosk();
        let outcome = k.scan(Some(desc(&[0.3])), Utc::now()).unwrap();
        assert_eq!(
            outcome,
            ScanOutcome::EnrollmentRequired(EnrollmentRequest {
                descriptor: desc(&[0.3]),
                distance: f64::INFINITY,
            })
        );
    }

    #[test]
    fn test_second_scan_during_prompt_is_rejected() {
        let mut k = kiosk();
        let d = [0.5, 0.5];
        let x = enroll(&mut k, "Xavier", "A1", &d);
        k.apply_manual_action(x.id, &ManualAction::MarkIn, Utc::now()).unwrap();

        k.scan(Some(desc(&d)), Utc::now()).unwrap();
        let err = k.scan(Some(desc(&d)), Utc::now()).unwrap_err();
        assert!(matches!(err, Error::TransitionInProgress(id) if id == x.id));

        let err = k
            .apply_manual_action(
                x.id,
                &ManualAction::MarkOut { destination: "Library".into() },
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::TransitionInProgress(_)));
        assert_eq!(k.list().unwrap()[0].status(), Status::In);
    }

    #[test]
    fn test_cancel_prompt_leaves_state_unchanged() {
        let mut k = kiosk();
        let d = [0.5, 0.5];
        let x = enroll(&mut k, "Xavier", "A1", &d);
        let x = k.apply_manual_action(x.id, &ManualAction::MarkIn, Utc::now()).unwrap();

        k.scan(Some(desc(&d)), Utc::now()).unwrap();
        assert!(k.cancel_prompt(x.id));
        assert!(!k.cancel_prompt(x.id));
        assert_eq!(k.list().unwrap()[0], x);

        let err = k.choose_destination(x.id, Some("Library"), Utc::now()).unwrap_err();
        assert!(matches!(err, Error::NoPendingPrompt(_)));
    }

    #[test]
    fn test_choose_destination_defaults_to_first_place() {
        let mut k = kiosk();
        let d = [0.5, 0.5];
        let x = enroll(&mut k, "Xavier", "A1", &d);
        k.apply_manual_action(x.id, &ManualAction::MarkIn, Utc::now()).unwrap();
        k.scan(Some(desc(&d)), Utc::now()).unwrap();

        let x = k.choose_destination(x.id, Some("  "), Utc::now()).unwrap();
        assert_eq!(x.location(), Some("BMS-401"));
    }

    #[test]
    fn test_unknown_destination_keeps_prompt_open() {
        let mut k = kiosk();
        let d = [0.5, 0.5];
        let x = enroll(&mut k, "Xavier", "A1", &d);
        k.apply_manual_action(x.id, &ManualAction::MarkIn, Utc::now()).unwrap();
        k.scan(Some(desc(&d)), Utc::now()).unwrap();

        let err = k.choose_destination(x.id, Some("Moon"), Utc::now()).unwrap_err();
        assert!(matches!(err, Error::UnknownDestination(_)));
        assert_eq!(k.pending_prompts(), 1);
        assert_eq!(k.list().unwrap()[0].status(), Status::In);

        let x = k.choose_destination(x.id, Some("cafeteria"), Utc::now()).unwrap();
        assert_eq!(x.location(), Some("Cafeteria"));
    }

    #[test]
    fn test_prompt_expires() {
        let mut k = kiosk().with_prompt_timeout(Duration::seconds(30));
        let d = [0.5, 0.5];
        let x = enroll(&mut k, "Xavier", "A1", &d);
        let x = k.apply_manual_action(x.id, &ManualAction::MarkIn, Utc::now()).unwrap();

        let opened = Utc::now();
        k.scan(Some(desc(&d)), opened).unwrap();
        let later = opened + Duration::seconds(31);
        let err = k.choose_destination(x.id, Some("Library"), later).unwrap_err();
        assert!(matches!(err, Error::NoPendingPrompt(_)));
        assert_eq!(k.pending_prompts(), 0);
        assert_eq!(k.list().unwrap()[0], x);

        // A fresh scan opens a new prompt instead of being rejected.
        let outcome = k.scan(Some(desc(&d)), later).unwrap();
        assert!(matches!(outcome, ScanOutcome::DestinationRequired { .. }));
    }

    #[test]
    fn test_removed_identity_during_prompt() {
        let mut k = kiosk();
        let d = [0.5, 0.5];
        let x = enroll(&mut k, "Xavier", "A1", &d);
        k.apply_manual_action(x.id, &ManualAction::MarkIn, Utc::now()).unwrap();
        k.scan(Some(desc(&d)), Utc::now()).unwrap();

        k.remove(x.id).unwrap();
        assert_eq!(k.pending_prompts(), 0);
        let err = k.choose_destination(x.id, None, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::NoPendingPrompt(_)));
        let err = k.apply_manual_action(x.id, &ManualAction::MarkIn, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::UnknownIdentity(id) if id == x.id));
        assert!(matches!(k.remove(x.id), Err(Error::UnknownIdentity(_))));
    }

    #[test]
    fn test_mark_out_without_destination_leaves_state() {
        let mut k = kiosk();
        let x = enroll(&mut k, "Xavier", "A1", &[0.5]);
        let x = k.apply_manual_action(x.id, &ManualAction::MarkIn, Utc::now()).unwrap();
        let err = k
            .apply_manual_action(
                x.id,
                &ManualAction::MarkOut { destination: String::new() },
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::IncompleteManualTransition("destination")));
        assert_eq!(k.list().unwrap()[0], x);
    }

    #[test]
    fn test_repeated_mark_in_advances_last_seen() {
        let mut k = kiosk();
        let x = enroll(&mut k, "Xavier", "A1", &[0.5]);
        let t1 = Utc::now();
        let t2 = t1 + Duration::seconds(5);
        let first = k.apply_manual_action(x.id, &ManualAction::MarkIn, t1).unwrap();
        let second = k.apply_manual_action(x.id, &ManualAction::MarkIn, t2).unwrap();
        assert_eq!(first.attendance, second.attendance);
        assert_eq!(second.last_seen, t2);
    }

    #[test]
    fn test_persistence_failure_is_fail_closed() {
        let mut k = kiosk();
        let d = [0.5, 0.5];
        let x = enroll(&mut k, "Xavier", "A1", &d);
        let x = k.apply_manual_action(x.id, &ManualAction::MarkIn, Utc::now()).unwrap();
        k.scan(Some(desc(&d)), Utc::now()).unwrap();

        k.store.fail_writes = true;
        let err = k.choose_destination(x.id, Some("Library"), Utc::now()).unwrap_err();
        assert!(matches!(err, Error::Persistence(_)));
        assert_eq!(k.list().unwrap()[0], x);
        assert_eq!(k.pending_prompts(), 1);

        k.store.fail_writes = false;
        let x = k.choose_destination(x.id, Some("Library"), Utc::now()).unwrap();
        assert_eq!(x.status(), Status::Out);
    }

    #[test]
    fn test_enrollment_rejected_before_persistence() {
        let mut k = kiosk();
        k.store.fail_writes = true;
        let err = k
            .enroll(
                NewIdentity { name: "Zara".into(), seat_code: "".into(), ..Default::default() },
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::IncompleteEnrollment("seat code")));
    }

    #[test]
    fn test_update_and_board() {
        let mut k = kiosk();
        let x = enroll(&mut k, "Xavier", "A1", &[0.5]);
        let x = k
            .update(x.id, IdentityPatch { seat_code: Some("B3".into()), ..Default::default() })
            .unwrap();
        assert_eq!(x.seat_code, "B3");
        assert!(matches!(
            k.update(99, IdentityPatch::default()),
            Err(Error::UnknownIdentity(99))
        ));

        let board = k.board().unwrap();
        assert_eq!(board.headcount.total, 1);
        assert_eq!(board.zones[0].key, "B");
    }

    #[test]
    fn test_custom_threshold() {
        let mut k = kiosk().with_threshold(0.2);
        enroll(&mut k, "Xavier", "A1", &[0.0, 0.0]);
        let outcome = k.match_descriptor(&desc(&[0.0, 0.3])).unwrap();
        assert!(outcome.identity().is_none());
    }

    #[test]
    fn test_scan_outcome_json() {
        let mut k = kiosk();
        let d = [0.5, 0.5];
        let x = enroll(&mut k, "Xavier", "A1", &d);
        let json = serde_json::to_value(k.scan(Some(desc(&d)), Utc::now()).unwrap()).unwrap();
        assert_eq!(json["outcome"], "checked_in");
        assert_eq!(json["id"], x.id);
        assert_eq!(json["status"], "IN");

        let json = serde_json::to_value(k.scan(Some(desc(&d)), Utc::now()).unwrap()).unwrap();
        assert_eq!(json["outcome"], "destination_required");
        assert_eq!(json["identity"]["id"], x.id);
        assert_eq!(json["places"][0], "BMS-401");

        let outcome = k.scan(Some(desc(&[9.0, 9.0])), Utc::now()).unwrap();
        let json = serde_json::to_value(outcome).unwrap();
        assert_eq!(json["outcome"], "enrollment_required");
        assert_eq!(json["descriptor"], serde_json::json!([9.0, 9.0]));
    }
}
