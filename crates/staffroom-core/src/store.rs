//! The `IdentityStore` trait.
//!
//! Implemented by storage backends (e.g. `staffroom-store`). The kiosk
//! depends on this abstraction only. Operations addressing an id that does
//! not exist return `Ok(None)` / `Ok(false)`; the kiosk turns that into
//! [`Error::UnknownIdentity`](crate::Error::UnknownIdentity).

use chrono::{DateTime, Utc};

use crate::transition::TransitionCommand;
use crate::types::{Enrollment, Identity, IdentityId, IdentityPatch};

pub trait IdentityStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// All identities, ordered by id.
    fn list(&self) -> Result<Vec<Identity>, Self::Error>;

    fn get(&self, id: IdentityId) -> Result<Option<Identity>, Self::Error>;

    /// Persist a new identity, `Out` with no destination, `last_seen = now`.
    /// The store assigns a fresh id that is never reused.
    fn create(&mut self, enrollment: &Enrollment, now: DateTime<Utc>)
        -> Result<Identity, Self::Error>;

    fn update(
        &mut self,
        id: IdentityId,
        patch: &IdentityPatch,
    ) -> Result<Option<Identity>, Self::Error>;

    /// Write status, location and `last_seen` in one step.
    fn apply(&mut self, command: &TransitionCommand) -> Result<Option<Identity>, Self::Error>;

    fn delete(&mut self, id: IdentityId) -> Result<bool, Self::Error>;
}
