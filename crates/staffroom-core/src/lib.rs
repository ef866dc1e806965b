//! staffroom-core: identity resolution and attendance transitions.
//!
//! Matches captured face descriptors against enrolled identities and
//! decides how each identity's attendance changes in response to scans
//! and manual actions. Persistence is abstracted behind [`IdentityStore`].

pub mod board;
pub mod error;
pub mod kiosk;
pub mod matcher;
pub mod places;
pub mod store;
pub mod transition;
pub mod types;

pub use board::{Board, Headcount, Seat, Zone};
pub use error::{Error, Result};
pub use kiosk::{Kiosk, ScanOutcome};
pub use matcher::{EuclideanMatcher, MatchOutcome, Matcher, MATCH_THRESHOLD};
pub use places::Places;
pub use store::IdentityStore;
pub use transition::{
    AttendanceEngine, EnrollmentRequest, ManualAction, ScanDecision, TransitionCommand,
};
pub use types::{
    Attendance, Descriptor, DescriptorError, Enrollment, Identity, IdentityId, IdentityPatch,
    NewIdentity, Status,
};
