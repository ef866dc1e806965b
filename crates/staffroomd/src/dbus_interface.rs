use serde::Serialize;
use zbus::interface;

use staffroom_core::{Descriptor, IdentityPatch, ManualAction, NewIdentity};

use crate::engine::{EngineError, EngineHandle};

pub const BUS_NAME: &str = "org.staffroom.Kiosk1";
pub const OBJECT_PATH: &str = "/org/staffroom/Kiosk1";

/// D-Bus interface for the staffroom kiosk daemon.
///
/// Bus name: org.staffroom.Kiosk1
/// Object path: /org/staffroom/Kiosk1
///
/// Structured results are returned as JSON strings.
pub struct KioskService {
    engine: EngineHandle,
    db_path: String,
}

impl KioskService {
    pub fn new(engine: EngineHandle, db_path: String) -> Self {
        Self { engine, db_path }
    }
}

#[interface(name = "org.staffroom.Kiosk1")]
impl KioskService {
    /// Resolve a captured descriptor and apply the resulting transition.
    /// An empty array means the extractor found no face.
    async fn scan(&self, descriptor: Vec<f64>) -> zbus::fdo::Result<String> {
        tracing::info!(dimension = descriptor.len(), "scan requested");
        let probe = probe(descriptor).map_err(to_fdo)?;
        to_json(&self.engine.scan(probe).await.map_err(to_fdo)?)
    }

    /// Resolve a descriptor without changing any state.
    async fn match_descriptor(&self, descriptor: Vec<f64>) -> zbus::fdo::Result<String> {
        let descriptor = Descriptor::new(descriptor)
            .map_err(|e| to_fdo(staffroom_core::Error::from(e).into()))?;
        to_json(&self.engine.match_descriptor(descriptor).await.map_err(to_fdo)?)
    }

    /// Complete an open destination prompt. An empty destination selects
    /// the default place.
    async fn choose_destination(&self, id: i64, destination: &str) -> zbus::fdo::Result<String> {
        tracing::info!(id, destination, "choose_destination requested");
        let destination = Some(destination.to_string()).filter(|d| !d.trim().is_empty());
        to_json(
            &self
                .engine
                .choose_destination(id, destination)
                .await
                .map_err(to_fdo)?,
        )
    }

    async fn cancel_prompt(&self, id: i64) -> zbus::fdo::Result<bool> {
        tracing::info!(id, "cancel_prompt requested");
        self.engine.cancel_prompt(id).await.map_err(to_fdo)
    }

    /// Enroll a new identity with the descriptor captured by an unmatched scan.
    async fn enroll(
        &self,
        name: &str,
        seat_code: &str,
        department: &str,
        descriptor: Vec<f64>,
    ) -> zbus::fdo::Result<String> {
        tracing::info!(name, seat_code, "enroll requested");
        let new = NewIdentity {
            name: name.to_string(),
            seat_code: seat_code.to_string(),
            department: Some(department.to_string()),
            descriptor: probe(descriptor).map_err(to_fdo)?,
        };
        to_json(&self.engine.enroll(new).await.map_err(to_fdo)?)
    }

    async fn mark_in(&self, id: i64) -> zbus::fdo::Result<String> {
        self.manual(id, ManualAction::MarkIn).await
    }

    async fn mark_out(&self, id: i64, destination: &str) -> zbus::fdo::Result<String> {
        self.manual(
            id,
            ManualAction::MarkOut {
                destination: destination.to_string(),
            },
        )
        .await
    }

    async fn mark_in_class(&self, id: i64, classroom: &str) -> zbus::fdo::Result<String> {
        self.manual(
            id,
            ManualAction::MarkInClass {
                classroom: classroom.to_string(),
            },
        )
        .await
    }

    /// Edit name, seat code or department. `patch` is a JSON object such as
    /// `{"seatCode": "B4"}`.
    async fn update(&self, id: i64, patch: &str) -> zbus::fdo::Result<String> {
        tracing::info!(id, "update requested");
        let patch: IdentityPatch = serde_json::from_str(patch)
            .map_err(|e| zbus::fdo::Error::InvalidArgs(format!("invalid patch: {e}")))?;
        to_json(&self.engine.update(id, patch).await.map_err(to_fdo)?)
    }

    async fn remove(&self, id: i64) -> zbus::fdo::Result<bool> {
        tracing::info!(id, "remove requested");
        self.engine.remove(id).await.map_err(to_fdo)?;
        Ok(true)
    }

    async fn list(&self) -> zbus::fdo::Result<String> {
        to_json(&self.engine.list().await.map_err(to_fdo)?)
    }

    async fn board(&self) -> zbus::fdo::Result<String> {
        to_json(&self.engine.board().await.map_err(to_fdo)?)
    }

    async fn places(&self) -> zbus::fdo::Result<Vec<String>> {
        Ok(self.engine.places().destinations().to_vec())
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let status = self.engine.status().await.map_err(to_fdo)?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "database": self.db_path,
            "room": self.engine.places().room(),
            "enrolled": status.enrolled,
            "pendingPrompts": status.pending_prompts,
            "matchThreshold": status.match_threshold,
        })
        .to_string())
    }
}

impl KioskService {
    async fn manual(&self, id: i64, action: ManualAction) -> zbus::fdo::Result<String> {
        tracing::info!(id, ?action, "manual transition requested");
        to_json(&self.engine.manual(id, action).await.map_err(to_fdo)?)
    }
}

/// Empty input is the extractor's "no face"; anything else must be a valid
/// descriptor.
fn probe(values: Vec<f64>) -> Result<Option<Descriptor>, EngineError> {
    if values.is_empty() {
        return Ok(None);
    }
    Descriptor::new(values)
        .map(Some)
        .map_err(|e| staffroom_core::Error::from(e).into())
}

fn to_json<T: Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

fn to_fdo(err: EngineError) -> zbus::fdo::Error {
    match err {
        EngineError::Kiosk(e) if e.is_invalid_input() => {
            zbus::fdo::Error::InvalidArgs(e.to_string())
        }
        EngineError::Kiosk(e @ staffroom_core::Error::UnknownIdentity(_)) => {
            zbus::fdo::Error::UnknownObject(e.to_string())
        }
        EngineError::Kiosk(e) => zbus::fdo::Error::Failed(e.to_string()),
        other => {
            tracing::error!(error = %other, "engine failure");
            zbus::fdo::Error::Failed(other.to_string())
        }
    }
}
