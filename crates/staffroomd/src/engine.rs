use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use staffroom_core::{
    Board, Descriptor, Identity, IdentityId, IdentityPatch, Kiosk, ManualAction, MatchOutcome,
    NewIdentity, Places, ScanOutcome,
};
use staffroom_store::SqliteStore;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Kiosk(#[from] staffroom_core::Error),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Snapshot of engine state for the `Status` call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub enrolled: usize,
    pub pending_prompts: usize,
    pub match_threshold: f64,
}

type Reply<T> = oneshot::Sender<Result<T, staffroom_core::Error>>;

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Scan {
        descriptor: Option<Descriptor>,
        reply: Reply<ScanOutcome>,
    },
    Match {
        descriptor: Descriptor,
        reply: Reply<MatchOutcome>,
    },
    ChooseDestination {
        id: IdentityId,
        destination: Option<String>,
        reply: Reply<Identity>,
    },
    CancelPrompt {
        id: IdentityId,
        reply: Reply<bool>,
    },
    Enroll {
        new: NewIdentity,
        reply: Reply<Identity>,
    },
    Manual {
        id: IdentityId,
        action: ManualAction,
        reply: Reply<Identity>,
    },
    Update {
        id: IdentityId,
        patch: IdentityPatch,
        reply: Reply<Identity>,
    },
    Remove {
        id: IdentityId,
        reply: Reply<()>,
    },
    List {
        reply: Reply<Vec<Identity>>,
    },
    Board {
        reply: Reply<Board>,
    },
    Status {
        reply: Reply<EngineStatus>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    places: Places,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    pub fn places(&self) -> &Places {
        &self.places
    }

    /// Resolve a capture and apply whatever transition it leads to.
    /// `None` means the extractor found no face.
    pub async fn scan(&self, descriptor: Option<Descriptor>) -> Result<ScanOutcome, EngineError> {
        self.request(|reply| EngineRequest::Scan { descriptor, reply })
            .await
    }

    pub async fn match_descriptor(
        &self,
        descriptor: Descriptor,
    ) -> Result<MatchOutcome, EngineError> {
        self.request(|reply| EngineRequest::Match { descriptor, reply })
            .await
    }

    pub async fn choose_destination(
        &self,
        id: IdentityId,
        destination: Option<String>,
    ) -> Result<Identity, EngineError> {
        self.request(|reply| EngineRequest::ChooseDestination {
            id,
            destination,
            reply,
        })
        .await
    }

    pub async fn cancel_prompt(&self, id: IdentityId) -> Result<bool, EngineError> {
        self.request(|reply| EngineRequest::CancelPrompt { id, reply })
            .await
    }

    pub async fn enroll(&self, new: NewIdentity) -> Result<Identity, EngineError> {
        self.request(|reply| EngineRequest::Enroll { new, reply })
            .await
    }

    pub async fn manual(
        &self,
        id: IdentityId,
        action: ManualAction,
    ) -> Result<Identity, EngineError> {
        self.request(|reply| EngineRequest::Manual { id, action, reply })
            .await
    }

    pub async fn update(
        &self,
        id: IdentityId,
        patch: IdentityPatch,
    ) -> Result<Identity, EngineError> {
        self.request(|reply| EngineRequest::Update { id, patch, reply })
            .await
    }

    pub async fn remove(&self, id: IdentityId) -> Result<(), EngineError> {
        self.request(|reply| EngineRequest::Remove { id, reply })
            .await
    }

    pub async fn list(&self) -> Result<Vec<Identity>, EngineError> {
        self.request(|reply| EngineRequest::List { reply }).await
    }

    pub async fn board(&self) -> Result<Board, EngineError> {
        self.request(|reply| EngineRequest::Board { reply }).await
    }

    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        self.request(|reply| EngineRequest::Status { reply }).await
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread is the only owner of the kiosk (and therefore of the
/// database connection and the open destination prompts), so requests are
/// applied strictly one at a time. Dropping every handle closes the
/// channel and the thread exits, discarding open prompts.
pub fn spawn_engine(kiosk: Kiosk<SqliteStore>) -> Result<EngineHandle, EngineError> {
    let places = kiosk.places().clone();
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    std::thread::Builder::new()
        .name("staffroom-engine".into())
        .spawn(move || {
            let mut kiosk = kiosk;
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                handle(&mut kiosk, req);
            }
            tracing::info!(
                abandoned_prompts = kiosk.pending_prompts(),
                "engine thread exiting"
            );
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx, places })
}

/// Serve one request. A dropped reply receiver means the caller gave up;
/// the result is discarded.
fn handle(kiosk: &mut Kiosk<SqliteStore>, req: EngineRequest) {
    let now = Utc::now();
    match req {
        EngineRequest::Scan { descriptor, reply } => {
            let _ = reply.send(kiosk.scan(descriptor, now));
        }
        EngineRequest::Match { descriptor, reply } => {
            let _ = reply.send(kiosk.match_descriptor(&descriptor));
        }
        EngineRequest::ChooseDestination {
            id,
            destination,
            reply,
        } => {
            let _ = reply.send(kiosk.choose_destination(id, destination.as_deref(), now));
        }
        EngineRequest::CancelPrompt { id, reply } => {
            let _ = reply.send(Ok(kiosk.cancel_prompt(id)));
        }
        EngineRequest::Enroll { new, reply } => {
            let _ = reply.send(kiosk.enroll(new, now));
        }
        EngineRequest::Manual { id, action, reply } => {
            let _ = reply.send(kiosk.apply_manual_action(id, &action, now));
        }
        EngineRequest::Update { id, patch, reply } => {
            let _ = reply.send(kiosk.update(id, patch));
        }
        EngineRequest::Remove { id, reply } => {
            let _ = reply.send(kiosk.remove(id));
        }
        EngineRequest::List { reply } => {
            let _ = reply.send(kiosk.list());
        }
        EngineRequest::Board { reply } => {
            let _ = reply.send(kiosk.board());
        }
        EngineRequest::Status { reply } => {
            let status = kiosk.list().map(|all| EngineStatus {
                enrolled: all.iter().filter(|i| i.descriptor.is_some()).count(),
                pending_prompts: kiosk.pending_prompts(),
                match_threshold: kiosk.threshold(),
            });
            let _ = reply.send(status);
        }
    }
}
