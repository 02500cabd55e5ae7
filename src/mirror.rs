// ===============================
// src/mirror.rs (shared state: ledger + destination session)
// ===============================
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::domain::{Event, Position};
use crate::gateway::{DestinationGateway, GatewayError, SourceGateway};
use crate::ledger::Ledger;
use crate::metrics::{JOURNAL_DROPPED, RECONCILIATIONS, SESSION_RELOGINS};
use crate::reconcile::{self, ReconcileReport};

#[derive(Debug, Error)]
pub enum MirrorError {
    /// Ping failed and re-login failed while streaming.
    #[error("destination session lost: {0}")]
    SessionLost(#[source] GatewayError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Everything behind the one lock.
pub struct MirrorState {
    pub ledger: Ledger,
    pub dest: Box<dyn DestinationGateway>,
}

/// Cloneable handle shared by the stream and session supervisors.
#[derive(Clone)]
pub struct Mirror {
    pub(crate) source: Arc<dyn SourceGateway>,
    state: Arc<Mutex<MirrorState>>,
    journal: Option<mpsc::Sender<Event>>,
    pub(crate) lot_size: u64,
}

impl Mirror {
    pub fn new(source: Arc<dyn SourceGateway>, dest: Box<dyn DestinationGateway>, lot_size: u64) -> Self {
        Self {
            source,
            state: Arc::new(Mutex::new(MirrorState { ledger: Ledger::new(), dest })),
            journal: None,
            lot_size: lot_size.max(1),
        }
    }

    pub fn with_journal(mut self, tx: mpsc::Sender<Event>) -> Self {
        self.journal = Some(tx);
        self
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, MirrorState> {
        self.state.lock().await
    }

    pub(crate) fn record(&self, ev: Event) {
        let Some(tx) = &self.journal else { return };
        match tx.try_send(ev) {
            Ok(()) => {}
            Err(TrySendError::Full(ev)) => {
                JOURNAL_DROPPED.inc();
                warn!(event = ?ev, "journal channel full, event dropped");
            }
            Err(TrySendError::Closed(_)) => debug!("journal closed, event not recorded"),
        }
    }

    pub fn source(&self) -> &Arc<dyn SourceGateway> {
        &self.source
    }

    pub async fn login(&self) -> Result<(), GatewayError> {
        self.lock().await.dest.login().await
    }

    /// Background keep-alive. `false` = session could not be revived.
    pub async fn keep_alive(&self) -> bool {
        let mut st = self.lock().await;
        match revive_session(st.dest.as_mut()).await {
            Ok(()) => true,
            Err(e) => {
                error!(severity = "critical", error = %e, "background re-login to destination failed");
                false
            }
        }
    }

    pub async fn reconcile(&self) -> Result<ReconcileReport, GatewayError> {
        let mut st = self.lock().await;
        self.reconcile_locked(&mut st).await
    }

    /// Caller already holds the lock.
    pub(crate) async fn reconcile_locked(&self, st: &mut MirrorState) -> Result<ReconcileReport, GatewayError> {
        RECONCILIATIONS.inc();
        let report = reconcile::run(self.source.as_ref(), st, |ev| self.record(ev)).await?;
        if report.orphans > 0 {
            warn!(orphans = report.orphans, "reconciliation found orphan trades on destination");
            st.ledger.log_listing();
        } else {
            info!(confirmed = report.confirmed, "reconciliation clean");
        }
        Ok(report)
    }

    #[cfg(test)]
    pub async fn open_trades(&self) -> Vec<(String, Position)> {
        self.lock().await.ledger.snapshot()
    }

    pub async fn list_open_trades(&self) {
        self.lock().await.ledger.log_listing();
    }
}

/// Ping; on failure try one re-login.
pub(crate) async fn revive_session(dest: &mut dyn DestinationGateway) -> Result<(), GatewayError> {
    if let Err(e) = dest.ping().await {
        info!(error = %e, "destination ping failed, re-connecting");
        SESSION_RELOGINS.inc();
        dest.login().await?;
    }
    Ok(())
}
