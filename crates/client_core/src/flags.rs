use std::sync::Arc;

use flag_integration::{FlagClient, FlagEvent};
use shared::domain::{Affordance, FIRST_BUTTON_FLAG, LAST_BUTTON_FLAG};
use tokio::{
    sync::{broadcast, broadcast::error::RecvError, RwLock},
    task::JoinHandle,
};
use tracing::{info, warn};

/// Whether the jump-to-first and jump-to-last controls are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AffordanceVisibility {
    pub first_page: bool,
    pub last_page: bool,
}

impl AffordanceVisibility {
    pub fn is_visible(&self, affordance: Affordance) -> bool {
        match affordance {
            Affordance::FirstPage => self.first_page,
            Affordance::LastPage => self.last_page,
        }
    }
}

/// Maps the `first-button` / `last-button` flags onto affordance visibility.
/// Every readiness or change notification re-reads both flags.
pub struct FlagReconciler {
    flags: Arc<dyn FlagClient>,
    visibility: RwLock<AffordanceVisibility>,
    events: broadcast::Sender<AffordanceVisibility>,
}

impl FlagReconciler {
    pub fn new(flags: Arc<dyn FlagClient>) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            flags,
            visibility: RwLock::new(AffordanceVisibility::default()),
            events,
        })
    }

    pub async fn visibility(&self) -> AffordanceVisibility {
        *self.visibility.read().await
    }

    /// Receives the new visibility whenever it actually changes.
    pub fn subscribe(&self) -> broadcast::Receiver<AffordanceVisibility> {
        self.events.subscribe()
    }

    pub async fn on_ready(&self) -> AffordanceVisibility {
        info!("flags: client ready; evaluating affordances");
        self.reconcile().await
    }

    pub async fn on_change(&self, changed: &[String]) -> AffordanceVisibility {
        info!(?changed, "flags: flags changed; re-evaluating affordances");
        self.reconcile().await
    }

    async fn reconcile(&self) -> AffordanceVisibility {
        let next = AffordanceVisibility {
            first_page: self.flags.variation(FIRST_BUTTON_FLAG, false),
            last_page: self.flags.variation(LAST_BUTTON_FLAG, false),
        };
        let changed = {
            let mut current = self.visibility.write().await;
            let changed = *current != next;
            *current = next;
            changed
        };
        info!(
            first_page = next.first_page,
            last_page = next.last_page,
            "flags: applied affordance visibility"
        );
        if changed {
            let _ = self.events.send(next);
        }
        next
    }

    /// Follows the flag client's event stream on a background task until the
    /// stream closes.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.flags.subscribe_events();
        let reconciler = Arc::clone(self);
        tokio::spawn(async move {
            if reconciler.flags.is_ready() {
                reconciler.on_ready().await;
            }
            loop {
                match events.recv().await {
                    Ok(FlagEvent::Ready) => {
                        reconciler.on_ready().await;
                    }
                    Ok(FlagEvent::Changed { keys }) => {
                        reconciler.on_change(&keys).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "flags: flag events lagged; re-evaluating");
                        reconciler.reconcile().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
#[path = "tests/flags_tests.rs"]
mod tests;
