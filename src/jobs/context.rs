use crate::freshness::FreshnessRegistry;
use crate::jobs::HandlerError;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context provided to handlers during execution.
///
/// Contains a cancellation token for the current attempt and the shared
/// collaborators a handler may consult. Handlers never get access to the queue.
#[derive(Clone)]
pub struct HandlerContext {
    /// Cancelled when the attempt hits its deadline or the engine shuts down.
    pub cancellation_token: CancellationToken,

    /// Freshness registry gating expensive provider calls.
    pub freshness: Option<Arc<FreshnessRegistry>>,
}

impl HandlerContext {
    pub fn new(cancellation_token: CancellationToken) -> Self {
        Self {
            cancellation_token,
            freshness: None,
        }
    }

    pub fn with_freshness(mut self, freshness: Arc<FreshnessRegistry>) -> Self {
        self.freshness = Some(freshness);
        self
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    pub fn freshness(&self) -> Result<&FreshnessRegistry, HandlerError> {
        self.freshness
            .as_deref()
            .ok_or_else(|| HandlerError::Other(anyhow::anyhow!("freshness registry not configured")))
    }

    /// Context for a single attempt, cancellable independently of its parent.
    pub(crate) fn child(&self) -> Self {
        Self {
            cancellation_token: self.cancellation_token.child_token(),
            freshness: self.freshness.clone(),
        }
    }
}
