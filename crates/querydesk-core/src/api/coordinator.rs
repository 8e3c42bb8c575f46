//! Single-flight token refresh for requests that come back 401.
//!
//! The first protected request to see a 401 while the coordinator is idle
//! starts a refresh; every 401 that arrives while that refresh is running
//! queues behind it. When the refresh settles, each queued request is either
//! replayed once with the new access token or rejected with the refresh
//! error. A request that was already replayed is never queued again.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::join_all;
use reqwest::StatusCode;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::{endpoints, ApiError, ApiResponse, HttpTransport, OutboundRequest, RequestAugmenter};
use crate::auth::{Credential, RefreshOperation, SessionTeardown};

type Outcome = Result<ApiResponse, ApiError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Refreshing,
}

/// A request suspended behind the in-flight refresh.
struct RefreshWaiter {
    request: OutboundRequest,
    resolver: oneshot::Sender<Outcome>,
}

struct WaiterQueue {
    state: CoordinatorState,
    waiters: Vec<RefreshWaiter>,
}

struct Shared {
    queue: Mutex<WaiterQueue>,
    refresher: RefreshOperation,
    augmenter: RequestAugmenter,
    transport: HttpTransport,
    teardown: SessionTeardown,
}

/// What to do with a response.
enum Verdict {
    Done(Outcome),
    AwaitRefresh,
}

fn judge(request: &OutboundRequest, response: ApiResponse) -> Verdict {
    if response.status() != StatusCode::UNAUTHORIZED {
        return Verdict::Done(response.into_result());
    }
    if endpoints::is_public(request.path()) {
        debug!(path = request.path(), "401 from public endpoint");
        return Verdict::Done(Err(ApiError::AuthExpired));
    }
    if request.is_retried() {
        warn!(path = request.path(), "Replayed request unauthorized again");
        return Verdict::Done(Err(ApiError::AuthExpiredRetryExhausted));
    }
    Verdict::AwaitRefresh
}

/// Cloning shares the same state and queue.
#[derive(Clone)]
pub struct RefreshCoordinator {
    shared: Arc<Shared>,
}

impl RefreshCoordinator {
    pub fn new(
        refresher: RefreshOperation,
        augmenter: RequestAugmenter,
        transport: HttpTransport,
        teardown: SessionTeardown,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(WaiterQueue {
                    state: CoordinatorState::Idle,
                    waiters: Vec::new(),
                }),
                refresher,
                augmenter,
                transport,
                teardown,
            }),
        }
    }

    pub fn state(&self) -> CoordinatorState {
        self.shared.lock().state
    }

    /// Resolve the response to `request`, going through a refresh and one
    /// replay if the server reports the access token as expired.
    pub async fn settle(&self, request: OutboundRequest, response: ApiResponse) -> Outcome {
        match judge(&request, response) {
            Verdict::Done(outcome) => outcome,
            Verdict::AwaitRefresh => {
                let receiver = self.enqueue(request);
                receiver.await.unwrap_or_else(|_| {
                    Err(ApiError::RefreshTransportError(
                        "Token refresh ended without a result".to_string(),
                    ))
                })
            }
        }
    }

    /// Queue the request and start a refresh if none is running. The state
    /// check, the push and the state flip share one critical section.
    fn enqueue(&self, request: OutboundRequest) -> oneshot::Receiver<Outcome> {
        let (resolver, receiver) = oneshot::channel();
        let path = request.path().to_string();

        let start_refresh = {
            let mut queue = self.shared.lock();
            queue.waiters.push(RefreshWaiter { request, resolver });
            let idle = queue.state == CoordinatorState::Idle;
            queue.state = CoordinatorState::Refreshing;
            debug!(path = %path, waiters = queue.waiters.len(), "Queued behind token refresh");
            idle
        };

        if start_refresh {
            // Spawned so that no caller going away can cancel the refresh
            let shared = Arc::clone(&self.shared);
            tokio::spawn(shared.run_refresh());
        }
        receiver
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, WaiterQueue> {
        // Every critical section leaves the queue consistent, so recover from poisoning
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn run_refresh(self: Arc<Self>) {
        info!("Access token expired, refreshing");
        let outcome = self.refresher.run().await;

        let waiters = {
            let mut queue = self.lock();
            queue.state = CoordinatorState::Idle;
            std::mem::take(&mut queue.waiters)
        };

        match outcome {
            Ok(credential) => {
                info!(waiters = waiters.len(), "Replaying queued requests");
                let replays = waiters.into_iter().map(|waiter| {
                    let shared = Arc::clone(&self);
                    let credential = credential.clone();
                    async move {
                        if waiter.resolver.is_closed() {
                            return;
                        }
                        let outcome = shared.replay(waiter.request, &credential).await;
                        let _ = waiter.resolver.send(outcome);
                    }
                });
                join_all(replays).await;
            }
            Err(err) => {
                warn!(error = %err, waiters = waiters.len(), "Token refresh failed");
                if err.requires_login() {
                    if let Err(e) = self.teardown.logout() {
                        error!(error = %e, "Failed to clear session after rejected refresh");
                    }
                }
                for waiter in waiters {
                    let _ = waiter.resolver.send(Err(err.clone()));
                }
            }
        }
    }

    async fn replay(&self, request: OutboundRequest, credential: &Credential) -> Outcome {
        let request = request.into_replay(&credential.access_token)?;
        let request = self.augmenter.augment(request)?;
        let response = self.transport.send(&request).await?;
        match judge(&request, response) {
            Verdict::Done(outcome) => outcome,
            // A replayed request is never queued a second time
            Verdict::AwaitRefresh => Err(ApiError::AuthExpiredRetryExhausted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unauthorized() -> ApiResponse {
        ApiResponse::new(StatusCode::UNAUTHORIZED, "")
    }

    #[test]
    fn test_judge_passes_through_non_auth_responses() {
        let request = OutboundRequest::get("/queries");
        assert!(matches!(
            judge(&request, ApiResponse::new(StatusCode::OK, "[]")),
            Verdict::Done(Ok(_))
        ));
        assert!(matches!(
            judge(&request, ApiResponse::new(StatusCode::NOT_FOUND, "")),
            Verdict::Done(Err(ApiError::NotFound(_)))
        ));
    }

    #[test]
    fn test_judge_public_401_is_passed_through() {
        let request = OutboundRequest::post("/public/login");
        assert!(matches!(
            judge(&request, unauthorized()),
            Verdict::Done(Err(ApiError::AuthExpired))
        ));
    }

    #[test]
    fn test_judge_replayed_401_is_terminal() {
        let request = OutboundRequest::get("/queries").into_replay("A2").unwrap();
        assert!(matches!(
            judge(&request, unauthorized()),
            Verdict::Done(Err(ApiError::AuthExpiredRetryExhausted))
        ));
    }

    #[test]
    fn test_judge_fresh_protected_401_awaits_refresh() {
        let request = OutboundRequest::get("/queries");
        assert!(matches!(judge(&request, unauthorized()), Verdict::AwaitRefresh));
    }
}
