use crate::coordinator::CoordinatorHandle;
use tokio_util::sync::CancellationToken;

/// Shared state handed to every HTTP handler. Holds no game state of its
/// own; everything goes through the coordinator.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: CoordinatorHandle,
    /// Cancelled on process shutdown; connection tasks watch a child token
    pub shutdown: CancellationToken,
    /// Capacity of each connection's outbound queue
    pub outbound_queue: usize,
}

impl AppState {
    pub fn new(
        coordinator: CoordinatorHandle,
        shutdown: CancellationToken,
        outbound_queue: usize,
    ) -> Self {
        Self {
            coordinator,
            shutdown,
            outbound_queue,
        }
    }
}
