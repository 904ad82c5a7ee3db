use std::sync::Arc;

use amv_core::coordinator::UpdateCoordinator;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<UpdateCoordinator>,
}
