use std::sync::Arc;

use crate::rag::RagService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RagService>,
    /// Secreto del endpoint de administración; `None` lo deja cerrado.
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(service: RagService) -> Self {
        let admin_token = service.config().admin_token.as_deref().map(Arc::from);
        Self {
            service: Arc::new(service),
            admin_token,
        }
    }
}
