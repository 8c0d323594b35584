pub mod config;
pub mod error;
pub mod gc;
pub mod handler;
pub mod routes;
pub mod session;
pub mod transport;

use std::sync::Arc;

use config::ServiceOptions;
use routes::iframe::IframePage;
use session::SessionRegistry;

/// State shared by every route handler of one SockJS service.
#[derive(Clone)]
pub struct ServiceState {
    pub options: Arc<ServiceOptions>,
    pub registry: Arc<SessionRegistry>,
    pub iframe: Arc<IframePage>,
}
