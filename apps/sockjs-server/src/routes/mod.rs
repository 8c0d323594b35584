pub mod greeting;
pub mod iframe;
pub mod info;

use std::sync::Arc;

use axum::middleware::from_fn;
use axum::routing::get;
use axum::Router;

use crate::config::ServiceOptions;
use crate::handler::SocketHandler;
use crate::session::SessionRegistry;
use crate::transport::{self, http, Transport};
use crate::ServiceState;
use iframe::IframePage;

/// One SockJS endpoint: an application handler mounted under a URL prefix
/// with its own options and session table.
#[derive(Clone)]
pub struct SockJsService {
    prefix: String,
    state: ServiceState,
}

impl SockJsService {
    pub fn new(
        prefix: impl Into<String>,
        options: ServiceOptions,
        handler: Arc<dyn SocketHandler>,
    ) -> Self {
        let prefix = prefix.into().trim_end_matches('/').to_string();
        let registry = Arc::new(SessionRegistry::new(handler, options.disconnect_timeout));
        let iframe = Arc::new(IframePage::new(&options.library_url));
        Self {
            prefix,
            state: ServiceState {
                options: Arc::new(options),
                registry,
                iframe,
            },
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.state.registry
    }

    /// Start evicting sessions left without a receiver.
    pub fn start_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let interval = (self.state.options.disconnect_timeout / 2).max(std::time::Duration::from_millis(100));
        self.state.registry.spawn_sweeper(interval)
    }

    /// Routes of this service, relative to its prefix.
    fn routes(&self) -> Router {
        let options = &self.state.options;

        let mut sessions = transport::session_router(options);
        let any_enabled = Transport::ALL.into_iter().any(|t| options.is_enabled(t));
        if options.cookie_needed && any_enabled {
            sessions = sessions.route_layer(from_fn(http::jsessionid));
        }

        Router::new()
            .route("/", get(greeting::greeting))
            .merge(info::router())
            .merge(iframe::router())
            .merge(sessions)
            .merge(transport::raw_router(options))
            .layer(from_fn(http::cors))
            .with_state(self.state.clone())
    }
}

/// Mount every service under its prefix.
pub fn router(services: &[SockJsService]) -> Router {
    services.iter().fold(Router::new(), |app, service| {
        if service.prefix.is_empty() {
            return app.merge(service.routes());
        }
        // Nesting maps the inner "/" to the bare prefix only.
        app.route(
            &format!("{}/", service.prefix),
            get(greeting::greeting).layer(from_fn(http::cors)),
        )
        .nest(&service.prefix, service.routes())
    })
}
