use std::sync::Arc;
use std::time::Duration;

use sitesmith_agent::{GenerateSiteTool, SiteService};
use sitesmith_core::config::AppConfig;
use sitesmith_store::{ManageSiteFilesTool, SiteStore, ToolRegistry};

use crate::dispatch::Dispatcher;
use crate::registry::SessionRegistry;

/// Shared application state for axum handlers.
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<SiteStore>,
    pub registry: Arc<SessionRegistry>,
    pub dispatcher: Dispatcher,
}

impl AppState {
    pub fn new(service: Arc<SiteService>) -> Arc<Self> {
        let config = service.config().clone();
        let store = service.store().clone();
        let registry = SessionRegistry::new(Duration::from_secs(config.gateway.keepalive_secs.max(1)));
        let dispatcher = Dispatcher::new(server_tools(service), registry.clone());
        Arc::new(Self {
            config,
            store,
            registry,
            dispatcher,
        })
    }
}

/// The catalog exposed to clients: `generate_site` and `manage_site_files`.
pub fn server_tools(service: Arc<SiteService>) -> ToolRegistry {
    let config = service.config();
    let files = ManageSiteFilesTool::new(
        service.store().clone(),
        config.gateway.clone(),
        config.store.max_old_string_len,
    );
    let mut tools = ToolRegistry::new();
    tools.register(GenerateSiteTool::new(service.clone()));
    tools.register(files);
    tools
}
