use crate::{config::Config, store::ChatStore, websocket::ConnectionRegistry};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ChatStore>,
    pub registry: ConnectionRegistry,
    pub config: Arc<Config>,
}
