use std::sync::Arc;

use crate::config::Config;
use crate::db::Repositories;
use crate::gate::Gate;
use crate::service::{DirectoryService, IdentityService};

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: Config,
    pub repos: Repositories,
    pub gate: Gate,
    pub identity: IdentityService,
    pub directory: DirectoryService,
}
