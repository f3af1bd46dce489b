//! Shared agent context
//!
//! The ambient mutable state of the agent (credentials store, link
//! ownership, cycle guard, restart signal) collected into one owned value
//! threaded through the scheduler and the API handlers.

use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::AgentConfig;
use crate::connectivity::{ConnectivityManager, Credentials};
use crate::error::{AgentError, Result};
use crate::scheduler::CycleService;
use crate::store::CredentialStore;

pub struct AgentContext {
    pub config: AgentConfig,
    pub store: CredentialStore,
    pub connectivity: Arc<RwLock<ConnectivityManager>>,
    pub cycles: Arc<CycleService>,
    restart: CancellationToken,
}

impl AgentContext {
    pub fn new(
        config: AgentConfig,
        store: CredentialStore,
        connectivity: Arc<RwLock<ConnectivityManager>>,
        cycles: Arc<CycleService>,
        restart: CancellationToken,
    ) -> Self {
        Self {
            config,
            store,
            connectivity,
            cycles,
            restart,
        }
    }

    /// Accept new station credentials from the provisioning surface
    ///
    /// Persists them and requests the process restart; the new credentials
    /// take effect when the supervisor brings the agent back up.
    pub fn submit_credentials(&self, credentials: &Credentials) -> Result<()> {
        if credentials.ssid.is_empty() {
            return Err(AgentError::config("ssid must not be empty"));
        }
        self.store.save(credentials)?;
        info!(
            "Credentials for {} accepted, restarting to apply",
            credentials.ssid
        );
        self.restart.cancel();
        Ok(())
    }

    /// Whether the provisioning restart has been requested
    pub fn restart_requested(&self) -> bool {
        self.restart.is_cancelled()
    }
}
