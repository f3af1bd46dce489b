//! Network link ownership and provisioning state machine
//!
//! The manager owns the credentials and the link state; nothing else
//! mutates them. Actual radio control is behind [`LinkDriver`] so the
//! recovery policy can be exercised without hardware.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::error::{AgentError, Result};

/// Station credentials; an empty ssid means "unconfigured"
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub ssid: String,
    pub password: String,
}

/// Provisioning access point identity (fixed, well-known)
#[derive(Debug, Clone)]
pub struct AccessPointProfile {
    pub ssid: String,
    pub password: String,
}

/// Connectivity state, owned exclusively by [`ConnectivityManager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Unconfigured,
    ProvisioningAp,
    ConnectingStation,
    Connected,
}

/// Station association retry policy
#[derive(Debug, Clone)]
pub struct StationPolicy {
    pub max_attempts: u32,
    pub attempt_delay: Duration,
}

/// Radio/link control seam
#[async_trait]
pub trait LinkDriver: Send + Sync {
    /// Associate with the given network in station mode
    async fn connect_station(&self, credentials: &Credentials) -> Result<()>;

    /// Whether the station link currently carries traffic
    async fn link_up(&self) -> bool;

    /// Bring up the local provisioning access point
    async fn start_access_point(&self, ap: &AccessPointProfile) -> Result<()>;

    /// Tear down the provisioning access point
    async fn stop_access_point(&self) -> Result<()>;
}

/// Connectivity state machine
pub struct ConnectivityManager {
    driver: Box<dyn LinkDriver>,
    ap: AccessPointProfile,
    policy: StationPolicy,
    credentials: Option<Credentials>,
    state: LinkState,
}

impl ConnectivityManager {
    pub fn new(driver: Box<dyn LinkDriver>, ap: AccessPointProfile, policy: StationPolicy) -> Self {
        Self {
            driver,
            ap,
            policy,
            credentials: None,
            state: LinkState::Unconfigured,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Whether credentials are present (the sole "configured" signal)
    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn ssid(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.ssid.as_str())
    }

    /// Startup entry: adopt whatever the store held and bring the link up
    ///
    /// With credentials, runs the station path; without, starts the
    /// provisioning access point. Returns the resulting state.
    pub async fn bring_up(&mut self, credentials: Option<Credentials>) -> LinkState {
        self.credentials = credentials.filter(|c| !c.ssid.is_empty());

        if self.credentials.is_some() {
            // A hotspot left over from a previous provisioning run would
            // hold the radio; drop it before associating.
            if let Err(e) = self.driver.stop_access_point().await {
                warn!("Could not stop leftover access point: {}", e);
            }
            self.connect_station().await;
        } else {
            info!("No credentials stored, entering provisioning mode");
            self.enter_provisioning_ap().await;
        }

        self.state
    }

    /// Pre-cycle gate: verify the link, re-running the station path if lost
    pub async fn ensure_connected(&mut self) -> bool {
        if self.state != LinkState::Connected {
            return false;
        }
        if self.driver.link_up().await {
            return true;
        }

        warn!("Station link lost, reconnecting");
        self.connect_station().await;
        self.state == LinkState::Connected
    }

    /// Bounded station association; exhaustion falls back to the AP
    async fn connect_station(&mut self) {
        let Some(credentials) = self.credentials.clone() else {
            self.enter_provisioning_ap().await;
            return;
        };

        self.state = LinkState::ConnectingStation;
        info!("Connecting to network: {}", credentials.ssid);

        for attempt in 1..=self.policy.max_attempts {
            match self.driver.connect_station(&credentials).await {
                Ok(()) => {
                    info!("Connected to {} (attempt {})", credentials.ssid, attempt);
                    self.state = LinkState::Connected;
                    return;
                }
                Err(e) => {
                    warn!(
                        "Association attempt {}/{} failed: {}",
                        attempt, self.policy.max_attempts, e
                    );
                    if attempt < self.policy.max_attempts {
                        tokio::time::sleep(self.policy.attempt_delay).await;
                    }
                }
            }
        }

        warn!(
            "Association budget exhausted after {} attempts, falling back to provisioning",
            self.policy.max_attempts
        );
        self.enter_provisioning_ap().await;
    }

    async fn enter_provisioning_ap(&mut self) {
        self.state = LinkState::ProvisioningAp;
        match self.driver.start_access_point(&self.ap).await {
            Ok(()) => info!("Provisioning access point up: {}", self.ap.ssid),
            Err(e) => error!("Failed to start provisioning access point: {}", e),
        }
    }
}

/// NetworkManager-backed link driver (`nmcli`)
///
/// The gateway OS owns the radio; the agent drives it through nmcli so
/// association, DHCP, and hotspot handling stay NetworkManager's problem.
pub struct NetworkManagerLink {
    /// Wireless interface to pin commands to; `None` lets nmcli pick
    pub interface: Option<String>,
}

impl NetworkManagerLink {
    pub fn new(interface: Option<String>) -> Self {
        Self { interface }
    }

    async fn run_nmcli(args: &[&str]) -> Result<String> {
        let output = Command::new("nmcli")
            .args(args)
            .output()
            .await
            .map_err(|e| AgentError::LinkError(format!("nmcli not runnable: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AgentError::LinkError(format!(
                "nmcli {} failed: {}",
                args.first().unwrap_or(&""),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl LinkDriver for NetworkManagerLink {
    async fn connect_station(&self, credentials: &Credentials) -> Result<()> {
        let mut args = vec![
            "dev",
            "wifi",
            "connect",
            credentials.ssid.as_str(),
            "password",
            credentials.password.as_str(),
        ];
        if let Some(interface) = &self.interface {
            args.push("ifname");
            args.push(interface.as_str());
        }
        Self::run_nmcli(&args).await.map(|_| ())
    }

    async fn link_up(&self) -> bool {
        match Self::run_nmcli(&["networking", "connectivity", "check"]).await {
            Ok(output) => output.trim() != "none",
            Err(e) => {
                warn!("Connectivity check failed: {}", e);
                false
            }
        }
    }

    async fn start_access_point(&self, ap: &AccessPointProfile) -> Result<()> {
        let mut args = vec![
            "dev",
            "wifi",
            "hotspot",
            "ssid",
            ap.ssid.as_str(),
            "password",
            ap.password.as_str(),
        ];
        if let Some(interface) = &self.interface {
            args.push("ifname");
            args.push(interface.as_str());
        }
        Self::run_nmcli(&args).await.map(|_| ())
    }

    async fn stop_access_point(&self) -> Result<()> {
        // NetworkManager names the hotspot connection "Hotspot"
        Self::run_nmcli(&["connection", "down", "Hotspot"])
            .await
            .map(|_| ())
    }
}
