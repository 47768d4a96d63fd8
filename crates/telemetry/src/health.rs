//! Backend health tracking.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every backend answered its last check
    Healthy,
    /// Some backends are down
    Degraded,
    /// Nothing is reachable
    Unhealthy,
}

#[derive(Debug, Clone, Default)]
enum Probe {
    /// No check has run yet
    #[default]
    Pending,
    Up,
    Down(String),
}

/// Last known state of one backend, updated by the health monitor.
#[derive(Debug)]
pub struct ComponentHealth {
    name: &'static str,
    probe: RwLock<Probe>,
}

impl ComponentHealth {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            probe: RwLock::new(Probe::Pending),
        }
    }

    pub fn set_healthy(&self) {
        *self.probe.write() = Probe::Up;
    }

    pub fn set_unhealthy(&self, reason: impl Into<String>) {
        *self.probe.write() = Probe::Down(reason.into());
    }

    pub fn is_healthy(&self) -> bool {
        matches!(*self.probe.read(), Probe::Up)
    }

    /// Why the component is not healthy, if known.
    pub fn message(&self) -> Option<String> {
        match &*self.probe.read() {
            Probe::Pending => Some("not checked yet".to_string()),
            Probe::Up => None,
            Probe::Down(reason) => Some(reason.clone()),
        }
    }

    fn report(&self) -> ComponentHealthReport {
        ComponentHealthReport {
            name: self.name.to_string(),
            healthy: self.is_healthy(),
            message: self.message(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealthReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealthReport {
    pub name: String,
    pub healthy: bool,
    pub message: Option<String>,
}

/// Health of the queue and store backends.
///
/// Constructed once at start-up and shared with the API and worker.
#[derive(Debug)]
pub struct HealthRegistry {
    pub queue: ComponentHealth,
    pub store: ComponentHealth,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            queue: ComponentHealth::new("queue"),
            store: ComponentHealth::new("store"),
        }
    }

    pub fn report(&self) -> HealthReport {
        let components = vec![self.queue.report(), self.store.report()];
        let up = components.iter().filter(|c| c.healthy).count();

        let status = match up {
            0 => HealthStatus::Unhealthy,
            n if n == components.len() => HealthStatus::Healthy,
            _ => HealthStatus::Degraded,
        };

        HealthReport { status, components }
    }

    /// Ingestion only needs the queue.
    pub fn is_ready(&self) -> bool {
        self.queue.is_healthy()
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}
