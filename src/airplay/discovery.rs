//! mDNS/DNS-SD based receiver discovery.
//!
//! Browses the configured service type (`_airplay._tcp.local.` by default)
//! and collects every instance resolved within the browse timeout. The
//! service instance name is the receiver name.

use async_trait::async_trait;
use mdns_sd::{ResolvedService, ServiceDaemon, ServiceEvent};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use super::{HttpSession, Receiver, ReceiverDirectory};
use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, TransportError};

/// Receiver directory backed by a shared mDNS daemon
pub struct MdnsDirectory {
    daemon: Arc<ServiceDaemon>,
    service_type: String,
    browse_timeout: Duration,
    http: reqwest::Client,
}

impl MdnsDirectory {
    /// Start an mDNS daemon. The daemon runs its own background thread.
    pub fn new(config: &DiscoveryConfig) -> Result<Self, DiscoveryError> {
        let daemon = ServiceDaemon::new().map_err(|e| DiscoveryError::MdnsDaemon(e.to_string()))?;

        Ok(Self {
            daemon: Arc::new(daemon),
            service_type: config.service_type.clone(),
            browse_timeout: config.browse_timeout(),
            http: reqwest::Client::new(),
        })
    }

    async fn browse(&self) -> Result<Vec<Receiver>, DiscoveryError> {
        debug!(
            "Browsing for {} receivers, timeout: {}ms",
            self.service_type,
            self.browse_timeout.as_millis()
        );

        let events = self
            .daemon
            .browse(&self.service_type)
            .map_err(|e| DiscoveryError::MdnsDaemon(e.to_string()))?;

        let mut discovered: HashMap<String, Receiver> = HashMap::new();

        let start = std::time::Instant::now();
        while start.elapsed() < self.browse_timeout {
            let remaining = self.browse_timeout.saturating_sub(start.elapsed());

            match timeout(remaining, events.recv_async()).await {
                Ok(Ok(ServiceEvent::ServiceResolved(info))) => {
                    trace!("Service resolved: {}", info.fullname);
                    if let Some(receiver) = receiver_from_service(&info, &self.service_type) {
                        discovered.insert(receiver.name.clone(), receiver);
                    }
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    debug!("mDNS receiver channel closed: {:?}", e);
                    break;
                }
                // Browse window elapsed
                Err(_) => break,
            }
        }

        if let Err(e) = self.daemon.stop_browse(&self.service_type) {
            warn!("Failed to stop mDNS browse: {:?}", e);
        }

        let mut receivers: Vec<_> = discovered.into_values().collect();
        receivers.sort_by(|a, b| a.name.cmp(&b.name));

        debug!("Discovery complete: {} receiver(s) found", receivers.len());
        Ok(receivers)
    }
}

#[async_trait]
impl ReceiverDirectory for MdnsDirectory {
    type Session = HttpSession;

    async fn discover(&self) -> Result<Vec<Receiver>, DiscoveryError> {
        let receivers = self.browse().await?;
        if receivers.is_empty() {
            return Err(DiscoveryError::NoReceivers);
        }
        Ok(receivers)
    }

    async fn connect(
        &self,
        name: &str,
        credential: Option<&str>,
    ) -> Result<HttpSession, TransportError> {
        let receivers = match self.discover().await {
            Ok(receivers) => receivers,
            Err(DiscoveryError::NoReceivers) => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let receiver = receivers
            .into_iter()
            .find(|r| r.name == name)
            .ok_or_else(|| TransportError::NotFound {
                name: name.to_string(),
            })?;

        HttpSession::connect(self.http.clone(), &receiver, credential).await
    }
}

fn receiver_from_service(info: &ResolvedService, service_type: &str) -> Option<Receiver> {
    let name = instance_name(&info.fullname, service_type)?;

    let mut addresses: Vec<_> = info.addresses.iter().map(|a| a.to_ip_addr()).collect();
    if addresses.is_empty() {
        return None;
    }
    // IPv4 first; receivers are most reliably reachable over it
    addresses.sort_by_key(|a| !a.is_ipv4());

    Some(Receiver {
        name,
        addresses,
        port: info.port,
    })
}

/// Extract the instance part of a DNS-SD full name.
///
/// `Lobby._airplay._tcp.local.` yields `Lobby`. RAOP instances are named
/// `<hex address>@<name>`; only the name after `@` is kept for those.
fn instance_name(fullname: &str, service_type: &str) -> Option<String> {
    let instance = fullname
        .strip_suffix(service_type)
        .and_then(|rest| rest.strip_suffix('.'))
        .unwrap_or(fullname);

    let instance = if service_type.starts_with("_raop.") {
        instance.split_once('@').map(|(_, n)| n).unwrap_or(instance)
    } else {
        instance
    };

    let instance = instance.trim();
    if instance.is_empty() {
        None
    } else {
        Some(instance.to_string())
    }
}
