//! mDNS service advertisement
//!
//! Service type: `_voice-satellite._tcp.local.`
//! Instance name: the configured satellite name
//!
//! TXT records:
//! - `version`: Satellite version
//! - `name`: Satellite name
//! - `wake_word`: Whether wake word gating is enabled ("true"/"false")
//! - `speaker`: Whether responses play locally ("true"/"false")

use std::collections::HashMap;

use mdns_sd::{ServiceDaemon, ServiceInfo};

use crate::{Error, Result};

/// mDNS service type for voice satellites
pub const SERVICE_TYPE: &str = "_voice-satellite._tcp.local.";

/// What to advertise
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAdvert {
    pub name: String,
    pub port: u16,
    pub wake_word: bool,
    pub speaker: bool,
}

impl ServiceAdvert {
    /// TXT record properties
    #[must_use]
    pub fn properties(&self) -> HashMap<String, String> {
        HashMap::from([
            ("version".to_string(), env!("CARGO_PKG_VERSION").to_string()),
            ("name".to_string(), self.name.clone()),
            ("wake_word".to_string(), self.wake_word.to_string()),
            ("speaker".to_string(), self.speaker.to_string()),
        ])
    }
}

/// mDNS advertiser for the control server
pub struct MdnsAdvertiser {
    daemon: ServiceDaemon,

    /// Full name of the registered service (if any)
    registered: Option<String>,
}

impl MdnsAdvertiser {
    /// Create a new mDNS advertiser
    ///
    /// # Errors
    ///
    /// Returns error if mDNS daemon cannot be created
    pub fn new() -> Result<Self> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| Error::Discovery(format!("failed to create mDNS daemon: {e}")))?;

        Ok(Self {
            daemon,
            registered: None,
        })
    }

    /// Start advertising, replacing any previous registration
    ///
    /// # Errors
    ///
    /// Returns error if service cannot be registered
    pub fn start(&mut self, advert: &ServiceAdvert) -> Result<()> {
        self.stop();

        let hostname = hostname::get().map_or_else(
            |_| "voice-satellite".to_string(),
            |h| h.to_string_lossy().to_string(),
        );

        let service = ServiceInfo::new(
            SERVICE_TYPE,
            &advert.name,
            &format!("{hostname}.local."),
            "",
            advert.port,
            advert.properties(),
        )
        .map_err(|e| Error::Discovery(format!("failed to create service info: {e}")))?
        .enable_addr_auto();

        let fullname = service.get_fullname().to_string();

        self.daemon
            .register(service)
            .map_err(|e| Error::Discovery(format!("failed to register mDNS service: {e}")))?;
        self.registered = Some(fullname);

        tracing::info!(
            service_type = SERVICE_TYPE,
            instance = advert.name,
            port = advert.port,
            "mDNS service registered"
        );

        Ok(())
    }

    /// Stop advertising
    pub fn stop(&mut self) {
        if let Some(name) = self.registered.take() {
            if let Err(e) = self.daemon.unregister(&name) {
                tracing::warn!(error = %e, "failed to unregister mDNS service");
            } else {
                tracing::info!("mDNS service unregistered");
            }
        }
    }

    /// Check if currently advertising
    #[must_use]
    pub const fn is_advertising(&self) -> bool {
        self.registered.is_some()
    }
}

impl Drop for MdnsAdvertiser {
    fn drop(&mut self) {
        self.stop();
        if let Err(e) = self.daemon.shutdown() {
            tracing::trace!(error = %e, "mDNS daemon shutdown error (expected on normal exit)");
        }
    }
}
