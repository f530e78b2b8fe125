use crate::errors::QurlError;
use crate::services::profile::{EndpointProfile, ProxySettings};
use crate::services::status::StatusSink;
use reqwest::{Certificate, Client, Proxy};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

/// TLS and pooling knobs shared by every client of one unit.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub reject_unauthorized: bool,
    pub keep_alive: bool,
}

/// Pooled reqwest clients of one unit: a direct client built up front and
/// proxied clients built on first use, one per distinct proxy.
pub struct AgentPool {
    settings: AgentSettings,
    ca_cert: Option<Certificate>,
    direct: Client,
    proxied: Mutex<HashMap<ProxySettings, Client>>,
}

impl AgentPool {
    pub fn new(
        profile: Option<&EndpointProfile>,
        keep_alive: bool,
        sink: &dyn StatusSink,
    ) -> Result<Self, QurlError> {
        let settings = AgentSettings {
            reject_unauthorized: profile.map_or(true, |p| p.reject_unauthorized),
            keep_alive,
        };
        let ca_cert = profile
            .and_then(|p| p.ca_cert.as_deref())
            .and_then(|bytes| match Certificate::from_pem(bytes) {
                Ok(cert) => Some(cert),
                Err(err) => {
                    sink.error(
                        &format!("CA certificate parse error: {}", err),
                        profile.map(|p| serde_json::json!({ "endpoint": p.id })).as_ref(),
                    );
                    None
                }
            });
        let direct = build_client(&settings, ca_cert.as_ref(), None)?;
        Ok(Self {
            settings,
            ca_cert,
            direct,
            proxied: Mutex::new(HashMap::new()),
        })
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn client_for(&self, proxy: Option<&ProxySettings>) -> Result<Client, QurlError> {
        let Some(proxy) = proxy else {
            return Ok(self.direct.clone());
        };
        let mut guard = self.proxied.lock().unwrap_or_else(|err| err.into_inner());
        if let Some(existing) = guard.get(proxy) {
            return Ok(existing.clone());
        }
        let client = build_client(&self.settings, self.ca_cert.as_ref(), Some(proxy))?;
        guard.insert(proxy.clone(), client.clone());
        Ok(client)
    }
}

impl fmt::Debug for AgentPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentPool")
            .field("settings", &self.settings)
            .field("custom_ca", &self.ca_cert.is_some())
            .finish_non_exhaustive()
    }
}

fn build_client(
    settings: &AgentSettings,
    ca_cert: Option<&Certificate>,
    proxy: Option<&ProxySettings>,
) -> Result<Client, QurlError> {
    // Redirects are followed by the executor so every hop can be recorded.
    let mut builder = Client::builder().redirect(reqwest::redirect::Policy::none());
    if !settings.reject_unauthorized {
        builder = builder.danger_accept_invalid_certs(true);
    }
    if let Some(cert) = ca_cert {
        builder = builder.add_root_certificate(cert.clone());
    }
    if !settings.keep_alive {
        builder = builder.pool_max_idle_per_host(0);
    }
    match proxy {
        Some(proxy) => {
            let mut rule = Proxy::all(proxy.url()).map_err(|err| {
                QurlError::config(format!("Invalid proxy '{}': {}", proxy.url(), err))
            })?;
            if let Some(auth) = &proxy.auth {
                rule = rule.basic_auth(&auth.username, &auth.password);
            }
            builder = builder.proxy(rule);
        }
        None => {
            builder = builder.no_proxy();
        }
    }
    builder
        .build()
        .map_err(|err| QurlError::config(format!("Failed to build HTTP client: {}", err)))
}
