// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Trust material for outgoing TLS connections
//!
//! The injector asks the trust store for the current root set on every
//! connection attempt, so certificates added by an interception appliance
//! take effect without restarting anything.

use std::sync::Arc;

use parking_lot::RwLock;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use tracing::{debug, warn};

use crate::config::ProxySetting;
use crate::error::{Error, Result};
use crate::proxy::RequestOptions;

/// Source of trusted root certificates (PEM)
pub trait TrustStore: Send + Sync {
    /// All trusted roots; empty means engine defaults
    fn root_certificates(&self) -> Vec<String>;
}

/// In-memory trust store
#[derive(Debug, Default)]
pub struct StaticTrustStore {
    certificates: RwLock<Vec<String>>,
}

impl StaticTrustStore {
    pub fn new(certificates: Vec<String>) -> Self {
        Self {
            certificates: RwLock::new(certificates),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Replace the root set; later connections see the new set
    pub fn replace(&self, certificates: Vec<String>) {
        *self.certificates.write() = certificates;
    }
}

impl TrustStore for StaticTrustStore {
    fn root_certificates(&self) -> Vec<String> {
        self.certificates.read().clone()
    }
}

/// Attaches trust-store roots to connection and proxy options
#[derive(Clone)]
pub struct CertificateInjector {
    store: Arc<dyn TrustStore>,
}

impl CertificateInjector {
    pub fn new(store: Arc<dyn TrustStore>) -> Self {
        Self { store }
    }

    /// Current root set, or `None` when the store has none
    pub fn get_certificates(&self) -> Option<Vec<String>> {
        let certificates = self.store.root_certificates();
        if certificates.is_empty() {
            None
        } else {
            Some(certificates)
        }
    }

    /// Install the current root set for the upcoming connection
    pub fn apply_to_request_options(&self, options: &mut RequestOptions) {
        options.ca = self.get_certificates();
        debug!(
            target_host = %options.authority(),
            roots = options.ca.as_ref().map_or(0, Vec::len),
            "Injected trust roots"
        );
    }

    /// Set the proxy CA list, leaving an explicit list alone when the
    /// store is empty
    pub fn apply_to_proxy_settings(&self, proxy: &mut ProxySetting) {
        if let Some(certificates) = self.get_certificates() {
            proxy.ca = Some(certificates);
        }
    }
}

/// Build a rustls client config trusting `ca`, or the webpki roots when
/// no certificates are given. Offers HTTP/2 and HTTP/1.1 over ALPN.
pub fn build_client_config(ca: Option<&[String]>) -> Result<ClientConfig> {
    let mut roots = RootCertStore::empty();

    match ca {
        Some(pems) if !pems.is_empty() => {
            for pem in pems {
                let certs = rustls_pemfile::certs(&mut pem.as_bytes())
                    .map_err(|e| Error::Tls(format!("Invalid PEM certificate: {}", e)))?;
                let (added, ignored) = roots.add_parsable_certificates(&certs);
                if ignored > 0 {
                    warn!(added, ignored, "Skipped unparsable root certificates");
                }
            }
            if roots.is_empty() {
                return Err(Error::Tls("No usable root certificates".to_string()));
            }
        }
        _ => {
            roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
                OwnedTrustAnchor::from_subject_spki_name_constraints(
                    ta.subject,
                    ta.spki,
                    ta.name_constraints,
                )
            }));
        }
    }

    let mut config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(config)
}
