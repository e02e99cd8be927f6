//! Bind address, bearer key and TLS material consulted at listener creation.
//!
//! Setters on the server write here; `start` copies a snapshot, so changes
//! made while running only apply after the next restart.

use std::fmt;

use crate::config::ProxyConfig;

/// PEM-encoded certificate chain and private key.
#[derive(Clone, PartialEq, Eq)]
pub struct TlsMaterial {
    pub cert_pem: String,
    pub key_pem: String,
}

impl TlsMaterial {
    pub fn new(cert_pem: impl Into<String>, key_pem: impl Into<String>) -> Self {
        Self {
            cert_pem: cert_pem.into(),
            key_pem: key_pem.into(),
        }
    }
}

impl fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("cert_pem", &format_args!("{} bytes", self.cert_pem.len()))
            .field("key_pem", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct SecuritySettings {
    pub bind_address: String,
    /// Empty disables bearer enforcement.
    pub api_key: String,
    pub tls: Option<TlsMaterial>,
}

impl SecuritySettings {
    /// Seed from the file configuration. TLS files are read separately by
    /// the caller since that can fail.
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self {
            bind_address: config.listener.bind_address.clone(),
            api_key: config.security.api_key.clone(),
            tls: None,
        }
    }

    pub fn auth_enabled(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Set the TLS material. Missing either half disables TLS.
    pub fn set_tls(&mut self, cert_pem: &str, key_pem: &str) {
        self.tls = if cert_pem.is_empty() || key_pem.is_empty() {
            None
        } else {
            Some(TlsMaterial::new(cert_pem, key_pem))
        };
    }
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self::from_config(&ProxyConfig::default())
    }
}

impl fmt::Debug for SecuritySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecuritySettings")
            .field("bind_address", &self.bind_address)
            .field("auth_enabled", &self.auth_enabled())
            .field("tls", &self.tls)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_loopback_without_auth() {
        let settings = SecuritySettings::default();
        assert_eq!(settings.bind_address, "127.0.0.1");
        assert!(!settings.auth_enabled());
        assert!(settings.tls.is_none());
    }

    #[test]
    fn half_configured_tls_is_disabled() {
        let mut settings = SecuritySettings::default();
        settings.set_tls("-----BEGIN CERTIFICATE-----", "");
        assert!(settings.tls.is_none());

        settings.set_tls("cert", "key");
        assert_eq!(settings.tls, Some(TlsMaterial::new("cert", "key")));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let mut settings = SecuritySettings {
            api_key: "hunter2".into(),
            ..SecuritySettings::default()
        };
        settings.set_tls("cert", "very-secret-key");
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("very-secret-key"));
    }
}
