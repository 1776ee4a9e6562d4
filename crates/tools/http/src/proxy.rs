//! Proxy settings resolved from a client-environment snapshot.
//!
//! reqwest would normally consult the live process environment. The client
//! is built with system proxies disabled and only the snapshot's variables
//! applied, so a fetch sees exactly the environment it was started with.

use repofetch_core::{ClientEnvironment, Failure, TransientCause};
use reqwest::{ClientBuilder, NoProxy, Proxy};

/// Variables consulted for proxy configuration, upper case first.
pub const PROXY_VARIABLES: &[&str] = &[
    "HTTP_PROXY",
    "http_proxy",
    "HTTPS_PROXY",
    "https_proxy",
    "NO_PROXY",
    "no_proxy",
];

/// Proxy URLs and exclusions taken from one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxySettings {
    /// Proxy for `http://` URLs.
    pub http: Option<String>,
    /// Proxy for `https://` URLs.
    pub https: Option<String>,
    /// Comma-separated hosts that bypass the proxy.
    pub no_proxy: Option<String>,
}

impl ProxySettings {
    /// Read proxy settings from the snapshot.
    #[must_use]
    pub fn from_client_env(env: &ClientEnvironment) -> Self {
        Self {
            http: env.first_of(&["HTTP_PROXY", "http_proxy"]).map(str::to_string),
            https: env.first_of(&["HTTPS_PROXY", "https_proxy"]).map(str::to_string),
            no_proxy: env.first_of(&["NO_PROXY", "no_proxy"]).map(str::to_string),
        }
    }

    /// Whether any proxy is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.http.is_none() && self.https.is_none()
    }

    /// Apply these settings to a client builder with system proxies disabled.
    ///
    /// # Errors
    ///
    /// Transient failure if a proxy URL cannot be parsed. Proxies belong to
    /// the environment, not the rule.
    pub fn apply(&self, builder: ClientBuilder) -> Result<ClientBuilder, Failure> {
        let mut builder = builder.no_proxy();
        if let Some(url) = &self.http {
            let proxy = Proxy::http(url).map_err(|e| invalid_proxy(url, &e))?;
            builder = builder.proxy(proxy.no_proxy(self.exclusions()));
        }
        if let Some(url) = &self.https {
            let proxy = Proxy::https(url).map_err(|e| invalid_proxy(url, &e))?;
            builder = builder.proxy(proxy.no_proxy(self.exclusions()));
        }
        Ok(builder)
    }

    fn exclusions(&self) -> Option<NoProxy> {
        self.no_proxy.as_deref().and_then(NoProxy::from_string)
    }
}

fn invalid_proxy(url: &str, error: &reqwest::Error) -> Failure {
    Failure::Transient(TransientCause::Network {
        url: url.to_string(),
        message: format!("invalid proxy URL: {error}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upper_case_wins() {
        let env = ClientEnvironment::from_pairs([
            ("HTTP_PROXY", "http://upper:3128"),
            ("http_proxy", "http://lower:3128"),
            ("https_proxy", "http://secure:3128"),
        ]);
        let settings = ProxySettings::from_client_env(&env);
        assert_eq!(settings.http.as_deref(), Some("http://upper:3128"));
        assert_eq!(settings.https.as_deref(), Some("http://secure:3128"));
        assert_eq!(settings.no_proxy, None);
    }

    #[test]
    fn test_empty_snapshot_has_no_proxy() {
        let settings = ProxySettings::from_client_env(&ClientEnvironment::new());
        assert!(settings.is_empty());
        assert!(settings.apply(reqwest::Client::builder()).is_ok());
    }

    #[test]
    fn test_invalid_proxy_is_transient() {
        let settings = ProxySettings {
            http: Some("not a url".into()),
            ..ProxySettings::default()
        };
        let err = settings.apply(reqwest::Client::builder()).unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("invalid proxy URL"));
    }
}
