//! Proxy selection and bypass rules.

use ipnet::IpNet;
use std::net::IpAddr;
use url::Url;

/// A single no-proxy rule.
///
/// Supported forms: exact host, `*.suffix`, `.suffix`, CIDR ranges, and the
/// literal `localhost`.
#[derive(Debug, Clone)]
pub enum ProxyRule {
    /// Exact host match (case-insensitive).
    Exact(String),
    /// Domain suffix match, stored with the leading dot.
    Suffix(String),
    /// CIDR range matched against literal IP hosts.
    Cidr(IpNet),
    /// `localhost` and loopback addresses.
    Localhost,
}

impl ProxyRule {
    /// Parse a rule from its textual form.
    pub fn parse(rule: &str) -> Option<Self> {
        let rule = rule.trim();
        if rule.is_empty() {
            return None;
        }
        if rule.eq_ignore_ascii_case("localhost") {
            return Some(Self::Localhost);
        }
        if rule.contains('/') {
            return rule.parse::<IpNet>().ok().map(Self::Cidr);
        }
        if let Some(suffix) = rule.strip_prefix("*.") {
            return Some(Self::Suffix(format!(".{}", suffix.to_ascii_lowercase())));
        }
        if rule.starts_with('.') {
            return Some(Self::Suffix(rule.to_ascii_lowercase()));
        }
        Some(Self::Exact(rule.to_ascii_lowercase()))
    }

    /// Check whether a request host matches this rule.
    pub fn matches(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        match self {
            Self::Exact(h) => &host == h,
            Self::Suffix(suffix) => {
                host.ends_with(suffix.as_str()) || host == suffix[1..]
            }
            Self::Cidr(net) => host
                .parse::<IpAddr>()
                .map(|ip| net.contains(&ip))
                .unwrap_or(false),
            Self::Localhost => {
                host == "localhost"
                    || host
                        .parse::<IpAddr>()
                        .map(|ip| ip.is_loopback())
                        .unwrap_or(false)
            }
        }
    }
}

/// Proxy configuration.
#[derive(Debug, Clone, Default)]
pub struct ProxyConfig {
    /// Client-wide default proxy.
    pub default_proxy: Option<Url>,
    /// Basic-auth credentials attached as `Proxy-Authorization`.
    pub auth: Option<(String, String)>,
    /// Hosts that dispatch directly.
    pub bypass: Vec<ProxyRule>,
    /// Honour `HTTP_PROXY`/`HTTPS_PROXY`/`NO_PROXY` from the environment.
    pub system_proxy: bool,
}

impl ProxyConfig {
    /// Create an empty proxy configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default proxy URL.
    pub fn with_proxy(mut self, url: Url) -> Self {
        self.default_proxy = Some(url);
        self
    }

    /// Set proxy basic-auth credentials.
    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some((username.into(), password.into()));
        self
    }

    /// Add no-proxy rules; unparseable rules are skipped.
    pub fn with_bypass<I, S>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.bypass
            .extend(rules.into_iter().filter_map(|r| ProxyRule::parse(r.as_ref())));
        self
    }

    /// Enable environment-derived proxies.
    pub fn with_system_proxy(mut self, enable: bool) -> Self {
        self.system_proxy = enable;
        self
    }
}

/// Per-URL proxy selector, evaluated by the transport for every dispatch.
///
/// Precedence for the non-overridden path: configured default proxy, then
/// environment proxies when `system_proxy` is enabled. Bypass rules always
/// win and force a direct dispatch.
#[derive(Debug, Clone)]
pub(crate) struct ProxySelector {
    default_proxy: Option<Url>,
    bypass: Vec<ProxyRule>,
    env_http: Option<Url>,
    env_https: Option<Url>,
    env_no_proxy: Vec<ProxyRule>,
}

impl ProxySelector {
    pub(crate) fn new(config: &ProxyConfig) -> Self {
        let (env_http, env_https, env_no_proxy) = if config.system_proxy {
            (
                env_proxy_url(&["http_proxy", "HTTP_PROXY", "all_proxy", "ALL_PROXY"]),
                env_proxy_url(&["https_proxy", "HTTPS_PROXY", "all_proxy", "ALL_PROXY"]),
                env_no_proxy_rules(),
            )
        } else {
            (None, None, Vec::new())
        };

        Self {
            default_proxy: config.default_proxy.clone(),
            bypass: config.bypass.clone(),
            env_http,
            env_https,
            env_no_proxy,
        }
    }

    /// Whether this selector can ever produce a proxy.
    pub(crate) fn is_active(&self) -> bool {
        self.default_proxy.is_some() || self.env_http.is_some() || self.env_https.is_some()
    }

    /// Effective proxy for a request URL; `None` dispatches directly.
    pub(crate) fn select(&self, url: &Url) -> Option<Url> {
        let host = url.host_str()?;

        if self.bypass.iter().any(|r| r.matches(host))
            || self.env_no_proxy.iter().any(|r| r.matches(host))
        {
            return None;
        }

        if let Some(proxy) = &self.default_proxy {
            return Some(proxy.clone());
        }

        match url.scheme() {
            "https" => self.env_https.clone(),
            _ => self.env_http.clone(),
        }
    }
}

fn env_proxy_url(names: &[&str]) -> Option<Url> {
    names
        .iter()
        .find_map(|name| std::env::var(name).ok())
        .filter(|v| !v.is_empty())
        .and_then(|v| Url::parse(&v).ok())
}

fn env_no_proxy_rules() -> Vec<ProxyRule> {
    std::env::var("no_proxy")
        .or_else(|_| std::env::var("NO_PROXY"))
        .map(|v| v.split(',').filter_map(ProxyRule::parse).collect())
        .unwrap_or_default()
}
