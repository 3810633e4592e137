//! Terminal dispatch onto the underlying reqwest transport.

use crate::middleware::RequestOverrides;
use crate::proxy::ProxySelector;
use crate::{HttpClientConfig, Response, Result};
use dashmap::DashMap;
use reqwest::Request;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Client options needed when building per-proxy transports lazily.
#[derive(Debug, Clone)]
struct TransportOptions {
    timeout: Duration,
    connect_timeout: Duration,
    pool_idle_timeout: Duration,
    pool_max_idle_per_host: usize,
    user_agent: String,
    follow_redirects: bool,
    max_redirects: usize,
    proxy_auth: Option<(String, String)>,
}

impl TransportOptions {
    fn builder(&self) -> reqwest::ClientBuilder {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .pool_idle_timeout(self.pool_idle_timeout)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .user_agent(&self.user_agent);

        if self.follow_redirects {
            builder = builder.redirect(reqwest::redirect::Policy::limited(self.max_redirects));
        } else {
            builder = builder.redirect(reqwest::redirect::Policy::none());
        }

        builder
    }
}

/// Transport terminal: owns the reqwest clients and routes each dispatch to
/// the direct, proxied, or per-override client.
#[derive(Clone)]
pub(crate) struct Transport {
    /// Default route; carries the proxy selector when one is configured.
    default: reqwest::Client,
    /// Direct route for `no_proxy` requests.
    direct: reqwest::Client,
    /// Lazily built clients for per-request proxy overrides.
    proxied: Arc<DashMap<String, reqwest::Client>>,
    options: Arc<TransportOptions>,
}

impl Transport {
    pub(crate) fn new(config: &HttpClientConfig) -> Self {
        let options = TransportOptions {
            timeout: config.timeout,
            connect_timeout: config.connect_timeout,
            pool_idle_timeout: config.pool_idle_timeout,
            pool_max_idle_per_host: config.pool_max_idle_per_host,
            user_agent: config.user_agent.clone(),
            follow_redirects: config.follow_redirects,
            max_redirects: config.max_redirects,
            proxy_auth: config
                .proxy
                .as_ref()
                .and_then(|p| p.auth.clone()),
        };

        let direct = options
            .builder()
            .no_proxy()
            .build()
            .expect("Failed to build HTTP client");

        let default = match config.proxy.as_ref().map(ProxySelector::new) {
            Some(selector) if selector.is_active() => {
                let auth = options.proxy_auth.clone();
                let mut proxy =
                    reqwest::Proxy::custom(move |url| selector.select(url));
                if let Some((user, pass)) = &auth {
                    proxy = proxy.basic_auth(user, pass);
                }
                options
                    .builder()
                    .proxy(proxy)
                    .build()
                    .expect("Failed to build HTTP client")
            }
            _ => direct.clone(),
        };

        Self {
            default,
            direct,
            proxied: Arc::new(DashMap::new()),
            options: Arc::new(options),
        }
    }

    /// Client for a per-request proxy override, built once per proxy URL.
    fn proxied_client(&self, proxy_url: &url::Url) -> Result<reqwest::Client> {
        if let Some(client) = self.proxied.get(proxy_url.as_str()) {
            return Ok(client.clone());
        }

        let mut proxy = reqwest::Proxy::all(proxy_url.clone())?;
        if let Some((user, pass)) = &self.options.proxy_auth {
            proxy = proxy.basic_auth(user, pass);
        }
        let client = self
            .options
            .builder()
            .proxy(proxy)
            .build()
            .map_err(crate::HttpClientError::Http)?;

        self.proxied
            .insert(proxy_url.as_str().to_string(), client.clone());
        Ok(client)
    }

    /// Send a prepared request and wrap the raw response.
    pub(crate) async fn dispatch(
        &self,
        request: Request,
        overrides: &RequestOverrides,
    ) -> Result<Response> {
        // Per-request proxy override wins over no-proxy, which wins over the
        // configured default route.
        let client = if let Some(proxy_url) = &overrides.proxy {
            debug!(proxy = %proxy_url, "Dispatching through per-request proxy");
            self.proxied_client(proxy_url)?
        } else if overrides.no_proxy {
            self.direct.clone()
        } else {
            self.default.clone()
        };

        let response = client.execute(request).await?;

        if overrides.streaming {
            Ok(Response::from_reqwest_streaming(response))
        } else {
            Response::from_reqwest(response).await
        }
    }
}
