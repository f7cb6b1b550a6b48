//! Problem document retrieval.
//!
//! A document is accepted only when the URL passes the source policy, the
//! response is HTTP-ok, the body fits the size limit and starts with `#`. Every failure, fetch or parse, ends in the sentinel document.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use reqwest::header::{LOCATION, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::Url;
use tokio::net::lookup_host;
use tracing::{debug, error, info, instrument};

use crate::config::FetchConfig;
use crate::domain::ProblemDocument;
use crate::error::{FetchError, MalformedDocument};
use crate::extract::parse_document;

/// How a load resolved. The document is always usable.
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(ProblemDocument),
    FetchFailed(FetchError),
    Malformed(MalformedDocument),
}

impl LoadOutcome {
    /// The loaded document, or the sentinel.
    pub fn document(&self) -> ProblemDocument {
        match self {
            LoadOutcome::Loaded(doc) => doc.clone(),
            _ => ProblemDocument::sentinel(),
        }
    }

    pub fn into_document(self) -> ProblemDocument {
        match self {
            LoadOutcome::Loaded(doc) => doc,
            _ => ProblemDocument::sentinel(),
        }
    }

    /// Reason the sentinel was substituted, for content authors.
    pub fn failure(&self) -> Option<String> {
        match self {
            LoadOutcome::Loaded(_) => None,
            LoadOutcome::FetchFailed(e) => Some(e.to_string()),
            LoadOutcome::Malformed(e) => Some(e.to_string()),
        }
    }
}

/// Fetches problem documents from vetted URLs.
///
/// Only http(s) is accepted. With `allowed_hosts` set, nothing outside it is
/// fetched. Otherwise targets that resolve to loopback, private, link-local or
/// other non-public addresses are refused (unless `allow_private`), and the
/// connection is pinned to the address that was checked. Redirects are
/// followed by hand so every hop is vetted the same way.
#[derive(Clone)]
pub struct DocumentFetcher {
    client: reqwest::Client,
    cfg: FetchConfig,
}

impl DocumentFetcher {
    pub fn new(cfg: FetchConfig) -> Self {
        let client = client_builder(&cfg).build().unwrap_or_else(|e| {
            error!(target: "codehelp_backend", error = %e, "HTTP client builder failed; using defaults");
            reqwest::Client::new()
        });
        Self { client, cfg }
    }

    /// GET `url` and return its markdown body.
    #[instrument(level = "info", skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let mut current = Url::parse(url).map_err(|e| FetchError::InvalidUrl { url: url.to_string(), reason: e.to_string() })?;

        for _ in 0..=self.cfg.max_redirects {
            let client = match self.vet(&current).await? {
                Some((host, addr)) => client_builder(&self.cfg)
                    .resolve(&host, addr)
                    .build()
                    .map_err(|source| FetchError::Request { url: current.to_string(), source })?,
                None => self.client.clone(),
            };

            let res = client
                .get(current.clone())
                .header(USER_AGENT, "codehelp-backend/0.1")
                .send()
                .await
                .map_err(|source| FetchError::Request { url: current.to_string(), source })?;

            let status = res.status();
            if status.is_redirection() {
                let next = res
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|loc| current.join(loc).ok())
                    .ok_or_else(|| FetchError::Status { url: current.to_string(), status: status.as_u16() })?;
                debug!(target: "problem", from = %current, to = %next, "Following redirect");
                current = next;
                continue;
            }
            if !status.is_success() {
                return Err(FetchError::Status { url: current.to_string(), status: status.as_u16() });
            }
            return self.read_markdown(current.as_str(), res).await;
        }
        Err(FetchError::TooManyRedirects { url: url.to_string() })
    }

    /// Check one hop. Returns the host and address to pin when the target was
    /// resolved here.
    async fn vet(&self, url: &Url) -> Result<Option<(String, SocketAddr)>, FetchError> {
        let forbidden = |reason: &'static str| FetchError::Forbidden { url: url.to_string(), reason };

        if !matches!(url.scheme(), "http" | "https") {
            return Err(forbidden("only http and https are fetched"));
        }
        let host = url.host_str().ok_or_else(|| forbidden("no host"))?;
        let host = host.trim_start_matches('[').trim_end_matches(']').to_ascii_lowercase();

        if !self.cfg.allowed_hosts.is_empty() {
            return if self.cfg.allowed_hosts.iter().any(|h| h.eq_ignore_ascii_case(&host)) {
                Ok(None)
            } else {
                Err(forbidden("host is not in the allowlist"))
            };
        }
        if self.cfg.allow_private {
            return Ok(None);
        }

        if let Ok(ip) = host.parse::<IpAddr>() {
            return if is_public(ip) { Ok(None) } else { Err(forbidden("address is not public")) };
        }

        let port = url.port_or_known_default().unwrap_or(80);
        let addrs: Vec<SocketAddr> = lookup_host((host.as_str(), port))
            .await
            .map_err(|source| FetchError::Resolve { url: url.to_string(), source })?
            .collect();
        match addrs.first() {
            None => Err(forbidden("host has no addresses")),
            Some(_) if addrs.iter().any(|a| !is_public(a.ip())) => Err(forbidden("address is not public")),
            Some(addr) => Ok(Some((host, *addr))),
        }
    }

    async fn read_markdown(&self, url: &str, mut res: reqwest::Response) -> Result<String, FetchError> {
        let limit = self.cfg.max_document_bytes;
        let too_large = || FetchError::TooLarge { url: url.to_string(), limit };
        if res.content_length().is_some_and(|n| n > limit as u64) {
            return Err(too_large());
        }

        let mut body = Vec::new();
        while let Some(chunk) = res
            .chunk()
            .await
            .map_err(|source| FetchError::Request { url: url.to_string(), source })?
        {
            if body.len() + chunk.len() > limit {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }

        let text = String::from_utf8_lossy(&body).into_owned();
        if !text.starts_with('#') {
            return Err(FetchError::NotMarkdown { url: url.to_string() });
        }
        Ok(text)
    }
}

fn client_builder(cfg: &FetchConfig) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .redirect(Policy::none())
}

/// Globally routable unicast address.
pub fn is_public(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, c, _] = v4.octets();
            !(v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_documentation()
                || v4.is_unspecified()
                || v4.is_multicast()
                || a == 0
                || a >= 240
                || (a == 100 && (64..128).contains(&b))
                || (a == 192 && b == 0 && c == 0)
                || (a == 198 && (18..20).contains(&b)))
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_public(IpAddr::V4(v4));
            }
            let first = v6.segments()[0];
            !(v6.is_loopback()
                || v6.is_unspecified()
                || v6.is_multicast()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
                || (first == 0x2001 && v6.segments()[1] == 0x0db8))
        }
    }
}

/// Fetch and parse; never fails.
#[instrument(level = "info", skip(fetcher))]
pub async fn load_problem(fetcher: &DocumentFetcher, url: &str) -> LoadOutcome {
    let text = match fetcher.fetch(url).await {
        Ok(t) => t,
        Err(e) => {
            error!(target: "problem", %url, error = %e, "Problem fetch failed; using sentinel document");
            return LoadOutcome::FetchFailed(e);
        }
    };

    match parse_document(&text) {
        Ok(doc) => {
            info!(
                target: "problem",
                %url,
                title = %doc.title,
                language = %doc.code_language,
                visible = doc.visible_tests.len(),
                hidden = doc.hidden_tests.len(),
                "Problem loaded"
            );
            LoadOutcome::Loaded(doc)
        }
        Err(e) => {
            error!(target: "problem", %url, error = %e, "Problem document malformed; using sentinel document");
            LoadOutcome::Malformed(e)
        }
    }
}
