//! Full-node endpoint configuration.
//!
//! Accepts the `[token:]<address>` form nodes print for their API, where the
//! address is either a multiaddr (`/ip4/127.0.0.1/tcp/1234/http`) or a URL.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail, Result};

/// Environment variable holding the default endpoint.
pub const FULLNODE_API_INFO_ENV: &str = "FULLNODE_API_INFO";

/// JSON-RPC path served by full nodes.
const RPC_PATH: &str = "/rpc/v1";

#[derive(Clone, PartialEq, Eq)]
pub struct ApiInfo {
    /// HTTP(S) URL of the JSON-RPC endpoint.
    pub url: String,
    /// Bearer token, if the endpoint requires one.
    pub token: Option<String>,
}

impl fmt::Debug for ApiInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiInfo")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ApiInfo {
    /// Read the endpoint from `FULLNODE_API_INFO`.
    pub fn from_env() -> Result<Self> {
        let raw = tvx_types::env_utils::env_string(FULLNODE_API_INFO_ENV).ok_or_else(|| {
            anyhow!(
                "no full node endpoint configured; pass --api or set {}",
                FULLNODE_API_INFO_ENV
            )
        })?;
        raw.parse()
    }
}

fn is_address(s: &str) -> bool {
    s.starts_with('/')
        || s.split_once("://").is_some_and(|(scheme, _)| {
            !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphanumeric())
        })
}

impl FromStr for ApiInfo {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            bail!("empty api info");
        }
        let (token, addr) = if is_address(s) {
            (None, s)
        } else {
            match s.split_once(':') {
                Some((token, addr)) if is_address(addr) => (Some(token.to_string()), addr),
                _ => bail!("invalid api info '{}': expected [token:]<multiaddr|url>", s),
            }
        };
        let url = if addr.starts_with('/') {
            multiaddr_to_url(addr)?
        } else {
            url_to_http(addr)?
        };
        Ok(Self {
            url,
            token: token.filter(|t| !t.is_empty()),
        })
    }
}

fn url_to_http(url: &str) -> Result<String> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| anyhow!("invalid endpoint url '{}'", url))?;
    let scheme = match scheme {
        "http" | "ws" => "http",
        "https" | "wss" => "https",
        other => bail!("unsupported endpoint scheme '{}'", other),
    };
    let rest = if rest.contains('/') {
        rest.to_string()
    } else {
        format!("{}{}", rest, RPC_PATH)
    };
    Ok(format!("{}://{}", scheme, rest))
}

/// Convert `/ip4|ip6|dns|dns4|dns6/<host>/tcp/<port>[/http|/https|/ws|/wss]` to a URL.
fn multiaddr_to_url(addr: &str) -> Result<String> {
    let parts: Vec<&str> = addr.trim_start_matches('/').split('/').collect();
    let (proto, host, tcp, port, rest) = match parts.as_slice() {
        [proto, host, tcp, port, rest @ ..] => (*proto, *host, *tcp, *port, rest),
        _ => bail!("unsupported multiaddr '{}'", addr),
    };
    if tcp != "tcp" {
        bail!("multiaddr '{}' must use tcp", addr);
    }
    let port: u16 = port
        .parse()
        .map_err(|e| anyhow!("invalid port in multiaddr '{}': {}", addr, e))?;
    let host = match proto {
        "ip4" | "dns" | "dns4" | "dns6" => host.to_string(),
        "ip6" => format!("[{}]", host),
        other => bail!("unsupported multiaddr protocol '{}'", other),
    };
    let scheme = match rest {
        [] | ["http"] | ["ws"] => "http",
        ["https"] | ["wss"] | ["tls", "ws"] => "https",
        _ => bail!("unsupported multiaddr suffix in '{}'", addr),
    };
    Ok(format!("{}://{}:{}{}", scheme, host, port, RPC_PATH))
}
