//! Host identity normalization.
//!
//! Turns a raw host identifier into a `HostKey`: reverse-resolve to a name
//! when possible, strip the domain suffix, uppercase. Resolution failure is
//! never fatal; the raw input is used instead.

use std::io;
use std::net::IpAddr;

use async_trait::async_trait;
use licscan_core::types::host_label;
use licscan_core::{CoreError, HostKey};

/// Maps a host identifier to its canonical name.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn canonical_name(&self, raw: &str) -> io::Result<String>;
}

/// Resolver backed by the operating system's name service.
///
/// An address is reverse-resolved directly. A name is forward-resolved and
/// its first address reverse-resolved, which yields the canonical name the
/// same way `gethostbyaddr` does.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn canonical_name(&self, raw: &str) -> io::Result<String> {
        let raw = raw.to_string();
        tokio::task::spawn_blocking(move || reverse_lookup(&raw))
            .await
            .map_err(io::Error::other)?
    }
}

fn reverse_lookup(raw: &str) -> io::Result<String> {
    let addr = match raw.parse::<IpAddr>() {
        Ok(addr) => addr,
        Err(_) => dns_lookup::lookup_host(raw)?
            .into_iter()
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address for host"))?,
    };
    dns_lookup::lookup_addr(&addr)
}

/// A normalized host: the key plus the name used to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHost {
    pub key: HostKey,
    /// Domain-stripped name in its original case, used for ping and dispatch.
    pub name: String,
}

/// Normalize a raw host identifier.
///
/// Fails only for blank input.
pub async fn normalize(resolver: &dyn Resolver, raw: &str) -> Result<ResolvedHost, CoreError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(CoreError::BlankHost);
    }

    let resolved = match resolver.canonical_name(raw).await {
        Ok(name) if !name.trim().is_empty() => name.trim().to_string(),
        Ok(_) => {
            tracing::warn!(
                host = %raw,
                error = "empty name",
                "Could not resolve hostname, using input"
            );
            raw.to_string()
        }
        Err(e) => {
            tracing::warn!(host = %raw, error = %e, "Could not resolve hostname, using input");
            raw.to_string()
        }
    };

    let key = HostKey::from_name(&resolved)?;
    let name = host_label(&resolved).to_string();

    Ok(ResolvedHost { key, name })
}
