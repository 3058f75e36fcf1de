//! Domain canonicalization (C1).
//!
//! Normalizes a URL or bare host string to a single canonical domain key,
//! the identity used everywhere else in the coordinator.

use crate::CanonError;
use url::Url;

/// Options controlling canonicalization behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalizeOptions {
    /// Reduce the result to its registrable domain (public-suffix + 1).
    pub strip_subdomains: bool,
}

/// Canonicalizes a URL or bare host to a stable domain key.
///
/// Rules, applied in order (spec §4.1):
/// 1. Add `https://` if no scheme is present (only to make URL parsing work).
/// 2. Lowercase the host.
/// 3. Strip default ports (80, 443). Non-default ports are kept: a domain's
///    identity includes a non-default port, so `example.com:8080` and
///    `example.com` are distinct domains in this crate.
/// 4. Strip a single trailing dot.
/// 5. Strip a leading `www.`.
/// 6. Encode internationalized labels to ASCII-compatible form (uts46
///    normalization, then punycode).
/// 7. Optionally reduce to the registrable domain if `strip_subdomains` is set.
///
/// Fails with [`CanonError::Empty`] on empty input and
/// [`CanonError::Unparseable`] when no host can be extracted.
pub fn canonicalize(input: &str, opts: CanonicalizeOptions) -> Result<String, CanonError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CanonError::Empty);
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let url = Url::parse(&with_scheme).map_err(|e| CanonError::Unparseable(e.to_string()))?;
    let host = url
        .host_str()
        .ok_or_else(|| CanonError::Unparseable(trimmed.to_string()))?;

    let mut domain = host.to_lowercase();

    // Strip default ports only; non-default ports stay part of identity.
    if let Some(port) = url.port() {
        if port != 80 && port != 443 {
            domain = format!("{domain}:{port}");
        }
    }

    // Trailing dot applies to the host portion, so strip before any port suffix.
    let (host_part, port_part) = split_port(&domain);
    let host_part = host_part.strip_suffix('.').unwrap_or(host_part);
    let host_part = host_part.strip_prefix("www.").unwrap_or(host_part);

    let ascii_host = idna::domain_to_ascii(host_part)
        .map_err(|_| CanonError::Idna(host_part.to_string()))?;

    domain = match port_part {
        Some(port) => format!("{ascii_host}:{port}"),
        None => ascii_host,
    };

    if opts.strip_subdomains {
        if let Some(registrable) = reduce_to_registrable(&domain) {
            domain = registrable;
        }
    }

    Ok(domain)
}

fn split_port(domain: &str) -> (&str, Option<&str>) {
    match domain.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => (host, Some(port)),
        _ => (domain, None),
    }
}

fn reduce_to_registrable(domain: &str) -> Option<String> {
    let (host_part, port_part) = split_port(domain);
    let registrable = psl::domain(host_part.as_bytes())?;
    let registrable = std::str::from_utf8(registrable.as_bytes()).ok()?.to_string();
    Some(match port_part {
        Some(port) => format!("{registrable}:{port}"),
        None => registrable,
    })
}
