//! `Set-Cookie` transforms applied to proxied responses.
//!
//! Order: domain rewrite, then simplify (last same-name cookie wins), then
//! duplication under alternate names.

use crate::project::ServerSettings;

fn is_set_cookie(name: &str) -> bool {
    name.eq_ignore_ascii_case("set-cookie")
}

/// Name part of a `Set-Cookie` value (`name=value; attrs`).
pub fn cookie_name(value: &str) -> &str {
    let pair = value.split(';').next().unwrap_or_default();
    pair.split('=').next().unwrap_or_default().trim()
}

/// Apply the server's cookie settings. `host` is the hostname clients used to
/// reach the mock server.
pub fn transform(
    headers: Vec<(String, String)>,
    settings: &ServerSettings,
    host: Option<&str>,
) -> Vec<(String, String)> {
    let mut headers = headers;
    if settings.rewrite_cookie_domain {
        headers = headers
            .into_iter()
            .map(|(name, value)| {
                if is_set_cookie(&name) {
                    let value = rewrite_domain(&value, host);
                    (name, value)
                } else {
                    (name, value)
                }
            })
            .collect();
    }
    if settings.simplify_cookies {
        headers = simplify(headers);
    }
    if settings.duplicate_cookies.is_enabled() {
        headers = duplicate(headers, settings);
    }
    headers
}

/// Point the `Domain` attribute at `host`, or drop it when the host is unknown
/// so the cookie becomes host-only.
pub fn rewrite_domain(value: &str, host: Option<&str>) -> String {
    let mut parts: Vec<String> = Vec::new();
    for (i, part) in value.split(';').enumerate() {
        let trimmed = part.trim();
        let is_domain = i > 0
            && trimmed
                .split('=')
                .next()
                .is_some_and(|attr| attr.trim().eq_ignore_ascii_case("domain"));
        if !is_domain {
            parts.push(if i == 0 {
                part.to_string()
            } else {
                trimmed.to_string()
            });
            continue;
        }
        if let Some(host) = host {
            parts.push(format!("Domain={host}"));
        }
    }
    parts.join("; ")
}

fn simplify(headers: Vec<(String, String)>) -> Vec<(String, String)> {
    let keep: Vec<bool> = headers
        .iter()
        .enumerate()
        .map(|(i, (name, value))| {
            if !is_set_cookie(name) {
                return true;
            }
            let cookie = cookie_name(value);
            !headers[i + 1..]
                .iter()
                .any(|(n, v)| is_set_cookie(n) && cookie_name(v) == cookie)
        })
        .collect();

    headers
        .into_iter()
        .zip(keep)
        .filter_map(|(header, keep)| keep.then_some(header))
        .collect()
}

fn duplicate(headers: Vec<(String, String)>, settings: &ServerSettings) -> Vec<(String, String)> {
    let mut out = Vec::with_capacity(headers.len());
    for (name, value) in headers {
        if !is_set_cookie(&name) {
            out.push((name, value));
            continue;
        }
        let cookie = cookie_name(&value).to_string();
        let copies: Vec<String> = settings
            .duplicate_cookies
            .alternate_names(&cookie)
            .into_iter()
            .map(|alt| rename(&value, &alt))
            .collect();
        out.push((name.clone(), value));
        for copy in copies {
            out.push((name.clone(), copy));
        }
    }
    out
}

fn rename(value: &str, new_name: &str) -> String {
    match value.split_once('=') {
        Some((_, rest)) => format!("{new_name}={rest}"),
        None => format!("{new_name}="),
    }
}

/// Hostname part of a `Host` header value.
pub fn host_without_port(host: &str) -> &str {
    if host.starts_with('[') {
        // IPv6 literal
        return host.split(']').next().map(|h| &h[1..]).unwrap_or(host);
    }
    host.rsplit_once(':').map(|(h, _)| h).unwrap_or(host)
}
