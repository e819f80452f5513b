use std::net::IpAddr;

/// Proxy headers consulted for the client address, highest priority first.
pub const CLIENT_IP_HEADERS: [&str; 4] =
    ["x-forwarded-for", "x-real-ip", "cf-connecting-ip", "true-client-ip"];

const MAX_IDENTITY_LEN: usize = 64;

/// Identity used when nothing usable was supplied.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Derives the rate-limit identity for a request.
///
/// Takes the first non-empty value among [`CLIENT_IP_HEADERS`] (only the first hop of
/// `x-forwarded-for`), then the socket peer, then `"unknown"`. The result is restricted to
/// `[0-9A-Za-z.:_-]` and at most 64 characters so it is safe inside a store key.
///
/// ```
/// use marketgate_core::middleware::client_ip::extract_client_ip;
///
/// let headers = [("X-Forwarded-For", "203.0.113.7, 10.0.0.1")];
/// assert_eq!(extract_client_ip(headers, None), "203.0.113.7");
/// assert_eq!(extract_client_ip(Vec::<(&str, &str)>::new(), None), "unknown");
/// ```
pub fn extract_client_ip<'a, I>(headers: I, peer: Option<IpAddr>) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut found: [Option<&str>; CLIENT_IP_HEADERS.len()] = [None; CLIENT_IP_HEADERS.len()];

    for (name, value) in headers {
        let Some(slot) = CLIENT_IP_HEADERS.iter().position(|h| name.eq_ignore_ascii_case(h))
        else {
            continue;
        };

        let candidate = if slot == 0 { value.split(',').next().unwrap_or("") } else { value };
        let candidate = candidate.trim();

        if found[slot].is_none() && !candidate.is_empty() {
            found[slot] = Some(candidate);
        }
    }

    let raw = found
        .into_iter()
        .flatten()
        .map(sanitize)
        .find(|s| !s.is_empty())
        .or_else(|| peer.map(|ip| sanitize(&ip.to_string())));

    match raw {
        Some(identity) if !identity.is_empty() => identity,
        _ => UNKNOWN_CLIENT.to_string(),
    }
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | ':' | '_' | '-'))
        .take(MAX_IDENTITY_LEN)
        .collect()
}
