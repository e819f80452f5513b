use url::Url;

const MASK: &str = "****";
const MIN_SECRET_LEN: usize = 24;

/// Masks credentials in an RPC URL so it can be logged.
///
/// Userinfo becomes `****` and any path or query segment that looks like an API key
/// (24+ token characters) is replaced as well. Unparseable input is fully masked.
#[must_use]
pub fn redact_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }

    let Ok(mut url) = Url::parse(raw) else {
        return "(masked)".to_string();
    };

    if !url.username().is_empty() || url.password().is_some() {
        let _ = url.set_username(MASK);
        let _ = url.set_password(None);
    }

    let path = mask_tokens(url.path());
    url.set_path(&path);

    if let Some(query) = url.query().map(mask_tokens) {
        url.set_query(Some(&query));
    }

    url.to_string()
}

/// Conservative scrub for free-form error text: URL userinfo and long tokens.
#[must_use]
pub fn redact_secrets(raw: &str) -> String {
    raw.split(' ')
        .map(|word| {
            if word.contains("://") {
                redact_url(word)
            } else {
                mask_tokens(word)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn mask_tokens(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut token = String::new();

    let flush = |token: &mut String, out: &mut String| {
        if token.len() >= MIN_SECRET_LEN {
            out.push_str(MASK);
        } else {
            out.push_str(token);
        }
        token.clear();
    };

    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
            token.push(ch);
        } else {
            flush(&mut token, &mut out);
            out.push(ch);
        }
    }
    flush(&mut token, &mut out);

    out
}
