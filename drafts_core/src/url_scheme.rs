// src/url_scheme.rs
// Construction of drafts://x-callback-url/... invocation URLs.

use crate::callback::CallbackUrls;

pub const URL_SCHEME: &str = "drafts";

/// Percent-encode a parameter value for the Drafts URL parser.
///
/// Drafts rejects `! ' ( ) *` even though JavaScript-style encoders leave
/// them bare, so those are escaped explicitly on top of the standard pass.
/// (`urlencoding` already covers them; the explicit pass pins the contract
/// against encoder changes.)
pub fn encode_param(value: &str) -> String {
    let encoded = urlencoding::encode(value);
    let mut out = String::with_capacity(encoded.len());
    for c in encoded.chars() {
        match c {
            '!' => out.push_str("%21"),
            '\'' => out.push_str("%27"),
            '(' => out.push_str("%28"),
            ')' => out.push_str("%29"),
            '*' => out.push_str("%2A"),
            _ => out.push(c),
        }
    }
    out
}

/// Build the full invocation URL for one endpoint: declared parameters first,
/// then the three callback URLs.
pub fn build_invocation_url(
    endpoint: &str,
    params: &[(String, String)],
    urls: &CallbackUrls,
) -> String {
    let mut query: Vec<String> = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, encode_param(v)))
        .collect();
    query.push(format!("x-success={}", encode_param(&urls.success)));
    query.push(format!("x-error={}", encode_param(&urls.error)));
    query.push(format!("x-cancel={}", encode_param(&urls.cancel)));

    format!(
        "{}://x-callback-url/{}?{}",
        URL_SCHEME,
        endpoint,
        query.join("&")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_strict_characters() {
        let encoded = encode_param("a!b'c(d)e*f");
        assert_eq!(encoded, "a%21b%27c%28d%29e%2Af");
        assert!(!encoded.contains('!'));
        assert!(!encoded.contains('\''));
        assert!(!encoded.contains('('));
        assert!(!encoded.contains(')'));
        assert!(!encoded.contains('*'));
    }

    #[test]
    fn encodes_spaces_and_newlines() {
        assert_eq!(encode_param("hello world"), "hello%20world");
        assert_eq!(encode_param("line1\nline2"), "line1%0Aline2");
    }

    #[test]
    fn builds_invocation_url() {
        let urls = CallbackUrls {
            success: "http://localhost:8080/x-success/id-1".to_string(),
            error: "http://localhost:8080/x-error/id-1".to_string(),
            cancel: "http://localhost:8080/x-cancel/id-1".to_string(),
        };
        let url = build_invocation_url(
            "create",
            &[("text".to_string(), "hello world".to_string())],
            &urls,
        );
        assert!(url.starts_with("drafts://x-callback-url/create?text=hello%20world"));
        assert!(url.contains("x-success=http%3A%2F%2Flocalhost%3A8080%2Fx-success%2Fid-1"));
        assert!(url.contains("x-error="));
        assert!(url.contains("x-cancel="));
    }
}
