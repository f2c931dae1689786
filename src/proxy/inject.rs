//! HTML response rewriting (spec §4.7 "Response handling"): strip framing
//! headers, rewrite CSP to allow a nonced inline script, and inject that
//! script right after the page's opening tag.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use http::{HeaderMap, HeaderName, HeaderValue};
use rand::RngCore;

const INJECTED_SCRIPT_TEMPLATE: &str = r#"<script nonce="{nonce}">
(function () {
  window.addEventListener("message", function (event) {
    var data = event.data;
    if (!data || typeof data !== "object") return;
    if (data.type === "pinacle-focus" || data.type === "pinacle-source-control-view") {
      window.dispatchEvent(new CustomEvent(data.type, { detail: data }));
    }
  });
  window.addEventListener("keydown", function (event) {
    if (!(event.metaKey || event.ctrlKey)) return;
    var digit = parseInt(event.key, 10);
    if (!(digit >= 1 && digit <= 9)) return;
    window.parent.postMessage({ type: "pinacle-keyboard-shortcut", digit: digit }, "*");
  });
})();
</script>"#;

pub fn random_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    STANDARD_NO_PAD.encode(bytes)
}

/// Strip the headers that prevent the page from being embedded, so the
/// dashboard can iframe pods (spec §4.7 framing rules).
pub fn strip_framing_headers(headers: &mut HeaderMap) {
    headers.remove("cross-origin-opener-policy");
    headers.remove("x-frame-options");
}

/// Rewrite an existing CSP's `script-src` to additionally allow the nonce,
/// or leave the header untouched if there is none.
pub fn rewrite_csp_for_nonce(headers: &mut HeaderMap, nonce: &str) {
    let Some(existing) = headers.get("content-security-policy") else {
        return;
    };
    let Ok(existing) = existing.to_str() else { return };

    let directive = format!("'nonce-{nonce}'");
    let mut directives: Vec<String> = existing.split(';').map(|d| d.trim().to_string()).filter(|d| !d.is_empty()).collect();

    let mut found = false;
    for d in directives.iter_mut() {
        if d.starts_with("script-src") {
            d.push(' ');
            d.push_str(&directive);
            found = true;
        }
    }
    if !found {
        directives.push(format!("script-src {directive}"));
    }

    let rewritten = directives.join("; ");
    if let Ok(value) = HeaderValue::from_str(&rewritten) {
        headers.insert(HeaderName::from_static("content-security-policy"), value);
    }
}

/// Insert the injected script immediately after `<head>`, falling back to
/// `<body>` then `<html>` (spec §4.7 preference order). Returns the
/// original body unmodified if none of the three tags are present. `nonce`
/// must be the same value used to rewrite the response's CSP header.
pub fn inject_script(html: &str, nonce: &str) -> String {
    let script = INJECTED_SCRIPT_TEMPLATE.replace("{nonce}", nonce);

    for tag in ["<head>", "<body>", "<html>"] {
        if let Some(pos) = find_tag_end(html, tag) {
            let mut out = String::with_capacity(html.len() + script.len());
            out.push_str(&html[..pos]);
            out.push_str(&script);
            out.push_str(&html[pos..]);
            return out;
        }
    }
    html.to_string()
}

fn find_tag_end(html: &str, tag: &str) -> Option<usize> {
    let lower = html.to_ascii_lowercase();
    lower.find(tag).map(|idx| idx + tag.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injects_after_head_when_present() {
        let html = "<html><head><title>x</title></head><body></body></html>";
        let injected = inject_script(html, "abc");
        assert!(injected.contains("<head><script"));
    }

    #[test]
    fn falls_back_to_body_then_html() {
        let only_body = "<html><body>hi</body></html>";
        assert!(inject_script(only_body, "abc").contains("<body><script"));

        let only_html = "<html>hi</html>";
        assert!(inject_script(only_html, "abc").contains("<html><script"));
    }

    #[test]
    fn leaves_body_unchanged_without_any_anchor_tag() {
        let plain = "just text, no markup";
        assert_eq!(inject_script(plain, "abc"), plain);
    }

    #[test]
    fn strips_framing_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("cross-origin-opener-policy", HeaderValue::from_static("same-origin"));
        headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
        strip_framing_headers(&mut headers);
        assert!(headers.get("cross-origin-opener-policy").is_none());
        assert!(headers.get("x-frame-options").is_none());
    }

    #[test]
    fn rewrites_existing_script_src_directive() {
        let mut headers = HeaderMap::new();
        headers.insert("content-security-policy", HeaderValue::from_static("default-src 'self'; script-src 'self'"));
        rewrite_csp_for_nonce(&mut headers, "abc123");
        let value = headers.get("content-security-policy").unwrap().to_str().unwrap();
        assert!(value.contains("script-src 'self' 'nonce-abc123'"));
    }

    #[test]
    fn appends_script_src_when_missing_from_policy() {
        let mut headers = HeaderMap::new();
        headers.insert("content-security-policy", HeaderValue::from_static("default-src 'self'"));
        rewrite_csp_for_nonce(&mut headers, "abc123");
        let value = headers.get("content-security-policy").unwrap().to_str().unwrap();
        assert!(value.contains("script-src 'nonce-abc123'"));
    }
}
