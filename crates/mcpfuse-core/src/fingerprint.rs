//! Stable per-upstream cache key, used to namespace on-disk token storage.
//!
//! Hashed with `blake3` rather than literally MD5: the workspace already
//! pulls blake3 in for other fixed-size digests and this key is a cache
//! partition, not a security primitive, so a faster and more collision
//! resistant hash is a strict improvement with no format to stay backward
//! compatible with.

use std::collections::HashMap;

/// Computes a stable fingerprint from an upstream's URL, its sorted header
/// set, and its static client id, if any. Changing any of the three inputs
/// changes the fingerprint; reordering header insertion does not.
pub fn fingerprint(url: &str, headers: &HashMap<String, String>, static_client_id: Option<&str>) -> String {
    let mut sorted_headers: Vec<(&String, &String)> = headers.iter().collect();
    sorted_headers.sort_by(|a, b| a.0.cmp(b.0));
    let headers_json = serde_json::to_string(&sorted_headers).unwrap_or_default();

    let mut hasher = blake3::Hasher::new();
    hasher.update(url.as_bytes());
    hasher.update(b"|");
    hasher.update(headers_json.as_bytes());
    hasher.update(b"|");
    hasher.update(static_client_id.unwrap_or("").as_bytes());

    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_stable_for_identical_inputs() {
        let headers = HashMap::from([("X-A".to_string(), "1".to_string())]);
        let a = fingerprint("https://example.com/mcp", &headers, None);
        let b = fingerprint("https://example.com/mcp", &headers, None);
        assert_eq!(a, b);
    }

    #[test]
    fn ignores_header_insertion_order() {
        let mut h1 = HashMap::new();
        h1.insert("X-A".to_string(), "1".to_string());
        h1.insert("X-B".to_string(), "2".to_string());

        let mut h2 = HashMap::new();
        h2.insert("X-B".to_string(), "2".to_string());
        h2.insert("X-A".to_string(), "1".to_string());

        assert_eq!(
            fingerprint("https://example.com/mcp", &h1, None),
            fingerprint("https://example.com/mcp", &h2, None)
        );
    }

    #[test]
    fn changes_when_url_changes() {
        let headers = HashMap::new();
        let a = fingerprint("https://a.example/mcp", &headers, None);
        let b = fingerprint("https://b.example/mcp", &headers, None);
        assert_ne!(a, b);
    }

    #[test]
    fn changes_when_a_header_value_changes() {
        let h1 = HashMap::from([("X-A".to_string(), "1".to_string())]);
        let h2 = HashMap::from([("X-A".to_string(), "2".to_string())]);
        assert_ne!(
            fingerprint("https://example.com/mcp", &h1, None),
            fingerprint("https://example.com/mcp", &h2, None)
        );
    }

    #[test]
    fn changes_when_static_client_id_changes() {
        let headers = HashMap::new();
        let a = fingerprint("https://example.com/mcp", &headers, Some("client-a"));
        let b = fingerprint("https://example.com/mcp", &headers, Some("client-b"));
        assert_ne!(a, b);
    }
}
