/// The canonical URI of a keystore served from `host`.
///
/// The same URI names the invocation target and the root capability of the
/// keystore, so identical inputs always produce byte-identical output.
pub fn keystore_location(host: &str, keystore_id: &str) -> String {
    format!("https://{host}/keystores/{keystore_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_builds_the_canonical_keystore_uri() {
        assert_eq!(
            keystore_location("example.com", "ks-1"),
            "https://example.com/keystores/ks-1"
        );
    }

    #[test]
    fn it_is_deterministic() {
        assert_eq!(
            keystore_location("example.com:8080", "ks-1").as_bytes(),
            keystore_location("example.com:8080", "ks-1").as_bytes()
        );
    }

    #[test]
    fn it_depends_on_both_inputs() {
        let base = keystore_location("example.com", "ks-1");

        assert_ne!(base, keystore_location("example.org", "ks-1"));
        assert_ne!(base, keystore_location("example.com", "ks-2"));
    }
}
