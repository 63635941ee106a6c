use sha2::{Digest, Sha256};

/// Hashes `(name, bytes)` sources in the order given; callers sort by name first.
pub(crate) fn hash_named_sources<'a>(sources: impl IntoIterator<Item = (&'a str, &'a [u8])>) -> String {
    let mut hasher = Sha256::new();
    for (name, bytes) in sources {
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(bytes);
        hasher.update([0u8]);
    }
    to_hex_lower(&hasher.finalize())
}

fn to_hex_lower(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        use std::fmt::Write as _;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_lower_hex_sha256() {
        let hash = hash_named_sources([("defs.xml", b"<Defs/>".as_slice())]);
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn hash_changes_on_name_content_or_order() {
        let a = hash_named_sources([("a.xml", b"<Defs/>".as_slice()), ("b.xml", b"<Defs/>".as_slice())]);
        let renamed =
            hash_named_sources([("a.xml", b"<Defs/>".as_slice()), ("c.xml", b"<Defs/>".as_slice())]);
        let edited =
            hash_named_sources([("a.xml", b"<Defs/>".as_slice()), ("b.xml", b"<Defs></Defs>".as_slice())]);
        let reordered =
            hash_named_sources([("b.xml", b"<Defs/>".as_slice()), ("a.xml", b"<Defs/>".as_slice())]);
        assert_ne!(a, renamed);
        assert_ne!(a, edited);
        assert_ne!(a, reordered);
        assert_eq!(
            a,
            hash_named_sources([("a.xml", b"<Defs/>".as_slice()), ("b.xml", b"<Defs/>".as_slice())])
        );
    }
}
