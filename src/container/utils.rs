/// Checks whether all bytes in the given slice are lowercase alphanumeric
/// ASCII characters.
///
/// Runtime container ids are lowercase hex, so anything outside
/// `'0'..='9'` / `'a'..='z'` marks a corrupt or truncated list line.
pub(super) fn is_lowercase_alpha_numeric(src: &[u8]) -> bool {
    src.iter()
        .all(|b| b.is_ascii_digit() || b.is_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_lowercase_alpha_numeric() {
        assert!(is_lowercase_alpha_numeric(b"abc123"));
        assert!(!is_lowercase_alpha_numeric(b"abcXYZ123"));
        assert!(!is_lowercase_alpha_numeric(b"abc_123"));
        assert!(is_lowercase_alpha_numeric(b""));
    }
}
