pub mod rdns;
pub mod resolve;

pub use rdns::*;
pub use resolve::*;

/// Sanitize a string for safe terminal display by removing control characters.
///
/// This filters out ASCII control characters (0x00-0x1F, 0x7F) and Unicode control
/// characters that could be used to inject terminal escape sequences.
pub(crate) fn sanitize_display(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_control())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_escapes() {
        assert_eq!(sanitize_display("router\x1b[31m.example"), "router[31m.example");
        assert_eq!(sanitize_display("plain.example"), "plain.example");
    }
}
