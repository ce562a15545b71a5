use regex::Regex;
use std::sync::LazyLock;

static PLAIN_IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

/// Quote an identifier with backticks unless it is a plain word.
pub fn escape_identifier(name: &str) -> String {
    if PLAIN_IDENTIFIER.is_match(name) {
        name.to_string()
    } else {
        format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

/// Single-quoted ClickHouse string literal, for compiler-generated strings only.
pub fn escape_string(s: &str) -> String {
    let escaped = s
        .replace('\\', "\\\\") // Must be first!
        .replace('\'', "\\'")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
        .replace('\0', "\\0");
    format!("'{}'", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_identifiers_are_not_quoted() {
        assert_eq!(escape_identifier("properties___name"), "properties___name");
        assert_eq!(escape_identifier("_timestamp"), "_timestamp");
    }

    #[test]
    fn test_special_identifiers_are_quoted() {
        assert_eq!(escape_identifier("properties___$browser"), "`properties___$browser`");
        assert_eq!(escape_identifier("$group_0"), "`$group_0`");
        assert_eq!(escape_identifier("1abc"), "`1abc`");
        assert_eq!(escape_identifier("a`b"), "`a\\`b`");
    }

    #[test]
    fn test_escape_string() {
        assert_eq!(escape_string(r#"^"|"$"#), r#"'^"|"$'"#);
        assert_eq!(escape_string("it's"), r"'it\'s'");
    }
}
