//! Filename sanitization for save paths rejected by the download manager.

use std::sync::LazyLock;

use regex::Regex;

/// Characters the download manager refuses in a path component.
static ILLEGAL_CHARS_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r#"[\\/:：*?"<>|]"#));

/// Anything that is not Han, a letter, an ASCII digit, punctuation or whitespace.
static UNRECOGNISED_RE: LazyLock<Regex> =
    LazyLock::new(|| compile_static_regex(r"[^\p{Han}\p{L}0-9\p{P}\s]"));

static WHITESPACE_RUN_RE: LazyLock<Regex> = LazyLock::new(|| compile_static_regex(r"\s+"));

/// Replacement for illegal characters.
const REPLACEMENT: &str = "-";

/// Device names Windows reserves regardless of extension.
const RESERVED_NAMES: &[&str] = &["CON", "PRN", "AUX", "NUL"];

/// Compiles a regex at static init; panics on invalid pattern.
fn compile_static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid static regex '{pattern}': {e}"))
}

/// Sanitizes one path component.
///
/// Illegal characters become `-`, characters that are neither letters,
/// digits, punctuation nor whitespace (emoji, symbols) are dropped,
/// whitespace runs collapse to one space, dots become `_` and the result is
/// trimmed. Reserved device names get a `_` prefix.
#[must_use]
pub fn safe_file_name(value: &str) -> String {
    let replaced = ILLEGAL_CHARS_RE.replace_all(value, REPLACEMENT);
    let recognised = UNRECOGNISED_RE.replace_all(&replaced, "");
    let collapsed = WHITESPACE_RUN_RE.replace_all(&recognised, " ");
    let dotless = collapsed.replace('.', "_");

    let trimmed = dotless.trim();
    if is_reserved_name(trimmed) {
        format!("_{trimmed}")
    } else {
        trimmed.to_string()
    }
}

/// Sanitizes a file name, keeping its last extension intact.
#[must_use]
pub fn safe_file_name_with_extension(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) => format!("{}.{ext}", safe_file_name(stem)),
        None => safe_file_name(file_name),
    }
}

/// Returns true for Windows reserved device names (case-insensitive).
#[must_use]
pub fn is_reserved_name(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    if RESERVED_NAMES.contains(&upper.as_str()) {
        return true;
    }
    let bytes = upper.as_bytes();
    bytes.len() == 4
        && (upper.starts_with("COM") || upper.starts_with("LPT"))
        && matches!(bytes[3], b'1'..=b'9')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_illegal_chars_replaced() {
        assert_eq!(safe_file_name("a/b:c*d?e"), "a-b-c-d-e");
        assert_eq!(safe_file_name("标题：副标题"), "标题-副标题");
    }

    #[test]
    fn test_emoji_and_symbols_dropped() {
        assert_eq!(safe_file_name("hello 😀 world"), "hello world");
        assert_eq!(safe_file_name("price $5 + tax"), "price 5 tax");
    }

    #[test]
    fn test_whitespace_collapsed_and_trimmed() {
        assert_eq!(safe_file_name("  a \n\t b  "), "a b");
    }

    #[test]
    fn test_dots_replaced() {
        assert_eq!(safe_file_name("v1.2.final"), "v1_2_final");
        assert_eq!(safe_file_name(".hidden"), "_hidden");
    }

    #[test]
    fn test_cjk_punctuation_kept() {
        assert_eq!(safe_file_name("你好，世界！"), "你好，世界！");
        assert_eq!(safe_file_name("《书名》"), "《书名》");
    }

    #[test]
    fn test_non_cjk_punctuation_kept() {
        assert_eq!(
            safe_file_name("a\u{060C}b\u{FE4F}c\u{0964}d"),
            "a\u{060C}b\u{FE4F}c\u{0964}d"
        );
        assert_eq!(safe_file_name("«quoted» ¿sí? ¡ya!"), "«quoted» ¿sí- ¡ya!");
        assert_eq!(safe_file_name("Ελληνικά·日本語・テスト"), "Ελληνικά·日本語・テスト");
    }

    #[test]
    fn test_non_letter_alphabetics_dropped() {
        // Roman numeral U+2160 is category Nl, not a letter.
        assert_eq!(safe_file_name("part \u{2160}"), "part");
    }

    #[test]
    fn test_reserved_names_prefixed() {
        assert_eq!(safe_file_name("con"), "_con");
        assert_eq!(safe_file_name("LPT3"), "_LPT3");
        assert_eq!(safe_file_name("COM0"), "COM0");
        assert_eq!(safe_file_name("console"), "console");
    }

    #[test]
    fn test_with_extension_keeps_last_extension() {
        assert_eq!(safe_file_name_with_extension("my.clip 😀.mp4"), "my_clip.mp4");
        assert_eq!(safe_file_name_with_extension("noext"), "noext");
        assert_eq!(safe_file_name_with_extension("a:b.jpeg"), "a-b.jpeg");
    }
}
