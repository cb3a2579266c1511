//! Transclusion boundary filter
//!
//! Pure text transform extracting the portion of a page's raw markup that
//! would actually be substituted when the page is transcluded elsewhere.
//! Three marker families are involved: `<onlyinclude>...</onlyinclude>`
//! selects what is included once any pair is present, `<noinclude>...
//! </noinclude>` spans are dropped entirely, and lone `<includeonly>` /
//! `</includeonly>` tokens are deleted while the text between them is kept.
//!
//! Opening markers match case-insensitively and tolerate trailing
//! whitespace; closing markers are exact, mirroring the upstream parser's
//! asymmetry.

use std::sync::OnceLock;

use regex::Regex;

static ONLYINCLUDE_OPEN: OnceLock<Regex> = OnceLock::new();
static NOINCLUDE_OPEN: OnceLock<Regex> = OnceLock::new();
static INCLUDEONLY_OPEN: OnceLock<Regex> = OnceLock::new();

const ONLYINCLUDE_CLOSE: &str = "</onlyinclude>";
const NOINCLUDE_CLOSE: &str = "</noinclude>";
const INCLUDEONLY_CLOSE: &str = "</includeonly>";

fn onlyinclude_open() -> &'static Regex {
    ONLYINCLUDE_OPEN.get_or_init(|| Regex::new(r"(?i)<onlyinclude\s*/?>").unwrap())
}

fn noinclude_open() -> &'static Regex {
    NOINCLUDE_OPEN.get_or_init(|| Regex::new(r"(?i)<noinclude\s*/?>").unwrap())
}

fn includeonly_open() -> &'static Regex {
    INCLUDEONLY_OPEN.get_or_init(|| Regex::new(r"(?i)<includeonly\s*/?>").unwrap())
}

/// Extract the transcluded body of `raw`.
///
/// With at least one well-formed `<onlyinclude>` pair, only the text inside
/// such pairs survives (each segment individually run through
/// [`strip_exclusions`]); otherwise the whole text is run through
/// [`strip_exclusions`]. Identity on text containing none of the markers.
pub fn extract_transclusion_body(raw: &str) -> String {
    let mut out = String::new();
    let mut rest = raw;
    let mut found_pair = false;

    loop {
        let Some(open) = onlyinclude_open().find(rest) else {
            break;
        };
        let after_open = &rest[open.end()..];
        let Some(close) = after_open.find(ONLYINCLUDE_CLOSE) else {
            // An opening marker without its closer does not count.
            break;
        };
        out.push_str(&strip_exclusions(&after_open[..close]));
        rest = &after_open[close + ONLYINCLUDE_CLOSE.len()..];
        found_pair = true;
    }

    if found_pair {
        out
    } else {
        strip_exclusions(raw)
    }
}

/// Remove every `<noinclude>...</noinclude>` span (an unterminated span
/// extends to the end of the text) and delete lone `<includeonly>` /
/// `</includeonly>` tokens, keeping the text between them.
pub fn strip_exclusions(text: &str) -> String {
    let mut out = String::new();
    let mut rest = text;

    loop {
        let Some(open) = noinclude_open().find(rest) else {
            out.push_str(&strip_includeonly_tokens(rest));
            return out;
        };
        out.push_str(&strip_includeonly_tokens(&rest[..open.start()]));
        let after_open = &rest[open.end()..];
        let Some(close) = after_open.find(NOINCLUDE_CLOSE) else {
            // No closer: the excluded span runs to the end of the text.
            return out;
        };
        rest = &after_open[close + NOINCLUDE_CLOSE.len()..];
    }
}

fn strip_includeonly_tokens(text: &str) -> String {
    let without_open = includeonly_open().replace_all(text, "");
    without_open.replace(INCLUDEONLY_CLOSE, "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_identity_without_markers() {
        let text = "plain {{T|a}} text\nwith lines and {{{p|d}}}";
        assert_eq!(extract_transclusion_body(text), text);
    }

    #[test]
    fn test_onlyinclude_selects_inside() {
        let text = "before<onlyinclude>kept</onlyinclude>after";
        assert_eq!(extract_transclusion_body(text), "kept");
    }

    #[test]
    fn test_multiple_onlyinclude_segments_concatenate() {
        let text = "a<onlyinclude>one</onlyinclude>b<onlyinclude>two</onlyinclude>c";
        assert_eq!(extract_transclusion_body(text), "onetwo");
    }

    #[test]
    fn test_unclosed_onlyinclude_falls_back() {
        let text = "x<onlyinclude>no closer here";
        assert_eq!(extract_transclusion_body(text), text);
    }

    #[test]
    fn test_noinclude_span_removed() {
        assert_eq!(
            extract_transclusion_body("a<noinclude>hidden</noinclude>b"),
            "ab"
        );
    }

    #[test]
    fn test_unterminated_noinclude_discards_to_end() {
        assert_eq!(extract_transclusion_body("a<noinclude>hidden b c"), "a");
    }

    #[test]
    fn test_includeonly_tokens_deleted_content_kept() {
        assert_eq!(
            extract_transclusion_body("a<includeonly>kept</includeonly>b"),
            "akeptb"
        );
    }

    #[test]
    fn test_exclusions_inside_onlyinclude_segment() {
        let text = "out<onlyinclude>in<noinclude>gone</noinclude>cluded</onlyinclude>out";
        assert_eq!(extract_transclusion_body(text), "included");
    }

    #[test]
    fn test_open_markers_case_insensitive() {
        assert_eq!(
            extract_transclusion_body("a<NoInclude>hidden</noinclude>b"),
            "ab"
        );
        assert_eq!(
            extract_transclusion_body("<OnlyInclude>kept</onlyinclude>"),
            "kept"
        );
    }

    #[test]
    fn test_idempotent_on_own_output() {
        let samples = [
            "before<onlyinclude>kept<includeonly>x</includeonly></onlyinclude>after",
            "a<noinclude>h</noinclude>b<noinclude>unterminated",
            "<onlyinclude>one</onlyinclude><onlyinclude>two</onlyinclude>",
            "no markers at all",
        ];
        for s in samples {
            let once = extract_transclusion_body(s);
            assert_eq!(extract_transclusion_body(&once), once, "input: {s}");
        }
    }

    /// Token alphabet for the property tests: whole marker tokens plus text
    /// pieces that cannot combine into a marker across a seam.
    fn token() -> impl Strategy<Value = &'static str> {
        prop_oneof![
            Just("<onlyinclude>"),
            Just("</onlyinclude>"),
            Just("<noinclude>"),
            Just("</noinclude>"),
            Just("<includeonly>"),
            Just("</includeonly>"),
            Just("text "),
            Just("{{T|x=1}}"),
            Just("{{{p|d}}}\n"),
            Just("= plain ="),
        ]
    }

    proptest! {
        #[test]
        fn prop_identity_on_marker_free_text(s in "[a-zA-Z0-9 {}|=\n]*") {
            prop_assert_eq!(extract_transclusion_body(&s), s);
        }

        #[test]
        fn prop_idempotent_over_token_sequences(tokens in prop::collection::vec(token(), 0..24)) {
            let input: String = tokens.concat();
            let once = extract_transclusion_body(&input);
            let twice = extract_transclusion_body(&once);
            prop_assert_eq!(twice, once);
        }
    }
}
