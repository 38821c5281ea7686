//! Markup to HTML compiler.
//!
//! The markup is deliberately small. Blocks are separated by blank lines, a
//! block starting with `# ` is a heading, everything else is a paragraph, and
//! paragraphs may contain `{key:content}` markers that expand to the element
//! configured for `key`. Markers do not nest: the first `}` always closes.

use crate::rules::{MarkerMap, MarkerSpec, RulesConfig};
use std::borrow::Cow;

const HEADING_PREFIX: &str = "# ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Block<'a> {
    Heading(&'a str),
    Paragraph(&'a str),
}

/// Compiles a whole document. `None` is treated as an empty document.
pub fn compile_to_html_body<'a>(raw: impl Into<Option<&'a str>>, rules: &RulesConfig) -> String {
    let raw = raw.into().unwrap_or_default();
    let normalized = normalize_line_endings(raw);
    let text = normalized.trim();
    if text.is_empty() {
        return String::new();
    }

    segment(text, rules.headings)
        .into_iter()
        .map(|block| match block {
            Block::Heading(title) => render_heading(title),
            Block::Paragraph(body) => render_paragraph(body, rules.markers.as_ref()),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Splits `text` at blank lines and classifies each non-empty piece.
pub fn segment(text: &str, headings: bool) -> Vec<Block<'_>> {
    split_blocks(text)
        .into_iter()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .map(|piece| match piece.strip_prefix(HEADING_PREFIX) {
            Some(title) if headings => Block::Heading(title.trim()),
            _ => Block::Paragraph(piece),
        })
        .collect()
}

pub fn render_heading(title: &str) -> String {
    format!("<h2>{}</h2>", escape_html(title))
}

pub fn render_paragraph(block: &str, markers: Option<&MarkerMap>) -> String {
    let line = collapse_newlines(block);
    let escaped = escape_html(&line);
    format!("<p>{}</p>", expand_markers(&escaped, markers))
}

/// Expands every configured marker, one key at a time in configuration order.
///
/// The content of each marker is escaped again, on top of the escaping the
/// caller already applied to the whole line.
pub fn expand_markers(escaped: &str, markers: Option<&MarkerMap>) -> String {
    let Some(markers) = markers else {
        return escaped.to_string();
    };
    let mut html = escaped.to_string();
    for (key, spec) in markers.iter() {
        html = expand_marker(&html, key, spec);
    }
    html
}

fn expand_marker(text: &str, key: &str, spec: &MarkerSpec) -> String {
    let opener = format!("{{{key}:");
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(&opener) {
        let body_start = start + opener.len();
        match rest[body_start..].find('}') {
            Some(len) if len > 0 => {
                out.push_str(&rest[..start]);
                let content = &rest[body_start..body_start + len];
                push_element(&mut out, spec, &escape_html(content.trim()));
                rest = &rest[body_start + len + 1..];
            }
            Some(_) => {
                // `{key:}` has no content; look again one byte past the brace.
                out.push_str(&rest[..=start]);
                rest = &rest[start + 1..];
            }
            None => break,
        }
    }

    out.push_str(rest);
    out
}

fn push_element(out: &mut String, spec: &MarkerSpec, inner: &str) {
    out.push('<');
    out.push_str(&spec.tag);
    if let Some(class) = &spec.class {
        out.push_str(" class=\"");
        out.push_str(class);
        out.push('"');
    }
    out.push('>');
    out.push_str(inner);
    out.push_str("</");
    out.push_str(&spec.tag);
    out.push('>');
}

pub fn escape_html(input: impl AsRef<str>) -> String {
    let input = input.as_ref();
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(ch),
        }
    }
    out
}

fn normalize_line_endings(input: &str) -> Cow<'_, str> {
    if input.contains("\r\n") {
        Cow::Owned(input.replace("\r\n", "\n"))
    } else {
        Cow::Borrowed(input)
    }
}

/// Splits at every greedy match of `\n\s*\n`.
fn split_blocks(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut search = 0;

    while let Some(offset) = text[search..].find('\n') {
        let newline = search + offset;
        let after = newline + 1;
        let mut last_newline = None;
        for (i, ch) in text[after..].char_indices() {
            if !ch.is_whitespace() {
                break;
            }
            if ch == '\n' {
                last_newline = Some(after + i);
            }
        }
        match last_newline {
            Some(end) => {
                pieces.push(&text[start..newline]);
                start = end + 1;
                search = start;
            }
            None => search = after,
        }
    }

    pieces.push(&text[start..]);
    pieces
}

fn collapse_newlines(block: &str) -> Cow<'_, str> {
    if !block.contains('\n') {
        return Cow::Borrowed(block);
    }
    let mut out = String::with_capacity(block.len());
    let mut in_run = false;
    for ch in block.chars() {
        if ch == '\n' {
            if !in_run {
                out.push(' ');
                in_run = true;
            }
        } else {
            out.push(ch);
            in_run = false;
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::{
        collapse_newlines, compile_to_html_body, escape_html, expand_markers, normalize_line_endings,
        segment, split_blocks, Block,
    };
    use crate::rules::{MarkerMap, MarkerSpec, RulesConfig};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::borrow::Cow;

    fn bold_rules() -> RulesConfig {
        RulesConfig::default().with_marker("b", MarkerSpec::new("strong"))
    }

    #[test]
    fn normalize_line_endings_borrows_lf_input() {
        let normalized = normalize_line_endings("a\nb\n");
        assert!(matches!(normalized, Cow::Borrowed(_)));
    }

    #[test]
    fn normalize_line_endings_only_rewrites_crlf() {
        assert_eq!(normalize_line_endings("a\r\nb\rc\r\n"), "a\nb\rc\n");
    }

    #[rstest]
    #[case("a", vec!["a"])]
    #[case("a\nb", vec!["a\nb"])]
    #[case("a\n\nb", vec!["a", "b"])]
    #[case("a\n  \t\nb", vec!["a", "b"])]
    #[case("a\n\n\n\nb", vec!["a", "b"])]
    #[case("a\n \n \n  b", vec!["a", "  b"])]
    #[case("a  \n\nb", vec!["a  ", "b"])]
    fn split_blocks_on_blank_lines(#[case] input: &str, #[case] expected: Vec<&str>) {
        assert_eq!(split_blocks(input), expected);
    }

    #[test]
    fn segment_classifies_and_drops_empty_pieces() {
        let blocks = segment("# Title\n\n\n\nbody\nmore\n\n#nospace", true);
        assert_eq!(
            blocks,
            vec![
                Block::Heading("Title"),
                Block::Paragraph("body\nmore"),
                Block::Paragraph("#nospace"),
            ]
        );
    }

    #[test]
    fn heading_title_keeps_inner_newlines() {
        assert_eq!(
            segment("#   spaced\nsecond line", true),
            vec![Block::Heading("spaced\nsecond line")]
        );
    }

    #[test]
    fn heading_detection_can_be_disabled() {
        assert_eq!(segment("# Hello", false), vec![Block::Paragraph("# Hello")]);
    }

    #[rstest]
    #[case("", "")]
    #[case("plain", "plain")]
    #[case("a & b", "a &amp; b")]
    #[case("<script>", "&lt;script&gt;")]
    #[case("\"quoted\" 'single'", "&quot;quoted&quot; &#039;single&#039;")]
    #[case("&amp;", "&amp;amp;")]
    fn escape_html_table(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(escape_html(input), expected);
    }

    #[test]
    fn escape_html_leaves_no_raw_special_characters() {
        let escaped = escape_html("&<>\"'&&<<");
        assert!(!escaped.contains(['<', '>', '"', '\'']));
        for (i, _) in escaped.match_indices('&') {
            let tail = &escaped[i..];
            assert!(
                ["&amp;", "&lt;", "&gt;", "&quot;", "&#039;"]
                    .iter()
                    .any(|entity| tail.starts_with(entity)),
                "stray ampersand in {escaped}"
            );
        }
    }

    #[test]
    fn collapse_newlines_merges_runs() {
        assert_eq!(collapse_newlines("a\nb\n\n\nc"), "a b c");
        assert!(matches!(collapse_newlines("one line"), Cow::Borrowed(_)));
    }

    #[test]
    fn expand_markers_without_config_is_identity() {
        assert_eq!(expand_markers("{b:x}", None), "{b:x}");
    }

    #[test]
    fn expand_markers_with_class_and_default_tag() {
        let mut markers = MarkerMap::new();
        markers.insert("ar", MarkerSpec::default().with_class("arabic"));
        assert_eq!(
            expand_markers("say {ar:  مرحبا  } twice {ar:x}", Some(&markers)),
            "say <span class=\"arabic\">مرحبا</span> twice <span class=\"arabic\">x</span>"
        );
    }

    #[test]
    fn expand_markers_leaves_unknown_and_unterminated_spans() {
        let markers = bold_rules().markers;
        assert_eq!(
            expand_markers("{i:x} and {b:open", markers.as_ref()),
            "{i:x} and {b:open"
        );
    }

    #[test]
    fn expand_markers_skips_empty_content() {
        let markers = bold_rules().markers;
        assert_eq!(
            expand_markers("{b:} then {b:y}", markers.as_ref()),
            "{b:} then <strong>y</strong>"
        );
    }

    #[test]
    fn first_closing_brace_ends_the_span() {
        let markers = bold_rules().markers;
        assert_eq!(
            expand_markers("{b:a {b:c} d}", markers.as_ref()),
            "<strong>a {b:c</strong> d}"
        );
    }

    #[test]
    fn keys_expand_in_configuration_order() {
        let rules = RulesConfig::default()
            .with_marker("i", MarkerSpec::new("em"))
            .with_marker("b", MarkerSpec::new("strong"));
        assert_eq!(
            compile_to_html_body("{b:one} {i:two}", &rules),
            "<p><strong>one</strong> <em>two</em></p>"
        );
    }

    #[test]
    fn marker_keys_are_case_sensitive() {
        assert_eq!(
            compile_to_html_body("{B:x} {b:y}", &bold_rules()),
            "<p>{B:x} <strong>y</strong></p>"
        );
    }

    #[test]
    fn markers_are_not_applied_to_headings() {
        assert_eq!(
            compile_to_html_body("# {b:title}", &bold_rules()),
            "<h2>{b:title}</h2>"
        );
    }

    #[test]
    fn markers_still_apply_when_headings_are_off() {
        let rules = bold_rules().with_headings(false);
        assert_eq!(
            compile_to_html_body("# {b:x}", &rules),
            "<p># <strong>x</strong></p>"
        );
    }

    #[test]
    fn marker_content_is_escaped_twice() {
        assert_eq!(
            compile_to_html_body("A & B {b:C&D}", &bold_rules()),
            "<p>A &amp; B <strong>C&amp;amp;D</strong></p>"
        );
    }

    #[test]
    fn none_input_is_empty_document() {
        assert_eq!(compile_to_html_body(None::<&str>, &RulesConfig::default()), "");
    }

    #[test]
    fn crlf_documents_split_like_lf() {
        assert_eq!(
            compile_to_html_body("one\r\ntwo\r\n\r\n# three\r\n", &RulesConfig::default()),
            "<p>one two</p>\n<h2>three</h2>"
        );
    }
}
