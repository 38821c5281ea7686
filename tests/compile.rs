use pagesmith::preset::Preset;
use pagesmith::template::render_page;
use pagesmith::{compile_to_html_body, escape_html, MarkerSpec, RulesConfig};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn bold_rules() -> RulesConfig {
    RulesConfig::default().with_marker("b", MarkerSpec::new("strong"))
}

#[test]
fn heading_and_paragraph_with_marker() {
    let html = compile_to_html_body("# Title\n\nHello {b:world}", &bold_rules());
    assert_eq!(html, "<h2>Title</h2>\n<p>Hello <strong>world</strong></p>");
}

#[test]
fn crlf_input_compiles_like_lf() {
    let rules = bold_rules();
    let lf = compile_to_html_body("# A\n\none\ntwo\n\n{b:x}", &rules);
    let crlf = compile_to_html_body("# A\r\n\r\none\r\ntwo\r\n\r\n{b:x}", &rules);
    assert_eq!(lf, crlf);
}

#[test]
fn headings_can_be_switched_off() {
    let rules = RulesConfig::default().with_headings(false);
    assert_eq!(compile_to_html_body("# Title", &rules), "<p># Title</p>");
}

#[test]
fn marker_content_is_escaped_twice() {
    let html = compile_to_html_body("A & B {b:C&D}", &bold_rules());
    assert_eq!(html, "<p>A &amp; B <strong>C&amp;amp;D</strong></p>");
}

#[rstest]
#[case("")]
#[case("   \n\n \t ")]
#[case("\r\n\r\n")]
fn blank_documents_compile_to_nothing(#[case] raw: &str) {
    assert_eq!(compile_to_html_body(raw, &bold_rules()), "");
}

#[rstest]
#[case::unknown_key("{x:y}", "<p>{x:y}</p>")]
#[case::empty_content("{b:}", "<p>{b:}</p>")]
#[case::unclosed("{b:abc", "<p>{b:abc</p>")]
#[case::trimmed_content("{b:  hi  }", "<p><strong>hi</strong></p>")]
#[case::first_brace_closes("{b:x} y}", "<p><strong>x</strong> y}</p>")]
fn marker_edge_cases(#[case] raw: &str, #[case] expected: &str) {
    assert_eq!(compile_to_html_body(raw, &bold_rules()), expected);
}

#[test]
fn later_markers_see_earlier_output() {
    let rules = RulesConfig::default()
        .with_marker("b", MarkerSpec::new("strong"))
        .with_marker("i", MarkerSpec::new("em"));
    let html = compile_to_html_body("{i:{b:x}}", &rules);
    assert_eq!(html, "<p><em>&lt;strong&gt;x&lt;/strong&gt;</em></p>");
}

#[test]
fn lenient_rules_from_json() {
    let rules = RulesConfig::from_json_str(
        r#"{"headings": "no", "markers": {"b": {"tag": "strong"}, "n": {"class": "note"}, "z": 3}}"#,
    )
    .unwrap();
    assert!(rules.headings);
    let html = compile_to_html_body("# T\n\n{n:aside} {z:zed} {b:bold}", &rules);
    assert_eq!(
        html,
        "<h2>T</h2>\n<p><span class=\"note\">aside</span> <span>zed</span> <strong>bold</strong></p>"
    );
}

#[test]
fn escaper_covers_all_five_characters() {
    assert_eq!(escape_html(r#"<a href="x">'&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&#039;&amp;&#039;&lt;/a&gt;");
}

#[test]
fn builtin_preset_renders_a_full_page() {
    let preset = Preset::builtin().unwrap();
    let page = render_page(&preset, "  ", preset.default_content());
    assert!(page.contains("<title>Page</title>"));
    assert!(page.contains("<h2>Welcome</h2>"));
    assert!(page.contains("<strong>bold</strong>"));
    assert!(page.contains("<span class=\"arabic\">مرحبا</span>"));
    assert!(!page.contains("{{content}}"));
}
