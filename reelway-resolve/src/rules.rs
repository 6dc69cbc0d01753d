//! Ordered extraction rules.
//!
//! Each table is tried top to bottom and the first match wins. Specific
//! patterns sit above generic fallbacks, so the order of every table is part
//! of its behavior.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::MirrorKind;

/// A single `(matcher, extractor)` pair.
#[derive(Debug)]
pub struct ExtractionRule {
    pub name: &'static str,
    pattern: Regex,
    group: usize,
}

impl ExtractionRule {
    /// Compiles a rule from a constant pattern.
    ///
    /// # Panics
    /// Panics if `pattern` is not a valid regex. Rules are only built from
    /// the literal tables in this module, all of which are forced by
    /// `test_all_tables_compile`.
    fn new(name: &'static str, pattern: &str, group: usize) -> Self {
        let pattern = Regex::new(pattern)
            .unwrap_or_else(|e| panic!("extraction rule {name} has an invalid pattern: {e}"));
        Self {
            name,
            pattern,
            group,
        }
    }

    /// Applies the rule to `body`, returning the unescaped capture.
    pub fn extract(&self, body: &str) -> Option<String> {
        let captures = self.pattern.captures(body)?;
        let value = unescape(captures.get(self.group)?.as_str());
        (!value.is_empty()).then_some(value)
    }
}

/// Returns the first rule in `rules` that matches, with its value.
pub fn first_match<'a>(
    rules: &'a [ExtractionRule],
    body: &str,
) -> Option<(&'a ExtractionRule, String)> {
    rules
        .iter()
        .find_map(|rule| rule.extract(body).map(|value| (rule, value)))
}

/// Undoes the JavaScript and HTML escaping mirrors wrap URLs in.
pub fn unescape(raw: &str) -> String {
    raw.replace("\\/", "/")
        .replace("\\u0026", "&")
        .replace("&amp;", "&")
        .replace("&#038;", "&")
}

/// Media URL rules for a mirror page.
pub static PAGE_RULES: LazyLock<Vec<ExtractionRule>> = LazyLock::new(|| {
    vec![
        ExtractionRule::new(
            "vcdnx-hls-source",
            r#"src="(https://hls[^"]*vcdnx\.com[^"]*)""#,
            1,
        ),
        ExtractionRule::new("m3u8-source", r#"src="([^"]*\.m3u8[^"]*)""#, 1),
        ExtractionRule::new("m3u8-player-file", r#"file:\s*"([^"]*\.m3u8[^"]*)""#, 1),
        ExtractionRule::new(
            "locations-array",
            r#"var\s+locations\s*=\s*\[\s*"([^"]+)""#,
            1,
        ),
    ]
});

/// Playlist rules for an HLS player page.
pub static HLS_GATEWAY_RULES: LazyLock<Vec<ExtractionRule>> = LazyLock::new(|| {
    vec![
        ExtractionRule::new("hls-m3u8-source", r#"src="([^"]*hls[^"]*\.m3u8[^"]*)""#, 1),
        ExtractionRule::new("m3u8-player-file", r#"file:\s*"([^"]*\.m3u8[^"]*)""#, 1),
        ExtractionRule::new("bare-hls-m3u8", r#"https://[^"\s]*hls[^"\s]*\.m3u8[^"\s]*"#, 0),
    ]
});

/// HLS host rule for a vcdn landing page.
pub static VCDN_GATEWAY_RULES: LazyLock<Vec<ExtractionRule>> = LazyLock::new(|| {
    vec![ExtractionRule::new(
        "vcdnx-hls-host",
        r#"src="(https://hls[0-9]*\.vcdnx\.com/hls/[^"]*)""#,
        1,
    )]
});

/// First hyperlink whose target is a magnet URI.
pub static MAGNET_RULE: LazyLock<ExtractionRule> = LazyLock::new(|| {
    ExtractionRule::new("magnet-href", r#"href\s*=\s*["'](magnet:\?[^"']+)["']"#, 1)
});

/// Rules for the second fetch of a gateway mirror.
pub fn gateway_rules(kind: MirrorKind) -> &'static [ExtractionRule] {
    match kind {
        MirrorKind::VcdnGateway => &VCDN_GATEWAY_RULES,
        _ => &HLS_GATEWAY_RULES,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_tables_compile() {
        assert_eq!(PAGE_RULES.len(), 4);
        assert_eq!(HLS_GATEWAY_RULES.len(), 3);
        assert_eq!(VCDN_GATEWAY_RULES.len(), 1);
        assert_eq!(MAGNET_RULE.name, "magnet-href");

        let names: Vec<_> = PAGE_RULES
            .iter()
            .chain(HLS_GATEWAY_RULES.iter())
            .chain(VCDN_GATEWAY_RULES.iter())
            .chain(std::iter::once(&*MAGNET_RULE))
            .map(|rule| rule.name)
            .collect();
        assert!(names.iter().all(|name| !name.is_empty()));
    }

    #[test]
    #[should_panic(expected = "extraction rule broken has an invalid pattern")]
    fn test_invalid_pattern_panics_with_rule_name() {
        ExtractionRule::new("broken", "(unclosed", 1);
    }

    #[test]
    fn test_unescape() {
        assert_eq!(
            unescape(r"https:\/\/cdn.example\/v.m3u8?a=1&b=2&amp;c=3&#038;d=4"),
            "https://cdn.example/v.m3u8?a=1&b=2&c=3&d=4"
        );
    }

    #[test]
    fn test_m3u8_source_beats_locations_array() {
        let body = r#"
            <script>var locations = ["https:\/\/vcdnlare.com\/v\/abc"];</script>
            <video><source src="https://cdn.example/movie/index.m3u8"></video>
        "#;
        let (rule, url) = first_match(&PAGE_RULES, body).unwrap();
        assert_eq!(rule.name, "m3u8-source");
        assert_eq!(url, "https://cdn.example/movie/index.m3u8");
    }

    #[test]
    fn test_vcdnx_source_is_most_specific() {
        let body = r#"
            <source src="https://other.example/alt.m3u8">
            <iframe src="https://hls2.vcdnx.com/hls/abc/index.m3u8"></iframe>
        "#;
        let (rule, url) = first_match(&PAGE_RULES, body).unwrap();
        assert_eq!(rule.name, "vcdnx-hls-source");
        assert_eq!(url, "https://hls2.vcdnx.com/hls/abc/index.m3u8");
    }

    #[test]
    fn test_player_file_rule() {
        let body = r#"jwplayer("p").setup({ file:"https:\/\/cdn.example\/x\/master.m3u8", autostart: true });"#;
        let (rule, url) = first_match(&PAGE_RULES, body).unwrap();
        assert_eq!(rule.name, "m3u8-player-file");
        assert_eq!(url, "https://cdn.example/x/master.m3u8");
    }

    #[test]
    fn test_locations_array_fallback() {
        let body = r#"<script>var locations = ["https:\/\/streamtape.com\/e\/xyz","https:\/\/other"];</script>"#;
        let (rule, url) = first_match(&PAGE_RULES, body).unwrap();
        assert_eq!(rule.name, "locations-array");
        assert_eq!(url, "https://streamtape.com/e/xyz");
    }

    #[test]
    fn test_no_page_rule_matches_plain_html() {
        assert!(first_match(&PAGE_RULES, "<html><body>nothing</body></html>").is_none());
    }

    #[test]
    fn test_bare_hls_gateway_rule_uses_whole_match() {
        let body = "playlist at https://edge.example/hls/abc/index.m3u8 end";
        let (rule, url) = first_match(&HLS_GATEWAY_RULES, body).unwrap();
        assert_eq!(rule.name, "bare-hls-m3u8");
        assert_eq!(url, "https://edge.example/hls/abc/index.m3u8");
    }

    #[test]
    fn test_magnet_rule_unescapes_entities() {
        let body = r#"<a class="mv_button_css" href="magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567&amp;dn=Film&#038;tr=udp%3A%2F%2Ftracker">Magnet</a>"#;
        assert_eq!(
            MAGNET_RULE.extract(body).unwrap(),
            "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567&dn=Film&tr=udp%3A%2F%2Ftracker"
        );
    }

    #[test]
    fn test_magnet_rule_ignores_other_links() {
        assert!(MAGNET_RULE.extract(r#"<a href="https://example.com">x</a>"#).is_none());
    }
}
