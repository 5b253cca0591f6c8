use std::collections::HashSet;

use ammonia::Builder as AmmoniaBuilder;
use once_cell::sync::Lazy;

static REPORT_SANITIZER: Lazy<AmmoniaBuilder<'static>> = Lazy::new(build_report_sanitizer);

fn build_report_sanitizer() -> AmmoniaBuilder<'static> {
    let mut builder = AmmoniaBuilder::default();

    let tags: HashSet<&'static str> = HashSet::from([
        "a", "br", "code", "del", "div", "em", "h1", "h2", "h3", "h4", "h5", "h6", "h7", "hr",
        "li", "ol", "p", "strong", "u", "ul",
    ]);
    builder.tags(tags);
    builder.add_tag_attributes("a", &["target"]);
    builder.add_tag_attributes("div", &["class"]);
    builder.add_url_schemes(["http", "https", "mailto", "tel"].iter().copied());

    builder
}

/// Strip anything the report renderer would never produce itself.
pub fn sanitize_html(html: &str) -> String {
    REPORT_SANITIZER.clean(html).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renderer_output_passes_through() {
        let html = "<h2>标题</h2><ul><li><strong>a</strong></li></ul><hr><br>";
        assert_eq!(sanitize_html(html), html);
    }

    #[test]
    fn scripts_and_handlers_are_removed() {
        let cleaned = sanitize_html("<p onclick=\"x()\">hi<script>alert(1)</script></p>");
        assert_eq!(cleaned, "<p>hi</p>");
    }

    #[test]
    fn javascript_links_lose_href() {
        let cleaned = sanitize_html("<a href=\"javascript:alert(1)\" target=\"_blank\">x</a>");
        assert!(!cleaned.contains("javascript:"));
        assert!(cleaned.contains("target=\"_blank\""));
    }

    #[test]
    fn code_block_class_is_kept() {
        let html = "<div class=\"code-block\">x</div>";
        assert_eq!(sanitize_html(html), html);
    }
}
