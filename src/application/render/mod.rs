//! Report markup rendering.
//!
//! The backend returns loosely Markdown-flavoured text. Rendering happens in two
//! passes: code spans and fenced blocks are lifted out first, then a line scanner
//! builds block elements while tracking open lists. The pipeline is pure; the
//! sanitizer stage is applied separately by callers that emit HTML to a browser.

mod blocks;
mod code;
mod inline;
mod sanitize;
mod text;

pub use blocks::render_markup;
pub use inline::format_inline;
pub use sanitize::sanitize_html;
pub use text::to_plain_text;

/// Paragraph shown in place of a section the backend left empty.
pub const EMPTY_SECTION_HTML: &str = "<p>无法生成内容，请稍后再试。</p>";

/// Render one report section, substituting a notice for absent content.
pub fn render_section(content: Option<&str>) -> String {
    match content {
        Some(text) if !text.is_empty() => render_markup(text),
        _ => EMPTY_SECTION_HTML.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_or_empty_sections_render_notice() {
        assert_eq!(render_section(None), EMPTY_SECTION_HTML);
        assert_eq!(render_section(Some("")), EMPTY_SECTION_HTML);
    }

    #[test]
    fn present_sections_use_markup_renderer() {
        assert_eq!(render_section(Some("命盘")), "<p>命盘</p>");
    }
}
