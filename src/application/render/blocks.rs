use once_cell::sync::Lazy;
use regex::Regex;

use super::code::{PreparedText, Segment, prepare};
use super::inline::format_inline;

static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(#{1,6})\s").expect("heading pattern must compile"));
static RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:-{3,}|\*{3,})$").expect("rule pattern must compile"));
static UNORDERED_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*)[*\-]\s(.+)$").expect("unordered item pattern must compile"));
static ORDERED_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*)[0-9]+\.\s(.+)$").expect("ordered item pattern must compile"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Unordered,
    Ordered,
}

impl ListKind {
    fn open_tag(self) -> &'static str {
        match self {
            ListKind::Unordered => "<ul>",
            ListKind::Ordered => "<ol>",
        }
    }

    fn close_tag(self) -> &'static str {
        match self {
            ListKind::Unordered => "</ul>",
            ListKind::Ordered => "</ol>",
        }
    }
}

/// List context carried from one line to the next.
///
/// `depth` counts the list elements currently open, so closing always emits
/// exactly as many end tags as were opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListState {
    Closed,
    Open {
        kind: ListKind,
        indent: usize,
        depth: usize,
    },
}

#[derive(Debug, PartialEq, Eq)]
enum Line<'a> {
    Heading { level: usize, text: &'a str },
    Rule,
    Block(&'a str),
    Item {
        kind: ListKind,
        indent: usize,
        content: &'a str,
    },
    Blank,
    Text(&'a str),
}

/// Convert report markup into an HTML fragment.
///
/// The output is not sanitized; see [`super::sanitize_html`].
pub fn render_markup(text: &str) -> String {
    let prepared = prepare(text);
    let mut out = String::with_capacity(prepared.text.len() + 64);

    let state = prepared
        .text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .map(|line| classify(line, &prepared))
        .fold(ListState::Closed, |state, line| {
            step(state, line, &prepared, &mut out)
        });
    close_lists(state, &mut out);

    prepared.restore(out)
}

fn classify<'a>(line: &'a str, prepared: &'a PreparedText) -> Line<'a> {
    if let Some(marker) = HEADING.captures(line).and_then(|caps| caps.get(1)) {
        let text = &line[marker.end()..];
        let text = text.strip_prefix(char::is_whitespace).unwrap_or(text);
        return Line::Heading {
            level: marker.as_str().len(),
            text,
        };
    }
    if RULE.is_match(line) {
        return Line::Rule;
    }
    if let Some(block) = prepared.block_for_line(line) {
        return Line::Block(block);
    }
    for (kind, pattern) in [
        (ListKind::Unordered, &*UNORDERED_ITEM),
        (ListKind::Ordered, &*ORDERED_ITEM),
    ] {
        if let Some(caps) = pattern.captures(line) {
            let indent = caps.get(1).map_or(0, |m| m.as_str().len());
            let content = caps.get(2).map_or("", |m| m.as_str());
            return Line::Item {
                kind,
                indent,
                content,
            };
        }
    }
    if line.trim().is_empty() {
        return Line::Blank;
    }
    Line::Text(line)
}

fn step(
    state: ListState,
    line: Line<'_>,
    prepared: &PreparedText,
    out: &mut String,
) -> ListState {
    match line {
        Line::Item {
            kind,
            indent,
            content,
        } => {
            let next = enter_item(state, kind, indent, out);
            out.push_str("<li>");
            out.push_str(&format_inline(content));
            out.push_str("</li>");
            next
        }
        Line::Blank => {
            if state == ListState::Closed {
                out.push_str("<br>");
            }
            state
        }
        Line::Heading { level, text } => {
            close_lists(state, out);
            let level = level + 1;
            out.push_str(&format!("<h{level}>{text}</h{level}>"));
            ListState::Closed
        }
        Line::Rule => {
            close_lists(state, out);
            out.push_str("<hr>");
            ListState::Closed
        }
        Line::Block(html) => {
            close_lists(state, out);
            out.push_str(html);
            ListState::Closed
        }
        Line::Text(text) => {
            close_lists(state, out);
            for segment in prepared.split_line(text) {
                match segment {
                    Segment::Text(text) => {
                        out.push_str("<p>");
                        out.push_str(&format_inline(text));
                        out.push_str("</p>");
                    }
                    Segment::Block(html) => out.push_str(html),
                }
            }
            ListState::Closed
        }
    }
}

fn enter_item(state: ListState, kind: ListKind, indent: usize, out: &mut String) -> ListState {
    match state {
        ListState::Open {
            kind: open_kind,
            indent: current,
            depth,
        } if open_kind == kind => {
            if indent > current {
                out.push_str(kind.open_tag());
                ListState::Open {
                    kind,
                    indent,
                    depth: depth + 1,
                }
            } else if indent < current && indent == 0 {
                for _ in 1..depth {
                    out.push_str(kind.close_tag());
                }
                ListState::Open {
                    kind,
                    indent: 0,
                    depth: 1,
                }
            } else {
                state
            }
        }
        other => {
            close_lists(other, out);
            out.push_str(kind.open_tag());
            ListState::Open {
                kind,
                indent,
                depth: 1,
            }
        }
    }
}

fn close_lists(state: ListState, out: &mut String) {
    if let ListState::Open { kind, depth, .. } = state {
        for _ in 0..depth {
            out.push_str(kind.close_tag());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_balanced(html: &str) {
        for tag in ["ul", "ol", "p", "li"] {
            let opened = html.matches(&format!("<{tag}>")).count();
            let closed = html.matches(&format!("</{tag}>")).count();
            assert_eq!(opened, closed, "unbalanced <{tag}> in {html}");
        }
    }

    #[test]
    fn plain_line_becomes_paragraph() {
        assert_eq!(render_markup("hello world"), "<p>hello world</p>");
    }

    #[test]
    fn headings_shift_down_one_level() {
        assert_eq!(render_markup("# Title"), "<h2>Title</h2>");
        assert_eq!(render_markup("### 命盘"), "<h4>命盘</h4>");
        assert_eq!(render_markup("###### Deep"), "<h7>Deep</h7>");
    }

    #[test]
    fn seven_hashes_are_not_a_heading() {
        assert_eq!(render_markup("####### x"), "<p>####### x</p>");
    }

    #[test]
    fn heading_text_is_left_unformatted() {
        assert_eq!(render_markup("## **重点**"), "<h3>**重点**</h3>");
    }

    #[test]
    fn flat_unordered_list() {
        assert_eq!(
            render_markup("- a\n- b\n- c"),
            "<ul><li>a</li><li>b</li><li>c</li></ul>"
        );
        assert_eq!(render_markup("* a\n* b"), "<ul><li>a</li><li>b</li></ul>");
    }

    #[test]
    fn blank_line_inside_list_is_ignored() {
        assert_eq!(
            render_markup("- a\n- b\n\nplain"),
            "<ul><li>a</li><li>b</li></ul><p>plain</p>"
        );
    }

    #[test]
    fn blank_line_outside_list_is_a_break() {
        assert_eq!(render_markup("a\n\nb"), "<p>a</p><br><p>b</p>");
    }

    #[test]
    fn ordered_list_after_unordered_closes_previous() {
        assert_eq!(
            render_markup("- a\n1. b\n2. c"),
            "<ul><li>a</li></ul><ol><li>b</li><li>c</li></ol>"
        );
    }

    #[test]
    fn indented_items_nest_and_return() {
        let html = render_markup("- a\n  - b\n- c");
        assert_eq!(html, "<ul><li>a</li><ul><li>b</li></ul><li>c</li></ul>");
        assert_balanced(&html);
    }

    #[test]
    fn three_levels_close_completely() {
        let html = render_markup("- a\n  - b\n    - c\n- d");
        assert_eq!(
            html,
            "<ul><li>a</li><ul><li>b</li><ul><li>c</li></ul></ul><li>d</li></ul>"
        );
        assert_balanced(&html);
    }

    #[test]
    fn nested_list_open_at_end_is_closed() {
        let html = render_markup("1. a\n   1. b");
        assert_eq!(html, "<ol><li>a</li><ol><li>b</li></ol></ol>");
        assert_balanced(&html);
    }

    #[test]
    fn nested_list_interrupted_by_text_is_closed() {
        let html = render_markup("- a\n  - b\ndone");
        assert_eq!(html, "<ul><li>a</li><ul><li>b</li></ul></ul><p>done</p>");
        assert_balanced(&html);
    }

    #[test]
    fn headings_and_rules_close_lists() {
        assert_eq!(
            render_markup("- a\n## 小结"),
            "<ul><li>a</li></ul><h3>小结</h3>"
        );
        assert_eq!(render_markup("- a\n---"), "<ul><li>a</li></ul><hr>");
    }

    #[test]
    fn rules_accept_dashes_and_stars() {
        assert_eq!(render_markup("---"), "<hr>");
        assert_eq!(render_markup("*****"), "<hr>");
        assert_eq!(render_markup("--"), "<p>--</p>");
    }

    #[test]
    fn inline_formatting_applies_in_paragraphs_and_items() {
        assert_eq!(
            render_markup("**bold** and *italic* and ~~gone~~"),
            "<p><strong>bold</strong> and <em>italic</em> and <del>gone</del></p>"
        );
        assert_eq!(
            render_markup("- __under__ [link](https://example.com)"),
            "<ul><li><u>under</u> <a href=\"https://example.com\" target=\"_blank\">link</a></li></ul>"
        );
    }

    #[test]
    fn fenced_block_stands_alone() {
        assert_eq!(
            render_markup("intro\n```\nlet x = 1;\nlet y = 2;\n```\noutro"),
            "<p>intro</p><div class=\"code-block\">let x = 1;\nlet y = 2;</div><p>outro</p>"
        );
    }

    #[test]
    fn fenced_block_inside_a_line_splits_the_paragraph() {
        let html = render_markup("x ```y``` z");
        assert_eq!(html, "<p>x</p><div class=\"code-block\">y</div><p>z</p>");
        assert_balanced(&html);
    }

    #[test]
    fn inline_code_survives_in_paragraph() {
        assert_eq!(
            render_markup("use `cargo` here"),
            "<p>use <code>cargo</code> here</p>"
        );
    }

    #[test]
    fn carriage_returns_are_stripped() {
        assert_eq!(render_markup("a\r\nb\r\n- c\r"), "<p>a</p><p>b</p><ul><li>c</li></ul>");
    }

    #[test]
    fn entity_glyphs_are_decoded() {
        assert_eq!(
            render_markup("&#10004; 完成 &#8594; 下一步"),
            "<p>✔ 完成 → 下一步</p>"
        );
    }

    #[test]
    fn empty_text_is_single_break() {
        assert_eq!(render_markup(""), "<br>");
    }

    #[test]
    fn mixed_document_stays_balanced() {
        let source = "# 概览\n\n命主日元**甲木**。\n\n- 事业\n  - 稳中求进\n    1. 学习\n- 财运\n1. 第一\n   1. 细项\n---\n结语";
        assert_balanced(&render_markup(source));
    }
}
