use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(.*?)```").expect("fenced block pattern must compile"));
static INLINE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"`([^`]+)`").expect("inline code pattern must compile"));
static EMBEDDED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("{PLACEHOLDER_MARK}([0-9]+){PLACEHOLDER_MARK}"))
        .expect("placeholder pattern must compile")
});

const PLACEHOLDER_MARK: char = '\u{1A}';

/// A run of a text line: either plain text or a lifted block.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum Segment<'a> {
    Text(&'a str),
    Block(&'a str),
}

/// Text with fenced blocks lifted out behind placeholders and inline code wrapped.
pub(super) struct PreparedText {
    pub text: String,
    pub blocks: Vec<String>,
}

impl PreparedText {
    /// HTML for a line that consists of nothing but a block placeholder.
    pub fn block_for_line(&self, line: &str) -> Option<&str> {
        let inner = line
            .trim()
            .strip_prefix(PLACEHOLDER_MARK)?
            .strip_suffix(PLACEHOLDER_MARK)?;
        let index: usize = inner.parse().ok()?;
        self.blocks.get(index).map(String::as_str)
    }

    /// Split a text line at embedded blocks so none of them lands inside a paragraph.
    ///
    /// Whitespace next to a block is dropped, and so are text runs left empty.
    pub fn split_line<'a>(&'a self, line: &'a str) -> Vec<Segment<'a>> {
        let mut segments = Vec::new();
        let mut rest_start = 0;

        for caps in EMBEDDED_BLOCK.captures_iter(line) {
            let (Some(whole), Some(block)) = (
                caps.get(0),
                caps[1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| self.blocks.get(index)),
            ) else {
                continue;
            };
            let before = &line[rest_start..whole.start()];
            let before = if rest_start == 0 {
                before.trim_end()
            } else {
                before.trim()
            };
            if !before.is_empty() {
                segments.push(Segment::Text(before));
            }
            segments.push(Segment::Block(block));
            rest_start = whole.end();
        }

        let tail = &line[rest_start..];
        let tail = if rest_start == 0 { tail } else { tail.trim_start() };
        if !tail.is_empty() {
            segments.push(Segment::Text(tail));
        }
        segments
    }

    /// Put any placeholders that ended up inside other markup back in place.
    pub fn restore(&self, html: String) -> String {
        if self.blocks.is_empty() {
            return html;
        }
        self.blocks
            .iter()
            .enumerate()
            .fold(html, |acc, (index, block)| {
                acc.replace(&placeholder(index), block)
            })
    }
}

pub(super) fn prepare(text: &str) -> PreparedText {
    let mut blocks = Vec::new();
    let lifted = FENCED_BLOCK.replace_all(text, |caps: &Captures<'_>| {
        let index = blocks.len();
        blocks.push(format!(
            "<div class=\"code-block\">{}</div>",
            caps[1].trim()
        ));
        placeholder(index)
    });
    let text = INLINE_CODE
        .replace_all(&lifted, "<code>${1}</code>")
        .into_owned();

    PreparedText { text, blocks }
}

fn placeholder(index: usize) -> String {
    format!("{PLACEHOLDER_MARK}{index}{PLACEHOLDER_MARK}")
}
