use once_cell::sync::Lazy;
use regex::Regex;

/// Numeric entities the backend emits for list glyphs.
const GLYPHS: [(&str, &str); 4] = [
    ("&#10004;", "✔"),
    ("&#9642;", "▪"),
    ("&#9679;", "●"),
    ("&#8594;", "→"),
];

static STRONG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("strong pattern must compile"));
static EMPHASIS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*(.*?)\*").expect("emphasis pattern must compile"));
static UNDERLINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"__(.*?)__").expect("underline pattern must compile"));
static STRIKE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"~~(.*?)~~").expect("strike pattern must compile"));
static LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(.*?)\]\((.*?)\)").expect("link pattern must compile"));

/// Apply span-level formatting to a single line.
///
/// Rules run in a fixed order, each over the output of the previous one.
pub fn format_inline(text: &str) -> String {
    let decoded = GLYPHS
        .iter()
        .fold(text.to_string(), |acc, (entity, glyph)| acc.replace(entity, glyph));

    let rules: [(&Lazy<Regex>, &str); 5] = [
        (&STRONG, "<strong>${1}</strong>"),
        (&EMPHASIS, "<em>${1}</em>"),
        (&UNDERLINE, "<u>${1}</u>"),
        (&STRIKE, "<del>${1}</del>"),
        (&LINK, "<a href=\"${2}\" target=\"_blank\">${1}</a>"),
    ];

    rules.iter().fold(decoded, |acc, (pattern, replacement)| {
        pattern.replace_all(&acc, *replacement).into_owned()
    })
}
