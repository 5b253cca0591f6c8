use std::{cell::RefCell, rc::Rc};

use lol_html::{RewriteStrSettings, doc_text, element, rewrite_str};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::warn;

static CHARACTER_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]+);")
        .expect("character reference pattern must compile")
});

const LINE_BREAKING: &str = "br, p, li, hr, div, ul, ol, h1, h2, h3, h4, h5, h6, h7";

/// Flatten a rendered fragment into plain text, one line per block element.
///
/// Character references are decoded, so the result reads the way the fragment
/// does in a browser.
pub fn to_plain_text(html: &str) -> String {
    let flattened = match collect_text(html) {
        Ok(raw) => decode_references(&raw),
        Err(err) => {
            warn!(
                target = "bazi_coach::application::render",
                error = %err,
                "failed to flatten report html; copying it unchanged"
            );
            html.to_string()
        }
    };

    flattened
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_text(html: &str) -> Result<String, lol_html::errors::RewritingError> {
    let buffer = Rc::new(RefCell::new(String::with_capacity(html.len())));

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!(LINE_BREAKING, {
                let buffer = Rc::clone(&buffer);
                move |_el| {
                    buffer.borrow_mut().push('\n');
                    Ok(())
                }
            })],
            document_content_handlers: vec![doc_text!({
                let buffer = Rc::clone(&buffer);
                move |chunk| {
                    buffer.borrow_mut().push_str(chunk.as_str());
                    Ok(())
                }
            })],
            ..RewriteStrSettings::default()
        },
    )?;

    let collected = buffer.borrow().clone();
    Ok(collected)
}

fn decode_references(text: &str) -> String {
    CHARACTER_REFERENCE
        .replace_all(text, |caps: &Captures<'_>| {
            let name = &caps[1];
            let decoded = match name.strip_prefix('#') {
                Some(number) => numeric_reference(number),
                None => named_reference(name),
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

fn numeric_reference(number: &str) -> Option<char> {
    let code = match number.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => number.parse::<u32>().ok()?,
    };
    char::from_u32(code)
}

fn named_reference(name: &str) -> Option<char> {
    let ch = match name {
        "lt" => '<',
        "gt" => '>',
        "amp" => '&',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{A0}',
        "middot" => '·',
        "hellip" => '…',
        "rarr" => '→',
        "larr" => '←',
        "times" => '×',
        "copy" => '©',
        _ => return None,
    };
    Some(ch)
}
