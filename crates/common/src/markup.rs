//! Markup normalisation and screenshot page assembly

use crate::diff::text::tokenize_markup;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

const INDENT: &str = "  ";

/// Normalise rendered markup so that snapshots diff line by line.
///
/// Every tag goes on its own line, text runs are collapsed to single spaces,
/// and nesting is indented by two spaces. The output is a fixed point:
/// formatting it again returns it unchanged.
pub fn format_markup(html: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut depth = 0usize;
    let mut text = String::new();

    let flush = |text: &mut String, lines: &mut Vec<String>, depth: usize| {
        if !text.is_empty() {
            lines.push(format!("{}{}", INDENT.repeat(depth), text));
            text.clear();
        }
    };

    for token in tokenize_markup(html) {
        if token.starts_with('<') {
            flush(&mut text, &mut lines, depth);
            match tag_role(token) {
                TagRole::Close => {
                    depth = depth.saturating_sub(1);
                    lines.push(format!("{}{}", INDENT.repeat(depth), token));
                }
                TagRole::Open => {
                    lines.push(format!("{}{}", INDENT.repeat(depth), token));
                    depth += 1;
                }
                TagRole::Standalone => {
                    lines.push(format!("{}{}", INDENT.repeat(depth), token));
                }
            }
        } else if !token.trim().is_empty() {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(token);
        }
    }
    flush(&mut text, &mut lines, depth);

    lines.join("\n")
}

enum TagRole {
    Open,
    Close,
    Standalone,
}

fn tag_role(tag: &str) -> TagRole {
    if tag.starts_with("</") {
        return TagRole::Close;
    }
    if tag.starts_with("<!") || tag.starts_with("<?") || tag.ends_with("/>") || !tag.ends_with('>') {
        return TagRole::Standalone;
    }
    let name: String = tag[1..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect::<String>()
        .to_ascii_lowercase();
    if VOID_ELEMENTS.contains(&name.as_str()) {
        TagRole::Standalone
    } else {
        TagRole::Open
    }
}

/// Wrap a snapshot and its style text into a complete HTML document
pub fn build_screenshot_page(markup: Option<&str>, css: Option<&str>) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>{}</style>\n</head>\n<body>{}</body>\n</html>\n",
        css.unwrap_or(""),
        markup.unwrap_or(""),
    )
}

/// Same-origin data URL for an HTML document
pub fn data_url(html: &str) -> String {
    format!("data:text/html;charset=utf-8,{}", urlencoding::encode(html))
}
