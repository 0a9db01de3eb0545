//! HTML post body to markdown.
//!
//! Mentions come out as `[~~@~~**user**](/user)` and hashtags as
//! `[~~#~~**tag**](/hashtag/tag)`; the render layer rewrites both.

use scraper::{ElementRef, Node};

pub fn to_markdown(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    write_children(element, &mut out);

    let mut text = out.trim().to_string();
    while text.contains("\n\n\n") {
        text = text.replace("\n\n\n", "\n\n");
    }
    text
}

fn write_children(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                if let Some(el) = ElementRef::wrap(child) {
                    write_element(el, out);
                }
            }
            _ => {}
        }
    }
}

fn inner(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    write_children(element, &mut out);
    out
}

fn wrap(element: ElementRef<'_>, marker: &str, out: &mut String) {
    let text = inner(element);
    if text.trim().is_empty() {
        out.push_str(&text);
    } else {
        out.push_str(marker);
        out.push_str(&text);
        out.push_str(marker);
    }
}

fn write_element(element: ElementRef<'_>, out: &mut String) {
    let value = element.value();
    match value.name() {
        "a" => {
            let text = inner(element);
            match value.attr("href") {
                Some(href) if !text.trim().is_empty() => {
                    out.push_str(&format!("[{}]({})", text.trim(), href));
                }
                _ => out.push_str(&text),
            }
        }
        "s" | "strike" | "del" => wrap(element, "~~", out),
        "b" | "strong" => wrap(element, "**", out),
        "i" | "em" => wrap(element, "_", out),
        "img" => {
            let alt = value.attr("alt").unwrap_or_default();
            let is_emoji = value.classes().any(|c| c == "Emoji");
            match value.attr("src") {
                Some(src) if !is_emoji => out.push_str(&format!("![{}]({})", alt, src)),
                _ => out.push_str(alt),
            }
        }
        "br" => out.push('\n'),
        "p" => {
            out.push_str(&inner(element));
            out.push_str("\n\n");
        }
        "script" | "style" => {}
        _ => write_children(element, out),
    }
}
