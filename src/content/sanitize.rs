use regex::Regex;
use scraper::{ElementRef, Html, Node};
use std::sync::OnceLock;

use crate::util::escape_html;

fn excess_newlines() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("static regex"))
}

/// Reduce arbitrary feed HTML to the subset Telegram accepts.
///
/// Kept: `b`, `i`, `u`, `s`, `code`, `pre` and `a` with an http(s) `href`
/// (`strong`/`em`/`ins`/`del`/`strike` are mapped onto them). Block elements
/// become line breaks, list items get a bullet, scripts, styles and media are
/// dropped, and all text is escaped.
pub fn sanitize_html(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::with_capacity(html.len());
    walk_children(fragment.root_element(), &mut out);

    let collapsed = excess_newlines().replace_all(&out, "\n\n");
    collapsed.trim().to_string()
}

/// Text content of an HTML snippet with every tag removed. Entities are decoded.
pub fn strip_tags(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    fragment.root_element().text().collect()
}

fn walk_children(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&escape_html(text)),
            Node::Element(_) => {
                if let Some(el) = ElementRef::wrap(child) {
                    walk_element(el, out);
                }
            }
            _ => {}
        }
    }
}

fn wrap(tag: &str, element: ElementRef<'_>, out: &mut String) {
    out.push('<');
    out.push_str(tag);
    out.push('>');
    walk_children(element, out);
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

fn walk_element(element: ElementRef<'_>, out: &mut String) {
    match element.value().name() {
        "b" | "strong" => wrap("b", element, out),
        "i" | "em" => wrap("i", element, out),
        "u" | "ins" => wrap("u", element, out),
        "s" | "strike" | "del" => wrap("s", element, out),
        "code" | "pre" => {
            // Telegram rejects formatting nested inside code blocks
            let tag = element.value().name();
            let text: String = element.text().collect();
            out.push_str(&format!("<{tag}>{}</{tag}>", escape_html(&text)));
        }
        "a" => match element.value().attr("href") {
            Some(href) if href.starts_with("http://") || href.starts_with("https://") => {
                out.push_str(&format!("<a href=\"{}\">", escape_html(href)));
                walk_children(element, out);
                out.push_str("</a>");
            }
            _ => walk_children(element, out),
        },
        "br" => out.push('\n'),
        "li" => {
            out.push_str("• ");
            walk_children(element, out);
            out.push('\n');
        }
        "p" | "div" | "blockquote" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "tr" | "ul"
        | "ol" | "table" | "figure" | "section" | "article" => {
            walk_children(element, out);
            out.push('\n');
        }
        "script" | "style" | "head" | "title" | "noscript" | "iframe" | "img" | "video"
        | "audio" | "svg" | "form" => {}
        _ => walk_children(element, out),
    }
}
