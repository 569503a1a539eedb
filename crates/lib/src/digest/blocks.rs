//! Rich-content block parser: splits answer markup into ordered text and media blocks.
//!
//! Top-level nodes are dispatched through a fixed precedence: images, then iframes,
//! then links, then list items, then plain text. Consecutive top-level inline content
//! (bare text, `<b>`, `<br>`, `<img>`, ...) is treated as one implied paragraph.
//! Once a node is assigned a rule, its children are handled by that rule only.

use scraper::{ElementRef, Html, Node};

use super::text::escape_markup;
use crate::media::MediaKind;

/// One renderable unit of an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentBlock {
    /// Text or raw markup still to be cleaned.
    Text(String),
    Media { kind: MediaKind, url: String },
}

const INLINE_TAGS: &[&str] = &[
    "a", "abbr", "b", "bdi", "bdo", "br", "cite", "code", "data", "dfn", "em", "font", "i",
    "iframe", "img", "kbd", "label", "mark", "q", "s", "samp", "small", "span", "strong", "sub",
    "sup", "time", "u", "var",
];

#[derive(Clone, Copy)]
enum Piece<'a> {
    Text(&'a str),
    Element(ElementRef<'a>),
}

impl<'a> Piece<'a> {
    fn is_inline(&self) -> bool {
        match self {
            Piece::Text(_) => true,
            Piece::Element(el) => INLINE_TAGS.contains(&el.value().name()),
        }
    }
}

/// A dispatch unit: a block element, or a run of top-level inline pieces.
struct Unit<'a> {
    this: Option<ElementRef<'a>>,
    children: Vec<Piece<'a>>,
}

impl<'a> Unit<'a> {
    fn of(el: ElementRef<'a>) -> Self {
        Self {
            this: Some(el),
            children: pieces(el),
        }
    }

    fn is(&self, tag: &str) -> bool {
        self.this.map_or(false, |el| el.value().name() == tag)
    }

    fn contains(&self, tag: &str) -> bool {
        self.is(tag)
            || self.children.iter().any(|p| match p {
                Piece::Element(el) => subtree_has(*el, tag),
                Piece::Text(_) => false,
            })
    }
}

fn pieces(parent: ElementRef<'_>) -> Vec<Piece<'_>> {
    parent
        .children()
        .filter_map(|node| match node.value() {
            Node::Text(text) => Some(Piece::Text(&**text)),
            Node::Element(_) => ElementRef::wrap(node).map(Piece::Element),
            _ => None,
        })
        .collect()
}

fn is_tag(el: ElementRef<'_>, tag: &str) -> bool {
    el.value().name() == tag
}

fn subtree_has(el: ElementRef<'_>, tag: &str) -> bool {
    el.descendants()
        .any(|node| node.value().as_element().map_or(false, |e| e.name() == tag))
}

/// Visible text of `el`; `<br>` reads as a newline. Nested lists are skipped when `skip_lists`.
fn collect_text(el: ElementRef<'_>, skip_lists: bool, out: &mut String) {
    for piece in pieces(el) {
        match piece {
            Piece::Text(text) => out.push_str(text),
            Piece::Element(child) if is_tag(child, "br") => out.push('\n'),
            Piece::Element(child) if skip_lists && (is_tag(child, "ul") || is_tag(child, "ol")) => {}
            Piece::Element(child) => collect_text(child, skip_lists, out),
        }
    }
}

fn text_content(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_text(el, false, &mut out);
    out
}

fn piece_text(piece: Piece<'_>) -> String {
    match piece {
        Piece::Text(text) => text.to_string(),
        Piece::Element(el) if is_tag(el, "br") => "\n".to_string(),
        Piece::Element(el) => text_content(el),
    }
}

fn piece_markup(piece: Piece<'_>) -> String {
    match piece {
        Piece::Text(text) => escape_markup(text),
        Piece::Element(el) => el.html(),
    }
}

fn non_empty_attr<'a>(el: ElementRef<'a>, name: &str) -> Option<&'a str> {
    el.value().attr(name).filter(|v| !v.is_empty())
}

fn push_image(el: ElementRef<'_>, out: &mut Vec<ContentBlock>) {
    if let Some(src) = non_empty_attr(el, "src") {
        out.push(ContentBlock::Media {
            kind: MediaKind::Image,
            url: src.to_string(),
        });
    }
}

fn handle_images(unit: &Unit<'_>, out: &mut Vec<ContentBlock>) {
    if let Some(el) = unit.this.filter(|el| is_tag(*el, "img")) {
        push_image(el, out);
        return;
    }
    for piece in &unit.children {
        match *piece {
            Piece::Element(el) if is_tag(el, "img") => push_image(el, out),
            Piece::Element(el) if subtree_has(el, "img") => handle_images(&Unit::of(el), out),
            other => out.push(ContentBlock::Text(piece_markup(other))),
        }
    }
}

fn push_iframe(el: ElementRef<'_>, out: &mut Vec<ContentBlock>) {
    match non_empty_attr(el, "src") {
        Some(src) => match MediaKind::from_url_extension(src) {
            Some(kind) => out.push(ContentBlock::Media {
                kind,
                url: src.to_string(),
            }),
            None => out.push(ContentBlock::Text(src.to_string())),
        },
        None => out.push(ContentBlock::Text(el.html())),
    }
}

fn handle_iframes(unit: &Unit<'_>, out: &mut Vec<ContentBlock>) {
    if let Some(el) = unit.this.filter(|el| is_tag(*el, "iframe")) {
        push_iframe(el, out);
        return;
    }
    for piece in &unit.children {
        match *piece {
            Piece::Element(el) if is_tag(el, "iframe") => push_iframe(el, out),
            Piece::Element(el) if subtree_has(el, "iframe") => handle_iframes(&Unit::of(el), out),
            other => out.push(ContentBlock::Text(piece_markup(other))),
        }
    }
}

fn link_text(el: ElementRef<'_>) -> String {
    escape_markup(&format!("{}: {}", text_content(el), el.value().attr("href").unwrap_or_default()))
}

fn handle_links(unit: &Unit<'_>, out: &mut Vec<ContentBlock>) {
    if let Some(el) = unit.this.filter(|el| is_tag(*el, "a")) {
        out.push(ContentBlock::Text(link_text(el)));
        return;
    }
    for piece in &unit.children {
        match *piece {
            Piece::Element(el) if is_tag(el, "a") => out.push(ContentBlock::Text(link_text(el))),
            Piece::Element(el) if subtree_has(el, "a") => handle_links(&Unit::of(el), out),
            other => out.push(ContentBlock::Text(escape_markup(&piece_text(other)))),
        }
    }
}

fn handle_list(unit: &Unit<'_>, out: &mut Vec<ContentBlock>) {
    let roots: Vec<ElementRef<'_>> = match unit.this {
        Some(el) => vec![el],
        None => unit
            .children
            .iter()
            .filter_map(|p| match p {
                Piece::Element(el) => Some(*el),
                Piece::Text(_) => None,
            })
            .collect(),
    };
    for root in roots {
        for node in root.descendants() {
            let Some(item) = ElementRef::wrap(node).filter(|el| is_tag(*el, "li")) else {
                continue;
            };
            let mut text = String::new();
            collect_text(item, true, &mut text);
            let text = text.strip_prefix('\n').unwrap_or(&text);
            out.push(ContentBlock::Text(format!("- {}", escape_markup(text))));
        }
    }
}

fn handle_text(unit: &Unit<'_>, out: &mut Vec<ContentBlock>) {
    let text = match unit.this {
        Some(el) => text_content(el),
        None => unit.children.iter().map(|p| piece_text(*p)).collect(),
    };
    let text = text.trim();
    if !text.is_empty() {
        out.push(ContentBlock::Text(escape_markup(text)));
    }
}

fn dispatch(unit: &Unit<'_>, out: &mut Vec<ContentBlock>) {
    if unit.contains("img") {
        handle_images(unit, out);
    } else if unit.contains("iframe") {
        handle_iframes(unit, out);
    } else if unit.contains("a") {
        handle_links(unit, out);
    } else if unit.contains("li") {
        handle_list(unit, out);
    } else {
        handle_text(unit, out);
    }
}

/// Parse answer markup into blocks in document order. Never fails: HTML parsing is
/// error-tolerant, and input with nothing renderable yields an empty sequence.
pub fn parse_blocks(markup: &str) -> Vec<ContentBlock> {
    let fragment = Html::parse_fragment(markup);
    if !fragment.errors.is_empty() {
        log::debug!("digest: markup recovered from {} parse error(s)", fragment.errors.len());
    }
    let mut out = Vec::new();
    let mut run: Vec<Piece<'_>> = Vec::new();
    for piece in pieces(fragment.root_element()) {
        if piece.is_inline() {
            run.push(piece);
            continue;
        }
        if !run.is_empty() {
            let children = std::mem::take(&mut run);
            dispatch(&Unit { this: None, children }, &mut out);
        }
        if let Piece::Element(el) = piece {
            dispatch(&Unit::of(el), &mut out);
        }
    }
    if !run.is_empty() {
        dispatch(&Unit { this: None, children: run }, &mut out);
    }
    out
}
