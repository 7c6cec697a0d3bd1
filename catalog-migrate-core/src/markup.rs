//! Parses a rendered content-store page into typed component nodes.
//!
//! Pages are rendered by the source repository's core components, so the
//! structure is recognised by their `cmp-*` class names:
//!
//! | markup                               | node            |
//! |--------------------------------------|-----------------|
//! | `.cmp-tabs` (`__tab` + `__tabpanel`) | one `tab` each  |
//! | `.cmp-accordion__item`               | `accordion`     |
//! | `.cmp-button`                        | `button`        |
//! | `.cmp-teaser`                        | `teaser`        |
//! | `.cmp-title`                         | `section-title` |
//! | `.cmp-text`                          | `text`          |
//!
//! Components that fail validation are skipped and counted; they never stop
//! their siblings from being parsed.

use scraper::{ElementRef, Html};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::hierarchy::{HierarchyNode, NodeKind};
use crate::store::StoreConvention;

const SKIPPED_TAGS: &[&str] = &[
    "head", "script", "style", "noscript", "template", "header", "footer",
];
const HEADINGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];
const TEXT_TITLE_CHARS: usize = 60;

/// A parsed component. `store_refs` holds every content store it links to,
/// its own link first.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedNode {
    pub node: HierarchyNode,
    pub store_refs: Vec<String>,
    pub children: Vec<ParsedNode>,
}

impl ParsedNode {
    /// Converts to a hierarchy node without attaching referenced stores.
    pub fn to_hierarchy(&self) -> HierarchyNode {
        let mut node = self.node.clone();
        node.items = self.children.iter().map(ParsedNode::to_hierarchy).collect();
        node
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedPage {
    pub title: Option<String>,
    pub breadcrumb: Vec<String>,
    pub nodes: Vec<ParsedNode>,
    /// Components dropped because they were missing required fields.
    pub skipped: usize,
}

impl ParsedPage {
    /// Store paths referenced anywhere on the page, in document order, without duplicates.
    pub fn store_refs(&self) -> Vec<String> {
        fn walk(nodes: &[ParsedNode], seen: &mut HashSet<String>, out: &mut Vec<String>) {
            for node in nodes {
                for store in &node.store_refs {
                    if seen.insert(store.clone()) {
                        out.push(store.clone());
                    }
                }
                walk(&node.children, seen, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.nodes, &mut HashSet::new(), &mut out);
        out
    }
}

pub fn parse_page(html: &str, convention: &StoreConvention) -> ParsedPage {
    let document = Html::parse_document(html);
    let root = document.root_element();
    let content = first_descendant(root, |e| e.value().name() == "main").unwrap_or(root);

    let mut parser = PageParser {
        convention,
        skipped: 0,
    };
    let nodes = parser.parse_container(content);

    let breadcrumb: Vec<String> = find_own(root, "cmp-breadcrumb__item", "")
        .into_iter()
        .map(text_of)
        .filter(|t| !t.is_empty())
        .collect();
    let title = breadcrumb
        .last()
        .cloned()
        .or_else(|| first_descendant(root, |e| e.value().name() == "title").map(text_of))
        .filter(|t| !t.is_empty());

    debug!(
        nodes = nodes.len(),
        skipped = parser.skipped,
        title = title.as_deref().unwrap_or_default(),
        "Parsed store page"
    );
    ParsedPage {
        title,
        breadcrumb,
        nodes,
        skipped: parser.skipped,
    }
}

struct PageParser<'c> {
    convention: &'c StoreConvention,
    skipped: usize,
}

impl PageParser<'_> {
    fn parse_container(&mut self, container: ElementRef<'_>) -> Vec<ParsedNode> {
        let mut nodes = Vec::new();
        for child in container.children().filter_map(ElementRef::wrap) {
            if SKIPPED_TAGS.contains(&child.value().name()) || has_class(child, "cmp-breadcrumb") {
                continue;
            }
            if has_class(child, "cmp-tabs") {
                nodes.extend(self.parse_tabs(child));
            } else if has_class(child, "cmp-accordion") {
                nodes.extend(self.parse_accordion(child));
            } else if has_class(child, "cmp-button") {
                nodes.extend(self.parse_button(child));
            } else if has_class(child, "cmp-teaser") {
                nodes.extend(self.parse_teaser(child));
            } else if has_class(child, "cmp-title") {
                nodes.extend(self.parse_title(child));
            } else if has_class(child, "cmp-text") {
                nodes.extend(self.parse_text(child));
            } else {
                nodes.extend(self.parse_container(child));
            }
        }
        disambiguate_titles(&mut nodes);
        nodes
    }

    fn parse_tabs(&mut self, tabs: ElementRef<'_>) -> Vec<ParsedNode> {
        let labels = find_own(tabs, "cmp-tabs__tab", "cmp-tabs");
        let panels = find_own(tabs, "cmp-tabs__tabpanel", "cmp-tabs");
        let mut nodes = Vec::new();
        for (index, label) in labels.into_iter().enumerate() {
            let children = match panels.get(index) {
                Some(panel) => self.parse_container(*panel),
                None => Vec::new(),
            };
            let node = HierarchyNode::new(NodeKind::Tab, text_of(label));
            nodes.extend(self.finish(label, node, children));
        }
        nodes
    }

    fn parse_accordion(&mut self, accordion: ElementRef<'_>) -> Vec<ParsedNode> {
        let mut nodes = Vec::new();
        for item in find_own(accordion, "cmp-accordion__item", "cmp-accordion") {
            let title = find_own(item, "cmp-accordion__title", "cmp-accordion")
                .first()
                .map(|t| text_of(*t))
                .unwrap_or_default();
            let children = match find_own(item, "cmp-accordion__panel", "cmp-accordion").first() {
                Some(panel) => self.parse_container(*panel),
                None => Vec::new(),
            };
            let node = HierarchyNode::new(NodeKind::Accordion, title);
            nodes.extend(self.finish(item, node, children));
        }
        nodes
    }

    fn parse_button(&mut self, button: ElementRef<'_>) -> Option<ParsedNode> {
        let label = find_own(button, "cmp-button__text", "")
            .first()
            .map(|t| text_of(*t))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| text_of(button));
        let href = if button.value().name() == "a" {
            button.value().attr("href").map(str::to_string)
        } else {
            first_attr(button, "a", "href")
        };
        let mut node = HierarchyNode::new(NodeKind::Button, label);
        node.link_url = clean_href(href);
        node.image_url = image_src(button);
        self.finish(button, node, Vec::new())
    }

    fn parse_teaser(&mut self, teaser: ElementRef<'_>) -> Option<ParsedNode> {
        let own = |class: &str| find_own(teaser, class, "cmp-teaser").into_iter().next();

        let title_el = own("cmp-teaser__title");
        let title = title_el.map(text_of).unwrap_or_default();
        let href = title_el
            .and_then(|t| {
                if t.value().name() == "a" {
                    t.value().attr("href").map(str::to_string)
                } else {
                    first_attr(t, "a", "href")
                }
            })
            .or_else(|| own("cmp-teaser__action-link").and_then(|a| a.value().attr("href").map(str::to_string)))
            .or_else(|| {
                (teaser.value().name() == "a")
                    .then(|| teaser.value().attr("href").map(str::to_string))
                    .flatten()
            });

        let mut node = HierarchyNode::new(NodeKind::Teaser, title);
        node.link_url = clean_href(href);
        node.text = own("cmp-teaser__description")
            .map(|d| d.inner_html().trim().to_string())
            .filter(|d| !d.is_empty());
        node.image_url = own("cmp-teaser__image").and_then(image_src);
        node.synonym = own("cmp-teaser__pretitle")
            .map(text_of)
            .filter(|s| !s.is_empty());
        self.finish(teaser, node, Vec::new())
    }

    fn parse_title(&mut self, title: ElementRef<'_>) -> Option<ParsedNode> {
        let text = first_descendant(title, |e| HEADINGS.contains(&e.value().name()))
            .map(text_of)
            .unwrap_or_else(|| text_of(title));
        self.finish(title, HierarchyNode::new(NodeKind::SectionTitle, text), Vec::new())
    }

    fn parse_text(&mut self, text: ElementRef<'_>) -> Option<ParsedNode> {
        let plain = text_of(text);
        let html = text.inner_html().trim().to_string();
        let mut node = HierarchyNode::new(NodeKind::Text, truncate_chars(&plain, TEXT_TITLE_CHARS));
        if !plain.is_empty() {
            node.text = Some(html);
        }
        node.link_url = clean_href(first_attr(text, "a", "href"));
        self.finish(text, node, Vec::new())
    }

    /// Applies `data-synonym`, validates, and resolves store references. Leaf
    /// components contribute every anchor they contain; containers only their
    /// own link, since their panels are parsed as children.
    fn finish(
        &mut self,
        el: ElementRef<'_>,
        mut node: HierarchyNode,
        children: Vec<ParsedNode>,
    ) -> Option<ParsedNode> {
        if node.synonym.is_none() {
            node.synonym = el
                .value()
                .attr("data-synonym")
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());
        }
        if let Err(e) = node.validate() {
            warn!(error = %e, title = %node.title, "Skipping component");
            self.skipped += 1;
            return None;
        }
        let mut store_refs: Vec<String> = Vec::new();
        let own = node.link_url.as_deref().map(str::to_string);
        let anchors = if children.is_empty() {
            anchor_hrefs(el)
        } else {
            Vec::new()
        };
        for href in own.into_iter().chain(anchors) {
            if let Some(store) = self.convention.store_link(&href) {
                if !store_refs.contains(&store) {
                    store_refs.push(store);
                }
            }
        }
        Some(ParsedNode {
            node,
            store_refs,
            children,
        })
    }
}

/// Keeps sibling titles unique by suffixing repeats with ` (2)`, ` (3)`, ...
fn disambiguate_titles(nodes: &mut [ParsedNode]) {
    let mut seen: HashSet<String> = HashSet::new();
    for index in 0..nodes.len() {
        let title = nodes[index].node.title.clone();
        if seen.insert(title.clone()) {
            continue;
        }
        let mut n = 2;
        let unique = loop {
            let candidate = format!("{title} ({n})");
            if !seen.contains(&candidate) && !nodes.iter().any(|o| o.node.title == candidate) {
                break candidate;
            }
            n += 1;
        };
        debug!(title = %title, renamed = %unique, "Renamed duplicate sibling title");
        seen.insert(unique.clone());
        nodes[index].node.title = unique;
    }
}

fn has_class(el: ElementRef<'_>, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}

/// Descendants carrying `class`, without entering nested `boundary` components
/// or descending into matches.
fn find_own<'a>(root: ElementRef<'a>, class: &str, boundary: &str) -> Vec<ElementRef<'a>> {
    fn walk<'a>(el: ElementRef<'a>, class: &str, boundary: &str, found: &mut Vec<ElementRef<'a>>) {
        for child in el.children().filter_map(ElementRef::wrap) {
            if has_class(child, class) {
                found.push(child);
            } else if boundary.is_empty() || !has_class(child, boundary) {
                walk(child, class, boundary, found);
            }
        }
    }
    let mut found = Vec::new();
    walk(root, class, boundary, &mut found);
    found
}

fn first_descendant<'a>(
    root: ElementRef<'a>,
    predicate: impl Fn(&ElementRef<'a>) -> bool,
) -> Option<ElementRef<'a>> {
    root.descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .find(|e| predicate(e))
}

fn first_attr(root: ElementRef<'_>, tag: &str, attr: &str) -> Option<String> {
    first_descendant(root, |e| e.value().name() == tag && e.value().attr(attr).is_some())
        .and_then(|e| e.value().attr(attr).map(str::to_string))
}

/// `href` of `el` itself and of every anchor below it, in document order.
fn anchor_hrefs(el: ElementRef<'_>) -> Vec<String> {
    el.descendants()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "a")
        .filter_map(|e| clean_href(e.value().attr("href").map(str::to_string)))
        .collect()
}

fn image_src(el: ElementRef<'_>) -> Option<String> {
    let src = if el.value().name() == "img" {
        el.value().attr("src").map(str::to_string)
    } else {
        first_attr(el, "img", "src")
    };
    src.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn clean_href(href: Option<String>) -> Option<String> {
    href.map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty() && h != "#" && !h.starts_with("javascript:"))
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn truncate_chars(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        value.to_string()
    } else {
        let cut: String = value.chars().take(max).collect();
        format!("{}…", cut.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo…");
        assert_eq!(truncate_chars("short", 60), "short");
    }

    #[test]
    fn duplicate_titles_get_numbered_suffixes() {
        let node = |title: &str| ParsedNode {
            node: HierarchyNode::new(NodeKind::Tab, title),
            store_refs: Vec::new(),
            children: Vec::new(),
        };
        let mut nodes = vec![node("A"), node("A"), node("A (2)"), node("B")];
        disambiguate_titles(&mut nodes);
        let titles: Vec<_> = nodes.iter().map(|n| n.node.title.as_str()).collect();
        assert_eq!(titles, ["A", "A (3)", "A (2)", "B"]);
    }
}
