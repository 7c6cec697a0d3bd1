mod common;

use catalog_migrate_core::hierarchy::NodeKind;
use catalog_migrate_core::markup::parse_page;

use common::{convention, PAGE_A, PAGE_SUB, STORE_A, STORE_SUB};

#[test]
fn parses_components_in_document_order() {
    let page = parse_page(PAGE_A, &convention());

    assert_eq!(page.title.as_deref(), Some("A"));
    assert_eq!(page.breadcrumb, vec!["Catalog", "A"]);
    let top: Vec<_> = page
        .nodes
        .iter()
        .map(|n| (n.node.kind, n.node.title.as_str()))
        .collect();
    assert_eq!(
        top,
        vec![
            (NodeKind::Tab, "Products"),
            (NodeKind::Tab, "Help"),
            (NodeKind::Button, "Sub"),
        ]
    );

    let phones = &page.nodes[0].children[0];
    assert_eq!(phones.node.kind, NodeKind::Accordion);
    assert_eq!(phones.node.title, "Phones");
    assert_eq!(phones.node.synonym.as_deref(), Some("goods"));

    let teaser = &phones.children[0].node;
    assert_eq!(teaser.kind, NodeKind::Teaser);
    assert_eq!(teaser.title, "Phone X");
    assert_eq!(teaser.link_url.as_deref(), Some("/shop/phone.html"));
    assert_eq!(teaser.image_url.as_deref(), Some("/content/dam/phone.png"));
    assert_eq!(teaser.text.as_deref(), Some("<p>Best phone</p>"));
    assert_eq!(teaser.synonym.as_deref(), Some("Mobile"));
    assert!(phones.children[0].store_refs.is_empty());
}

#[test]
fn skips_invalid_components_without_dropping_siblings() {
    let page = parse_page(PAGE_A, &convention());

    assert_eq!(page.skipped, 1);
    let help = &page.nodes[1];
    assert_eq!(help.children.len(), 1);
    let text = &help.children[0].node;
    assert_eq!(text.kind, NodeKind::Text);
    assert_eq!(text.title, "Call us at 123");
    assert!(text.text.as_deref().unwrap().contains("tel:123"));
}

#[test]
fn recognises_links_to_content_stores() {
    let page = parse_page(PAGE_A, &convention());
    assert_eq!(page.nodes[2].store_refs, vec![STORE_SUB.to_string()]);
    assert_eq!(page.store_refs(), vec![STORE_SUB.to_string()]);

    let sub = parse_page(PAGE_SUB, &convention());
    assert_eq!(sub.store_refs(), vec![STORE_A.to_string()]);
    assert_eq!(sub.nodes[0].node.kind, NodeKind::SectionTitle);
    assert_eq!(sub.nodes[0].node.title, "Accessories");
}

#[test]
fn text_blocks_keep_every_linked_store() {
    let html = r#"<html><body><main>
        <div class="cmp-text">
          <ul>
            <li><a href="/content/stores/a/one.html">One</a></li>
            <li><a href="https://elsewhere.test/content/stores/x.html">Elsewhere</a></li>
            <li><a href="/content/stores/a/two.html">Two</a></li>
            <li><a href="/content/stores/a/one.html#top">One again</a></li>
          </ul>
        </div>
        <div class="cmp-button"><a href="/content/stores/a/three.html">
          <span class="cmp-button__text">Three</span></a></div>
    </main></body></html>"#;
    let page = parse_page(html, &convention());

    assert_eq!(
        page.nodes[0].store_refs,
        vec!["/content/stores/a/one", "/content/stores/a/two"]
    );
    assert_eq!(
        page.store_refs(),
        vec![
            "/content/stores/a/one",
            "/content/stores/a/two",
            "/content/stores/a/three",
        ]
    );
}

#[test]
fn falls_back_to_body_and_document_title() {
    let html = r#"<html><head><title>Plain</title></head><body>
        <div class="cmp-title"><h1>Intro</h1></div>
        <div class="cmp-title"><h1>Intro</h1></div>
        <script>var x = 1;</script>
    </body></html>"#;
    let page = parse_page(html, &convention());

    assert_eq!(page.title.as_deref(), Some("Plain"));
    assert!(page.breadcrumb.is_empty());
    let titles: Vec<_> = page.nodes.iter().map(|n| n.node.title.as_str()).collect();
    assert_eq!(titles, vec!["Intro", "Intro (2)"]);
}

#[test]
fn text_titles_are_cut_to_sixty_characters() {
    let long = "word ".repeat(30);
    let html = format!(r#"<main><div class="cmp-text"><p>{long}</p></div></main>"#);
    let page = parse_page(&html, &convention());

    let title = &page.nodes[0].node.title;
    assert!(title.ends_with('…'));
    assert!(title.chars().count() <= 61);
}
