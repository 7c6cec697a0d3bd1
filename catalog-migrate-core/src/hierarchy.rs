//! The content tree fetched from one or more content stores.
//!
//! [`Hierarchy`] is the root of a tree and is also the on-disk shape of a
//! hierarchy file (`{"items": [...]}`). Every other node is a [`HierarchyNode`]
//! whose `path` (ancestor titles joined by [`PATH_SEPARATOR`]) is its natural key.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::{HierarchyError, MarkupError};

/// Separator between ancestor titles in a node path.
pub const PATH_SEPARATOR: &str = ">>>";

/// Closed set of node types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    /// A content store in a breadcrumb trail.
    Store,
    Tab,
    Accordion,
    Button,
    Teaser,
    SectionTitle,
    Text,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Store => "store",
            NodeKind::Tab => "tab",
            NodeKind::Accordion => "accordion",
            NodeKind::Button => "button",
            NodeKind::Teaser => "teaser",
            NodeKind::SectionTitle => "section-title",
            NodeKind::Text => "text",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "store" => Ok(NodeKind::Store),
            "tab" => Ok(NodeKind::Tab),
            "accordion" => Ok(NodeKind::Accordion),
            "button" => Ok(NodeKind::Button),
            "teaser" => Ok(NodeKind::Teaser),
            "section-title" => Ok(NodeKind::SectionTitle),
            "text" => Ok(NodeKind::Text),
            other => Err(format!("unknown node type: {other}")),
        }
    }
}

/// A node in the content tree. Children order is display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyNode {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub title: String,
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synonym: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<HierarchyNode>,
}

impl HierarchyNode {
    pub fn new(kind: NodeKind, title: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            path: String::new(),
            text: None,
            image_url: None,
            link_url: None,
            synonym: None,
            items: Vec::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_image(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    pub fn with_link(mut self, link_url: impl Into<String>) -> Self {
        self.link_url = Some(link_url.into());
        self
    }

    pub fn with_synonym(mut self, synonym: impl Into<String>) -> Self {
        self.synonym = Some(synonym.into());
        self
    }

    pub fn with_items(mut self, items: Vec<HierarchyNode>) -> Self {
        self.items = items;
        self
    }

    /// This node plus all of its descendants.
    pub fn count_nodes(&self) -> usize {
        1 + self.items.iter().map(HierarchyNode::count_nodes).sum::<usize>()
    }

    pub fn child(&self, title: &str) -> Option<&HierarchyNode> {
        self.items.iter().find(|n| n.title == title)
    }

    /// Checks the fields each kind requires.
    pub fn validate(&self) -> Result<(), MarkupError> {
        if self.title.trim().is_empty() {
            return Err(MarkupError::MissingField {
                kind: self.kind,
                field: "title",
            });
        }
        match self.kind {
            NodeKind::Button if is_blank(&self.link_url) => Err(MarkupError::MissingField {
                kind: self.kind,
                field: "linkUrl",
            }),
            NodeKind::Text if is_blank(&self.text) => Err(MarkupError::MissingField {
                kind: self.kind,
                field: "text",
            }),
            _ => Ok(()),
        }
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// Root of a content tree. Serialises as the hierarchy file wrapper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hierarchy {
    #[serde(default)]
    pub items: Vec<HierarchyNode>,
}

impl Hierarchy {
    pub fn new(items: Vec<HierarchyNode>) -> Self {
        let mut hierarchy = Self { items };
        hierarchy.reindex();
        hierarchy
    }

    /// Total node count including the implicit root.
    pub fn count_nodes(&self) -> usize {
        1 + self.items.iter().map(HierarchyNode::count_nodes).sum::<usize>()
    }

    /// Recomputes every node's `path` from its ancestors' titles.
    pub fn reindex(&mut self) {
        fn walk(nodes: &mut [HierarchyNode], parent: &str) {
            for node in nodes {
                node.path = join_path(parent, &node.title);
                let path = node.path.clone();
                walk(&mut node.items, &path);
            }
        }
        walk(&mut self.items, "");
    }

    /// Looks a node up by its chain of titles from the root.
    pub fn find(&self, titles: &[&str]) -> Option<&HierarchyNode> {
        let (first, rest) = titles.split_first()?;
        let mut node = self.items.iter().find(|n| n.title == *first)?;
        for title in rest {
            node = node.child(title)?;
        }
        Some(node)
    }

    /// Every node in pre-order.
    pub fn nodes(&self) -> Vec<&HierarchyNode> {
        fn walk<'a>(nodes: &'a [HierarchyNode], out: &mut Vec<&'a HierarchyNode>) {
            for node in nodes {
                out.push(node);
                walk(&node.items, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.items, &mut out);
        out
    }
}

pub fn join_path(parent: &str, title: &str) -> String {
    if parent.is_empty() {
        title.to_string()
    } else {
        format!("{parent}{PATH_SEPARATOR}{title}")
    }
}

pub fn split_path(path: &str) -> Vec<&str> {
    if path.is_empty() {
        Vec::new()
    } else {
        path.split(PATH_SEPARATOR).collect()
    }
}

pub fn read_hierarchy(path: &Path) -> Result<Hierarchy, HierarchyError> {
    let content = fs::read_to_string(path).map_err(|source| HierarchyError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| HierarchyError::Json {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_hierarchy(path: &Path, hierarchy: &Hierarchy) -> Result<(), HierarchyError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| HierarchyError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let json = serde_json::to_string_pretty(hierarchy).map_err(|source| HierarchyError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(|source| HierarchyError::Io {
        path: path.to_path_buf(),
        source,
    })
}
