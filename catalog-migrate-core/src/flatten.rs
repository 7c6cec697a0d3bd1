//! Flattener: hierarchy to ordered rows and CSV.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::HierarchyError;
use crate::hierarchy::{join_path, split_path, Hierarchy, HierarchyNode, NodeKind};

/// Column order of the flat file.
pub const FLAT_COLUMNS: [&str; 7] = [
    "type", "path", "title", "imageUrl", "linkURL", "text", "synonym",
];

/// One row per node. Absent fields are empty strings, never dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatRow {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub path: String,
    pub title: String,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
    #[serde(rename = "linkURL")]
    pub link_url: String,
    pub text: String,
    pub synonym: String,
}

impl FlatRow {
    fn from_node(node: &HierarchyNode, path: String) -> Self {
        Self {
            kind: node.kind,
            path,
            title: node.title.clone(),
            image_url: node.image_url.clone().unwrap_or_default(),
            link_url: node.link_url.clone().unwrap_or_default(),
            text: node.text.clone().unwrap_or_default(),
            synonym: node.synonym.clone().unwrap_or_default(),
        }
    }

    pub fn depth(&self) -> usize {
        split_path(&self.path).len()
    }
}

/// Depth-first pre-order rows, root excluded. Paths are derived from the
/// titles, so stale `path` fields on the nodes do not matter.
pub fn flatten(hierarchy: &Hierarchy) -> Vec<FlatRow> {
    fn walk(nodes: &[HierarchyNode], parent: &str, rows: &mut Vec<FlatRow>) {
        for node in nodes {
            let path = join_path(parent, &node.title);
            rows.push(FlatRow::from_node(node, path.clone()));
            walk(&node.items, &path, rows);
        }
    }
    let mut rows = Vec::new();
    walk(&hierarchy.items, "", &mut rows);
    rows
}

/// Rebuilds a tree from pre-ordered rows. A row whose parent path has not
/// been seen yet is dropped.
pub fn unflatten(rows: &[FlatRow]) -> Hierarchy {
    fn children_at<'a>(
        items: &'a mut Vec<HierarchyNode>,
        titles: &[&str],
    ) -> Option<&'a mut Vec<HierarchyNode>> {
        let Some((first, rest)) = titles.split_first() else {
            return Some(items);
        };
        let node = items.iter_mut().find(|n| n.title == *first)?;
        children_at(&mut node.items, rest)
    }

    let non_empty = |v: &str| (!v.is_empty()).then(|| v.to_string());
    let mut items: Vec<HierarchyNode> = Vec::new();
    for row in rows {
        let titles = split_path(&row.path);
        let parents = &titles[..titles.len().saturating_sub(1)];
        let Some(siblings) = children_at(&mut items, parents) else {
            warn!(path = %row.path, "Dropping row without parent");
            continue;
        };
        let mut node = HierarchyNode::new(row.kind, row.title.clone());
        node.image_url = non_empty(&row.image_url);
        node.link_url = non_empty(&row.link_url);
        node.text = non_empty(&row.text);
        node.synonym = non_empty(&row.synonym);
        siblings.push(node);
    }
    Hierarchy::new(items)
}

pub fn to_csv_string(rows: &[FlatRow]) -> Result<String, HierarchyError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(FLAT_COLUMNS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| HierarchyError::Csv(e.into_error().into()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn write_csv(path: &Path, rows: &[FlatRow]) -> Result<(), HierarchyError> {
    let content = to_csv_string(rows)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| HierarchyError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, content).map_err(|source| HierarchyError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), rows = rows.len(), "Wrote flat file");
    Ok(())
}

pub fn read_csv(path: &Path) -> Result<Vec<FlatRow>, HierarchyError> {
    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader
        .deserialize()
        .collect::<Result<Vec<FlatRow>, csv::Error>>()?;
    Ok(rows)
}
