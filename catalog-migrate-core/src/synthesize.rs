//! Document Synthesizer: flat rows to the target store's sheet and page documents.
//!
//! Pure and deterministic. Main and sub stores produce the same documents and
//! differ only in the target paths computed by [`TargetLayout`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::flatten::{FlatRow, FLAT_COLUMNS};
use crate::hierarchy::NodeKind;
use crate::store::{ContentStore, IMAGES_DIR};

const SHEET_VERSION: u32 = 3;
const CATALOG_BLOCK: &str = "catalog";

/// Where a store's documents land in the target store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetLayout {
    /// Root folder for main-store documents.
    pub destination: String,
    /// Folder below `destination` that holds sub-store documents.
    pub sub_folder: String,
}

impl TargetLayout {
    pub fn new(destination: impl Into<String>, sub_folder: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            sub_folder: sub_folder.into(),
        }
    }

    /// `<destination>/<name>` for main stores, `<destination>/<sub_folder>/<name>` for sub stores.
    pub fn document_base(&self, store: &ContentStore) -> String {
        if store.is_main() {
            join_segments(&[&self.destination, store.name()])
        } else {
            join_segments(&[&self.destination, &self.sub_folder, store.name()])
        }
    }

    pub fn sheet_path(&self, store: &ContentStore) -> String {
        format!("{}.json", self.document_base(store))
    }

    pub fn page_path(&self, store: &ContentStore) -> String {
        format!("{}.html", self.document_base(store))
    }

    pub fn image_path(&self, store: &ContentStore, file_name: &str) -> String {
        join_segments(&[&self.document_base(store), IMAGES_DIR, file_name])
    }
}

fn join_segments(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|s| s.trim_matches('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<FlatRow>,
}

/// A multi-sheet JSON document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetDocument {
    pub sheets: Vec<Sheet>,
}

impl SheetDocument {
    pub fn to_json(&self) -> Value {
        let mut doc = Map::new();
        let names: Vec<&str> = self.sheets.iter().map(|s| s.name.as_str()).collect();
        doc.insert(":names".into(), json!(names));
        doc.insert(":version".into(), json!(SHEET_VERSION));
        doc.insert(":type".into(), json!("multi-sheet"));
        for sheet in &self.sheets {
            doc.insert(
                sheet.name.clone(),
                json!({
                    "total": sheet.rows.len(),
                    "offset": 0,
                    "limit": sheet.rows.len(),
                    "columns": FLAT_COLUMNS,
                    "data": sheet.rows,
                }),
            );
        }
        Value::Object(doc)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(&self.to_json())
    }
}

/// Reads the rows of sheet `name` back out of a multi-sheet document.
pub fn rows_from_sheet(document: &Value, name: &str) -> Result<Vec<FlatRow>, serde_json::Error> {
    let data = document
        .get(name)
        .and_then(|sheet| sheet.get("data"))
        .cloned()
        .unwrap_or_else(|| json!([]));
    serde_json::from_value(data)
}

/// An HTML page that embeds the catalog block pointing at the sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDocument {
    pub title: String,
    pub path: String,
    pub sheet_path: String,
    pub html: String,
}

impl PageDocument {
    fn render(title: &str, source_path: &str, page_path: &str, sheet_path: &str) -> Self {
        let sheet_href = format!("/{sheet_path}");
        let html = format!(
            "<body>\n\
             \x20 <header></header>\n\
             \x20 <main>\n\
             \x20   <div>\n\
             \x20     <div class=\"{CATALOG_BLOCK}\">\n\
             \x20       <div><div><a href=\"{href}\">{href}</a></div></div>\n\
             \x20     </div>\n\
             \x20     <div class=\"metadata\">\n\
             \x20       <div><div>Title</div><div>{title}</div></div>\n\
             \x20       <div><div>Path</div><div>{path}</div></div>\n\
             \x20     </div>\n\
             \x20   </div>\n\
             \x20 </main>\n\
             \x20 <footer></footer>\n\
             </body>\n",
            href = escape_html(&sheet_href),
            title = escape_html(title),
            path = escape_html(source_path),
        );
        Self {
            title: title.to_string(),
            path: page_path.to_string(),
            sheet_path: sheet_path.to_string(),
            html,
        }
    }
}

pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedDocuments {
    pub sheet_path: String,
    pub sheet: SheetDocument,
    pub page: PageDocument,
}

/// Builds the sheet and page for one store. Local `images/...` references are
/// rewritten to the image paths the upload phase uses.
pub fn synthesize(rows: &[FlatRow], store: &ContentStore, layout: &TargetLayout) -> SynthesizedDocuments {
    let base = layout.document_base(store);
    let local_prefix = format!("{IMAGES_DIR}/");
    let rows: Vec<FlatRow> = rows
        .iter()
        .cloned()
        .map(|mut row| {
            if let Some(file) = row.image_url.strip_prefix(&local_prefix) {
                row.image_url = format!("/{}", layout.image_path(store, file));
            }
            row
        })
        .collect();

    let title = rows
        .iter()
        .filter(|r| r.kind == NodeKind::Store && r.link_url == store.path)
        .max_by_key(|r| r.depth())
        .map(|r| r.title.clone())
        .unwrap_or_else(|| store.name().to_string());

    let sheet_path = layout.sheet_path(store);
    let page = PageDocument::render(&title, &store.path, &layout.page_path(store), &sheet_path);
    let sheet = SheetDocument {
        sheets: vec![Sheet {
            name: store.name().to_string(),
            rows,
        }],
    };
    tracing::debug!(store = %store.path, base = %base, "Synthesized documents");
    SynthesizedDocuments {
        sheet_path,
        sheet,
        page,
    }
}
