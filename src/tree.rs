use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};

// ---- Node Types ----

/// An ordered forest of folders and bookmarks. There is no root node object:
/// the top level is itself a sequence of nodes.
pub type Tree = Vec<Node>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Node {
    Folder(Folder),
    Bookmark(Bookmark),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub name: String,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub add_date: Option<i64>,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_modified: Option<i64>,
    #[serde(default)]
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    /// Older stores wrote the title under `name`.
    #[serde(alias = "name")]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub add_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl Folder {
    pub fn new(name: impl Into<String>, children: Vec<Node>) -> Self {
        Self {
            name: name.into(),
            add_date: None,
            last_modified: None,
            children,
        }
    }
}

impl Bookmark {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            add_date: None,
            icon: None,
        }
    }

    /// Creation time, when the export carried a usable `ADD_DATE`.
    pub fn added_at(&self) -> Option<DateTime<Utc>> {
        self.add_date.and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    /// Host part of the URL, if it parses and has one.
    pub fn hostname(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }
}

impl Node {
    /// Display label: folder name or bookmark title.
    pub fn label(&self) -> &str {
        match self {
            Node::Folder(folder) => &folder.name,
            Node::Bookmark(bookmark) => &bookmark.title,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, Node::Folder(_))
    }

    pub fn as_folder(&self) -> Option<&Folder> {
        match self {
            Node::Folder(folder) => Some(folder),
            Node::Bookmark(_) => None,
        }
    }
}

impl From<Folder> for Node {
    fn from(folder: Folder) -> Self {
        Node::Folder(folder)
    }
}

impl From<Bookmark> for Node {
    fn from(bookmark: Bookmark) -> Self {
        Node::Bookmark(bookmark)
    }
}

/// Accepts `123`, `"123"`, `null` or a missing field. Anything unparsable
/// becomes `None` rather than failing the whole document.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

// ---- Flattening ----

/// Collect every bookmark leaf, depth-first and in child order.
pub fn flatten(tree: &[Node]) -> Vec<Bookmark> {
    let mut out = Vec::new();
    collect_bookmarks(tree, &mut out);
    out
}

fn collect_bookmarks(items: &[Node], out: &mut Vec<Bookmark>) {
    for item in items {
        match item {
            Node::Bookmark(bookmark) => out.push(bookmark.clone()),
            Node::Folder(folder) => collect_bookmarks(&folder.children, out),
        }
    }
}

pub fn count_bookmarks(tree: &[Node]) -> usize {
    tree.iter()
        .map(|node| match node {
            Node::Bookmark(_) => 1,
            Node::Folder(folder) => count_bookmarks(&folder.children),
        })
        .sum()
}

pub fn count_folders(tree: &[Node]) -> usize {
    tree.iter()
        .map(|node| match node {
            Node::Bookmark(_) => 0,
            Node::Folder(folder) => 1 + count_folders(&folder.children),
        })
        .sum()
}

// ---- View Ordering ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    #[default]
    Default,
    NameAsc,
    NameDesc,
    Random,
}

/// A node of the current folder together with its position in the unsorted
/// folder, so a sorted view can still be navigated by index.
#[derive(Debug, Clone, Copy)]
pub struct ViewItem<'a> {
    pub index: usize,
    pub node: &'a Node,
}

pub fn sorted_view(items: &[Node], order: SortOrder) -> Vec<ViewItem<'_>> {
    let mut rng = rand::thread_rng();
    sorted_view_with(items, order, &mut rng)
}

pub fn sorted_view_with<'a, R: Rng + ?Sized>(
    items: &'a [Node],
    order: SortOrder,
    rng: &mut R,
) -> Vec<ViewItem<'a>> {
    let mut view: Vec<ViewItem<'a>> = items
        .iter()
        .enumerate()
        .map(|(index, node)| ViewItem { index, node })
        .collect();

    match order {
        SortOrder::Default => {}
        SortOrder::NameAsc => view.sort_by(|a, b| compare_labels(a.node, b.node)),
        SortOrder::NameDesc => view.sort_by(|a, b| compare_labels(b.node, a.node)),
        SortOrder::Random => view.shuffle(rng),
    }
    view
}

fn compare_labels(a: &Node, b: &Node) -> std::cmp::Ordering {
    a.label()
        .to_lowercase()
        .cmp(&b.label().to_lowercase())
        .then_with(|| a.label().cmp(b.label()))
}

// ---- View Summaries ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Folder,
    Bookmark,
}

/// What a renderer needs to draw one entry of the current folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSummary {
    pub index: usize,
    pub kind: ItemKind,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added: Option<String>,
    /// Number of bookmarks below a folder.
    pub bookmark_count: usize,
}

impl ItemSummary {
    pub fn from_view(item: &ViewItem<'_>) -> Self {
        match item.node {
            Node::Folder(folder) => Self {
                index: item.index,
                kind: ItemKind::Folder,
                label: folder.name.clone(),
                url: None,
                hostname: None,
                added: folder
                    .add_date
                    .and_then(|secs| DateTime::from_timestamp(secs, 0))
                    .map(|dt| dt.to_rfc3339()),
                bookmark_count: count_bookmarks(&folder.children),
            },
            Node::Bookmark(bookmark) => Self {
                index: item.index,
                kind: ItemKind::Bookmark,
                label: bookmark.title.clone(),
                url: Some(bookmark.url.clone()),
                hostname: bookmark.hostname(),
                added: bookmark.added_at().map(|dt| dt.to_rfc3339()),
                bookmark_count: 1,
            },
        }
    }
}
