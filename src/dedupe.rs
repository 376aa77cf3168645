use std::collections::HashSet;

use crate::tree::{count_bookmarks, Folder, Node, Tree};

/// Rebuild the tree keeping only the first bookmark seen for each URL.
///
/// One set of seen URLs spans the whole depth-first walk, so a duplicate in a
/// different folder is dropped too. Folders left without children are omitted.
pub fn dedupe(tree: &[Node]) -> Tree {
    let mut seen = HashSet::new();
    dedupe_level(tree, &mut seen)
}

/// Like [`dedupe`], also returning how many bookmarks were dropped.
pub fn dedupe_with_report(tree: &[Node]) -> (Tree, usize) {
    let deduped = dedupe(tree);
    let removed = count_bookmarks(tree) - count_bookmarks(&deduped);
    (deduped, removed)
}

fn dedupe_level<'a>(items: &'a [Node], seen: &mut HashSet<&'a str>) -> Vec<Node> {
    let mut kept = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Node::Bookmark(bookmark) => {
                if seen.insert(bookmark.url.as_str()) {
                    kept.push(item.clone());
                }
            }
            Node::Folder(folder) => {
                let children = dedupe_level(&folder.children, seen);
                if !children.is_empty() {
                    kept.push(Node::Folder(Folder {
                        name: folder.name.clone(),
                        add_date: folder.add_date,
                        last_modified: folder.last_modified,
                        children,
                    }));
                }
            }
        }
    }
    kept
}
