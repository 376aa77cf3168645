use std::collections::HashMap;

use log::debug;

use crate::tree::{Bookmark, Folder, Node, Tree};

/// Folder for bookmarks whose URL has no usable hostname.
pub const INVALID_URL_FOLDER: &str = "Invalid URL";
/// Folder collecting bookmarks that are alone on their site.
pub const OTHER_FOLDER: &str = "Other";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GroupKey {
    Host(String),
    Invalid,
}

/// Rebuild a flat bookmark list into one folder per hostname.
///
/// Groups keep first-seen order. A hostname with a single bookmark gets no
/// folder of its own; the bookmark goes to the `Other` folder, which is
/// emitted last and only when non-empty. URLs that fail to parse or have no
/// host are collected in the `Invalid URL` group regardless of its size.
pub fn group_by_site(bookmarks: &[Bookmark]) -> Tree {
    let mut order: Vec<GroupKey> = Vec::new();
    let mut groups: HashMap<GroupKey, Vec<Bookmark>> = HashMap::new();

    for bookmark in bookmarks {
        let key = bookmark
            .hostname()
            .filter(|host| !host.is_empty())
            .map_or(GroupKey::Invalid, GroupKey::Host);
        groups
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(bookmark.clone());
    }

    let mut tree = Tree::with_capacity(order.len() + 1);
    let mut other = Vec::new();

    for key in order {
        let Some(members) = groups.remove(&key) else {
            continue;
        };
        let name = match key {
            GroupKey::Invalid => INVALID_URL_FOLDER.to_string(),
            GroupKey::Host(_) if members.len() == 1 => {
                other.extend(members.into_iter().map(Node::Bookmark));
                continue;
            }
            GroupKey::Host(host) => host,
        };
        tree.push(Node::Folder(Folder::new(
            name,
            members.into_iter().map(Node::Bookmark).collect(),
        )));
    }

    debug!(
        "Grouped {} bookmarks into {} site folders ({} in '{}')",
        bookmarks.len(),
        tree.len(),
        other.len(),
        OTHER_FOLDER
    );

    if !other.is_empty() {
        tree.push(Node::Folder(Folder::new(OTHER_FOLDER, other)));
    }
    tree
}
