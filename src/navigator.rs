use log::warn;

use crate::tree::Node;

/// Current location in the tree, as child indices from the top level down to
/// the displayed folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Navigator {
    path: Vec<usize>,
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(&self) -> &[usize] {
        &self.path
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    pub fn push(&mut self, index: usize) {
        self.path.push(index);
    }

    /// Go up one level. No-op at the top level.
    pub fn pop(&mut self) {
        self.path.pop();
    }

    pub fn reset(&mut self) {
        self.path.clear();
    }

    /// Children of the folder the path points at.
    ///
    /// A path that no longer resolves (stale or out-of-range index, or an
    /// index landing on a bookmark) is reset and the top level is returned.
    pub fn descend<'t>(&mut self, tree: &'t [Node]) -> &'t [Node] {
        match resolve(&self.path, tree) {
            Some(children) => children,
            None => {
                warn!("Invalid navigation path {:?}; returning to top level", self.path);
                self.path.clear();
                tree
            }
        }
    }

    /// Names of the folders along the path, outermost first. Resets the path
    /// like [`Navigator::descend`] when it does not resolve.
    pub fn breadcrumbs(&mut self, tree: &[Node]) -> Vec<String> {
        let mut names = Vec::with_capacity(self.path.len());
        let mut level = tree;
        for &index in &self.path {
            match level.get(index) {
                Some(Node::Folder(folder)) => {
                    names.push(folder.name.clone());
                    level = &folder.children;
                }
                _ => {
                    warn!("Invalid navigation path {:?}; returning to top level", self.path);
                    self.path.clear();
                    return Vec::new();
                }
            }
        }
        names
    }
}

fn resolve<'t>(path: &[usize], tree: &'t [Node]) -> Option<&'t [Node]> {
    path.iter().try_fold(tree, |level, &index| match level.get(index)? {
        Node::Folder(folder) => Some(folder.children.as_slice()),
        Node::Bookmark(_) => None,
    })
}
