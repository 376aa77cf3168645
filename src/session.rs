use std::sync::atomic::AtomicBool;
use std::time::Duration;

use log::{info, warn};
use thiserror::Error;

use crate::dead_links::{filter_dead_links, DeadLinkReport, LinkProbe, ProbeProgress};
use crate::dedupe::dedupe_with_report;
use crate::grouping::group_by_site;
use crate::importer::{self, ParseError};
use crate::navigator::Navigator;
use crate::storage::{load_tree, save_tree, KeyValueStore, StorageError};
use crate::tree::{
    count_bookmarks, flatten, sorted_view, Bookmark, ItemSummary, Node, SortOrder, Tree,
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a dead-link check is running")]
    Busy,
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// The in-memory change was applied; only persisting it failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The check's result replaced the tree but could not be saved.
    #[error(
        "kept {} reachable and dropped {} broken links, but saving failed: {source}",
        .report.valid.len(),
        .report.broken.len()
    )]
    ReportNotSaved {
        report: DeadLinkReport,
        #[source]
        source: StorageError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupeOutcome {
    NoneFound,
    Removed(usize),
}

/// The open bookmark collection: the current tree, where the user is in it,
/// the single undo snapshot and the store everything is saved to.
///
/// The tree is only ever replaced as a whole. Every replacement resets the
/// navigation path and is saved right away.
pub struct Session<S: KeyValueStore> {
    store: S,
    key: String,
    tree: Tree,
    navigator: Navigator,
    snapshot: Option<Tree>,
    busy: bool,
}

impl<S: KeyValueStore> Session<S> {
    /// Open the collection stored under `key`, starting empty when nothing
    /// usable is stored.
    pub fn open(store: S, key: impl Into<String>) -> Self {
        let key = key.into();
        let tree = load_tree(&store, &key).unwrap_or_default();
        info!("Opened bookmark collection '{}' ({} bookmarks)", key, count_bookmarks(&tree));
        Self {
            store,
            key,
            tree,
            navigator: Navigator::new(),
            snapshot: None,
            busy: false,
        }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn path(&self) -> &[usize] {
        self.navigator.path()
    }

    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        if self.busy {
            Err(SessionError::Busy)
        } else {
            Ok(())
        }
    }

    fn replace_tree(&mut self, tree: Tree) -> Result<(), SessionError> {
        self.tree = tree;
        self.navigator.reset();
        save_tree(&self.store, &self.key, &self.tree)?;
        Ok(())
    }

    fn replace_with_snapshot(&mut self, tree: Tree) -> Result<(), SessionError> {
        let previous = std::mem::replace(&mut self.tree, Tree::new());
        self.snapshot = Some(previous);
        self.replace_tree(tree)
    }

    // ---- Import ----

    /// Replace the collection with a parsed export. On a parse error nothing
    /// changes. Returns the number of imported bookmarks.
    pub fn import(&mut self, markup: &str) -> Result<usize, SessionError> {
        self.ensure_idle()?;
        let tree = importer::parse(markup)?;
        self.install_import(tree)
    }

    pub fn import_bytes(&mut self, bytes: &[u8]) -> Result<usize, SessionError> {
        self.ensure_idle()?;
        let tree = importer::parse_bytes(bytes)?;
        self.install_import(tree)
    }

    fn install_import(&mut self, tree: Tree) -> Result<usize, SessionError> {
        let count = count_bookmarks(&tree);
        self.snapshot = None;
        self.replace_tree(tree)?;
        info!("Imported {} bookmarks", count);
        Ok(count)
    }

    /// Drop the whole collection and its stored copy.
    pub fn clear(&mut self) -> Result<(), SessionError> {
        self.ensure_idle()?;
        self.tree.clear();
        self.snapshot = None;
        self.navigator.reset();
        self.store.clear(&self.key);
        Ok(())
    }

    // ---- Transforms ----

    pub fn group_by_site(&mut self) -> Result<(), SessionError> {
        self.ensure_idle()?;
        let grouped = group_by_site(&flatten(&self.tree));
        info!("Grouped collection into {} site folders", grouped.len());
        self.replace_with_snapshot(grouped)
    }

    /// Remove duplicate URLs. When there are none the tree and the snapshot
    /// are left alone.
    pub fn dedupe(&mut self) -> Result<DedupeOutcome, SessionError> {
        self.ensure_idle()?;
        let (deduped, removed) = dedupe_with_report(&self.tree);
        if removed == 0 {
            return Ok(DedupeOutcome::NoneFound);
        }
        info!("Removed {} duplicate bookmarks", removed);
        self.replace_with_snapshot(deduped)?;
        Ok(DedupeOutcome::Removed(removed))
    }

    /// Put the tree from before the last transform back. The snapshot is
    /// consumed. Returns false when there was nothing to restore.
    pub fn restore_snapshot(&mut self) -> Result<bool, SessionError> {
        self.ensure_idle()?;
        let Some(previous) = self.snapshot.take() else {
            return Ok(false);
        };
        self.replace_tree(previous)?;
        info!("Restored previous structure");
        Ok(true)
    }

    // ---- Dead Links ----

    /// Enter the busy state and hand out the bookmarks to probe. The tree is
    /// not touched until [`Session::finish_dead_link_check`].
    pub fn begin_dead_link_check(&mut self) -> Result<Vec<Bookmark>, SessionError> {
        self.ensure_idle()?;
        self.busy = true;
        Ok(flatten(&self.tree))
    }

    /// Leave the busy state. A complete report replaces the tree with a single
    /// folder of the reachable bookmarks; a cancelled one changes nothing.
    /// Returns whether the tree was replaced.
    pub fn finish_dead_link_check(&mut self, report: DeadLinkReport) -> Result<bool, SessionError> {
        if !self.busy {
            warn!("Dead-link result delivered without a running check");
        }
        self.busy = false;
        if report.cancelled {
            return Ok(false);
        }
        info!(
            "Dropping {} unreachable bookmarks, keeping {}",
            report.broken.len(),
            report.valid.len()
        );
        self.replace_with_snapshot(report.into_tree())?;
        Ok(true)
    }

    /// Run a whole check while holding the session. Nothing else can touch the
    /// session until it completes.
    pub async fn check_dead_links<P, F>(
        &mut self,
        probe: &P,
        pace: Duration,
        on_progress: F,
    ) -> Result<DeadLinkReport, SessionError>
    where
        P: LinkProbe + ?Sized,
        F: FnMut(&ProbeProgress),
    {
        let bookmarks = self.begin_dead_link_check()?;
        let cancel = AtomicBool::new(false);
        let report = filter_dead_links(bookmarks, probe, pace, on_progress, &cancel).await;
        match self.finish_dead_link_check(report.clone()) {
            Ok(_) => Ok(report),
            Err(SessionError::Storage(source)) => {
                Err(SessionError::ReportNotSaved { report, source })
            }
            Err(e) => Err(e),
        }
    }

    // ---- Navigation ----

    pub fn current_items(&mut self) -> &[Node] {
        self.navigator.descend(&self.tree)
    }

    /// The current folder in the requested order, ready for rendering.
    pub fn view(&mut self, order: SortOrder) -> Vec<ItemSummary> {
        let items = self.navigator.descend(&self.tree);
        sorted_view(items, order)
            .iter()
            .map(ItemSummary::from_view)
            .collect()
    }

    /// Open the folder at `index` of the current (unsorted) folder. Returns
    /// false, leaving the location unchanged, when it is not a folder.
    pub fn enter(&mut self, index: usize) -> bool {
        let is_folder = self
            .navigator
            .descend(&self.tree)
            .get(index)
            .map_or(false, Node::is_folder);
        if is_folder {
            self.navigator.push(index);
        }
        is_folder
    }

    pub fn back(&mut self) {
        self.navigator.pop();
    }

    pub fn breadcrumbs(&mut self) -> Vec<String> {
        self.navigator.breadcrumbs(&self.tree)
    }
}
