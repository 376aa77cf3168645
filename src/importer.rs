use log::{debug, info};
use scraper::{ElementRef, Html};
use thiserror::Error;

use crate::tree::{Bookmark, Folder, Node, Tree};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("bookmark file is not valid UTF-8 (first invalid byte at offset {valid_up_to})")]
    Encoding { valid_up_to: usize },
    #[error("no bookmark markup found (expected <DL>, <H3> or <A> elements)")]
    NotBookmarkExport,
}

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Decode raw file contents and parse them.
pub fn parse_bytes(bytes: &[u8]) -> Result<Tree, ParseError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let text = std::str::from_utf8(bytes).map_err(|e| ParseError::Encoding {
        valid_up_to: e.valid_up_to(),
    })?;
    parse(text)
}

/// Parse a Netscape bookmark export (`<DL>` lists of `<DT><H3>` folder headers
/// and `<DT><A HREF>` entries) into a tree.
///
/// The markup is loaded into an HTML5 document first, so missing or stray
/// closing tags are repaired the way a browser would. The document is then
/// walked with an explicit stack: an `<H3>` header opens a folder for the next
/// `<DL>` entered, and leaving that `<DL>` closes it. A header that never gets
/// a list becomes an empty folder once the surrounding list ends.
///
/// An `<A>` left unclosed is re-opened by the HTML5 repair around later text,
/// so the document can hold copies of it that were never in the file. Those
/// copies are walked through but never become bookmarks.
pub fn parse(markup: &str) -> Result<Tree, ParseError> {
    let document = Html::parse_document(markup);
    let mut builder = TreeBuilder::default();
    let mut frames = vec![Frame::new(document.root_element(), Context::Block)];

    while let Some(frame) = frames.last_mut() {
        let context = frame.context;
        let Some(element) = frame.next_child() else {
            if let Some(finished) = frames.pop() {
                if let Some(opened_folder) = finished.list {
                    builder.close_list(opened_folder);
                }
            }
            continue;
        };

        let name = element.value().name();
        let mut child = Frame::new(element, context.enter(name));
        match name {
            "h3" => {
                builder.saw_markup = true;
                builder.header(element);
            }
            "a" => {
                builder.saw_markup = true;
                builder.anchor(element, context);
            }
            "dl" => {
                builder.saw_markup = true;
                child.list = Some(builder.open_list());
            }
            _ => {}
        }
        frames.push(child);
    }

    if !builder.saw_markup {
        return Err(ParseError::NotBookmarkExport);
    }

    let tree = builder.finish();
    info!(
        "Parsed bookmark export: {} top-level items, {} bookmarks",
        tree.len(),
        crate::tree::count_bookmarks(&tree)
    );
    Ok(tree)
}

// ---- Traversal ----

/// What the text of an element belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Block,
    /// Inside an `<H3>`: part of a folder name.
    Header,
    /// Inside a `<DD>`: a description, never a title.
    Description,
}

impl Context {
    fn enter(self, name: &str) -> Self {
        match name {
            "h3" => Context::Header,
            "dd" => Context::Description,
            name if is_block(name) => Context::Block,
            _ => self,
        }
    }
}

fn is_block(name: &str) -> bool {
    matches!(
        name,
        "html" | "head" | "body" | "dl" | "dt" | "dd" | "p" | "div" | "h1" | "h2" | "h3" | "h4"
            | "h5" | "h6"
    )
}

struct Frame<'a> {
    children: Vec<ElementRef<'a>>,
    next: usize,
    context: Context,
    /// Set for `<DL>` frames: whether entering the list opened a folder.
    list: Option<bool>,
}

impl<'a> Frame<'a> {
    fn new(element: ElementRef<'a>, context: Context) -> Self {
        Self {
            children: element.children().filter_map(ElementRef::wrap).collect(),
            next: 0,
            context,
            list: None,
        }
    }

    fn next_child(&mut self) -> Option<ElementRef<'a>> {
        let child = self.children.get(self.next).copied();
        self.next += 1;
        child
    }
}

#[derive(Default)]
struct TreeBuilder {
    root: Vec<Node>,
    /// Folders currently open, innermost last. Empty means the implicit root.
    open: Vec<Folder>,
    /// Header seen but its list not yet entered.
    pending: Option<Folder>,
    /// Target of the most recent real anchor, to recognise repaired copies.
    last_href: Option<String>,
    saw_markup: bool,
}

impl TreeBuilder {
    fn current_children(&mut self) -> &mut Vec<Node> {
        match self.open.last_mut() {
            Some(folder) => &mut folder.children,
            None => &mut self.root,
        }
    }

    fn flush_pending(&mut self) {
        if let Some(folder) = self.pending.take() {
            debug!("Folder '{}' has no list; keeping it empty", folder.name);
            self.current_children().push(Node::Folder(folder));
        }
    }

    fn header(&mut self, element: ElementRef<'_>) {
        self.flush_pending();
        let mut folder = Folder::new(inline_text(element), Vec::new());
        folder.add_date = timestamp_attr(element, "add_date");
        folder.last_modified = timestamp_attr(element, "last_modified");
        self.pending = Some(folder);
    }

    fn anchor(&mut self, element: ElementRef<'_>, context: Context) {
        if context == Context::Header {
            return;
        }
        let Some(href) = element.value().attr("href") else {
            return;
        };
        let url = href.trim().to_string();
        let text = inline_text(element);

        let repeats_last = self.last_href.as_deref() == Some(url.as_str());
        if repeats_last && (text.is_empty() || context == Context::Description) {
            debug!("Skipping repaired copy of <A> for {}", url);
            return;
        }

        self.flush_pending();
        self.last_href = Some(url.clone());
        let title = if text.is_empty() { url.clone() } else { text };
        self.current_children().push(Node::Bookmark(Bookmark {
            title,
            url,
            add_date: timestamp_attr(element, "add_date"),
            icon: element
                .value()
                .attr("icon")
                .filter(|icon| !icon.is_empty())
                .map(str::to_string),
        }));
    }

    /// Returns true when the list belongs to a pending folder header.
    fn open_list(&mut self) -> bool {
        match self.pending.take() {
            Some(folder) => {
                self.open.push(folder);
                true
            }
            None => false,
        }
    }

    fn close_list(&mut self, opened_folder: bool) {
        self.flush_pending();
        if !opened_folder {
            return;
        }
        if let Some(folder) = self.open.pop() {
            self.current_children().push(Node::Folder(folder));
        }
    }

    fn finish(mut self) -> Tree {
        self.flush_pending();
        self.root
    }
}

/// Text of an element without the text of nested lists, entries or headers.
fn inline_text(element: ElementRef<'_>) -> String {
    let mut text = String::new();
    let mut stack: Vec<_> = element.children().collect();
    stack.reverse();
    while let Some(node) = stack.pop() {
        if let Some(chunk) = node.value().as_text() {
            text.push_str(chunk);
        } else if let Some(child) = ElementRef::wrap(node) {
            if !is_block(child.value().name()) {
                let from = stack.len();
                stack.extend(child.children());
                stack[from..].reverse();
            }
        }
    }
    text.trim().to_string()
}

fn timestamp_attr(element: ElementRef<'_>, name: &str) -> Option<i64> {
    element.value().attr(name)?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{count_bookmarks, flatten};

    const EXPORT: &str = r#"<!DOCTYPE NETSCAPE-Bookmark-file-1>
<!-- This is an automatically generated file. -->
<META HTTP-EQUIV="Content-Type" CONTENT="text/html; charset=UTF-8">
<TITLE>Bookmarks</TITLE>
<H1>Bookmarks</H1>
<DL><p>
    <DT><H3 ADD_DATE="1700000000" LAST_MODIFIED="1700000500" PERSONAL_TOOLBAR_FOLDER="true">Bookmarks bar</H3>
    <DL><p>
        <DT><A HREF="https://www.rust-lang.org/" ADD_DATE="1700000100" ICON="data:image/png;base64,AAAA">  Rust  </A>
        <DT><H3>Docs</H3>
        <DL><p>
            <DT><A HREF="https://docs.rs/">docs.rs</A>
        </DL><p>
    </DL><p>
    <DT><A HREF="https://example.com/"></A>
</DL><p>
"#;

    fn folder(node: &Node) -> &Folder {
        node.as_folder().expect("expected folder")
    }

    fn bookmark(node: &Node) -> &Bookmark {
        match node {
            Node::Bookmark(b) => b,
            other => panic!("expected bookmark, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_browser_export() {
        let tree = parse(EXPORT).unwrap();
        assert_eq!(tree.len(), 2);

        let bar = folder(&tree[0]);
        assert_eq!(bar.name, "Bookmarks bar");
        assert_eq!(bar.add_date, Some(1_700_000_000));
        assert_eq!(bar.last_modified, Some(1_700_000_500));
        assert_eq!(bar.children.len(), 2);

        let rust = bookmark(&bar.children[0]);
        assert_eq!(rust.title, "Rust");
        assert_eq!(rust.url, "https://www.rust-lang.org/");
        assert_eq!(rust.add_date, Some(1_700_000_100));
        assert_eq!(rust.icon.as_deref(), Some("data:image/png;base64,AAAA"));

        let docs = folder(&bar.children[1]);
        assert_eq!(docs.name, "Docs");
        assert_eq!(bookmark(&docs.children[0]).title, "docs.rs");

        // Empty title falls back to the URL.
        let untitled = bookmark(&tree[1]);
        assert_eq!(untitled.title, "https://example.com/");
    }

    #[test]
    fn test_parse_compact_example() {
        let markup = r#"<DL><DT><H3>Work</H3><DL><DT><A HREF="https://a.com/x">A</A></DL><DT><A HREF="https://a.com/y">B</A></DL>"#;
        let tree = parse(markup).unwrap();
        assert_eq!(
            tree,
            vec![
                Node::Folder(Folder::new(
                    "Work",
                    vec![Node::Bookmark(Bookmark::new("A", "https://a.com/x"))]
                )),
                Node::Bookmark(Bookmark::new("B", "https://a.com/y")),
            ]
        );
    }

    #[test]
    fn test_header_without_list_is_empty_folder() {
        let markup = r#"<DL><p>
            <DT><H3>Empty</H3>
            <DT><A HREF="https://a.com/">A</A>
        </DL>"#;
        let tree = parse(markup).unwrap();
        assert_eq!(tree.len(), 2);
        assert!(folder(&tree[0]).children.is_empty());
        assert_eq!(bookmark(&tree[1]).title, "A");
    }

    #[test]
    fn test_unterminated_folders_close_at_end() {
        let markup = r#"<DL><p>
            <DT><H3>Outer</H3>
            <DL><p>
                <DT><A HREF="https://a.com/1">One</A>
                <DT><H3>Inner</H3>
                <DL><p>
                    <DT><A HREF="https://a.com/2">Two</A>"#;
        let tree = parse(markup).unwrap();
        assert_eq!(tree.len(), 1);
        let outer = folder(&tree[0]);
        assert_eq!(outer.children.len(), 2);
        let inner = folder(&outer.children[1]);
        assert_eq!(bookmark(&inner.children[0]).title, "Two");
    }

    #[test]
    fn test_stray_closing_markers_are_ignored() {
        let markup = r#"</DL></DL>
        <DL><p>
            <DT><A HREF="https://a.com/1">One</A>
        </DL></DL></DL>
        <DT><A HREF="https://a.com/2">Two</A>"#;
        let tree = parse(markup).unwrap();
        let titles: Vec<String> = flatten(&tree).into_iter().map(|b| b.title).collect();
        assert_eq!(titles, vec!["One", "Two"]);
    }

    #[test]
    fn test_unclosed_anchor_before_folder() {
        let markup = "<DL><p>\n<DT><A HREF=\"https://a.com/1\">One\n<DT><H3>Folder</H3>\n<DL><p>\n<DT><A HREF=\"https://b.com/\">Inside</A>\n</DL><p>\n<DT><A HREF=\"https://c.com/\">After</A>\n</DL>";
        let tree = parse(markup).unwrap();
        assert_eq!(
            tree,
            vec![
                Node::Bookmark(Bookmark::new("One", "https://a.com/1")),
                Node::Folder(Folder::new(
                    "Folder",
                    vec![Node::Bookmark(Bookmark::new("Inside", "https://b.com/"))]
                )),
                Node::Bookmark(Bookmark::new("After", "https://c.com/")),
            ]
        );
    }

    #[test]
    fn test_unclosed_anchor_with_description() {
        let markup = r#"<DL><DT><A HREF="https://a.com/">One<DD>About one<DT><A HREF="https://b.com/">Two</A></DL>"#;
        let tree = parse(markup).unwrap();
        assert_eq!(
            tree,
            vec![
                Node::Bookmark(Bookmark::new("One", "https://a.com/")),
                Node::Bookmark(Bookmark::new("Two", "https://b.com/")),
            ]
        );
    }

    #[test]
    fn test_unclosed_header_keeps_its_list() {
        let markup = r#"<DL><DT><H3>Folder<DL><DT><A HREF="https://a.com/">A</A></DL><DT><A HREF="https://b.com/">B</A></DL>"#;
        let tree = parse(markup).unwrap();
        assert_eq!(
            tree,
            vec![
                Node::Folder(Folder::new(
                    "Folder",
                    vec![Node::Bookmark(Bookmark::new("A", "https://a.com/"))]
                )),
                Node::Bookmark(Bookmark::new("B", "https://b.com/")),
            ]
        );
    }

    #[test]
    fn test_list_end_closes_waiting_header() {
        let markup = r#"<DL><DT><H3>Lonely</H3></DL><DL><DT><A HREF="https://x.com/">X</A></DL>"#;
        let tree = parse(markup).unwrap();
        assert_eq!(
            tree,
            vec![
                Node::Folder(Folder::new("Lonely", vec![])),
                Node::Bookmark(Bookmark::new("X", "https://x.com/")),
            ]
        );
    }

    #[test]
    fn test_repeated_url_with_title_is_kept() {
        let markup = r#"<DL><DT><A HREF="https://a.com/">First</A><DT><A HREF="https://a.com/">Second</A></DL>"#;
        let titles: Vec<String> = flatten(&parse(markup).unwrap())
            .into_iter()
            .map(|b| b.title)
            .collect();
        assert_eq!(titles, vec!["First", "Second"]);
    }

    #[test]
    fn test_lowercase_and_irregular_whitespace() {
        let markup = "<dl>\n<dt><h3\n add_date=\"12\">\n  Split\n  </h3>\n<dl><dt><a href=\"https://a.com/\"\n>\nA\n</a></dl></dl>";
        let tree = parse(markup).unwrap();
        let split = folder(&tree[0]);
        assert_eq!(split.name, "Split");
        assert_eq!(split.add_date, Some(12));
        assert_eq!(bookmark(&split.children[0]).title, "A");
    }

    #[test]
    fn test_anchor_without_href_is_skipped() {
        let markup = r#"<DL><DT><A NAME="x">Anchor</A><DT><A HREF="https://a.com/">Real</A></DL>"#;
        let tree = parse(markup).unwrap();
        assert_eq!(count_bookmarks(&tree), 1);
    }

    #[test]
    fn test_deep_nesting() {
        let depth = 200;
        let mut markup = String::new();
        for i in 0..depth {
            markup.push_str(&format!("<DL><DT><H3>f{}</H3>", i));
        }
        markup.push_str("<DL><DT><A HREF=\"https://deep.com/\">deep</A>");
        let tree = parse(&markup).unwrap();
        assert_eq!(count_bookmarks(&tree), 1);
        assert_eq!(flatten(&tree)[0].url, "https://deep.com/");
    }

    #[test]
    fn test_not_bookmark_export() {
        assert_eq!(parse("just some text"), Err(ParseError::NotBookmarkExport));
        assert_eq!(parse(""), Err(ParseError::NotBookmarkExport));
        assert_eq!(parse("<DL><p></DL>"), Ok(vec![]));
    }

    #[test]
    fn test_parse_bytes() {
        let mut bytes = b"\xEF\xBB\xBF".to_vec();
        bytes.extend_from_slice(br#"<DL><DT><A HREF="https://a.com/">A</A></DL>"#);
        assert_eq!(count_bookmarks(&parse_bytes(&bytes).unwrap()), 1);

        let err = parse_bytes(b"<DL>\xFF\xFE</DL>").unwrap_err();
        assert_eq!(err, ParseError::Encoding { valid_up_to: 4 });
    }
}
