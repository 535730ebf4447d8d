//! Lookups over a [`FileTreeDiff`]: by id, first visible file, revision
//! state and fuzzy path search.

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;

use crate::matcher::{FileTreeDiff, Revision, Side};
use crate::model::{DiffNode, FileTreeNode, NodeId, NodeRef, TreeView};

/// Classification of a diff leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffStatus {
    Unchanged,
    Changed,
    StudentOnly,
    TeacherOnly,
}

impl DiffStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffStatus::Unchanged => "unchanged",
            DiffStatus::Changed => "changed",
            DiffStatus::StudentOnly => "student-only",
            DiffStatus::TeacherOnly => "teacher-only",
        }
    }
}

/// A file of some view together with its slash-joined path below the root.
#[derive(Debug, Clone)]
pub struct Leaf<'a> {
    pub path: String,
    pub node: NodeRef<'a>,
}

#[derive(Debug, Clone)]
pub struct FuzzyHit<'a> {
    pub path: String,
    pub score: i64,
    pub node: NodeRef<'a>,
}

impl FileTreeDiff {
    /// Find a node by id. In the diff view either side's id of a leaf finds
    /// that leaf. Roots are never returned.
    pub fn search(&self, view: TreeView, id: NodeId) -> Option<NodeRef<'_>> {
        match view {
            TreeView::Student => find_source(children(&self.student), id).map(NodeRef::Student),
            TreeView::Teacher => {
                let teacher = self.teacher.as_ref()?;
                find_source(children(teacher), id).map(NodeRef::Teacher)
            }
            TreeView::Diff => find_diff(self.diff.entries().unwrap_or(&[]), id).map(NodeRef::Diff),
        }
    }

    /// First file in depth-first order whose name does not start with `.`.
    pub fn first_file(&self, view: TreeView) -> Option<NodeRef<'_>> {
        match view {
            TreeView::Student => first_source(children(&self.student)).map(NodeRef::Student),
            TreeView::Teacher => {
                let teacher = self.teacher.as_ref()?;
                first_source(children(teacher)).map(NodeRef::Teacher)
            }
            TreeView::Diff => first_diff(self.diff.entries().unwrap_or(&[])).map(NodeRef::Diff),
        }
    }

    /// Whether a node differs between the revisions.
    ///
    /// A file has a revision when the other side holds a different file,
    /// nothing, or a directory under its name. A directory has one when any
    /// file below it does. Without a teacher tree nothing has a revision.
    pub fn has_revision(&self, node: NodeRef<'_>) -> bool {
        match node {
            NodeRef::Student(n) => self.source_has_revision(Side::Student, n),
            NodeRef::Teacher(n) => self.source_has_revision(Side::Teacher, n),
            NodeRef::Diff(n) => self.diff_has_revision(n),
        }
    }

    /// Revision state of a file; `None` for directories and unchanged files.
    pub fn revision(&self, node: NodeRef<'_>) -> Option<Revision> {
        match node {
            NodeRef::Student(FileTreeNode::File { id, .. }) => {
                self.revisions.get(Side::Student, *id)
            }
            NodeRef::Teacher(FileTreeNode::File { id, .. }) => {
                self.revisions.get(Side::Teacher, *id)
            }
            NodeRef::Diff(DiffNode::File { ids, .. }) => match ids {
                (Some(s), _) => self.revisions.get(Side::Student, *s),
                (None, Some(t)) => self.revisions.get(Side::Teacher, *t),
                (None, None) => None,
            },
            _ => None,
        }
    }

    /// Id of the counterpart file in the other revision. `None` when there
    /// is no counterpart or the counterpart is a directory.
    pub fn revision_id(&self, node: NodeRef<'_>) -> Option<NodeId> {
        match self.revision(node)? {
            Revision::Counterpart(id) => Some(id),
            Revision::Absent | Revision::KindChanged => None,
        }
    }

    pub fn status(&self, node: &DiffNode) -> Option<DiffStatus> {
        let status = match node.ids()? {
            (Some(s), Some(t)) if s == t => DiffStatus::Unchanged,
            (Some(_), Some(_)) => DiffStatus::Changed,
            (Some(_), None) => DiffStatus::StudentOnly,
            (None, Some(_)) => DiffStatus::TeacherOnly,
            (None, None) => return None,
        };
        Some(status)
    }

    /// All files of a view in depth-first order.
    pub fn leaves(&self, view: TreeView) -> Vec<Leaf<'_>> {
        let mut out = Vec::new();
        match view {
            TreeView::Student => {
                collect_source(children(&self.student), "", &NodeRef::Student, &mut out)
            }
            TreeView::Teacher => {
                if let Some(teacher) = &self.teacher {
                    collect_source(children(teacher), "", &NodeRef::Teacher, &mut out);
                }
            }
            TreeView::Diff => collect_diff(self.diff.entries().unwrap_or(&[]), "", &mut out),
        }
        out
    }

    /// Files of a view whose path fuzzily matches `pattern`, best first.
    pub fn fuzzy_find(&self, view: TreeView, pattern: &str) -> Vec<FuzzyHit<'_>> {
        let matcher = SkimMatcherV2::default();
        let mut hits: Vec<FuzzyHit<'_>> = self
            .leaves(view)
            .into_iter()
            .filter_map(|leaf| {
                let score = matcher.fuzzy_match(&leaf.path, pattern)?;
                Some(FuzzyHit {
                    path: leaf.path,
                    score,
                    node: leaf.node,
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.path.cmp(&b.path)));
        hits
    }

    fn source_has_revision(&self, side: Side, node: &FileTreeNode) -> bool {
        match node {
            FileTreeNode::File { id, .. } => self.revisions.get(side, *id).is_some(),
            FileTreeNode::Directory { entries, .. } => {
                entries.iter().any(|e| self.source_has_revision(side, e))
            }
        }
    }

    fn diff_has_revision(&self, node: &DiffNode) -> bool {
        match node {
            DiffNode::File { ids: (s, t), .. } => {
                s.is_some_and(|id| self.revisions.get(Side::Student, id).is_some())
                    || t.is_some_and(|id| self.revisions.get(Side::Teacher, id).is_some())
            }
            DiffNode::Directory { entries, .. } => {
                entries.iter().any(|e| self.diff_has_revision(e))
            }
        }
    }
}

fn children(root: &FileTreeNode) -> &[FileTreeNode] {
    root.entries().unwrap_or(&[])
}

fn find_source(entries: &[FileTreeNode], id: NodeId) -> Option<&FileTreeNode> {
    entries.iter().find_map(|e| {
        if e.id() == id {
            return Some(e);
        }
        find_source(e.entries()?, id)
    })
}

fn find_diff(entries: &[DiffNode], id: NodeId) -> Option<&DiffNode> {
    entries.iter().find_map(|e| match e {
        DiffNode::File { ids: (s, t), .. } => (*s == Some(id) || *t == Some(id)).then_some(e),
        DiffNode::Directory { entries, .. } => find_diff(entries, id),
    })
}

fn first_source(entries: &[FileTreeNode]) -> Option<&FileTreeNode> {
    entries.iter().find_map(|e| match e {
        FileTreeNode::File { name, .. } => (!name.starts_with('.')).then_some(e),
        FileTreeNode::Directory { entries, .. } => first_source(entries),
    })
}

fn first_diff(entries: &[DiffNode]) -> Option<&DiffNode> {
    entries.iter().find_map(|e| match e {
        DiffNode::File { name, .. } => (!name.starts_with('.')).then_some(e),
        DiffNode::Directory { entries, .. } => first_diff(entries),
    })
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

fn collect_source<'a>(
    entries: &'a [FileTreeNode],
    prefix: &str,
    wrap: &dyn Fn(&'a FileTreeNode) -> NodeRef<'a>,
    out: &mut Vec<Leaf<'a>>,
) {
    for e in entries {
        let path = join(prefix, e.name());
        match e.entries() {
            Some(children) => collect_source(children, &path, wrap, out),
            None => out.push(Leaf { path, node: wrap(e) }),
        }
    }
}

fn collect_diff<'a>(entries: &'a [DiffNode], prefix: &str, out: &mut Vec<Leaf<'a>>) {
    for e in entries {
        let path = join(prefix, e.name());
        match e.entries() {
            Some(children) => collect_diff(children, &path, out),
            None => out.push(Leaf {
                path,
                node: NodeRef::Diff(e),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::match_trees;
    use crate::model::FileTreeNode as N;

    fn sample() -> FileTreeDiff {
        let student = N::dir(
            "root",
            1,
            vec![
                N::file(".hidden", 2),
                N::dir("src", 3, vec![N::file("main.rs", 4), N::file("lib.rs", 5)]),
            ],
        );
        let teacher = N::dir(
            "root",
            1,
            vec![N::dir("src", 3, vec![N::file("main.rs", 14), N::file("lib.rs", 5)])],
        );
        match_trees(student, Some(teacher))
    }

    #[test]
    fn search_skips_root_and_finds_directories() {
        let diff = sample();
        assert!(diff.search(TreeView::Student, NodeId(1)).is_none());
        let src = diff.search(TreeView::Student, NodeId(3)).unwrap();
        assert_eq!(src.name(), "src");
        assert!(src.is_dir());
        assert!(diff.search(TreeView::Teacher, NodeId(4)).is_none());
        assert!(diff.search(TreeView::Diff, NodeId(99)).is_none());
    }

    #[test]
    fn diff_search_finds_leaf_from_either_side() {
        let diff = sample();
        let from_student = diff.search(TreeView::Diff, NodeId(4)).unwrap();
        let from_teacher = diff.search(TreeView::Diff, NodeId(14)).unwrap();
        match (from_student, from_teacher) {
            (NodeRef::Diff(a), NodeRef::Diff(b)) => assert!(std::ptr::eq(a, b)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn first_file_skips_dot_files() {
        let diff = sample();
        assert_eq!(diff.first_file(TreeView::Student).unwrap().name(), "main.rs");
        assert_eq!(diff.first_file(TreeView::Diff).unwrap().name(), "main.rs");

        let only_hidden = match_trees(N::dir("root", 1, vec![N::file(".git", 2)]), None);
        assert!(only_hidden.first_file(TreeView::Student).is_none());
        assert!(only_hidden.first_file(TreeView::Teacher).is_none());
    }

    #[test]
    fn revision_state_per_node() {
        let diff = sample();
        let main = diff.search(TreeView::Student, NodeId(4)).unwrap();
        let lib = diff.search(TreeView::Student, NodeId(5)).unwrap();
        let hidden = diff.search(TreeView::Student, NodeId(2)).unwrap();
        let src = diff.search(TreeView::Student, NodeId(3)).unwrap();

        assert!(diff.has_revision(main));
        assert_eq!(diff.revision_id(main), Some(NodeId(14)));
        assert!(!diff.has_revision(lib));
        assert_eq!(diff.revision_id(lib), None);
        assert!(diff.has_revision(hidden));
        assert_eq!(diff.revision(hidden), Some(Revision::Absent));
        assert_eq!(diff.revision_id(hidden), None);
        assert!(diff.has_revision(src));

        let teacher_main = diff.search(TreeView::Teacher, NodeId(14)).unwrap();
        assert_eq!(diff.revision_id(teacher_main), Some(NodeId(4)));
    }

    #[test]
    fn kind_change_has_revision_without_id() {
        let student = N::dir("root", 1, vec![N::file("x", 2)]);
        let teacher = N::dir("root", 1, vec![N::dir("x", 3, vec![N::file("y", 4)])]);
        let diff = match_trees(student, Some(teacher));
        let x = diff.search(TreeView::Student, NodeId(2)).unwrap();
        assert!(diff.has_revision(x));
        assert_eq!(diff.revision_id(x), None);
        assert_eq!(diff.revision(x), Some(Revision::KindChanged));
    }

    #[test]
    fn status_classifies_leaves() {
        let diff = sample();
        let statuses: Vec<_> = diff
            .leaves(TreeView::Diff)
            .into_iter()
            .map(|leaf| match leaf.node {
                NodeRef::Diff(n) => (leaf.path, diff.status(n).unwrap()),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(
            statuses,
            vec![
                (".hidden".to_string(), DiffStatus::StudentOnly),
                ("src/main.rs".to_string(), DiffStatus::Changed),
                ("src/lib.rs".to_string(), DiffStatus::Unchanged),
            ]
        );
    }

    #[test]
    fn fuzzy_find_ranks_paths() {
        let diff = sample();
        let hits = diff.fuzzy_find(TreeView::Diff, "srcmain");
        assert_eq!(hits.first().map(|h| h.path.as_str()), Some("src/main.rs"));
        assert!(diff.fuzzy_find(TreeView::Student, "zzz").is_empty());
    }
}
