//! Pairs the entries of two revisions of a submission into one diff tree.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::model::{DiffNode, FileTreeNode, NodeId, NodeKind};

/// Side of a comparison a source node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Student,
    Teacher,
}

/// What the other revision holds for a given file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revision {
    /// Matched with a file that has a different id.
    Counterpart(NodeId),
    /// Nothing with this name exists in the other revision.
    Absent,
    /// The other revision has a directory under this name, or this file
    /// replaced one.
    KindChanged,
}

/// Per-side map from file id to its [`Revision`]. Files matched with an
/// identical id have no entry.
#[derive(Debug, Clone, Default)]
pub struct RevisionTable {
    student: HashMap<NodeId, Revision>,
    teacher: HashMap<NodeId, Revision>,
}

impl RevisionTable {
    pub fn get(&self, side: Side, id: NodeId) -> Option<Revision> {
        self.side(side).get(&id).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.student.is_empty() && self.teacher.is_empty()
    }

    fn side(&self, side: Side) -> &HashMap<NodeId, Revision> {
        match side {
            Side::Student => &self.student,
            Side::Teacher => &self.teacher,
        }
    }

    fn set(&mut self, side: Side, id: NodeId, revision: Revision) {
        let map = match side {
            Side::Student => &mut self.student,
            Side::Teacher => &mut self.teacher,
        };
        map.insert(id, revision);
    }
}

/// Result of [`match_trees`]: both source trees, the merged diff tree, the
/// flattened id index and the revision side-table.
#[derive(Debug, Clone)]
pub struct FileTreeDiff {
    pub(crate) student: FileTreeNode,
    pub(crate) teacher: Option<FileTreeNode>,
    pub(crate) diff: DiffNode,
    pub(crate) flattened: HashMap<NodeId, String>,
    pub(crate) revisions: RevisionTable,
}

impl FileTreeDiff {
    pub fn student(&self) -> &FileTreeNode {
        &self.student
    }

    pub fn teacher(&self) -> Option<&FileTreeNode> {
        self.teacher.as_ref()
    }

    pub fn diff(&self) -> &DiffNode {
        &self.diff
    }

    /// Every id seen in either tree mapped to its name. Teacher names win
    /// when an id occurs on both sides.
    pub fn flattened(&self) -> &HashMap<NodeId, String> {
        &self.flattened
    }

    pub fn revisions(&self) -> &RevisionTable {
        &self.revisions
    }
}

#[derive(Debug, Default)]
struct MatchCounts {
    unchanged: usize,
    changed: usize,
    student_only: usize,
    teacher_only: usize,
    kind_changed: usize,
}

struct Matcher {
    revisions: RevisionTable,
    record: bool,
    counts: MatchCounts,
}

/// Match a student revision against an optional teacher revision.
///
/// The roots are not compared with each other; the diff root takes the
/// student root's name. Without a teacher tree every student file becomes a
/// `(id, None)` leaf and no revisions are recorded.
pub fn match_trees(student: FileTreeNode, teacher: Option<FileTreeNode>) -> FileTreeDiff {
    let mut matcher = Matcher {
        revisions: RevisionTable::default(),
        record: teacher.is_some(),
        counts: MatchCounts::default(),
    };

    let student_entries = student.entries().unwrap_or(&[]);
    let teacher_entries = teacher
        .as_ref()
        .and_then(|t| t.entries())
        .unwrap_or(&[]);
    let entries = matcher.match_entries(student_entries, teacher_entries);
    let diff = DiffNode::Directory {
        name: student.name().to_string(),
        entries,
    };

    let mut flattened = HashMap::new();
    index_tree(&student, &mut flattened);
    if let Some(t) = &teacher {
        index_tree(t, &mut flattened);
    }

    let c = &matcher.counts;
    tracing::debug!(
        unchanged = c.unchanged,
        changed = c.changed,
        student_only = c.student_only,
        teacher_only = c.teacher_only,
        kind_changed = c.kind_changed,
        ids = flattened.len(),
        "matched file trees"
    );

    FileTreeDiff {
        student,
        teacher,
        diff,
        flattened,
        revisions: matcher.revisions,
    }
}

impl Matcher {
    fn match_entries(
        &mut self,
        student: &[FileTreeNode],
        teacher: &[FileTreeNode],
    ) -> Vec<DiffNode> {
        let mut buckets: HashMap<(&str, NodeKind), VecDeque<usize>> = HashMap::new();
        for (i, t) in teacher.iter().enumerate() {
            buckets.entry((t.name(), t.kind())).or_default().push_back(i);
        }
        let student_keys: HashSet<(&str, NodeKind)> =
            student.iter().map(|s| (s.name(), s.kind())).collect();
        let teacher_keys: HashSet<(&str, NodeKind)> = buckets.keys().copied().collect();

        let mut used = vec![false; teacher.len()];
        let mut out = Vec::with_capacity(student.len().max(teacher.len()));

        for s in student {
            let paired = buckets
                .get_mut(&(s.name(), s.kind()))
                .and_then(|q| q.pop_front());
            match paired {
                Some(ti) => {
                    used[ti] = true;
                    out.push(self.pair(s, &teacher[ti]));
                }
                None => {
                    let clash = teacher_keys.contains(&(s.name(), other_kind(s.kind())));
                    out.push(self.one_sided(Side::Student, s, clash));
                }
            }
        }

        for (t, _) in teacher.iter().zip(used).filter(|(_, used)| !used) {
            let clash = student_keys.contains(&(t.name(), other_kind(t.kind())));
            out.push(self.one_sided(Side::Teacher, t, clash));
        }

        out
    }

    fn pair(&mut self, student: &FileTreeNode, teacher: &FileTreeNode) -> DiffNode {
        match (student, teacher) {
            (
                FileTreeNode::Directory { name, entries: se, .. },
                FileTreeNode::Directory { entries: te, .. },
            ) => DiffNode::Directory {
                name: name.clone(),
                entries: self.match_entries(se, te),
            },
            (FileTreeNode::File { name, id: sid }, FileTreeNode::File { id: tid, .. }) => {
                if sid == tid {
                    self.counts.unchanged += 1;
                } else {
                    self.counts.changed += 1;
                    if self.record {
                        self.revisions.set(Side::Student, *sid, Revision::Counterpart(*tid));
                        self.revisions.set(Side::Teacher, *tid, Revision::Counterpart(*sid));
                    }
                }
                DiffNode::File {
                    name: name.clone(),
                    ids: (Some(*sid), Some(*tid)),
                }
            }
            _ => unreachable!("entries are only paired with the same kind"),
        }
    }

    /// Emit a subtree that exists on one side only. Absence propagates all
    /// the way down to the leaves.
    fn one_sided(&mut self, side: Side, node: &FileTreeNode, clash: bool) -> DiffNode {
        match node {
            FileTreeNode::Directory { name, entries, .. } => DiffNode::Directory {
                name: name.clone(),
                entries: entries
                    .iter()
                    .map(|child| self.one_sided(side, child, false))
                    .collect(),
            },
            FileTreeNode::File { name, id } => {
                match side {
                    Side::Student => self.counts.student_only += 1,
                    Side::Teacher => self.counts.teacher_only += 1,
                }
                if self.record {
                    let revision = if clash {
                        self.counts.kind_changed += 1;
                        Revision::KindChanged
                    } else {
                        Revision::Absent
                    };
                    self.revisions.set(side, *id, revision);
                }
                let ids = match side {
                    Side::Student => (Some(*id), None),
                    Side::Teacher => (None, Some(*id)),
                };
                DiffNode::File {
                    name: name.clone(),
                    ids,
                }
            }
        }
    }
}

fn other_kind(kind: NodeKind) -> NodeKind {
    match kind {
        NodeKind::File => NodeKind::Dir,
        NodeKind::Dir => NodeKind::File,
    }
}

fn index_tree(root: &FileTreeNode, out: &mut HashMap<NodeId, String>) {
    let mut seen = HashSet::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        let fresh = seen.insert(node.id());
        debug_assert!(fresh, "duplicate id {} within one tree", node.id());
        out.insert(node.id(), node.name().to_string());
        if let Some(entries) = node.entries() {
            stack.extend(entries.iter().rev());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileTreeNode as N;

    fn leaf(name: &str, s: Option<u64>, t: Option<u64>) -> DiffNode {
        DiffNode::File {
            name: name.into(),
            ids: (s.map(NodeId), t.map(NodeId)),
        }
    }

    #[test]
    fn identical_trees_record_no_revisions() {
        let tree = N::dir("root", 1, vec![N::file("f", 2)]);
        let diff = match_trees(tree.clone(), Some(tree));
        assert_eq!(
            diff.diff,
            DiffNode::Directory {
                name: "root".into(),
                entries: vec![leaf("f", Some(2), Some(2))],
            }
        );
        assert!(diff.revisions.is_empty());
    }

    #[test]
    fn changed_file_links_both_sides() {
        let student = N::dir("root", 1, vec![N::file("f", 2)]);
        let teacher = N::dir("root", 1, vec![N::file("f", 9)]);
        let diff = match_trees(student, Some(teacher));
        assert_eq!(
            diff.revisions.get(Side::Student, NodeId(2)),
            Some(Revision::Counterpart(NodeId(9)))
        );
        assert_eq!(
            diff.revisions.get(Side::Teacher, NodeId(9)),
            Some(Revision::Counterpart(NodeId(2)))
        );
    }

    #[test]
    fn teacher_only_entries_follow_student_order() {
        let student = N::dir("root", 1, vec![N::file("b", 2), N::file("a", 3)]);
        let teacher = N::dir(
            "root",
            10,
            vec![N::file("z", 11), N::file("a", 12), N::file("y", 13)],
        );
        let diff = match_trees(student, Some(teacher));
        let names: Vec<_> = diff.diff.entries().unwrap().iter().map(|e| e.name()).collect();
        assert_eq!(names, ["b", "a", "z", "y"]);
        assert_eq!(
            diff.revisions.get(Side::Student, NodeId(2)),
            Some(Revision::Absent)
        );
        assert_eq!(
            diff.revisions.get(Side::Teacher, NodeId(13)),
            Some(Revision::Absent)
        );
    }

    #[test]
    fn kind_mismatch_yields_two_siblings() {
        let student = N::dir("root", 1, vec![N::dir("x", 2, vec![N::file("inner", 3)])]);
        let teacher = N::dir("root", 1, vec![N::file("x", 7)]);
        let diff = match_trees(student, Some(teacher));
        assert_eq!(
            diff.diff.entries().unwrap(),
            &[
                DiffNode::Directory {
                    name: "x".into(),
                    entries: vec![leaf("inner", Some(3), None)],
                },
                leaf("x", None, Some(7)),
            ]
        );
        assert_eq!(
            diff.revisions.get(Side::Teacher, NodeId(7)),
            Some(Revision::KindChanged)
        );
        assert_eq!(
            diff.revisions.get(Side::Student, NodeId(3)),
            Some(Revision::Absent)
        );
    }

    #[test]
    fn teacher_only_directory_propagates_absence() {
        let student = N::dir("root", 1, vec![]);
        let teacher = N::dir(
            "root",
            1,
            vec![N::dir("d", 2, vec![N::dir("e", 3, vec![N::file("f", 4)])])],
        );
        let diff = match_trees(student, Some(teacher));
        assert_eq!(
            diff.diff.entries().unwrap(),
            &[DiffNode::Directory {
                name: "d".into(),
                entries: vec![DiffNode::Directory {
                    name: "e".into(),
                    entries: vec![leaf("f", None, Some(4))],
                }],
            }]
        );
    }

    #[test]
    fn duplicate_names_pair_in_order() {
        let student = N::dir("root", 1, vec![N::file("a", 2), N::file("a", 3)]);
        let teacher = N::dir("root", 1, vec![N::file("a", 2)]);
        let diff = match_trees(student, Some(teacher));
        assert_eq!(
            diff.diff.entries().unwrap(),
            &[leaf("a", Some(2), Some(2)), leaf("a", Some(3), None)]
        );
    }

    #[test]
    fn missing_teacher_records_nothing() {
        let student = N::dir("root", 1, vec![N::dir("d", 2, vec![N::file("f", 3)])]);
        let diff = match_trees(student, None);
        assert!(diff.revisions.is_empty());
        assert_eq!(
            diff.diff.entries().unwrap(),
            &[DiffNode::Directory {
                name: "d".into(),
                entries: vec![leaf("f", Some(3), None)],
            }]
        );
    }

    #[test]
    fn flattened_indexes_both_trees_last_write_wins() {
        let student = N::dir("root", 1, vec![N::file("old", 2)]);
        let teacher = N::dir("root", 1, vec![N::file("new", 2), N::file("c", 3)]);
        let diff = match_trees(student, Some(teacher));
        assert_eq!(diff.flattened.get(&NodeId(2)).map(String::as_str), Some("new"));
        assert_eq!(diff.flattened.get(&NodeId(3)).map(String::as_str), Some("c"));
        assert_eq!(diff.flattened.get(&NodeId(1)).map(String::as_str), Some("root"));
        assert_eq!(diff.flattened.len(), 3);
    }
}
