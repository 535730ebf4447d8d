use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque identifier of a file or directory inside one revision snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(v: u64) -> Self {
        NodeId(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    File,
    Dir,
}

/// One entry of a revision's file hierarchy, as delivered by the API layer.
///
/// On the wire a directory is any record carrying `entries`; everything else
/// is a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileTreeNode {
    Directory {
        name: String,
        id: NodeId,
        entries: Vec<FileTreeNode>,
    },
    File {
        name: String,
        id: NodeId,
    },
}

impl FileTreeNode {
    pub fn file(name: impl Into<String>, id: impl Into<NodeId>) -> Self {
        FileTreeNode::File {
            name: name.into(),
            id: id.into(),
        }
    }

    pub fn dir(name: impl Into<String>, id: impl Into<NodeId>, entries: Vec<FileTreeNode>) -> Self {
        FileTreeNode::Directory {
            name: name.into(),
            id: id.into(),
            entries,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FileTreeNode::File { name, .. } | FileTreeNode::Directory { name, .. } => name,
        }
    }

    pub fn id(&self) -> NodeId {
        match self {
            FileTreeNode::File { id, .. } | FileTreeNode::Directory { id, .. } => *id,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            FileTreeNode::File { .. } => NodeKind::File,
            FileTreeNode::Directory { .. } => NodeKind::Dir,
        }
    }

    /// Children of a directory, `None` for files.
    pub fn entries(&self) -> Option<&[FileTreeNode]> {
        match self {
            FileTreeNode::Directory { entries, .. } => Some(entries),
            FileTreeNode::File { .. } => None,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, FileTreeNode::Directory { .. })
    }
}

/// Node of the merged tree produced by matching two revisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DiffNode {
    Directory {
        name: String,
        entries: Vec<DiffNode>,
    },
    /// `ids` is `(student, teacher)`; `None` marks absence in that revision.
    File {
        name: String,
        ids: (Option<NodeId>, Option<NodeId>),
    },
}

impl DiffNode {
    pub fn name(&self) -> &str {
        match self {
            DiffNode::File { name, .. } | DiffNode::Directory { name, .. } => name,
        }
    }

    pub fn entries(&self) -> Option<&[DiffNode]> {
        match self {
            DiffNode::Directory { entries, .. } => Some(entries),
            DiffNode::File { .. } => None,
        }
    }

    pub fn ids(&self) -> Option<(Option<NodeId>, Option<NodeId>)> {
        match self {
            DiffNode::File { ids, .. } => Some(*ids),
            DiffNode::Directory { .. } => None,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, DiffNode::Directory { .. })
    }
}

/// Which of the three trees a query addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeView {
    Student,
    Teacher,
    Diff,
}

impl FromStr for TreeView {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(TreeView::Student),
            "teacher" => Ok(TreeView::Teacher),
            "diff" => Ok(TreeView::Diff),
            other => Err(format!("unknown view `{other}`, expected student, teacher or diff")),
        }
    }
}

impl fmt::Display for TreeView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TreeView::Student => "student",
            TreeView::Teacher => "teacher",
            TreeView::Diff => "diff",
        };
        f.write_str(s)
    }
}

/// A borrowed node that remembers which view it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRef<'a> {
    Student(&'a FileTreeNode),
    Teacher(&'a FileTreeNode),
    Diff(&'a DiffNode),
}

impl<'a> NodeRef<'a> {
    pub fn name(&self) -> &'a str {
        match *self {
            NodeRef::Student(n) | NodeRef::Teacher(n) => n.name(),
            NodeRef::Diff(n) => n.name(),
        }
    }

    pub fn is_dir(&self) -> bool {
        match self {
            NodeRef::Student(n) | NodeRef::Teacher(n) => n.is_dir(),
            NodeRef::Diff(n) => n.is_dir(),
        }
    }

    pub fn view(&self) -> TreeView {
        match self {
            NodeRef::Student(_) => TreeView::Student,
            NodeRef::Teacher(_) => TreeView::Teacher,
            NodeRef::Diff(_) => TreeView::Diff,
        }
    }
}
