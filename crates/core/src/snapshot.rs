//! Build a [`FileTreeNode`] from a directory on disk.

use ignore::{WalkBuilder, WalkState};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::{SnapshotError, TreeError};
use crate::model::{FileTreeNode, NodeId};

/// A scanned directory: its tree plus the path behind every id.
///
/// Symbolic links are never followed. Each one becomes a file leaf whose
/// content is the link target, so a link to a directory does not pull that
/// directory into the tree.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub root: PathBuf,
    pub tree: FileTreeNode,
    paths: HashMap<NodeId, PathBuf>,
    links: HashSet<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Dir,
    File,
    Symlink,
}

impl Snapshot {
    /// Walk `root` in parallel and assemble a tree with deterministic ids:
    /// the root is 0, everything else is numbered depth-first by name.
    pub fn scan(root: impl AsRef<Path>) -> Result<Snapshot, SnapshotError> {
        let root = root.as_ref().to_path_buf();
        let md = std::fs::metadata(&root).map_err(|source| SnapshotError::Io {
            path: root.clone(),
            source,
        })?;
        if !md.is_dir() {
            return Err(SnapshotError::NotADirectory(root));
        }

        let found: Mutex<Vec<(PathBuf, EntryKind)>> = Mutex::new(Vec::with_capacity(1024));

        let mut builder = WalkBuilder::new(&root);
        builder
            .hidden(false)
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .parents(false)
            .follow_links(false)
            .threads(num_cpus::get());

        let found_ref = &found;
        builder.build_parallel().run(move || {
            Box::new(move |entry| {
                match entry {
                    Ok(ent) => {
                        if ent.depth() > 0 {
                            let kind = match ent.file_type() {
                                Some(ft) if ft.is_symlink() => EntryKind::Symlink,
                                Some(ft) if ft.is_dir() => EntryKind::Dir,
                                _ => EntryKind::File,
                            };
                            found_ref.lock().push((ent.path().to_path_buf(), kind));
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "skipping unreadable entry"),
                }
                WalkState::Continue
            })
        });

        let found = found.into_inner();
        tracing::debug!(root = %root.display(), entries = found.len(), "scanned directory");
        Ok(build_snapshot(root, found))
    }

    pub fn path_of(&self, id: NodeId) -> Option<&Path> {
        self.paths.get(&id).map(PathBuf::as_path)
    }

    pub fn is_link(&self, id: NodeId) -> bool {
        self.links.contains(&id)
    }

    /// Content of a file leaf. For a symbolic link this is the link target
    /// rather than whatever it points at.
    pub fn read(&self, id: NodeId) -> Result<Vec<u8>, SnapshotError> {
        let path = self.path_of(id).ok_or(SnapshotError::UnknownId(id))?;
        let io_err = |source: std::io::Error| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        };
        if self.is_link(id) {
            let target = std::fs::read_link(path).map_err(io_err)?;
            Ok(target.to_string_lossy().into_owned().into_bytes())
        } else {
            std::fs::read(path).map_err(io_err)
        }
    }
}

/// Read a tree in the API's JSON shape from a file.
pub fn read_tree(path: impl AsRef<Path>) -> Result<FileTreeNode, TreeError> {
    let path = path.as_ref();
    let raw = std::fs::read(path).map_err(|source| TreeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&raw).map_err(|source| TreeError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Default)]
struct DirBuilder {
    dirs: BTreeMap<String, DirBuilder>,
    files: BTreeMap<String, (PathBuf, bool)>,
}

fn build_snapshot(root: PathBuf, found: Vec<(PathBuf, EntryKind)>) -> Snapshot {
    let mut top = DirBuilder::default();
    for (path, kind) in found {
        let Ok(rel) = path.strip_prefix(&root) else {
            continue;
        };
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let Some((last, parents)) = parts.split_last() else {
            continue;
        };
        let mut dir = &mut top;
        for part in parents {
            dir = dir.dirs.entry(part.clone()).or_default();
        }
        match kind {
            EntryKind::Dir => {
                dir.dirs.entry(last.clone()).or_default();
            }
            EntryKind::File => {
                dir.files.insert(last.clone(), (path, false));
            }
            EntryKind::Symlink => {
                dir.files.insert(last.clone(), (path, true));
            }
        }
    }

    let mut ids = Ids::default();
    let name = root
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_else(|| root.as_os_str().to_str().unwrap_or(""))
        .to_string();
    let tree = assign(name, &root, top, &mut ids);
    Snapshot {
        root,
        tree,
        paths: ids.paths,
        links: ids.links,
    }
}

#[derive(Default)]
struct Ids {
    next: u64,
    paths: HashMap<NodeId, PathBuf>,
    links: HashSet<NodeId>,
}

impl Ids {
    fn take(&mut self, path: PathBuf) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        self.paths.insert(id, path);
        id
    }
}

fn assign(name: String, path: &Path, dir: DirBuilder, ids: &mut Ids) -> FileTreeNode {
    let id = ids.take(path.to_path_buf());

    // Directories and files share one name-sorted listing.
    let mut children: Vec<(String, Option<DirBuilder>, Option<(PathBuf, bool)>)> = dir
        .dirs
        .into_iter()
        .map(|(n, d)| (n, Some(d), None))
        .chain(dir.files.into_iter().map(|(n, p)| (n, None, Some(p))))
        .collect();
    children.sort_by(|a, b| a.0.cmp(&b.0));

    let mut entries = Vec::with_capacity(children.len());
    for (child_name, sub, file) in children {
        match (sub, file) {
            (Some(sub), _) => {
                let child_path = path.join(&child_name);
                entries.push(assign(child_name, &child_path, sub, ids));
            }
            (None, Some((file, link))) => {
                let id = ids.take(file);
                if link {
                    ids.links.insert(id);
                }
                entries.push(FileTreeNode::File {
                    name: child_name,
                    id,
                });
            }
            (None, None) => {}
        }
    }

    FileTreeNode::Directory { name, id, entries }
}
