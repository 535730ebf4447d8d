use std::convert::Infallible;

use bytesize::ByteSize;
use codegrade_core::{match_trees, CacheConfig, ContentCache, FileTreeNode, NodeRef, TreeView};
use proptest::prelude::*;

/// Shape of a tree without ids; ids are handed out afterwards so they stay
/// unique within one tree.
#[derive(Debug, Clone)]
enum Shape {
    File(String),
    Dir(String, Vec<Shape>),
}

fn shape() -> impl Strategy<Value = Shape> {
    let name = "[a-c.]{1,3}";
    let leaf = name.prop_map(Shape::File);
    leaf.prop_recursive(3, 24, 4, move |inner| {
        (name, prop::collection::vec(inner, 0..4)).prop_map(|(n, kids)| Shape::Dir(n, kids))
    })
}

fn build(shape: &Shape, next: &mut u64) -> FileTreeNode {
    *next += 1;
    let id = *next;
    match shape {
        Shape::File(name) => FileTreeNode::file(name.clone(), id),
        Shape::Dir(name, kids) => {
            let entries = kids.iter().map(|k| build(k, next)).collect();
            FileTreeNode::dir(name.clone(), id, entries)
        }
    }
}

fn root_of(kids: &[Shape]) -> FileTreeNode {
    let mut next = 0;
    build(&Shape::Dir("root".into(), kids.to_vec()), &mut next)
}

proptest! {
    #[test]
    fn matching_a_tree_with_itself_changes_nothing(kids in prop::collection::vec(shape(), 0..5)) {
        let t = root_of(&kids);
        let diff = match_trees(t.clone(), Some(t));
        prop_assert!(diff.revisions().is_empty());
        for leaf in diff.leaves(TreeView::Diff) {
            let NodeRef::Diff(node) = leaf.node else { unreachable!() };
            let (s, t) = node.ids().unwrap();
            prop_assert!(s.is_some());
            prop_assert_eq!(s, t);
            prop_assert!(!diff.has_revision(leaf.node));
        }
        prop_assert!(!diff.has_revision(NodeRef::Diff(diff.diff())));
    }

    #[test]
    fn every_source_file_lands_in_the_diff(
        left in prop::collection::vec(shape(), 0..5),
        right in prop::collection::vec(shape(), 0..5)
    ) {
        let student = root_of(&left);
        let mut next = 1000;
        let teacher = build(&Shape::Dir("root".into(), right), &mut next);
        let diff = match_trees(student, Some(teacher));

        let student_files = diff.leaves(TreeView::Student).len();
        let teacher_files = diff.leaves(TreeView::Teacher).len();
        let mut from_student = 0;
        let mut from_teacher = 0;
        for leaf in diff.leaves(TreeView::Diff) {
            let NodeRef::Diff(node) = leaf.node else { unreachable!() };
            let (s, t) = node.ids().unwrap();
            prop_assert!(s.is_some() || t.is_some());
            from_student += s.is_some() as usize;
            from_teacher += t.is_some() as usize;
        }
        prop_assert_eq!(from_student, student_files);
        prop_assert_eq!(from_teacher, teacher_files);
    }

    #[test]
    fn cache_stays_within_budget_and_ceiling(
        keys in prop::collection::vec(0u8..12, 1..60)
    ) {
        let config = CacheConfig {
            byte_budget: ByteSize::b(64),
            item_ceiling: ByteSize::b(16),
        };
        let cache: ContentCache<u8> = ContentCache::new(config);
        for key in keys {
            // Content is a function of the key, so a hit returns the same bytes.
            let len = key as usize * 3;
            let bytes = cache.load(key, |_| Ok::<_, Infallible>(vec![key; len])).unwrap();
            prop_assert_eq!(bytes.len(), len);
            prop_assert!(cache.total_bytes() <= 64);
            if len > 16 {
                prop_assert!(cache.get_cached(&key).is_none());
            }
            let sum: u64 = (0u8..12)
                .filter_map(|k| cache.get_cached(&k))
                .map(|b| {
                    prop_assert!(b.len() <= 16);
                    Ok(b.len() as u64)
                })
                .collect::<Result<Vec<_>, TestCaseError>>()?
                .into_iter()
                .sum();
            prop_assert_eq!(sum, cache.total_bytes());
        }
    }
}
