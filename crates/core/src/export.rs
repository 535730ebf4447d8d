use std::collections::BTreeMap;

use crate::matcher::FileTreeDiff;
use crate::model::{NodeRef, TreeView};

pub fn to_csv(diff: &FileTreeDiff, mut w: impl std::io::Write) -> csv::Result<()> {
    let mut writer = csv::Writer::from_writer(&mut w);
    writer.write_record(["path", "student_id", "teacher_id", "status", "has_revision"])?;
    for leaf in diff.leaves(TreeView::Diff) {
        let NodeRef::Diff(node) = leaf.node else {
            continue;
        };
        let (Some(ids), Some(status)) = (node.ids(), diff.status(node)) else {
            continue;
        };
        let id = |v: Option<crate::model::NodeId>| v.map(|v| v.to_string()).unwrap_or_default();
        writer.write_record([
            leaf.path,
            id(ids.0),
            id(ids.1),
            status.as_str().to_string(),
            diff.has_revision(leaf.node).to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn to_json(diff: &FileTreeDiff) -> serde_json::Value {
    // Sorted so the output is stable across runs.
    let flattened: BTreeMap<String, &str> = diff
        .flattened()
        .iter()
        .map(|(id, name)| (id.to_string(), name.as_str()))
        .collect();
    serde_json::json!({
        "diff": diff.diff(),
        "flattened": flattened,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::match_trees;
    use crate::model::FileTreeNode as N;

    fn sample() -> FileTreeDiff {
        let student = N::dir("root", 1, vec![N::file("a", 2), N::file("b", 3)]);
        let teacher = N::dir("root", 1, vec![N::file("b", 4), N::file("c", 5)]);
        match_trees(student, Some(teacher))
    }

    #[test]
    fn csv_has_one_row_per_leaf() {
        let mut out = Vec::new();
        to_csv(&sample(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "path,student_id,teacher_id,status,has_revision\n\
             a,2,,student-only,true\n\
             b,3,4,changed,true\n\
             c,,5,teacher-only,true\n"
        );
    }

    #[test]
    fn json_carries_diff_and_index() {
        let value = to_json(&sample());
        assert_eq!(value["diff"]["entries"][1]["ids"], serde_json::json!([3, 4]));
        assert_eq!(value["flattened"]["5"], "c");
        assert_eq!(value["flattened"].as_object().unwrap().len(), 5);
    }
}
