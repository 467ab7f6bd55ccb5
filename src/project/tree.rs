// src/project/tree.rs
use super::GeneratedFile;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Folder,
    File,
}

/// One path segment of a generated project, as shown in the sidebar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<FileNode>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

struct PendingNode {
    name: String,
    path: String,
    kind: NodeKind,
    content: Option<String>,
    children: Vec<usize>,
}

/// Builds the folder/file tree for a flat file list.
///
/// Every intermediate segment becomes a folder, the final segment a file.
/// A node keeps the kind it was created with; callers are expected to run
/// [`super::validate_file_paths`] first so a path never changes kind. Repeating
/// a file path overwrites that file's content. Every level is sorted with
/// folders first, then by name.
pub fn build_file_tree(files: &[GeneratedFile]) -> Vec<FileNode> {
    let mut nodes: Vec<PendingNode> = Vec::new();
    let mut by_path: HashMap<String, usize> = HashMap::new();
    let mut roots: Vec<usize> = Vec::new();

    for file in files {
        let segments: Vec<&str> = file.path.split('/').collect();
        let mut parent: Option<usize> = None;
        let mut current_path = String::with_capacity(file.path.len());

        for (position, segment) in segments.iter().enumerate() {
            if !current_path.is_empty() {
                current_path.push('/');
            }
            current_path.push_str(segment);
            let is_last = position + 1 == segments.len();

            let index = match by_path.get(&current_path) {
                Some(&index) => index,
                None => {
                    let index = nodes.len();
                    nodes.push(PendingNode {
                        name: segment.to_string(),
                        path: current_path.clone(),
                        kind: if is_last { NodeKind::File } else { NodeKind::Folder },
                        content: None,
                        children: Vec::new(),
                    });
                    by_path.insert(current_path.clone(), index);
                    match parent {
                        Some(parent) => nodes[parent].children.push(index),
                        None => roots.push(index),
                    }
                    index
                }
            };

            if is_last && nodes[index].kind == NodeKind::File {
                nodes[index].content = Some(file.content.clone());
            }
            parent = Some(index);
        }
    }

    materialize(&nodes, &roots)
}

fn materialize(nodes: &[PendingNode], indices: &[usize]) -> Vec<FileNode> {
    let mut level: Vec<FileNode> = indices
        .iter()
        .map(|&index| {
            let node = &nodes[index];
            match node.kind {
                NodeKind::Folder => FileNode {
                    name: node.name.clone(),
                    path: node.path.clone(),
                    kind: NodeKind::Folder,
                    children: Some(materialize(nodes, &node.children)),
                    content: None,
                },
                NodeKind::File => FileNode {
                    name: node.name.clone(),
                    path: node.path.clone(),
                    kind: NodeKind::File,
                    children: None,
                    content: Some(node.content.clone().unwrap_or_default()),
                },
            }
        })
        .collect();
    level.sort_by(compare_nodes);
    level
}

fn compare_nodes(a: &FileNode, b: &FileNode) -> Ordering {
    match (a.kind, b.kind) {
        (NodeKind::Folder, NodeKind::File) => Ordering::Less,
        (NodeKind::File, NodeKind::Folder) => Ordering::Greater,
        _ => a
            .name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn collect_files(nodes: &[FileNode], out: &mut Vec<GeneratedFile>) {
        for node in nodes {
            match node.kind {
                NodeKind::File => out.push(GeneratedFile::new(
                    node.path.clone(),
                    node.content.clone().unwrap_or_default(),
                )),
                NodeKind::Folder => collect_files(node.children.as_deref().unwrap_or(&[]), out),
            }
        }
    }

    fn assert_sorted(nodes: &[FileNode]) {
        for pair in nodes.windows(2) {
            assert_ne!(
                compare_nodes(&pair[0], &pair[1]),
                Ordering::Greater,
                "{} sorted after {}",
                pair[0].path,
                pair[1].path
            );
        }
        for node in nodes {
            if let Some(children) = &node.children {
                assert_sorted(children);
            }
        }
    }

    fn sample() -> Vec<GeneratedFile> {
        vec![
            GeneratedFile::new("package.json", "{}"),
            GeneratedFile::new("app/page.tsx", "page"),
            GeneratedFile::new("app/globals.css", "css"),
            GeneratedFile::new("app/components/Button.tsx", "button"),
            GeneratedFile::new("README.md", "readme"),
            GeneratedFile::new("lib/utils.ts", "utils"),
        ]
    }

    #[test]
    fn nested_path_builds_one_child_per_level() {
        let tree = build_file_tree(&[GeneratedFile::new("a/b/c.txt", "1")]);

        assert_eq!(tree.len(), 1);
        let a = &tree[0];
        assert_eq!((a.name.as_str(), a.path.as_str(), a.kind), ("a", "a", NodeKind::Folder));
        let a_children = a.children.as_ref().unwrap();
        assert_eq!(a_children.len(), 1);

        let b = &a_children[0];
        assert_eq!((b.name.as_str(), b.path.as_str(), b.kind), ("b", "a/b", NodeKind::Folder));
        let b_children = b.children.as_ref().unwrap();
        assert_eq!(b_children.len(), 1);

        let c = &b_children[0];
        assert_eq!((c.name.as_str(), c.path.as_str(), c.kind), ("c.txt", "a/b/c.txt", NodeKind::File));
        assert_eq!(c.content.as_deref(), Some("1"));
        assert!(c.children.is_none());
    }

    #[test]
    fn path_without_slash_is_top_level_file() {
        let tree = build_file_tree(&[GeneratedFile::new("package.json", "{}")]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].kind, NodeKind::File);
        assert_eq!(tree[0].content.as_deref(), Some("{}"));
    }

    #[test]
    fn leaves_match_input_set() {
        let files = sample();
        let tree = build_file_tree(&files);

        let mut leaves = Vec::new();
        collect_files(&tree, &mut leaves);

        let expected: HashSet<_> = files.into_iter().map(|f| (f.path, f.content)).collect();
        let actual: HashSet<_> = leaves.into_iter().map(|f| (f.path, f.content)).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn folders_sort_before_files_at_every_level() {
        let tree = build_file_tree(&sample());
        assert_sorted(&tree);

        let names: Vec<&str> = tree.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["app", "lib", "package.json", "README.md"]);

        let app_children: Vec<&str> = tree[0]
            .children
            .as_ref()
            .unwrap()
            .iter()
            .map(|n| n.name.as_str())
            .collect();
        assert_eq!(app_children, vec!["components", "globals.css", "page.tsx"]);
    }

    #[test]
    fn names_ignore_case_when_ordering() {
        let tree = build_file_tree(&[
            GeneratedFile::new("README.md", ""),
            GeneratedFile::new("package.json", ""),
            GeneratedFile::new("Zeta.tsx", ""),
            GeneratedFile::new("alpha.tsx", ""),
            GeneratedFile::new("Components/A.tsx", ""),
            GeneratedFile::new("app/page.tsx", ""),
        ]);
        let names: Vec<&str> = tree.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["app", "Components", "alpha.tsx", "package.json", "README.md", "Zeta.tsx"]
        );
    }

    #[test]
    fn shared_prefixes_materialize_once() {
        let tree = build_file_tree(&sample());
        let app_folders = tree.iter().filter(|n| n.path == "app").count();
        assert_eq!(app_folders, 1);
        assert_eq!(tree[0].children.as_ref().unwrap().len(), 3);
    }

    #[test]
    fn building_twice_gives_equal_trees() {
        let files = sample();
        assert_eq!(build_file_tree(&files), build_file_tree(&files));
    }

    #[test]
    fn repeated_path_keeps_last_content() {
        let files = vec![
            GeneratedFile::new("app/page.tsx", "old"),
            GeneratedFile::new("app/page.tsx", "new"),
        ];
        let tree = build_file_tree(&files);
        let page = &tree[0].children.as_ref().unwrap()[0];
        assert_eq!(page.content.as_deref(), Some("new"));
        assert_eq!(tree[0].children.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn empty_input_gives_empty_tree() {
        assert!(build_file_tree(&[]).is_empty());
    }

    #[test]
    fn serializes_with_type_tag() {
        let tree = build_file_tree(&[GeneratedFile::new("a/b.txt", "x")]);
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json[0]["type"], "folder");
        assert!(json[0].get("content").is_none());
        assert_eq!(json[0]["children"][0]["type"], "file");
        assert_eq!(json[0]["children"][0]["content"], "x");
    }
}
