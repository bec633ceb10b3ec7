use crate::error::{CoreError, CoreResult};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

pub type NodeId = usize;

pub const ROOT_PATH: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    File,
    Directory,
}

#[derive(Debug, Clone)]
pub struct ResourceNode {
    pub path: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub kind: ResourceKind,
    pub is_breakpoint: bool,
    /// Listed in `filesWithChildren`: counted as a file even though it has children.
    pub has_explicit_children: bool,
}

impl ResourceNode {
    pub fn is_directory(&self) -> bool {
        self.kind == ResourceKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == ResourceKind::File || self.has_explicit_children
    }
}

/// Read-only index of the project's resources, built once per load.
#[derive(Debug, Clone)]
pub struct ResourceTree {
    nodes: Vec<ResourceNode>,
    index: HashMap<String, NodeId>,
    pre_order: Vec<NodeId>,
}

impl ResourceTree {
    /// Builds the tree from the nested `resources` object of a snapshot:
    /// numbers are files, objects are directories.
    pub fn from_resources(
        resources: &Value,
        breakpoints: &BTreeSet<String>,
        files_with_children: &BTreeSet<String>,
    ) -> CoreResult<Self> {
        let mut tree = ResourceTree {
            nodes: vec![ResourceNode {
                path: ROOT_PATH.to_string(),
                parent: None,
                children: Vec::new(),
                kind: ResourceKind::Directory,
                is_breakpoint: false,
                has_explicit_children: false,
            }],
            index: HashMap::new(),
            pre_order: Vec::new(),
        };
        tree.index.insert(ROOT_PATH.to_string(), 0);
        match resources {
            Value::Object(_) => tree.insert_children(0, resources)?,
            Value::Null => {}
            _ => {
                return Err(CoreError::InvalidInput(
                    "resources must be a nested object".to_string(),
                ))
            }
        }

        for path in breakpoints {
            match tree.index.get(path) {
                Some(&id) => tree.nodes[id].is_breakpoint = true,
                None => tracing::warn!(%path, "breakpoint does not name a known resource"),
            }
        }
        for path in files_with_children {
            if let Some(&id) = tree.index.get(path) {
                tree.nodes[id].has_explicit_children = true;
            }
        }

        let mut order = Vec::with_capacity(tree.nodes.len());
        let mut stack = vec![0];
        while let Some(id) = stack.pop() {
            order.push(id);
            for &child in tree.nodes[id].children.iter().rev() {
                stack.push(child);
            }
        }
        tree.pre_order = order;
        Ok(tree)
    }

    fn insert_children(&mut self, parent: NodeId, value: &Value) -> CoreResult<()> {
        let Value::Object(map) = value else {
            return Ok(());
        };
        let mut names: Vec<&String> = map.keys().collect();
        names.sort();
        for name in names {
            if name.is_empty() || name.contains('/') {
                return Err(CoreError::InvalidInput(format!(
                    "invalid resource name {:?} under {}",
                    name, self.nodes[parent].path
                )));
            }
            let child_value = &map[name.as_str()];
            let (kind, path) = match child_value {
                Value::Object(_) => (
                    ResourceKind::Directory,
                    format!("{}{}/", self.nodes[parent].path, name),
                ),
                Value::Number(_) => (
                    ResourceKind::File,
                    format!("{}{}", self.nodes[parent].path, name),
                ),
                other => {
                    return Err(CoreError::InvalidInput(format!(
                        "resource {} has unsupported value {}",
                        name, other
                    )))
                }
            };
            let id = self.nodes.len();
            self.nodes.push(ResourceNode {
                path: path.clone(),
                parent: Some(parent),
                children: Vec::new(),
                kind,
                is_breakpoint: false,
                has_explicit_children: false,
            });
            self.index.insert(path, id);
            self.nodes[parent].children.push(id);
            if kind == ResourceKind::Directory {
                self.insert_children(id, child_value)?;
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn id_of(&self, path: &str) -> Option<NodeId> {
        self.index.get(path).copied()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    pub fn node(&self, id: NodeId) -> &ResourceNode {
        &self.nodes[id]
    }

    pub fn get(&self, path: &str) -> Option<&ResourceNode> {
        self.id_of(path).map(|id| &self.nodes[id])
    }

    pub fn require(&self, path: &str) -> CoreResult<NodeId> {
        self.id_of(path)
            .ok_or_else(|| CoreError::UnknownResource(path.to_string()))
    }

    pub fn is_breakpoint(&self, path: &str) -> bool {
        self.get(path).map(|n| n.is_breakpoint).unwrap_or(false)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    /// Ancestors from the direct parent up to and including the root.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.nodes[id].parent,
        }
    }

    /// Stable pre-order: parents before children, siblings by name.
    pub fn pre_order(&self) -> &[NodeId] {
        &self.pre_order
    }

    pub fn post_order(&self) -> impl Iterator<Item = NodeId> + '_ {
        // Reversed pre-order visits every child before its parent.
        self.pre_order.iter().rev().copied()
    }

    pub fn files(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.pre_order
            .iter()
            .copied()
            .filter(move |&id| self.nodes[id].is_file())
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.nodes[id].children.is_empty()
    }

    /// Leaves strictly below `id`, not descending into breakpoints.
    pub fn leaves_under(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[id].children.iter().rev().copied().collect();
        while let Some(n) = stack.pop() {
            if self.nodes[n].is_breakpoint {
                continue;
            }
            if self.is_leaf(n) {
                out.push(n);
            } else {
                stack.extend(self.nodes[n].children.iter().rev().copied());
            }
        }
        out
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> + '_ {
        self.pre_order.iter().map(move |&id| self.nodes[id].path.as_str())
    }
}

pub struct Ancestors<'a> {
    tree: &'a ResourceTree,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.tree.nodes[current].parent;
        Some(current)
    }
}

pub fn parent_path(path: &str) -> Option<&str> {
    if path == ROOT_PATH || path.is_empty() {
        return None;
    }
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    trimmed.rfind('/').map(|idx| &path[..=idx])
}
