use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::categories::Category;

/// Separator between ancestor names in a resolved path.
pub const PATH_SEPARATOR: &str = " > ";
/// Sentinel path for readings whose meter has no category.
pub const NO_CATEGORY_PATH: &str = "Aucune";
/// Hard bound on the parent-chain walk. Hierarchies this deep do not occur
/// in practice; hitting the bound means the stored chain is cyclic.
pub const MAX_HIERARCHY_DEPTH: usize = 64;

/// Resolved ancestor path for one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Names joined root-to-leaf with [`PATH_SEPARATOR`].
    pub path: String,
    /// Separator count + 1.
    pub depth: usize,
    /// True when the walk was cut off by a cycle or the depth bound.
    pub truncated: bool,
}

struct Node {
    name: String,
    parent_id: Option<String>,
}

/// Arena of category nodes keyed by id.
///
/// Built once per request from the storage snapshot; path resolution is an
/// iterative walk over parent keys, never a pointer chase.
pub struct CategoryIndex {
    nodes: HashMap<String, Node>,
}

impl CategoryIndex {
    pub fn new(categories: &[Category]) -> Self {
        let nodes = categories
            .iter()
            .map(|category| {
                (
                    category.id.clone(),
                    Node {
                        name: category.name.clone(),
                        parent_id: category.parent_id.clone(),
                    },
                )
            })
            .collect();
        Self { nodes }
    }

    /// Walk the parent chain and return the breadcrumb path.
    ///
    /// An absent id resolves to the [`NO_CATEGORY_PATH`] sentinel at depth 1.
    /// A dangling parent reference simply ends the walk; a cycle is cut at
    /// the first revisited id and the truncated path is returned.
    pub fn resolve(&self, category_id: Option<&str>) -> ResolvedPath {
        let Some(start) = category_id else {
            return ResolvedPath {
                path: NO_CATEGORY_PATH.to_string(),
                depth: 1,
                truncated: false,
            };
        };

        let mut names: Vec<&str> = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut truncated = false;
        let mut current = Some(start);

        while let Some(id) = current {
            if !visited.insert(id) || visited.len() > MAX_HIERARCHY_DEPTH {
                warn!(
                    target: "releve",
                    event = "category_cycle",
                    category_id = start,
                    at = id,
                    "parent chain does not terminate, returning truncated path"
                );
                truncated = true;
                break;
            }
            match self.nodes.get(id) {
                Some(node) => {
                    names.push(&node.name);
                    current = node.parent_id.as_deref();
                }
                // Dangling parent reference: the chain ends here.
                None => break,
            }
        }

        if names.is_empty() {
            return ResolvedPath {
                path: NO_CATEGORY_PATH.to_string(),
                depth: 1,
                truncated,
            };
        }

        names.reverse();
        let path = names.join(PATH_SEPARATOR);
        let depth = names.len();
        ResolvedPath {
            path,
            depth,
            truncated,
        }
    }
}

/// Depth of an already-resolved path string: separator count + 1.
pub fn path_depth(path: &str) -> usize {
    path.matches(PATH_SEPARATOR).count() + 1
}

/// Source partition of categories by depth range.
///
/// The level-to-bucket rule is a fixed table: display levels 1-2 draw from
/// bucket "12", levels 3-4 from "34", level 5 from "5" (every depth).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Depth12,
    Depth34,
    All,
}

impl Bucket {
    pub const ALL: [Bucket; 3] = [Bucket::Depth12, Bucket::Depth34, Bucket::All];

    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Depth12 => "12",
            Bucket::Depth34 => "34",
            Bucket::All => "5",
        }
    }

    /// Whether a category of the given path depth belongs to this bucket.
    pub fn admits(&self, depth: usize) -> bool {
        match self {
            Bucket::Depth12 => depth == 1 || depth == 2,
            Bucket::Depth34 => depth == 3 || depth == 4,
            Bucket::All => true,
        }
    }
}

/// Map a display level (1-5) to its source bucket.
pub fn bucket_for_level(level: u8) -> Option<Bucket> {
    match level {
        1 | 2 => Some(Bucket::Depth12),
        3 | 4 => Some(Bucket::Depth34),
        5 => Some(Bucket::All),
        _ => None,
    }
}
