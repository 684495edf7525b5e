//! Catalog Tree Builder
//!
//! Turns flat table and procedure metadata rows into a deduplicated tree and
//! decides which nodes start expanded.
//!
//! # Shape
//! ```text
//! Catalog                 (heading)
//!   main                  (catalog)
//!     Schema              (heading)
//!       dbo               (schema)
//!         Table           (object type group, title-cased table type)
//!           Orders
//!         Procedure       (procedure group)
//!           refresh()
//! ```
//! Empty catalog or schema levels are skipped: a row without a catalog hangs
//! its schema heading directly under the root, a row without either hangs its
//! object type group under the root.
//!
//! # Storage
//! Nodes live in an arena (`Vec<CatalogNode>`) and refer to each other by
//! index. Every node keeps two lookup tables: `containers` (named catalog,
//! schema, table and procedure children) and `groups` (synthetic labeled
//! nodes: headings, object type groups, the procedure group).

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use serde::Serialize;
use tracing::{debug, warn};

use crate::engine::Connection;
use crate::error::Result;

/// Arena index of a node
pub type NodeId = usize;

/// The root node's index
pub const ROOT: NodeId = 0;

/// Label of the group holding plain tables
pub const TABLE_LABEL: &str = "Table";

/// Label of the group holding procedures
pub const PROCEDURE_LABEL: &str = "Procedure";

/// Group labels that are never expanded and cut the expansion pass short
pub const SYSTEM_LABELS: [&str; 3] = ["System View", "System Table", "System"];

/// Group labels of temporary tables (expanded below 25 children)
pub const TEMPORARY_LABELS: [&str; 4] =
    ["Global Temporary", "Local Temporary", "Global Temporary Table", "Local Temporary Table"];

const DEFAULT_LIMIT: usize = 10;
const TABLE_LIMIT: usize = 100;
const TEMPORARY_LIMIT: usize = 25;

/// Node kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Root,
    /// Synthetic "Catalog" node above catalogs
    CatalogHeading,
    Catalog,
    /// Synthetic "Schema" node above schemas
    SchemaHeading,
    Schema,
    /// Synthetic node per object type ("Table", "View", ...)
    ObjectTypeGroup,
    Table,
    /// Synthetic "Procedure" node
    ProcedureGroup,
    Procedure,
}

impl NodeKind {
    /// Whether the node is a synthetic heading
    #[must_use]
    pub const fn is_heading(self) -> bool {
        matches!(self, Self::CatalogHeading | Self::SchemaHeading)
    }

    /// Whether the node is a leaf object
    #[must_use]
    pub const fn is_leaf(self) -> bool {
        matches!(self, Self::Table | Self::Procedure)
    }
}

/// One node of the tree
#[derive(Debug, Clone)]
pub struct CatalogNode {
    pub kind: NodeKind,
    pub name: String,
    pub parent: Option<NodeId>,

    /// Rendered children in insertion order
    pub children: Vec<NodeId>,

    /// Whether the node starts expanded (set by [`CatalogTree::apply_expansion`])
    pub expanded: bool,

    containers: HashMap<String, NodeId>,
    groups: Vec<(String, NodeId)>,
}

impl CatalogNode {
    fn new(kind: NodeKind, name: &str, parent: Option<NodeId>) -> Self {
        Self {
            kind,
            name: name.to_string(),
            parent,
            children: Vec::new(),
            expanded: false,
            containers: HashMap::new(),
            groups: Vec::new(),
        }
    }
}

/// Serializable tree snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeView {
    pub name: String,
    pub kind: NodeKind,
    pub expanded: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeView>,
}

/// Catalog tree
#[derive(Debug, Clone)]
pub struct CatalogTree {
    nodes: Vec<CatalogNode>,
    seen_procedures: HashSet<(String, String, String)>,
}

impl Default for CatalogTree {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogTree {
    /// Empty tree holding only the root
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![CatalogNode::new(NodeKind::Root, "", None)],
            seen_procedures: HashSet::new(),
        }
    }

    /// Build the tree of an open connection and apply the expansion policy
    ///
    /// Table enumeration errors are returned. Procedure enumeration errors
    /// are logged only, since many drivers do not implement it.
    pub fn populate(connection: &mut dyn Connection) -> Result<Self> {
        let mut tree = Self::new();

        connection.tables(&mut |row| {
            tree.add_table(
                row.catalog.as_deref(),
                row.schema.as_deref(),
                &row.table_type,
                &row.name,
            );
        })?;

        if let Err(e) = connection.procedures(&mut |row| {
            tree.add_procedure(row.catalog.as_deref(), row.schema.as_deref(), &row.name);
        }) {
            warn!(backend = connection.backend(), error = %e, "Procedure enumeration failed");
        }

        tree.apply_expansion();
        debug!(
            tables = tree.count(NodeKind::Table),
            procedures = tree.count(NodeKind::Procedure),
            "Catalog tree built"
        );
        Ok(tree)
    }

    /// Node by index
    ///
    /// # Panics
    /// Panics if `id` did not come from this tree.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &CatalogNode {
        &self.nodes[id]
    }

    /// Number of nodes, root included
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether only the root exists
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Number of nodes of one kind
    #[must_use]
    pub fn count(&self, kind: NodeKind) -> usize {
        self.nodes.iter().filter(|n| n.kind == kind).count()
    }

    /// Follow rendered names from the root (headings included)
    #[must_use]
    pub fn find(&self, path: &[&str]) -> Option<NodeId> {
        path.iter().try_fold(ROOT, |id, name| {
            self.nodes[id].children.iter().copied().find(|&child| self.nodes[child].name == *name)
        })
    }

    /// Add one table row
    ///
    /// Returns the table node; a duplicate row returns the existing node.
    pub fn add_table(
        &mut self,
        catalog: Option<&str>,
        schema: Option<&str>,
        object_type: &str,
        name: &str,
    ) -> NodeId {
        let owner = self.schema_owner(catalog, schema);
        let label = match title_case(object_type.trim()) {
            label if label.is_empty() => "Other".to_string(),
            label => label,
        };
        let group = self.group(owner, &label, NodeKind::ObjectTypeGroup);
        self.leaf(group, NodeKind::Table, name)
    }

    /// Add one procedure row
    ///
    /// The name is normalized to end in exactly one `()`. Returns `None` when
    /// the (catalog, schema, name) triple was already added.
    pub fn add_procedure(
        &mut self,
        catalog: Option<&str>,
        schema: Option<&str>,
        name: &str,
    ) -> Option<NodeId> {
        let normalized = format!("{}()", name.trim_end_matches(|c| c == '(' || c == ')'));
        let key = (
            non_empty(catalog).unwrap_or_default().to_string(),
            non_empty(schema).unwrap_or_default().to_string(),
            normalized.clone(),
        );
        if !self.seen_procedures.insert(key) {
            return None;
        }

        let owner = self.schema_owner(catalog, schema);
        let group = self.group(owner, PROCEDURE_LABEL, NodeKind::ProcedureGroup);
        Some(self.leaf(group, NodeKind::Procedure, &normalized))
    }

    /// Expansion rule for a single node
    ///
    /// Headings are always expanded. The "Table" group is expanded up to 100
    /// children, temporary-table groups below 25, system groups never, and
    /// everything else up to 10. Leaves are never expanded.
    #[must_use]
    pub fn expansion_policy(&self, id: NodeId) -> bool {
        let node = &self.nodes[id];
        let count = node.children.len();

        match node.kind {
            NodeKind::Root | NodeKind::CatalogHeading | NodeKind::SchemaHeading => true,
            NodeKind::Table | NodeKind::Procedure => false,
            NodeKind::ObjectTypeGroup if is_system_label(&node.name) => false,
            NodeKind::ObjectTypeGroup if node.name == TABLE_LABEL => count <= TABLE_LIMIT,
            NodeKind::ObjectTypeGroup if TEMPORARY_LABELS.contains(&node.name.as_str()) => {
                count < TEMPORARY_LIMIT
            }
            _ => count <= DEFAULT_LIMIT,
        }
    }

    /// Set the `expanded` flag of every container and group
    ///
    /// Each catalog and schema is visited once. The visit evaluates the
    /// container, expands its Catalog/Schema headings, then evaluates its
    /// object type and procedure groups, system-labeled groups first. A system
    /// group with at most 10 children ends that scan: groups after it keep
    /// their current state. Headings are not part of the scan.
    pub fn apply_expansion(&mut self) {
        self.expand_container(ROOT);
    }

    fn expand_container(&mut self, id: NodeId) {
        self.nodes[id].expanded = self.expansion_policy(id);

        let (headings, mut groups): (Vec<NodeId>, Vec<NodeId>) = self.nodes[id]
            .groups
            .iter()
            .map(|(_, g)| *g)
            .partition(|&g| self.nodes[g].kind.is_heading());
        for heading in headings {
            self.nodes[heading].expanded = true;
        }

        groups.sort_by_key(|&g| !is_system_label(&self.nodes[g].name));

        for group in groups {
            let node = &self.nodes[group];
            if node.kind == NodeKind::ObjectTypeGroup
                && is_system_label(&node.name)
                && node.children.len() <= DEFAULT_LIMIT
            {
                break;
            }
            self.nodes[group].expanded = self.expansion_policy(group);
        }

        let nested: Vec<NodeId> = self.nodes[id]
            .containers
            .values()
            .copied()
            .filter(|&c| matches!(self.nodes[c].kind, NodeKind::Catalog | NodeKind::Schema))
            .collect();
        for container in nested {
            self.expand_container(container);
        }
    }

    /// Indented text outline
    ///
    /// `-` marks an expanded node, `+` a collapsed one, leaves have no marker.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for &child in &self.nodes[ROOT].children {
            self.render_node(child, 0, &mut out);
        }
        out
    }

    fn render_node(&self, id: NodeId, depth: usize, out: &mut String) {
        let node = &self.nodes[id];
        let indent = "  ".repeat(depth);
        if node.children.is_empty() {
            let _ = writeln!(out, "{indent}  {}", node.name);
        } else {
            let marker = if node.expanded { '-' } else { '+' };
            let _ = writeln!(out, "{indent}{marker} {}", node.name);
        }
        for &child in &node.children {
            self.render_node(child, depth + 1, out);
        }
    }

    /// Serializable snapshot of everything below the root
    #[must_use]
    pub fn to_view(&self) -> Vec<TreeView> {
        self.nodes[ROOT].children.iter().map(|&id| self.view_node(id)).collect()
    }

    fn view_node(&self, id: NodeId) -> TreeView {
        let node = &self.nodes[id];
        TreeView {
            name: node.name.clone(),
            kind: node.kind,
            expanded: node.expanded,
            children: node.children.iter().map(|&c| self.view_node(c)).collect(),
        }
    }

    fn push(&mut self, parent: NodeId, kind: NodeKind, name: &str) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(CatalogNode::new(kind, name, Some(parent)));
        self.nodes[parent].children.push(id);
        id
    }

    /// Labeled synthetic child of `owner`, created on first use
    fn group(&mut self, owner: NodeId, label: &str, kind: NodeKind) -> NodeId {
        if let Some(&(_, id)) = self.nodes[owner].groups.iter().find(|(l, _)| l == label) {
            return id;
        }
        let id = self.push(owner, kind, label);
        self.nodes[owner].groups.push((label.to_string(), id));
        id
    }

    /// Named catalog or schema owned by `owner`, placed under its heading
    fn container(&mut self, owner: NodeId, name: &str, kind: NodeKind) -> NodeId {
        if let Some(&id) = self.nodes[owner].containers.get(name) {
            return id;
        }
        let (label, heading_kind) = match kind {
            NodeKind::Catalog => ("Catalog", NodeKind::CatalogHeading),
            _ => ("Schema", NodeKind::SchemaHeading),
        };
        let heading = self.group(owner, label, heading_kind);
        let id = self.push(heading, kind, name);
        self.nodes[owner].containers.insert(name.to_string(), id);
        id
    }

    fn leaf(&mut self, group: NodeId, kind: NodeKind, name: &str) -> NodeId {
        if let Some(&id) = self.nodes[group].containers.get(name) {
            return id;
        }
        let id = self.push(group, kind, name);
        self.nodes[group].containers.insert(name.to_string(), id);
        id
    }

    fn schema_owner(&mut self, catalog: Option<&str>, schema: Option<&str>) -> NodeId {
        let mut owner = ROOT;
        if let Some(catalog) = non_empty(catalog) {
            owner = self.container(owner, catalog, NodeKind::Catalog);
        }
        if let Some(schema) = non_empty(schema) {
            owner = self.container(owner, schema, NodeKind::Schema);
        }
        owner
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn is_system_label(label: &str) -> bool {
    SYSTEM_LABELS.contains(&label)
}

/// Title-case an object type: first letter of every word upper, rest lower
#[must_use]
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_is_letter = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if previous_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            previous_is_letter = true;
        } else {
            out.push(c);
            previous_is_letter = false;
        }
    }
    out
}
