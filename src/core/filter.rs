//! Recursive filter tree: groups of conditions addressed by index paths.
//!
//! Nodes never hold parent pointers. A node is located by walking a path of
//! child indices from the root; the parent of `path` is `path[..len - 1]`.
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use std::str::FromStr;
use strum::{Display, EnumIter, IntoEnumIterator};
use thiserror::Error;

/// How a group combines its children
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumIter, Serialize, Deserialize)]
pub enum Logic {
    #[default]
    #[strum(serialize = "AND")]
    And,
    #[strum(serialize = "OR")]
    Or,
    #[strum(serialize = "NOT AND")]
    NotAnd,
    #[strum(serialize = "NOT OR")]
    NotOr,
}

impl Logic {
    /// Next logic in the fixed cycle AND → OR → NOT AND → NOT OR → AND
    pub fn next(self) -> Self {
        match self {
            Logic::And => Logic::Or,
            Logic::Or => Logic::NotAnd,
            Logic::NotAnd => Logic::NotOr,
            Logic::NotOr => Logic::And,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            Logic::And => Logic::NotOr,
            Logic::Or => Logic::And,
            Logic::NotAnd => Logic::Or,
            Logic::NotOr => Logic::NotAnd,
        }
    }

    /// Bare SQL combinator used to join children
    pub fn combinator(self) -> &'static str {
        match self {
            Logic::And | Logic::NotAnd => "AND",
            Logic::Or | Logic::NotOr => "OR",
        }
    }

    /// NOT variants negate each child individually
    pub fn is_negated(self) -> bool {
        self.to_string().starts_with("NOT ")
    }
}

/// Comparison operator of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize, Deserialize)]
pub enum Operator {
    #[strum(serialize = "=")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = ">=")]
    Gte,
    #[strum(serialize = "<=")]
    Lte,
    #[strum(serialize = "LIKE")]
    Like,
    #[strum(serialize = "NOT LIKE")]
    NotLike,
    #[strum(serialize = "IN")]
    In,
    #[strum(serialize = "NOT IN")]
    NotIn,
    #[strum(serialize = "IS NULL")]
    IsNull,
    #[strum(serialize = "IS NOT NULL")]
    IsNotNull,
}

impl Operator {
    /// NULL checks ignore the value
    pub fn takes_value(self) -> bool {
        !matches!(self, Operator::IsNull | Operator::IsNotNull)
    }

    pub fn is_list(self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }

    pub fn next(self) -> Self {
        let all: Vec<Operator> = Operator::iter().collect();
        let idx = all.iter().position(|op| *op == self).unwrap_or(0);
        all[(idx + 1) % all.len()]
    }

    pub fn prev(self) -> Self {
        let all: Vec<Operator> = Operator::iter().collect();
        let idx = all.iter().position(|op| *op == self).unwrap_or(0);
        if idx == 0 { all[all.len() - 1] } else { all[idx - 1] }
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
        Operator::iter()
            .find(|op| op.to_string() == normalized)
            .ok_or_else(|| format!("Unknown operator: {s}"))
    }
}

/// Leaf comparison `field operator value`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub value: String,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    /// One-line summary for the tree view
    pub fn summary(&self) -> String {
        if self.operator.takes_value() {
            format!("{} {} \"{}\"", self.field, self.operator, self.value)
        } else {
            format!("{} {}", self.field, self.operator)
        }
    }
}

/// A node of the filter tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterNode {
    Group { logic: Logic, children: Vec<FilterNode> },
    Condition(Condition),
}

impl FilterNode {
    pub fn group(logic: Logic) -> Self {
        FilterNode::Group { logic, children: Vec::new() }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, FilterNode::Group { .. })
    }

    pub fn children(&self) -> &[FilterNode] {
        match self {
            FilterNode::Group { children, .. } => children,
            FilterNode::Condition(_) => &[],
        }
    }

    fn child_count(&self) -> usize {
        self.children().len()
    }

    fn count_conditions(&self) -> usize {
        match self {
            FilterNode::Condition(_) => 1,
            FilterNode::Group { children, .. } => {
                children.iter().map(FilterNode::count_conditions).sum()
            }
        }
    }

    fn collect_lines(&self, path: &mut Vec<usize>, depth: usize, lines: &mut Vec<TreeLine>) {
        let label = match self {
            FilterNode::Condition(cond) => cond.summary(),
            FilterNode::Group { logic, .. } if depth == 0 => format!("Root {logic}"),
            FilterNode::Group { logic, .. } => logic.to_string(),
        };
        lines.push(TreeLine { depth, label, path: path.clone() });
        for (i, child) in self.children().iter().enumerate() {
            path.push(i);
            child.collect_lines(path, depth + 1, lines);
            path.pop();
        }
    }
}

/// One pre-order line of the rendered tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeLine {
    pub depth: usize,
    pub label: String,
    pub path: Vec<usize>,
}

#[derive(Debug, Error)]
pub enum FilterFileError {
    #[error("failed to access filter file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse filter file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("filter file root must be a group")]
    RootNotGroup,
}

/// Filter expression whose root is always a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FilterNode", into = "FilterNode")]
pub struct FilterTree {
    root: FilterNode,
}

impl TryFrom<FilterNode> for FilterTree {
    type Error = FilterFileError;

    fn try_from(root: FilterNode) -> Result<Self, Self::Error> {
        if !root.is_group() {
            return Err(FilterFileError::RootNotGroup);
        }
        Ok(Self { root })
    }
}

impl From<FilterTree> for FilterNode {
    fn from(tree: FilterTree) -> Self {
        tree.root
    }
}

impl Default for FilterTree {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterTree {
    /// Empty tree with an AND root
    pub fn new() -> Self {
        Self { root: FilterNode::group(Logic::And) }
    }

    pub fn root(&self) -> &FilterNode {
        &self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.child_count() == 0
    }

    /// Node at `path`, or None if the path does not resolve
    pub fn get(&self, path: &[usize]) -> Option<&FilterNode> {
        let mut node = &self.root;
        for &i in path {
            match node {
                FilterNode::Group { children, .. } => node = children.get(i)?,
                FilterNode::Condition(_) => return None,
            }
        }
        Some(node)
    }

    fn get_mut(&mut self, path: &[usize]) -> Option<&mut FilterNode> {
        let mut node = &mut self.root;
        for &i in path {
            match node {
                FilterNode::Group { children, .. } => node = children.get_mut(i)?,
                FilterNode::Condition(_) => return None,
            }
        }
        Some(node)
    }

    /// Group that receives new children when `path` is targeted
    ///
    /// A condition redirects to its parent; an unresolvable path falls back to the root.
    fn insertion_group(&self, path: &[usize]) -> Vec<usize> {
        match self.get(path) {
            Some(FilterNode::Group { .. }) => path.to_vec(),
            Some(FilterNode::Condition(_)) => parent_path_of(path).unwrap_or_default(),
            None => Vec::new(),
        }
    }

    fn push_child(&mut self, target: &[usize], node: FilterNode) -> Vec<usize> {
        let group_path = self.insertion_group(target);
        match self.get_mut(&group_path) {
            Some(FilterNode::Group { children, .. }) => {
                children.push(node);
                let mut new_path = group_path;
                new_path.push(children.len() - 1);
                new_path
            }
            _ => Vec::new(),
        }
    }

    /// Append a condition under the group at `target` and return its path
    pub fn add_condition(&mut self, target: &[usize], condition: Condition) -> Vec<usize> {
        self.push_child(target, FilterNode::Condition(condition))
    }

    /// Append an empty group under the group at `target` and return its path
    pub fn add_group(&mut self, target: &[usize], logic: Logic) -> Vec<usize> {
        self.push_child(target, FilterNode::group(logic))
    }

    /// Remove child `index` of the group at `parent`; false if nothing was removed
    pub fn remove_child(&mut self, parent: &[usize], index: usize) -> bool {
        match self.get_mut(parent) {
            Some(FilterNode::Group { children, .. }) if index < children.len() => {
                children.remove(index);
                true
            }
            _ => false,
        }
    }

    /// Remove the node at `path` and return the selection that should follow
    ///
    /// The root is never removed. Selection prefers the previous sibling, then
    /// index 0 of the same parent, then the parent itself once it is empty.
    pub fn remove(&mut self, path: &[usize]) -> Option<Vec<usize>> {
        let (&idx, parent) = path.split_last()?;
        if !self.remove_child(parent, idx) {
            return None;
        }
        let remaining = self.get(parent).map(FilterNode::child_count).unwrap_or(0);
        let mut selection = parent.to_vec();
        if idx > 0 {
            selection.push(idx - 1);
        } else if remaining > 0 {
            selection.push(0);
        }
        Some(selection)
    }

    /// Swap the condition at `path` for `condition`; groups are left untouched
    pub fn replace_condition(&mut self, path: &[usize], condition: Condition) -> bool {
        match self.get_mut(path) {
            Some(node) if !node.is_group() => {
                *node = FilterNode::Condition(condition);
                true
            }
            _ => false,
        }
    }

    pub fn set_logic(&mut self, path: &[usize], new_logic: Logic) -> bool {
        match self.get_mut(path) {
            Some(FilterNode::Group { logic, .. }) => {
                *logic = new_logic;
                true
            }
            _ => false,
        }
    }

    /// Advance a group's logic one step; no-op on conditions
    pub fn cycle_logic(&mut self, path: &[usize]) -> bool {
        match self.get_mut(path) {
            Some(FilterNode::Group { logic, .. }) => {
                *logic = logic.next();
                true
            }
            _ => false,
        }
    }

    pub fn count_conditions(&self) -> usize {
        self.root.count_conditions()
    }

    /// Every node of the tree as pre-order lines (parent before children)
    pub fn lines(&self) -> Vec<TreeLine> {
        let mut lines = Vec::new();
        let mut path = Vec::new();
        self.root.collect_lines(&mut path, 0, &mut lines);
        lines
    }

    pub fn preorder_paths(&self) -> Vec<Vec<usize>> {
        self.lines().into_iter().map(|line| line.path).collect()
    }

    /// Promote an attribute value into an equality condition on the root
    pub fn drill_in(&mut self, field: &str, value: &str) -> Vec<usize> {
        self.add_condition(&[], Condition::new(field, Operator::Eq, value))
    }

    /// Apply a `field:value` category filter; malformed input is ignored
    pub fn apply_category(&mut self, category: &str) -> Option<Vec<usize>> {
        let (field, value) = category.split_once(':')?;
        let (field, value) = (field.trim(), value.trim());
        if field.is_empty() || value.is_empty() {
            return None;
        }
        Some(self.drill_in(field, value))
    }

    /// Save the tree as pretty JSON
    pub fn save_to_file(&self, path: &Path) -> Result<(), FilterFileError> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, &self.root)?;
        Ok(())
    }

    /// Load a tree previously written by `save_to_file`
    pub fn load_from_file(path: &Path) -> Result<Self, FilterFileError> {
        let file = File::open(path)?;
        let root: FilterNode = serde_json::from_reader(file)?;
        Self::try_from(root)
    }
}

pub fn parent_path_of(path: &[usize]) -> Option<Vec<usize>> {
    path.split_last().map(|(_, parent)| parent.to_vec())
}
