//! Action-driven state machine over a `FilterTree`.
//!
//! The navigator owns the tree while the filter pane is open. It never looks at
//! key codes: the caller maps input onto `NavCommand`s and renders from
//! `state()`, `focus()` and `tree()`.
use crate::config::Mode;
use crate::core::filter::{Condition, FilterNode, FilterTree, Logic, Operator, parent_path_of};
use crate::core::predicate::{Predicate, compile_tree};
use crate::tui::action::NavCommand;
use thiserror::Error;
use tracing::debug;

/// Sub-targets of a focused group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSlot {
    Logic,
    AddCondition,
    AddGroup,
}

/// Tree-state cursor; `slot` only matters when `path` names a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Focus {
    Node { path: Vec<usize>, slot: GroupSlot },
    Apply,
}

impl Focus {
    fn node(path: Vec<usize>) -> Self {
        Focus::Node { path, slot: GroupSlot::Logic }
    }

    pub fn path(&self) -> Option<&[usize]> {
        match self {
            Focus::Node { path, .. } => Some(path),
            Focus::Apply => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditField {
    Field,
    Operator,
    Value,
}

impl EditField {
    fn next(self) -> Self {
        match self {
            EditField::Field => EditField::Operator,
            EditField::Operator => EditField::Value,
            EditField::Value => EditField::Field,
        }
    }

    fn prev(self) -> Self {
        match self {
            EditField::Field => EditField::Value,
            EditField::Operator => EditField::Field,
            EditField::Value => EditField::Operator,
        }
    }
}

/// Where a committed edit form lands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditTarget {
    /// Append a new condition to this group
    NewIn(Vec<usize>),
    /// Overwrite the condition at this path
    Existing(Vec<usize>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("field name is required")]
    EmptyField,
    #[error("choose an operator")]
    MissingOperator,
    #[error("{0} needs a value")]
    EmptyValue(Operator),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditForm {
    pub target: EditTarget,
    pub field: String,
    pub operator: Option<Operator>,
    pub value: String,
    pub focus: EditField,
}

impl EditForm {
    pub fn new_in(group: Vec<usize>) -> Self {
        Self {
            target: EditTarget::NewIn(group),
            field: String::new(),
            operator: None,
            value: String::new(),
            focus: EditField::Field,
        }
    }

    pub fn existing(path: Vec<usize>, condition: &Condition) -> Self {
        Self {
            target: EditTarget::Existing(path),
            field: condition.field.clone(),
            operator: Some(condition.operator),
            value: condition.value.clone(),
            focus: EditField::Field,
        }
    }

    pub fn validate(&self) -> Result<Condition, EditError> {
        let field = self.field.trim();
        if field.is_empty() {
            return Err(EditError::EmptyField);
        }
        let operator = self.operator.ok_or(EditError::MissingOperator)?;
        if operator.takes_value() && self.value.trim().is_empty() {
            return Err(EditError::EmptyValue(operator));
        }
        let value = if operator.takes_value() { self.value.clone() } else { String::new() };
        Ok(Condition::new(field, operator, value))
    }

    fn cycle_operator(&mut self, forward: bool) {
        self.operator = Some(match (self.operator, forward) {
            (Some(op), true) => op.next(),
            (Some(op), false) => op.prev(),
            (None, true) => Operator::Eq,
            (None, false) => Operator::Eq.prev(),
        });
    }

    fn focused_text(&mut self) -> Option<&mut String> {
        match self.focus {
            EditField::Field => Some(&mut self.field),
            EditField::Value => Some(&mut self.value),
            EditField::Operator => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NavigatorState {
    #[default]
    Tree,
    Edit(EditForm),
    LogicSelect { path: Vec<usize>, logic: Logic },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavOutcome {
    /// Nothing happened
    Idle,
    /// Focus, mode or tree changed; redraw
    Changed,
    /// A dirty tree was compiled
    Applied(Predicate),
    /// Edit form failed validation and stays open
    Rejected(EditError),
    /// Leave the filter pane
    Dismissed,
}

#[derive(Debug, Clone)]
pub struct TreeNavigator {
    tree: FilterTree,
    state: NavigatorState,
    focus: Focus,
    dirty: bool,
}

impl Default for TreeNavigator {
    fn default() -> Self {
        Self::new(FilterTree::new())
    }
}

impl TreeNavigator {
    pub fn new(tree: FilterTree) -> Self {
        Self {
            tree,
            state: NavigatorState::Tree,
            focus: Focus::node(Vec::new()),
            dirty: false,
        }
    }

    pub fn tree(&self) -> &FilterTree {
        &self.tree
    }

    pub fn state(&self) -> &NavigatorState {
        &self.state
    }

    pub fn focus(&self) -> &Focus {
        &self.focus
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Key-binding mode for the current state
    pub fn mode(&self) -> Mode {
        match self.state {
            NavigatorState::Tree => Mode::Tree,
            NavigatorState::Edit(_) => Mode::Edit,
            NavigatorState::LogicSelect { .. } => Mode::LogicSelect,
        }
    }

    /// Swap in a loaded tree; it counts as unapplied
    pub fn replace_tree(&mut self, tree: FilterTree) {
        self.tree = tree;
        self.state = NavigatorState::Tree;
        self.focus = Focus::node(Vec::new());
        self.dirty = true;
    }

    /// Add `field = value` at the root, e.g. from a selected row
    pub fn drill_in(&mut self, field: &str, value: &str) -> NavOutcome {
        let path = self.tree.drill_in(field, value);
        self.focus = Focus::node(path);
        self.dirty = true;
        NavOutcome::Changed
    }

    /// Add a `field:value` category condition; malformed input changes nothing
    pub fn apply_category(&mut self, category: &str) -> NavOutcome {
        match self.tree.apply_category(category) {
            Some(path) => {
                self.focus = Focus::node(path);
                self.dirty = true;
                NavOutcome::Changed
            }
            None => NavOutcome::Idle,
        }
    }

    pub fn handle(&mut self, command: NavCommand) -> NavOutcome {
        let outcome = match std::mem::take(&mut self.state) {
            NavigatorState::Tree => self.handle_tree(command),
            NavigatorState::Edit(form) => self.handle_edit(form, command),
            NavigatorState::LogicSelect { path, logic } => self.handle_logic(path, logic, command),
        };
        debug!(?command, ?outcome, dirty = self.dirty, "navigator");
        outcome
    }

    fn handle_tree(&mut self, command: NavCommand) -> NavOutcome {
        match command {
            NavCommand::MoveNext => self.step(true),
            NavCommand::MovePrevious => self.step(false),
            NavCommand::MoveInto => self.move_into(),
            NavCommand::MoveOut => self.move_out(),
            NavCommand::Activate => self.activate(),
            NavCommand::Delete => self.delete_focused(),
            NavCommand::CycleLogic => {
                let path = self.focused_group_path();
                if path.is_some_and(|path| self.tree.cycle_logic(&path)) {
                    self.dirty = true;
                    NavOutcome::Changed
                } else {
                    NavOutcome::Idle
                }
            }
            NavCommand::Apply => self.apply(),
            NavCommand::Cancel => NavOutcome::Dismissed,
            NavCommand::Input(_) | NavCommand::Erase => NavOutcome::Idle,
        }
    }

    fn handle_edit(&mut self, mut form: EditForm, command: NavCommand) -> NavOutcome {
        let outcome = match command {
            NavCommand::MoveNext => {
                form.focus = form.focus.next();
                NavOutcome::Changed
            }
            NavCommand::MovePrevious => {
                form.focus = form.focus.prev();
                NavOutcome::Changed
            }
            NavCommand::MoveInto | NavCommand::MoveOut => {
                form.cycle_operator(command == NavCommand::MoveInto);
                NavOutcome::Changed
            }
            NavCommand::Input(c) => match form.focused_text() {
                Some(text) => {
                    text.push(c);
                    NavOutcome::Changed
                }
                None => NavOutcome::Idle,
            },
            NavCommand::Erase => match form.focused_text().and_then(String::pop) {
                Some(_) => NavOutcome::Changed,
                None => NavOutcome::Idle,
            },
            NavCommand::Activate => match form.validate() {
                Ok(condition) => {
                    self.commit(form.target, condition);
                    return NavOutcome::Changed;
                }
                Err(err) => NavOutcome::Rejected(err),
            },
            NavCommand::Cancel => return NavOutcome::Changed,
            NavCommand::Delete | NavCommand::CycleLogic | NavCommand::Apply => NavOutcome::Idle,
        };
        self.state = NavigatorState::Edit(form);
        outcome
    }

    fn handle_logic(&mut self, path: Vec<usize>, logic: Logic, command: NavCommand) -> NavOutcome {
        let logic = match command {
            NavCommand::MoveNext | NavCommand::MoveInto | NavCommand::CycleLogic => logic.next(),
            NavCommand::MovePrevious | NavCommand::MoveOut => logic.prev(),
            NavCommand::Activate => {
                if self.tree.set_logic(&path, logic) {
                    self.dirty = true;
                }
                return NavOutcome::Changed;
            }
            NavCommand::Cancel => return NavOutcome::Changed,
            NavCommand::Delete | NavCommand::Apply | NavCommand::Input(_) | NavCommand::Erase => {
                self.state = NavigatorState::LogicSelect { path, logic };
                return NavOutcome::Idle;
            }
        };
        self.state = NavigatorState::LogicSelect { path, logic };
        NavOutcome::Changed
    }

    fn commit(&mut self, target: EditTarget, condition: Condition) {
        let path = match target {
            EditTarget::NewIn(group) => self.tree.add_condition(&group, condition),
            EditTarget::Existing(path) => {
                self.tree.replace_condition(&path, condition);
                path
            }
        };
        self.focus = Focus::node(path);
        self.dirty = true;
    }

    /// Compile and emit the predicate if there are unapplied changes
    pub fn apply(&mut self) -> NavOutcome {
        if !self.dirty {
            return NavOutcome::Idle;
        }
        self.dirty = false;
        NavOutcome::Applied(compile_tree(&self.tree))
    }

    fn focused_group_path(&self) -> Option<Vec<usize>> {
        let path = self.focus.path()?;
        self.tree.get(path).filter(|n| n.is_group()).map(|_| path.to_vec())
    }

    fn step(&mut self, forward: bool) -> NavOutcome {
        let paths = self.tree.preorder_paths();
        let current = match &self.focus {
            Focus::Apply => None,
            Focus::Node { path, .. } => Some(paths.iter().position(|p| p == path).unwrap_or(0)),
        };
        let target = match (current, forward) {
            (None, true) => paths.first().cloned(),
            (None, false) => paths.last().cloned(),
            (Some(i), true) => paths.get(i + 1).cloned(),
            (Some(0), false) => None,
            (Some(i), false) => paths.get(i - 1).cloned(),
        };
        self.focus = match target {
            Some(path) => Focus::node(path),
            None => Focus::Apply,
        };
        NavOutcome::Changed
    }

    fn move_into(&mut self) -> NavOutcome {
        let Focus::Node { path, slot } = &self.focus else {
            return NavOutcome::Idle;
        };
        let Some(FilterNode::Group { children, .. }) = self.tree.get(path) else {
            return NavOutcome::Idle;
        };
        self.focus = match slot {
            GroupSlot::Logic => Focus::Node { path: path.clone(), slot: GroupSlot::AddCondition },
            GroupSlot::AddCondition => Focus::Node { path: path.clone(), slot: GroupSlot::AddGroup },
            GroupSlot::AddGroup if !children.is_empty() => {
                let mut first = path.clone();
                first.push(0);
                Focus::node(first)
            }
            GroupSlot::AddGroup => return NavOutcome::Idle,
        };
        NavOutcome::Changed
    }

    fn move_out(&mut self) -> NavOutcome {
        let Focus::Node { path, slot } = &self.focus else {
            return NavOutcome::Idle;
        };
        let is_group = self.tree.get(path).is_some_and(FilterNode::is_group);
        self.focus = match (is_group, slot) {
            (true, GroupSlot::AddGroup) => Focus::Node { path: path.clone(), slot: GroupSlot::AddCondition },
            (true, GroupSlot::AddCondition) => Focus::Node { path: path.clone(), slot: GroupSlot::Logic },
            _ => match parent_path_of(path) {
                Some(parent) => Focus::node(parent),
                None => return NavOutcome::Idle,
            },
        };
        NavOutcome::Changed
    }

    fn activate(&mut self) -> NavOutcome {
        let (path, slot) = match &self.focus {
            Focus::Apply => return self.apply(),
            Focus::Node { path, slot } => (path.clone(), *slot),
        };
        match self.tree.get(&path) {
            Some(FilterNode::Condition(condition)) => {
                self.state = NavigatorState::Edit(EditForm::existing(path, condition));
            }
            Some(FilterNode::Group { logic, .. }) => match slot {
                GroupSlot::Logic => {
                    self.state = NavigatorState::LogicSelect { path, logic: *logic };
                }
                GroupSlot::AddCondition => {
                    self.state = NavigatorState::Edit(EditForm::new_in(path));
                }
                GroupSlot::AddGroup => {
                    let new_path = self.tree.add_group(&path, Logic::And);
                    self.focus = Focus::node(new_path);
                    self.dirty = true;
                }
            },
            None => return NavOutcome::Idle,
        }
        NavOutcome::Changed
    }

    fn delete_focused(&mut self) -> NavOutcome {
        let Some(path) = self.focus.path().filter(|p| !p.is_empty()).map(<[usize]>::to_vec) else {
            return NavOutcome::Idle;
        };
        match self.tree.remove(&path) {
            Some(selection) => {
                self.focus = Focus::node(selection);
                self.dirty = true;
                NavOutcome::Changed
            }
            None => NavOutcome::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::QueryArg;
    use pretty_assertions::assert_eq;

    fn type_text(nav: &mut TreeNavigator, text: &str) {
        for c in text.chars() {
            nav.handle(NavCommand::Input(c));
        }
    }

    /// Fill and commit the edit form that is currently open
    fn fill_condition(nav: &mut TreeNavigator, field: &str, op: Operator, value: &str) {
        type_text(nav, field);
        nav.handle(NavCommand::MoveNext);
        while match nav.state() {
            NavigatorState::Edit(form) => form.operator != Some(op),
            _ => false,
        } {
            nav.handle(NavCommand::MoveInto);
        }
        nav.handle(NavCommand::MoveNext);
        type_text(nav, value);
        assert_eq!(nav.handle(NavCommand::Activate), NavOutcome::Changed);
    }

    fn open_add_condition(nav: &mut TreeNavigator) {
        nav.handle(NavCommand::MoveInto);
        nav.handle(NavCommand::Activate);
        assert_eq!(nav.mode(), Mode::Edit);
    }

    #[test]
    fn builds_and_applies_the_end_to_end_example() {
        let mut nav = TreeNavigator::default();
        open_add_condition(&mut nav);
        fill_condition(&mut nav, "level", Operator::Eq, "Error");

        // back to root and add an OR group
        nav.handle(NavCommand::MoveOut);
        assert_eq!(nav.focus(), &Focus::node(vec![]));
        nav.handle(NavCommand::MoveInto);
        nav.handle(NavCommand::MoveInto);
        nav.handle(NavCommand::Activate);
        assert_eq!(nav.focus(), &Focus::node(vec![1]));
        nav.handle(NavCommand::CycleLogic);

        open_add_condition(&mut nav);
        fill_condition(&mut nav, "status_code", Operator::Gte, "500");
        nav.handle(NavCommand::MoveOut);
        open_add_condition(&mut nav);
        fill_condition(&mut nav, "status_code", Operator::Lt, "600");

        let NavOutcome::Applied(predicate) = nav.handle(NavCommand::Apply) else {
            panic!("expected a compiled predicate");
        };
        assert_eq!(predicate.sql, "`level` = ? AND (`status_code` >= ? OR `status_code` < ?)");
        assert_eq!(
            predicate.args,
            vec![QueryArg::from("Error"), QueryArg::from("500"), QueryArg::from("600")]
        );
        assert!(!nav.is_dirty());
        assert_eq!(nav.handle(NavCommand::Apply), NavOutcome::Idle);
    }

    #[test]
    fn move_next_and_previous_wrap_through_apply() {
        let mut tree = FilterTree::new();
        tree.add_condition(&[], Condition::new("a", Operator::Eq, "1"));
        tree.add_condition(&[], Condition::new("b", Operator::Eq, "2"));
        let mut nav = TreeNavigator::new(tree);

        nav.handle(NavCommand::MoveNext);
        nav.handle(NavCommand::MoveNext);
        assert_eq!(nav.focus(), &Focus::node(vec![1]));
        nav.handle(NavCommand::MoveNext);
        assert_eq!(nav.focus(), &Focus::Apply);
        nav.handle(NavCommand::MoveNext);
        assert_eq!(nav.focus(), &Focus::node(vec![]));
        nav.handle(NavCommand::MovePrevious);
        assert_eq!(nav.focus(), &Focus::Apply);
        nav.handle(NavCommand::MovePrevious);
        assert_eq!(nav.focus(), &Focus::node(vec![1]));
    }

    #[test]
    fn move_into_walks_slots_then_children() {
        let mut tree = FilterTree::new();
        tree.add_condition(&[], Condition::new("a", Operator::Eq, "1"));
        let mut nav = TreeNavigator::new(tree);

        nav.handle(NavCommand::MoveInto);
        assert_eq!(nav.focus(), &Focus::Node { path: vec![], slot: GroupSlot::AddCondition });
        nav.handle(NavCommand::MoveInto);
        assert_eq!(nav.focus(), &Focus::Node { path: vec![], slot: GroupSlot::AddGroup });
        nav.handle(NavCommand::MoveInto);
        assert_eq!(nav.focus(), &Focus::node(vec![0]));
        assert_eq!(nav.handle(NavCommand::MoveInto), NavOutcome::Idle);

        nav.handle(NavCommand::MoveOut);
        assert_eq!(nav.focus(), &Focus::node(vec![]));
        assert_eq!(nav.handle(NavCommand::MoveOut), NavOutcome::Idle);
    }

    #[test]
    fn empty_group_stops_at_add_group_slot() {
        let mut nav = TreeNavigator::default();
        nav.handle(NavCommand::MoveInto);
        nav.handle(NavCommand::MoveInto);
        assert_eq!(nav.handle(NavCommand::MoveInto), NavOutcome::Idle);
        assert_eq!(nav.focus(), &Focus::Node { path: vec![], slot: GroupSlot::AddGroup });
    }

    #[test]
    fn delete_selects_previous_sibling_and_protects_root() {
        let mut tree = FilterTree::new();
        tree.add_condition(&[], Condition::new("a", Operator::Eq, "1"));
        tree.add_condition(&[], Condition::new("b", Operator::Eq, "2"));
        let mut nav = TreeNavigator::new(tree);

        assert_eq!(nav.handle(NavCommand::Delete), NavOutcome::Idle);
        nav.handle(NavCommand::MovePrevious);
        nav.handle(NavCommand::MovePrevious);
        assert_eq!(nav.focus(), &Focus::node(vec![1]));
        assert_eq!(nav.handle(NavCommand::Delete), NavOutcome::Changed);
        assert_eq!(nav.focus(), &Focus::node(vec![0]));
        assert_eq!(nav.tree().count_conditions(), 1);
        assert!(nav.is_dirty());
    }

    #[test]
    fn invalid_forms_are_rejected_and_stay_open() {
        let mut nav = TreeNavigator::default();
        open_add_condition(&mut nav);
        assert_eq!(nav.handle(NavCommand::Activate), NavOutcome::Rejected(EditError::EmptyField));
        type_text(&mut nav, "host");
        assert_eq!(
            nav.handle(NavCommand::Activate),
            NavOutcome::Rejected(EditError::MissingOperator)
        );
        nav.handle(NavCommand::MoveInto);
        assert_eq!(
            nav.handle(NavCommand::Activate),
            NavOutcome::Rejected(EditError::EmptyValue(Operator::Eq))
        );
        assert_eq!(nav.mode(), Mode::Edit);
        assert!(nav.tree().is_empty());
    }

    #[test]
    fn null_operators_commit_without_value() {
        let mut nav = TreeNavigator::default();
        open_add_condition(&mut nav);
        type_text(&mut nav, "trace_id");
        nav.handle(NavCommand::MoveOut);
        nav.handle(NavCommand::MoveOut);
        assert!(matches!(
            nav.state(),
            NavigatorState::Edit(EditForm { operator: Some(Operator::IsNull), .. })
        ));
        assert_eq!(nav.handle(NavCommand::Activate), NavOutcome::Changed);
        assert_eq!(nav.tree().count_conditions(), 1);
    }

    #[test]
    fn cancel_in_edit_leaves_tree_untouched() {
        let mut tree = FilterTree::new();
        tree.add_condition(&[], Condition::new("a", Operator::Eq, "1"));
        let mut nav = TreeNavigator::new(tree.clone());
        nav.handle(NavCommand::MoveNext);
        nav.handle(NavCommand::Activate);
        let NavigatorState::Edit(form) = nav.state() else {
            panic!("expected edit state");
        };
        assert_eq!(form.field, "a");
        assert_eq!(form.operator, Some(Operator::Eq));

        nav.handle(NavCommand::Erase);
        type_text(&mut nav, "zzz");
        nav.handle(NavCommand::Cancel);
        assert_eq!(nav.mode(), Mode::Tree);
        assert_eq!(nav.tree(), &tree);
        assert!(!nav.is_dirty());
    }

    #[test]
    fn editing_existing_condition_replaces_it() {
        let mut tree = FilterTree::new();
        tree.add_condition(&[], Condition::new("a", Operator::Eq, "1"));
        let mut nav = TreeNavigator::new(tree);
        nav.handle(NavCommand::MoveNext);
        nav.handle(NavCommand::Activate);
        nav.handle(NavCommand::MovePrevious);
        nav.handle(NavCommand::Erase);
        type_text(&mut nav, "2");
        assert_eq!(nav.handle(NavCommand::Activate), NavOutcome::Changed);
        assert_eq!(
            nav.tree().get(&[0]),
            Some(&FilterNode::Condition(Condition::new("a", Operator::Eq, "2")))
        );
        assert_eq!(nav.tree().count_conditions(), 1);
    }

    #[test]
    fn logic_select_commits_only_on_activate() {
        let mut nav = TreeNavigator::default();
        nav.handle(NavCommand::Activate);
        assert_eq!(nav.mode(), Mode::LogicSelect);
        nav.handle(NavCommand::MoveNext);
        nav.handle(NavCommand::MoveNext);
        nav.handle(NavCommand::Cancel);
        assert!(matches!(nav.tree().root(), FilterNode::Group { logic: Logic::And, .. }));

        nav.handle(NavCommand::Activate);
        nav.handle(NavCommand::MovePrevious);
        nav.handle(NavCommand::Activate);
        assert!(matches!(nav.tree().root(), FilterNode::Group { logic: Logic::NotOr, .. }));
        assert!(nav.is_dirty());
    }

    #[test]
    fn cycle_logic_ignores_conditions() {
        let mut tree = FilterTree::new();
        tree.add_condition(&[], Condition::new("a", Operator::Eq, "1"));
        let mut nav = TreeNavigator::new(tree);
        nav.handle(NavCommand::MoveNext);
        assert_eq!(nav.handle(NavCommand::CycleLogic), NavOutcome::Idle);
        assert!(!nav.is_dirty());
    }

    #[test]
    fn cancel_in_tree_dismisses() {
        let mut nav = TreeNavigator::default();
        assert_eq!(nav.handle(NavCommand::Cancel), NavOutcome::Dismissed);
    }

    #[test]
    fn category_shortcut_marks_dirty_only_when_well_formed() {
        let mut nav = TreeNavigator::default();
        assert_eq!(nav.apply_category("nonsense"), NavOutcome::Idle);
        assert!(!nav.is_dirty());
        assert_eq!(nav.apply_category("service:api"), NavOutcome::Changed);
        assert_eq!(nav.focus(), &Focus::node(vec![0]));
        assert!(matches!(nav.apply(), NavOutcome::Applied(_)));
    }
}
