//! Compile a filter tree into a `?`-parameterized predicate fragment.
//!
//! User values never appear in the SQL text; they travel in `Predicate::args`.
//! Only identifiers are embedded, and always through `quote_identifier`.
use crate::core::filter::{Condition, FilterNode, FilterTree, Logic, Operator};
use crate::core::types::QueryArg;

/// SQL fragment plus the positional arguments for its placeholders
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Predicate {
    pub sql: String,
    pub args: Vec<QueryArg>,
}

impl Predicate {
    pub fn new(sql: impl Into<String>, args: Vec<QueryArg>) -> Self {
        Self { sql: sql.into(), args }
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    /// Join non-empty fragments with AND, wrapping each one in parentheses
    pub fn and_all(parts: impl IntoIterator<Item = Predicate>) -> Predicate {
        let mut sql = Vec::new();
        let mut args = Vec::new();
        for part in parts.into_iter().filter(|p| !p.is_empty()) {
            sql.push(format!("({})", part.sql));
            args.extend(part.args);
        }
        Predicate { sql: sql.join(" AND "), args }
    }
}

/// Quote an identifier with backticks, doubling any embedded backtick
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Compile the whole tree
///
/// The root group does not wrap its own joined expression, so the result reads
/// like a plain WHERE clause. Callers embedding it after other terms must
/// parenthesize it (see `Predicate::and_all`).
pub fn compile_tree(tree: &FilterTree) -> Predicate {
    match tree.root() {
        FilterNode::Group { logic, children } => {
            let parts = compile_children(children);
            join_children(*logic, parts, false)
        }
        node => compile(node),
    }
}

/// Compile a single node
pub fn compile(node: &FilterNode) -> Predicate {
    match node {
        FilterNode::Condition(cond) => compile_condition(cond),
        FilterNode::Group { logic, children } => {
            join_children(*logic, compile_children(children), true)
        }
    }
}

fn compile_children(children: &[FilterNode]) -> Vec<Predicate> {
    children
        .iter()
        .map(compile)
        .filter(|p| !p.is_empty())
        .collect()
}

fn join_children(logic: Logic, parts: Vec<Predicate>, wrap: bool) -> Predicate {
    let negate = logic.is_negated();
    match parts.len() {
        0 => Predicate::default(),
        // a lone child is returned as is, whatever the group logic
        1 => parts.into_iter().next().unwrap_or_default(),
        _ => {
            let mut sql = Vec::with_capacity(parts.len());
            let mut args = Vec::new();
            for part in parts {
                if negate {
                    sql.push(format!("NOT ({})", part.sql));
                } else {
                    sql.push(part.sql);
                }
                args.extend(part.args);
            }
            let joined = sql.join(&format!(" {} ", logic.combinator()));
            if wrap {
                Predicate::new(format!("({joined})"), args)
            } else {
                Predicate::new(joined, args)
            }
        }
    }
}

fn compile_condition(cond: &Condition) -> Predicate {
    let field = quote_identifier(&cond.field);
    let op = cond.operator;
    match op {
        Operator::IsNull | Operator::IsNotNull => Predicate::new(format!("{field} {op}"), vec![]),
        Operator::Like | Operator::NotLike => Predicate::new(
            format!("{field} {op} ?"),
            vec![QueryArg::Text(format!("%{}%", cond.value))],
        ),
        Operator::In | Operator::NotIn => {
            let items: Vec<QueryArg> = cond
                .value
                .split(',')
                .map(|item| QueryArg::Text(item.trim().to_string()))
                .collect();
            let placeholders = vec!["?"; items.len()].join(", ");
            Predicate::new(format!("{field} {op} ({placeholders})"), items)
        }
        _ => Predicate::new(format!("{field} {op} ?"), vec![QueryArg::Text(cond.value.clone())]),
    }
}
