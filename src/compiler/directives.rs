//! `@skip` / `@include` predicates
//!
//! Directives compile into a [`Condition`] that is folded as far as the
//! literals allow. A condition that folds to [`Condition::Never`] removes
//! the field from the plan; [`Condition::Always`] costs nothing at runtime.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::operation::{DirectiveNode, InputValue};
use crate::core::context::Variables;

/// Inclusion predicate of a step
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Condition {
    Always,
    Never,
    /// True when the variable holds `true`, inverted by `negate`
    ///
    /// An absent variable reads as `false`.
    Variable { name: Arc<str>, negate: bool },
    All(Vec<Condition>),
    Any(Vec<Condition>),
}

impl Condition {
    /// Predicate for a directive list; unknown directives are ignored
    pub fn from_directives(directives: &[DirectiveNode]) -> Self {
        directives
            .iter()
            .filter_map(|directive| {
                let negate = match directive.name.as_str() {
                    "skip" => true,
                    "include" => false,
                    _ => return None,
                };
                Some(match directive.argument("if") {
                    Some(InputValue::Variable(name)) => Condition::Variable {
                        name: Arc::from(name.as_str()),
                        negate,
                    },
                    Some(InputValue::Const(Value::Bool(flag))) => {
                        Condition::constant(*flag != negate)
                    }
                    // a missing or non-boolean `if` reads as false
                    _ => Condition::constant(negate),
                })
            })
            .fold(Condition::Always, Condition::and)
    }

    fn constant(flag: bool) -> Self {
        if flag {
            Condition::Always
        } else {
            Condition::Never
        }
    }

    /// Conjunction with folding
    pub fn and(self, other: Condition) -> Self {
        match (self, other) {
            (Condition::Never, _) | (_, Condition::Never) => Condition::Never,
            (Condition::Always, c) | (c, Condition::Always) => c,
            (Condition::All(mut left), Condition::All(right)) => {
                extend_unique(&mut left, right);
                Condition::All(left)
            }
            (Condition::All(mut left), c) | (c, Condition::All(mut left)) => {
                extend_unique(&mut left, vec![c]);
                Condition::All(left)
            }
            (a, b) if a == b => a,
            (a, b) => Condition::All(vec![a, b]),
        }
    }

    /// Disjunction with folding
    pub fn or(self, other: Condition) -> Self {
        match (self, other) {
            (Condition::Always, _) | (_, Condition::Always) => Condition::Always,
            (Condition::Never, c) | (c, Condition::Never) => c,
            (Condition::Any(mut left), Condition::Any(right)) => {
                extend_unique(&mut left, right);
                Condition::Any(left)
            }
            (Condition::Any(mut left), c) | (c, Condition::Any(mut left)) => {
                extend_unique(&mut left, vec![c]);
                Condition::Any(left)
            }
            (a, b) if a == b => a,
            (a, b) => Condition::Any(vec![a, b]),
        }
    }

    pub fn any<I: IntoIterator<Item = Condition>>(conditions: I) -> Self {
        conditions.into_iter().fold(Condition::Never, Condition::or)
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Condition::Always)
    }

    pub fn is_never(&self) -> bool {
        matches!(self, Condition::Never)
    }

    /// Evaluate against the invocation's variables
    pub fn evaluate(&self, variables: &Variables) -> bool {
        match self {
            Condition::Always => true,
            Condition::Never => false,
            Condition::Variable { name, negate } => {
                let set = matches!(variables.get(name.as_ref()), Some(Value::Bool(true)));
                set != *negate
            }
            Condition::All(conditions) => conditions.iter().all(|c| c.evaluate(variables)),
            Condition::Any(conditions) => conditions.iter().any(|c| c.evaluate(variables)),
        }
    }
}

fn extend_unique(target: &mut Vec<Condition>, extra: Vec<Condition>) {
    for condition in extra {
        if !target.contains(&condition) {
            target.push(condition);
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Always => f.write_str("true"),
            Condition::Never => f.write_str("false"),
            Condition::Variable { name, negate } => {
                if *negate {
                    write!(f, "!${}", name)
                } else {
                    write!(f, "${}", name)
                }
            }
            Condition::All(conditions) => write_joined(f, conditions, " && "),
            Condition::Any(conditions) => write_joined(f, conditions, " || "),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, conditions: &[Condition], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, condition) in conditions.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{}", condition)?;
    }
    f.write_str(")")
}
