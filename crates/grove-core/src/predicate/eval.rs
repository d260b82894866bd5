use super::ast::{CompareOp, ComparePredicate, Operand, Predicate};
use crate::model::{ObjectSnapshot, Value};
use std::cmp::Ordering;

impl Predicate {
    /// Evaluate against one object snapshot.
    ///
    /// Comparisons with Null on either side of an ordering operator are
    /// false, as are string operators on non-strings.
    pub fn evaluate(&self, snapshot: &ObjectSnapshot) -> bool {
        match self {
            Predicate::True => true,
            Predicate::False => false,
            Predicate::And(parts) => parts.iter().all(|p| p.evaluate(snapshot)),
            Predicate::Or(parts) => parts.iter().any(|p| p.evaluate(snapshot)),
            Predicate::Not(inner) => !inner.evaluate(snapshot),
            Predicate::Compare(cmp) => eval_compare(cmp, snapshot),
        }
    }
}

fn eval_compare(cmp: &ComparePredicate, snapshot: &ObjectSnapshot) -> bool {
    if let Some(targets) = snapshot.relationships.get(&cmp.key) {
        return eval_relationship(cmp, targets.iter().map(|t| t.to_uri()).collect());
    }

    let lhs = snapshot.attribute(&cmp.key);
    match (&cmp.operand, cmp.op) {
        (Operand::List(values), CompareOp::In) => values
            .iter()
            .any(|rhs| equals(lhs, rhs, cmp.case_insensitive)),
        (Operand::Value(rhs), op) => apply(op, lhs, rhs, cmp.case_insensitive),
        (Operand::List(_), _) => false,
    }
}

fn eval_relationship(cmp: &ComparePredicate, uris: Vec<String>) -> bool {
    let matches_target = |rhs: &Value| match rhs {
        Value::Null => uris.is_empty(),
        Value::String(uri) => uris.iter().any(|u| u == uri),
        _ => false,
    };
    match (&cmp.operand, cmp.op) {
        (Operand::Value(rhs), CompareOp::Eq | CompareOp::Contains) => matches_target(rhs),
        (Operand::Value(rhs), CompareOp::Ne) => !matches_target(rhs),
        (Operand::List(values), CompareOp::In) => values.iter().any(matches_target),
        _ => false,
    }
}

fn apply(op: CompareOp, lhs: &Value, rhs: &Value, ci: bool) -> bool {
    match op {
        CompareOp::Eq => equals(lhs, rhs, ci),
        CompareOp::Ne => !equals(lhs, rhs, ci),
        CompareOp::Lt => ordered(lhs, rhs, |o| o == Ordering::Less),
        CompareOp::Lte => ordered(lhs, rhs, |o| o != Ordering::Greater),
        CompareOp::Gt => ordered(lhs, rhs, |o| o == Ordering::Greater),
        CompareOp::Gte => ordered(lhs, rhs, |o| o != Ordering::Less),
        CompareOp::BeginsWith => strings(lhs, rhs, ci, |l, r| l.starts_with(r)),
        CompareOp::EndsWith => strings(lhs, rhs, ci, |l, r| l.ends_with(r)),
        CompareOp::Contains => strings(lhs, rhs, ci, |l, r| l.contains(r)),
        CompareOp::Like => strings(lhs, rhs, ci, like),
        CompareOp::In => false,
    }
}

fn equals(lhs: &Value, rhs: &Value, ci: bool) -> bool {
    if ci {
        if let (Some(l), Some(r)) = (lhs.as_str(), rhs.as_str()) {
            return l.to_lowercase() == r.to_lowercase();
        }
    }
    lhs.compare(rhs) == Some(Ordering::Equal)
}

fn ordered(lhs: &Value, rhs: &Value, test: impl Fn(Ordering) -> bool) -> bool {
    if lhs.is_null() || rhs.is_null() {
        return false;
    }
    lhs.compare(rhs).map(test).unwrap_or(false)
}

fn strings(lhs: &Value, rhs: &Value, ci: bool, test: impl Fn(&str, &str) -> bool) -> bool {
    match (lhs.as_str(), rhs.as_str()) {
        (Some(l), Some(r)) if ci => test(&l.to_lowercase(), &r.to_lowercase()),
        (Some(l), Some(r)) => test(l, r),
        _ => false,
    }
}

/// Wildcard match: `*` matches any run of characters, `?` exactly one.
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                t += 1;
                p += 1;
            }
            _ => match backtrack {
                Some((star_p, star_t)) => {
                    p = star_p + 1;
                    t = star_t + 1;
                    backtrack = Some((star_p, star_t + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}
