//! Binding a parsed predicate to an entity
//!
//! Binding checks every key against the entity's properties, checks that
//! each operator applies to the property, and normalizes literals to the
//! attribute's kind (e.g. RFC 3339 strings become dates).

use super::ast::{CompareOp, ComparePredicate, Operand, Predicate};
use super::PredicateError;
use crate::model::{
    AttributeDescription, AttributeKind, EntityDescription, ObjectId, RelationshipDescription,
    Value,
};

pub(crate) fn bind(
    predicate: Predicate,
    entity: &EntityDescription,
) -> Result<Predicate, PredicateError> {
    Ok(match predicate {
        Predicate::True | Predicate::False => predicate,
        Predicate::And(parts) => Predicate::And(bind_all(parts, entity)?),
        Predicate::Or(parts) => Predicate::Or(bind_all(parts, entity)?),
        Predicate::Not(inner) => Predicate::Not(Box::new(bind(*inner, entity)?)),
        Predicate::Compare(cmp) => Predicate::Compare(bind_compare(cmp, entity)?),
    })
}

fn bind_all(
    parts: Vec<Predicate>,
    entity: &EntityDescription,
) -> Result<Vec<Predicate>, PredicateError> {
    parts.into_iter().map(|p| bind(p, entity)).collect()
}

fn bind_compare(
    cmp: ComparePredicate,
    entity: &EntityDescription,
) -> Result<ComparePredicate, PredicateError> {
    if let Some(attribute) = entity.attribute_named(&cmp.key) {
        return bind_attribute(cmp, attribute);
    }
    if let Some(relationship) = entity.relationship_named(&cmp.key) {
        return bind_relationship(cmp, relationship);
    }
    Err(PredicateError::UnknownKey {
        entity: entity.name.clone(),
        key: cmp.key,
    })
}

fn bind_attribute(
    cmp: ComparePredicate,
    attribute: &AttributeDescription,
) -> Result<ComparePredicate, PredicateError> {
    let kind = attribute.kind;
    let unsupported = |cmp: &ComparePredicate| PredicateError::UnsupportedOperator {
        key: cmp.key.clone(),
        op: cmp.op,
    };

    if (cmp.op.is_string_op() || cmp.case_insensitive) && kind != AttributeKind::String {
        return Err(unsupported(&cmp));
    }
    if cmp.op.is_ordering() && !kind.is_ordered() {
        return Err(unsupported(&cmp));
    }

    let null_allowed = matches!(cmp.op, CompareOp::Eq | CompareOp::Ne | CompareOp::In);
    let fit = |value: Value| -> Result<Value, PredicateError> {
        if value.is_null() {
            return if null_allowed {
                Ok(value)
            } else {
                Err(mismatch(&cmp.key, &kind.to_string(), &value))
            };
        }
        literal_for_kind(&value, kind).ok_or_else(|| mismatch(&cmp.key, &kind.to_string(), &value))
    };

    let operand = match cmp.operand.clone() {
        Operand::Value(v) => Operand::Value(fit(v)?),
        Operand::List(values) => {
            Operand::List(values.into_iter().map(&fit).collect::<Result<_, _>>()?)
        }
    };
    Ok(ComparePredicate { operand, ..cmp })
}

fn bind_relationship(
    cmp: ComparePredicate,
    relationship: &RelationshipDescription,
) -> Result<ComparePredicate, PredicateError> {
    let supported = match cmp.op {
        CompareOp::Eq | CompareOp::Ne => true,
        CompareOp::In => !relationship.to_many,
        CompareOp::Contains => relationship.to_many,
        _ => false,
    };
    if !supported || cmp.case_insensitive {
        return Err(PredicateError::UnsupportedOperator {
            key: cmp.key,
            op: cmp.op,
        });
    }

    let expected = format!("nil or a {} object id", relationship.destination);
    let check = |value: &Value| -> Result<(), PredicateError> {
        match value {
            Value::Null if cmp.op != CompareOp::Contains => Ok(()),
            Value::String(uri) if !(relationship.to_many && cmp.op != CompareOp::Contains) => {
                match ObjectId::parse(uri) {
                    Ok(id) if id.entity() == relationship.destination => Ok(()),
                    _ => Err(mismatch(&cmp.key, &expected, value)),
                }
            }
            other => Err(mismatch(&cmp.key, &expected, other)),
        }
    };

    match &cmp.operand {
        Operand::Value(v) => check(v)?,
        Operand::List(values) => values.iter().try_for_each(&check)?,
    }
    Ok(cmp)
}

/// Numeric kinds accept either numeric literal; other kinds coerce.
fn literal_for_kind(value: &Value, kind: AttributeKind) -> Option<Value> {
    if kind.is_numeric() && value.as_f64().is_some() {
        return Some(value.clone());
    }
    value.coerce_to(kind)
}

fn mismatch(key: &str, expected: &str, found: &Value) -> PredicateError {
    PredicateError::KindMismatch {
        key: key.to_string(),
        expected: expected.to_string(),
        found: found.to_string(),
    }
}
