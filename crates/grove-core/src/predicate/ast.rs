use crate::model::Value;
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

///
/// Predicate AST
///
/// Schema-agnostic tree produced by the parser. Key and literal checking
/// happens when the predicate is bound to an entity (see `validate`).
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    BeginsWith,
    EndsWith,
    Contains,
    Like,
    In,
}

impl CompareOp {
    /// Operators that only apply to strings
    pub fn is_string_op(self) -> bool {
        matches!(
            self,
            CompareOp::BeginsWith | CompareOp::EndsWith | CompareOp::Contains | CompareOp::Like
        )
    }

    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            CompareOp::Lt | CompareOp::Lte | CompareOp::Gt | CompareOp::Gte
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::BeginsWith => "BEGINSWITH",
            CompareOp::EndsWith => "ENDSWITH",
            CompareOp::Contains => "CONTAINS",
            CompareOp::Like => "LIKE",
            CompareOp::In => "IN",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Right-hand side of a comparison
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Value(Value),
    List(Vec<Value>),
}

///
/// ComparePredicate
///

#[derive(Clone, Debug, PartialEq)]
pub struct ComparePredicate {
    pub key: String,
    pub op: CompareOp,
    pub operand: Operand,
    pub case_insensitive: bool,
}

impl ComparePredicate {
    pub fn new(key: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            op,
            operand: Operand::Value(value.into()),
            case_insensitive: false,
        }
    }

    pub fn in_(key: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            key: key.into(),
            op: CompareOp::In,
            operand: Operand::List(values),
            case_insensitive: false,
        }
    }

    #[must_use]
    pub fn ignoring_case(mut self) -> Self {
        self.case_insensitive = true;
        self
    }
}

///
/// Predicate
///

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    True,
    False,
    And(Vec<Self>),
    Or(Vec<Self>),
    Not(Box<Self>),
    Compare(ComparePredicate),
}

impl Predicate {
    #[must_use]
    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Compare(ComparePredicate::new(key, CompareOp::Eq, value))
    }

    #[must_use]
    pub fn ne(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Compare(ComparePredicate::new(key, CompareOp::Ne, value))
    }

    #[must_use]
    pub fn lt(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Compare(ComparePredicate::new(key, CompareOp::Lt, value))
    }

    #[must_use]
    pub fn gt(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Compare(ComparePredicate::new(key, CompareOp::Gt, value))
    }

    #[must_use]
    pub fn in_(key: impl Into<String>, values: Vec<Value>) -> Self {
        Self::Compare(ComparePredicate::in_(key, values))
    }

    /// Whether the predicate matches every object
    pub fn is_trivially_true(&self) -> bool {
        matches!(self, Predicate::True)
    }
}

impl BitAnd for Predicate {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self::And(vec![self, rhs])
    }
}

impl BitOr for Predicate {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self::Or(vec![self, rhs])
    }
}

impl Not for Predicate {
    type Output = Self;

    fn not(self) -> Self::Output {
        Self::Not(Box::new(self))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::True => f.write_str("TRUEPREDICATE"),
            Predicate::False => f.write_str("FALSEPREDICATE"),
            Predicate::And(parts) => write_joined(f, parts, " AND "),
            Predicate::Or(parts) => write_joined(f, parts, " OR "),
            Predicate::Not(inner) => write!(f, "NOT ({})", inner),
            Predicate::Compare(cmp) => {
                write!(f, "{} {}", cmp.key, cmp.op)?;
                if cmp.case_insensitive {
                    f.write_str("[c]")?;
                }
                match &cmp.operand {
                    Operand::Value(v) => write!(f, " {}", v),
                    Operand::List(values) => {
                        let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                        write!(f, " {{{}}}", rendered.join(", "))
                    }
                }
            }
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, parts: &[Predicate], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{}", part)?;
    }
    f.write_str(")")
}
