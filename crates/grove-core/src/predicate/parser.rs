//! Recursive-descent parser for the predicate format language
//!
//! ```text
//! or         := and (OR and)*
//! and        := unary (AND unary)*
//! unary      := NOT unary | primary
//! primary    := '(' or ')' | TRUEPREDICATE | FALSEPREDICATE | comparison
//! comparison := key op modifier? (literal | '{' literal (',' literal)* '}')
//! ```

use super::ast::{CompareOp, ComparePredicate, Operand, Predicate};
use super::lexer::{tokenize, Spanned, Token};
use super::PredicateError;
use crate::model::Value;

pub(crate) fn parse(format: &str, args: &[Value]) -> Result<Predicate, PredicateError> {
    let tokens = tokenize(format)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        args,
        next_arg: 0,
    };
    let predicate = parser.parse_or()?;

    if let Some(extra) = parser.peek() {
        return Err(PredicateError::UnexpectedToken {
            position: extra.position,
            expected: "end of predicate",
            found: extra.token.describe(),
        });
    }
    if parser.next_arg < args.len() {
        return Err(PredicateError::UnusedArguments {
            used: parser.next_arg,
            supplied: args.len(),
        });
    }
    Ok(predicate)
}

struct Parser<'a> {
    tokens: Vec<Spanned>,
    pos: usize,
    args: &'a [Value],
    next_arg: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self, expected: &'static str) -> Result<Spanned, PredicateError> {
        let spanned = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(PredicateError::UnexpectedEnd { expected })?;
        self.pos += 1;
        Ok(spanned)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek().map(|s| &s.token) == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Predicate, PredicateError> {
        let mut parts = vec![self.parse_and()?];
        while self.eat(&Token::Or) {
            parts.push(self.parse_and()?);
        }
        Ok(collapse(parts, Predicate::Or))
    }

    fn parse_and(&mut self) -> Result<Predicate, PredicateError> {
        let mut parts = vec![self.parse_unary()?];
        while self.eat(&Token::And) {
            parts.push(self.parse_unary()?);
        }
        Ok(collapse(parts, Predicate::And))
    }

    fn parse_unary(&mut self) -> Result<Predicate, PredicateError> {
        if self.eat(&Token::Not) {
            return Ok(Predicate::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Predicate, PredicateError> {
        let spanned = self.advance("a comparison")?;
        match spanned.token {
            Token::LParen => {
                let inner = self.parse_or()?;
                let close = self.advance("')'")?;
                if close.token != Token::RParen {
                    return Err(unexpected(&close, "')'"));
                }
                Ok(inner)
            }
            Token::TruePredicate => Ok(Predicate::True),
            Token::FalsePredicate => Ok(Predicate::False),
            Token::Ident(key) => self.parse_comparison(key),
            _ => Err(unexpected(&spanned, "a key path")),
        }
    }

    fn parse_comparison(&mut self, key: String) -> Result<Predicate, PredicateError> {
        let op_token = self.advance("an operator")?;
        let op = match op_token.token {
            Token::Op(op) => op,
            _ => return Err(unexpected(&op_token, "an operator")),
        };

        let mut case_insensitive = false;
        if let Some(Spanned {
            token: Token::Modifier(ci),
            ..
        }) = self.peek()
        {
            case_insensitive = *ci;
            self.pos += 1;
        }

        let operand = if op == CompareOp::In {
            Operand::List(self.parse_list()?)
        } else {
            Operand::Value(self.parse_literal()?)
        };

        Ok(Predicate::Compare(ComparePredicate {
            key,
            op,
            operand,
            case_insensitive,
        }))
    }

    fn parse_list(&mut self) -> Result<Vec<Value>, PredicateError> {
        let open = self.advance("'{'")?;
        if open.token != Token::LBrace {
            return Err(unexpected(&open, "'{'"));
        }
        let mut values = Vec::new();
        if self.eat(&Token::RBrace) {
            return Ok(values);
        }
        loop {
            values.push(self.parse_literal()?);
            let sep = self.advance("',' or '}'")?;
            match sep.token {
                Token::Comma => continue,
                Token::RBrace => return Ok(values),
                _ => return Err(unexpected(&sep, "',' or '}'")),
            }
        }
    }

    fn parse_literal(&mut self) -> Result<Value, PredicateError> {
        let spanned = self.advance("a literal")?;
        match spanned.token {
            Token::Str(s) => Ok(Value::String(s)),
            Token::Int(i) => Ok(Value::Integer(i)),
            Token::Float(d) => Ok(Value::Double(d)),
            Token::True => Ok(Value::Bool(true)),
            Token::False => Ok(Value::Bool(false)),
            Token::Nil => Ok(Value::Null),
            Token::Placeholder => {
                let index = self.next_arg;
                let value = self
                    .args
                    .get(index)
                    .cloned()
                    .ok_or(PredicateError::MissingArgument { index })?;
                self.next_arg += 1;
                Ok(value)
            }
            _ => Err(unexpected(&spanned, "a literal")),
        }
    }
}

fn collapse(mut parts: Vec<Predicate>, wrap: fn(Vec<Predicate>) -> Predicate) -> Predicate {
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        wrap(parts)
    }
}

fn unexpected(spanned: &Spanned, expected: &'static str) -> PredicateError {
    PredicateError::UnexpectedToken {
        position: spanned.position,
        expected,
        found: spanned.token.describe(),
    }
}
