use super::ast::CompareOp;
use super::PredicateError;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Placeholder,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Op(CompareOp),
    /// `[c]`, `[d]`, `[cd]`; true when case-insensitive
    Modifier(bool),
    And,
    Or,
    Not,
    True,
    False,
    Nil,
    TruePredicate,
    FalsePredicate,
}

impl Token {
    pub(crate) fn describe(&self) -> String {
        match self {
            Token::Ident(s) => format!("identifier '{}'", s),
            Token::Str(s) => format!("string {:?}", s),
            Token::Int(i) => format!("number {}", i),
            Token::Float(d) => format!("number {}", d),
            Token::Placeholder => "'%@'".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::LBrace => "'{'".to_string(),
            Token::RBrace => "'}'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Op(op) => format!("operator {}", op),
            Token::Modifier(_) => "modifier".to_string(),
            Token::And => "AND".to_string(),
            Token::Or => "OR".to_string(),
            Token::Not => "NOT".to_string(),
            Token::True => "TRUE".to_string(),
            Token::False => "FALSE".to_string(),
            Token::Nil => "NIL".to_string(),
            Token::TruePredicate => "TRUEPREDICATE".to_string(),
            Token::FalsePredicate => "FALSEPREDICATE".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub position: usize,
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Spanned>, PredicateError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (position, c) = chars[i];
        let next = chars.get(i + 1).map(|&(_, ch)| ch);

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let (token, width) = match (c, next) {
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('{', _) => (Token::LBrace, 1),
            ('}', _) => (Token::RBrace, 1),
            (',', _) => (Token::Comma, 1),
            ('%', Some('@')) => (Token::Placeholder, 2),
            ('=', Some('=')) => (Token::Op(CompareOp::Eq), 2),
            ('=', Some('<')) => (Token::Op(CompareOp::Lte), 2),
            ('=', Some('>')) => (Token::Op(CompareOp::Gte), 2),
            ('=', _) => (Token::Op(CompareOp::Eq), 1),
            ('!', Some('=')) => (Token::Op(CompareOp::Ne), 2),
            ('!', _) => (Token::Not, 1),
            ('<', Some('>')) => (Token::Op(CompareOp::Ne), 2),
            ('<', Some('=')) => (Token::Op(CompareOp::Lte), 2),
            ('<', _) => (Token::Op(CompareOp::Lt), 1),
            ('>', Some('=')) => (Token::Op(CompareOp::Gte), 2),
            ('>', _) => (Token::Op(CompareOp::Gt), 1),
            ('&', Some('&')) => (Token::And, 2),
            ('|', Some('|')) => (Token::Or, 2),
            ('[', _) => {
                let (modifier, width) = lex_modifier(&chars[i..], position)?;
                (modifier, width)
            }
            ('"', _) | ('\'', _) => {
                let (text, width) = lex_string(&chars[i..], position)?;
                (Token::Str(text), width)
            }
            (c, _) if c.is_ascii_digit() => lex_number(&chars[i..], position)?,
            ('-', Some(d)) if d.is_ascii_digit() => lex_number(&chars[i..], position)?,
            (c, _) if c.is_alphabetic() || c == '_' => {
                let width = chars[i..]
                    .iter()
                    .take_while(|&&(_, ch)| ch.is_alphanumeric() || ch == '_' || ch == '.')
                    .count();
                let word: String = chars[i..i + width].iter().map(|&(_, ch)| ch).collect();
                (keyword_or_ident(word), width)
            }
            (ch, _) => return Err(PredicateError::UnexpectedCharacter { position, ch }),
        };

        tokens.push(Spanned { token, position });
        i += width;
    }

    Ok(tokens)
}

fn keyword_or_ident(word: String) -> Token {
    match word.to_ascii_uppercase().as_str() {
        "AND" => Token::And,
        "OR" => Token::Or,
        "NOT" => Token::Not,
        "BEGINSWITH" => Token::Op(CompareOp::BeginsWith),
        "ENDSWITH" => Token::Op(CompareOp::EndsWith),
        "CONTAINS" => Token::Op(CompareOp::Contains),
        "LIKE" => Token::Op(CompareOp::Like),
        "IN" => Token::Op(CompareOp::In),
        "TRUE" | "YES" => Token::True,
        "FALSE" | "NO" => Token::False,
        "NIL" | "NULL" => Token::Nil,
        "TRUEPREDICATE" => Token::TruePredicate,
        "FALSEPREDICATE" => Token::FalsePredicate,
        _ => Token::Ident(word),
    }
}

fn lex_string(chars: &[(usize, char)], position: usize) -> Result<(String, usize), PredicateError> {
    let quote = chars[0].1;
    let mut text = String::new();
    let mut i = 1;
    while i < chars.len() {
        match chars[i].1 {
            c if c == quote => return Ok((text, i + 1)),
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .map(|&(_, ch)| ch)
                    .ok_or(PredicateError::UnterminatedString { position })?;
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
                i += 2;
            }
            c => {
                text.push(c);
                i += 1;
            }
        }
    }
    Err(PredicateError::UnterminatedString { position })
}

fn lex_number(chars: &[(usize, char)], position: usize) -> Result<(Token, usize), PredicateError> {
    let width = 1 + chars[1..]
        .iter()
        .take_while(|&&(_, ch)| ch.is_ascii_digit() || ch == '.')
        .count();
    let text: String = chars[..width].iter().map(|&(_, ch)| ch).collect();
    let invalid = || PredicateError::InvalidNumber {
        position,
        text: text.clone(),
    };
    let token = if text.contains('.') {
        Token::Float(text.parse::<f64>().map_err(|_| invalid())?)
    } else {
        Token::Int(text.parse::<i64>().map_err(|_| invalid())?)
    };
    Ok((token, width))
}

fn lex_modifier(chars: &[(usize, char)], position: usize) -> Result<(Token, usize), PredicateError> {
    let close = chars
        .iter()
        .position(|&(_, ch)| ch == ']')
        .ok_or(PredicateError::InvalidModifier {
            position,
            text: chars.iter().map(|&(_, ch)| ch).collect(),
        })?;
    let text: String = chars[1..close].iter().map(|&(_, ch)| ch).collect();
    let flags = text.to_ascii_lowercase();
    if flags.is_empty() || !flags.chars().all(|ch| ch == 'c' || ch == 'd') {
        return Err(PredicateError::InvalidModifier { position, text });
    }
    Ok((Token::Modifier(flags.contains('c')), close + 1))
}
