//! Tokenizer for `${{ ... }}` expressions

use std::fmt;

/// A lexical token
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Star,
    Not,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Null => f.write_str("null"),
            Token::Bool(b) => write!(f, "{}", b),
            Token::Int(i) => write!(f, "{}", i),
            Token::Float(v) => write!(f, "{}", v),
            Token::Str(s) => write!(f, "'{}'", s),
            Token::Ident(s) => f.write_str(s),
            Token::Dot => f.write_str("."),
            Token::Comma => f.write_str(","),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::LBracket => f.write_str("["),
            Token::RBracket => f.write_str("]"),
            Token::Star => f.write_str("*"),
            Token::Not => f.write_str("!"),
            Token::And => f.write_str("&&"),
            Token::Or => f.write_str("||"),
            Token::Eq => f.write_str("=="),
            Token::Ne => f.write_str("!="),
            Token::Lt => f.write_str("<"),
            Token::Le => f.write_str("<="),
            Token::Gt => f.write_str(">"),
            Token::Ge => f.write_str(">="),
        }
    }
}

/// Token with its byte offset in the expression
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

/// Lexer failure with the byte offset it happened at
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub offset: usize,
    pub message: String,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Split an expression into tokens
pub fn tokenize(input: &str) -> Result<Vec<Spanned>, LexError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens: Vec<Spanned> = Vec::new();
    let mut i = 0;

    let err = |offset: usize, message: String| LexError { offset, message };

    while i < chars.len() {
        let (offset, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let simple = match (c, next) {
            ('&', Some('&')) => Some((Token::And, 2)),
            ('|', Some('|')) => Some((Token::Or, 2)),
            ('=', Some('=')) => Some((Token::Eq, 2)),
            ('!', Some('=')) => Some((Token::Ne, 2)),
            ('<', Some('=')) => Some((Token::Le, 2)),
            ('>', Some('=')) => Some((Token::Ge, 2)),
            ('<', _) => Some((Token::Lt, 1)),
            ('>', _) => Some((Token::Gt, 1)),
            ('!', _) => Some((Token::Not, 1)),
            ('.', _) => Some((Token::Dot, 1)),
            (',', _) => Some((Token::Comma, 1)),
            ('(', _) => Some((Token::LParen, 1)),
            (')', _) => Some((Token::RParen, 1)),
            ('[', _) => Some((Token::LBracket, 1)),
            (']', _) => Some((Token::RBracket, 1)),
            ('*', _) => Some((Token::Star, 1)),
            _ => None,
        };
        if let Some((token, len)) = simple {
            tokens.push(Spanned { token, offset });
            i += len;
            continue;
        }

        if c == '\'' {
            let mut text = String::new();
            let mut j = i + 1;
            loop {
                match chars.get(j) {
                    None => return Err(err(offset, "unterminated string literal".to_string())),
                    Some((_, '\'')) if chars.get(j + 1).map(|(_, c)| *c) == Some('\'') => {
                        text.push('\'');
                        j += 2;
                    }
                    Some((_, '\'')) => break,
                    Some((_, ch)) => {
                        text.push(*ch);
                        j += 1;
                    }
                }
            }
            tokens.push(Spanned {
                token: Token::Str(text),
                offset,
            });
            i = j + 1;
            continue;
        }

        let negative_number = c == '-' && next.is_some_and(|n| n.is_ascii_digit());
        if c.is_ascii_digit() || negative_number {
            let mut j = i + 1;
            let mut is_float = false;
            while let Some((_, ch)) = chars.get(j) {
                let ch = *ch;
                let prev = chars[j - 1].1;
                if ch.is_ascii_digit() {
                    j += 1;
                } else if ch == '.' && !is_float && chars.get(j + 1).is_some_and(|(_, n)| n.is_ascii_digit()) {
                    is_float = true;
                    j += 1;
                } else if ch == 'e' || ch == 'E' || ((ch == '+' || ch == '-') && (prev == 'e' || prev == 'E')) {
                    is_float = true;
                    j += 1;
                } else {
                    break;
                }
            }
            let end = chars.get(j).map(|(o, _)| *o).unwrap_or(input.len());
            let text = &input[offset..end];
            let token = if is_float {
                text.parse::<f64>()
                    .map(Token::Float)
                    .map_err(|e| err(offset, format!("invalid number '{}': {}", text, e)))?
            } else {
                match text.parse::<i64>() {
                    Ok(n) => Token::Int(n),
                    Err(_) => text
                        .parse::<f64>()
                        .map(Token::Float)
                        .map_err(|e| err(offset, format!("invalid number '{}': {}", text, e)))?,
                }
            };
            tokens.push(Spanned { token, offset });
            i = j;
            continue;
        }

        if is_ident_start(c) {
            let mut j = i + 1;
            while chars.get(j).is_some_and(|(_, ch)| is_ident_char(*ch)) {
                j += 1;
            }
            let end = chars.get(j).map(|(o, _)| *o).unwrap_or(input.len());
            let word = &input[offset..end];
            let token = match word {
                "true" => Token::Bool(true),
                "false" => Token::Bool(false),
                "null" => Token::Null,
                _ => Token::Ident(word.to_string()),
            };
            tokens.push(Spanned { token, offset });
            i = j;
            continue;
        }

        return Err(err(offset, format!("unexpected character '{}'", c)));
    }

    Ok(tokens)
}
