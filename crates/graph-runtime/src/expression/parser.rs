//! Recursive descent parser for expressions
//!
//! Precedence, lowest first: `||`, `&&`, `==`/`!=`, `<`/`<=`/`>`/`>=`,
//! unary `!`, then property access, indexing and calls.

use super::lexer::{tokenize, LexError, Spanned, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Root context such as `env` or `github`, lower-cased
    Var(String),
    /// `receiver.name`
    Prop(Box<Expr>, String),
    /// `receiver[index]`
    Index(Box<Expr>, Box<Expr>),
    /// `receiver.*` or `receiver[*]`
    Star(Box<Expr>),
    /// Function call, name lower-cased
    Call(String, Vec<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
}

/// Parser failure with the byte offset it happened at
pub type ParseError = LexError;

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|s| s.offset).unwrap_or(self.end)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        LexError {
            offset: self.offset(),
            message: message.into(),
        }
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), ParseError> {
        if self.eat(&token) {
            Ok(())
        } else {
            let found = self
                .peek()
                .map(|t| format!("'{}'", t))
                .unwrap_or_else(|| "end of expression".to_string());
            Err(self.error(format!("expected '{}' but found {}", token, found)))
        }
    }

    fn or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.and()?;
        while self.eat(&Token::Or) {
            let right = self.and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.equality()?;
        while self.eat(&Token::And) {
            let right = self.equality()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.relational()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => CompareOp::Eq,
                Some(Token::Ne) => CompareOp::Ne,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.relational()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
    }

    fn relational(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => CompareOp::Lt,
                Some(Token::Le) => CompareOp::Le,
                Some(Token::Gt) => CompareOp::Gt,
                Some(Token::Ge) => CompareOp::Ge,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Token::Not) {
            let inner = self.unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Token::Dot) {
                match self.advance() {
                    Some(Token::Star) => expr = Expr::Star(Box::new(expr)),
                    Some(Token::Ident(name)) => expr = property(expr, name),
                    // keywords are valid property names, e.g. `inputs.null`
                    Some(Token::Bool(b)) => expr = property(expr, b.to_string()),
                    Some(Token::Null) => expr = property(expr, "null".to_string()),
                    _ => {
                        self.pos = self.pos.saturating_sub(1);
                        return Err(self.error("expected property name after '.'"));
                    }
                }
            } else if self.eat(&Token::LBracket) {
                if self.eat(&Token::Star) {
                    self.expect(Token::RBracket)?;
                    expr = Expr::Star(Box::new(expr));
                } else {
                    let index = self.or()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let offset = self.offset();
        let token = self.advance().ok_or_else(|| LexError {
            offset,
            message: "unexpected end of expression".to_string(),
        })?;

        let expr = match token {
            Token::Null => Expr::Null,
            Token::Bool(b) => Expr::Bool(b),
            Token::Int(i) => Expr::Int(i),
            Token::Float(f) => Expr::Float(f),
            Token::Str(s) => Expr::Str(s),
            Token::LParen => {
                let inner = self.or()?;
                self.expect(Token::RParen)?;
                inner
            }
            Token::Ident(name) if self.peek() == Some(&Token::LParen) => {
                self.pos += 1;
                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.or()?);
                        if self.eat(&Token::Comma) {
                            continue;
                        }
                        self.expect(Token::RParen)?;
                        break;
                    }
                }
                Expr::Call(name.to_lowercase(), args)
            }
            Token::Ident(name) => Expr::Var(name.to_lowercase()),
            other => {
                return Err(LexError {
                    offset,
                    message: format!("unexpected token '{}'", other),
                })
            }
        };
        Ok(expr)
    }
}

/// `env.NAME` becomes `env['NAME']` so the variable name keeps its case
fn property(receiver: Expr, name: String) -> Expr {
    match &receiver {
        Expr::Var(root) if root == "env" => Expr::Index(Box::new(receiver), Box::new(Expr::Str(name))),
        _ => Expr::Prop(Box::new(receiver), name),
    }
}

/// Parse the text between `${{` and `}}`
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.len(),
    };
    let expr = parser.or()?;
    if let Some(token) = parser.peek() {
        return Err(parser.error(format!("unexpected token '{}'", token)));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Box<Expr> {
        Box::new(Expr::Var(name.to_string()))
    }

    #[test]
    fn test_precedence() {
        let expr = parse("a || b && c == 1").unwrap();
        assert_eq!(
            expr,
            Expr::Or(
                var("a"),
                Box::new(Expr::And(
                    var("b"),
                    Box::new(Expr::Compare(CompareOp::Eq, var("c"), Box::new(Expr::Int(1))))
                ))
            )
        );
    }

    #[test]
    fn test_env_property_becomes_index() {
        assert_eq!(
            parse("env.Mixed_Case").unwrap(),
            Expr::Index(var("env"), Box::new(Expr::Str("Mixed_Case".to_string())))
        );
        assert_eq!(
            parse("github.Event").unwrap(),
            Expr::Prop(var("github"), "Event".to_string())
        );
    }

    #[test]
    fn test_calls_and_wildcards() {
        let expr = parse("contains(needs.*.result, 'success')").unwrap();
        let Expr::Call(name, args) = expr else {
            panic!("expected call");
        };
        assert_eq!(name, "contains");
        assert_eq!(
            args[0],
            Expr::Prop(Box::new(Expr::Star(var("needs"))), "result".to_string())
        );
        assert_eq!(parse("fromJSON('[1]')[0]").unwrap(), Expr::Index(
            Box::new(Expr::Call("fromjson".to_string(), vec![Expr::Str("[1]".to_string())])),
            Box::new(Expr::Int(0))
        ));
    }

    #[test]
    fn test_errors() {
        assert!(parse("a ==").is_err());
        assert!(parse("(a").is_err());
        let err = parse("a b").unwrap_err();
        assert_eq!(err.offset, 2);
        assert_eq!(err.message, "unexpected token 'b'");
    }
}
