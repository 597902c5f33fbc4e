//! Recursive-descent parser for the instruction language

use marionette_protocol::Value;

use crate::{tokenize, ScriptConfig, ScriptError, Spanned, Token};

/// A capability operation, named by its wire alias
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapOp {
    Allocate,
    Get,
    Set,
    Delete,
    Report,
    ResolveCallback,
    CheckAndMove,
    MarkErrored,
}

impl CapOp {
    /// Look up an operation by its script alias.
    #[must_use]
    pub fn from_alias(alias: &str) -> Option<Self> {
        match alias {
            "a" => Some(Self::Allocate),
            "g" => Some(Self::Get),
            "s" => Some(Self::Set),
            "d" => Some(Self::Delete),
            "r" => Some(Self::Report),
            "rp" => Some(Self::ResolveCallback),
            "c" => Some(Self::CheckAndMove),
            "e" => Some(Self::MarkErrored),
            _ => None,
        }
    }

    #[must_use]
    pub const fn alias(self) -> &'static str {
        match self {
            Self::Allocate => "a",
            Self::Get => "g",
            Self::Set => "s",
            Self::Delete => "d",
            Self::Report => "r",
            Self::ResolveCallback => "rp",
            Self::CheckAndMove => "c",
            Self::MarkErrored => "e",
        }
    }

    /// Number of arguments the operation takes.
    #[must_use]
    pub const fn arity(self) -> usize {
        match self {
            Self::Allocate | Self::Get | Self::Delete | Self::CheckAndMove => 1,
            Self::Set | Self::Report | Self::ResolveCallback | Self::MarkErrored => 2,
        }
    }
}

/// An expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    /// A `let`-bound local
    Var(String),
    /// Call on the capability surface, e.g. `_w.g(5)`
    CapCall { op: CapOp, args: Vec<Expr> },
    /// The extension bag, `_w.x`
    ExtensionBag,
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
}

/// A statement
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let { name: String, init: Expr },
    Expr(Expr),
}

/// Parse script source into statements.
///
/// Parsing is complete before any evaluation happens, so a malformed
/// script can never leave partial effects behind.
pub fn parse(source: &str, config: &ScriptConfig) -> Result<Vec<Stmt>, ScriptError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        config,
    };
    parser.script()
}

struct Parser<'a> {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    config: &'a ScriptConfig,
}

impl Parser<'_> {
    fn line(&self) -> u32 {
        self.tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map_or(1, |s| s.line)
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Parse {
            line: self.line(),
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn next(&mut self) -> Option<Token> {
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

    fn expect(&mut self, token: &Token, what: &str) -> Result<(), ScriptError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn script(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        let mut stmts = Vec::new();
        while self.peek().is_some() {
            stmts.push(self.statement()?);
        }
        Ok(stmts)
    }

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        let stmt = if self.eat(&Token::Let) {
            let name = match self.next() {
                Some(Token::Ident(name)) => name,
                _ => return Err(self.error("expected name after `let`")),
            };
            if name == self.config.bound_name {
                return Err(self.error("cannot shadow the capability surface"));
            }
            self.expect(&Token::Eq, "`=`")?;
            let init = self.expr()?;
            Stmt::Let { name, init }
        } else {
            Stmt::Expr(self.expr()?)
        };
        // Semicolons terminate statements; the final one is optional.
        if !self.eat(&Token::Semi) && self.peek().is_some() {
            return Err(self.error("expected `;`"));
        }
        Ok(stmt)
    }

    fn expr(&mut self) -> Result<Expr, ScriptError> {
        self.depth += 1;
        if self.depth > self.config.max_depth {
            return Err(ScriptError::DepthExceeded {
                max: self.config.max_depth,
            });
        }
        let result = self.unary();
        self.depth -= 1;
        result
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        if self.eat(&Token::Minus) {
            let inner = self.unary()?;
            return Ok(match inner {
                Expr::Literal(Value::Int(n)) if n != i64::MIN => {
                    Expr::Literal(Value::Int(-n))
                }
                Expr::Literal(Value::Float(f)) => Expr::Literal(Value::Float(-f)),
                other => Expr::Neg(Box::new(other)),
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Token::Dot) {
                let name = match self.next() {
                    Some(Token::Ident(name)) => name,
                    _ => return Err(self.error("expected member name after `.`")),
                };
                expr = Expr::Member(Box::new(expr), name);
            } else if self.eat(&Token::LBracket) {
                let index = self.expr()?;
                self.expect(&Token::RBracket, "`]`")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        match self.next() {
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Int(n)) => Ok(Expr::Literal(Value::Int(n))),
            Some(Token::Float(f)) => Ok(Expr::Literal(Value::Float(f))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::Str(s))),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(&Token::RParen, "`)`")?;
                Ok(inner)
            }
            Some(Token::LBracket) => self.array(),
            Some(Token::LBrace) => self.object(),
            Some(Token::Ident(name)) if name == self.config.bound_name => {
                self.capability()
            }
            Some(Token::Ident(name)) => Ok(Expr::Var(name)),
            Some(other) => Err(self.error(format!("unexpected token {other:?}"))),
            None => Err(self.error("unexpected end of script")),
        }
    }

    fn array(&mut self) -> Result<Expr, ScriptError> {
        let mut items = Vec::new();
        if self.eat(&Token::RBracket) {
            return Ok(Expr::Array(items));
        }
        loop {
            items.push(self.expr()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RBracket, "`]`")?;
        Ok(Expr::Array(items))
    }

    fn object(&mut self) -> Result<Expr, ScriptError> {
        let mut entries = Vec::new();
        if self.eat(&Token::RBrace) {
            return Ok(Expr::Object(entries));
        }
        loop {
            let key = match self.next() {
                Some(Token::Ident(key)) => key,
                Some(Token::Str(key)) => key,
                _ => return Err(self.error("expected object key")),
            };
            self.expect(&Token::Colon, "`:`")?;
            entries.push((key, self.expr()?));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RBrace, "`}`")?;
        Ok(Expr::Object(entries))
    }

    /// The bound name only appears as `<cap>.<op>(...)` or `<cap>.x`;
    /// the capability surface itself is not a value.
    fn capability(&mut self) -> Result<Expr, ScriptError> {
        self.expect(&Token::Dot, "`.` after the capability name")?;
        let name = match self.next() {
            Some(Token::Ident(name)) => name,
            _ => return Err(self.error("expected capability member")),
        };
        if name == "x" {
            return Ok(Expr::ExtensionBag);
        }
        let Some(op) = CapOp::from_alias(&name) else {
            return Err(self.error(format!("unknown capability `{name}`")));
        };
        self.expect(&Token::LParen, "`(`")?;
        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                args.push(self.expr()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::RParen, "`)`")?;
        }
        if args.len() != op.arity() {
            return Err(self.error(format!(
                "capability `{}` takes {} argument(s), got {}",
                op.alias(),
                op.arity(),
                args.len()
            )));
        }
        Ok(Expr::CapCall { op, args })
    }
}
