//! Parser for the transformation expression language.
//!
//! A Python expression subset, by precedence (lowest first):
//!
//! ```text
//! expr       := or_expr ["if" or_expr "else" expr]
//! or_expr    := and_expr ("or" and_expr)*
//! and_expr   := not_expr ("and" not_expr)*
//! not_expr   := "not" not_expr | comparison
//! comparison := arith (cmp_op arith)*            chained, like Python
//! arith      := term (("+" | "-") term)*
//! term       := factor (("*" | "/" | "//" | "%") factor)*
//! factor     := ("-" | "+") factor | power
//! power      := postfix ["**" factor]
//! postfix    := atom (call | subscript | "." NAME)*
//! atom       := literal | NAME | "(" ... ")" | "[" ... "]" | "{" ... "}"
//! ```
//!
//! Tuples evaluate to lists; a list display may be a single-`for` comprehension.
//!
//! Recursion is bounded: at most [`MAX_TOKENS`] tokens per expression and
//! [`MAX_NESTING`] nested sub-expressions (brackets, unary operators,
//! conditionals, exponents). Past either limit parsing fails with a step
//! error instead of exhausting the stack.

use serde_json::Value;

use super::error::StepError;
use super::lexer::{lex, unquote, Token, TokenKind};

/// Longest accepted expression, in tokens
pub const MAX_TOKENS: usize = 4096;

/// Deepest accepted nesting of sub-expressions
pub const MAX_NESTING: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

/// Expression AST
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Name(String),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Index {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        value: Box<Expr>,
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Compare {
        left: Box<Expr>,
        ops: Vec<(CmpOp, Expr)>,
    },
    Bool {
        op: BoolOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    IfElse {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    ListComp {
        element: Box<Expr>,
        var: String,
        iter: Box<Expr>,
        condition: Option<Box<Expr>>,
    },
}

impl Expr {
    /// Dotted path of a chain of attribute accesses on a bare name (`a.b.c`)
    pub fn dotted_path(&self) -> Option<String> {
        match self {
            Expr::Name(name) => Some(name.clone()),
            Expr::Attribute { value, attr } => {
                value.dotted_path().map(|base| format!("{}.{}", base, attr))
            }
            _ => None,
        }
    }

    /// Leftmost name of a dotted path
    pub fn root_name(&self) -> Option<&str> {
        match self {
            Expr::Name(name) => Some(name),
            Expr::Attribute { value, .. } => value.root_name(),
            _ => None,
        }
    }
}

/// Parse one expression
pub fn parse(source: &str) -> Result<Expr, StepError> {
    let tokens = lex(source)?;
    if tokens.len() > MAX_TOKENS {
        return Err(StepError::syntax(format!(
            "expression is too long ({} tokens, at most {})",
            tokens.len(),
            MAX_TOKENS
        )));
    }
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
        nesting: 0,
    };
    if parser.tokens.is_empty() {
        return Err(StepError::syntax("empty expression"));
    }
    let expr = parser.expr()?;
    match parser.peek() {
        None => Ok(expr),
        Some(_) => Err(parser.unexpected()),
    }
}

struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Token>,
    pos: usize,
    /// Open recursive sub-expressions
    nesting: usize,
}

impl<'src> Parser<'src> {
    fn peek(&self) -> Option<TokenKind> {
        self.tokens.get(self.pos).map(|t| t.kind)
    }

    fn peek_at(&self, offset: usize) -> Option<TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| t.kind)
    }

    fn text(&self, token: &Token) -> &'src str {
        &self.source[token.span.clone()]
    }

    fn bump(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<(), StepError> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(match self.tokens.get(self.pos) {
                Some(token) => StepError::syntax(format!(
                    "expected {} but found '{}' at offset {}",
                    what,
                    self.text(token),
                    token.span.start
                )),
                None => StepError::syntax(format!("expected {} but reached end of input", what)),
            })
        }
    }

    fn unexpected(&self) -> StepError {
        match self.tokens.get(self.pos) {
            Some(token) => StepError::syntax(format!(
                "invalid syntax '{}' at offset {}",
                self.text(token),
                token.span.start
            )),
            None => StepError::syntax("unexpected end of input"),
        }
    }

    fn name(&mut self) -> Result<String, StepError> {
        match self.tokens.get(self.pos) {
            Some(token) if token.kind == TokenKind::Name => {
                let name = self.text(token).to_string();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Run `parse` one nesting level deeper
    fn nested(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<Expr, StepError>,
    ) -> Result<Expr, StepError> {
        if self.nesting >= MAX_NESTING {
            return Err(StepError::recursion(format!(
                "expression nested more than {} levels deep",
                MAX_NESTING
            )));
        }
        self.nesting += 1;
        let result = parse(self);
        self.nesting -= 1;
        result
    }

    fn expr(&mut self) -> Result<Expr, StepError> {
        self.nested(Self::conditional)
    }

    fn conditional(&mut self) -> Result<Expr, StepError> {
        let value = self.or_expr()?;
        if self.eat(TokenKind::KwIf) {
            let condition = self.or_expr()?;
            self.expect(TokenKind::KwElse, "'else'")?;
            let otherwise = self.expr()?;
            return Ok(Expr::IfElse {
                condition: Box::new(condition),
                then: Box::new(value),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(value)
    }

    fn or_expr(&mut self) -> Result<Expr, StepError> {
        let mut left = self.and_expr()?;
        while self.eat(TokenKind::KwOr) {
            let right = self.and_expr()?;
            left = Expr::Bool {
                op: BoolOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, StepError> {
        let mut left = self.not_expr()?;
        while self.eat(TokenKind::KwAnd) {
            let right = self.not_expr()?;
            left = Expr::Bool {
                op: BoolOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, StepError> {
        if self.eat(TokenKind::KwNot) {
            let operand = self.nested(Self::not_expr)?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.comparison()
    }

    fn cmp_op(&mut self) -> Option<CmpOp> {
        let op = match self.peek()? {
            TokenKind::Eq => CmpOp::Eq,
            TokenKind::NotEq => CmpOp::NotEq,
            TokenKind::Lt => CmpOp::Lt,
            TokenKind::LtEq => CmpOp::LtEq,
            TokenKind::Gt => CmpOp::Gt,
            TokenKind::GtEq => CmpOp::GtEq,
            TokenKind::KwIn => CmpOp::In,
            TokenKind::KwNot if self.peek_at(1) == Some(TokenKind::KwIn) => {
                self.pos += 1;
                CmpOp::NotIn
            }
            TokenKind::KwIs if self.peek_at(1) == Some(TokenKind::KwNot) => {
                self.pos += 1;
                CmpOp::IsNot
            }
            TokenKind::KwIs => CmpOp::Is,
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    fn comparison(&mut self) -> Result<Expr, StepError> {
        let left = self.arith()?;
        let mut ops = Vec::new();
        while let Some(op) = self.cmp_op() {
            ops.push((op, self.arith()?));
        }
        if ops.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare {
                left: Box::new(left),
                ops,
            })
        }
    }

    fn arith(&mut self) -> Result<Expr, StepError> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Plus) => BinOp::Add,
                Some(TokenKind::Minus) => BinOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn term(&mut self) -> Result<Expr, StepError> {
        let mut left = self.factor()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Star) => BinOp::Mul,
                Some(TokenKind::Slash) => BinOp::Div,
                Some(TokenKind::DoubleSlash) => BinOp::FloorDiv,
                Some(TokenKind::Percent) => BinOp::Mod,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.factor()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn factor(&mut self) -> Result<Expr, StepError> {
        let op = match self.peek() {
            Some(TokenKind::Minus) => UnaryOp::Neg,
            Some(TokenKind::Plus) => UnaryOp::Pos,
            _ => return self.power(),
        };
        self.pos += 1;
        let operand = self.nested(Self::factor)?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn power(&mut self) -> Result<Expr, StepError> {
        let base = self.postfix()?;
        if self.eat(TokenKind::DoubleStar) {
            // Right-associative, binds tighter than unary minus on the left
            let exponent = self.nested(Self::factor)?;
            return Ok(Expr::Binary {
                op: BinOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr, StepError> {
        let mut expr = self.atom()?;
        loop {
            match self.peek() {
                Some(TokenKind::ParenOpen) => {
                    self.pos += 1;
                    let (args, kwargs) = self.call_args()?;
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                        kwargs,
                    };
                }
                Some(TokenKind::BracketOpen) => {
                    self.pos += 1;
                    expr = self.subscript(expr)?;
                }
                Some(TokenKind::Dot) => {
                    self.pos += 1;
                    let attr = self.name()?;
                    expr = Expr::Attribute {
                        value: Box::new(expr),
                        attr,
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), StepError> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();
        while !self.eat(TokenKind::ParenClose) {
            if self.peek() == Some(TokenKind::Name) && self.peek_at(1) == Some(TokenKind::Assign) {
                let name = self.name()?;
                self.pos += 1;
                kwargs.push((name, self.expr()?));
            } else if !kwargs.is_empty() {
                return Err(StepError::syntax(
                    "positional argument follows keyword argument",
                ));
            } else {
                args.push(self.expr()?);
            }
            if !self.eat(TokenKind::Comma) {
                self.expect(TokenKind::ParenClose, "')'")?;
                break;
            }
        }
        Ok((args, kwargs))
    }

    fn optional_expr(&mut self, terminators: &[TokenKind]) -> Result<Option<Box<Expr>>, StepError> {
        match self.peek() {
            Some(kind) if terminators.contains(&kind) => Ok(None),
            _ => Ok(Some(Box::new(self.expr()?))),
        }
    }

    fn subscript(&mut self, value: Expr) -> Result<Expr, StepError> {
        let stops = [TokenKind::Colon, TokenKind::BracketClose];
        let lower = self.optional_expr(&stops)?;
        if !self.eat(TokenKind::Colon) {
            self.expect(TokenKind::BracketClose, "']'")?;
            let index = lower.ok_or_else(|| StepError::syntax("empty subscript"))?;
            return Ok(Expr::Index {
                value: Box::new(value),
                index,
            });
        }
        let upper = self.optional_expr(&stops)?;
        let step = if self.eat(TokenKind::Colon) {
            self.optional_expr(&[TokenKind::BracketClose])?
        } else {
            None
        };
        self.expect(TokenKind::BracketClose, "']'")?;
        Ok(Expr::Slice {
            value: Box::new(value),
            lower,
            upper,
            step,
        })
    }

    fn atom(&mut self) -> Result<Expr, StepError> {
        let token = match self.bump() {
            Some(token) => token.clone(),
            None => return Err(StepError::syntax("unexpected end of input")),
        };
        let text = self.text(&token);
        match token.kind {
            TokenKind::KwTrue => Ok(Expr::Literal(Value::Bool(true))),
            TokenKind::KwFalse => Ok(Expr::Literal(Value::Bool(false))),
            TokenKind::KwNone => Ok(Expr::Literal(Value::Null)),
            TokenKind::Name => Ok(Expr::Name(text.to_string())),
            TokenKind::Int => {
                let digits = text.replace('_', "");
                digits
                    .parse::<i64>()
                    .map(|n| Expr::Literal(Value::from(n)))
                    .map_err(|_| StepError::overflow(format!("integer literal too large: {}", text)))
            }
            TokenKind::Float => {
                let digits = text.replace('_', "");
                digits
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(|n| Expr::Literal(Value::Number(n)))
                    .ok_or_else(|| StepError::syntax(format!("invalid float literal '{}'", text)))
            }
            TokenKind::Str => {
                // Adjacent literals concatenate
                let mut value = unquote(text)?;
                while let Some(next) = self.tokens.get(self.pos).filter(|t| t.kind == TokenKind::Str) {
                    value.push_str(&unquote(&self.source[next.span.clone()])?);
                    self.pos += 1;
                }
                Ok(Expr::Literal(Value::String(value)))
            }
            TokenKind::ParenOpen => self.paren(),
            TokenKind::BracketOpen => self.list_display(),
            TokenKind::BraceOpen => self.dict_display(),
            _ => {
                self.pos -= 1;
                Err(self.unexpected())
            }
        }
    }

    /// Parenthesised expression or tuple (tuples evaluate to lists)
    fn paren(&mut self) -> Result<Expr, StepError> {
        if self.eat(TokenKind::ParenClose) {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.expr()?;
        if self.eat(TokenKind::ParenClose) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat(TokenKind::Comma) {
            if self.peek() == Some(TokenKind::ParenClose) {
                break;
            }
            items.push(self.expr()?);
        }
        self.expect(TokenKind::ParenClose, "')'")?;
        Ok(Expr::List(items))
    }

    fn list_display(&mut self) -> Result<Expr, StepError> {
        if self.eat(TokenKind::BracketClose) {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.expr()?;
        if self.eat(TokenKind::KwFor) {
            let var = self.name()?;
            self.expect(TokenKind::KwIn, "'in'")?;
            let iter = self.or_expr()?;
            let condition = if self.eat(TokenKind::KwIf) {
                Some(Box::new(self.or_expr()?))
            } else {
                None
            };
            self.expect(TokenKind::BracketClose, "']'")?;
            return Ok(Expr::ListComp {
                element: Box::new(first),
                var,
                iter: Box::new(iter),
                condition,
            });
        }
        let mut items = vec![first];
        while self.eat(TokenKind::Comma) {
            if self.peek() == Some(TokenKind::BracketClose) {
                break;
            }
            items.push(self.expr()?);
        }
        self.expect(TokenKind::BracketClose, "']'")?;
        Ok(Expr::List(items))
    }

    fn dict_display(&mut self) -> Result<Expr, StepError> {
        let mut entries = Vec::new();
        while !self.eat(TokenKind::BraceClose) {
            let key = self.expr()?;
            self.expect(TokenKind::Colon, "':'")?;
            let value = self.expr()?;
            entries.push((key, value));
            if !self.eat(TokenKind::Comma) {
                self.expect(TokenKind::BraceClose, "'}'")?;
                break;
            }
        }
        Ok(Expr::Dict(entries))
    }
}
