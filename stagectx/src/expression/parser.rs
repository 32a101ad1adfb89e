//! Recursive-descent parser for the expression language found inside `${...}`.

use super::EvaluatorVersion;
use crate::errors::ExpressionError;
use serde_json::Value;

/// Bound on the height of a parsed tree. Parentheses, prefix operators and
/// every folded infix or postfix operator each count one level.
const MAX_NESTING: usize = 64;

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Logical negation.
    Not,
    /// Arithmetic negation.
    Neg,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`, numeric addition or string concatenation.
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `&&` or `and`, short-circuiting.
    And,
    /// `||` or `or`, short-circuiting.
    Or,
}

impl BinaryOp {
    /// Returns the operator's source form.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal string, number, boolean or null.
    Literal(Value),
    /// A top-level variable.
    Variable(String),
    /// `#root`: the whole variable map.
    Root,
    /// `{a, b, c}` inline list.
    List(Vec<Expr>),
    /// `target.name` or `target?.name`.
    Property {
        /// The object being accessed.
        target: Box<Expr>,
        /// The property name.
        name: String,
        /// Whether `?.` was used.
        null_safe: bool,
    },
    /// `target[index]`.
    Index {
        /// The container.
        target: Box<Expr>,
        /// The key or position.
        index: Box<Expr>,
    },
    /// `#name(args)`.
    Call {
        /// Function name without the `#`.
        name: String,
        /// Argument expressions.
        args: Vec<Expr>,
    },
    /// Prefix operator.
    Unary {
        /// The operator.
        op: UnaryOp,
        /// The operand.
        operand: Box<Expr>,
    },
    /// Infix operator.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// `condition ? then : otherwise`.
    Ternary {
        /// The condition.
        condition: Box<Expr>,
        /// Value when true.
        then: Box<Expr>,
        /// Value when false.
        otherwise: Box<Expr>,
    },
    /// `value ?: fallback`.
    Elvis {
        /// Primary value.
        value: Box<Expr>,
        /// Used when the primary value is null.
        fallback: Box<Expr>,
    },
}

/// Parses one expression (the text between `${` and `}`).
pub fn parse(source: &str, version: EvaluatorVersion) -> Result<Expr, ExpressionError> {
    let mut parser = Parser::new(source, version);
    parser.skip_ws();
    if parser.eof() {
        return Err(parser.error("empty expression"));
    }
    let expr = parser.parse_expr()?;
    parser.skip_ws();
    if !parser.eof() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}

struct Parser<'a> {
    s: &'a str,
    i: usize,
    depth: usize,
    version: EvaluatorVersion,
}

impl<'a> Parser<'a> {
    fn new(s: &'a str, version: EvaluatorVersion) -> Self {
        Self {
            s,
            i: 0,
            depth: 0,
            version,
        }
    }

    fn error(&self, message: impl Into<String>) -> ExpressionError {
        ExpressionError::syntax(self.s, self.i, message)
    }

    /// Adds one level to the tree being built.
    fn descend(&mut self) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error("expression nested too deeply"));
        }
        Ok(())
    }

    fn parse_expr(&mut self) -> Result<Expr, ExpressionError> {
        self.descend()?;
        let result = self.parse_ternary();
        self.depth -= 1;
        result
    }

    fn parse_ternary(&mut self) -> Result<Expr, ExpressionError> {
        let condition = self.parse_elvis()?;
        self.skip_ws();
        if self.peek_char() == Some('?') && !self.peek_str("?:") && !self.peek_str("?.") {
            self.i += 1;
            let then = self.parse_expr()?;
            self.skip_ws();
            self.expect(':')?;
            let otherwise = self.parse_expr()?;
            return Ok(Expr::Ternary {
                condition: Box::new(condition),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(condition)
    }

    fn parse_elvis(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.depth;
        let mut value = self.parse_or()?;
        loop {
            self.skip_ws();
            if !self.peek_str("?:") {
                self.depth = base;
                return Ok(value);
            }
            self.require_null_safe("?:")?;
            self.i += 2;
            self.descend()?;
            let fallback = self.parse_or()?;
            value = Expr::Elvis {
                value: Box::new(value),
                fallback: Box::new(fallback),
            };
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.depth;
        let mut left = self.parse_and()?;
        loop {
            self.skip_ws();
            if self.consume_str("||") || self.consume_keyword("or") {
                self.descend()?;
                let right = self.parse_and()?;
                left = binary(BinaryOp::Or, left, right);
            } else {
                self.depth = base;
                return Ok(left);
            }
        }
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.depth;
        let mut left = self.parse_not()?;
        loop {
            self.skip_ws();
            if self.consume_str("&&") || self.consume_keyword("and") {
                self.descend()?;
                let right = self.parse_not()?;
                left = binary(BinaryOp::And, left, right);
            } else {
                self.depth = base;
                return Ok(left);
            }
        }
    }

    fn parse_not(&mut self) -> Result<Expr, ExpressionError> {
        self.skip_ws();
        if (self.peek_char() == Some('!') && !self.peek_str("!=")) || self.peek_keyword("not") {
            if !self.consume_char('!') {
                self.i += "not".len();
            }
            self.descend()?;
            let operand = self.parse_not();
            self.depth -= 1;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand?),
            });
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr, ExpressionError> {
        let left = self.parse_additive()?;
        self.skip_ws();
        let op = if self.consume_str("==") {
            BinaryOp::Eq
        } else if self.consume_str("!=") {
            BinaryOp::Ne
        } else if self.consume_str("<=") {
            BinaryOp::Le
        } else if self.consume_str(">=") {
            BinaryOp::Ge
        } else if self.consume_char('<') {
            BinaryOp::Lt
        } else if self.consume_char('>') {
            BinaryOp::Gt
        } else {
            return Ok(left);
        };
        let right = self.parse_additive()?;
        Ok(binary(op, left, right))
    }

    fn parse_additive(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.depth;
        let mut left = self.parse_multiplicative()?;
        loop {
            self.skip_ws();
            let op = if self.consume_char('+') {
                BinaryOp::Add
            } else if self.consume_char('-') {
                BinaryOp::Sub
            } else {
                self.depth = base;
                return Ok(left);
            };
            self.descend()?;
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.depth;
        let mut left = self.parse_unary()?;
        loop {
            self.skip_ws();
            let op = if self.consume_char('*') {
                BinaryOp::Mul
            } else if self.consume_char('/') {
                BinaryOp::Div
            } else if self.consume_char('%') {
                BinaryOp::Rem
            } else {
                self.depth = base;
                return Ok(left);
            };
            self.descend()?;
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        self.skip_ws();
        if self.consume_char('-') {
            self.descend()?;
            let operand = self.parse_unary();
            self.depth -= 1;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand?),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.depth;
        let mut expr = self.parse_primary()?;
        loop {
            self.skip_ws();
            if self.peek_str("?.") || self.peek_char().is_some_and(|c| c == '.' || c == '[') {
                self.descend()?;
            }
            if self.peek_str("?.") {
                self.require_null_safe("?.")?;
                self.i += 2;
                self.skip_ws();
                let name = self.parse_identifier()?;
                expr = Expr::Property {
                    target: Box::new(expr),
                    name,
                    null_safe: true,
                };
            } else if self.consume_char('.') {
                self.skip_ws();
                let name = self.parse_identifier()?;
                expr = Expr::Property {
                    target: Box::new(expr),
                    name,
                    null_safe: false,
                };
            } else if self.consume_char('[') {
                let index = self.parse_expr()?;
                self.skip_ws();
                self.expect(']')?;
                expr = Expr::Index {
                    target: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                self.depth = base;
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        self.skip_ws();
        match self.peek_char() {
            None => Err(self.error("unexpected end of expression")),
            Some('\'' | '"') => Ok(Expr::Literal(Value::String(self.parse_quoted_string()?))),
            Some(c) if c.is_ascii_digit() => Ok(Expr::Literal(self.parse_number_literal()?)),
            Some('(') => {
                self.i += 1;
                let inner = self.parse_expr()?;
                self.skip_ws();
                self.expect(')')?;
                Ok(inner)
            }
            Some('{') => {
                self.i += 1;
                let items = self.parse_list('}')?;
                Ok(Expr::List(items))
            }
            Some('#') => {
                self.i += 1;
                let name = self.parse_identifier()?;
                self.skip_ws();
                if name == "root" && self.peek_char() != Some('(') {
                    return Ok(Expr::Root);
                }
                self.expect('(')?;
                let args = self.parse_list(')')?;
                Ok(Expr::Call { name, args })
            }
            Some(_) => {
                let start = self.i;
                let name = self.parse_identifier()?;
                match name.as_str() {
                    "true" => Ok(Expr::Literal(Value::Bool(true))),
                    "false" => Ok(Expr::Literal(Value::Bool(false))),
                    "null" => Ok(Expr::Literal(Value::Null)),
                    "and" | "or" | "not" => {
                        self.i = start;
                        Err(self.error(format!("unexpected keyword '{name}'")))
                    }
                    _ => Ok(Expr::Variable(name)),
                }
            }
        }
    }

    /// Parses comma-separated expressions up to and including `close`.
    fn parse_list(&mut self, close: char) -> Result<Vec<Expr>, ExpressionError> {
        let mut out = Vec::new();
        self.skip_ws();
        if self.consume_char(close) {
            return Ok(out);
        }
        loop {
            out.push(self.parse_expr()?);
            self.skip_ws();
            if self.consume_char(',') {
                continue;
            }
            self.expect(close)?;
            return Ok(out);
        }
    }

    fn require_null_safe(&self, operator: &str) -> Result<(), ExpressionError> {
        if self.version.supports_null_safe_operators() {
            Ok(())
        } else {
            Err(self.error(format!(
                "operator '{operator}' is not supported by evaluator {}",
                self.version
            )))
        }
    }

    fn parse_identifier(&mut self) -> Result<String, ExpressionError> {
        let start = self.i;
        while let Some(c) = self.peek_char() {
            if c == '_' || c == '$' || c.is_ascii_alphanumeric() {
                self.i += c.len_utf8();
            } else {
                break;
            }
        }
        if self.i == start {
            return Err(self.error("identifier expected"));
        }
        Ok(self.s[start..self.i].to_string())
    }

    fn parse_number_literal(&mut self) -> Result<Value, ExpressionError> {
        let start = self.i;
        self.skip_digits();
        let mut is_float = false;
        if self.peek_char() == Some('.')
            && self.s[self.i + 1..].chars().next().is_some_and(|c| c.is_ascii_digit())
        {
            is_float = true;
            self.i += 1;
            self.skip_digits();
        }
        let text = &self.s[start..self.i];
        if is_float {
            let f: f64 = text.parse().map_err(|_| self.error("bad float"))?;
            serde_json::Number::from_f64(f)
                .map(Value::Number)
                .ok_or_else(|| self.error("non-finite number"))
        } else {
            let n: i64 = text.parse().map_err(|_| self.error("integer out of range"))?;
            Ok(Value::from(n))
        }
    }

    fn skip_digits(&mut self) {
        while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.i += 1;
        }
    }

    /// Parses `'...'` or `"..."`. A doubled quote or a backslash escapes.
    fn parse_quoted_string(&mut self) -> Result<String, ExpressionError> {
        let start = self.i;
        let quote = self.peek_char().ok_or_else(|| self.error("string expected"))?;
        self.i += 1;
        let mut out = String::new();
        while let Some(c) = self.peek_char() {
            self.i += c.len_utf8();
            if c == quote {
                if self.peek_char() == Some(quote) {
                    self.i += 1;
                    out.push(quote);
                    continue;
                }
                return Ok(out);
            }
            if c == '\\' {
                match self.peek_char() {
                    Some(nc) => {
                        self.i += nc.len_utf8();
                        match nc {
                            'n' => out.push('\n'),
                            't' => out.push('\t'),
                            'r' => out.push('\r'),
                            '\\' | '"' | '\'' => out.push(nc),
                            _ => {
                                out.push('\\');
                                out.push(nc);
                            }
                        }
                    }
                    None => break,
                }
            } else {
                out.push(c);
            }
        }
        self.i = start;
        Err(self.error("unterminated string"))
    }

    fn expect(&mut self, c: char) -> Result<(), ExpressionError> {
        if self.consume_char(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{c}'")))
        }
    }

    fn consume_char(&mut self, c: char) -> bool {
        if self.peek_char() == Some(c) {
            self.i += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn consume_str(&mut self, lit: &str) -> bool {
        if self.peek_str(lit) {
            self.i += lit.len();
            true
        } else {
            false
        }
    }

    fn peek_keyword(&self, kw: &str) -> bool {
        self.peek_str(kw)
            && !self.s[self.i + kw.len()..]
                .chars()
                .next()
                .is_some_and(|c| c == '_' || c.is_ascii_alphanumeric())
    }

    fn consume_keyword(&mut self, kw: &str) -> bool {
        if self.peek_keyword(kw) {
            self.i += kw.len();
            true
        } else {
            false
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.s[self.i..].chars().next()
    }

    fn peek_str(&self, lit: &str) -> bool {
        self.s[self.i..].starts_with(lit)
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_whitespace() {
                self.i += c.len_utf8();
            } else {
                break;
            }
        }
    }

    fn eof(&self) -> bool {
        self.i >= self.s.len()
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}
