//! Safe evaluation of user-authored normalization formulas.
//!
//! Expressions are parsed by a hand-written recursive-descent parser into a
//! closed-grammar AST (numbers, `+ - * /`, parentheses, unary minus, named
//! variables, named function calls) and evaluated by tree walking. The
//! grammar is an allow-list: only the variables `x, min, max, mean, std`,
//! the functions `log, log10, sqrt, abs, exp, sin, cos, pow`, and the
//! constants `PI, E` are accepted, so an expression can never reach
//! anything beyond this module's arithmetic. There is no dynamic code
//! generation anywhere on this path.

use crate::error::{Error, Result};
use crate::stats::ColumnStats;

/// Variable slots an expression may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variable {
    X,
    Min,
    Max,
    Mean,
    Std,
}

/// Allow-listed functions. All are unary except `pow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Function {
    Log,
    Log10,
    Sqrt,
    Abs,
    Exp,
    Sin,
    Cos,
    Pow,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "log" => Some(Function::Log),
            "log10" => Some(Function::Log10),
            "sqrt" => Some(Function::Sqrt),
            "abs" => Some(Function::Abs),
            "exp" => Some(Function::Exp),
            "sin" => Some(Function::Sin),
            "cos" => Some(Function::Cos),
            "pow" => Some(Function::Pow),
            _ => None,
        }
    }

    fn arity(self) -> usize {
        match self {
            Function::Pow => 2,
            _ => 1,
        }
    }

    fn apply(self, args: &[f64]) -> f64 {
        match self {
            Function::Log => args[0].ln(),
            Function::Log10 => args[0].log10(),
            Function::Sqrt => args[0].sqrt(),
            Function::Abs => args[0].abs(),
            Function::Exp => args[0].exp(),
            Function::Sin => args[0].sin(),
            Function::Cos => args[0].cos(),
            Function::Pow => args[0].powf(args[1]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Number(f64),
    Variable(Variable),
    Negate(Box<Node>),
    Binary {
        op: BinaryOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    Call {
        function: Function,
        args: Vec<Node>,
    },
}

impl Node {
    fn evaluate(&self, bindings: &Bindings) -> f64 {
        match self {
            Node::Number(v) => *v,
            Node::Variable(var) => match var {
                Variable::X => bindings.x,
                Variable::Min => bindings.min,
                Variable::Max => bindings.max,
                Variable::Mean => bindings.mean,
                Variable::Std => bindings.std,
            },
            Node::Negate(inner) => -inner.evaluate(bindings),
            Node::Binary { op, lhs, rhs } => {
                let l = lhs.evaluate(bindings);
                let r = rhs.evaluate(bindings);
                match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Mul => l * r,
                    BinaryOp::Div => l / r,
                }
            }
            Node::Call { function, args } => {
                let values: Vec<f64> = args.iter().map(|a| a.evaluate(bindings)).collect();
                function.apply(&values)
            }
        }
    }
}

/// Values bound to the expression variables for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bindings {
    pub x: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
}

impl Bindings {
    /// Binds `x` alongside a column's statistics.
    pub fn new(x: f64, stats: &ColumnStats) -> Self {
        Self {
            x,
            min: stats.min,
            max: stats.max,
            mean: stats.mean,
            std: stats.std,
        }
    }
}

// --- Lexer ---

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '0'..='9' | '.' => {
                let mut literal = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        literal.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = literal.parse::<f64>().map_err(|_| {
                    Error::expression(format!("'{literal}' is not a valid number"))
                })?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        ident.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(Error::expression(format!(
                    "unexpected character '{other}' in expression"
                )));
            }
        }
    }
    Ok(tokens)
}

// --- Parser ---

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token, context: &str) -> Result<()> {
        match self.advance() {
            Some(ref token) if token == expected => Ok(()),
            Some(token) => Err(Error::expression(format!(
                "expected {context}, found {token:?}"
            ))),
            None => Err(Error::expression(format!(
                "expected {context}, found end of expression"
            ))),
        }
    }

    // expr := term (('+' | '-') term)*
    fn expression(&mut self) -> Result<Node> {
        let mut node = self.term()?;
        while let Some(token) = self.peek() {
            let op = match token {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.term()?;
            node = Node::Binary {
                op,
                lhs: Box::new(node),
                rhs: Box::new(rhs),
            };
        }
        Ok(node)
    }

    // term := unary (('*' | '/') unary)*
    fn term(&mut self) -> Result<Node> {
        let mut node = self.unary()?;
        while let Some(token) = self.peek() {
            let op = match token {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.unary()?;
            node = Node::Binary {
                op,
                lhs: Box::new(node),
                rhs: Box::new(rhs),
            };
        }
        Ok(node)
    }

    // unary := '-' unary | primary
    fn unary(&mut self) -> Result<Node> {
        if matches!(self.peek(), Some(Token::Minus)) {
            self.advance();
            let inner = self.unary()?;
            return Ok(Node::Negate(Box::new(inner)));
        }
        self.primary()
    }

    // primary := number | '(' expr ')' | ident | ident '(' expr (',' expr)* ')'
    fn primary(&mut self) -> Result<Node> {
        match self.advance() {
            Some(Token::Number(value)) => Ok(Node::Number(value)),
            Some(Token::LParen) => {
                let inner = self.expression()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => self.identifier(&name),
            Some(token) => Err(Error::expression(format!(
                "unexpected {token:?} in expression"
            ))),
            None => Err(Error::expression("unexpected end of expression")),
        }
    }

    fn identifier(&mut self, name: &str) -> Result<Node> {
        if matches!(self.peek(), Some(Token::LParen)) {
            let function = Function::from_name(name).ok_or_else(|| {
                Error::expression(format!("unknown function '{name}'"))
            })?;
            self.advance();
            let mut args = vec![self.expression()?];
            while matches!(self.peek(), Some(Token::Comma)) {
                self.advance();
                args.push(self.expression()?);
            }
            self.expect(&Token::RParen, "')' after function arguments")?;
            if args.len() != function.arity() {
                return Err(Error::expression(format!(
                    "function '{name}' takes {} argument(s), got {}",
                    function.arity(),
                    args.len()
                )));
            }
            return Ok(Node::Call { function, args });
        }

        match name {
            "x" => Ok(Node::Variable(Variable::X)),
            "min" => Ok(Node::Variable(Variable::Min)),
            "max" => Ok(Node::Variable(Variable::Max)),
            "mean" => Ok(Node::Variable(Variable::Mean)),
            "std" => Ok(Node::Variable(Variable::Std)),
            "PI" => Ok(Node::Number(std::f64::consts::PI)),
            "E" => Ok(Node::Number(std::f64::consts::E)),
            _ => Err(Error::expression(format!(
                "unknown identifier '{name}'"
            ))),
        }
    }
}

/// A parsed expression, ready to be evaluated against many values.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpression {
    source: String,
    root: Node,
}

impl CompiledExpression {
    /// Parses `source` against the closed grammar.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Expression`] on empty input, lexical errors,
    /// malformed syntax (including unbalanced parentheses), unknown
    /// identifiers, or wrong function arity.
    pub fn compile(source: &str) -> Result<Self> {
        if source.trim().is_empty() {
            return Err(Error::expression("expression is empty"));
        }
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            position: 0,
        };
        let root = parser.expression()?;
        if parser.position != parser.tokens.len() {
            return Err(Error::expression(format!(
                "unexpected trailing input after position {}",
                parser.position
            )));
        }
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    /// Evaluates the expression. Evaluation itself never fails; IEEE
    /// semantics apply, so callers check the result for finiteness where it
    /// matters.
    pub fn evaluate(&self, bindings: &Bindings) -> f64 {
        self.root.evaluate(bindings)
    }

    /// The original expression text.
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Validates a custom transform expression against a column's statistics.
///
/// Beyond compiling, the expression is probed at `x = min`, `x = mean`, and
/// `x = max` of the supplied statistics; a NaN or infinite result at any
/// probe rejects the expression with a user-facing message, since it would
/// corrupt downstream analyses on this column.
///
/// # Errors
///
/// Returns [`Error::Expression`] describing the first problem found.
pub fn validate_expression(source: &str, stats: &ColumnStats) -> Result<()> {
    let compiled = CompiledExpression::compile(source)?;
    for probe in [stats.min, stats.mean, stats.max] {
        let result = compiled.evaluate(&Bindings::new(probe, stats));
        if !result.is_finite() {
            return Err(Error::expression(format!(
                "expression produces a non-finite value at x = {probe}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn stats() -> ColumnStats {
        ColumnStats {
            min: 1.0,
            max: 9.0,
            mean: 5.0,
            std: 2.0,
        }
    }

    fn eval(source: &str, x: f64) -> f64 {
        CompiledExpression::compile(source)
            .unwrap()
            .evaluate(&Bindings::new(x, &stats()))
    }

    #[test]
    fn arithmetic_precedence() {
        assert_abs_diff_eq!(eval("1 + 2 * 3", 0.0), 7.0);
        assert_abs_diff_eq!(eval("(1 + 2) * 3", 0.0), 9.0);
        assert_abs_diff_eq!(eval("10 - 4 - 3", 0.0), 3.0);
        assert_abs_diff_eq!(eval("8 / 2 / 2", 0.0), 2.0);
    }

    #[test]
    fn unary_minus() {
        assert_abs_diff_eq!(eval("-x", 3.0), -3.0);
        assert_abs_diff_eq!(eval("--x", 3.0), 3.0);
        assert_abs_diff_eq!(eval("2 * -3", 0.0), -6.0);
    }

    #[test]
    fn variables_and_constants() {
        assert_abs_diff_eq!(eval("(x - mean) / std", 7.0), 1.0);
        assert_abs_diff_eq!(eval("(x - min) / (max - min)", 5.0), 0.5);
        assert_abs_diff_eq!(eval("PI", 0.0), std::f64::consts::PI);
        assert_abs_diff_eq!(eval("E", 0.0), std::f64::consts::E);
    }

    #[test]
    fn log_transform_reference_value() {
        // ln(10) per the engine's documented example transform.
        assert_abs_diff_eq!(eval("log(x + 1)", 9.0), 10f64.ln(), epsilon = 1e-9);
        assert_abs_diff_eq!(eval("log(x + 1)", 9.0), 2.302585, epsilon = 1e-6);
    }

    #[test]
    fn functions_apply() {
        assert_abs_diff_eq!(eval("sqrt(x)", 16.0), 4.0);
        assert_abs_diff_eq!(eval("abs(-x)", 3.0), 3.0);
        assert_abs_diff_eq!(eval("log10(x)", 1000.0), 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(eval("exp(x)", 0.0), 1.0);
        assert_abs_diff_eq!(eval("pow(x, 2)", 3.0), 9.0);
        assert_abs_diff_eq!(eval("sin(x) * sin(x) + cos(x) * cos(x)", 0.7), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn rejects_empty_and_unbalanced() {
        assert!(CompiledExpression::compile("").is_err());
        assert!(CompiledExpression::compile("   ").is_err());
        assert!(CompiledExpression::compile("(x + 1").is_err());
        assert!(CompiledExpression::compile("x + 1)").is_err());
    }

    #[test]
    fn rejects_unknown_identifiers() {
        // The grammar is an allow-list: nothing outside it parses.
        assert!(CompiledExpression::compile("y + 1").is_err());
        assert!(CompiledExpression::compile("system(x)").is_err());
        assert!(CompiledExpression::compile("eval(x)").is_err());
        assert!(CompiledExpression::compile("x; x").is_err());
    }

    #[test]
    fn rejects_wrong_arity() {
        assert!(CompiledExpression::compile("pow(x)").is_err());
        assert!(CompiledExpression::compile("sqrt(x, 2)").is_err());
    }

    #[test]
    fn validation_probes_statistics() {
        assert!(validate_expression("log(x + 1)", &stats()).is_ok());
        // min = 1.0, so log(x - 1) hits log(0) at the lower probe.
        assert!(validate_expression("log(x - 1)", &stats()).is_err());
        assert!(validate_expression("x / (x - x)", &stats()).is_err());
        assert!(validate_expression("sqrt(0 - x)", &stats()).is_err());
    }
}
