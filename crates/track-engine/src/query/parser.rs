use track_core::Axis;

use super::lexer::{tokenize, Spanned, Token};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Quantifier {
    Any,
    All,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Func {
    Abs,
    Sqrt,
    Exp,
    Log,
}

impl Func {
    fn from_name(name: &str) -> Option<Func> {
        match name {
            "abs" => Some(Func::Abs),
            "sqrt" => Some(Func::Sqrt),
            "exp" => Some(Func::Exp),
            "log" => Some(Func::Log),
            _ => None,
        }
    }

    pub fn apply(self, v: f64) -> f64 {
        match self {
            Func::Abs => v.abs(),
            Func::Sqrt => v.sqrt(),
            Func::Exp => v.exp(),
            Func::Log => v.ln(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    Xor,
    And,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Var {
    Time,
    Axis(Axis),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Number(f64),
    Var(Var),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(Func, Box<Expr>),
    /// Index into the quantifier list of the enclosing query.
    Quantified(usize),
}

impl Expr {
    /// Particle properties referenced by this expression, in canonical order.
    pub fn axes(&self) -> Vec<Axis> {
        fn walk(expr: &Expr, out: &mut Vec<Axis>) {
            match expr {
                Expr::Var(Var::Axis(axis)) => {
                    if !out.contains(axis) {
                        out.push(*axis);
                    }
                }
                Expr::Unary(_, inner) | Expr::Call(_, inner) => walk(inner, out),
                Expr::Binary(_, lhs, rhs) => {
                    walk(lhs, out);
                    walk(rhs, out);
                }
                Expr::Number(_) | Expr::Var(Var::Time) | Expr::Quantified(_) => {}
            }
        }
        let mut out = Vec::new();
        walk(self, &mut out);
        out.sort();
        out
    }
}

/// One `any(...)` / `all(...)` term.
#[derive(Clone, Debug, PartialEq)]
pub struct QuantifiedTerm {
    pub kind: Quantifier,
    pub time: Expr,
    pub predicate: Expr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Scope {
    Outer,
    Time,
    Predicate,
}

pub struct Parsed {
    pub expr: Expr,
    pub terms: Vec<QuantifiedTerm>,
}

pub fn parse(input: &str) -> Result<Parsed, String> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err("empty selection".into());
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        scope: Scope::Outer,
        terms: Vec::new(),
    };
    let expr = parser.parse_or()?;
    if let Some(tok) = parser.peek() {
        return Err(format!("unexpected '{}' at {}", tok.token, tok.pos));
    }
    Ok(Parsed {
        expr,
        terms: parser.terms,
    })
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    scope: Scope,
    terms: Vec<QuantifiedTerm>,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn peek_token(&self) -> Option<&Token> {
        self.peek().map(|s| &s.token)
    }

    fn at_keyword(&self, word: &str) -> bool {
        matches!(self.peek_token(), Some(Token::Ident(name)) if name == word)
    }

    fn next(&mut self) -> Option<Spanned> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, token: Token) -> Result<(), String> {
        match self.next() {
            Some(tok) if tok.token == token => Ok(()),
            Some(tok) => Err(format!(
                "expected '{token}' but found '{}' at {}",
                tok.token, tok.pos
            )),
            None => Err(format!("expected '{token}' at end of selection")),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut expr = self.parse_xor()?;
        while matches!(self.peek_token(), Some(Token::Pipe)) || self.at_keyword("or") {
            self.pos += 1;
            let rhs = self.parse_xor()?;
            expr = Expr::Binary(BinaryOp::Or, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_xor(&mut self) -> Result<Expr, String> {
        let mut expr = self.parse_and()?;
        while matches!(self.peek_token(), Some(Token::Caret)) {
            self.pos += 1;
            let rhs = self.parse_and()?;
            expr = Expr::Binary(BinaryOp::Xor, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut expr = self.parse_not()?;
        while matches!(self.peek_token(), Some(Token::Amp)) || self.at_keyword("and") {
            self.pos += 1;
            let rhs = self.parse_not()?;
            expr = Expr::Binary(BinaryOp::And, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_not(&mut self) -> Result<Expr, String> {
        if matches!(self.peek_token(), Some(Token::Tilde)) || self.at_keyword("not") {
            self.pos += 1;
            let inner = self.parse_not()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr, String> {
        let lhs = self.parse_sum()?;
        let op = match self.peek_token() {
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Le) => BinaryOp::Le,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Ge) => BinaryOp::Ge,
            Some(Token::EqEq) => BinaryOp::Eq,
            Some(Token::Ne) => BinaryOp::Ne,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.parse_sum()?;
        if let Some(tok) = self.peek() {
            if matches!(
                tok.token,
                Token::Lt | Token::Le | Token::Gt | Token::Ge | Token::EqEq | Token::Ne
            ) {
                return Err(format!(
                    "chained comparison '{}' at {}; combine comparisons with '&'",
                    tok.token, tok.pos
                ));
            }
        }
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_sum(&mut self) -> Result<Expr, String> {
        let mut expr = self.parse_product()?;
        loop {
            let op = match self.peek_token() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(expr),
            };
            self.pos += 1;
            let rhs = self.parse_product()?;
            expr = Expr::Binary(op, Box::new(expr), Box::new(rhs));
        }
    }

    fn parse_product(&mut self) -> Result<Expr, String> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.peek_token() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => return Ok(expr),
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            expr = Expr::Binary(op, Box::new(expr), Box::new(rhs));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        if matches!(self.peek_token(), Some(Token::Minus)) {
            self.pos += 1;
            let inner = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, String> {
        let base = self.parse_atom()?;
        if matches!(self.peek_token(), Some(Token::Power)) {
            self.pos += 1;
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_atom(&mut self) -> Result<Expr, String> {
        let Some(tok) = self.next() else {
            return Err("unexpected end of selection".into());
        };
        match tok.token {
            Token::Number(v) => Ok(Expr::Number(v)),
            Token::LParen => {
                let expr = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Token::Ident(name) => {
                if matches!(self.peek_token(), Some(Token::LParen)) {
                    self.pos += 1;
                    self.parse_call(&name, tok.pos)
                } else {
                    self.resolve(&name, tok.pos)
                }
            }
            other => Err(format!("unexpected '{other}' at {}", tok.pos)),
        }
    }

    fn parse_call(&mut self, name: &str, pos: usize) -> Result<Expr, String> {
        let kind = match name {
            "any" => Some(Quantifier::Any),
            "all" => Some(Quantifier::All),
            _ => None,
        };
        if let Some(kind) = kind {
            if self.scope != Scope::Outer {
                return Err(format!("'{name}' at {pos} cannot be nested"));
            }
            self.scope = Scope::Time;
            let time = self.parse_or()?;
            self.expect(Token::Comma)?;
            self.scope = Scope::Predicate;
            let predicate = self.parse_or()?;
            self.expect(Token::RParen)?;
            self.scope = Scope::Outer;
            self.terms.push(QuantifiedTerm {
                kind,
                time,
                predicate,
            });
            return Ok(Expr::Quantified(self.terms.len() - 1));
        }
        let func = Func::from_name(name).ok_or_else(|| format!("unknown function '{name}' at {pos}"))?;
        let arg = self.parse_or()?;
        self.expect(Token::RParen)?;
        Ok(Expr::Call(func, Box::new(arg)))
    }

    fn resolve(&self, name: &str, pos: usize) -> Result<Expr, String> {
        if name == "t" {
            return match self.scope {
                Scope::Time => Ok(Expr::Var(Var::Time)),
                Scope::Outer => Err(format!("'t' at {pos} must appear inside any() or all()")),
                Scope::Predicate => Err(format!(
                    "'t' at {pos} is only allowed in the time argument"
                )),
            };
        }
        let Ok(axis) = name.parse::<Axis>() else {
            return Err(format!("unknown name '{name}' at {pos}"));
        };
        match self.scope {
            Scope::Predicate => Ok(Expr::Var(Var::Axis(axis))),
            Scope::Outer => Err(format!(
                "'{name}' at {pos} must appear inside any() or all()"
            )),
            Scope::Time => Err(format!(
                "'{name}' at {pos} is not allowed in the time argument"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(v: f64) -> Box<Expr> {
        Box::new(Expr::Number(v))
    }

    #[test]
    fn precedence_follows_grammar() {
        let parsed = parse("any(t > 1 + 2 * 3, -x ** 2 < 4)").unwrap();
        assert_eq!(parsed.expr, Expr::Quantified(0));
        let term = &parsed.terms[0];
        assert_eq!(term.kind, Quantifier::Any);
        let sum = Expr::Binary(
            BinaryOp::Add,
            num(1.0),
            Box::new(Expr::Binary(BinaryOp::Mul, num(2.0), num(3.0))),
        );
        assert_eq!(
            term.time,
            Expr::Binary(BinaryOp::Gt, Box::new(Expr::Var(Var::Time)), Box::new(sum))
        );
        let neg_square = Expr::Unary(
            UnaryOp::Neg,
            Box::new(Expr::Binary(
                BinaryOp::Pow,
                Box::new(Expr::Var(Var::Axis(Axis::X))),
                num(2.0),
            )),
        );
        assert_eq!(
            term.predicate,
            Expr::Binary(BinaryOp::Lt, Box::new(neg_square), num(4.0))
        );
    }

    #[test]
    fn combines_quantifiers() {
        let parsed = parse("any(t>0, px>1) and not all(t<=5, abs(y)<2)").unwrap();
        assert_eq!(parsed.terms.len(), 2);
        assert_eq!(parsed.terms[1].kind, Quantifier::All);
        assert_eq!(
            parsed.expr,
            Expr::Binary(
                BinaryOp::And,
                Box::new(Expr::Quantified(0)),
                Box::new(Expr::Unary(UnaryOp::Not, Box::new(Expr::Quantified(1)))),
            )
        );
        assert_eq!(parsed.terms[1].predicate.axes(), vec![Axis::Y]);
    }

    #[test]
    fn scope_violations() {
        assert!(parse("x > 0").unwrap_err().contains("inside any()"));
        assert!(parse("t > 0").is_err());
        assert!(parse("any(x > 0, x > 0)").is_err());
        assert!(parse("any(t > 0, t > 0)").is_err());
        assert!(parse("any(t > 0, any(t > 0, x > 0))").unwrap_err().contains("nested"));
    }

    #[test]
    fn syntax_errors_name_the_token() {
        assert!(parse("any(t > 0, x > )").unwrap_err().contains("')'"));
        assert!(parse("any(t > 0, vx > 0)").unwrap_err().contains("vx"));
        assert!(parse("any(t > 0, x > 0").is_err());
        assert!(parse("any(t > 0, 0 < x < 1)").unwrap_err().contains("chained"));
        assert!(parse("any(t > 0, x > 0))").is_err());
        assert!(parse("   ").is_err());
        assert!(parse("any(t > 0, floor(x) > 0)").unwrap_err().contains("floor"));
    }
}
