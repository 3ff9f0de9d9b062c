//! Recursive-descent parser for the sandbox dialect
//!
//! Grammar (statement separators are newlines or `;`, blocks are
//! brace-delimited):
//!
//! ```text
//! stmt    := ident '=' expr | 'if' expr block ('else' block)?
//!          | 'while' expr block | 'for' ident 'in' expr block
//!          | 'break' | 'continue' | expr
//! expr    := or ; or := and ('or' and)* ; and := cmp ('and' cmp)*
//! cmp     := sum (('=='|'!='|'<'|'<='|'>'|'>=') sum)?
//! sum     := term (('+'|'-') term)* ; term := unary (('*'|'/'|'%') unary)*
//! unary   := ('-'|'not') unary | postfix
//! postfix := primary ('(' args ')' | '[' expr ']')*
//! primary := literal | list | map | ident | '(' expr ')'
//! ```
//!
//! A `{` in expression position opens a map literal; blocks only ever
//! follow an `if`/`while`/`for` header, so the two never collide.

use super::lexer::{tokenize, Token};
use super::SandboxError;

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Stmt {
    Expr(Expr),
    Assign { name: String, value: Expr },
    If { cond: Expr, then: Vec<Stmt>, otherwise: Vec<Stmt> },
    While { cond: Expr, body: Vec<Stmt> },
    For { var: String, iter: Expr, body: Vec<Stmt> },
    Break,
    Continue,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    None,
    List(Vec<Expr>),
    Map(Vec<(Expr, Expr)>),
    Var(String),
    Unary { op: UnOp, operand: Box<Expr> },
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Call { callee: Box<Expr>, args: Vec<Expr> },
    Index { target: Box<Expr>, index: Box<Expr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

pub(super) fn parse(source: &str) -> Result<Vec<Stmt>, SandboxError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn program(&mut self) -> Result<Vec<Stmt>, SandboxError> {
        let mut stmts = Vec::new();
        self.skip_separators();
        while self.peek().is_some() {
            stmts.push(self.statement()?);
            self.skip_separators();
        }
        Ok(stmts)
    }

    fn statement(&mut self) -> Result<Stmt, SandboxError> {
        match self.peek() {
            Some(Token::If) => self.if_statement(),
            Some(Token::While) => {
                self.advance();
                let cond = self.expression()?;
                let body = self.block()?;
                Ok(Stmt::While { cond, body })
            }
            Some(Token::For) => {
                self.advance();
                let var = self.expect_ident()?;
                self.expect(Token::In)?;
                let iter = self.expression()?;
                let body = self.block()?;
                Ok(Stmt::For { var, iter, body })
            }
            Some(Token::Break) => {
                self.advance();
                Ok(Stmt::Break)
            }
            Some(Token::Continue) => {
                self.advance();
                Ok(Stmt::Continue)
            }
            // An identifier followed by `=` is an assignment, anything
            // else falls through to an expression statement.
            Some(Token::Ident(_)) if self.peek_at(1) == Some(&Token::Assign) => {
                let name = self.expect_ident()?;
                self.advance();
                let value = self.expression()?;
                Ok(Stmt::Assign { name, value })
            }
            Some(_) => Ok(Stmt::Expr(self.expression()?)),
            None => Err(SandboxError::Syntax("unexpected end of input".to_string())),
        }
    }

    fn if_statement(&mut self) -> Result<Stmt, SandboxError> {
        self.expect(Token::If)?;
        let cond = self.expression()?;
        let then = self.block()?;
        let otherwise = if self.peek_past_separators() == Some(&Token::Else) {
            self.skip_separators();
            self.advance();
            if self.peek() == Some(&Token::If) {
                vec![self.if_statement()?]
            } else {
                self.block()?
            }
        } else {
            Vec::new()
        };
        Ok(Stmt::If { cond, then, otherwise })
    }

    fn block(&mut self) -> Result<Vec<Stmt>, SandboxError> {
        self.expect(Token::LBrace)?;
        let mut stmts = Vec::new();
        self.skip_separators();
        while self.peek() != Some(&Token::RBrace) {
            if self.peek().is_none() {
                return Err(SandboxError::Syntax("unterminated block".to_string()));
            }
            stmts.push(self.statement()?);
            self.skip_separators();
        }
        self.advance();
        Ok(stmts)
    }

    fn expression(&mut self) -> Result<Expr, SandboxError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, SandboxError> {
        let mut lhs = self.and_expr()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let rhs = self.and_expr()?;
            lhs = binary(BinOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, SandboxError> {
        let mut lhs = self.cmp_expr()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let rhs = self.cmp_expr()?;
            lhs = binary(BinOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn cmp_expr(&mut self) -> Result<Expr, SandboxError> {
        let lhs = self.sum_expr()?;
        let op = match self.peek() {
            Some(Token::Eq) => BinOp::Eq,
            Some(Token::Ne) => BinOp::Ne,
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::Le) => BinOp::Le,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::Ge) => BinOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.sum_expr()?;
        Ok(binary(op, lhs, rhs))
    }

    fn sum_expr(&mut self) -> Result<Expr, SandboxError> {
        let mut lhs = self.term_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.term_expr()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn term_expr(&mut self) -> Result<Expr, SandboxError> {
        let mut lhs = self.unary_expr()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Percent) => BinOp::Mod,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.unary_expr()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn unary_expr(&mut self) -> Result<Expr, SandboxError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                Ok(Expr::Unary {
                    op: UnOp::Neg,
                    operand: Box::new(self.unary_expr()?),
                })
            }
            Some(Token::Not) => {
                self.advance();
                Ok(Expr::Unary {
                    op: UnOp::Not,
                    operand: Box::new(self.unary_expr()?),
                })
            }
            _ => self.postfix_expr(),
        }
    }

    fn postfix_expr(&mut self) -> Result<Expr, SandboxError> {
        let mut expr = self.primary_expr()?;
        loop {
            match self.peek() {
                Some(Token::LParen) => {
                    self.advance();
                    let mut args = Vec::new();
                    if self.peek() != Some(&Token::RParen) {
                        loop {
                            args.push(self.expression()?);
                            if self.peek() == Some(&Token::Comma) {
                                self.advance();
                            } else {
                                break;
                            }
                        }
                    }
                    self.expect(Token::RParen)?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                Some(Token::LBracket) => {
                    self.advance();
                    let index = self.expression()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn primary_expr(&mut self) -> Result<Expr, SandboxError> {
        match self.advance() {
            Some(Token::Int(n)) => Ok(Expr::Int(n)),
            Some(Token::Float(f)) => Ok(Expr::Float(f)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::True) => Ok(Expr::Bool(true)),
            Some(Token::False) => Ok(Expr::Bool(false)),
            Some(Token::None) => Ok(Expr::None),
            Some(Token::Ident(name)) => Ok(Expr::Var(name)),
            Some(Token::LParen) => {
                let inner = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if self.peek() != Some(&Token::RBracket) {
                    loop {
                        items.push(self.expression()?);
                        if self.peek() == Some(&Token::Comma) {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(Token::RBracket)?;
                Ok(Expr::List(items))
            }
            Some(Token::LBrace) => {
                let mut entries = Vec::new();
                self.skip_separators();
                if self.peek() != Some(&Token::RBrace) {
                    loop {
                        let key = self.expression()?;
                        self.expect(Token::Colon)?;
                        let value = self.expression()?;
                        entries.push((key, value));
                        if self.peek() == Some(&Token::Comma) {
                            self.advance();
                            self.skip_separators();
                        } else {
                            break;
                        }
                    }
                    self.skip_separators();
                }
                self.expect(Token::RBrace)?;
                Ok(Expr::Map(entries))
            }
            Some(other) => Err(SandboxError::Syntax(format!("unexpected token {other:?}"))),
            None => Err(SandboxError::Syntax("unexpected end of input".to_string())),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    /// First token after any run of separators, without consuming
    fn peek_past_separators(&self) -> Option<&Token> {
        self.tokens[self.pos..]
            .iter()
            .find(|t| **t != Token::Newline)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn skip_separators(&mut self) {
        while self.peek() == Some(&Token::Newline) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), SandboxError> {
        match self.advance() {
            Some(token) if token == expected => Ok(()),
            Some(other) => Err(SandboxError::Syntax(format!(
                "expected {expected:?}, found {other:?}"
            ))),
            None => Err(SandboxError::Syntax(format!(
                "expected {expected:?}, found end of input"
            ))),
        }
    }

    fn expect_ident(&mut self) -> Result<String, SandboxError> {
        match self.advance() {
            Some(Token::Ident(name)) => Ok(name),
            Some(other) => Err(SandboxError::Syntax(format!(
                "expected identifier, found {other:?}"
            ))),
            None => Err(SandboxError::Syntax(
                "expected identifier, found end of input".to_string(),
            )),
        }
    }
}

fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        let stmts = parse("x = 1 + 2 * 3").unwrap();
        assert_eq!(stmts.len(), 1);
        match &stmts[0] {
            Stmt::Assign { name, value } => {
                assert_eq!(name, "x");
                // Multiplication binds tighter than addition.
                match value {
                    Expr::Binary { op: BinOp::Add, rhs, .. } => {
                        assert!(matches!(**rhs, Expr::Binary { op: BinOp::Mul, .. }));
                    }
                    other => panic!("unexpected expr: {other:?}"),
                }
            }
            other => panic!("unexpected stmt: {other:?}"),
        }
    }

    #[test]
    fn test_parse_while_with_empty_body() {
        let stmts = parse("while true { }").unwrap();
        assert!(matches!(
            &stmts[0],
            Stmt::While { cond: Expr::Bool(true), body } if body.is_empty()
        ));
    }

    #[test]
    fn test_parse_if_else_across_lines() {
        let stmts = parse("if x > 1 {\n  y = 1\n}\nelse {\n  y = 2\n}").unwrap();
        assert_eq!(stmts.len(), 1);
        match &stmts[0] {
            Stmt::If { then, otherwise, .. } => {
                assert_eq!(then.len(), 1);
                assert_eq!(otherwise.len(), 1);
            }
            other => panic!("unexpected stmt: {other:?}"),
        }
    }

    #[test]
    fn test_parse_call_and_index() {
        let stmts = parse("print(items[0], len(items))").unwrap();
        match &stmts[0] {
            Stmt::Expr(Expr::Call { args, .. }) => assert_eq!(args.len(), 2),
            other => panic!("unexpected stmt: {other:?}"),
        }
    }

    #[test]
    fn test_parse_map_literal() {
        let stmts = parse("m = {\"a\": 1, \"b\": 2 + 3}").unwrap();
        match &stmts[0] {
            Stmt::Assign { value: Expr::Map(entries), .. } => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].0, Expr::Str("a".to_string()));
            }
            other => panic!("unexpected stmt: {other:?}"),
        }
    }

    #[test]
    fn test_parse_empty_map() {
        let stmts = parse("m = {}").unwrap();
        assert!(matches!(
            &stmts[0],
            Stmt::Assign { value: Expr::Map(entries), .. } if entries.is_empty()
        ));
    }

    #[test]
    fn test_parse_break_and_continue() {
        let stmts = parse("while true { break }\nfor i in [1] { continue }").unwrap();
        match &stmts[0] {
            Stmt::While { body, .. } => assert_eq!(body[0], Stmt::Break),
            other => panic!("unexpected stmt: {other:?}"),
        }
        match &stmts[1] {
            Stmt::For { body, .. } => assert_eq!(body[0], Stmt::Continue),
            other => panic!("unexpected stmt: {other:?}"),
        }
    }

    #[test]
    fn test_map_missing_colon_rejected() {
        assert!(parse("m = {\"a\" 1}").is_err());
    }

    #[test]
    fn test_double_assign_rejected() {
        assert!(parse("x = = 3").is_err());
    }

    #[test]
    fn test_statement_per_line() {
        let stmts = parse("a = 1\nb = 2\nprint(a + b)").unwrap();
        assert_eq!(stmts.len(), 3);
    }
}
