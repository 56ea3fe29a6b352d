//! Expressions (precedence climbing) and the target sub-grammar.

use super::Parser;
use crate::compiler::ast::*;
use crate::compiler::diagnostic::Span;
use crate::compiler::token::{Token, TokenKind, TokenValue, is_target_keyword};

/// Binary operator levels, weakest first.
const LEVELS: usize = 6;

fn binary_op(token: &Token, level: usize) -> Option<BinaryOp> {
    let word = token.image.as_str();
    let is_op = token.kind == TokenKind::Operator;
    let op = match (level, word) {
        (0, "or") if token.kind == TokenKind::Keyword => BinaryOp::Or,
        (0, "||") if is_op => BinaryOp::Or,
        (1, "and") if token.kind == TokenKind::Keyword => BinaryOp::And,
        (1, "&&") if is_op => BinaryOp::And,
        (2, "==") if is_op => BinaryOp::Eq,
        (2, "!=") if is_op => BinaryOp::Ne,
        (3, "<") if is_op => BinaryOp::Lt,
        (3, "<=") if is_op => BinaryOp::Le,
        (3, ">") if is_op => BinaryOp::Gt,
        (3, ">=") if is_op => BinaryOp::Ge,
        (4, "+") if is_op => BinaryOp::Add,
        (4, "-") if is_op => BinaryOp::Sub,
        (5, "*") if is_op => BinaryOp::Mul,
        (5, "/") if is_op => BinaryOp::Div,
        (5, "%") if is_op => BinaryOp::Rem,
        _ => return None,
    };
    Some(op)
}

impl Parser<'_> {
    pub(super) fn parse_expr(&mut self) -> Expr {
        self.parse_binary(0)
    }

    fn parse_binary(&mut self, level: usize) -> Expr {
        if level == LEVELS {
            return self.parse_unary();
        }
        let mut left = self.parse_binary(level + 1);
        while let Some(op) = binary_op(self.peek(), level) {
            self.advance();
            let right = self.parse_binary(level + 1);
            let span = left.span.to(right.span);
            left = Expr::new(
                ExprKind::Binary(BinaryExpr {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                }),
                span,
            );
        }
        left
    }

    fn parse_unary(&mut self) -> Expr {
        let start = self.peek().start;
        let op = if self.peek().is_operator("!") {
            UnaryOp::Not
        } else if self.peek().is_operator("-") {
            UnaryOp::Neg
        } else {
            return self.parse_primary();
        };
        self.advance();
        let operand = self.parse_unary();
        Expr::new(
            ExprKind::Unary(UnaryExpr {
                op,
                operand: Box::new(operand),
            }),
            self.span_from(start),
        )
    }

    fn parse_primary(&mut self) -> Expr {
        let token = self.peek().clone();
        let start = token.start;
        if let Some(literal) = literal_from_token(&token) {
            self.advance();
            return Expr::new(ExprKind::Literal(literal), token.span());
        }
        match token.kind {
            TokenKind::Punct if token.image == "{" => self.parse_object(),
            TokenKind::Punct if token.image == "[" => self.parse_array(),
            TokenKind::Punct if token.image == "(" => {
                self.advance();
                let inner = self.parse_expr();
                self.expect_punct(")");
                inner
            }
            TokenKind::Punct if token.image == "$" => self.parse_var(),
            TokenKind::Keyword if is_target_keyword(&token.image) => {
                let target = self.parse_target();
                let span = target.span;
                Expr::new(ExprKind::Target(target), span)
            }
            TokenKind::Identifier => {
                let call = self.parse_call_expr();
                Expr::new(ExprKind::Call(call), self.span_from(start))
            }
            // `camera.fit(..)`; any other keyword starts the next construct.
            TokenKind::Keyword if self.peek_at(1).is_punct(".") || self.peek_at(1).is_punct("(") => {
                let call = self.parse_call_expr();
                Expr::new(ExprKind::Call(call), self.span_from(start))
            }
            TokenKind::Keyword => {
                self.unexpected("an expression");
                Expr::new(
                    ExprKind::Literal(Literal::placeholder()),
                    Span::point(start),
                )
            }
            _ => {
                self.unexpected("an expression");
                let closing = token.kind == TokenKind::Punct
                    && matches!(token.image.as_str(), "}" | ")" | "]" | "," | ";");
                if !closing {
                    self.advance();
                }
                Expr::new(
                    ExprKind::Literal(Literal::placeholder()),
                    Span::point(start),
                )
            }
        }
    }

    /// `{ key: value, ... }`, trailing comma tolerated.
    pub(super) fn parse_object(&mut self) -> Expr {
        let start = self.peek().start;
        let entries = self.parse_block("an object entry", |p| p.parse_entry(super::EntryMode::Plain));
        Expr::new(
            ExprKind::Object(ObjectExpr { entries }),
            self.span_from(start),
        )
    }

    fn parse_array(&mut self) -> Expr {
        let start = self.peek().start;
        self.expect_punct("[");
        let mut items = Vec::new();
        while !self.at_punct("]") && !self.at_eof() {
            let before = self.pos;
            let reported = self.diagnostics.len();
            items.push(self.parse_expr());
            if !self.eat_punct(",") && !self.at_punct("]") {
                self.unexpected("`,` or `]`");
                if self.pos == before {
                    self.recover(reported, "an array item");
                }
                break;
            }
        }
        self.expect_punct("]");
        Expr::new(ExprKind::Array(ArrayExpr { items }), self.span_from(start))
    }

    fn parse_var(&mut self) -> Expr {
        let start = self.peek().start;
        self.expect_punct("$");
        let mut path = Vec::new();
        match self.parse_path_segment() {
            Some(segment) => path.push(segment),
            None => self.unexpected("a variable name"),
        }
        while self.at_punct(".") {
            self.advance();
            match self.parse_path_segment() {
                Some(segment) => path.push(segment),
                None => {
                    self.unexpected("a path segment");
                    break;
                }
            }
        }
        Expr::new(ExprKind::Var(VarRef { path }), self.span_from(start))
    }

    fn parse_path_segment(&mut self) -> Option<String> {
        let token = self.peek();
        if token.is_word() || token.kind == TokenKind::Int {
            Some(self.advance().image)
        } else {
            None
        }
    }

    /// `name.name(args)`. Keywords are accepted as callee segments so that
    /// `camera.fit(...)` and `overlay.clear()` parse.
    pub(super) fn parse_call_expr(&mut self) -> CallExpr {
        if !self.peek().is_word() {
            self.unexpected("an action call");
            return CallExpr::placeholder();
        }
        let mut callee = self.advance().image;
        while self.at_punct(".") && self.peek_at(1).is_word() {
            self.advance();
            callee.push('.');
            callee.push_str(&self.advance().image);
        }
        let mut call = CallExpr {
            callee,
            args: Vec::new(),
        };
        if !self.expect_punct("(") {
            return call;
        }
        while !self.at_punct(")") && !self.at_eof() {
            let before = self.pos;
            let reported = self.diagnostics.len();
            let name = if self.peek().is_word() && self.peek_at(1).is_punct(":") {
                let name = self.advance().image;
                self.advance();
                Some(name)
            } else {
                None
            };
            let value = self.parse_expr();
            call.args.push(Argument { name, value });
            if !self.eat_punct(",") && !self.at_punct(")") {
                self.unexpected("`,` or `)`");
                if self.pos == before {
                    self.recover(reported, "an argument");
                }
                break;
            }
        }
        self.expect_punct(")");
        call
    }

    // ── targets ───────────────────────────────────────────────────────────

    pub(super) fn parse_target(&mut self) -> Target {
        let token = self.peek().clone();
        let start = token.start;
        if token.kind != TokenKind::Keyword || !is_target_keyword(&token.image) {
            self.unexpected("a target (node, edge, subgraph, css, id, text, group, union, intersect, except)");
            return Target::placeholder(Span::point(start));
        }
        self.advance();
        let kind = match token.image.as_str() {
            "node" => TargetKind::Node(self.parse_target_ref()),
            "subgraph" => TargetKind::Subgraph(self.parse_target_ref()),
            "edge" => TargetKind::Edge(self.parse_edge_ref()),
            "css" => TargetKind::Css(self.parse_target_string()),
            "id" => TargetKind::Id(self.parse_target_string()),
            "text" => TargetKind::Text(self.parse_target_string()),
            "group" => TargetKind::Group(self.parse_target_list()),
            "union" => TargetKind::Union(self.parse_target_list()),
            "intersect" => TargetKind::Intersect(self.parse_target_list()),
            _ => {
                let span = Span::point(start);
                let mut operands = self.parse_target_list().into_iter();
                let base = operands.next();
                let minus = operands.next();
                if base.is_none() || minus.is_none() || operands.next().is_some() {
                    self.error(
                        crate::compiler::diagnostic::codes::UNEXPECTED_TOKEN,
                        "`except` takes exactly two targets",
                        self.span_from(start),
                    );
                }
                TargetKind::Except(
                    Box::new(base.unwrap_or_else(|| Target::placeholder(span))),
                    Box::new(minus.unwrap_or_else(|| Target::placeholder(span))),
                )
            }
        };
        Target {
            kind,
            span: self.span_from(start),
        }
    }

    fn parse_target_ref(&mut self) -> TargetRef {
        let token = self.peek().clone();
        if token.is_operator("*") {
            self.advance();
            TargetRef::Wildcard
        } else if token.is_word() || token.kind == TokenKind::String || token.kind == TokenKind::Int {
            self.advance();
            TargetRef::Id(token.text().to_string())
        } else {
            self.unexpected("an element id or `*`");
            TargetRef::Id(String::new())
        }
    }

    fn parse_edge_ref(&mut self) -> EdgeRef {
        if self.eat_punct("(") {
            let from = self.parse_target_ref();
            self.expect_punct(",");
            let to = self.parse_target_ref();
            self.expect_punct(")");
            return EdgeRef::Between(from, to);
        }
        let first = self.parse_target_ref();
        if self.peek().is_operator("->") {
            self.advance();
            let to = self.parse_target_ref();
            EdgeRef::Between(first, to)
        } else {
            EdgeRef::Id(first)
        }
    }

    fn parse_target_string(&mut self) -> String {
        if self.peek().kind == TokenKind::String {
            self.advance().text().to_string()
        } else {
            self.unexpected("a string");
            String::new()
        }
    }

    fn parse_target_list(&mut self) -> Vec<Target> {
        let mut items = Vec::new();
        if !self.expect_punct("(") {
            return items;
        }
        while !self.at_punct(")") && !self.at_eof() {
            let before = self.pos;
            let reported = self.diagnostics.len();
            items.push(self.parse_target());
            if self.pos == before {
                self.recover(reported, "a target");
                continue;
            }
            if !self.eat_punct(",") && !self.at_punct(")") {
                self.unexpected("`,` or `)`");
                break;
            }
        }
        self.expect_punct(")");
        items
    }
}

/// Literal node for literal-kind tokens.
fn literal_from_token(token: &Token) -> Option<Literal> {
    let value = match (token.kind, &token.value) {
        (TokenKind::Int, TokenValue::Number(n)) => match token.image.parse::<i64>() {
            Ok(i) => LiteralValue::Int(i),
            Err(_) => LiteralValue::Number(*n),
        },
        (TokenKind::Number, TokenValue::Number(n)) => LiteralValue::Number(*n),
        (TokenKind::Duration, TokenValue::Millis(ms)) => LiteralValue::Duration(*ms),
        (TokenKind::Percent, TokenValue::Number(n)) => LiteralValue::Percent(*n),
        (TokenKind::Boolean, TokenValue::Bool(b)) => LiteralValue::Boolean(*b),
        (TokenKind::Null, _) => LiteralValue::Null,
        (TokenKind::String, TokenValue::Text(s)) => LiteralValue::String(s.clone()),
        (TokenKind::Color, _) => LiteralValue::Color(token.image.clone()),
        _ => return None,
    };
    Some(Literal {
        value,
        raw: token.image.clone(),
    })
}
