//! Parser for Sift syntax
//!
//! Hand-written recursive descent over the interned token stream. Braces are
//! mandatory and there is no operator precedence: mixing binary operators
//! without parentheses is a parse error, except for associative chains of a
//! single operator drawn from `+ * & | ^ and or`.

use crate::ast::{
    Arg, AssertStmt, ChooseStmt, ConstDef, ElseBranch, Expr, ExprKind, Field, FuncDef,
    FuncEffect, IfStmt, IteratePart, IterateStmt, LoopAssert, LoopAssertKind, Module,
    Refinement, Span, StatusDef, Stmt, StructDef, TypeExpr, TypeExprKind, UseDecl, ViaRule,
    WhileStmt,
};
use crate::lexer::{int_value, is_int_literal, is_str_literal, tokenize};
use crate::token::{bid_of, Bid, Id, IdMap, QQId, Token};
use crate::types::StatusKind;
use std::path::PathBuf;

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    idmap: &'a IdMap,
    path: PathBuf,
    package: Id,
}

impl<'a> Parser<'a> {
    /// Tokenize and build a parser. The lexer needs the map mutably; the
    /// parser only reads it, so tokenization happens up front.
    pub fn tokenize(source: &str, idmap: &mut IdMap) -> Result<Vec<Token>, String> {
        tokenize(source, idmap)
    }

    pub fn new(tokens: Vec<Token>, idmap: &'a IdMap, path: PathBuf, package: Id) -> Self {
        Parser {
            tokens,
            pos: 0,
            idmap,
            path,
            package,
        }
    }

    pub fn parse(&mut self) -> Result<Module, String> {
        let mut module = Module::new(self.path.clone(), self.package);
        loop {
            self.skip_separators();
            if self.at_end() {
                break;
            }
            if self.accept(Bid::Use) {
                let tok = self.advance_or("package path after 'use'")?;
                if !is_str_literal(tok, self.idmap) {
                    return Err(self.err_at(tok, "expected quoted package path after 'use'"));
                }
                let path = self.string_contents(tok).to_string();
                module.uses.push(UseDecl {
                    path,
                    span: span_of(tok),
                });
                continue;
            }
            let public = if self.accept(Bid::Pub) {
                true
            } else if self.accept(Bid::Pri) {
                false
            } else {
                let tok = self.current_or("declaration")?;
                return Err(self.err_at(tok, "expected 'use', 'pub' or 'pri' declaration"));
            };
            if self.accept(Bid::Status) {
                module.statuses.push(self.parse_status_def(public)?);
            } else if self.accept(Bid::Const) {
                module.consts.push(self.parse_const_def(public)?);
            } else if self.accept(Bid::Struct) {
                module.structs.push(self.parse_struct_def(public)?);
            } else if self.accept(Bid::Func) {
                module.funcs.push(self.parse_func_def(public)?);
            } else {
                let tok = self.current_or("declaration")?;
                return Err(self.err_at(
                    tok,
                    "expected 'status', 'const', 'struct' or 'func' after visibility",
                ));
            }
        }
        Ok(module)
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn parse_status_def(&mut self, public: bool) -> Result<StatusDef, String> {
        let tok = self.advance_or("status message string")?;
        if !is_str_literal(tok, self.idmap) {
            return Err(self.err_at(tok, "expected quoted status message"));
        }
        let message = self.string_contents(tok).to_string();
        if StatusKind::from_message(&message).is_none() {
            return Err(self.err_at(
                tok,
                "status message must start with '$', '?', '#' or '@'",
            ));
        }
        Ok(StatusDef {
            public,
            message,
            span: span_of(tok),
        })
    }

    fn parse_const_def(&mut self, public: bool) -> Result<ConstDef, String> {
        let name_tok = self.expect_name("constant name")?;
        self.expect(Bid::Colon, "':' after constant name")?;
        let ty = self.parse_type()?;
        self.expect(Bid::Eq, "'=' after constant type")?;
        let value = self.parse_expr()?;
        Ok(ConstDef {
            public,
            name: name_tok.id,
            ty,
            value,
            span: span_of(name_tok),
        })
    }

    fn parse_struct_def(&mut self, public: bool) -> Result<StructDef, String> {
        let name_tok = self.expect_name("struct name")?;
        let suspendible = self.accept(Bid::Question);
        self.expect(Bid::OpenParen, "'(' to open struct fields")?;
        let fields = self.parse_field_list(Bid::CloseParen)?;
        self.expect(Bid::CloseParen, "')' to close struct fields")?;
        Ok(StructDef {
            public,
            name: name_tok.id,
            suspendible,
            fields,
            span: span_of(name_tok),
        })
    }

    fn parse_func_def(&mut self, public: bool) -> Result<FuncDef, String> {
        let first = self.expect_name("function name")?;
        let (receiver, name_tok) = if self.accept(Bid::Dot) {
            let method = self.expect_name("method name")?;
            (Some(first.id), method)
        } else {
            (None, first)
        };
        let effect = if self.accept(Bid::Question) {
            FuncEffect::Coroutine
        } else if self.accept(Bid::Exclam) {
            FuncEffect::Impure
        } else {
            FuncEffect::Pure
        };
        self.expect(Bid::OpenParen, "'(' to open argument list")?;
        let args = self.parse_field_list(Bid::CloseParen)?;
        self.expect(Bid::CloseParen, "')' to close argument list")?;

        // Optional return type (before or after the pre/post clauses), then
        // the body.
        let mut ret = if self.next_starts_type() {
            Some(self.parse_type()?)
        } else {
            None
        };
        let mut pre = Vec::new();
        let mut post = Vec::new();
        loop {
            self.skip_separators();
            if self.accept(Bid::Pre) {
                pre.push(self.parse_expr()?);
            } else if self.accept(Bid::Post) {
                post.push(self.parse_expr()?);
            } else {
                break;
            }
        }
        if ret.is_none() && self.next_starts_type() {
            ret = Some(self.parse_type()?);
        }
        let body = self.parse_block()?;
        Ok(FuncDef {
            public,
            receiver,
            name: name_tok.id,
            effect,
            args,
            ret,
            pre,
            post,
            body,
            span: span_of(first),
        })
    }

    /// `name : type` pairs separated by commas (or newlines), up to but not
    /// consuming `close`.
    fn parse_field_list(&mut self, close: Bid) -> Result<Vec<Field>, String> {
        let mut fields = Vec::new();
        loop {
            self.skip_separators();
            if self.check(close) {
                break;
            }
            let name_tok = self.expect_name("field name")?;
            self.expect(Bid::Colon, "':' after field name")?;
            let ty = self.parse_type()?;
            fields.push(Field {
                name: name_tok.id,
                ty,
                span: span_of(name_tok),
            });
            self.skip_separators();
            if !self.accept(Bid::Comma) && !self.check(close) {
                let tok = self.current_or("',' or close of field list")?;
                return Err(self.err_at(tok, "expected ',' between fields"));
            }
        }
        Ok(fields)
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    fn next_starts_type(&self) -> bool {
        let Some(tok) = self.peek() else { return false };
        match bid_of(tok.id) {
            Some(
                Bid::Base
                | Bid::Bool
                | Bid::Status
                | Bid::Slice
                | Bid::Table
                | Bid::Ptr
                | Bid::Nptr
                | Bid::OpenBracket
                | Bid::I8
                | Bid::I16
                | Bid::I32
                | Bid::I64
                | Bid::U8
                | Bid::U16
                | Bid::U32
                | Bid::U64
                | Bid::IoReader
                | Bid::IoWriter
                | Bid::EmptyStruct,
            ) => true,
            Some(_) => false,
            None => {
                // A bare user identifier can start a named type, but only if
                // it is not a literal.
                !is_int_literal(tok, self.idmap) && !is_str_literal(tok, self.idmap)
            }
        }
    }

    pub fn parse_type(&mut self) -> Result<TypeExpr, String> {
        let tok = self.current_or("type")?;
        let span = span_of(tok);
        match bid_of(tok.id) {
            Some(Bid::OpenBracket) => {
                self.advance();
                let len = self.parse_expr()?;
                self.expect(Bid::CloseBracket, "']' after array length")?;
                let elem = self.parse_type()?;
                Ok(TypeExpr::new(
                    TypeExprKind::Array {
                        len: Box::new(len),
                        elem: Box::new(elem),
                    },
                    span,
                ))
            }
            Some(Bid::Slice) => {
                self.advance();
                let elem = self.parse_type()?;
                Ok(TypeExpr::new(TypeExprKind::Slice(Box::new(elem)), span))
            }
            Some(Bid::Table) => {
                self.advance();
                let elem = self.parse_type()?;
                Ok(TypeExpr::new(TypeExprKind::Table(Box::new(elem)), span))
            }
            Some(Bid::Ptr) => {
                self.advance();
                let t = self.parse_type()?;
                Ok(TypeExpr::new(TypeExprKind::Ptr(Box::new(t)), span))
            }
            Some(Bid::Nptr) => {
                self.advance();
                let t = self.parse_type()?;
                Ok(TypeExpr::new(TypeExprKind::Nptr(Box::new(t)), span))
            }
            Some(Bid::Bool) => {
                self.advance();
                Ok(TypeExpr::new(TypeExprKind::Bool, span))
            }
            Some(Bid::Status) => {
                self.advance();
                Ok(TypeExpr::new(TypeExprKind::Status, span))
            }
            Some(Bid::Base) => {
                self.advance();
                self.expect(Bid::Dot, "'.' after 'base'")?;
                let leaf = self.current_or("base type name")?;
                self.advance();
                match bid_of(leaf.id) {
                    Some(Bid::Bool) => Ok(TypeExpr::new(TypeExprKind::Bool, span)),
                    Some(Bid::Status) => Ok(TypeExpr::new(TypeExprKind::Status, span)),
                    Some(
                        Bid::IoReader | Bid::IoWriter | Bid::EmptyStruct,
                    ) => Ok(TypeExpr::new(
                        TypeExprKind::Named(QQId::new(Bid::Base.into(), Bid::Base.into(), leaf.id)),
                        span,
                    )),
                    _ if crate::token::is_numeric_type_name(leaf.id) => {
                        let refinement = self.parse_optional_refinement()?;
                        Ok(TypeExpr::new(
                            TypeExprKind::Numeric {
                                base_name: leaf.id,
                                refinement,
                            },
                            span,
                        ))
                    }
                    _ => Err(self.err_at(leaf, "unknown base type")),
                }
            }
            _ if crate::token::is_numeric_type_name(tok.id) => {
                self.advance();
                let refinement = self.parse_optional_refinement()?;
                Ok(TypeExpr::new(
                    TypeExprKind::Numeric {
                        base_name: tok.id,
                        refinement,
                    },
                    span,
                ))
            }
            _ if self.is_name(tok) => {
                self.advance();
                if self.accept(Bid::Dot) {
                    let leaf = self.expect_name("type name after package")?;
                    Ok(TypeExpr::new(
                        TypeExprKind::Named(QQId::new(tok.id, Bid::Base.into(), leaf.id)),
                        span,
                    ))
                } else {
                    Ok(TypeExpr::new(
                        TypeExprKind::Named(QQId::new(Id::NONE, Bid::Base.into(), tok.id)),
                        span,
                    ))
                }
            }
            _ => Err(self.err_at(tok, "expected a type")),
        }
    }

    /// `[lo .. hi]`, `[lo ..= hi]` or `[lo .. hi)`. `..` has an exclusive
    /// upper bound; `..=` an inclusive one. Either bound may be absent.
    fn parse_optional_refinement(&mut self) -> Result<Option<Refinement>, String> {
        if !self.accept(Bid::OpenBracket) {
            return Ok(None);
        }
        let lo = if self.check(Bid::DotDot) || self.check(Bid::DotDotEq) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        let inclusive = if self.accept(Bid::DotDotEq) {
            true
        } else if self.accept(Bid::DotDot) {
            false
        } else {
            let tok = self.current_or("'..' in refinement")?;
            return Err(self.err_at(tok, "expected '..' or '..=' in refinement"));
        };
        let hi = if self.check(Bid::CloseBracket) || self.check(Bid::CloseParen) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        if !self.accept(Bid::CloseBracket) && !self.accept(Bid::CloseParen) {
            let tok = self.current_or("']' to close refinement")?;
            return Err(self.err_at(tok, "expected ']' or ')' to close refinement"));
        }
        Ok(Some(Refinement { lo, hi, inclusive }))
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_block(&mut self) -> Result<Vec<Stmt>, String> {
        self.skip_separators();
        self.expect(Bid::OpenBrace, "'{' to open block")?;
        let mut stmts = Vec::new();
        loop {
            self.skip_separators();
            if self.accept(Bid::CloseBrace) {
                break;
            }
            if self.at_end() {
                return Err(format!("{}: syntax: unexpected end of file in block", self.eof_pos()));
            }
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, String> {
        let tok = self.current_or("statement")?;
        let span = span_of(tok);
        match bid_of(tok.id) {
            Some(Bid::Var) => {
                self.advance();
                let name = self.expect_name("variable name")?;
                self.expect(Bid::Colon, "':' after variable name")?;
                let ty = self.parse_type()?;
                let init = if self.accept(Bid::Eq) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                Ok(Stmt::Var {
                    name: name.id,
                    ty,
                    init,
                    span,
                })
            }
            Some(Bid::Assert) => {
                self.advance();
                let cond = self.parse_expr()?;
                let via = if self.accept(Bid::Via) {
                    Some(self.parse_via_rule()?)
                } else {
                    None
                };
                Ok(Stmt::Assert(AssertStmt { cond, via, span }))
            }
            Some(Bid::If) => Ok(Stmt::If(self.parse_if()?)),
            Some(Bid::While) => Ok(Stmt::While(self.parse_while()?)),
            Some(Bid::Break) => {
                self.advance();
                let label = self.parse_optional_label()?;
                Ok(Stmt::Break { label, span })
            }
            Some(Bid::Continue) => {
                self.advance();
                let label = self.parse_optional_label()?;
                Ok(Stmt::Continue { label, span })
            }
            Some(Bid::Return) => {
                self.advance();
                let value = if self.accept(Bid::Ok) {
                    None
                } else if self.check(Bid::Semicolon) || self.check(Bid::CloseBrace) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                Ok(Stmt::Return { value, span })
            }
            Some(Bid::Yield) => {
                self.advance();
                self.expect(Bid::Question, "'?' after 'yield'")?;
                let status = self.parse_expr()?;
                Ok(Stmt::Yield { status, span })
            }
            Some(Bid::Iterate) => Ok(Stmt::Iterate(self.parse_iterate()?)),
            Some(Bid::Choose) => {
                self.advance();
                let field = self.expect_name("method name after 'choose'")?;
                self.expect(Bid::Eq, "'=' after choose target")?;
                self.expect(Bid::OpenBracket, "'[' to open candidate list")?;
                let mut candidates = Vec::new();
                loop {
                    self.skip_separators();
                    if self.check(Bid::CloseBracket) {
                        break;
                    }
                    let cand = self.expect_name("candidate function name")?;
                    candidates.push(cand.id);
                    self.skip_separators();
                    if !self.accept(Bid::Comma) {
                        break;
                    }
                }
                self.expect(Bid::CloseBracket, "']' to close candidate list")?;
                Ok(Stmt::Choose(ChooseStmt {
                    field: field.id,
                    candidates,
                    span,
                }))
            }
            _ => {
                // Assignment or call statement.
                let lhs = self.parse_operand()?;
                let next = self.peek();
                if let Some(op_tok) = next {
                    if is_assign_op(op_tok.id) {
                        self.advance();
                        let rhs = self.parse_expr()?;
                        return Ok(Stmt::Assign {
                            op: op_tok.id,
                            lhs,
                            rhs,
                            span,
                        });
                    }
                }
                if matches!(lhs.kind, ExprKind::Call { .. }) {
                    Ok(Stmt::CallStmt { call: lhs, span })
                } else {
                    Err(self.err_span(span, "expected assignment operator or call"))
                }
            }
        }
    }

    fn parse_optional_label(&mut self) -> Result<Option<Id>, String> {
        if self.accept(Bid::Dot) {
            let tok = self.expect_name("label")?;
            Ok(Some(tok.id))
        } else {
            Ok(None)
        }
    }

    fn parse_if(&mut self) -> Result<IfStmt, String> {
        let tok = self.current_or("'if'")?;
        let span = span_of(tok);
        self.expect(Bid::If, "'if'")?;
        let cond = self.parse_expr()?;
        let then_block = self.parse_block()?;
        self.skip_separators();
        let else_branch = if self.accept(Bid::Else) {
            if self.check(Bid::If) {
                Some(ElseBranch::If(Box::new(self.parse_if()?)))
            } else {
                Some(ElseBranch::Block(self.parse_block()?))
            }
        } else {
            None
        };
        Ok(IfStmt {
            cond,
            then_block,
            else_branch,
            span,
        })
    }

    fn parse_while(&mut self) -> Result<WhileStmt, String> {
        let tok = self.current_or("'while'")?;
        let span = span_of(tok);
        self.expect(Bid::While, "'while'")?;
        let label = self.parse_optional_label()?;
        let cond = self.parse_expr()?;
        let mut asserts = Vec::new();
        while self.accept(Bid::Comma) {
            self.skip_separators();
            let kind = if self.accept(Bid::Pre) {
                LoopAssertKind::Pre
            } else if self.accept(Bid::Inv) {
                LoopAssertKind::Inv
            } else if self.accept(Bid::Post) {
                LoopAssertKind::Post
            } else {
                let t = self.current_or("'pre', 'inv' or 'post'")?;
                return Err(self.err_at(t, "expected 'pre', 'inv' or 'post' after ','"));
            };
            let cond = self.parse_expr()?;
            asserts.push(LoopAssert { kind, cond });
        }
        let body = self.parse_block()?;
        Ok(WhileStmt {
            label,
            cond,
            asserts,
            body,
            span,
        })
    }

    fn parse_iterate(&mut self) -> Result<IterateStmt, String> {
        let tok = self.current_or("'iterate'")?;
        let span = span_of(tok);
        self.expect(Bid::Iterate, "'iterate'")?;
        self.expect(Bid::OpenParen, "'(' to open iterate bindings")?;
        let mut vars = Vec::new();
        loop {
            self.skip_separators();
            if self.check(Bid::CloseParen) {
                break;
            }
            let name = self.expect_name("iterate variable")?;
            self.expect(Bid::Eq, "'=' after iterate variable")?;
            let slice = self.parse_expr()?;
            vars.push((name.id, slice));
            if !self.accept(Bid::Comma) {
                break;
            }
        }
        self.expect(Bid::CloseParen, "')' to close iterate bindings")?;
        let mut parts = vec![self.parse_iterate_part()?];
        loop {
            self.skip_separators();
            if self.accept(Bid::Else) {
                parts.push(self.parse_iterate_part()?);
            } else {
                break;
            }
        }
        Ok(IterateStmt { vars, parts, span })
    }

    /// `(length: N, advance: A, unroll: U) { body }`.
    fn parse_iterate_part(&mut self) -> Result<IteratePart, String> {
        let tok = self.current_or("iterate stanza")?;
        let span = span_of(tok);
        self.expect(Bid::OpenParen, "'(' to open iterate parameters")?;
        let mut length = None;
        let mut advance = None;
        let mut unroll = 1u64;
        loop {
            self.skip_separators();
            if self.check(Bid::CloseParen) {
                break;
            }
            let name = self.expect_name("iterate parameter name")?;
            self.expect(Bid::Colon, "':' after iterate parameter")?;
            let value_tok = self.advance_or("iterate parameter value")?;
            if !is_int_literal(value_tok, self.idmap) {
                return Err(self.err_at(value_tok, "iterate parameters must be integer literals"));
            }
            let value = int_value(self.idmap.str(value_tok.id))
                .map_err(|e| self.err_at(value_tok, &e))?;
            if value < 0 || value > u32::MAX as i128 {
                return Err(self.err_at(value_tok, "iterate parameter out of range"));
            }
            let value = value as u64;
            match self.idmap.str(name.id) {
                "length" => length = Some(value),
                "advance" => advance = Some(value),
                "unroll" => unroll = value,
                other => {
                    return Err(self.err_at(
                        name,
                        &format!("unknown iterate parameter '{}'", other),
                    ));
                }
            }
            if !self.accept(Bid::Comma) {
                break;
            }
        }
        self.expect(Bid::CloseParen, "')' to close iterate parameters")?;
        let (Some(length), Some(advance)) = (length, advance) else {
            return Err(self.err_span(span, "iterate stanza needs 'length' and 'advance'"));
        };
        let body = self.parse_block()?;
        Ok(IteratePart {
            length,
            advance,
            unroll,
            body,
            span,
        })
    }

    fn parse_via_rule(&mut self) -> Result<ViaRule, String> {
        let tok = self.advance_or("rule name string after 'via'")?;
        if !is_str_literal(tok, self.idmap) {
            return Err(self.err_at(tok, "expected quoted rule name after 'via'"));
        }
        let name = self.string_contents(tok).to_string();
        let mut args = Vec::new();
        if self.accept(Bid::OpenParen) {
            loop {
                self.skip_separators();
                if self.check(Bid::CloseParen) {
                    break;
                }
                let arg_name = self.expect_name("rule parameter name")?;
                self.expect(Bid::Colon, "':' after rule parameter name")?;
                let value = self.parse_expr()?;
                args.push(Arg {
                    name: arg_name.id,
                    value,
                });
                if !self.accept(Bid::Comma) {
                    break;
                }
            }
            self.expect(Bid::CloseParen, "')' to close rule parameters")?;
        }
        Ok(ViaRule { name, args })
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub fn parse_expr(&mut self) -> Result<Expr, String> {
        let first = self.parse_operand()?;
        let Some(op_tok) = self.peek() else {
            return Ok(first);
        };
        if !is_binary_op(op_tok.id) {
            return Ok(first);
        }
        self.advance();
        let rhs = self.parse_operand()?;
        let mut expr = Expr::new(
            ExprKind::Binary {
                op: op_tok.id,
                lhs: Box::new(first),
                rhs: Box::new(rhs),
            },
            span_of(op_tok),
        );
        while let Some(next) = self.peek() {
            if !is_binary_op(next.id) {
                break;
            }
            if next.id != op_tok.id || !is_associative(op_tok.id) {
                return Err(self.err_at(
                    next,
                    "ambiguous operator precedence; parenthesize sub-expressions",
                ));
            }
            self.advance();
            let rhs = self.parse_operand()?;
            expr = Expr::new(
                ExprKind::Binary {
                    op: op_tok.id,
                    lhs: Box::new(expr),
                    rhs: Box::new(rhs),
                },
                span_of(next),
            );
        }
        Ok(expr)
    }

    /// A unary-prefixed postfix expression: everything but binary operators.
    fn parse_operand(&mut self) -> Result<Expr, String> {
        let tok = self.current_or("expression")?;
        let span = span_of(tok);
        if tok.is(Bid::Minus) {
            self.advance();
            let operand = self.parse_operand()?;
            return Ok(Expr::new(
                ExprKind::Unary {
                    op: Bid::Minus.into(),
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        if tok.is(Bid::Not) {
            self.advance();
            let operand = self.parse_operand()?;
            return Ok(Expr::new(
                ExprKind::Unary {
                    op: Bid::Not.into(),
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        let mut expr = self.parse_primary()?;
        loop {
            let Some(next) = self.peek() else { break };
            if next.is(Bid::Dot) {
                self.advance();
                let name = self.expect_name("field or method name")?;
                // Method call when followed by an effect marker or '('.
                let effect = if self.check(Bid::Question) {
                    Some(FuncEffect::Coroutine)
                } else if self.check(Bid::Exclam) {
                    Some(FuncEffect::Impure)
                } else if self.check(Bid::OpenParen) {
                    Some(FuncEffect::Pure)
                } else {
                    None
                };
                match effect {
                    Some(effect) => {
                        if effect != FuncEffect::Pure {
                            self.advance(); // consume '?' or '!'
                        }
                        let args = self.parse_call_args()?;
                        expr = Expr::new(
                            ExprKind::Call {
                                recv: Some(Box::new(expr)),
                                name: name.id,
                                args,
                                effect,
                                resolved: None,
                            },
                            span_of(name),
                        );
                    }
                    None => {
                        expr = Expr::new(
                            ExprKind::Field {
                                obj: Box::new(expr),
                                field: name.id,
                            },
                            span_of(name),
                        );
                    }
                }
            } else if next.is(Bid::OpenBracket) {
                self.advance();
                let index = self.parse_expr()?;
                self.expect(Bid::CloseBracket, "']' to close subscript")?;
                expr = Expr::new(
                    ExprKind::Index {
                        obj: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                );
            } else if next.is(Bid::As) {
                self.advance();
                let ty = self.parse_type()?;
                expr = Expr::new(
                    ExprKind::As {
                        operand: Box::new(expr),
                        ty: Box::new(ty),
                    },
                    span,
                );
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        let tok = self.current_or("expression")?;
        let span = span_of(tok);
        if tok.is(Bid::OpenParen) {
            self.advance();
            let inner = self.parse_expr()?;
            self.expect(Bid::CloseParen, "')' to close parenthesized expression")?;
            return Ok(inner);
        }
        if tok.is(Bid::True) {
            self.advance();
            return Ok(Expr::new(ExprKind::BoolLit(true), span));
        }
        if tok.is(Bid::False) {
            self.advance();
            return Ok(Expr::new(ExprKind::BoolLit(false), span));
        }
        if tok.is(Bid::This) {
            self.advance();
            return Ok(Expr::new(ExprKind::Ident(Bid::This.into()), span));
        }
        if is_int_literal(tok, self.idmap) {
            self.advance();
            let value = int_value(self.idmap.str(tok.id)).map_err(|e| self.err_at(tok, &e))?;
            return Ok(Expr::new(ExprKind::IntLit(value), span));
        }
        if is_str_literal(tok, self.idmap) {
            self.advance();
            let message = self.string_contents(tok).to_string();
            if StatusKind::from_message(&message).is_none() {
                return Err(self.err_at(
                    tok,
                    "status literal must start with '$', '?', '#' or '@'",
                ));
            }
            return Ok(Expr::new(ExprKind::StatusLit(message), span));
        }
        if self.is_name(tok) {
            self.advance();
            // A free function call `name(...)` / `name!(...)` / `name?(...)`.
            let effect = if self.check(Bid::Question) {
                Some(FuncEffect::Coroutine)
            } else if self.check(Bid::Exclam) {
                Some(FuncEffect::Impure)
            } else if self.check(Bid::OpenParen) {
                Some(FuncEffect::Pure)
            } else {
                None
            };
            if let Some(effect) = effect {
                // Only a real call if '(' actually follows the marker.
                let is_call = match effect {
                    FuncEffect::Pure => true,
                    _ => self
                        .tokens
                        .get(self.pos + 1)
                        .is_some_and(|t| t.is(Bid::OpenParen)),
                };
                if is_call {
                    if effect != FuncEffect::Pure {
                        self.advance();
                    }
                    let args = self.parse_call_args()?;
                    return Ok(Expr::new(
                        ExprKind::Call {
                            recv: None,
                            name: tok.id,
                            args,
                            effect,
                            resolved: None,
                        },
                        span,
                    ));
                }
            }
            return Ok(Expr::new(ExprKind::Ident(tok.id), span));
        }
        Err(self.err_at(tok, "expected an expression"))
    }

    /// `( name: expr, ... )`. Every argument is passed by name.
    fn parse_call_args(&mut self) -> Result<Vec<Arg>, String> {
        self.expect(Bid::OpenParen, "'(' to open call arguments")?;
        let mut args = Vec::new();
        loop {
            self.skip_separators();
            if self.check(Bid::CloseParen) {
                break;
            }
            let name = self.expect_name("argument name")?;
            self.expect(Bid::Colon, "':' after argument name (arguments are passed by name)")?;
            let value = self.parse_expr()?;
            args.push(Arg {
                name: name.id,
                value,
            });
            if !self.accept(Bid::Comma) {
                break;
            }
        }
        self.expect(Bid::CloseParen, "')' to close call arguments")?;
        Ok(args)
    }

    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.peek();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn advance_or(&mut self, what: &str) -> Result<Token, String> {
        self.advance()
            .ok_or_else(|| format!("{}: syntax: unexpected end of file, expected {}", self.eof_pos(), what))
    }

    fn current_or(&self, what: &str) -> Result<Token, String> {
        self.peek()
            .ok_or_else(|| format!("{}: syntax: unexpected end of file, expected {}", self.eof_pos(), what))
    }

    fn check(&self, bid: Bid) -> bool {
        self.peek().is_some_and(|t| t.is(bid))
    }

    fn accept(&mut self, bid: Bid) -> bool {
        if self.check(bid) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, bid: Bid, what: &str) -> Result<Token, String> {
        let tok = self.current_or(what)?;
        if tok.is(bid) {
            self.pos += 1;
            Ok(tok)
        } else {
            Err(self.err_at(tok, &format!("expected {}", what)))
        }
    }

    /// Identifiers are any non-literal token that is not a reserved keyword,
    /// operator or punctuation. Built-in type and method names (`u32`,
    /// `length`, ...) are valid in name position.
    fn is_name(&self, tok: Token) -> bool {
        match bid_of(tok.id) {
            None => {
                !is_int_literal(tok, self.idmap) && !is_str_literal(tok, self.idmap)
            }
            Some(
                Bid::I8
                | Bid::I16
                | Bid::I32
                | Bid::I64
                | Bid::U8
                | Bid::U16
                | Bid::U32
                | Bid::U64
                | Bid::IoReader
                | Bid::IoWriter
                | Bid::EmptyStruct
                | Bid::Length
                | Bid::Available
                | Bid::ReadU8
                | Bid::PeekU8
                | Bid::WriteU8
                | Bid::Skip
                | Bid::Mark
                | Bid::SinceMark
                | Bid::Initialize
                | Bid::CpuArch
                | Bid::Base
                | Bid::Ok,
            ) => true,
            Some(_) => false,
        }
    }

    fn expect_name(&mut self, what: &str) -> Result<Token, String> {
        let tok = self.current_or(what)?;
        if self.is_name(tok) {
            self.pos += 1;
            Ok(tok)
        } else {
            Err(self.err_at(tok, &format!("expected {}", what)))
        }
    }

    fn skip_separators(&mut self) {
        while self.check(Bid::Semicolon) {
            self.pos += 1;
        }
    }

    fn string_contents(&self, tok: Token) -> &str {
        self.idmap
            .str(tok.id)
            .trim_start_matches('"')
            .trim_end_matches('"')
    }

    fn err_at(&self, tok: Token, msg: &str) -> String {
        format!("{}:{}: syntax: {}", tok.line + 1, tok.col + 1, msg)
    }

    fn err_span(&self, span: Span, msg: &str) -> String {
        format!("{}:{}: syntax: {}", span.line + 1, span.col + 1, msg)
    }

    fn eof_pos(&self) -> String {
        match self.tokens.last() {
            Some(t) => format!("{}:{}", t.line + 1, t.col + 1),
            None => "1:1".to_string(),
        }
    }
}

fn span_of(tok: Token) -> Span {
    Span::new(tok.line, tok.col)
}

fn is_binary_op(id: Id) -> bool {
    matches!(
        bid_of(id),
        Some(
            Bid::Plus
                | Bid::Minus
                | Bid::Star
                | Bid::SlashOp
                | Bid::Percent
                | Bid::Amp
                | Bid::Pipe
                | Bid::Caret
                | Bid::Shl
                | Bid::Shr
                | Bid::EqEq
                | Bid::NotEq
                | Bid::Lt
                | Bid::LtEq
                | Bid::Gt
                | Bid::GtEq
                | Bid::TildeModPlus
                | Bid::TildeModMinus
                | Bid::TildeSatPlus
                | Bid::TildeSatMinus
                | Bid::And
                | Bid::Or
        )
    )
}

fn is_associative(id: Id) -> bool {
    matches!(
        bid_of(id),
        Some(Bid::Plus | Bid::Star | Bid::Amp | Bid::Pipe | Bid::Caret | Bid::And | Bid::Or)
    )
}

fn is_assign_op(id: Id) -> bool {
    matches!(
        bid_of(id),
        Some(
            Bid::Eq
                | Bid::PlusEq
                | Bid::MinusEq
                | Bid::StarEq
                | Bid::SlashEq
                | Bid::PercentEq
                | Bid::AmpEq
                | Bid::PipeEq
                | Bid::CaretEq
                | Bid::ShlEq
                | Bid::ShrEq
                | Bid::TildeModPlusEq
                | Bid::TildeModMinusEq
                | Bid::TildeSatPlusEq
                | Bid::TildeSatMinusEq
        )
    )
}

/// Convenience for tests and the driver: lex and parse one source string.
pub fn parse_source(
    source: &str,
    idmap: &mut IdMap,
    path: PathBuf,
    package: Id,
) -> Result<Module, String> {
    let tokens = tokenize(source, idmap)?;
    Parser::new(tokens, idmap, path, package).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ExprKind, Stmt, TypeExprKind};

    fn parse(src: &str) -> (Module, IdMap) {
        let mut idmap = IdMap::new();
        let pkg = idmap.intern("test");
        let module =
            parse_source(src, &mut idmap, PathBuf::from("test.sift"), pkg).expect("parse");
        (module, idmap)
    }

    fn parse_err(src: &str) -> String {
        let mut idmap = IdMap::new();
        let pkg = idmap.intern("test");
        parse_source(src, &mut idmap, PathBuf::from("test.sift"), pkg).unwrap_err()
    }

    #[test]
    fn test_parse_simple_func() {
        let (module, idmap) = parse(
            "pub func f(x: base.u32[..= 100]) base.u32 {\n    return x + 10\n}\n",
        );
        assert_eq!(module.funcs.len(), 1);
        let f = &module.funcs[0];
        assert_eq!(idmap.str(f.name), "f");
        assert_eq!(f.effect, FuncEffect::Pure);
        assert_eq!(f.args.len(), 1);
        assert!(f.ret.is_some());
        assert_eq!(f.body.len(), 1);
        match &f.body[0] {
            Stmt::Return { value: Some(v), .. } => {
                assert!(matches!(v.kind, ExprKind::Binary { .. }));
            }
            other => panic!("expected return, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_refinement_bounds() {
        let (module, _) = parse("pub func f(x: base.u32[2 .. 100]) base.u32 {\n return x\n}\n");
        let arg_ty = &module.funcs[0].args[0].ty;
        match &arg_ty.kind {
            TypeExprKind::Numeric {
                refinement: Some(r),
                ..
            } => {
                assert!(r.lo.is_some());
                assert!(r.hi.is_some());
                assert!(!r.inclusive);
            }
            other => panic!("expected refined numeric, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_method_and_coroutine() {
        let (module, idmap) = parse(
            "pri struct decoder?(state: base.u32)\n\
             pub func decoder.decode?(src: base.io_reader) {\n\
             \tvar c: base.u8 = src.read_u8?()\n\
             \tthis.state = 1\n\
             }\n",
        );
        assert_eq!(module.structs.len(), 1);
        assert!(module.structs[0].suspendible);
        let f = &module.funcs[0];
        assert_eq!(f.effect, FuncEffect::Coroutine);
        assert_eq!(idmap.str(f.receiver.unwrap()), "decoder");
        match &f.body[0] {
            Stmt::Var { init: Some(e), .. } => match &e.kind {
                ExprKind::Call { effect, .. } => assert_eq!(*effect, FuncEffect::Coroutine),
                other => panic!("expected call, got {:?}", other),
            },
            other => panic!("expected var, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_while_with_annotations() {
        let (module, _) = parse(
            "pub func f(x: base.u32) base.u32 {\n\
             var i: base.u32 = 0\n\
             while.loop i < 10, inv i >= 0, post i == 10 {\n\
             \ti += 1\n\
             }\n\
             return i\n\
             }\n",
        );
        let f = &module.funcs[0];
        match &f.body[1] {
            Stmt::While(w) => {
                assert!(w.label.is_some());
                assert_eq!(w.asserts.len(), 2);
                assert_eq!(w.asserts[0].kind, LoopAssertKind::Inv);
                assert_eq!(w.asserts[1].kind, LoopAssertKind::Post);
            }
            other => panic!("expected while, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_assert_via() {
        let (module, _) = parse(
            "pub func f(s: slice base.u8, i: base.u32) {\n\
             assert i < s.length() via \"a < b: a < c; c == b\"(c: s.length())\n\
             }\n",
        );
        match &module.funcs[0].body[0] {
            Stmt::Assert(a) => {
                let via = a.via.as_ref().expect("via");
                assert_eq!(via.name, "a < b: a < c; c == b");
                assert_eq!(via.args.len(), 1);
            }
            other => panic!("expected assert, got {:?}", other),
        }
    }

    #[test]
    fn test_mixed_operators_require_parens() {
        let err = parse_err("pub func f(x: base.u32) base.u32 {\n return x + 1 < 2\n}\n");
        assert!(err.contains("parenthesize"), "got: {}", err);
    }

    #[test]
    fn test_associative_chain_allowed() {
        let (module, _) =
            parse("pub func f(x: base.u32) base.u32 {\n return x + 1 + 2 + 3\n}\n");
        assert_eq!(module.funcs.len(), 1);
    }

    #[test]
    fn test_parse_status_decl() {
        let (module, _) = parse("pub status \"?bad magic\"\npri status \"$short read\"\n");
        assert_eq!(module.statuses.len(), 2);
        assert!(module.statuses[0].public);
        assert_eq!(module.statuses[0].message, "?bad magic");
    }

    #[test]
    fn test_bad_status_prefix_rejected() {
        let err = parse_err("pub status \"no prefix\"\n");
        assert!(err.contains("must start with"), "got: {}", err);
    }

    #[test]
    fn test_parse_iterate() {
        let (module, _) = parse(
            "pub func f!(s: slice base.u8) {\n\
             iterate (x = s) (length: 4, advance: 4, unroll: 1) {\n\
             \tx[0] = 1\n\
             } else (length: 1, advance: 1, unroll: 1) {\n\
             \tx[0] = 1\n\
             }\n\
             }\n",
        );
        match &module.funcs[0].body[0] {
            Stmt::Iterate(it) => {
                assert_eq!(it.parts.len(), 2);
                assert_eq!(it.parts[0].length, 4);
                assert_eq!(it.parts[1].advance, 1);
            }
            other => panic!("expected iterate, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_choose() {
        let (module, idmap) = parse(
            "pri struct lut(t: base.u32)\n\
             pub func lut.up!() {\n\
             choose up = [up_fast, up_slow]\n\
             }\n",
        );
        match &module.funcs[0].body[0] {
            Stmt::Choose(c) => {
                assert_eq!(c.candidates.len(), 2);
                assert_eq!(idmap.str(c.candidates[0]), "up_fast");
            }
            other => panic!("expected choose, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_use_and_const() {
        let (module, idmap) = parse(
            "use \"std/crc32\"\n\
             pub const limit: base.u32 = 0x100\n",
        );
        assert_eq!(module.uses.len(), 1);
        assert_eq!(module.uses[0].path, "std/crc32");
        assert_eq!(module.consts.len(), 1);
        assert_eq!(idmap.str(module.consts[0].name), "limit");
    }

    #[test]
    fn test_compound_and_tilde_assign() {
        let (module, _) = parse(
            "pub func f!(x: base.u32) {\n\
             x += 1\n\
             x ~mod+= 2\n\
             x ~sat-= 3\n\
             }\n",
        );
        let body = &module.funcs[0].body;
        assert!(matches!(body[0], Stmt::Assign { op, .. } if op.is(Bid::PlusEq)));
        assert!(matches!(body[1], Stmt::Assign { op, .. } if op.is(Bid::TildeModPlusEq)));
        assert!(matches!(body[2], Stmt::Assign { op, .. } if op.is(Bid::TildeSatMinusEq)));
    }

    #[test]
    fn test_missing_brace_reports_eof() {
        let err = parse_err("pub func f(x: base.u32) base.u32 {\n return x\n");
        assert!(err.contains("end of file"), "got: {}", err);
    }
}
