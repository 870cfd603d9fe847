//! Recursive-descent parser producing [`ast::File`] values.
//!
//! Precedence climbing for binary expressions; the composite-literal
//! ambiguity in control-clause headers (`if x == T{}`) is resolved the way
//! the source language's own parser does it, by refusing bare composite
//! literals while a control-clause header is being parsed.

use std::rc::Rc;

use crate::{
    ast::{
        Block, CaseClause, ChanDir, CommClause, Decl, Expr, Field, File, FuncDecl, FuncSig, Ident,
        ImportSpec, InterfaceElem, LitKind, Receiver, Stmt, TypeSpec, ValueSpec,
    },
    error::SyntaxError,
    lexer,
    position::Pos,
    token::{Token, TokenKind},
};

/// Parses one file of source text. `base` is the file's offset base in the
/// owning file set.
pub(crate) fn parse_file(src: &str, base: u32) -> Result<File, SyntaxError> {
    let tokens = lexer::lex(src, base)?;
    let mut parser = Parser {
        tokens,
        idx: 0,
        header_depth: 0,
    };
    parser.file()
}

/// Parses a single standalone expression.
pub(crate) fn parse_standalone_expr(src: &str) -> Result<Expr, SyntaxError> {
    let tokens = lexer::lex(src, 0)?;
    let mut parser = Parser {
        tokens,
        idx: 0,
        header_depth: 0,
    };
    let expr = parser.expr()?;
    match parser.kind() {
        TokenKind::Eof | TokenKind::Semicolon => Ok(expr),
        _ => Err(parser.unexpected("expected end of expression")),
    }
}

struct Parser {
    tokens: Vec<Token>,
    idx: usize,
    /// Non-zero while parsing an `if`/`for`/`switch` header, where a bare
    /// `T{` cannot start a composite literal.
    header_depth: u32,
}

impl Parser {
    fn tok(&self) -> &Token {
        &self.tokens[self.idx.min(self.tokens.len() - 1)]
    }

    fn kind(&self) -> TokenKind {
        self.tok().kind
    }

    fn pos(&self) -> Pos {
        self.tok().pos
    }

    fn peek_kind(&self, ahead: usize) -> TokenKind {
        self.tokens
            .get(self.idx + ahead)
            .map_or(TokenKind::Eof, |t| t.kind)
    }

    fn bump(&mut self) -> Token {
        let tok = self.tok().clone();
        if self.idx < self.tokens.len() - 1 {
            self.idx += 1;
        }
        tok
    }

    fn accept(&mut self, kind: TokenKind) -> bool {
        if self.kind() == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, SyntaxError> {
        if self.kind() == kind {
            Ok(self.bump())
        } else {
            Err(self.unexpected(&format!("expected '{kind}'")))
        }
    }

    fn unexpected(&self, what: &str) -> SyntaxError {
        SyntaxError::new(format!("{what}, found '{}'", self.kind()), self.pos())
    }

    /// Consumes a statement terminator; `}` and `)` terminate implicitly.
    fn expect_semi(&mut self) -> Result<(), SyntaxError> {
        match self.kind() {
            TokenKind::Semicolon => {
                self.bump();
                Ok(())
            }
            TokenKind::RBrace | TokenKind::RParen | TokenKind::Eof => Ok(()),
            _ => Err(self.unexpected("expected ';'")),
        }
    }

    fn ident(&mut self) -> Result<Ident, SyntaxError> {
        let tok = self.expect(TokenKind::Ident)?;
        Ok(Ident {
            name: tok.lit,
            pos: tok.pos,
        })
    }

    // ------------------------------------------------------------------
    // File structure
    // ------------------------------------------------------------------

    fn file(&mut self) -> Result<File, SyntaxError> {
        self.expect(TokenKind::Package)?;
        let package = self.ident()?;
        self.expect_semi()?;

        let mut imports = Vec::new();
        let mut decls = Vec::new();
        while self.kind() == TokenKind::Import {
            let specs = self.import_decl()?;
            imports.extend(specs.iter().cloned());
            decls.push(Decl::Import(specs));
        }
        while self.kind() != TokenKind::Eof {
            if self.kind() == TokenKind::Semicolon {
                self.bump();
                continue;
            }
            decls.push(self.top_decl()?);
        }
        Ok(File {
            package,
            imports,
            decls,
        })
    }

    fn import_decl(&mut self) -> Result<Vec<ImportSpec>, SyntaxError> {
        self.expect(TokenKind::Import)?;
        let mut specs = Vec::new();
        if self.accept(TokenKind::LParen) {
            while !self.accept(TokenKind::RParen) {
                if self.accept(TokenKind::Semicolon) {
                    continue;
                }
                specs.push(self.import_spec()?);
                self.expect_semi()?;
            }
        } else {
            specs.push(self.import_spec()?);
        }
        self.expect_semi()?;
        Ok(specs)
    }

    fn import_spec(&mut self) -> Result<ImportSpec, SyntaxError> {
        let pos = self.pos();
        let alias = match self.kind() {
            TokenKind::Ident => Some(self.ident()?),
            TokenKind::Period => {
                // Dot imports are tolerated but behave like an alias of ".".
                let pos = self.bump().pos;
                Some(Ident::new(".", pos))
            }
            _ => None,
        };
        let path = self.expect(TokenKind::String)?.lit;
        Ok(ImportSpec { alias, path, pos })
    }

    fn top_decl(&mut self) -> Result<Decl, SyntaxError> {
        match self.kind() {
            TokenKind::Const => self.value_decl(TokenKind::Const),
            TokenKind::Var => self.value_decl(TokenKind::Var),
            TokenKind::Type => self.type_decl(),
            TokenKind::Func => self.func_decl(),
            TokenKind::Import => Ok(Decl::Import(self.import_decl()?)),
            _ => Err(self.unexpected("expected declaration")),
        }
    }

    fn value_decl(&mut self, keyword: TokenKind) -> Result<Decl, SyntaxError> {
        self.expect(keyword)?;
        let mut specs = Vec::new();
        if self.accept(TokenKind::LParen) {
            let mut group_index = 0usize;
            while !self.accept(TokenKind::RParen) {
                if self.accept(TokenKind::Semicolon) {
                    continue;
                }
                specs.push(self.value_spec(group_index)?);
                group_index += 1;
                self.expect_semi()?;
            }
        } else {
            specs.push(self.value_spec(0)?);
        }
        Ok(if keyword == TokenKind::Const {
            Decl::Const(specs)
        } else {
            Decl::Var(specs)
        })
    }

    fn value_spec(&mut self, group_index: usize) -> Result<ValueSpec, SyntaxError> {
        let pos = self.pos();
        let mut names = vec![self.ident()?];
        while self.accept(TokenKind::Comma) {
            names.push(self.ident()?);
        }
        let mut typ = None;
        if !matches!(
            self.kind(),
            TokenKind::Assign | TokenKind::Semicolon | TokenKind::RParen | TokenKind::RBrace
        ) {
            typ = Some(self.type_expr()?);
        }
        let mut values = Vec::new();
        if self.accept(TokenKind::Assign) {
            values.push(self.expr()?);
            while self.accept(TokenKind::Comma) {
                values.push(self.expr()?);
            }
        }
        Ok(ValueSpec {
            names,
            typ,
            values,
            group_index,
            pos,
        })
    }

    fn type_decl(&mut self) -> Result<Decl, SyntaxError> {
        self.expect(TokenKind::Type)?;
        let mut specs = Vec::new();
        if self.accept(TokenKind::LParen) {
            while !self.accept(TokenKind::RParen) {
                if self.accept(TokenKind::Semicolon) {
                    continue;
                }
                specs.push(self.type_spec()?);
                self.expect_semi()?;
            }
        } else {
            specs.push(self.type_spec()?);
        }
        Ok(Decl::Type(specs))
    }

    fn type_spec(&mut self) -> Result<TypeSpec, SyntaxError> {
        let pos = self.pos();
        let name = self.ident()?;
        let mut type_params = Vec::new();
        if self.kind() == TokenKind::LBrack {
            type_params = self.type_param_list()?;
        }
        let alias = self.accept(TokenKind::Assign);
        let typ = self.type_expr()?;
        Ok(TypeSpec {
            name,
            type_params,
            alias,
            typ,
            pos,
        })
    }

    fn type_param_list(&mut self) -> Result<Vec<Field>, SyntaxError> {
        self.expect(TokenKind::LBrack)?;
        let mut params = Vec::new();
        while !self.accept(TokenKind::RBrack) {
            let pos = self.pos();
            let mut names = vec![self.ident()?];
            while self.accept(TokenKind::Comma) {
                if self.kind() != TokenKind::Ident {
                    break;
                }
                names.push(self.ident()?);
            }
            let constraint = self.type_expr()?;
            params.push(Field {
                names,
                typ: Some(constraint),
                tag: None,
                pos,
            });
            if !self.accept(TokenKind::Comma) {
                self.expect(TokenKind::RBrack)?;
                break;
            }
        }
        Ok(params)
    }

    fn func_decl(&mut self) -> Result<Decl, SyntaxError> {
        let pos = self.expect(TokenKind::Func)?.pos;
        let recv = if self.kind() == TokenKind::LParen {
            Some(self.receiver()?)
        } else {
            None
        };
        let name = self.ident()?;
        let mut type_params = Vec::new();
        // `[` after the name is a type-parameter list; receivers never have
        // one at declaration level.
        if recv.is_none() && self.kind() == TokenKind::LBrack {
            type_params = self.type_param_list()?;
        }
        let mut sig = self.func_signature()?;
        sig.type_params = type_params;
        let body = if self.kind() == TokenKind::LBrace {
            Some(Rc::new(self.block()?))
        } else {
            None
        };
        Ok(Decl::Func(FuncDecl {
            recv,
            name,
            sig: Rc::new(sig),
            body,
            pos,
        }))
    }

    fn receiver(&mut self) -> Result<Receiver, SyntaxError> {
        let pos = self.expect(TokenKind::LParen)?.pos;
        let first = self.ident()?;
        let (name, pointer, base) = if self.kind() == TokenKind::RParen {
            // Unnamed value receiver: `(T)`.
            (None, false, first)
        } else if self.accept(TokenKind::Mul) {
            (Some(first), true, self.ident()?)
        } else if self.kind() == TokenKind::Ident {
            (Some(first), false, self.ident()?)
        } else {
            // `(*T)` with no receiver name.
            self.expect(TokenKind::Mul)?;
            (None, true, self.ident()?)
        };
        // Generic receivers carry instantiation brackets: `(s *Stack[T])`.
        if self.kind() == TokenKind::LBrack {
            let mut depth = 0usize;
            loop {
                match self.kind() {
                    TokenKind::LBrack => depth += 1,
                    TokenKind::RBrack => {
                        depth -= 1;
                        if depth == 0 {
                            self.bump();
                            break;
                        }
                    }
                    TokenKind::Eof => return Err(self.unexpected("expected ']'")),
                    _ => {}
                }
                if depth > 0 {
                    self.bump();
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(Receiver {
            name,
            base,
            pointer,
            pos,
        })
    }

    fn func_signature(&mut self) -> Result<FuncSig, SyntaxError> {
        let params = self.param_list()?;
        let results = match self.kind() {
            TokenKind::LParen => self.param_list()?,
            k if starts_type(k) => {
                let pos = self.pos();
                let typ = self.type_expr()?;
                vec![Field {
                    names: Vec::new(),
                    typ: Some(typ),
                    tag: None,
                    pos,
                }]
            }
            _ => Vec::new(),
        };
        Ok(FuncSig {
            type_params: Vec::new(),
            params,
            results,
        })
    }

    /// Parses `( ... )` parameter groups. Names are optional; the grammar is
    /// disambiguated by look-ahead on `ident ,`/`ident type` shapes.
    fn param_list(&mut self) -> Result<Vec<Field>, SyntaxError> {
        self.expect(TokenKind::LParen)?;
        let mut fields = Vec::new();
        while self.kind() != TokenKind::RParen {
            fields.push(self.param_group()?);
            if !self.accept(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(fields)
    }

    fn param_group(&mut self) -> Result<Field, SyntaxError> {
        let pos = self.pos();
        // `...T` unnamed variadic.
        if self.kind() == TokenKind::Ellipsis {
            let typ = self.type_expr()?;
            return Ok(Field {
                names: Vec::new(),
                typ: Some(typ),
                tag: None,
                pos,
            });
        }
        if self.kind() == TokenKind::Ident && self.param_group_is_named() {
            let mut names = vec![self.ident()?];
            while self.accept(TokenKind::Comma) {
                names.push(self.ident()?);
            }
            let typ = self.type_expr()?;
            return Ok(Field {
                names,
                typ: Some(typ),
                tag: None,
                pos,
            });
        }
        let typ = self.type_expr()?;
        Ok(Field {
            names: Vec::new(),
            typ: Some(typ),
            tag: None,
            pos,
        })
    }

    /// Look-ahead: does the parameter group start with names? True for
    /// `x T`, `x, y T`, `x ...T`; false for bare types like `int`,
    /// `*T`, `pkg.T`, `[]T`.
    fn param_group_is_named(&self) -> bool {
        let mut i = 0usize;
        loop {
            if self.peek_kind(i) != TokenKind::Ident {
                return false;
            }
            match self.peek_kind(i + 1) {
                TokenKind::Comma => i += 2,
                TokenKind::Period | TokenKind::RParen => return false,
                // `ident ident`, `ident *T`, `ident []T`, `ident ...T` etc.
                k if starts_type(k) => return true,
                _ => return false,
            }
        }
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    fn type_expr(&mut self) -> Result<Expr, SyntaxError> {
        let pos = self.pos();
        match self.kind() {
            TokenKind::Ident => {
                let mut expr = Expr::Ident(self.ident()?);
                if self.accept(TokenKind::Period) {
                    let sel = self.ident()?;
                    expr = Expr::Selector {
                        x: Box::new(expr),
                        sel,
                    };
                }
                if self.kind() == TokenKind::LBrack
                    && self.peek_kind(1) != TokenKind::RBrack
                    && starts_type(self.peek_kind(1))
                {
                    // Generic type instantiation: List[int], Pair[K, V].
                    self.bump();
                    let mut indices = vec![self.type_expr()?];
                    while self.accept(TokenKind::Comma) {
                        indices.push(self.type_expr()?);
                    }
                    self.expect(TokenKind::RBrack)?;
                    expr = Expr::Index {
                        x: Box::new(expr),
                        indices,
                        pos,
                    };
                }
                Ok(expr)
            }
            TokenKind::Mul => {
                self.bump();
                let x = self.type_expr()?;
                Ok(Expr::Star {
                    x: Box::new(x),
                    pos,
                })
            }
            TokenKind::LBrack => {
                self.bump();
                let len = if self.kind() == TokenKind::RBrack {
                    None
                } else {
                    Some(Box::new(self.expr()?))
                };
                self.expect(TokenKind::RBrack)?;
                let elem = self.type_expr()?;
                Ok(Expr::ArrayType {
                    len,
                    elem: Box::new(elem),
                    pos,
                })
            }
            TokenKind::Map => {
                self.bump();
                self.expect(TokenKind::LBrack)?;
                let key = self.type_expr()?;
                self.expect(TokenKind::RBrack)?;
                let value = self.type_expr()?;
                Ok(Expr::MapType {
                    key: Box::new(key),
                    value: Box::new(value),
                    pos,
                })
            }
            TokenKind::Chan => {
                self.bump();
                let dir = if self.accept(TokenKind::Arrow) {
                    ChanDir::Send
                } else {
                    ChanDir::Both
                };
                let elem = self.type_expr()?;
                Ok(Expr::ChanType {
                    dir,
                    elem: Box::new(elem),
                    pos,
                })
            }
            TokenKind::Arrow => {
                self.bump();
                self.expect(TokenKind::Chan)?;
                let elem = self.type_expr()?;
                Ok(Expr::ChanType {
                    dir: ChanDir::Recv,
                    elem: Box::new(elem),
                    pos,
                })
            }
            TokenKind::Func => {
                self.bump();
                let sig = self.func_signature()?;
                Ok(Expr::FuncType {
                    sig: Rc::new(sig),
                    pos,
                })
            }
            TokenKind::Struct => self.struct_type(),
            TokenKind::Interface => self.interface_type(),
            TokenKind::LParen => {
                self.bump();
                let inner = self.type_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(Expr::Paren(Box::new(inner)))
            }
            TokenKind::Ellipsis => {
                self.bump();
                let elem = self.type_expr()?;
                Ok(Expr::Ellipsis {
                    elem: Some(Box::new(elem)),
                    pos,
                })
            }
            _ => Err(self.unexpected("expected type")),
        }
    }

    fn struct_type(&mut self) -> Result<Expr, SyntaxError> {
        let pos = self.expect(TokenKind::Struct)?.pos;
        self.expect(TokenKind::LBrace)?;
        let mut fields = Vec::new();
        while !self.accept(TokenKind::RBrace) {
            if self.accept(TokenKind::Semicolon) {
                continue;
            }
            fields.push(self.struct_field()?);
            self.expect_semi()?;
        }
        Ok(Expr::StructType { fields, pos })
    }

    fn struct_field(&mut self) -> Result<Field, SyntaxError> {
        let pos = self.pos();
        // Embedded pointer field: `*Base`.
        if self.accept(TokenKind::Mul) {
            let typ = self.type_expr()?;
            let tag = self.field_tag();
            return Ok(Field {
                names: Vec::new(),
                typ: Some(Expr::Star {
                    x: Box::new(typ),
                    pos,
                }),
                tag,
                pos,
            });
        }
        let first = self.ident()?;
        // Embedded field: bare type name (possibly qualified), then
        // terminator or tag.
        if matches!(
            self.kind(),
            TokenKind::Semicolon | TokenKind::RBrace | TokenKind::String
        ) {
            let tag = self.field_tag();
            return Ok(Field {
                names: Vec::new(),
                typ: Some(Expr::Ident(first)),
                tag,
                pos,
            });
        }
        if self.kind() == TokenKind::Period {
            self.bump();
            let sel = self.ident()?;
            let tag = self.field_tag();
            return Ok(Field {
                names: Vec::new(),
                typ: Some(Expr::Selector {
                    x: Box::new(Expr::Ident(first)),
                    sel,
                }),
                tag,
                pos,
            });
        }
        let mut names = vec![first];
        while self.accept(TokenKind::Comma) {
            names.push(self.ident()?);
        }
        let typ = self.type_expr()?;
        let tag = self.field_tag();
        Ok(Field {
            names,
            typ: Some(typ),
            tag,
            pos,
        })
    }

    fn field_tag(&mut self) -> Option<String> {
        if self.kind() == TokenKind::String {
            Some(self.bump().lit)
        } else {
            None
        }
    }

    fn interface_type(&mut self) -> Result<Expr, SyntaxError> {
        let pos = self.expect(TokenKind::Interface)?.pos;
        self.expect(TokenKind::LBrace)?;
        let mut elems = Vec::new();
        while !self.accept(TokenKind::RBrace) {
            if self.accept(TokenKind::Semicolon) {
                continue;
            }
            let elem_pos = self.pos();
            if self.kind() == TokenKind::Ident && self.peek_kind(1) == TokenKind::LParen {
                let name = self.ident()?;
                let sig = self.func_signature()?;
                elems.push(InterfaceElem {
                    name: Some(name),
                    sig: Some(Rc::new(sig)),
                    embedded: None,
                    pos: elem_pos,
                });
            } else {
                // Embedded interface or constraint element; union terms
                // (`~int | ~string`) are out of the modeled subset, but a
                // single embedded type name is kept.
                let typ = self.type_expr()?;
                elems.push(InterfaceElem {
                    name: None,
                    sig: None,
                    embedded: Some(typ),
                    pos: elem_pos,
                });
            }
            self.expect_semi()?;
        }
        Ok(Expr::InterfaceType { elems, pos })
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expr(&mut self) -> Result<Expr, SyntaxError> {
        self.binary_expr(1)
    }

    fn binary_expr(&mut self, min_prec: u8) -> Result<Expr, SyntaxError> {
        let mut lhs = self.unary_expr()?;
        loop {
            let op = self.kind();
            let prec = op.precedence();
            if prec < min_prec {
                return Ok(lhs);
            }
            let pos = self.bump().pos;
            let rhs = self.binary_expr(prec + 1)?;
            lhs = Expr::Binary {
                op,
                x: Box::new(lhs),
                y: Box::new(rhs),
                pos,
            };
        }
    }

    fn unary_expr(&mut self) -> Result<Expr, SyntaxError> {
        let pos = self.pos();
        match self.kind() {
            TokenKind::Add | TokenKind::Sub | TokenKind::Not | TokenKind::Xor | TokenKind::And => {
                let op = self.bump().kind;
                let x = self.unary_expr()?;
                Ok(Expr::Unary {
                    op,
                    x: Box::new(x),
                    pos,
                })
            }
            TokenKind::Mul => {
                self.bump();
                let x = self.unary_expr()?;
                Ok(Expr::Star {
                    x: Box::new(x),
                    pos,
                })
            }
            TokenKind::Arrow => {
                // Channel receive.
                self.bump();
                let x = self.unary_expr()?;
                Ok(Expr::Unary {
                    op: TokenKind::Arrow,
                    x: Box::new(x),
                    pos,
                })
            }
            _ => self.primary_expr(),
        }
    }

    fn primary_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.operand()?;
        loop {
            match self.kind() {
                TokenKind::Period => {
                    self.bump();
                    if self.accept(TokenKind::LParen) {
                        // Type assertion: x.(T) or x.(type).
                        let pos = self.pos();
                        let typ = if self.kind() == TokenKind::Type {
                            self.bump();
                            None
                        } else {
                            Some(Box::new(self.type_expr()?))
                        };
                        self.expect(TokenKind::RParen)?;
                        expr = Expr::TypeAssert {
                            x: Box::new(expr),
                            typ,
                            pos,
                        };
                    } else {
                        let sel = self.ident()?;
                        expr = Expr::Selector {
                            x: Box::new(expr),
                            sel,
                        };
                    }
                }
                TokenKind::LParen => {
                    let pos = self.bump().pos;
                    let mut args = Vec::new();
                    let mut has_ellipsis = false;
                    // Arguments live outside any header restriction.
                    let saved = std::mem::replace(&mut self.header_depth, 0);
                    while self.kind() != TokenKind::RParen {
                        args.push(self.expr()?);
                        if self.accept(TokenKind::Ellipsis) {
                            has_ellipsis = true;
                        }
                        if !self.accept(TokenKind::Comma) {
                            break;
                        }
                    }
                    self.header_depth = saved;
                    self.expect(TokenKind::RParen)?;
                    expr = Expr::Call {
                        fun: Box::new(expr),
                        args,
                        has_ellipsis,
                        pos,
                    };
                }
                TokenKind::LBrack => {
                    let pos = self.bump().pos;
                    let saved = std::mem::replace(&mut self.header_depth, 0);
                    if self.accept(TokenKind::RBrack) {
                        self.header_depth = saved;
                        return Err(SyntaxError::new("expected index or type argument", pos));
                    }
                    // Slice form `x[a:b]` or index/instantiation `x[a, b]`.
                    let low = if self.kind() == TokenKind::Colon {
                        None
                    } else {
                        Some(self.expr()?)
                    };
                    if self.accept(TokenKind::Colon) {
                        let high = if matches!(self.kind(), TokenKind::RBrack | TokenKind::Colon) {
                            None
                        } else {
                            Some(Box::new(self.expr()?))
                        };
                        let max = if self.accept(TokenKind::Colon) {
                            Some(Box::new(self.expr()?))
                        } else {
                            None
                        };
                        self.header_depth = saved;
                        self.expect(TokenKind::RBrack)?;
                        expr = Expr::SliceExpr {
                            x: Box::new(expr),
                            low: low.map(Box::new),
                            high,
                            max,
                            pos,
                        };
                    } else {
                        let mut indices = vec![low.unwrap_or(Expr::Ident(Ident::new("", pos)))];
                        while self.accept(TokenKind::Comma) {
                            indices.push(self.expr()?);
                        }
                        self.header_depth = saved;
                        self.expect(TokenKind::RBrack)?;
                        expr = Expr::Index {
                            x: Box::new(expr),
                            indices,
                            pos,
                        };
                    }
                }
                TokenKind::LBrace if self.can_start_composite(&expr) => {
                    let lit = self.composite_body(Some(Box::new(expr)))?;
                    expr = lit;
                }
                _ => return Ok(expr),
            }
        }
    }

    /// A `{` continues the expression as a composite literal only when the
    /// preceding expression is type-shaped and no control-clause header is
    /// being parsed.
    fn can_start_composite(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Ident(_) | Expr::Selector { .. } | Expr::Index { .. } => self.header_depth == 0,
            Expr::ArrayType { .. } | Expr::MapType { .. } | Expr::StructType { .. } => true,
            _ => false,
        }
    }

    fn composite_body(&mut self, typ: Option<Box<Expr>>) -> Result<Expr, SyntaxError> {
        let pos = self.expect(TokenKind::LBrace)?.pos;
        let saved = std::mem::replace(&mut self.header_depth, 0);
        let mut elts = Vec::new();
        while !self.accept(TokenKind::RBrace) {
            if self.accept(TokenKind::Semicolon) || self.accept(TokenKind::Comma) {
                continue;
            }
            let elt = self.composite_elt()?;
            elts.push(elt);
        }
        self.header_depth = saved;
        Ok(Expr::CompositeLit { typ, elts, pos })
    }

    fn composite_elt(&mut self) -> Result<Expr, SyntaxError> {
        // Nested untyped literal: `{...}`.
        let value = if self.kind() == TokenKind::LBrace {
            self.composite_body(None)?
        } else {
            self.expr()?
        };
        if self.kind() == TokenKind::Colon {
            let pos = self.bump().pos;
            let inner = if self.kind() == TokenKind::LBrace {
                self.composite_body(None)?
            } else {
                self.expr()?
            };
            return Ok(Expr::KeyValue {
                key: Box::new(value),
                value: Box::new(inner),
                pos,
            });
        }
        Ok(value)
    }

    fn operand(&mut self) -> Result<Expr, SyntaxError> {
        let pos = self.pos();
        match self.kind() {
            TokenKind::Ident => Ok(Expr::Ident(self.ident()?)),
            TokenKind::Int => Ok(Expr::BasicLit {
                kind: LitKind::Int,
                value: self.bump().lit,
                pos,
            }),
            TokenKind::Float => Ok(Expr::BasicLit {
                kind: LitKind::Float,
                value: self.bump().lit,
                pos,
            }),
            TokenKind::Imag => Ok(Expr::BasicLit {
                kind: LitKind::Imag,
                value: self.bump().lit,
                pos,
            }),
            TokenKind::String => Ok(Expr::BasicLit {
                kind: LitKind::String,
                value: self.bump().lit,
                pos,
            }),
            TokenKind::Rune => Ok(Expr::BasicLit {
                kind: LitKind::Rune,
                value: self.bump().lit,
                pos,
            }),
            TokenKind::LParen => {
                self.bump();
                let saved = std::mem::replace(&mut self.header_depth, 0);
                let inner = self.expr()?;
                self.header_depth = saved;
                self.expect(TokenKind::RParen)?;
                Ok(Expr::Paren(Box::new(inner)))
            }
            TokenKind::Func => {
                self.bump();
                let sig = Rc::new(self.func_signature()?);
                if self.kind() == TokenKind::LBrace {
                    let saved = std::mem::replace(&mut self.header_depth, 0);
                    let body = Rc::new(self.block()?);
                    self.header_depth = saved;
                    Ok(Expr::FuncLit { sig, body, pos })
                } else {
                    Ok(Expr::FuncType { sig, pos })
                }
            }
            // Type operands, for conversions and composite literals.
            TokenKind::LBrack
            | TokenKind::Map
            | TokenKind::Chan
            | TokenKind::Struct
            | TokenKind::Interface => self.type_expr(),
            _ => Err(self.unexpected("expected expression")),
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn block(&mut self) -> Result<Block, SyntaxError> {
        let pos = self.expect(TokenKind::LBrace)?.pos;
        let mut stmts = Vec::new();
        while !self.accept(TokenKind::RBrace) {
            if self.accept(TokenKind::Semicolon) {
                continue;
            }
            stmts.push(self.stmt()?);
            self.expect_semi()?;
        }
        Ok(Block { stmts, pos })
    }

    fn stmt(&mut self) -> Result<Stmt, SyntaxError> {
        let pos = self.pos();
        match self.kind() {
            TokenKind::Const => Ok(Stmt::Decl(self.value_decl(TokenKind::Const)?)),
            TokenKind::Var => Ok(Stmt::Decl(self.value_decl(TokenKind::Var)?)),
            TokenKind::Type => Ok(Stmt::Decl(self.type_decl()?)),
            TokenKind::Return => {
                self.bump();
                let mut results = Vec::new();
                if !matches!(
                    self.kind(),
                    TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
                ) {
                    results.push(self.expr()?);
                    while self.accept(TokenKind::Comma) {
                        results.push(self.expr()?);
                    }
                }
                Ok(Stmt::Return { results, pos })
            }
            TokenKind::Break | TokenKind::Continue | TokenKind::Fallthrough | TokenKind::Goto => {
                let kind = self.bump().kind;
                let label = if self.kind() == TokenKind::Ident {
                    Some(self.ident()?)
                } else {
                    None
                };
                Ok(Stmt::Branch { kind, label, pos })
            }
            TokenKind::Go => {
                self.bump();
                let call = self.expr()?;
                Ok(Stmt::Go { call, pos })
            }
            TokenKind::Defer => {
                self.bump();
                let call = self.expr()?;
                Ok(Stmt::Defer { call, pos })
            }
            TokenKind::If => self.if_stmt(),
            TokenKind::For => self.for_stmt(),
            TokenKind::Switch => self.switch_stmt(),
            TokenKind::Select => self.select_stmt(),
            TokenKind::LBrace => Ok(Stmt::Block(self.block()?)),
            TokenKind::Semicolon => Ok(Stmt::Empty),
            TokenKind::Ident if self.peek_kind(1) == TokenKind::Colon => {
                let label = self.ident()?;
                self.bump(); // ':'
                let stmt = self.stmt()?;
                Ok(Stmt::Labeled {
                    label,
                    stmt: Box::new(stmt),
                })
            }
            _ => self.simple_stmt(),
        }
    }

    /// Expression, send, inc/dec, assignment and short-declaration
    /// statements; also used for `if`/`for`/`switch` init clauses.
    fn simple_stmt(&mut self) -> Result<Stmt, SyntaxError> {
        let pos = self.pos();
        let first = self.expr()?;
        match self.kind() {
            TokenKind::Arrow => {
                self.bump();
                let value = self.expr()?;
                Ok(Stmt::Send {
                    chan: first,
                    value,
                    pos,
                })
            }
            TokenKind::Inc | TokenKind::Dec => {
                let op = self.bump().kind;
                Ok(Stmt::IncDec { x: first, op, pos })
            }
            TokenKind::Comma => {
                let mut lhs = vec![first];
                while self.accept(TokenKind::Comma) {
                    lhs.push(self.expr()?);
                }
                let op = match self.kind() {
                    TokenKind::Assign | TokenKind::Define => self.bump().kind,
                    _ => return Err(self.unexpected("expected '=' or ':='")),
                };
                let mut rhs = vec![self.expr()?];
                while self.accept(TokenKind::Comma) {
                    rhs.push(self.expr()?);
                }
                Ok(Stmt::Assign { lhs, rhs, op, pos })
            }
            TokenKind::Assign | TokenKind::Define => {
                let op = self.bump().kind;
                let mut rhs = vec![self.expr()?];
                while self.accept(TokenKind::Comma) {
                    rhs.push(self.expr()?);
                }
                Ok(Stmt::Assign {
                    lhs: vec![first],
                    rhs,
                    op,
                    pos,
                })
            }
            k if k.augmented_op().is_some() => {
                let op = self.bump().kind;
                let rhs = self.expr()?;
                Ok(Stmt::Assign {
                    lhs: vec![first],
                    rhs: vec![rhs],
                    op,
                    pos,
                })
            }
            _ => Ok(Stmt::Expr(first)),
        }
    }

    fn if_stmt(&mut self) -> Result<Stmt, SyntaxError> {
        let pos = self.expect(TokenKind::If)?.pos;
        self.header_depth += 1;
        let mut init = None;
        let mut cond_stmt = self.simple_stmt()?;
        if self.accept(TokenKind::Semicolon) {
            init = Some(Box::new(cond_stmt));
            cond_stmt = self.simple_stmt()?;
        }
        self.header_depth -= 1;
        let cond = match cond_stmt {
            Stmt::Expr(e) => e,
            other => {
                return Err(SyntaxError::new(
                    "expected condition expression",
                    other.pos(),
                ));
            }
        };
        let then = self.block()?;
        let els = if self.accept(TokenKind::Else) {
            let stmt = if self.kind() == TokenKind::If {
                self.if_stmt()?
            } else {
                Stmt::Block(self.block()?)
            };
            Some(Box::new(stmt))
        } else {
            None
        };
        Ok(Stmt::If {
            init,
            cond,
            then,
            els,
            pos,
        })
    }

    fn for_stmt(&mut self) -> Result<Stmt, SyntaxError> {
        let pos = self.expect(TokenKind::For)?.pos;
        self.header_depth += 1;

        // `for {`
        if self.kind() == TokenKind::LBrace {
            self.header_depth -= 1;
            let body = self.block()?;
            return Ok(Stmt::For {
                init: None,
                cond: None,
                post: None,
                body,
                pos,
            });
        }

        // `for range x {`
        if self.accept(TokenKind::Range) {
            let x = self.expr()?;
            self.header_depth -= 1;
            let body = self.block()?;
            return Ok(Stmt::Range {
                key: None,
                value: None,
                define: false,
                x,
                body,
                pos,
            });
        }

        // `for init; cond; post {` or `for cond {` or `for k, v := range x {`
        let mut init: Option<Box<Stmt>> = None;
        let mut cond: Option<Expr> = None;
        let mut post: Option<Box<Stmt>> = None;

        if self.kind() != TokenKind::Semicolon {
            let first = self.range_or_simple_stmt()?;
            match first {
                RangeOrStmt::Range(stmt) => {
                    self.header_depth -= 1;
                    let body = self.block()?;
                    if let Stmt::Range {
                        key,
                        value,
                        define,
                        x,
                        ..
                    } = stmt
                    {
                        return Ok(Stmt::Range {
                            key,
                            value,
                            define,
                            x,
                            body,
                            pos,
                        });
                    }
                    unreachable!("range_or_simple_stmt returned non-range in Range arm");
                }
                RangeOrStmt::Stmt(stmt) => {
                    if self.kind() == TokenKind::LBrace {
                        // `for cond {`
                        match stmt {
                            Stmt::Expr(e) => cond = Some(e),
                            other => {
                                return Err(SyntaxError::new(
                                    "expected loop condition",
                                    other.pos(),
                                ));
                            }
                        }
                        self.header_depth -= 1;
                        let body = self.block()?;
                        return Ok(Stmt::For {
                            init,
                            cond,
                            post,
                            body,
                            pos,
                        });
                    }
                    init = Some(Box::new(stmt));
                }
            }
        }

        self.expect(TokenKind::Semicolon)?;
        if self.kind() != TokenKind::Semicolon {
            cond = Some(self.expr()?);
        }
        self.expect(TokenKind::Semicolon)?;
        if self.kind() != TokenKind::LBrace {
            post = Some(Box::new(self.simple_stmt()?));
        }
        self.header_depth -= 1;
        let body = self.block()?;
        Ok(Stmt::For {
            init,
            cond,
            post,
            body,
            pos,
        })
    }

    fn range_or_simple_stmt(&mut self) -> Result<RangeOrStmt, SyntaxError> {
        let pos = self.pos();
        let first = self.expr()?;
        match self.kind() {
            TokenKind::Comma => {
                let mut lhs = vec![first];
                while self.accept(TokenKind::Comma) {
                    lhs.push(self.expr()?);
                }
                let op = match self.kind() {
                    TokenKind::Assign | TokenKind::Define => self.bump().kind,
                    _ => return Err(self.unexpected("expected '=' or ':='")),
                };
                if self.accept(TokenKind::Range) {
                    let x = self.expr()?;
                    let mut iter = lhs.into_iter();
                    return Ok(RangeOrStmt::Range(Stmt::Range {
                        key: iter.next(),
                        value: iter.next(),
                        define: op == TokenKind::Define,
                        x,
                        body: Block {
                            stmts: Vec::new(),
                            pos,
                        },
                        pos,
                    }));
                }
                let mut rhs = vec![self.expr()?];
                while self.accept(TokenKind::Comma) {
                    rhs.push(self.expr()?);
                }
                Ok(RangeOrStmt::Stmt(Stmt::Assign { lhs, rhs, op, pos }))
            }
            TokenKind::Assign | TokenKind::Define => {
                let op = self.bump().kind;
                if self.accept(TokenKind::Range) {
                    let x = self.expr()?;
                    return Ok(RangeOrStmt::Range(Stmt::Range {
                        key: Some(first),
                        value: None,
                        define: op == TokenKind::Define,
                        x,
                        body: Block {
                            stmts: Vec::new(),
                            pos,
                        },
                        pos,
                    }));
                }
                let mut rhs = vec![self.expr()?];
                while self.accept(TokenKind::Comma) {
                    rhs.push(self.expr()?);
                }
                Ok(RangeOrStmt::Stmt(Stmt::Assign {
                    lhs: vec![first],
                    rhs,
                    op,
                    pos,
                }))
            }
            TokenKind::Inc | TokenKind::Dec => {
                let op = self.bump().kind;
                Ok(RangeOrStmt::Stmt(Stmt::IncDec { x: first, op, pos }))
            }
            k if k.augmented_op().is_some() => {
                let op = self.bump().kind;
                let rhs = self.expr()?;
                Ok(RangeOrStmt::Stmt(Stmt::Assign {
                    lhs: vec![first],
                    rhs: vec![rhs],
                    op,
                    pos,
                }))
            }
            _ => Ok(RangeOrStmt::Stmt(Stmt::Expr(first))),
        }
    }

    fn switch_stmt(&mut self) -> Result<Stmt, SyntaxError> {
        let pos = self.expect(TokenKind::Switch)?.pos;
        self.header_depth += 1;

        let mut init: Option<Box<Stmt>> = None;
        let mut tag_stmt: Option<Stmt> = None;
        if self.kind() != TokenKind::LBrace {
            let first = self.simple_stmt()?;
            if self.accept(TokenKind::Semicolon) {
                init = Some(Box::new(first));
                if self.kind() != TokenKind::LBrace {
                    tag_stmt = Some(self.simple_stmt()?);
                }
            } else {
                tag_stmt = Some(first);
            }
        }
        self.header_depth -= 1;

        // Detect the type-switch guard: `v := x.(type)` or `x.(type)`.
        let type_switch = match &tag_stmt {
            Some(Stmt::Expr(expr)) => matches!(
                expr.unparen(),
                Expr::TypeAssert { typ: None, .. }
            ),
            Some(Stmt::Assign { rhs, op, .. }) => {
                *op == TokenKind::Define
                    && rhs.len() == 1
                    && matches!(rhs[0].unparen(), Expr::TypeAssert { typ: None, .. })
            }
            _ => false,
        };

        if type_switch {
            let (binding, subject) = match tag_stmt.take() {
                Some(Stmt::Expr(expr)) => (None, type_assert_subject(expr)?),
                Some(Stmt::Assign { mut lhs, mut rhs, .. }) => {
                    let binding = match lhs.pop() {
                        Some(Expr::Ident(id)) => Some(id),
                        other => {
                            return Err(SyntaxError::new(
                                "expected identifier in type switch guard",
                                other.map_or(pos, |e| e.pos()),
                            ));
                        }
                    };
                    (binding, type_assert_subject(rhs.pop().expect("checked above"))?)
                }
                _ => unreachable!("type_switch implies a guard statement"),
            };
            let clauses = self.case_clauses(true)?;
            return Ok(Stmt::TypeSwitch {
                init,
                binding,
                subject,
                clauses,
                pos,
            });
        }

        let tag = match tag_stmt {
            None => None,
            Some(Stmt::Expr(e)) => Some(e),
            Some(other) => {
                return Err(SyntaxError::new("expected switch expression", other.pos()));
            }
        };
        let clauses = self.case_clauses(false)?;
        Ok(Stmt::Switch {
            init,
            tag,
            clauses,
            pos,
        })
    }

    fn case_clauses(&mut self, types: bool) -> Result<Vec<CaseClause>, SyntaxError> {
        self.expect(TokenKind::LBrace)?;
        let mut clauses = Vec::new();
        while !self.accept(TokenKind::RBrace) {
            if self.accept(TokenKind::Semicolon) {
                continue;
            }
            let pos = self.pos();
            let mut exprs = Vec::new();
            if self.accept(TokenKind::Case) {
                loop {
                    let e = if types {
                        self.case_type()?
                    } else {
                        self.expr()?
                    };
                    exprs.push(e);
                    if !self.accept(TokenKind::Comma) {
                        break;
                    }
                }
            } else {
                self.expect(TokenKind::Default)?;
            }
            self.expect(TokenKind::Colon)?;
            let mut body = Vec::new();
            while !matches!(
                self.kind(),
                TokenKind::Case | TokenKind::Default | TokenKind::RBrace
            ) {
                if self.accept(TokenKind::Semicolon) {
                    continue;
                }
                body.push(self.stmt()?);
                self.expect_semi_in_clause()?;
            }
            clauses.push(CaseClause { exprs, body, pos });
        }
        Ok(clauses)
    }

    /// A type-switch case is a type, except `nil` which stays an identifier.
    fn case_type(&mut self) -> Result<Expr, SyntaxError> {
        if self.kind() == TokenKind::Ident && self.tok().lit == "nil" {
            return Ok(Expr::Ident(self.ident()?));
        }
        self.type_expr()
    }

    fn expect_semi_in_clause(&mut self) -> Result<(), SyntaxError> {
        match self.kind() {
            TokenKind::Semicolon => {
                self.bump();
                Ok(())
            }
            TokenKind::Case | TokenKind::Default | TokenKind::RBrace | TokenKind::Eof => Ok(()),
            _ => Err(self.unexpected("expected ';'")),
        }
    }

    fn select_stmt(&mut self) -> Result<Stmt, SyntaxError> {
        let pos = self.expect(TokenKind::Select)?.pos;
        self.expect(TokenKind::LBrace)?;
        let mut clauses = Vec::new();
        while !self.accept(TokenKind::RBrace) {
            if self.accept(TokenKind::Semicolon) {
                continue;
            }
            let clause_pos = self.pos();
            let comm = if self.accept(TokenKind::Case) {
                Some(Box::new(self.simple_stmt()?))
            } else {
                self.expect(TokenKind::Default)?;
                None
            };
            self.expect(TokenKind::Colon)?;
            let mut body = Vec::new();
            while !matches!(
                self.kind(),
                TokenKind::Case | TokenKind::Default | TokenKind::RBrace
            ) {
                if self.accept(TokenKind::Semicolon) {
                    continue;
                }
                body.push(self.stmt()?);
                self.expect_semi_in_clause()?;
            }
            clauses.push(CommClause {
                comm,
                body,
                pos: clause_pos,
            });
        }
        Ok(Stmt::Select { clauses, pos })
    }
}

enum RangeOrStmt {
    Range(Stmt),
    Stmt(Stmt),
}

fn type_assert_subject(expr: Expr) -> Result<Expr, SyntaxError> {
    match expr {
        Expr::TypeAssert { x, typ: None, .. } => Ok(*x),
        Expr::Paren(inner) => type_assert_subject(*inner),
        other => Err(SyntaxError::new(
            "expected type switch guard",
            other.pos(),
        )),
    }
}

/// Whether a token can begin a type expression.
fn starts_type(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Ident
            | TokenKind::Mul
            | TokenKind::LBrack
            | TokenKind::Map
            | TokenKind::Chan
            | TokenKind::Arrow
            | TokenKind::Func
            | TokenKind::Struct
            | TokenKind::Interface
            | TokenKind::LParen
            | TokenKind::Ellipsis
    )
}
