//! Expression evaluation: literals, composites, operators, indexing.
//!
//! Arithmetic folds when both operands are concrete primitives of
//! compatible kinds and degrades to a typed placeholder otherwise. The
//! short-circuit operators are special-cased for reach: when either side is
//! symbolic, both sides are evaluated anyway and the result is a symbolic
//! boolean.

use std::rc::Rc;

use symgo_scan::{
    ast::{Expr, LitKind},
    token::TokenKind,
    FieldType, Pos, TypeInfo, TypeKind,
};

use crate::{
    interp::Interpreter,
    object::{EnvId, InstanceData, InstanceId, MapData, Object, PkgId, PointerData, SliceData},
};

impl Interpreter {
    pub(crate) fn eval_expr(&mut self, expr: &Expr, env: EnvId, pkg: PkgId) -> Object {
        self.tracer.on_visit(expr_name(expr), expr.pos());
        match expr {
            Expr::Paren(inner) => self.eval_expr(inner, env, pkg),
            Expr::BasicLit { kind, value, pos } => self.eval_basic_lit(*kind, value, *pos, pkg),
            Expr::Ident(id) => self.eval_ident(id, env, pkg),
            Expr::Selector { x, sel } => self.eval_selector(x, sel, env, pkg),
            Expr::Call {
                fun,
                args,
                has_ellipsis,
                pos,
            } => self.eval_call(fun, args, *has_ellipsis, *pos, env, pkg),
            Expr::CompositeLit { typ, elts, pos } => {
                self.eval_composite_lit(typ.as_deref(), elts, *pos, env, pkg)
            }
            Expr::FuncLit { sig, body, pos } => {
                let id = self.intern_func_literal(pkg, *pos, env, Rc::clone(sig), Rc::clone(body));
                Object::Func(id)
            }
            Expr::Unary { op, x, pos } => self.eval_unary(*op, x, *pos, env, pkg),
            Expr::Binary { op, x, y, pos } => self.eval_binary(*op, x, y, *pos, env, pkg),
            Expr::Star { x, pos } => self.eval_deref(x, *pos, env, pkg),
            Expr::Index { x, indices, pos } => self.eval_index(x, indices, *pos, env, pkg),
            Expr::SliceExpr {
                x, low, high, max, ..
            } => {
                let base = self.eval_expr(x, env, pkg);
                if base.is_signal() {
                    return base;
                }
                for bound in [low, high, max].into_iter().flatten() {
                    let r = self.eval_expr(bound, env, pkg);
                    if r.is_signal() {
                        return r;
                    }
                }
                match self.value_of(&base) {
                    Object::Slice(data) => Object::Slice(Box::new(SliceData {
                        elem: data.elem,
                        len: None,
                    })),
                    Object::Str(_) => Object::typed_placeholder(
                        "string slice",
                        FieldType::named("string"),
                    ),
                    other => match self.dynamic_type(&other) {
                        Some(t) => Object::typed_placeholder("slice expression", t),
                        None => Object::placeholder("slice expression"),
                    },
                }
            }
            Expr::TypeAssert { x, typ, pos } => {
                let subject = self.eval_expr(x, env, pkg);
                if subject.is_signal() {
                    return subject;
                }
                match typ {
                    Some(t) => {
                        let asserted = self.field_type_of_expr(t, pkg);
                        if let Object::Var(id) = &subject {
                            self.vars[id.index()].possible_types.insert(asserted.clone());
                        }
                        Object::typed_placeholder("type assertion", asserted)
                    }
                    // Bare `.(type)` only appears in a type-switch guard.
                    None => self.error_at(*pos, pkg, "type switch guard outside type switch"),
                }
            }
            Expr::KeyValue { value, .. } => self.eval_expr(value, env, pkg),
            Expr::Ellipsis {
                elem: Some(elem), ..
            } => self.eval_expr(elem, env, pkg),
            Expr::Ellipsis { elem: None, .. } => Object::placeholder("bare ellipsis"),
            // Type-shaped expressions reify to Type objects; they appear as
            // operands of make/new, conversions and instantiations.
            Expr::ArrayType { .. }
            | Expr::MapType { .. }
            | Expr::ChanType { .. }
            | Expr::FuncType { .. }
            | Expr::StructType { .. }
            | Expr::InterfaceType { .. } => {
                let ft = self.field_type_of_expr(expr, pkg);
                Object::Type(self.synthesize_type(&ft))
            }
        }
    }

    fn eval_basic_lit(&mut self, kind: LitKind, value: &str, pos: Pos, pkg: PkgId) -> Object {
        match kind {
            LitKind::Int => match symgo_scan::parse_int(value) {
                Some(n) => Object::Int(n),
                None => Object::typed_placeholder("oversized integer", FieldType::named("int")),
            },
            LitKind::Float => match value.replace('_', "").parse::<f64>() {
                Ok(f) => Object::Float(f),
                Err(_) => self.error_at(pos, pkg, format!("malformed float literal {value:?}")),
            },
            LitKind::Imag => Object::Complex,
            LitKind::String => Object::Str(value.to_owned()),
            LitKind::Rune => match value.chars().next() {
                Some(c) => Object::Rune(c),
                None => self.error_at(pos, pkg, "empty rune literal"),
            },
        }
    }

    /// Builds a `TypeInfo` for a structural (non-declared) type.
    pub(crate) fn synthesize_type(&mut self, ft: &FieldType) -> symgo_scan::TypeRef {
        let kind = match ft {
            FieldType::Slice(_) => TypeKind::Slice,
            FieldType::Array { .. } => TypeKind::Array,
            FieldType::Map { .. } => TypeKind::Map,
            FieldType::Chan { .. } => TypeKind::Chan,
            FieldType::Func { .. } => TypeKind::Func,
            FieldType::Pointer(_) => TypeKind::Pointer,
            FieldType::Named { .. } | FieldType::Variadic(_) => TypeKind::Named,
        };
        Rc::new(TypeInfo {
            name: ft.to_string(),
            pkg_path: String::new(),
            kind,
            struct_info: None,
            interface_info: None,
            underlying: Some(ft.clone()),
            type_params: Vec::new(),
            unresolved: false,
            pos: Pos::NONE,
        })
    }

    // ------------------------------------------------------------------
    // Composite literals
    // ------------------------------------------------------------------

    fn eval_composite_lit(
        &mut self,
        typ: Option<&Expr>,
        elts: &[Expr],
        pos: Pos,
        env: EnvId,
        pkg: PkgId,
    ) -> Object {
        let Some(typ) = typ else {
            // Untyped nested literal: evaluate elements for reach.
            for elt in elts {
                let r = self.eval_expr(elt, env, pkg);
                if r.is_signal() {
                    return r;
                }
            }
            return Object::placeholder("untyped composite literal");
        };
        let ft = self.field_type_of_expr(typ, pkg);
        match &ft {
            FieldType::Slice(_) | FieldType::Array { .. } | FieldType::Map { .. } => {
                self.eval_shaped_literal(&ft, elts, env, pkg)
            }
            FieldType::Named { .. } | FieldType::Pointer(_) => {
                let (struct_ft, make_pointer) = match &ft {
                    FieldType::Pointer(inner) => ((**inner).clone(), true),
                    other => (other.clone(), false),
                };
                let type_ref = self.resolve_field_type(&struct_ft, pkg);
                // A named slice/map type (`type Names []string`) constructs
                // its underlying shape, not an instance.
                if let Some(underlying) =
                    type_ref.as_ref().and_then(|t| t.underlying.clone())
                {
                    if matches!(
                        underlying,
                        FieldType::Slice(_) | FieldType::Array { .. } | FieldType::Map { .. }
                    ) {
                        return self.eval_shaped_literal(&underlying, elts, env, pkg);
                    }
                }
                let instance = self.build_instance(type_ref, struct_ft.clone(), elts, env, pkg);
                match instance {
                    Object::Instance(_) if make_pointer => Object::Pointer(Box::new(PointerData {
                        pointee: instance,
                        typ: Some(struct_ft),
                    })),
                    other => other,
                }
            }
            _ => {
                for elt in elts {
                    let r = self.eval_expr(elt, env, pkg);
                    if r.is_signal() {
                        return r;
                    }
                }
                let _ = pos;
                Object::typed_placeholder("composite literal", ft)
            }
        }
    }

    /// Slice, array and map literals, by shape.
    fn eval_shaped_literal(
        &mut self,
        shape: &FieldType,
        elts: &[Expr],
        env: EnvId,
        pkg: PkgId,
    ) -> Object {
        for elt in elts {
            let r = self.eval_expr(elt, env, pkg);
            if r.is_signal() {
                return r;
            }
        }
        match shape {
            FieldType::Slice(elem) | FieldType::Array { elem, .. } => {
                Object::Slice(Box::new(SliceData {
                    elem: Some((**elem).clone()),
                    len: i64::try_from(elts.len()).ok(),
                }))
            }
            FieldType::Map { key, value } => Object::Map(Box::new(MapData {
                key: Some((**key).clone()),
                value: Some((**value).clone()),
            })),
            other => Object::typed_placeholder("composite literal", other.clone()),
        }
    }

    fn build_instance(
        &mut self,
        type_ref: Option<symgo_scan::TypeRef>,
        typ: FieldType,
        elts: &[Expr],
        env: EnvId,
        pkg: PkgId,
    ) -> Object {
        let field_names: Vec<String> = type_ref
            .as_ref()
            .and_then(|t| t.struct_info.as_ref())
            .map(|s| s.fields.iter().map(|f| f.name.clone()).collect())
            .unwrap_or_default();

        let id = InstanceId::new(self.instances.len());
        self.instances.push(InstanceData {
            type_ref,
            typ: Some(typ),
            fields: indexmap::IndexMap::new(),
            state: ahash::AHashMap::new(),
        });

        for (i, elt) in elts.iter().enumerate() {
            match elt {
                Expr::KeyValue { key, value, .. } => {
                    let v = self.eval_expr(value, env, pkg);
                    if v.is_signal() {
                        return v;
                    }
                    let v = self.value_of(&v);
                    if let Expr::Ident(name) = key.unparen() {
                        self.instances[id.index()].fields.insert(name.name.clone(), v);
                    }
                }
                positional => {
                    let v = self.eval_expr(positional, env, pkg);
                    if v.is_signal() {
                        return v;
                    }
                    let v = self.value_of(&v);
                    if let Some(name) = field_names.get(i) {
                        self.instances[id.index()].fields.insert(name.clone(), v);
                    }
                }
            }
        }
        Object::Instance(id)
    }

    // ------------------------------------------------------------------
    // Operators
    // ------------------------------------------------------------------

    fn eval_unary(&mut self, op: TokenKind, x: &Expr, pos: Pos, env: EnvId, pkg: PkgId) -> Object {
        // Address-of keeps the operand un-dereferenced so pointer writes
        // reach the variable cell.
        if op == TokenKind::And {
            let operand = self.eval_expr(x, env, pkg);
            if operand.is_signal() {
                return operand;
            }
            let typ = self.dynamic_type(&operand);
            return Object::Pointer(Box::new(PointerData {
                pointee: operand,
                typ,
            }));
        }
        let raw = self.eval_expr(x, env, pkg);
        if raw.is_signal() {
            return raw;
        }
        let value = self.value_of(&raw);
        match op {
            TokenKind::Sub => match value {
                Object::Int(n) => Object::Int(n.wrapping_neg()),
                Object::Float(f) => Object::Float(-f),
                other => self.symbolic_like(&other, "negation"),
            },
            TokenKind::Add => value,
            TokenKind::Not => match value {
                Object::Bool(b) => Object::Bool(!b),
                _ => Object::typed_placeholder("logical not", FieldType::named("bool")),
            },
            TokenKind::Xor => match value {
                Object::Int(n) => Object::Int(!n),
                other => self.symbolic_like(&other, "bitwise complement"),
            },
            TokenKind::Arrow => match value {
                Object::Chan(data) => match data.elem {
                    Some(t) => Object::typed_placeholder("channel receive", t),
                    None => Object::placeholder("channel receive"),
                },
                other => match self.dynamic_type(&other) {
                    Some(FieldType::Chan { elem }) => {
                        Object::typed_placeholder("channel receive", *elem)
                    }
                    _ => Object::placeholder("channel receive"),
                },
            },
            _ => self.error_at(pos, pkg, format!("unsupported unary operator '{op}'")),
        }
    }

    /// A placeholder typed like the given operand.
    fn symbolic_like(&mut self, operand: &Object, reason: &str) -> Object {
        self.tracer.on_placeholder(reason);
        match self.dynamic_type(operand) {
            Some(t) => Object::typed_placeholder(reason, t),
            None => Object::placeholder(reason),
        }
    }

    fn eval_deref(&mut self, x: &Expr, pos: Pos, env: EnvId, pkg: PkgId) -> Object {
        let raw = self.eval_expr(x, env, pkg);
        if raw.is_signal() {
            return raw;
        }
        let value = self.value_of(&raw);
        match value {
            Object::Pointer(data) => self.value_of(&data.pointee),
            Object::Type(t) => {
                // `*T` in type position: a pointer type.
                let inner = t
                    .underlying
                    .clone()
                    .unwrap_or_else(|| FieldType::qualified(&t.pkg_path, &t.name));
                let ft = FieldType::Pointer(Box::new(inner));
                Object::Type(self.synthesize_type(&ft))
            }
            Object::Placeholder(data) => match &data.typ {
                Some(FieldType::Pointer(elem)) => {
                    Object::typed_placeholder("dereference", (**elem).clone())
                }
                _ => Object::placeholder("dereference"),
            },
            Object::Nil => self.error_at(pos, pkg, "nil pointer dereference"),
            other => self.symbolic_like(&other, "dereference"),
        }
    }

    fn eval_binary(
        &mut self,
        op: TokenKind,
        x: &Expr,
        y: &Expr,
        pos: Pos,
        env: EnvId,
        pkg: PkgId,
    ) -> Object {
        if matches!(op, TokenKind::LAnd | TokenKind::LOr) {
            let raw = self.eval_expr(x, env, pkg);
            if raw.is_signal() {
                return raw;
            }
            let lv = self.value_of(&raw);
            if let Object::Bool(b) = lv {
                // Concrete condition: genuine short-circuit.
                if (op == TokenKind::LAnd && !b) || (op == TokenKind::LOr && b) {
                    return Object::Bool(b);
                }
                let raw = self.eval_expr(y, env, pkg);
                if raw.is_signal() {
                    return raw;
                }
                return match self.value_of(&raw) {
                    Object::Bool(rb) => Object::Bool(rb),
                    _ => Object::typed_placeholder("symbolic condition", FieldType::named("bool")),
                };
            }
            // Symbolic condition: evaluate both sides to maximize reach.
            let raw = self.eval_expr(y, env, pkg);
            if raw.is_signal() {
                return raw;
            }
            return Object::typed_placeholder("symbolic condition", FieldType::named("bool"));
        }

        let raw = self.eval_expr(x, env, pkg);
        if raw.is_signal() {
            return raw;
        }
        let lv = self.value_of(&raw);
        let raw = self.eval_expr(y, env, pkg);
        if raw.is_signal() {
            return raw;
        }
        let rv = self.value_of(&raw);
        self.eval_binop(op, lv, rv, pos, pkg)
    }

    /// Folds a binary operation over evaluated operands.
    pub(crate) fn eval_binop(
        &mut self,
        op: TokenKind,
        lv: Object,
        rv: Object,
        pos: Pos,
        pkg: PkgId,
    ) -> Object {
        use TokenKind::{
            Add, And, AndNot, Eql, Geq, Gtr, Leq, Lss, Neq, Or, Quo, Rem, Shl, Shr, Sub, Xor,
        };

        // Runes participate in integer arithmetic.
        let lv = widen_rune(lv, &rv);
        let rv = widen_rune(rv, &lv);

        match (&lv, &rv) {
            (Object::Int(a), Object::Int(b)) => {
                let (a, b) = (*a, *b);
                match op {
                    Add => Object::Int(a.wrapping_add(b)),
                    Sub => Object::Int(a.wrapping_sub(b)),
                    TokenKind::Mul => Object::Int(a.wrapping_mul(b)),
                    Quo => {
                        if b == 0 {
                            self.error_at(pos, pkg, "division by zero")
                        } else {
                            Object::Int(a.wrapping_div(b))
                        }
                    }
                    Rem => {
                        if b == 0 {
                            self.error_at(pos, pkg, "division by zero")
                        } else {
                            Object::Int(a.wrapping_rem(b))
                        }
                    }
                    And => Object::Int(a & b),
                    Or => Object::Int(a | b),
                    Xor => Object::Int(a ^ b),
                    AndNot => Object::Int(a & !b),
                    Shl => match u32::try_from(b) {
                        Ok(s) if s < 64 => Object::Int(a.wrapping_shl(s)),
                        _ => Object::typed_placeholder("shift", FieldType::named("int")),
                    },
                    Shr => match u32::try_from(b) {
                        Ok(s) if s < 64 => Object::Int(a.wrapping_shr(s)),
                        _ => Object::typed_placeholder("shift", FieldType::named("int")),
                    },
                    Eql => Object::Bool(a == b),
                    Neq => Object::Bool(a != b),
                    Lss => Object::Bool(a < b),
                    Leq => Object::Bool(a <= b),
                    Gtr => Object::Bool(a > b),
                    Geq => Object::Bool(a >= b),
                    _ => self.error_at(pos, pkg, format!("invalid integer operator '{op}'")),
                }
            }
            (Object::Float(_) | Object::Int(_), Object::Float(_) | Object::Int(_)) => {
                let a = as_float(&lv).expect("numeric checked");
                let b = as_float(&rv).expect("numeric checked");
                match op {
                    Add => Object::Float(a + b),
                    Sub => Object::Float(a - b),
                    TokenKind::Mul => Object::Float(a * b),
                    Quo => {
                        if b == 0.0 {
                            self.error_at(pos, pkg, "division by zero")
                        } else {
                            Object::Float(a / b)
                        }
                    }
                    Eql => Object::Bool(a == b),
                    Neq => Object::Bool(a != b),
                    Lss => Object::Bool(a < b),
                    Leq => Object::Bool(a <= b),
                    Gtr => Object::Bool(a > b),
                    Geq => Object::Bool(a >= b),
                    _ => self.error_at(pos, pkg, format!("invalid float operator '{op}'")),
                }
            }
            (Object::Str(a), Object::Str(b)) => match op {
                Add => Object::Str(format!("{a}{b}")),
                Eql => Object::Bool(a == b),
                Neq => Object::Bool(a != b),
                Lss => Object::Bool(a < b),
                Leq => Object::Bool(a <= b),
                Gtr => Object::Bool(a > b),
                Geq => Object::Bool(a >= b),
                _ => self.error_at(pos, pkg, format!("invalid string operator '{op}'")),
            },
            (Object::Bool(a), Object::Bool(b)) => match op {
                Eql => Object::Bool(a == b),
                Neq => Object::Bool(a != b),
                _ => self.error_at(pos, pkg, format!("invalid boolean operator '{op}'")),
            },
            (Object::Nil, Object::Nil) => match op {
                Eql => Object::Bool(true),
                Neq => Object::Bool(false),
                _ => self.error_at(pos, pkg, format!("invalid operator '{op}' on nil")),
            },
            // One side symbolic: a typed placeholder, except that a concrete
            // type mismatch between primitives is a real error.
            _ => {
                if let (Some(lk), Some(rk)) = (primitive_kind(&lv), primitive_kind(&rv)) {
                    if lk != rk {
                        return self.error_at(
                            pos,
                            pkg,
                            format!("invalid operation: mismatched types {lk} and {rk}"),
                        );
                    }
                }
                if matches!(op, Eql | Neq | Lss | Leq | Gtr | Geq) {
                    return Object::typed_placeholder(
                        "symbolic comparison",
                        FieldType::named("bool"),
                    );
                }
                // Division by a symbolic zero stays symbolic.
                let typ = self
                    .dynamic_type(&lv)
                    .or_else(|| self.dynamic_type(&rv));
                self.tracer.on_placeholder("symbolic arithmetic");
                match typ {
                    Some(t) => Object::typed_placeholder("symbolic arithmetic", t),
                    None => Object::placeholder("symbolic arithmetic"),
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Indexing and instantiation
    // ------------------------------------------------------------------

    fn eval_index(
        &mut self,
        x: &Expr,
        indices: &[Expr],
        pos: Pos,
        env: EnvId,
        pkg: PkgId,
    ) -> Object {
        let base = self.eval_expr(x, env, pkg);
        if base.is_signal() {
            return base;
        }
        let value = self.value_of(&base);

        // Generic instantiation: `F[int]`, `List[string]`.
        match &value {
            Object::Func(id) => {
                let has_params = self.funcs[id.index()]
                    .info
                    .as_ref()
                    .is_some_and(|i| !i.type_params.is_empty())
                    || !self.funcs[id.index()].sig.type_params.is_empty();
                if has_params {
                    let type_args = indices
                        .iter()
                        .map(|i| self.field_type_of_expr(i, pkg))
                        .collect();
                    return Object::Instantiated(Box::new(crate::object::InstantiatedData {
                        func: *id,
                        type_args,
                    }));
                }
            }
            Object::Type(_) => {
                // Instantiated generic type: keep the base type.
                return value;
            }
            _ => {}
        }

        for index in indices {
            let r = self.eval_expr(index, env, pkg);
            if r.is_signal() {
                return r;
            }
        }

        match value {
            Object::Slice(data) => match data.elem {
                Some(t) => Object::typed_placeholder("element access", t),
                None => Object::placeholder("element access"),
            },
            Object::Map(data) => match data.value {
                Some(t) => Object::typed_placeholder("map access", t),
                None => Object::placeholder("map access"),
            },
            Object::Str(_) => Object::typed_placeholder("string index", FieldType::named("rune")),
            other => match self.dynamic_type(&other) {
                Some(FieldType::Slice(elem) | FieldType::Array { elem, .. }) => {
                    Object::typed_placeholder("element access", *elem)
                }
                Some(FieldType::Map { value, .. }) => {
                    Object::typed_placeholder("map access", *value)
                }
                Some(FieldType::Named { name, .. }) if name == "string" => {
                    Object::typed_placeholder("string index", FieldType::named("rune"))
                }
                _ => {
                    let _ = pos;
                    Object::placeholder("element access")
                }
            },
        }
    }

}

/// Rune operands widen to ints so character arithmetic and comparisons fold.
fn widen_rune(value: Object, other: &Object) -> Object {
    match (&value, other) {
        (Object::Rune(c), Object::Int(_) | Object::Rune(_)) => {
            Object::Int(i64::from(u32::from(*c)))
        }
        _ => value,
    }
}

fn as_float(value: &Object) -> Option<f64> {
    match value {
        Object::Int(n) => Some(*n as f64),
        Object::Float(f) => Some(*f),
        _ => None,
    }
}

/// Primitive kind name for concrete type-mismatch reporting; `None` for
/// anything symbolic or composite.
fn primitive_kind(value: &Object) -> Option<&'static str> {
    match value {
        Object::Bool(_) => Some("bool"),
        Object::Int(_) | Object::Rune(_) => Some("int"),
        Object::Float(_) => Some("float64"),
        Object::Str(_) => Some("string"),
        _ => None,
    }
}

fn expr_name(expr: &Expr) -> &'static str {
    match expr {
        Expr::Ident(_) => "ident",
        Expr::BasicLit { .. } => "basic-lit",
        Expr::CompositeLit { .. } => "composite-lit",
        Expr::FuncLit { .. } => "func-lit",
        Expr::Paren(_) => "paren",
        Expr::Selector { .. } => "selector",
        Expr::Index { .. } => "index",
        Expr::SliceExpr { .. } => "slice-expr",
        Expr::TypeAssert { .. } => "type-assert",
        Expr::Call { .. } => "call",
        Expr::Star { .. } => "star",
        Expr::Unary { .. } => "unary",
        Expr::Binary { .. } => "binary",
        Expr::KeyValue { .. } => "key-value",
        Expr::ArrayType { .. } => "array-type",
        Expr::Ellipsis { .. } => "ellipsis",
        Expr::StructType { .. } => "struct-type",
        Expr::FuncType { .. } => "func-type",
        Expr::InterfaceType { .. } => "interface-type",
        Expr::MapType { .. } => "map-type",
        Expr::ChanType { .. } => "chan-type",
    }
}
