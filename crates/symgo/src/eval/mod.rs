//! Statement evaluation and the path-insensitive branch merger.
//!
//! Control flow is evaluated for *reach*, not for truth: both arms of a
//! conditional run, loop bodies run once symbolically, and assignments made
//! in diverging arms merge by union of possible types while preserving
//! variable identity. Signals (`return`, `break`, `continue`, errors)
//! propagate out of blocks without further side effects.

pub(crate) mod call;
pub(crate) mod expr;
pub(crate) mod lookup;

use ahash::AHashMap;
use indexmap::IndexMap;
use symgo_scan::{
    ast::{Block, CaseClause, Decl, Expr, Stmt, ValueSpec},
    token::TokenKind,
    Pos,
};

use crate::{
    interp::Interpreter,
    object::{EnvId, ErrorKind, Object, PkgId, PlaceholderData, VarId},
};

/// Accumulated state of a multi-arm merge (if/else, switch clauses).
#[derive(Default)]
pub(crate) struct ArmMerge {
    /// Value each touched variable held before the first arm.
    pre: IndexMap<VarId, Object>,
    /// Final value per arm, per variable touched in that arm.
    finals: Vec<AHashMap<VarId, Object>>,
}

impl Interpreter {
    pub(crate) fn eval_block(&mut self, block: &Block, env: EnvId, pkg: PkgId) -> Object {
        for stmt in &block.stmts {
            let result = self.eval_stmt(stmt, env, pkg);
            if result.is_signal() {
                return result;
            }
        }
        Object::Nil
    }

    pub(crate) fn eval_stmt(&mut self, stmt: &Stmt, env: EnvId, pkg: PkgId) -> Object {
        if self.in_defer == 0 && self.cancel.is_cancelled() {
            return self.make_error(
                ErrorKind::Cancelled,
                stmt.pos(),
                pkg,
                "evaluation cancelled",
                None,
            );
        }
        self.tracer.on_visit(stmt_name(stmt), stmt.pos());
        match stmt {
            Stmt::Empty => Object::Nil,
            Stmt::Decl(decl) => self.eval_decl(decl, env, pkg),
            Stmt::Expr(expr) => {
                let value = self.eval_expr(expr, env, pkg);
                if value.is_signal() {
                    value
                } else {
                    Object::Nil
                }
            }
            Stmt::Labeled { label, stmt } => match stmt.as_ref() {
                Stmt::For { .. } | Stmt::Range { .. } | Stmt::Switch { .. } => {
                    self.eval_loop_like(stmt, env, pkg, Some(label.name.as_str()))
                }
                other => self.eval_stmt(other, env, pkg),
            },
            Stmt::Send { chan, value, pos: _ } => {
                let c = self.eval_expr(chan, env, pkg);
                if c.is_signal() {
                    return c;
                }
                let v = self.eval_expr(value, env, pkg);
                if v.is_signal() {
                    return v;
                }
                Object::Nil
            }
            Stmt::IncDec { x, op, pos } => {
                let delta = if *op == TokenKind::Inc {
                    TokenKind::Add
                } else {
                    TokenKind::Sub
                };
                let current = self.eval_expr(x, env, pkg);
                if current.is_signal() {
                    return current;
                }
                let lv = self.value_of(&current);
                let next = self.eval_binop(delta, lv, Object::Int(1), *pos, pkg);
                if next.is_signal() {
                    return next;
                }
                self.assign_to(x, next, false, env, pkg)
            }
            Stmt::Assign { lhs, rhs, op, pos } => self.eval_assign(lhs, rhs, *op, *pos, env, pkg),
            Stmt::Go { call, .. } => {
                // The callee is reached, synchronously, exactly once; its
                // signals stop at the goroutine boundary.
                let result = self.eval_expr(call, env, pkg);
                match result {
                    Object::Error(err)
                        if matches!(err.kind, ErrorKind::Cancelled | ErrorKind::Budget) =>
                    {
                        Object::Error(err)
                    }
                    _ => Object::Nil,
                }
            }
            Stmt::Defer { call, pos } => self.eval_defer(call, *pos, env, pkg),
            Stmt::Return { results, pos: _ } => {
                let mut values = Vec::with_capacity(results.len());
                for expr in results {
                    let raw = self.eval_expr(expr, env, pkg);
                    if raw.is_signal() {
                        return raw;
                    }
                    values.push(self.value_of(&raw));
                }
                let inner = match values.len() {
                    0 => Object::Nil,
                    1 => values.pop().expect("len checked"),
                    _ => Object::Multi(values),
                };
                Object::Return(Box::new(inner))
            }
            Stmt::Branch { kind, label, pos } => match kind {
                TokenKind::Break => Object::Break(label.as_ref().map(|l| l.name.clone())),
                TokenKind::Continue => Object::Continue(label.as_ref().map(|l| l.name.clone())),
                TokenKind::Fallthrough => Object::Fallthrough,
                _ => {
                    // `goto` is outside the modeled subset; the label target
                    // is in the same function and gets reached anyway.
                    log::debug!("goto treated as no-op");
                    let _ = pos;
                    Object::Nil
                }
            },
            Stmt::Block(block) => {
                let inner = self.envs.push(Some(env));
                self.eval_block(block, inner, pkg)
            }
            Stmt::If { .. } => self.eval_if(stmt, env, pkg),
            Stmt::Switch { .. } | Stmt::For { .. } | Stmt::Range { .. } => {
                self.eval_loop_like(stmt, env, pkg, None)
            }
            Stmt::TypeSwitch { .. } => self.eval_type_switch(stmt, env, pkg),
            Stmt::Select { clauses, .. } => {
                // Every communication clause is reachable; evaluate each once.
                for clause in clauses {
                    let scope = self.envs.push(Some(env));
                    if let Some(comm) = &clause.comm {
                        let r = self.eval_stmt(comm, scope, pkg);
                        if is_hard_error(&r) {
                            return r;
                        }
                    }
                    for stmt in &clause.body {
                        let r = self.eval_stmt(stmt, scope, pkg);
                        if is_hard_error(&r) {
                            return r;
                        }
                        if r.is_signal() {
                            break;
                        }
                    }
                }
                Object::Nil
            }
        }
    }

    // ------------------------------------------------------------------
    // Declarations in statement position
    // ------------------------------------------------------------------

    fn eval_decl(&mut self, decl: &Decl, env: EnvId, pkg: PkgId) -> Object {
        match decl {
            Decl::Var(specs) => {
                for spec in specs {
                    let r = self.eval_var_spec(spec, env, pkg);
                    if r.is_signal() {
                        return r;
                    }
                }
                Object::Nil
            }
            Decl::Const(specs) => {
                for spec in specs {
                    let scope = self.envs.push(Some(env));
                    let iota = i64::try_from(spec.group_index).unwrap_or(i64::MAX);
                    self.envs.set_local(scope, "iota", Object::Int(iota));
                    for (i, name) in spec.names.iter().enumerate() {
                        let value = match spec.values.get(i) {
                            Some(expr) => {
                                let raw = self.eval_expr(expr, scope, pkg);
                                if raw.is_signal() {
                                    return raw;
                                }
                                self.value_of(&raw)
                            }
                            None => Object::placeholder("constant"),
                        };
                        if !name.is_blank() {
                            self.envs.set_local(env, &name.name, value);
                        }
                    }
                }
                Object::Nil
            }
            Decl::Type(specs) => {
                for spec in specs {
                    let underlying = self.field_type_of_expr(&spec.typ, pkg);
                    let info = symgo_scan::TypeInfo {
                        name: spec.name.name.clone(),
                        pkg_path: self.pkgs[pkg.index()].path.clone(),
                        kind: symgo_scan::TypeKind::Named,
                        struct_info: None,
                        interface_info: None,
                        underlying: Some(underlying),
                        type_params: Vec::new(),
                        unresolved: false,
                        pos: spec.pos,
                    };
                    self.envs
                        .set_local(env, &spec.name.name, Object::Type(std::rc::Rc::new(info)));
                }
                Object::Nil
            }
            Decl::Import(_) | Decl::Func(_) => Object::Nil,
        }
    }

    fn eval_var_spec(&mut self, spec: &ValueSpec, env: EnvId, pkg: PkgId) -> Object {
        let declared = spec.typ.as_ref().map(|t| self.field_type_of_expr(t, pkg));
        // `var a, b = f()`: one initializer covering several names.
        if spec.values.len() == 1 && spec.names.len() > 1 {
            let raw = self.eval_expr(&spec.values[0], env, pkg);
            if raw.is_signal() {
                return raw;
            }
            let value = self.value_of(&raw);
            let parts = self.split_multi(value, spec.names.len());
            for (name, part) in spec.names.iter().zip(parts) {
                if name.is_blank() {
                    continue;
                }
                let id = self.alloc_var(&name.name, part, declared.clone());
                self.envs.set_local(env, &name.name, Object::Var(id));
            }
            return Object::Nil;
        }
        for (i, name) in spec.names.iter().enumerate() {
            let value = match spec.values.get(i) {
                Some(expr) => {
                    let raw = self.eval_expr(expr, env, pkg);
                    if raw.is_signal() {
                        return raw;
                    }
                    self.value_of(&raw)
                }
                None => match &declared {
                    Some(t) => Object::typed_placeholder("zero value", t.clone()),
                    None => Object::placeholder("uninitialized"),
                },
            };
            if name.is_blank() {
                continue;
            }
            let id = self.alloc_var(&name.name, value, declared.clone());
            self.envs.set_local(env, &name.name, Object::Var(id));
        }
        Object::Nil
    }

    /// Splits a value across `n` assignment targets, expanding
    /// [`Object::Multi`] and padding with placeholders.
    pub(crate) fn split_multi(&mut self, value: Object, n: usize) -> Vec<Object> {
        match value {
            Object::Multi(values) => {
                let mut out = values;
                out.resize_with(n, || Object::placeholder("missing value"));
                out
            }
            single if n == 1 => vec![single],
            single => {
                let mut out = vec![single];
                out.resize_with(n, || Object::placeholder("missing value"));
                out
            }
        }
    }

    // ------------------------------------------------------------------
    // Assignment
    // ------------------------------------------------------------------

    fn eval_assign(
        &mut self,
        lhs: &[Expr],
        rhs: &[Expr],
        op: TokenKind,
        pos: Pos,
        env: EnvId,
        pkg: PkgId,
    ) -> Object {
        if let Some(binop) = op.augmented_op() {
            let current = self.eval_expr(&lhs[0], env, pkg);
            if current.is_signal() {
                return current;
            }
            let lv = self.value_of(&current);
            let raw = self.eval_expr(&rhs[0], env, pkg);
            if raw.is_signal() {
                return raw;
            }
            let rv = self.value_of(&raw);
            let next = self.eval_binop(binop, lv, rv, pos, pkg);
            if next.is_signal() {
                return next;
            }
            return self.assign_to(&lhs[0], next, false, env, pkg);
        }

        let define = op == TokenKind::Define;
        let values: Vec<Object> = if rhs.len() == 1 && lhs.len() > 1 {
            let raw = self.eval_expr(&rhs[0], env, pkg);
            if raw.is_signal() {
                return raw;
            }
            let value = self.value_of(&raw);
            match value {
                Object::Multi(_) => self.split_multi(value, lhs.len()),
                // Comma-ok forms: index, type assertion, channel receive.
                single if lhs.len() == 2 => {
                    vec![
                        single,
                        Object::typed_placeholder("comma-ok", symgo_scan::FieldType::named("bool")),
                    ]
                }
                single => self.split_multi(single, lhs.len()),
            }
        } else {
            let mut out = Vec::with_capacity(rhs.len());
            for expr in rhs {
                let raw = self.eval_expr(expr, env, pkg);
                if raw.is_signal() {
                    return raw;
                }
                out.push(self.value_of(&raw));
            }
            out
        };

        for (target, value) in lhs.iter().zip(values) {
            let r = self.assign_to(target, value, define, env, pkg);
            if r.is_signal() {
                return r;
            }
        }
        Object::Nil
    }

    /// Stores `value` into an assignment target. Returns a signal on
    /// failure, `Nil` otherwise.
    pub(crate) fn assign_to(
        &mut self,
        target: &Expr,
        value: Object,
        define: bool,
        env: EnvId,
        pkg: PkgId,
    ) -> Object {
        match target.unparen() {
            Expr::Ident(id) if id.is_blank() => Object::Nil,
            Expr::Ident(id) => {
                if define {
                    if let Some(Object::Var(existing)) = self
                        .envs
                        .get(env, &id.name)
                        .filter(|_| self.envs.contains_local(env, &id.name))
                        .cloned()
                    {
                        self.rebind_var(existing, value);
                        return Object::Nil;
                    }
                    let var = self.alloc_var(&id.name, value, None);
                    self.envs.set_local(env, &id.name, Object::Var(var));
                    return Object::Nil;
                }
                match self.envs.get(env, &id.name).cloned() {
                    Some(Object::Var(existing)) => {
                        self.rebind_var(existing, value);
                        Object::Nil
                    }
                    Some(_) => {
                        self.envs.set(env, &id.name, value);
                        Object::Nil
                    }
                    None => {
                        if self.pkgs[pkg.index()].in_policy {
                            self.error_at(
                                id.pos,
                                pkg,
                                format!("undefined: {} in assignment", id.name),
                            )
                        } else {
                            Object::Nil
                        }
                    }
                }
            }
            Expr::Selector { x, sel } => {
                let base = self.eval_expr(x, env, pkg);
                if base.is_signal() {
                    return base;
                }
                let resolved = self.value_of(&base);
                match self.deref_to_instance(&resolved) {
                    Some(instance) => {
                        self.instances[instance.index()]
                            .fields
                            .insert(sel.name.clone(), value);
                        Object::Nil
                    }
                    // Writes through symbolic receivers are absorbed.
                    None => Object::Nil,
                }
            }
            Expr::Star { x, .. } => {
                let raw = self.eval_expr(x, env, pkg);
                if raw.is_signal() {
                    return raw;
                }
                let pointer = self.value_of(&raw);
                if let Object::Pointer(data) = pointer {
                    if let Object::Var(id) = data.pointee {
                        self.rebind_var(id, value);
                    }
                }
                Object::Nil
            }
            Expr::Index { x, indices, .. } => {
                let r = self.eval_expr(x, env, pkg);
                if r.is_signal() {
                    return r;
                }
                for index in indices {
                    let r = self.eval_expr(index, env, pkg);
                    if r.is_signal() {
                        return r;
                    }
                }
                // Element stores stay symbolic.
                Object::Nil
            }
            other => {
                let r = self.eval_expr(other, env, pkg);
                if r.is_signal() {
                    return r;
                }
                Object::Nil
            }
        }
    }

    /// Follows variables and pointers down to an instance id, if the value
    /// is concretely instance-backed.
    pub(crate) fn deref_to_instance(&mut self, value: &Object) -> Option<crate::object::InstanceId> {
        match value {
            Object::Instance(id) => Some(*id),
            Object::Pointer(data) => {
                let pointee = self.value_of(&data.pointee);
                self.deref_to_instance(&pointee)
            }
            Object::Var(id) => {
                let inner = self.value_of(&Object::Var(*id));
                self.deref_to_instance(&inner)
            }
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Branching
    // ------------------------------------------------------------------

    pub(crate) fn begin_arm(&mut self) {
        self.branch_logs.push(Vec::new());
    }

    pub(crate) fn end_arm(&mut self, merge: &mut ArmMerge) {
        let log = self.branch_logs.pop().unwrap_or_default();
        let mut finals = AHashMap::new();
        for (id, pre) in log {
            finals.insert(id, self.vars[id.index()].value.clone());
            self.restore_var(id, pre.clone());
            merge.pre.entry(id).or_insert(pre);
        }
        merge.finals.push(finals);
    }

    /// Applies the path-insensitive merge: variables assigned identical
    /// concrete values in every path keep them; anything else collapses to a
    /// typed placeholder while `possible_types` keeps the union.
    pub(crate) fn merge_arms(&mut self, merge: ArmMerge, exhaustive: bool) {
        for (id, pre) in merge.pre {
            let mut candidates: Vec<Object> = Vec::new();
            let mut assigned_everywhere = true;
            for finals in &merge.finals {
                match finals.get(&id) {
                    Some(v) => candidates.push(v.clone()),
                    None => assigned_everywhere = false,
                }
            }
            if !exhaustive || !assigned_everywhere {
                candidates.push(pre);
            }
            let agreed = candidates
                .windows(2)
                .all(|pair| pair[0].same_concrete(&pair[1]));
            let value = if agreed {
                candidates.swap_remove(0)
            } else {
                let declared = self.vars[id.index()].declared.clone();
                let typ = declared.or_else(|| {
                    candidates.iter().find_map(|c| self.dynamic_type(c))
                });
                let possible = candidates
                    .iter()
                    .filter_map(|c| self.dynamic_type(c))
                    .collect();
                Object::Placeholder(Box::new(PlaceholderData {
                    reason: "branch merge".to_owned(),
                    typ,
                    func: None,
                    pkg_path: None,
                    iface: None,
                    possible_types: possible,
                }))
            };
            self.rebind_var(id, value);
        }
    }

    fn eval_if(&mut self, stmt: &Stmt, env: EnvId, pkg: PkgId) -> Object {
        let Stmt::If {
            init,
            cond,
            then,
            els,
            ..
        } = stmt
        else {
            unreachable!("eval_if called on non-if");
        };
        let scope = self.envs.push(Some(env));
        if let Some(init) = init {
            let r = self.eval_stmt(init, scope, pkg);
            if r.is_signal() {
                return r;
            }
        }
        let cond_value = self.eval_expr(cond, scope, pkg);
        if cond_value.is_signal() {
            return cond_value;
        }

        let mut merge = ArmMerge::default();
        let mut results = Vec::new();

        self.begin_arm();
        let then_env = self.envs.push(Some(scope));
        let r = self.eval_block(then, then_env, pkg);
        self.end_arm(&mut merge);
        if is_hard_error(&r) {
            self.merge_arms(merge, false);
            return r;
        }
        results.push(r);

        if let Some(els) = els {
            self.begin_arm();
            let else_env = self.envs.push(Some(scope));
            let r = self.eval_stmt(els, else_env, pkg);
            self.end_arm(&mut merge);
            if is_hard_error(&r) {
                self.merge_arms(merge, false);
                return r;
            }
            results.push(r);
        }

        let exhaustive = els.is_some();
        self.merge_arms(merge, exhaustive);

        if exhaustive && results.iter().all(Object::is_signal) {
            return results.swap_remove(0);
        }
        Object::Nil
    }

    /// `switch`, `for` and `range`, with an optional statement label.
    pub(crate) fn eval_loop_like(
        &mut self,
        stmt: &Stmt,
        env: EnvId,
        pkg: PkgId,
        label: Option<&str>,
    ) -> Object {
        match stmt {
            Stmt::Switch {
                init,
                tag,
                clauses,
                ..
            } => self.eval_switch(init.as_deref(), tag.as_ref(), clauses, env, pkg, label),
            Stmt::For {
                init,
                cond,
                post,
                body,
                ..
            } => {
                let scope = self.envs.push(Some(env));
                if let Some(init) = init {
                    let r = self.eval_stmt(init, scope, pkg);
                    if r.is_signal() {
                        return r;
                    }
                }
                if let Some(cond) = cond {
                    let r = self.eval_expr(cond, scope, pkg);
                    if r.is_signal() {
                        return r;
                    }
                }
                let body_env = self.envs.push(Some(scope));
                let r = self.eval_block(body, body_env, pkg);
                if let Some(out) = loop_body_signal(r, label) {
                    return out;
                }
                if let Some(post) = post {
                    let r = self.eval_stmt(post, scope, pkg);
                    if r.is_signal() {
                        return r;
                    }
                }
                Object::Nil
            }
            Stmt::Range {
                key,
                value,
                define,
                x,
                body,
                ..
            } => self.eval_range(
                key.as_ref(),
                value.as_ref(),
                *define,
                x,
                body,
                env,
                pkg,
                label,
            ),
            other => self.eval_stmt(other, env, pkg),
        }
    }

    fn eval_switch(
        &mut self,
        init: Option<&Stmt>,
        tag: Option<&Expr>,
        clauses: &[CaseClause],
        env: EnvId,
        pkg: PkgId,
        label: Option<&str>,
    ) -> Object {
        let scope = self.envs.push(Some(env));
        if let Some(init) = init {
            let r = self.eval_stmt(init, scope, pkg);
            if r.is_signal() {
                return r;
            }
        }
        if let Some(tag) = tag {
            let r = self.eval_expr(tag, scope, pkg);
            if r.is_signal() {
                return r;
            }
        }

        let mut merge = ArmMerge::default();
        let mut results = Vec::new();
        let has_default = clauses.iter().any(|c| c.exprs.is_empty());

        for (idx, clause) in clauses.iter().enumerate() {
            self.begin_arm();
            let clause_env = self.envs.push(Some(scope));
            for case in &clause.exprs {
                let r = self.eval_expr(case, clause_env, pkg);
                if is_hard_error(&r) {
                    self.end_arm(&mut merge);
                    self.merge_arms(merge, false);
                    return r;
                }
            }
            let mut r = self.eval_clause_body(&clause.body, clause_env, pkg);
            // `fallthrough` runs the next clause body in the same arm.
            let mut next = idx + 1;
            while matches!(r, Object::Fallthrough) && next < clauses.len() {
                r = self.eval_clause_body(&clauses[next].body, clause_env, pkg);
                next += 1;
            }
            self.end_arm(&mut merge);
            if is_hard_error(&r) {
                self.merge_arms(merge, false);
                return r;
            }
            results.push(consume_break(r, label));
        }
        self.merge_arms(merge, has_default);

        if has_default && !results.is_empty() && results.iter().all(Object::is_signal) {
            return results.swap_remove(0);
        }
        Object::Nil
    }

    fn eval_clause_body(&mut self, body: &[Stmt], env: EnvId, pkg: PkgId) -> Object {
        for stmt in body {
            let r = self.eval_stmt(stmt, env, pkg);
            if r.is_signal() {
                return r;
            }
        }
        Object::Nil
    }

    fn eval_type_switch(&mut self, stmt: &Stmt, env: EnvId, pkg: PkgId) -> Object {
        let Stmt::TypeSwitch {
            init,
            binding,
            subject,
            clauses,
            ..
        } = stmt
        else {
            unreachable!("eval_type_switch called on non-type-switch");
        };
        let scope = self.envs.push(Some(env));
        if let Some(init) = init {
            let r = self.eval_stmt(init, scope, pkg);
            if r.is_signal() {
                return r;
            }
        }
        let subject_obj = self.eval_expr(subject, scope, pkg);
        if subject_obj.is_signal() {
            return subject_obj;
        }
        let subject_value = self.value_of(&subject_obj);

        let mut merge = ArmMerge::default();
        for clause in clauses {
            self.begin_arm();
            let clause_env = self.envs.push(Some(scope));
            // A single-type case narrows the binding; multi-type and default
            // clauses see the subject unchanged.
            let narrowed = if clause.exprs.len() == 1 && !is_nil_ident(&clause.exprs[0]) {
                let case_type = self.field_type_of_expr(&clause.exprs[0], pkg);
                if let Object::Var(id) = &subject_obj {
                    self.vars[id.index()].possible_types.insert(case_type.clone());
                }
                Some(case_type)
            } else {
                for case in &clause.exprs {
                    if is_nil_ident(case) {
                        continue;
                    }
                    let case_type = self.field_type_of_expr(case, pkg);
                    if let Object::Var(id) = &subject_obj {
                        self.vars[id.index()].possible_types.insert(case_type);
                    }
                }
                None
            };
            if let Some(binding) = binding {
                let value = match &narrowed {
                    Some(t) => Object::typed_placeholder("type switch case", t.clone()),
                    None => subject_value.clone(),
                };
                let id = self.alloc_var(&binding.name, value, narrowed);
                self.envs.set_local(clause_env, &binding.name, Object::Var(id));
            }
            let r = self.eval_clause_body(&clause.body, clause_env, pkg);
            self.end_arm(&mut merge);
            if is_hard_error(&r) {
                self.merge_arms(merge, false);
                return r;
            }
        }
        self.merge_arms(merge, false);
        Object::Nil
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_range(
        &mut self,
        key: Option<&Expr>,
        value: Option<&Expr>,
        define: bool,
        x: &Expr,
        body: &Block,
        env: EnvId,
        pkg: PkgId,
        label: Option<&str>,
    ) -> Object {
        let subject = self.eval_expr(x, env, pkg);
        if subject.is_signal() {
            return subject;
        }
        let subject_value = self.value_of(&subject);

        // One symbolic element per iteration shape.
        let (key_obj, value_obj) = match &subject_value {
            Object::Slice(data) => (
                Object::typed_placeholder("range index", symgo_scan::FieldType::named("int")),
                match &data.elem {
                    Some(t) => Object::typed_placeholder("range element", t.clone()),
                    None => Object::placeholder("range element"),
                },
            ),
            Object::Map(data) => (
                match &data.key {
                    Some(t) => Object::typed_placeholder("range key", t.clone()),
                    None => Object::placeholder("range key"),
                },
                match &data.value {
                    Some(t) => Object::typed_placeholder("range value", t.clone()),
                    None => Object::placeholder("range value"),
                },
            ),
            Object::Chan(data) => (
                match &data.elem {
                    Some(t) => Object::typed_placeholder("range element", t.clone()),
                    None => Object::placeholder("range element"),
                },
                Object::placeholder("range value"),
            ),
            Object::Str(_) => (
                Object::typed_placeholder("range index", symgo_scan::FieldType::named("int")),
                Object::typed_placeholder("range rune", symgo_scan::FieldType::named("rune")),
            ),
            Object::Int(_) => (
                Object::typed_placeholder("range index", symgo_scan::FieldType::named("int")),
                Object::placeholder("range value"),
            ),
            _ => (
                Object::placeholder("range key"),
                Object::placeholder("range value"),
            ),
        };

        let scope = self.envs.push(Some(env));
        for (target, obj) in [(key, key_obj), (value, value_obj)] {
            if let Some(target) = target {
                let r = self.assign_to(target, obj, define, scope, pkg);
                if r.is_signal() {
                    return r;
                }
            }
        }
        let body_env = self.envs.push(Some(scope));
        let r = self.eval_block(body, body_env, pkg);
        if let Some(out) = loop_body_signal(r, label) {
            return out;
        }
        Object::Nil
    }
}

/// Maps a loop body's result to the loop's own result: `break`/`continue`
/// addressed at this loop are consumed, everything else propagates.
fn loop_body_signal(result: Object, label: Option<&str>) -> Option<Object> {
    match result {
        Object::Break(l) | Object::Continue(l)
            if l.is_none() || l.as_deref() == label =>
        {
            None
        }
        Object::Break(l) => Some(Object::Break(l)),
        Object::Continue(l) => Some(Object::Continue(l)),
        r if r.is_signal() => Some(r),
        _ => None,
    }
}

/// `break` addressed at this switch is consumed.
fn consume_break(result: Object, label: Option<&str>) -> Object {
    match result {
        Object::Break(l) if l.is_none() || l.as_deref() == label => Object::Nil,
        other => other,
    }
}

/// Errors that must unwind immediately even mid-merge.
fn is_hard_error(obj: &Object) -> bool {
    match obj {
        Object::Error(err) => matches!(err.kind, ErrorKind::Cancelled | ErrorKind::Budget),
        _ => false,
    }
}

fn is_nil_ident(expr: &Expr) -> bool {
    matches!(expr.unparen(), Expr::Ident(id) if id.name == "nil")
}

fn stmt_name(stmt: &Stmt) -> &'static str {
    match stmt {
        Stmt::Decl(_) => "decl",
        Stmt::Empty => "empty",
        Stmt::Labeled { .. } => "labeled",
        Stmt::Expr(_) => "expr-stmt",
        Stmt::Send { .. } => "send",
        Stmt::IncDec { .. } => "inc-dec",
        Stmt::Assign { .. } => "assign",
        Stmt::Go { .. } => "go",
        Stmt::Defer { .. } => "defer",
        Stmt::Return { .. } => "return",
        Stmt::Branch { .. } => "branch",
        Stmt::Block(_) => "block",
        Stmt::If { .. } => "if",
        Stmt::Switch { .. } => "switch",
        Stmt::TypeSwitch { .. } => "type-switch",
        Stmt::Select { .. } => "select",
        Stmt::For { .. } => "for",
        Stmt::Range { .. } => "range",
    }
}
