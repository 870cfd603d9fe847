//! Function application: call resolution order, argument binding,
//! variadics, deferred thunks, panic/recover, recursion capping and
//! memoization.
//!
//! Resolution order for a call: intrinsic objects first, then a specific
//! intrinsic registered for the callee's qualified name, then unresolved
//! targets (retried through the resolver), then instantiated generics, then
//! concrete functions, then placeholders with a known signature, which is
//! also where interface method calls are recorded for the finalizer.
//! Anything else is "not a function".

use std::rc::Rc;

use symgo_scan::{
    ast::{Block, Expr, FuncSig},
    FieldType, FunctionInfo, Pos, TypeKind,
};

use crate::{
    interp::{Frame, FuncData, Interpreter},
    object::{ArgVec, EnvId, ErrorKind, FuncId, Object, PkgId, PlaceholderData, SliceData},
    resolver::is_universe_type,
};

/// One parameter slot prepared for binding.
struct ParamSlot {
    name: Option<String>,
    typ: Option<FieldType>,
    variadic: bool,
}

impl Interpreter {
    // ------------------------------------------------------------------
    // Interning
    // ------------------------------------------------------------------

    /// Interns a declared function or method by its declaration position.
    /// Invariant: one declaration, one `FuncId`.
    pub(crate) fn intern_declared_func(&mut self, pkg: PkgId, info: &Rc<FunctionInfo>) -> FuncId {
        let env = self.pkgs[pkg.index()].env;
        let key = (pkg, info.pos, env);
        if let Some(id) = self.func_intern.get(&key) {
            return *id;
        }
        let id = FuncId::new(self.funcs.len());
        self.funcs.push(FuncData {
            name: Some(info.name.clone()),
            info: Some(Rc::clone(info)),
            sig: Rc::clone(&info.sig),
            body: info.body.clone(),
            env,
            pkg,
        });
        self.func_intern.insert(key, id);
        id
    }

    /// Interns a function literal. The captured environment participates in
    /// the key so distinct activations produce distinct closures while
    /// re-evaluating the same literal in one activation is stable.
    pub(crate) fn intern_func_literal(
        &mut self,
        pkg: PkgId,
        pos: Pos,
        env: EnvId,
        sig: Rc<FuncSig>,
        body: Rc<Block>,
    ) -> FuncId {
        let key = (pkg, pos, env);
        if let Some(id) = self.func_intern.get(&key) {
            return *id;
        }
        let id = FuncId::new(self.funcs.len());
        self.funcs.push(FuncData {
            name: None,
            info: None,
            sig,
            body: Some(body),
            env,
            pkg,
        });
        self.func_intern.insert(key, id);
        id
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    pub(crate) fn eval_call(
        &mut self,
        fun: &Expr,
        args: &[Expr],
        has_ellipsis: bool,
        pos: Pos,
        env: EnvId,
        pkg: PkgId,
    ) -> Object {
        let callee_raw = self.eval_expr(fun, env, pkg);
        if callee_raw.is_signal() {
            return callee_raw;
        }
        let callee = self.value_of(&callee_raw);

        let mut arg_values = ArgVec::with_capacity(args.len());
        for arg in args {
            let raw = self.eval_expr(arg, env, pkg);
            if raw.is_signal() {
                return raw;
            }
            arg_values.push(self.value_of(&raw));
        }
        // `f(g())` forwarding a multi-value call.
        if arg_values.len() == 1 {
            if let Object::Multi(values) = &arg_values[0] {
                arg_values = values.iter().cloned().collect();
            }
        }

        let result = self.apply_object(callee, arg_values, has_ellipsis, pos, pkg);
        // Give position-less errors (panics from intrinsics, mostly) the
        // call site.
        if let Object::Error(mut err) = result {
            if err.position.is_none() {
                err.position = self.pkgs[pkg.index()]
                    .info
                    .as_ref()
                    .and_then(|info| info.fset.position(pos));
            }
            if err.call_stack.is_empty() {
                err.call_stack = self.format_stack();
            }
            return Object::Error(err);
        }
        result
    }

    /// §4.5.3 call resolution over an evaluated callee.
    pub(crate) fn apply_object(
        &mut self,
        callee: Object,
        args: ArgVec,
        has_ellipsis: bool,
        pos: Pos,
        pkg: PkgId,
    ) -> Object {
        match callee {
            Object::Var(_) => {
                let inner = self.value_of(&callee);
                self.apply_object(inner, args, has_ellipsis, pos, pkg)
            }
            Object::Intrinsic(obj) => obj.invoke(self, &args),
            Object::Func(id) => {
                self.apply_function(id, None, args, None, has_ellipsis, pos, pkg)
            }
            Object::BoundMethod(data) => self.apply_function(
                data.func,
                Some(data.recv),
                args,
                None,
                has_ellipsis,
                pos,
                pkg,
            ),
            Object::Instantiated(data) => self.apply_function(
                data.func,
                None,
                args,
                Some(data.type_args),
                has_ellipsis,
                pos,
                pkg,
            ),
            Object::UnresolvedFunc(data) => {
                let key = format!("{}.{}", data.pkg_path, data.name);
                if let Some(intr) = self.intrinsics.get(&key).cloned() {
                    return intr.invoke(self, &args);
                }
                // Retry through the resolver; the package may have become
                // loadable since the stub was created.
                let target = self.resolve_pkg(&data.pkg_path);
                let resolved = {
                    let env = self.pkgs[target.index()].env;
                    self.envs.get(env, &data.name).cloned()
                };
                match resolved {
                    Some(obj) if !matches!(obj, Object::UnresolvedFunc(_)) => {
                        self.apply_object(obj, args, has_ellipsis, pos, pkg)
                    }
                    _ => {
                        self.tracer.on_placeholder("unresolved call");
                        Object::placeholder(format!("unresolved call to {key}"))
                    }
                }
            }
            Object::Placeholder(data) => self.apply_placeholder(*data, &args, pos, pkg),
            Object::Type(typ) => match args.into_iter().next() {
                Some(value) => self.convert(&typ, value),
                None => self.error_at(pos, pkg, "missing argument to conversion"),
            },
            other => self.error_at(
                pos,
                pkg,
                format!("not a function: {}", other.type_describe()),
            ),
        }
    }

    /// A call through a symbolic placeholder: fire the usage hook when the
    /// underlying signature is known, record interface method calls, and
    /// synthesize placeholders of the declared result types.
    fn apply_placeholder(
        &mut self,
        data: PlaceholderData,
        args: &[Object],
        pos: Pos,
        pkg: PkgId,
    ) -> Object {
        let _ = (pos, pkg);
        if let Some(info) = &data.func {
            if let Some(intr) = self.intrinsics.get(&info.qualified_name()).cloned() {
                return intr.invoke(self, args);
            }
            if let Some(iface) = &data.iface {
                self.record_iface_call(Rc::clone(&iface.iface), &iface.method);
            }
            let info = Rc::clone(info);
            let callee = Object::Placeholder(Box::new(data));
            self.observe_call(&callee, args);
            return self.synth_results(Some(&info), "call through placeholder");
        }
        // Calling a placeholder typed as a function type.
        if let Some(FieldType::Func { results, .. }) = &data.typ {
            return match results.len() {
                0 => Object::Nil,
                1 => Object::typed_placeholder("call through placeholder", results[0].clone()),
                _ => Object::Multi(
                    results
                        .iter()
                        .map(|t| Object::typed_placeholder("call through placeholder", t.clone()))
                        .collect(),
                ),
            };
        }
        self.tracer.on_placeholder("call through placeholder");
        Object::placeholder("call through placeholder")
    }

    /// Placeholders of a function's declared result types, qualified into
    /// the declaring package's namespace.
    pub(crate) fn synth_results(
        &mut self,
        info: Option<&Rc<FunctionInfo>>,
        reason: &str,
    ) -> Object {
        let Some(info) = info else {
            return Object::placeholder(reason);
        };
        let results: Vec<Object> = info
            .results
            .iter()
            .map(|r| {
                let qualified =
                    qualify_field_type(&r.field_type, &info.pkg_path, &info.type_params);
                Object::typed_placeholder(reason, qualified)
            })
            .collect();
        match results.len() {
            0 => Object::Nil,
            1 => results.into_iter().next().expect("len checked"),
            _ => Object::Multi(results),
        }
    }

    /// Applies a concrete function: frames, recursion capping, intrinsic
    /// dispatch, memoization, parameter binding, body, defers.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn apply_function(
        &mut self,
        id: FuncId,
        recv: Option<Object>,
        mut args: ArgVec,
        type_args: Option<Vec<FieldType>>,
        has_ellipsis: bool,
        pos: Pos,
        caller_pkg: PkgId,
    ) -> Object {
        self.frames_used += 1;
        if self.frames_used > self.limits.frame_budget {
            return self.make_error(
                ErrorKind::Budget,
                pos,
                caller_pkg,
                format!("frame budget exhausted ({})", self.limits.frame_budget),
                None,
            );
        }

        let func = self.funcs[id.index()].clone();
        let fingerprint = self.args_fingerprint(&args);
        if self.recursion_count(id, &fingerprint) >= self.limits.recursion_cap {
            log::debug!(
                "recursion capped at {} for {}",
                self.limits.recursion_cap,
                func.name.as_deref().unwrap_or("func literal"),
            );
            self.tracer.on_placeholder("recursion capped");
            return self.synth_results(func.info.as_ref(), "recursion capped");
        }

        // Usage observation fires for every resolved call, regardless of
        // intrinsics or memoization.
        let callee_obj = match &recv {
            Some(r) => Object::BoundMethod(Box::new(crate::object::BoundMethodData {
                recv: r.clone(),
                func: id,
            })),
            None => Object::Func(id),
        };
        self.observe_call(&callee_obj, &args);

        if let Some(info) = &func.info {
            if let Some(intr) = self.intrinsics.get(&info.qualified_name()).cloned() {
                return intr.invoke(self, &args);
            }
        }

        if self.memoize {
            if let Some(cached) = self.memo.get(&id) {
                return cached.clone();
            }
        }

        let name = func
            .name
            .clone()
            .unwrap_or_else(|| "func literal".to_owned());
        self.stack.push(Frame {
            name: name.clone(),
            pos,
            pkg: caller_pkg,
            fingerprint: Some((id, fingerprint)),
            defers: Vec::new(),
        });
        self.tracer.on_call(&name, self.stack.len());

        let fn_env = self.envs.push(Some(func.env));
        self.bind_receiver(&func, recv, fn_env);
        self.bind_type_params(&func, type_args.as_deref(), fn_env);
        self.bind_params(&func, &mut args, has_ellipsis, fn_env);

        let result = match &func.body {
            Some(body) => {
                let body = Rc::clone(body);
                self.eval_block(&body, fn_env, func.pkg)
            }
            None => self.synth_results(func.info.as_ref(), "body not available"),
        };

        let mut out = match result {
            Object::Return(inner) => *inner,
            err @ Object::Error(_) => err,
            // Fell off the end (or a stray break): zero values of the
            // declared results.
            _ => match &func.info {
                Some(info) if !info.results.is_empty() => {
                    self.synth_results(Some(info), "implicit return")
                }
                _ => Object::Nil,
            },
        };

        out = self.run_defers(out, &func);

        if self.memoize && !out.is_error() {
            self.memo.insert(id, out.clone());
        }
        self.stack.pop();
        self.tracer.on_return(self.stack.len());
        out
    }

    fn bind_receiver(&mut self, func: &FuncData, recv: Option<Object>, env: EnvId) {
        let Some(recv_obj) = recv else { return };
        let Some(info) = &func.info else { return };
        let Some(recv_info) = &info.recv else { return };
        let Some(recv_name) = &recv_info.name else {
            return;
        };
        if recv_name == "_" {
            return;
        }
        let declared = {
            let base = FieldType::qualified(&info.pkg_path, &recv_info.base_type);
            if recv_info.pointer {
                FieldType::Pointer(Box::new(base))
            } else {
                base
            }
        };
        let id = self.alloc_var(recv_name, recv_obj, Some(declared));
        self.envs.set_local(env, recv_name, Object::Var(id));
    }

    /// Type parameters resolve into a per-call scope; unknown arguments
    /// become symbolic type infos that downstream code treats as unresolved.
    fn bind_type_params(&mut self, func: &FuncData, type_args: Option<&[FieldType]>, env: EnvId) {
        let names: Vec<String> = match &func.info {
            Some(info) => info.type_params.clone(),
            None => func
                .sig
                .type_params
                .iter()
                .flat_map(|f| f.names.iter().map(|n| n.name.clone()))
                .collect(),
        };
        for (i, name) in names.iter().enumerate() {
            let obj = match type_args.and_then(|ta| ta.get(i)) {
                Some(ft) => match ft.base_name() {
                    Some((pkg_path, type_name)) => {
                        let (pkg_path, type_name) =
                            (pkg_path.clone(), type_name.to_owned());
                        let resolved =
                            self.resolve_named(pkg_path.as_deref(), &type_name, func.pkg);
                        Object::Type(resolved)
                    }
                    None => Object::Type(self.synthesize_type(ft)),
                },
                None => {
                    let mut info = symgo_scan::TypeInfo::unresolved("", name);
                    info.kind = TypeKind::Named;
                    Object::Type(Rc::new(info))
                }
            };
            self.envs.set_local(env, name, obj);
        }
    }

    fn bind_params(
        &mut self,
        func: &FuncData,
        args: &mut ArgVec,
        has_ellipsis: bool,
        env: EnvId,
    ) {
        let slots = self.param_slots(func);
        let n = slots.len();
        for (i, slot) in slots.into_iter().enumerate() {
            let value = if slot.variadic && i + 1 == n {
                let rest: Vec<Object> = if args.len() > i {
                    args.drain(i..).collect()
                } else {
                    Vec::new()
                };
                if has_ellipsis && rest.len() == 1 {
                    // `f(xs...)` forwards the slice unchanged.
                    rest.into_iter().next().expect("len checked")
                } else {
                    let elem = slot.typ.as_ref().map(|t| match t {
                        FieldType::Variadic(inner) => (**inner).clone(),
                        other => other.clone(),
                    });
                    Object::Slice(Box::new(SliceData {
                        elem,
                        len: i64::try_from(rest.len()).ok(),
                    }))
                }
            } else {
                args.get(i)
                    .cloned()
                    .unwrap_or_else(|| Object::placeholder("missing argument"))
            };
            let Some(name) = slot.name else { continue };
            if name == "_" {
                continue;
            }
            let declared = slot.typ.map(|t| match t {
                FieldType::Variadic(inner) => FieldType::Slice(inner),
                other => other,
            });
            let id = self.alloc_var(&name, value, declared);
            self.envs.set_local(env, &name, Object::Var(id));
        }
    }

    fn param_slots(&mut self, func: &FuncData) -> Vec<ParamSlot> {
        if let Some(info) = &func.info {
            return info
                .params
                .iter()
                .map(|p| ParamSlot {
                    name: p.name.clone(),
                    typ: Some(qualify_field_type(
                        &p.field_type,
                        &info.pkg_path,
                        &info.type_params,
                    )),
                    variadic: p.variadic,
                })
                .collect();
        }
        // Function literal: derive slots from the AST signature.
        let fields = func.sig.params.clone();
        let mut out = Vec::new();
        for field in &fields {
            let typ = field
                .typ
                .as_ref()
                .map(|t| self.field_type_of_expr(t, func.pkg));
            let variadic = matches!(typ, Some(FieldType::Variadic(_)));
            if field.names.is_empty() {
                out.push(ParamSlot {
                    name: None,
                    typ,
                    variadic,
                });
            } else {
                for name in &field.names {
                    out.push(ParamSlot {
                        name: Some(name.name.clone()),
                        typ: typ.clone(),
                        variadic,
                    });
                }
            }
        }
        out
    }

    // ------------------------------------------------------------------
    // Defers, panic, recover
    // ------------------------------------------------------------------

    /// Registers a deferred call on the current frame; callee and arguments
    /// are evaluated now, the application runs at function exit.
    pub(crate) fn eval_defer(&mut self, call: &Expr, pos: Pos, env: EnvId, pkg: PkgId) -> Object {
        if let Expr::Call { fun, args, .. } = call.unparen() {
            let raw = self.eval_expr(fun, env, pkg);
            if raw.is_signal() {
                return raw;
            }
            let callee = self.value_of(&raw);
            let mut values = ArgVec::with_capacity(args.len());
            for arg in args {
                let raw = self.eval_expr(arg, env, pkg);
                if raw.is_signal() {
                    return raw;
                }
                values.push(self.value_of(&raw));
            }
            if let Some(frame) = self.stack.last_mut() {
                frame.defers.push((callee, values, pos));
            }
            return Object::Nil;
        }
        let r = self.eval_expr(call, env, pkg);
        if r.is_signal() {
            r
        } else {
            Object::Nil
        }
    }

    /// Pops and runs the current frame's deferred thunks in LIFO order.
    /// A panic result is exposed to `recover()` while they run; if one of
    /// them recovers, the function returns placeholders instead of the
    /// panic. Cancellation is suppressed for the duration.
    fn run_defers(&mut self, result: Object, func: &FuncData) -> Object {
        let defers = match self.stack.last_mut() {
            Some(frame) => std::mem::take(&mut frame.defers),
            None => Vec::new(),
        };
        if defers.is_empty() {
            return result;
        }

        let saved_panic = self.panicking.take();
        let mut result = result;
        if let Object::Error(err) = &result {
            if err.kind == ErrorKind::Panic {
                self.panicking = Some(err.clone());
            }
        }

        self.in_defer += 1;
        for (callee, args, pos) in defers.into_iter().rev() {
            let r = self.apply_object(callee, args, false, pos, func.pkg);
            if let Object::Error(err) = r {
                log::debug!("deferred call failed: {err}");
            }
        }
        self.in_defer -= 1;

        let was_panicking = matches!(&result, Object::Error(err) if err.kind == ErrorKind::Panic);
        if was_panicking && self.panicking.is_none() {
            // A deferred recover() consumed the panic; the function returns
            // zero values.
            result = self.synth_results(func.info.as_ref(), "recovered");
        }
        self.panicking = saved_panic;
        result
    }

    // ------------------------------------------------------------------
    // Conversions
    // ------------------------------------------------------------------

    /// `T(x)`: concrete when the primitive kinds line up, a typed
    /// placeholder otherwise.
    pub(crate) fn convert(&mut self, target: &symgo_scan::TypeRef, value: Object) -> Object {
        let target_ft = if target.pkg_path.is_empty() {
            target
                .underlying
                .clone()
                .unwrap_or_else(|| FieldType::named(&target.name))
        } else {
            FieldType::qualified(&target.pkg_path, &target.name)
        };
        let basic = basic_kind_of(target);
        match (basic, &value) {
            (Some(BasicKind::Int), Object::Int(_)) => value,
            (Some(BasicKind::Int), Object::Float(f)) => Object::Int(*f as i64),
            (Some(BasicKind::Int), Object::Rune(c)) => Object::Int(i64::from(u32::from(*c))),
            (Some(BasicKind::Float), Object::Int(n)) => Object::Float(*n as f64),
            (Some(BasicKind::Float), Object::Float(_)) => value,
            (Some(BasicKind::Rune), Object::Int(n)) => {
                match u32::try_from(*n).ok().and_then(char::from_u32) {
                    Some(c) => Object::Rune(c),
                    None => Object::typed_placeholder("conversion", FieldType::named("rune")),
                }
            }
            (Some(BasicKind::String), Object::Str(_)) => value,
            (Some(BasicKind::String), Object::Int(n)) => {
                match u32::try_from(*n).ok().and_then(char::from_u32) {
                    Some(c) => Object::Str(c.to_string()),
                    None => Object::typed_placeholder("conversion", FieldType::named("string")),
                }
            }
            (Some(BasicKind::String), Object::Rune(c)) => Object::Str(c.to_string()),
            (Some(BasicKind::Bool), Object::Bool(_)) => value,
            _ => {
                self.tracer.on_placeholder("conversion");
                Object::typed_placeholder("conversion", target_ft)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BasicKind {
    Bool,
    Int,
    Float,
    Rune,
    String,
}

/// The primitive kind a (possibly named) type converts at.
fn basic_kind_of(target: &symgo_scan::TypeInfo) -> Option<BasicKind> {
    let name = if target.kind == TypeKind::Basic {
        target.name.as_str()
    } else {
        match &target.underlying {
            Some(FieldType::Named { pkg_path: None, name, .. }) => name.as_str(),
            _ => return None,
        }
    };
    Some(match name {
        "bool" => BasicKind::Bool,
        "int" | "int8" | "int16" | "int32" | "int64" | "uint" | "uint8" | "uint16" | "uint32"
        | "uint64" | "uintptr" | "byte" => BasicKind::Int,
        "rune" => BasicKind::Rune,
        "float32" | "float64" => BasicKind::Float,
        "string" => BasicKind::String,
        _ => return None,
    })
}

/// Qualifies unqualified named types with the declaring package's path, so
/// structural references survive crossing package boundaries. Universe
/// names and the function's own type parameters stay bare.
pub(crate) fn qualify_field_type(
    ft: &FieldType,
    pkg_path: &str,
    type_params: &[String],
) -> FieldType {
    match ft {
        FieldType::Named {
            pkg_path: None,
            name,
            type_args,
        } => {
            if is_universe_type(name) || type_params.iter().any(|p| p == name) {
                FieldType::Named {
                    pkg_path: None,
                    name: name.clone(),
                    type_args: type_args
                        .iter()
                        .map(|t| qualify_field_type(t, pkg_path, type_params))
                        .collect(),
                }
            } else {
                FieldType::Named {
                    pkg_path: Some(pkg_path.to_owned()),
                    name: name.clone(),
                    type_args: type_args
                        .iter()
                        .map(|t| qualify_field_type(t, pkg_path, type_params))
                        .collect(),
                }
            }
        }
        FieldType::Named { .. } => ft.clone(),
        FieldType::Pointer(inner) => FieldType::Pointer(Box::new(qualify_field_type(
            inner,
            pkg_path,
            type_params,
        ))),
        FieldType::Slice(inner) => FieldType::Slice(Box::new(qualify_field_type(
            inner,
            pkg_path,
            type_params,
        ))),
        FieldType::Array { len, elem } => FieldType::Array {
            len: *len,
            elem: Box::new(qualify_field_type(elem, pkg_path, type_params)),
        },
        FieldType::Map { key, value } => FieldType::Map {
            key: Box::new(qualify_field_type(key, pkg_path, type_params)),
            value: Box::new(qualify_field_type(value, pkg_path, type_params)),
        },
        FieldType::Chan { elem } => FieldType::Chan {
            elem: Box::new(qualify_field_type(elem, pkg_path, type_params)),
        },
        FieldType::Func { params, results } => FieldType::Func {
            params: params
                .iter()
                .map(|t| qualify_field_type(t, pkg_path, type_params))
                .collect(),
            results: results
                .iter()
                .map(|t| qualify_field_type(t, pkg_path, type_params))
                .collect(),
        },
        FieldType::Variadic(inner) => FieldType::Variadic(Box::new(qualify_field_type(
            inner,
            pkg_path,
            type_params,
        ))),
    }
}
