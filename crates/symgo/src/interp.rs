//! The interpreter: public façade and central storage.
//!
//! One `Interpreter` is one analysis session. It owns every piece of shared
//! state (environments, variable and instance cells, interned functions and
//! packages, the intrinsics registry, call stack and limits) and the
//! evaluator is implemented as methods on it across the `eval` modules.
//! Options follow the consuming-builder convention: construct, chain
//! `with_*` calls, then drive entry points through [`eval`](Interpreter::eval)
//! and [`apply`](Interpreter::apply) and finish with
//! [`finalize`](Interpreter::finalize).

use std::rc::Rc;

use ahash::{AHashMap, AHashSet};
use symgo_scan::{
    ast::{Block, Expr, FuncSig},
    FieldType, FunctionInfo, PackageResolver, Pos,
};

use crate::{
    env::Envs,
    intrinsics::{DefaultIntrinsicFn, IntrinsicFn, IntrinsicsRegistry},
    limits::{CancelToken, Limits},
    object::{
        ArgVec, EnvId, ErrorData, ErrorKind, FuncId, InstanceData, Object, PkgId, VarData, VarId,
    },
    resolver::ScanPolicy,
    tracer::{EvalTracer, NoopTracer},
};

/// Closure data: an interned function. Two functions with the same
/// declaration position (and captured environment) share one `FuncId`.
#[derive(Debug, Clone)]
pub(crate) struct FuncData {
    pub name: Option<String>,
    /// Scanned declaration info; absent for function literals.
    pub info: Option<Rc<FunctionInfo>>,
    pub sig: Rc<FuncSig>,
    pub body: Option<Rc<Block>>,
    /// Captured lexical environment.
    pub env: EnvId,
    pub pkg: PkgId,
}

/// An interned package and its root environment.
#[derive(Debug, Clone)]
pub(crate) struct PkgData {
    pub path: String,
    pub name: String,
    pub env: EnvId,
    /// Scanned declarations; `None` while the package is a cycle
    /// placeholder or after a failed scan.
    pub info: Option<Rc<symgo_scan::PackageInfo>>,
    pub in_policy: bool,
    /// Scan failed; the failure is cached so it is not retried.
    pub disabled: bool,
    pub populated: bool,
}

/// One call-stack entry, for diagnostics and recursion control.
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub name: String,
    pub pos: Pos,
    pub pkg: PkgId,
    /// `(function, argument-type fingerprint)`; `None` for synthetic root
    /// frames.
    pub fingerprint: Option<(FuncId, String)>,
    /// Deferred thunks: callee, pre-evaluated arguments, defer position.
    pub defers: Vec<(Object, ArgVec, Pos)>,
}

/// A recorded interface method call awaiting finalization.
#[derive(Debug, Clone)]
pub(crate) struct IfaceCall {
    pub iface: symgo_scan::TypeRef,
    pub method: String,
}

/// The symbolic execution engine façade.
pub struct Interpreter {
    pub(crate) provider: Box<dyn PackageResolver>,
    pub(crate) policy: ScanPolicy,

    pub(crate) envs: Envs,
    /// Root scope holding universe builtins.
    pub(crate) universe: EnvId,
    pub(crate) vars: Vec<VarData>,
    pub(crate) instances: Vec<InstanceData>,
    pub(crate) funcs: Vec<FuncData>,
    pub(crate) func_intern: AHashMap<(PkgId, Pos, EnvId), FuncId>,
    pub(crate) pkgs: Vec<PkgData>,
    pub(crate) pkg_intern: AHashMap<String, PkgId>,

    pub(crate) intrinsics: IntrinsicsRegistry,
    pub(crate) default_intrinsic: Option<DefaultIntrinsicFn>,
    /// Interface qualified name → concrete qualified name pre-bindings.
    pub(crate) iface_bindings: AHashMap<String, String>,

    pub(crate) tracer: Box<dyn EvalTracer>,
    pub(crate) limits: Limits,
    pub(crate) cancel: CancelToken,

    pub(crate) memoize: bool,
    pub(crate) memo: AHashMap<FuncId, Object>,

    pub(crate) stack: Vec<Frame>,
    pub(crate) frames_used: usize,
    /// Active branch-merge logs, innermost last. Each log records the value
    /// a variable held before its first rebind inside the branch arm.
    pub(crate) branch_logs: Vec<Vec<(VarId, Object)>>,
    /// The in-flight panic while deferred thunks of an unwinding frame run.
    pub(crate) panicking: Option<Box<ErrorData>>,
    /// Non-zero while deferred thunks execute; suppresses cancellation so
    /// deferreds finish even after the token fires.
    pub(crate) in_defer: usize,

    pub(crate) iface_calls: Vec<IfaceCall>,
    pub(crate) iface_seen: AHashSet<(String, String)>,
}

impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter")
            .field("packages", &self.pkgs.len())
            .field("functions", &self.funcs.len())
            .field("variables", &self.vars.len())
            .field("frames_used", &self.frames_used)
            .finish_non_exhaustive()
    }
}

impl Interpreter {
    /// Creates a session over the given package provider. All packages are
    /// in-policy until a scope or policy option narrows that.
    pub fn new(provider: impl PackageResolver + 'static) -> Interpreter {
        let mut envs = Envs::new();
        let universe = envs.push(None);
        let mut interp = Interpreter {
            provider: Box::new(provider),
            policy: ScanPolicy::AllowAll,
            envs,
            universe,
            vars: Vec::new(),
            instances: Vec::new(),
            funcs: Vec::new(),
            func_intern: AHashMap::new(),
            pkgs: Vec::new(),
            pkg_intern: AHashMap::new(),
            intrinsics: IntrinsicsRegistry::new(),
            default_intrinsic: None,
            iface_bindings: AHashMap::new(),
            tracer: Box::new(NoopTracer),
            limits: Limits::default(),
            cancel: CancelToken::new(),
            memoize: false,
            memo: AHashMap::new(),
            stack: Vec::new(),
            frames_used: 0,
            branch_logs: Vec::new(),
            panicking: None,
            in_defer: 0,
            iface_calls: Vec::new(),
            iface_seen: AHashSet::new(),
        };
        interp.install_universe();
        interp
    }

    // ------------------------------------------------------------------
    // Options
    // ------------------------------------------------------------------

    /// Receives every AST node the evaluator visits.
    #[must_use]
    pub fn with_tracer(mut self, tracer: impl EvalTracer + 'static) -> Interpreter {
        self.tracer = Box::new(tracer);
        self
    }

    /// Glob-like package patterns defining the in-policy set. A pattern is
    /// either an exact import path or a `prefix/...` subtree.
    #[must_use]
    pub fn with_primary_analysis_scope<I, S>(mut self, patterns: I) -> Interpreter
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.policy = ScanPolicy::Patterns(patterns.into_iter().map(Into::into).collect());
        self
    }

    /// Lower-level policy override: a predicate on import paths.
    #[must_use]
    pub fn with_scan_policy(mut self, policy: impl Fn(&str) -> bool + 'static) -> Interpreter {
        self.policy = ScanPolicy::Custom(Rc::new(policy));
        self
    }

    /// Enables per-function result caching.
    #[must_use]
    pub fn with_memoization(mut self, enabled: bool) -> Interpreter {
        self.memoize = enabled;
        self
    }

    /// The usage-observation hook, invoked for every resolved call.
    #[must_use]
    pub fn with_default_intrinsic(
        mut self,
        hook: impl Fn(&mut Interpreter, &Object, &[Object]) + 'static,
    ) -> Interpreter {
        self.default_intrinsic = Some(Rc::new(hook));
        self
    }

    /// Registers a named intrinsic. Keys are `pkg/path.Func`,
    /// `(pkg/path.Type).Method` or `(*pkg/path.Type).Method`.
    #[must_use]
    pub fn with_intrinsic(
        mut self,
        key: impl Into<String>,
        func: impl Fn(&mut Interpreter, &[Object]) -> Object + 'static,
    ) -> Interpreter {
        self.intrinsics.register(key, Rc::new(func) as IntrinsicFn);
        self
    }

    /// Pre-declares that calls on `iface` dispatch as if the receiver had
    /// the named concrete type. Both sides are qualified names
    /// (`pkg/path.Type`).
    #[must_use]
    pub fn with_bind_interface(
        mut self,
        iface: impl Into<String>,
        concrete: impl Into<String>,
    ) -> Interpreter {
        self.iface_bindings.insert(iface.into(), concrete.into());
        self
    }

    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Interpreter {
        self.limits = limits;
        self
    }

    /// Installs a cancellation token checked at statement boundaries.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Interpreter {
        self.cancel = token;
        self
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Evaluates an expression in the context of `pkg_path`'s environment.
    pub fn eval(&mut self, expr: &Expr, pkg_path: &str) -> Object {
        let pkg = self.resolve_pkg(pkg_path);
        let env = self.envs.push(Some(self.pkgs[pkg.index()].env));
        self.with_root_frame(pkg, |interp| interp.eval_expr(expr, env, pkg))
    }

    /// Applies a function object directly, as an analysis entry point.
    pub fn apply(&mut self, func: &Object, args: Vec<Object>) -> Object {
        let pkg = self.object_home_pkg(func);
        let callee = func.clone();
        let args: ArgVec = args.into_iter().collect();
        self.with_root_frame(pkg, |interp| {
            interp.apply_object(callee, args, false, Pos::NONE, pkg)
        })
    }

    /// Package-level lookup: the object bound to `name` in `pkg_path`.
    pub fn find_object(&mut self, pkg_path: &str, name: &str) -> Option<Object> {
        let pkg = self.resolve_pkg(pkg_path);
        let env = self.pkgs[pkg.index()].env;
        self.envs.get(env, name).cloned()
    }

    /// Every symbol bound at a package's top level, in declaration order.
    /// Drivers use this to enumerate entry-point candidates.
    pub fn package_symbols(&mut self, pkg_path: &str) -> Vec<String> {
        let pkg = self.resolve_pkg(pkg_path);
        let env = self.pkgs[pkg.index()].env;
        self.envs
            .iter_local(env)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Constructs a fresh symbolic variable typed by a qualified type name
    /// such as `pkg/path.Client`, `*pkg/path.Client` or `[]int`, for
    /// driving analysis entry points.
    pub fn new_symbolic(&mut self, name: &str, qualified_type: &str) -> Object {
        let typ = parse_qualified_type(qualified_type);
        let value = Object::typed_placeholder("symbolic parameter", typ.clone());
        let id = self.alloc_var(name, value, Some(typ));
        Object::Var(id)
    }

    /// Runs the deferred interface-dispatch finalizer over every interface
    /// method call recorded so far. Idempotent: repeated invocation yields
    /// the same default-intrinsic observations.
    pub fn finalize(&mut self) {
        self.finalize_interfaces();
    }

    /// Pushes a temporary intrinsics layer; registrations made until the
    /// matching pop shadow existing bindings.
    pub fn push_intrinsics_overlay(&mut self) {
        self.intrinsics.push_overlay();
    }

    pub fn pop_intrinsics_overlay(&mut self) {
        self.intrinsics.pop_overlay();
    }

    /// Registers an intrinsic after construction (into the topmost layer).
    pub fn register_intrinsic(
        &mut self,
        key: impl Into<String>,
        func: impl Fn(&mut Interpreter, &[Object]) -> Object + 'static,
    ) {
        self.intrinsics.register(key, Rc::new(func) as IntrinsicFn);
    }

    /// Renders an object's position-free display form, mostly for tests and
    /// diagnostics.
    pub fn describe(&self, obj: &Object) -> String {
        obj.type_describe()
    }

    /// The qualified name of a function-like object: `pkg.Func`,
    /// `(pkg.Type).Method` or `(*pkg.Type).Method`. This is what default
    /// intrinsics use to identify what was reached.
    pub fn qualified_name_of(&self, obj: &Object) -> Option<String> {
        match obj {
            Object::Func(id) => {
                let func = &self.funcs[id.index()];
                match &func.info {
                    Some(info) => Some(info.qualified_name()),
                    None => Some(format!(
                        "{}.func literal",
                        self.pkgs[func.pkg.index()].path
                    )),
                }
            }
            Object::BoundMethod(data) => self.qualified_name_of(&Object::Func(data.func)),
            Object::Placeholder(data) => data.func.as_ref().map(|info| info.qualified_name()),
            Object::UnresolvedFunc(data) => Some(format!("{}.{}", data.pkg_path, data.name)),
            Object::Intrinsic(obj) => Some(obj.name().to_owned()),
            Object::Var(id) => self.qualified_name_of(&self.vars[id.index()].value),
            _ => None,
        }
    }

    /// The accumulated possible types of a variable, rendered structurally.
    /// Empty for non-variables.
    pub fn possible_types_of(&self, obj: &Object) -> Vec<String> {
        match obj {
            Object::Var(id) => self.vars[id.index()]
                .possible_types
                .iter()
                .map(ToString::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Attaches free-form scratch state to an instance-backed value.
    /// Intrinsics use this to accumulate per-object facts across calls.
    /// Returns false when the value is not instance-backed.
    pub fn set_state(&mut self, obj: &Object, key: impl Into<String>, value: Object) -> bool {
        match self.deref_to_instance(obj) {
            Some(id) => {
                self.instances[id.index()].state.insert(key.into(), value);
                true
            }
            None => false,
        }
    }

    /// Reads scratch state previously attached with
    /// [`set_state`](Interpreter::set_state).
    pub fn get_state(&mut self, obj: &Object, key: &str) -> Option<Object> {
        let id = self.deref_to_instance(obj)?;
        self.instances[id.index()].state.get(key).cloned()
    }

    /// Whether two function-like objects are the same interned function.
    pub fn same_function(&self, a: &Object, b: &Object) -> bool {
        fn func_id(obj: &Object) -> Option<FuncId> {
            match obj {
                Object::Func(id) => Some(*id),
                Object::BoundMethod(data) => Some(data.func),
                Object::Instantiated(data) => Some(data.func),
                _ => None,
            }
        }
        matches!((func_id(a), func_id(b)), (Some(x), Some(y)) if x == y)
    }

    // ------------------------------------------------------------------
    // Shared internals
    // ------------------------------------------------------------------

    /// Runs `f` with a synthetic root frame so `defer` and diagnostics have
    /// a frame to attach to even at top level.
    pub(crate) fn with_root_frame<T>(
        &mut self,
        pkg: PkgId,
        f: impl FnOnce(&mut Interpreter) -> T,
    ) -> T {
        let is_root = self.stack.is_empty();
        if is_root {
            self.frames_used = 0;
            self.stack.push(Frame {
                name: "<entry>".to_owned(),
                pos: Pos::NONE,
                pkg,
                fingerprint: None,
                defers: Vec::new(),
            });
        }
        let out = f(self);
        if is_root {
            self.stack.pop();
        }
        out
    }

    pub(crate) fn alloc_var(
        &mut self,
        name: &str,
        value: Object,
        declared: Option<FieldType>,
    ) -> VarId {
        let mut possible_types = indexmap::IndexSet::new();
        if let Some(t) = self.dynamic_type(&value) {
            possible_types.insert(t);
        }
        let id = VarId::new(self.vars.len());
        self.vars.push(VarData {
            name: name.to_owned(),
            value,
            declared,
            possible_types,
            evaluated: true,
            init: None,
        });
        id
    }

    /// Rebinds a variable cell, accumulating its possible types and
    /// recording the pre-value in every active branch log.
    pub(crate) fn rebind_var(&mut self, id: VarId, value: Object) {
        if !self.branch_logs.is_empty() {
            let pre = self.vars[id.index()].value.clone();
            for log in &mut self.branch_logs {
                if !log.iter().any(|(v, _)| *v == id) {
                    log.push((id, pre.clone()));
                }
            }
        }
        if let Some(t) = self.dynamic_type(&value) {
            self.vars[id.index()].possible_types.insert(t);
        }
        let cell = &mut self.vars[id.index()];
        cell.value = value;
        cell.evaluated = true;
    }

    /// Restores a variable to a pre-branch value without treating the write
    /// as an observable assignment (no logging, no possible-type growth).
    pub(crate) fn restore_var(&mut self, id: VarId, value: Object) {
        self.vars[id.index()].value = value;
    }

    /// Dereferences variables (forcing lazy package-level initializers) and
    /// flattens bound names down to plain values. Chains of variables (a
    /// parameter bound to a caller's variable) collapse fully.
    pub(crate) fn value_of(&mut self, obj: &Object) -> Object {
        let mut current = obj.clone();
        let mut hops = 0;
        while let Object::Var(id) = current {
            self.force_var(id);
            current = self.vars[id.index()].value.clone();
            hops += 1;
            if hops > 64 {
                return Object::placeholder("variable cycle");
            }
        }
        current
    }

    /// Evaluates a lazy package-level initializer on first demand.
    pub(crate) fn force_var(&mut self, id: VarId) {
        if self.vars[id.index()].evaluated {
            return;
        }
        // Mark first so self-referential initializers terminate.
        self.vars[id.index()].evaluated = true;
        let Some((expr, index, pkg)) = self.vars[id.index()].init.clone() else {
            return;
        };
        let env = self.pkgs[pkg.index()].env;
        let result = self.eval_expr(&expr, env, pkg);
        let value = match self.value_of(&result) {
            Object::Multi(values) => values
                .get(index)
                .cloned()
                .unwrap_or_else(|| Object::placeholder("missing initializer value")),
            Object::Error(err) => {
                log::warn!(
                    "package variable {} initializer failed: {}",
                    self.vars[id.index()].name,
                    err
                );
                Object::placeholder("initializer failed")
            }
            other => other,
        };
        if let Some(t) = self.dynamic_type(&value) {
            self.vars[id.index()].possible_types.insert(t);
        }
        self.vars[id.index()].value = value;
    }

    /// The structural type of a value, consulting the arenas for instances
    /// and variables.
    pub(crate) fn dynamic_type(&self, obj: &Object) -> Option<FieldType> {
        match obj {
            Object::Instance(id) => self.instances[id.index()].typ.clone(),
            Object::Var(id) => {
                let cell = &self.vars[id.index()];
                cell.declared
                    .clone()
                    .or_else(|| self.dynamic_type(&cell.value.clone()))
            }
            Object::Pointer(p) => {
                let inner = self
                    .dynamic_type(&p.pointee)
                    .or_else(|| p.typ.clone())?;
                Some(FieldType::Pointer(Box::new(inner)))
            }
            other => other.field_type(),
        }
    }

    /// Positioned error with a call-stack snapshot.
    pub(crate) fn error_at(&mut self, pos: Pos, pkg: PkgId, message: impl Into<String>) -> Object {
        self.make_error(ErrorKind::General, pos, pkg, message, None)
    }

    pub(crate) fn make_error(
        &mut self,
        kind: ErrorKind,
        pos: Pos,
        pkg: PkgId,
        message: impl Into<String>,
        payload: Option<Object>,
    ) -> Object {
        let position = self.pkgs.get(pkg.index()).and_then(|p| {
            p.info
                .as_ref()
                .and_then(|info| info.fset.position(pos))
        });
        Object::Error(Box::new(ErrorData {
            kind,
            message: message.into(),
            position,
            call_stack: self.format_stack(),
            payload,
        }))
    }

    /// Renders the call stack, innermost frame last.
    pub(crate) fn format_stack(&self) -> Vec<String> {
        self.stack
            .iter()
            .map(|frame| {
                let loc = self
                    .pkgs
                    .get(frame.pkg.index())
                    .and_then(|p| p.info.as_ref())
                    .map_or_else(|| "-".to_owned(), |info| info.fset.display(frame.pos));
                format!("{} ({loc})", frame.name)
            })
            .collect()
    }

    /// Counts how often a `(function, fingerprint)` tuple is already on the
    /// stack, for recursion capping.
    pub(crate) fn recursion_count(&self, func: FuncId, fingerprint: &str) -> usize {
        self.stack
            .iter()
            .filter(|frame| {
                frame
                    .fingerprint
                    .as_ref()
                    .is_some_and(|(f, fp)| *f == func && fp == fingerprint)
            })
            .count()
    }

    pub(crate) fn args_fingerprint(&self, args: &[Object]) -> String {
        let parts: Vec<String> = args
            .iter()
            .map(|a| self.dynamic_type(a).map_or_else(|| a.type_describe(), |t| t.to_string()))
            .collect();
        parts.join(",")
    }

    /// The package a function-like object belongs to, defaulting to the
    /// first interned package (entry points always have one).
    pub(crate) fn object_home_pkg(&self, obj: &Object) -> PkgId {
        match obj {
            Object::Func(id) => self.funcs[id.index()].pkg,
            Object::BoundMethod(b) => self.funcs[b.func.index()].pkg,
            Object::Instantiated(i) => self.funcs[i.func.index()].pkg,
            Object::Var(id) => self.object_home_pkg(&self.vars[id.index()].value),
            _ => PkgId::new(0),
        }
    }

    /// Fires the default intrinsic for a resolved callee.
    pub(crate) fn observe_call(&mut self, callee: &Object, args: &[Object]) {
        if let Some(hook) = self.default_intrinsic.clone() {
            hook(self, callee, args);
        }
    }

    /// Records an interface method call for the finalizer, deduplicated by
    /// `(interface, method)`.
    pub(crate) fn record_iface_call(&mut self, iface: symgo_scan::TypeRef, method: &str) {
        let key = (iface.qualified_name(), method.to_owned());
        if self.iface_seen.insert(key) {
            self.iface_calls.push(IfaceCall {
                iface,
                method: method.to_owned(),
            });
        }
    }
}

/// Parses `new_symbolic`'s qualified type syntax: optional `*` and `[]`
/// prefixes around `pkg/path.Name` or a bare universe name.
fn parse_qualified_type(spec: &str) -> FieldType {
    if let Some(rest) = spec.strip_prefix('*') {
        return FieldType::Pointer(Box::new(parse_qualified_type(rest)));
    }
    if let Some(rest) = spec.strip_prefix("[]") {
        return FieldType::Slice(Box::new(parse_qualified_type(rest)));
    }
    match spec.rsplit_once('.') {
        Some((pkg, name)) => FieldType::qualified(pkg, name),
        None => FieldType::named(spec),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_type_syntax_parses() {
        assert_eq!(
            parse_qualified_type("*example.com/m/q.Client").to_string(),
            "*example.com/m/q.Client"
        );
        assert_eq!(parse_qualified_type("[]int").to_string(), "[]int");
        assert_eq!(parse_qualified_type("string").to_string(), "string");
    }
}
