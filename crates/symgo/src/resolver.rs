//! The lazy package resolver.
//!
//! Packages are interned by import path and scanned at most once per
//! session. The cycle trick: a placeholder `PkgData` is interned *before*
//! the scan runs, so import cycles find a concrete (if partially filled)
//! package instead of recursing forever. The scan policy decides how much
//! of a package becomes visible: in-policy packages get real functions,
//! types, constants and lazy variables; out-of-policy packages get exported
//! placeholders only; failed scans are cached as disabled packages so the
//! failure is never retried.

use std::rc::Rc;

use symgo_scan::{
    ast::Expr, default_package_name, FieldType, MethodSig, TypeInfo, TypeRef,
};

use crate::{
    interp::{Interpreter, PkgData},
    object::{Object, PkgId, PlaceholderData, VarData, VarId},
};

/// Decides which packages are scanned in depth.
#[derive(Clone)]
pub(crate) enum ScanPolicy {
    AllowAll,
    /// Exact paths or `prefix/...` subtrees.
    Patterns(Vec<String>),
    Custom(Rc<dyn Fn(&str) -> bool>),
}

impl ScanPolicy {
    pub fn allows(&self, path: &str) -> bool {
        match self {
            ScanPolicy::AllowAll => true,
            ScanPolicy::Patterns(patterns) => patterns.iter().any(|p| {
                match p.strip_suffix("/...") {
                    Some(prefix) => path == prefix || path.starts_with(&format!("{prefix}/")),
                    None => path == p,
                }
            }),
            ScanPolicy::Custom(f) => f(path),
        }
    }
}

impl std::fmt::Debug for ScanPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanPolicy::AllowAll => write!(f, "AllowAll"),
            ScanPolicy::Patterns(p) => f.debug_tuple("Patterns").field(p).finish(),
            ScanPolicy::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Exported names start with an uppercase letter.
pub(crate) fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// Universe type names that never need package qualification.
pub(crate) fn is_universe_type(name: &str) -> bool {
    matches!(
        name,
        "bool"
            | "string"
            | "int"
            | "int8"
            | "int16"
            | "int32"
            | "int64"
            | "uint"
            | "uint8"
            | "uint16"
            | "uint32"
            | "uint64"
            | "uintptr"
            | "byte"
            | "rune"
            | "float32"
            | "float64"
            | "complex64"
            | "complex128"
            | "error"
            | "any"
            | "comparable"
    )
}

impl Interpreter {
    /// Resolves a package, scanning and populating it on first request.
    pub(crate) fn resolve_pkg(&mut self, path: &str) -> PkgId {
        if let Some(id) = self.pkg_intern.get(path) {
            return *id;
        }
        let env = self.envs.push(None);
        let id = PkgId::new(self.pkgs.len());
        let in_policy = self.policy.allows(path);
        self.pkgs.push(PkgData {
            path: path.to_owned(),
            name: default_package_name(path).to_owned(),
            env,
            info: None,
            in_policy,
            disabled: false,
            populated: false,
        });
        self.pkg_intern.insert(path.to_owned(), id);

        match self.provider.resolve_package(path) {
            Ok(info) => {
                self.pkgs[id.index()].name.clone_from(&info.name);
                self.pkgs[id.index()].info = Some(info);
                self.populate_pkg(id);
            }
            Err(err) => {
                log::warn!("failed to scan package {path:?}: {err}");
                self.pkgs[id.index()].disabled = true;
                self.pkgs[id.index()].populated = true;
            }
        }
        id
    }

    fn populate_pkg(&mut self, id: PkgId) {
        if self.pkgs[id.index()].populated {
            return;
        }
        self.pkgs[id.index()].populated = true;
        let Some(info) = self.pkgs[id.index()].info.clone() else {
            return;
        };
        let env = self.pkgs[id.index()].env;
        let in_policy = self.pkgs[id.index()].in_policy;

        if !in_policy {
            self.populate_shallow(id, &info);
            return;
        }

        for typ in &info.types {
            self.envs
                .set_local(env, &typ.name, Object::Type(Rc::clone(typ)));
        }
        for func in &info.functions {
            let fid = self.intern_declared_func(id, func);
            // `init` functions run at package load in the source language;
            // here they are interned (so they can be driven as entry points)
            // but never bound by name.
            if func.recv.is_none() && func.name != "init" {
                self.envs.set_local(env, &func.name, Object::Func(fid));
            }
        }
        self.populate_constants(id, env, &info);
        for var in &info.vars {
            let value = match &var.field_type {
                Some(t) => Object::typed_placeholder("zero value", t.clone()),
                None => Object::placeholder("uninitialized"),
            };
            let var_id = VarId::new(self.vars.len());
            self.vars.push(VarData {
                name: var.name.clone(),
                value,
                declared: var.field_type.clone(),
                possible_types: indexmap::IndexSet::new(),
                evaluated: var.value.is_none(),
                init: var
                    .value
                    .clone()
                    .map(|expr| (expr, var.value_index, id)),
            });
            self.envs.set_local(env, &var.name, Object::Var(var_id));
        }
    }

    /// Out-of-policy population: exported signatures only, everything a
    /// placeholder, bodies never touched.
    fn populate_shallow(&mut self, id: PkgId, info: &Rc<symgo_scan::PackageInfo>) {
        let env = self.pkgs[id.index()].env;
        let path = self.pkgs[id.index()].path.clone();
        for typ in &info.types {
            if !is_exported(&typ.name) {
                continue;
            }
            let placeholder = TypeInfo::unresolved(&path, &typ.name);
            self.envs
                .set_local(env, &typ.name, Object::Type(Rc::new(placeholder)));
        }
        for func in &info.functions {
            if func.recv.is_some() || !is_exported(&func.name) {
                continue;
            }
            let obj = Object::Placeholder(Box::new(PlaceholderData {
                reason: "out-of-policy function".to_owned(),
                typ: None,
                func: Some(Rc::clone(func)),
                pkg_path: Some(path.clone()),
                iface: None,
                possible_types: Vec::new(),
            }));
            self.envs.set_local(env, &func.name, obj);
        }
        for constant in &info.constants {
            if !is_exported(&constant.name) {
                continue;
            }
            let obj = match &constant.field_type {
                Some(t) => Object::typed_placeholder("out-of-policy constant", t.clone()),
                None => Object::placeholder("out-of-policy constant"),
            };
            self.envs.set_local(env, &constant.name, obj);
        }
        for var in &info.vars {
            if !is_exported(&var.name) {
                continue;
            }
            let obj = match &var.field_type {
                Some(t) => Object::typed_placeholder("out-of-policy variable", t.clone()),
                None => Object::placeholder("out-of-policy variable"),
            };
            self.envs.set_local(env, &var.name, obj);
        }
    }

    /// Declares constants with fix-point tolerance: a constant whose
    /// initializer references a not-yet-bound sibling is retried on a later
    /// pass; whatever still fails becomes a placeholder.
    fn populate_constants(&mut self, id: PkgId, env: crate::object::EnvId, info: &Rc<symgo_scan::PackageInfo>) {
        let mut pending: Vec<usize> = (0..info.constants.len()).collect();
        for _pass in 0..3 {
            if pending.is_empty() {
                break;
            }
            let mut next = Vec::new();
            for i in pending {
                let constant = &info.constants[i];
                let value = match constant.value.clone() {
                    None => match &constant.field_type {
                        Some(t) => Object::typed_placeholder("constant", t.clone()),
                        None => Object::placeholder("constant"),
                    },
                    Some(expr) => {
                        let scope = self.envs.push(Some(env));
                        let iota = i64::try_from(constant.iota).unwrap_or(i64::MAX);
                        self.envs.set_local(scope, "iota", Object::Int(iota));
                        let raw = self.eval_expr(&expr, scope, id);
                        self.value_of(&raw)
                    }
                };
                if value.is_error() {
                    next.push(i);
                    continue;
                }
                self.envs.set_local(env, &info.constants[i].name, value);
            }
            pending = next;
        }
        for i in pending {
            let constant = &info.constants[i];
            log::debug!(
                "constant {}.{} did not converge; binding a placeholder",
                self.pkgs[id.index()].path,
                constant.name
            );
            let obj = match &constant.field_type {
                Some(t) => Object::typed_placeholder("unconverged constant", t.clone()),
                None => Object::placeholder("unconverged constant"),
            };
            self.envs.set_local(env, &constant.name, obj);
        }
    }

    /// Maps an identifier used as a package qualifier to an import path of
    /// the given package, by alias first, then the basename heuristics, then
    /// a declared-name scan over unaliased imports ("first matching import
    /// wins").
    pub(crate) fn import_path_for_qualifier(&mut self, pkg: PkgId, name: &str) -> Option<String> {
        let info = self.pkgs[pkg.index()].info.clone()?;
        for import in &info.imports {
            match &import.alias {
                Some(alias) if alias == name => return Some(import.path.clone()),
                Some(_) => {}
                None if default_package_name(&import.path) == name => {
                    return Some(import.path.clone());
                }
                None => {}
            }
        }
        // Fallback: an import whose declared package name differs from its
        // basename. Resolving here is policy-gated like any other load.
        for import in &info.imports {
            if import.alias.is_some() {
                continue;
            }
            let candidate = self.resolve_pkg(&import.path);
            if self.pkgs[candidate.index()].disabled {
                continue;
            }
            if self.pkgs[candidate.index()].name == name {
                log::debug!(
                    "import {:?} matched qualifier {name} by declared package name",
                    import.path
                );
                return Some(import.path.clone());
            }
        }
        None
    }

    /// Converts a type expression to a structural [`FieldType`], resolving
    /// qualifiers through the current package's imports.
    pub(crate) fn field_type_of_expr(&mut self, expr: &Expr, pkg: PkgId) -> FieldType {
        match expr.unparen() {
            Expr::Ident(id) => FieldType::named(&id.name),
            Expr::Selector { x, sel } => {
                let qualifier = match x.unparen() {
                    Expr::Ident(id) => id.name.clone(),
                    _ => String::new(),
                };
                let path = self
                    .import_path_for_qualifier(pkg, &qualifier)
                    .unwrap_or(qualifier);
                FieldType::qualified(path, &sel.name)
            }
            Expr::Star { x, .. } => {
                FieldType::Pointer(Box::new(self.field_type_of_expr(x, pkg)))
            }
            Expr::ArrayType { len: None, elem, .. } => {
                FieldType::Slice(Box::new(self.field_type_of_expr(elem, pkg)))
            }
            Expr::ArrayType {
                len: Some(len),
                elem,
                ..
            } => {
                let n = match len.unparen() {
                    Expr::BasicLit { value, .. } => symgo_scan::parse_int(value),
                    _ => None,
                };
                FieldType::Array {
                    len: n,
                    elem: Box::new(self.field_type_of_expr(elem, pkg)),
                }
            }
            Expr::MapType { key, value, .. } => FieldType::Map {
                key: Box::new(self.field_type_of_expr(key, pkg)),
                value: Box::new(self.field_type_of_expr(value, pkg)),
            },
            Expr::ChanType { elem, .. } => FieldType::Chan {
                elem: Box::new(self.field_type_of_expr(elem, pkg)),
            },
            Expr::FuncType { sig, .. } => {
                let params = sig
                    .params
                    .iter()
                    .filter_map(|f| f.typ.as_ref())
                    .map(|t| self.field_type_of_expr(t, pkg))
                    .collect();
                let results = sig
                    .results
                    .iter()
                    .filter_map(|f| f.typ.as_ref())
                    .map(|t| self.field_type_of_expr(t, pkg))
                    .collect();
                FieldType::Func { params, results }
            }
            Expr::Ellipsis {
                elem: Some(elem), ..
            } => FieldType::Variadic(Box::new(self.field_type_of_expr(elem, pkg))),
            Expr::Index { x, indices, .. } => {
                let base = self.field_type_of_expr(x, pkg);
                let type_args = indices
                    .iter()
                    .map(|i| self.field_type_of_expr(i, pkg))
                    .collect();
                match base {
                    FieldType::Named { pkg_path, name, .. } => FieldType::Named {
                        pkg_path,
                        name,
                        type_args,
                    },
                    other => other,
                }
            }
            Expr::InterfaceType { elems, .. } if elems.is_empty() => FieldType::named("any"),
            _ => FieldType::named("any"),
        }
    }

    /// Resolves a named type to its scanned `TypeInfo`. Out-of-policy and
    /// unknown targets yield an unresolved placeholder; universe names yield
    /// basic infos.
    pub(crate) fn resolve_named(
        &mut self,
        pkg_path: Option<&str>,
        name: &str,
        current: PkgId,
    ) -> TypeRef {
        match pkg_path {
            None => {
                if is_universe_type(name) {
                    return Rc::new(TypeInfo::basic(name));
                }
                let current_path = self.pkgs[current.index()].path.clone();
                if !self.pkgs[current.index()].in_policy {
                    return Rc::new(TypeInfo::unresolved(current_path, name));
                }
                match self.pkgs[current.index()]
                    .info
                    .as_ref()
                    .and_then(|info| info.lookup_type(name))
                {
                    Some(t) => Rc::clone(t),
                    None => Rc::new(TypeInfo::unresolved(current_path, name)),
                }
            }
            Some(path) => {
                let id = self.resolve_pkg(path);
                if !self.pkgs[id.index()].in_policy {
                    return Rc::new(TypeInfo::unresolved(path, name));
                }
                match self.pkgs[id.index()]
                    .info
                    .as_ref()
                    .and_then(|info| info.lookup_type(name))
                {
                    Some(t) => Rc::clone(t),
                    None => Rc::new(TypeInfo::unresolved(path, name)),
                }
            }
        }
    }

    /// Resolves a structural reference down to its base named type.
    pub(crate) fn resolve_field_type(&mut self, ft: &FieldType, current: PkgId) -> Option<TypeRef> {
        let (pkg_path, name) = ft.base_name()?;
        Some(self.resolve_named(pkg_path.as_deref(), name, current))
    }

    /// The full method contract of an interface, with embedded interfaces
    /// flattened. Cycle-safe.
    pub(crate) fn flatten_interface(&mut self, iface: &TypeRef) -> Vec<MethodSig> {
        let mut out: Vec<MethodSig> = Vec::new();
        let mut seen_types = ahash::AHashSet::new();
        let mut queue = vec![Rc::clone(iface)];
        while let Some(current) = queue.pop() {
            if !seen_types.insert(current.qualified_name()) {
                continue;
            }
            let Some(info) = &current.interface_info else {
                continue;
            };
            for method in &info.methods {
                if !out.iter().any(|m| m.name == method.name) {
                    out.push(method.clone());
                }
            }
            if current.pkg_path.is_empty() {
                continue;
            }
            let owner = self.resolve_pkg(&current.pkg_path.clone());
            for embedded in &info.embedded {
                if let Some((pkg_path, name)) = embedded.base_name() {
                    let resolved = self.resolve_named(pkg_path.as_deref(), name, owner);
                    queue.push(resolved);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patterns_match_exact_and_subtree() {
        let policy = ScanPolicy::Patterns(vec![
            "example.com/app".to_owned(),
            "example.com/lib/...".to_owned(),
        ]);
        assert!(policy.allows("example.com/app"));
        assert!(!policy.allows("example.com/app/sub"));
        assert!(policy.allows("example.com/lib"));
        assert!(policy.allows("example.com/lib/deep/pkg"));
        assert!(!policy.allows("example.com/other"));
    }

    #[test]
    fn exported_names_are_uppercase() {
        assert!(is_exported("Client"));
        assert!(!is_exported("client"));
        assert!(!is_exported(""));
    }
}
