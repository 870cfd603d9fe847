//! Name resolution: identifiers, selectors, and method lookup.
//!
//! Identifier lookup order is lexical environment, then imports (aliases
//! and path-name heuristics, with a declared-name scan as the last resort),
//! then the universe. Method lookup walks the receiver's type: direct
//! methods first, then embedded fields breadth-first with shallower depth
//! winning and equal-depth ties reported as ambiguous. Interface-typed
//! receivers produce recorded placeholders that the finalizer later matches
//! against concrete implementers.

use std::rc::Rc;

use symgo_scan::{
    ast::{Expr, FuncSig, Ident},
    FieldType, FunctionInfo, MethodSig, ParamInfo, ReceiverInfo, TypeKind, TypeRef,
};

use crate::{
    interp::Interpreter,
    object::{EnvId, IfaceRef, Object, PkgId, PlaceholderData, UnresolvedFuncData},
    resolver::is_universe_type,
};

impl Interpreter {
    pub(crate) fn eval_ident(&mut self, id: &Ident, env: EnvId, pkg: PkgId) -> Object {
        if id.is_blank() {
            return Object::placeholder("blank identifier");
        }
        if let Some(obj) = self.envs.get(env, &id.name) {
            return obj.clone();
        }
        if let Some(path) = self.import_path_for_qualifier(pkg, &id.name) {
            let target = self.resolve_pkg(&path);
            return Object::Pkg(target);
        }
        if let Some(obj) = self.envs.get(self.universe, &id.name) {
            return obj.clone();
        }
        if is_universe_type(&id.name) {
            let info = symgo_scan::TypeInfo::basic(&id.name);
            return Object::Type(Rc::new(info));
        }
        if !self.pkgs[pkg.index()].in_policy {
            return Object::placeholder(format!("unresolved identifier {}", id.name));
        }
        self.error_at(id.pos, pkg, format!("identifier not found: {}", id.name))
    }

    pub(crate) fn eval_selector(
        &mut self,
        x: &Expr,
        sel: &Ident,
        env: EnvId,
        pkg: PkgId,
    ) -> Object {
        let base = self.eval_expr(x, env, pkg);
        if base.is_signal() {
            return base;
        }
        let resolved = self.value_of(&base);

        if let Object::Pkg(target) = &resolved {
            return self.select_from_package(*target, sel, pkg);
        }
        if let Object::Type(typ) = &resolved {
            // Method expression `T.M`: the unbound method value.
            return self.method_expression(typ, sel);
        }
        self.select_on_value(&base, sel, env, pkg)
    }

    fn select_from_package(&mut self, target: PkgId, sel: &Ident, from: PkgId) -> Object {
        if let Some(obj) = {
            let env = self.pkgs[target.index()].env;
            self.envs.get(env, &sel.name).cloned()
        } {
            return obj;
        }
        let path = self.pkgs[target.index()].path.clone();
        if self.pkgs[target.index()].disabled {
            // The package never scanned; leave a late-binding stub so a
            // registered intrinsic can still claim the call.
            return Object::UnresolvedFunc(Box::new(UnresolvedFuncData {
                pkg_path: path,
                name: sel.name.clone(),
            }));
        }
        if !self.pkgs[target.index()].in_policy {
            // Unknown selectors in an out-of-policy package are tolerated.
            let func = self.pkgs[target.index()]
                .info
                .clone()
                .and_then(|info| info.lookup_function(&sel.name).cloned());
            return Object::Placeholder(Box::new(PlaceholderData {
                reason: format!("out-of-policy selector {}.{}", path, sel.name),
                typ: None,
                func,
                pkg_path: Some(path),
                iface: None,
                possible_types: Vec::new(),
            }));
        }
        self.error_at(sel.pos, from, format!("undefined: {}.{}", path, sel.name))
    }

    /// Field access or method lookup on a value.
    fn select_on_value(&mut self, base: &Object, sel: &Ident, _env: EnvId, pkg: PkgId) -> Object {
        let static_type = self.static_type_of(base);
        let Some(static_type) = static_type else {
            return Object::placeholder(format!("selection {} on untyped value", sel.name));
        };

        let (base_type, recv_is_ptr) = strip_pointer(&static_type);
        let Some((type_pkg, type_name)) = base_type.base_name() else {
            return Object::placeholder(format!("selection {} on {}", sel.name, static_type));
        };
        let (type_pkg, type_name) = (type_pkg.clone(), type_name.to_owned());
        let type_ref = self.resolve_named(type_pkg.as_deref(), &type_name, pkg);

        // Interface receiver: record for the finalizer, or dispatch through
        // a pre-declared interface binding.
        if type_ref.kind == TypeKind::Interface {
            return self.interface_method(&type_ref, sel, pkg);
        }

        // Struct field?
        if let Some(field) = type_ref
            .struct_info
            .as_ref()
            .and_then(|s| s.fields.iter().find(|f| f.name == sel.name))
        {
            let field_type = field.field_type.clone();
            return self.field_access(base, &sel.name, &field_type);
        }

        // Method lookup, embedded promotion included.
        match self.lookup_method(base.clone(), &type_ref, recv_is_ptr, &sel.name) {
            MethodLookup::Found(obj) => obj,
            MethodLookup::Ambiguous => self.error_at(
                sel.pos,
                pkg,
                format!("ambiguous selector {}.{}", type_name, sel.name),
            ),
            MethodLookup::Missing => {
                if type_ref.unresolved {
                    // Out-of-policy receiver type: consult the shallow scan
                    // for the method's signature when sources exist.
                    return self.unresolved_method(&type_ref, sel);
                }
                // An unknown selector on a resolved type: tolerate with a
                // placeholder when the field set itself is unknown.
                if type_ref.struct_info.is_none() {
                    return Object::placeholder(format!(
                        "selection {}.{}",
                        type_name, sel.name
                    ));
                }
                self.error_at(
                    sel.pos,
                    pkg,
                    format!("undefined field or method {}.{}", type_name, sel.name),
                )
            }
        }
    }

    /// The static type used for selection: a variable's declared type wins
    /// over its current value.
    pub(crate) fn static_type_of(&mut self, obj: &Object) -> Option<FieldType> {
        match obj {
            Object::Var(id) => {
                let declared = self.vars[id.index()].declared.clone();
                if declared.is_some() {
                    return declared;
                }
                let value = self.value_of(obj);
                self.static_type_of(&value)
            }
            Object::Pointer(data) => {
                let inner = self
                    .static_type_of(&data.pointee)
                    .or_else(|| data.typ.clone())?;
                Some(FieldType::Pointer(Box::new(inner)))
            }
            other => self.dynamic_type(other),
        }
    }

    /// Lazily materializes a field on instance-backed receivers; symbolic
    /// receivers yield a placeholder of the field's type.
    fn field_access(&mut self, base: &Object, name: &str, field_type: &FieldType) -> Object {
        let resolved = self.value_of(base);
        if let Some(instance) = self.deref_to_instance(&resolved) {
            if let Some(existing) = self.instances[instance.index()].fields.get(name) {
                return existing.clone();
            }
            let fresh = Object::typed_placeholder("field", field_type.clone());
            self.instances[instance.index()]
                .fields
                .insert(name.to_owned(), fresh.clone());
            return fresh;
        }
        Object::typed_placeholder("field", field_type.clone())
    }

    fn interface_method(&mut self, iface: &TypeRef, sel: &Ident, pkg: PkgId) -> Object {
        // Pre-declared binding: dispatch as if the receiver had the bound
        // concrete type.
        if let Some(concrete) = self.iface_bindings.get(&iface.qualified_name()).cloned() {
            if let Some((cpkg, cname)) = concrete.rsplit_once('.') {
                let concrete_ref = self.resolve_named(Some(cpkg), cname, pkg);
                let recv = Object::typed_placeholder(
                    "bound interface receiver",
                    FieldType::qualified(cpkg, cname),
                );
                if let MethodLookup::Found(obj) =
                    self.lookup_method(recv, &concrete_ref, true, &sel.name)
                {
                    return obj;
                }
            }
        }

        let methods = self.flatten_interface(iface);
        let Some(method) = methods.iter().find(|m| m.name == sel.name) else {
            return Object::placeholder(format!(
                "unknown interface method {}.{}",
                iface.qualified_name(),
                sel.name
            ));
        };
        let info = synth_iface_method(iface, method);
        Object::Placeholder(Box::new(PlaceholderData {
            reason: format!("interface method {}.{}", iface.qualified_name(), sel.name),
            typ: None,
            func: Some(info),
            pkg_path: Some(iface.pkg_path.clone()),
            iface: Some(IfaceRef {
                iface: Rc::clone(iface),
                method: sel.name.clone(),
            }),
            possible_types: Vec::new(),
        }))
    }

    /// Method on an unresolved (out-of-policy) receiver type: the shallow
    /// scan supplies the signature when the package's sources exist.
    fn unresolved_method(&mut self, typ: &TypeRef, sel: &Ident) -> Object {
        let owner = self.resolve_pkg(&typ.pkg_path.clone());
        let func = self.pkgs[owner.index()].info.clone().and_then(|info| {
            info.methods_of(&typ.name)
                .find(|m| m.name == sel.name)
                .cloned()
        });
        Object::Placeholder(Box::new(PlaceholderData {
            reason: format!(
                "method {}.{} on unresolved type",
                typ.qualified_name(),
                sel.name
            ),
            typ: None,
            func,
            pkg_path: Some(typ.pkg_path.clone()),
            iface: None,
            possible_types: Vec::new(),
        }))
    }

    /// Method expression `T.M` / `(*T).M`: the interned method, unbound.
    fn method_expression(&mut self, typ: &TypeRef, sel: &Ident) -> Object {
        if typ.pkg_path.is_empty() {
            return Object::placeholder(format!("method expression on {}", typ.name));
        }
        let owner = self.resolve_pkg(&typ.pkg_path.clone());
        let method = self.pkgs[owner.index()].info.clone().and_then(|info| {
            info.methods_of(&typ.name)
                .find(|m| m.name == sel.name)
                .cloned()
        });
        match method {
            Some(info) if self.pkgs[owner.index()].in_policy => {
                let fid = self.intern_declared_func(owner, &info);
                Object::Func(fid)
            }
            Some(info) => Object::Placeholder(Box::new(PlaceholderData {
                reason: "out-of-policy method expression".to_owned(),
                typ: None,
                func: Some(info),
                pkg_path: Some(typ.pkg_path.clone()),
                iface: None,
                possible_types: Vec::new(),
            })),
            None => Object::placeholder(format!(
                "unknown method expression {}.{}",
                typ.qualified_name(),
                sel.name
            )),
        }
    }

    /// Direct then embedded method lookup.
    pub(crate) fn lookup_method(
        &mut self,
        recv: Object,
        typ: &TypeRef,
        recv_is_ptr: bool,
        name: &str,
    ) -> MethodLookup {
        let mut visited = ahash::AHashSet::new();
        // Breadth-first over the embedding graph: each level holds
        // `(type, receiver value for that path, pointer-ness)`.
        let mut level: Vec<(TypeRef, Object, bool)> = vec![(Rc::clone(typ), recv, recv_is_ptr)];
        while !level.is_empty() {
            let mut hits: Vec<Object> = Vec::new();
            let mut next: Vec<(TypeRef, Object, bool)> = Vec::new();
            for (current, current_recv, is_ptr) in level {
                if !visited.insert(current.qualified_name()) {
                    continue;
                }
                if let Some(obj) =
                    self.direct_method(&current, &current_recv, is_ptr, name)
                {
                    hits.push(obj);
                    continue;
                }
                // Interface embedded in a struct promotes its contract.
                if current.kind == TypeKind::Interface {
                    let methods = self.flatten_interface(&current);
                    if let Some(method) = methods.iter().find(|m| m.name == name) {
                        let info = synth_iface_method(&current, method);
                        hits.push(Object::Placeholder(Box::new(PlaceholderData {
                            reason: format!(
                                "interface method {}.{name}",
                                current.qualified_name()
                            ),
                            typ: None,
                            func: Some(info),
                            pkg_path: Some(current.pkg_path.clone()),
                            iface: Some(IfaceRef {
                                iface: Rc::clone(&current),
                                method: name.to_owned(),
                            }),
                            possible_types: Vec::new(),
                        })));
                        continue;
                    }
                }
                if let Some(struct_info) = &current.struct_info {
                    for field in struct_info.fields.iter().filter(|f| f.embedded) {
                        let (embedded_type, embedded_ptr) = strip_pointer(&field.field_type);
                        let Some((epkg, ename)) = embedded_type.base_name() else {
                            continue;
                        };
                        let (epkg, ename) = (epkg.clone(), ename.to_owned());
                        let owner = self.type_owner_pkg(&current);
                        let resolved =
                            self.resolve_named(epkg.as_deref(), &ename, owner);
                        let field_value =
                            self.field_access(&current_recv, &field.name, &field.field_type);
                        next.push((resolved, field_value, embedded_ptr || is_ptr));
                    }
                }
            }
            match hits.len() {
                0 => {}
                1 => return MethodLookup::Found(hits.pop().expect("len checked")),
                _ => return MethodLookup::Ambiguous,
            }
            level = next;
        }
        MethodLookup::Missing
    }

    /// A method declared directly on `typ` in its owning package.
    fn direct_method(
        &mut self,
        typ: &TypeRef,
        recv: &Object,
        recv_is_ptr: bool,
        name: &str,
    ) -> Option<Object> {
        if typ.pkg_path.is_empty() {
            return None;
        }
        let owner = self.resolve_pkg(&typ.pkg_path.clone());
        let info = self.pkgs[owner.index()].info.clone()?;
        let method = info
            .methods_of(&typ.name)
            .find(|m| m.name == name)
            .cloned()?;
        // Pointer methods need a `*T` or an addressable `T`; everything the
        // evaluator models (variables, instances, fields) is addressable, so
        // only plainly non-addressable receivers are rejected.
        if method.recv.as_ref().is_some_and(|r| r.pointer)
            && !recv_is_ptr
            && !is_addressable(recv)
        {
            return None;
        }
        if self.pkgs[owner.index()].in_policy {
            let fid = self.intern_declared_func(owner, &method);
            Some(Object::BoundMethod(Box::new(
                crate::object::BoundMethodData {
                    recv: recv.clone(),
                    func: fid,
                },
            )))
        } else {
            Some(Object::Placeholder(Box::new(PlaceholderData {
                reason: format!("out-of-policy method {}", method.qualified_name()),
                typ: None,
                func: Some(method),
                pkg_path: Some(typ.pkg_path.clone()),
                iface: None,
                possible_types: Vec::new(),
            })))
        }
    }

    /// The package a `TypeInfo` was declared in, resolved for qualifier
    /// context when walking its field types.
    pub(crate) fn type_owner_pkg(&mut self, typ: &TypeRef) -> PkgId {
        if typ.pkg_path.is_empty() {
            PkgId::new(0)
        } else {
            self.resolve_pkg(&typ.pkg_path.clone())
        }
    }
}

/// Outcome of a method lookup.
pub(crate) enum MethodLookup {
    Found(Object),
    Ambiguous,
    Missing,
}

fn strip_pointer(ft: &FieldType) -> (FieldType, bool) {
    match ft {
        FieldType::Pointer(inner) => ((**inner).clone(), true),
        other => (other.clone(), false),
    }
}

/// Values whose address the evaluator can take: variables and everything
/// instance-backed.
fn is_addressable(obj: &Object) -> bool {
    matches!(
        obj,
        Object::Var(_) | Object::Instance(_) | Object::Pointer(_) | Object::Placeholder(_)
    )
}

/// A synthetic `FunctionInfo` describing one interface method, so calls
/// through the interface carry a signature for the default intrinsic and
/// placeholder result typing.
fn synth_iface_method(iface: &TypeRef, method: &MethodSig) -> Rc<FunctionInfo> {
    Rc::new(FunctionInfo {
        name: method.name.clone(),
        pkg_path: iface.pkg_path.clone(),
        recv: Some(ReceiverInfo {
            name: None,
            base_type: iface.name.clone(),
            pointer: false,
        }),
        type_params: Vec::new(),
        params: method
            .params
            .iter()
            .map(|t| ParamInfo {
                name: None,
                field_type: t.clone(),
                variadic: matches!(t, FieldType::Variadic(_)),
            })
            .collect(),
        results: method
            .results
            .iter()
            .map(|t| ParamInfo {
                name: None,
                field_type: t.clone(),
                variadic: false,
            })
            .collect(),
        sig: Rc::new(FuncSig::default()),
        body: None,
        pos: iface.pos,
    })
}
