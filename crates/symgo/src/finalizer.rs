//! The deferred interface-dispatch finalizer.
//!
//! After all entry points ran, every recorded interface method call is
//! matched against every named type of every in-policy package. A type
//! implements an interface when its method set (direct methods plus
//! embedded promotion, under the pointer/value receiver rules) covers the
//! interface's full contract with assignable signatures. For each
//! implementer the concrete method is located and the default intrinsic is
//! fired with it, which is how downstream tools learn the method is
//! reachable. Visit order is lexical `(pkgPath, typeName)`; repeated runs
//! produce identical observation sequences.

use std::rc::Rc;

use indexmap::IndexMap;
use symgo_scan::{FieldType, FunctionInfo, MethodSig, TypeKind, TypeRef};

use crate::{
    eval::call::qualify_field_type,
    interp::Interpreter,
    object::{Object, PkgId},
};

impl Interpreter {
    pub(crate) fn finalize_interfaces(&mut self) {
        let records = self.iface_calls.clone();
        for record in records {
            let contract = self.flatten_interface(&record.iface);
            if contract.is_empty() {
                continue;
            }
            let iface_pkg = record.iface.pkg_path.clone();

            let mut candidates: Vec<PkgId> = (0..self.pkgs.len())
                .map(PkgId::new)
                .filter(|id| {
                    self.pkgs[id.index()].in_policy && self.pkgs[id.index()].info.is_some()
                })
                .collect();
            candidates.sort_by(|a, b| {
                self.pkgs[a.index()].path.cmp(&self.pkgs[b.index()].path)
            });

            for pkg_id in candidates {
                let info = self.pkgs[pkg_id.index()]
                    .info
                    .clone()
                    .expect("filtered on info presence");
                let mut types: Vec<TypeRef> = info
                    .types
                    .iter()
                    .filter(|t| matches!(t.kind, TypeKind::Struct | TypeKind::Named))
                    .cloned()
                    .collect();
                types.sort_by(|a, b| a.name.cmp(&b.name));

                for typ in types {
                    let method_set = self.method_set(&typ);
                    if !implements(&contract, &iface_pkg, &method_set) {
                        continue;
                    }
                    let Some((owner_path, concrete)) = method_set.get(&record.method) else {
                        continue;
                    };
                    let (owner_path, concrete) = (owner_path.clone(), Rc::clone(concrete));
                    let owner = self.resolve_pkg(&owner_path);
                    if !self.pkgs[owner.index()].in_policy {
                        continue;
                    }
                    let fid = self.intern_declared_func(owner, &concrete);
                    self.observe_call(&Object::Func(fid), &[]);
                }
            }
        }
    }

    /// The concrete method set of a named type: direct methods first, then
    /// embedded promotion breadth-first. Shallower declarations win; two
    /// methods of the same name at the same depth cancel each other
    /// (ambiguous selector) and stay excluded at every deeper level, the
    /// same way `lookup_method` refuses the selector outright.
    pub(crate) fn method_set(
        &mut self,
        typ: &TypeRef,
    ) -> IndexMap<String, (String, Rc<FunctionInfo>)> {
        let mut out: IndexMap<String, (String, Rc<FunctionInfo>)> = IndexMap::new();
        let mut visited = ahash::AHashSet::new();
        // Every method name observed at any level, ambiguous or not; a
        // deeper declaration of such a name must not be promoted.
        let mut seen: ahash::AHashSet<String> = ahash::AHashSet::new();
        let mut level: Vec<TypeRef> = vec![Rc::clone(typ)];

        while !level.is_empty() {
            let mut found_here: IndexMap<String, Vec<(String, Rc<FunctionInfo>)>> =
                IndexMap::new();
            let mut next: Vec<TypeRef> = Vec::new();

            for current in level {
                if current.pkg_path.is_empty() || !visited.insert(current.qualified_name()) {
                    continue;
                }
                let owner = self.resolve_pkg(&current.pkg_path.clone());
                if let Some(info) = self.pkgs[owner.index()].info.clone() {
                    for method in info.methods_of(&current.name) {
                        found_here
                            .entry(method.name.clone())
                            .or_default()
                            .push((current.pkg_path.clone(), Rc::clone(method)));
                    }
                }
                if let Some(struct_info) = &current.struct_info {
                    for field in struct_info.fields.iter().filter(|f| f.embedded) {
                        let stripped = match &field.field_type {
                            FieldType::Pointer(inner) => (**inner).clone(),
                            other => other.clone(),
                        };
                        let Some((epkg, ename)) = stripped.base_name() else {
                            continue;
                        };
                        let (epkg, ename) = (epkg.clone(), ename.to_owned());
                        let resolved = self.resolve_named(epkg.as_deref(), &ename, owner);
                        next.push(resolved);
                    }
                }
            }

            for (name, mut hits) in found_here {
                if !seen.insert(name.clone()) {
                    continue; // settled (or poisoned) at a shallower depth
                }
                if hits.len() == 1 {
                    out.insert(name, hits.pop().expect("len checked"));
                }
                // ties at equal depth are ambiguous and promote nothing,
                // here or at any deeper level
            }
            level = next;
        }
        out
    }

}

/// Whether a method set covers an interface contract with assignable
/// signatures.
fn implements(
    contract: &[MethodSig],
    iface_pkg: &str,
    method_set: &IndexMap<String, (String, Rc<FunctionInfo>)>,
) -> bool {
    contract.iter().all(|wanted| {
        method_set
            .get(&wanted.name)
            .is_some_and(|(_, concrete)| signature_matches(wanted, iface_pkg, concrete))
    })
}

/// Assignability: parameter and result types equal after resolution,
/// compared structurally; unresolved named types compare by qualified name.
fn signature_matches(wanted: &MethodSig, iface_pkg: &str, concrete: &FunctionInfo) -> bool {
    if wanted.params.len() != concrete.params.len()
        || wanted.results.len() != concrete.results.len()
    {
        return false;
    }
    let wanted_params = wanted
        .params
        .iter()
        .map(|t| qualify_field_type(t, iface_pkg, &[]).id());
    let concrete_params = concrete
        .params
        .iter()
        .map(|p| qualify_field_type(&p.field_type, &concrete.pkg_path, &concrete.type_params).id());
    if wanted_params.ne(concrete_params) {
        return false;
    }
    let wanted_results = wanted
        .results
        .iter()
        .map(|t| qualify_field_type(t, iface_pkg, &[]).id());
    let concrete_results = concrete
        .results
        .iter()
        .map(|r| qualify_field_type(&r.field_type, &concrete.pkg_path, &concrete.type_params).id());
    wanted_results.eq(concrete_results)
}
