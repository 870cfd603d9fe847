//! Lexically nested environments.
//!
//! All scopes live in one central [`Envs`] store and link to their parent by
//! id; frames and closures hold `EnvId`s instead of references, so the
//! evaluator can mutate any scope without aliasing gymnastics. Bindings use
//! `IndexMap` so package environments iterate in declaration order, which
//! the finalizer depends on for determinism.

use indexmap::IndexMap;

use crate::object::{EnvId, Object};

#[derive(Debug, Clone)]
struct Scope {
    bindings: IndexMap<String, Object>,
    outer: Option<EnvId>,
}

/// Storage for all environment scopes of one interpreter session.
#[derive(Debug, Clone, Default)]
pub(crate) struct Envs {
    scopes: Vec<Scope>,
}

impl Envs {
    pub fn new() -> Envs {
        Envs::default()
    }

    /// Creates a scope whose lookups fall through to `outer`.
    pub fn push(&mut self, outer: Option<EnvId>) -> EnvId {
        let id = EnvId::new(self.scopes.len());
        self.scopes.push(Scope {
            bindings: IndexMap::new(),
            outer,
        });
        id
    }

    /// Walks outward from `env` until a binding for `name` is found.
    pub fn get(&self, env: EnvId, name: &str) -> Option<&Object> {
        let mut cursor = Some(env);
        while let Some(id) = cursor {
            let scope = &self.scopes[id.index()];
            if let Some(obj) = scope.bindings.get(name) {
                return Some(obj);
            }
            cursor = scope.outer;
        }
        None
    }

    /// Writes to the innermost scope already containing `name`; creates the
    /// binding in `env` itself when no scope has one.
    pub fn set(&mut self, env: EnvId, name: &str, obj: Object) {
        let mut cursor = Some(env);
        while let Some(id) = cursor {
            let scope = &mut self.scopes[id.index()];
            if scope.bindings.contains_key(name) {
                scope.bindings.insert(name.to_owned(), obj);
                return;
            }
            cursor = scope.outer;
        }
        self.set_local(env, name, obj);
    }

    /// Binds in `env` without walking outward.
    pub fn set_local(&mut self, env: EnvId, name: &str, obj: Object) {
        self.scopes[env.index()]
            .bindings
            .insert(name.to_owned(), obj);
    }

    pub fn contains_local(&self, env: EnvId, name: &str) -> bool {
        self.scopes[env.index()].bindings.contains_key(name)
    }

    /// Iterates the bindings of one scope, in insertion order. Used to
    /// enumerate package-level symbols during finalization.
    pub fn iter_local(&self, env: EnvId) -> impl Iterator<Item = (&String, &Object)> {
        self.scopes[env.index()].bindings.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_outward_and_set_finds_home_scope() {
        let mut envs = Envs::new();
        let root = envs.push(None);
        let inner = envs.push(Some(root));

        envs.set_local(root, "x", Object::Int(1));
        assert!(matches!(envs.get(inner, "x"), Some(Object::Int(1))));

        // set() rebinds in the owning scope, not locally.
        envs.set(inner, "x", Object::Int(2));
        assert!(matches!(envs.get(root, "x"), Some(Object::Int(2))));
        assert!(!envs.contains_local(inner, "x"));

        // set() creates locally when the name is unbound anywhere.
        envs.set(inner, "y", Object::Int(3));
        assert!(envs.contains_local(inner, "y"));
        assert!(envs.get(root, "y").is_none());

        // set_local() shadows without touching the outer binding.
        envs.set_local(inner, "x", Object::Int(9));
        assert!(matches!(envs.get(inner, "x"), Some(Object::Int(9))));
        assert!(matches!(envs.get(root, "x"), Some(Object::Int(2))));
    }
}
