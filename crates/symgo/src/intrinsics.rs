//! The intrinsics registry.
//!
//! Intrinsics are host-provided stubs replacing or observing the evaluation
//! of named source functions. The registry is a base map plus a stack of
//! pushable overlay layers for temporary rebinding (a scoped test can shadow
//! an intrinsic and pop the layer afterwards). Keys are fully qualified
//! names: `pkg/path.Func`, `(pkg/path.Type).Method` or
//! `(*pkg/path.Type).Method`.
//!
//! The distinguished *default intrinsic* is separate: it is invoked for
//! every call the evaluator resolves (concrete function, method, or
//! placeholder with a known underlying signature) and is the hook by which
//! downstream tools observe "this function was reached".

use std::{fmt, rc::Rc};

use ahash::AHashMap;

use crate::{interp::Interpreter, object::Object};

/// A host function: receives the interpreter and the evaluated arguments.
pub type IntrinsicFn = Rc<dyn Fn(&mut Interpreter, &[Object]) -> Object>;

/// The usage-observation hook: receives the callee object and the arguments.
pub type DefaultIntrinsicFn = Rc<dyn Fn(&mut Interpreter, &Object, &[Object])>;

/// A named intrinsic, cheap to clone into [`Object::Intrinsic`] values.
#[derive(Clone)]
pub struct IntrinsicObj {
    name: Rc<str>,
    func: IntrinsicFn,
}

impl IntrinsicObj {
    pub fn new(name: impl AsRef<str>, func: IntrinsicFn) -> IntrinsicObj {
        IntrinsicObj {
            name: Rc::from(name.as_ref()),
            func,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn invoke(&self, interp: &mut Interpreter, args: &[Object]) -> Object {
        (self.func)(interp, args)
    }
}

impl fmt::Debug for IntrinsicObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntrinsicObj")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Base layer plus overlay stack of qualified-name → intrinsic bindings.
#[derive(Default)]
pub(crate) struct IntrinsicsRegistry {
    base: AHashMap<String, IntrinsicObj>,
    overlays: Vec<AHashMap<String, IntrinsicObj>>,
}

impl IntrinsicsRegistry {
    pub fn new() -> IntrinsicsRegistry {
        IntrinsicsRegistry::default()
    }

    /// Registers into the topmost layer (the base when no overlay is
    /// pushed).
    pub fn register(&mut self, key: impl Into<String>, func: IntrinsicFn) {
        let key = key.into();
        let obj = IntrinsicObj::new(&key, func);
        match self.overlays.last_mut() {
            Some(top) => {
                top.insert(key, obj);
            }
            None => {
                self.base.insert(key, obj);
            }
        }
    }

    /// Looks a key up, overlay-top downward, then the base layer.
    pub fn get(&self, key: &str) -> Option<&IntrinsicObj> {
        for layer in self.overlays.iter().rev() {
            if let Some(obj) = layer.get(key) {
                return Some(obj);
            }
        }
        self.base.get(key)
    }

    pub fn push_overlay(&mut self) {
        self.overlays.push(AHashMap::new());
    }

    /// Pops the topmost overlay; a no-op on the bare base layer.
    pub fn pop_overlay(&mut self) {
        self.overlays.pop();
    }
}

impl fmt::Debug for IntrinsicsRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntrinsicsRegistry")
            .field("base", &self.base.len())
            .field("overlays", &self.overlays.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub(tag: i64) -> IntrinsicFn {
        Rc::new(move |_, _| Object::Int(tag))
    }

    #[test]
    fn overlays_shadow_and_pop() {
        let mut reg = IntrinsicsRegistry::new();
        reg.register("pkg.F", stub(1));
        assert_eq!(reg.get("pkg.F").unwrap().name(), "pkg.F");

        reg.push_overlay();
        reg.register("pkg.F", stub(2));
        reg.register("pkg.G", stub(3));
        assert!(reg.get("pkg.G").is_some());

        reg.pop_overlay();
        assert!(reg.get("pkg.G").is_none(), "overlay bindings vanish on pop");
        assert!(reg.get("pkg.F").is_some(), "base bindings survive");
    }
}
