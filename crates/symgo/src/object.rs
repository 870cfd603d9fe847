//! The symbolic object model.
//!
//! Every value produced by evaluation is an [`Object`]. The enum uses a
//! hybrid design: small immediate values (integers, strings, signals) are
//! stored inline, while shared mutable state (variables, instances,
//! functions, packages, environments) lives in central id-indexed storage
//! owned by the interpreter and is referenced by copyable ids. Id equality
//! is the "pointer identity" the engine's invariants are stated in terms of.
//!
//! NOTE: `Clone` is cheap by construction: the largest inline payloads are a
//! `String` or a boxed node. Keep it that way; objects are cloned on every
//! binding and merge.

use std::{fmt, rc::Rc};

use indexmap::IndexSet;
use smallvec::SmallVec;
use symgo_scan::{FieldType, FunctionInfo, Position, TypeRef};

use crate::intrinsics::IntrinsicObj;

/// Evaluated call arguments. Almost every call site passes a handful of
/// values, so they stay inline.
pub(crate) type ArgVec = SmallVec<[Object; 4]>;

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub(crate) fn new(index: usize) -> Self {
                Self(u32::try_from(index).expect("id space exhausted"))
            }

            #[inline]
            pub(crate) fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

define_id!(
    /// Identity of a variable cell. Closures and pointers share the cell,
    /// not a copy of its value.
    VarId
);
define_id!(
    /// Identity of an instance (struct-like value with lazily created
    /// fields).
    InstanceId
);
define_id!(
    /// Identity of a function closure. Functions are interned by declaration
    /// position, so id equality means "same function" for memoization and
    /// usage tracking.
    FuncId
);
define_id!(
    /// Identity of a package, interned by import path.
    PkgId
);
define_id!(
    /// Identity of one environment scope.
    EnvId
);

/// A symbolic value.
#[derive(Debug, Clone)]
pub enum Object {
    // Concrete primitives.
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Complex constants are carried opaquely; no arithmetic folds on them.
    Complex,
    Rune(char),
    Str(String),

    // Shared state, by id.
    Var(VarId),
    Instance(InstanceId),
    Func(FuncId),
    Pkg(PkgId),

    // Structured values.
    Pointer(Box<PointerData>),
    Slice(Box<SliceData>),
    Map(Box<MapData>),
    Chan(Box<ChanData>),
    BoundMethod(Box<BoundMethodData>),
    /// A generic function with explicit type arguments, awaiting a call.
    Instantiated(Box<InstantiatedData>),
    Intrinsic(IntrinsicObj),
    /// A call target in a package that could not be loaded; resolution is
    /// retried at application time.
    UnresolvedFunc(Box<UnresolvedFuncData>),
    /// "Some value of this type"; the workhorse of best-effort evaluation.
    Placeholder(Box<PlaceholderData>),
    /// A reified type: operand of `new`, a conversion, a switch case.
    Type(TypeRef),
    /// Multi-value return.
    Multi(Vec<Object>),

    // Control-flow signals. Once produced, enclosing blocks propagate them
    // without further side effects.
    Return(Box<Object>),
    Break(Option<String>),
    Continue(Option<String>),
    Fallthrough,
    Error(Box<ErrorData>),
}

impl Object {
    pub fn placeholder(reason: impl Into<String>) -> Object {
        Object::Placeholder(Box::new(PlaceholderData {
            reason: reason.into(),
            typ: None,
            func: None,
            pkg_path: None,
            iface: None,
            possible_types: Vec::new(),
        }))
    }

    pub fn typed_placeholder(reason: impl Into<String>, typ: FieldType) -> Object {
        Object::Placeholder(Box::new(PlaceholderData {
            reason: reason.into(),
            typ: Some(typ),
            func: None,
            pkg_path: None,
            iface: None,
            possible_types: Vec::new(),
        }))
    }

    /// Whether this object is a control-flow signal that must propagate.
    pub fn is_signal(&self) -> bool {
        matches!(
            self,
            Object::Return(_)
                | Object::Break(_)
                | Object::Continue(_)
                | Object::Fallthrough
                | Object::Error(_)
        )
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Object::Error(_))
    }

    /// Conservative concrete equality: true only when both sides are
    /// primitives (or identical ids) known to be equal. Used by the branch
    /// merger to decide whether two arms agreed on a value.
    pub fn same_concrete(&self, other: &Object) -> bool {
        match (self, other) {
            (Object::Nil, Object::Nil) => true,
            (Object::Bool(a), Object::Bool(b)) => a == b,
            (Object::Int(a), Object::Int(b)) => a == b,
            (Object::Float(a), Object::Float(b)) => (a - b).abs() == 0.0,
            (Object::Rune(a), Object::Rune(b)) => a == b,
            (Object::Str(a), Object::Str(b)) => a == b,
            (Object::Var(a), Object::Var(b)) => a == b,
            (Object::Instance(a), Object::Instance(b)) => a == b,
            (Object::Func(a), Object::Func(b)) => a == b,
            (Object::Pkg(a), Object::Pkg(b)) => a == b,
            _ => false,
        }
    }

    /// A short human-readable description of the object's kind and type,
    /// used in diagnostics and recursion fingerprints.
    pub fn type_describe(&self) -> String {
        match self {
            Object::Nil => "nil".to_owned(),
            Object::Bool(_) => "bool".to_owned(),
            Object::Int(_) => "int".to_owned(),
            Object::Float(_) => "float64".to_owned(),
            Object::Complex => "complex128".to_owned(),
            Object::Rune(_) => "rune".to_owned(),
            Object::Str(_) => "string".to_owned(),
            Object::Var(id) => format!("var#{}", id.0),
            Object::Instance(id) => format!("instance#{}", id.0),
            Object::Func(id) => format!("func#{}", id.0),
            Object::Pkg(id) => format!("package#{}", id.0),
            Object::Pointer(p) => match &p.typ {
                Some(t) => format!("*{t}"),
                None => "*?".to_owned(),
            },
            Object::Slice(s) => match &s.elem {
                Some(t) => format!("[]{t}"),
                None => "[]?".to_owned(),
            },
            Object::Map(m) => match (&m.key, &m.value) {
                (Some(k), Some(v)) => format!("map[{k}]{v}"),
                _ => "map[?]?".to_owned(),
            },
            Object::Chan(c) => {
                let elem = c.elem.as_ref().map_or_else(|| "?".to_owned(), ToString::to_string);
                match c.dir {
                    ChanDirection::Both => format!("chan {elem}"),
                    ChanDirection::Send => format!("chan<- {elem}"),
                    ChanDirection::Recv => format!("<-chan {elem}"),
                }
            }
            Object::BoundMethod(b) => format!("method#{}", b.func.0),
            Object::Instantiated(i) => format!("generic#{}", i.func.0),
            Object::Intrinsic(i) => format!("intrinsic {}", i.name()),
            Object::UnresolvedFunc(u) => format!("{}.{}", u.pkg_path, u.name),
            Object::Placeholder(p) => match &p.typ {
                Some(t) => t.to_string(),
                None => "?".to_owned(),
            },
            Object::Type(t) => format!("type {}", t.qualified_name()),
            Object::Multi(values) => format!("({} values)", values.len()),
            Object::Return(_) => "return".to_owned(),
            Object::Break(_) => "break".to_owned(),
            Object::Continue(_) => "continue".to_owned(),
            Object::Fallthrough => "fallthrough".to_owned(),
            Object::Error(e) => format!("error: {}", e.message),
        }
    }

    /// The structural type of this object, when one is known.
    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            Object::Bool(_) => Some(FieldType::named("bool")),
            Object::Int(_) => Some(FieldType::named("int")),
            Object::Float(_) => Some(FieldType::named("float64")),
            Object::Complex => Some(FieldType::named("complex128")),
            Object::Rune(_) => Some(FieldType::named("rune")),
            Object::Str(_) => Some(FieldType::named("string")),
            Object::Pointer(p) => p.typ.clone().map(|t| FieldType::Pointer(Box::new(t))),
            Object::Slice(s) => s.elem.clone().map(|t| FieldType::Slice(Box::new(t))),
            Object::Map(m) => match (&m.key, &m.value) {
                (Some(k), Some(v)) => Some(FieldType::Map {
                    key: Box::new(k.clone()),
                    value: Box::new(v.clone()),
                }),
                _ => None,
            },
            Object::Chan(c) => c.elem.clone().map(|t| FieldType::Chan { elem: Box::new(t) }),
            Object::Placeholder(p) => p.typ.clone(),
            _ => None,
        }
    }
}

/// An addressable reference. When the pointee is a [`Object::Var`], writes
/// through the pointer update the variable cell itself.
#[derive(Debug, Clone)]
pub struct PointerData {
    pub pointee: Object,
    /// Element type (`T` for a `*T`).
    pub typ: Option<FieldType>,
}

#[derive(Debug, Clone)]
pub struct SliceData {
    pub elem: Option<FieldType>,
    /// Known length; `None` when symbolic.
    pub len: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct MapData {
    pub key: Option<FieldType>,
    pub value: Option<FieldType>,
}

/// Channel direction, as declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChanDirection {
    Both,
    Send,
    Recv,
}

#[derive(Debug, Clone)]
pub struct ChanData {
    pub elem: Option<FieldType>,
    pub dir: ChanDirection,
}

#[derive(Debug, Clone)]
pub struct BoundMethodData {
    pub recv: Object,
    pub func: FuncId,
}

#[derive(Debug, Clone)]
pub struct InstantiatedData {
    pub func: FuncId,
    pub type_args: Vec<FieldType>,
}

#[derive(Debug, Clone)]
pub struct UnresolvedFuncData {
    pub pkg_path: String,
    pub name: String,
}

/// The interface method a placeholder stands in for. Calls through such a
/// placeholder are recorded for the finalizer.
#[derive(Debug, Clone)]
pub struct IfaceRef {
    pub iface: TypeRef,
    pub method: String,
}

/// Payload of [`Object::Placeholder`].
#[derive(Debug, Clone)]
pub struct PlaceholderData {
    /// Why evaluation could not produce a concrete value.
    pub reason: String,
    /// Structural type of the value, when known.
    pub typ: Option<FieldType>,
    /// The function or method this placeholder stands in for, when it was
    /// produced for a call target whose body is not evaluated.
    pub func: Option<Rc<FunctionInfo>>,
    /// Defining package of `func`, when known.
    pub pkg_path: Option<String>,
    /// Set when this placeholder is an interface method value.
    pub iface: Option<IfaceRef>,
    /// Concrete types observed flowing into this value across merges.
    pub possible_types: Vec<FieldType>,
}

/// Classified failure, carried as a value so enclosing blocks can decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Ordinary evaluation failure (unknown identifier, bad operand, ...).
    General,
    /// An explicit `panic(v)`; convertible by a deferred `recover()`.
    Panic,
    /// The cancel token fired.
    Cancelled,
    /// The global frame budget was exhausted.
    Budget,
}

#[derive(Debug, Clone)]
pub struct ErrorData {
    pub kind: ErrorKind,
    pub message: String,
    pub position: Option<Position>,
    /// Innermost frame last, pre-rendered as `name (file:line:col)`.
    pub call_stack: Vec<String>,
    /// The panic argument, for `recover()`.
    pub payload: Option<Object>,
}

impl ErrorData {
    pub fn general(message: impl Into<String>) -> ErrorData {
        ErrorData {
            kind: ErrorKind::General,
            message: message.into(),
            position: None,
            call_stack: Vec::new(),
            payload: None,
        }
    }
}

impl fmt::Display for ErrorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.position {
            Some(pos) => write!(f, "{pos}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// A variable cell: named, mutable, shared by identity.
///
/// `possible_types` is monotone: types are only ever added over the cell's
/// life, including across merged branches.
#[derive(Debug, Clone)]
pub struct VarData {
    pub name: String,
    pub value: Object,
    /// Declared (static) type, when the declaration named one.
    pub declared: Option<FieldType>,
    pub possible_types: IndexSet<FieldType>,
    /// False while a package-level initializer is still pending.
    pub evaluated: bool,
    /// Pending initializer for lazy package-level variables: the expression,
    /// the index into its (possibly multi-) value, and the owning package.
    pub init: Option<(symgo_scan::ast::Expr, usize, PkgId)>,
}

/// A struct-like instance; fields are created lazily as they are touched.
#[derive(Debug, Clone)]
pub struct InstanceData {
    pub type_ref: Option<TypeRef>,
    pub typ: Option<FieldType>,
    pub fields: indexmap::IndexMap<String, Object>,
    /// Free-form scratch state for intrinsics.
    pub state: ahash::AHashMap<String, Object>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signals_are_recognized() {
        assert!(Object::Return(Box::new(Object::Int(1))).is_signal());
        assert!(Object::Break(None).is_signal());
        assert!(Object::Error(Box::new(ErrorData::general("x"))).is_signal());
        assert!(!Object::Int(1).is_signal());
        assert!(!Object::placeholder("x").is_signal());
    }

    #[test]
    fn concrete_equality_is_conservative() {
        assert!(Object::Int(3).same_concrete(&Object::Int(3)));
        assert!(!Object::Int(3).same_concrete(&Object::Int(4)));
        assert!(!Object::placeholder("a").same_concrete(&Object::placeholder("a")));
        assert!(Object::Var(VarId(7)).same_concrete(&Object::Var(VarId(7))));
    }
}
