//! Declaration info extracted by the scanner.
//!
//! These are the types the engine consumes: structural descriptions of the
//! packages, types, functions and constants found in source, decoupled from
//! the AST they were extracted from (function bodies stay attached via `Rc`
//! so the evaluator can walk them on demand).

use std::{fmt, rc::Rc};

use strum::{Display, IntoStaticStr};

use crate::{
    ast::{Block, Expr, FuncSig},
    position::{FileSet, Pos},
};

/// Shared handle to a scanned type.
pub type TypeRef = Rc<TypeInfo>;

/// The kind of a scanned type declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum TypeKind {
    Basic,
    Named,
    Alias,
    Struct,
    Interface,
    Func,
    Array,
    Slice,
    Map,
    Chan,
    Pointer,
}

/// A scanned type declaration (or a placeholder for one).
///
/// `unresolved` marks placeholders synthesized for types whose defining
/// package the scan policy refused to load; consumers must tolerate them
/// anywhere a `TypeInfo` is expected.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub name: String,
    pub pkg_path: String,
    pub kind: TypeKind,
    pub struct_info: Option<StructInfo>,
    pub interface_info: Option<InterfaceInfo>,
    /// Underlying type for `Named`/`Alias` declarations over non-struct,
    /// non-interface types (`type Celsius float64`).
    pub underlying: Option<FieldType>,
    pub type_params: Vec<String>,
    pub unresolved: bool,
    pub pos: Pos,
}

impl TypeInfo {
    /// A placeholder for a type in a package that was not scanned.
    pub fn unresolved(pkg_path: impl Into<String>, name: impl Into<String>) -> TypeInfo {
        TypeInfo {
            name: name.into(),
            pkg_path: pkg_path.into(),
            kind: TypeKind::Named,
            struct_info: None,
            interface_info: None,
            underlying: None,
            type_params: Vec::new(),
            unresolved: true,
            pos: Pos::NONE,
        }
    }

    /// A universe basic type (`int`, `string`, ...).
    pub fn basic(name: impl Into<String>) -> TypeInfo {
        TypeInfo {
            name: name.into(),
            pkg_path: String::new(),
            kind: TypeKind::Basic,
            struct_info: None,
            interface_info: None,
            underlying: None,
            type_params: Vec::new(),
            unresolved: false,
            pos: Pos::NONE,
        }
    }

    /// `pkg/path.Name`, or just `Name` for universe types.
    pub fn qualified_name(&self) -> String {
        if self.pkg_path.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.pkg_path, self.name)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StructInfo {
    pub fields: Vec<FieldInfo>,
}

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub field_type: FieldType,
    pub tag: Option<String>,
    pub embedded: bool,
}

#[derive(Debug, Clone, Default)]
pub struct InterfaceInfo {
    pub methods: Vec<MethodSig>,
    /// Embedded interfaces, to be resolved and flattened by the consumer.
    pub embedded: Vec<FieldType>,
}

/// One method of an interface contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSig {
    pub name: String,
    pub params: Vec<FieldType>,
    pub results: Vec<FieldType>,
}

/// A structural type reference, as written in a declaration.
///
/// Named references carry the import path of the defining package when the
/// scanner could map the qualifier through the file's imports; unqualified
/// names resolve within the declaring package (or the universe).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Named {
        pkg_path: Option<String>,
        name: String,
        type_args: Vec<FieldType>,
    },
    Pointer(Box<FieldType>),
    Slice(Box<FieldType>),
    Array {
        len: Option<i64>,
        elem: Box<FieldType>,
    },
    Map {
        key: Box<FieldType>,
        value: Box<FieldType>,
    },
    Chan {
        elem: Box<FieldType>,
    },
    Func {
        params: Vec<FieldType>,
        results: Vec<FieldType>,
    },
    /// `...T` in the last parameter position.
    Variadic(Box<FieldType>),
}

impl FieldType {
    pub fn named(name: impl Into<String>) -> FieldType {
        FieldType::Named {
            pkg_path: None,
            name: name.into(),
            type_args: Vec::new(),
        }
    }

    pub fn qualified(pkg_path: impl Into<String>, name: impl Into<String>) -> FieldType {
        FieldType::Named {
            pkg_path: Some(pkg_path.into()),
            name: name.into(),
            type_args: Vec::new(),
        }
    }

    /// The base named type this reference points at, skipping pointers,
    /// slices and variadic markers. `None` for maps, chans and func types.
    pub fn base_name(&self) -> Option<(&Option<String>, &str)> {
        match self {
            FieldType::Named { pkg_path, name, .. } => Some((pkg_path, name)),
            FieldType::Pointer(inner)
            | FieldType::Slice(inner)
            | FieldType::Variadic(inner) => inner.base_name(),
            FieldType::Array { elem, .. } => elem.base_name(),
            _ => None,
        }
    }

    /// Structural identity string, used for assignability comparison when
    /// full resolution is impossible. Unresolved named types compare by
    /// qualified name, compounds compare element-wise.
    pub fn id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Named {
                pkg_path,
                name,
                type_args,
            } => {
                match pkg_path {
                    Some(p) => write!(f, "{p}.{name}")?,
                    None => write!(f, "{name}")?,
                }
                if !type_args.is_empty() {
                    write!(f, "[")?;
                    for (i, arg) in type_args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    write!(f, "]")?;
                }
                Ok(())
            }
            FieldType::Pointer(inner) => write!(f, "*{inner}"),
            FieldType::Slice(inner) => write!(f, "[]{inner}"),
            FieldType::Array { len, elem } => match len {
                Some(n) => write!(f, "[{n}]{elem}"),
                None => write!(f, "[...]{elem}"),
            },
            FieldType::Map { key, value } => write!(f, "map[{key}]{value}"),
            FieldType::Chan { elem } => write!(f, "chan {elem}"),
            FieldType::Func { params, results } => {
                write!(f, "func(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ")")?;
                match results.len() {
                    0 => Ok(()),
                    1 => write!(f, " {}", results[0]),
                    _ => {
                        write!(f, " (")?;
                        for (i, r) in results.iter().enumerate() {
                            if i > 0 {
                                write!(f, ", ")?;
                            }
                            write!(f, "{r}")?;
                        }
                        write!(f, ")")
                    }
                }
            }
            FieldType::Variadic(inner) => write!(f, "...{inner}"),
        }
    }
}

/// The receiver of a scanned method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverInfo {
    pub name: Option<String>,
    /// Base type name within the declaring package.
    pub base_type: String,
    pub pointer: bool,
}

/// One parameter or result of a scanned function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamInfo {
    pub name: Option<String>,
    pub field_type: FieldType,
    pub variadic: bool,
}

/// A scanned function or method declaration.
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub name: String,
    pub pkg_path: String,
    pub recv: Option<ReceiverInfo>,
    pub type_params: Vec<String>,
    pub params: Vec<ParamInfo>,
    pub results: Vec<ParamInfo>,
    /// The AST signature, for parameter binding at application time.
    pub sig: Rc<FuncSig>,
    /// Absent for declarations without bodies (assembly or external).
    pub body: Option<Rc<Block>>,
    pub pos: Pos,
}

impl FunctionInfo {
    /// `pkg.Name`, `(pkg.T).Name` or `(*pkg.T).Name`: the intrinsics
    /// registry key format.
    pub fn qualified_name(&self) -> String {
        match &self.recv {
            None => format!("{}.{}", self.pkg_path, self.name),
            Some(recv) if recv.pointer => {
                format!("(*{}.{}).{}", self.pkg_path, recv.base_type, self.name)
            }
            Some(recv) => format!("({}.{}).{}", self.pkg_path, recv.base_type, self.name),
        }
    }
}

/// A scanned constant declaration.
#[derive(Debug, Clone)]
pub struct ConstantInfo {
    pub name: String,
    pub field_type: Option<FieldType>,
    /// Initializer expression; inherited from the previous group member when
    /// omitted, as the language's constant-group rule prescribes.
    pub value: Option<Expr>,
    /// Index within the declaration group, binding `iota`.
    pub iota: usize,
    pub pos: Pos,
}

/// A scanned package-level variable declaration.
///
/// Initializers are deliberately kept as unevaluated AST; the engine
/// evaluates them on first demand.
#[derive(Debug, Clone)]
pub struct VarInfo {
    pub name: String,
    pub field_type: Option<FieldType>,
    pub value: Option<Expr>,
    /// Index of this name within a multi-name, multi-value assignment.
    pub value_index: usize,
    pub pos: Pos,
}

/// One import recorded for a package (union over its files, source order).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportInfo {
    pub alias: Option<String>,
    pub path: String,
}

/// Everything the scanner extracted from one package.
#[derive(Debug, Clone)]
pub struct PackageInfo {
    pub path: String,
    /// Declared package name (the `package` clause), which may differ from
    /// the import path's basename.
    pub name: String,
    pub imports: Vec<ImportInfo>,
    pub types: Vec<TypeRef>,
    pub functions: Vec<Rc<FunctionInfo>>,
    pub constants: Vec<ConstantInfo>,
    pub vars: Vec<VarInfo>,
    pub fset: Rc<FileSet>,
}

impl PackageInfo {
    pub fn lookup_type(&self, name: &str) -> Option<&TypeRef> {
        self.types.iter().find(|t| t.name == name)
    }

    /// Top-level function (not method) by name.
    pub fn lookup_function(&self, name: &str) -> Option<&Rc<FunctionInfo>> {
        self.functions
            .iter()
            .find(|f| f.recv.is_none() && f.name == name)
    }

    /// Methods declared on `base_type`, in declaration order.
    pub fn methods_of<'a>(
        &'a self,
        base_type: &'a str,
    ) -> impl Iterator<Item = &'a Rc<FunctionInfo>> + 'a {
        self.functions
            .iter()
            .filter(move |f| f.recv.as_ref().is_some_and(|r| r.base_type == base_type))
    }
}
