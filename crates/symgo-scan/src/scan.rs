//! The scanner: parses a package's files and extracts declaration info.
//!
//! Sources live in an in-memory [`SourceSet`] (import path → file name →
//! source text); nothing here touches the filesystem. The engine consumes
//! the scanner only through the [`PackageResolver`] trait, so hosts can
//! substitute their own provider.

use std::rc::Rc;

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    ast::{Decl, Expr, Field, File, FuncDecl, TypeSpec, ValueSpec},
    error::ScanError,
    info::{
        ConstantInfo, FieldInfo, FieldType, FunctionInfo, ImportInfo, InterfaceInfo, MethodSig,
        PackageInfo, ParamInfo, ReceiverInfo, StructInfo, TypeInfo, TypeKind, VarInfo,
    },
    parser,
    position::FileSet,
};

/// Resolves import paths to scanned packages.
///
/// This is the engine's whole view of the scanner; implementations are
/// expected to be cheap to call repeatedly (the engine caches results per
/// interpreter, so each path is resolved at most once per session).
pub trait PackageResolver {
    fn resolve_package(&self, import_path: &str) -> Result<Rc<PackageInfo>, ScanError>;
}

/// In-memory store of source text, keyed by import path then file name.
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    packages: IndexMap<String, IndexMap<String, String>>,
}

impl SourceSet {
    pub fn new() -> SourceSet {
        SourceSet::default()
    }

    /// Adds (or replaces) one file of a package.
    pub fn add_file(
        &mut self,
        import_path: impl Into<String>,
        file_name: impl Into<String>,
        src: impl Into<String>,
    ) {
        self.packages
            .entry(import_path.into())
            .or_default()
            .insert(file_name.into(), src.into());
    }

    /// Adds a single-file package named `<basename>.go`.
    pub fn add_package(&mut self, import_path: &str, src: impl Into<String>) {
        let file = format!("{}.go", default_package_name(import_path));
        self.add_file(import_path, file, src);
    }

    pub fn contains(&self, import_path: &str) -> bool {
        self.packages.contains_key(import_path)
    }

    fn files(&self, import_path: &str) -> Option<&IndexMap<String, String>> {
        self.packages.get(import_path)
    }
}

/// The package name an unaliased import of `path` binds, by convention:
/// the path basename, with a trailing version segment (`v2`, `v11`, ...)
/// skipped and a dotted basename truncated at the first dot.
pub fn default_package_name(path: &str) -> &str {
    let mut segments = path.rsplit('/');
    let mut base = segments.next().unwrap_or(path);
    if is_version_segment(base) {
        if let Some(prev) = segments.next() {
            base = prev;
        }
    }
    match base.find('.') {
        Some(i) => &base[..i],
        None => base,
    }
}

fn is_version_segment(seg: &str) -> bool {
    let mut chars = seg.chars();
    chars.next() == Some('v') && chars.clone().next().is_some() && chars.all(|c| c.is_ascii_digit())
}

/// Parses packages out of a [`SourceSet`] and extracts their declarations.
#[derive(Debug, Clone)]
pub struct Scanner {
    sources: SourceSet,
}

impl Scanner {
    pub fn new(sources: SourceSet) -> Scanner {
        Scanner { sources }
    }

    pub fn sources(&self) -> &SourceSet {
        &self.sources
    }

    /// Scans one package: parses every file and extracts declaration info.
    ///
    /// Caching is deliberately left to the caller; the engine guarantees one
    /// scan per path per session.
    pub fn scan(&self, import_path: &str) -> Result<Rc<PackageInfo>, ScanError> {
        let files = self
            .sources
            .files(import_path)
            .ok_or_else(|| ScanError::UnknownPackage {
                path: import_path.to_owned(),
            })?;

        let mut fset = FileSet::new();
        let mut parsed: Vec<File> = Vec::new();
        for (name, src) in files {
            let base = fset.add_file(name, src);
            let file = parser::parse_file(src, base).map_err(|err| ScanError::Syntax {
                location: fset.position(err.pos),
                message: err.message,
            })?;
            parsed.push(file);
        }

        let pkg_name = parsed
            .first()
            .map_or_else(|| default_package_name(import_path).to_owned(), |f| {
                f.package.name.clone()
            });

        let mut extractor = Extractor {
            pkg_path: import_path,
            imports: Vec::new(),
            qualifiers: AHashMap::new(),
            types: Vec::new(),
            functions: Vec::new(),
            constants: Vec::new(),
            vars: Vec::new(),
        };
        for file in &parsed {
            extractor.file(file);
        }

        Ok(Rc::new(PackageInfo {
            path: import_path.to_owned(),
            name: pkg_name,
            imports: extractor.imports,
            types: extractor.types,
            functions: extractor.functions,
            constants: extractor.constants,
            vars: extractor.vars,
            fset: Rc::new(fset),
        }))
    }
}

impl PackageResolver for Scanner {
    fn resolve_package(&self, import_path: &str) -> Result<Rc<PackageInfo>, ScanError> {
        self.scan(import_path)
    }
}

/// Walks parsed files and accumulates declaration info for one package.
struct Extractor<'a> {
    pkg_path: &'a str,
    imports: Vec<ImportInfo>,
    /// Qualifier name → import path, for `FieldType` resolution.
    qualifiers: AHashMap<String, String>,
    types: Vec<Rc<TypeInfo>>,
    functions: Vec<Rc<FunctionInfo>>,
    constants: Vec<ConstantInfo>,
    vars: Vec<VarInfo>,
}

impl Extractor<'_> {
    fn file(&mut self, file: &File) {
        for spec in &file.imports {
            let alias = spec.alias.as_ref().map(|a| a.name.clone());
            let qualifier = alias
                .clone()
                .unwrap_or_else(|| default_package_name(&spec.path).to_owned());
            // First import wins on qualifier collisions.
            self.qualifiers
                .entry(qualifier)
                .or_insert_with(|| spec.path.clone());
            let info = ImportInfo {
                alias,
                path: spec.path.clone(),
            };
            if !self.imports.contains(&info) {
                self.imports.push(info);
            }
        }
        for decl in &file.decls {
            match decl {
                Decl::Import(_) => {}
                Decl::Type(specs) => {
                    for spec in specs {
                        let info = self.type_spec(spec);
                        self.types.push(Rc::new(info));
                    }
                }
                Decl::Func(decl) => {
                    let info = self.func_decl(decl);
                    self.functions.push(Rc::new(info));
                }
                Decl::Const(specs) => self.const_group(specs),
                Decl::Var(specs) => self.var_group(specs),
            }
        }
    }

    fn type_spec(&mut self, spec: &TypeSpec) -> TypeInfo {
        let type_params = spec
            .type_params
            .iter()
            .flat_map(|f| f.names.iter().map(|n| n.name.clone()))
            .collect();
        let mut info = TypeInfo {
            name: spec.name.name.clone(),
            pkg_path: self.pkg_path.to_owned(),
            kind: TypeKind::Named,
            struct_info: None,
            interface_info: None,
            underlying: None,
            type_params,
            unresolved: false,
            pos: spec.pos,
        };
        match spec.typ.unparen() {
            Expr::StructType { fields, .. } => {
                info.kind = TypeKind::Struct;
                info.struct_info = Some(self.struct_info(fields));
            }
            Expr::InterfaceType { elems, .. } => {
                info.kind = TypeKind::Interface;
                let mut iface = InterfaceInfo::default();
                for elem in elems {
                    if let (Some(name), Some(sig)) = (&elem.name, &elem.sig) {
                        iface.methods.push(MethodSig {
                            name: name.name.clone(),
                            params: self.param_types(&sig.params),
                            results: self.param_types(&sig.results),
                        });
                    } else if let Some(embedded) = &elem.embedded {
                        iface.embedded.push(self.field_type(embedded));
                    }
                }
                info.interface_info = Some(iface);
            }
            other => {
                if spec.alias {
                    info.kind = TypeKind::Alias;
                }
                info.underlying = Some(self.field_type(other));
            }
        }
        info
    }

    fn struct_info(&mut self, fields: &[Field]) -> StructInfo {
        let mut out = StructInfo::default();
        for field in fields {
            let Some(typ) = &field.typ else { continue };
            let field_type = self.field_type(typ);
            if field.names.is_empty() {
                // Embedded field: named after its base type.
                let name = field_type
                    .base_name()
                    .map_or_else(String::new, |(_, n)| n.to_owned());
                out.fields.push(FieldInfo {
                    name,
                    field_type,
                    tag: field.tag.clone(),
                    embedded: true,
                });
            } else {
                for name in &field.names {
                    out.fields.push(FieldInfo {
                        name: name.name.clone(),
                        field_type: field_type.clone(),
                        tag: field.tag.clone(),
                        embedded: false,
                    });
                }
            }
        }
        out
    }

    fn func_decl(&mut self, decl: &FuncDecl) -> FunctionInfo {
        let recv = decl.recv.as_ref().map(|r| ReceiverInfo {
            name: r.name.as_ref().map(|n| n.name.clone()),
            base_type: r.base.name.clone(),
            pointer: r.pointer,
        });
        let type_params = decl
            .sig
            .type_params
            .iter()
            .flat_map(|f| f.names.iter().map(|n| n.name.clone()))
            .collect();
        FunctionInfo {
            name: decl.name.name.clone(),
            pkg_path: self.pkg_path.to_owned(),
            recv,
            type_params,
            params: self.param_infos(&decl.sig.params),
            results: self.param_infos(&decl.sig.results),
            sig: Rc::clone(&decl.sig),
            body: decl.body.clone(),
            pos: decl.pos,
        }
    }

    fn param_infos(&mut self, fields: &[Field]) -> Vec<ParamInfo> {
        let mut out = Vec::new();
        for field in fields {
            let Some(typ) = &field.typ else { continue };
            let variadic = matches!(typ.unparen(), Expr::Ellipsis { .. });
            let field_type = self.field_type(typ);
            if field.names.is_empty() {
                out.push(ParamInfo {
                    name: None,
                    field_type,
                    variadic,
                });
            } else {
                for name in &field.names {
                    out.push(ParamInfo {
                        name: Some(name.name.clone()),
                        field_type: field_type.clone(),
                        variadic,
                    });
                }
            }
        }
        out
    }

    fn param_types(&mut self, fields: &[Field]) -> Vec<FieldType> {
        self.param_infos(fields)
            .into_iter()
            .map(|p| p.field_type)
            .collect()
    }

    fn const_group(&mut self, specs: &[ValueSpec]) {
        let mut inherited: Vec<Expr> = Vec::new();
        let mut inherited_type: Option<FieldType> = None;
        for spec in specs {
            let field_type = spec.typ.as_ref().map(|t| self.field_type(t));
            if !spec.values.is_empty() {
                inherited = spec.values.clone();
                inherited_type = field_type.clone();
            }
            let effective_type = field_type.or_else(|| inherited_type.clone());
            for (i, name) in spec.names.iter().enumerate() {
                let value = spec
                    .values
                    .get(i)
                    .or_else(|| inherited.get(i))
                    .cloned();
                self.constants.push(ConstantInfo {
                    name: name.name.clone(),
                    field_type: effective_type.clone(),
                    value,
                    iota: spec.group_index,
                    pos: name.pos,
                });
            }
        }
    }

    fn var_group(&mut self, specs: &[ValueSpec]) {
        for spec in specs {
            let field_type = spec.typ.as_ref().map(|t| self.field_type(t));
            for (i, name) in spec.names.iter().enumerate() {
                // With one initializer for several names the expression is a
                // multi-value call; every name shares it, at its own index.
                let value = if spec.values.len() == spec.names.len() {
                    spec.values.get(i).cloned()
                } else {
                    spec.values.first().cloned()
                };
                self.vars.push(VarInfo {
                    name: name.name.clone(),
                    field_type: field_type.clone(),
                    value,
                    value_index: i,
                    pos: name.pos,
                });
            }
        }
    }

    /// Converts a type expression to its structural [`FieldType`].
    fn field_type(&mut self, expr: &Expr) -> FieldType {
        match expr.unparen() {
            Expr::Ident(id) => FieldType::named(&id.name),
            Expr::Selector { x, sel } => {
                let qualifier = match x.unparen() {
                    Expr::Ident(id) => id.name.clone(),
                    _ => String::new(),
                };
                // Unknown qualifiers keep the raw name as the path so the
                // reference still compares structurally.
                let pkg_path = self
                    .qualifiers
                    .get(&qualifier)
                    .cloned()
                    .unwrap_or(qualifier);
                FieldType::qualified(pkg_path, &sel.name)
            }
            Expr::Star { x, .. } => FieldType::Pointer(Box::new(self.field_type(x))),
            Expr::ArrayType { len: None, elem, .. } => {
                FieldType::Slice(Box::new(self.field_type(elem)))
            }
            Expr::ArrayType {
                len: Some(len),
                elem,
                ..
            } => {
                let n = match len.unparen() {
                    Expr::BasicLit { value, .. } => parse_int(value),
                    _ => None,
                };
                FieldType::Array {
                    len: n,
                    elem: Box::new(self.field_type(elem)),
                }
            }
            Expr::MapType { key, value, .. } => FieldType::Map {
                key: Box::new(self.field_type(key)),
                value: Box::new(self.field_type(value)),
            },
            Expr::ChanType { elem, .. } => FieldType::Chan {
                elem: Box::new(self.field_type(elem)),
            },
            Expr::FuncType { sig, .. } => FieldType::Func {
                params: self.param_types(&sig.params),
                results: self.param_types(&sig.results),
            },
            Expr::Ellipsis {
                elem: Some(elem), ..
            } => FieldType::Variadic(Box::new(self.field_type(elem))),
            Expr::Ellipsis { elem: None, .. } => {
                FieldType::Variadic(Box::new(FieldType::named("any")))
            }
            Expr::Index { x, indices, .. } => {
                let base = self.field_type(x);
                let type_args = indices.iter().map(|i| self.field_type(i)).collect();
                match base {
                    FieldType::Named {
                        pkg_path, name, ..
                    } => FieldType::Named {
                        pkg_path,
                        name,
                        type_args,
                    },
                    other => other,
                }
            }
            Expr::InterfaceType { elems, .. } if elems.is_empty() => FieldType::named("any"),
            // Inline struct/interface bodies are opaque at this level.
            Expr::InterfaceType { .. } => FieldType::named("interface"),
            Expr::StructType { .. } => FieldType::named("struct"),
            _ => FieldType::named("any"),
        }
    }
}

/// Parses a standalone expression, for driving the engine's `eval` entry
/// point without a surrounding file.
pub fn parse_expr(src: &str) -> Result<crate::ast::Expr, ScanError> {
    crate::parser::parse_standalone_expr(src).map_err(|err| ScanError::Syntax {
        message: err.message,
        location: None,
    })
}

/// Integer literal parsing shared by the extractor and the engine.
pub fn parse_int(literal: &str) -> Option<i64> {
    let cleaned: String = literal.chars().filter(|c| *c != '_').collect();
    if let Some(hex) = cleaned.strip_prefix("0x").or_else(|| cleaned.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = cleaned.strip_prefix("0b").or_else(|| cleaned.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2).ok()
    } else if let Some(oct) = cleaned.strip_prefix("0o").or_else(|| cleaned.strip_prefix("0O")) {
        i64::from_str_radix(oct, 8).ok()
    } else {
        cleaned.parse().ok()
    }
}
