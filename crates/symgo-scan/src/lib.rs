//! Lexer, parser and declaration scanner for the symgo engine.
//!
//! This crate is the engine's *collaborator*: it turns in-memory source text
//! into ASTs and structural declaration info ([`TypeInfo`], [`FunctionInfo`],
//! [`ConstantInfo`], [`FieldType`]). The engine consumes it exclusively
//! through the [`PackageResolver`] trait and these data types, so the two
//! sides can evolve independently.

pub mod ast;
mod error;
mod info;
mod lexer;
mod parser;
mod position;
mod scan;
pub mod token;

pub use crate::{
    error::ScanError,
    info::{
        ConstantInfo, FieldInfo, FieldType, FunctionInfo, ImportInfo, InterfaceInfo, MethodSig,
        PackageInfo, ParamInfo, ReceiverInfo, StructInfo, TypeInfo, TypeKind, TypeRef, VarInfo,
    },
    position::{FileSet, Pos, Position},
    scan::{default_package_name, parse_expr, parse_int, PackageResolver, Scanner, SourceSet},
};
