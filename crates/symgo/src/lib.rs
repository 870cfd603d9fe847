//! symgo, a best-effort symbolic execution engine for static analysis.
//!
//! The engine abstractly executes source programs to trace control- and
//! data-flow without running them. When it cannot decide something it
//! produces a typed symbolic placeholder and keeps going, which makes it
//! suitable for reachability-style analyses (dead-code finders, API-usage
//! extractors, documentation tooling) rather than proof.
//!
//! The moving parts:
//!
//! | Piece | Role |
//! |-------|------|
//! | [`Object`] | Tagged symbolic value model |
//! | `Envs` (internal) | Lexically nested environments in central storage |
//! | Resolver (internal) | Policy-gated, cached, cycle-tolerant package loading |
//! | Intrinsics | Host stubs keyed by qualified name, plus the default usage hook |
//! | Evaluator (internal) | AST → object reduction over the scanner's trees |
//! | Finalizer | Post-run interface implementer discovery |
//! | [`Interpreter`] | The façade tying it together |
//!
//! Sources come in through `symgo-scan`'s [`PackageResolver`] contract:
//!
//! ```
//! use symgo::{Interpreter, Object};
//! use symgo_scan::{Scanner, SourceSet};
//!
//! let mut sources = SourceSet::new();
//! sources.add_package(
//!     "example.com/app",
//!     r#"
//! package app
//!
//! func Answer() int { return 41 + 1 }
//! "#,
//! );
//! let mut interp = Interpreter::new(Scanner::new(sources));
//! let answer = interp.find_object("example.com/app", "Answer").unwrap();
//! let result = interp.apply(&answer, vec![]);
//! assert!(matches!(result, Object::Int(42)));
//! ```

mod env;
mod eval;
mod finalizer;
mod interp;
mod intrinsics;
mod limits;
mod object;
mod resolver;
mod tracer;
mod universe;

pub use symgo_scan::PackageResolver;

pub use crate::{
    interp::Interpreter,
    intrinsics::{DefaultIntrinsicFn, IntrinsicFn, IntrinsicObj},
    limits::{CancelToken, Limits},
    object::{
        BoundMethodData, ChanData, ChanDirection, ErrorData, ErrorKind, FuncId, IfaceRef,
        InstanceId, InstantiatedData, MapData, Object, PlaceholderData, PkgId, PointerData,
        SliceData, UnresolvedFuncData, VarId,
    },
    tracer::{EvalTracer, NoopTracer, RecordingTracer, TraceEvent},
};
