//! Scan-policy behavior: out-of-policy packages stay symbolic, failures are
//! cached, packages are interned once, intrinsic overlays shadow and pop.

use std::{cell::RefCell, rc::Rc};

use pretty_assertions::assert_eq;
use symgo::{Interpreter, Object};
use symgo_scan::{Scanner, SourceSet};

fn sources(packages: &[(&str, &str)]) -> SourceSet {
    let mut out = SourceSet::new();
    for (path, src) in packages {
        out.add_package(path, *src);
    }
    out
}

const MAIN_WITH_CLIENT: &str = r#"
package main

import "example.com/ext/q"

func main() {
	q.NewClient().Do()
}
"#;

const CLIENT_PKG: &str = r#"
package q

type Client struct {
	token string
}

func NewClient() *Client {
	return &Client{token: secret()}
}

func (c *Client) Do() error {
	return nil
}

func secret() string { return "s3cr3t" }
"#;

#[test]
fn out_of_policy_method_calls_stay_symbolic_but_are_observed() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let mut interp = Interpreter::new(Scanner::new(sources(&[
        ("example.com/m/main", MAIN_WITH_CLIENT),
        ("example.com/ext/q", CLIENT_PKG),
    ])))
    .with_primary_analysis_scope(["example.com/m/..."])
    .with_default_intrinsic(move |interp, callee, _| {
        if let Some(name) = interp.qualified_name_of(callee) {
            sink.borrow_mut().push(name);
        }
    });

    let main = interp.find_object("example.com/m/main", "main").unwrap();
    let result = interp.apply(&main, vec![]);
    assert!(!result.is_error(), "out-of-policy calls must not fail: {result:?}");

    let seen = seen.borrow();
    assert!(
        seen.iter().any(|n| n.contains("q.NewClient")),
        "the out-of-policy constructor call is observed: {seen:?}"
    );
    assert!(
        seen.iter().any(|n| n.contains("Client).Do")),
        "the method on the unresolved receiver is observed with its signature: {seen:?}"
    );
    // The out-of-policy body is never evaluated, so its internals stay
    // invisible.
    assert!(
        !seen.iter().any(|n| n.contains("q.secret")),
        "function bodies of out-of-policy packages must never run: {seen:?}"
    );
}

#[test]
fn out_of_policy_selectors_yield_placeholders_not_errors() {
    let mut interp = Interpreter::new(Scanner::new(sources(&[
        ("example.com/m/main", MAIN_WITH_CLIENT),
        ("example.com/ext/q", CLIENT_PKG),
    ])))
    .with_primary_analysis_scope(["example.com/m/..."]);

    // Known exported symbol: a placeholder carrying the signature.
    let new_client = interp.find_object("example.com/ext/q", "NewClient").unwrap();
    match &new_client {
        Object::Placeholder(data) => {
            assert!(data.func.is_some(), "signature should be visible");
        }
        other => panic!("expected a placeholder, got {other:?}"),
    }

    // Unexported symbols are omitted entirely.
    assert!(
        interp.find_object("example.com/ext/q", "secret").is_none(),
        "unexported symbols of out-of-policy packages are not bound"
    );
}

#[test]
fn custom_scan_policies_override_patterns() {
    let mut interp = Interpreter::new(Scanner::new(sources(&[
        ("example.com/m/main", MAIN_WITH_CLIENT),
        ("example.com/ext/q", CLIENT_PKG),
    ])))
    .with_scan_policy(|path| path.ends_with("/q"));

    // Under this policy q is in-policy, so its functions are concrete.
    let new_client = interp.find_object("example.com/ext/q", "NewClient").unwrap();
    assert!(
        matches!(new_client, Object::Func(_)),
        "in-policy functions bind concretely, got {new_client:?}"
    );
}

#[test]
fn unknown_packages_become_cached_unresolved_stubs() {
    let mut interp = Interpreter::new(Scanner::new(sources(&[(
        "example.com/m/main",
        r#"
package main

import "example.com/gone"

func main() {
	gone.Missing()
}
"#,
    )])));
    let main = interp.find_object("example.com/m/main", "main").unwrap();
    let result = interp.apply(&main, vec![]);
    assert!(
        !result.is_error(),
        "a missing dependency must degrade to placeholders: {result:?}"
    );
}

#[test]
fn intrinsics_can_stub_unscannable_packages() {
    let mut interp = Interpreter::new(Scanner::new(sources(&[(
        "example.com/m/main",
        r#"
package main

import "example.com/vendor/blob"

func main() string {
	return blob.Version()
}
"#,
    )])))
    .with_intrinsic("example.com/vendor/blob.Version", |_, _| {
        Object::Str("1.2.3".to_owned())
    });
    let main = interp.find_object("example.com/m/main", "main").unwrap();
    let result = interp.apply(&main, vec![]);
    assert!(
        matches!(&result, Object::Str(s) if s == "1.2.3"),
        "the intrinsic must claim the unresolved call, got {result:?}"
    );
}

#[test]
fn intrinsic_overlays_shadow_and_pop() {
    let mut interp = Interpreter::new(Scanner::new(sources(&[(
        "example.com/m/app",
        r#"
package app

import "fmt"

func greet() string {
	return fmt.Sprintf("hi")
}
"#,
    )])));
    let greet = interp.find_object("example.com/m/app", "greet").unwrap();
    assert!(matches!(interp.apply(&greet, vec![]), Object::Str(s) if s == "hi"));

    interp.push_intrinsics_overlay();
    interp.register_intrinsic("fmt.Sprintf", |_, _| Object::Str("shadowed".to_owned()));
    assert!(matches!(interp.apply(&greet, vec![]), Object::Str(s) if s == "shadowed"));

    interp.pop_intrinsics_overlay();
    assert!(
        matches!(interp.apply(&greet, vec![]), Object::Str(s) if s == "hi"),
        "popping the overlay must restore the base binding"
    );
}

#[test]
fn packages_and_their_objects_are_interned_per_session() {
    let mut interp = Interpreter::new(Scanner::new(sources(&[(
        "example.com/m/app",
        "package app\nfunc f() int { return 1 }\n",
    )])));
    let a = interp.find_object("example.com/m/app", "f").unwrap();
    let b = interp.find_object("example.com/m/app", "f").unwrap();
    assert!(
        interp.same_function(&a, &b),
        "repeated resolution must hand back the same interned package objects"
    );
}

#[test]
fn import_qualifiers_follow_aliases_and_version_suffixes() {
    let mut interp = Interpreter::new(Scanner::new(sources(&[
        (
            "example.com/m/main",
            r#"
package main

import (
	y "example.com/lib/impl"
	"example.com/lib/mod/v2"
)

func use() int {
	return y.A() + mod.B()
}
"#,
        ),
        (
            "example.com/lib/impl",
            "package impl\nfunc A() int { return 1 }\n",
        ),
        (
            "example.com/lib/mod/v2",
            "package mod\nfunc B() int { return 2 }\n",
        ),
    ])));
    let use_fn = interp.find_object("example.com/m/main", "use").unwrap();
    let result = interp.apply(&use_fn, vec![]);
    assert_eq!(
        format!("{result:?}"),
        format!("{:?}", Object::Int(3)),
        "aliased and versioned imports must both resolve"
    );
}

#[test]
fn declared_name_fallback_matches_unaliased_imports() {
    // The import path basename is `go-yaml` but the declared package name is
    // `yaml`; unaliased references use the declared name.
    let mut interp = Interpreter::new(Scanner::new(sources(&[
        (
            "example.com/m/main",
            r#"
package main

import "example.com/third/go-yaml"

func use() int {
	return yaml.Parse()
}
"#,
        ),
        (
            "example.com/third/go-yaml",
            "package yaml\nfunc Parse() int { return 9 }\n",
        ),
    ])));
    let use_fn = interp.find_object("example.com/m/main", "use").unwrap();
    let result = interp.apply(&use_fn, vec![]);
    assert!(
        matches!(result, Object::Int(9)),
        "declared-name fallback must resolve the qualifier, got {result:?}"
    );
}
