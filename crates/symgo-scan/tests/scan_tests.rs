//! Behavioral tests for the scanner: declaration extraction, constant
//! groups, generics, imports and position translation, driven through real
//! source text.

use pretty_assertions::assert_eq;
use symgo_scan::{default_package_name, FieldType, Scanner, SourceSet, TypeKind};

fn scan(path: &str, src: &str) -> std::rc::Rc<symgo_scan::PackageInfo> {
    let mut sources = SourceSet::new();
    sources.add_package(path, src);
    Scanner::new(sources).scan(path).expect("package should scan")
}

#[test]
fn struct_and_methods_are_extracted() {
    let pkg = scan(
        "example.com/m/shape",
        r#"
package shape

type Point struct {
	X, Y float64
	name string
}

func (p *Point) Move(dx, dy float64) {
	p.X += dx
	p.Y += dy
}

func (p Point) Name() string { return p.name }

func Origin() Point { return Point{} }
"#,
    );

    assert_eq!(pkg.name, "shape");
    let point = pkg.lookup_type("Point").expect("Point should be scanned");
    assert_eq!(point.kind, TypeKind::Struct);
    let fields = &point.struct_info.as_ref().unwrap().fields;
    assert_eq!(
        fields.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
        vec!["X", "Y", "name"],
        "multi-name field groups expand to one field per name"
    );

    let methods: Vec<_> = pkg.methods_of("Point").map(|m| m.name.clone()).collect();
    assert_eq!(methods, vec!["Move", "Name"]);
    let mv = pkg.methods_of("Point").next().unwrap();
    assert!(mv.recv.as_ref().unwrap().pointer, "Move has a pointer receiver");

    let origin = pkg.lookup_function("Origin").expect("Origin is top-level");
    assert_eq!(origin.results.len(), 1);
    assert_eq!(origin.results[0].field_type, FieldType::named("Point"));
}

#[test]
fn interfaces_record_method_contracts() {
    let pkg = scan(
        "example.com/m/io",
        r#"
package io

type Writer interface {
	Write(p []byte) (int, error)
}

type Closer interface {
	Close() error
}

type WriteCloser interface {
	Writer
	Closer
}
"#,
    );

    let writer = pkg.lookup_type("Writer").unwrap();
    assert_eq!(writer.kind, TypeKind::Interface);
    let info = writer.interface_info.as_ref().unwrap();
    assert_eq!(info.methods.len(), 1);
    assert_eq!(info.methods[0].name, "Write");
    assert_eq!(
        info.methods[0].params,
        vec![FieldType::Slice(Box::new(FieldType::named("byte")))]
    );
    assert_eq!(
        info.methods[0].results,
        vec![FieldType::named("int"), FieldType::named("error")]
    );

    let wc = pkg.lookup_type("WriteCloser").unwrap();
    let embedded = &wc.interface_info.as_ref().unwrap().embedded;
    assert_eq!(
        embedded,
        &vec![FieldType::named("Writer"), FieldType::named("Closer")]
    );
}

#[test]
fn constant_groups_inherit_omitted_initializers() {
    let pkg = scan(
        "example.com/m/color",
        r#"
package color

const (
	Red = iota
	Green
	Blue
)

const Name = "color"
"#,
    );

    let consts: Vec<_> = pkg
        .constants
        .iter()
        .map(|c| (c.name.as_str(), c.iota, c.value.is_some()))
        .collect();
    assert_eq!(
        consts,
        vec![
            ("Red", 0, true),
            ("Green", 1, true),
            ("Blue", 2, true),
            ("Name", 0, true),
        ],
        "omitted initializers repeat the previous expression at a new iota"
    );
}

#[test]
fn package_vars_keep_lazy_initializers() {
    let pkg = scan(
        "example.com/m/state",
        r#"
package state

var registry = make(map[string]int)
var a, b = split()
"#,
    );

    assert_eq!(pkg.vars.len(), 3);
    assert_eq!(pkg.vars[0].name, "registry");
    assert!(pkg.vars[0].value.is_some());
    assert_eq!(pkg.vars[1].value_index, 0);
    assert_eq!(pkg.vars[2].value_index, 1, "b takes the second value of split()");
}

#[test]
fn generic_declarations_parse() {
    let pkg = scan(
        "example.com/m/list",
        r#"
package list

type Stack[T any] struct {
	items []T
}

func (s *Stack[T]) Push(v T) {
	s.items = append(s.items, v)
}

func Map[T any, U any](xs []T, f func(T) U) []U {
	out := make([]U, 0, len(xs))
	for _, x := range xs {
		out = append(out, f(x))
	}
	return out
}
"#,
    );

    let stack = pkg.lookup_type("Stack").unwrap();
    assert_eq!(stack.type_params, vec!["T"]);

    let map_fn = pkg.lookup_function("Map").unwrap();
    assert_eq!(map_fn.type_params, vec!["T", "U"]);
    assert_eq!(map_fn.params.len(), 2);

    let push = pkg.methods_of("Stack").next().unwrap();
    assert_eq!(push.name, "Push");
}

#[test]
fn imports_resolve_field_type_qualifiers() {
    let pkg = scan(
        "example.com/m/client",
        r#"
package client

import (
	"net/http"
	alias "example.com/other/pkg"
)

type Client struct {
	inner *http.Client
	other alias.Thing
}
"#,
    );

    assert_eq!(pkg.imports.len(), 2);
    let client = pkg.lookup_type("Client").unwrap();
    let fields = &client.struct_info.as_ref().unwrap().fields;
    assert_eq!(
        fields[0].field_type,
        FieldType::Pointer(Box::new(FieldType::qualified("net/http", "Client")))
    );
    assert_eq!(
        fields[1].field_type,
        FieldType::qualified("example.com/other/pkg", "Thing"),
        "aliased qualifiers map back to the import path"
    );
}

#[test]
fn positions_render_file_line_col() {
    let pkg = scan(
        "example.com/m/pos",
        "package pos\n\nfunc Main() {\n}\n",
    );
    let main = pkg.lookup_function("Main").unwrap();
    let rendered = pkg.fset.display(main.pos);
    assert_eq!(rendered, "pos.go:3:1");
}

#[test]
fn unknown_packages_and_parse_errors_are_reported() {
    let mut sources = SourceSet::new();
    sources.add_package("example.com/m/broken", "package broken\nfunc (");
    let scanner = Scanner::new(sources);

    let missing = scanner.scan("example.com/m/nope").unwrap_err();
    assert!(missing.to_string().contains("unknown package"));

    let broken = scanner.scan("example.com/m/broken").unwrap_err();
    assert!(
        broken.to_string().contains("broken.go:2:"),
        "syntax errors carry file:line positions, got: {broken}"
    );
}

#[test]
fn package_name_heuristics() {
    assert_eq!(default_package_name("fmt"), "fmt");
    assert_eq!(default_package_name("net/http"), "http");
    assert_eq!(default_package_name("example.com/mod/v2"), "mod");
    assert_eq!(default_package_name("gopkg.in/yaml.v3"), "yaml");
}
