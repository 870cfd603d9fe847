//! Universe builtins and the stock intrinsics.
//!
//! One function per builtin, each validating its arguments before doing
//! anything, registered into the root environment at construction. The
//! `fmt` formatting stubs live here too: they fold to concrete strings when
//! every consumed argument is concrete and degrade to typed placeholders
//! otherwise.

use std::rc::Rc;

use symgo_scan::{FieldType, TypeKind};

use crate::{
    interp::Interpreter,
    intrinsics::{IntrinsicFn, IntrinsicObj},
    object::{
        ChanData, ChanDirection, ErrorData, ErrorKind, InstanceData, InstanceId, MapData, Object,
        PointerData, SliceData,
    },
};

impl Interpreter {
    /// Populates the universe scope: constants, builtins, and the stock
    /// formatting intrinsics.
    pub(crate) fn install_universe(&mut self) {
        let universe = self.universe;
        self.envs.set_local(universe, "true", Object::Bool(true));
        self.envs.set_local(universe, "false", Object::Bool(false));
        self.envs.set_local(universe, "nil", Object::Nil);

        let builtins: &[(&str, IntrinsicFn)] = &[
            ("len", Rc::new(builtin_len)),
            ("cap", Rc::new(builtin_cap)),
            ("make", Rc::new(builtin_make)),
            ("new", Rc::new(builtin_new)),
            ("append", Rc::new(builtin_append)),
            ("copy", Rc::new(builtin_copy)),
            ("delete", Rc::new(builtin_delete)),
            ("close", Rc::new(builtin_close)),
            ("panic", Rc::new(builtin_panic)),
            ("recover", Rc::new(builtin_recover)),
            ("print", Rc::new(builtin_print)),
            ("println", Rc::new(builtin_print)),
        ];
        for (name, func) in builtins {
            let obj = Object::Intrinsic(IntrinsicObj::new(*name, Rc::clone(func)));
            self.envs.set_local(universe, name, obj);
        }

        self.intrinsics.register("fmt.Sprintf", Rc::new(fmt_sprintf) as IntrinsicFn);
        self.intrinsics.register("fmt.Errorf", Rc::new(fmt_errorf) as IntrinsicFn);
        for reached in ["fmt.Print", "fmt.Println", "fmt.Printf"] {
            self.intrinsics
                .register(reached, Rc::new(|_: &mut Interpreter, _: &[Object]| Object::Nil) as IntrinsicFn);
        }
    }
}

fn builtin_len(interp: &mut Interpreter, args: &[Object]) -> Object {
    let Some(arg) = args.first() else {
        return Object::Error(Box::new(ErrorData::general("len: missing argument")));
    };
    match interp.value_of(arg) {
        Object::Str(s) => Object::Int(i64::try_from(s.len()).unwrap_or(i64::MAX)),
        Object::Slice(data) => match data.len {
            Some(n) => Object::Int(n),
            None => Object::typed_placeholder("len of symbolic slice", FieldType::named("int")),
        },
        _ => Object::typed_placeholder("len", FieldType::named("int")),
    }
}

fn builtin_cap(interp: &mut Interpreter, args: &[Object]) -> Object {
    let Some(arg) = args.first() else {
        return Object::Error(Box::new(ErrorData::general("cap: missing argument")));
    };
    match interp.value_of(arg) {
        Object::Slice(data) => match data.len {
            Some(n) => Object::Int(n),
            None => Object::typed_placeholder("cap of symbolic slice", FieldType::named("int")),
        },
        _ => Object::typed_placeholder("cap", FieldType::named("int")),
    }
}

fn builtin_make(interp: &mut Interpreter, args: &[Object]) -> Object {
    let Some(Object::Type(typ)) = args.first() else {
        return Object::Error(Box::new(ErrorData::general("make: expected a type argument")));
    };
    let length = args.get(1).and_then(|a| match interp.value_of(a) {
        Object::Int(n) => Some(n),
        _ => None,
    });
    let shape = typ
        .underlying
        .clone()
        .unwrap_or_else(|| FieldType::qualified(&typ.pkg_path, &typ.name));
    match shape {
        FieldType::Slice(elem) => Object::Slice(Box::new(SliceData {
            elem: Some(*elem),
            len: length.or(Some(0)),
        })),
        FieldType::Map { key, value } => Object::Map(Box::new(MapData {
            key: Some(*key),
            value: Some(*value),
        })),
        FieldType::Chan { elem } => Object::Chan(Box::new(ChanData {
            elem: Some(*elem),
            dir: ChanDirection::Both,
        })),
        other => Object::typed_placeholder("make", other),
    }
}

fn builtin_new(interp: &mut Interpreter, args: &[Object]) -> Object {
    let Some(Object::Type(typ)) = args.first() else {
        return Object::Error(Box::new(ErrorData::general("new: expected a type argument")));
    };
    let ft = if typ.pkg_path.is_empty() {
        typ.underlying
            .clone()
            .unwrap_or_else(|| FieldType::named(&typ.name))
    } else {
        FieldType::qualified(&typ.pkg_path, &typ.name)
    };
    // Struct-shaped targets get a real instance so field writes through the
    // pointer are observable.
    let pointee = if matches!(typ.kind, TypeKind::Struct | TypeKind::Named) && !typ.pkg_path.is_empty()
    {
        let id = InstanceId::new(interp.instances.len());
        interp.instances.push(InstanceData {
            type_ref: Some(Rc::clone(typ)),
            typ: Some(ft.clone()),
            fields: indexmap::IndexMap::new(),
            state: ahash::AHashMap::new(),
        });
        Object::Instance(id)
    } else {
        Object::typed_placeholder("zero value", ft.clone())
    };
    Object::Pointer(Box::new(PointerData {
        pointee,
        typ: Some(ft),
    }))
}

fn builtin_append(interp: &mut Interpreter, args: &[Object]) -> Object {
    let Some(first) = args.first() else {
        return Object::Error(Box::new(ErrorData::general("append: missing slice argument")));
    };
    match interp.value_of(first) {
        Object::Slice(data) => {
            let len = data
                .len
                .and_then(|n| i64::try_from(args.len() - 1).ok().map(|extra| n + extra));
            Object::Slice(Box::new(SliceData {
                elem: data.elem,
                len,
            }))
        }
        other => match interp.dynamic_type(&other) {
            Some(t @ FieldType::Slice(_)) => Object::typed_placeholder("append", t),
            _ => Object::placeholder("append"),
        },
    }
}

fn builtin_copy(_: &mut Interpreter, _: &[Object]) -> Object {
    Object::typed_placeholder("copy", FieldType::named("int"))
}

fn builtin_delete(_: &mut Interpreter, _: &[Object]) -> Object {
    Object::Nil
}

fn builtin_close(_: &mut Interpreter, _: &[Object]) -> Object {
    Object::Nil
}

fn builtin_panic(interp: &mut Interpreter, args: &[Object]) -> Object {
    let payload = args.first().map(|a| interp.value_of(a));
    let rendered = payload
        .as_ref()
        .map_or_else(|| "nil".to_owned(), display_value);
    Object::Error(Box::new(ErrorData {
        kind: ErrorKind::Panic,
        message: format!("panic: {rendered}"),
        position: None,
        call_stack: interp.format_stack(),
        payload,
    }))
}

fn builtin_recover(interp: &mut Interpreter, _: &[Object]) -> Object {
    match interp.panicking.take() {
        Some(err) => err.payload.clone().unwrap_or(Object::Nil),
        None => Object::Nil,
    }
}

fn builtin_print(_: &mut Interpreter, _: &[Object]) -> Object {
    Object::Nil
}

// ----------------------------------------------------------------------
// fmt stubs
// ----------------------------------------------------------------------

fn fmt_sprintf(interp: &mut Interpreter, args: &[Object]) -> Object {
    let Some(format) = args.first() else {
        return Object::typed_placeholder("Sprintf", FieldType::named("string"));
    };
    let Object::Str(format) = interp.value_of(format) else {
        return Object::typed_placeholder("Sprintf", FieldType::named("string"));
    };
    let rest: Vec<Object> = args[1..].iter().map(|a| interp.value_of(a)).collect();
    match format_concrete(&format, &rest) {
        Some(s) => Object::Str(s),
        None => Object::typed_placeholder("Sprintf", FieldType::named("string")),
    }
}

fn fmt_errorf(interp: &mut Interpreter, args: &[Object]) -> Object {
    // The message folds like Sprintf but the result is an opaque error.
    let _ = fmt_sprintf(interp, args);
    Object::typed_placeholder("Errorf", FieldType::named("error"))
}

/// Formats when every consumed argument is concrete; `None` otherwise.
fn format_concrete(format: &str, args: &[Object]) -> Option<String> {
    let mut out = String::with_capacity(format.len());
    let mut next_arg = 0usize;
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        // Skip flags, width and precision.
        let mut verb = chars.next()?;
        while matches!(verb, '-' | '+' | ' ' | '#' | '0' | '1'..='9' | '.') {
            verb = chars.next()?;
        }
        if verb == '%' {
            out.push('%');
            continue;
        }
        let arg = args.get(next_arg)?;
        next_arg += 1;
        match (verb, arg) {
            ('d' | 'v', Object::Int(n)) => out.push_str(&n.to_string()),
            ('x', Object::Int(n)) => out.push_str(&format!("{n:x}")),
            ('s' | 'v', Object::Str(s)) => out.push_str(s),
            ('q', Object::Str(s)) => out.push_str(&format!("{s:?}")),
            ('t' | 'v', Object::Bool(b)) => out.push_str(&b.to_string()),
            ('f' | 'g' | 'v', Object::Float(f)) => out.push_str(&f.to_string()),
            ('c', Object::Rune(c)) => out.push(*c),
            ('v', Object::Rune(c)) => out.push_str(&i64::from(u32::from(*c)).to_string()),
            ('v', Object::Nil) => out.push_str("<nil>"),
            _ => return None,
        }
    }
    Some(out)
}

/// Plain rendering for panic messages and `%v`-style display.
pub(crate) fn display_value(value: &Object) -> String {
    match value {
        Object::Str(s) => s.clone(),
        Object::Int(n) => n.to_string(),
        Object::Float(f) => f.to_string(),
        Object::Bool(b) => b.to_string(),
        Object::Rune(c) => c.to_string(),
        Object::Nil => "nil".to_owned(),
        other => other.type_describe(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concrete_formatting_folds() {
        let args = vec![Object::Str("world".into()), Object::Int(42)];
        assert_eq!(
            format_concrete("hello %s %d", &args),
            Some("hello world 42".to_owned())
        );
        assert_eq!(format_concrete("100%%", &[]), Some("100%".to_owned()));
    }

    #[test]
    fn symbolic_arguments_refuse_to_fold() {
        let args = vec![Object::placeholder("x")];
        assert_eq!(format_concrete("%s", &args), None);
        assert_eq!(format_concrete("%d %d", &[Object::Int(1)]), None);
    }
}
