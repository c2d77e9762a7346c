//! Native functions and the global objects that expose them.

use crate::interpreter::{Completion, Exec, Realm};
use crate::value::{
    Heap, HeapObject, ObjRef, Value, format_number, parse_float_prefix, parse_int_prefix,
};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

/// Longest string a script may build, in bytes.
pub const MAX_STRING_LENGTH: usize = (1 << 29) - 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    MathAbs,
    MathFloor,
    MathCeil,
    MathRound,
    MathTrunc,
    MathSign,
    MathMax,
    MathMin,
    MathPow,
    MathSqrt,
    MathRandom,
    JsonStringify,
    JsonParse,
    ObjectKeys,
    ObjectValues,
    ObjectEntries,
    ArrayIsArray,
    StringCtor,
    NumberCtor,
    BooleanCtor,
    ConsoleLog,
    ConsoleError,
    ParseInt,
    ParseFloat,
    IsNaN,
    IsFinite,
    ToString,
    ToFixed,
    ToUpperCase,
    ToLowerCase,
    Trim,
    StrIncludes,
    StartsWith,
    EndsWith,
    StrSlice,
    Split,
    Repeat,
    StrIndexOf,
    CharAt,
    Join,
    ArrIncludes,
    ArrIndexOf,
    ArrSlice,
    Concat,
    Reverse,
    Push,
    Pop,
}

const STRING_METHODS: &[(&str, Builtin)] = &[
    ("toUpperCase", Builtin::ToUpperCase),
    ("toLowerCase", Builtin::ToLowerCase),
    ("trim", Builtin::Trim),
    ("includes", Builtin::StrIncludes),
    ("startsWith", Builtin::StartsWith),
    ("endsWith", Builtin::EndsWith),
    ("slice", Builtin::StrSlice),
    ("split", Builtin::Split),
    ("repeat", Builtin::Repeat),
    ("indexOf", Builtin::StrIndexOf),
    ("charAt", Builtin::CharAt),
    ("toString", Builtin::ToString),
];

const ARRAY_METHODS: &[(&str, Builtin)] = &[
    ("join", Builtin::Join),
    ("includes", Builtin::ArrIncludes),
    ("indexOf", Builtin::ArrIndexOf),
    ("slice", Builtin::ArrSlice),
    ("concat", Builtin::Concat),
    ("reverse", Builtin::Reverse),
    ("push", Builtin::Push),
    ("pop", Builtin::Pop),
    ("toString", Builtin::ToString),
];

const NUMBER_METHODS: &[(&str, Builtin)] = &[
    ("toFixed", Builtin::ToFixed),
    ("toString", Builtin::ToString),
];

const COMMON_METHODS: &[(&str, Builtin)] = &[("toString", Builtin::ToString)];

fn lookup(table: &[(&str, Builtin)], key: &str) -> Option<Builtin> {
    table.iter().find(|(name, _)| *name == key).map(|(_, b)| *b)
}

impl Builtin {
    pub fn string_method(key: &str) -> Option<Builtin> {
        lookup(STRING_METHODS, key)
    }

    pub fn array_method(key: &str) -> Option<Builtin> {
        lookup(ARRAY_METHODS, key)
    }

    pub fn number_method(key: &str) -> Option<Builtin> {
        lookup(NUMBER_METHODS, key)
    }

    pub fn common_method(key: &str) -> Option<Builtin> {
        lookup(COMMON_METHODS, key)
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::MathAbs => "abs",
            Builtin::MathFloor => "floor",
            Builtin::MathCeil => "ceil",
            Builtin::MathRound => "round",
            Builtin::MathTrunc => "trunc",
            Builtin::MathSign => "sign",
            Builtin::MathMax => "max",
            Builtin::MathMin => "min",
            Builtin::MathPow => "pow",
            Builtin::MathSqrt => "sqrt",
            Builtin::MathRandom => "random",
            Builtin::JsonStringify => "stringify",
            Builtin::JsonParse => "parse",
            Builtin::ObjectKeys => "keys",
            Builtin::ObjectValues => "values",
            Builtin::ObjectEntries => "entries",
            Builtin::ArrayIsArray => "isArray",
            Builtin::StringCtor => "String",
            Builtin::NumberCtor => "Number",
            Builtin::BooleanCtor => "Boolean",
            Builtin::ConsoleLog => "log",
            Builtin::ConsoleError => "error",
            Builtin::ParseInt => "parseInt",
            Builtin::ParseFloat => "parseFloat",
            Builtin::IsNaN => "isNaN",
            Builtin::IsFinite => "isFinite",
            Builtin::ToString => "toString",
            Builtin::ToFixed => "toFixed",
            Builtin::ToUpperCase => "toUpperCase",
            Builtin::ToLowerCase => "toLowerCase",
            Builtin::Trim => "trim",
            Builtin::StrIncludes | Builtin::ArrIncludes => "includes",
            Builtin::StartsWith => "startsWith",
            Builtin::EndsWith => "endsWith",
            Builtin::StrSlice | Builtin::ArrSlice => "slice",
            Builtin::Split => "split",
            Builtin::Repeat => "repeat",
            Builtin::StrIndexOf | Builtin::ArrIndexOf => "indexOf",
            Builtin::CharAt => "charAt",
            Builtin::Join => "join",
            Builtin::Concat => "concat",
            Builtin::Reverse => "reverse",
            Builtin::Push => "push",
            Builtin::Pop => "pop",
        }
    }

    /// Number of declared parameters, excluding optional and rest ones.
    pub fn arity(self) -> usize {
        crate::annotations::signature(self)
            .iter()
            .filter(|p| !p.starts_with("...") && !p.starts_with('?'))
            .count()
    }

    /// Calls that print, mutate their receiver or draw random numbers are
    /// refused during side-effect-free evaluation.
    pub fn has_side_effect(self) -> bool {
        matches!(
            self,
            Builtin::ConsoleLog
                | Builtin::ConsoleError
                | Builtin::MathRandom
                | Builtin::Reverse
                | Builtin::Push
                | Builtin::Pop
        )
    }
}

/// Property names readable on a primitive or object, own ones first.
pub(crate) fn property_names(heap: &Heap, value: &Value) -> Vec<(String, bool)> {
    let methods = |table: &[(&str, Builtin)]| {
        table
            .iter()
            .map(|(name, _)| (name.to_string(), false))
            .collect::<Vec<_>>()
    };
    match value {
        Value::Undefined | Value::Null => Vec::new(),
        Value::Bool(_) => methods(COMMON_METHODS),
        Value::Number(_) => methods(NUMBER_METHODS),
        Value::Str(_) => {
            let mut names = vec![("length".to_string(), true)];
            names.extend(methods(STRING_METHODS));
            names
        }
        Value::Object(obj) => match heap.get(*obj) {
            HeapObject::Plain(map) => {
                let mut names: Vec<_> = map.keys().map(|k| (k.clone(), true)).collect();
                names.extend(methods(COMMON_METHODS));
                names
            }
            HeapObject::Array(items) => {
                let mut names: Vec<_> = (0..items.len()).map(|i| (i.to_string(), true)).collect();
                names.push(("length".to_string(), true));
                names.extend(methods(ARRAY_METHODS));
                names
            }
            HeapObject::Function(_) => {
                let mut names = vec![("name".to_string(), true), ("length".to_string(), true)];
                names.extend(methods(COMMON_METHODS));
                names
            }
            HeapObject::Error { .. } => {
                let mut names = vec![("message".to_string(), true), ("name".to_string(), false)];
                names.extend(methods(COMMON_METHODS));
                names
            }
        },
    }
}

fn namespace(realm: &mut Realm, members: &[Builtin], constants: &[(&str, f64)]) -> Value {
    let mut map = IndexMap::new();
    for builtin in members {
        let function = realm.heap.function(*builtin, None);
        map.insert(builtin.name().to_string(), function);
    }
    for (name, value) in constants {
        map.insert(name.to_string(), Value::Number(*value));
    }
    realm.heap.alloc(HeapObject::Plain(map))
}

pub(crate) fn install_globals(realm: &mut Realm) {
    let math = namespace(
        realm,
        &[
            Builtin::MathAbs,
            Builtin::MathFloor,
            Builtin::MathCeil,
            Builtin::MathRound,
            Builtin::MathTrunc,
            Builtin::MathSign,
            Builtin::MathMax,
            Builtin::MathMin,
            Builtin::MathPow,
            Builtin::MathSqrt,
            Builtin::MathRandom,
        ],
        &[("PI", std::f64::consts::PI), ("E", std::f64::consts::E)],
    );
    realm.define_global("Math", math);
    let json = namespace(realm, &[Builtin::JsonStringify, Builtin::JsonParse], &[]);
    realm.define_global("JSON", json);
    let object = namespace(
        realm,
        &[
            Builtin::ObjectKeys,
            Builtin::ObjectValues,
            Builtin::ObjectEntries,
        ],
        &[],
    );
    realm.define_global("Object", object);
    let array = namespace(realm, &[Builtin::ArrayIsArray], &[]);
    realm.define_global("Array", array);
    let console = namespace(realm, &[Builtin::ConsoleLog, Builtin::ConsoleError], &[]);
    realm.define_global("console", console);

    for builtin in [
        Builtin::StringCtor,
        Builtin::NumberCtor,
        Builtin::BooleanCtor,
        Builtin::ParseInt,
        Builtin::ParseFloat,
        Builtin::IsNaN,
        Builtin::IsFinite,
    ] {
        let function = realm.heap.function(builtin, None);
        realm.define_global(builtin.name(), function);
    }
    realm.define_global("NaN", Value::Number(f64::NAN));
    realm.define_global("Infinity", Value::Number(f64::INFINITY));
}

fn arg(args: &[Value], idx: usize) -> Value {
    args.get(idx).cloned().unwrap_or(Value::Undefined)
}

/// Resolve a relative index the way `slice` does.
fn relative_index(heap: &Heap, value: &Value, len: usize, default: usize) -> usize {
    if matches!(value, Value::Undefined) {
        return default;
    }
    let n = heap.to_number(value);
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        (n as usize).min(len)
    }
}

impl Exec<'_> {
    pub(crate) fn call_builtin(
        &mut self,
        builtin: Builtin,
        this: Option<&Value>,
        args: &[Value],
    ) -> Completion<Value> {
        let this = this.cloned().unwrap_or(Value::Undefined);
        let number_arg = |heap: &Heap, idx: usize| heap.to_number(&arg(args, idx));
        let math1 = |heap: &Heap, f: fn(f64) -> f64| Value::Number(f(number_arg(heap, 0)));
        Ok(match builtin {
            Builtin::MathAbs => math1(&self.realm.heap, f64::abs),
            Builtin::MathFloor => math1(&self.realm.heap, f64::floor),
            Builtin::MathCeil => math1(&self.realm.heap, f64::ceil),
            Builtin::MathTrunc => math1(&self.realm.heap, f64::trunc),
            Builtin::MathSqrt => math1(&self.realm.heap, f64::sqrt),
            // rounds half up, unlike f64::round
            Builtin::MathRound => math1(&self.realm.heap, |n| (n + 0.5).floor()),
            Builtin::MathSign => math1(&self.realm.heap, |n| {
                if n.is_nan() || n == 0.0 { n } else { n.signum() }
            }),
            Builtin::MathMax | Builtin::MathMin => {
                let is_max = builtin == Builtin::MathMax;
                let mut acc = if is_max {
                    f64::NEG_INFINITY
                } else {
                    f64::INFINITY
                };
                for value in args {
                    let n = self.realm.heap.to_number(value);
                    if n.is_nan() {
                        return Ok(Value::Number(f64::NAN));
                    }
                    acc = if is_max { acc.max(n) } else { acc.min(n) };
                }
                Value::Number(acc)
            }
            Builtin::MathPow => {
                let heap = &self.realm.heap;
                Value::Number(number_arg(heap, 0).powf(number_arg(heap, 1)))
            }
            Builtin::MathRandom => Value::Number(self.next_random()),
            Builtin::JsonStringify => return self.json_stringify(&arg(args, 0), &arg(args, 2)),
            Builtin::JsonParse => {
                let text = self.realm.heap.to_display_string(&arg(args, 0));
                match serde_json::from_str::<serde_json::Value>(&text) {
                    Ok(json) => self.from_json(json),
                    Err(err) => return self.throw("SyntaxError", err.to_string()),
                }
            }
            Builtin::ObjectKeys | Builtin::ObjectValues | Builtin::ObjectEntries => {
                let target = arg(args, 0);
                let entries = self.own_entries(&target)?;
                let items = entries
                    .into_iter()
                    .map(|(key, value)| match builtin {
                        Builtin::ObjectKeys => Value::Str(key),
                        Builtin::ObjectValues => value,
                        _ => self.realm.heap.array(vec![Value::Str(key), value]),
                    })
                    .collect();
                self.realm.heap.array(items)
            }
            Builtin::ArrayIsArray => Value::Bool(matches!(
                arg(args, 0),
                Value::Object(obj) if matches!(self.realm.heap.get(obj), HeapObject::Array(_))
            )),
            Builtin::StringCtor => match args.first() {
                None => Value::str(""),
                Some(value) => Value::Str(self.realm.heap.to_display_string(value)),
            },
            Builtin::NumberCtor => match args.first() {
                None => Value::Number(0.0),
                Some(value) => Value::Number(self.realm.heap.to_number(value)),
            },
            Builtin::BooleanCtor => Value::Bool(self.realm.heap.truthy(&arg(args, 0))),
            Builtin::ConsoleLog | Builtin::ConsoleError => {
                let line = args
                    .iter()
                    .map(|value| match value {
                        Value::Str(s) => s.clone(),
                        other => crate::inspect::inspect_value(
                            &self.realm.heap,
                            other,
                            tern_types::InspectOptions::default(),
                        ),
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                (self.realm.console)(&line);
                Value::Undefined
            }
            Builtin::ParseInt => {
                let text = self.realm.heap.to_display_string(&arg(args, 0));
                let radix = number_arg(&self.realm.heap, 1);
                let radix = if radix.is_nan() { 0 } else { radix as u32 };
                Value::Number(parse_int_prefix(&text, radix))
            }
            Builtin::ParseFloat => {
                let text = self.realm.heap.to_display_string(&arg(args, 0));
                Value::Number(parse_float_prefix(&text))
            }
            Builtin::IsNaN => Value::Bool(number_arg(&self.realm.heap, 0).is_nan()),
            Builtin::IsFinite => Value::Bool(number_arg(&self.realm.heap, 0).is_finite()),
            Builtin::ToString => match (&this, args.first()) {
                (Value::Number(n), Some(radix)) if !radix.is_nullish() => {
                    let radix = self.realm.heap.to_number(radix) as u32;
                    if !(2..=36).contains(&radix) {
                        let message = "toString() radix must be between 2 and 36";
                        return self.throw("RangeError", message);
                    }
                    Value::Str(integer_in_radix(*n, radix))
                }
                _ => Value::Str(self.realm.heap.to_display_string(&this)),
            },
            Builtin::ToFixed => {
                let digits = number_arg(&self.realm.heap, 0);
                let digits = if digits.is_nan() { 0.0 } else { digits };
                if !(0.0..=100.0).contains(&digits) {
                    let message = "toFixed() digits argument must be between 0 and 100";
                    return self.throw("RangeError", message);
                }
                let n = self.realm.heap.to_number(&this);
                Value::Str(format!("{n:.prec$}", prec = digits as usize))
            }
            Builtin::ToUpperCase
            | Builtin::ToLowerCase
            | Builtin::Trim
            | Builtin::StrIncludes
            | Builtin::StartsWith
            | Builtin::EndsWith
            | Builtin::StrSlice
            | Builtin::Split
            | Builtin::Repeat
            | Builtin::StrIndexOf
            | Builtin::CharAt => {
                let s = self.realm.heap.to_display_string(&this);
                return self.string_method(builtin, &s, args);
            }
            Builtin::Join
            | Builtin::ArrIncludes
            | Builtin::ArrIndexOf
            | Builtin::ArrSlice
            | Builtin::Concat
            | Builtin::Reverse
            | Builtin::Push
            | Builtin::Pop => {
                let Some(obj) = this.as_object() else {
                    return self.throw("TypeError", "receiver is not an array");
                };
                return self.array_method(builtin, obj, &this, args);
            }
        })
    }

    fn next_random(&mut self) -> f64 {
        // xorshift64*
        let mut x = self.realm.rng;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.realm.rng = x;
        let out = x.wrapping_mul(0x2545_f491_4f6c_dd1d);
        (out >> 11) as f64 / (1u64 << 53) as f64
    }

    fn own_entries(&mut self, target: &Value) -> Completion<Vec<(String, Value)>> {
        match target {
            Value::Undefined | Value::Null => {
                self.throw("TypeError", "Cannot convert undefined or null to object")
            }
            Value::Str(s) => Ok(s
                .chars()
                .enumerate()
                .map(|(i, c)| (i.to_string(), Value::Str(c.to_string())))
                .collect()),
            Value::Object(obj) => Ok(match self.realm.heap.get(*obj) {
                HeapObject::Plain(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                HeapObject::Array(items) => items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (i.to_string(), v.clone()))
                    .collect(),
                HeapObject::Function(_) | HeapObject::Error { .. } => Vec::new(),
            }),
            _ => Ok(Vec::new()),
        }
    }

    fn string_method(&mut self, builtin: Builtin, s: &str, args: &[Value]) -> Completion<Value> {
        let heap = &self.realm.heap;
        let text_arg = |idx: usize| heap.to_display_string(&arg(args, idx));
        let chars: Vec<char> = s.chars().collect();
        let position = |idx: usize, default: usize| {
            relative_index(heap, &arg(args, idx), chars.len(), default)
        };
        let value = match builtin {
            Builtin::ToUpperCase => Value::Str(s.to_uppercase()),
            Builtin::ToLowerCase => Value::Str(s.to_lowercase()),
            Builtin::Trim => Value::str(s.trim()),
            Builtin::StrIncludes => {
                let rest: String = chars[position(1, 0)..].iter().collect();
                Value::Bool(rest.contains(&text_arg(0)))
            }
            Builtin::StartsWith => {
                let rest: String = chars[position(1, 0)..].iter().collect();
                Value::Bool(rest.starts_with(&text_arg(0)))
            }
            Builtin::EndsWith => {
                let head: String = chars[..position(1, chars.len())].iter().collect();
                Value::Bool(head.ends_with(&text_arg(0)))
            }
            Builtin::StrSlice => {
                let start = position(0, 0);
                let end = position(1, chars.len());
                Value::Str(chars[start..end.max(start)].iter().collect())
            }
            Builtin::StrIndexOf => {
                let needle: Vec<char> = text_arg(0).chars().collect();
                let from = position(1, 0);
                let found = (from..=chars.len().saturating_sub(needle.len()))
                    .find(|&i| chars[i..].starts_with(&needle));
                Value::Number(found.map_or(-1.0, |i| i as f64))
            }
            Builtin::CharAt => {
                let idx = heap.to_number(&arg(args, 0));
                let idx = if idx.is_nan() { 0.0 } else { idx };
                Value::Str(
                    (idx >= 0.0)
                        .then(|| chars.get(idx as usize))
                        .flatten()
                        .map(|c| c.to_string())
                        .unwrap_or_default(),
                )
            }
            Builtin::Repeat => {
                let count = heap.to_number(&arg(args, 0));
                let count = if count.is_nan() { 0.0 } else { count.trunc() };
                if count < 0.0 || count.is_infinite() {
                    let shown = format_number(count);
                    return self.throw("RangeError", format!("Invalid count value: {shown}"));
                }
                let count = count as usize;
                match s.len().checked_mul(count) {
                    Some(len) if len <= MAX_STRING_LENGTH => Value::Str(s.repeat(count)),
                    _ => return self.throw("RangeError", "Invalid string length"),
                }
            }
            Builtin::Split => {
                let parts: Vec<Value> = match arg(args, 0) {
                    Value::Undefined => vec![Value::str(s)],
                    separator => {
                        let separator = heap.to_display_string(&separator);
                        if separator.is_empty() {
                            chars.iter().map(|c| Value::Str(c.to_string())).collect()
                        } else {
                            s.split(separator.as_str()).map(Value::str).collect()
                        }
                    }
                };
                let limit = match arg(args, 1) {
                    Value::Undefined => usize::MAX,
                    limit => heap.to_number(&limit).max(0.0) as usize,
                };
                let parts = parts.into_iter().take(limit).collect();
                self.realm.heap.array(parts)
            }
            _ => Value::Undefined,
        };
        Ok(value)
    }

    fn array_method(
        &mut self,
        builtin: Builtin,
        obj: ObjRef,
        this: &Value,
        args: &[Value],
    ) -> Completion<Value> {
        let items = match self.realm.heap.get(obj) {
            HeapObject::Array(items) => items.clone(),
            _ => {
                let name = builtin.name();
                return self.throw("TypeError", format!("{name} called on a non-array receiver"));
            }
        };
        let heap = &self.realm.heap;
        let value = match builtin {
            Builtin::Join => {
                let separator = match arg(args, 0) {
                    Value::Undefined => ",".to_string(),
                    other => heap.to_display_string(&other),
                };
                let parts: Vec<String> = items
                    .iter()
                    .map(|item| match item {
                        Value::Undefined | Value::Null => String::new(),
                        other => heap.to_display_string(other),
                    })
                    .collect();
                Value::Str(parts.join(&separator))
            }
            Builtin::ArrIncludes => {
                let needle = arg(args, 0);
                let from = relative_index(heap, &arg(args, 1), items.len(), 0);
                Value::Bool(items[from..].iter().any(|item| match (item, &needle) {
                    (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan() => true,
                    _ => heap.strict_equals(item, &needle),
                }))
            }
            Builtin::ArrIndexOf => {
                let needle = arg(args, 0);
                let from = relative_index(heap, &arg(args, 1), items.len(), 0);
                let found = items[from..]
                    .iter()
                    .position(|item| heap.strict_equals(item, &needle));
                Value::Number(found.map_or(-1.0, |i| (i + from) as f64))
            }
            Builtin::ArrSlice => {
                let start = relative_index(heap, &arg(args, 0), items.len(), 0);
                let end = relative_index(heap, &arg(args, 1), items.len(), items.len());
                let slice = items[start..end.max(start)].to_vec();
                self.realm.heap.array(slice)
            }
            Builtin::Concat => {
                let mut out = items;
                for value in args {
                    match value {
                        Value::Object(other) => match heap.get(*other) {
                            HeapObject::Array(more) => out.extend(more.iter().cloned()),
                            _ => out.push(value.clone()),
                        },
                        _ => out.push(value.clone()),
                    }
                }
                self.realm.heap.array(out)
            }
            Builtin::Reverse => {
                if let HeapObject::Array(items) = self.realm.heap.get_mut(obj) {
                    items.reverse();
                }
                this.clone()
            }
            Builtin::Push => {
                let HeapObject::Array(items) = self.realm.heap.get_mut(obj) else {
                    return Ok(Value::Undefined);
                };
                items.extend(args.iter().cloned());
                Value::Number(items.len() as f64)
            }
            Builtin::Pop => match self.realm.heap.get_mut(obj) {
                HeapObject::Array(items) => items.pop().unwrap_or(Value::Undefined),
                _ => Value::Undefined,
            },
            _ => Value::Undefined,
        };
        Ok(value)
    }

    fn json_stringify(&mut self, value: &Value, space: &Value) -> Completion<Value> {
        let mut seen = Vec::new();
        let json = match self.to_json(value, &mut seen)? {
            Some(json) => json,
            None => return Ok(Value::Undefined),
        };
        let indent = match space {
            Value::Number(n) if *n >= 1.0 => " ".repeat((*n as usize).min(10)),
            Value::Str(s) => s.chars().take(10).collect(),
            _ => String::new(),
        };
        match render_json(&json, &indent) {
            Ok(text) => Ok(Value::Str(text)),
            Err(err) => self.throw("TypeError", err.to_string()),
        }
    }

    /// `None` for values JSON has no spelling for (undefined, functions).
    fn to_json(
        &mut self,
        value: &Value,
        seen: &mut Vec<ObjRef>,
    ) -> Completion<Option<serde_json::Value>> {
        Ok(Some(match value {
            Value::Undefined => return Ok(None),
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => json_number(*n),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Object(obj) => {
                if seen.contains(obj) {
                    return self.throw("TypeError", "Converting circular structure to JSON");
                }
                let object = self.realm.heap.get(*obj).clone();
                seen.push(*obj);
                let json = match object {
                    HeapObject::Function(_) => {
                        seen.pop();
                        return Ok(None);
                    }
                    HeapObject::Array(items) => {
                        let mut out = Vec::with_capacity(items.len());
                        for item in &items {
                            out.push(self.to_json(item, seen)?.unwrap_or(serde_json::Value::Null));
                        }
                        serde_json::Value::Array(out)
                    }
                    HeapObject::Plain(map) => {
                        let mut out = serde_json::Map::new();
                        for (key, item) in &map {
                            if let Some(json) = self.to_json(item, seen)? {
                                out.insert(key.clone(), json);
                            }
                        }
                        serde_json::Value::Object(out)
                    }
                    HeapObject::Error { .. } => serde_json::Value::Object(serde_json::Map::new()),
                };
                seen.pop();
                json
            }
        }))
    }

    fn from_json(&mut self, json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                let values = items.into_iter().map(|item| self.from_json(item)).collect();
                self.realm.heap.array(values)
            }
            serde_json::Value::Object(map) => {
                let values = map
                    .into_iter()
                    .map(|(key, item)| (key, self.from_json(item)))
                    .collect();
                self.realm.heap.alloc(HeapObject::Plain(values))
            }
        }
    }
}

fn render_json(json: &serde_json::Value, indent: &str) -> Result<String, serde_json::Error> {
    if indent.is_empty() {
        return serde_json::to_string(json);
    }
    let mut out = Vec::new();
    let mut serializer =
        Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(indent.as_bytes()));
    json.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

fn json_number(n: f64) -> serde_json::Value {
    if !n.is_finite() {
        return serde_json::Value::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

fn integer_in_radix(n: f64, radix: u32) -> String {
    if !n.is_finite() || n.fract() != 0.0 || radix == 10 {
        return format_number(n);
    }
    let mut value = n.abs() as u128;
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        let digit = (value % u128::from(radix)) as u32;
        digits.push(std::char::from_digit(digit, radix).unwrap_or('?'));
        value /= u128::from(radix);
    }
    if n < 0.0 {
        digits.push('-');
    }
    digits.iter().rev().collect()
}
