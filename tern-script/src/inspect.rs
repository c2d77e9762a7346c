//! Human-readable rendering of values, in the style of a node-like REPL.

use crate::lexer::{is_ident_char, is_ident_start};
use crate::value::{Heap, HeapObject, ObjRef, Value, format_number};
use crossterm::style::Stylize;
use tern_types::{InspectOptions, ValueKind};

const MAX_DEPTH: usize = 2;
const MAX_ITEMS: usize = 100;
const BREAK_LENGTH: usize = 72;

pub fn kind_of(heap: &Heap, value: &Value) -> ValueKind {
    match value {
        Value::Undefined => ValueKind::Undefined,
        Value::Null => ValueKind::Null,
        Value::Bool(_) => ValueKind::Boolean,
        Value::Number(_) => ValueKind::Number,
        Value::Str(_) => ValueKind::String,
        Value::Object(obj) => match heap.get(*obj) {
            HeapObject::Plain(_) => ValueKind::Object,
            HeapObject::Array(_) => ValueKind::Array,
            HeapObject::Function(_) => ValueKind::Function,
            HeapObject::Error { .. } => ValueKind::Error,
        },
    }
}

/// Short description attached to remote handles.
pub fn describe(heap: &Heap, value: &Value) -> String {
    match value {
        Value::Str(s) => s.clone(),
        Value::Object(obj) => match heap.get(*obj) {
            HeapObject::Plain(_) => "Object".to_string(),
            HeapObject::Array(items) => format!("Array({})", items.len()),
            HeapObject::Function(f) => format!("[Function: {}]", f.builtin.name()),
            HeapObject::Error { .. } => heap.to_display_string(value),
        },
        other => heap.to_display_string(other),
    }
}

pub fn inspect_value(heap: &Heap, value: &Value, options: InspectOptions) -> String {
    let mut inspector = Inspector {
        heap,
        options,
        seen: Vec::new(),
    };
    inspector.format(value, 0)
}

/// Quote a string with single quotes, escaping quotes, backslashes and
/// control characters.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        match ch {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    chars.next().is_some_and(is_ident_start) && chars.all(is_ident_char)
}

fn visible_len(s: &str) -> usize {
    let mut len = 0;
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch == '\x1b' {
            for c in chars.by_ref() {
                if c.is_ascii_alphabetic() {
                    break;
                }
            }
        } else {
            len += 1;
        }
    }
    len
}

struct Inspector<'h> {
    heap: &'h Heap,
    options: InspectOptions,
    seen: Vec<ObjRef>,
}

enum Style {
    Number,
    Str,
    Boolean,
    Undefined,
    Null,
    Special,
}

impl Inspector<'_> {
    fn stylize(&self, text: String, style: Style) -> String {
        if !self.options.colors {
            return text;
        }
        match style {
            Style::Number => text.dark_blue().to_string(),
            Style::Str => text.dark_green().to_string(),
            Style::Boolean => text.dark_yellow().to_string(),
            Style::Undefined => text.dark_grey().to_string(),
            Style::Null => text.bold().to_string(),
            Style::Special => text.dark_cyan().to_string(),
        }
    }

    fn format(&mut self, value: &Value, depth: usize) -> String {
        match value {
            Value::Undefined => self.stylize("undefined".to_string(), Style::Undefined),
            Value::Null => self.stylize("null".to_string(), Style::Null),
            Value::Bool(b) => self.stylize(b.to_string(), Style::Boolean),
            Value::Number(n) => self.stylize(format_number(*n), Style::Number),
            Value::Str(s) => self.stylize(quote(s), Style::Str),
            Value::Object(obj) => self.format_object(*obj, depth),
        }
    }

    fn format_object(&mut self, obj: ObjRef, depth: usize) -> String {
        if self.seen.contains(&obj) {
            return self.stylize("[Circular]".to_string(), Style::Special);
        }
        let heap = self.heap;
        match heap.get(obj) {
            HeapObject::Function(f) => {
                self.stylize(format!("[Function: {}]", f.builtin.name()), Style::Special)
            }
            HeapObject::Error { .. } => {
                let text = heap.to_display_string(&Value::Object(obj));
                if depth == 0 { text } else { format!("[{text}]") }
            }
            HeapObject::Array(items) => {
                if items.is_empty() {
                    return "[]".to_string();
                }
                if depth > MAX_DEPTH {
                    return self.stylize("[Array]".to_string(), Style::Special);
                }
                self.seen.push(obj);
                let mut entries: Vec<String> = items
                    .iter()
                    .take(MAX_ITEMS)
                    .map(|item| self.format(item, depth + 1))
                    .collect();
                if items.len() > MAX_ITEMS {
                    let more = items.len() - MAX_ITEMS;
                    let plural = if more > 1 { "s" } else { "" };
                    entries.push(format!("... {more} more item{plural}"));
                }
                self.seen.pop();
                self.layout('[', ']', entries, depth)
            }
            HeapObject::Plain(map) => {
                if map.is_empty() {
                    return "{}".to_string();
                }
                if depth > MAX_DEPTH {
                    return self.stylize("[Object]".to_string(), Style::Special);
                }
                self.seen.push(obj);
                let entries = map
                    .iter()
                    .map(|(key, item)| {
                        let key = if is_identifier(key) {
                            key.clone()
                        } else {
                            self.stylize(quote(key), Style::Str)
                        };
                        format!("{key}: {}", self.format(item, depth + 1))
                    })
                    .collect();
                self.seen.pop();
                self.layout('{', '}', entries, depth)
            }
        }
    }

    fn layout(&self, open: char, close: char, entries: Vec<String>, depth: usize) -> String {
        let multiline_entry = entries.iter().any(|e| e.contains('\n'));
        let total: usize = entries.iter().map(|e| visible_len(e) + 2).sum::<usize>() + 2;
        if self.options.compact || (!multiline_entry && total + depth * 2 <= BREAK_LENGTH) {
            return format!("{open} {} {close}", entries.join(", "));
        }
        let indent = "  ".repeat(depth + 1);
        let body = entries
            .iter()
            .map(|e| format!("{indent}{e}"))
            .collect::<Vec<_>>()
            .join(",\n");
        format!("{open}\n{body}\n{}{close}", "  ".repeat(depth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn plain() -> InspectOptions {
        InspectOptions::default()
    }

    #[test]
    fn test_primitives() {
        let heap = Heap::default();
        assert_eq!(inspect_value(&heap, &Value::Number(2.0), plain()), "2");
        assert_eq!(inspect_value(&heap, &Value::str("it's"), plain()), "'it\\'s'");
        assert_eq!(inspect_value(&heap, &Value::Undefined, plain()), "undefined");
    }

    #[test]
    fn test_nested_structures() {
        let mut heap = Heap::default();
        let inner = heap.array(vec![Value::Number(1.0), Value::Number(2.0)]);
        let mut map = IndexMap::new();
        map.insert("a".to_string(), inner);
        map.insert("b-c".to_string(), Value::Bool(true));
        let obj = heap.alloc(HeapObject::Plain(map));
        assert_eq!(
            inspect_value(&heap, &obj, plain()),
            "{ a: [ 1, 2 ], 'b-c': true }"
        );
    }

    #[test]
    fn test_circular_reference() {
        let mut heap = Heap::default();
        let obj = heap.alloc(HeapObject::Plain(IndexMap::new()));
        let obj_ref = obj.as_object().unwrap();
        if let HeapObject::Plain(map) = heap.get_mut(obj_ref) {
            map.insert("self".to_string(), obj.clone());
        }
        assert_eq!(inspect_value(&heap, &obj, plain()), "{ self: [Circular] }");
    }

    #[test]
    fn test_long_arrays_break_unless_compact() {
        let mut heap = Heap::default();
        let items = (0..30).map(|i| Value::Number(f64::from(i) * 1000.0)).collect();
        let arr = heap.array(items);
        assert!(inspect_value(&heap, &arr, plain()).contains('\n'));
        let compact = InspectOptions {
            colors: false,
            compact: true,
        };
        assert!(!inspect_value(&heap, &arr, compact).contains('\n'));
    }

    #[test]
    fn test_colors_only_add_escape_codes() {
        let heap = Heap::default();
        let colored = InspectOptions {
            colors: true,
            compact: true,
        };
        let out = inspect_value(&heap, &Value::Number(5.0), colored);
        assert!(out.contains('\x1b'));
        assert_eq!(visible_len(&out), 1);
    }

    #[test]
    fn test_describe() {
        let mut heap = Heap::default();
        let arr = heap.array(vec![Value::Null; 3]);
        assert_eq!(describe(&heap, &arr), "Array(3)");
        let err = heap.error("TypeError", "boom");
        assert_eq!(describe(&heap, &err), "TypeError: boom");
    }
}
