use crate::builtins::Builtin;
use indexmap::IndexMap;

/// Index of an object on the [`Heap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Object(ObjRef),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Value {
        Value::Str(s.into())
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn as_object(&self) -> Option<ObjRef> {
        match self {
            Value::Object(obj) => Some(*obj),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NativeFunction {
    pub builtin: Builtin,
    /// Receiver captured when the function was read off a value.
    pub this: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeapObject {
    Plain(IndexMap<String, Value>),
    Array(Vec<Value>),
    Function(NativeFunction),
    Error { name: String, message: String },
}

/// Objects are never freed individually; a session's heap lives as long as
/// the evaluator.
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<HeapObject>,
}

impl Heap {
    pub fn alloc(&mut self, object: HeapObject) -> Value {
        self.objects.push(object);
        Value::Object(ObjRef(self.objects.len() - 1))
    }

    pub fn get(&self, obj: ObjRef) -> &HeapObject {
        &self.objects[obj.0]
    }

    pub fn get_mut(&mut self, obj: ObjRef) -> &mut HeapObject {
        &mut self.objects[obj.0]
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn array(&mut self, items: Vec<Value>) -> Value {
        self.alloc(HeapObject::Array(items))
    }

    pub fn error(&mut self, name: &str, message: impl Into<String>) -> Value {
        self.alloc(HeapObject::Error {
            name: name.to_string(),
            message: message.into(),
        })
    }

    pub fn function(&mut self, builtin: Builtin, this: Option<Value>) -> Value {
        self.alloc(HeapObject::Function(NativeFunction { builtin, this }))
    }

    pub fn is_function(&self, value: &Value) -> bool {
        matches!(value, Value::Object(obj) if matches!(self.get(*obj), HeapObject::Function(_)))
    }

    pub fn type_of(&self, value: &Value) -> &'static str {
        match value {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Object(obj) => match self.get(*obj) {
                HeapObject::Function(_) => "function",
                _ => "object",
            },
        }
    }

    pub fn to_display_string(&self, value: &Value) -> String {
        self.to_string_guarded(value, &mut Vec::new())
    }

    fn to_string_guarded(&self, value: &Value, seen: &mut Vec<ObjRef>) -> String {
        match value {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Str(s) => s.clone(),
            Value::Object(obj) => {
                if seen.contains(obj) {
                    return String::new();
                }
                match self.get(*obj) {
                    HeapObject::Plain(_) => "[object Object]".to_string(),
                    HeapObject::Function(f) => {
                        format!("function {}() {{ [native code] }}", f.builtin.name())
                    }
                    HeapObject::Error { name, message } if message.is_empty() => name.clone(),
                    HeapObject::Error { name, message } => format!("{name}: {message}"),
                    HeapObject::Array(items) => {
                        seen.push(*obj);
                        let joined = items
                            .iter()
                            .map(|item| match item {
                                Value::Undefined | Value::Null => String::new(),
                                other => self.to_string_guarded(other, seen),
                            })
                            .collect::<Vec<_>>()
                            .join(",");
                        seen.pop();
                        joined
                    }
                }
            }
        }
    }

    pub fn to_number(&self, value: &Value) -> f64 {
        match value {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::Str(s) => string_to_number(s),
            Value::Object(_) => string_to_number(&self.to_display_string(value)),
        }
    }

    pub fn truthy(&self, value: &Value) -> bool {
        match value {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Object(_) => true,
        }
    }

    pub fn strict_equals(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => x == y,
            _ => a == b,
        }
    }

    pub fn loose_equals(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
            (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
            (Value::Object(_), Value::Object(_)) => a == b,
            (Value::Str(_), Value::Str(_)) => a == b,
            (Value::Object(_), _) => {
                let primitive = Value::Str(self.to_display_string(a));
                self.loose_equals(&primitive, b)
            }
            (_, Value::Object(_)) => {
                let primitive = Value::Str(self.to_display_string(b));
                self.loose_equals(a, &primitive)
            }
            _ => self.to_number(a) == self.to_number(b),
        }
    }
}

/// Format a number the way the language prints it: integers without a
/// fractional part, exponents with an explicit sign.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return if n.is_sign_negative() { "-0" } else { "0" }.to_string();
    }
    let abs = n.abs();
    if !(1e-6..1e21).contains(&abs) {
        let formatted = format!("{n:e}");
        return match formatted.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
            _ => formatted,
        };
    }
    if n.fract() == 0.0 {
        return format!("{n:.0}");
    }
    format!("{n}")
}

fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return i64::from_str_radix(hex, 16).map_or(f64::NAN, |v| v as f64);
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        // Rust accepts spellings such as "inf" and "nan" that the language does not
        _ if trimmed
            .chars()
            .any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') =>
        {
            f64::NAN
        }
        _ => trimmed.parse::<f64>().unwrap_or(f64::NAN),
    }
}

/// Longest numeric prefix of `s`, as used by `parseFloat`.
pub fn parse_float_prefix(s: &str) -> f64 {
    let trimmed = s.trim_start();
    for special in ["Infinity", "+Infinity", "-Infinity"] {
        if trimmed.starts_with(special) {
            return if special.starts_with('-') {
                f64::NEG_INFINITY
            } else {
                f64::INFINITY
            };
        }
    }
    let mut best = f64::NAN;
    for (idx, ch) in trimmed.char_indices() {
        if !(ch.is_ascii_digit() || matches!(ch, '.' | 'e' | 'E' | '+' | '-')) {
            break;
        }
        if let Ok(v) = trimmed[..idx + ch.len_utf8()].parse::<f64>() {
            best = v;
        }
    }
    best
}

/// `parseInt` semantics for radix 2..=36; 0 means "detect".
pub fn parse_int_prefix(s: &str, radix: u32) -> f64 {
    let mut rest = s.trim_start();
    let mut sign = 1.0;
    if let Some(r) = rest.strip_prefix('-') {
        sign = -1.0;
        rest = r;
    } else if let Some(r) = rest.strip_prefix('+') {
        rest = r;
    }
    let mut radix = radix;
    if (radix == 0 || radix == 16)
        && let Some(r) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X"))
    {
        rest = r;
        radix = 16;
    }
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let mut result: Option<f64> = None;
    for ch in rest.chars() {
        let Some(digit) = ch.to_digit(radix) else {
            break;
        };
        result = Some(result.unwrap_or(0.0) * f64::from(radix) + f64::from(digit));
    }
    result.map_or(f64::NAN, |v| sign * v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(2.0), "2");
        assert_eq!(format_number(-0.0), "-0");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(1.5e-9), "1.5e-9");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_string_to_number() {
        let heap = Heap::default();
        assert_eq!(heap.to_number(&Value::str(" 42 ")), 42.0);
        assert_eq!(heap.to_number(&Value::str("")), 0.0);
        assert_eq!(heap.to_number(&Value::str("0x1f")), 31.0);
        assert!(heap.to_number(&Value::str("inf")).is_nan());
        assert!(heap.to_number(&Value::str("12px")).is_nan());
    }

    #[test]
    fn test_parse_prefixes() {
        assert_eq!(parse_int_prefix("12px", 0), 12.0);
        assert_eq!(parse_int_prefix("-ff", 16), -255.0);
        assert!(parse_int_prefix("px", 10).is_nan());
        assert_eq!(parse_float_prefix("3.14abc"), 3.14);
        assert_eq!(parse_float_prefix("1e3x"), 1000.0);
        assert!(parse_float_prefix("abc").is_nan());
    }

    #[test]
    fn test_array_to_string_skips_cycles_and_nullish() {
        let mut heap = Heap::default();
        let arr = heap.array(vec![Value::Number(1.0), Value::Null, Value::str("x")]);
        assert_eq!(heap.to_display_string(&arr), "1,,x");
        let obj = arr.as_object().unwrap();
        if let HeapObject::Array(items) = heap.get_mut(obj) {
            items.push(arr.clone());
        }
        assert_eq!(heap.to_display_string(&arr), "1,,x,");
    }

    #[test]
    fn test_loose_equality() {
        let heap = Heap::default();
        assert!(heap.loose_equals(&Value::Null, &Value::Undefined));
        assert!(heap.loose_equals(&Value::str("1"), &Value::Number(1.0)));
        assert!(heap.loose_equals(&Value::Bool(true), &Value::Number(1.0)));
        assert!(!heap.loose_equals(&Value::Null, &Value::Number(0.0)));
        assert!(!heap.strict_equals(&Value::Number(f64::NAN), &Value::Number(f64::NAN)));
    }
}
