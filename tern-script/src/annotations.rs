//! Parameter lists for native functions, used to hint the remaining
//! arguments of an open call.

use crate::builtins::Builtin;

pub fn signature(builtin: Builtin) -> &'static [&'static str] {
    match builtin {
        Builtin::MathAbs
        | Builtin::MathFloor
        | Builtin::MathCeil
        | Builtin::MathRound
        | Builtin::MathTrunc
        | Builtin::MathSign
        | Builtin::MathSqrt => &["x"],
        Builtin::MathMax | Builtin::MathMin => &["...values"],
        Builtin::MathPow => &["base", "exponent"],
        Builtin::MathRandom => &[],
        Builtin::JsonStringify => &["value", "?replacer", "?space"],
        Builtin::JsonParse => &["text"],
        Builtin::ObjectKeys | Builtin::ObjectValues | Builtin::ObjectEntries => &["o"],
        Builtin::ArrayIsArray => &["arg"],
        Builtin::StringCtor | Builtin::NumberCtor | Builtin::BooleanCtor => &["?value"],
        Builtin::ConsoleLog | Builtin::ConsoleError => &["...data"],
        Builtin::ParseInt => &["string", "?radix"],
        Builtin::ParseFloat => &["string"],
        Builtin::IsNaN | Builtin::IsFinite => &["number"],
        Builtin::ToString => &["?radix"],
        Builtin::ToFixed => &["?fractionDigits"],
        Builtin::ToUpperCase | Builtin::ToLowerCase | Builtin::Trim => &[],
        Builtin::StrIncludes | Builtin::StartsWith | Builtin::StrIndexOf => {
            &["searchString", "?position"]
        }
        Builtin::EndsWith => &["searchString", "?endPosition"],
        Builtin::StrSlice | Builtin::ArrSlice => &["?start", "?end"],
        Builtin::Split => &["separator", "?limit"],
        Builtin::Repeat => &["count"],
        Builtin::CharAt => &["pos"],
        Builtin::Join => &["?separator"],
        Builtin::ArrIncludes | Builtin::ArrIndexOf => &["searchElement", "?fromIndex"],
        Builtin::Concat | Builtin::Push => &["...items"],
        Builtin::Reverse | Builtin::Pop => &[],
    }
}

/// Text describing what is still missing from a call to `builtin` that has
/// `supplied` arguments so far. `buffer` is the source up to the cursor.
pub fn complete_call(builtin: Builtin, supplied: usize, buffer: &str) -> String {
    let params = signature(builtin);
    if supplied >= params.len() {
        return match params.last() {
            Some(last) if last.starts_with("...") => format!(", {last}"),
            _ => ")".to_string(),
        };
    }
    let rest = params[supplied..].join(", ");
    if supplied == 0 {
        return rest;
    }
    if buffer.trim_end().ends_with(',') {
        let after_comma = buffer.len() - (buffer.rfind(',').map_or(0, |i| i + 1));
        if after_comma > 0 {
            return rest;
        }
        return format!(" {rest}");
    }
    format!(", {rest}")
}
