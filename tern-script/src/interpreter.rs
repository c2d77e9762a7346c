use crate::builtins::{self, Builtin};
use crate::parser::{BinaryOp, DeclKind, Expr, LogicalOp, Stmt, UnaryOp};
use crate::value::{Heap, HeapObject, ObjRef, Value, format_number};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

const MAX_DEPTH: usize = 256;

pub(crate) const SIDE_EFFECT_MESSAGE: &str = "Possible side-effect in eager evaluation";

/// Receives everything `console.log` prints, one line per call.
pub type ConsoleSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Non-local exits out of the tree walker.
#[derive(Debug)]
pub(crate) enum Interrupt {
    Throw(Value),
    Timeout(Duration),
}

pub(crate) type Completion<T> = Result<T, Interrupt>;

#[derive(Debug, Clone)]
pub(crate) struct Binding {
    pub value: Value,
    pub kind: DeclKind,
}

/// Everything the evaluator owns: the heap, the global scope and the table of
/// handles given out to callers.
pub struct Realm {
    pub(crate) heap: Heap,
    pub(crate) globals: IndexMap<String, Binding>,
    handles: HashMap<u64, Value>,
    groups: HashMap<String, Vec<u64>>,
    next_handle: u64,
    pub(crate) console: ConsoleSink,
    pub(crate) rng: u64,
}

impl Realm {
    pub fn new(console: ConsoleSink) -> Self {
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x2545_f491_4f6c_dd1d);
        let mut realm = Realm {
            heap: Heap::default(),
            globals: IndexMap::new(),
            handles: HashMap::new(),
            groups: HashMap::new(),
            next_handle: 1,
            console,
            rng: seed | 1,
        };
        builtins::install_globals(&mut realm);
        realm
    }

    pub(crate) fn define_global(&mut self, name: &str, value: Value) {
        self.globals.insert(
            name.to_string(),
            Binding {
                value,
                kind: DeclKind::Var,
            },
        );
    }

    pub(crate) fn register(&mut self, value: Value, group: Option<&str>) -> u64 {
        let id = self.next_handle;
        self.next_handle += 1;
        self.handles.insert(id, value);
        if let Some(group) = group {
            self.groups.entry(group.to_string()).or_default().push(id);
        }
        id
    }

    pub(crate) fn handle(&self, id: u64) -> Option<&Value> {
        self.handles.get(&id)
    }

    pub(crate) fn release_group(&mut self, group: &str) {
        if let Some(ids) = self.groups.remove(group) {
            for id in ids {
                self.handles.remove(&id);
            }
        }
    }

    pub(crate) fn live_handles(&self) -> usize {
        self.handles.len()
    }
}

/// One evaluation in progress.
pub(crate) struct Exec<'r> {
    pub realm: &'r mut Realm,
    pub side_effect_free: bool,
    deadline: Option<(Instant, Duration)>,
    depth: usize,
}

impl<'r> Exec<'r> {
    pub fn new(realm: &'r mut Realm, side_effect_free: bool, timeout: Option<Duration>) -> Self {
        Exec {
            realm,
            side_effect_free,
            deadline: timeout.map(|t| (Instant::now() + t, t)),
            depth: 0,
        }
    }

    pub fn throw<T>(&mut self, name: &str, message: impl Into<String>) -> Completion<T> {
        let error = self.realm.heap.error(name, message);
        Err(Interrupt::Throw(error))
    }

    fn guard_side_effect(&mut self) -> Completion<()> {
        if self.side_effect_free {
            return self.throw("EvalError", SIDE_EFFECT_MESSAGE);
        }
        Ok(())
    }

    fn tick(&mut self) -> Completion<()> {
        if let Some((deadline, budget)) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(Interrupt::Timeout(budget));
        }
        Ok(())
    }

    /// Run a program and return the value of its last expression statement.
    pub fn run(&mut self, program: &[Stmt]) -> Completion<Value> {
        let mut last = Value::Undefined;
        for stmt in program {
            match stmt {
                Stmt::Empty => {}
                Stmt::Expr(expr) => last = self.eval(expr)?,
                Stmt::Decl { kind, name, init } => self.declare(*kind, name, init.as_ref())?,
            }
        }
        Ok(last)
    }

    fn declare(&mut self, kind: DeclKind, name: &str, init: Option<&Expr>) -> Completion<()> {
        self.guard_side_effect()?;
        if let Some(existing) = self.realm.globals.get(name)
            && (kind != DeclKind::Var || existing.kind != DeclKind::Var)
        {
            return self.throw(
                "SyntaxError",
                format!("Identifier '{name}' has already been declared"),
            );
        }
        let value = match init {
            Some(expr) => self.eval(expr)?,
            None => match self.realm.globals.get(name) {
                // `var x` leaves an existing value alone
                Some(existing) => existing.value.clone(),
                None => Value::Undefined,
            },
        };
        self.realm
            .globals
            .insert(name.to_string(), Binding { value, kind });
        Ok(())
    }

    pub fn eval(&mut self, expr: &Expr) -> Completion<Value> {
        self.tick()?;
        self.depth += 1;
        let result = if self.depth > MAX_DEPTH {
            self.throw("RangeError", "Maximum call stack size exceeded")
        } else {
            self.eval_inner(expr)
        };
        self.depth -= 1;
        result
    }

    fn eval_inner(&mut self, expr: &Expr) -> Completion<Value> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::str(s.as_str())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Undefined => Ok(Value::Undefined),
            Expr::Template { quasis, exprs } => {
                let mut out = String::new();
                for (idx, quasi) in quasis.iter().enumerate() {
                    out.push_str(quasi);
                    if let Some(expr) = exprs.get(idx) {
                        let value = self.eval(expr)?;
                        out.push_str(&self.realm.heap.to_display_string(&value));
                    }
                }
                Ok(Value::Str(out))
            }
            Expr::Ident(name) => match self.realm.globals.get(name) {
                Some(binding) => Ok(binding.value.clone()),
                None => self.throw("ReferenceError", format!("{name} is not defined")),
            },
            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?);
                }
                Ok(self.realm.heap.array(values))
            }
            Expr::Object(props) => {
                let mut map = IndexMap::new();
                for (key, value) in props {
                    let value = self.eval(value)?;
                    map.insert(key.clone(), value);
                }
                Ok(self.realm.heap.alloc(HeapObject::Plain(map)))
            }
            Expr::Member { object, property } => {
                let target = self.eval(object)?;
                self.get_property(&target, property)
            }
            Expr::Index { object, index } => {
                let target = self.eval(object)?;
                let key = self.eval(index)?;
                let key = self.property_key(&key);
                self.get_property(&target, &key)
            }
            Expr::Call { callee, args } => {
                let function = self.eval(callee)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                self.call(&function, &values, || describe_callee(callee))
            }
            Expr::Unary { op, expr } => self.eval_unary(*op, expr),
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                Ok(self.binary(*op, &left, &right))
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left)?;
                let short_circuit = match op {
                    LogicalOp::And => !self.realm.heap.truthy(&left),
                    LogicalOp::Or => self.realm.heap.truthy(&left),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(right)
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                let test = self.eval(test)?;
                if self.realm.heap.truthy(&test) {
                    self.eval(consequent)
                } else {
                    self.eval(alternate)
                }
            }
            Expr::Assign { target, value } => {
                self.guard_side_effect()?;
                let value = self.eval(value)?;
                self.assign(target, value.clone())?;
                Ok(value)
            }
        }
    }

    fn eval_unary(&mut self, op: UnaryOp, expr: &Expr) -> Completion<Value> {
        if op == UnaryOp::Typeof
            && let Expr::Ident(name) = expr
            && !self.realm.globals.contains_key(name)
        {
            return Ok(Value::str("undefined"));
        }
        let value = self.eval(expr)?;
        let heap = &self.realm.heap;
        Ok(match op {
            UnaryOp::Neg => Value::Number(-heap.to_number(&value)),
            UnaryOp::Plus => Value::Number(heap.to_number(&value)),
            UnaryOp::Not => Value::Bool(!heap.truthy(&value)),
            UnaryOp::Typeof => Value::str(heap.type_of(&value)),
        })
    }

    fn binary(&self, op: BinaryOp, left: &Value, right: &Value) -> Value {
        let heap = &self.realm.heap;
        let num = |v: &Value| heap.to_number(v);
        match op {
            BinaryOp::Add => {
                let stringy = |v: &Value| matches!(v, Value::Str(_) | Value::Object(_));
                if stringy(left) || stringy(right) {
                    let mut out = heap.to_display_string(left);
                    out.push_str(&heap.to_display_string(right));
                    Value::Str(out)
                } else {
                    Value::Number(num(left) + num(right))
                }
            }
            BinaryOp::Sub => Value::Number(num(left) - num(right)),
            BinaryOp::Mul => Value::Number(num(left) * num(right)),
            BinaryOp::Div => Value::Number(num(left) / num(right)),
            BinaryOp::Rem => Value::Number(num(left) % num(right)),
            BinaryOp::Pow => Value::Number(num(left).powf(num(right))),
            BinaryOp::Eq => Value::Bool(heap.loose_equals(left, right)),
            BinaryOp::NotEq => Value::Bool(!heap.loose_equals(left, right)),
            BinaryOp::StrictEq => Value::Bool(heap.strict_equals(left, right)),
            BinaryOp::StrictNotEq => Value::Bool(!heap.strict_equals(left, right)),
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::LtEq | BinaryOp::GtEq => {
                let ordering = match (left, right) {
                    (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                    _ => num(left).partial_cmp(&num(right)),
                };
                let Some(ordering) = ordering else {
                    return Value::Bool(false);
                };
                Value::Bool(match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Gt => ordering.is_gt(),
                    BinaryOp::LtEq => ordering.is_le(),
                    _ => ordering.is_ge(),
                })
            }
        }
    }

    fn property_key(&self, key: &Value) -> String {
        match key {
            Value::Number(n) => format_number(*n),
            other => self.realm.heap.to_display_string(other),
        }
    }

    fn assign(&mut self, target: &Expr, value: Value) -> Completion<()> {
        match target {
            Expr::Ident(name) => {
                if let Some(binding) = self.realm.globals.get_mut(name) {
                    if binding.kind == DeclKind::Const {
                        return self.throw("TypeError", "Assignment to constant variable.");
                    }
                    binding.value = value;
                } else {
                    self.realm.define_global(name, value);
                }
                Ok(())
            }
            Expr::Member { object, property } => {
                let object = self.eval(object)?;
                self.set_property(&object, property, value)
            }
            Expr::Index { object, index } => {
                let object = self.eval(object)?;
                let key = self.eval(index)?;
                let key = self.property_key(&key);
                self.set_property(&object, &key, value)
            }
            // the parser only produces the three forms above
            _ => self.throw("SyntaxError", "Invalid left-hand side in assignment"),
        }
    }

    fn set_property(&mut self, object: &Value, key: &str, value: Value) -> Completion<()> {
        let obj = match object {
            Value::Undefined | Value::Null => {
                let shown = self.realm.heap.to_display_string(object);
                return self.throw(
                    "TypeError",
                    format!("Cannot set properties of {shown} (setting '{key}')"),
                );
            }
            Value::Object(obj) => *obj,
            // writes to primitives are dropped
            _ => return Ok(()),
        };
        let heap = &mut self.realm.heap;
        match heap.get_mut(obj) {
            HeapObject::Plain(map) => {
                map.insert(key.to_string(), value);
            }
            HeapObject::Array(items) => {
                if key == "length" {
                    let len = heap_len(&value);
                    items.resize(len, Value::Undefined);
                } else if let Ok(idx) = key.parse::<usize>() {
                    if idx >= items.len() {
                        items.resize(idx + 1, Value::Undefined);
                    }
                    items[idx] = value;
                }
            }
            HeapObject::Error { message, .. } if key == "message" => {
                *message = match &value {
                    Value::Str(s) => s.clone(),
                    _ => String::new(),
                };
            }
            HeapObject::Error { .. } | HeapObject::Function(_) => {}
        }
        Ok(())
    }

    pub fn get_property(&mut self, target: &Value, key: &str) -> Completion<Value> {
        match target {
            Value::Undefined | Value::Null => {
                let shown = self.realm.heap.to_display_string(target);
                self.throw(
                    "TypeError",
                    format!("Cannot read properties of {shown} (reading '{key}')"),
                )
            }
            Value::Str(s) => {
                if key == "length" {
                    return Ok(Value::Number(s.encode_utf16().count() as f64));
                }
                if let Ok(idx) = key.parse::<usize>() {
                    return Ok(s
                        .chars()
                        .nth(idx)
                        .map_or(Value::Undefined, |c| Value::Str(c.to_string())));
                }
                Ok(self.method(target, Builtin::string_method(key)))
            }
            Value::Number(_) => Ok(self.method(target, Builtin::number_method(key))),
            Value::Bool(_) => Ok(self.method(target, Builtin::common_method(key))),
            Value::Object(obj) => self.object_property(*obj, target, key),
        }
    }

    fn object_property(&mut self, obj: ObjRef, target: &Value, key: &str) -> Completion<Value> {
        let method = match self.realm.heap.get(obj) {
            HeapObject::Plain(map) => match map.get(key) {
                Some(value) => return Ok(value.clone()),
                None => Builtin::common_method(key),
            },
            HeapObject::Array(items) => {
                if key == "length" {
                    return Ok(Value::Number(items.len() as f64));
                }
                if let Ok(idx) = key.parse::<usize>() {
                    return Ok(items.get(idx).cloned().unwrap_or(Value::Undefined));
                }
                Builtin::array_method(key)
            }
            HeapObject::Function(f) => {
                if key == "name" {
                    return Ok(Value::str(f.builtin.name()));
                }
                if key == "length" {
                    return Ok(Value::Number(f.builtin.arity() as f64));
                }
                Builtin::common_method(key)
            }
            HeapObject::Error { name, message } => match key {
                "name" => return Ok(Value::str(name.as_str())),
                "message" => return Ok(Value::str(message.as_str())),
                _ => Builtin::common_method(key),
            },
        };
        Ok(self.method(target, method))
    }

    fn method(&mut self, this: &Value, builtin: Option<Builtin>) -> Value {
        match builtin {
            Some(builtin) => self.realm.heap.function(builtin, Some(this.clone())),
            None => Value::Undefined,
        }
    }

    pub fn call(
        &mut self,
        function: &Value,
        args: &[Value],
        describe: impl FnOnce() -> String,
    ) -> Completion<Value> {
        let native = match function {
            Value::Object(obj) => match self.realm.heap.get(*obj) {
                HeapObject::Function(native) => Some(native.clone()),
                _ => None,
            },
            _ => None,
        };
        let Some(native) = native else {
            return self.throw("TypeError", format!("{} is not a function", describe()));
        };
        if native.builtin.has_side_effect() {
            self.guard_side_effect()?;
        }
        self.depth += 1;
        let result = if self.depth > MAX_DEPTH {
            self.throw("RangeError", "Maximum call stack size exceeded")
        } else {
            self.call_builtin(native.builtin, native.this.as_ref(), args)
        };
        self.depth -= 1;
        result
    }
}

fn heap_len(value: &Value) -> usize {
    match value {
        Value::Number(n) if *n >= 0.0 && n.is_finite() => *n as usize,
        _ => 0,
    }
}

fn describe_callee(callee: &Expr) -> String {
    match callee {
        Expr::Ident(name) => name.clone(),
        Expr::Member { object, property } => format!("{}.{property}", describe_callee(object)),
        Expr::Index { object, .. } => format!("{}[...]", describe_callee(object)),
        Expr::Call { callee, .. } => format!("{}(...)", describe_callee(callee)),
        _ => "expression".to_string(),
    }
}
