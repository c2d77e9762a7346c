use crate::builtins::{self, Builtin};
use crate::inspect;
use crate::interpreter::{ConsoleSink, Exec, Interrupt, Realm};
use crate::parser::parse_program;
use crate::recoverable;
use crate::value::{HeapObject, Value};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use tern_types::{
    EvalError, EvalOptions, EvalOutcome, Evaluator, InspectOptions, ObjectId, PropertyDescriptor,
    RemoteValue, SyntaxCheck,
};
use tracing::debug;

/// In-process evaluator. All state sits behind one lock; every call runs to
/// completion while holding it.
pub struct ScriptEvaluator {
    realm: Mutex<Realm>,
}

fn stdout_console() -> ConsoleSink {
    Arc::new(|line: &str| {
        let mut out = std::io::stdout().lock();
        // the terminal may be in raw mode, so emit explicit carriage returns
        let _ = write!(out, "{}\r\n", line.replace('\n', "\r\n"));
        let _ = out.flush();
    })
}

impl Default for ScriptEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptEvaluator {
    pub fn new() -> Self {
        Self::with_console(stdout_console())
    }

    pub fn with_console(console: ConsoleSink) -> Self {
        ScriptEvaluator {
            realm: Mutex::new(Realm::new(console)),
        }
    }

    /// Names currently bound in the global scope, in definition order.
    pub fn global_names(&self) -> Vec<String> {
        self.realm.lock().globals.keys().cloned().collect()
    }

    /// Number of handles not yet released.
    pub fn live_handles(&self) -> usize {
        self.realm.lock().live_handles()
    }

    pub(crate) fn builtin_of(&self, id: ObjectId) -> Option<Builtin> {
        let realm = self.realm.lock();
        let Some(Value::Object(obj)) = realm.handle(id.0) else {
            return None;
        };
        match realm.heap.get(*obj) {
            HeapObject::Function(f) => Some(f.builtin),
            _ => None,
        }
    }

    fn remote(realm: &mut Realm, value: Value, group: Option<&str>) -> RemoteValue {
        let kind = inspect::kind_of(&realm.heap, &value);
        let description = inspect::describe(&realm.heap, &value);
        let id = realm.register(value, group);
        RemoteValue {
            id: ObjectId(id),
            kind,
            description,
        }
    }

    fn outcome(
        realm: &mut Realm,
        result: Result<Value, Interrupt>,
        group: Option<&str>,
    ) -> Result<EvalOutcome, EvalError> {
        match result {
            Ok(value) => Ok(EvalOutcome::Value(Self::remote(realm, value, group))),
            Err(Interrupt::Throw(thrown)) => {
                Ok(EvalOutcome::Exception(Self::remote(realm, thrown, group)))
            }
            Err(Interrupt::Timeout(budget)) => {
                debug!("evaluation exceeded {:?}", budget);
                Err(EvalError::Timeout(budget))
            }
        }
    }

    fn lookup(realm: &Realm, id: ObjectId) -> Result<Value, EvalError> {
        realm
            .handle(id.0)
            .cloned()
            .ok_or(EvalError::UnknownObject(id))
    }
}

#[async_trait]
impl Evaluator for ScriptEvaluator {
    async fn evaluate(
        &self,
        expression: &str,
        options: EvalOptions,
    ) -> Result<EvalOutcome, EvalError> {
        let mut realm = self.realm.lock();
        let group = options.object_group.as_deref();
        let program = match parse_program(expression) {
            Ok(program) => program,
            Err(err) => {
                debug!("syntax error: {}", err);
                let thrown = realm.heap.error("SyntaxError", err.message());
                return Ok(EvalOutcome::Exception(Self::remote(
                    &mut realm, thrown, group,
                )));
            }
        };
        let result = Exec::new(&mut realm, options.side_effect_free, options.timeout).run(&program);
        Self::outcome(&mut realm, result, group)
    }

    async fn get_properties(&self, object: ObjectId) -> Result<Vec<PropertyDescriptor>, EvalError> {
        let realm = self.realm.lock();
        let value = Self::lookup(&realm, object)?;
        Ok(builtins::property_names(&realm.heap, &value)
            .into_iter()
            .map(|(name, is_own)| PropertyDescriptor { name, is_own })
            .collect())
    }

    async fn call_function(
        &self,
        function: ObjectId,
        args: &[ObjectId],
        group: Option<&str>,
    ) -> Result<EvalOutcome, EvalError> {
        let mut realm = self.realm.lock();
        let callee = Self::lookup(&realm, function)?;
        let args = args
            .iter()
            .map(|id| Self::lookup(&realm, *id))
            .collect::<Result<Vec<_>, _>>()?;
        let result = Exec::new(&mut realm, false, None).call(&callee, &args, || {
            format!("object {function}")
        });
        Self::outcome(&mut realm, result, group)
    }

    async fn inspect(
        &self,
        object: ObjectId,
        options: InspectOptions,
    ) -> Result<String, EvalError> {
        let realm = self.realm.lock();
        let value = Self::lookup(&realm, object)?;
        Ok(inspect::inspect_value(&realm.heap, &value, options))
    }

    async fn set_binding(&self, name: &str, object: ObjectId) -> Result<(), EvalError> {
        let mut realm = self.realm.lock();
        let value = Self::lookup(&realm, object)?;
        realm.define_global(name, value);
        Ok(())
    }

    async fn release_object_group(&self, group: &str) {
        self.realm.lock().release_group(group);
    }

    fn check_syntax(&self, source: &str) -> SyntaxCheck {
        recoverable::check(source)
    }
}
