//! Evaluator for parsed scripts
//!
//! Evaluation is synchronous and non-suspending: every capability effect
//! goes through a single [`CapabilityHost`] request, and a step budget
//! halts runaway scripts.

use std::collections::HashMap;

use marionette_protocol::{HandleId, Value};

use crate::{
    parse, CapOp, CapabilityHost, Expr, HostError, HostRequest, HostResponse, ScriptConfig,
    ScriptError, Stmt,
};

/// Parse and evaluate one inbound script against `host`.
///
/// Returns the value of the last expression statement, if any. Parsing
/// completes before evaluation starts, so a script that fails to parse has
/// no side effects at all.
pub fn run_script(
    source: &str,
    config: &ScriptConfig,
    host: &mut dyn CapabilityHost,
) -> Result<Option<Value>, ScriptError> {
    if source.len() > config.max_source_len {
        return Err(ScriptError::SourceTooLarge {
            max: config.max_source_len,
        });
    }
    let stmts = parse(source, config)?;

    let mut interp = Interp {
        host,
        max_steps: config.max_steps,
        steps: 0,
        locals: HashMap::new(),
    };
    let mut last = None;
    for stmt in &stmts {
        last = interp.exec(stmt)?;
    }
    Ok(last)
}

struct Interp<'a> {
    host: &'a mut dyn CapabilityHost,
    max_steps: u64,
    steps: u64,
    locals: HashMap<String, Value>,
}

impl Interp<'_> {
    fn step(&mut self) -> Result<(), ScriptError> {
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(ScriptError::StepBudgetExceeded {
                max: self.max_steps,
            });
        }
        Ok(())
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<Option<Value>, ScriptError> {
        match stmt {
            Stmt::Let { name, init } => {
                let value = self.eval(init)?;
                self.locals.insert(name.clone(), value);
                Ok(None)
            }
            Stmt::Expr(expr) => Ok(Some(self.eval(expr)?)),
        }
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, ScriptError> {
        self.step()?;
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item)?);
                }
                Ok(Value::Array(out))
            }
            Expr::Object(entries) => {
                let mut out = std::collections::BTreeMap::new();
                for (key, value) in entries {
                    out.insert(key.clone(), self.eval(value)?);
                }
                Ok(Value::Object(out))
            }
            Expr::Var(name) => self
                .locals
                .get(name)
                .cloned()
                .ok_or_else(|| ScriptError::UnknownName(name.clone())),
            Expr::Neg(inner) => match self.eval(inner)? {
                Value::Int(n) => n
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| ScriptError::Type("integer negation overflow".into())),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(ScriptError::Type(format!(
                    "cannot negate a {}",
                    other.type_name()
                ))),
            },
            Expr::Member(target, name) => {
                let target = self.eval(target)?;
                self.access(target, &Value::Str(name.clone()))
            }
            Expr::Index(target, index) => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                self.access(target, &index)
            }
            Expr::ExtensionBag => match self.host.request(HostRequest::ExtensionBag) {
                HostResponse::Value(bag) => Ok(bag),
                other => Err(unexpected_response(other)),
            },
            Expr::CapCall { op, args } => self.cap_call(*op, args),
        }
    }

    /// Member/index access; out-of-range lookups produce the absent
    /// sentinel, mirroring handle lookups.
    fn access(&mut self, target: Value, index: &Value) -> Result<Value, ScriptError> {
        match (target, index) {
            (Value::Object(entries), Value::Str(key)) => Ok(entries
                .get(key)
                .cloned()
                .unwrap_or(Value::Undefined)),
            (Value::Array(items), Value::Int(i)) => Ok(usize::try_from(*i)
                .ok()
                .and_then(|i| items.get(i).cloned())
                .unwrap_or(Value::Undefined)),
            (target, index) => Err(ScriptError::Type(format!(
                "cannot index a {} with a {}",
                target.type_name(),
                index.type_name()
            ))),
        }
    }

    fn cap_call(&mut self, op: CapOp, args: &[Expr]) -> Result<Value, ScriptError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg)?);
        }

        let request = match op {
            CapOp::Allocate => HostRequest::Allocate(values.remove(0)),
            CapOp::Get => HostRequest::Get(self.id_arg(&values[0], op)?),
            CapOp::Set => {
                let id = self.id_arg(&values[0], op)?;
                HostRequest::Set(id, values.remove(1))
            }
            CapOp::Delete => HostRequest::Delete(self.id_arg(&values[0], op)?),
            CapOp::Report => {
                let id = self.id_arg(&values[0], op)?;
                HostRequest::Report(id, values.remove(1))
            }
            CapOp::ResolveCallback => {
                let id = self.id_arg(&values[0], op)?;
                HostRequest::ResolveCallback(id, values.remove(1))
            }
            CapOp::CheckAndMove => HostRequest::CheckAndMove(self.id_arg(&values[0], op)?),
            CapOp::MarkErrored => {
                let id = self.id_arg(&values[0], op)?;
                HostRequest::MarkErrored(id, values.remove(1))
            }
        };

        let response = self.host.request(request);

        // checkAndMove answers with a discriminated object so callers can
        // tell an absent value apart from a moved-error slot.
        if op == CapOp::CheckAndMove {
            return match response {
                HostResponse::Value(value) => Ok(Value::object([("value", value)])),
                HostResponse::Slot(id) => Ok(Value::object([("slot", Value::Int(id.0))])),
                HostResponse::Error(err) => Err(ScriptError::Host(err)),
                other => Err(unexpected_response(other)),
            };
        }

        match response {
            HostResponse::Id(id) => Ok(Value::Int(id.0)),
            HostResponse::Value(value) => Ok(value),
            HostResponse::Ok => Ok(Value::Undefined),
            HostResponse::Raise(payload) => Err(ScriptError::Propagated(payload)),
            HostResponse::Error(err) => Err(ScriptError::Host(err)),
            other @ HostResponse::Slot(_) => Err(unexpected_response(other)),
        }
    }

    fn id_arg(&self, value: &Value, op: CapOp) -> Result<HandleId, ScriptError> {
        match value {
            Value::Int(raw) => Ok(HandleId(*raw)),
            other => Err(ScriptError::Type(format!(
                "capability `{}` needs an integer id, got {}",
                op.alias(),
                other.type_name()
            ))),
        }
    }
}

fn unexpected_response(response: HostResponse) -> ScriptError {
    ScriptError::Host(HostError::Internal(format!(
        "unexpected host response {response:?}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted host double: records requests and replays canned responses.
    struct MockHost {
        requests: Vec<HostRequest>,
        responses: Vec<HostResponse>,
    }

    impl MockHost {
        fn new(responses: Vec<HostResponse>) -> Self {
            Self {
                requests: Vec::new(),
                responses,
            }
        }
    }

    impl CapabilityHost for MockHost {
        fn request(&mut self, request: HostRequest) -> HostResponse {
            self.requests.push(request);
            if self.responses.is_empty() {
                HostResponse::Ok
            } else {
                self.responses.remove(0)
            }
        }
    }

    fn run(source: &str, host: &mut MockHost) -> Result<Option<Value>, ScriptError> {
        run_script(source, &ScriptConfig::default(), host)
    }

    #[test]
    fn issues_requests_in_order() {
        let mut host = MockHost::new(vec![
            HostResponse::Id(HandleId(100)),
            HostResponse::Ok,
            HostResponse::Ok,
        ]);
        run("let h = _w.a(\"v\"); _w.s(2, [h]); _w.d(h);", &mut host).unwrap();
        assert_eq!(
            host.requests,
            vec![
                HostRequest::Allocate(Value::from("v")),
                HostRequest::Set(HandleId(2), Value::Array(vec![Value::Int(100)])),
                HostRequest::Delete(HandleId(100)),
            ]
        );
    }

    #[test]
    fn raise_becomes_a_propagated_error() {
        let mut host = MockHost::new(vec![HostResponse::Raise(Value::from("boom"))]);
        let err = run("_w.g(5);", &mut host).unwrap_err();
        assert_eq!(err, ScriptError::Propagated(Value::from("boom")));
    }

    #[test]
    fn check_and_move_maps_both_outcomes() {
        let mut host = MockHost::new(vec![HostResponse::Value(Value::Int(7))]);
        let result = run("_w.c(1);", &mut host).unwrap();
        assert_eq!(result, Some(Value::object([("value", Value::Int(7))])));

        let mut host = MockHost::new(vec![HostResponse::Slot(HandleId(41))]);
        let result = run("_w.c(1);", &mut host).unwrap();
        assert_eq!(
            result,
            Some(Value::object([("slot", Value::Int(41))]))
        );
        // The slot id is plain data; scripts can feed it back to `g`.
        let mut host = MockHost::new(vec![
            HostResponse::Slot(HandleId(41)),
            HostResponse::Value(Value::from("payload")),
        ]);
        let result = run("let m = _w.c(1); _w.g(m[\"slot\"]);", &mut host).unwrap();
        assert_eq!(result, Some(Value::from("payload")));
        assert_eq!(host.requests[1], HostRequest::Get(HandleId(41)));
    }

    #[test]
    fn extension_bag_is_readable() {
        let bag = Value::object([("version", Value::Int(3))]);
        let mut host = MockHost::new(vec![HostResponse::Value(bag)]);
        let result = run("_w.x.version;", &mut host).unwrap();
        assert_eq!(result, Some(Value::Int(3)));
        assert_eq!(host.requests, vec![HostRequest::ExtensionBag]);
    }

    #[test]
    fn absent_members_are_undefined() {
        let mut host = MockHost::new(vec![HostResponse::Value(Value::object::<&str, _>([]))]);
        let result = run("_w.x.missing;", &mut host).unwrap();
        assert_eq!(result, Some(Value::Undefined));
    }

    #[test]
    fn non_integer_ids_are_type_errors() {
        let mut host = MockHost::new(vec![]);
        let err = run("_w.g(\"nope\");", &mut host).unwrap_err();
        assert!(matches!(err, ScriptError::Type(_)));
        assert!(host.requests.is_empty());
    }

    #[test]
    fn unknown_names_do_not_resolve() {
        let mut host = MockHost::new(vec![]);
        let err = run("window;", &mut host).unwrap_err();
        assert_eq!(err, ScriptError::UnknownName("window".into()));
    }

    #[test]
    fn step_budget_halts_evaluation() {
        let mut config = ScriptConfig::default();
        config.max_steps = 10;
        let source = format!("[{}];", vec!["1"; 50].join(", "));
        let mut host = MockHost::new(vec![]);
        let err = run_script(&source, &config, &mut host).unwrap_err();
        assert_eq!(err, ScriptError::StepBudgetExceeded { max: 10 });
    }

    #[test]
    fn oversized_source_is_rejected_before_parsing() {
        let mut config = ScriptConfig::default();
        config.max_source_len = 8;
        let mut host = MockHost::new(vec![]);
        let err = run_script("_w.d(1); _w.d(2);", &config, &mut host).unwrap_err();
        assert_eq!(err, ScriptError::SourceTooLarge { max: 8 });
    }

    #[test]
    fn host_errors_surface_distinctly() {
        let mut host = MockHost::new(vec![HostResponse::Error(HostError::Serialize(
            "value contains a non-finite number".into(),
        ))]);
        let err = run("_w.r(1, 2);", &mut host).unwrap_err();
        assert!(matches!(err, ScriptError::Host(HostError::Serialize(_))));
    }
}
