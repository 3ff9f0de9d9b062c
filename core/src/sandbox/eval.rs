//! Tree-walking evaluator for the sandbox dialect

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{json, Value as Json};

use super::builtins;
use super::parser::{parse, BinOp, Expr, Stmt, UnOp};
use super::SandboxError;

/// Runtime values. Callables are always builtins; the dialect has no
/// user-defined functions. Maps keep insertion order and only accept
/// string keys.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    List(Vec<Value>),
    Map(Vec<(String, Value)>),
    None,
    Builtin(&'static str),
}

impl Value {
    pub(super) fn is_callable(&self) -> bool {
        matches!(self, Value::Builtin(_))
    }

    pub(super) fn truthy(&self) -> bool {
        match self {
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(entries) => !entries.is_empty(),
            Value::None => false,
            Value::Builtin(_) => true,
        }
    }

    pub(super) fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Map(_) => "dict",
            Value::None => "none",
            Value::Builtin(_) => "builtin",
        }
    }

    /// Textual form used by `print` and `str`
    pub(super) fn display(&self) -> String {
        match self {
            Value::Int(n) => n.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Str(s) => s.clone(),
            Value::List(_) | Value::Map(_) => self.repr(),
            Value::None => "none".to_string(),
            Value::Builtin(name) => format!("<builtin {name}>"),
        }
    }

    /// Like `display`, but strings keep their quotes (list elements)
    fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("\"{s}\""),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.repr()).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Map(entries) => {
                let parts: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("\"{k}\": {}", v.repr()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            other => other.display(),
        }
    }

    /// JSON rendering for the reported bindings; non-finite floats
    /// degrade to their textual form.
    pub(super) fn to_json(&self) -> Json {
        match self {
            Value::Int(n) => json!(n),
            Value::Float(f) => match serde_json::Number::from_f64(*f) {
                Some(n) => Json::Number(n),
                None => Json::String(f.to_string()),
            },
            Value::Bool(b) => json!(b),
            Value::Str(s) => json!(s),
            Value::List(items) => Json::Array(items.iter().map(|v| v.to_json()).collect()),
            Value::Map(entries) => Json::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::None => Json::Null,
            Value::Builtin(name) => Json::String(format!("<builtin {name}>")),
        }
    }
}

/// Loop control signal propagated out of a block until the enclosing
/// loop consumes it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Normal,
    Break,
    Continue,
}

/// Parse and execute, returning whatever was printed together with the
/// final bindings (or the first error).
pub(super) fn run(
    source: &str,
    cancel: Arc<AtomicBool>,
) -> (String, Result<BTreeMap<String, Value>, SandboxError>) {
    let stmts = match parse(source) {
        Ok(stmts) => stmts,
        Err(e) => return (String::new(), Err(e)),
    };
    let mut ctx = Context {
        vars: BTreeMap::new(),
        output: String::new(),
        cancel,
    };
    let result = ctx.exec_block(&stmts).and_then(|flow| match flow {
        Flow::Normal => Ok(()),
        Flow::Break => Err(SandboxError::Runtime("'break' outside loop".to_string())),
        Flow::Continue => Err(SandboxError::Runtime(
            "'continue' outside loop".to_string(),
        )),
    });
    let Context { vars, output, .. } = ctx;
    (output, result.map(|()| vars))
}

struct Context {
    vars: BTreeMap<String, Value>,
    output: String,
    cancel: Arc<AtomicBool>,
}

impl Context {
    fn check_cancel(&self) -> Result<(), SandboxError> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(SandboxError::Runtime("execution cancelled".to_string()));
        }
        Ok(())
    }

    fn exec_block(&mut self, stmts: &[Stmt]) -> Result<Flow, SandboxError> {
        for stmt in stmts {
            self.check_cancel()?;
            let flow = self.exec(stmt)?;
            if flow != Flow::Normal {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<Flow, SandboxError> {
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr)?;
            }
            Stmt::Assign { name, value } => {
                let value = self.eval(value)?;
                self.vars.insert(name.clone(), value);
            }
            Stmt::If { cond, then, otherwise } => {
                let flow = if self.eval(cond)?.truthy() {
                    self.exec_block(then)?
                } else {
                    self.exec_block(otherwise)?
                };
                // Loop control passes through conditionals untouched.
                return Ok(flow);
            }
            Stmt::While { cond, body } => {
                while self.eval(cond)?.truthy() {
                    self.check_cancel()?;
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            Stmt::For { var, iter, body } => {
                let items = match self.eval(iter)? {
                    Value::List(items) => items,
                    Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
                    Value::Map(entries) => {
                        entries.into_iter().map(|(k, _)| Value::Str(k)).collect()
                    }
                    other => {
                        return Err(SandboxError::Runtime(format!(
                            "cannot iterate over {}",
                            other.type_name()
                        )));
                    }
                };
                for item in items {
                    self.check_cancel()?;
                    self.vars.insert(var.clone(), item);
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            Stmt::Break => return Ok(Flow::Break),
            Stmt::Continue => return Ok(Flow::Continue),
        }
        Ok(Flow::Normal)
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, SandboxError> {
        match expr {
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::Float(f) => Ok(Value::Float(*f)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::None => Ok(Value::None),
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?);
                }
                Ok(Value::List(values))
            }
            Expr::Map(entries) => {
                let mut map = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = match self.eval(key)? {
                        Value::Str(s) => s,
                        other => {
                            return Err(SandboxError::Runtime(format!(
                                "dict keys must be strings, not {}",
                                other.type_name()
                            )));
                        }
                    };
                    let value = self.eval(value)?;
                    map_insert(&mut map, key, value);
                }
                Ok(Value::Map(map))
            }
            Expr::Var(name) => match self.vars.get(name) {
                Some(value) => Ok(value.clone()),
                None => match builtins::lookup(name) {
                    Some(builtin) => Ok(Value::Builtin(builtin)),
                    None => Err(SandboxError::Runtime(format!(
                        "name '{name}' is not defined"
                    ))),
                },
            },
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                match op {
                    UnOp::Neg => match value {
                        Value::Int(n) => Ok(Value::Int(-n)),
                        Value::Float(f) => Ok(Value::Float(-f)),
                        other => Err(SandboxError::Runtime(format!(
                            "cannot negate {}",
                            other.type_name()
                        ))),
                    },
                    UnOp::Not => Ok(Value::Bool(!value.truthy())),
                }
            }
            Expr::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs),
            Expr::Call { callee, args } => {
                let callee = self.eval(callee)?;
                let Value::Builtin(name) = callee else {
                    return Err(SandboxError::Runtime(format!(
                        "{} is not callable",
                        callee.type_name()
                    )));
                };
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                builtins::call(name, values, &mut self.output)
            }
            Expr::Index { target, index } => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                match (target, index) {
                    (Value::List(items), Value::Int(n)) => pick(&items, n)
                        .cloned()
                        .ok_or_else(|| SandboxError::Runtime("list index out of range".to_string())),
                    (Value::Str(s), Value::Int(n)) => {
                        let chars: Vec<char> = s.chars().collect();
                        pick(&chars, n)
                            .map(|c| Value::Str(c.to_string()))
                            .ok_or_else(|| {
                                SandboxError::Runtime("string index out of range".to_string())
                            })
                    }
                    (Value::Map(entries), Value::Str(key)) => entries
                        .iter()
                        .find(|(k, _)| *k == key)
                        .map(|(_, v)| v.clone())
                        .ok_or_else(|| SandboxError::Runtime(format!("key \"{key}\" not found"))),
                    (target, index) => Err(SandboxError::Runtime(format!(
                        "cannot index {} with {}",
                        target.type_name(),
                        index.type_name()
                    ))),
                }
            }
        }
    }

    fn eval_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> Result<Value, SandboxError> {
        // Logical operators short-circuit and yield the deciding
        // operand, so `x or fallback` works as an expression.
        if op == BinOp::And {
            let lhs = self.eval(lhs)?;
            return if lhs.truthy() { self.eval(rhs) } else { Ok(lhs) };
        }
        if op == BinOp::Or {
            let lhs = self.eval(lhs)?;
            return if lhs.truthy() { Ok(lhs) } else { self.eval(rhs) };
        }

        let lhs = self.eval(lhs)?;
        let rhs = self.eval(rhs)?;
        match op {
            BinOp::Add => add(lhs, rhs),
            BinOp::Sub => arith(lhs, rhs, "-", |a, b| a - b, |a, b| a - b),
            BinOp::Mul => arith(lhs, rhs, "*", |a, b| a * b, |a, b| a * b),
            BinOp::Div => divide(lhs, rhs),
            BinOp::Mod => modulo(lhs, rhs),
            BinOp::Eq => Ok(Value::Bool(lhs == rhs)),
            BinOp::Ne => Ok(Value::Bool(lhs != rhs)),
            BinOp::Lt => ordered(lhs, rhs, |o| o == std::cmp::Ordering::Less),
            BinOp::Le => ordered(lhs, rhs, |o| o != std::cmp::Ordering::Greater),
            BinOp::Gt => ordered(lhs, rhs, |o| o == std::cmp::Ordering::Greater),
            BinOp::Ge => ordered(lhs, rhs, |o| o != std::cmp::Ordering::Less),
            BinOp::And | BinOp::Or => unreachable!("handled above"),
        }
    }
}

/// Insert preserving first-seen key order; a repeated key overwrites in
/// place.
pub(super) fn map_insert(entries: &mut Vec<(String, Value)>, key: String, value: Value) {
    match entries.iter_mut().find(|(k, _)| *k == key) {
        Some(slot) => slot.1 = value,
        None => entries.push((key, value)),
    }
}

fn pick<T>(items: &[T], index: i64) -> Option<&T> {
    let len = items.len() as i64;
    let idx = if index < 0 { index + len } else { index };
    if (0..len).contains(&idx) {
        items.get(idx as usize)
    } else {
        None
    }
}

fn add(lhs: Value, rhs: Value) -> Result<Value, SandboxError> {
    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
        (Value::List(mut a), Value::List(b)) => {
            a.extend(b);
            Ok(Value::List(a))
        }
        (lhs, rhs) => arith(lhs, rhs, "+", |a, b| a + b, |a, b| a + b),
    }
}

fn arith(
    lhs: Value,
    rhs: Value,
    op: &str,
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, SandboxError> {
    match (&lhs, &rhs) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(int_op(*a, *b))),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(float_op(*a as f64, *b))),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(float_op(*a, *b as f64))),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(float_op(*a, *b))),
        _ => Err(SandboxError::Runtime(format!(
            "unsupported operands for '{op}': {} and {}",
            lhs.type_name(),
            rhs.type_name()
        ))),
    }
}

/// Division always yields a float, like the source dialect
fn divide(lhs: Value, rhs: Value) -> Result<Value, SandboxError> {
    let (a, b) = as_floats(&lhs, &rhs, "/")?;
    if b == 0.0 {
        return Err(SandboxError::Runtime("division by zero".to_string()));
    }
    Ok(Value::Float(a / b))
}

fn modulo(lhs: Value, rhs: Value) -> Result<Value, SandboxError> {
    match (&lhs, &rhs) {
        (Value::Int(_), Value::Int(0)) => {
            Err(SandboxError::Runtime("division by zero".to_string()))
        }
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.rem_euclid(*b))),
        _ => {
            let (a, b) = as_floats(&lhs, &rhs, "%")?;
            if b == 0.0 {
                return Err(SandboxError::Runtime("division by zero".to_string()));
            }
            Ok(Value::Float(a.rem_euclid(b)))
        }
    }
}

fn as_floats(lhs: &Value, rhs: &Value, op: &str) -> Result<(f64, f64), SandboxError> {
    let coerce = |v: &Value| match v {
        Value::Int(n) => Some(*n as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    };
    match (coerce(lhs), coerce(rhs)) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(SandboxError::Runtime(format!(
            "unsupported operands for '{op}': {} and {}",
            lhs.type_name(),
            rhs.type_name()
        ))),
    }
}

fn ordered(
    lhs: Value,
    rhs: Value,
    accept: fn(std::cmp::Ordering) -> bool,
) -> Result<Value, SandboxError> {
    compare(&lhs, &rhs).map(|o| Value::Bool(accept(o)))
}

/// Ordering for numbers and for string pairs; everything else is
/// unorderable.
pub(super) fn compare(lhs: &Value, rhs: &Value) -> Result<std::cmp::Ordering, SandboxError> {
    let numeric = |v: &Value| match v {
        Value::Int(n) => Some(*n as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    };
    if let (Some(a), Some(b)) = (numeric(lhs), numeric(rhs)) {
        return a.partial_cmp(&b).ok_or_else(|| {
            SandboxError::Runtime("cannot order NaN".to_string())
        });
    }
    if let (Value::Str(a), Value::Str(b)) = (lhs, rhs) {
        return Ok(a.cmp(b));
    }
    Err(SandboxError::Runtime(format!(
        "cannot order {} and {}",
        lhs.type_name(),
        rhs.type_name()
    )))
}
