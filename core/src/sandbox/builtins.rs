//! Curated builtin set exposed to sandboxed code
//!
//! This is an allow-list: anything not named here is an undefined name.
//! None of these touch the host environment; `print` appends to the
//! per-execution output buffer.

use super::eval::{compare, map_insert, Value};
use super::SandboxError;

/// Largest list `range` may materialize
const MAX_RANGE_LEN: i64 = 1_000_000;

const NAMES: &[&str] = &[
    "print", "len", "str", "int", "float", "bool", "list", "dict", "range", "abs", "min", "max",
    "sum", "round", "sorted", "enumerate", "zip",
];

pub(super) fn lookup(name: &str) -> Option<&'static str> {
    NAMES.iter().copied().find(|n| *n == name)
}

pub(super) fn call(
    name: &'static str,
    args: Vec<Value>,
    output: &mut String,
) -> Result<Value, SandboxError> {
    match name {
        "print" => {
            let parts: Vec<String> = args.iter().map(|v| v.display()).collect();
            output.push_str(&parts.join(" "));
            output.push('\n');
            Ok(Value::None)
        }
        "len" => match one(name, args)? {
            Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
            Value::List(items) => Ok(Value::Int(items.len() as i64)),
            Value::Map(entries) => Ok(Value::Int(entries.len() as i64)),
            other => Err(type_error(name, &other)),
        },
        "str" => Ok(Value::Str(one(name, args)?.display())),
        "int" => match one(name, args)? {
            Value::Int(n) => Ok(Value::Int(n)),
            Value::Float(f) => Ok(Value::Int(f.trunc() as i64)),
            Value::Bool(b) => Ok(Value::Int(b as i64)),
            Value::Str(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| SandboxError::Runtime(format!("invalid int literal: \"{s}\""))),
            other => Err(type_error(name, &other)),
        },
        "float" => match one(name, args)? {
            Value::Int(n) => Ok(Value::Float(n as f64)),
            Value::Float(f) => Ok(Value::Float(f)),
            Value::Bool(b) => Ok(Value::Float(b as i64 as f64)),
            Value::Str(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| SandboxError::Runtime(format!("invalid float literal: \"{s}\""))),
            other => Err(type_error(name, &other)),
        },
        "bool" => Ok(Value::Bool(one(name, args)?.truthy())),
        "list" => match one(name, args)? {
            Value::List(items) => Ok(Value::List(items)),
            Value::Str(s) => Ok(Value::List(
                s.chars().map(|c| Value::Str(c.to_string())).collect(),
            )),
            Value::Map(entries) => Ok(Value::List(
                entries.into_iter().map(|(k, _)| Value::Str(k)).collect(),
            )),
            other => Err(type_error(name, &other)),
        },
        "dict" => dict(args),
        "range" => range(args),
        "abs" => match one(name, args)? {
            Value::Int(n) => Ok(Value::Int(n.abs())),
            Value::Float(f) => Ok(Value::Float(f.abs())),
            other => Err(type_error(name, &other)),
        },
        "min" => extremum(name, args, std::cmp::Ordering::Less),
        "max" => extremum(name, args, std::cmp::Ordering::Greater),
        "sum" => {
            let items = list_arg(name, args)?;
            let mut int_total: i64 = 0;
            let mut float_total: f64 = 0.0;
            let mut saw_float = false;
            for item in &items {
                match item {
                    Value::Int(n) => {
                        int_total += n;
                        float_total += *n as f64;
                    }
                    Value::Float(f) => {
                        saw_float = true;
                        float_total += f;
                    }
                    other => return Err(type_error(name, other)),
                }
            }
            if saw_float {
                Ok(Value::Float(float_total))
            } else {
                Ok(Value::Int(int_total))
            }
        }
        "round" => match args.len() {
            1 => match &args[0] {
                Value::Int(n) => Ok(Value::Int(*n)),
                Value::Float(f) => Ok(Value::Int(f.round() as i64)),
                other => Err(type_error(name, other)),
            },
            2 => match (&args[0], &args[1]) {
                (Value::Float(f), Value::Int(digits)) => {
                    let factor = 10f64.powi(*digits as i32);
                    Ok(Value::Float((f * factor).round() / factor))
                }
                (Value::Int(n), Value::Int(_)) => Ok(Value::Int(*n)),
                _ => Err(SandboxError::Runtime(
                    "round() expects a number and an int".to_string(),
                )),
            },
            n => Err(arity_error(name, "1 or 2", n)),
        },
        "sorted" => {
            let mut items = list_arg(name, args)?;
            let mut failed = None;
            items.sort_by(|a, b| match compare(a, b) {
                Ok(ordering) => ordering,
                Err(e) => {
                    failed.get_or_insert(e);
                    std::cmp::Ordering::Equal
                }
            });
            match failed {
                Some(e) => Err(e),
                None => Ok(Value::List(items)),
            }
        }
        "enumerate" => {
            let items = list_arg(name, args)?;
            Ok(Value::List(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| Value::List(vec![Value::Int(i as i64), v]))
                    .collect(),
            ))
        }
        "zip" => {
            let mut lists = Vec::with_capacity(args.len());
            for arg in args {
                match arg {
                    Value::List(items) => lists.push(items),
                    other => return Err(type_error(name, &other)),
                }
            }
            if lists.is_empty() {
                return Ok(Value::List(Vec::new()));
            }
            let shortest = lists.iter().map(|l| l.len()).min().unwrap_or(0);
            let mut rows = Vec::with_capacity(shortest);
            for i in 0..shortest {
                rows.push(Value::List(
                    lists.iter().map(|l| l[i].clone()).collect(),
                ));
            }
            Ok(Value::List(rows))
        }
        _ => Err(SandboxError::Runtime(format!(
            "name '{name}' is not defined"
        ))),
    }
}

/// `dict()`, `dict(existing)` or `dict(list of [key, value] pairs)`
fn dict(args: Vec<Value>) -> Result<Value, SandboxError> {
    match args.len() {
        0 => Ok(Value::Map(Vec::new())),
        1 => match args.into_iter().next() {
            Some(Value::Map(entries)) => Ok(Value::Map(entries)),
            Some(Value::List(pairs)) => {
                let mut entries = Vec::with_capacity(pairs.len());
                for pair in pairs {
                    let Value::List(pair) = pair else {
                        return Err(SandboxError::Runtime(
                            "dict() expects a list of [key, value] pairs".to_string(),
                        ));
                    };
                    let mut pair = pair.into_iter();
                    match (pair.next(), pair.next(), pair.next()) {
                        (Some(Value::Str(key)), Some(value), None) => {
                            map_insert(&mut entries, key, value);
                        }
                        _ => {
                            return Err(SandboxError::Runtime(
                                "dict() expects a list of [key, value] pairs with string keys"
                                    .to_string(),
                            ));
                        }
                    }
                }
                Ok(Value::Map(entries))
            }
            Some(other) => Err(type_error("dict", &other)),
            None => unreachable!("length checked"),
        },
        n => Err(arity_error("dict", "0 or 1", n)),
    }
}

fn range(args: Vec<Value>) -> Result<Value, SandboxError> {
    let as_int = |v: &Value| match v {
        Value::Int(n) => Ok(*n),
        other => Err(type_error("range", other)),
    };
    let (start, stop, step) = match args.len() {
        1 => (0, as_int(&args[0])?, 1),
        2 => (as_int(&args[0])?, as_int(&args[1])?, 1),
        3 => (as_int(&args[0])?, as_int(&args[1])?, as_int(&args[2])?),
        n => return Err(arity_error("range", "1 to 3", n)),
    };
    if step == 0 {
        return Err(SandboxError::Runtime(
            "range() step must not be zero".to_string(),
        ));
    }
    // Widen before the length check so extreme bounds cannot overflow.
    let span = if step > 0 {
        stop as i128 - start as i128
    } else {
        start as i128 - stop as i128
    };
    if span > MAX_RANGE_LEN as i128 * (step as i128).abs() {
        return Err(SandboxError::Runtime("range() result too large".to_string()));
    }
    let mut items = Vec::new();
    let mut current = start;
    while (step > 0 && current < stop) || (step < 0 && current > stop) {
        items.push(Value::Int(current));
        current += step;
    }
    Ok(Value::List(items))
}

/// `min`/`max` over either one list argument or the arguments
/// themselves.
fn extremum(
    name: &'static str,
    args: Vec<Value>,
    wanted: std::cmp::Ordering,
) -> Result<Value, SandboxError> {
    let items = match args.len() {
        0 => return Err(arity_error(name, "at least 1", 0)),
        1 => match args.into_iter().next() {
            Some(Value::List(items)) => items,
            Some(single) => return Ok(single),
            None => unreachable!("length checked"),
        },
        _ => args,
    };
    let mut iter = items.into_iter();
    let mut best = iter
        .next()
        .ok_or_else(|| SandboxError::Runtime(format!("{name}() of an empty list")))?;
    for item in iter {
        if compare(&item, &best)? == wanted {
            best = item;
        }
    }
    Ok(best)
}

fn one(name: &'static str, args: Vec<Value>) -> Result<Value, SandboxError> {
    let count = args.len();
    args.into_iter()
        .next()
        .filter(|_| count == 1)
        .ok_or_else(|| arity_error(name, "1", count))
}

fn list_arg(name: &'static str, args: Vec<Value>) -> Result<Vec<Value>, SandboxError> {
    match one(name, args)? {
        Value::List(items) => Ok(items),
        other => Err(type_error(name, &other)),
    }
}

fn type_error(name: &str, value: &Value) -> SandboxError {
    SandboxError::Runtime(format!(
        "{name}() does not accept {}",
        value.type_name()
    ))
}

fn arity_error(name: &str, expected: &str, got: usize) -> SandboxError {
    SandboxError::Runtime(format!(
        "{name}() expects {expected} argument(s), got {got}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_ok(name: &'static str, args: Vec<Value>) -> Value {
        let mut output = String::new();
        call(name, args, &mut output).unwrap()
    }

    #[test]
    fn test_print_appends_to_buffer() {
        let mut output = String::new();
        call("print", vec![Value::Int(1), Value::Str("a".to_string())], &mut output).unwrap();
        call("print", vec![], &mut output).unwrap();
        assert_eq!(output, "1 a\n\n");
    }

    #[test]
    fn test_len_counts_chars() {
        assert_eq!(
            call_ok("len", vec![Value::Str("héllo".to_string())]),
            Value::Int(5)
        );
    }

    #[test]
    fn test_range_variants() {
        assert_eq!(
            call_ok("range", vec![Value::Int(3)]),
            Value::List(vec![Value::Int(0), Value::Int(1), Value::Int(2)])
        );
        assert_eq!(
            call_ok("range", vec![Value::Int(5), Value::Int(1), Value::Int(-2)]),
            Value::List(vec![Value::Int(5), Value::Int(3)])
        );
    }

    #[test]
    fn test_range_guards() {
        let mut output = String::new();
        assert!(call("range", vec![Value::Int(1), Value::Int(2), Value::Int(0)], &mut output).is_err());
        assert!(call("range", vec![Value::Int(i64::MAX)], &mut output).is_err());
    }

    #[test]
    fn test_sum_promotes_to_float() {
        let ints = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(call_ok("sum", vec![ints]), Value::Int(3));
        let mixed = Value::List(vec![Value::Int(1), Value::Float(0.5)]);
        assert_eq!(call_ok("sum", vec![mixed]), Value::Float(1.5));
    }

    #[test]
    fn test_sorted_rejects_mixed_types() {
        let mut output = String::new();
        let mixed = Value::List(vec![Value::Int(1), Value::Str("a".to_string())]);
        assert!(call("sorted", vec![mixed], &mut output).is_err());
    }

    #[test]
    fn test_min_max_over_varargs_and_list() {
        assert_eq!(
            call_ok("max", vec![Value::Int(1), Value::Int(9), Value::Int(4)]),
            Value::Int(9)
        );
        let list = Value::List(vec![Value::Int(3), Value::Int(2)]);
        assert_eq!(call_ok("min", vec![list]), Value::Int(2));
    }

    #[test]
    fn test_zip_truncates_to_shortest() {
        let a = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let b = Value::List(vec![Value::Str("x".to_string())]);
        assert_eq!(
            call_ok("zip", vec![a, b]),
            Value::List(vec![Value::List(vec![
                Value::Int(1),
                Value::Str("x".to_string())
            ])])
        );
    }

    #[test]
    fn test_dict_from_pairs() {
        let pairs = Value::List(vec![
            Value::List(vec![Value::Str("a".to_string()), Value::Int(1)]),
            Value::List(vec![Value::Str("b".to_string()), Value::Int(2)]),
        ]);
        assert_eq!(
            call_ok("dict", vec![pairs]),
            Value::Map(vec![
                ("a".to_string(), Value::Int(1)),
                ("b".to_string(), Value::Int(2)),
            ])
        );
        assert_eq!(call_ok("dict", vec![]), Value::Map(Vec::new()));
    }

    #[test]
    fn test_dict_rejects_malformed_pairs() {
        let mut output = String::new();
        let bad = Value::List(vec![Value::Int(1)]);
        assert!(call("dict", vec![bad], &mut output).is_err());
        let int_key = Value::List(vec![Value::List(vec![Value::Int(1), Value::Int(2)])]);
        assert!(call("dict", vec![int_key], &mut output).is_err());
    }

    #[test]
    fn test_len_and_list_over_dict() {
        let map = Value::Map(vec![
            ("x".to_string(), Value::Int(1)),
            ("y".to_string(), Value::Int(2)),
        ]);
        assert_eq!(call_ok("len", vec![map.clone()]), Value::Int(2));
        assert_eq!(
            call_ok("list", vec![map]),
            Value::List(vec![
                Value::Str("x".to_string()),
                Value::Str("y".to_string()),
            ])
        );
    }

    #[test]
    fn test_unknown_name_not_in_allow_list() {
        assert!(lookup("open").is_none());
        assert!(lookup("eval").is_none());
        assert!(lookup("print").is_some());
    }
}
