/// Argument binding between JSON Values and script values
///
/// Two policies:
/// - Declared: every argument is coerced to the declared parameter type.
/// - Runtime: the callable is resolved from the runtime types of the supplied
///   values; a declared type only matches its runtime counterpart.
///
/// Outputs travel back through `dynamic_to_value`, which refuses anything that
/// has no JSON representation.

use crate::config::ArgumentBinding;
use crate::error::ExecutionFault;
use crate::synthesizer::{Param, ParamType, UnitDefinition};
use grader_common::value::{Map, Number, RuntimeType, Value};
use rhai::{Array, Dynamic};

/// Bind an argument tuple to the unit's parameters
pub fn bind_arguments(
    unit: &UnitDefinition,
    name: &str,
    args: &[Value],
    binding: ArgumentBinding,
) -> Result<Vec<Dynamic>, ExecutionFault> {
    if name != unit.entry {
        return Err(ExecutionFault::Invocation(format!(
            "No function named '{}' in unit (defines '{}')",
            name, unit.entry
        )));
    }

    match binding {
        ArgumentBinding::Declared => bind_declared(unit, args),
        ArgumentBinding::Runtime => bind_runtime(unit, args),
    }
}

fn bind_declared(unit: &UnitDefinition, args: &[Value]) -> Result<Vec<Dynamic>, ExecutionFault> {
    if args.len() != unit.params.len() {
        return Err(ExecutionFault::Invocation(format!(
            "{} expects {} argument(s), got {}",
            unit.signature(),
            unit.params.len(),
            args.len()
        )));
    }

    unit.params
        .iter()
        .zip(args)
        .enumerate()
        .map(|(idx, (param, arg))| {
            let bound = match &param.ty {
                Some(ty) => coerce(arg, ty),
                None => Ok(value_to_dynamic(arg)),
            };
            bound.map_err(|reason| {
                ExecutionFault::Invocation(format!(
                    "Argument {} ('{}'): {}",
                    idx + 1,
                    param.name,
                    reason
                ))
            })
        })
        .collect()
}

fn bind_runtime(unit: &UnitDefinition, args: &[Value]) -> Result<Vec<Dynamic>, ExecutionFault> {
    let runtime_types: Vec<RuntimeType> = args.iter().map(RuntimeType::of).collect();

    if let Some(idx) = runtime_types.iter().position(|t| *t == RuntimeType::Null) {
        return Err(ExecutionFault::Invocation(format!(
            "Cannot resolve the type of argument {}: value is null",
            idx + 1
        )));
    }

    let matches = args.len() == unit.params.len()
        && unit
            .params
            .iter()
            .zip(&runtime_types)
            .all(|(param, runtime)| param_accepts(param, *runtime));

    if !matches {
        let found: Vec<String> = runtime_types.iter().map(|t| t.to_string()).collect();
        return Err(ExecutionFault::Invocation(format!(
            "No function matching {}({}); unit declares {}",
            unit.entry,
            found.join(", "),
            unit.signature()
        )));
    }

    Ok(args.iter().map(value_to_dynamic).collect())
}

/// Whether a declared parameter resolves against a runtime-typed argument
fn param_accepts(param: &Param, runtime: RuntimeType) -> bool {
    let Some(ty) = &param.ty else {
        return true;
    };
    match ty {
        ParamType::Any => true,
        ParamType::Int => runtime == RuntimeType::Integer,
        ParamType::Long => runtime == RuntimeType::Long,
        ParamType::Double => runtime == RuntimeType::Double,
        ParamType::Boolean => runtime == RuntimeType::Boolean,
        ParamType::String => runtime == RuntimeType::String,
        ParamType::List(_) => runtime == RuntimeType::List,
        ParamType::Map(_) => runtime == RuntimeType::Map,
        // No decoded value ever carries these types
        ParamType::Float | ParamType::Char | ParamType::Array(_) | ParamType::Unknown(_) => false,
    }
}

/// Coerce a Value into the declared type
pub fn coerce(value: &Value, ty: &ParamType) -> Result<Dynamic, String> {
    match (ty, value) {
        (ParamType::Any, _) => Ok(value_to_dynamic(value)),
        (ParamType::String | ParamType::Array(_) | ParamType::List(_) | ParamType::Map(_), Value::Null) => {
            Ok(Dynamic::UNIT)
        }
        (ParamType::Int, Value::Number(n)) => {
            let i = integral(n).ok_or_else(|| format!("expected int, got {}", n))?;
            i32::try_from(i)
                .map(|i| Dynamic::from_int(i64::from(i)))
                .map_err(|_| format!("{} is out of range for int", i))
        }
        (ParamType::Long, Value::Number(n)) => integral(n)
            .map(Dynamic::from_int)
            .ok_or_else(|| format!("expected long, got {}", n)),
        (ParamType::Float | ParamType::Double, Value::Number(n)) => n
            .as_f64()
            .map(Dynamic::from_float)
            .ok_or_else(|| format!("expected {}, got {}", ty, n)),
        (ParamType::Boolean, Value::Bool(b)) => Ok(Dynamic::from_bool(*b)),
        (ParamType::String, Value::String(s)) => Ok(Dynamic::from(s.clone())),
        (ParamType::Char, Value::String(s)) => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Dynamic::from_char(c)),
                _ => Err(format!("expected char, got string of length {}", s.chars().count())),
            }
        }
        (ParamType::Array(inner) | ParamType::List(inner), Value::Array(items)) => {
            let array = items
                .iter()
                .enumerate()
                .map(|(idx, item)| coerce(item, inner).map_err(|e| format!("element {}: {}", idx, e)))
                .collect::<Result<Array, String>>()?;
            Ok(Dynamic::from_array(array))
        }
        (ParamType::Map(inner), Value::Object(entries)) => {
            let mut map = rhai::Map::new();
            for (key, item) in entries {
                let bound = coerce(item, inner).map_err(|e| format!("key '{}': {}", key, e))?;
                map.insert(key.as_str().into(), bound);
            }
            Ok(Dynamic::from_map(map))
        }
        (ParamType::Unknown(name), _) => Err(format!("unknown type '{}'", name)),
        (_, other) => Err(format!("expected {}, got {}", ty, RuntimeType::of(other))),
    }
}

/// Integral value of a number; floats qualify when they have no fraction
fn integral(n: &Number) -> Option<i64> {
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    let f = n.as_f64()?;
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Untyped conversion of a Value into a script value
pub fn value_to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from_bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Dynamic::from_int(i),
            None => Dynamic::from_float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => Dynamic::from(s.clone()),
        Value::Array(items) => Dynamic::from_array(items.iter().map(value_to_dynamic).collect()),
        Value::Object(entries) => {
            let map: rhai::Map = entries
                .iter()
                .map(|(key, item)| (key.as_str().into(), value_to_dynamic(item)))
                .collect();
            Dynamic::from_map(map)
        }
    }
}

/// Convert a script value into a Value
pub fn dynamic_to_value(value: &Dynamic) -> Result<Value, ExecutionFault> {
    if value.is_unit() {
        return Ok(Value::Null);
    }
    if let Ok(b) = value.as_bool() {
        return Ok(Value::Bool(b));
    }
    if let Ok(i) = value.as_int() {
        return Ok(Value::Number(Number::from(i)));
    }
    if let Ok(f) = value.as_float() {
        return Number::from_f64(f).map(Value::Number).ok_or_else(|| {
            ExecutionFault::Comparison(format!("output {} is not a finite number", f))
        });
    }
    if let Ok(c) = value.as_char() {
        return Ok(Value::String(c.to_string()));
    }
    if value.is_string() {
        return value
            .clone()
            .into_string()
            .map(Value::String)
            .map_err(|t| ExecutionFault::Comparison(format!("unreadable string of type {}", t)));
    }
    if value.is_array() {
        let items = value
            .clone()
            .into_array()
            .map_err(|t| ExecutionFault::Comparison(format!("unreadable array of type {}", t)))?;
        return items
            .iter()
            .map(dynamic_to_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array);
    }
    if value.is_map() {
        if let Some(entries) = value.clone().try_cast::<rhai::Map>() {
            let mut object = Map::new();
            for (key, item) in &entries {
                object.insert(key.to_string(), dynamic_to_value(item)?);
            }
            return Ok(Value::Object(object));
        }
    }

    Err(ExecutionFault::Comparison(format!(
        "output of type '{}' has no JSON representation",
        value.type_name()
    )))
}
