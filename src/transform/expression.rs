//! Field expressions
//!
//! Expressions use the `evalexpr` language. A record is bound into the
//! evaluation context with one variable per leaf, named by its dotted path
//! (`user.name`). Arrays of scalars become tuples, null becomes the empty
//! value and objects nested inside arrays are bound as their JSON text.

use evalexpr::{
    ContextWithMutableVariables, HashMapContext, Node, Value as EvalValue, build_operator_tree,
};
use serde_json::{Map, Number, Value};

use super::error::{TransformError, TransformResult};

/// One compiled output field
#[derive(Debug, Clone)]
pub struct Expression {
    field: String,
    source: String,
    node: Node,
}

impl Expression {
    pub fn compile(field: &str, source: &str) -> TransformResult<Self> {
        let node: Node = build_operator_tree(source).map_err(|e| TransformError::Compile {
            field: field.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            field: field.to_string(),
            source: source.to_string(),
            node,
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, context: &HashMapContext) -> TransformResult<Value> {
        let value = self
            .node
            .eval_with_context(context)
            .map_err(|e| TransformError::Evaluation {
                field: self.field.clone(),
                message: e.to_string(),
            })?;
        Ok(from_eval(value))
    }
}

/// Bind every leaf of `record` into a fresh context
pub fn record_context(record: &Map<String, Value>) -> TransformResult<HashMapContext> {
    let mut context = HashMapContext::new();
    for (key, value) in record {
        bind(&mut context, key, value)?;
    }
    Ok(context)
}

fn bind(context: &mut HashMapContext, path: &str, value: &Value) -> TransformResult<()> {
    if let Value::Object(fields) = value {
        for (key, nested) in fields {
            bind(context, &format!("{}.{}", path, key), nested)?;
        }
        return Ok(());
    }
    context
        .set_value(path.to_string(), to_eval(value))
        .map_err(|e| TransformError::Evaluation {
            field: path.to_string(),
            message: e.to_string(),
        })
}

pub fn to_eval(value: &Value) -> EvalValue {
    match value {
        Value::Null => EvalValue::Empty,
        Value::Bool(b) => EvalValue::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => EvalValue::Int(i),
            None => EvalValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => EvalValue::String(s.clone()),
        Value::Array(items) => EvalValue::Tuple(items.iter().map(to_eval).collect()),
        Value::Object(_) => EvalValue::String(value.to_string()),
    }
}

pub fn from_eval(value: EvalValue) -> Value {
    match value {
        EvalValue::String(s) => Value::String(s),
        EvalValue::Int(i) => Value::Number(i.into()),
        EvalValue::Float(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        EvalValue::Boolean(b) => Value::Bool(b),
        EvalValue::Tuple(items) => Value::Array(items.into_iter().map(from_eval).collect()),
        EvalValue::Empty => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(source: &str, record: Value) -> TransformResult<Value> {
        let expr = Expression::compile("out", source)?;
        let context = record_context(record.as_object().unwrap())?;
        expr.evaluate(&context)
    }

    #[test]
    fn test_nested_paths() {
        let record = json!({"user": {"first": "Ana", "last": "Ruiz"}, "age": 30});
        assert_eq!(
            eval(r#"user.first + " " + user.last"#, record.clone()).unwrap(),
            json!("Ana Ruiz")
        );
        assert_eq!(eval("age * 2", record).unwrap(), json!(60));
    }

    #[test]
    fn test_builtins_and_floats() {
        assert_eq!(
            eval("str::to_uppercase(name)", json!({"name": "leo"})).unwrap(),
            json!("LEO")
        );
        assert_eq!(eval("price * 1.5", json!({"price": 2})).unwrap(), json!(3.0));
    }

    #[test]
    fn test_arrays_and_null() {
        assert_eq!(eval("tags", json!({"tags": ["a", "b"]})).unwrap(), json!(["a", "b"]));
        assert_eq!(eval("nick", json!({"nick": null})).unwrap(), Value::Null);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            Expression::compile("out", "(1 + 2"),
            Err(TransformError::Compile { .. })
        ));
        assert!(matches!(
            eval("missing + 1", json!({})),
            Err(TransformError::Evaluation { .. })
        ));
    }
}
