//! Tree-walking evaluator over JSON values, with JavaScript-flavoured coercions.

use serde_json::{Map, Number, Value};

use super::parser::{BinaryOp, Expr, LogicalOp, UnaryOp};
use crate::{
	error::EvalError,
	markup::{coerce_input, markdown_to_wiki, wiki_to_markdown},
};

/// Recursion limit while evaluating, including lambda bodies.
pub const MAX_EVAL_DEPTH: usize = 256;

/// Free functions callable by name.
pub const HELPERS: &[&str] = &["wikiToMarkdown", "markdownToWiki", "String", "Number", "Boolean"];

/// Methods callable on values.
pub const METHODS: &[&str] = &[
	"map",
	"filter",
	"join",
	"includes",
	"split",
	"trim",
	"toUpperCase",
	"toLowerCase",
	"startsWith",
	"endsWith",
	"replace",
	"slice",
	"toString",
];

/// JSON number for `n`; integral values become integers, non-finite values `null`.
pub fn number(n: f64) -> Value {
	const MAX_SAFE: f64 = 9_007_199_254_740_991.0;
	if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE {
		return Value::from(n as i64);
	}
	Number::from_f64(n).map_or(Value::Null, Value::Number)
}

pub fn truthy(value: &Value) -> bool {
	match value {
		Value::Null => false,
		Value::Bool(b) => *b,
		Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
		Value::String(s) => !s.is_empty(),
		Value::Array(_) | Value::Object(_) => true,
	}
}

pub fn to_number(value: &Value) -> f64 {
	match value {
		Value::Null => 0.0,
		Value::Bool(b) => f64::from(u8::from(*b)),
		Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
		Value::String(s) => match s.trim() {
			"" => 0.0,
			trimmed => trimmed.parse().unwrap_or(f64::NAN),
		},
		Value::Array(items) => match items.as_slice() {
			[] => 0.0,
			[only] => to_number(only),
			_ => f64::NAN,
		},
		Value::Object(_) => f64::NAN,
	}
}

pub fn to_js_string(value: &Value) -> String {
	match value {
		Value::Null => "null".to_string(),
		Value::Bool(b) => b.to_string(),
		Value::Number(n) => match (n.as_i64(), n.as_f64()) {
			(Some(i), _) => i.to_string(),
			(None, Some(f)) if f.fract() == 0.0 && f.abs() < 1e21 => format!("{f:.0}"),
			_ => n.to_string(),
		},
		Value::String(s) => s.clone(),
		Value::Array(items) => items.iter().map(|v| if v.is_null() { String::new() } else { to_js_string(v) }).collect::<Vec<_>>().join(","),
		Value::Object(_) => "[object Object]".to_string(),
	}
}

fn strict_equals(left: &Value, right: &Value) -> bool {
	match (left, right) {
		(Value::Number(_), Value::Number(_)) => to_number(left) == to_number(right),
		_ => left == right,
	}
}

fn loose_equals(left: &Value, right: &Value) -> bool {
	match (left, right) {
		(Value::Null, Value::Null) => true,
		(Value::Null, _) | (_, Value::Null) => false,
		(Value::String(_), Value::String(_)) => left == right,
		(Value::Number(_) | Value::String(_) | Value::Bool(_), Value::Number(_) | Value::String(_) | Value::Bool(_)) => to_number(left) == to_number(right),
		_ => strict_equals(left, right),
	}
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> bool {
	if let (Value::String(l), Value::String(r)) = (left, right) {
		return match op {
			BinaryOp::Lt => l < r,
			BinaryOp::Le => l <= r,
			BinaryOp::Gt => l > r,
			_ => l >= r,
		};
	}
	let (l, r) = (to_number(left), to_number(right));
	match op {
		BinaryOp::Lt => l < r,
		BinaryOp::Le => l <= r,
		BinaryOp::Gt => l > r,
		_ => l >= r,
	}
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
	let stringy = |v: &Value| matches!(v, Value::String(_) | Value::Array(_) | Value::Object(_));
	match op {
		BinaryOp::Add if stringy(left) || stringy(right) => Value::String(to_js_string(left) + &to_js_string(right)),
		BinaryOp::Add => number(to_number(left) + to_number(right)),
		BinaryOp::Sub => number(to_number(left) - to_number(right)),
		BinaryOp::Mul => number(to_number(left) * to_number(right)),
		BinaryOp::Div => number(to_number(left) / to_number(right)),
		BinaryOp::Rem => number(to_number(left) % to_number(right)),
		BinaryOp::StrictEq => Value::Bool(strict_equals(left, right)),
		BinaryOp::StrictNe => Value::Bool(!strict_equals(left, right)),
		BinaryOp::LooseEq => Value::Bool(loose_equals(left, right)),
		BinaryOp::LooseNe => Value::Bool(!loose_equals(left, right)),
		BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => Value::Bool(compare(op, left, right)),
	}
}

fn property(target: &Value, name: &str) -> Value {
	match (target, name) {
		(Value::Object(map), _) => map.get(name).cloned().unwrap_or(Value::Null),
		(Value::Array(items), "length") => Value::from(items.len()),
		(Value::String(s), "length") => Value::from(s.encode_utf16().count()),
		_ => Value::Null,
	}
}

fn index(target: &Value, key: &Value) -> Value {
	match target {
		Value::Object(_) => property(target, &to_js_string(key)),
		Value::Array(items) => {
			let i = to_number(key);
			match i >= 0.0 && i.fract() == 0.0 {
				true => items.get(i as usize).cloned().unwrap_or(Value::Null),
				false => property(target, &to_js_string(key)),
			}
		}
		Value::String(s) => {
			let i = to_number(key);
			match i >= 0.0 && i.fract() == 0.0 {
				true => s.chars().nth(i as usize).map_or(Value::Null, |c| Value::String(c.to_string())),
				false => property(target, &to_js_string(key)),
			}
		}
		_ => Value::Null,
	}
}

/// `slice(start, end)` bounds with negative offsets counted from the end.
fn slice_bounds(len: usize, start: Option<&Value>, end: Option<&Value>) -> (usize, usize) {
	let resolve = |v: Option<&Value>, default: usize| -> usize {
		let Some(v) = v.filter(|v| !v.is_null()) else { return default };
		let n = to_number(v);
		if n.is_nan() {
			return 0;
		}
		let n = n.trunc();
		match n < 0.0 {
			true => (len as f64 + n).max(0.0) as usize,
			false => (n as usize).min(len),
		}
	};
	let start = resolve(start, 0);
	let end = resolve(end, len);
	(start, end.max(start))
}

fn describe(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "boolean",
		Value::Number(_) => "number",
		Value::String(_) => "string",
		Value::Array(_) => "array",
		Value::Object(_) => "object",
	}
}

pub struct Evaluator {
	scope: Vec<(String, Value)>,
	depth: usize,
}

impl Evaluator {
	pub fn new(bindings: Vec<(String, Value)>) -> Self {
		Self { scope: bindings, depth: 0 }
	}

	pub fn eval(&mut self, expr: &Expr) -> Result<Value, EvalError> {
		self.depth += 1;
		if self.depth > MAX_EVAL_DEPTH {
			return Err(EvalError("expression recursion limit reached".to_string()));
		}
		let result = self.eval_inner(expr);
		self.depth -= 1;
		result
	}

	fn eval_inner(&mut self, expr: &Expr) -> Result<Value, EvalError> {
		match expr {
			Expr::Literal(value) => Ok(value.clone()),
			Expr::Ident(name) => self.lookup(name),
			Expr::Array(items) => items.iter().map(|item| self.eval(item)).collect::<Result<Vec<_>, _>>().map(Value::Array),
			Expr::Object(entries) => {
				let mut map = Map::new();
				for (key, value) in entries {
					map.insert(key.clone(), self.eval(value)?);
				}
				Ok(Value::Object(map))
			}
			Expr::Member { .. } | Expr::Index { .. } | Expr::Call { .. } => Ok(self.eval_chain(expr)?.unwrap_or(Value::Null)),
			Expr::Unary { op, operand } => {
				let value = self.eval(operand)?;
				Ok(match op {
					UnaryOp::Not => Value::Bool(!truthy(&value)),
					UnaryOp::Neg => number(-to_number(&value)),
					UnaryOp::Plus => number(to_number(&value)),
				})
			}
			Expr::Binary { op, left, right } => {
				let left = self.eval(left)?;
				let right = self.eval(right)?;
				Ok(binary(*op, &left, &right))
			}
			Expr::Logical { op, left, right } => {
				let left = self.eval(left)?;
				let short_circuit = match op {
					LogicalOp::And => !truthy(&left),
					LogicalOp::Or => truthy(&left),
					LogicalOp::Nullish => !left.is_null(),
				};
				match short_circuit {
					true => Ok(left),
					false => self.eval(right),
				}
			}
			Expr::Conditional { test, then, otherwise } => {
				let test = self.eval(test)?;
				match truthy(&test) {
					true => self.eval(then),
					false => self.eval(otherwise),
				}
			}
			Expr::Lambda { .. } => Err(EvalError("functions can only be passed to `map` and `filter`".to_string())),
		}
	}

	fn lookup(&self, name: &str) -> Result<Value, EvalError> {
		self.scope
			.iter()
			.rev()
			.find(|(bound, _)| bound == name)
			.map(|(_, value)| value.clone())
			.ok_or_else(|| EvalError(format!("{name} is not defined")))
	}

	/// Member access, indexing and calls. `None` means an optional link (`?.`) hit `null` and the
	/// rest of the chain was skipped.
	fn eval_chain(&mut self, expr: &Expr) -> Result<Option<Value>, EvalError> {
		match expr {
			Expr::Member { object, property: name, optional } => {
				let Some(target) = self.eval_chain(object)? else { return Ok(None) };
				match (target.is_null(), optional) {
					(true, true) => Ok(None),
					(true, false) => Err(EvalError(format!("cannot read property `{name}` of null"))),
					(false, _) => Ok(Some(property(&target, name))),
				}
			}
			Expr::Index { object, index: key, optional } => {
				let Some(target) = self.eval_chain(object)? else { return Ok(None) };
				if target.is_null() {
					return match optional {
						true => Ok(None),
						false => Err(EvalError("cannot index into null".to_string())),
					};
				}
				let key = self.eval(key)?;
				Ok(Some(index(&target, &key)))
			}
			Expr::Call { callee, args } => match callee.as_ref() {
				Expr::Ident(name) => {
					let values = self.eval_args(args)?;
					call_helper(name, &values).map(Some)
				}
				Expr::Member { object, property: method, optional } => {
					let Some(receiver) = self.eval_chain(object)? else { return Ok(None) };
					match (receiver.is_null(), optional) {
						(true, true) => Ok(None),
						(true, false) => Err(EvalError(format!("cannot call `{method}` on null"))),
						(false, _) => self.call_method(&receiver, method, args).map(Some),
					}
				}
				_ => Err(EvalError("expression is not callable".to_string())),
			},
			other => self.eval(other).map(Some),
		}
	}

	fn eval_args(&mut self, args: &[Expr]) -> Result<Vec<Value>, EvalError> {
		args.iter().map(|arg| self.eval(arg)).collect()
	}

	fn apply_lambda(&mut self, lambda: &Expr, args: Vec<Value>) -> Result<Value, EvalError> {
		let Expr::Lambda { params, body } = lambda else {
			return Err(EvalError("expected a function argument".to_string()));
		};
		let mark = self.scope.len();
		let mut args = args.into_iter();
		for param in params {
			self.scope.push((param.clone(), args.next().unwrap_or(Value::Null)));
		}
		let result = self.eval(body);
		self.scope.truncate(mark);
		result
	}

	fn call_method(&mut self, receiver: &Value, method: &str, args: &[Expr]) -> Result<Value, EvalError> {
		match (receiver, method) {
			(Value::Array(items), "map") => {
				let f = args.first().ok_or_else(|| EvalError("map expects a function".to_string()))?;
				let mut out = Vec::with_capacity(items.len());
				for (i, item) in items.iter().enumerate() {
					out.push(self.apply_lambda(f, vec![item.clone(), Value::from(i)])?);
				}
				Ok(Value::Array(out))
			}
			(Value::Array(items), "filter") => {
				let f = args.first().ok_or_else(|| EvalError("filter expects a function".to_string()))?;
				let mut out = Vec::new();
				for (i, item) in items.iter().enumerate() {
					if truthy(&self.apply_lambda(f, vec![item.clone(), Value::from(i)])?) {
						out.push(item.clone());
					}
				}
				Ok(Value::Array(out))
			}
			_ => {
				let values = self.eval_args(args)?;
				call_value_method(receiver, method, &values)
			}
		}
	}
}

fn call_helper(name: &str, args: &[Value]) -> Result<Value, EvalError> {
	let first = args.first().unwrap_or(&Value::Null);
	match name {
		"wikiToMarkdown" => Ok(Value::String(wiki_to_markdown(&coerce_input(first)))),
		"markdownToWiki" => Ok(Value::String(markdown_to_wiki(&coerce_input(first)))),
		"String" => Ok(Value::String(if args.is_empty() { String::new() } else { to_js_string(first) })),
		"Number" => Ok(if args.is_empty() { Value::from(0) } else { number(to_number(first)) }),
		"Boolean" => Ok(Value::Bool(truthy(first))),
		_ => Err(EvalError(format!("{name} is not a function"))),
	}
}

fn string_arg(args: &[Value], i: usize) -> Option<String> {
	args.get(i).filter(|v| !v.is_null()).map(to_js_string)
}

fn call_value_method(receiver: &Value, method: &str, args: &[Value]) -> Result<Value, EvalError> {
	match (receiver, method) {
		(Value::Array(items), "join") => {
			let sep = string_arg(args, 0).unwrap_or_else(|| ",".to_string());
			let parts: Vec<String> = items.iter().map(|v| if v.is_null() { String::new() } else { to_js_string(v) }).collect();
			Ok(Value::String(parts.join(&sep)))
		}
		(Value::Array(items), "includes") => {
			let needle = args.first().unwrap_or(&Value::Null);
			Ok(Value::Bool(items.iter().any(|item| strict_equals(item, needle))))
		}
		(Value::Array(items), "slice") => {
			let (start, end) = slice_bounds(items.len(), args.first(), args.get(1));
			Ok(Value::Array(items[start..end].to_vec()))
		}
		(Value::String(s), "includes") => Ok(Value::Bool(s.contains(&string_arg(args, 0).unwrap_or_default()))),
		(Value::String(s), "startsWith") => Ok(Value::Bool(s.starts_with(&string_arg(args, 0).unwrap_or_default()))),
		(Value::String(s), "endsWith") => Ok(Value::Bool(s.ends_with(&string_arg(args, 0).unwrap_or_default()))),
		(Value::String(s), "trim") => Ok(Value::String(s.trim().to_string())),
		(Value::String(s), "toUpperCase") => Ok(Value::String(s.to_uppercase())),
		(Value::String(s), "toLowerCase") => Ok(Value::String(s.to_lowercase())),
		(Value::String(s), "split") => {
			let parts: Vec<Value> = match string_arg(args, 0) {
				None => vec![Value::String(s.clone())],
				Some(sep) if sep.is_empty() => s.chars().map(|c| Value::String(c.to_string())).collect(),
				Some(sep) => s.split(sep.as_str()).map(|p| Value::String(p.to_string())).collect(),
			};
			Ok(Value::Array(parts))
		}
		(Value::String(s), "replace") => {
			let from = string_arg(args, 0).unwrap_or_else(|| "null".to_string());
			let to = string_arg(args, 1).unwrap_or_else(|| "null".to_string());
			Ok(Value::String(s.replacen(&from, &to, 1)))
		}
		(Value::String(s), "slice") => {
			let chars: Vec<char> = s.chars().collect();
			let (start, end) = slice_bounds(chars.len(), args.first(), args.get(1));
			Ok(Value::String(chars[start..end].iter().collect()))
		}
		(_, "toString") => Ok(Value::String(to_js_string(receiver))),
		_ => Err(EvalError(format!("{}.{method} is not a function", describe(receiver)))),
	}
}
