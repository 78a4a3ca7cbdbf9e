//! User-authored field transforms.
//!
//! Sources are small JavaScript-like expressions (`issue.fields.summary`,
//! `(value) => value ? { name: value } : null`). They are parsed into an AST and interpreted over
//! JSON values; nothing is ever handed to a host evaluator. Compilation screens identifiers
//! against a denylist, parses, resolves every identifier statically, and optionally runs the
//! result once against placeholder arguments.

mod eval;
mod lexer;
mod parser;

use serde_json::{Map, Value};

pub use eval::{HELPERS, METHODS, to_js_string, truthy};
pub use parser::MAX_DEPTH;

use self::{
	eval::Evaluator,
	lexer::TokenKind,
	parser::{Expr, Function},
};
use crate::{
	error::{CompileError, EvalError},
	issue::{IssueRecord, LocalSnapshot},
};

/// Identifiers that are rejected outright, wherever they appear.
pub const FORBIDDEN: &[&str] = &[
	"document",
	"window",
	"globalThis",
	"eval",
	"Function",
	"fetch",
	"XMLHttpRequest",
	"setTimeout",
	"setInterval",
	"require",
	"import",
	"process",
	"constructor",
	"__proto__",
	"prototype",
];

/// Which way a transform converts.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Direction {
	/// Local value to remote field: one parameter, `value`.
	ToRemote,
	/// Remote issue to local value: parameters `issue` and `local`.
	FromRemote,
}

impl Direction {
	fn default_params(self) -> &'static [&'static str] {
		match self {
			Direction::ToRemote => &["value"],
			Direction::FromRemote => &["issue", "local"],
		}
	}
}

/// A parsed, statically checked transform.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledExpr {
	source: String,
	direction: Direction,
	params: Vec<String>,
	body: Expr,
}

impl CompiledExpr {
	pub fn source(&self) -> &str {
		&self.source
	}

	pub fn direction(&self) -> Direction {
		self.direction
	}

	/// Evaluate with positional arguments; missing ones are `null`.
	pub fn call(&self, args: &[Value]) -> Result<Value, EvalError> {
		let bindings = self.params.iter().enumerate().map(|(i, name)| (name.clone(), args.get(i).cloned().unwrap_or(Value::Null))).collect();
		Evaluator::new(bindings).eval(&self.body)
	}

	pub fn to_remote(&self, value: &Value) -> Result<Value, EvalError> {
		self.call(std::slice::from_ref(value))
	}

	pub fn from_remote(&self, issue: &IssueRecord, local: &LocalSnapshot) -> Result<Value, EvalError> {
		self.call(&[issue.to_value(), Value::Object(local.clone())])
	}
}

/// Lex, screen, parse and resolve `source`, without running it.
pub fn check(source: &str, direction: Direction) -> Result<CompiledExpr, CompileError> {
	let tokens = lexer::tokenize(source)?;
	if let Some(token) = tokens.iter().find_map(|t| match &t.kind {
		TokenKind::Ident(name) if FORBIDDEN.contains(&name.as_str()) => Some(name),
		_ => None,
	}) {
		return Err(CompileError::Forbidden { token: token.clone() });
	}

	let Function { params, body } = parser::parse_function(&tokens, source.len())?;
	let params = params.unwrap_or_else(|| direction.default_params().iter().map(|p| p.to_string()).collect());
	let mut scope: Vec<String> = params.clone();
	resolve(&body, &mut scope)?;

	Ok(CompiledExpr {
		source: source.to_string(),
		direction,
		params,
		body,
	})
}

/// [`check`], then, if `smoke_test` is set, run the result against placeholder arguments.
pub fn validate(source: &str, direction: Direction, smoke_test: bool) -> Result<CompiledExpr, CompileError> {
	let compiled = check(source, direction)?;
	if smoke_test {
		run_smoke_test(&compiled)?;
	}
	Ok(compiled)
}

/// [`validate`], logging and discarding any error.
pub fn compile(source: &str, direction: Direction, smoke_test: bool) -> Option<CompiledExpr> {
	match validate(source, direction, smoke_test) {
		Ok(compiled) => Some(compiled),
		Err(err) => {
			tracing::warn!(?direction, source, error = %err, "rejected field mapping expression");
			None
		}
	}
}

/// `to_remote` transforms pass if any sample value works, since a mapping may expect a list or
/// a number rather than text.
fn run_smoke_test(compiled: &CompiledExpr) -> Result<(), CompileError> {
	let failure = match compiled.direction {
		Direction::ToRemote => {
			let samples = [Value::from("sample"), Value::from(vec![Value::from("sample")]), Value::from(1)];
			let mut last = None;
			for sample in &samples {
				match compiled.to_remote(sample) {
					Ok(_) => return Ok(()),
					Err(err) => last = Some(err),
				}
			}
			last
		}
		Direction::FromRemote => compiled.from_remote(&IssueRecord::placeholder(), &Map::new()).err(),
	};
	match failure {
		None => Ok(()),
		Some(EvalError(message)) => Err(CompileError::SmokeTest { message }),
	}
}

/// Every identifier must be a parameter, a lambda parameter in scope, or a callable helper.
fn resolve(expr: &Expr, scope: &mut Vec<String>) -> Result<(), CompileError> {
	match expr {
		Expr::Literal(_) => Ok(()),
		Expr::Ident(name) => match scope.iter().any(|s| s == name) {
			true => Ok(()),
			false => Err(CompileError::UnknownIdentifier { name: name.clone() }),
		},
		Expr::Array(items) => items.iter().try_for_each(|item| resolve(item, scope)),
		Expr::Object(entries) => entries.iter().try_for_each(|(_, value)| resolve(value, scope)),
		Expr::Member { object, .. } => resolve(object, scope),
		Expr::Index { object, index, .. } => {
			resolve(object, scope)?;
			resolve(index, scope)
		}
		Expr::Call { callee, args } => {
			match callee.as_ref() {
				Expr::Ident(name) if HELPERS.contains(&name.as_str()) => {}
				Expr::Ident(name) => return Err(CompileError::UnknownIdentifier { name: name.clone() }),
				Expr::Member { object, property, .. } => {
					if !METHODS.contains(&property.as_str()) {
						return Err(CompileError::UnknownIdentifier { name: property.clone() });
					}
					resolve(object, scope)?;
				}
				other => resolve(other, scope)?,
			}
			args.iter().try_for_each(|arg| resolve(arg, scope))
		}
		Expr::Unary { operand, .. } => resolve(operand, scope),
		Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
			resolve(left, scope)?;
			resolve(right, scope)
		}
		Expr::Conditional { test, then, otherwise } => {
			resolve(test, scope)?;
			resolve(then, scope)?;
			resolve(otherwise, scope)
		}
		Expr::Lambda { params, body } => {
			let mark = scope.len();
			scope.extend(params.iter().cloned());
			let result = resolve(body, scope);
			scope.truncate(mark);
			result
		}
	}
}
