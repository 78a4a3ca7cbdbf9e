//! Recursive-descent parser for the expression subset.
//!
//! Grammar, loosest binding first:
//! ```text
//! function    := params "=>" body | expression
//! params      := ident | "(" (ident ("," ident)*)? ")"
//! body        := "{" "return" expression ";"? "}" | expression
//! expression  := nullish ("?" expression ":" expression)?
//! nullish     := or ("??" or)*
//! or          := and ("||" and)*
//! and         := equality ("&&" equality)*
//! equality    := relational (("===" | "!==" | "==" | "!=") relational)*
//! relational  := additive (("<" | "<=" | ">" | ">=") additive)*
//! additive    := term (("+" | "-") term)*
//! term        := unary (("*" | "/" | "%") unary)*
//! unary       := ("!" | "-" | "+") unary | postfix
//! postfix     := primary ("." ident | "?." ident | "[" expression "]" | "(" arguments ")")*
//! arguments   := (argument ("," argument)*)?
//! argument    := params "=>" expression | expression
//! ```
//! Arrow functions are only accepted at the top level and as call arguments.

use serde_json::Value;

use super::lexer::{Token, TokenKind};
use crate::error::CompileError;

/// Nesting limit for sub-expressions.
pub const MAX_DEPTH: usize = 64;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnaryOp {
	Not,
	Neg,
	Plus,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BinaryOp {
	Add,
	Sub,
	Mul,
	Div,
	Rem,
	StrictEq,
	StrictNe,
	LooseEq,
	LooseNe,
	Lt,
	Le,
	Gt,
	Ge,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogicalOp {
	And,
	Or,
	Nullish,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
	Literal(Value),
	Ident(String),
	Array(Vec<Expr>),
	Object(Vec<(String, Expr)>),
	Member { object: Box<Expr>, property: String, optional: bool },
	Index { object: Box<Expr>, index: Box<Expr>, optional: bool },
	Call { callee: Box<Expr>, args: Vec<Expr> },
	Unary { op: UnaryOp, operand: Box<Expr> },
	Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
	Logical { op: LogicalOp, left: Box<Expr>, right: Box<Expr> },
	Conditional { test: Box<Expr>, then: Box<Expr>, otherwise: Box<Expr> },
	Lambda { params: Vec<String>, body: Box<Expr> },
}

/// A whole user function: its declared parameters (if any) and body.
#[derive(Clone, Debug, PartialEq)]
pub struct Function {
	pub params: Option<Vec<String>>,
	pub body: Expr,
}

pub fn parse_function(tokens: &[Token], source_len: usize) -> Result<Function, CompileError> {
	let mut parser = Parser { tokens, pos: 0, depth: 0, source_len };
	let function = match parser.arrow_params() {
		Some((params, after)) => {
			parser.pos = after;
			let body = parser.function_body()?;
			Function { params: Some(params), body }
		}
		None => Function {
			params: None,
			body: parser.expression()?,
		},
	};
	parser.eat(&TokenKind::Semicolon);
	if let Some(token) = parser.peek_token() {
		return Err(CompileError::Syntax {
			message: format!("unexpected {:?} after end of expression", token.kind),
			offset: token.offset,
		});
	}
	Ok(function)
}

struct Parser<'t> {
	tokens: &'t [Token],
	pos: usize,
	depth: usize,
	source_len: usize,
}

impl Parser<'_> {
	fn peek_token(&self) -> Option<&Token> {
		self.tokens.get(self.pos)
	}

	fn peek(&self) -> Option<&TokenKind> {
		self.peek_token().map(|t| &t.kind)
	}

	fn peek_at(&self, ahead: usize) -> Option<&TokenKind> {
		self.tokens.get(self.pos + ahead).map(|t| &t.kind)
	}

	fn offset(&self) -> usize {
		self.peek_token().map_or(self.source_len, |t| t.offset)
	}

	fn advance(&mut self) -> Option<&TokenKind> {
		let token = self.tokens.get(self.pos);
		self.pos += 1;
		token.map(|t| &t.kind)
	}

	fn eat(&mut self, kind: &TokenKind) -> bool {
		if self.peek() == Some(kind) {
			self.pos += 1;
			true
		} else {
			false
		}
	}

	fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<(), CompileError> {
		match self.eat(kind) {
			true => Ok(()),
			false => Err(self.error(format!("expected {what}"))),
		}
	}

	fn error(&self, message: String) -> CompileError {
		CompileError::Syntax { message, offset: self.offset() }
	}

	fn ident(&mut self) -> Result<String, CompileError> {
		match self.peek() {
			Some(TokenKind::Ident(name)) => {
				let name = name.clone();
				self.pos += 1;
				Ok(name)
			}
			_ => Err(self.error("expected identifier".to_string())),
		}
	}

	/// If an arrow parameter list starts here, its names and the position after `=>`.
	fn arrow_params(&self) -> Option<(Vec<String>, usize)> {
		match (self.peek()?, self.peek_at(1)) {
			(TokenKind::Ident(name), Some(TokenKind::Arrow)) => Some((vec![name.clone()], self.pos + 2)),
			(TokenKind::LParen, _) => {
				let mut params = Vec::new();
				let mut i = self.pos + 1;
				loop {
					match &self.tokens.get(i)?.kind {
						TokenKind::RParen if params.is_empty() || matches!(self.tokens.get(i - 1)?.kind, TokenKind::Ident(_)) => break,
						TokenKind::Ident(name) if params.is_empty() || self.tokens.get(i - 1)?.kind == TokenKind::Comma => params.push(name.clone()),
						TokenKind::Comma if matches!(self.tokens.get(i - 1)?.kind, TokenKind::Ident(_)) => {}
						_ => return None,
					}
					i += 1;
				}
				match self.tokens.get(i + 1)?.kind {
					TokenKind::Arrow => Some((params, i + 2)),
					_ => None,
				}
			}
			_ => None,
		}
	}

	fn function_body(&mut self) -> Result<Expr, CompileError> {
		let is_block = self.peek() == Some(&TokenKind::LBrace) && matches!(self.peek_at(1), Some(TokenKind::Ident(kw)) if kw == "return");
		if !is_block {
			return self.expression();
		}
		self.pos += 2;
		let body = self.expression()?;
		self.eat(&TokenKind::Semicolon);
		self.expect(&TokenKind::RBrace, "`}` closing the function body")?;
		Ok(body)
	}

	fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, CompileError>) -> Result<T, CompileError> {
		self.depth += 1;
		if self.depth > MAX_DEPTH {
			return Err(CompileError::TooDeep);
		}
		let result = f(self);
		self.depth -= 1;
		result
	}

	fn expression(&mut self) -> Result<Expr, CompileError> {
		self.nested(|p| {
			let test = p.nullish()?;
			if !p.eat(&TokenKind::Question) {
				return Ok(test);
			}
			let then = p.expression()?;
			p.expect(&TokenKind::Colon, "`:` in conditional expression")?;
			let otherwise = p.expression()?;
			Ok(Expr::Conditional {
				test: Box::new(test),
				then: Box::new(then),
				otherwise: Box::new(otherwise),
			})
		})
	}

	fn logical_chain(&mut self, op: LogicalOp, token: &TokenKind, next: fn(&mut Self) -> Result<Expr, CompileError>) -> Result<Expr, CompileError> {
		let mut left = next(self)?;
		while self.eat(token) {
			let right = next(self)?;
			left = Expr::Logical {
				op,
				left: Box::new(left),
				right: Box::new(right),
			};
		}
		Ok(left)
	}

	fn nullish(&mut self) -> Result<Expr, CompileError> {
		self.logical_chain(LogicalOp::Nullish, &TokenKind::Nullish, Self::or)
	}

	fn or(&mut self) -> Result<Expr, CompileError> {
		self.logical_chain(LogicalOp::Or, &TokenKind::OrOr, Self::and)
	}

	fn and(&mut self) -> Result<Expr, CompileError> {
		self.logical_chain(LogicalOp::And, &TokenKind::AndAnd, Self::equality)
	}

	fn binary_chain(&mut self, ops: &[(TokenKind, BinaryOp)], next: fn(&mut Self) -> Result<Expr, CompileError>) -> Result<Expr, CompileError> {
		let mut left = next(self)?;
		while let Some(op) = self.peek().and_then(|kind| ops.iter().find(|(k, _)| k == kind).map(|(_, op)| *op)) {
			self.pos += 1;
			let right = next(self)?;
			left = Expr::Binary {
				op,
				left: Box::new(left),
				right: Box::new(right),
			};
		}
		Ok(left)
	}

	fn equality(&mut self) -> Result<Expr, CompileError> {
		const OPS: &[(TokenKind, BinaryOp)] = &[
			(TokenKind::StrictEq, BinaryOp::StrictEq),
			(TokenKind::StrictNe, BinaryOp::StrictNe),
			(TokenKind::Eq, BinaryOp::LooseEq),
			(TokenKind::Ne, BinaryOp::LooseNe),
		];
		self.binary_chain(OPS, Self::relational)
	}

	fn relational(&mut self) -> Result<Expr, CompileError> {
		const OPS: &[(TokenKind, BinaryOp)] = &[(TokenKind::Lt, BinaryOp::Lt), (TokenKind::Le, BinaryOp::Le), (TokenKind::Gt, BinaryOp::Gt), (TokenKind::Ge, BinaryOp::Ge)];
		self.binary_chain(OPS, Self::additive)
	}

	fn additive(&mut self) -> Result<Expr, CompileError> {
		const OPS: &[(TokenKind, BinaryOp)] = &[(TokenKind::Plus, BinaryOp::Add), (TokenKind::Minus, BinaryOp::Sub)];
		self.binary_chain(OPS, Self::term)
	}

	fn term(&mut self) -> Result<Expr, CompileError> {
		const OPS: &[(TokenKind, BinaryOp)] = &[(TokenKind::Star, BinaryOp::Mul), (TokenKind::Slash, BinaryOp::Div), (TokenKind::Percent, BinaryOp::Rem)];
		self.binary_chain(OPS, Self::unary)
	}

	fn unary(&mut self) -> Result<Expr, CompileError> {
		let op = match self.peek() {
			Some(TokenKind::Bang) => UnaryOp::Not,
			Some(TokenKind::Minus) => UnaryOp::Neg,
			Some(TokenKind::Plus) => UnaryOp::Plus,
			_ => return self.postfix(),
		};
		self.pos += 1;
		let operand = self.nested(Self::unary)?;
		Ok(Expr::Unary { op, operand: Box::new(operand) })
	}

	fn postfix(&mut self) -> Result<Expr, CompileError> {
		let mut expr = self.primary()?;
		let mut links = 0;
		loop {
			match self.peek() {
				Some(TokenKind::Dot) => {
					self.pos += 1;
					let property = self.ident()?;
					expr = Expr::Member {
						object: Box::new(expr),
						property,
						optional: false,
					};
				}
				Some(TokenKind::QuestionDot) => {
					self.pos += 1;
					expr = match self.peek() {
						Some(TokenKind::LBracket) => {
							self.pos += 1;
							let index = self.expression()?;
							self.expect(&TokenKind::RBracket, "`]`")?;
							Expr::Index {
								object: Box::new(expr),
								index: Box::new(index),
								optional: true,
							}
						}
						_ => Expr::Member {
							object: Box::new(expr),
							property: self.ident()?,
							optional: true,
						},
					};
				}
				Some(TokenKind::LBracket) => {
					self.pos += 1;
					let index = self.expression()?;
					self.expect(&TokenKind::RBracket, "`]`")?;
					expr = Expr::Index {
						object: Box::new(expr),
						index: Box::new(index),
						optional: false,
					};
				}
				Some(TokenKind::LParen) => {
					self.pos += 1;
					let args = self.arguments()?;
					expr = Expr::Call { callee: Box::new(expr), args };
				}
				_ => {
					self.depth -= links;
					return Ok(expr);
				}
			}
			links += 1;
			self.depth += 1;
			if self.depth > MAX_DEPTH {
				return Err(CompileError::TooDeep);
			}
		}
	}

	fn arguments(&mut self) -> Result<Vec<Expr>, CompileError> {
		let mut args = Vec::new();
		if self.eat(&TokenKind::RParen) {
			return Ok(args);
		}
		loop {
			let arg = match self.arrow_params() {
				Some((params, after)) => {
					self.pos = after;
					let body = self.expression()?;
					Expr::Lambda { params, body: Box::new(body) }
				}
				None => self.expression()?,
			};
			args.push(arg);
			if self.eat(&TokenKind::RParen) {
				return Ok(args);
			}
			self.expect(&TokenKind::Comma, "`,` or `)` in argument list")?;
		}
	}

	fn primary(&mut self) -> Result<Expr, CompileError> {
		let offset = self.offset();
		let Some(kind) = self.advance().cloned() else {
			return Err(CompileError::Syntax {
				message: "unexpected end of expression".to_string(),
				offset,
			});
		};
		match kind {
			TokenKind::Number(n) => Ok(Expr::Literal(super::eval::number(n))),
			TokenKind::Str(s) => Ok(Expr::Literal(Value::String(s))),
			TokenKind::Ident(name) => Ok(match name.as_str() {
				"true" => Expr::Literal(Value::Bool(true)),
				"false" => Expr::Literal(Value::Bool(false)),
				"null" | "undefined" => Expr::Literal(Value::Null),
				_ => Expr::Ident(name),
			}),
			TokenKind::LParen => {
				let inner = self.expression()?;
				self.expect(&TokenKind::RParen, "`)`")?;
				Ok(inner)
			}
			TokenKind::LBracket => self.nested(|p| {
				let mut items = Vec::new();
				while !p.eat(&TokenKind::RBracket) {
					items.push(p.expression()?);
					if !p.eat(&TokenKind::Comma) {
						p.expect(&TokenKind::RBracket, "`,` or `]` in array literal")?;
						break;
					}
				}
				Ok(Expr::Array(items))
			}),
			TokenKind::LBrace => self.nested(|p| {
				let mut entries = Vec::new();
				while !p.eat(&TokenKind::RBrace) {
					let key = match p.advance().cloned() {
						Some(TokenKind::Ident(k) | TokenKind::Str(k)) => k,
						_ => return Err(p.error("expected property name".to_string())),
					};
					let value = match p.eat(&TokenKind::Colon) {
						true => p.expression()?,
						false => Expr::Ident(key.clone()),
					};
					entries.push((key, value));
					if !p.eat(&TokenKind::Comma) {
						p.expect(&TokenKind::RBrace, "`,` or `}` in object literal")?;
						break;
					}
				}
				Ok(Expr::Object(entries))
			}),
			other => Err(CompileError::Syntax {
				message: format!("unexpected {other:?}"),
				offset,
			}),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::expr::lexer::tokenize;

	fn parse(source: &str) -> Result<Function, CompileError> {
		parse_function(&tokenize(source)?, source.len())
	}

	#[test]
	fn test_bare_body() {
		let f = parse("issue.fields.summary").unwrap();
		assert_eq!(f.params, None);
		assert_eq!(
			f.body,
			Expr::Member {
				object: Box::new(Expr::Member {
					object: Box::new(Expr::Ident("issue".to_string())),
					property: "fields".to_string(),
					optional: false,
				}),
				property: "summary".to_string(),
				optional: false,
			}
		);
	}

	#[test]
	fn test_arrow_forms() {
		assert_eq!(parse("(value) => value").unwrap().params, Some(vec!["value".to_string()]));
		assert_eq!(parse("(issue, local) => issue.key").unwrap().params, Some(vec!["issue".to_string(), "local".to_string()]));
		assert_eq!(parse("v => v").unwrap().params, Some(vec!["v".to_string()]));
		assert_eq!(parse("() => 1").unwrap().params, Some(vec![]));
		assert_eq!(parse("(value) => { return value; }").unwrap().body, Expr::Ident("value".to_string()));
	}

	#[test]
	fn test_parenthesised_expression_is_not_arrow() {
		let f = parse("(a + 1) * 2").unwrap();
		assert_eq!(f.params, None);
		assert!(matches!(f.body, Expr::Binary { op: BinaryOp::Mul, .. }));
	}

	#[test]
	fn test_precedence() {
		let f = parse("a || b && c ? 1 + 2 * 3 : x ?? y").unwrap();
		let Expr::Conditional { test, then, otherwise } = f.body else { panic!("expected conditional") };
		assert!(matches!(*test, Expr::Logical { op: LogicalOp::Or, .. }));
		assert!(matches!(*then, Expr::Binary { op: BinaryOp::Add, .. }));
		assert!(matches!(*otherwise, Expr::Logical { op: LogicalOp::Nullish, .. }));
	}

	#[test]
	fn test_lambda_only_as_argument() {
		let f = parse("issue.fields.labels.map(l => l.toUpperCase())").unwrap();
		let Expr::Call { args, .. } = f.body else { panic!("expected call") };
		assert!(matches!(args[0], Expr::Lambda { .. }));

		assert!(matches!(parse("a + (x => x)"), Err(CompileError::Syntax { .. })));
	}

	#[test]
	fn test_object_and_array_literals() {
		let f = parse("value ? { name: value, 'key': [1, 2,] } : null").unwrap();
		let Expr::Conditional { then, .. } = f.body else { panic!("expected conditional") };
		let Expr::Object(entries) = *then else { panic!("expected object") };
		assert_eq!(entries[0].0, "name");
		assert_eq!(entries[1].1, Expr::Array(vec![Expr::Literal(1.into()), Expr::Literal(2.into())]));
	}

	#[test]
	fn test_syntax_errors() {
		assert!(matches!(parse("issue."), Err(CompileError::Syntax { offset: 6, .. })));
		assert!(matches!(parse("a b"), Err(CompileError::Syntax { offset: 2, .. })));
		assert!(matches!(parse("(a"), Err(CompileError::Syntax { .. })));
		assert!(matches!(parse(""), Err(CompileError::Syntax { offset: 0, .. })));
	}

	#[test]
	fn test_depth_limit() {
		let deep = format!("{}1{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
		assert_eq!(parse(&deep), Err(CompileError::TooDeep));
	}
}
