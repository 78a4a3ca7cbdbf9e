use crate::error::CompileError;

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
	Number(f64),
	Str(String),
	Ident(String),
	LParen,
	RParen,
	LBracket,
	RBracket,
	LBrace,
	RBrace,
	Comma,
	Colon,
	Semicolon,
	Dot,
	QuestionDot,
	Question,
	Arrow,
	StrictEq,
	StrictNe,
	Eq,
	Ne,
	Lt,
	Le,
	Gt,
	Ge,
	Plus,
	Minus,
	Star,
	Slash,
	Percent,
	Bang,
	AndAnd,
	OrOr,
	Nullish,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
	pub kind: TokenKind,
	pub offset: usize,
}

/// Operators, longest first so that `===` wins over `==` and `=>`.
const PUNCTUATION: &[(&str, TokenKind)] = &[
	("===", TokenKind::StrictEq),
	("!==", TokenKind::StrictNe),
	("=>", TokenKind::Arrow),
	("==", TokenKind::Eq),
	("!=", TokenKind::Ne),
	("<=", TokenKind::Le),
	(">=", TokenKind::Ge),
	("&&", TokenKind::AndAnd),
	("||", TokenKind::OrOr),
	("??", TokenKind::Nullish),
	("?.", TokenKind::QuestionDot),
	("(", TokenKind::LParen),
	(")", TokenKind::RParen),
	("[", TokenKind::LBracket),
	("]", TokenKind::RBracket),
	("{", TokenKind::LBrace),
	("}", TokenKind::RBrace),
	(",", TokenKind::Comma),
	(":", TokenKind::Colon),
	(";", TokenKind::Semicolon),
	(".", TokenKind::Dot),
	("?", TokenKind::Question),
	("<", TokenKind::Lt),
	(">", TokenKind::Gt),
	("+", TokenKind::Plus),
	("-", TokenKind::Minus),
	("*", TokenKind::Star),
	("/", TokenKind::Slash),
	("%", TokenKind::Percent),
	("!", TokenKind::Bang),
];

pub fn tokenize(source: &str) -> Result<Vec<Token>, CompileError> {
	let mut tokens = Vec::new();
	let mut chars = source.char_indices().peekable();

	while let Some(&(offset, c)) = chars.peek() {
		if c.is_whitespace() {
			chars.next();
			continue;
		}

		if c.is_ascii_digit() || (c == '.' && source[offset + 1..].starts_with(|n: char| n.is_ascii_digit())) {
			let end = source[offset..].find(|n: char| !(n.is_ascii_digit() || n == '.' || n == '_')).map_or(source.len(), |p| offset + p);
			let literal = source[offset..end].replace('_', "");
			let value = literal.parse::<f64>().map_err(|_| CompileError::Syntax {
				message: format!("invalid number `{literal}`"),
				offset,
			})?;
			tokens.push(Token { kind: TokenKind::Number(value), offset });
			while chars.peek().is_some_and(|&(i, _)| i < end) {
				chars.next();
			}
			continue;
		}

		if c == '_' || c == '$' || c.is_alphabetic() {
			let end = source[offset..].find(|n: char| !(n == '_' || n == '$' || n.is_alphanumeric())).map_or(source.len(), |p| offset + p);
			tokens.push(Token {
				kind: TokenKind::Ident(source[offset..end].to_string()),
				offset,
			});
			while chars.peek().is_some_and(|&(i, _)| i < end) {
				chars.next();
			}
			continue;
		}

		if c == '"' || c == '\'' {
			chars.next();
			let mut value = String::new();
			let mut closed = false;
			while let Some((_, ch)) = chars.next() {
				match ch {
					'\\' => {
						let Some((_, escaped)) = chars.next() else { break };
						match escaped {
							'n' => value.push('\n'),
							't' => value.push('\t'),
							'r' => value.push('\r'),
							'0' => value.push('\0'),
							'u' => {
								let hex: String = (0..4).filter_map(|_| chars.next().map(|(_, h)| h)).collect();
								let decoded = u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32).ok_or_else(|| CompileError::Syntax {
									message: format!("invalid unicode escape `\\u{hex}`"),
									offset,
								})?;
								value.push(decoded);
							}
							other => value.push(other),
						}
					}
					q if q == c => {
						closed = true;
						break;
					}
					other => value.push(other),
				}
			}
			if !closed {
				return Err(CompileError::Syntax {
					message: "unterminated string literal".to_string(),
					offset,
				});
			}
			tokens.push(Token { kind: TokenKind::Str(value), offset });
			continue;
		}

		// `?.` followed by a digit is a ternary with a decimal (`a?.5:1`)
		let rest = &source[offset..];
		let punct = PUNCTUATION
			.iter()
			.find(|(text, kind)| rest.starts_with(text) && !(*kind == TokenKind::QuestionDot && rest[2..].starts_with(|n: char| n.is_ascii_digit())));
		let Some((text, kind)) = punct else {
			return Err(CompileError::Syntax {
				message: format!("unexpected character `{c}`"),
				offset,
			});
		};
		tokens.push(Token { kind: kind.clone(), offset });
		for _ in 0..text.len() {
			chars.next();
		}
	}

	Ok(tokens)
}
