//! Sync markers embedded in document prose.
//!
//! A marker is an inline code span `` `sync-<form>-<name>` `` naming a field. The text it wraps
//! round-trips with that field:
//! - `section`: up to the next heading line, the next marker, or end of document.
//! - `line`: the rest of the line.
//! - `inline-start` .. `inline-end`: everything between the two tokens.
//! - `block-start` .. `block-end`: the lines between the two tokens.
//!
//! A start token without its end token runs to the next marker or end of document.
//! All offsets are byte offsets into the parsed text.

use std::{collections::BTreeMap, fmt};

use regex::Regex;
use serde::Serialize;

use crate::markup::regex;

/// Layout family of a marker.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerForm {
	Section,
	Line,
	Inline,
	Block,
}

/// One token as it appears in the text.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Token {
	Section(String),
	Line(String),
	InlineStart(String),
	InlineEnd(String),
	BlockStart(String),
	BlockEnd(String),
	/// Bare `` `sync-end` ``, closes whatever is open.
	End,
}

impl Token {
	/// Decode a single token, backticks included. Returns None for anything else.
	pub fn decode(s: &str) -> Option<Self> {
		let caps = token_regex().captures(s.trim())?;
		if caps.get(0)?.as_str().len() != s.trim().len() {
			return None;
		}
		Self::from_captures(&caps)
	}

	fn from_captures(caps: &regex::Captures) -> Option<Self> {
		let (Some(form), Some(name)) = (caps.get(1), caps.get(2)) else {
			return Some(Token::End);
		};
		let name = name.as_str().to_string();
		Some(match form.as_str() {
			"section" => Token::Section(name),
			"line" => Token::Line(name),
			"inline-start" => Token::InlineStart(name),
			"inline-end" => Token::InlineEnd(name),
			"block-start" => Token::BlockStart(name),
			"block-end" => Token::BlockEnd(name),
			_ => return None,
		})
	}

	pub fn encode(&self) -> String {
		match self {
			Token::Section(name) => format!("`sync-section-{name}`"),
			Token::Line(name) => format!("`sync-line-{name}`"),
			Token::InlineStart(name) => format!("`sync-inline-start-{name}`"),
			Token::InlineEnd(name) => format!("`sync-inline-end-{name}`"),
			Token::BlockStart(name) => format!("`sync-block-start-{name}`"),
			Token::BlockEnd(name) => format!("`sync-block-end-{name}`"),
			Token::End => "`sync-end`".to_string(),
		}
	}

	/// Whether this token terminates an open marker of `form` named `name`.
	fn closes(&self, form: MarkerForm, name: &str) -> bool {
		match (self, form) {
			(Token::End, MarkerForm::Inline | MarkerForm::Block) => true,
			(Token::InlineEnd(n), MarkerForm::Inline) | (Token::BlockEnd(n), MarkerForm::Block) => n == name,
			_ => false,
		}
	}
}

impl fmt::Display for Token {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.encode())
	}
}

fn token_regex() -> &'static Regex {
	regex!(r"`sync-(?:(section|line|inline-start|inline-end|block-start|block-end)-([\w-]+)|end)`")
}

/// A parsed marker and the span of text it owns.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SyncMarker {
	#[serde(rename = "type")]
	pub form: MarkerForm,
	pub name: String,
	/// The extracted value.
	pub content: String,
	/// Start of the opening token.
	pub start: usize,
	/// End of the closing token, or of the content when there is none.
	pub end: usize,
	#[serde(skip)]
	open: String,
	#[serde(skip)]
	close: Option<String>,
	#[serde(skip)]
	lead: String,
	#[serde(skip)]
	trail: String,
	#[serde(skip)]
	before_heading: bool,
}

impl SyncMarker {
	/// Re-serialize this marker around `value`, in its form's canonical layout.
	pub fn render(&self, value: &str) -> String {
		let close = self.close.as_deref().unwrap_or("");
		match self.form {
			MarkerForm::Section if value.is_empty() => match self.lead.ends_with('\n') {
				true => format!("{}{}", self.open, self.lead),
				false => format!("{}{}{}", self.open, self.lead, self.trail),
			},
			MarkerForm::Section => {
				let lead = if self.lead.contains('\n') { self.lead.as_str() } else { "\n" };
				let trail = if self.before_heading && !self.trail.ends_with('\n') { "\n" } else { self.trail.as_str() };
				format!("{}{lead}{value}{trail}", self.open)
			}
			MarkerForm::Line => {
				let first_line = value.lines().next().unwrap_or("").trim();
				match first_line.is_empty() {
					true => format!("{}{}", self.open, self.trail),
					false => format!("{} {first_line}{}", self.open, self.trail),
				}
			}
			MarkerForm::Inline => format!("{}{}{value}{}{close}", self.open, self.lead, self.trail),
			MarkerForm::Block => match self.close {
				Some(_) => format!("{}\n{value}\n{close}", self.open),
				None => format!("{}\n{value}{}", self.open, self.trail),
			},
		}
	}
}

/// Leading and trailing whitespace of `raw`, and what is between them.
fn split_padding(raw: &str) -> (&str, &str, &str) {
	let lead_len = raw.len() - raw.trim_start().len();
	let (lead, rest) = raw.split_at(lead_len);
	let body_len = rest.trim_end().len();
	let (body, trail) = rest.split_at(body_len);
	(lead, body, trail)
}

/// Every marker in `text`, in document order.
pub fn parse_markers(text: &str) -> Vec<SyncMarker> {
	let tokens: Vec<(usize, usize, Token)> = token_regex()
		.captures_iter(text)
		.filter_map(|caps| {
			let m = caps.get(0)?;
			Some((m.start(), m.end(), Token::from_captures(&caps)?))
		})
		.collect();

	let mut markers = Vec::new();
	let mut i = 0;
	while i < tokens.len() {
		let (start, token_end, token) = &tokens[i];
		let (start, token_end) = (*start, *token_end);
		let next_start = tokens.get(i + 1).map_or(text.len(), |(s, ..)| *s);
		let open = text[start..token_end].to_string();
		i += 1;

		match token {
			Token::Section(name) => {
				let (stop, at_heading) = section_stop(text, token_end, next_start);
				let raw = &text[token_end..stop];
				let (lead, body, trail) = split_padding(raw);
				markers.push(SyncMarker {
					form: MarkerForm::Section,
					name: name.clone(),
					content: body.to_string(),
					start,
					end: stop,
					open,
					close: None,
					lead: lead.to_string(),
					trail: trail.to_string(),
					before_heading: at_heading,
				});
			}
			Token::Line(name) => {
				let eol = text[token_end..].find('\n').map_or(text.len(), |p| token_end + p);
				let stop = eol.min(next_start);
				let (_, body, trail) = split_padding(&text[token_end..stop]);
				markers.push(SyncMarker {
					form: MarkerForm::Line,
					name: name.clone(),
					content: body.to_string(),
					start,
					end: stop,
					open,
					close: None,
					lead: String::new(),
					trail: trail.to_string(),
					before_heading: false,
				});
			}
			Token::InlineStart(name) | Token::BlockStart(name) => {
				let form = if matches!(token, Token::InlineStart(_)) { MarkerForm::Inline } else { MarkerForm::Block };
				let (content_end, end, close) = match tokens.get(i) {
					Some((s, e, t)) if t.closes(form, name) => {
						i += 1;
						(*s, *e, Some(text[*s..*e].to_string()))
					}
					_ => {
						tracing::debug!(marker = %open, "unterminated marker, running to the next marker");
						(next_start, next_start, None)
					}
				};
				let raw = &text[token_end..content_end];
				let (lead, body, trail) = split_padding(raw);
				let content = match form {
					MarkerForm::Block => {
						let stripped = raw.strip_prefix('\n').unwrap_or(raw);
						let stripped = if close.is_some() { stripped.strip_suffix('\n').unwrap_or(stripped) } else { stripped.trim_end() };
						stripped.to_string()
					}
					_ => body.to_string(),
				};
				markers.push(SyncMarker {
					form,
					name: name.clone(),
					content,
					start,
					end,
					open,
					close,
					lead: lead.to_string(),
					trail: trail.to_string(),
					before_heading: false,
				});
			}
			Token::InlineEnd(_) | Token::BlockEnd(_) | Token::End => {
				tracing::debug!(token = %open, offset = start, "stray end token ignored");
			}
		}
	}
	markers
}

/// Whether `rest` begins with a Markdown heading (`#` run, then a space).
fn is_heading_line(rest: &str) -> bool {
	let hashes = rest.chars().take_while(|c| *c == '#').count();
	(1..=6).contains(&hashes) && rest[hashes..].starts_with([' ', '\t'])
}

/// Where a section starting at `from` ends: the first heading line before `limit`, else `limit`.
fn section_stop(text: &str, from: usize, limit: usize) -> (usize, bool) {
	let mut offset = from;
	while let Some(pos) = text[offset..limit].find("\n#") {
		let line_start = offset + pos + 1;
		if is_heading_line(&text[line_start..]) {
			return (line_start, true);
		}
		offset = line_start;
	}
	(limit, false)
}

/// Marker name to extracted value. When a name repeats, the last one wins.
pub fn extract_values(text: &str) -> BTreeMap<String, String> {
	parse_markers(text).into_iter().map(|m| (m.name, m.content)).collect()
}

/// Replace the content of every marker whose name is in `updates`.
///
/// Spans are computed once against the original text and the result is built in one scan, so
/// earlier replacements never shift later ones. Names without a marker are ignored.
pub fn apply_updates(text: &str, updates: &BTreeMap<String, String>) -> String {
	let mut out = String::with_capacity(text.len());
	let mut cursor = 0;
	for marker in parse_markers(text) {
		let Some(value) = updates.get(&marker.name) else { continue };
		out.push_str(&text[cursor..marker.start]);
		out.push_str(&marker.render(value));
		cursor = marker.end;
	}
	out.push_str(&text[cursor..]);
	out
}
