//! Conversion between the tracker's wiki markup and Markdown.
//!
//! Both directions are an ordered table of text rewrites. Each rule is a full pass over the
//! output of the previous one, so the order of the table is part of the contract: later rules
//! must not see syntax that earlier rules already produced for the other dialect.
//!
//! Code blocks are lifted out before the table runs and put back at the end, so their contents
//! are never touched by the inline rules.

mod md_to_wiki;
mod wiki_to_md;

use std::{
	borrow::Cow,
	panic::{self, AssertUnwindSafe},
};

use regex::Captures;
use serde_json::Value;

pub use md_to_wiki::markdown_to_wiki;
pub use wiki_to_md::wiki_to_markdown;

/// Compile a regex literal once, on first use.
macro_rules! regex {
	($re:expr $(,)?) => {{
		static RE: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| regex::Regex::new($re).unwrap());
		&*RE
	}};
}
pub(crate) use regex;

/// One named rewrite in a conversion pipeline.
pub(crate) struct Rule {
	pub name: &'static str,
	pub apply: fn(&str) -> String,
}

/// Run `rules` in order over `text`.
pub(crate) fn run_rules(rules: &[Rule], text: &str) -> String {
	rules.iter().fold(text.to_string(), |acc, rule| {
		let next = (rule.apply)(&acc);
		if next != acc {
			tracing::trace!(rule = rule.name, "markup rule rewrote text");
		}
		next
	})
}

/// Coerce an arbitrary field value to the text the converters operate on.
///
/// `null` becomes the empty string, numbers their decimal form, strings are taken as-is,
/// and anything else is serialized as JSON.
pub fn coerce_input(value: &Value) -> String {
	match value {
		Value::Null => String::new(),
		Value::String(s) => s.clone(),
		Value::Number(n) => n.to_string(),
		other => other.to_string(),
	}
}

/// [`wiki_to_markdown`] over an arbitrary field value.
pub fn wiki_value_to_markdown(value: &Value) -> String {
	wiki_to_markdown(&coerce_input(value))
}

/// Run a conversion, returning the unconverted input if it panics.
pub(crate) fn tolerate_failure(direction: &'static str, text: &str, convert: impl FnOnce(&str) -> String) -> String {
	match panic::catch_unwind(AssertUnwindSafe(|| convert(text))) {
		Ok(converted) => converted,
		Err(payload) => {
			let reason = payload
				.downcast_ref::<&str>()
				.map(|s| s.to_string())
				.or_else(|| payload.downcast_ref::<String>().cloned())
				.unwrap_or_else(|| "unknown panic".to_string());
			tracing::error!(direction, %reason, "markup conversion failed, keeping original text");
			text.to_string()
		}
	}
}

/// Placeholders for spans that must survive the rule table untouched.
///
/// Placeholders use private-use code points, which none of the rules match. Input is passed
/// through [`Stash::escape`] first, so those code points in the input come back out as they were.
#[derive(Debug, Default)]
pub(crate) struct Stash {
	blocks: Vec<String>,
}

impl Stash {
	/// Replace the placeholder delimiters already present in `text` with escapes that
	/// [`Stash::restore`] turns back into the literal characters.
	pub fn escape(text: &str) -> Cow<'_, str> {
		regex!("[\u{E000}\u{E001}]").replace_all(text, |caps: &Captures| match &caps[0] {
			"\u{E000}" => "\u{E000}a\u{E001}",
			_ => "\u{E000}b\u{E001}",
		})
	}

	/// Store already-rendered output and return the placeholder that stands in for it.
	pub fn hold(&mut self, rendered: String) -> String {
		self.blocks.push(rendered);
		format!("\u{E000}{}\u{E001}", self.blocks.len() - 1)
	}

	/// Replace every placeholder and escape in `text` with what it stands for.
	pub fn restore(&self, text: &str) -> String {
		self.expand(text, self.blocks.len())
	}

	/// A held block can only refer to blocks held before it, so expansion always terminates.
	fn expand(&self, text: &str, below: usize) -> String {
		if !text.contains('\u{E000}') {
			return text.to_string();
		}
		regex!("\u{E000}([0-9]+|a|b)\u{E001}")
			.replace_all(text, |caps: &Captures| match &caps[1] {
				"a" => "\u{E000}".to_string(),
				"b" => "\u{E001}".to_string(),
				index => index
					.parse::<usize>()
					.ok()
					.filter(|i| *i < below)
					.and_then(|i| self.blocks.get(i).map(|block| self.expand(block, i)))
					.unwrap_or_else(|| caps[0].to_string()),
			})
			.into_owned()
	}
}

/// Rewrite spans wrapped in exactly one `delim` on each side.
///
/// `pattern` must capture the opening run, the content and the closing run, in that order.
/// Runs longer than one character (e.g. `**bold**` when looking for `*`) are left alone, as is
/// content with trailing whitespace. With `word_bounded`, a span touching a letter or digit on
/// either side (`snake_case_name`) is left alone too.
pub(crate) fn rewrite_delimited(text: &str, pattern: &regex::Regex, word_bounded: bool, render: impl Fn(&str) -> String) -> String {
	pattern
		.replace_all(text, |caps: &Captures| {
			let whole = &caps[0];
			let (open, content, close) = (&caps[1], &caps[2], &caps[3]);
			if open.chars().count() != 1 || close.chars().count() != 1 || content.ends_with(char::is_whitespace) {
				return whole.to_string();
			}
			if word_bounded {
				let Some(m) = caps.get(0) else { return whole.to_string() };
				let before = text[..m.start()].chars().next_back();
				let after = text[m.end()..].chars().next();
				if before.is_some_and(char::is_alphanumeric) || after.is_some_and(char::is_alphanumeric) {
					return whole.to_string();
				}
			}
			render(content)
		})
		.into_owned()
}

/// Leading indentation width, counting a tab as `tab_width` columns.
pub(crate) fn indent_width(indent: &str, tab_width: usize) -> usize {
	indent.chars().map(|c| if c == '\t' { tab_width } else { 1 }).sum()
}
