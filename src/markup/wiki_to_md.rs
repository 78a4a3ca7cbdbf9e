use regex::Captures;

use super::{Rule, Stash, regex, rewrite_delimited, run_rules, tolerate_failure};

/// Convert tracker wiki markup to Markdown.
///
/// Never fails: if a rule blows up, the input is returned unchanged.
pub fn wiki_to_markdown(text: &str) -> String {
	if text.is_empty() {
		return String::new();
	}
	tolerate_failure("wiki_to_markdown", text, convert)
}

fn convert(text: &str) -> String {
	let mut stash = Stash::default();
	let lifted = lift_code_blocks(&Stash::escape(text), &mut stash);
	let converted = run_rules(RULES, &lifted);
	stash.restore(&converted)
}

const RULES: &[Rule] = &[
	Rule { name: "unordered_list", apply: unordered_list },
	Rule { name: "ordered_list", apply: ordered_list },
	Rule { name: "heading", apply: heading },
	Rule { name: "bold", apply: bold },
	Rule { name: "italic", apply: italic },
	Rule { name: "monospace", apply: monospace },
	Rule { name: "insert", apply: insert },
	Rule { name: "superscript", apply: superscript },
	Rule { name: "subscript", apply: subscript },
	Rule { name: "strikethrough", apply: strikethrough },
	Rule { name: "stray_noformat", apply: stray_noformat },
	Rule { name: "unnamed_link", apply: unnamed_link },
	Rule { name: "image", apply: image },
	Rule { name: "named_link", apply: named_link },
	Rule { name: "blockquote", apply: blockquote },
	Rule { name: "color", apply: color },
	Rule { name: "panel", apply: panel },
	Rule { name: "table_header", apply: table_header },
	Rule { name: "table_indent", apply: table_indent },
];

/// Replace `{code}` and `{noformat}` blocks with placeholders holding their fenced form.
fn lift_code_blocks(text: &str, stash: &mut Stash) -> String {
	let text = regex!(r"(?s)\{code(?::([A-Za-z0-9_+#.-]+))?(?:[:|][^}]*)?\}(.*?)\n?\{code\}").replace_all(text, |caps: &Captures| {
		let lang = caps.get(1).map_or("", |m| m.as_str());
		stash.hold(format!("```{lang}{}\n```", &caps[2]))
	});
	regex!(r"(?s)\{noformat\}(.*?)\n?\{noformat\}")
		.replace_all(&text, |caps: &Captures| stash.hold(format!("```{}\n```", &caps[1])))
		.into_owned()
}

/// `**` nesting becomes indentation. A single star keeps whatever indentation it already has,
/// so nested Markdown lists pass through.
fn unordered_list(text: &str) -> String {
	regex!(r"(?m)^([ \t]*)(\*+)[ \t]+")
		.replace_all(text, |caps: &Captures| match caps[2].len() {
			1 => format!("{}* ", &caps[1]),
			depth => format!("{}* ", "  ".repeat(depth - 1)),
		})
		.into_owned()
}

fn ordered_list(text: &str) -> String {
	regex!(r"(?m)^[ \t]*(#+)[ \t]+")
		.replace_all(text, |caps: &Captures| format!("{}1. ", "   ".repeat(caps[1].len() - 1)))
		.into_owned()
}

fn heading(text: &str) -> String {
	regex!(r"(?m)^h([1-6])\.(.*)$")
		.replace_all(text, |caps: &Captures| {
			let level: usize = caps[1].parse().unwrap_or(1);
			format!("{} {}", "#".repeat(level), caps[2].trim())
		})
		.into_owned()
}

fn bold(text: &str) -> String {
	rewrite_delimited(text, regex!(r"(\*+)([^*\s][^*\n]*)(\*+)"), false, |c| format!("**{c}**"))
}

fn italic(text: &str) -> String {
	rewrite_delimited(text, regex!(r"(_+)([^_\s][^_\n]*)(_+)"), true, |c| format!("*{c}*"))
}

fn monospace(text: &str) -> String {
	regex!(r"\{\{([^}]+)\}\}").replace_all(text, "`$1`").into_owned()
}

fn insert(text: &str) -> String {
	rewrite_delimited(text, regex!(r"(\++)([^+\s][^+\n]*)(\++)"), true, |c| format!("<ins>{c}</ins>"))
}

fn superscript(text: &str) -> String {
	rewrite_delimited(text, regex!(r"(\^+)([^\^\s][^\^\n]*)(\^+)"), false, |c| format!("<sup>{c}</sup>"))
}

fn subscript(text: &str) -> String {
	rewrite_delimited(text, regex!(r"(~+)([^~\s][^~\n]*)(~+)"), false, |c| format!("<sub>{c}</sub>"))
}

fn strikethrough(text: &str) -> String {
	regex!(r"(?m)(^|[ \t])-([^\s-](?:[^\n]*?[^\s-])?)-([ \t]|$)").replace_all(text, "$1~~$2~~$3").into_owned()
}

/// An unpaired `{noformat}` still opens or closes a fence.
fn stray_noformat(text: &str) -> String {
	text.replace("{noformat}", "```")
}

/// `[target]` becomes an autolink. Markdown link text (`[t](u)`, `![alt](u)`) is left alone.
fn unnamed_link(text: &str) -> String {
	let re = regex!(r"\[([^|\]\n]+)\]");
	re.replace_all(text, |caps: &Captures| {
		let whole = &caps[0];
		let Some(m) = caps.get(0) else { return whole.to_string() };
		let followed_by_paren = text[m.end()..].starts_with('(');
		let preceded_by_bang = text[..m.start()].ends_with('!');
		if followed_by_paren || preceded_by_bang || caps[1].trim().is_empty() {
			return whole.to_string();
		}
		format!("<{}>", &caps[1])
	})
	.into_owned()
}

/// `!url!` and `!url|thumbnail!` become images; attributes are dropped.
fn image(text: &str) -> String {
	regex!(r"!([^!\s|]+)(?:\|[^!\n]*)?!").replace_all(text, "![]($1)").into_owned()
}

fn named_link(text: &str) -> String {
	regex!(r"\[([^\]|\n]+)\|([^\]\n]+)\]").replace_all(text, "[$1]($2)").into_owned()
}

fn blockquote(text: &str) -> String {
	regex!(r"(?m)^bq\.[ \t]*").replace_all(text, "> ").into_owned()
}

fn color(text: &str) -> String {
	regex!(r"(?s)\{color:[^}]+\}(.*?)\{color\}").replace_all(text, "$1").into_owned()
}

/// Panels become a single-column table; the title is the header and the body one row.
fn panel(text: &str) -> String {
	regex!(r"(?s)\{panel(?::([^}]*))?\}\n?(.*?)\n?\{panel\}")
		.replace_all(text, |caps: &Captures| {
			let title = caps
				.get(1)
				.and_then(|attrs| attrs.as_str().split('|').find_map(|kv| kv.trim().strip_prefix("title=")))
				.unwrap_or("")
				.trim();
			let body = caps[2].trim().replace('\n', "<br>");
			format!("\n| {title} |\n| --- |\n| {body} |")
		})
		.into_owned()
}

/// `||a||b||` becomes `|a|b|` followed by a separator row.
fn table_header(text: &str) -> String {
	regex!(r"(?m)^[ \t]*(\|\|.*\|\|)[ \t]*$")
		.replace_all(text, |caps: &Captures| {
			let single = caps[1].replace("||", "|");
			let columns = single.matches('|').count().saturating_sub(1);
			format!("{single}\n{}|", "| --- ".repeat(columns))
		})
		.into_owned()
}

fn table_indent(text: &str) -> String {
	regex!(r"(?m)^[ \t]+\|").replace_all(text, "|").into_owned()
}
