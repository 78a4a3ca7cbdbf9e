use regex::Captures;

use super::{Rule, Stash, indent_width, regex, run_rules, tolerate_failure};

/// Convert Markdown to tracker wiki markup. Approximate inverse of [`super::wiki_to_markdown`].
///
/// Never fails: if a rule blows up, the input is returned unchanged.
pub fn markdown_to_wiki(text: &str) -> String {
	if text.is_empty() {
		return String::new();
	}
	tolerate_failure("markdown_to_wiki", text, convert)
}

fn convert(text: &str) -> String {
	let mut stash = Stash::default();
	let lifted = lift_code(&Stash::escape(text), &mut stash);
	let converted = run_rules(RULES, &lifted);
	stash.restore(&converted)
}

const RULES: &[Rule] = &[
	Rule { name: "table", apply: table },
	Rule { name: "emphasis", apply: emphasis },
	Rule { name: "atx_heading", apply: atx_heading },
	Rule { name: "setext_heading", apply: setext_heading },
	Rule { name: "ordered_list", apply: ordered_list },
	Rule { name: "unordered_list", apply: unordered_list },
	Rule { name: "tags", apply: tags },
	Rule { name: "strikethrough", apply: strikethrough },
	Rule { name: "image", apply: image },
	Rule { name: "named_link", apply: named_link },
	Rule { name: "unnamed_link", apply: unnamed_link },
	Rule { name: "blockquote", apply: blockquote },
];

/// Fenced blocks and inline code spans, rendered to their wiki form up front.
fn lift_code(text: &str, stash: &mut Stash) -> String {
	let text = regex!(r"(?s)```([^\n`]*)\n(.*?)```").replace_all(text, |caps: &Captures| {
		let lang = caps[1].trim();
		let body = &caps[2];
		match lang.is_empty() {
			true => stash.hold(format!("{{code}}\n{body}{{code}}")),
			false => stash.hold(format!("{{code:{lang}}}\n{body}{{code}}")),
		}
	});
	regex!(r"`([^`\n]+)`")
		.replace_all(&text, |caps: &Captures| stash.hold(format!("{{{{{}}}}}", &caps[1])))
		.into_owned()
}

fn split_cells(line: &str) -> Vec<&str> {
	let inner = line.trim();
	let inner = inner.strip_prefix('|').unwrap_or(inner);
	let inner = inner.strip_suffix('|').unwrap_or(inner);
	inner.split('|').map(str::trim).collect()
}

/// Header + separator + rows. A one-column table with a single row is a panel.
fn table(text: &str) -> String {
	regex!(r"(?m)^(\|[^\n]*\|)[ \t\r]*\n(\|(?:[ \t]*:?-+:?[ \t]*\|)+)[ \t\r]*((?:\n\|[^\n]*\|[ \t\r]*)*)$")
		.replace_all(text, |caps: &Captures| {
			let headers = split_cells(&caps[1]);
			let separators = split_cells(&caps[2]);
			if headers.len() != separators.len() {
				return caps[0].to_string();
			}
			let rows = &caps[3];
			let body: Vec<&str> = rows.lines().filter(|l| !l.trim().is_empty()).collect();
			if let ([title], [row]) = (headers.as_slice(), body.as_slice()) {
				let content = split_cells(row).join(" | ").replace("<br>", "\n");
				return format!("{{panel:title={title}}}\n{content}\n{{panel}}");
			}
			format!("||{}||{rows}", headers.join("||"))
		})
		.into_owned()
}

/// `***x***`, `**x**` and `*x*`/`_x_` in one leftmost-first pass, so no output is re-read.
fn emphasis(text: &str) -> String {
	let re = regex!(r"\*\*\*(\S[^\n]*?)\*\*\*|___(\S[^\n]*?)___|\*\*(\S[^\n]*?)\*\*|__(\S[^\n]*?)__|\*(\S[^\n]*?)\*|_(\S[^\n]*?)_");
	re.replace_all(text, |caps: &Captures| {
		let whole = &caps[0];
		let Some((group, content)) = (1..=6).find_map(|i| caps.get(i).map(|m| (i, m.as_str()))) else {
			return whole.to_string();
		};
		let underscored = group % 2 == 0;
		if underscored && let Some(m) = caps.get(0) {
			let before = text[..m.start()].chars().next_back();
			let after = text[m.end()..].chars().next();
			if before.is_some_and(char::is_alphanumeric) || after.is_some_and(char::is_alphanumeric) {
				return whole.to_string();
			}
		}
		match group {
			1 | 2 => format!("_*{content}*_"),
			3 | 4 => format!("*{content}*"),
			_ => format!("_{content}_"),
		}
	})
	.into_owned()
}

fn atx_heading(text: &str) -> String {
	regex!(r"(?m)^(#{1,6})[ \t]+(.*)$")
		.replace_all(text, |caps: &Captures| format!("h{}. {}", caps[1].len(), caps[2].trim()))
		.into_owned()
}

fn setext_heading(text: &str) -> String {
	regex!(r"(?m)^([^\n]*\S[^\n]*)\n(={2,}|-{2,})[ \t]*$")
		.replace_all(text, |caps: &Captures| {
			let level = if caps[2].starts_with('=') { 1 } else { 2 };
			format!("h{level}. {}", caps[1].trim())
		})
		.into_owned()
}

fn ordered_list(text: &str) -> String {
	regex!(r"(?m)^([ \t]*)[0-9]+\.[ \t]+")
		.replace_all(text, |caps: &Captures| format!("{} ", "#".repeat(indent_width(&caps[1], 3) / 3 + 1)))
		.into_owned()
}

fn unordered_list(text: &str) -> String {
	regex!(r"(?m)^([ \t]*)[*+-][ \t]+")
		.replace_all(text, |caps: &Captures| format!("{} ", "*".repeat(indent_width(&caps[1], 2) / 2 + 1)))
		.into_owned()
}

fn tags(text: &str) -> String {
	regex!(r"<(ins|sup|sub|del)>(.*?)</(ins|sup|sub|del)>")
		.replace_all(text, |caps: &Captures| {
			let wrapper = match (&caps[1], &caps[3]) {
				("ins", "ins") => '+',
				("sup", "sup") => '^',
				("sub", "sub") => '~',
				("del", "del") => '-',
				_ => return caps[0].to_string(),
			};
			format!("{wrapper}{}{wrapper}", &caps[2])
		})
		.into_owned()
}

fn strikethrough(text: &str) -> String {
	regex!(r"~~([^~\n]+?)~~").replace_all(text, "-$1-").into_owned()
}

fn image(text: &str) -> String {
	regex!(r"!\[[^\]\n]*\]\(([^)\s]+)\)").replace_all(text, "!$1!").into_owned()
}

fn named_link(text: &str) -> String {
	regex!(r"\[([^\]\n]+)\]\(([^)\s]+)\)").replace_all(text, "[$1|$2]").into_owned()
}

fn unnamed_link(text: &str) -> String {
	regex!(r"<([^<>\s][^<>\n]*)>").replace_all(text, "[$1]").into_owned()
}

fn blockquote(text: &str) -> String {
	regex!(r"(?m)^>[ \t]?").replace_all(text, "bq. ").into_owned()
}
