//! Naming and seeding of documents created for imported issues.

use crate::{issue::IssueRecord, markup::regex};

/// Starting content of an imported issue when no template is configured.
pub const DEFAULT_TEMPLATE: &str = "---
key:
summary:
project:
issuetype:
status:
priority:
assignee:
reporter:
created:
updated:
link:
---
`sync-section-description`
";

fn sanitize(name: &str) -> String {
	regex!(r#"[\\/:*?"<>|]"#).replace_all(name, "-").into_owned()
}

/// Document name (without extension) for `issue`, from a template with `{summary}` and `{key}`
/// placeholders. Falls back to the key, then the summary, then `jira-issue`.
pub fn filename_from_template(template: &str, issue: &IssueRecord) -> String {
	let summary = sanitize(issue.field("summary").as_str().unwrap_or_default());
	let filename = sanitize(&template.replace("{summary}", &summary).replace("{key}", &issue.key));
	let filename = filename.trim();
	if !filename.is_empty() {
		return filename.to_string();
	}
	[issue.key.trim(), summary.trim()].into_iter().find(|s| !s.is_empty()).unwrap_or("jira-issue").to_string()
}

/// `{folder}/{name}.md` for the first attempt, then `{folder}/{name} (2).md`, `(3)`, ...
pub fn document_path(folder: &str, name: &str, attempt: usize) -> String {
	let name = match attempt {
		0 | 1 => name.to_string(),
		n => format!("{name} ({n})"),
	};
	match folder.trim_end_matches('/') {
		"" => format!("{name}.md"),
		folder => format!("{folder}/{name}.md"),
	}
}
