//! YAML frontmatter: a `---` fenced block at the very start of a document.

use color_eyre::eyre::{Result, bail, eyre};
use serde_json::{Map, Value};

use crate::issue::LocalSnapshot;

const FENCE: &str = "---";

/// Split `text` into its frontmatter mapping and the body after the closing fence.
/// A document without frontmatter yields an empty mapping and the whole text.
pub fn split(text: &str) -> Result<(LocalSnapshot, &str)> {
	let Some((yaml, body)) = fenced(text) else {
		return Ok((Map::new(), text));
	};
	if yaml.trim().is_empty() {
		return Ok((Map::new(), body));
	}
	let value: Value = serde_yaml::from_str(yaml).map_err(|e| eyre!("invalid frontmatter: {e}"))?;
	match value {
		Value::Null => Ok((Map::new(), body)),
		Value::Object(map) => Ok((map, body)),
		other => bail!("frontmatter must be a mapping, found {other}"),
	}
}

/// Inverse of [`split`]. An empty mapping produces no fence at all.
pub fn join(frontmatter: &LocalSnapshot, body: &str) -> Result<String> {
	if frontmatter.is_empty() {
		return Ok(body.to_string());
	}
	let yaml = serde_yaml::to_string(frontmatter)?;
	Ok(format!("{FENCE}\n{yaml}{FENCE}\n{body}"))
}

/// Apply `edit` to the frontmatter of `text`, leaving the body untouched.
pub fn rewrite(text: &str, edit: impl FnOnce(&mut LocalSnapshot)) -> Result<String> {
	let (mut frontmatter, body) = split(text)?;
	edit(&mut frontmatter);
	join(&frontmatter, body)
}

/// `(yaml, body)` when `text` opens with a fence that is closed later on its own line.
fn fenced(text: &str) -> Option<(&str, &str)> {
	let rest = text.strip_prefix(FENCE)?;
	let rest = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'))?;

	let mut offset = 0;
	for line in rest.split_inclusive('\n') {
		if line.trim_end_matches(['\r', '\n']) == FENCE {
			return Some((&rest[..offset], &rest[offset + line.len()..]));
		}
		offset += line.len();
	}
	None
}
