//! Field Mapping Registry.
//!
//! Each field name resolves to a pair of transforms, one per direction. Custom entries come from
//! configuration as expression sources and fully replace a built-in of the same name.

mod builtin;

use std::{
	collections::{BTreeMap, HashMap},
	fmt,
	sync::Arc,
};

pub use builtin::{BUILTINS, BuiltinMapping, builtin};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
	expr::{self, CompiledExpr, Direction},
	issue::{IssueRecord, LocalSnapshot},
};

/// Transforms for one field. `None` means "nothing to write".
pub trait FieldMapping: Send + Sync + fmt::Debug {
	fn to_remote(&self, value: &Value) -> Option<Value>;
	fn from_remote(&self, issue: &IssueRecord, local: &LocalSnapshot) -> Option<Value>;
}

/// Expression sources for a custom mapping, as stored in configuration. An empty source is a no-op
/// in that direction.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct MappingSource {
	#[serde(default)]
	pub to_remote: String,
	#[serde(default)]
	pub from_remote: String,
}

#[derive(Debug)]
pub struct CustomMapping {
	field: String,
	to_remote: Option<CompiledExpr>,
	from_remote: Option<CompiledExpr>,
}

impl CustomMapping {
	/// `None` if either non-empty source is rejected.
	pub fn compile(field: &str, source: &MappingSource, smoke_test: bool) -> Option<Self> {
		let half = |src: &str, direction| match src.trim() {
			"" => Some(None),
			src => expr::compile(src, direction, smoke_test).map(Some),
		};
		Some(Self {
			field: field.to_string(),
			to_remote: half(&source.to_remote, Direction::ToRemote)?,
			from_remote: half(&source.from_remote, Direction::FromRemote)?,
		})
	}
}

impl FieldMapping for CustomMapping {
	fn to_remote(&self, value: &Value) -> Option<Value> {
		let compiled = self.to_remote.as_ref()?;
		match compiled.to_remote(value) {
			Ok(v) => Some(v).filter(|v| !v.is_null()),
			Err(err) => {
				warn!(field = %self.field, error = %err, "to_remote mapping failed");
				None
			}
		}
	}

	fn from_remote(&self, issue: &IssueRecord, local: &LocalSnapshot) -> Option<Value> {
		let compiled = self.from_remote.as_ref()?;
		match compiled.from_remote(issue, local) {
			Ok(v) => Some(v).filter(|v| !v.is_null()),
			Err(err) => {
				warn!(field = %self.field, issue = %issue.key, error = %err, "from_remote mapping failed");
				None
			}
		}
	}
}

#[derive(Clone, Debug)]
struct CustomEntry {
	source: MappingSource,
	/// `None` when the source was rejected; kept so an unchanged bad source is not recompiled.
	mapping: Option<Arc<CustomMapping>>,
}

#[derive(Clone, Debug, Default)]
pub struct FieldMappingRegistry {
	custom: HashMap<String, CustomEntry>,
}

impl FieldMappingRegistry {
	pub fn new(sources: &BTreeMap<String, MappingSource>, smoke_test: bool) -> Self {
		let mut registry = Self::default();
		registry.rebuild(sources, smoke_test);
		registry
	}

	/// Replace the custom entries. Sources identical to the cached ones are not recompiled.
	pub fn rebuild(&mut self, sources: &BTreeMap<String, MappingSource>, smoke_test: bool) {
		self.custom.retain(|name, _| sources.contains_key(name));
		for (name, source) in sources {
			if self.custom.get(name).is_some_and(|entry| entry.source == *source) {
				continue;
			}
			debug!(field = %name, "compiling custom mapping");
			let mapping = CustomMapping::compile(name, source, smoke_test).map(Arc::new);
			if mapping.is_none() {
				warn!(field = %name, "dropping custom mapping; built-in applies if one exists");
			}
			self.custom.insert(name.clone(), CustomEntry { source: source.clone(), mapping });
		}
	}

	pub fn resolve(&self, name: &str) -> Option<&dyn FieldMapping> {
		if let Some(mapping) = self.custom.get(name).and_then(|entry| entry.mapping.as_deref()) {
			return Some(mapping as &dyn FieldMapping);
		}
		builtin(name).map(|b| b as &dyn FieldMapping)
	}

	/// Whether `name` is handled by the shipped table rather than a user expression.
	pub fn is_builtin(&self, name: &str) -> bool {
		!self.custom.get(name).is_some_and(|entry| entry.mapping.is_some()) && builtin(name).is_some()
	}

	/// Fields to send to the tracker. Keys starting with `_`, null values, unmapped keys and
	/// transforms yielding nothing are left out.
	pub fn to_remote_fields(&self, local: &LocalSnapshot) -> Map<String, Value> {
		let mut fields = Map::new();
		for (name, value) in local {
			if name.starts_with('_') || value.is_null() {
				continue;
			}
			let Some(mapping) = self.resolve(name) else {
				continue;
			};
			if let Some(remote) = mapping.to_remote(value).filter(|v| !v.is_null()) {
				fields.insert(name.clone(), remote);
			}
		}
		fields
	}

	/// Local value for `name`. Unmapped names take `issue.fields[name]` verbatim.
	pub fn value_from_remote(&self, name: &str, issue: &IssueRecord, local: &LocalSnapshot) -> Option<Value> {
		match self.resolve(name) {
			Some(mapping) => mapping.from_remote(issue, local),
			None => Some(issue.field(name).clone()),
		}
		.filter(|v| !v.is_null())
	}

	/// Update every key already present in `target`; keys whose mapping yields nothing keep their
	/// current value. Expressions see `local` as it was before any update.
	pub fn apply_from_remote(&self, target: &mut LocalSnapshot, issue: &IssueRecord, local: &LocalSnapshot) {
		let names: Vec<String> = target.keys().cloned().collect();
		for name in names {
			if let Some(value) = self.value_from_remote(&name, issue, local) {
				target.insert(name, value);
			}
		}
	}
}
