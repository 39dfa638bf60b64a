//! Per-user container groups and last-used broadcast options

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::broadcast::{ensure, Broadcaster};
use crate::context::Operation;
use crate::error::{BroadcastError, BroadcastResult};
use crate::logging::*;
use crate::types::{BroadcastOptions, ContainerId};

/// Named set of containers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContainerGroup {
	pub name: String,
	pub containers: BTreeSet<ContainerId>,
}

/// What the user picked the last time they broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct LastUsedSettings {
	pub targets: Vec<ContainerId>,
	pub options: BroadcastOptions,
}

/// Everything stored per user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct UserGroupSettings {
	pub groups: BTreeMap<u32, ContainerGroup>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub last_used: Option<LastUsedSettings>,
}

impl UserGroupSettings {
	/// One past the highest id, or the lowest free one once the top id is taken
	fn next_group_id(&self) -> Option<u32> {
		match self.groups.keys().next_back() {
			None => Some(0),
			Some(last) => last.checked_add(1).or_else(|| (0..u32::MAX).find(|id| !self.groups.contains_key(id))),
		}
	}

	/// Parse the version 1 layout:
	/// `{"groups": {"0": {"name": .., "blogs": {"<id>": ..}}}, "last_used_settings": {..}}`.
	///
	/// In `last_used_settings` an option is on when its key is present at all.
	pub fn from_legacy(data: &Value) -> Result<Self, String> {
		let map = match data {
			Value::Object(map) => map,
			Value::Null => return Ok(Self::default()),
			Value::Array(a) if a.is_empty() => return Ok(Self::default()),
			_ => return Err("legacy user settings are not a map".to_string()),
		};
		let mut settings = UserGroupSettings::default();

		match map.get("groups") {
			Some(Value::Object(groups)) => {
				for (id, group) in groups {
					let id: u32 = id.trim().parse().map_err(|_| format!("bad group id {}", id))?;
					settings.groups.insert(id, legacy_group(group)?);
				}
			}
			Some(Value::Array(groups)) => {
				for (id, group) in groups.iter().enumerate() {
					settings.groups.insert(id as u32, legacy_group(group)?);
				}
			}
			_ => {}
		}

		if let Some(Value::Object(last)) = map.get("last_used_settings") {
			let options = BroadcastOptions {
				link: last.contains_key("link"),
				classifications: last.contains_key("taxonomies"),
				metadata: last.contains_key("custom_fields"),
			};
			let targets = match last.get("blogs") {
				Some(Value::Object(blogs)) => legacy_container_keys(blogs.keys())?,
				_ => Vec::new(),
			};
			settings.last_used = Some(LastUsedSettings { targets, options });
		}
		Ok(settings)
	}
}

fn legacy_container_keys<'a>(keys: impl Iterator<Item = &'a String>) -> Result<Vec<ContainerId>, String> {
	keys.map(|k| k.parse::<ContainerId>().map_err(|_| format!("bad blog id {}", k))).collect()
}

fn legacy_group(group: &Value) -> Result<ContainerGroup, String> {
	let name = group
		.get("name")
		.and_then(Value::as_str)
		.ok_or_else(|| "group without name".to_string())?
		.to_string();
	let containers = match group.get("blogs") {
		Some(Value::Object(blogs)) => legacy_container_keys(blogs.keys())?.into_iter().collect(),
		_ => BTreeSet::new(),
	};
	Ok(ContainerGroup { name, containers })
}

impl Broadcaster {
	/// Groups of the acting user
	pub fn groups(&self, op: &Operation) -> BroadcastResult<BTreeMap<u32, ContainerGroup>> {
		Ok(self.store.user_settings(op.user())?.groups)
	}

	/// Options and targets of the user's previous broadcast
	pub fn last_used(&self, op: &Operation) -> BroadcastResult<Option<LastUsedSettings>> {
		Ok(self.store.user_settings(op.user())?.last_used)
	}

	pub(crate) fn save_last_used(
		&self,
		op: &Operation,
		targets: &[ContainerId],
		options: BroadcastOptions,
	) -> BroadcastResult<()> {
		let mut settings = self.store.user_settings(op.user())?;
		settings.last_used = Some(LastUsedSettings { targets: targets.to_vec(), options });
		self.store.set_user_settings(op.user(), &settings)?;
		Ok(())
	}

	/// Create an empty group, returns its id
	pub fn create_group(&self, op: &Operation, name: &str) -> BroadcastResult<u32> {
		ensure(op.permissions().groups, "manage groups")?;
		let name = name.trim();
		if name.is_empty() {
			return Err(BroadcastError::InvalidRequest {
				message: "The group name may not be empty".to_string(),
			});
		}

		let mut settings = self.store.user_settings(op.user())?;
		let id = settings
			.next_group_id()
			.ok_or_else(|| BroadcastError::InvalidRequest { message: "No free group id".into() })?;
		settings.groups.insert(id, ContainerGroup { name: name.to_string(), containers: BTreeSet::new() });
		self.store.set_user_settings(op.user(), &settings)?;
		info!("user {} created group {} ({})", op.user(), id, name);
		Ok(id)
	}

	/// Replace the containers of a group. Containers the user cannot write to are dropped.
	pub async fn set_group_containers(
		&self,
		op: &Operation,
		group: u32,
		containers: &[ContainerId],
	) -> BroadcastResult<ContainerGroup> {
		ensure(op.permissions().groups, "manage groups")?;
		let writable: BTreeSet<ContainerId> =
			self.writable_containers(op).await?.into_iter().map(|c| c.id).collect();

		let mut settings = self.store.user_settings(op.user())?;
		let entry = settings.groups.get_mut(&group).ok_or_else(|| BroadcastError::InvalidRequest {
			message: format!("No such group: {}", group),
		})?;
		entry.containers = containers.iter().copied().filter(|c| writable.contains(c)).collect();
		let updated = entry.clone();
		self.store.set_user_settings(op.user(), &settings)?;
		debug!("group {} now has {} containers", group, updated.containers.len());
		Ok(updated)
	}

	/// Remove a group; true if it existed
	pub fn delete_group(&self, op: &Operation, group: u32) -> BroadcastResult<bool> {
		ensure(op.permissions().groups, "manage groups")?;
		let mut settings = self.store.user_settings(op.user())?;
		let removed = settings.groups.remove(&group).is_some();
		if removed {
			self.store.set_user_settings(op.user(), &settings)?;
			info!("user {} deleted group {}", op.user(), group);
		}
		Ok(removed)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_next_group_id() {
		let mut settings = UserGroupSettings::default();
		assert_eq!(settings.next_group_id(), Some(0));
		settings.groups.insert(4, ContainerGroup::default());
		assert_eq!(settings.next_group_id(), Some(5));
	}

	#[test]
	fn test_next_group_id_after_highest_id() {
		let mut settings = UserGroupSettings::default();
		settings.groups.insert(0, ContainerGroup::default());
		settings.groups.insert(u32::MAX, ContainerGroup::default());
		assert_eq!(settings.next_group_id(), Some(1));
	}

	#[test]
	fn test_from_legacy_groups_and_last_used() {
		let data = json!({
			"groups": {
				"0": {"name": "Europe", "blogs": {"2": 0, "3": 1}},
				"3": {"name": "Empty", "blogs": []}
			},
			"last_used_settings": {"link": "on", "taxonomies": "on", "blogs": {"2": "2"}}
		});
		let settings = UserGroupSettings::from_legacy(&data).unwrap();

		assert_eq!(settings.groups.len(), 2);
		assert_eq!(settings.groups[&0].name, "Europe");
		assert!(settings.groups[&0].containers.contains(&ContainerId(3)));
		assert!(settings.groups[&3].containers.is_empty());

		let last = settings.last_used.unwrap();
		assert_eq!(last.options, BroadcastOptions { link: true, classifications: true, metadata: false });
		assert_eq!(last.targets, vec![ContainerId(2)]);
	}

	#[test]
	fn test_from_legacy_rejects_nameless_group() {
		let data = json!({"groups": [{"blogs": {}}]});
		assert!(UserGroupSettings::from_legacy(&data).is_err());
	}

	#[test]
	fn test_serde_uses_numeric_group_keys() {
		let mut settings = UserGroupSettings::default();
		settings.groups.insert(7, ContainerGroup { name: "A".into(), containers: BTreeSet::new() });
		let text = serde_json::to_string(&settings).unwrap();
		let back: UserGroupSettings = serde_json::from_str(&text).unwrap();
		assert_eq!(back, settings);
	}
}

// vim: ts=4
