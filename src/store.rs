//! Link record and user settings persistence
//!
//! Both tables live in one redb database. Values are JSON envelopes carrying
//! a schema version so older layouts can be migrated on read.

use redb::{ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde_json::Value;
use std::path;

use crate::error::StoreError;
use crate::groups::UserGroupSettings;
use crate::links::LinkRecord;
use crate::logging::*;
use crate::types::{ContainerId, ItemId, ItemRef, UserId};

/// Current schema version of stored values
pub const SCHEMA_VERSION: u32 = 2;

/// Key: (container, item)
/// Value: versioned LinkRecord envelope
const LINK_RECORDS_TABLE: TableDefinition<(u64, u64), &[u8]> = TableDefinition::new("link_records");

/// Key: user id
/// Value: versioned UserGroupSettings envelope
const USER_SETTINGS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("user_settings");

#[derive(Serialize)]
struct EnvelopeOut<'a, T> {
	v: u32,
	data: &'a T,
}

/// A link that is only recorded on one side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkViolation {
	/// Parent lists the child, child does not point back
	ChildMissingParent { parent: ItemRef, child: ItemRef },
	/// Child points at a parent that does not list it
	ParentMissingChild { parent: ItemRef, child: ItemRef },
}

/// redb-backed store for the link graph and per-user settings
pub struct LinkStore {
	db: redb::Database,
	db_path: path::PathBuf,
}

impl LinkStore {
	/// Open or create a link database
	pub fn open(db_path: &path::Path) -> Result<Self, StoreError> {
		if let Some(parent) = db_path.parent() {
			if !parent.as_os_str().is_empty() && !parent.exists() {
				std::fs::create_dir_all(parent)
					.map_err(|e| StoreError::Open { source: Box::new(e) })?;
			}
		}
		let db = redb::Database::create(db_path)?;
		{
			let write_txn = db.begin_write()?;
			let _ = write_txn.open_table(LINK_RECORDS_TABLE)?;
			let _ = write_txn.open_table(USER_SETTINGS_TABLE)?;
			write_txn.commit()?;
		}
		Ok(LinkStore { db, db_path: db_path.to_path_buf() })
	}

	pub fn path(&self) -> &path::Path {
		&self.db_path
	}

	/// Record for an item; absence yields a fresh empty record
	pub fn get(&self, at: ItemRef) -> Result<LinkRecord, StoreError> {
		let read_txn = self.db.begin_read()?;
		let table = read_txn.open_table(LINK_RECORDS_TABLE)?;

		match table.get((at.container.0, at.item.0))? {
			Some(entry) => decode_link_record(&at.to_string(), entry.value()),
			None => Ok(LinkRecord::new()),
		}
	}

	/// Persist a record.
	///
	/// Unmodified records are not written. Empty records delete the entry.
	pub fn set(&self, at: ItemRef, record: &LinkRecord) -> Result<(), StoreError> {
		if !record.is_modified() {
			return Ok(());
		}
		if record.is_empty() {
			debug!("link record {} is empty, removing", at);
			return self.delete(at);
		}

		let bytes = encode(record)?;
		let write_txn = self.db.begin_write()?;
		{
			let mut table = write_txn.open_table(LINK_RECORDS_TABLE)?;
			table.insert((at.container.0, at.item.0), bytes.as_slice())?;
		}
		write_txn.commit()?;
		Ok(())
	}

	/// Remove a record unconditionally
	pub fn delete(&self, at: ItemRef) -> Result<(), StoreError> {
		let write_txn = self.db.begin_write()?;
		{
			let mut table = write_txn.open_table(LINK_RECORDS_TABLE)?;
			table.remove((at.container.0, at.item.0))?;
		}
		write_txn.commit()?;
		Ok(())
	}

	/// Whether a record is stored for the item
	pub fn contains(&self, at: ItemRef) -> Result<bool, StoreError> {
		let read_txn = self.db.begin_read()?;
		let table = read_txn.open_table(LINK_RECORDS_TABLE)?;
		Ok(table.get((at.container.0, at.item.0))?.is_some())
	}

	/// All stored records
	pub fn records(&self) -> Result<Vec<(ItemRef, LinkRecord)>, StoreError> {
		let read_txn = self.db.begin_read()?;
		let table = read_txn.open_table(LINK_RECORDS_TABLE)?;
		let mut out = Vec::new();

		for entry in table.iter()? {
			let (key, value) = entry?;
			let (c, i) = key.value();
			let at = ItemRef { container: ContainerId(c), item: ItemId(i) };
			let record = decode_link_record(&at.to_string(), value.value())?;
			out.push((at, record));
		}
		Ok(out)
	}

	/// Check the parent/child symmetry of every stored link
	pub fn verify_symmetry(&self) -> Result<Vec<LinkViolation>, StoreError> {
		let records = self.records()?;
		let lookup: std::collections::BTreeMap<ItemRef, &LinkRecord> =
			records.iter().map(|(at, r)| (*at, r)).collect();
		let mut violations = Vec::new();

		for (at, record) in &records {
			for child in record.children() {
				let back = lookup.get(&child).and_then(|r| r.parent());
				if back != Some(*at) {
					violations.push(LinkViolation::ChildMissingParent { parent: *at, child });
				}
			}
			if let Some(parent) = record.parent() {
				let listed = lookup.get(&parent).and_then(|r| r.child_on(at.container));
				if listed != Some(at.item) {
					violations.push(LinkViolation::ParentMissingChild { parent, child: *at });
				}
			}
		}
		Ok(violations)
	}

	/// Settings of a user; absence yields defaults
	pub fn user_settings(&self, user: UserId) -> Result<UserGroupSettings, StoreError> {
		let read_txn = self.db.begin_read()?;
		let table = read_txn.open_table(USER_SETTINGS_TABLE)?;

		match table.get(user.0)? {
			Some(entry) => decode_user_settings(&format!("user:{}", user), entry.value()),
			None => Ok(UserGroupSettings::default()),
		}
	}

	pub fn set_user_settings(
		&self,
		user: UserId,
		settings: &UserGroupSettings,
	) -> Result<(), StoreError> {
		let bytes = encode(settings)?;
		let write_txn = self.db.begin_write()?;
		{
			let mut table = write_txn.open_table(USER_SETTINGS_TABLE)?;
			table.insert(user.0, bytes.as_slice())?;
		}
		write_txn.commit()?;
		Ok(())
	}
}

fn encode<T: Serialize>(data: &T) -> Result<Vec<u8>, StoreError> {
	serde_json::to_vec(&EnvelopeOut { v: SCHEMA_VERSION, data })
		.map_err(|e| StoreError::Encode { message: e.to_string() })
}

fn parse(key: &str, bytes: &[u8]) -> Result<Value, StoreError> {
	serde_json::from_slice(bytes)
		.map_err(|e| StoreError::Corrupted { key: key.to_string(), message: e.to_string() })
}

/// Split a stored value into (version, payload). Values without an envelope are version 1.
fn unwrap_envelope(key: &str, value: Value) -> Result<(u32, Value), StoreError> {
	match value {
		Value::Object(mut map) if map.contains_key("v") && map.contains_key("data") => {
			let version = map
				.get("v")
				.and_then(Value::as_u64)
				.ok_or_else(|| StoreError::Corrupted {
					key: key.to_string(),
					message: "schema version is not a number".to_string(),
				})? as u32;
			let data = map.remove("data").unwrap_or(Value::Null);
			Ok((version, data))
		}
		other => Ok((1, other)),
	}
}

fn decode_user_settings(key: &str, bytes: &[u8]) -> Result<UserGroupSettings, StoreError> {
	let (version, data) = unwrap_envelope(key, parse(key, bytes)?)?;
	match version {
		1 => UserGroupSettings::from_legacy(&data)
			.map_err(|message| StoreError::Corrupted { key: key.to_string(), message }),
		SCHEMA_VERSION => serde_json::from_value(data)
			.map_err(|e| StoreError::Corrupted { key: key.to_string(), message: e.to_string() }),
		found => Err(StoreError::UnsupportedVersion { key: key.to_string(), found }),
	}
}

fn decode_link_record(key: &str, bytes: &[u8]) -> Result<LinkRecord, StoreError> {
	let (version, data) = unwrap_envelope(key, parse(key, bytes)?)?;
	let record = match version {
		1 => migrate_v1(key, &data)?,
		SCHEMA_VERSION => serde_json::from_value::<LinkRecord>(data)
			.map_err(|e| StoreError::Corrupted { key: key.to_string(), message: e.to_string() })?,
		found => return Err(StoreError::UnsupportedVersion { key: key.to_string(), found }),
	};
	Ok(record.mark_clean())
}

fn as_id(v: &Value) -> Option<u64> {
	match v {
		Value::Number(n) => n.as_u64(),
		Value::String(s) => s.trim().parse().ok(),
		_ => None,
	}
}

/// Version 1 layout:
/// `{"linked_parent": {"blog_id": B, "post_id": P}, "linked_children": {"B": P, ...}}`
fn migrate_v1(key: &str, data: &Value) -> Result<LinkRecord, StoreError> {
	let corrupted = |message: &str| StoreError::Corrupted {
		key: key.to_string(),
		message: message.to_string(),
	};
	let map = match data {
		Value::Object(map) => map,
		Value::Array(a) if a.is_empty() => return Ok(LinkRecord::new()),
		Value::Null => return Ok(LinkRecord::new()),
		_ => return Err(corrupted("legacy record is not a map")),
	};

	let mut record = LinkRecord::new();
	if let Some(parent) = map.get("linked_parent").filter(|p| p.is_object()) {
		let container = parent.get("blog_id").and_then(as_id).ok_or_else(|| corrupted("bad blog_id"))?;
		let item = parent.get("post_id").and_then(as_id).ok_or_else(|| corrupted("bad post_id"))?;
		record.set_parent(ItemRef::new(container, item));
	}
	if let Some(Value::Object(children)) = map.get("linked_children") {
		for (container, item) in children {
			let container: u64 =
				container.trim().parse().map_err(|_| corrupted("bad child container"))?;
			let item = as_id(item).ok_or_else(|| corrupted("bad child item"))?;
			record.add_child(ContainerId(container), ItemId(item));
		}
	}
	debug!("migrated legacy link record {}", key);
	Ok(record)
}


// vim: ts=4
