//! Configuration for broadcastr
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (Config::default())
//! 2. Config file (`.toml`, anything else is read as JSON5)
//! 3. Environment variables (BROADCASTR_* prefix)
//! 4. CLI flags (highest priority)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Configuration of a broadcaster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	// ========================================================================
	// STORAGE
	// ========================================================================
	/// redb file holding link records and user settings
	pub database_path: PathBuf,

	// ========================================================================
	// CUSTOM FIELDS
	// ========================================================================
	/// Internal fields are skipped unless they contain one of these
	/// whitespace separated substrings
	pub custom_field_exceptions: String,

	/// Fields starting with this are internal
	pub internal_field_prefix: String,

	/// Field pointing at an item's thumbnail asset
	pub thumbnail_field: String,

	// ========================================================================
	// BROADCASTING
	// ========================================================================
	/// Whitespace separated item types that can be broadcast
	pub post_types: String,

	/// Deepest term ancestry followed when creating terms
	pub max_term_depth: usize,

	// ========================================================================
	// PERMALINKS
	// ========================================================================
	/// Children report their parent's permalink as canonical link
	pub canonical_url: bool,

	/// Children's permalinks point at the parent
	pub override_child_permalinks: bool,

	// ========================================================================
	// LOGGING
	// ========================================================================
	/// Default tracing filter, RUST_LOG wins
	pub log_level: String,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			database_path: std::env::var("HOME")
				.ok()
				.map(|h| PathBuf::from(h).join(".broadcastr").join("links.redb"))
				.unwrap_or_else(|| PathBuf::from(".broadcastr").join("links.redb")),
			custom_field_exceptions: "_wp_page_template _wplp_ _aioseop_".to_string(),
			internal_field_prefix: "_".to_string(),
			thumbnail_field: "_thumbnail_id".to_string(),
			post_types: "post page".to_string(),
			max_term_depth: 32,
			canonical_url: true,
			override_child_permalinks: false,
			log_level: "info".to_string(),
		}
	}
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
	match value.trim().to_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" => Ok(false),
		_ => Err(ConfigError::Invalid { message: format!("{} must be a boolean, got {}", name, value) }),
	}
}

impl Config {
	/// Read a config file on top of the defaults
	pub fn load(path: &Path) -> Result<Self, ConfigError> {
		let text = std::fs::read_to_string(path)
			.map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
		Self::parse(path, &text)
	}

	fn parse(path: &Path, text: &str) -> Result<Self, ConfigError> {
		let parse_err = |message: String| ConfigError::Parse { path: path.display().to_string(), message };
		match path.extension().and_then(|e| e.to_str()) {
			Some("toml") => toml::from_str(text).map_err(|e| parse_err(e.to_string())),
			_ => json5::from_str(text).map_err(|e| parse_err(e.to_string())),
		}
	}

	/// Apply `BROADCASTR_*` overrides from the process environment
	pub fn apply_env(&mut self) -> Result<(), ConfigError> {
		self.apply_vars(std::env::vars())
	}

	fn apply_vars(&mut self, vars: impl IntoIterator<Item = (String, String)>) -> Result<(), ConfigError> {
		for (name, value) in vars {
			match name.as_str() {
				"BROADCASTR_DATABASE" => self.database_path = PathBuf::from(value),
				"BROADCASTR_CUSTOM_FIELD_EXCEPTIONS" => self.custom_field_exceptions = value,
				"BROADCASTR_POST_TYPES" => self.post_types = value,
				"BROADCASTR_MAX_TERM_DEPTH" => {
					self.max_term_depth = value.trim().parse().map_err(|_| ConfigError::Invalid {
						message: format!("{} must be a number, got {}", name, value),
					})?
				}
				"BROADCASTR_CANONICAL_URL" => self.canonical_url = parse_bool(&name, &value)?,
				"BROADCASTR_OVERRIDE_CHILD_PERMALINKS" => {
					self.override_child_permalinks = parse_bool(&name, &value)?
				}
				"BROADCASTR_LOG_LEVEL" => self.log_level = value,
				_ => {}
			}
		}
		Ok(())
	}

	/// Reject values the engine cannot work with
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.internal_field_prefix.is_empty() {
			return Err(ConfigError::Invalid { message: "internalFieldPrefix may not be empty".to_string() });
		}
		if self.thumbnail_field.trim().is_empty() {
			return Err(ConfigError::Invalid { message: "thumbnailField may not be empty".to_string() });
		}
		if self.max_term_depth == 0 {
			return Err(ConfigError::Invalid { message: "maxTermDepth must be at least 1".to_string() });
		}
		if self.post_types.split_whitespace().next().is_none() {
			return Err(ConfigError::Invalid { message: "postTypes lists no item types".to_string() });
		}
		Ok(())
	}

	/// Item types that can be broadcast
	pub fn post_types(&self) -> impl Iterator<Item = &str> {
		self.post_types.split_whitespace()
	}

	pub fn is_post_type(&self, item_type: &str) -> bool {
		self.post_types().any(|t| t == item_type)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_config_default() {
		let config = Config::default();
		assert_eq!(config.thumbnail_field, "_thumbnail_id");
		assert_eq!(config.max_term_depth, 32);
		assert!(config.is_post_type("page"));
		assert!(!config.is_post_type("attachment"));
		assert!(config.validate().is_ok());
	}

	#[test]
	fn test_parse_toml_partial() {
		let text = "postTypes = \"post product\"\nmaxTermDepth = 4\n";
		let config = Config::parse(Path::new("broadcastr.toml"), text).unwrap();
		assert!(config.is_post_type("product"));
		assert!(!config.is_post_type("page"));
		assert_eq!(config.max_term_depth, 4);
		assert_eq!(config.internal_field_prefix, "_");
	}

	#[test]
	fn test_parse_json5_with_comments() {
		let text = "{\n  // keep SEO fields\n  customFieldExceptions: '_yoast_',\n  canonicalUrl: false,\n}";
		let config = Config::parse(Path::new("broadcastr.json5"), text).unwrap();
		assert_eq!(config.custom_field_exceptions, "_yoast_");
		assert!(!config.canonical_url);
	}

	#[test]
	fn test_parse_error_names_file() {
		let err = Config::parse(Path::new("bad.toml"), "maxTermDepth = [").unwrap_err();
		assert!(err.to_string().contains("bad.toml"));
	}

	#[test]
	fn test_env_overrides() {
		let mut config = Config::default();
		config
			.apply_vars(vec![
				("BROADCASTR_MAX_TERM_DEPTH".to_string(), "8".to_string()),
				("BROADCASTR_OVERRIDE_CHILD_PERMALINKS".to_string(), "yes".to_string()),
				("UNRELATED".to_string(), "x".to_string()),
			])
			.unwrap();
		assert_eq!(config.max_term_depth, 8);
		assert!(config.override_child_permalinks);

		let bad = config.apply_vars(vec![("BROADCASTR_CANONICAL_URL".to_string(), "maybe".to_string())]);
		assert!(bad.is_err());
	}

	#[test]
	fn test_validate_rejects_zero_depth() {
		let config = Config { max_term_depth: 0, ..Config::default() };
		assert!(config.validate().is_err());
	}
}

// vim: ts=4
