//! Configuration loading and validation.
//!
//! The document is JSON unless the file name ends in `.ron`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use derive_deref::Deref;

use crate::error::{Error, Result};
use crate::mapping;
use crate::stage2::CPP_KEYWORDS;
use crate::types::ColumnInfo;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub database: DatabaseConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub excluded_tables: Exclusions,
    #[serde(default)]
    pub excluded_stored_procedures: Exclusions,
    /// Output columns for procedures that cannot be probed, keyed by procedure name
    #[serde(default)]
    pub shape_overrides: BTreeMap<String, Vec<ColumnOverride>>,
    /// Keep generating headers after a procedure fails, and report all failures at the end
    #[serde(default)]
    pub keep_going: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub database: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    /// Directory receiving the generated headers
    pub directory: PathBuf,
    /// C++ namespace, possibly nested (`game::db`)
    pub namespace: String,
    #[serde(default = "default_migrations_directory")]
    pub migrations_directory: PathBuf,
    #[serde(default = "default_header_extension")]
    pub header_extension: String,
}

/// Names that must never produce an artifact
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Deref)]
#[serde(transparent)]
pub struct Exclusions(BTreeSet<String>);

/// One configured output column; `type` is a SQL type name such as `bigint`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnOverride {
    pub name: String,
    #[serde(rename = "type")]
    pub sql_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_port() -> u16 {
    3306
}

fn default_migrations_directory() -> PathBuf {
    PathBuf::from("db/migrations")
}

fn default_header_extension() -> String {
    "h".to_string()
}

fn default_nullable() -> bool {
    true
}

// --------------------------------------------------------------------------------------------------------------------
// Loading
// --------------------------------------------------------------------------------------------------------------------

impl Config {
    /// Read, parse and validate a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let is_ron = path.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("ron"));
        let config = if is_ron {
            Self::from_ron(&content)
        } else {
            Self::from_json(&content)
        };
        let config = config.map_err(|message| Error::config(path, message))?;
        config.validate().map_err(|message| Error::config(path, message))?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, String> {
        serde_json::from_str(json).map_err(|e| e.to_string())
    }

    pub fn from_ron(ron: &str) -> std::result::Result<Self, String> {
        ron::from_str(ron).map_err(|e| e.to_string())
    }

    /// Check the fields serde cannot check on its own
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.database.host.trim().is_empty() {
            return Err("database.host is required".into());
        }
        if self.database.port == 0 {
            return Err("database.port must be between 1 and 65535".into());
        }
        if self.database.user.trim().is_empty() {
            return Err("database.user is required".into());
        }
        if self.database.database.trim().is_empty() {
            return Err("database.database is required".into());
        }

        if self.output.directory.as_os_str().is_empty() {
            return Err("output.directory is required".into());
        }
        if self.output.migrations_directory.as_os_str().is_empty() {
            return Err("output.migrations_directory must not be empty".into());
        }
        if !is_valid_namespace(&self.output.namespace) {
            return Err(format!(
                "output.namespace `{}` is not a valid C++ namespace",
                self.output.namespace
            ));
        }
        let ext = &self.output.header_extension;
        if ext.is_empty() || ext.contains(|c: char| c == '.' || c == '/' || c == '\\' || c.is_whitespace()) {
            return Err(format!("output.header_extension `{}` is not a file extension", ext));
        }

        if self.excluded_tables.iter().any(|t| t.trim().is_empty()) {
            return Err("excluded_tables contains an empty name".into());
        }
        if self.excluded_stored_procedures.iter().any(|p| p.trim().is_empty()) {
            return Err("excluded_stored_procedures contains an empty name".into());
        }

        for (procedure, columns) in &self.shape_overrides {
            if columns.is_empty() {
                return Err(format!("shape_overrides.{} has no columns", procedure));
            }
            if columns.iter().any(|c| c.name.trim().is_empty()) {
                return Err(format!("shape_overrides.{} has a column without a name", procedure));
            }
        }

        Ok(())
    }
}

impl DatabaseConfig {
    /// Connection options for the blocking MySQL client
    pub fn opts(&self) -> mysql::OptsBuilder {
        mysql::OptsBuilder::new()
            .ip_or_hostname(Some(self.host.as_str()))
            .tcp_port(self.port)
            .user(Some(self.user.as_str()))
            .pass(Some(self.password.as_str()))
            .db_name(Some(self.database.as_str()))
    }
}

impl Exclusions {
    /// Drop every excluded name, keeping the catalog order of the rest
    pub fn retain_included(&self, names: Vec<String>) -> Vec<String> {
        names.into_iter().filter(|name| !self.contains(name)).collect()
    }
}

impl<S: Into<String>> FromIterator<S> for Exclusions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Exclusions(iter.into_iter().map(Into::into).collect())
    }
}

impl ColumnOverride {
    pub fn to_column_info(&self) -> ColumnInfo {
        ColumnInfo {
            name: self.name.clone(),
            mapped_type: mapping::from_sql_type_name(&self.sql_type).to_string(),
            nullable: self.nullable,
        }
    }
}

fn is_valid_namespace(namespace: &str) -> bool {
    !namespace.is_empty()
        && namespace
            .split("::")
            .all(|segment| is_cpp_identifier(segment) && !CPP_KEYWORDS.contains(&segment))
}

fn is_cpp_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    }
}
