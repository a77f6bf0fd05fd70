use std::fmt;

use crate::error::{Error, Result};

// --------------------------------------------------------------------------------------------------------------------
// Stored procedure metadata
// --------------------------------------------------------------------------------------------------------------------

/// One column of the first result set returned by a stored procedure
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    pub mapped_type: String,
    pub nullable: bool,
}

/// One declared parameter of a stored procedure
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ParamInfo {
    pub name: String,
    /// DATA_TYPE as declared in the catalog, e.g. `varchar`
    pub sql_type: String,
    pub mapped_type: String,
    pub mode: ParamMode,
}

/// Parameter mode, as found in INFORMATION_SCHEMA.PARAMETERS.PARAMETER_MODE
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Copy, Clone)]
pub enum ParamMode {
    In,
    Out,
    InOut,
}

/// Where the output columns of a procedure came from
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Copy, Clone)]
pub enum ShapeSource {
    /// Inferred by calling the procedure inside a rolled back transaction
    Probe,
    /// Taken verbatim from the `shape_overrides` section of the configuration
    Configured,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SPMetadata {
    pub name: String,
    pub input_params: Vec<ParamInfo>,
    pub output_columns: Vec<ColumnInfo>,
    pub shape_source: ShapeSource,
}

// --------------------------------------------------------------------------------------------------------------------
// Helper types
// --------------------------------------------------------------------------------------------------------------------

/// Placeholder value bound to a procedure argument during a probe call
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Null,
}

/// Kind of schema object, used when reporting missing objects
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum ObjectKind {
    Table,
    Procedure,
}

impl ParamMode {
    /// Parse the PARAMETER_MODE column; anything unknown is rejected
    pub fn from_catalog(mode: &str) -> Option<Self> {
        match mode.trim().to_ascii_uppercase().as_str() {
            "IN" => Some(ParamMode::In),
            "OUT" => Some(ParamMode::Out),
            "INOUT" => Some(ParamMode::InOut),
            _ => None,
        }
    }
}

impl DefaultValue {
    /// The value as it would be typed in a SQL statement
    pub fn to_sql_literal(&self) -> String {
        match self {
            DefaultValue::Int(i) => i.to_string(),
            DefaultValue::Float(f) => format!("{:?}", f),
            DefaultValue::Text(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''")),
            DefaultValue::Bytes(b) if b.is_empty() => "''".to_string(),
            DefaultValue::Bytes(b) => format!("X'{}'", b.iter().map(|byte| format!("{:02X}", byte)).collect::<String>()),
            DefaultValue::Null => "NULL".to_string(),
        }
    }
}

impl ObjectKind {
    /// File name for an object's artifact, refusing names that would escape the output directory
    pub fn file_name(self, name: &str, extension: &str) -> Result<String> {
        let unusable = name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(|c: char| c == '/' || c == '\\' || c == '\0');
        if unusable {
            return Err(Error::InvalidFileName {
                kind: self,
                name: name.to_string(),
            });
        }
        Ok(format!("{}.{}", name, extension))
    }
}

impl fmt::Display for ParamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamMode::In => f.write_str("IN"),
            ParamMode::Out => f.write_str("OUT"),
            ParamMode::InOut => f.write_str("INOUT"),
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Table => f.write_str("table"),
            ObjectKind::Procedure => f.write_str("procedure"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_modes_parse_case_insensitively() {
        assert_eq!(ParamMode::from_catalog("IN"), Some(ParamMode::In));
        assert_eq!(ParamMode::from_catalog("out"), Some(ParamMode::Out));
        assert_eq!(ParamMode::from_catalog(" InOut "), Some(ParamMode::InOut));
        assert_eq!(ParamMode::from_catalog(""), None);
        assert_eq!(ParamMode::from_catalog("VARIADIC"), None);
    }

    #[test]
    fn placeholder_values_render_as_sql_literals() {
        assert_eq!(DefaultValue::Int(0).to_sql_literal(), "0");
        assert_eq!(DefaultValue::Float(0.0).to_sql_literal(), "0.0");
        assert_eq!(DefaultValue::Float(2.5).to_sql_literal(), "2.5");
        assert_eq!(DefaultValue::Text(String::new()).to_sql_literal(), "''");
        assert_eq!(DefaultValue::Text("it's".to_string()).to_sql_literal(), "'it''s'");
        assert_eq!(DefaultValue::Bytes(Vec::new()).to_sql_literal(), "''");
        assert_eq!(DefaultValue::Bytes(vec![0x0a, 0xff]).to_sql_literal(), "X'0AFF'");
        assert_eq!(DefaultValue::Null.to_sql_literal(), "NULL");
    }

    #[test]
    fn object_names_become_file_names() {
        assert_eq!(ObjectKind::Table.file_name("users", "sql").unwrap(), "users.sql");
        assert_eq!(ObjectKind::Procedure.file_name("get user", "h").unwrap(), "get user.h");
    }

    #[test]
    fn names_with_path_separators_are_not_file_names() {
        for name in ["a/b", "..", ".", "", "..\\evil", "nul\0byte"] {
            match ObjectKind::Table.file_name(name, "sql") {
                Err(Error::InvalidFileName { kind, name: rejected }) => {
                    assert_eq!(kind, ObjectKind::Table);
                    assert_eq!(rejected, name);
                }
                other => panic!("{:?} was accepted: {:?}", name, other),
            }
        }
    }

    #[test]
    fn param_modes_display_as_sql_keywords() {
        assert_eq!(ParamMode::In.to_string(), "IN");
        assert_eq!(ParamMode::InOut.to_string(), "INOUT");
        assert_eq!(ObjectKind::Procedure.to_string(), "procedure");
    }
}
