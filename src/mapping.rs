//! Translation tables from MySQL types to C++ types.
//!
//! Everything here is pure: unknown inputs fall back to `std::string`.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::types::DefaultValue;

pub const STRING: &str = "std::string";
pub const BYTES: &str = "std::vector<uint8_t>";

const EMPTY_STRING_LITERAL: &str = "''";

#[derive(Debug, Deserialize)]
struct TypeTables {
    sql_types: BTreeMap<String, String>,
    default_literals: BTreeMap<String, String>,
}

static TABLES: LazyLock<TypeTables> =
    LazyLock::new(|| ron::from_str(include_str!("resources/mapping.ron")).expect("embedded mapping.ron is malformed"));

// --------------------------------------------------------------------------------------------------------------------
// Public functions
// --------------------------------------------------------------------------------------------------------------------

/// Map a column type code from a result set descriptor
/// https://dev.mysql.com/doc/dev/mysql-server/latest/field__types_8h.html
///
pub fn from_wire_type_code(code: u8) -> &'static str {
    match code {
        0 => "double",     // DECIMAL
        1 => "int8_t",     // TINY
        2 => "int16_t",    // SHORT
        3 => "int32_t",    // LONG
        4 => "float",      // FLOAT
        5 => "double",     // DOUBLE
        7 => STRING,       // TIMESTAMP
        8 => "int64_t",    // LONGLONG
        9 => "int32_t",    // INT24
        10 => STRING,      // DATE
        11 => STRING,      // TIME
        12 => STRING,      // DATETIME
        13 => "int16_t",   // YEAR
        15 => STRING,      // VARCHAR
        16 => "int8_t",    // BIT
        245 => STRING,     // JSON
        246 => "double",   // NEWDECIMAL
        247 => STRING,     // ENUM
        248 => STRING,     // SET
        249..=252 => STRING, // TINY_BLOB, MEDIUM_BLOB, LONG_BLOB, BLOB
        253 => STRING,     // VAR_STRING
        254 => STRING,     // STRING
        _ => STRING,
    }
}

/// Map a declared SQL type such as `VARCHAR(255)` or `int`
pub fn from_sql_type_name(name: &str) -> &'static str {
    TABLES
        .sql_types
        .get(&normalize(name))
        .map(String::as_str)
        .unwrap_or(STRING)
}

/// SQL literal usable as a placeholder argument of the given SQL type
pub fn default_literal_for_sql_type(name: &str) -> &'static str {
    TABLES
        .default_literals
        .get(&normalize(name))
        .map(String::as_str)
        .unwrap_or(EMPTY_STRING_LITERAL)
}

/// Runtime placeholder value for an already mapped C++ type
///
/// `std::vector<uint8_t>` contains `int`, so byte sequences are matched first.
pub fn default_value_for_mapped_type(mapped_type: &str) -> DefaultValue {
    if mapped_type.contains("vector") {
        DefaultValue::Bytes(Vec::new())
    } else if mapped_type.contains("int") {
        DefaultValue::Int(0)
    } else if mapped_type.contains("float") || mapped_type.contains("double") {
        DefaultValue::Float(0.0)
    } else if mapped_type.contains("string") {
        DefaultValue::Text(String::new())
    } else {
        DefaultValue::Null
    }
}

// --------------------------------------------------------------------------------------------------------------------
// Private functions
// --------------------------------------------------------------------------------------------------------------------

/// Lowercase and strip the length/precision qualifier: `VARCHAR(255)` -> `varchar`
fn normalize(name: &str) -> String {
    let base = match name.find('(') {
        Some(idx) => &name[..idx],
        None => name,
    };
    base.trim().to_lowercase()
}
