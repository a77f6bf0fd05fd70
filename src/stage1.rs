use std::collections::BTreeMap;

use mysql::consts::ColumnFlags;
use mysql::prelude::Queryable;
use mysql::{Column, Conn, Row, Transaction, TxOpts, Value};
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::mapping;
use crate::types::*;

/// Server error returned by SHOW CREATE TABLE for a missing table
const ER_NO_SUCH_TABLE: u16 = 1146;
/// Server error returned by SHOW CREATE PROCEDURE and CALL for a missing procedure
const ER_SP_DOES_NOT_EXIST: u16 = 1305;

// --------------------------------------------------------------------------------------------------------------------
// Catalog access
// --------------------------------------------------------------------------------------------------------------------

/// Everything the migration export and the header generator need from a database
pub trait Catalog {
    fn list_tables(&mut self) -> Result<Vec<String>>;
    fn list_procedures(&mut self) -> Result<Vec<String>>;
    fn extract_table_ddl(&mut self, table: &str) -> Result<String>;
    fn extract_procedure_ddl(&mut self, name: &str) -> Result<String>;
    fn extract_procedure_metadata(&mut self, name: &str) -> Result<SPMetadata>;
}

/// Owns the single connection used during one generator run.
///
/// Dropping the extractor closes the connection.
pub struct MetadataExtractor {
    conn: Conn,
    schema: String,
    shape_overrides: BTreeMap<String, Vec<ColumnInfo>>,
}

impl MetadataExtractor {
    /// Connect to the configured database; failures are not retried
    pub fn connect(config: &DatabaseConfig) -> Result<Self> {
        let conn = Conn::new(config.opts()).map_err(|err| Error::Connection {
            host: config.host.clone(),
            port: config.port,
            err,
        })?;
        info!("Connected to MySQL: {}:{}/{}", config.host, config.port, config.database);

        Ok(Self {
            conn,
            schema: config.database.clone(),
            shape_overrides: BTreeMap::new(),
        })
    }

    /// Use these columns instead of probing the named procedures
    pub fn with_shape_overrides(mut self, overrides: BTreeMap<String, Vec<ColumnInfo>>) -> Self {
        self.shape_overrides = overrides;
        self
    }

    pub fn disconnect(self) {
        debug!("Closing connection to schema {}", self.schema);
        drop(self.conn);
    }

    pub fn list_tables(&mut self) -> Result<Vec<String>> {
        let tables: Vec<String> = self
            .conn
            .exec(include_str!("resources/tables.sql"), (self.schema.as_str(),))?;
        debug!("Found {} tables in {}", tables.len(), self.schema);
        Ok(tables)
    }

    pub fn list_procedures(&mut self) -> Result<Vec<String>> {
        let procedures: Vec<String> = self
            .conn
            .exec(include_str!("resources/procedures.sql"), (self.schema.as_str(),))?;
        debug!("Found {} procedures in {}", procedures.len(), self.schema);
        Ok(procedures)
    }

    /// The CREATE TABLE statement, as printed by the server
    pub fn extract_table_ddl(&mut self, table: &str) -> Result<String> {
        let row: Option<Row> = self
            .conn
            .query_first(format!("SHOW CREATE TABLE {}", quote_ident(table)))
            .map_err(|err| not_found_or(err, ER_NO_SUCH_TABLE, ObjectKind::Table, table))?;

        // Columns: Table, Create Table
        row.and_then(|row| text_column(&row, 1))
            .ok_or_else(|| Error::not_found(ObjectKind::Table, table))
    }

    /// The CREATE PROCEDURE statement, as printed by the server
    pub fn extract_procedure_ddl(&mut self, name: &str) -> Result<String> {
        let row: Option<Row> = self
            .conn
            .query_first(format!("SHOW CREATE PROCEDURE {}", quote_ident(name)))
            .map_err(|err| not_found_or(err, ER_SP_DOES_NOT_EXIST, ObjectKind::Procedure, name))?;

        // Columns: Procedure, sql_mode, Create Procedure, ...
        // The body is NULL when the user lacks the privileges to read it
        row.and_then(|row| text_column(&row, 2))
            .ok_or_else(|| Error::not_found(ObjectKind::Procedure, name))
    }

    /// IN parameters of a procedure, in declaration order
    pub fn extract_procedure_parameters(&mut self, name: &str) -> Result<Vec<ParamInfo>> {
        let params = self
            .procedure_signature(name)?
            .into_iter()
            .filter(|p| p.mode == ParamMode::In)
            .collect();
        Ok(params)
    }

    /// Best-effort shape inference.
    ///
    /// The server keeps no static description of the rows a procedure returns, so the procedure is
    /// called with placeholder arguments and the column descriptors of its first result set are
    /// read back. The call runs inside a transaction that is always rolled back. A procedure that
    /// rejects the placeholders cannot be probed; configure a shape override for it instead.
    pub fn probe_output_schema(&mut self, name: &str, params: &[ParamInfo]) -> Result<Vec<ColumnInfo>> {
        let signature = self.procedure_signature(name)?;
        let call = ProbeCall::new(name, &signature, params);
        debug!("Probing {} with {}", name, call.literal);

        let mut tx = self.conn.start_transaction(TxOpts::default())?;
        let outcome = read_first_result_set(&mut tx, &call.statement, call.args);
        let rollback = tx.rollback();

        let columns = match outcome {
            Ok(columns) => columns,
            Err(err) => {
                // 1305 may come from a nested CALL inside a procedure that does exist
                let exists = server_code(&err) != Some(ER_SP_DOES_NOT_EXIST) || self.procedure_exists(name)?;
                return Err(probe_error(name, call.literal, err, exists));
            }
        };
        rollback?;

        if columns.is_empty() {
            warn!("Procedure {} returned no result set when probed", name);
        }
        Ok(columns)
    }

    pub fn extract_procedure_metadata(&mut self, name: &str) -> Result<SPMetadata> {
        let input_params = self.extract_procedure_parameters(name)?;

        let (output_columns, shape_source) = match self.shape_overrides.get(name) {
            Some(columns) => {
                info!("Using configured result shape for {}", name);
                (columns.clone(), ShapeSource::Configured)
            }
            None => (self.probe_output_schema(name, &input_params)?, ShapeSource::Probe),
        };

        Ok(SPMetadata {
            name: name.to_string(),
            input_params,
            output_columns,
            shape_source,
        })
    }

    fn procedure_exists(&mut self, name: &str) -> Result<bool> {
        Ok(self.list_procedures()?.iter().any(|p| p == name))
    }

    /// Every parameter of a procedure, whatever its mode
    fn procedure_signature(&mut self, name: &str) -> Result<Vec<ParamInfo>> {
        let rows: Vec<(Option<String>, String, String)> = self
            .conn
            .exec(include_str!("resources/parameters.sql"), (self.schema.as_str(), name))?;

        let params = rows
            .into_iter()
            .enumerate()
            .map(|(idx, (param_name, data_type, mode))| {
                let mode = ParamMode::from_catalog(&mode).unwrap_or_else(|| {
                    warn!("Unknown mode '{}' for parameter #{} of {}, assuming IN", mode, idx + 1, name);
                    ParamMode::In
                });
                ParamInfo {
                    name: param_name.unwrap_or_else(|| format!("arg{}", idx + 1)),
                    mapped_type: mapping::from_sql_type_name(&data_type).to_string(),
                    sql_type: data_type,
                    mode,
                }
            })
            .collect();
        Ok(params)
    }
}

impl Catalog for MetadataExtractor {
    fn list_tables(&mut self) -> Result<Vec<String>> {
        MetadataExtractor::list_tables(self)
    }

    fn list_procedures(&mut self) -> Result<Vec<String>> {
        MetadataExtractor::list_procedures(self)
    }

    fn extract_table_ddl(&mut self, table: &str) -> Result<String> {
        MetadataExtractor::extract_table_ddl(self, table)
    }

    fn extract_procedure_ddl(&mut self, name: &str) -> Result<String> {
        MetadataExtractor::extract_procedure_ddl(self, name)
    }

    fn extract_procedure_metadata(&mut self, name: &str) -> Result<SPMetadata> {
        MetadataExtractor::extract_procedure_metadata(self, name)
    }
}

// --------------------------------------------------------------------------------------------------------------------
// Private stuff
// --------------------------------------------------------------------------------------------------------------------

/// A CALL statement with placeholder arguments
#[derive(Debug)]
struct ProbeCall {
    /// Prepared statement text, `?` for every IN parameter
    statement: String,
    /// The same call with the bound values spelled out, for logs and error messages
    literal: String,
    args: Vec<Value>,
}

impl ProbeCall {
    /// OUT and INOUT positions are bound to session variables, IN positions get placeholder values.
    /// `inputs` are the IN parameters in order; missing ones fall back to the signature.
    fn new(name: &str, signature: &[ParamInfo], inputs: &[ParamInfo]) -> Self {
        let mut inputs = inputs.iter();
        let mut placeholders = Vec::with_capacity(signature.len());
        let mut literals = Vec::with_capacity(signature.len());
        let mut args = Vec::new();

        for (idx, param) in signature.iter().enumerate() {
            match param.mode {
                ParamMode::In => {
                    let input = inputs.next().unwrap_or(param);
                    let value = mapping::default_value_for_mapped_type(&input.mapped_type);
                    placeholders.push("?".to_string());
                    literals.push(value.to_sql_literal());
                    args.push(to_mysql_value(value));
                }
                ParamMode::Out | ParamMode::InOut => {
                    let variable = format!("@__bindgen_arg_{}", idx + 1);
                    placeholders.push(variable.clone());
                    literals.push(variable);
                }
            }
        }

        let target = quote_ident(name);
        Self {
            statement: format!("CALL {}({})", target, placeholders.join(", ")),
            literal: format!("CALL {}({})", target, literals.join(", ")),
            args,
        }
    }
}

/// Read the column descriptors of the first result set, then drain every result set
fn read_first_result_set(tx: &mut Transaction<'_>, statement: &str, args: Vec<Value>) -> mysql::Result<Vec<ColumnInfo>> {
    let mut result = tx.exec_iter(statement, args)?;

    let mut columns = Vec::new();
    if let Some(set) = result.iter() {
        columns = set.columns().as_ref().iter().map(column_info).collect();
        for row in set {
            row?;
        }
    }
    while let Some(set) = result.iter() {
        for row in set {
            row?;
        }
    }

    Ok(columns)
}

fn column_info(column: &Column) -> ColumnInfo {
    ColumnInfo {
        name: column.name_str().into_owned(),
        mapped_type: mapping::from_wire_type_code(column.column_type() as u8).to_string(),
        nullable: !column.flags().contains(ColumnFlags::NOT_NULL_FLAG),
    }
}

fn to_mysql_value(value: DefaultValue) -> Value {
    match value {
        DefaultValue::Int(i) => Value::Int(i),
        DefaultValue::Float(f) => Value::Double(f),
        DefaultValue::Text(s) => Value::Bytes(s.into_bytes()),
        DefaultValue::Bytes(b) => Value::Bytes(b),
        DefaultValue::Null => Value::NULL,
    }
}

/// Non-NULL text column of a SHOW CREATE row
fn text_column(row: &Row, idx: usize) -> Option<String> {
    row.get_opt::<Option<String>, _>(idx).and_then(|value| value.ok()).flatten()
}

fn server_code(err: &mysql::Error) -> Option<u16> {
    match err {
        mysql::Error::MySqlError(e) => Some(e.code),
        _ => None,
    }
}

/// A failed probe call is NotFound only when the probed procedure itself is gone
fn probe_error(procedure: &str, statement: String, err: mysql::Error, exists: bool) -> Error {
    if !exists && server_code(&err) == Some(ER_SP_DOES_NOT_EXIST) {
        return Error::not_found(ObjectKind::Procedure, procedure);
    }
    Error::Probe {
        procedure: procedure.to_string(),
        statement,
        err,
    }
}

/// Turn the server's "no such object" error into NotFound
fn not_found_or(err: mysql::Error, code: u16, kind: ObjectKind, name: &str) -> Error {
    match err {
        mysql::Error::MySqlError(ref e) if e.code == code => Error::not_found(kind, name),
        err => Error::Query(err),
    }
}

/// Quote a MySQL identifier
fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mysql::consts::ColumnType;

    fn param(name: &str, sql_type: &str, mode: ParamMode) -> ParamInfo {
        ParamInfo {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            mapped_type: mapping::from_sql_type_name(sql_type).to_string(),
            mode,
        }
    }

    #[test]
    fn identifiers_are_backtick_quoted() {
        assert_eq!(quote_ident("get_user"), "`get_user`");
        assert_eq!(quote_ident("odd`name"), "`odd``name`");
    }

    #[test]
    fn probe_call_without_parameters() {
        let call = ProbeCall::new("list_items", &[], &[]);
        assert_eq!(call.statement, "CALL `list_items`()");
        assert_eq!(call.literal, "CALL `list_items`()");
        assert!(call.args.is_empty());
    }

    fn missing_procedure_error(name: &str) -> mysql::Error {
        mysql::Error::MySqlError(mysql::MySqlError {
            state: "42000".to_string(),
            message: format!("PROCEDURE game.{} does not exist", name),
            code: ER_SP_DOES_NOT_EXIST,
        })
    }

    #[test]
    fn probe_call_binds_placeholders_per_input() {
        let signature = vec![
            param("user_id", "int", ParamMode::In),
            param("nickname", "varchar", ParamMode::In),
            param("since", "datetime", ParamMode::In),
            param("avatar", "blob", ParamMode::In),
        ];
        let call = ProbeCall::new("find_users", &signature, &signature);
        assert_eq!(call.statement, "CALL `find_users`(?, ?, ?, ?)");
        assert_eq!(call.literal, "CALL `find_users`(0, '', '', '')");
        assert_eq!(
            call.args,
            vec![
                Value::Int(0),
                Value::Bytes(Vec::new()),
                Value::Bytes(Vec::new()),
                Value::Bytes(Vec::new()),
            ]
        );
    }

    #[test]
    fn reported_call_spells_out_the_bound_values() {
        let signature = vec![
            param("since", "datetime", ParamMode::In),
            param("doc", "json", ParamMode::In),
            param("ratio", "double", ParamMode::In),
        ];
        let call = ProbeCall::new("p", &signature, &signature);

        let bound: Vec<String> = signature
            .iter()
            .map(|p| mapping::default_value_for_mapped_type(&p.mapped_type).to_sql_literal())
            .collect();
        assert_eq!(call.literal, format!("CALL `p`({})", bound.join(", ")));
        assert_eq!(call.literal, "CALL `p`('', '', 0.0)");
        assert_eq!(call.args, vec![Value::Bytes(Vec::new()), Value::Bytes(Vec::new()), Value::Double(0.0)]);
    }

    #[test]
    fn missing_probed_procedure_is_not_found() {
        let err = probe_error("gone", "CALL `gone`()".to_string(), missing_procedure_error("gone"), false);
        assert!(matches!(err, Error::NotFound { kind: ObjectKind::Procedure, ref name } if name == "gone"));
    }

    #[test]
    fn missing_nested_procedure_fails_the_call() {
        let err = probe_error("outer", "CALL `outer`()".to_string(), missing_procedure_error("inner"), true);
        match err {
            Error::Probe { procedure, statement, .. } => {
                assert_eq!(procedure, "outer");
                assert_eq!(statement, "CALL `outer`()");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn other_server_errors_fail_the_call() {
        let err = mysql::Error::MySqlError(mysql::MySqlError {
            state: "45000".to_string(),
            message: "amount must be positive".to_string(),
            code: 1644,
        });
        assert_eq!(server_code(&err), Some(1644));
        assert!(matches!(probe_error("charge", "CALL `charge`(0)".to_string(), err, true), Error::Probe { .. }));
    }

    #[test]
    fn descriptors_map_type_and_nullability() {
        let id = Column::new(ColumnType::MYSQL_TYPE_LONGLONG)
            .with_name(b"id")
            .with_flags(ColumnFlags::NOT_NULL_FLAG | ColumnFlags::PRI_KEY_FLAG);
        let name = Column::new(ColumnType::MYSQL_TYPE_VAR_STRING).with_name(b"name");
        let score = Column::new(ColumnType::MYSQL_TYPE_NEWDECIMAL).with_name(b"score");

        assert_eq!(
            column_info(&id),
            ColumnInfo {
                name: "id".to_string(),
                mapped_type: "int64_t".to_string(),
                nullable: false,
            }
        );
        assert_eq!(
            column_info(&name),
            ColumnInfo {
                name: "name".to_string(),
                mapped_type: "std::string".to_string(),
                nullable: true,
            }
        );
        assert_eq!(column_info(&score).mapped_type, "double");
    }

    #[test]
    fn probe_call_routes_output_parameters_to_session_variables() {
        let signature = vec![
            param("amount", "decimal", ParamMode::In),
            param("balance", "decimal", ParamMode::Out),
            param("counter", "int", ParamMode::InOut),
        ];
        let inputs: Vec<ParamInfo> = signature.iter().filter(|p| p.mode == ParamMode::In).cloned().collect();
        let call = ProbeCall::new("charge", &signature, &inputs);
        assert_eq!(call.statement, "CALL `charge`(?, @__bindgen_arg_2, @__bindgen_arg_3)");
        assert_eq!(call.literal, "CALL `charge`(0.0, @__bindgen_arg_2, @__bindgen_arg_3)");
        assert_eq!(call.args, vec![Value::Double(0.0)]);
    }

    #[test]
    fn placeholder_values_follow_the_mapped_type() {
        assert_eq!(to_mysql_value(DefaultValue::Int(0)), Value::Int(0));
        assert_eq!(to_mysql_value(DefaultValue::Float(0.0)), Value::Double(0.0));
        assert_eq!(to_mysql_value(DefaultValue::Text(String::new())), Value::Bytes(Vec::new()));
        assert_eq!(to_mysql_value(DefaultValue::Null), Value::NULL);
    }
}
