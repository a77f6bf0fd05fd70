//! In-memory catalog for tests that do not need a server.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::stage1::Catalog;
use crate::types::*;

#[derive(Debug, Default)]
pub struct FakeCatalog {
    tables: BTreeMap<String, String>,
    procedures: BTreeMap<String, SPMetadata>,
    /// Listed procedures whose probe call fails
    rejecting: BTreeSet<String>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: &str) -> Self {
        let ddl = format!("CREATE TABLE `{}` (\n  `id` bigint NOT NULL,\n  PRIMARY KEY (`id`)\n) ENGINE=InnoDB", name);
        self.tables.insert(name.to_string(), ddl);
        self
    }

    pub fn with_procedure(mut self, metadata: SPMetadata) -> Self {
        self.procedures.insert(metadata.name.clone(), metadata);
        self
    }

    pub fn with_rejecting_procedure(mut self, name: &str) -> Self {
        self.rejecting.insert(name.to_string());
        self
    }

    pub fn empty_procedure(name: &str) -> SPMetadata {
        SPMetadata {
            name: name.to_string(),
            input_params: Vec::new(),
            output_columns: Vec::new(),
            shape_source: ShapeSource::Probe,
        }
    }
}

impl Catalog for FakeCatalog {
    fn list_tables(&mut self) -> Result<Vec<String>> {
        Ok(self.tables.keys().cloned().collect())
    }

    fn list_procedures(&mut self) -> Result<Vec<String>> {
        let names: BTreeSet<String> = self.procedures.keys().chain(self.rejecting.iter()).cloned().collect();
        Ok(names.into_iter().collect())
    }

    fn extract_table_ddl(&mut self, table: &str) -> Result<String> {
        self.tables
            .get(table)
            .cloned()
            .ok_or_else(|| Error::not_found(ObjectKind::Table, table))
    }

    fn extract_procedure_ddl(&mut self, name: &str) -> Result<String> {
        if self.procedures.contains_key(name) || self.rejecting.contains(name) {
            Ok(format!("CREATE DEFINER=`root`@`%` PROCEDURE `{}`()\nBEGIN\nEND", name))
        } else {
            Err(Error::not_found(ObjectKind::Procedure, name))
        }
    }

    fn extract_procedure_metadata(&mut self, name: &str) -> Result<SPMetadata> {
        if self.rejecting.contains(name) {
            return Err(Error::Probe {
                procedure: name.to_string(),
                statement: format!("CALL `{}`(0)", name),
                err: mysql::Error::MySqlError(mysql::MySqlError {
                    state: "45000".to_string(),
                    message: "amount must be positive".to_string(),
                    code: 1644,
                }),
            });
        }
        self.procedures
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(ObjectKind::Procedure, name))
    }
}
