//! Exports the DDL of a MySQL schema as migration files and generates a C++ header
//! describing the parameters and result rows of every stored procedure.

#[macro_use]
extern crate itertools;

#[macro_use]
extern crate serde;

pub mod config;
pub mod error;
pub mod mapping;
pub mod migrations;
pub mod stage1;
pub mod stage2;
pub mod types;

#[cfg(test)]
mod testing;

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{error, info};

pub use config::Config;
pub use error::{Error, Result};
pub use stage1::{Catalog, MetadataExtractor};
pub use stage2::CodeGenerator;
pub use types::*;

/// Files written by one run
#[derive(Debug, Default, PartialEq)]
pub struct Summary {
    pub migrations: Vec<PathBuf>,
    pub headers: Vec<PathBuf>,
}

// Run the whole export over a single connection
pub fn run(config: &Config) -> Result<Summary> {
    let overrides: BTreeMap<String, Vec<ColumnInfo>> = config
        .shape_overrides
        .iter()
        .map(|(name, columns)| (name.clone(), columns.iter().map(|c| c.to_column_info()).collect()))
        .collect();

    let mut extractor = MetadataExtractor::connect(&config.database)?.with_shape_overrides(overrides);
    let summary = run_with(&mut extractor, config);
    extractor.disconnect();
    summary
}

/// Export migrations, then generate the headers, from any catalog
pub fn run_with<C: Catalog + ?Sized>(catalog: &mut C, config: &Config) -> Result<Summary> {
    println!("\n=== Extracting migration files ===");
    let migrations = migrations::export_migrations(catalog, config)?;

    println!("\n=== Generating C++ headers ===");
    let generator = CodeGenerator::from_config(&config.output);
    let procedures = config
        .excluded_stored_procedures
        .retain_included(catalog.list_procedures()?);

    let headers = if config.keep_going {
        let mut headers = Vec::new();
        let mut failed = Vec::new();
        for (name, outcome) in generator.generate_each(catalog, &procedures) {
            match outcome {
                Ok(path) => headers.push(path),
                Err(e) => {
                    error!("{}", e);
                    failed.push(name);
                }
            }
        }
        if !failed.is_empty() {
            return Err(Error::Batch { failed });
        }
        headers
    } else {
        generator.generate_all(catalog, &procedures)?
    };

    info!("Wrote {} migrations and {} headers", migrations.len(), headers.len());
    println!("\n✅ All done!");
    Ok(Summary { migrations, headers })
}
