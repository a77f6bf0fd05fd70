//! Export of the current DDL as one `.sql` file per table and per procedure.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::stage1::Catalog;
use crate::types::ObjectKind;

/// Write `<table>.sql` and `<procedure>.sql` for every object that is not excluded
pub fn export_migrations<C: Catalog + ?Sized>(catalog: &mut C, config: &Config) -> Result<Vec<PathBuf>> {
    let dir = &config.output.migrations_directory;
    std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

    let mut saved = Vec::new();

    let tables = config.excluded_tables.retain_included(catalog.list_tables()?);
    debug!("Exporting {} tables", tables.len());
    for table in &tables {
        let ddl = catalog.extract_table_ddl(table)?;
        saved.push(save(dir, ObjectKind::Table, table, &ddl)?);
    }

    let procedures = config
        .excluded_stored_procedures
        .retain_included(catalog.list_procedures()?);
    debug!("Exporting {} procedures", procedures.len());
    for procedure in &procedures {
        let ddl = catalog.extract_procedure_ddl(procedure)?;
        saved.push(save(dir, ObjectKind::Procedure, procedure, &ddl)?);
    }

    Ok(saved)
}

/// The DDL is written verbatim, replacing any previous file
fn save(dir: &Path, kind: ObjectKind, name: &str, ddl: &str) -> Result<PathBuf> {
    let path = dir.join(kind.file_name(name, "sql")?);
    std::fs::write(&path, ddl).map_err(|e| Error::io(&path, e))?;
    println!("✓ Saved: {}", path.display());
    Ok(path)
}
