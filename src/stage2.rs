use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use heck::{CamelCase, SnakeCase};
use itertools::Itertools;
use tracing::debug;

use crate::config::OutputConfig;
use crate::error::{Error, Result};
use crate::stage1::Catalog;
use crate::types::*;

const INDENT: &str = "    ";

// From https://en.cppreference.com/w/cpp/keyword, minus the alternative operator spellings
pub(crate) const CPP_KEYWORDS: [&str; 74] = [
    "alignas", "alignof", "asm", "auto", "bool", "break", "case", "catch", "char", "char8_t", "char16_t",
    "char32_t", "class", "concept", "const", "consteval", "constexpr", "constinit", "const_cast", "continue",
    "co_await", "co_return", "co_yield", "decltype", "default", "delete", "do", "double", "dynamic_cast", "else",
    "enum", "explicit", "export", "extern", "false", "float", "for", "friend", "goto", "if", "inline", "int",
    "long", "mutable", "namespace", "new", "noexcept", "nullptr", "operator", "private", "protected", "public",
    "register", "reinterpret_cast", "requires", "return", "short", "signed", "sizeof", "static",
    "static_assert", "static_cast", "struct", "switch", "template", "this", "throw", "true", "try", "typedef",
    "typename", "union", "unsigned", "void",
];

// --------------------------------------------------------------------------------------------------------------------
// Public functions
// --------------------------------------------------------------------------------------------------------------------

/// Writes one C++ header per stored procedure
#[derive(Debug, Clone)]
pub struct CodeGenerator {
    output_dir: PathBuf,
    namespace: String,
    extension: String,
}

impl CodeGenerator {
    pub fn new(output_dir: impl Into<PathBuf>, namespace: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            namespace: namespace.into(),
            extension: extension.into(),
        }
    }

    pub fn from_config(output: &OutputConfig) -> Self {
        Self::new(&output.directory, &output.namespace, &output.header_extension)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn render(&self, metadata: &SPMetadata) -> String {
        render(metadata, &self.namespace)
    }

    /// Write `<procedure>.<ext>` into the output directory, replacing any previous version
    pub fn write(&self, metadata: &SPMetadata) -> Result<PathBuf> {
        let file_name = ObjectKind::Procedure.file_name(&metadata.name, &self.extension)?;
        let code = self.render(metadata);

        std::fs::create_dir_all(&self.output_dir).map_err(|e| Error::io(&self.output_dir, e))?;

        let path = self.output_dir.join(file_name);
        std::fs::write(&path, code).map_err(|e| Error::io(&path, e))?;
        debug!("Wrote header for {} to {}", metadata.name, path.display());
        Ok(path)
    }

    /// Extract and write every procedure in order; the first failure aborts the batch
    pub fn generate_all<C: Catalog + ?Sized>(&self, catalog: &mut C, names: &[String]) -> Result<Vec<PathBuf>> {
        let mut generated = Vec::with_capacity(names.len());
        for name in names {
            let path = self.generate_one(catalog, name)?;
            generated.push(path);
        }
        Ok(generated)
    }

    /// Like `generate_all`, but every procedure gets its own outcome
    pub fn generate_each<C: Catalog + ?Sized>(&self, catalog: &mut C, names: &[String]) -> Vec<(String, Result<PathBuf>)> {
        names
            .iter()
            .map(|name| (name.clone(), self.generate_one(catalog, name)))
            .collect()
    }

    fn generate_one<C: Catalog + ?Sized>(&self, catalog: &mut C, name: &str) -> Result<PathBuf> {
        let metadata = catalog.extract_procedure_metadata(name)?;
        let path = self.write(&metadata)?;
        println!("✓ Generated: {}", path.display());
        Ok(path)
    }
}

/// Render the header for one procedure. The output depends only on the arguments.
pub fn render(metadata: &SPMetadata, namespace: &str) -> String {
    let mut lines: Vec<String> = Vec::new();

    lines.push(format!(
        "// Generated by mysql-bindgen from procedure `{}`. Do not edit.",
        metadata.name
    ));
    lines.push("#pragma once".to_string());
    lines.push(String::new());
    let includes = gen_includes(metadata);
    if !includes.is_empty() {
        lines.extend(includes.iter().map(|header| format!("#include <{}>", header)));
        lines.push(String::new());
    }
    lines.push(format!("namespace {} {{", namespace));
    lines.push(String::new());

    lines.push(format!("struct {} {{", gen_struct_name(&metadata.name)));
    lines.push(format!(
        "{}static constexpr const char* kName = \"{}\";",
        INDENT,
        escape_literal(&metadata.name)
    ));
    lines.push(format!(
        "{}static constexpr const char* kCall = \"{}\";",
        INDENT,
        escape_literal(&gen_call_statement(metadata))
    ));
    lines.push(String::new());

    // Input parameters
    let param_names = gen_field_names(metadata.input_params.iter().map(|p| p.name.as_str()));
    let params = izip!(&metadata.input_params, param_names)
        .map(|(param, field)| format!("{0}{0}{1} {2};  // {3} {4}", INDENT, param.mapped_type, field, param.mode, param.sql_type))
        .collect::<Vec<String>>();
    gen_struct_body(&mut lines, "Params", params);
    lines.push(String::new());

    // Output columns
    if metadata.shape_source == ShapeSource::Configured {
        lines.push(format!("{}// Result shape taken from configuration", INDENT));
    }
    let column_names = gen_field_names(metadata.output_columns.iter().map(|c| c.name.as_str()));
    let columns = izip!(&metadata.output_columns, column_names)
        .map(|(column, field)| format!("{0}{0}{1} {2};", INDENT, gen_column_type(column), field))
        .collect::<Vec<String>>();
    gen_struct_body(&mut lines, "Row", columns);

    lines.push("};".to_string());
    lines.push(String::new());
    lines.push(format!("}}  // namespace {}", namespace));

    let mut code = lines.join("\n");
    code.push('\n');
    code
}

// --------------------------------------------------------------------------------------------------------------------
// Private functions
// --------------------------------------------------------------------------------------------------------------------

fn gen_struct_body(lines: &mut Vec<String>, name: &str, fields: Vec<String>) {
    if fields.is_empty() {
        lines.push(format!("{}struct {} {{}};", INDENT, name));
    } else {
        lines.push(format!("{}struct {} {{", INDENT, name));
        lines.extend(fields);
        lines.push(format!("{}}};", INDENT));
    }
}

/// Standard headers needed by the mapped types, sorted
fn gen_includes(metadata: &SPMetadata) -> BTreeSet<&'static str> {
    let types = metadata
        .input_params
        .iter()
        .map(|p| p.mapped_type.as_str())
        .chain(metadata.output_columns.iter().map(|c| c.mapped_type.as_str()));

    let mut includes = BTreeSet::new();
    for typ in types {
        if typ.contains("int") {
            includes.insert("cstdint");
        }
        if typ.contains("std::string") {
            includes.insert("string");
        }
        if typ.contains("std::vector") {
            includes.insert("vector");
        }
    }
    if metadata.output_columns.iter().any(|c| c.nullable) {
        includes.insert("optional");
    }
    includes
}

fn gen_column_type(column: &ColumnInfo) -> String {
    if column.nullable {
        format!("std::optional<{}>", column.mapped_type)
    } else {
        column.mapped_type.clone()
    }
}

/// The statement a client uses to call the procedure, one `?` per IN parameter
fn gen_call_statement(metadata: &SPMetadata) -> String {
    let placeholders = metadata.input_params.iter().map(|_| "?").join(", ");
    format!("CALL `{}`({})", metadata.name.replace('`', "``"), placeholders)
}

/// Convert a procedure name to a C++ type name
///
fn gen_struct_name(name: &str) -> String {
    let camel = sanitize(&name.to_camel_case());
    if camel.is_empty() {
        "Procedure".to_string()
    } else {
        camel
    }
}

/// Convert column or parameter names to distinct C++ field names
///
fn gen_field_names<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .enumerate()
        .map(|(idx, name)| {
            let mut field = sanitize(&name.to_snake_case());
            if field.is_empty() {
                field = format!("field_{}", idx + 1);
            }
            if CPP_KEYWORDS.contains(&field.as_str()) {
                field.push('_');
            }
            let mut candidate = field.clone();
            let mut suffix = 2;
            while !seen.insert(candidate.clone()) {
                candidate = format!("{}_{}", field, suffix);
                suffix += 1;
            }
            candidate
        })
        .collect()
}

/// Keep `[A-Za-z0-9_]`, never start with a digit
fn sanitize(name: &str) -> String {
    let ident: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    let mut ident = ident.trim_matches('_').to_string();
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    ident
}

fn escape_literal(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
