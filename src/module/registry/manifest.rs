//! Module manifest parsing
//!
//! Reads the main section of an archive's `META-INF/MANIFEST.MF` into
//! [`ModuleMetadata`] and extracts the few headers the registry cares about.
//! Nothing beyond the declared headers is interpreted.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::module::traits::{ModuleError, ModuleMetadata};

/// Manifest location inside a module archive
pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

pub const SYMBOLIC_NAME_HEADER: &str = "Bundle-SymbolicName";
pub const VERSION_HEADER: &str = "Bundle-Version";
pub const FRAGMENT_HOST_HEADER: &str = "Fragment-Host";
pub const REQUIRE_BUNDLE_HEADER: &str = "Require-Bundle";

const DEFAULT_VERSION: &str = "0.0.0";

/// Parse the main section of a manifest
///
/// Headers are `Name: value` lines; a line starting with a single space
/// continues the previous value. The main section ends at the first blank
/// line after at least one header.
pub fn parse_headers(contents: &str) -> Result<ModuleMetadata, ModuleError> {
    let mut entries: Vec<(String, String)> = Vec::new();

    for (index, raw) in contents.lines().enumerate() {
        let line = raw.strip_suffix('\r').unwrap_or(raw);

        if line.is_empty() {
            if entries.is_empty() {
                continue;
            }
            break;
        }

        if let Some(continuation) = line.strip_prefix(' ') {
            match entries.last_mut() {
                Some((_, value)) => value.push_str(continuation),
                None => {
                    return Err(ModuleError::InvalidManifest(format!(
                        "line {}: continuation without a preceding header",
                        index + 1
                    )))
                }
            }
            continue;
        }

        let (name, value) = line.split_once(':').ok_or_else(|| {
            ModuleError::InvalidManifest(format!("line {}: expected 'Name: value'", index + 1))
        })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ModuleError::InvalidManifest(format!(
                "line {}: empty header name",
                index + 1
            )));
        }
        let value = value.strip_prefix(' ').unwrap_or(value);
        entries.push((name.to_string(), value.to_string()));
    }

    Ok(entries.into_iter().collect())
}

/// Split a header value into clauses at commas outside double quotes
pub fn split_clauses(value: &str) -> Vec<&str> {
    let mut clauses = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;

    for (i, c) in value.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                clauses.push(value[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    clauses.push(value[start..].trim());
    clauses.retain(|clause| !clause.is_empty());
    clauses
}

/// Target name of a clause, i.e. everything before the first `;`
pub fn clause_target(clause: &str) -> &str {
    clause.split(';').next().unwrap_or_default().trim()
}

/// A `Require-Bundle` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub symbolic_name: String,
    pub optional: bool,
}

impl Requirement {
    fn parse(clause: &str) -> Self {
        let optional = clause.split(';').skip(1).any(|param| {
            let compact: String = param
                .chars()
                .filter(|c| !c.is_whitespace() && *c != '"')
                .collect();
            compact.eq_ignore_ascii_case("resolution:=optional")
        });

        Self {
            symbolic_name: clause_target(clause).to_string(),
            optional,
        }
    }
}

/// Registry-relevant view of a module manifest
#[derive(Debug, Clone)]
pub struct ModuleManifest {
    pub symbolic_name: String,
    pub version: String,
    /// Symbolic name of the host module, if this is a fragment
    pub fragment_host: Option<String>,
    pub requirements: Vec<Requirement>,
    headers: ModuleMetadata,
}

impl ModuleManifest {
    /// Minimal standalone manifest with just an identity
    pub fn new(symbolic_name: impl Into<String>, version: impl Into<String>) -> Self {
        let symbolic_name = symbolic_name.into();
        let version = version.into();
        let headers: ModuleMetadata = [
            (SYMBOLIC_NAME_HEADER, symbolic_name.as_str()),
            (VERSION_HEADER, version.as_str()),
        ]
        .into_iter()
        .collect();

        Self {
            symbolic_name,
            version,
            fragment_host: None,
            requirements: Vec::new(),
            headers,
        }
    }

    /// Build from parsed headers
    pub fn from_headers(headers: ModuleMetadata) -> Result<Self, ModuleError> {
        let symbolic_name = headers
            .header(SYMBOLIC_NAME_HEADER)
            .map(clause_target)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                ModuleError::InvalidManifest(format!("missing {}", SYMBOLIC_NAME_HEADER))
            })?
            .to_string();

        let version = headers
            .header(VERSION_HEADER)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_VERSION)
            .to_string();

        let fragment_host = headers
            .header(FRAGMENT_HOST_HEADER)
            .map(clause_target)
            .map(str::to_string);

        let requirements = headers
            .header(REQUIRE_BUNDLE_HEADER)
            .map(|value| split_clauses(value).into_iter().map(Requirement::parse).collect())
            .unwrap_or_default();

        Ok(Self {
            symbolic_name,
            version,
            fragment_host,
            requirements,
            headers,
        })
    }

    /// Parse manifest text
    pub fn parse(contents: &str) -> Result<Self, ModuleError> {
        Self::from_headers(parse_headers(contents)?)
    }

    /// Read the manifest out of a zip-based archive
    pub fn from_archive<P: AsRef<Path>>(path: P) -> Result<Self, ModuleError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| {
            ModuleError::InvalidManifest(format!("{} is not a readable archive: {}", path.display(), e))
        })?;

        let mut entry = archive.by_name(MANIFEST_PATH).map_err(|e| {
            ModuleError::InvalidManifest(format!(
                "{} has no {}: {}",
                path.display(),
                MANIFEST_PATH,
                e
            ))
        })?;

        let mut contents = String::new();
        entry.read_to_string(&mut contents)?;
        Self::parse(&contents)
    }

    pub fn headers(&self) -> &ModuleMetadata {
        &self.headers
    }

    pub fn is_fragment(&self) -> bool {
        self.fragment_host.is_some()
    }

    /// Symbolic names that must be resolved before this module can resolve
    pub fn mandatory_dependencies(&self) -> impl Iterator<Item = &str> {
        self.fragment_host.as_deref().into_iter().chain(
            self.requirements
                .iter()
                .filter(|r| !r.optional)
                .map(|r| r.symbolic_name.as_str()),
        )
    }
}
