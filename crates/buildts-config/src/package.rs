//! Package Descriptor (package.json)
//!
//! A read-only snapshot of a package manifest: the typed fields the build
//! needs plus the raw JSON object, kept in file order so that derived copies
//! (the distributable manifest for functions) stay faithful.

use crate::{ConfigError, ConfigResult};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Manifest file name
pub const MANIFEST_FILE: &str = "package.json";

/// Declared module system of a package (`"type"` field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModuleType {
    /// `"type": "module"`
    Module,
    /// `"type": "commonjs"` or no type field
    #[default]
    CommonJs,
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module => write!(f, "module"),
            Self::CommonJs => write!(f, "commonjs"),
        }
    }
}

/// Typed view over the fields of package.json the build reads
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageJson {
    name: Option<String>,
    #[serde(rename = "type")]
    module_type: Option<String>,
    main: Option<String>,
    module: Option<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, Value>,
    #[serde(default)]
    peer_dependencies: BTreeMap<String, Value>,
    #[serde(default)]
    optional_dependencies: BTreeMap<String, Value>,
    #[serde(default)]
    dev_dependencies: BTreeMap<String, Value>,
}

/// Package manifest snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct PackageDescriptor {
    /// Path of the package.json this was read from
    pub manifest_path: PathBuf,
    /// Package name, possibly scoped (`@namespace/name`)
    pub name: Option<String>,
    /// Declared module type
    pub module_type: ModuleType,
    /// `main` entry point
    pub main: Option<String>,
    /// `module` entry point
    pub module: Option<String>,
    /// Runtime dependency names
    pub dependencies: BTreeSet<String>,
    /// Peer dependency names
    pub peer_dependencies: BTreeSet<String>,
    /// Optional dependency names
    pub optional_dependencies: BTreeSet<String>,
    /// Development dependency names
    pub dev_dependencies: BTreeSet<String>,
    raw: Map<String, Value>,
}

impl PackageDescriptor {
    /// Read the manifest of a package.
    ///
    /// `location` is either a package directory or a path ending in
    /// `package.json`.
    pub fn read(location: &Path) -> ConfigResult<Self> {
        let manifest_path = if location.ends_with(MANIFEST_FILE) {
            location.to_path_buf()
        } else {
            location.join(MANIFEST_FILE)
        };

        let content = std::fs::read_to_string(&manifest_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(manifest_path.clone())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        Self::from_json_str(&content, manifest_path)
    }

    /// Find the nearest manifest at or above `start_dir`
    pub fn find_upward(start_dir: &Path) -> ConfigResult<Self> {
        let mut current = start_dir.to_path_buf();

        loop {
            let manifest_path = current.join(MANIFEST_FILE);
            if manifest_path.is_file() {
                return Self::read(&manifest_path);
            }

            match current.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => current = parent.to_path_buf(),
                _ => return Err(ConfigError::NotFound(start_dir.join(MANIFEST_FILE))),
            }
        }
    }

    /// Parse manifest content read from `manifest_path`
    pub fn from_json_str(content: &str, manifest_path: impl Into<PathBuf>) -> ConfigResult<Self> {
        let manifest_path = manifest_path.into();

        let raw: Map<String, Value> =
            serde_json::from_str(content).map_err(|e| ConfigError::json(&manifest_path, e))?;
        let typed: PackageJson = serde_json::from_value(Value::Object(raw.clone()))
            .map_err(|e| ConfigError::json(&manifest_path, e))?;

        let module_type = match typed.module_type.as_deref() {
            Some("module") => ModuleType::Module,
            _ => ModuleType::CommonJs,
        };

        Ok(Self {
            manifest_path,
            name: typed.name,
            module_type,
            main: typed.main,
            module: typed.module,
            dependencies: typed.dependencies.into_keys().collect(),
            peer_dependencies: typed.peer_dependencies.into_keys().collect(),
            optional_dependencies: typed.optional_dependencies.into_keys().collect(),
            dev_dependencies: typed.dev_dependencies.into_keys().collect(),
            raw,
        })
    }

    /// Directory containing the manifest
    pub fn package_dir(&self) -> &Path {
        self.manifest_path.parent().unwrap_or(Path::new("."))
    }

    /// Whether the package declares `"type": "module"`
    pub fn is_esm(&self) -> bool {
        self.module_type == ModuleType::Module
    }

    /// Namespace of a scoped name: `@scope/pkg` → `scope`
    pub fn namespace(&self) -> Option<&str> {
        self.split_scoped_name().map(|(namespace, _)| namespace)
    }

    /// Name without its scope: `@scope/pkg` → `pkg`
    pub fn name_without_namespace(&self) -> Option<&str> {
        self.split_scoped_name().map(|(_, name)| name)
    }

    fn split_scoped_name(&self) -> Option<(&str, &str)> {
        let name = self.name.as_deref()?;
        let at = name.find('@')?;
        let (namespace, rest) = name[at + 1..].split_once('/')?;
        if namespace.is_empty() || rest.is_empty() {
            return None;
        }
        Some((namespace, rest))
    }

    /// Whether `name` is a runtime dependency
    pub fn depends_on(&self, name: &str) -> bool {
        self.dependencies.contains(name)
    }

    /// Runtime, peer and optional dependency names, deduplicated and sorted
    pub fn runtime_dependency_names(&self) -> BTreeSet<String> {
        self.dependencies
            .iter()
            .chain(&self.peer_dependencies)
            .chain(&self.optional_dependencies)
            .cloned()
            .collect()
    }

    /// The raw manifest object
    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn parse(content: &str) -> PackageDescriptor {
        PackageDescriptor::from_json_str(content, "/pkg/package.json").unwrap()
    }

    #[test]
    fn test_typed_fields() {
        let pkg = parse(
            r#"{
                "name": "@scope/pkg",
                "type": "module",
                "main": "dist/index.js",
                "dependencies": { "lodash": "^4" },
                "peerDependencies": { "react": "*" },
                "optionalDependencies": { "fsevents": "*" },
                "devDependencies": { "vitest": "*" }
            }"#,
        );

        assert_eq!(pkg.name.as_deref(), Some("@scope/pkg"));
        assert!(pkg.is_esm());
        assert_eq!(pkg.main.as_deref(), Some("dist/index.js"));
        assert!(pkg.depends_on("lodash"));
        assert!(pkg.dev_dependencies.contains("vitest"));
        assert_eq!(
            pkg.runtime_dependency_names().into_iter().collect::<Vec<_>>(),
            vec!["fsevents", "lodash", "react"]
        );
        assert_eq!(pkg.package_dir(), Path::new("/pkg"));
    }

    #[test]
    fn test_default_module_type_is_commonjs() {
        assert_eq!(parse(r#"{"name":"x"}"#).module_type, ModuleType::CommonJs);
        assert_eq!(
            parse(r#"{"name":"x","type":"commonjs"}"#).module_type,
            ModuleType::CommonJs
        );
    }

    #[test]
    fn test_namespace_split() {
        let pkg = parse(r#"{"name":"@scope/pkg"}"#);
        assert_eq!(pkg.namespace(), Some("scope"));
        assert_eq!(pkg.name_without_namespace(), Some("pkg"));

        let pkg = parse(r#"{"name":"plain"}"#);
        assert_eq!(pkg.namespace(), None);
        assert_eq!(pkg.name_without_namespace(), None);
    }

    #[test]
    fn test_raw_preserves_key_order() {
        let pkg = parse(r#"{"zeta":1,"name":"x","alpha":2}"#);
        let keys: Vec<&str> = pkg.raw().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta", "name", "alpha"]);
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(matches!(
            PackageDescriptor::from_json_str("{ not json", "package.json"),
            Err(ConfigError::JsonParseError { .. })
        ));
        assert!(PackageDescriptor::from_json_str("[1,2]", "package.json").is_err());
        assert!(
            PackageDescriptor::from_json_str(r#"{"dependencies":"x"}"#, "package.json").is_err()
        );
    }

    #[test]
    fn test_read_from_dir_and_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), r#"{"name":"a"}"#).unwrap();

        let from_dir = PackageDescriptor::read(dir.path()).unwrap();
        let from_file = PackageDescriptor::read(&dir.path().join("package.json")).unwrap();
        assert_eq!(from_dir, from_file);
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            PackageDescriptor::read(dir.path()),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_find_upward() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{"name":"root","type":"module"}"#,
        )
        .unwrap();
        let nested = dir.path().join("src").join("deep");
        fs::create_dir_all(&nested).unwrap();

        let pkg = PackageDescriptor::find_upward(&nested).unwrap();
        assert_eq!(pkg.name.as_deref(), Some("root"));
        assert!(pkg.is_esm());
    }
}
