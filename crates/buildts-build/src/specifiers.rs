//! Relative import rewriting for preserved module trees
//!
//! Modules of a preserved tree are bundled one by one with relative imports
//! left external, so `./util` in the source still reads `./util` in the
//! output while the sibling was emitted as `util.cjs` or `util.mjs`. This
//! pass points every such specifier at the emitted file.

use crate::error::{BuildError, BuildResult};
use regex::{Captures, Regex};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// `from "./x"`, `import "./x"`, `import("./x")`, `require("./x")`, `export * from "./x"`
const SPECIFIER_PATTERN: &str =
    r#"(\bfrom\s*|\bimport\s*\(?\s*|\brequire\s*\(\s*)(["'])(\.{1,2}/[^"'\n]*)(["'])"#;

/// Source extensions a specifier may carry that are not emitted as such
const SOURCE_EXTENSIONS: [&str; 4] = [".js", ".ts", ".tsx", ".jsx"];

/// Rewrite relative specifiers of every `.{extension}` file under `dir`.
/// Returns the number of files changed.
pub fn rewrite_relative_specifiers(dir: &Path, extension: &str) -> BuildResult<usize> {
    let pattern = Regex::new(SPECIFIER_PATTERN)?;
    let mut changed = 0;

    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().and_then(|e| e.to_str()) != Some(extension)
        {
            continue;
        }
        let Some(module_dir) = path.parent() else {
            continue;
        };

        let content = fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;
        let rewritten = pattern.replace_all(&content, |caps: &Captures| {
            let specifier = &caps[3];
            match resolve_emitted(module_dir, specifier, extension) {
                Some(target) => format!("{}{}{}{}", &caps[1], &caps[2], target, &caps[4]),
                None => caps[0].to_string(),
            }
        });

        if rewritten != content {
            fs::write(path, rewritten.as_bytes()).map_err(|e| BuildError::io(path, e))?;
            changed += 1;
        }
    }

    tracing::debug!(dir = %dir.display(), files = changed, "rewrote relative specifiers");
    Ok(changed)
}

/// The emitted file a relative specifier refers to, if it differs from the
/// specifier as written
fn resolve_emitted(module_dir: &Path, specifier: &str, extension: &str) -> Option<String> {
    if module_dir.join(specifier).is_file() {
        return None;
    }

    let stem = SOURCE_EXTENSIONS
        .iter()
        .find_map(|ext| specifier.strip_suffix(ext))
        .unwrap_or(specifier);
    let file = format!("{stem}.{extension}");
    if module_dir.join(&file).is_file() {
        return Some(file);
    }

    let index = format!("{}/index.{extension}", specifier.trim_end_matches('/'));
    module_dir.join(&index).is_file().then_some(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn tree(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        dir
    }

    #[test]
    fn test_esm_siblings_resolve() {
        let dir = tree(&[
            (
                "index.mjs",
                "import { pad } from \"./util\";\nexport * from './components';\nimport React from \"react\";\nconst lazy = () => import(\"./lazy.js\");\n",
            ),
            ("util.mjs", "export const pad = 1;\n"),
            ("lazy.mjs", ""),
            ("components/index.mjs", "export { Button } from \"../util\";\n"),
        ]);

        assert_eq!(rewrite_relative_specifiers(dir.path(), "mjs").unwrap(), 2);
        assert_eq!(
            fs::read_to_string(dir.path().join("index.mjs")).unwrap(),
            "import { pad } from \"./util.mjs\";\nexport * from './components/index.mjs';\nimport React from \"react\";\nconst lazy = () => import(\"./lazy.mjs\");\n"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("components/index.mjs")).unwrap(),
            "export { Button } from \"../util.mjs\";\n"
        );
    }

    #[test]
    fn test_cjs_requires_resolve() {
        let dir = tree(&[
            ("index.cjs", "var util = require(\"./util\");\nvar fs = require(\"fs\");\n"),
            ("util.cjs", ""),
        ]);

        rewrite_relative_specifiers(dir.path(), "cjs").unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("index.cjs")).unwrap(),
            "var util = require(\"./util.cjs\");\nvar fs = require(\"fs\");\n"
        );
    }

    #[test]
    fn test_existing_and_unknown_targets_untouched() {
        let content = "import data from \"./data.json\";\nimport x from \"./missing\";\n";
        let dir = tree(&[("index.js", content), ("data.json", "{}")]);

        assert_eq!(rewrite_relative_specifiers(dir.path(), "js").unwrap(), 0);
        assert_eq!(fs::read_to_string(dir.path().join("index.js")).unwrap(), content);
    }
}
