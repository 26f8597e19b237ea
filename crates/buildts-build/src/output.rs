//! Output plan derivation
//!
//! Decides which artifacts a build writes: their module formats, locations,
//! file naming and whether the module tree is preserved.
//!
//! Applications and functions always produce a single artifact derived from
//! the manifest's `main` entry. Libraries produce a CommonJS tree under
//! `dist/cjs` and/or an ES module tree under `dist/esm`.

use crate::error::{BuildError, BuildResult};
use crate::targets::TargetDetail;
use buildts_config::{DeploymentDescriptor, PackageDescriptor};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Root directory of generated output inside a package
pub const DIST_DIR: &str = "dist";

/// Module system of an emitted artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleFormat {
    CommonJs,
    Esm,
}

impl ModuleFormat {
    /// Extension that names the format regardless of package type
    pub fn explicit_extension(&self) -> &'static str {
        match self {
            Self::CommonJs => "cjs",
            Self::Esm => "mjs",
        }
    }

    /// File extension under the given policy
    pub fn extension(&self, policy: Option<JsExtension>, is_esm_package: bool) -> &'static str {
        match policy {
            Some(JsExtension::Both) => "js",
            Some(JsExtension::Either) if (*self == Self::Esm) == is_esm_package => "js",
            _ => self.explicit_extension(),
        }
    }
}

impl fmt::Display for ModuleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommonJs => write!(f, "commonjs"),
            Self::Esm => write!(f, "module"),
        }
    }
}

/// `--module-type` selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleTypeSelector {
    Cjs,
    Esm,
    /// One format, matching the package's declared type
    Either,
    /// Both formats
    Both,
}

impl ModuleTypeSelector {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cjs => "cjs",
            Self::Esm => "esm",
            Self::Either => "either",
            Self::Both => "both",
        }
    }
}

impl fmt::Display for ModuleTypeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleTypeSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cjs" => Ok(Self::Cjs),
            "esm" => Ok(Self::Esm),
            "either" => Ok(Self::Either),
            "both" => Ok(Self::Both),
            other => Err(format!(
                "invalid module type '{other}' (expected cjs, esm, either or both)"
            )),
        }
    }
}

/// `--js-extension` policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JsExtension {
    /// Plain `.js` when the format matches the package type
    Either,
    /// Plain `.js` for every format
    Both,
    /// Always `.cjs` / `.mjs` (spelled `none`)
    #[serde(rename = "none")]
    PerFormat,
}

impl FromStr for JsExtension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "either" => Ok(Self::Either),
            "both" => Ok(Self::Both),
            "none" => Ok(Self::PerFormat),
            other => Err(format!(
                "invalid js extension policy '{other}' (expected either, both or none)"
            )),
        }
    }
}

impl fmt::Display for JsExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Either => write!(f, "either"),
            Self::Both => write!(f, "both"),
            Self::PerFormat => write!(f, "none"),
        }
    }
}

/// One emitted output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OutputArtifact {
    /// Single bundled file
    File {
        path: PathBuf,
        format: ModuleFormat,
        sourcemap: bool,
    },
    /// Directory of outputs named by `entry_file_names` (`[name]` is the chunk name)
    Directory {
        dir: PathBuf,
        format: ModuleFormat,
        entry_file_names: String,
        preserve_modules: bool,
        sourcemap: bool,
    },
}

impl OutputArtifact {
    pub fn format(&self) -> ModuleFormat {
        match self {
            Self::File { format, .. } | Self::Directory { format, .. } => *format,
        }
    }

    pub fn sourcemap(&self) -> bool {
        match self {
            Self::File { sourcemap, .. } | Self::Directory { sourcemap, .. } => *sourcemap,
        }
    }

    /// Output file or directory
    pub fn destination(&self) -> &Path {
        match self {
            Self::File { path, .. } => path,
            Self::Directory { dir, .. } => dir,
        }
    }

    pub fn preserves_modules(&self) -> bool {
        matches!(
            self,
            Self::Directory {
                preserve_modules: true,
                ..
            }
        )
    }

    /// Extension of emitted entry files, without the dot
    pub fn extension(&self) -> String {
        let name = match self {
            Self::File { path, .. } => return extension_of(path),
            Self::Directory {
                entry_file_names, ..
            } => entry_file_names,
        };
        name.rsplit_once('.')
            .map(|(_, ext)| ext.to_string())
            .unwrap_or_else(|| "js".to_string())
    }

    /// The file that loads the artifact: the file itself, or the `index`
    /// chunk of a directory
    pub fn entry_file(&self) -> PathBuf {
        match self {
            Self::File { path, .. } => path.clone(),
            Self::Directory {
                dir,
                entry_file_names,
                ..
            } => dir.join(entry_file_names.replace("[name]", "index")),
        }
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_else(|| "js".to_string())
}

/// How the output root is prepared before writing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "path", rename_all = "lowercase")]
pub enum Destination {
    /// Recursively delete, then write
    Clear(PathBuf),
    /// Create if missing and keep existing content
    Create(PathBuf),
}

impl Destination {
    pub fn path(&self) -> &Path {
        match self {
            Self::Clear(path) | Self::Create(path) => path,
        }
    }

    /// Prepare the directory for writing
    pub fn prepare(&self) -> std::io::Result<()> {
        match self {
            Self::Clear(path) => match std::fs::remove_dir_all(path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e),
            },
            Self::Create(path) => std::fs::create_dir_all(path),
        }
    }
}

/// Flags that shape the plan
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    pub module_type: Option<ModuleTypeSelector>,
    pub js_extension: Option<JsExtension>,
    pub sourcemap: bool,
    /// Deployment layout that redirects function builds
    pub deployment: Option<DeploymentDescriptor>,
    /// Number of entry points
    pub input_count: usize,
}

/// Artifacts of one build plus where their output root lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputPlan {
    pub artifacts: Vec<OutputArtifact>,
    pub destination: Destination,
    /// Directory of the distributable manifest (functions only)
    pub manifest_dir: Option<PathBuf>,
}

impl OutputPlan {
    /// Output paths in artifact order
    pub fn destinations(&self) -> Vec<&Path> {
        self.artifacts.iter().map(OutputArtifact::destination).collect()
    }

    /// Whether output goes to a deployment-redirected location
    pub fn is_redirected(&self) -> bool {
        matches!(self.destination, Destination::Create(_))
    }
}

/// Whether a single-artifact target emits ES modules
pub fn is_esm_output(is_esm_package: bool, module_type: Option<ModuleTypeSelector>) -> bool {
    match module_type {
        Some(ModuleTypeSelector::Esm) => true,
        None | Some(ModuleTypeSelector::Either) => is_esm_package,
        Some(ModuleTypeSelector::Cjs) | Some(ModuleTypeSelector::Both) => false,
    }
}

/// Derive the output plan of a build
pub fn build_plan(
    detail: TargetDetail,
    package: &PackageDescriptor,
    options: &PlanOptions,
) -> BuildResult<OutputPlan> {
    let plan = if detail.is_single_artifact() {
        single_artifact_plan(detail, package, options)?
    } else {
        library_plan(package, options)
    };

    if plan.artifacts.is_empty() {
        return Err(BuildError::no_outputs(detail));
    }

    tracing::debug!(
        detail = %detail,
        outputs = ?plan.destinations(),
        redirected = plan.is_redirected(),
        "planned outputs"
    );
    Ok(plan)
}

fn single_artifact_plan(
    detail: TargetDetail,
    package: &PackageDescriptor,
    options: &PlanOptions,
) -> BuildResult<OutputPlan> {
    let main = package
        .main
        .as_deref()
        .filter(|main| !main.trim().is_empty())
        .ok_or_else(|| BuildError::missing_main(&package.manifest_path))?;

    let is_esm_package = package.is_esm();
    let format = if is_esm_output(is_esm_package, options.module_type) {
        ModuleFormat::Esm
    } else {
        ModuleFormat::CommonJs
    };
    let extension = format.extension(options.js_extension, is_esm_package);

    let package_dir = package.package_dir();
    let dist_dir = package_dir.join(DIST_DIR);
    let mut path = dist_main_path(package_dir, main).with_extension(extension);

    let redirect = match (&options.deployment, detail) {
        (Some(deployment), TargetDetail::Functions) => Some(&deployment.functions_source),
        _ => None,
    };
    let destination = match redirect {
        Some(source) => {
            if let Some(file_name) = path.file_name() {
                path = source.join(file_name);
            }
            Destination::Create(source.clone())
        }
        None => Destination::Clear(dist_dir.clone()),
    };

    let manifest_dir = (detail == TargetDetail::Functions)
        .then(|| redirect.cloned().unwrap_or(dist_dir));

    let artifact = if options.input_count > 1 {
        OutputArtifact::Directory {
            dir: path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| destination.path().to_path_buf()),
            format,
            entry_file_names: format!("[name].{extension}"),
            preserve_modules: false,
            sourcemap: options.sourcemap,
        }
    } else {
        OutputArtifact::File {
            path,
            format,
            sourcemap: options.sourcemap,
        }
    };

    Ok(OutputPlan {
        artifacts: vec![artifact],
        destination,
        manifest_dir,
    })
}

/// `main` relocated under `dist/`: kept when already there, otherwise only
/// its file name is used.
fn dist_main_path(package_dir: &Path, main: &str) -> PathBuf {
    let relative = main.trim_start_matches("./");
    if relative.starts_with("dist/") {
        return package_dir.join(relative);
    }
    let file_name = Path::new(relative)
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "index.js".into());
    package_dir.join(DIST_DIR).join(file_name)
}

fn library_plan(package: &PackageDescriptor, options: &PlanOptions) -> OutputPlan {
    let is_esm_package = package.is_esm();
    let module_type = options.module_type.unwrap_or(ModuleTypeSelector::Both);
    let dist_dir = package.package_dir().join(DIST_DIR);

    let emits = |format: ModuleFormat| match module_type {
        ModuleTypeSelector::Both => true,
        ModuleTypeSelector::Cjs => format == ModuleFormat::CommonJs,
        ModuleTypeSelector::Esm => format == ModuleFormat::Esm,
        ModuleTypeSelector::Either => (format == ModuleFormat::Esm) == is_esm_package,
    };

    let artifacts = [(ModuleFormat::CommonJs, "cjs"), (ModuleFormat::Esm, "esm")]
        .into_iter()
        .filter(|(format, _)| emits(*format))
        .map(|(format, subdir)| OutputArtifact::Directory {
            dir: dist_dir.join(subdir),
            format,
            entry_file_names: format!(
                "[name].{}",
                format.extension(options.js_extension, is_esm_package)
            ),
            preserve_modules: true,
            sourcemap: options.sourcemap,
        })
        .collect();

    OutputPlan {
        artifacts,
        destination: Destination::Clear(dist_dir),
        manifest_dir: None,
    }
}
