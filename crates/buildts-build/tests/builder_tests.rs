//! Integration tests for the build orchestrator
//!
//! Drives complete builds against temporary packages with an in-memory
//! bundler that records what it was asked to do.

use buildts_build::{
    BuildConfig, BuildError, BuildPhase, Builder, Bundle, BundleDiagnostic, BundleRequest,
    Bundler, BuildResult, ModuleTypeSelector, OutputArtifact, Stage, TargetCategory, TargetDetail,
};
use pretty_assertions::assert_eq;
use serde_json::Value;
use serial_test::serial;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ============================================================================
// Fake bundler
// ============================================================================

#[derive(Debug, Default)]
struct Record {
    requests: Vec<BundleRequest>,
    writes: Vec<PathBuf>,
    closed: usize,
}

#[derive(Clone, Default)]
struct FakeBundler {
    record: Arc<Mutex<Record>>,
    fail_bundle: Option<String>,
    fail_write: bool,
    panic_write: bool,
}

impl FakeBundler {
    fn failing_bundle(message: &str) -> Self {
        Self {
            fail_bundle: Some(message.to_string()),
            ..Self::default()
        }
    }

    fn failing_write() -> Self {
        Self {
            fail_write: true,
            ..Self::default()
        }
    }

    fn panicking_write() -> Self {
        Self {
            panic_write: true,
            ..Self::default()
        }
    }

    fn requests(&self) -> usize {
        self.record.lock().unwrap().requests.len()
    }

    fn last_request(&self) -> BundleRequest {
        self.record.lock().unwrap().requests.last().cloned().unwrap()
    }

    fn closed(&self) -> usize {
        self.record.lock().unwrap().closed
    }
}

impl Bundler for FakeBundler {
    fn bundle(&self, request: &BundleRequest) -> BuildResult<Box<dyn Bundle>> {
        self.record.lock().unwrap().requests.push(request.clone());
        if let Some(message) = &self.fail_bundle {
            return Err(BuildError::Bundle(
                BundleDiagnostic::new(message.clone()).with_plugin("transpile"),
            ));
        }
        Ok(Box::new(FakeBundle {
            record: Arc::clone(&self.record),
            fail_write: self.fail_write,
            panic_write: self.panic_write,
        }))
    }
}

struct FakeBundle {
    record: Arc<Mutex<Record>>,
    fail_write: bool,
    panic_write: bool,
}

impl Bundle for FakeBundle {
    fn write(&self, artifact: &OutputArtifact) -> BuildResult<()> {
        if self.panic_write {
            panic!("writer crashed on {}", artifact.destination().display());
        }
        if self.fail_write {
            return Err(BuildError::Bundle(BundleDiagnostic::new("disk full")));
        }
        let file = artifact.entry_file();
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, format!("// {}", artifact.format())).unwrap();
        self.record.lock().unwrap().writes.push(file);
        Ok(())
    }

    fn close(&self) -> BuildResult<()> {
        self.record.lock().unwrap().closed += 1;
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn create_package(manifest: &str, files: &[&str]) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("package.json"), manifest).unwrap();
    for file in files {
        let path = dir.path().join(file);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "export {};\n").unwrap();
    }
    dir
}

fn config(category: TargetCategory, dir: &Path) -> BuildConfig {
    BuildConfig {
        category,
        working_dir: dir.to_path_buf(),
        ..BuildConfig::default()
    }
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

// ============================================================================
// Applications
// ============================================================================

#[test]
fn test_app_build_writes_main_file() {
    let pkg = create_package(
        r#"{"name":"@scope/pkg","main":"dist/index.cjs"}"#,
        &["src/index.ts", "dist/stale.js"],
    );
    let bundler = FakeBundler::default();
    let mut builder =
        Builder::new(pkg.path(), bundler.clone()).with_config(config(TargetCategory::App, pkg.path()));

    let context = builder.build().unwrap();

    assert_eq!(context.detail, TargetDetail::AppNode);
    assert_eq!(context.outputs, vec![pkg.path().join("dist/index.cjs")]);
    assert!(pkg.path().join("dist/index.cjs").is_file());
    assert!(!pkg.path().join("dist/stale.js").exists());
    assert_eq!(context.manifest, None);
    assert_eq!(builder.phase(), BuildPhase::Success);
    assert_eq!(bundler.closed(), 1);
}

#[test]
fn test_app_esm_package_with_either_extension() {
    let pkg = create_package(
        r#"{"name":"srv","type":"module","main":"dist/main.js"}"#,
        &["src/index.ts"],
    );
    let mut builder = Builder::new(pkg.path(), FakeBundler::default()).with_config(BuildConfig {
        js_extension: Some(buildts_build::JsExtension::Either),
        ..config(TargetCategory::App, pkg.path())
    });

    let context = builder.build().unwrap();
    assert_eq!(context.outputs, vec![pkg.path().join("dist/main.js")]);
}

#[test]
fn test_request_carries_pipeline_environment() {
    let pkg = create_package(
        r#"{"name":"srv","main":"dist/index.js","dependencies":{"express":"*"}}"#,
        &["src/index.ts"],
    );
    let bundler = FakeBundler::default();
    let mut builder = Builder::new(pkg.path(), bundler.clone()).with_config(BuildConfig {
        core_js: true,
        externals: vec!["sharp".to_string()],
        ..config(TargetCategory::App, pkg.path())
    });

    builder.build().unwrap();
    let request = bundler.last_request();

    assert_eq!(request.environment["BUILD_TS_COREJS"], "1");
    assert_eq!(request.environment["BUILD_TS_TARGET_CATEGORY"], "app");
    assert_eq!(request.environment["BUILD_TS_TARGET_DETAIL"], "app-node");
    assert_eq!(
        request.pipeline.externals(),
        BTreeSet::from(["express".to_string(), "sharp".to_string()])
    );
    assert!(request.pipeline.has("polyfill"));
    assert_eq!(request.inputs[0].path, pkg.path().join("src/index.ts"));
}

#[test]
#[serial]
fn test_inline_env_uses_process_values() {
    std::env::set_var("BUILDTS_IT_API_URL", "https://api.example.com");
    let pkg = create_package(r#"{"name":"srv","main":"dist/index.js"}"#, &["src/index.ts"]);
    let bundler = FakeBundler::default();
    let mut builder = Builder::new(pkg.path(), bundler.clone()).with_config(BuildConfig {
        inline_env: BTreeSet::from([
            "BUILDTS_IT_API_URL".to_string(),
            "BUILDTS_IT_UNSET".to_string(),
        ]),
        ..config(TargetCategory::App, pkg.path())
    });

    builder.build().unwrap();
    std::env::remove_var("BUILDTS_IT_API_URL");

    let stages = bundler.last_request().pipeline.stages;
    let Stage::InlineEnv { definitions } = &stages[0] else {
        panic!("expected inline env stage first, got {:?}", stages[0]);
    };
    assert_eq!(
        definitions.get("process.env.BUILDTS_IT_API_URL").map(String::as_str),
        Some("\"https://api.example.com\"")
    );
    assert!(!definitions.contains_key("process.env.BUILDTS_IT_UNSET"));
}

// ============================================================================
// Libraries
// ============================================================================

#[test]
fn test_lib_both_formats() {
    let pkg = create_package(r#"{"name":"lib"}"#, &["src/index.ts", "src/util.ts"]);
    let mut builder = Builder::new(pkg.path(), FakeBundler::default())
        .with_config(config(TargetCategory::Lib, pkg.path()));

    let context = builder.build().unwrap();

    assert_eq!(
        context.outputs,
        vec![pkg.path().join("dist/cjs"), pkg.path().join("dist/esm")]
    );
    assert!(pkg.path().join("dist/cjs/index.cjs").is_file());
    assert!(pkg.path().join("dist/esm/index.mjs").is_file());
}

#[test]
fn test_tsx_entry_builds_react_library() {
    let pkg = create_package(r#"{"name":"ui","type":"module"}"#, &["src/index.tsx"]);
    let bundler = FakeBundler::default();
    let mut builder = Builder::new(pkg.path(), bundler.clone()).with_config(BuildConfig {
        module_type: Some(ModuleTypeSelector::Either),
        ..config(TargetCategory::Lib, pkg.path())
    });

    let context = builder.build().unwrap();

    assert_eq!(context.detail, TargetDetail::LibReact);
    assert_eq!(context.outputs, vec![pkg.path().join("dist/esm")]);
    assert!(bundler
        .last_request()
        .pipeline
        .stages
        .contains(&Stage::Transpile { jsx: true }));
}

// ============================================================================
// Functions
// ============================================================================

#[test]
fn test_functions_manifest_in_dist() {
    let pkg = create_package(
        r#"{"name":"api","main":"dist/index.js","scripts":{"build":"x"},"devDependencies":{"x":"1"}}"#,
        &["src/index.ts"],
    );
    let mut builder = Builder::new(pkg.path(), FakeBundler::default())
        .with_config(config(TargetCategory::Functions, pkg.path()));

    let context = builder.build().unwrap();

    let manifest_path = context.manifest.unwrap();
    assert_eq!(manifest_path, pkg.path().join("dist/package.json"));
    let manifest = read_json(&manifest_path);
    assert_eq!(manifest["name"], "api-dist");
    assert_eq!(manifest["main"], "index.cjs");
    assert!(manifest.get("scripts").is_none());
    assert!(manifest.get("devDependencies").is_none());
}

#[test]
fn test_functions_redirected_by_deployment_descriptor() {
    let root = TempDir::new().unwrap();
    let pkg_dir = root.path().join("pkg");
    fs::create_dir_all(pkg_dir.join("src")).unwrap();
    fs::write(pkg_dir.join("src/index.ts"), "").unwrap();
    fs::write(
        pkg_dir.join("package.json"),
        r#"{"name":"pkg","main":"dist/index.js","devDependencies":{"typescript":"*"}}"#,
    )
    .unwrap();
    let functions_dir = root.path().join("functions");
    fs::create_dir_all(&functions_dir).unwrap();
    fs::write(functions_dir.join(".keep"), "").unwrap();
    let firebase = root.path().join("firebase.json");
    fs::write(&firebase, r#"{"functions":{"source":"functions"}}"#).unwrap();

    let mut builder = Builder::new(&pkg_dir, FakeBundler::default()).with_config(BuildConfig {
        deployment_descriptor: Some(firebase),
        ..config(TargetCategory::Functions, &pkg_dir)
    });
    let context = builder.build().unwrap();

    assert_eq!(context.outputs, vec![functions_dir.join("index.cjs")]);
    assert!(functions_dir.join(".keep").exists());
    assert!(!pkg_dir.join("dist").exists());

    let manifest = read_json(&functions_dir.join("package.json"));
    assert_eq!(manifest["name"], "pkg-dist");
    assert_eq!(manifest["main"], "index.cjs");
    assert!(manifest.get("devDependencies").is_none());
}

#[test]
fn test_missing_deployment_descriptor_is_ignored() {
    let pkg = create_package(r#"{"name":"api","main":"dist/index.js"}"#, &["src/index.ts"]);
    let mut builder = Builder::new(pkg.path(), FakeBundler::default()).with_config(BuildConfig {
        deployment_descriptor: Some(pkg.path().join("firebase.json")),
        ..config(TargetCategory::Functions, pkg.path())
    });

    let context = builder.build().unwrap();
    assert_eq!(context.outputs, vec![pkg.path().join("dist/index.cjs")]);
}

#[test]
fn test_multiple_function_inputs() {
    let pkg = create_package(
        r#"{"name":"api","main":"dist/index.js"}"#,
        &["src/main.ts", "src/cron.ts"],
    );
    let bundler = FakeBundler::default();
    let mut builder = Builder::new(pkg.path(), bundler.clone()).with_config(BuildConfig {
        inputs: vec![PathBuf::from("src/main.ts"), PathBuf::from("src/cron.ts")],
        ..config(TargetCategory::Functions, pkg.path())
    });

    let context = builder.build().unwrap();

    let names: Vec<String> = bundler
        .last_request()
        .inputs
        .into_iter()
        .map(|input| input.name)
        .collect();
    assert_eq!(names, vec!["index", "cron"]);
    assert_eq!(context.outputs, vec![pkg.path().join("dist")]);
    assert_eq!(read_json(&pkg.path().join("dist/package.json"))["main"], "index.cjs");
}

#[test]
fn test_write_manifest_only_skips_bundling() {
    let pkg = create_package(r#"{"name":"api","type":"module","main":"dist/index.js"}"#, &[]);
    let bundler = FakeBundler::default();
    let mut builder = Builder::new(pkg.path(), bundler.clone())
        .with_config(config(TargetCategory::Functions, pkg.path()));

    let path = builder.write_manifest_only().unwrap();

    assert_eq!(path, pkg.path().join("dist/package.json"));
    assert_eq!(read_json(&path)["main"], "index.mjs");
    assert_eq!(bundler.requests(), 0);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_no_input_fails_without_touching_dist() {
    let pkg = create_package(r#"{"name":"app","main":"dist/index.js"}"#, &["dist/keep.js"]);
    let bundler = FakeBundler::default();
    let mut builder = Builder::new(pkg.path(), bundler.clone())
        .with_config(config(TargetCategory::App, pkg.path()));

    let err = builder.build().unwrap_err();

    assert!(matches!(err, BuildError::NoInput { .. }));
    assert!(err.is_configuration());
    assert!(pkg.path().join("dist/keep.js").exists());
    assert_eq!(bundler.requests(), 0);
    assert_eq!(builder.phase(), BuildPhase::Failed);
}

#[test]
fn test_missing_main_fails_before_bundling() {
    let pkg = create_package(r#"{"name":"app"}"#, &["src/index.ts"]);
    let bundler = FakeBundler::default();
    let mut builder = Builder::new(pkg.path(), bundler.clone())
        .with_config(config(TargetCategory::App, pkg.path()));

    assert!(matches!(
        builder.build(),
        Err(BuildError::MissingMain { .. })
    ));
    assert_eq!(bundler.requests(), 0);
}

#[test]
fn test_missing_manifest_is_config_error() {
    let dir = TempDir::new().unwrap();
    let mut builder = Builder::new(dir.path(), FakeBundler::default())
        .with_config(config(TargetCategory::Lib, dir.path()));

    assert!(matches!(builder.build(), Err(BuildError::Config(_))));
}

#[test]
fn test_bundle_failure_reports_diagnostic() {
    let pkg = create_package(r#"{"name":"lib"}"#, &["src/index.ts"]);
    let mut builder = Builder::new(pkg.path(), FakeBundler::failing_bundle("Unexpected token"))
        .with_config(config(TargetCategory::Lib, pkg.path()));

    let err = builder.build().unwrap_err();

    let diagnostic = err.diagnostic().unwrap();
    assert_eq!(diagnostic.headline(), "[!] (plugin transpile) Unexpected token");
    assert!(!err.is_configuration());
    assert_eq!(builder.phase(), BuildPhase::Failed);
}

#[test]
fn test_bundle_closed_when_write_fails() {
    let pkg = create_package(r#"{"name":"lib"}"#, &["src/index.ts"]);
    let bundler = FakeBundler::failing_write();
    let mut builder = Builder::new(pkg.path(), bundler.clone())
        .with_config(config(TargetCategory::Lib, pkg.path()));

    assert!(builder.build().is_err());
    assert_eq!(bundler.closed(), 1);
}

#[test]
fn test_bundle_closed_when_write_panics() {
    let pkg = create_package(r#"{"name":"lib"}"#, &["src/index.ts"]);
    let bundler = FakeBundler::panicking_write();
    let mut builder = Builder::new(pkg.path(), bundler.clone())
        .with_config(config(TargetCategory::Lib, pkg.path()));

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| builder.build()));

    assert!(result.is_err());
    assert_eq!(bundler.closed(), 1);
}

// ============================================================================
// Watch cycles
// ============================================================================

#[test]
fn test_watch_cycles_stay_in_bundling() {
    let pkg = create_package(r#"{"name":"lib"}"#, &["src/index.ts"]);
    let bundler = FakeBundler::default();
    let mut builder = Builder::new(pkg.path(), bundler.clone())
        .with_config(config(TargetCategory::Lib, pkg.path()))
        .with_watch(true);

    let prepared = builder.prepare().unwrap();
    builder.bundle(&prepared).unwrap();
    builder.bundle(&prepared).unwrap();
    assert_eq!(builder.phase(), BuildPhase::Bundling);
    assert_eq!(bundler.requests(), 2);
    assert_eq!(bundler.closed(), 2);

    builder.terminate();
    assert_eq!(builder.phase(), BuildPhase::Success);
}
