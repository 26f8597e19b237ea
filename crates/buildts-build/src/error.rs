/// Build system error types
use buildts_config::ConfigError;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("target must be one of: app, functions, lib (got '{0}')")]
    InvalidTarget(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Please add \"main\" property in {path}")]
    MissingMain { path: PathBuf },

    #[error("Failed to detect input file (looked for {})", .candidates.join(", "))]
    NoInput { candidates: Vec<String> },

    #[error("Failed to detect output files for target '{target}'")]
    NoOutputs { target: String },

    #[error("{0}")]
    Bundle(BundleDiagnostic),

    #[error("Bundler executable not found: {0}")]
    BundlerNotFound(String),

    #[error("I/O error at {path}: {error}")]
    IoError {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl BuildError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            error,
        }
    }

    /// Create a missing main entry error
    pub fn missing_main(path: impl Into<PathBuf>) -> Self {
        Self::MissingMain { path: path.into() }
    }

    /// Create a no-outputs error
    pub fn no_outputs(target: impl ToString) -> Self {
        Self::NoOutputs {
            target: target.to_string(),
        }
    }

    /// Whether this is a configuration problem detected before bundling
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidTarget(_)
                | Self::Config(_)
                | Self::MissingMain { .. }
                | Self::NoInput { .. }
                | Self::NoOutputs { .. }
        )
    }

    /// The structured bundler diagnostic, if this is a bundling failure
    pub fn diagnostic(&self) -> Option<&BundleDiagnostic> {
        match self {
            Self::Bundle(diagnostic) => Some(diagnostic),
            _ => None,
        }
    }
}

/// Position inside a source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub file: Option<String>,
    pub line: u32,
    pub column: u32,
}

/// Structured context of a bundling failure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BundleDiagnostic {
    /// Error class name (`Error`, `SyntaxError`, ...)
    pub name: Option<String>,
    pub message: String,
    /// Pipeline stage or bundler plugin that raised the error
    pub plugin: Option<String>,
    /// Documentation link
    pub url: Option<String>,
    pub loc: Option<SourceLocation>,
    /// Code frame around the location
    pub frame: Option<String>,
    pub stack: Option<String>,
}

impl BundleDiagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }

    pub fn with_location(mut self, file: Option<String>, line: u32, column: u32) -> Self {
        self.loc = Some(SourceLocation { file, line, column });
        self
    }

    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.frame = Some(frame.into());
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// First line: `[!] (plugin p) Name: message`
    pub fn headline(&self) -> String {
        let plugin = self
            .plugin
            .as_ref()
            .map(|p| format!("(plugin {p}) "))
            .unwrap_or_default();
        format!("[!] {plugin}{}{}", self.name_section(), self.message)
    }

    fn name_section(&self) -> String {
        self.name
            .as_ref()
            .map(|n| format!("{n}: "))
            .unwrap_or_default()
    }

    /// Location line: `file (line:col)`
    pub fn location_line(&self) -> Option<String> {
        self.loc.as_ref().map(|loc| {
            let file = loc.file.as_deref().unwrap_or("<unknown>");
            format!("{file} ({}:{})", loc.line, loc.column)
        })
    }

    /// Stack trace without its leading `Name: message` line
    pub fn trimmed_stack(&self) -> Option<String> {
        let stack = self.stack.as_deref()?;
        let prefix = format!("{}{}\n", self.name_section(), self.message);
        Some(stack.replacen(&prefix, "", 1))
    }
}

impl fmt::Display for BundleDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.headline())?;
        if let Some(url) = &self.url {
            write!(f, "\n{url}")?;
        }
        if let Some(location) = self.location_line() {
            write!(f, "\n{location}")?;
        }
        if let Some(frame) = &self.frame {
            write!(f, "\n{frame}")?;
        }
        if let Some(stack) = self.trimmed_stack() {
            write!(f, "\n{stack}")?;
        }
        Ok(())
    }
}
