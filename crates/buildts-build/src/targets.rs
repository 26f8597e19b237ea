/// Target categories and their refined build profiles
use crate::error::{BuildError, BuildResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Coarse build purpose supplied on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetCategory {
    /// Node application
    App,
    /// Serverless functions (GCP / Firebase)
    Functions,
    /// Reusable Node.js or React library
    Lib,
}

impl TargetCategory {
    /// Every accepted category
    pub fn all() -> [TargetCategory; 3] {
        [Self::App, Self::Functions, Self::Lib]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Functions => "functions",
            Self::Lib => "lib",
        }
    }
}

impl fmt::Display for TargetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetCategory {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| BuildError::InvalidTarget(s.to_string()))
    }
}

/// Build profile refined from the category and the shape of the input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetDetail {
    AppNode,
    Functions,
    Lib,
    LibReact,
}

impl TargetDetail {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AppNode => "app-node",
            Self::Functions => "functions",
            Self::Lib => "lib",
            Self::LibReact => "lib-react",
        }
    }

    /// Whether this profile produces exactly one bundled artifact
    pub fn is_single_artifact(&self) -> bool {
        matches!(self, Self::AppNode | Self::Functions)
    }

    /// Whether sources contain JSX that must be transformed
    pub fn uses_jsx(&self) -> bool {
        matches!(self, Self::LibReact)
    }
}

impl fmt::Display for TargetDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Refine a category using the primary input's extension
pub fn classify(category: TargetCategory, primary_input: &Path) -> TargetDetail {
    match category {
        TargetCategory::App => TargetDetail::AppNode,
        TargetCategory::Functions => TargetDetail::Functions,
        TargetCategory::Lib if is_component_file(primary_input) => TargetDetail::LibReact,
        TargetCategory::Lib => TargetDetail::Lib,
    }
}

/// Classify a category given as free text, as accepted by `build --target`
pub fn classify_str(category: &str, primary_input: &Path) -> BuildResult<TargetDetail> {
    let category: TargetCategory = category.parse()?;
    Ok(classify(category, primary_input))
}

fn is_component_file(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("tsx")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TargetCategory::App, "src/index.ts", TargetDetail::AppNode)]
    #[case(TargetCategory::App, "src/index.tsx", TargetDetail::AppNode)]
    #[case(TargetCategory::Functions, "src/index.ts", TargetDetail::Functions)]
    #[case(TargetCategory::Lib, "src/index.ts", TargetDetail::Lib)]
    #[case(TargetCategory::Lib, "src/index.tsx", TargetDetail::LibReact)]
    #[case(TargetCategory::Lib, "src/index.mts", TargetDetail::Lib)]
    fn test_classify(
        #[case] category: TargetCategory,
        #[case] input: &str,
        #[case] expected: TargetDetail,
    ) {
        assert_eq!(classify(category, Path::new(input)), expected);
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("lib".parse::<TargetCategory>().unwrap(), TargetCategory::Lib);
        assert!(matches!(
            "web".parse::<TargetCategory>(),
            Err(BuildError::InvalidTarget(ref s)) if s == "web"
        ));
        assert!("App".parse::<TargetCategory>().is_err());
    }

    #[test]
    fn test_classify_str_rejects_unknown_category() {
        let err = classify_str("website", Path::new("src/index.ts")).unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(
            err.to_string(),
            "target must be one of: app, functions, lib (got 'website')"
        );
    }

    #[test]
    fn test_detail_display() {
        assert_eq!(TargetDetail::LibReact.to_string(), "lib-react");
        assert_eq!(TargetDetail::AppNode.to_string(), "app-node");
        assert!(TargetDetail::Functions.is_single_artifact());
        assert!(!TargetDetail::LibReact.is_single_artifact());
        assert!(!TargetDetail::Lib.is_single_artifact());
    }
}
