use crate::directive::{OffsetConvention, SideMarkers};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

/// Contents of a `space-patcher.toml` file. Every field is optional.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct PatcherConfig {
    /// Directory that component paths are relative to
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
    /// Project key prefixed to component keys in the report
    #[serde(default)]
    pub project_key: Option<String>,
    /// Rule key suffix to keep, `:MissingSpace` when unset
    #[serde(default)]
    pub rule: Option<String>,
    #[serde(default)]
    pub end_offset: Option<OffsetConvention>,
    /// Where to write the list of changed files
    #[serde(default)]
    pub changed_list: Option<PathBuf>,
    #[serde(default)]
    pub markers: Markers,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Markers {
    #[serde(default = "default_left")]
    pub left: Vec<String>,
    #[serde(default = "default_right")]
    pub right: Vec<String>,
}

fn default_left() -> Vec<String> {
    vec!["слева".to_string()]
}

fn default_right() -> Vec<String> {
    vec!["справа".to_string()]
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            left: default_left(),
            right: default_right(),
        }
    }
}

impl Markers {
    pub fn side_markers(&self) -> SideMarkers {
        SideMarkers::new(&self.left, &self.right)
    }
}

impl PatcherConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        for (field, markers) in [
            ("markers.left", &self.markers.left),
            ("markers.right", &self.markers.right),
        ] {
            if markers.is_empty() {
                issues.push(ValidationIssue::EmptyList { field });
            }
            if markers.iter().any(|m| m.trim().is_empty()) {
                issues.push(ValidationIssue::BlankMarker { field });
            }
        }

        let left: Vec<String> = self
            .markers
            .left
            .iter()
            .filter(|m| !m.trim().is_empty())
            .map(|m| m.to_lowercase())
            .collect();
        for marker in &self.markers.right {
            let lowered = marker.to_lowercase();
            if left.iter().any(|l| lowered.contains(l.as_str())) {
                issues.push(ValidationIssue::AmbiguousMarker {
                    marker: marker.clone(),
                });
            }
        }

        if matches!(&self.project_key, Some(key) if key.trim().is_empty()) {
            issues.push(ValidationIssue::BlankValue {
                field: "project_key",
            });
        }
        if matches!(&self.rule, Some(rule) if rule.trim().is_empty()) {
            issues.push(ValidationIssue::BlankValue { field: "rule" });
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.issues.iter().map(ToString::to_string).collect();
        write!(f, "{}", messages.join("; "))
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    EmptyList { field: &'static str },
    BlankMarker { field: &'static str },
    BlankValue { field: &'static str },
    /// A right marker that also matches a left marker, so every "right"
    /// message would classify as both.
    AmbiguousMarker { marker: String },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyList { field } => write!(f, "{field} must not be empty"),
            ValidationIssue::BlankMarker { field } => {
                write!(f, "{field} contains a blank marker")
            }
            ValidationIssue::BlankValue { field } => write!(f, "{field} must not be blank"),
            ValidationIssue::AmbiguousMarker { marker } => {
                write!(f, "right marker {marker:?} also matches a left marker")
            }
        }
    }
}
