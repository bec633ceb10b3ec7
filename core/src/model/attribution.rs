use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributionId(pub String);

impl AttributionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttributionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AttributionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AttributionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Manual attributions are authored by the auditor, external ones come from scanners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Universe {
    Manual,
    External,
}

/// Discrete confidence, numeric on the wire (0..=100 scale).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum Confidence {
    Low = 20,
    Medium = 50,
    High = 80,
}

impl From<u32> for Confidence {
    fn from(v: u32) -> Self {
        match v {
            0..=34 => Confidence::Low,
            35..=64 => Confidence::Medium,
            _ => Confidence::High,
        }
    }
}

impl From<Confidence> for u32 {
    fn from(c: Confidence) -> Self {
        c as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criticality {
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalSource {
    pub name: String,
    #[serde(default)]
    pub document_confidence: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_type: Option<String>,
    #[serde(
        default,
        rename = "packagePURLAppendix",
        skip_serializing_if = "Option::is_none"
    )]
    pub package_purl_appendix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copyright: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_text: Option<String>,
    #[serde(
        default,
        alias = "comment",
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub comments: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribution_confidence: Option<Confidence>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub pre_selected: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub first_party: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub follow_up: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub exclude_from_notice: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub needs_review: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criticality: Option<Criticality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SignalSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub origin_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub preferred: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub was_preferred: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Null(()),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) if s.trim().is_empty() => Vec::new(),
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
        OneOrMany::Null(()) => Vec::new(),
    })
}

/// Fields two signals must share to be shown as one merged signal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PackageIdentity {
    pub package_type: String,
    pub package_namespace: String,
    pub package_name: String,
    pub package_version: String,
    pub package_purl_appendix: String,
    pub copyright: String,
    pub license_name: String,
    pub license_text: String,
}

fn norm(v: &Option<String>) -> String {
    v.as_deref().map(str::trim).unwrap_or_default().to_string()
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl PackageInfo {
    pub fn identity(&self) -> PackageIdentity {
        PackageIdentity {
            package_type: norm(&self.package_type).to_ascii_lowercase(),
            package_namespace: norm(&self.package_namespace),
            package_name: norm(&self.package_name),
            package_version: norm(&self.package_version),
            package_purl_appendix: norm(&self.package_purl_appendix),
            copyright: norm(&self.copyright),
            license_name: norm(&self.license_name),
            license_text: norm(&self.license_text),
        }
    }

    pub fn display_name(&self) -> String {
        if let Some(name) = non_empty(&self.package_name) {
            return match non_empty(&self.package_version) {
                Some(v) => format!("{}, {}", name, v),
                None => name.to_string(),
            };
        }
        non_empty(&self.copyright)
            .or_else(|| non_empty(&self.license_name))
            .or_else(|| self.comments.first().map(String::as_str))
            .unwrap_or("")
            .to_string()
    }

    pub fn comment_text(&self) -> String {
        self.comments.join("\n")
    }

    pub fn is_incomplete(&self) -> bool {
        non_empty(&self.package_name).is_none() || non_empty(&self.license_name).is_none()
    }

    pub fn has_license(&self) -> bool {
        non_empty(&self.license_name).is_some()
    }

    pub fn confidence_or(&self, fallback: Confidence) -> Confidence {
        self.attribution_confidence.unwrap_or(fallback)
    }

    /// Lowercased text the search box matches against.
    pub fn search_text(&self) -> String {
        [
            &self.package_name,
            &self.package_version,
            &self.package_namespace,
            &self.license_name,
            &self.copyright,
            &self.url,
        ]
        .iter()
        .filter_map(|f| f.as_deref())
        .chain(self.comments.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
    }
}
