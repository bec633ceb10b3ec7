use crate::model::attribution::PackageInfo;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    #[serde(alias = "name")]
    pub display_name: String,
    #[serde(default)]
    pub priority: i32,
}

/// Display names and ordering priority of the scanners that produced signals.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: BTreeMap<String, SourceInfo>,
}

impl SourceRegistry {
    pub fn new(sources: BTreeMap<String, SourceInfo>) -> Self {
        Self { sources }
    }

    pub fn display_name<'a>(&'a self, source_name: &'a str) -> &'a str {
        self.sources
            .get(source_name)
            .map(|s| s.display_name.as_str())
            .unwrap_or(source_name)
    }

    pub fn priority(&self, source_name: &str) -> i32 {
        self.sources.get(source_name).map(|s| s.priority).unwrap_or(0)
    }

    pub fn priority_of(&self, info: &PackageInfo) -> i32 {
        info.source
            .as_ref()
            .map(|s| self.priority(&s.name))
            .unwrap_or(0)
    }
}

/// `path prefix -> url template`; `{path}` in the template is replaced by the
/// resource path relative to the prefix. A `null` template disables links
/// below that prefix.
#[derive(Debug, Clone, Default)]
pub struct BaseUrls {
    prefixes: BTreeMap<String, Option<String>>,
}

impl BaseUrls {
    pub fn new(prefixes: BTreeMap<String, Option<String>>) -> Self {
        Self { prefixes }
    }

    pub fn url_for(&self, path: &str) -> Option<Url> {
        let (prefix, template) = self
            .prefixes
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())?;
        let template = template.as_deref()?;
        let relative = &path[prefix.len()..];
        let raw = template.replace("{path}", relative);
        match Url::parse(&raw) {
            Ok(url) => Some(url),
            Err(err) => {
                tracing::warn!(%path, %raw, %err, "base url template produced an invalid url");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LicenseName {
    pub short_name: String,
    pub full_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FrequentLicensesInput {
    #[serde(default)]
    pub name_order: Vec<LicenseName>,
    #[serde(default)]
    pub texts: BTreeMap<String, String>,
}

/// License presets offered when editing an attribution.
#[derive(Debug, Clone, Default)]
pub struct FrequentLicenses {
    input: FrequentLicensesInput,
}

impl FrequentLicenses {
    pub fn new(input: FrequentLicensesInput) -> Self {
        Self { input }
    }

    pub fn names(&self) -> &[LicenseName] {
        &self.input.name_order
    }

    pub fn lookup(&self, name: &str) -> Option<&LicenseName> {
        let name = name.trim();
        self.input
            .name_order
            .iter()
            .find(|l| l.short_name.eq_ignore_ascii_case(name) || l.full_name == name)
    }

    pub fn text_for(&self, name: &str) -> Option<&str> {
        let license = self.lookup(name)?;
        self.input.texts.get(&license.short_name).map(String::as_str)
    }

    /// Fills an empty license text from the preset; returns whether it did.
    pub fn fill_license_text(&self, info: &mut PackageInfo) -> bool {
        if info.license_text.as_deref().is_some_and(|t| !t.trim().is_empty()) {
            return false;
        }
        let Some(text) = info.license_name.as_deref().and_then(|n| self.text_for(n)) else {
            return false;
        };
        info.license_text = Some(text.to_string());
        true
    }
}
