use crate::error::{CoreError, CoreResult};
use crate::model::attribution::PackageInfo;
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPurl {
    pub package_type: String,
    pub namespace: Option<String>,
    pub name: String,
    pub version: Option<String>,
    /// Qualifiers and subpath, kept verbatim (`?a=b#sub`).
    pub appendix: Option<String>,
}

fn type_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z.+-][A-Za-z0-9.+-]*$").expect("static regex"))
}

fn license_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9.+:-]*$").expect("static regex"))
}

pub fn parse_purl(text: &str) -> CoreResult<ParsedPurl> {
    let text = text.trim();
    let rest = text
        .strip_prefix("pkg:")
        .ok_or_else(|| CoreError::Validation(format!("purl must start with pkg: ({})", text)))?;
    let rest = rest.trim_start_matches('/');

    let appendix_start = rest.find(['?', '#']);
    let (body, appendix) = match appendix_start {
        Some(idx) => (&rest[..idx], Some(rest[idx..].to_string())),
        None => (rest, None),
    };

    let (body, version) = match body.rfind('@') {
        Some(idx) if idx > body.rfind('/').unwrap_or(0) => {
            let v = &body[idx + 1..];
            if v.is_empty() {
                return Err(CoreError::Validation("purl has empty version".to_string()));
            }
            (&body[..idx], Some(v.to_string()))
        }
        _ => (body, None),
    };

    let segments: Vec<&str> = body.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() < 2 {
        return Err(CoreError::Validation(format!(
            "purl needs type and name: {}",
            text
        )));
    }
    let package_type = segments[0];
    if !type_re().is_match(package_type) {
        return Err(CoreError::Validation(format!(
            "invalid purl type {:?}",
            package_type
        )));
    }
    let name = segments[segments.len() - 1].to_string();
    let namespace = if segments.len() > 2 {
        Some(segments[1..segments.len() - 1].join("/"))
    } else {
        None
    };

    Ok(ParsedPurl {
        package_type: package_type.to_ascii_lowercase(),
        namespace,
        name,
        version,
        appendix: appendix.filter(|a| a.len() > 1),
    })
}

impl ParsedPurl {
    pub fn to_purl_string(&self) -> String {
        let mut out = format!("pkg:{}/", self.package_type);
        if let Some(ns) = &self.namespace {
            out.push_str(ns);
            out.push('/');
        }
        out.push_str(&self.name);
        if let Some(v) = &self.version {
            out.push('@');
            out.push_str(v);
        }
        if let Some(a) = &self.appendix {
            out.push_str(a);
        }
        out
    }

    pub fn apply_to(&self, info: &mut PackageInfo) {
        info.package_type = Some(self.package_type.clone());
        info.package_namespace = self.namespace.clone();
        info.package_name = Some(self.name.clone());
        info.package_version = self.version.clone();
        info.package_purl_appendix = self.appendix.clone();
    }
}

impl PackageInfo {
    pub fn purl(&self) -> Option<String> {
        let package_type = self.package_type.as_deref().filter(|s| !s.is_empty())?;
        let name = self.package_name.as_deref().filter(|s| !s.is_empty())?;
        Some(
            ParsedPurl {
                package_type: package_type.to_string(),
                namespace: self.package_namespace.clone().filter(|s| !s.is_empty()),
                name: name.to_string(),
                version: self.package_version.clone().filter(|s| !s.is_empty()),
                appendix: self.package_purl_appendix.clone().filter(|s| !s.is_empty()),
            }
            .to_purl_string(),
        )
    }
}

/// Accepts SPDX-style expressions: identifiers joined by AND/OR/WITH, with
/// balanced parentheses.
pub fn validate_license_expression(text: &str) -> CoreResult<()> {
    let spaced = text.replace('(', " ( ").replace(')', " ) ");
    let mut depth = 0i32;
    let mut expect_operand = true;
    let mut saw_token = false;
    for token in spaced.split_whitespace() {
        saw_token = true;
        match token {
            "(" => {
                if !expect_operand {
                    return Err(license_err(text, "unexpected '('"));
                }
                depth += 1;
            }
            ")" => {
                depth -= 1;
                if depth < 0 || expect_operand {
                    return Err(license_err(text, "unbalanced ')'"));
                }
            }
            "AND" | "OR" | "WITH" | "and" | "or" | "with" => {
                if expect_operand {
                    return Err(license_err(text, "operator without operand"));
                }
                expect_operand = true;
            }
            t => {
                if !expect_operand || !license_token_re().is_match(t) {
                    return Err(license_err(text, &format!("bad token {:?}", t)));
                }
                expect_operand = false;
            }
        }
    }
    if !saw_token || depth != 0 || expect_operand {
        return Err(license_err(text, "incomplete expression"));
    }
    Ok(())
}

fn license_err(text: &str, why: &str) -> CoreError {
    CoreError::Validation(format!("license expression {:?}: {}", text, why))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_purl() {
        let p = parse_purl("pkg:maven/org.apache/commons-lang3@3.12.0?type=jar#src").unwrap();
        assert_eq!(p.package_type, "maven");
        assert_eq!(p.namespace.as_deref(), Some("org.apache"));
        assert_eq!(p.name, "commons-lang3");
        assert_eq!(p.version.as_deref(), Some("3.12.0"));
        assert_eq!(p.appendix.as_deref(), Some("?type=jar#src"));
        assert_eq!(
            p.to_purl_string(),
            "pkg:maven/org.apache/commons-lang3@3.12.0?type=jar#src"
        );
    }

    #[test]
    fn scoped_npm_namespace_keeps_at_sign() {
        let p = parse_purl("pkg:npm/%40angular/core@17.0.0").unwrap();
        assert_eq!(p.namespace.as_deref(), Some("%40angular"));
        assert_eq!(p.name, "core");
    }

    #[test]
    fn rejects_malformed() {
        assert!(parse_purl("npm/react").is_err());
        assert!(parse_purl("pkg:react").is_err());
        assert!(parse_purl("pkg:1npm/react").is_err());
        assert!(parse_purl("pkg:npm/react@").is_err());
    }

    #[test]
    fn license_expressions() {
        assert!(validate_license_expression("MIT").is_ok());
        assert!(validate_license_expression("(MIT OR Apache-2.0) AND BSD-3-Clause").is_ok());
        assert!(validate_license_expression("GPL-2.0-only WITH Classpath-exception-2.0").is_ok());
        assert!(validate_license_expression("MIT OR").is_err());
        assert!(validate_license_expression("(MIT").is_err());
        assert!(validate_license_expression("MIT Apache-2.0").is_err());
        assert!(validate_license_expression("").is_err());
    }
}
