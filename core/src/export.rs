use crate::error::CoreResult;
use crate::model::attribution::{AttributionId, PackageInfo};
use crate::store::AttributionStore;

/// Which manual attributions an export lists and how much of each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    FollowUp,
    CompactBom,
    DetailedBom,
}

impl ExportKind {
    pub const ALL: [ExportKind; 3] = [
        ExportKind::FollowUp,
        ExportKind::CompactBom,
        ExportKind::DetailedBom,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            ExportKind::FollowUp => "follow_up.csv",
            ExportKind::CompactBom => "compact_bom.csv",
            ExportKind::DetailedBom => "detailed_bom.csv",
        }
    }

    fn includes(self, info: &PackageInfo) -> bool {
        match self {
            ExportKind::FollowUp => info.follow_up,
            ExportKind::CompactBom => !info.first_party && !info.exclude_from_notice,
            ExportKind::DetailedBom => !info.exclude_from_notice,
        }
    }
}

const COMPACT_HEADER: [&str; 6] = ["Index", "Name", "Version", "License Name", "Copyright", "URL"];

const DETAILED_HEADER: [&str; 14] = [
    "Index",
    "Name",
    "Version",
    "Namespace",
    "Type",
    "PURL",
    "License Name",
    "License Text",
    "Copyright",
    "URL",
    "First Party",
    "Confidence",
    "Comment",
    "Resources",
];

fn text(v: &Option<String>) -> String {
    v.as_deref().unwrap_or_default().to_string()
}

fn rows<'a>(
    store: &'a AttributionStore,
    kind: ExportKind,
) -> Vec<(&'a AttributionId, &'a PackageInfo)> {
    let mut rows: Vec<(&AttributionId, &PackageInfo)> = store
        .manual()
        .entities()
        .iter()
        .filter(|(_, info)| kind.includes(info))
        .collect();
    rows.sort_by(|a, b| {
        a.1.display_name()
            .to_lowercase()
            .cmp(&b.1.display_name().to_lowercase())
            .then_with(|| a.0.cmp(b.0))
    });
    rows
}

fn resources_of(store: &AttributionStore, id: &AttributionId) -> String {
    store
        .manual()
        .links()
        .paths_of(id)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n")
}

fn writer() -> csv::Writer<Vec<u8>> {
    csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(vec![])
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> CoreResult<String> {
    let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn render_short(store: &AttributionStore, kind: ExportKind) -> CoreResult<String> {
    let mut wtr = writer();
    let mut header = COMPACT_HEADER.to_vec();
    if kind == ExportKind::FollowUp {
        header.push("Resources");
    }
    wtr.write_record(&header)?;
    for (idx, (id, info)) in rows(store, kind).into_iter().enumerate() {
        let mut record = vec![
            (idx + 1).to_string(),
            text(&info.package_name),
            text(&info.package_version),
            text(&info.license_name),
            text(&info.copyright),
            text(&info.url),
        ];
        if kind == ExportKind::FollowUp {
            record.push(resources_of(store, id));
        }
        wtr.write_record(&record)?;
    }
    finish(wtr)
}

pub fn render_follow_up_csv(store: &AttributionStore) -> CoreResult<String> {
    render_short(store, ExportKind::FollowUp)
}

pub fn render_compact_bom_csv(store: &AttributionStore) -> CoreResult<String> {
    render_short(store, ExportKind::CompactBom)
}

pub fn render_detailed_bom_csv(store: &AttributionStore) -> CoreResult<String> {
    let mut wtr = writer();
    wtr.write_record(DETAILED_HEADER)?;
    for (idx, (id, info)) in rows(store, ExportKind::DetailedBom).into_iter().enumerate() {
        wtr.write_record(&[
            (idx + 1).to_string(),
            text(&info.package_name),
            text(&info.package_version),
            text(&info.package_namespace),
            text(&info.package_type),
            info.purl().unwrap_or_default(),
            text(&info.license_name),
            text(&info.license_text),
            text(&info.copyright),
            text(&info.url),
            if info.first_party { "yes" } else { "no" }.to_string(),
            info.attribution_confidence
                .map(|c| u32::from(c).to_string())
                .unwrap_or_default(),
            info.comment_text(),
            resources_of(store, id),
        ])?;
    }
    finish(wtr)
}

pub fn render(store: &AttributionStore, kind: ExportKind) -> CoreResult<String> {
    match kind {
        ExportKind::FollowUp => render_follow_up_csv(store),
        ExportKind::CompactBom => render_compact_bom_csv(store),
        ExportKind::DetailedBom => render_detailed_bom_csv(store),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::LoadSnapshot;
    use serde_json::json;

    #[test]
    fn line_breaks_inside_fields_survive() {
        let snapshot: LoadSnapshot = serde_json::from_value(json!({
            "resources": {"a": 1},
            "manualAttributions": {
                "attributions": {"m": {
                    "packageName": "zlib",
                    "licenseName": "Zlib",
                    "licenseText": "line one\r\nline two"
                }},
                "resourcesToAttributions": {"/a": ["m"]}
            }
        }))
        .unwrap();
        let (_, store) = snapshot.build().unwrap();
        let csv = render_detailed_bom_csv(&store).unwrap();
        assert!(csv.contains("\"line one\r\nline two\""));
        assert!(!csv.contains(",/a\r\n"));
        assert!(csv.ends_with("/a\n"));
    }
}
