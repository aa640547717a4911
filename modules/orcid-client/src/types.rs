use serde::Deserialize;
use serde_json::Value;

// --- Normalized output types ---

/// A researcher record flattened out of the ORCID `/record` document.
#[derive(Debug, Clone)]
pub struct OrcidProfile {
    pub orcid_id: String,
    pub given_names: Option<String>,
    pub family_name: Option<String>,
    pub works: Vec<OrcidWork>,
    /// The untouched response body, kept for auditing.
    pub api_raw: Value,
}

/// One work summary from the record's activities section.
#[derive(Debug, Clone, PartialEq)]
pub struct OrcidWork {
    pub title: Option<String>,
    pub year: Option<i32>,
    /// Normalized DOI (lowercase, no resolver prefix), if the work carries one.
    pub doi: Option<String>,
    pub work_type: Option<String>,
}

/// Strip resolver prefixes and lowercase a DOI. Returns `None` for blanks.
pub fn normalize_doi(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let lower = trimmed.to_lowercase();
    let stripped = [
        "https://doi.org/",
        "http://doi.org/",
        "https://dx.doi.org/",
        "http://dx.doi.org/",
        "doi:",
    ]
    .iter()
    .find_map(|prefix| lower.strip_prefix(prefix))
    .unwrap_or(&lower)
    .trim();
    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_string())
    }
}

// --- Wire types (ORCID v3.0 JSON) ---

#[derive(Debug, Clone, Deserialize, Default)]
pub(crate) struct RecordResponse {
    #[serde(default)]
    pub person: Option<PersonSection>,
    #[serde(rename = "activities-summary", default)]
    pub activities_summary: Option<ActivitiesSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PersonSection {
    #[serde(default)]
    pub name: Option<NameSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct NameSection {
    #[serde(rename = "given-names", default)]
    pub given_names: Option<ValueField>,
    #[serde(rename = "family-name", default)]
    pub family_name: Option<ValueField>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ValueField {
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ActivitiesSummary {
    #[serde(default)]
    pub works: Option<WorksSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WorksSection {
    #[serde(default)]
    pub group: Vec<WorkGroup>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WorkGroup {
    #[serde(rename = "work-summary", default)]
    pub work_summary: Vec<WorkSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WorkSummary {
    #[serde(default)]
    pub title: Option<TitleSection>,
    #[serde(rename = "publication-date", default)]
    pub publication_date: Option<PublicationDate>,
    #[serde(rename = "external-ids", default)]
    pub external_ids: Option<ExternalIds>,
    #[serde(rename = "type", default)]
    pub work_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TitleSection {
    #[serde(default)]
    pub title: Option<ValueField>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PublicationDate {
    #[serde(default)]
    pub year: Option<ValueField>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ExternalIds {
    #[serde(rename = "external-id", default)]
    pub external_id: Vec<ExternalId>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ExternalId {
    #[serde(rename = "external-id-type", default)]
    pub id_type: Option<String>,
    #[serde(rename = "external-id-value", default)]
    pub id_value: Option<String>,
}

fn value_of(field: Option<ValueField>) -> Option<String> {
    field
        .and_then(|f| f.value)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl WorkSummary {
    fn into_work(self) -> OrcidWork {
        let doi = self.external_ids.and_then(|ids| {
            ids.external_id
                .into_iter()
                .filter(|id| id.id_type.as_deref().is_some_and(|t| t.eq_ignore_ascii_case("doi")))
                .find_map(|id| id.id_value.as_deref().and_then(normalize_doi))
        });

        OrcidWork {
            title: self.title.and_then(|t| value_of(t.title)),
            year: self
                .publication_date
                .and_then(|d| value_of(d.year))
                .and_then(|y| y.parse().ok()),
            doi,
            work_type: self.work_type,
        }
    }
}

impl RecordResponse {
    /// Flatten the record. Each work group contributes its first summary,
    /// which ORCID orders as the preferred source.
    pub(crate) fn into_profile(self, orcid_id: &str, api_raw: Value) -> OrcidProfile {
        let (given_names, family_name) = match self.person.and_then(|p| p.name) {
            Some(name) => (value_of(name.given_names), value_of(name.family_name)),
            None => (None, None),
        };

        let works = self
            .activities_summary
            .and_then(|a| a.works)
            .map(|w| w.group)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|group| group.work_summary.into_iter().next())
            .map(WorkSummary::into_work)
            .collect();

        OrcidProfile {
            orcid_id: orcid_id.to_string(),
            given_names,
            family_name,
            works,
            api_raw,
        }
    }
}
