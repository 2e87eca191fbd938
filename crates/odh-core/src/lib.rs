//! Canonical catalog records and reconciliation status types for ODH.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "odh-core";

/// Fixed language set recognized across the whole pipeline.
pub const LANGUAGES: [&str; 5] = ["de", "en", "fr", "it", "rm"];

/// Theme code assigned when no theme of a dataset resolves to a known code.
pub const FALLBACK_THEME_CODE: &str = "125";

pub const MEDIA_TYPE_PDF: &str = "application/pdf";

/// Multilingual text over the fixed language set. Unknown language tags and
/// empty values are dropped on insert; iteration order is the canonical
/// de/en/fr/it/rm order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MultilingualText(BTreeMap<String, String>);

impl MultilingualText {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, language: &str, value: impl Into<String>) {
        let value = value.into();
        if LANGUAGES.contains(&language) && !value.trim().is_empty() {
            self.0.insert(language.to_string(), value);
        }
    }

    pub fn get(&self, language: &str) -> Option<&str> {
        self.0.get(language).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// First value in canonical language order, if any.
    pub fn first(&self) -> Option<&str> {
        self.0.values().next().map(String::as_str)
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let mut text = Self::new();
        for (language, value) in pairs {
            let language = language.into();
            text.set(&language, value);
        }
        text
    }
}

/// A plain code entry as the target catalog expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeEntry {
    pub code: String,
}

impl CodeEntry {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

/// A URI paired with an optional multilingual label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UriLabel {
    pub uri: String,
    #[serde(default, skip_serializing_if = "MultilingualText::is_empty")]
    pub label: MultilingualText,
}

impl UriLabel {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            label: MultilingualText::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodOfTime {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl PeriodOfTime {
    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksum {
    pub algorithm: String,
    pub value: String,
}

/// A language-tagged keyword; only keywords carrying an explicit tag survive
/// extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    pub language: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactPoint {
    #[serde(rename = "fn")]
    pub name: MultilingualText,
    pub has_email: Option<String>,
    #[serde(default, skip_serializing_if = "MultilingualText::is_empty")]
    pub has_address: MultilingualText,
    pub has_telephone: Option<String>,
    pub kind: String,
    #[serde(default, skip_serializing_if = "MultilingualText::is_empty")]
    pub note: MultilingualText,
}

impl ContactPoint {
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
            && self.has_email.is_none()
            && self.has_address.is_empty()
            && self.has_telephone.is_none()
            && self.note.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publisher {
    pub identifier: String,
}

/// One accessible representation of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    pub title: MultilingualText,
    pub description: MultilingualText,
    pub format: Option<CodeEntry>,
    pub media_type: Option<String>,
    pub access_url: Option<UriLabel>,
    pub download_url: Option<UriLabel>,
    pub license: Option<CodeEntry>,
    pub availability: Option<CodeEntry>,
    pub checksum: Option<Checksum>,
    pub byte_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conforms_to: Vec<UriLabel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coverage: Vec<PeriodOfTime>,
}

impl Distribution {
    /// A distribution is invalid if its media-type or format code denotes PDF.
    pub fn is_valid(&self) -> bool {
        if self
            .media_type
            .as_deref()
            .is_some_and(|m| m.eq_ignore_ascii_case(MEDIA_TYPE_PDF))
        {
            return false;
        }
        if self
            .format
            .as_ref()
            .is_some_and(|f| f.code.eq_ignore_ascii_case("pdf"))
        {
            return false;
        }
        true
    }

    /// Access URL, falling back to the download URL.
    pub fn best_url(&self) -> Option<&str> {
        self.access_url
            .as_ref()
            .or(self.download_url.as_ref())
            .map(|u| u.uri.as_str())
    }
}

/// Canonical dataset record extracted from the source feed for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub identifiers: Vec<String>,
    pub title: MultilingualText,
    pub description: MultilingualText,
    pub distributions: Vec<Distribution>,
    pub themes: Vec<CodeEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<Keyword>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub temporal_coverage: Vec<PeriodOfTime>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spatial: Vec<String>,
    pub accrual_periodicity: Option<CodeEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contact_points: Vec<ContactPoint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub languages: Vec<CodeEntry>,
    pub issued: Option<String>,
    pub modified: Option<String>,
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relations: Vec<UriLabel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conforms_to: Vec<UriLabel>,
    pub landing_page: Option<String>,
    pub publisher: Option<Publisher>,
}

impl Dataset {
    /// The primary key distinguishing this dataset across source and target.
    pub fn primary_identifier(&self) -> Option<&str> {
        self.identifiers.first().map(String::as_str)
    }

    /// A dataset may be submitted only with at least one valid distribution
    /// and a description in at least one language.
    pub fn is_submittable(&self) -> bool {
        !self.description.is_empty() && self.distributions.iter().any(Distribution::is_valid)
    }
}

/// Inferred datatype of a tabular column or dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataType {
    String,
    Integer,
    Decimal,
    Boolean,
    Date,
    GYear,
}

impl DataType {
    /// Local name of the corresponding XSD datatype.
    pub fn xsd_local_name(self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Integer => "integer",
            DataType::Decimal => "decimal",
            DataType::Boolean => "boolean",
            DataType::Date => "date",
            DataType::GYear => "gYear",
        }
    }
}

/// One typed column/dimension inferred from a distribution's file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub labels: MultilingualText,
    pub datatype: DataType,
}

/// Ordered set of properties describing one dataset structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySet {
    pub identifier: String,
    pub title: MultilingualText,
    pub description: MultilingualText,
    pub properties: Vec<Property>,
}

/// Reconciliation action taken for one dataset identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Created,
    Updated,
    Unchanged,
    Deleted,
}

impl SyncAction {
    pub const ALL: [SyncAction; 4] = [
        SyncAction::Created,
        SyncAction::Updated,
        SyncAction::Unchanged,
        SyncAction::Deleted,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SyncAction::Created => "Created",
            SyncAction::Updated => "Updated",
            SyncAction::Unchanged => "Unchanged",
            SyncAction::Deleted => "Deleted",
        }
    }
}

/// Four disjoint identifier -> remote-id maps, one per action. Persisted as
/// JSON at the end of a run for downstream consumption.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMap {
    pub created: BTreeMap<String, String>,
    pub updated: BTreeMap<String, String>,
    pub unchanged: BTreeMap<String, String>,
    pub deleted: BTreeMap<String, String>,
}

impl StatusMap {
    pub fn record(&mut self, action: SyncAction, identifier: impl Into<String>, id: impl Into<String>) {
        self.bucket_mut(action).insert(identifier.into(), id.into());
    }

    pub fn bucket(&self, action: SyncAction) -> &BTreeMap<String, String> {
        match action {
            SyncAction::Created => &self.created,
            SyncAction::Updated => &self.updated,
            SyncAction::Unchanged => &self.unchanged,
            SyncAction::Deleted => &self.deleted,
        }
    }

    fn bucket_mut(&mut self, action: SyncAction) -> &mut BTreeMap<String, String> {
        match action {
            SyncAction::Created => &mut self.created,
            SyncAction::Updated => &mut self.updated,
            SyncAction::Unchanged => &mut self.unchanged,
            SyncAction::Deleted => &mut self.deleted,
        }
    }

    pub fn len(&self) -> usize {
        SyncAction::ALL.iter().map(|a| self.bucket(*a).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Union of identifiers across all four buckets.
    pub fn identifiers(&self) -> BTreeSet<&str> {
        SyncAction::ALL
            .iter()
            .flat_map(|a| self.bucket(*a).keys())
            .map(String::as_str)
            .collect()
    }

    /// True iff the four buckets are pairwise disjoint.
    pub fn is_partition(&self) -> bool {
        self.identifiers().len() == self.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multilingual_text_drops_unknown_languages_and_blanks() {
        let mut text = MultilingualText::new();
        text.set("de", "Bevölkerung");
        text.set("xx", "ignored");
        text.set("fr", "   ");
        assert_eq!(text.len(), 1);
        assert_eq!(text.get("de"), Some("Bevölkerung"));
        assert_eq!(text.first(), Some("Bevölkerung"));
    }

    #[test]
    fn pdf_distribution_is_invalid_via_media_type_or_format() {
        let by_media = Distribution {
            media_type: Some("application/pdf".to_string()),
            ..Distribution::default()
        };
        let by_format = Distribution {
            format: Some(CodeEntry::new("PDF")),
            ..Distribution::default()
        };
        let csv = Distribution {
            format: Some(CodeEntry::new("CSV")),
            media_type: Some("text/csv".to_string()),
            ..Distribution::default()
        };
        assert!(!by_media.is_valid());
        assert!(!by_format.is_valid());
        assert!(csv.is_valid());
    }

    #[test]
    fn dataset_without_description_or_valid_distribution_is_not_submittable() {
        let mut dataset = Dataset {
            identifiers: vec!["ds-1".to_string()],
            ..Dataset::default()
        };
        dataset.description.set("de", "Eine Beschreibung");
        assert!(!dataset.is_submittable());

        dataset.distributions.push(Distribution {
            media_type: Some("application/pdf".to_string()),
            ..Distribution::default()
        });
        assert!(!dataset.is_submittable());

        dataset.distributions.push(Distribution {
            media_type: Some("text/csv".to_string()),
            ..Distribution::default()
        });
        assert!(dataset.is_submittable());
    }

    #[test]
    fn status_map_partition_detects_overlap() {
        let mut status = StatusMap::default();
        status.record(SyncAction::Created, "a", "id-a");
        status.record(SyncAction::Updated, "b", "id-b");
        status.record(SyncAction::Deleted, "c", "id-c");
        assert!(status.is_partition());
        assert_eq!(status.identifiers().len(), 3);

        status.record(SyncAction::Unchanged, "a", "id-a2");
        assert!(!status.is_partition());
    }

    #[test]
    fn data_type_serializes_with_lower_camel_names() {
        assert_eq!(serde_json::to_string(&DataType::GYear).unwrap(), "\"gYear\"");
        assert_eq!(serde_json::to_string(&DataType::String).unwrap(), "\"string\"");
        assert_eq!(DataType::GYear.xsd_local_name(), "gYear");
    }
}
