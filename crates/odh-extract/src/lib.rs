//! DCAT graph extraction into canonical catalog records.
//!
//! The extractor is a pure transform over an [`oxrdf::Graph`]: malformed
//! literals, dates and URIs degrade to `None`/raw values, they never abort a
//! page. A dataset subject yields a record only when it carries at least one
//! valid distribution and a description in at least one language.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use odh_core::{
    Checksum, CodeEntry, ContactPoint, Dataset, Distribution, Keyword, MultilingualText,
    PeriodOfTime, UriLabel, FALLBACK_THEME_CODE, LANGUAGES,
};
use oxrdf::{Graph, NamedNodeRef, SubjectRef, TermRef};
use oxrdfio::{RdfFormat, RdfParser};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

pub const CRATE_NAME: &str = "odh-extract";

/// Placeholder title/description language and text for distributions that
/// carry neither.
const DISTRIBUTION_TITLE_PLACEHOLDER: &str = "Untitled distribution";
const DISTRIBUTION_DESCRIPTION_PLACEHOLDER: &str = "No description provided";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to parse RDF feed page: {0}")]
    Rdf(#[from] oxrdfio::RdfParseError),
}

/// DCAT and companion vocabulary terms used by the extractor.
mod vocab {
    use oxrdf::NamedNodeRef;

    pub mod dcat {
        use super::NamedNodeRef;

        pub const DATASET: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://www.w3.org/ns/dcat#Dataset");
        pub const DISTRIBUTION: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://www.w3.org/ns/dcat#distribution");
        pub const THEME: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://www.w3.org/ns/dcat#theme");
        pub const KEYWORD: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://www.w3.org/ns/dcat#keyword");
        pub const CONTACT_POINT: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://www.w3.org/ns/dcat#contactPoint");
        pub const LANDING_PAGE: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://www.w3.org/ns/dcat#landingPage");
        pub const START_DATE: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://www.w3.org/ns/dcat#startDate");
        pub const END_DATE: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://www.w3.org/ns/dcat#endDate");
        pub const ACCESS_URL: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://www.w3.org/ns/dcat#accessURL");
        pub const DOWNLOAD_URL: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://www.w3.org/ns/dcat#downloadURL");
        pub const MEDIA_TYPE: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://www.w3.org/ns/dcat#mediaType");
        pub const BYTE_SIZE: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://www.w3.org/ns/dcat#byteSize");
        pub const VERSION: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://www.w3.org/ns/dcat#version");
    }

    pub mod dcterms {
        use super::NamedNodeRef;

        pub const IDENTIFIER: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://purl.org/dc/terms/identifier");
        pub const TITLE: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://purl.org/dc/terms/title");
        pub const DESCRIPTION: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://purl.org/dc/terms/description");
        pub const ISSUED: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://purl.org/dc/terms/issued");
        pub const MODIFIED: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://purl.org/dc/terms/modified");
        pub const LANGUAGE: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://purl.org/dc/terms/language");
        pub const ACCRUAL_PERIODICITY: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://purl.org/dc/terms/accrualPeriodicity");
        pub const SPATIAL: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://purl.org/dc/terms/spatial");
        pub const TEMPORAL: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://purl.org/dc/terms/temporal");
        pub const PERIOD_OF_TIME: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://purl.org/dc/terms/PeriodOfTime");
        pub const RELATION: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://purl.org/dc/terms/relation");
        pub const CONFORMS_TO: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://purl.org/dc/terms/conformsTo");
        pub const LICENSE: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://purl.org/dc/terms/license");
        pub const FORMAT: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://purl.org/dc/terms/format");
    }

    pub mod dcatap {
        use super::NamedNodeRef;

        pub const AVAILABILITY: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://data.europa.eu/r5r/availability");
    }

    pub mod spdx {
        use super::NamedNodeRef;

        pub const CHECKSUM: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://spdx.org/rdf/terms#checksum");
        pub const ALGORITHM: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://spdx.org/rdf/terms#algorithm");
        pub const CHECKSUM_VALUE: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://spdx.org/rdf/terms#checksumValue");
    }

    pub mod vcard {
        use super::NamedNodeRef;

        pub const FN: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://www.w3.org/2006/vcard/ns#fn");
        pub const HAS_EMAIL: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://www.w3.org/2006/vcard/ns#hasEmail");
        pub const HAS_ADDRESS: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://www.w3.org/2006/vcard/ns#hasAddress");
        pub const HAS_TELEPHONE: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://www.w3.org/2006/vcard/ns#hasTelephone");
        pub const NOTE: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://www.w3.org/2006/vcard/ns#note");
    }

    pub mod rdfs {
        use super::NamedNodeRef;

        pub const LABEL: NamedNodeRef<'_> =
            NamedNodeRef::new_unchecked("http://www.w3.org/2000/01/rdf-schema#label");
    }
}

/// Static code tables mapping vocabulary URIs onto target-catalog codes.
mod mappings {
    /// EU data-theme authority URIs -> target theme codes.
    pub const THEMES: &[(&str, &str)] = &[
        ("http://publications.europa.eu/resource/authority/data-theme/AGRI", "101"),
        ("http://publications.europa.eu/resource/authority/data-theme/ECON", "102"),
        ("http://publications.europa.eu/resource/authority/data-theme/EDUC", "103"),
        ("http://publications.europa.eu/resource/authority/data-theme/ENVI", "104"),
        ("http://publications.europa.eu/resource/authority/data-theme/GOVE", "105"),
        ("http://publications.europa.eu/resource/authority/data-theme/HEAL", "106"),
        ("http://publications.europa.eu/resource/authority/data-theme/INTR", "107"),
        ("http://publications.europa.eu/resource/authority/data-theme/JUST", "108"),
        ("http://publications.europa.eu/resource/authority/data-theme/REGI", "109"),
        ("http://publications.europa.eu/resource/authority/data-theme/SOCI", "110"),
        ("http://publications.europa.eu/resource/authority/data-theme/TECH", "111"),
        ("http://publications.europa.eu/resource/authority/data-theme/TRAN", "112"),
        ("http://publications.europa.eu/resource/authority/data-theme/ENER", "113"),
    ];

    /// IANA media-type registry URIs -> media type codes.
    pub const MEDIA_TYPES: &[(&str, &str)] = &[
        ("https://www.iana.org/assignments/media-types/text/csv", "text/csv"),
        ("http://www.iana.org/assignments/media-types/text/csv", "text/csv"),
        ("https://www.iana.org/assignments/media-types/application/json", "application/json"),
        ("https://www.iana.org/assignments/media-types/application/pdf", "application/pdf"),
        ("http://www.iana.org/assignments/media-types/application/pdf", "application/pdf"),
        ("https://www.iana.org/assignments/media-types/application/xml", "application/xml"),
        ("https://www.iana.org/assignments/media-types/application/zip", "application/zip"),
        ("https://www.iana.org/assignments/media-types/application/vnd.ms-excel", "application/vnd.ms-excel"),
    ];

    /// Language authority URIs -> two-letter codes of the fixed language set.
    pub const LANGUAGE_URIS: &[(&str, &str)] = &[
        ("http://publications.europa.eu/resource/authority/language/DEU", "de"),
        ("http://publications.europa.eu/resource/authority/language/GER", "de"),
        ("http://publications.europa.eu/resource/authority/language/ENG", "en"),
        ("http://publications.europa.eu/resource/authority/language/FRA", "fr"),
        ("http://publications.europa.eu/resource/authority/language/ITA", "it"),
        ("http://publications.europa.eu/resource/authority/language/ROH", "rm"),
        ("http://id.loc.gov/vocabulary/iso639-1/de", "de"),
        ("http://id.loc.gov/vocabulary/iso639-1/en", "en"),
        ("http://id.loc.gov/vocabulary/iso639-1/fr", "fr"),
        ("http://id.loc.gov/vocabulary/iso639-1/it", "it"),
        ("http://id.loc.gov/vocabulary/iso639-1/rm", "rm"),
    ];

    /// EU planned-availability vocabulary URIs -> availability codes.
    pub const AVAILABILITY: &[(&str, &str)] = &[
        ("http://data.europa.eu/r5r/availability/available", "AVAILABLE"),
        ("http://publications.europa.eu/resource/authority/planned-availability/AVAILABLE", "AVAILABLE"),
        ("http://data.europa.eu/r5r/availability/stable", "STABLE"),
        ("http://publications.europa.eu/resource/authority/planned-availability/STABLE", "STABLE"),
        ("http://data.europa.eu/r5r/availability/experimental", "EXPERIMENTAL"),
        ("http://publications.europa.eu/resource/authority/planned-availability/EXPERIMENTAL", "EXPERIMENTAL"),
        ("http://data.europa.eu/r5r/availability/temporary", "TEMPORARY"),
        ("http://publications.europa.eu/resource/authority/planned-availability/TEMPORARY", "TEMPORARY"),
    ];

    pub fn lookup(table: &'static [(&'static str, &'static str)], uri: &str) -> Option<&'static str> {
        table.iter().find(|(key, _)| *key == uri).map(|(_, code)| *code)
    }
}

/// Outcome of extracting one feed page.
#[derive(Debug, Default)]
pub struct PageExtraction {
    pub datasets: Vec<Dataset>,
    /// Number of `dcat:Dataset` subjects seen, valid or not. Zero signals the
    /// end of the paginated feed.
    pub subjects: usize,
    /// Subjects excluded for data-quality reasons (no valid distribution, no
    /// description, or no identifier).
    pub skipped: usize,
}

/// Parses one RDF/XML feed page into a graph.
pub fn parse_graph(data: &[u8]) -> Result<Graph, ExtractError> {
    let mut graph = Graph::new();
    for quad in RdfParser::from_format(RdfFormat::RdfXml).for_reader(data) {
        let quad = quad?;
        graph.insert(&oxrdf::Triple::new(quad.subject, quad.predicate, quad.object));
    }
    Ok(graph)
}

/// Extracts every dataset subject of a page, applying the validity filter.
pub fn extract_page(graph: &Graph) -> PageExtraction {
    let mut page = PageExtraction::default();
    for subject in graph.subjects_for_predicate_object(oxrdf::vocab::rdf::TYPE, vocab::dcat::DATASET) {
        page.subjects += 1;
        match extract_dataset(graph, subject) {
            Some(dataset) => page.datasets.push(dataset),
            None => {
                debug!(subject = %subject, "skipping invalid dataset subject");
                page.skipped += 1;
            }
        }
    }
    page
}

/// Extracts one dataset subject into a canonical record, or `None` when the
/// subject fails the validity invariant.
pub fn extract_dataset(graph: &Graph, subject: SubjectRef<'_>) -> Option<Dataset> {
    let identifiers: Vec<String> = graph
        .objects_for_subject_predicate(subject, vocab::dcterms::IDENTIFIER)
        .filter_map(term_text)
        .collect();
    if identifiers.is_empty() {
        return None;
    }

    let description = multilingual_literal(graph, subject, vocab::dcterms::DESCRIPTION);
    if description.is_empty() {
        return None;
    }

    let distributions: Vec<Distribution> = graph
        .objects_for_subject_predicate(subject, vocab::dcat::DISTRIBUTION)
        .filter_map(as_subject)
        .map(|dist| extract_distribution(graph, dist))
        .filter(Distribution::is_valid)
        .collect();
    if distributions.is_empty() {
        return None;
    }

    Some(Dataset {
        identifiers,
        title: multilingual_literal(graph, subject, vocab::dcterms::TITLE),
        description,
        distributions,
        themes: extract_themes(graph, subject),
        keywords: extract_keywords(graph, subject),
        temporal_coverage: extract_temporal_coverage(graph, subject),
        spatial: extract_spatial(graph, subject),
        accrual_periodicity: single_resource(graph, subject, vocab::dcterms::ACCRUAL_PERIODICITY)
            .map(|uri| CodeEntry::new(last_path_segment(&uri))),
        contact_points: extract_contact_points(graph, subject),
        languages: extract_languages(graph, subject),
        issued: date_literal(graph, subject, vocab::dcterms::ISSUED),
        modified: date_literal(graph, subject, vocab::dcterms::MODIFIED),
        version: graph
            .object_for_subject_predicate(subject, vocab::dcat::VERSION)
            .and_then(term_text),
        relations: extract_uri_labels(graph, subject, vocab::dcterms::RELATION),
        conforms_to: extract_uri_labels(graph, subject, vocab::dcterms::CONFORMS_TO),
        landing_page: single_resource(graph, subject, vocab::dcat::LANDING_PAGE),
        publisher: None,
    })
}

fn extract_distribution(graph: &Graph, subject: SubjectRef<'_>) -> Distribution {
    let mut title = multilingual_literal(graph, subject, vocab::dcterms::TITLE);
    if title.is_empty() {
        title.set("en", DISTRIBUTION_TITLE_PLACEHOLDER);
    }
    let mut description = multilingual_literal(graph, subject, vocab::dcterms::DESCRIPTION);
    if description.is_empty() {
        description.set("en", DISTRIBUTION_DESCRIPTION_PLACEHOLDER);
    }

    Distribution {
        title,
        description,
        format: graph
            .object_for_subject_predicate(subject, vocab::dcterms::FORMAT)
            .and_then(|term| format_code(term))
            .map(CodeEntry::new),
        media_type: graph
            .object_for_subject_predicate(subject, vocab::dcat::MEDIA_TYPE)
            .and_then(|term| media_type_code(term)),
        access_url: single_resource(graph, subject, vocab::dcat::ACCESS_URL).map(UriLabel::new),
        download_url: single_resource(graph, subject, vocab::dcat::DOWNLOAD_URL).map(UriLabel::new),
        license: single_resource(graph, subject, vocab::dcterms::LICENSE)
            .map(|uri| CodeEntry::new(last_path_segment(&uri))),
        availability: single_resource(graph, subject, vocab::dcatap::AVAILABILITY)
            .and_then(|uri| mappings::lookup(mappings::AVAILABILITY, &uri))
            .map(CodeEntry::new),
        checksum: extract_checksum(graph, subject),
        byte_size: graph
            .object_for_subject_predicate(subject, vocab::dcat::BYTE_SIZE)
            .and_then(term_text)
            .and_then(|v| v.trim().parse().ok()),
        conforms_to: extract_uri_labels(graph, subject, vocab::dcterms::CONFORMS_TO),
        coverage: extract_temporal_coverage(graph, subject),
    }
}

/// Collects language-tagged literals over the fixed language set, stripping
/// HTML markup down to plain text.
fn multilingual_literal(
    graph: &Graph,
    subject: SubjectRef<'_>,
    predicate: NamedNodeRef<'_>,
) -> MultilingualText {
    let mut text = MultilingualText::new();
    for term in graph.objects_for_subject_predicate(subject, predicate) {
        if let TermRef::Literal(literal) = term {
            if let Some(language) = literal.language() {
                if LANGUAGES.contains(&language) {
                    text.set(language, strip_html(literal.value()));
                }
            }
        }
    }
    text
}

/// Strips HTML markup from a literal, keeping only its text content.
pub fn strip_html(value: &str) -> String {
    if !value.contains('<') {
        return value.trim().to_string();
    }
    let fragment = scraper::Html::parse_fragment(value);
    fragment
        .root_element()
        .text()
        .collect::<String>()
        .trim()
        .to_string()
}

/// Normalizes a date literal to UTC ISO-8601: date-only values are promoted
/// to midnight, full timestamps re-serialized in UTC, anything else passes
/// through unchanged.
pub fn normalize_date(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.len() == 10 {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return format!("{}T00:00:00Z", date.format("%Y-%m-%d"));
        }
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(trimmed) {
        return timestamp
            .with_timezone(&Utc)
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string();
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
        return naive.and_utc().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    }
    trimmed.to_string()
}

fn date_literal(graph: &Graph, subject: SubjectRef<'_>, predicate: NamedNodeRef<'_>) -> Option<String> {
    graph
        .object_for_subject_predicate(subject, predicate)
        .and_then(term_text)
        .map(|v| normalize_date(&v))
}

/// Themes deduplicated by resolved code; the sentinel code is assigned when
/// nothing resolves.
fn extract_themes(graph: &Graph, subject: SubjectRef<'_>) -> Vec<CodeEntry> {
    let mut seen = std::collections::BTreeSet::new();
    let mut themes = Vec::new();
    for term in graph.objects_for_subject_predicate(subject, vocab::dcat::THEME) {
        let code = match term {
            TermRef::Literal(literal) => Some(literal.value().to_string()),
            TermRef::NamedNode(node) => {
                mappings::lookup(mappings::THEMES, node.as_str()).map(str::to_string)
            }
            _ => None,
        };
        if let Some(code) = code {
            if seen.insert(code.clone()) {
                themes.push(CodeEntry::new(code));
            }
        }
    }
    if themes.is_empty() {
        themes.push(CodeEntry::new(FALLBACK_THEME_CODE));
    }
    themes
}

/// Keywords with an explicit language tag; untagged keywords are dropped.
fn extract_keywords(graph: &Graph, subject: SubjectRef<'_>) -> Vec<Keyword> {
    let mut keywords = Vec::new();
    for term in graph.objects_for_subject_predicate(subject, vocab::dcat::KEYWORD) {
        if let TermRef::Literal(literal) = term {
            if let Some(language) = literal.language() {
                keywords.push(Keyword {
                    language: language.to_string(),
                    value: literal.value().to_string(),
                });
            }
        }
    }
    keywords
}

fn extract_languages(graph: &Graph, subject: SubjectRef<'_>) -> Vec<CodeEntry> {
    let mut languages = Vec::new();
    for term in graph.objects_for_subject_predicate(subject, vocab::dcterms::LANGUAGE) {
        let code = match term {
            TermRef::NamedNode(node) => {
                mappings::lookup(mappings::LANGUAGE_URIS, node.as_str()).map(str::to_string)
            }
            TermRef::Literal(literal) if LANGUAGES.contains(&literal.value()) => {
                Some(literal.value().to_string())
            }
            _ => None,
        };
        if let Some(code) = code {
            if !languages.iter().any(|l: &CodeEntry| l.code == code) {
                languages.push(CodeEntry::new(code));
            }
        }
    }
    languages
}

fn extract_temporal_coverage(graph: &Graph, subject: SubjectRef<'_>) -> Vec<PeriodOfTime> {
    let mut coverage = Vec::new();
    for term in graph.objects_for_subject_predicate(subject, vocab::dcterms::TEMPORAL) {
        let Some(period) = as_subject(term) else { continue };
        let typed = graph
            .objects_for_subject_predicate(period, oxrdf::vocab::rdf::TYPE)
            .any(|t| t == TermRef::from(vocab::dcterms::PERIOD_OF_TIME));
        if !typed {
            continue;
        }
        let entry = PeriodOfTime {
            start: date_literal(graph, period, vocab::dcat::START_DATE),
            end: date_literal(graph, period, vocab::dcat::END_DATE),
        };
        if !entry.is_empty() {
            coverage.push(entry);
        }
    }
    coverage
}

/// Spatial values: resource URIs reduce to their last path segment, literals
/// pass through.
fn extract_spatial(graph: &Graph, subject: SubjectRef<'_>) -> Vec<String> {
    graph
        .objects_for_subject_predicate(subject, vocab::dcterms::SPATIAL)
        .filter_map(|term| match term {
            TermRef::NamedNode(node) => Some(last_path_segment_raw(node.as_str())),
            TermRef::Literal(literal) => Some(literal.value().to_string()),
            _ => None,
        })
        .collect()
}

fn extract_contact_points(graph: &Graph, subject: SubjectRef<'_>) -> Vec<ContactPoint> {
    let mut contacts = Vec::new();
    for term in graph.objects_for_subject_predicate(subject, vocab::dcat::CONTACT_POINT) {
        let Some(contact) = as_subject(term) else { continue };
        let mut name = multilingual_literal(graph, contact, vocab::vcard::FN);
        if name.is_empty() {
            if let Some(plain) = graph
                .object_for_subject_predicate(contact, vocab::vcard::FN)
                .and_then(term_text)
            {
                name.set("de", plain);
            }
        }
        let email = graph
            .object_for_subject_predicate(contact, vocab::vcard::HAS_EMAIL)
            .and_then(term_text)
            .map(|e| e.strip_prefix("mailto:").unwrap_or(&e).to_string());
        let point = ContactPoint {
            name,
            has_email: email,
            has_address: multilingual_literal(graph, contact, vocab::vcard::HAS_ADDRESS),
            has_telephone: graph
                .object_for_subject_predicate(contact, vocab::vcard::HAS_TELEPHONE)
                .and_then(term_text),
            kind: "Organization".to_string(),
            note: multilingual_literal(graph, contact, vocab::vcard::NOTE),
        };
        if !point.is_empty() {
            contacts.push(point);
        }
    }
    contacts
}

fn extract_checksum(graph: &Graph, subject: SubjectRef<'_>) -> Option<Checksum> {
    let node = graph
        .object_for_subject_predicate(subject, vocab::spdx::CHECKSUM)
        .and_then(as_subject)?;
    let algorithm = single_resource(graph, node, vocab::spdx::ALGORITHM)
        .map(|uri| last_path_segment_raw(&uri))?;
    let value = graph
        .object_for_subject_predicate(node, vocab::spdx::CHECKSUM_VALUE)
        .and_then(term_text)?;
    Some(Checksum { algorithm, value })
}

/// Resource-valued predicates whose objects carry optional `rdfs:label`
/// translations. Feed values erroneously joined with semicolons are split and
/// each segment independently validated; invalid segments are dropped.
fn extract_uri_labels(
    graph: &Graph,
    subject: SubjectRef<'_>,
    predicate: NamedNodeRef<'_>,
) -> Vec<UriLabel> {
    let mut entries = Vec::new();
    for term in graph.objects_for_subject_predicate(subject, predicate) {
        match term {
            TermRef::NamedNode(node) => {
                let segments = split_joined_uris(node.as_str());
                let single = segments.len() == 1;
                for uri in segments {
                    let mut entry = UriLabel::new(uri);
                    if single {
                        entry.label = multilingual_literal(graph, node.into(), vocab::rdfs::LABEL);
                    }
                    entries.push(entry);
                }
            }
            TermRef::Literal(literal) => {
                for uri in split_joined_uris(literal.value()) {
                    entries.push(UriLabel::new(uri));
                }
            }
            _ => {}
        }
    }
    entries
}

/// Splits semicolon-joined URI values and keeps only well-formed segments.
pub fn split_joined_uris(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .filter_map(|segment| match Url::parse(segment) {
            Ok(_) => Some(segment.to_string()),
            Err(err) => {
                warn!(segment, %err, "dropping malformed relation URI segment");
                None
            }
        })
        .collect()
}

fn single_resource(graph: &Graph, subject: SubjectRef<'_>, predicate: NamedNodeRef<'_>) -> Option<String> {
    graph
        .object_for_subject_predicate(subject, predicate)
        .and_then(|term| match term {
            TermRef::NamedNode(node) => Some(node.as_str().to_string()),
            TermRef::Literal(literal) => Some(literal.value().to_string()),
            _ => None,
        })
}

/// Media types arrive either as IANA registry URIs or as bare codes; bare
/// `type/subtype` codes pass through.
fn media_type_code(term: TermRef<'_>) -> Option<String> {
    let value = match term {
        TermRef::NamedNode(node) => node.as_str(),
        TermRef::Literal(literal) => literal.value(),
        _ => return None,
    };
    if let Some(code) = mappings::lookup(mappings::MEDIA_TYPES, value) {
        return Some(code.to_string());
    }
    if !value.starts_with("http") && value.contains('/') {
        return Some(value.to_string());
    }
    // Unknown registry URI: fall back to the path tail, which is the
    // `type/subtype` pair for IANA-style URIs.
    value
        .rsplit('/')
        .take(2)
        .collect::<Vec<_>>()
        .split_first()
        .and_then(|(subtype, rest)| rest.first().map(|t| format!("{t}/{subtype}")))
}

/// Format codes reduce to the last URI path segment, uppercased.
fn format_code(term: TermRef<'_>) -> Option<String> {
    let value = match term {
        TermRef::NamedNode(node) => node.as_str().to_string(),
        TermRef::Literal(literal) => literal.value().to_string(),
        _ => return None,
    };
    let code = last_path_segment(&value);
    if code.is_empty() {
        None
    } else {
        Some(code)
    }
}

fn last_path_segment(uri: &str) -> String {
    last_path_segment_raw(uri).to_uppercase()
}

fn last_path_segment_raw(uri: &str) -> String {
    uri.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(uri)
        .to_string()
}

fn term_text(term: TermRef<'_>) -> Option<String> {
    match term {
        TermRef::Literal(literal) => Some(literal.value().to_string()),
        TermRef::NamedNode(node) => Some(node.as_str().to_string()),
        _ => None,
    }
}

fn as_subject(term: TermRef<'_>) -> Option<SubjectRef<'_>> {
    match term {
        TermRef::NamedNode(node) => Some(node.into()),
        TermRef::BlankNode(node) => Some(node.into()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns:dcat="http://www.w3.org/ns/dcat#"
         xmlns:dcterms="http://purl.org/dc/terms/">
  <dcat:Dataset rdf:about="https://data.example.org/dataset/population">
    <dcterms:identifier>pop-0001@publisher</dcterms:identifier>
    <dcterms:title xml:lang="de">Bev&#246;lkerung</dcterms:title>
    <dcterms:title xml:lang="fr">Population</dcterms:title>
    <dcterms:description xml:lang="de">&lt;p&gt;St&#228;ndige Wohnbev&#246;lkerung&lt;/p&gt;</dcterms:description>
    <dcterms:issued>2020-01-15</dcterms:issued>
    <dcterms:modified>2024-03-31T08:30:00+02:00</dcterms:modified>
    <dcat:theme rdf:resource="http://publications.europa.eu/resource/authority/data-theme/SOCI"/>
    <dcat:theme rdf:resource="http://publications.europa.eu/resource/authority/data-theme/SOCI"/>
    <dcat:keyword xml:lang="de">bevoelkerung</dcat:keyword>
    <dcat:keyword>untagged</dcat:keyword>
    <dcat:distribution rdf:resource="https://data.example.org/distribution/population-csv"/>
  </dcat:Dataset>
  <dcat:Distribution rdf:about="https://data.example.org/distribution/population-csv">
    <dcat:accessURL rdf:resource="https://data.example.org/files/population.csv"/>
    <dcterms:format rdf:resource="http://publications.europa.eu/resource/authority/file-type/csv"/>
  </dcat:Distribution>
  <dcat:Dataset rdf:about="https://data.example.org/dataset/report">
    <dcterms:identifier>rep-0002@publisher</dcterms:identifier>
    <dcterms:description xml:lang="de">Nur als PDF</dcterms:description>
    <dcat:distribution rdf:resource="https://data.example.org/distribution/report-pdf"/>
  </dcat:Dataset>
  <dcat:Distribution rdf:about="https://data.example.org/distribution/report-pdf">
    <dcat:mediaType rdf:resource="https://www.iana.org/assignments/media-types/application/pdf"/>
  </dcat:Distribution>
</rdf:RDF>"#;

    #[test]
    fn page_extraction_applies_validity_filter() {
        let graph = parse_graph(PAGE.as_bytes()).unwrap();
        let page = extract_page(&graph);

        assert_eq!(page.subjects, 2);
        assert_eq!(page.skipped, 1);
        assert_eq!(page.datasets.len(), 1);

        let dataset = &page.datasets[0];
        assert_eq!(dataset.primary_identifier(), Some("pop-0001@publisher"));
        assert_eq!(dataset.title.get("fr"), Some("Population"));
        // markup stripped from the description
        assert_eq!(dataset.description.get("de"), Some("Ständige Wohnbevölkerung"));
        assert_eq!(dataset.issued.as_deref(), Some("2020-01-15T00:00:00Z"));
        assert_eq!(dataset.modified.as_deref(), Some("2024-03-31T06:30:00Z"));
        assert_eq!(dataset.themes, vec![CodeEntry::new("110")]);
        assert_eq!(dataset.keywords.len(), 1);
        assert_eq!(dataset.keywords[0].language, "de");
        assert_eq!(dataset.distributions.len(), 1);
        assert_eq!(
            dataset.distributions[0].format,
            Some(CodeEntry::new("CSV"))
        );
    }

    #[test]
    fn unresolved_themes_fall_back_to_sentinel_code() {
        let page = r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns:dcat="http://www.w3.org/ns/dcat#"
         xmlns:dcterms="http://purl.org/dc/terms/">
  <dcat:Dataset rdf:about="https://data.example.org/dataset/x">
    <dcterms:identifier>x-1</dcterms:identifier>
    <dcterms:description xml:lang="en">Something</dcterms:description>
    <dcat:theme rdf:resource="https://vocab.example.org/unknown-theme"/>
    <dcat:distribution rdf:resource="https://data.example.org/distribution/x"/>
  </dcat:Dataset>
  <dcat:Distribution rdf:about="https://data.example.org/distribution/x">
    <dcat:accessURL rdf:resource="https://data.example.org/files/x.csv"/>
  </dcat:Distribution>
</rdf:RDF>"#;
        let graph = parse_graph(page.as_bytes()).unwrap();
        let extraction = extract_page(&graph);
        assert_eq!(extraction.datasets.len(), 1);
        assert_eq!(
            extraction.datasets[0].themes,
            vec![CodeEntry::new(FALLBACK_THEME_CODE)]
        );
    }

    #[test]
    fn date_normalization_covers_all_shapes() {
        assert_eq!(normalize_date("2024-05-01"), "2024-05-01T00:00:00Z");
        assert_eq!(
            normalize_date("2024-05-01T12:00:00+02:00"),
            "2024-05-01T10:00:00Z"
        );
        assert_eq!(normalize_date("2024-05-01T12:00:00Z"), "2024-05-01T12:00:00Z");
        assert_eq!(normalize_date("2024-05-01T12:00:00"), "2024-05-01T12:00:00Z");
        assert_eq!(normalize_date("not a date"), "not a date");
    }

    #[test]
    fn semicolon_joined_uris_are_split_and_validated() {
        let segments = split_joined_uris(
            "https://a.example.org/doc;https://b.example.org/doc;not a uri",
        );
        assert_eq!(
            segments,
            vec![
                "https://a.example.org/doc".to_string(),
                "https://b.example.org/doc".to_string(),
            ]
        );
    }

    #[test]
    fn html_stripping_keeps_plain_text_untouched() {
        assert_eq!(strip_html("plain text"), "plain text");
        assert_eq!(
            strip_html("<p>Eine <b>wichtige</b> Beschreibung</p>"),
            "Eine wichtige Beschreibung"
        );
    }
}
