//! Structure inference over distribution files and SHACL shape generation.
//!
//! Importers are concrete variants behind the [`StructureImporter`] capability
//! trait, tried in fixed registry order; the first importer whose
//! `can_process` matches a distribution wins. A failure while downloading or
//! parsing one distribution is scoped to that candidate; the caller moves on
//! to the next one.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use encoding_rs::{Encoding, WINDOWS_1252};
use odh_client::{ApiClient, ApiError};
use odh_core::{DataType, Distribution, MultilingualText, Property, PropertySet};
use oxrdf::{Graph, Literal, NamedNode, NamedNodeRef, QuadRef, TripleRef};
use oxrdfio::{RdfFormat, RdfSerializer};
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

pub const CRATE_NAME: &str = "odh-structure";

/// First ranged fetch size; doubled until the content marker appears.
const INITIAL_FETCH_BYTES: u64 = 1024 * 1024;
/// Hard cap for the progressive download.
const MAX_FETCH_BYTES: u64 = 64 * 1024 * 1024;

/// Marker separating the metadata head of a dimensional table file from its
/// data block. Everything the importer needs sits before it.
const TABLE_DATA_MARKER: &str = "DATA=";

/// Rows sampled per column for datatype inference.
const MAX_SAMPLE_ROWS: usize = 50;

const DELIMITERS: [u8; 3] = [b',', b';', b'\t'];

/// Year keywords over the supported label languages.
const YEAR_KEYWORDS: [&str; 5] = ["jahr", "year", "année", "annee", "anno"];

const TRUE_TOKENS: [&str; 9] = ["true", "wahr", "vrai", "vero", "ja", "oui", "sì", "si", "yes"];
const FALSE_TOKENS: [&str; 7] = ["false", "falsch", "faux", "falso", "nein", "non", "no"];

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d.%m.%Y", "%d/%m/%Y", "%Y/%m/%d"];

#[derive(Debug, Error)]
pub enum StructureError {
    #[error("distribution has no access or download URL")]
    MissingUrl,
    #[error("no identifier could be derived for the distribution")]
    MissingIdentifier,
    #[error("file content is empty or carries no usable structure")]
    EmptyContent,
    #[error("content marker {marker:?} not found within {limit} bytes")]
    MarkerNotFound { marker: String, limit: u64 },
    #[error("failed to parse file content: {0}")]
    Parse(String),
    #[error("failed to build shape document: {0}")]
    Shape(String),
    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, Clone)]
pub struct StructureConfig {
    /// Download endpoint for dimensional tables; `{id}` is replaced with the
    /// inferred table identifier.
    pub table_download_url: String,
    /// Namespace under which shape and property URIs are minted.
    pub shape_namespace: String,
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            table_download_url: "https://www.pxweb.bfs.admin.ch/DownloadFile.aspx?file={id}"
                .to_string(),
            shape_namespace: "https://www.i14y.admin.ch/resources/datasets/structure/".to_string(),
        }
    }
}

/// Capability interface every importer variant implements.
#[async_trait]
pub trait StructureImporter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this importer understands the given distribution.
    fn can_process(&self, distribution: &Distribution) -> bool;

    /// Stable identifier of the underlying file, used for candidate
    /// deduplication and shape naming.
    fn identifier(&self, distribution: &Distribution) -> Option<String>;

    /// Downloads a prefix of the file and infers its typed properties.
    async fn download_and_parse(
        &self,
        client: &ApiClient,
        distribution: &Distribution,
    ) -> Result<PropertySet, StructureError>;
}

/// Importer variants in priority order; first match wins.
pub fn importer_registry(config: &StructureConfig) -> Vec<Box<dyn StructureImporter>> {
    vec![
        Box::new(DimensionalTableImporter::new(config.table_download_url.clone())),
        Box::new(DelimitedTextImporter),
    ]
}

/// Walks the registry in order and returns the first matching importer.
pub fn find_importer<'a>(
    registry: &'a [Box<dyn StructureImporter>],
    distribution: &Distribution,
) -> Option<&'a dyn StructureImporter> {
    registry
        .iter()
        .find(|importer| importer.can_process(distribution))
        .map(Box::as_ref)
}

/// Matches each distribution against the registry and deduplicates candidates
/// resolving to the same inferred identifier (case-insensitive).
pub fn processable_candidates<'a>(
    registry: &'a [Box<dyn StructureImporter>],
    distributions: &'a [Distribution],
) -> Vec<(&'a Distribution, &'a dyn StructureImporter, String)> {
    let mut seen = std::collections::BTreeSet::new();
    let mut candidates = Vec::new();
    for distribution in distributions {
        let Some(importer) = find_importer(registry, distribution) else {
            continue;
        };
        let Some(identifier) = importer.identifier(distribution) else {
            continue;
        };
        if seen.insert(identifier.to_lowercase()) {
            candidates.push((distribution, importer, identifier));
        } else {
            debug!(identifier, importer = importer.name(), "skipping duplicate candidate");
        }
    }
    candidates
}

/// Downloads a growing prefix of `url`, doubling from 1 MB, until `marker`
/// appears in the body. A body shorter than the requested range is the whole
/// file and is returned as-is; hitting the size cap without the marker is an
/// error. The boolean is true when the body is complete.
pub async fn download_until_marker(
    client: &ApiClient,
    url: &str,
    marker: &str,
) -> Result<(Vec<u8>, bool), StructureError> {
    let mut limit = INITIAL_FETCH_BYTES;
    loop {
        let body = client.fetch_prefix(url, limit).await?;
        let complete = (body.len() as u64) < limit;
        if complete || contains_marker(&body, marker) {
            return Ok((body, complete));
        }
        if limit >= MAX_FETCH_BYTES {
            return Err(StructureError::MarkerNotFound {
                marker: marker.to_string(),
                limit,
            });
        }
        limit *= 2;
    }
}

fn contains_marker(body: &[u8], marker: &str) -> bool {
    let marker = marker.as_bytes();
    !marker.is_empty() && body.windows(marker.len()).any(|window| window == marker)
}

/// Decodes file bytes: BOM-declared encoding, then strict UTF-8, then
/// windows-1252 as the replacement fallback.
pub fn decode_text(bytes: &[u8]) -> String {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return encoding.decode(bytes).0.into_owned();
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => WINDOWS_1252.decode(bytes).0.into_owned(),
    }
}

/// Derives a camelCase property name from a label; non-alphanumeric
/// characters become word boundaries. An empty result falls back to the
/// given placeholder.
pub fn property_name(label: &str, fallback: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let mut words = cleaned.split_whitespace();
    let Some(first) = words.next() else {
        return fallback.to_string();
    };
    let mut name = first.to_lowercase();
    for word in words {
        let mut chars = word.chars();
        if let Some(initial) = chars.next() {
            name.extend(initial.to_uppercase());
            name.push_str(&chars.as_str().to_lowercase());
        }
    }
    name
}

/// True when the label contains a year keyword in any supported language.
pub fn is_year_label(label: &str) -> bool {
    let lower = label.to_lowercase();
    YEAR_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

/// Picks the delimiter yielding the most columns on the header row. Ties keep
/// the earlier candidate, so a delimiter only wins by strictly more columns.
pub fn infer_delimiter(header_line: &str) -> u8 {
    let mut best = DELIMITERS[0];
    let mut max_columns = 0usize;
    for &delimiter in &DELIMITERS {
        let columns = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .from_reader(header_line.as_bytes())
            .records()
            .next()
            .and_then(Result::ok)
            .map(|record| record.len())
            .unwrap_or(0);
        if columns > max_columns {
            max_columns = columns;
            best = delimiter;
        }
    }
    best
}

/// Value-based datatype inference: boolean tokens, then integer, then decimal
/// (comma decimal separators tolerated), then the fixed date format list,
/// then string.
pub fn infer_datatype(values: &[String]) -> DataType {
    let non_empty: Vec<&str> = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect();
    if non_empty.is_empty() {
        return DataType::String;
    }
    if non_empty.iter().all(|v| is_boolean_token(v)) {
        return DataType::Boolean;
    }
    if non_empty.iter().all(|v| v.parse::<i64>().is_ok()) {
        return DataType::Integer;
    }
    if non_empty
        .iter()
        .all(|v| v.replace(',', ".").parse::<f64>().is_ok())
    {
        return DataType::Decimal;
    }
    if non_empty.iter().all(|v| is_date_value(v)) {
        return DataType::Date;
    }
    DataType::String
}

fn is_boolean_token(value: &str) -> bool {
    let lower = value.to_lowercase();
    TRUE_TOKENS.contains(&lower.as_str()) || FALSE_TOKENS.contains(&lower.as_str())
}

fn is_date_value(value: &str) -> bool {
    DATE_FORMATS
        .iter()
        .any(|format| NaiveDate::parse_from_str(value, format).is_ok())
}

// ---------------------------------------------------------------------------
// Dimensional-table importer
// ---------------------------------------------------------------------------

/// Importer for government statistical tables published under the
/// `px-x-<nnn>_<nnn>` naming pattern. Metadata keyword blocks before the data
/// marker describe row (STUB) and column (HEADING) dimensions per language.
pub struct DimensionalTableImporter {
    download_url: String,
    url_pattern: Regex,
    id_pattern: Regex,
}

impl DimensionalTableImporter {
    pub fn new(download_url: String) -> Self {
        Self {
            download_url,
            url_pattern: Regex::new(r"(?i)px-x-\d+_\d+").expect("table url pattern compiles"),
            id_pattern: Regex::new(r"^px-x-\d+_\d+").expect("table id pattern compiles"),
        }
    }
}

#[async_trait]
impl StructureImporter for DimensionalTableImporter {
    fn name(&self) -> &'static str {
        "dimensional-table"
    }

    fn can_process(&self, distribution: &Distribution) -> bool {
        let Some(url) = distribution.best_url() else {
            return false;
        };
        let clean = url.split(['?', '#']).next().unwrap_or(url);
        self.url_pattern.is_match(clean)
    }

    fn identifier(&self, distribution: &Distribution) -> Option<String> {
        let raw = distribution.best_url()?;
        let path = Url::parse(raw)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| raw.split(['?', '#']).next().unwrap_or(raw).to_string());
        let basename = path.rsplit('/').next().unwrap_or(&path);
        let basename = basename.split('.').next().unwrap_or(basename);
        if self.id_pattern.is_match(&basename.to_lowercase()) {
            Some(basename.to_string())
        } else {
            None
        }
    }

    async fn download_and_parse(
        &self,
        client: &ApiClient,
        distribution: &Distribution,
    ) -> Result<PropertySet, StructureError> {
        let identifier = self
            .identifier(distribution)
            .ok_or(StructureError::MissingIdentifier)?;
        let url = self.download_url.replace("{id}", &identifier);
        let (bytes, _) = download_until_marker(client, &url, TABLE_DATA_MARKER).await?;
        let content = decode_text(&bytes);
        parse_table_metadata(&content, &identifier)
    }
}

/// Parses the metadata head of a dimensional table file.
pub fn parse_table_metadata(content: &str, identifier: &str) -> Result<PropertySet, StructureError> {
    let title = MultilingualText::from_pairs(keyword_blocks(content, "TITLE"));
    let description = MultilingualText::from_pairs(keyword_blocks(content, "DESCRIPTION"));

    // Row dimensions: one entry per position, labels collected per language.
    let mut stub_dimensions: Vec<MultilingualText> = Vec::new();
    for (language, list) in keyword_blocks(content, "STUB") {
        for (index, label) in split_quoted_list(&list).into_iter().enumerate() {
            while stub_dimensions.len() <= index {
                stub_dimensions.push(MultilingualText::new());
            }
            stub_dimensions[index].set(&language, label);
        }
    }

    // Column dimension: usually a single labeled axis.
    let mut heading = MultilingualText::new();
    for (language, label) in keyword_blocks(content, "HEADING") {
        heading.set(&language, label.trim());
    }

    let mut properties = Vec::new();
    for labels in stub_dimensions.into_iter().chain(
        (!heading.is_empty())
            .then_some(heading)
            .into_iter(),
    ) {
        let Some(first) = labels.first() else { continue };
        let name = property_name(first, "property");
        let datatype = if labels.iter().any(|(_, label)| is_year_label(label)) {
            DataType::GYear
        } else {
            DataType::String
        };
        properties.push(Property {
            name,
            labels,
            datatype,
        });
    }

    if properties.is_empty() {
        return Err(StructureError::EmptyContent);
    }

    Ok(PropertySet {
        identifier: identifier.to_string(),
        title,
        description,
        properties,
    })
}

/// Collects `KEYWORD[lang]="...";` blocks; a missing language bracket means
/// the file's default language, "de".
fn keyword_blocks(content: &str, keyword: &str) -> Vec<(String, String)> {
    let pattern = format!(r#"(?ms)^{keyword}(?:\[([A-Za-z]{{2}})\])?="(.*?)";"#);
    let regex = Regex::new(&pattern).expect("keyword pattern compiles");
    regex
        .captures_iter(content)
        .map(|captures| {
            let language = captures
                .get(1)
                .map(|m| m.as_str().to_lowercase())
                .unwrap_or_else(|| "de".to_string());
            let value = captures.get(2).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
            (language, value)
        })
        .collect()
}

/// Splits a `"a","b","c"` keyword list into its items.
fn split_quoted_list(raw: &str) -> Vec<String> {
    raw.split("\",\"")
        .map(|part| part.trim().trim_matches('"').trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Delimited-text importer
// ---------------------------------------------------------------------------

/// Importer for delimited text files, matched via declared format, declared
/// media type, or URL extension.
pub struct DelimitedTextImporter;

#[async_trait]
impl StructureImporter for DelimitedTextImporter {
    fn name(&self) -> &'static str {
        "delimited-text"
    }

    fn can_process(&self, distribution: &Distribution) -> bool {
        if distribution
            .format
            .as_ref()
            .is_some_and(|f| f.code.to_lowercase().contains("csv"))
        {
            return true;
        }
        if distribution
            .media_type
            .as_deref()
            .is_some_and(|m| m.to_lowercase().contains("csv"))
        {
            return true;
        }
        distribution.best_url().is_some_and(|url| {
            url.split(['?', '#'])
                .next()
                .unwrap_or(url)
                .to_lowercase()
                .ends_with(".csv")
        })
    }

    fn identifier(&self, distribution: &Distribution) -> Option<String> {
        let url = distribution.best_url()?;
        let name = url
            .rsplit('/')
            .next()
            .and_then(|tail| tail.split(['?', '#']).next())
            .unwrap_or_default();
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }

    async fn download_and_parse(
        &self,
        client: &ApiClient,
        distribution: &Distribution,
    ) -> Result<PropertySet, StructureError> {
        let url = distribution.best_url().ok_or(StructureError::MissingUrl)?;
        let identifier = self
            .identifier(distribution)
            .ok_or(StructureError::MissingIdentifier)?;
        let (bytes, complete) = download_until_marker(client, url, "\n").await?;
        let mut content = decode_text(&bytes);
        if !complete {
            // A truncated prefix may end mid-row; drop the partial line.
            if let Some(position) = content.rfind('\n') {
                content.truncate(position);
            }
        }
        parse_delimited_content(&content, &identifier)
    }
}

/// Parses the header and up to [`MAX_SAMPLE_ROWS`] data rows of delimited
/// content into typed properties.
pub fn parse_delimited_content(content: &str, identifier: &str) -> Result<PropertySet, StructureError> {
    let header_line = content.lines().next().ok_or(StructureError::EmptyContent)?;
    let delimiter = infer_delimiter(header_line);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());
    let mut records = reader.records();
    let headers = records
        .next()
        .ok_or(StructureError::EmptyContent)?
        .map_err(|err| StructureError::Parse(err.to_string()))?;
    if headers.is_empty() {
        return Err(StructureError::EmptyContent);
    }

    let mut rows = Vec::new();
    for record in records.take(MAX_SAMPLE_ROWS) {
        match record {
            Ok(row) => rows.push(row),
            Err(err) => debug!(%err, "skipping unparsable data row"),
        }
    }

    let mut properties = Vec::new();
    for (index, header) in headers.iter().enumerate() {
        let values: Vec<String> = rows
            .iter()
            .map(|row| row.get(index).unwrap_or("").to_string())
            .collect();
        let datatype = if is_year_label(header) {
            DataType::GYear
        } else {
            infer_datatype(&values)
        };
        let mut labels = MultilingualText::new();
        labels.set("en", header);
        properties.push(Property {
            name: property_name(header, "column"),
            labels,
            datatype,
        });
    }

    let mut title = MultilingualText::new();
    title.set("en", format!("CSV Structure for {identifier}"));
    let mut description = MultilingualText::new();
    description.set(
        "en",
        format!(
            "Automatically generated structure for CSV file with {} columns",
            headers.len()
        ),
    );

    Ok(PropertySet {
        identifier: identifier.to_string(),
        title,
        description,
        properties,
    })
}

// ---------------------------------------------------------------------------
// Shape builder
// ---------------------------------------------------------------------------

mod shacl {
    use oxrdf::NamedNodeRef;

    pub const NODE_SHAPE: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#NodeShape");
    pub const PROPERTY_SHAPE: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#PropertyShape");
    pub const PROPERTY: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#property");
    pub const PATH: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#path");
    pub const ORDER: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#order");
    pub const MIN_COUNT: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#minCount");
    pub const MAX_COUNT: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#maxCount");
    pub const DATATYPE: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#datatype");
    pub const NAME: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#name");
    pub const CLOSED: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.w3.org/ns/shacl#closed");

    pub const RDFS_LABEL: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.w3.org/2000/01/rdf-schema#label");
    pub const DCTERMS_DESCRIPTION: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://purl.org/dc/terms/description");
    pub const DCTERMS_CREATED: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://purl.org/dc/terms/created");
    pub const DCTERMS_MODIFIED: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://purl.org/dc/terms/modified");
}

fn xsd_datatype(datatype: DataType) -> NamedNodeRef<'static> {
    use oxrdf::vocab::xsd;
    match datatype {
        DataType::String => xsd::STRING,
        DataType::Integer => xsd::INTEGER,
        DataType::Decimal => xsd::DECIMAL,
        DataType::Boolean => xsd::BOOLEAN,
        DataType::Date => xsd::DATE,
        DataType::GYear => xsd::G_YEAR,
    }
}

/// Builds the SHACL constraint document for one property set: a closed node
/// shape plus one property shape per property, each with its ordinal
/// position, multilingual display names, inferred datatype, and exactly-one
/// cardinality.
pub fn build_shape_turtle(
    namespace: &str,
    set: &PropertySet,
    now: DateTime<Utc>,
) -> Result<String, StructureError> {
    let mut graph = Graph::new();

    let shape_name = format!("{}Shape", set.identifier);
    let shape = NamedNode::new(format!("{namespace}{shape_name}"))
        .map_err(|err| StructureError::Shape(err.to_string()))?;

    graph.insert(TripleRef::new(&shape, oxrdf::vocab::rdf::TYPE, shacl::NODE_SHAPE));
    for (language, value) in set.title.iter() {
        let label = Literal::new_language_tagged_literal_unchecked(value, language);
        graph.insert(TripleRef::new(&shape, shacl::RDFS_LABEL, &label));
    }
    for (language, value) in set.description.iter() {
        let text = Literal::new_language_tagged_literal_unchecked(value, language);
        graph.insert(TripleRef::new(&shape, shacl::DCTERMS_DESCRIPTION, &text));
    }
    let stamp = Literal::new_typed_literal(
        now.format("%Y-%m-%dT%H:%M:%S").to_string(),
        oxrdf::vocab::xsd::DATE_TIME,
    );
    graph.insert(TripleRef::new(&shape, shacl::DCTERMS_CREATED, &stamp));
    graph.insert(TripleRef::new(&shape, shacl::DCTERMS_MODIFIED, &stamp));
    let closed = Literal::from(true);
    graph.insert(TripleRef::new(&shape, shacl::CLOSED, &closed));

    for (index, property) in set.properties.iter().enumerate() {
        let node = NamedNode::new(format!("{namespace}{shape_name}/{}", property.name))
            .map_err(|err| StructureError::Shape(err.to_string()))?;
        graph.insert(TripleRef::new(&node, oxrdf::vocab::rdf::TYPE, shacl::PROPERTY_SHAPE));
        graph.insert(TripleRef::new(&shape, shacl::PROPERTY, &node));
        graph.insert(TripleRef::new(&node, shacl::PATH, &node));
        let order = Literal::new_typed_literal(index.to_string(), oxrdf::vocab::xsd::INTEGER);
        graph.insert(TripleRef::new(&node, shacl::ORDER, &order));
        let one = Literal::new_typed_literal("1", oxrdf::vocab::xsd::INTEGER);
        graph.insert(TripleRef::new(&node, shacl::MIN_COUNT, &one));
        graph.insert(TripleRef::new(&node, shacl::MAX_COUNT, &one));
        graph.insert(TripleRef::new(&node, shacl::DATATYPE, xsd_datatype(property.datatype)));
        for (language, value) in property.labels.iter() {
            let name = Literal::new_language_tagged_literal_unchecked(value, language);
            graph.insert(TripleRef::new(&node, shacl::NAME, &name));
        }
    }

    serialize_turtle(&graph)
}

fn serialize_turtle(graph: &Graph) -> Result<String, StructureError> {
    let mut serializer = RdfSerializer::from_format(RdfFormat::Turtle)
        .with_prefix("sh", "http://www.w3.org/ns/shacl#")
        .and_then(|s| s.with_prefix("xsd", "http://www.w3.org/2001/XMLSchema#"))
        .and_then(|s| s.with_prefix("dcterms", "http://purl.org/dc/terms/"))
        .and_then(|s| s.with_prefix("rdfs", "http://www.w3.org/2000/01/rdf-schema#"))
        .map_err(|err| StructureError::Shape(err.to_string()))?
        .for_writer(Vec::new());
    for triple in graph.iter() {
        serializer
            .serialize_quad(QuadRef::new(
                triple.subject,
                triple.predicate,
                triple.object,
                oxrdf::GraphNameRef::DefaultGraph,
            ))
            .map_err(|err| StructureError::Shape(err.to_string()))?;
    }
    let bytes = serializer
        .finish()
        .map_err(|err| StructureError::Shape(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| StructureError::Shape(err.to_string()))
}

// ---------------------------------------------------------------------------
// Upload orchestration
// ---------------------------------------------------------------------------

/// Runs structure inference for one dataset and uploads the resulting shape
/// with replace semantics.
pub struct StructureSync {
    client: Arc<ApiClient>,
    registry: Vec<Box<dyn StructureImporter>>,
    shape_namespace: String,
}

impl StructureSync {
    pub fn new(client: Arc<ApiClient>, config: &StructureConfig) -> Self {
        Self {
            client,
            registry: importer_registry(config),
            shape_namespace: config.shape_namespace.clone(),
        }
    }

    /// Tries each deduplicated candidate distribution in registry order; the
    /// first successfully parsed one wins. Returns false when no candidate
    /// produced a structure. Download/parse failures skip to the next
    /// candidate; upload failures surface as errors.
    pub async fn process_dataset(
        &self,
        dataset_id: &str,
        distributions: &[Distribution],
    ) -> Result<bool, StructureError> {
        let candidates = processable_candidates(&self.registry, distributions);
        if candidates.is_empty() {
            debug!(dataset_id, "no processable distributions");
            return Ok(false);
        }

        for (distribution, importer, identifier) in candidates {
            let set = match importer.download_and_parse(&self.client, distribution).await {
                Ok(set) => set,
                Err(err) => {
                    warn!(
                        dataset_id,
                        identifier,
                        importer = importer.name(),
                        %err,
                        "structure inference failed for candidate"
                    );
                    continue;
                }
            };

            // Replace semantics: any existing structure goes first.
            self.client.delete_structures(dataset_id).await?;
            let turtle = build_shape_turtle(&self.shape_namespace, &set, Utc::now())?;
            self.client.upload_structure(dataset_id, &turtle).await?;
            info!(
                dataset_id,
                identifier,
                importer = importer.name(),
                properties = set.properties.len(),
                "structure uploaded"
            );
            return Ok(true);
        }

        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odh_core::UriLabel;
    use oxrdf::TermRef;
    use oxrdfio::RdfParser;

    fn csv_distribution(url: &str) -> Distribution {
        Distribution {
            access_url: Some(UriLabel::new(url)),
            media_type: Some("text/csv".to_string()),
            ..Distribution::default()
        }
    }

    #[test]
    fn property_names_are_camel_cased_with_fallback() {
        assert_eq!(property_name("Geschlecht / Sexe", "property"), "geschlechtSexe");
        assert_eq!(property_name("Year of birth", "column"), "yearOfBirth");
        assert_eq!(property_name("***", "column"), "column");
    }

    #[test]
    fn comma_wins_delimiter_inference_for_mixed_header() {
        // "a,b;c": comma and semicolon both split into two columns, tab into
        // one; the comma is kept because no candidate is strictly better.
        assert_eq!(infer_delimiter("a,b;c"), b',');
        assert_eq!(infer_delimiter("a;b;c"), b';');
        assert_eq!(infer_delimiter("a\tb\tc"), b'\t');
    }

    #[test]
    fn datatype_inference_follows_fixed_order() {
        let to_vec = |values: &[&str]| values.iter().map(|v| v.to_string()).collect::<Vec<_>>();
        assert_eq!(infer_datatype(&to_vec(&["ja", "nein", "ja"])), DataType::Boolean);
        assert_eq!(infer_datatype(&to_vec(&["1", "2", "3"])), DataType::Integer);
        assert_eq!(infer_datatype(&to_vec(&["1,5", "2.25"])), DataType::Decimal);
        assert_eq!(
            infer_datatype(&to_vec(&["2024-01-01", "31.12.2023"])),
            DataType::Date
        );
        assert_eq!(infer_datatype(&to_vec(&["abc", "1"])), DataType::String);
        assert_eq!(infer_datatype(&to_vec(&["", "  "])), DataType::String);
    }

    #[test]
    fn delimited_parsing_types_columns_and_forces_gyear_headers() {
        let content = "Jahr;Region;Anzahl;Anteil\n2020;Bern;12;1,5\n2021;Zürich;15;2,25\n";
        let set = parse_delimited_content(content, "bestand.csv").unwrap();
        assert_eq!(set.identifier, "bestand.csv");
        assert_eq!(set.properties.len(), 4);
        assert_eq!(set.properties[0].name, "jahr");
        assert_eq!(set.properties[0].datatype, DataType::GYear);
        assert_eq!(set.properties[1].datatype, DataType::String);
        assert_eq!(set.properties[2].datatype, DataType::Integer);
        assert_eq!(set.properties[3].datatype, DataType::Decimal);
    }

    #[test]
    fn table_metadata_parsing_collects_dimensions_per_language() {
        let content = concat!(
            "CHARSET=\"ANSI\";\n",
            "TITLE=\"Bevölkerung nach Geschlecht\";\n",
            "TITLE[fr]=\"Population selon le sexe\";\n",
            "DESCRIPTION=\"Ständige Wohnbevölkerung\";\n",
            "STUB=\"Geschlecht\",\"Region\";\n",
            "STUB[fr]=\"Sexe\",\"Région\";\n",
            "HEADING=\"Jahr\";\n",
            "HEADING[fr]=\"Année\";\n",
            "DATA=\n1 2 3;\n",
        );
        let set = parse_table_metadata(content, "px-x-0102010000_101").unwrap();
        assert_eq!(set.title.get("de"), Some("Bevölkerung nach Geschlecht"));
        assert_eq!(set.title.get("fr"), Some("Population selon le sexe"));
        assert_eq!(set.properties.len(), 3);
        assert_eq!(set.properties[0].name, "geschlecht");
        assert_eq!(set.properties[0].labels.get("fr"), Some("Sexe"));
        assert_eq!(set.properties[0].datatype, DataType::String);
        assert_eq!(set.properties[2].name, "jahr");
        assert_eq!(set.properties[2].datatype, DataType::GYear);
    }

    #[test]
    fn dimensional_importer_matches_and_extracts_identifier() {
        let importer = DimensionalTableImporter::new(StructureConfig::default().table_download_url);
        let matching = csv_distribution(
            "https://www.pxweb.example.ch/files/px-x-0102010000_101?lang=de",
        );
        assert!(importer.can_process(&matching));
        assert_eq!(
            importer.identifier(&matching).as_deref(),
            Some("px-x-0102010000_101")
        );

        let other = csv_distribution("https://data.example.org/files/population.csv");
        assert!(!importer.can_process(&other));
    }

    #[test]
    fn registry_prefers_dimensional_tables_and_dedups_candidates() {
        let registry = importer_registry(&StructureConfig::default());
        let distributions = vec![
            csv_distribution("https://www.pxweb.example.ch/files/px-x-0102010000_101.px"),
            csv_distribution("https://data.example.org/files/population.csv"),
            csv_distribution("https://mirror.example.org/files/population.csv?lang=fr"),
        ];
        let candidates = processable_candidates(&registry, &distributions);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].1.name(), "dimensional-table");
        assert_eq!(candidates[0].2, "px-x-0102010000_101");
        assert_eq!(candidates[1].1.name(), "delimited-text");
        assert_eq!(candidates[1].2, "population.csv");
    }

    #[test]
    fn shape_document_carries_closed_flag_and_exactly_one_cardinality() {
        let set = PropertySet {
            identifier: "bestand".to_string(),
            title: MultilingualText::from_pairs([("en", "Test structure")]),
            description: MultilingualText::from_pairs([("en", "A structure")]),
            properties: vec![Property {
                name: "anzahl".to_string(),
                labels: MultilingualText::from_pairs([("en", "Anzahl")]),
                datatype: DataType::Integer,
            }],
        };
        let now = DateTime::parse_from_rfc3339("2026-02-24T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let turtle = build_shape_turtle(
            "https://catalog.example.org/structure/",
            &set,
            now,
        )
        .unwrap();

        let mut graph = Graph::new();
        for quad in RdfParser::from_format(RdfFormat::Turtle).for_reader(turtle.as_bytes()) {
            let quad = quad.unwrap();
            graph.insert(&oxrdf::Triple::new(quad.subject, quad.predicate, quad.object));
        }

        let shape = NamedNode::new("https://catalog.example.org/structure/bestandShape").unwrap();
        let closed = graph
            .object_for_subject_predicate(&shape, shacl::CLOSED)
            .expect("closed flag present");
        assert_eq!(closed, TermRef::from(&Literal::from(true)));

        let node = NamedNode::new("https://catalog.example.org/structure/bestandShape/anzahl")
            .unwrap();
        let datatype = graph
            .object_for_subject_predicate(&node, shacl::DATATYPE)
            .expect("datatype present");
        assert_eq!(datatype, TermRef::from(oxrdf::vocab::xsd::INTEGER));
        let min = graph
            .object_for_subject_predicate(&node, shacl::MIN_COUNT)
            .expect("minCount present");
        let max = graph
            .object_for_subject_predicate(&node, shacl::MAX_COUNT)
            .expect("maxCount present");
        assert_eq!(min, max);
    }
}
