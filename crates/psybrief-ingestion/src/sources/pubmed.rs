//! PubMed article parser and E-utilities client.
//!
//! Endpoints used:
//!   esearch: https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi
//!   efetch:  https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi
//!
//! The parser is pure: it takes the efetch XML text and yields a lazy,
//! restartable sequence of [`RawArticle`]s, one per `<PubmedArticle>` block.
//! A malformed block or one without abstract text is excluded; every other
//! block is emitted, with missing identity fields left as `None`.

use async_trait::async_trait;
use chrono::NaiveDate;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::{ArticleFeed, FeedBatch};
use crate::error::ParseError;
use crate::models::RawArticle;

const ESEARCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi";
const EFETCH_URL:  &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi";

const ARTICLE_OPEN:  &str = "<PubmedArticle";
const ARTICLE_CLOSE: &str = "</PubmedArticle>";

/// Psychiatry treatment literature: core disorders AND an intervention AND a
/// trial/meta-analysis/observational design, humans, English, minus
/// epidemiology and methodology papers.
pub const DEFAULT_SEARCH_TERM: &str = "(\
(Depressive Disorder[MeSH Terms] OR Anxiety Disorders[MeSH Terms] OR Schizophrenia[MeSH Terms] \
OR Bipolar Disorder[MeSH Terms] OR Post-Traumatic Stress Disorder[MeSH Terms] \
OR Attention Deficit Disorder with Hyperactivity[MeSH Terms] OR Sleep Wake Disorders[MeSH Terms]) \
AND (psychotherapy OR pharmacotherapy OR treatment OR intervention) \
AND (Randomized Controlled Trial[Publication Type] OR Clinical Trial[Publication Type] \
OR Controlled Clinical Trial[Publication Type] OR Pragmatic Clinical Trial[Publication Type] \
OR Meta-Analysis[Publication Type] OR Observational Study[Publication Type]) \
AND Humans[MeSH Terms] AND english[lang] \
NOT (prevalence OR epidemiology OR protocol OR validation OR reliability \
OR stroke OR fibromyalgia OR \"restless legs\"))";

// ── Block splitting ───────────────────────────────────────────────────────────

/// Raw `<PubmedArticle>` blocks of a batch, in document order.
#[derive(Debug, Clone)]
pub struct ArticleBlocks<'a> {
    xml: &'a str,
    pos: usize,
}

impl<'a> ArticleBlocks<'a> {
    pub fn new(xml: &'a str) -> Self {
        Self { xml, pos: 0 }
    }
}

/// Byte offset of the next `<PubmedArticle>` opening tag at or after `from`.
/// `<PubmedArticleSet>` is not an article.
fn find_article_open(xml: &str, mut from: usize) -> Option<usize> {
    while let Some(rel) = xml.get(from..)?.find(ARTICLE_OPEN) {
        let start = from + rel;
        let after = start + ARTICLE_OPEN.len();
        match xml[after..].chars().next() {
            Some('>') | Some(' ') | Some('\t') | Some('\r') | Some('\n') => return Some(start),
            _ => from = after,
        }
    }
    None
}

impl<'a> Iterator for ArticleBlocks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let start = find_article_open(self.xml, self.pos)?;
        let body_from = start + ARTICLE_OPEN.len();

        let close = self.xml[body_from..]
            .find(ARTICLE_CLOSE)
            .map(|i| body_from + i + ARTICLE_CLOSE.len());
        let next_open = find_article_open(self.xml, body_from);

        // An unterminated block ends where the next one starts.
        let end = match (close, next_open) {
            (Some(c), Some(n)) => c.min(n),
            (Some(c), None) => c,
            (None, Some(n)) => n,
            (None, None) => self.xml.len(),
        };
        self.pos = end;
        Some(&self.xml[start..end])
    }
}

// ── Article sequence ──────────────────────────────────────────────────────────

/// Lazy sequence of parsed articles. Clone it to restart from the beginning.
#[derive(Debug, Clone)]
pub struct PubmedArticles<'a> {
    blocks: ArticleBlocks<'a>,
}

/// Parse a batch of PubMed efetch XML.
pub fn parse_articles(xml: &str) -> PubmedArticles<'_> {
    PubmedArticles { blocks: ArticleBlocks::new(xml) }
}

impl<'a> Iterator for PubmedArticles<'a> {
    type Item = RawArticle;

    fn next(&mut self) -> Option<RawArticle> {
        for block in self.blocks.by_ref() {
            match parse_article_block(block) {
                Ok(Some(article)) => return Some(article),
                Ok(None) => {
                    debug!("Dropping article without abstract text");
                }
                Err(e) => {
                    warn!(error = %e, "Excluding malformed article block");
                }
            }
        }
        None
    }
}

// ── Block parser ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Pmid,
    ArticleTitle,
    JournalTitle,
    JournalAbbrev,
    Doi,
    AbstractText,
    LastName,
    Initials,
    Year,
    Month,
    Day,
    MedlineDate,
}

#[derive(Default)]
struct BlockFields {
    pmid: Option<String>,
    title: Option<String>,
    journal_title: Option<String>,
    journal_abbrev: Option<String>,
    doi: Option<String>,
    abstract_parts: Vec<String>,
    authors: Vec<String>,
    author_last: Option<String>,
    author_initials: Option<String>,
    year: Option<String>,
    month: Option<String>,
    day: Option<String>,
    medline_date: Option<String>,
}

impl BlockFields {
    fn set_first(slot: &mut Option<String>, value: String) {
        if slot.is_none() && !value.is_empty() {
            *slot = Some(value);
        }
    }

    fn finish(&mut self, field: Field, raw: &str) {
        let value = decode_entities(raw).trim().to_string();
        match field {
            Field::Pmid          => Self::set_first(&mut self.pmid, value),
            Field::ArticleTitle  => Self::set_first(&mut self.title, value),
            Field::JournalTitle  => Self::set_first(&mut self.journal_title, value),
            Field::JournalAbbrev => Self::set_first(&mut self.journal_abbrev, value),
            Field::Doi           => Self::set_first(&mut self.doi, value),
            Field::AbstractText  => {
                if !value.is_empty() {
                    self.abstract_parts.push(value);
                }
            }
            Field::LastName      => Self::set_first(&mut self.author_last, value),
            Field::Initials      => Self::set_first(&mut self.author_initials, value),
            Field::Year          => Self::set_first(&mut self.year, value),
            Field::Month         => Self::set_first(&mut self.month, value),
            Field::Day           => Self::set_first(&mut self.day, value),
            Field::MedlineDate   => Self::set_first(&mut self.medline_date, value),
        }
    }

    fn end_author(&mut self) {
        // Collective authors and half-filled entries are dropped.
        if let (Some(last), Some(initials)) = (self.author_last.take(), self.author_initials.take()) {
            self.authors.push(format!("{last} {initials}"));
        }
    }

    fn pub_date(&self) -> Option<NaiveDate> {
        match &self.year {
            Some(year) => build_date(year, self.month.as_deref(), self.day.as_deref()),
            None => self.medline_date.as_deref().and_then(parse_medline_date),
        }
    }

    fn into_article(self) -> Option<RawArticle> {
        if self.abstract_parts.is_empty() {
            return None;
        }
        let pub_date = self.pub_date();
        Some(RawArticle {
            external_id: self.pmid,
            title: self.title,
            journal_title: self.journal_title,
            journal_abbrev: self.journal_abbrev,
            doi: self.doi,
            authors: self.authors,
            abstract_text: self.abstract_parts.join(" "),
            pub_date,
        })
    }
}

fn is_doi_id(e: &BytesStart<'_>) -> bool {
    matches!(
        e.try_get_attribute("IdType"),
        Ok(Some(attr)) if attr.value.as_ref() == b"doi"
    )
}

/// Which field, if any, an opening tag starts capturing. `parent` is the
/// enclosing element.
fn field_for(name: &[u8], parent: Option<&[u8]>, e: &BytesStart<'_>) -> Option<Field> {
    match (name, parent) {
        (b"PMID", _)                          => Some(Field::Pmid),
        (b"ArticleTitle", _)                  => Some(Field::ArticleTitle),
        (b"Title", Some(b"Journal"))          => Some(Field::JournalTitle),
        (b"ISOAbbreviation", Some(b"Journal")) => Some(Field::JournalAbbrev),
        (b"ArticleId", _) if is_doi_id(e)     => Some(Field::Doi),
        (b"AbstractText", Some(b"Abstract"))  => Some(Field::AbstractText),
        (b"LastName", Some(b"Author"))        => Some(Field::LastName),
        (b"Initials", Some(b"Author"))        => Some(Field::Initials),
        (b"Year", Some(b"PubDate"))           => Some(Field::Year),
        (b"Month", Some(b"PubDate"))          => Some(Field::Month),
        (b"Day", Some(b"PubDate"))            => Some(Field::Day),
        (b"MedlineDate", Some(b"PubDate"))    => Some(Field::MedlineDate),
        _ => None,
    }
}

/// Parse one `<PubmedArticle>` block.
///
/// `Ok(None)` means the block is well formed but has no abstract text.
pub fn parse_article_block(block: &str) -> Result<Option<RawArticle>, ParseError> {
    let mut reader = Reader::from_str(block);
    let mut fields = BlockFields::default();
    let mut path: Vec<Vec<u8>> = Vec::new();

    // (field, depth of its element, text collected so far)
    let mut capture: Option<(Field, usize, String)> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name().as_ref().to_vec();
                if capture.is_none() {
                    let parent = path.last().map(|p| p.as_slice());
                    if let Some(field) = field_for(&name, parent, &e) {
                        capture = Some((field, path.len(), String::new()));
                    }
                }
                if name.as_slice() == b"Author" {
                    fields.author_last = None;
                    fields.author_initials = None;
                }
                path.push(name);
            }
            Ok(Event::End(e)) => {
                path.pop();
                let closes_capture = matches!(&capture, Some((_, depth, _)) if *depth == path.len());
                if closes_capture {
                    if let Some((field, _, text)) = capture.take() {
                        fields.finish(field, &text);
                    }
                }
                if e.name().as_ref() == b"Author" {
                    fields.end_author();
                }
            }
            Ok(Event::Text(t)) => {
                if let Some((_, _, buf)) = capture.as_mut() {
                    buf.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Ok(Event::CData(t)) => {
                if let Some((_, _, buf)) = capture.as_mut() {
                    // CDATA is literal; escape the ampersands decode_entities would touch.
                    buf.push_str(&String::from_utf8_lossy(&t).replace('&', "&amp;"));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ParseError::Xml {
                    pmid: fields.pmid,
                    position: reader.buffer_position() as u64,
                    message: e.to_string(),
                });
            }
        }
    }

    Ok(fields.into_article())
}

// ── Entities and dates ────────────────────────────────────────────────────────

/// Decode the five XML named entities plus decimal (`&#246;`) and hex
/// (`&#x10d;`) character references in one pass. Unknown or invalid
/// references are kept verbatim.
pub fn decode_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];

        let decoded = tail
            .find(';')
            .filter(|&semi| semi <= 12)
            .and_then(|semi| decode_reference(&tail[1..semi]).map(|c| (c, semi)));

        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_reference(name: &str) -> Option<char> {
    match name {
        "lt"   => Some('<'),
        "gt"   => Some('>'),
        "amp"  => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok()?
            } else {
                return None;
            };
            char::from_u32(code)
        }
    }
}

fn parse_month(m: &str) -> Option<u32> {
    let m = m.trim();
    if let Ok(n) = m.parse::<u32>() {
        return (1..=12).contains(&n).then_some(n);
    }
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let prefix = m.get(..3)?.to_ascii_lowercase();
    MONTHS.iter().position(|&name| name == prefix).map(|i| i as u32 + 1)
}

fn build_date(year: &str, month: Option<&str>, day: Option<&str>) -> Option<NaiveDate> {
    let year: i32 = year.trim().parse().ok()?;
    let month = month.and_then(parse_month).unwrap_or(1);
    let day = day.and_then(|d| d.trim().parse::<u32>().ok()).unwrap_or(1);
    NaiveDate::from_ymd_opt(year, month, day).or_else(|| NaiveDate::from_ymd_opt(year, month, 1))
}

/// "2024 Jan-Feb", "2023 Winter", "2022".
fn parse_medline_date(s: &str) -> Option<NaiveDate> {
    let mut parts = s.split_whitespace();
    let year = parts.next()?;
    let month = parts.next().and_then(|m| m.split('-').next());
    build_date(year, month, None)
}

// ── E-utilities client ────────────────────────────────────────────────────────

/// esearch parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    pub term: String,
    pub retmax: u32,
    /// Only articles published within this many days.
    pub reldate: u32,
    pub sort: String,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            term: DEFAULT_SEARCH_TERM.to_string(),
            retmax: 45,
            reldate: 60,
            sort: "pub+date".to_string(),
        }
    }
}

#[derive(Deserialize)]
struct EsearchResponse {
    esearchresult: EsearchResult,
}

#[derive(Deserialize)]
struct EsearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

pub struct PubMedClient {
    client: Client,
    api_key: Option<SecretString>,
    params: SearchParams,
}

impl PubMedClient {
    pub fn new(params: SearchParams, api_key: Option<SecretString>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            params,
        }
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    fn with_key(&self, mut params: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.expose_secret().to_string()));
        }
        params
    }

    /// Search PubMed and return PMIDs, newest first.
    #[instrument(skip(self))]
    pub async fn esearch(&self) -> anyhow::Result<Vec<String>> {
        let params = self.with_key(vec![
            ("db", "pubmed".to_string()),
            ("term", self.params.term.clone()),
            ("retmax", self.params.retmax.to_string()),
            ("sort", self.params.sort.clone()),
            ("reldate", self.params.reldate.to_string()),
            ("datetype", "pdat".to_string()),
            ("retmode", "json".to_string()),
        ]);

        let resp: EsearchResponse = self.client
            .get(ESEARCH_URL)
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!(ids = ?resp.esearchresult.idlist, "PubMed esearch returned PMIDs");
        Ok(resp.esearchresult.idlist)
    }

    /// Fetch the XML for a list of PMIDs.
    #[instrument(skip(self, pmids), fields(count = pmids.len()))]
    pub async fn efetch(&self, pmids: &[String]) -> anyhow::Result<String> {
        if pmids.is_empty() {
            return Ok(String::new());
        }

        let params = self.with_key(vec![
            ("db", "pubmed".to_string()),
            ("id", pmids.join(",")),
            ("retmode", "xml".to_string()),
        ]);

        let xml = self.client
            .get(EFETCH_URL)
            .query(&params)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(xml)
    }
}

#[async_trait]
impl ArticleFeed for PubMedClient {
    async fn fetch_recent(&self) -> anyhow::Result<FeedBatch> {
        let ids = self.esearch().await?;
        if ids.is_empty() {
            return Ok(FeedBatch::default());
        }
        info!(count = ids.len(), "Fetching PubMed records");
        let xml = self.efetch(&ids).await?;
        Ok(FeedBatch { ids, xml })
    }
}
