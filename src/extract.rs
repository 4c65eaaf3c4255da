use regex::Regex;
use tracing::{debug, warn};
use url::{form_urlencoded, Url};

use crate::attribute::{normalize_token, Category};

/// Characters the model sometimes wraps around the URL.
const NOISE: &[char] = &[':', '(', ')'];
const TRAILING_NOISE: &[char] = &['.', ',', '*', '`', '"', '\'', ']', '>'];
const LISTING_SUFFIX: &str = "-online";
/// Query delimiters that may appear inside a value token, with their escapes.
const RESERVED: &[(char, &str)] = &[('&', "%26"), ('=', "%3D"), ('?', "%3F"), ('#', "%23")];

/// One way of locating a catalog URL inside free text.
pub(crate) trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns the relative `path?query` of every URL found, in text order.
    fn candidates(&self, text: &str) -> Vec<String>;
}

/// Finds a Markdown link such as `[here](https://host/bra-online/?size=32b)`.
pub(crate) struct MarkdownLink {
    link: Regex,
    host_prefix: Regex,
}

impl MarkdownLink {
    pub(crate) fn new(host: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            link: Regex::new(r"\[.*?\]\((https?://[^)\s]+)\)")?,
            host_prefix: Regex::new(&format!(r"^https?://{}/", regex::escape(host)))?,
        })
    }
}

impl Strategy for MarkdownLink {
    fn name(&self) -> &'static str {
        "markdown-link"
    }

    fn candidates(&self, text: &str) -> Vec<String> {
        self.link
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .filter_map(|url| {
                let url = url.as_str();
                if self.host_prefix.is_match(url) {
                    Some(self.host_prefix.replace(url, "").into_owned())
                } else {
                    relative_from_url(url)
                }
            })
            .collect()
    }
}

/// Finds any bare `http(s)://` token.
pub(crate) struct BareUrl {
    token: Regex,
}

impl BareUrl {
    pub(crate) fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            token: Regex::new(r"https?://\S+")?,
        })
    }
}

impl Strategy for BareUrl {
    fn name(&self) -> &'static str {
        "bare-url"
    }

    fn candidates(&self, text: &str) -> Vec<String> {
        self.token
            .find_iter(text)
            .filter_map(|token| relative_from_url(token.as_str().trim_end_matches(TRAILING_NOISE)))
            .collect()
    }
}

fn relative_from_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let path = url.path().trim_start_matches('/');
    Some(match url.query() {
        Some(query) if !query.is_empty() => format!("{path}?{query}"),
        _ => path.to_string(),
    })
}

/// Recovers a relative catalog path from a model answer, trying each
/// strategy in order.
pub(crate) struct Extractor {
    strategies: Vec<Box<dyn Strategy>>,
}

impl Extractor {
    pub(crate) fn new(strategies: Vec<Box<dyn Strategy>>) -> Self {
        Self { strategies }
    }

    /// The Markdown-link strategy first, the bare-URL one as a fallback.
    pub(crate) fn for_host(host: &str) -> Result<Self, regex::Error> {
        Ok(Self::new(vec![
            Box::new(MarkdownLink::new(host)?),
            Box::new(BareUrl::new()?),
        ]))
    }

    /// Returns the first cleaned relative URL that is not empty, or `None`
    /// when the answer holds no usable URL at all.
    pub(crate) fn extract(&self, text: &str) -> Option<String> {
        let (strategy, cleaned) = self.strategies.iter().find_map(|s| {
            s.candidates(text)
                .iter()
                .map(|found| clean(found))
                .find(|cleaned| !cleaned.is_empty())
                .map(|cleaned| (s.name(), cleaned))
        })?;
        debug!(strategy, relative = %cleaned, "extracted filter");
        Some(cleaned)
    }
}

fn clean(relative: &str) -> String {
    relative
        .chars()
        .filter(|c| !NOISE.contains(c))
        .collect::<String>()
        .trim()
        .trim_end_matches(TRAILING_NOISE)
        .trim_start_matches('/')
        .to_string()
}

/// A relative listing path split into its category slug and attribute
/// pairs, in the order the model wrote them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Filter {
    pub(crate) slug: Option<String>,
    pub(crate) attributes: Vec<(String, Vec<String>)>,
}

impl Filter {
    pub(crate) fn parse(relative: &str) -> Self {
        let (path, query) = relative.split_once('?').unwrap_or((relative, ""));
        let slug = path
            .trim_matches('/')
            .rsplit('/')
            .next()
            .and_then(|segment| segment.strip_suffix(LISTING_SUFFIX))
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let query = rejoin_split_values(query);
        let mut attributes: Vec<(String, Vec<String>)> = Vec::new();
        for (name, values) in form_urlencoded::parse(query.as_bytes()) {
            let name = normalize_token(&name);
            if name.is_empty() {
                continue;
            }
            let values = values
                .split(',')
                .map(normalize_token)
                .filter(|v| !v.is_empty());
            match attributes.iter_mut().find(|(n, _)| *n == name) {
                Some((_, existing)) => existing.extend(values),
                None => attributes.push((name, values.collect())),
            }
        }
        Self { slug, attributes }
    }

    /// Keeps only attributes and values registered for `category`.
    pub(crate) fn validate(&self, category: Category) -> ValidatedFilter {
        if let Some(slug) = &self.slug {
            if slug != category.slug() {
                warn!(%category, model_slug = %slug, "model named another category; using the resolved one");
            }
        }

        let mut attributes: Vec<(&'static str, Vec<&'static str>)> = Vec::new();
        let mut dropped = Vec::new();
        for (name, values) in &self.attributes {
            let Some(attr) = category.attribute(name) else {
                dropped.push(name.clone());
                continue;
            };
            let mut kept: Vec<&'static str> = Vec::new();
            for value in values {
                match attr.canonical(value) {
                    Some(token) if !kept.contains(&token) => kept.push(token),
                    Some(_) => {}
                    None => dropped.push(format!("{name}={value}")),
                }
            }
            if !kept.is_empty() {
                attributes.push((attr.name, kept));
            }
        }
        if !dropped.is_empty() {
            warn!(%category, ?dropped, "dropped values outside the vocabulary");
        }
        ValidatedFilter {
            category,
            attributes,
            dropped,
        }
    }
}

/// Re-attaches segments without `=` to the value before them, so that a
/// token such as `shrugs-&-jackets` written unescaped survives the split on
/// `&`.
fn rejoin_split_values(query: &str) -> String {
    let mut pairs: Vec<String> = Vec::new();
    for segment in query.split('&').filter(|s| !s.is_empty()) {
        match pairs.last_mut() {
            Some(last) if !segment.contains('=') => {
                last.push_str("%26");
                last.push_str(segment);
            }
            _ => pairs.push(segment.to_string()),
        }
    }
    pairs.join("&")
}

fn escape_reserved(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    for c in token.chars() {
        match RESERVED.iter().find(|(reserved, _)| *reserved == c) {
            Some((_, escaped)) => out.push_str(escaped),
            None => out.push(c),
        }
    }
    out
}

/// A filter whose every attribute and value is registered for its category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ValidatedFilter {
    pub(crate) category: Category,
    pub(crate) attributes: Vec<(&'static str, Vec<&'static str>)>,
    pub(crate) dropped: Vec<String>,
}

impl ValidatedFilter {
    /// The `urlKey` sent to the catalog: `<slug>-online/?a=v1,v2&b=v3`, with
    /// query delimiters inside values percent-escaped.
    pub(crate) fn url_key(&self) -> String {
        let mut key = format!("{}{LISTING_SUFFIX}/", self.category.slug());
        if !self.attributes.is_empty() {
            let query = self
                .attributes
                .iter()
                .map(|(name, values)| {
                    let values: Vec<String> = values.iter().map(|v| escape_reserved(v)).collect();
                    format!("{name}={}", values.join(","))
                })
                .collect::<Vec<_>>()
                .join("&");
            key.push('?');
            key.push_str(&query);
        }
        key
    }
}
