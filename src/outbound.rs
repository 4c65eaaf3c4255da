use std::time::Duration;

use async_trait::async_trait;
use graphql_client::{GraphQLQuery, QueryBody, Response as GraphQlResponse};
use rand::{seq::index, Rng};
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::settings::CatalogSettings;

const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
const FIRST_PAGE: i64 = 1;
const DEFAULT_OFFER_COLOR: &str = "#FF5733";

#[allow(clippy::upper_case_acronyms)]
type JSON = serde_json::Value;

#[derive(GraphQLQuery)]
#[graphql(
    schema_path = "src/outbound/graphql/schema.graphql",
    query_path = "src/outbound/graphql/product_list.graphql",
    response_derives = "Debug"
)]
pub(crate) struct ProductList;

/// A promotional badge attached to a product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Offer {
    pub(crate) label: String,
    pub(crate) color: Option<String>,
}

impl Offer {
    pub(crate) fn color_or_default(&self) -> &str {
        self.color.as_deref().unwrap_or(DEFAULT_OFFER_COLOR)
    }
}

/// A product as returned by the catalog, ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProductRecord {
    pub(crate) product_link: String,
    pub(crate) sku: String,
    pub(crate) image_url: String,
    pub(crate) offers: Vec<Offer>,
}

impl ProductRecord {
    /// The badge shown in the first display slot.
    pub(crate) fn primary_offer(&self) -> Option<&Offer> {
        self.offers.first()
    }

    /// The badge shown in the second display slot.
    pub(crate) fn secondary_offer(&self) -> Option<&Offer> {
        self.offers.get(1)
    }
}

#[derive(Debug, Error)]
pub(crate) enum CatalogError {
    #[error("catalog request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("catalog returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("catalog payload is malformed: {0}")]
    Malformed(String),
}

/// Anything that can list the products behind a relative listing URL.
#[async_trait]
pub(crate) trait ProductSource: Send + Sync {
    async fn product_list(&self, url_key: &str) -> Result<Vec<ProductRecord>, CatalogError>;
}

/// GraphQL client for the storefront's `getProductList` query.
pub(crate) struct CatalogClient {
    http: Client,
    endpoint: String,
    token: Option<String>,
    page_size: i64,
    sort_by: String,
    sort_direction: String,
}

impl CatalogClient {
    pub(crate) fn new(settings: &CatalogSettings) -> Result<Self, CatalogError> {
        let http = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            endpoint: settings.graphql_url.clone(),
            token: settings.token.clone(),
            page_size: settings.page_size,
            sort_by: settings.sort_by.clone(),
            sort_direction: settings.sort_direction.clone(),
        })
    }

    fn request<V>(&self, request_body: &QueryBody<V>) -> RequestBuilder
    where
        V: Serialize,
    {
        let builder = self.http.post(&self.endpoint).json(request_body);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send_query<T>(&self, var: T::Variables) -> Result<Response, CatalogError>
    where
        T: GraphQLQuery,
    {
        Ok(self.request(&T::build_query(var)).send().await?)
    }
}

#[async_trait]
impl ProductSource for CatalogClient {
    async fn product_list(&self, url_key: &str) -> Result<Vec<ProductRecord>, CatalogError> {
        let var = product_list::Variables {
            url_key: url_key.to_string(),
            search_query: None,
            sort_by: Some(self.sort_by.clone()),
            sort_direction: Some(self.sort_direction.clone()),
            page: Some(FIRST_PAGE),
            limit: Some(self.page_size),
        };
        let response = self.send_query::<ProductList>(var).await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let resp_body: GraphQlResponse<product_list::ResponseData> =
            serde_json::from_str(&body).map_err(|e| CatalogError::Malformed(e.to_string()))?;
        let records = records_from(resp_body)?;
        info!(url_key, count = records.len(), "catalog listing fetched");
        Ok(records)
    }
}

fn records_from(
    resp_body: GraphQlResponse<product_list::ResponseData>,
) -> Result<Vec<ProductRecord>, CatalogError> {
    let reason = match &resp_body.errors {
        Some(errors) if !errors.is_empty() => errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; "),
        _ => "missing data.getProductList.data.items".to_string(),
    };
    let items = resp_body
        .data
        .and_then(|data| data.get_product_list)
        .and_then(|list| list.data)
        .and_then(|data| data.items)
        .ok_or(CatalogError::Malformed(reason))?;

    let records = items
        .into_iter()
        .flatten()
        .filter_map(|item| {
            let image_url = item.image.and_then(|image| image.url);
            let (Some(product_link), Some(sku), Some(image_url)) =
                (item.product_link, item.sku, image_url)
            else {
                warn!("skipping catalog item without link, sku or image");
                return None;
            };
            let offers = item
                .offer_data
                .unwrap_or_default()
                .into_iter()
                .flatten()
                .filter_map(|offer| {
                    offer.label.map(|label| Offer {
                        label,
                        color: offer.color,
                    })
                })
                .collect();
            Some(ProductRecord {
                product_link,
                sku,
                image_url,
                offers,
            })
        })
        .collect();
    Ok(records)
}

/// Picks `min(count, items.len())` distinct items uniformly at random.
pub(crate) fn sample<R>(items: Vec<ProductRecord>, count: usize, rng: &mut R) -> Vec<ProductRecord>
where
    R: Rng + ?Sized,
{
    let amount = count.min(items.len());
    let mut slots: Vec<Option<ProductRecord>> = items.into_iter().map(Some).collect();
    index::sample(rng, slots.len(), amount)
        .into_iter()
        .filter_map(|i| slots.get_mut(i).and_then(Option::take))
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// A product source that serves a fixed result and records every
    /// requested `urlKey`.
    pub(crate) struct Canned {
        result: Box<dyn Fn() -> Result<Vec<ProductRecord>, CatalogError> + Send + Sync>,
        pub(crate) requests: Mutex<Vec<String>>,
    }

    impl Canned {
        pub(crate) fn new(
            result: impl Fn() -> Result<Vec<ProductRecord>, CatalogError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                result: Box::new(result),
                requests: Mutex::default(),
            }
        }

        pub(crate) fn with_products(count: usize) -> Self {
            Self::new(move || Ok(products(count)))
        }
    }

    #[async_trait]
    impl ProductSource for Canned {
        async fn product_list(&self, url_key: &str) -> Result<Vec<ProductRecord>, CatalogError> {
            self.requests.lock().unwrap().push(url_key.to_string());
            (self.result)()
        }
    }

    pub(crate) fn products(count: usize) -> Vec<ProductRecord> {
        (0..count)
            .map(|i| ProductRecord {
                product_link: format!("https://www.shyaway.com/product-{i}.html"),
                sku: format!("SKU-{i}"),
                image_url: format!("https://cdn.example.com/{i}.jpg"),
                offers: Vec::new(),
            })
            .collect()
    }
}
