use std::sync::Arc;

use async_graphql::{Context, Object, Result, SimpleObject, ID};

use crate::{
    api,
    llm::Usage,
    outbound::{Offer, ProductRecord},
    pipeline::Assistant,
    session::{Session, SessionStore, Turn, TurnOutcome},
};

#[derive(SimpleObject)]
pub(crate) struct UsageView {
    pub(crate) prompt_tokens: i64,
    pub(crate) completion_tokens: i64,
    pub(crate) total_tokens: i64,
}

impl From<Usage> for UsageView {
    fn from(usage: Usage) -> Self {
        let count = |n: u64| i64::try_from(n).unwrap_or(i64::MAX);
        Self {
            prompt_tokens: count(usage.prompt_tokens),
            completion_tokens: count(usage.completion_tokens),
            total_tokens: count(usage.total_tokens),
        }
    }
}

#[derive(SimpleObject)]
pub(crate) struct OfferView {
    pub(crate) label: String,
    /// Display colour, falling back to the storefront default.
    pub(crate) color: String,
}

impl From<&Offer> for OfferView {
    fn from(offer: &Offer) -> Self {
        Self {
            label: offer.label.clone(),
            color: offer.color_or_default().to_string(),
        }
    }
}

#[derive(SimpleObject)]
pub(crate) struct ProductView {
    pub(crate) product_link: String,
    pub(crate) sku: String,
    pub(crate) image_url: String,
    pub(crate) primary_offer: Option<OfferView>,
    pub(crate) secondary_offer: Option<OfferView>,
}

impl From<&ProductRecord> for ProductView {
    fn from(record: &ProductRecord) -> Self {
        Self {
            product_link: record.product_link.clone(),
            sku: record.sku.clone(),
            image_url: record.image_url.clone(),
            primary_offer: record.primary_offer().map(OfferView::from),
            secondary_offer: record.secondary_offer().map(OfferView::from),
        }
    }
}

#[derive(SimpleObject)]
pub(crate) struct TurnView {
    /// Always `assistant`: a turn is the reply to `text`.
    pub(crate) role: String,
    pub(crate) sequence: i32,
    pub(crate) text: String,
    pub(crate) category: Option<String>,
    pub(crate) answer: Option<String>,
    pub(crate) url_key: Option<String>,
    /// One of `products`, `no-results`, `no-filter`, `unresolved-category`,
    /// `completion-failed`, `catalog-unavailable` or `malformed-catalog`.
    pub(crate) outcome: String,
    pub(crate) detail: Option<String>,
    /// Null unless the outcome is `products`.
    pub(crate) products: Option<Vec<ProductView>>,
    pub(crate) usage: UsageView,
    pub(crate) created_at: String,
}

impl From<&Turn> for TurnView {
    fn from(turn: &Turn) -> Self {
        let detail = match &turn.outcome {
            TurnOutcome::CompletionFailed { reason } | TurnOutcome::MalformedCatalog { reason } => {
                Some(reason.clone())
            }
            TurnOutcome::CatalogUnavailable {
                status: Some(status),
                body,
            } => Some(format!("HTTP {status}: {body}")),
            TurnOutcome::CatalogUnavailable { status: None, body } => Some(body.clone()),
            _ => None,
        };
        Self {
            role: "assistant".to_string(),
            sequence: i32::try_from(turn.sequence).unwrap_or(i32::MAX),
            text: turn.text.clone(),
            category: turn.category.map(|c| c.slug().to_string()),
            answer: turn.answer.clone(),
            url_key: turn.url_key.clone(),
            outcome: turn.outcome.kind().to_string(),
            detail,
            products: turn
                .outcome
                .products()
                .map(|records| records.iter().map(ProductView::from).collect()),
            usage: turn.usage.into(),
            created_at: turn.created_at.to_rfc3339(),
        }
    }
}

#[derive(SimpleObject)]
pub(crate) struct SessionView {
    pub(crate) id: ID,
    pub(crate) selected_category: Option<String>,
    /// Number of questions asked since the last clear.
    pub(crate) questions: i32,
    pub(crate) turns: Vec<TurnView>,
    pub(crate) usage: UsageView,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            id: ID(session.id.to_string()),
            selected_category: session.selected.map(|c| c.slug().to_string()),
            questions: i32::try_from(session.turns.len()).unwrap_or(i32::MAX),
            turns: session.turns.iter().map(TurnView::from).collect(),
            usage: session.usage.into(),
        }
    }
}

#[derive(Default)]
pub(crate) struct SessionQuery;

#[Object]
impl SessionQuery {
    async fn session(&self, ctx: &Context<'_>, id: ID) -> Result<Option<SessionView>> {
        let store = ctx.data::<SessionStore>()?;
        let Some(session) = store.get(&api::parse_id(&id)?).await else {
            return Ok(None);
        };
        let session = session.lock().await;
        Ok(Some(SessionView::from(&*session)))
    }
}

#[derive(Default)]
pub(crate) struct SessionMutation;

#[Object]
impl SessionMutation {
    /// Opens a conversation, optionally pinned to a category.
    async fn start_session(
        &self,
        ctx: &Context<'_>,
        category: Option<String>,
    ) -> Result<SessionView> {
        let store = ctx.data::<SessionStore>()?;
        let selected = api::parse_selection(category.as_deref())?;
        let id = store.start(selected).await;
        let session = store
            .get(&id)
            .await
            .ok_or("session ended before it could be read")?;
        let session = session.lock().await;
        Ok(SessionView::from(&*session))
    }

    /// Changes or clears the category pin. Earlier turns are kept.
    async fn select_category(
        &self,
        ctx: &Context<'_>,
        session_id: ID,
        category: Option<String>,
    ) -> Result<SessionView> {
        let selected = api::parse_selection(category.as_deref())?;
        let session = find(ctx, &session_id).await?;
        let mut session = session.lock().await;
        session.selected = selected;
        Ok(SessionView::from(&*session))
    }

    /// Runs one shopping turn. Turns of the same session run one at a time.
    async fn ask(&self, ctx: &Context<'_>, session_id: ID, text: String) -> Result<TurnView> {
        if text.trim().is_empty() {
            return Err("text must not be empty".into());
        }
        let assistant = ctx.data::<Arc<Assistant>>()?;
        let session = find(ctx, &session_id).await?;
        let mut session = session.lock().await;
        let turn = assistant.ask(&mut session, &text).await;
        Ok(TurnView::from(turn))
    }

    async fn clear_history(&self, ctx: &Context<'_>, session_id: ID) -> Result<SessionView> {
        let session = find(ctx, &session_id).await?;
        let mut session = session.lock().await;
        session.clear();
        Ok(SessionView::from(&*session))
    }

    async fn end_session(&self, ctx: &Context<'_>, session_id: ID) -> Result<bool> {
        let store = ctx.data::<SessionStore>()?;
        Ok(store.end(&api::parse_id(&session_id)?).await)
    }
}

async fn find(
    ctx: &Context<'_>,
    id: &ID,
) -> Result<Arc<tokio::sync::Mutex<Session>>> {
    let store = ctx.data::<SessionStore>()?;
    store
        .get(&api::parse_id(id)?)
        .await
        .ok_or_else(|| format!("no session with id {}", id.as_str()).into())
}
