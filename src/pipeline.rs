use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::{
    attribute::Category,
    category::{self, ResolveError},
    extract::{Extractor, Filter},
    instruction,
    llm::{Completion, Message, Usage},
    outbound::{self, CatalogError, ProductSource},
    session::{Session, Turn, TurnOutcome},
};

const CLARIFICATION: &str = "I couldn't tell which kind of product you are looking for. \
    Could you mention a category such as bra, panty, lingerie set, shapewear, clothing, \
    accessories, sportswear or sleepwear?";

/// Runs one shopping turn end to end: category resolution, instruction,
/// completion, filter extraction and catalog lookup, strictly in that order.
pub(crate) struct Assistant {
    completion: Arc<dyn Completion>,
    products: Arc<dyn ProductSource>,
    extractor: Extractor,
    host: String,
    display_count: usize,
    retain_history: bool,
}

impl Assistant {
    pub(crate) fn new(
        completion: Arc<dyn Completion>,
        products: Arc<dyn ProductSource>,
        extractor: Extractor,
        host: &str,
        display_count: usize,
        retain_history: bool,
    ) -> Self {
        Self {
            completion,
            products,
            extractor,
            host: host.to_string(),
            display_count,
            retain_history,
        }
    }

    /// Processes `text` as the next turn of `session` and records it.
    ///
    /// Never fails: every error becomes a `TurnOutcome`, and earlier turns are
    /// left untouched.
    pub(crate) async fn ask<'s>(&self, session: &'s mut Session, text: &str) -> &'s Turn {
        let sequence = session.next_sequence();
        info!(session = %session.id, sequence, "processing turn");

        let mut turn = Turn {
            sequence,
            text: text.to_string(),
            category: None,
            answer: None,
            url_key: None,
            outcome: TurnOutcome::NoFilter,
            usage: Usage::default(),
            created_at: Utc::now(),
        };

        let resolution =
            match category::resolve(session.selected, text, self.completion.as_ref()).await {
                Ok(resolution) => resolution,
                Err(ResolveError::Unresolved { usage, .. }) => {
                    warn!(session = %session.id, sequence, "category unresolved");
                    turn.usage += usage;
                    turn.answer = Some(CLARIFICATION.to_string());
                    turn.outcome = TurnOutcome::UnresolvedCategory;
                    return session.record(turn);
                }
                Err(ResolveError::Completion(e)) => {
                    error!(session = %session.id, sequence, "classification failed: {e}");
                    turn.outcome = TurnOutcome::CompletionFailed {
                        reason: e.to_string(),
                    };
                    return session.record(turn);
                }
            };
        let category = resolution.category;
        info!(session = %session.id, sequence, %category, source = ?resolution.source, "category resolved");
        turn.category = Some(category);
        if let Some(usage) = resolution.usage {
            turn.usage += usage;
        }

        let messages = self.conversation(session, category, text);
        let answer = match self.completion.complete(&messages).await {
            Ok(answer) => answer,
            Err(e) => {
                error!(session = %session.id, sequence, "completion failed: {e}");
                turn.outcome = TurnOutcome::CompletionFailed {
                    reason: e.to_string(),
                };
                return session.record(turn);
            }
        };
        turn.usage += answer.usage;
        if self.retain_history {
            session.history.push(Message::user(text));
            session.history.push(Message::assistant(answer.text.clone()));
        }

        let extracted = self.extractor.extract(&answer.text);
        turn.answer = Some(answer.text);
        let Some(relative) = extracted else {
            info!(session = %session.id, sequence, "no filter in the answer");
            turn.outcome = TurnOutcome::NoFilter;
            return session.record(turn);
        };

        let filter = Filter::parse(&relative).validate(category);
        let url_key = filter.url_key();
        if !filter.dropped.is_empty() {
            info!(session = %session.id, sequence, dropped = filter.dropped.len(), %url_key, "filter narrowed to the vocabulary");
        }
        turn.outcome = self.lookup(session, &url_key).await;
        turn.url_key = Some(url_key);
        session.record(turn)
    }

    /// The system instruction sent for `category`; `All` yields every block.
    pub(crate) fn instruction(&self, category: Category) -> String {
        instruction::compose(category, &self.host)
    }

    fn conversation(&self, session: &Session, category: Category, text: &str) -> Vec<Message> {
        let mut messages = vec![Message::system(self.instruction(category))];
        if self.retain_history {
            messages.extend(session.history.iter().cloned());
        }
        messages.push(Message::user(text));
        messages
    }

    async fn lookup(&self, session: &mut Session, url_key: &str) -> TurnOutcome {
        match self.products.product_list(url_key).await {
            Ok(records) if records.is_empty() => {
                info!(url_key, "catalog has no matching products");
                TurnOutcome::NoResults
            }
            Ok(records) => {
                let returned = records.len();
                let shown = outbound::sample(records, self.display_count, &mut session.rng);
                info!(url_key, returned, shown = shown.len(), "products ready");
                TurnOutcome::Products(shown)
            }
            Err(CatalogError::Http { status, body }) => {
                error!(url_key, status, "catalog returned an error");
                TurnOutcome::CatalogUnavailable {
                    status: Some(status),
                    body,
                }
            }
            Err(CatalogError::Transport(e)) => {
                error!(url_key, "catalog unreachable: {e}");
                TurnOutcome::CatalogUnavailable {
                    status: None,
                    body: e.to_string(),
                }
            }
            Err(CatalogError::Malformed(reason)) => {
                warn!(url_key, %reason, "catalog payload malformed");
                TurnOutcome::MalformedCatalog { reason }
            }
        }
    }
}
