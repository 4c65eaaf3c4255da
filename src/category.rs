use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    attribute::Category,
    llm::{Completion, CompletionError, Message, Usage},
};

/// Lower-case stems that identify a vertical inside free text, checked in
/// order. The first stem found decides the category.
const STEMS: &[(&str, Category)] = &[
    ("bra", Category::Bra),
    ("pant", Category::Panty),
    ("lingerie", Category::LingerieSet),
    ("shape", Category::Shapewear),
    ("sports", Category::Sportswear),
    ("cloth", Category::Clothing),
    ("accesor", Category::Accessories),
    ("accessor", Category::Accessories),
    ("sleep", Category::Sleepwear),
    ("night", Category::Sleepwear),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Source {
    /// Chosen explicitly by the user.
    Selected,
    /// Found by stem matching on the utterance.
    Keyword,
    /// Named by the language model and normalized by stem matching.
    Classifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Resolution {
    pub(crate) category: Category,
    pub(crate) source: Source,
    /// Tokens spent on the classification call, if one was made.
    pub(crate) usage: Option<Usage>,
}

#[derive(Debug, Error)]
pub(crate) enum ResolveError {
    #[error("no category could be identified (classifier answered {answer:?})")]
    Unresolved { answer: String, usage: Usage },

    #[error("classification call failed: {0}")]
    Completion(#[from] CompletionError),
}

/// Every category whose stem occurs in `text`, in stem order, without
/// duplicates.
pub(crate) fn match_keywords(text: &str) -> Vec<Category> {
    let lowered = text.to_lowercase();
    let mut matched = Vec::new();
    for (stem, category) in STEMS {
        if lowered.contains(stem) && !matched.contains(category) {
            matched.push(*category);
        }
    }
    matched
}

fn classification_instruction() -> String {
    let names = Category::CONCRETE
        .iter()
        .map(|c| c.slug())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "You classify shopping requests for a lingerie and apparel store.\n\
        Reply with exactly one category name from this list and nothing else: {names}.\n\
        Pick the category the shopper is most likely asking about."
    )
}

/// Determines the single category a query is about.
///
/// An explicit non-`All` selection wins. Otherwise the utterance is matched
/// against known stems, and only when that finds nothing is the model asked
/// to classify it.
pub(crate) async fn resolve(
    selected: Option<Category>,
    utterance: &str,
    completion: &dyn Completion,
) -> Result<Resolution, ResolveError> {
    if let Some(category) = selected.filter(|c| *c != Category::All) {
        debug!(%category, "using selected category");
        return Ok(Resolution {
            category,
            source: Source::Selected,
            usage: None,
        });
    }

    if let Some(category) = match_keywords(utterance).first().copied() {
        debug!(%category, "category matched by keyword");
        return Ok(Resolution {
            category,
            source: Source::Keyword,
            usage: None,
        });
    }

    let messages = [
        Message::system(classification_instruction()),
        Message::user(utterance),
    ];
    let answer = completion.complete(&messages).await?;
    match match_keywords(&answer.text).first().copied() {
        Some(category) => {
            info!(%category, "category named by classifier");
            Ok(Resolution {
                category,
                source: Source::Classifier,
                usage: Some(answer.usage),
            })
        }
        None => {
            warn!(answer = %answer.text, "classifier named no known category");
            Err(ResolveError::Unresolved {
                answer: answer.text,
                usage: answer.usage,
            })
        }
    }
}
