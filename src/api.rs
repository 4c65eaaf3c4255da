mod catalog;
mod session;

use std::sync::Arc;

use async_graphql::{EmptySubscription, MergedObject, Result, ID};
use uuid::Uuid;

use crate::{attribute::Category, pipeline::Assistant, session::SessionStore};

/// A set of queries defined in the schema.
///
/// This is exposed only for [`Schema`], and not used directly.
#[derive(Default, MergedObject)]
pub(crate) struct Query(catalog::CatalogQuery, session::SessionQuery);

/// A set of mutations defined in the schema.
#[derive(Default, MergedObject)]
pub(crate) struct Mutation(session::SessionMutation);

pub(crate) type Schema = async_graphql::Schema<Query, Mutation, EmptySubscription>;

pub(crate) fn schema(assistant: Arc<Assistant>, store: SessionStore) -> Schema {
    Schema::build(Query::default(), Mutation::default(), EmptySubscription)
        .data(assistant)
        .data(store)
        .finish()
}

fn parse_id(id: &ID) -> Result<Uuid> {
    Uuid::parse_str(id.as_str()).map_err(|e| format!("invalid session id: {e}").into())
}

fn parse_category(name: &str) -> Result<Category> {
    name.parse::<Category>().map_err(|e| e.to_string().into())
}

/// An explicit selection; `all` (or nothing) means "infer from the text".
fn parse_selection(name: Option<&str>) -> Result<Option<Category>> {
    Ok(name
        .map(parse_category)
        .transpose()?
        .filter(|category| *category != Category::All))
}

#[cfg(test)]
struct TestSchema {
    llm: Arc<crate::llm::testing::Scripted>,
    catalog: Arc<crate::outbound::testing::Canned>,
    schema: Schema,
}

#[cfg(test)]
impl TestSchema {
    fn new(
        llm: crate::llm::testing::Scripted,
        catalog: crate::outbound::testing::Canned,
    ) -> Self {
        let llm = Arc::new(llm);
        let catalog = Arc::new(catalog);
        let assistant = Assistant::new(
            llm.clone(),
            catalog.clone(),
            crate::extract::Extractor::for_host("www.shyaway.com").unwrap(),
            "www.shyaway.com",
            4,
            false,
        );
        let schema = schema(Arc::new(assistant), SessionStore::new(Some(7), std::time::Duration::from_secs(60)));
        Self {
            llm,
            catalog,
            schema,
        }
    }

    async fn execute(&self, query: &str) -> async_graphql::Response {
        let request: async_graphql::Request = query.into();
        self.schema.execute(request).await
    }

    async fn start_session(&self, category: Option<&str>) -> String {
        let query = match category {
            Some(category) => format!(r#"mutation {{ startSession(category: "{category}") {{ id }} }}"#),
            None => "mutation { startSession { id } }".to_string(),
        };
        let res = self.execute(&query).await;
        assert!(res.errors.is_empty(), "{:?}", res.errors);
        let data = res.data.into_json().unwrap();
        data["startSession"]["id"].as_str().unwrap().to_string()
    }
}
