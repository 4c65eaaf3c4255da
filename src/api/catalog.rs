use std::sync::Arc;

use async_graphql::{Context, Object, Result, SimpleObject};

use crate::{api, attribute::Category, pipeline::Assistant};

/// A filterable attribute and the tokens the catalog accepts for it.
#[derive(SimpleObject)]
pub(crate) struct AttributeView {
    pub(crate) name: String,
    pub(crate) values: Vec<String>,
}

#[derive(SimpleObject)]
pub(crate) struct CategoryView {
    pub(crate) name: String,
    pub(crate) attributes: Vec<AttributeView>,
}

impl From<Category> for CategoryView {
    fn from(category: Category) -> Self {
        Self {
            name: category.slug().to_string(),
            attributes: category
                .vocabulary()
                .map(|attr| AttributeView {
                    name: attr.name.to_string(),
                    values: attr.values.iter().map(|v| (*v).to_string()).collect(),
                })
                .collect(),
        }
    }
}

#[derive(Default)]
pub(crate) struct CatalogQuery;

#[Object]
impl CatalogQuery {
    /// The product categories a session can be pinned to.
    async fn categories(&self) -> Vec<CategoryView> {
        Category::CONCRETE.into_iter().map(CategoryView::from).collect()
    }

    async fn category(&self, name: String) -> Result<CategoryView> {
        Ok(api::parse_category(&name)?.into())
    }

    /// The system instruction the model receives for `category`. `all`
    /// combines every category's block.
    async fn instruction(&self, ctx: &Context<'_>, category: String) -> Result<String> {
        let category = api::parse_category(&category)?;
        Ok(ctx.data::<Arc<Assistant>>()?.instruction(category))
    }
}
