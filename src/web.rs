use std::{convert::Infallible, net::SocketAddr};

use async_graphql::http::GraphiQLSource;
use async_graphql_warp::{GraphQLBadRequest, GraphQLResponse};
use tracing::info;
use warp::{http::StatusCode, Filter, Rejection, Reply};

use crate::api::Schema;

/// Serves the GraphQL API on `/graphql`, with GraphiQL on `GET /graphql`.
pub async fn serve(schema: Schema, addr: SocketAddr) {
    info!("GraphiQL available at http://{addr}/graphql");
    warp::serve(routes(schema)).run(addr).await;
}

fn routes(schema: Schema) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    let graphql_post = warp::path("graphql")
        .and(warp::path::end())
        .and(async_graphql_warp::graphql(schema))
        .and_then(
            |(schema, request): (Schema, async_graphql::Request)| async move {
                Ok::<_, Infallible>(GraphQLResponse::from(schema.execute(request).await))
            },
        );

    let graphiql = warp::path("graphql")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| {
            warp::reply::html(GraphiQLSource::build().endpoint("/graphql").finish())
        });

    graphiql.or(graphql_post).recover(|err: Rejection| async move {
        if let Some(GraphQLBadRequest(err)) = err.find() {
            return Ok::<_, Infallible>(warp::reply::with_status(
                err.to_string(),
                StatusCode::BAD_REQUEST,
            ));
        }
        Ok(warp::reply::with_status(
            "not found".to_string(),
            StatusCode::NOT_FOUND,
        ))
    })
}
