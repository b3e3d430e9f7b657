//! Combined OpenAPI document for the fleet API.

use utoipa::OpenApi;

/// Base document: info and servers; domain docs merge into it.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "SpotShift Control Plane",
        description = "Fleet cost optimization: agents, commands, pricing, replicas, events",
        version = env!("CARGO_PKG_VERSION")
    ),
    servers((url = "/api"))
)]
struct BaseDoc;

pub struct ApiDoc;

impl OpenApi for ApiDoc {
    fn openapi() -> utoipa::openapi::OpenApi {
        let mut doc = BaseDoc::openapi();
        doc.merge(domain_agents::handlers::ApiDoc::openapi());
        doc.merge(domain_replicas::handlers::ApiDoc::openapi());
        doc.merge(domain_commands::handlers::ApiDoc::openapi());
        doc.merge(domain_pricing::handlers::ApiDoc::openapi());
        doc.merge(domain_events::handlers::ApiDoc::openapi());
        doc
    }
}
