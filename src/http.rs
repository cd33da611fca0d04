//! HTTP API for the admissions CRM
//!
//! Thin routing over [`ParentService`]. Every `/api` route is tenant-scoped
//! through a required `customer_id` query parameter.
//!
//! ## Routes
//! - `GET /health` - Database liveness (503 when no connection is available)
//! - `GET /api/parents/stats` - Funnel statistics
//! - `GET /api/parents/search` - Filtered, sorted, paged search
//! - `POST /api/parents` - Create a parent (with children)
//! - `GET|PUT|DELETE /api/parents/{parent_id}` - Detail, partial update, delete
//! - `GET|POST /api/parents/{parent_id}/children` - List / add children
//! - `GET|POST /api/parents/{parent_id}/notes` - List / add notes (POST needs `user_id`)
//!
//! ## Example Usage
//!
//! ```bash
//! curl 'http://localhost:8000/api/parents/search?customer_id=T1&tags=vip,urgent&sort_by=lead_score'
//!
//! curl -X POST -H 'Content-Type: application/json' \
//!      -d '{"name":"A. Smith","children":[{"name":"Sam"}]}' \
//!      'http://localhost:8000/api/parents?customer_id=T1'
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use chrono::NaiveDate;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::db::children::CreateChildInput;
use crate::db::notes::CreateNoteInput;
use crate::db::{
    CreateParentInput, ParentFilter, ParentStage, ParentStatus, SearchParams, SortOrder,
    TenantContext, UpdateParentInput,
};
use crate::error::StorageError;
use crate::services::response::{self, JsonResponse};
use crate::services::{ParentService, Services};

/// Raw query-string parameters; tags are collected separately
#[derive(Debug, Default, Deserialize)]
struct RequestQuery {
    customer_id: Option<String>,
    user_id: Option<String>,
    query: Option<String>,
    status: Option<String>,
    stage: Option<String>,
    source: Option<String>,
    min_lead_score: Option<i32>,
    max_lead_score: Option<i32>,
    created_after: Option<String>,
    created_before: Option<String>,
    has_children: Option<bool>,
    page: Option<i64>,
    per_page: Option<i64>,
    sort_by: Option<String>,
    sort_order: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_date(field: &str, value: Option<String>) -> Result<Option<NaiveDate>, StorageError> {
    non_empty(value)
        .map(|v| {
            NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d").map_err(|_| {
                StorageError::InvalidInput(format!("{} must be YYYY-MM-DD, got '{}'", field, v))
            })
        })
        .transpose()
}

/// `tags=a&tags=b` and `tags=a,b` are equivalent
fn parse_tags(raw_query: &str) -> Vec<String> {
    url::form_urlencoded::parse(raw_query.as_bytes())
        .filter(|(key, _)| key == "tags")
        .flat_map(|(_, value)| {
            value
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
        })
        .collect()
}

impl RequestQuery {
    fn parse(raw_query: &str) -> Result<Self, StorageError> {
        serde_urlencoded::from_str(raw_query)
            .map_err(|e| StorageError::InvalidInput(format!("Invalid query string: {}", e)))
    }

    fn tenant(&self) -> Result<TenantContext, StorageError> {
        TenantContext::new(self.customer_id.clone().unwrap_or_default())
    }

    fn search_params(self, raw_query: &str) -> Result<SearchParams, StorageError> {
        let filter = ParentFilter {
            query: non_empty(self.query),
            status: non_empty(self.status)
                .map(|s| s.parse::<ParentStatus>())
                .transpose()?,
            stage: non_empty(self.stage)
                .map(|s| s.parse::<ParentStage>())
                .transpose()?,
            source: non_empty(self.source),
            min_lead_score: self.min_lead_score,
            max_lead_score: self.max_lead_score,
            tags: parse_tags(raw_query),
            created_after: parse_date("created_after", self.created_after)?,
            created_before: parse_date("created_before", self.created_before)?,
            has_children: self.has_children,
        };

        let defaults = SearchParams::default();
        let params = SearchParams {
            filter,
            sort_by: non_empty(self.sort_by),
            sort_order: non_empty(self.sort_order)
                .map(|s| s.parse::<SortOrder>())
                .transpose()?
                .unwrap_or(defaults.sort_order),
            page: self.page.unwrap_or(defaults.page),
            per_page: self.per_page.unwrap_or(defaults.per_page),
        };
        params.validate()?;
        Ok(params)
    }
}

/// Run blocking store work off the async executor
async fn blocking<T, F>(f: F) -> Result<T, StorageError>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::Internal(format!("Blocking task failed: {}", e)))?
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, StorageError> {
    Ok(serde_json::from_slice(body)?)
}

/// HTTP server state
pub struct HttpServer {
    services: Arc<Services>,
    bind_addr: SocketAddr,
}

impl HttpServer {
    pub fn new(services: Arc<Services>, bind_addr: SocketAddr) -> Self {
        Self {
            services,
            bind_addr,
        }
    }

    /// Accept connections until the listener fails
    pub async fn run(self: Arc<Self>) -> Result<(), StorageError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    async fn handle_request(&self, req: Request<Incoming>) -> Result<JsonResponse, hyper::Error> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let query = req.uri().query().unwrap_or("").to_string();

        debug!(method = %method, path = %path, "Incoming request");

        let body = if method == Method::POST || method == Method::PUT {
            req.into_body().collect().await?.to_bytes()
        } else {
            Bytes::new()
        };

        Ok(self.dispatch(method, &path, &query, body).await)
    }

    /// Route a request that has already been read off the wire
    pub async fn dispatch(&self, method: Method, path: &str, query: &str, body: Bytes) -> JsonResponse {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

        match (method, segments.as_slice()) {
            (Method::GET, ["health"]) => self.handle_health().await,
            (_, ["health"]) => response::method_not_allowed(),
            (method, ["api", "parents", rest @ ..]) => {
                let svc = self.services.parents.clone();
                match self.route_parents(svc, method, rest, query, body).await {
                    Ok(resp) => resp,
                    Err(e) => response::error_response(e),
                }
            }
            _ => response::not_found("Not Found"),
        }
    }

    async fn route_parents(
        &self,
        svc: Arc<ParentService>,
        method: Method,
        rest: &[&str],
        raw_query: &str,
        body: Bytes,
    ) -> Result<JsonResponse, StorageError> {
        let query = RequestQuery::parse(raw_query)?;
        let ctx = query.tenant()?;

        match (method, rest) {
            (Method::GET, ["stats"]) => {
                let stats = blocking(move || svc.get_stats(&ctx)).await?;
                Ok(response::ok(&stats))
            }
            (Method::GET, ["search"]) => {
                let params = query.search_params(raw_query)?;
                let page = blocking(move || svc.search(&ctx, &params)).await?;
                Ok(response::ok(&page))
            }
            (Method::POST, []) => {
                let input: CreateParentInput = parse_body(&body)?;
                let created = blocking(move || svc.create(&ctx, input)).await?;
                Ok(response::created(&created))
            }
            (Method::GET, [id]) => {
                let id = id.to_string();
                let detail = blocking(move || svc.get_detail(&ctx, &id)).await?;
                Ok(response::ok(&detail))
            }
            (Method::PUT, [id]) => {
                let input: UpdateParentInput = parse_body(&body)?;
                let id = id.to_string();
                let updated = blocking(move || svc.update(&ctx, &id, input)).await?;
                Ok(response::ok(&updated))
            }
            (Method::DELETE, [id]) => {
                let id = id.to_string();
                blocking(move || svc.delete(&ctx, &id)).await?;
                Ok(response::ok(&serde_json::json!({ "message": "Parent deleted successfully" })))
            }
            (Method::GET, [id, "children"]) => {
                let id = id.to_string();
                let children = blocking(move || svc.list_children(&ctx, &id)).await?;
                Ok(response::ok(&children))
            }
            (Method::POST, [id, "children"]) => {
                let input: CreateChildInput = parse_body(&body)?;
                let id = id.to_string();
                let child = blocking(move || svc.add_child(&ctx, &id, input)).await?;
                Ok(response::created(&child))
            }
            (Method::GET, [id, "notes"]) => {
                let id = id.to_string();
                let notes = blocking(move || svc.list_notes(&ctx, &id)).await?;
                Ok(response::ok(&notes))
            }
            (Method::POST, [id, "notes"]) => {
                let user_id = non_empty(query.user_id)
                    .ok_or_else(|| StorageError::InvalidInput("user_id is required".into()))?;
                let input: CreateNoteInput = parse_body(&body)?;
                let id = id.to_string();
                let note = blocking(move || svc.add_note(&ctx, &id, input, &user_id)).await?;
                Ok(response::created(&note))
            }
            (_, []) | (_, [_]) | (_, [_, "children"]) | (_, [_, "notes"]) => {
                Ok(response::method_not_allowed())
            }
            _ => Ok(response::not_found("Not Found")),
        }
    }

    async fn handle_health(&self) -> JsonResponse {
        let db = self.services.db.clone();
        match blocking(move || db.ping()).await {
            Ok(()) => response::ok(&serde_json::json!({
                "status": "healthy",
                "database": "connected",
            })),
            Err(e) => {
                warn!(error = %e, "Health check failed");
                response::json_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    &serde_json::json!({
                        "status": "unhealthy",
                        "database": "disconnected",
                        "error": e.to_string(),
                    }),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ParentDb;

    fn server() -> HttpServer {
        let db = Arc::new(ParentDb::open_in_memory().unwrap());
        let services = Arc::new(Services::new(db));
        HttpServer::new(services, "127.0.0.1:0".parse().unwrap())
    }

    async fn body_json(resp: JsonResponse) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn create(server: &HttpServer, customer: &str, body: serde_json::Value) -> String {
        let resp = server
            .dispatch(
                Method::POST,
                "/api/parents",
                &format!("customer_id={}", customer),
                Bytes::from(body.to_string()),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        body_json(resp).await["parent_id"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_parse_tags_accepts_both_forms() {
        assert_eq!(parse_tags("tags=vip&tags=urgent"), vec!["vip", "urgent"]);
        assert_eq!(parse_tags("customer_id=T1&tags=vip,%20urgent,"), vec!["vip", "urgent"]);
        assert!(parse_tags("customer_id=T1").is_empty());
    }

    #[test]
    fn test_search_params_from_query() {
        let raw = "customer_id=T1&status=warm&min_lead_score=10&created_after=2024-01-31&has_children=true&page=2&per_page=5&sort_order=asc&tags=vip";
        let params = RequestQuery::parse(raw).unwrap().search_params(raw).unwrap();
        assert_eq!(params.filter.status, Some(ParentStatus::Warm));
        assert_eq!(params.filter.min_lead_score, Some(10));
        assert_eq!(params.filter.created_after, NaiveDate::from_ymd_opt(2024, 1, 31));
        assert_eq!(params.filter.has_children, Some(true));
        assert_eq!(params.filter.tags, vec!["vip"]);
        assert_eq!(params.page, 2);
        assert_eq!(params.sort_order, SortOrder::Asc);

        let bad_date = "customer_id=T1&created_before=31/01/2024";
        assert!(RequestQuery::parse(bad_date).unwrap().search_params(bad_date).is_err());
        let bad_size = "customer_id=T1&per_page=500";
        assert!(RequestQuery::parse(bad_size).unwrap().search_params(bad_size).is_err());
    }

    #[tokio::test]
    async fn test_health() {
        let server = server();
        let resp = server.dispatch(Method::GET, "/health", "", Bytes::new()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_missing_customer_is_bad_request() {
        let server = server();
        let resp = server
            .dispatch(Method::GET, "/api/parents/stats", "", Bytes::new())
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_detail_and_cross_tenant_404() {
        let server = server();
        let id = create(&server, "T1", serde_json::json!({"name": "A. Smith"})).await;

        let path = format!("/api/parents/{}", id);
        let resp = server.dispatch(Method::GET, &path, "customer_id=T1", Bytes::new()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let detail = body_json(resp).await;
        assert_eq!(detail["email_count"], 0);
        assert_eq!(detail["task_count"], 0);
        assert_eq!(detail["journey_events"][0]["event_type"], "enquiry");

        let resp = server.dispatch(Method::GET, &path, "customer_id=T2", Bytes::new()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_search_stats_and_notes() {
        let server = server();
        let id = create(
            &server,
            "T1",
            serde_json::json!({"name": "Jones", "tags": ["vip"], "children": [{"name": "Olivia"}]}),
        )
        .await;
        create(&server, "T1", serde_json::json!({"name": "Brown", "status": "enrolled"})).await;

        let resp = server
            .dispatch(Method::GET, "/api/parents/search", "customer_id=T1&query=oliv", Bytes::new())
            .await;
        let page = body_json(resp).await;
        assert_eq!(page["total"], 1);
        assert_eq!(page["parents"][0]["children"][0]["name"], "Olivia");

        let resp = server
            .dispatch(Method::GET, "/api/parents/stats", "customer_id=T1", Bytes::new())
            .await;
        let stats = body_json(resp).await;
        assert_eq!(stats["total_parents"], 2);
        assert_eq!(stats["conversion_rate"], 50.0);

        let notes_path = format!("/api/parents/{}/notes", id);
        let note = Bytes::from(r#"{"content":"Called about bursaries"}"#);
        let resp = server
            .dispatch(Method::POST, &notes_path, "customer_id=T1", note.clone())
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = server
            .dispatch(Method::POST, &notes_path, "customer_id=T1&user_id=u1", note)
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(body_json(resp).await["note_type"], "general");
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let server = server();
        let id = create(&server, "T1", serde_json::json!({"name": "A. Smith"})).await;
        let path = format!("/api/parents/{}", id);

        let resp = server
            .dispatch(
                Method::PUT,
                &path,
                "customer_id=T1",
                Bytes::from(r#"{"stage":"interest","risk_score":90}"#),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let updated = body_json(resp).await;
        assert_eq!(updated["stage"], "interest");
        assert_eq!(updated["is_high_risk"], true);

        let resp = server
            .dispatch(Method::PUT, &path, "customer_id=T1", Bytes::from("not json"))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = server.dispatch(Method::DELETE, &path, "customer_id=T1", Bytes::new()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let resp = server.dispatch(Method::DELETE, &path, "customer_id=T1", Bytes::new()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_routes() {
        let server = server();
        let resp = server.dispatch(Method::GET, "/nope", "", Bytes::new()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = server
            .dispatch(Method::PATCH, "/api/parents/stats", "customer_id=T1", Bytes::new())
            .await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
