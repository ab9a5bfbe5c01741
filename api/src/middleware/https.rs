use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

const HSTS: &str = "max-age=63072000; includeSubDomains";

/// Where a plain-HTTP request should be sent instead. `None` when the proxy
/// reports HTTPS (or says nothing).
fn https_location(headers: &HeaderMap, uri: &Uri) -> Option<Uri> {
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("https");
    if !proto.eq_ignore_ascii_case("http") {
        return None;
    }

    let host = headers
        .get("host")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    format!("https://{host}{path_and_query}").parse().ok()
}

/// Redirect requests a TLS-terminating proxy marked as `http`, and stamp
/// HSTS on every response. Enabled with `SHULE_REQUIRE_HTTPS=true`.
pub async fn require_https(req: Request, next: Next) -> Response {
    if let Some(location) = https_location(req.headers(), req.uri()) {
        let mut response =
            (StatusCode::MOVED_PERMANENTLY, [("location", location.to_string())]).into_response();
        add_hsts_header(&mut response);
        return response;
    }

    let mut response = next.run(req).await;
    add_hsts_header(&mut response);
    response
}

fn add_hsts_header(response: &mut Response) {
    response
        .headers_mut()
        .insert("strict-transport-security", HeaderValue::from_static(HSTS));
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::routing::get;
    use axum::{Router, middleware};
    use tower::ServiceExt;

    async fn ok() -> StatusCode {
        StatusCode::OK
    }

    fn app() -> Router {
        Router::new()
            .route("/health", get(ok))
            .layer(middleware::from_fn(require_https))
    }

    #[tokio::test]
    async fn plain_http_is_redirected() {
        let response = app()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/health?verbose=1")
                    .header("host", "assistant.shule.school")
                    .header("x-forwarded-proto", "http")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            response.headers()["location"],
            "https://assistant.shule.school/health?verbose=1"
        );
        assert_eq!(response.headers()["strict-transport-security"], HSTS);
    }

    #[tokio::test]
    async fn https_passes_through_with_hsts() {
        let response = app()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/health")
                    .header("x-forwarded-proto", "https")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["strict-transport-security"], HSTS);
    }
}
