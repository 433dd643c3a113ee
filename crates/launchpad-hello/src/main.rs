use axum::Router;
use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use clap::Parser;
use tracing::info;

const GREETING: &str = "Hello, Launchpad Deployed App!";

#[derive(Parser)]
#[command(name = "hello", about = "Sample workload for Launchpad deployments", version)]
struct Args {
    #[arg(short, long, default_value_t = 8080)]
    port: u16,
}

async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let response = next.run(req).await;
    info!(%method, %path, status = %response.status(), "request");
    response
}

fn app() -> Router {
    Router::new()
        .route("/", get(|| async { GREETING }))
        .route("/healthz", get(|| async { "ok" }))
        .layer(middleware::from_fn(log_request))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hello=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port)).await?;
    info!(port = args.port, "listening");
    axum::serve(listener, app()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    async fn get_text(uri: &str) -> (StatusCode, String) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn root_greets() {
        assert_eq!(get_text("/").await, (StatusCode::OK, GREETING.to_string()));
    }

    #[tokio::test]
    async fn health_path_answers_ok() {
        assert_eq!(get_text("/healthz").await, (StatusCode::OK, "ok".to_string()));
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let (status, _) = get_text("/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
