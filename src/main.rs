mod api;
mod config;
mod dialer;
mod error;
mod events;
mod store;
mod twilio;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use config::Config;
use dialer::Dialer;
use events::{EventPublisher, HttpPublisher, NoopPublisher};
use store::memory::MemoryStore;
use store::DialerStore;
use twilio::outbound::TwilioClient;
use twilio::token::TokenIssuer;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared application state accessible from all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub dialer: Dialer,
    pub tokens: Arc<TokenIssuer>,
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("--print-config") => print!("{}", config::EXAMPLE_CONFIG),
        Some("--version") => println!("dialer-echo {VERSION}"),
        Some("--help") | Some("-h") => print_usage(),
        Some(other) => {
            eprintln!("Unknown option: {other}");
            print_usage();
            std::process::exit(1);
        }
        None => {
            let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
            rt.block_on(server());
        }
    }
}

fn print_usage() {
    println!("dialer-echo {VERSION}");
    println!("Predictive dialer for Twilio");
    println!();
    println!("Usage: dialer-echo [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --print-config  Print an example config.toml");
    println!("  --version       Print version");
    println!("  --help, -h      Print this help message");
    println!();
    println!("Without options, starts the dialer server.");
}

async fn server() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dialer_echo=info,tower_http=info".into()),
        )
        .init();

    // Load config
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        "Starting dialer-echo"
    );

    // PostgreSQL if configured, in-memory otherwise
    let store: Arc<dyn DialerStore> = match config.database {
        Some(ref db) => match store::postgres::connect(db).await {
            Ok(pg) => Arc::new(pg),
            Err(e) => {
                eprintln!("Failed to connect to database: {e}");
                std::process::exit(1);
            }
        },
        None => {
            tracing::warn!("No [database] configured, state is kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let events: Arc<dyn EventPublisher> = match config.events {
        Some(ref ev) => {
            tracing::info!(url = %ev.url, channel = %ev.channel, "Publishing call events");
            Arc::new(HttpPublisher::new(ev))
        }
        None => Arc::new(NoopPublisher),
    };

    if !config.twilio.validate_signatures {
        tracing::warn!("Twilio signature validation disabled");
    }

    // Build shared state
    let state = AppState {
        dialer: Dialer::new(
            store,
            Arc::new(TwilioClient::new(
                &config.twilio,
                &config.dialer,
                &config.server.external_url,
            )),
            events,
            config.dialer.clone(),
        ),
        tokens: Arc::new(TokenIssuer::new(&config.twilio)),
        config: config.clone(),
    };

    let app = router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .expect("Invalid server address");

    tracing::info!(%addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app).await.expect("Server error");
}

fn router(state: AppState) -> Router {
    Router::new()
        // Twilio webhooks
        .route("/twilio/dialer/answer", post(twilio::webhook::handle_answer))
        .route("/twilio/dialer/status", post(twilio::webhook::handle_status))
        .route("/twilio/dialer/bridge", post(twilio::webhook::handle_bridge))
        // Dialer control API
        .route("/api/dialer/start", post(api::dialer::handle_start))
        .route("/api/dialer/calls/{sid}", get(api::dialer::handle_get_call))
        .route("/api/dialer/queue", get(api::dialer::handle_queue))
        .route("/api/contacts", post(api::contacts::handle_create))
        // Agent presence and browser client tokens
        .route("/api/agents", get(api::agents::handle_list))
        .route("/api/agents/presence", post(api::agents::handle_presence))
        .route("/api/agents/{id}/token", get(api::agents::handle_token))
        // Health check
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::dialer::testing::Harness;

    const TOKEN: &str = "test-token";
    const AUTH_TOKEN: &str = "twilio-auth";
    const EXTERNAL: &str = "https://dialer.example.com";

    fn test_config() -> Config {
        let mut config = Config::parse(config::EXAMPLE_CONFIG).unwrap();
        config.server.external_url = EXTERNAL.to_string();
        config.twilio.auth_token = AUTH_TOKEN.to_string();
        config.twilio.api_key_sid = "SK1".to_string();
        config.twilio.api_key_secret = "key-secret".to_string();
        config.api.token = TOKEN.to_string();
        config
    }

    fn app(h: &Harness) -> Router {
        let config = test_config();
        router(AppState {
            dialer: h.dialer.clone(),
            tokens: Arc::new(TokenIssuer::new(&config.twilio)),
            config,
        })
    }

    fn form(params: &[(&str, &str)]) -> (String, Vec<(String, String)>) {
        let owned: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let body = owned
            .iter()
            .map(|(k, v)| format!("{k}={}", v.replace('+', "%2B")))
            .collect::<Vec<_>>()
            .join("&");
        (body, owned)
    }

    fn signed_webhook(path: &str, params: &[(&str, &str)]) -> Request<Body> {
        let (body, owned) = form(params);
        let sig = twilio::signature::compute(AUTH_TOKEN, &format!("{EXTERNAL}{path}"), &owned);
        Request::post(path)
            .header("content-type", "application/x-www-form-urlencoded")
            .header("x-twilio-signature", sig)
            .body(Body::from(body))
            .unwrap()
    }

    fn api(method: &str, path: &str, json: Option<&str>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(path)
            .header("authorization", format!("Bearer {TOKEN}"));
        match json {
            Some(j) => builder
                .header("content-type", "application/json")
                .body(Body::from(j.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn body_string(resp: axum::response::Response) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn health_is_open() {
        let h = Harness::new();
        let resp = app(&h)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_string(resp).await, "ok");
    }

    #[tokio::test]
    async fn answer_webhook_returns_twiml() {
        let h = Harness::new();
        h.agent("alice", dialer::model::AgentStatus::Available).await;
        let call = h.placed_call("Dana").await;

        let resp = app(&h)
            .oneshot(signed_webhook(
                "/twilio/dialer/answer",
                &[("CallSid", &call.sid), ("AnsweredBy", "human")],
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "text/xml"
        );
        assert!(body_string(resp).await.contains("<Client>alice</Client>"));
    }

    #[tokio::test]
    async fn unsigned_webhook_is_forbidden() {
        let h = Harness::new();
        let call = h.placed_call("Dana").await;
        let (body, _) = form(&[("CallSid", &call.sid), ("CallStatus", "ringing")]);

        let resp = app(&h)
            .oneshot(
                Request::post("/twilio/dialer/status")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .header("x-twilio-signature", "AAAA")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn status_webhook_acknowledges_unknown_call() {
        let h = Harness::new();
        let resp = app(&h)
            .oneshot(signed_webhook(
                "/twilio/dialer/status",
                &[("CallSid", "CA-nope"), ("CallStatus", "completed")],
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn status_webhook_requires_call_sid() {
        let h = Harness::new();
        let resp = app(&h)
            .oneshot(signed_webhook(
                "/twilio/dialer/status",
                &[("CallStatus", "completed")],
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn api_requires_bearer_token() {
        let h = Harness::new();
        let resp = app(&h)
            .oneshot(
                Request::post("/api/dialer/start")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn load_contacts_then_dial() {
        let h = Harness::new();
        let app = app(&h);

        let resp = app
            .clone()
            .oneshot(api(
                "POST",
                "/api/contacts",
                Some(r#"[{"name": "Dana Whitfield", "phone": "+15550100001"}]"#),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = app
            .oneshot(api("POST", "/api/dialer/start", Some(r#"{"limit": 5}"#)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let report: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(report["placed"].as_array().unwrap().len(), 1);
        assert_eq!(h.telephony.dialed().await, vec!["+15550100001".to_string()]);
    }

    #[tokio::test]
    async fn bad_phone_is_rejected() {
        let h = Harness::new();
        let resp = app(&h)
            .oneshot(api(
                "POST",
                "/api/contacts",
                Some(r#"[{"name": "Typo", "phone": "555-0100"}]"#),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn presence_and_token_flow() {
        let h = Harness::new();
        let app = app(&h);

        let resp = app
            .clone()
            .oneshot(api(
                "POST",
                "/api/agents/presence",
                Some(r#"{"agent_id": "lo-12", "identity": "client-lo-12", "status": "available"}"#),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .clone()
            .oneshot(api("GET", "/api/agents/lo-12/token", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let token: serde_json::Value = serde_json::from_str(&body_string(resp).await).unwrap();
        assert_eq!(token["identity"], "client-lo-12");

        let resp = app
            .oneshot(api("GET", "/api/agents/nobody/token", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_call_is_not_found() {
        let h = Harness::new();
        let resp = app(&h)
            .oneshot(api("GET", "/api/dialer/calls/CA-nope", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
