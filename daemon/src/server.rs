/// HTTP and WebSocket server implementation
use crate::config::DaemonConfig;
use crate::errors::{DaemonError, DaemonResult};
use crate::metrics::MetricsCollector;
use crate::pool::ConnectionRegistry;
use crate::ws_session::{handle_session, SessionContext};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use mediator_core::SharedArchitect;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Mediator server: WebSocket sessions plus health and metrics endpoints
#[derive(Clone)]
pub struct MediatorServer {
    config: DaemonConfig,
    context: Arc<SessionContext>,
}

impl MediatorServer {
    /// Create a server whose sessions use the architect built from `config`
    pub fn new(config: DaemonConfig) -> DaemonResult<Self> {
        config.validate()?;
        let architect = config.architect.build()?;
        Self::with_architect(config, architect)
    }

    /// Create a server around an already-built architect
    pub fn with_architect(config: DaemonConfig, architect: SharedArchitect) -> DaemonResult<Self> {
        let metrics = Arc::new(MetricsCollector::new()?);
        let registry = Arc::new(ConnectionRegistry::new(config.server.max_connections));

        let context = Arc::new(SessionContext {
            architect,
            mediator: config.mediator_config(),
            outbound_buffer: config.session.outbound_buffer,
            registry,
            metrics,
        });

        Ok(MediatorServer { config, context })
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        self.context.registry.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.context.metrics.clone()
    }

    fn addr(host: &str, port: u16) -> DaemonResult<SocketAddr> {
        format!("{}:{}", host, port)
            .parse()
            .map_err(|e| DaemonError::ServerError(format!("Invalid address: {}", e)))
    }

    /// Bind the WebSocket port and serve sessions
    pub async fn start_ws(&self) -> DaemonResult<()> {
        let addr = Self::addr(&self.config.server.ws_addr, self.config.server.ws_port)?;
        let listener = TcpListener::bind(addr).await?;
        self.serve_ws(listener).await
    }

    /// Accept loop on an already-bound listener
    pub async fn serve_ws(&self, listener: TcpListener) -> DaemonResult<()> {
        info!("WebSocket server listening on ws://{}", listener.local_addr()?);

        loop {
            let (stream, client_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let context = self.context.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_session(stream, client_addr, context).await {
                    debug!("Session for {} ended with error [{}]: {}", client_addr, e.code(), e);
                }
            });
        }
    }

    /// Start the HTTP health server
    pub async fn start_http(&self) -> DaemonResult<()> {
        let addr = Self::addr(&self.config.server.http_addr, self.config.server.http_port)?;
        let listener = std::net::TcpListener::bind(addr)?;
        self.serve_http(listener).await
    }

    /// Serve health endpoints on an already-bound listener
    pub async fn serve_http(&self, listener: std::net::TcpListener) -> DaemonResult<()> {
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        let registry = self.context.registry.clone();

        let make_svc = make_service_fn(move |_conn| {
            let registry = registry.clone();
            async move {
                Ok::<_, hyper::Error>(service_fn(move |req| {
                    let registry = registry.clone();
                    handle_http_request(req, registry)
                }))
            }
        });

        let server = Server::from_tcp(listener)
            .map_err(|e| DaemonError::ServerError(format!("HTTP server error: {}", e)))?
            .serve(make_svc);

        info!("HTTP server listening on http://{}", addr);

        server
            .await
            .map_err(|e| DaemonError::ServerError(format!("HTTP server error: {}", e)))
    }

    /// Start the metrics endpoint
    pub async fn start_metrics(&self) -> DaemonResult<()> {
        if !self.config.server.enable_metrics {
            return Ok(());
        }

        let addr = Self::addr(&self.config.server.http_addr, self.config.server.metrics_port)?;
        let metrics = self.context.metrics.clone();

        let make_svc = make_service_fn(move |_conn| {
            let metrics = metrics.clone();
            async move {
                Ok::<_, hyper::Error>(service_fn(move |_req| {
                    let metrics = metrics.clone();
                    handle_metrics_request(metrics)
                }))
            }
        });

        let server = Server::try_bind(&addr)
            .map_err(|e| DaemonError::ServerError(format!("Metrics server error: {}", e)))?
            .serve(make_svc);

        info!("Metrics endpoint listening on http://{}", addr);

        server
            .await
            .map_err(|e| DaemonError::ServerError(format!("Metrics server error: {}", e)))
    }

    /// Run every listener until one of them stops
    pub async fn run(&self) -> DaemonResult<()> {
        let server = self.clone();
        let ws_handle = tokio::spawn(async move { server.start_ws().await });

        let server = self.clone();
        let http_handle = tokio::spawn(async move { server.start_http().await });

        let server = self.clone();
        let metrics_handle = tokio::spawn(async move {
            if let Err(e) = server.start_metrics().await {
                error!("Metrics server error: {:?}", e);
            }
        });

        info!(
            architect = self.context.architect.name(),
            "Mediator server started"
        );

        let result = tokio::select! {
            r = ws_handle => r,
            r = http_handle => r,
        };
        metrics_handle.abort();

        result.map_err(|e| DaemonError::ServerError(format!("Listener task failed: {}", e)))?
    }
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Body> {
    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

/// Handle health and banner requests
async fn handle_http_request(
    req: Request<Body>,
    registry: Arc<ConnectionRegistry>,
) -> Result<Response<Body>, hyper::Error> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/health") => json_response(StatusCode::OK, json!({"status": "ok"})),
        (&Method::GET, "/") => json_response(
            StatusCode::OK,
            json!({
                "message": "Mediator daemon",
                "version": crate::VERSION,
                "active_sessions": registry.active_count(),
                "max_sessions": registry.max_connections(),
            }),
        ),
        _ => json_response(StatusCode::NOT_FOUND, json!({"error": "not found"})),
    };
    Ok(response)
}

/// Handle metrics requests
async fn handle_metrics_request(
    metrics: Arc<MetricsCollector>,
) -> Result<Response<Body>, hyper::Error> {
    let response = match metrics.gather_metrics() {
        Ok(body) => {
            let mut response = Response::new(Body::from(body));
            response.headers_mut().insert(
                hyper::header::CONTENT_TYPE,
                hyper::header::HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(e) => {
            error!("Failed to gather metrics: {:?}", e);
            let mut response = Response::new(Body::from("Failed to gather metrics"));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    };
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArchitectProvider;

    fn echo_config() -> DaemonConfig {
        let mut config = DaemonConfig::default();
        config.architect.provider = ArchitectProvider::Echo;
        config
    }

    async fn get(path: &str, registry: Arc<ConnectionRegistry>) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = handle_http_request(req, registry).await.unwrap();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_server_creation() {
        assert!(MediatorServer::new(echo_config()).is_ok());
    }

    #[test]
    fn test_server_rejects_invalid_config() {
        let mut config = echo_config();
        config.server.max_connections = 0;
        assert!(matches!(
            MediatorServer::new(config),
            Err(DaemonError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_run_reports_taken_port() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let mut config = echo_config();
        config.server.ws_addr = "127.0.0.1".to_string();
        config.server.http_addr = "127.0.0.1".to_string();
        config.server.ws_port = port;
        config.server.http_port = port;
        config.server.enable_metrics = false;

        let server = MediatorServer::new(config).unwrap();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), server.run())
            .await
            .unwrap();
        assert!(matches!(result, Err(DaemonError::IoError(_))));
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let registry = Arc::new(ConnectionRegistry::new(4));
        registry.register("127.0.0.1:1".parse().unwrap()).unwrap();

        let (status, body) = get("/health", registry.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));

        let (status, body) = get("/", registry.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["active_sessions"], 1);
        assert_eq!(body["max_sessions"], 4);
        assert_eq!(body["version"], crate::VERSION);

        let (status, _) = get("/missing", registry).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        metrics.record_session_opened();

        let response = handle_metrics_request(metrics).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("sessions_active 1"));
    }
}
