//! HTTP server implementation
//!
//! hyper http1 over TokioIo, one task per connection, upgrades enabled for
//! the realtime gateway.

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditAction, AuditEvent, AuditLogger};
use crate::auth::{Argon2Hasher, CredentialHasher, PermissionResolver, SessionManager};
use crate::config::Args;
use crate::presence::PresenceRegistry;
use crate::routes::{self, apply_cors, not_found_response, preflight_response, AuditPrincipal, BoxBody};
use crate::server::websocket;
use crate::store::seed::SeedData;
use crate::store::{CredentialStore, MemoryStore, RoleStore};
use crate::types::WicketError;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub sessions: SessionManager,
    pub credentials: Arc<dyn CredentialStore>,
    /// Live connection counts; dropped with the state, never global
    pub presence: Arc<PresenceRegistry>,
    pub audit: AuditLogger,
    pub started_at: Instant,
}

impl AppState {
    /// Wire the session core over the given stores
    pub fn new(
        args: Args,
        credentials: Arc<dyn CredentialStore>,
        roles: Arc<dyn RoleStore>,
        hasher: Arc<dyn CredentialHasher>,
        audit: AuditLogger,
    ) -> Result<Self, WicketError> {
        let timeout = args.store_timeout();
        let resolver = PermissionResolver::new(roles, timeout);
        let sessions = SessionManager::new(
            Arc::clone(&credentials),
            resolver,
            args.token_keys()?,
            hasher,
            args.lifetime_policy(),
            timeout,
        );
        let presence = Arc::new(PresenceRegistry::new(args.presence_channel_capacity));

        Ok(Self {
            args,
            sessions,
            credentials,
            presence,
            audit,
            started_at: Instant::now(),
        })
    }

    /// State over an in-memory store holding the default seed data
    pub async fn in_memory(args: Args, audit: AuditLogger) -> Result<Self, WicketError> {
        let hasher = Argon2Hasher;
        let store = Arc::new(MemoryStore::new());
        SeedData::build(&hasher, || uuid::Uuid::new_v4().to_string())?
            .load_into(&store)
            .await?;
        info!("In-memory store seeded with default roles and principals");

        Self::new(
            args,
            Arc::clone(&store) as Arc<dyn CredentialStore>,
            store,
            Arc::new(hasher),
            audit,
        )
    }
}

/// Bind the configured address and serve until the process exits
pub async fn run(state: Arc<AppState>) -> Result<(), WicketError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("Wicket listening on {}", state.args.listen);
    if state.args.dev_mode {
        warn!("Development mode enabled - in-memory store and fixed token secrets");
    }

    serve(listener, state).await
}

/// Accept loop over an already-bound listener
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<(), WicketError> {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { Ok::<_, Infallible>(handle_request(state, addr, req).await) }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .with_upgrades()
                        .await
                    {
                        debug!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route a request, then apply CORS and the request audit
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Response<BoxBody> {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let headers = req.headers().clone();

    debug!("{} {} from {}", method, path, addr);

    let mut response = match (&method, path.as_str()) {
        (&Method::OPTIONS, _) => preflight_response(),

        (&Method::GET, "/api/health") => routes::health_check(Arc::clone(&state)),
        (&Method::GET, "/version") => routes::version_info(),

        (_, p) if p.starts_with("/api/v1/auth/") => {
            routes::handle_auth_request(req, Arc::clone(&state), addr).await
        }

        (_, "/api/v1/users") => routes::handle_users_request(req, Arc::clone(&state)).await,

        (&Method::GET, "/ws") => websocket::handle_upgrade(Arc::clone(&state), req),

        _ => not_found_response(&path),
    };

    apply_cors(&mut response, &state.args.client_origin);

    // Auth routes audit themselves with richer actions
    let audited = method != Method::OPTIONS
        && path.starts_with("/api/")
        && !path.starts_with("/api/v1/auth/");
    if audited {
        let mut event = AuditEvent::new(AuditAction::Request, method.as_str(), &path)
            .with_client(&headers, Some(addr))
            .with_status(response.status().as_u16())
            .with_metadata(serde_json::json!({
                "responseTimeMs": started.elapsed().as_millis() as u64,
            }));
        if let Some(AuditPrincipal(id)) = response.extensions().get::<AuditPrincipal>() {
            event = event.with_principal(id);
        }
        state.audit.record(event);
    }

    response
}
