//! Application state shared across handlers.

use cgw_core::audit::{AuditLogger, AuditSink, TracingAuditSink};
use cgw_core::auth::{Authorizer, RemoteAuthorizer, StaticAuthorizer};
use cgw_core::config::{AuthConfig, BackendConfig, GatewayConfig};
use cgw_core::graph::{GraphBackend, GraphHandle, MemoryBackend, RemoteBackend};
use cgw_core::GatewayResult;
use cgw_redis::{init_pool, NotificationBus, RedisAuditSink};
use std::sync::Arc;
use tracing::info;

use crate::cache::GraphClientCache;
use crate::context::RequestContext;

/// Shared application state.
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<GatewayConfig>,
    pub graphs: GraphClientCache,
    pub audit: AuditLogger,
    pub bus: NotificationBus,
    pub auth: Arc<dyn Authorizer>,
}

impl GatewayState {
    pub fn new(
        config: GatewayConfig,
        backend: Arc<dyn GraphBackend>,
        audit_sink: Arc<dyn AuditSink>,
        bus: NotificationBus,
        auth: Arc<dyn Authorizer>,
    ) -> Self {
        let graphs = GraphClientCache::new(backend, &config.table_prefix);
        let audit = AuditLogger::new(audit_sink, config.audit_timeout());
        Self {
            config: Arc::new(config),
            graphs,
            audit,
            bus,
            auth,
        }
    }

    /// Build every collaborator named by `config`.
    ///
    /// With a Redis URL the audit log goes to Redis streams and
    /// notifications cross process boundaries; without one both stay local.
    pub async fn from_config(config: GatewayConfig) -> anyhow::Result<Self> {
        let backend: Arc<dyn GraphBackend> = match &config.backend {
            BackendConfig::Memory { seed_demo } => Arc::new(MemoryBackend::new(*seed_demo)),
            BackendConfig::Remote { url } => Arc::new(RemoteBackend::new(url)),
        };

        let auth: Arc<dyn Authorizer> = match &config.auth {
            AuthConfig::Static { tokens } => Arc::new(StaticAuthorizer::new(tokens.clone())),
            AuthConfig::Remote { url } => Arc::new(RemoteAuthorizer::new(url)),
        };

        let (audit_sink, bus): (Arc<dyn AuditSink>, NotificationBus) = match &config.redis_url {
            Some(url) => {
                let pool = init_pool(url).await?;
                info!("Connected to Redis for audit log and notifications");
                let bus =
                    NotificationBus::redis(url, &config.notification_channel, config.publish_timeout())
                        .await?;
                (Arc::new(RedisAuditSink::new(pool, config.audit_stream_maxlen)), bus)
            }
            None => {
                info!("Redis not configured, audit log and notifications are process-local");
                (Arc::new(TracingAuditSink), NotificationBus::local(config.publish_timeout()))
            }
        };

        Ok(Self::new(config, backend, audit_sink, bus, auth))
    }

    /// Graph handle for `table`. Tags the request with the resolved table.
    pub async fn graph(&self, ctx: &RequestContext, table: &str) -> GatewayResult<GraphHandle> {
        let handle = self.graphs.resolve(table).await?;
        ctx.set_table(handle.table());
        Ok(handle)
    }
}
