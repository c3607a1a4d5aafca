//! 服务管理器模块 - 负责管理多个服务的生命周期

use super::HttpRouterService;
use crate::service::trace::http_trace_layer;
use addrbook_common::config::AppConfig;
use anyhow::Result;
use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use url::Url;

/// 服务管理器，负责管理多个服务的生命周期
#[derive(Debug)]
pub struct ServiceManager {
    services: Vec<Box<dyn HttpRouterService>>,
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
    config: AppConfig,
    local_addr: Option<SocketAddr>,
}

impl ServiceManager {
    /// 创建新的服务管理器
    pub fn new(config: AppConfig, shutdown_tx: tokio::sync::broadcast::Sender<()>) -> Self {
        Self {
            services: Vec::new(),
            shutdown_tx,
            config,
            local_addr: None,
        }
    }

    /// 添加服务到管理器
    pub fn add_service(&mut self, service: Box<dyn HttpRouterService>) {
        info!("Adding service '{}' to manager", service.info().name);
        self.services.push(service);
    }

    /// 实际监听地址（端口配置为 0 时由系统分配）
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// 合并所有服务路由，挂载 `/metrics` 和全局中间件
    pub async fn build_router(&mut self) -> Result<Router> {
        let mut app = Router::new();

        for service in &mut self.services {
            let route_prefix = service.route_prefix().to_string();
            let service_name = service.info().name.clone();

            let router = service.build_router().await.map_err(|e| {
                error!(
                    "Failed to build router for service '{}': {:?}",
                    service_name, e
                );
                e
            })?;

            info!(
                "Adding route '{}' for service '{}'",
                route_prefix, service_name
            );
            app = if route_prefix.is_empty() || route_prefix == "/" {
                app.merge(router)
            } else {
                app.nest(&route_prefix, router)
            };
        }

        info!("Adding /metrics endpoint for Prometheus");
        app = app.route("/metrics", axum::routing::get(metrics_handler));

        Ok(app
            .layer(http_trace_layer())
            .layer(CorsLayer::permissive()))
    }

    /// 启动HTTP服务器，合并所有HTTP路由服务
    pub async fn start_all(&mut self) -> Result<Vec<JoinHandle<()>>> {
        info!(
            "Starting HTTP server with {} route services (environment: {})",
            self.services.len(),
            self.config.env
        );

        let http_config = &self.config.bind.http;
        let addr = http_config
            .socket_addr()
            .map_err(|e| anyhow::anyhow!("Invalid bind address '{}': {e}", http_config.ip))?;

        let app = self.build_router().await?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to address '{addr}': {e}"))?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);

        let public_url = Url::parse(&format!(
            "http://{}:{}",
            self.config.bind.http.domain_name,
            local_addr.port()
        ))
        .map_err(|e| anyhow::anyhow!("Failed to parse HTTP URL: {e}"))?;

        for service in &mut self.services {
            if let Err(e) = service.on_start(public_url.clone()).await {
                error!("Failed to start service '{}': {:?}", service.info().name, e);
                service.info_mut().set_error(e.to_string());
            }
        }

        info!("HTTP server listening on {}", local_addr);

        let shutdown_tx = self.shutdown_tx.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("HTTP server received shutdown signal");
            });
            if let Err(e) = server.await {
                error!("HTTP server error: {}", e);
                let _ = shutdown_tx.send(());
            }
            info!("HTTP server stopped");
        });

        Ok(vec![handle])
    }

    /// Stop all services
    pub async fn stop_all(&mut self) -> Result<()> {
        info!("Stopping all services");

        let _ = self.shutdown_tx.send(());
        for service in &mut self.services {
            service.on_stop().await?;
        }

        info!("All services stopped");
        Ok(())
    }
}

/// Prometheus metrics endpoint handler
async fn metrics_handler() -> Response {
    match addrbook_common::metrics::export_metrics() {
        Ok(body) => body.into_response(),
        Err(e) => {
            error!("Failed to export metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to export metrics").into_response()
        }
    }
}
