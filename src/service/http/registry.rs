//! Registry HTTP 服务实现
//!
//! 用户注册/登录、地址维护接口，变更类接口挂在准入网关之后

use crate::service::ServiceType;
use crate::service::{HttpRouterService, info::ServiceInfo};
use addrbook_common::config::AppConfig;
use anyhow::Result;
use async_trait::async_trait;
use axum::Router;
use gate::AdmissionGate;
use registry::{RegistryState, create_router};
use tracing::info;

/// Registry HTTP 服务实现
pub struct RegistryHttpService {
    info: ServiceInfo,
    state: RegistryState,
    gate: AdmissionGate,
}

impl RegistryHttpService {
    pub fn new(config: &AppConfig, state: RegistryState, gate: AdmissionGate) -> Self {
        Self {
            info: ServiceInfo::new(
                "Registry Service",
                ServiceType::Registry,
                Some("用户与地址管理服务".to_string()),
                config,
            ),
            state,
            gate,
        }
    }
}

impl std::fmt::Debug for RegistryHttpService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryHttpService")
            .field("info", &self.info)
            .field("backend", &self.state.storage.backend_name())
            .field("gate", &self.gate)
            .finish()
    }
}

#[async_trait]
impl HttpRouterService for RegistryHttpService {
    fn info(&self) -> &ServiceInfo {
        &self.info
    }

    fn info_mut(&mut self) -> &mut ServiceInfo {
        &mut self.info
    }

    async fn build_router(&mut self) -> Result<Router> {
        info!("Building registry router");
        let router = create_router(self.state.clone(), self.gate.clone());
        info!("Registry router built successfully");
        Ok(router)
    }

    async fn on_stop(&mut self) -> Result<()> {
        info!(
            "Registry service stopped, {} nonces still tracked",
            self.gate.ledger().len()
        );
        self.info_mut().status = crate::service::ServiceStatus::Unknown;
        Ok(())
    }

    fn route_prefix(&self) -> &str {
        "/"
    }
}
