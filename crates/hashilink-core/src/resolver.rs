// ── Backend / region resolution ──
//
// Built once at startup from `GatewayConfig` and shared read-only by
// every connection. A connection names a backend (`nomad` / `consul`)
// and optionally a region; the resolver hands back the backend's adapter
// and the concrete region, or refuses before any session exists.

use std::sync::Arc;

use tracing::{info, warn};

use crate::adapter;
use crate::config::{BackendConfig, BackendKind, GatewayConfig};
use crate::error::CoreError;
use crate::upstream::Upstream;

/// One enabled backend: immutable configuration plus its adapter.
pub struct Backend {
    config: BackendConfig,
    upstream: Arc<dyn Upstream>,
}

impl Backend {
    pub fn new(config: BackendConfig, upstream: Arc<dyn Upstream>) -> Self {
        Self { config, upstream }
    }

    pub fn kind(&self) -> BackendKind {
        self.config.kind
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn read_only(&self) -> bool {
        self.config.read_only
    }

    pub fn upstream(&self) -> &Arc<dyn Upstream> {
        &self.upstream
    }

    /// Map an optional region token onto a known region.
    pub fn resolve_region(&self, region: Option<&str>) -> Result<String, CoreError> {
        match region {
            None | Some("") => Ok(self.config.primary_region().to_owned()),
            Some(r) if self.config.regions.iter().any(|known| known == r) => Ok(r.to_owned()),
            Some(r) => Err(CoreError::UnknownRegion {
                backend: self.kind(),
                region: r.to_owned(),
            }),
        }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("kind", &self.config.kind)
            .field("address", &self.config.address.as_str())
            .field("regions", &self.config.regions)
            .field("read_only", &self.config.read_only)
            .finish_non_exhaustive()
    }
}

/// The backend and region a connection is bound to.
#[derive(Debug, Clone)]
pub struct Target {
    pub backend: Arc<Backend>,
    pub region: String,
}

#[derive(Debug, Default)]
pub struct Resolver {
    nomad: Option<Arc<Backend>>,
    consul: Option<Arc<Backend>>,
}

impl Resolver {
    /// Assemble a resolver from ready-made backends.
    pub fn new(backends: impl IntoIterator<Item = Backend>) -> Self {
        let mut resolver = Self::default();
        for backend in backends {
            let slot = match backend.kind() {
                BackendKind::Nomad => &mut resolver.nomad,
                BackendKind::Consul => &mut resolver.consul,
            };
            *slot = Some(Arc::new(backend));
        }
        resolver
    }

    /// Build HTTP adapters for every enabled backend.
    ///
    /// With `discover_regions`, Nomad's `/v1/regions` is merged into the
    /// configured list once. A failed discovery is logged, not fatal.
    pub async fn bootstrap(config: &GatewayConfig) -> Result<Self, CoreError> {
        let mut backends = Vec::new();
        for backend in config.backends() {
            let mut backend = backend.clone();
            if backend.kind == BackendKind::Nomad && backend.discover_regions {
                match adapter::discover_regions(&backend).await {
                    Ok(found) => {
                        for region in found {
                            if !backend.regions.contains(&region) {
                                backend.regions.push(region);
                            }
                        }
                        info!(regions = ?backend.regions, "discovered nomad regions");
                    }
                    Err(e) => {
                        warn!(error = %e, "region discovery failed, using configured regions");
                    }
                }
            }
            let upstream = adapter::build(&backend, &config.poller)?;
            info!(
                backend = %backend.kind,
                address = %backend.address,
                read_only = backend.read_only,
                "backend ready"
            );
            backends.push(Backend::new(backend, upstream));
        }
        Ok(Self::new(backends))
    }

    /// Resolve a path's backend selector and optional region.
    pub fn resolve(&self, selector: &str, region: Option<&str>) -> Result<Target, CoreError> {
        let kind: BackendKind = selector.parse().map_err(|_| CoreError::UnknownBackend {
            name: selector.to_owned(),
        })?;
        let backend = self.get(kind).ok_or(CoreError::BackendDisabled { backend: kind })?;
        let region = backend.resolve_region(region)?;
        Ok(Target {
            backend: Arc::clone(backend),
            region,
        })
    }

    pub fn get(&self, kind: BackendKind) -> Option<&Arc<Backend>> {
        match kind {
            BackendKind::Nomad => self.nomad.as_ref(),
            BackendKind::Consul => self.consul.as_ref(),
        }
    }

    /// Enabled backends, Nomad first.
    pub fn backends(&self) -> impl Iterator<Item = &Arc<Backend>> {
        self.nomad.iter().chain(self.consul.iter())
    }
}
