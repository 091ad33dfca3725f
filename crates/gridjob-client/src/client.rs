//! Entry point: picks a cluster transport and hands out job handles.

use std::sync::Arc;

use gridjob_cluster::{
    ClusterRegistry, ClusterResult, LocalCluster, NoopExecutor, RemoteCluster, Transport,
};
use gridjob_core::{ClientConfig, ClusterMode, CodeLoader, FsCodeLoader, JobResult};
use tracing::info;

use crate::job::JobHandle;

#[derive(Clone)]
pub struct GridClient {
    cluster: Arc<dyn ClusterRegistry>,
    config: Arc<ClientConfig>,
    loader: Arc<dyn CodeLoader>,
}

impl GridClient {
    /// Build a client for the transport named in `[cluster].mode`.
    ///
    /// Local mode starts an in-memory cluster whose executor only
    /// acknowledges graphs. Its executions run on the calling tokio runtime,
    /// so local mode must be connected from inside one.
    pub fn connect(config: ClientConfig) -> ClusterResult<Self> {
        match config.cluster.mode {
            ClusterMode::Remote => {
                let address = config.cluster.address.clone();
                Ok(Self::remote(&address, config))
            }
            ClusterMode::Local => {
                let cluster = LocalCluster::in_memory(Arc::new(NoopExecutor))?;
                Ok(Self::local(Arc::new(cluster), config))
            }
        }
    }

    /// Drive an in-process cluster.
    pub fn local(cluster: Arc<LocalCluster>, config: ClientConfig) -> Self {
        info!("using in-process cluster");
        Self::with_registry(cluster, config)
    }

    /// Drive gridjobd at `address` (`host:port`).
    pub fn remote(address: &str, config: ClientConfig) -> Self {
        info!(%address, "using remote cluster");
        Self::with_registry(Arc::new(RemoteCluster::new(address)), config)
    }

    /// Drive any registry implementation.
    pub fn with_registry(cluster: Arc<dyn ClusterRegistry>, config: ClientConfig) -> Self {
        Self {
            cluster,
            config: Arc::new(config),
            loader: Arc::new(FsCodeLoader::new(".")),
        }
    }

    /// Resolve code identifiers through `loader` instead of the working directory.
    pub fn with_code_loader(mut self, loader: Arc<dyn CodeLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// New handle for job `name`, in `Unstarted`.
    pub fn job(&self, name: &str) -> JobResult<JobHandle> {
        JobHandle::new(
            name,
            Arc::clone(&self.cluster),
            Arc::clone(&self.config),
            Arc::clone(&self.loader),
        )
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> Transport {
        self.cluster.transport()
    }
}
