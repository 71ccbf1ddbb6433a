//! gRPC server implementation.

use std::net::SocketAddr;

use tonic::transport::Server;
use tracing::{error, info};

use super::proto::envoy::service::ratelimit::v3::rate_limit_service_server::RateLimitServiceServer;
use super::service::RateLimitServiceImpl;
use crate::error::{HivemindError, Result};
use crate::service::RateLimitService;

/// gRPC server for the rate limit service.
pub struct GrpcServer {
    addr: SocketAddr,
    service: RateLimitService,
}

impl GrpcServer {
    pub fn new(addr: SocketAddr, service: RateLimitService) -> Self {
        Self { addr, service }
    }

    /// Start the gRPC server. Blocks until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        let service = RateLimitServiceImpl::new(self.service);

        info!(addr = %self.addr, "Starting gRPC server for RateLimitService");

        Server::builder()
            .add_service(RateLimitServiceServer::new(service))
            .serve(self.addr)
            .await
            .map_err(|e| {
                error!(error = %e, "gRPC server failed");
                HivemindError::Grpc(e)
            })
    }

    /// Start the gRPC server with graceful shutdown.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send,
    {
        let service = RateLimitServiceImpl::new(self.service);

        info!(addr = %self.addr, "Starting gRPC server for RateLimitService with graceful shutdown");

        Server::builder()
            .add_service(RateLimitServiceServer::new(service))
            .serve_with_shutdown(self.addr, signal)
            .await
            .map_err(|e| {
                error!(error = %e, "gRPC server failed");
                HivemindError::Grpc(e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::ratelimit::clock::FixedClock;
    use crate::ratelimit::store::{CounterStoreRouter, InMemoryCounterStore};

    #[test]
    fn server_creation() {
        let addr: SocketAddr = "127.0.0.1:8081".parse().unwrap();
        let store = CounterStoreRouter::new(Arc::new(InMemoryCounterStore::new()));
        let service = RateLimitService::new(store, Arc::new(FixedClock(1_000)), false);
        let _server = GrpcServer::new(addr, service);
    }
}
