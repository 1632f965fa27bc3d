//! Control API server.

use crate::control_api::router::route_request;
use crate::fleet::FleetManager;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct ControlApiServer {
    listener: TcpListener,
    fleet: Arc<FleetManager>,
}

impl ControlApiServer {
    /// Bind the control API listener.
    pub async fn bind(addr: SocketAddr, fleet: Arc<FleetManager>) -> Result<Self, anyhow::Error> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, fleet })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, anyhow::Error> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), anyhow::Error> {
        info!(
            "Mockyard control API listening on http://{}",
            self.local_addr()?
        );

        loop {
            let (stream, _) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Control API accept error: {}", e);
                        continue;
                    }
                },
            };
            let io = TokioIo::new(stream);
            let fleet = Arc::clone(&self.fleet);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let fleet = Arc::clone(&fleet);
                    async move { route_request(req, fleet).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Control API connection error: {}", e);
                }
            });
        }

        info!("Control API stopped");
        Ok(())
    }
}
