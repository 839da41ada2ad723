use std::{error::Error, future::Future, net::SocketAddr};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Request, Response, body::Incoming, server::conn::http1};
use hyper_util::{rt::TokioIo, service::TowerToHyperService};
use tokio::{net::TcpListener, sync::oneshot};
use tower::Service;
use tracing::{debug, info, warn};

/// Accept connections on `listener` and serve each one with a clone of
/// `service` until `shutdown` resolves. Connections already accepted run to
/// completion on their own tasks.
pub async fn serve<S, Shutdown>(listener: TcpListener, service: S, shutdown: Shutdown)
where
    S: Service<Request<Incoming>, Response = Response<Full<Bytes>>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<Box<dyn Error + Send + Sync>>,
    Shutdown: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutting down");
                break;
            }
            result = listener.accept() => match result {
                Ok((stream, peer)) => {
                    let hyper_service = TowerToHyperService::new(service.clone());
                    tokio::spawn(async move {
                        if let Err(error) = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), hyper_service)
                            .await
                        {
                            debug!(%peer, %error, "connection closed with error");
                        }
                    });
                }
                Err(error) => warn!(%error, "failed to accept connection"),
            }
        }
    }
}

/// A server running on a background task.
pub struct KmsServer {
    /// The address the server is listening on
    pub local_addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
}

impl KmsServer {
    /// Bind `host_url` and serve `service` on it in the background.
    pub async fn start<S>(host_url: &str, service: S) -> std::io::Result<Self>
    where
        S: Service<Request<Incoming>, Response = Response<Full<Bytes>>> + Clone + Send + 'static,
        S::Future: Send + 'static,
        S::Error: Into<Box<dyn Error + Send + Sync>>,
    {
        let listener = TcpListener::bind(host_url).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(serve(listener, service, async {
            let _ = shutdown_rx.await;
        }));

        info!(%local_addr, "listening");
        Ok(KmsServer {
            local_addr,
            shutdown_tx,
        })
    }

    /// Stop accepting connections.
    pub fn stop(self) {
        let _ = self.shutdown_tx.send(());
    }
}
