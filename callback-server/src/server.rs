//! HTTP server for GENA `NOTIFY` deliveries.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, UdpSocket};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use warp::http::StatusCode;
use warp::Filter;

use crate::error::ServerError;
use crate::router::{EventRouter, NotificationPayload};

/// Path handed to devices in the `CALLBACK` header. Deliveries to any other
/// path are accepted too.
const NOTIFY_PATH: &str = "notify";

/// HTTP callback server for UPnP event notifications.
///
/// Binds the first free port of a range, accepts `NOTIFY` on any path,
/// checks the GENA headers and hands each delivery to an [`EventRouter`].
///
/// # Example
///
/// ```no_run
/// use tokio::sync::mpsc;
/// use callback_server::{CallbackServer, NotificationPayload};
///
/// #[tokio::main]
/// async fn main() {
///     let (tx, mut rx) = mpsc::unbounded_channel::<NotificationPayload>();
///     let server = CallbackServer::new((3400, 3500), tx).await.unwrap();
///
///     println!("SUBSCRIBE with CALLBACK: <{}>", server.callback_url());
///     while let Some(notification) = rx.recv().await {
///         println!("{} #{}", notification.subscription_id, notification.event_key);
///     }
/// }
/// ```
pub struct CallbackServer {
    port: u16,
    base_url: String,
    event_router: Arc<EventRouter>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl CallbackServer {
    /// Start the server on the first free port of `port_range` (inclusive).
    ///
    /// Returns once the listener is accepting connections. The advertised
    /// address is the interface used for outbound traffic, or loopback when
    /// that cannot be determined.
    pub async fn new(
        port_range: (u16, u16),
        event_sender: mpsc::UnboundedSender<NotificationPayload>,
    ) -> Result<Self, ServerError> {
        let (start, end) = port_range;
        let port = (start..=end)
            .find(|&port| port_is_free(port))
            .ok_or(ServerError::NoAvailablePort { start, end })?;

        let advertised = outbound_ip().unwrap_or_else(|| {
            warn!("Could not determine outbound interface, advertising loopback");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        });

        let event_router = Arc::new(EventRouter::new(event_sender));
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let routes = notify_route(event_router.clone()).recover(into_response);
        let (addr, serving) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)), async move {
                let _ = stop_rx.await;
            })
            .map_err(|e| {
                warn!(port, error = %e, "Callback server bind failed");
                ServerError::StartFailed
            })?;

        let task = tokio::spawn(serving);
        info!("Callback server listening on {addr}");

        Ok(Self {
            port,
            base_url: format!("http://{advertised}:{port}"),
            event_router,
            stop_tx: Some(stop_tx),
            task: Some(task),
        })
    }

    /// Base URL, e.g. `http://192.168.1.5:3400`
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL for the `CALLBACK` header of a SUBSCRIBE request
    pub fn callback_url(&self) -> String {
        format!("{}/{NOTIFY_PATH}", self.base_url)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.event_router
    }

    /// Stop accepting deliveries and wait for in-flight ones to finish
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        debug!(port = self.port, "Callback server stopped");
    }
}

fn port_is_free(port: u16) -> bool {
    TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).is_ok()
}

/// Local address of the interface that routes outbound traffic.
///
/// Connecting a UDP socket sends nothing; it only selects a route.
fn outbound_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

/// GENA headers of one delivery
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct GenaHeaders {
    sid: Option<String>,
    nt: Option<String>,
    nts: Option<String>,
    seq: Option<String>,
}

impl GenaHeaders {
    /// Check the headers and build the payload for `body`.
    ///
    /// `SID` is required. `NT`/`NTS`, when both present, must be
    /// `upnp:event`/`upnp:propchange`. A missing `SEQ` counts as the initial
    /// event (0); an unparsable one is rejected.
    fn into_payload(self, body: &[u8]) -> Result<NotificationPayload, Refusal> {
        let sid = self
            .sid
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(Refusal::BadHeaders)?;

        if let (Some(nt), Some(nts)) = (&self.nt, &self.nts) {
            if nt != "upnp:event" || nts != "upnp:propchange" {
                return Err(Refusal::BadHeaders);
            }
        }

        let event_key = match self.seq.as_deref() {
            None => 0,
            Some(seq) => seq.trim().parse().map_err(|_| Refusal::BadHeaders)?,
        };

        Ok(NotificationPayload {
            subscription_id: sid,
            event_key,
            event_xml: String::from_utf8_lossy(body).into_owned(),
        })
    }
}

/// Why a delivery was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refusal {
    /// Missing SID, wrong NT/NTS or malformed SEQ
    BadHeaders,
    /// The receiving side of the router is gone
    ConsumerGone,
}

impl warp::reject::Reject for Refusal {}

fn notify_route(
    router: Arc<EventRouter>,
) -> impl Filter<Extract = (warp::reply::WithStatus<&'static str>,), Error = warp::Rejection> + Clone {
    let headers = warp::header::optional::<String>("sid")
        .and(warp::header::optional::<String>("nt"))
        .and(warp::header::optional::<String>("nts"))
        .and(warp::header::optional::<String>("seq"))
        .map(|sid, nt, nts, seq| GenaHeaders { sid, nt, nts, seq });

    warp::method()
        .and_then(|method: warp::http::Method| async move {
            if method.as_str() == "NOTIFY" {
                Ok(())
            } else {
                Err(warp::reject::not_found())
            }
        })
        .untuple_one()
        .and(warp::path::full())
        .and(headers)
        .and(warp::body::bytes())
        .and_then(move |path: warp::path::FullPath, headers: GenaHeaders, body: bytes::Bytes| {
            let router = router.clone();
            async move {
                let payload = headers.into_payload(&body).map_err(|refusal| {
                    debug!(path = path.as_str(), "Refusing NOTIFY with invalid GENA headers");
                    warp::reject::custom(refusal)
                })?;

                debug!(
                    sid = %payload.subscription_id,
                    seq = payload.event_key,
                    bytes = body.len(),
                    "NOTIFY received"
                );

                if router.route_event(payload) {
                    Ok(warp::reply::with_status("", StatusCode::OK))
                } else {
                    Err(warp::reject::custom(Refusal::ConsumerGone))
                }
            }
        })
}

async fn into_response(rejection: warp::Rejection) -> Result<impl warp::Reply, std::convert::Infallible> {
    let (status, message) = match rejection.find::<Refusal>() {
        Some(Refusal::BadHeaders) => (StatusCode::BAD_REQUEST, "Invalid GENA headers"),
        Some(Refusal::ConsumerGone) => (StatusCode::SERVICE_UNAVAILABLE, "Not accepting events"),
        None if rejection.is_not_found() => (StatusCode::NOT_FOUND, "Not found"),
        None => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
    };
    Ok(warp::reply::with_status(message, status))
}
