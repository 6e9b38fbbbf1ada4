//! Minimal HTTP server returning canned responses, for download tests.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use tokio::task::JoinHandle;

type Routes = HashMap<String, (u16, Vec<u8>)>;

/// Serves fixed `(status, body)` pairs by path on `127.0.0.1`. Unknown
/// paths get 404.
pub struct StaticServer {
    addr: SocketAddr,
    hits: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl StaticServer {
    /// Start on an ephemeral port. Must be called inside a tokio runtime.
    pub fn start<I, P>(routes: I) -> Self
    where
        I: IntoIterator<Item = (P, u16, Vec<u8>)>,
        P: Into<String>,
    {
        let routes: Arc<Routes> = Arc::new(
            routes
                .into_iter()
                .map(|(path, status, body)| (path.into(), (status, body)))
                .collect(),
        );
        let hits = Arc::new(Mutex::new(Vec::new()));

        let listener = TcpListener::bind("127.0.0.1:0").expect("bind static server");
        listener
            .set_nonblocking(true)
            .expect("nonblocking listener");
        let addr = listener.local_addr().expect("local addr");

        let svc_routes = routes.clone();
        let svc_hits = hits.clone();
        let make_svc = make_service_fn(move |_| {
            let routes = svc_routes.clone();
            let hits = svc_hits.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                    let routes = routes.clone();
                    let hits = hits.clone();
                    async move {
                        let path = req.uri().path().to_string();
                        hits.lock().expect("hits poisoned").push(path.clone());
                        let (status, body) = routes
                            .get(&path)
                            .cloned()
                            .unwrap_or((404, b"not found".to_vec()));
                        let response = Response::builder()
                            .status(StatusCode::from_u16(status).unwrap_or(StatusCode::NOT_FOUND))
                            .body(Body::from(body))
                            .unwrap_or_default();
                        Ok::<_, Infallible>(response)
                    }
                }))
            }
        });

        let server = Server::from_tcp(listener)
            .expect("static server from listener")
            .serve(make_svc);
        let task = tokio::spawn(async move {
            let _ = server.await;
        });

        Self { addr, hits, task }
    }

    /// Absolute URL for `path` on this server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Paths requested so far, in order.
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().expect("hits poisoned").clone()
    }
}

impl Drop for StaticServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
