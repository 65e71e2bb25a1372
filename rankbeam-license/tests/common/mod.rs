use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use tempfile::TempDir;

use rankbeam_license::{ActivationGate, InlineDispatcher, LicenseClient, LicenseStorage};
use rankbeam_licensing::{LicensingService, TracingMailer};
use rankbeam_server::{AppState, build_router};

/// Spin up a license server with a throwaway database, returning the base
/// URL. The guard keeps the database directory alive.
pub async fn spawn_server() -> (String, TempDir) {
    spawn_server_with_token(None).await
}

pub async fn spawn_server_with_token(token: Option<&str>) -> (String, TempDir) {
    let dir = TempDir::new().unwrap();
    let service = LicensingService::open(dir.path().join("licenses.db"), 365).unwrap();
    let state = AppState {
        service: Arc::new(service),
        installer_token: token.map(String::from),
        webhook_secret: None,
        mailer: Arc::new(TracingMailer),
    };
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://127.0.0.1:{}", port), dir)
}

/// A gate wired to the given server with storage under a temp directory.
/// The counter records how many times the success continuation ran.
pub fn build_gate(base_url: &str, storage_dir: &TempDir) -> (ActivationGate, Arc<AtomicUsize>) {
    let launches = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&launches);
    let gate = ActivationGate::new(
        LicenseClient::new(base_url, None).unwrap(),
        LicenseStorage::with_dir(storage_dir.path()),
        Box::new(InlineDispatcher),
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );
    (gate, launches)
}

/// Requests a license from the server for this machine's fingerprint.
pub async fn issue_for_this_machine(base_url: &str) -> rankbeam_license::IssuedLicense {
    let client = LicenseClient::new(base_url, None).unwrap();
    let fingerprint = rankbeam_license::machine_fingerprint().unwrap();
    client.request_license("Test Customer", &fingerprint).await.unwrap()
}
