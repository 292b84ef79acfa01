use std::env;
use std::path::PathBuf;

use sandbox_host::server::run_server;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let cwd = std::env::current_dir().expect("failed to read current directory");

    let workspace_path = env::var("WORKSPACE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| cwd.join("workspace"));

    let port = env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8330);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        let _ = shutdown_tx.send(());
    });

    run_server(workspace_path, port, shutdown_rx).await;
}
