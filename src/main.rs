/// Entry point for the dockwatch container observer.
///
/// Starts per-container metric polling with incremental log tailing and
/// passive flow capture on the container bridge, then runs until interrupted.
///
/// # Errors
///
/// Returns an error if startup fails (e.g., the signal handler cannot be
/// installed).
///
/// # Examples
///
/// ```bash
/// DOCKWATCH_INTERFACE=docker0 RUST_LOG=debug cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    dockwatch::run().await
}
