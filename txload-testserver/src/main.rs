use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::time::Duration;
use txload_testserver::{GrpcBehavior, GrpcTestServer, HttpBehavior, TestServerStats};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let mut bind_addr: SocketAddr = "127.0.0.1:0".parse()?;
    let mut behavior = HttpBehavior::AlwaysOk;
    let mut delay = Duration::ZERO;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--bind" => {
                let addr = args.next().ok_or_else(|| {
                    anyhow::anyhow!("--bind requires an address, e.g. 127.0.0.1:0")
                })?;
                bind_addr = addr.parse()?;
            }
            "--fail-every" => {
                let n = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--fail-every requires a number"))?;
                behavior = HttpBehavior::FailEvery(n.parse()?);
            }
            "--delay-ms" => {
                let ms = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--delay-ms requires a number"))?;
                delay = Duration::from_millis(ms.parse()?);
            }
            "-h" | "--help" => {
                eprintln!(
                    "txload-testserver\n\nUSAGE:\n  txload-testserver [--bind 127.0.0.1:0] [--fail-every N] [--delay-ms MS]\n\nOUTPUT:\n  Prints HTTP_URL=<url> and GRPC_TARGET=<host:port> to stdout once ready."
                );
                return Ok(());
            }
            other => {
                return Err(anyhow::anyhow!("unknown argument: {other}"));
            }
        }
    }

    let listener = TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    let grpc = GrpcTestServer::start_with(GrpcBehavior::AlwaysOk).await?;
    let app = txload_testserver::router(behavior, delay, TestServerStats::default());

    println!("HTTP_URL=http://{addr}");
    println!("GRPC_TARGET={}", grpc.target());

    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
    });
    serve.await?;

    grpc.shutdown().await;
    Ok(())
}
