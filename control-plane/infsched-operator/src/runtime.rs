use std::net::SocketAddr;
use std::sync::Arc;

use kube::Client;
use tokio::{task::JoinHandle, try_join};
use tokio_util::sync::CancellationToken;

use crate::{
    config::OperatorConfig,
    controller::{ControllerContext, run_controller},
    registry::TypeRegistry,
    web::run_http_server,
};

/// Compute the HTTP bind address based on config.
pub fn compute_http_addr(cfg: &OperatorConfig) -> SocketAddr {
    ([0, 0, 0, 0], cfg.http_port).into()
}

/// Spawn the Kubernetes controller loop. Its exit stops the whole process.
pub fn spawn_controller(
    ctx: Arc<ControllerContext>,
) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move {
        let _stop = ctx.shutdown.clone().drop_guard();
        run_controller(ctx).await
    })
}

/// Spawn the health server.
pub fn spawn_http(
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move {
        let _stop = shutdown.clone().drop_guard();
        run_http_server(addr, shutdown).await
    })
}

/// Start controller and health server; return once both have stopped.
pub async fn run_all(
    client: Client,
    cfg: OperatorConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let http_addr = compute_http_addr(&cfg);
    let registry = Arc::new(TypeRegistry::builtin());
    let ctx = Arc::new(ControllerContext::new(
        client,
        cfg,
        registry,
        shutdown.clone(),
    )?);

    let controller = spawn_controller(ctx);
    let http = spawn_http(http_addr, shutdown);

    let (c_res, h_res) = try_join!(controller, http)?;
    c_res?;
    h_res?;
    Ok(())
}
