// Serves the remote-driver protocol over the local pipe socket and owns the
// plugin spec file for the serving lifetime.

use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::json;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::config::DriverConfig;
use crate::error::{ErrorWrap, GangplankError, GangplankResult};
use crate::wrap;

use super::messages::*;
use super::DriverCore;

/// Handle on a running pipe server, owned by the driver while serving.
pub struct ServeHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Bind the pipe, launch the serving task, publish the spec file and wait
/// until the pipe is dialable. On failure everything is rolled back and the
/// driver stays down.
pub(crate) async fn serve(core: Arc<DriverCore>) -> GangplankResult<ServeHandle> {
    let config = core.config.clone();
    let handle = bind_and_spawn(core).await?;

    match publish_and_wait(&config).await {
        Ok(()) => Ok(handle),
        Err(err) => {
            error!("When bringing up the pipe server: {}", err);
            shutdown(handle, &config).await;
            Err(err)
        }
    }
}

async fn bind_and_spawn(core: Arc<DriverCore>) -> GangplankResult<ServeHandle> {
    let config = &core.config;

    if let Some(parent) = config.pipe_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    match tokio::fs::remove_file(&config.pipe_path).await {
        Ok(()) => warn!("Removed stale pipe file {}", config.pipe_path.display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }

    let listener = wrap!(UnixListener::bind(&config.pipe_path), "when setting up listener")?;
    std::fs::set_permissions(
        &config.pipe_path,
        std::fs::Permissions::from_mode(config.pipe_mode),
    )?;

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let app = router(core.clone());

    let task = tokio::spawn(async move {
        let wait_for_shutdown = async move {
            // the sender closing counts as a shutdown signal too
            let _ = shutdown_rx.changed().await;
        };
        if let Err(err) = axum::serve(listener, app)
            .with_graceful_shutdown(wait_for_shutdown)
            .await
        {
            error!("Pipe server terminated: {}", err);
        }
    });

    Ok(ServeHandle {
        shutdown: shutdown_tx,
        task,
    })
}

async fn publish_and_wait(config: &DriverConfig) -> GangplankResult<()> {
    wrap!(
        tokio::fs::create_dir_all(&config.spec_dir).await,
        "when setting up plugin spec directory"
    )?;
    wrap!(
        tokio::fs::write(config.spec_file_path(), config.pipe_url()).await,
        "when creating spec file"
    )?;

    wait_for_pipe_file(config, true)
        .await
        .wrap("when waiting for pipe to start")
}

/// Stop the serving task, remove the spec file and wait for the pipe file
/// to disappear. Cleanup problems are logged, not surfaced.
pub(crate) async fn shutdown(handle: ServeHandle, config: &DriverConfig) {
    if handle.shutdown.send(true).is_err() {
        warn!("Pipe server was already gone at shutdown");
    }
    if let Err(err) = handle.task.await {
        warn!("When joining the pipe server task: {}", err);
    }

    info!("Closing pipe listener");
    if let Err(err) = std::fs::remove_file(&config.pipe_path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!("When closing listener: {}", err);
        }
    }

    info!("Removing spec file");
    if let Err(err) = std::fs::remove_file(config.spec_file_path()) {
        warn!("When removing spec file: {}", err);
    }

    if let Err(err) = wait_for_pipe_file(config, false).await {
        warn!("Failed to properly close the pipe, but will continue anyways: {}", err);
    }
}

async fn wait_for_pipe_file(config: &DriverConfig, wait_until_exists: bool) -> GangplankResult<()> {
    let started = Instant::now();
    loop {
        if started.elapsed() > config.pipe_timeout {
            return Err(GangplankError::Timeout(
                "waited for the pipe file for too long".to_string(),
            ));
        }

        if config.pipe_path.exists() == wait_until_exists {
            break;
        }
        debug!("Waiting for pipe file {}", config.pipe_path.display());
        sleep(config.pipe_poll).await;
    }

    if wait_until_exists {
        // a freshly bound pipe occasionally rejects the very first dial
        sleep(Duration::from_secs(1)).await;
        wait_until_dialable(config).await
    } else {
        Ok(())
    }
}

async fn wait_until_dialable(config: &DriverConfig) -> GangplankResult<()> {
    let started = Instant::now();
    loop {
        if started.elapsed() > config.pipe_timeout {
            return Err(GangplankError::Timeout(
                "waited for the pipe to be dialable for too long".to_string(),
            ));
        }

        let dial = tokio::time::timeout(
            Duration::from_millis(10),
            UnixStream::connect(&config.pipe_path),
        )
        .await;
        match dial {
            Ok(Ok(_connection)) => return Ok(()),
            Ok(Err(err)) => debug!("Waiting until dialable, but: {}", err),
            Err(_) => debug!("Waiting until dialable, but the dial timed out"),
        }
        sleep(config.pipe_poll).await;
    }
}

fn router(core: Arc<DriverCore>) -> Router {
    Router::new()
        .route("/Plugin.Activate", post(activate))
        .route("/NetworkDriver.GetCapabilities", post(get_capabilities))
        .route("/NetworkDriver.CreateNetwork", post(create_network))
        .route("/NetworkDriver.DeleteNetwork", post(delete_network))
        .route("/NetworkDriver.AllocateNetwork", post(allocate_network))
        .route("/NetworkDriver.FreeNetwork", post(free_network))
        .route("/NetworkDriver.CreateEndpoint", post(create_endpoint))
        .route("/NetworkDriver.DeleteEndpoint", post(delete_endpoint))
        .route("/NetworkDriver.EndpointOperInfo", post(endpoint_info))
        .route("/NetworkDriver.Join", post(join))
        .route("/NetworkDriver.Leave", post(leave))
        .route("/NetworkDriver.DiscoverNew", post(discover_new))
        .route("/NetworkDriver.DiscoverDelete", post(discover_delete))
        .route(
            "/NetworkDriver.ProgramExternalConnectivity",
            post(program_external_connectivity),
        )
        .route(
            "/NetworkDriver.RevokeExternalConnectivity",
            post(revoke_external_connectivity),
        )
        .with_state(core)
}

/// Encode a handler result the way the runtime expects: the response body on
/// success, an `Err` object otherwise.
fn reply<T: Serialize>(result: GangplankResult<T>) -> Response {
    match result.and_then(|value| Ok(serde_json::to_value(value)?)) {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(err) => {
            error!("{}", err);
            let body = Json(json!(ErrorResponse {
                err: err.to_string(),
            }));
            (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
        }
    }
}

async fn activate() -> Response {
    debug!("=== Activate");
    reply(Ok(ActivateResponse {
        implements: vec!["NetworkDriver".to_string()],
    }))
}

async fn get_capabilities(State(core): State<Arc<DriverCore>>) -> Response {
    reply(Ok(core.get_capabilities()))
}

async fn create_network(
    State(core): State<Arc<DriverCore>>,
    Json(req): Json<CreateNetworkRequest>,
) -> Response {
    reply(core.create_network(req).await.map(|()| json!({})))
}

async fn delete_network(
    State(core): State<Arc<DriverCore>>,
    Json(req): Json<DeleteNetworkRequest>,
) -> Response {
    reply(core.delete_network(req).await.map(|()| json!({})))
}

async fn allocate_network(
    State(core): State<Arc<DriverCore>>,
    Json(req): Json<AllocateNetworkRequest>,
) -> Response {
    reply(core.allocate_network(req))
}

async fn free_network(
    State(core): State<Arc<DriverCore>>,
    Json(req): Json<FreeNetworkRequest>,
) -> Response {
    reply(core.free_network(req).map(|()| json!({})))
}

async fn create_endpoint(
    State(core): State<Arc<DriverCore>>,
    Json(req): Json<CreateEndpointRequest>,
) -> Response {
    reply(core.create_endpoint(req).await)
}

async fn delete_endpoint(
    State(core): State<Arc<DriverCore>>,
    Json(req): Json<DeleteEndpointRequest>,
) -> Response {
    reply(core.delete_endpoint(req).await.map(|()| json!({})))
}

async fn endpoint_info(
    State(core): State<Arc<DriverCore>>,
    Json(req): Json<InfoRequest>,
) -> Response {
    reply(core.endpoint_info(req).await)
}

async fn join(State(core): State<Arc<DriverCore>>, Json(req): Json<JoinRequest>) -> Response {
    reply(core.join(req).await)
}

async fn leave(State(core): State<Arc<DriverCore>>, Json(req): Json<LeaveRequest>) -> Response {
    reply(core.leave(req).await.map(|()| json!({})))
}

async fn discover_new(
    State(core): State<Arc<DriverCore>>,
    Json(req): Json<DiscoveryNotification>,
) -> Response {
    reply(core.discover_new(req).map(|()| json!({})))
}

async fn discover_delete(
    State(core): State<Arc<DriverCore>>,
    Json(req): Json<DiscoveryNotification>,
) -> Response {
    reply(core.discover_delete(req).map(|()| json!({})))
}

async fn program_external_connectivity(
    State(core): State<Arc<DriverCore>>,
    Json(req): Json<ProgramExternalConnectivityRequest>,
) -> Response {
    reply(core.program_external_connectivity(req).map(|()| json!({})))
}

async fn revoke_external_connectivity(
    State(core): State<Arc<DriverCore>>,
    Json(req): Json<RevokeExternalConnectivityRequest>,
) -> Response {
    reply(core.revoke_external_connectivity(req).map(|()| json!({})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GangplankError;
    use crate::hostnet::api::HostNetApi;
    use crate::testutil::test_driver;

    async fn dialable(config: &DriverConfig) -> bool {
        UnixStream::connect(&config.pipe_path).await.is_ok()
    }

    #[tokio::test]
    async fn test_start_stop_twice() {
        let (mut driver, planes) = test_driver();
        let config = driver.core.config.clone();

        for _ in 0..2 {
            driver.start_serving().await.unwrap();
            assert!(driver.is_serving());
            assert!(config.pipe_path.exists());
            assert!(config.spec_file_path().exists());
            assert!(dialable(&config).await);

            driver.stop_serving().await.unwrap();
            assert!(!driver.is_serving());
            assert!(!config.pipe_path.exists());
            assert!(!config.spec_file_path().exists());
            assert!(!dialable(&config).await);
        }

        // the root host network was created exactly once
        assert!(planes
            .hostnet
            .get_network_by_name(&config.root_network_name)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let (mut driver, _planes) = test_driver();

        driver.start_serving().await.unwrap();
        let err = driver.start_serving().await.unwrap_err();
        assert!(matches!(err, GangplankError::AlreadyServing));
        driver.stop_serving().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let (mut driver, _planes) = test_driver();
        driver.stop_serving().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_fails_when_extension_stopped() {
        let (mut driver, planes) = test_driver();
        planes.shell.set_running(false);

        let err = driver.start_serving().await.unwrap_err();
        assert!(matches!(err, GangplankError::ExtensionStopped(_)));
        assert!(!driver.is_serving());
        assert!(!driver.core.config.pipe_path.exists());
    }

    #[tokio::test]
    async fn test_start_reenables_extension() {
        let (mut driver, planes) = test_driver();

        driver.start_serving().await.unwrap();
        driver.stop_serving().await.unwrap();

        // somebody disabled the extension behind our back
        planes.shell.set_enabled(false);

        driver.start_serving().await.unwrap();
        assert!(planes.shell.enabled());
        driver.stop_serving().await.unwrap();
    }

    #[tokio::test]
    async fn test_spec_file_contents() {
        let (mut driver, _planes) = test_driver();
        let config = driver.core.config.clone();

        driver.start_serving().await.unwrap();
        let spec = std::fs::read_to_string(config.spec_file_path()).unwrap();
        assert_eq!(spec, config.pipe_url());
        driver.stop_serving().await.unwrap();
    }

    #[tokio::test]
    async fn test_served_protocol_roundtrip() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let (mut driver, _planes) = test_driver();
        let config = driver.core.config.clone();
        driver.start_serving().await.unwrap();

        let mut stream = UnixStream::connect(&config.pipe_path).await.unwrap();
        let request = "POST /NetworkDriver.GetCapabilities HTTP/1.1\r\n\
                       Host: gangplank\r\n\
                       Content-Type: application/json\r\n\
                       Content-Length: 2\r\n\
                       Connection: close\r\n\r\n{}";
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        let response = String::from_utf8_lossy(&raw);
        assert!(response.contains("200"));
        assert!(response.contains("\"Scope\":\"local\""));

        driver.stop_serving().await.unwrap();
    }
}
