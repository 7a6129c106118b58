// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # HTTP server.
//!
//! Serves [`app`](crate::http::app) until the server is cancelled, either by
//! a bound shutdown signal or by its [`CancellationToken`].
//!

use futures::Future;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::api::CargoveraApi;
use crate::error::Error;
use crate::settings::CargoveraSettings;

/// Cargovera server.
#[derive(Clone)]
pub struct CargoveraServer {
    /// Cargovera API.
    api: CargoveraApi,
    /// Cancellation token.
    cancellation: CancellationToken,
}

impl CargoveraServer {
    /// Build a new server from settings.
    ///
    /// # Errors
    ///
    /// * `Error::Database` - the database cannot be opened or migrated
    /// * `Error::Config` - invalid settings
    ///
    pub fn build(settings: CargoveraSettings) -> Result<Self, Error> {
        Ok(Self::new(CargoveraApi::build(settings)?))
    }

    pub fn new(api: CargoveraApi) -> Self {
        Self {
            api,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn api(&self) -> &CargoveraApi {
        &self.api
    }

    /// Token cancelled when the server has to stop.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Bind the server to the provided shutdown signal.
    pub fn bind_with_shutdown(&self, shutdown_signal: impl Future + Send + 'static) {
        let cancellation_token = self.cancellation.clone();
        tokio::spawn(async move {
            shutdown_signal.await;
            log::info!("Shutdown signal received");
            cancellation_token.cancel();
        });
    }

    /// Listen on the configured host and port.
    ///
    /// # Errors
    ///
    /// * `Error::Config` - the address cannot be bound
    ///
    pub async fn run(self) -> Result<(), Error> {
        let server = &self.api.settings().server;
        let address = format!("{}:{}", server.host, server.port);
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| Error::Config(format!("Cannot listen on {}: {}", address, e)))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until cancelled.
    pub async fn serve(self, listener: TcpListener) -> Result<(), Error> {
        if let Ok(address) = listener.local_addr() {
            log::info!("Listening on {}", address);
        }
        let cancellation = self.cancellation.clone();
        axum::serve(listener, crate::http::app(self.api))
            .with_graceful_shutdown(async move { cancellation.cancelled().await })
            .await
            .map_err(|e| Error::Internal(format!("Server error: {}", e)))?;
        log::info!("Stopped");
        Ok(())
    }
}

/// Completes on Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Cannot listen for Ctrl-C: {}", e);
            futures::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Cannot listen for SIGTERM: {}", e);
                futures::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = futures::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
