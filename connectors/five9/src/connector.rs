//! Connector entry point: configuration gate and supervisor bootstrap.

use std::sync::Arc;

use tracing::{error, info, instrument};

use crate::config::{ConfigProvider, Settings};
use crate::error::{Five9Error, Five9Result};
use crate::http::ResourceFetcher;
use crate::sink::NotificationSink;
use crate::supervisor::{ConnectionSupervisor, SupervisorContext};
use crate::transport::SocketConnector;
use crate::types::ErrorReport;

/// Five9 event connector.
pub struct Five9Connector {
    provider: Arc<dyn ConfigProvider>,
    settings: Settings,
    user_id: String,
    fetcher: Arc<dyn ResourceFetcher>,
    socket_connector: Arc<dyn SocketConnector>,
    sink: Arc<dyn NotificationSink>,
}

impl Five9Connector {
    /// Create a new connector.
    pub fn new(
        provider: Arc<dyn ConfigProvider>,
        user_id: impl Into<String>,
        fetcher: Arc<dyn ResourceFetcher>,
        socket_connector: Arc<dyn SocketConnector>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            provider,
            settings: Settings::default(),
            user_id: user_id.into(),
            fetcher,
            socket_connector,
            sink,
        }
    }

    /// Override the default settings.
    #[must_use]
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Load configuration and, for eligible users, start the supervisor.
    ///
    /// Returns `Ok(None)` when the user is not eligible. A configuration
    /// failure is reported to the sink exactly once and returned; the
    /// connector then stays inert.
    ///
    /// # Errors
    /// Returns the configuration error that was reported to the sink.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn init(&self) -> Five9Result<Option<ConnectionSupervisor>> {
        match self.bootstrap().await {
            Ok(Some(supervisor)) => {
                supervisor.start().await?;
                Ok(Some(supervisor))
            }
            Ok(None) => {
                info!("User is not eligible for Five9, connector inactive");
                Ok(None)
            }
            Err(e) => {
                error!(error = %e, "Error during initialization");
                self.sink.on_error(ErrorReport::new(&e));
                Err(e)
            }
        }
    }

    async fn bootstrap(&self) -> Five9Result<Option<ConnectionSupervisor>> {
        let config = self.provider.get_config().await?;
        if !config.is_eligible {
            return Ok(None);
        }
        config.validate()?;
        if self.user_id.trim().is_empty() {
            return Err(Five9Error::Configuration("user id is required".into()));
        }

        let supervisor = ConnectionSupervisor::spawn(SupervisorContext {
            config,
            settings: self.settings.clone(),
            user_id: self.user_id.clone(),
            fetcher: Arc::clone(&self.fetcher),
            connector: Arc::clone(&self.socket_connector),
            sink: Arc::clone(&self.sink),
        })?;
        Ok(Some(supervisor))
    }
}
