use tiberius::{AuthMethod, Config as TiberiusConfig};

use super::client::open_session;
use super::connection::MssqlConnection;
use crate::client::{DbClient, DbClientBuilder};
use crate::error::NativeError;
use crate::native::{ConnectionProvider, NativeConnection};
use crate::types::Engine;

/// Options for connecting to SQL Server.
#[derive(Debug, Clone)]
pub struct MssqlOptions {
    pub server: String,
    pub database: String,
    pub user: String,
    pub password: String,
    pub port: Option<u16>,
    pub instance_name: Option<String>,
    pub trust_cert: bool,
}

impl MssqlOptions {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        server: String,
        database: String,
        user: String,
        password: String,
        port: Option<u16>,
        instance_name: Option<String>,
    ) -> Self {
        Self {
            server,
            database,
            user,
            password,
            port,
            instance_name,
            trust_cert: true,
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_instance_name(mut self, instance_name: Option<String>) -> Self {
        self.instance_name = instance_name;
        self
    }

    #[must_use]
    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(1433)
    }
}

/// Fluent builder for MSSQL options.
#[derive(Debug, Clone)]
pub struct MssqlOptionsBuilder {
    opts: MssqlOptions,
}

impl MssqlOptionsBuilder {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        server: String,
        database: String,
        user: String,
        password: String,
        port: Option<u16>,
        instance_name: Option<String>,
    ) -> Self {
        Self {
            opts: MssqlOptions::new(server, database, user, password, port, instance_name),
        }
    }

    #[must_use]
    pub fn port(mut self, port: Option<u16>) -> Self {
        self.opts.port = port;
        self
    }

    #[must_use]
    pub fn instance_name(mut self, instance_name: Option<String>) -> Self {
        self.opts.instance_name = instance_name;
        self
    }

    /// Accept the server certificate without validation.
    #[must_use]
    pub fn trust_cert(mut self, trust_cert: bool) -> Self {
        self.opts.trust_cert = trust_cert;
        self
    }

    #[must_use]
    pub fn finish(self) -> MssqlOptions {
        self.opts
    }

    #[must_use]
    pub fn client_builder(self, name: impl Into<String>) -> DbClientBuilder {
        let opts = self.finish();
        DbClientBuilder::new(
            name,
            opts.database.clone(),
            Engine::Mssql,
            MssqlConnector::new(opts),
        )
    }

    /// Build a client; nothing connects until the first query runs.
    #[must_use]
    pub fn build(self, name: impl Into<String>) -> DbClient {
        self.client_builder(name).finish()
    }
}

pub(crate) fn build_tiberius_config(opts: &MssqlOptions) -> TiberiusConfig {
    let mut config = TiberiusConfig::new();
    config.host(&opts.server);
    config.database(&opts.database);
    config.port(opts.port_or_default());
    config.authentication(AuthMethod::sql_server(&opts.user, &opts.password));
    if let Some(instance) = &opts.instance_name {
        config.instance_name(instance);
    }
    if opts.trust_cert {
        config.trust_cert();
    }
    config
}

/// Opens a new SQL Server session for each connect request.
#[derive(Debug, Clone)]
pub struct MssqlConnector {
    opts: MssqlOptions,
}

impl MssqlConnector {
    #[must_use]
    pub fn new(opts: MssqlOptions) -> Self {
        Self { opts }
    }
}

impl ConnectionProvider for MssqlConnector {
    fn connect(&mut self) -> Result<Option<Box<dyn NativeConnection>>, NativeError> {
        let session = open_session(&self.opts)?;
        Ok(Some(Box::new(MssqlConnection::new(session))))
    }
}
