use std::io::ErrorKind as IoErrorKind;
use std::net::ToSocketAddrs;

use tiberius::Client;
use tokio::net::TcpStream;
use tokio::runtime::{Builder, Runtime};
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

use super::config::{MssqlOptions, build_tiberius_config};
use super::query::native_error;
use crate::error::NativeError;

/// Type alias for the SQL Server client
pub type MssqlClient = Client<Compat<TcpStream>>;

/// A connected client together with the runtime that drives it.
///
/// Every call into the client blocks on this runtime, which keeps the
/// public API synchronous.
pub struct MssqlSession {
    pub(crate) runtime: Runtime,
    pub(crate) client: MssqlClient,
}

impl std::fmt::Debug for MssqlSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlSession")
            .field("client", &"<MssqlClient>")
            .finish()
    }
}

// Socket error codes as SQL Server clients report them
const WSAECONNRESET: i64 = 10054;
const WSAETIMEDOUT: i64 = 10060;
const WSAECONNREFUSED: i64 = 10061;

pub(crate) fn io_error(err: &std::io::Error) -> NativeError {
    let code = match err.kind() {
        IoErrorKind::ConnectionRefused => WSAECONNREFUSED,
        IoErrorKind::TimedOut => WSAETIMEDOUT,
        _ => WSAECONNRESET,
    };
    NativeError::new(code, format!("TCP connection error: {err}"))
}

/// Open a session: resolve, connect TCP, then log in.
///
/// # Errors
/// Returns the native error of address resolution, the TCP connect, or the
/// login handshake.
pub fn open_session(opts: &MssqlOptions) -> Result<MssqlSession, NativeError> {
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| io_error(&e))?;
    let config = build_tiberius_config(opts);

    let server_addr = (opts.server.as_str(), opts.port_or_default())
        .to_socket_addrs()
        .map_err(|e| io_error(&e))?
        .next()
        .ok_or_else(|| {
            NativeError::new(
                WSAECONNREFUSED,
                format!("No valid address found for {}", opts.server),
            )
        })?;

    let client = runtime.block_on(async {
        let tcp = TcpStream::connect(server_addr)
            .await
            .map_err(|e| io_error(&e))?;
        tcp.set_nodelay(true).map_err(|e| io_error(&e))?;
        Client::connect(config, tcp.compat_write())
            .await
            .map_err(native_error)
    })?;

    debug!(server = %opts.server, database = %opts.database, "mssql session opened");
    Ok(MssqlSession { runtime, client })
}
