//! TCP reachability probe - the session capability behind `sweep`.
//!
//! `connect` resolves the endpoint's hostname once per attempt, so a
//! transient DNS failure is a retryable `ConnectFailure`. Each command
//! is a port number; probing yields `open` or `closed` as output.
//! A closed port is a determinate answer, not a failure, so it does
//! not consume retries.

use std::io;
use std::net::IpAddr;

use async_trait::async_trait;
use tokio::net::{lookup_host, TcpStream};
use tracing::debug;

use fleetrun_core::{Endpoint, ErrorKind};
use fleetrun_engine::{Session, SessionFactory};

/// Opens one [`TcpProbeSession`] per attempt.
pub struct TcpProbeFactory;

#[async_trait]
impl SessionFactory for TcpProbeFactory {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Session>, ErrorKind> {
        let host = endpoint.id.as_str().to_string();

        let mut addrs = lookup_host((host.as_str(), 0u16))
            .await
            .map_err(|e| ErrorKind::connect(format!("resolving {host}: {e}")))?;
        let ip = addrs
            .next()
            .map(|addr| addr.ip())
            .ok_or_else(|| ErrorKind::connect(format!("{host} resolved to no addresses")))?;

        drop(addrs);

        debug!(%host, %ip, "resolved probe target");
        Ok(Box::new(TcpProbeSession { host, ip }))
    }
}

/// One resolved target; probes ports on demand.
pub struct TcpProbeSession {
    host: String,
    ip: IpAddr,
}

#[async_trait]
impl Session for TcpProbeSession {
    async fn execute(&mut self, command: &str) -> Result<String, ErrorKind> {
        let port: u16 = command
            .trim()
            .parse()
            .map_err(|_| ErrorKind::command(command, "not a port number"))?;

        match TcpStream::connect((self.ip, port)).await {
            Ok(_stream) => {
                debug!(host = %self.host, port, "port open");
                Ok("open".to_string())
            }
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                debug!(host = %self.host, port, "port closed");
                Ok("closed".to_string())
            }
            Err(e) => Err(ErrorKind::command(command, e.to_string())),
        }
    }

    async fn close(&mut self) -> Result<(), ErrorKind> {
        // Probe streams are dropped per command; nothing to tear down.
        Ok(())
    }
}
