//! Session capability - the externally supplied transport interface.

use async_trait::async_trait;
use fleetrun_core::{Endpoint, ErrorKind};

/// An open session against one endpoint.
///
/// Implementations map their transport errors onto [`ErrorKind`]:
/// `execute` failures are `CommandFailure` (device rejected the
/// command) or `Timeout` (transport-level timeout); anything else the
/// transport cannot express should be folded into `CommandFailure`.
#[async_trait]
pub trait Session: Send {
    /// Run one command and return its captured output.
    async fn execute(&mut self, command: &str) -> Result<String, ErrorKind>;

    /// Tear the session down. Best-effort: the engine logs a failure
    /// here and never lets it change the task's outcome, but it does
    /// guarantee close is attempted exactly once per successful
    /// connect, on every exit path.
    async fn close(&mut self) -> Result<(), ErrorKind>;
}

/// Opens sessions. One factory serves a whole batch, so it must be
/// shareable across workers; any connection cache it keeps is its own
/// state with its own lifecycle, not a process-wide singleton.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Open a session to the endpoint. Failures are classified as
    /// `ConnectFailure` (unreachable, refused, DNS) or `AuthFailure`
    /// (credentials rejected).
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Session>, ErrorKind>;
}
