use mqbench_core::{BrokerSession, Connector, Link, RunConfig, SessionError};
use tokio::sync::mpsc;

/// A session that completed its handshake, along with its connection-loss channel.
pub(crate) struct Session<S> {
    pub session: S,
    pub lost: mpsc::UnboundedReceiver<SessionError>,
}

/// Start a session for `client_id` and wait for the broker to accept it.
///
/// The wait is bounded by the configured connect timeout. A session that fails its handshake is
/// disconnected before the error is returned.
pub(crate) async fn open<C: Connector>(
    connector: &C,
    config: &RunConfig,
    client_id: &str,
) -> Result<Session<C::Session>, SessionError> {
    let Link {
        session,
        connected,
        lost,
    } = connector.connect(config.connect_options(client_id)).await?;

    if let Err(err) = connected.wait_timeout(config.connect_timeout).await {
        session.disconnect().await;
        return Err(err);
    }

    Ok(Session { session, lost })
}
