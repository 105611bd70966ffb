/// Errors that can occur on a peer link.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The remote end is gone; nothing more can be sent to it.
    #[error("connection to {0} closed")]
    ConnectionClosed(crate::PeerId),

    /// Sending a buffer failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving a buffer failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// Dialing a remote endpoint failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}
