/// An I/O event reported by the poller.
///
/// An `Event` carries the readiness bits of one registered descriptor.
/// The reactor turns it into a single [`Readiness`](super::Readiness)
/// according to what the registration was waiting for.
#[derive(Debug)]
pub(crate) struct Event {
    /// Token of the registration, see [`Key::to_token`](crate::utils::Key::to_token).
    pub(crate) token: u64,

    /// Data (or a pending error) can be read.
    pub(crate) readable: bool,

    /// The socket accepts writes, or a pending error can be probed.
    pub(crate) writable: bool,

    /// The peer hung up.
    pub(crate) closed: bool,
}
