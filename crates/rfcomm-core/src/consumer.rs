/// Character-stream consumer bound to an attached port (the line discipline
/// side of a terminal).
///
/// `receive` may be called with the device link lock held so that pending
/// data and newly arriving data keep their order; implementations must not
/// call back into the port from it.
pub trait PortConsumer: Send + Sync {
    /// Copy inbound bytes into the consumer's flip buffer, returning how
    /// many were accepted
    fn receive(&self, data: &[u8]) -> usize;

    /// Make received bytes visible to readers
    fn push(&self);

    /// More write room is available
    fn wakeup(&self);

    /// The underlying connection hung up or lost carrier.
    ///
    /// May be called from a link callback; the consumer reacts later (for
    /// instance by calling the port's own hangup) rather than from inside
    /// this call.
    fn hangup(&self);

    /// Consumer is configured to ignore modem control lines (CLOCAL)
    fn ignores_modem_lines(&self) -> bool;
}
