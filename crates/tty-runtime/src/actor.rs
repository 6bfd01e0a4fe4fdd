use crate::channels::EventSink;
use futures::stream::{Stream, StreamExt};
use std::future::Future;
use tty_protocol::{DriverEvent, TtyError};

/// Actor trait for implementing message-driven components
///
/// Actors are independent, stateful components that communicate through
/// message passing. Each actor has its own message queue and processes
/// messages sequentially.
///
/// # Lifecycle
///
/// 1. **init()** - Called once before message processing starts
/// 2. **handle()** - Called for each received message
/// 3. **shutdown()** - Called when the actor is stopping
///
/// # Send Bounds
///
/// Actors run on the multi-threaded Tokio runtime, so the futures returned
/// by every lifecycle method must be `Send`. Implementations may still write
/// them as plain `async fn`.
///
/// # Example
///
/// ```ignore
/// struct MyActor {
///     seen: u32,
/// }
///
/// impl Actor for MyActor {
///     type Message = MyMessage;
///
///     fn name(&self) -> &'static str {
///         "MyActor"
///     }
///
///     async fn handle(&mut self, msg: Self::Message) -> Result<(), TtyError> {
///         self.seen += 1;
///         Ok(())
///     }
/// }
/// ```
pub trait Actor: Send + 'static {
    /// Message type this actor processes
    type Message: Send + 'static;

    /// Actor name (used for logging and debugging)
    fn name(&self) -> &'static str;

    /// Initialize the actor before processing messages
    fn init(&mut self) -> impl Future<Output = Result<(), TtyError>> + Send {
        async { Ok(()) }
    }

    /// Handle a single message
    ///
    /// Messages are processed sequentially in the order received.
    fn handle(&mut self, msg: Self::Message)
        -> impl Future<Output = Result<(), TtyError>> + Send;

    /// Clean up before shutdown
    fn shutdown(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Main actor run loop (provided by runtime)
    ///
    /// Consumes the actor and runs it until `rx` ends, which for a channel
    /// means every sender is gone. Errors from `init` stop the actor; errors
    /// from `handle` are reported on `events` and processing continues.
    fn run<S>(mut self, mut rx: S, events: EventSink) -> impl Future<Output = ()> + Send
    where
        Self: Sized,
        S: Stream<Item = Self::Message> + Unpin + Send + 'static,
    {
        async move {
            if let Err(e) = self.init().await {
                crate::tty_error!("{} init failed: {}", self.name(), e);
                events.emit(DriverEvent::Error {
                    id: None,
                    message: format!("{} init failed: {}", self.name(), e),
                });
                return;
            }

            crate::tty_debug!("{} started", self.name());

            while let Some(msg) = rx.next().await {
                if let Err(e) = self.handle(msg).await {
                    crate::tty_warn!("{} error: {}", self.name(), e);
                    events.emit(DriverEvent::Error {
                        id: None,
                        message: format!("{} error: {}", self.name(), e),
                    });
                }
            }

            self.shutdown().await;

            crate::tty_debug!("{} stopped", self.name());
        }
    }
}

/// Spawn an actor on the current Tokio runtime.
///
/// Must be called from within a runtime context.
pub fn spawn_actor<A, S>(actor: A, rx: S, events: EventSink) -> tokio::task::JoinHandle<()>
where
    A: Actor,
    S: Stream<Item = A::Message> + Unpin + Send + 'static,
{
    tokio::spawn(actor.run(rx, events))
}
