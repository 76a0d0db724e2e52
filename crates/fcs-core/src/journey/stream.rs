use crate::engine::RunEvent;
use tokio::sync::{mpsc, oneshot};

/// Live result frames of a test run, handed out by
/// [`Journey::subscribe`](super::Journey::subscribe).
///
/// A stream taken before the run starts waits for the run to hand over its
/// channel, which is sized for the whole plan when the run begins.
pub struct ResultStream {
    inner: Inner,
}

enum Inner {
    Waiting(oneshot::Receiver<mpsc::Receiver<RunEvent>>),
    Live(mpsc::Receiver<RunEvent>),
    Closed,
}

impl ResultStream {
    pub(crate) fn waiting(rx: oneshot::Receiver<mpsc::Receiver<RunEvent>>) -> Self {
        Self {
            inner: Inner::Waiting(rx),
        }
    }

    pub(crate) fn live(rx: mpsc::Receiver<RunEvent>) -> Self {
        Self {
            inner: Inner::Live(rx),
        }
    }

    /// Next frame; `None` once the run's channel is closed or the stream was
    /// replaced by a later subscriber. Cancel safe.
    pub async fn recv(&mut self) -> Option<RunEvent> {
        if let Inner::Waiting(handover) = &mut self.inner {
            let next = match handover.await {
                Ok(rx) => Inner::Live(rx),
                Err(_) => Inner::Closed,
            };
            self.inner = next;
        }
        match &mut self.inner {
            Inner::Live(rx) => rx.recv().await,
            Inner::Waiting(_) | Inner::Closed => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn waiting_stream_reads_the_handed_over_channel() {
        let (handover, waiting) = oneshot::channel();
        let mut stream = ResultStream::waiting(waiting);

        let (tx, rx) = mpsc::channel(2);
        tx.try_send(RunEvent::Ended).unwrap();
        drop(tx);
        handover.send(rx).unwrap();

        assert_eq!(stream.recv().await, Some(RunEvent::Ended));
        assert_eq!(stream.recv().await, None);
    }

    #[tokio::test]
    async fn replaced_stream_closes() {
        let (handover, waiting) = oneshot::channel::<mpsc::Receiver<RunEvent>>();
        let mut stream = ResultStream::waiting(waiting);
        drop(handover);
        assert_eq!(stream.recv().await, None);
    }
}
