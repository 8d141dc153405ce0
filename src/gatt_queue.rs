use std::collections::VecDeque;
use std::time::Duration;

use async_lock::Mutex;
use futures_lite::FutureExt;
use futures_timer::Delay;

use crate::error::{Error, ErrorKind};
use crate::{Characteristic, Descriptor, Result};

/// A characteristic or descriptor request waiting for the GATT link.
#[derive(Debug, Clone)]
pub(crate) enum GattRequest {
    ReadCharacteristic(Characteristic),
    WriteCharacteristic(Characteristic, Vec<u8>),
    ReadDescriptor(Descriptor),
    WriteDescriptor(Descriptor, Vec<u8>),
    SetNotification(Characteristic, bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum GattReply {
    Value(Vec<u8>),
    Done,
}

/// The request that just took the in-flight slot and must be handed to the link.
#[derive(Debug)]
pub(crate) struct Issue {
    pub id: u64,
    pub request: GattRequest,
}

/// The caller's side of a queued request.
pub(crate) struct Ticket {
    pub id: u64,
    receiver: async_channel::Receiver<Result<GattReply>>,
}

struct Pending {
    id: u64,
    request: GattRequest,
    responder: async_channel::Sender<Result<GattReply>>,
}

#[derive(Default)]
struct QueueState {
    next_id: u64,
    in_flight: Option<Pending>,
    waiting: VecDeque<Pending>,
}

impl QueueState {
    /// Moves the oldest waiting request into the free in-flight slot.
    fn advance(&mut self) -> Option<Issue> {
        debug_assert!(self.in_flight.is_none());
        let next = self.waiting.pop_front()?;
        let issue = Issue {
            id: next.id,
            request: next.request.clone(),
        };
        self.in_flight = Some(next);
        Some(issue)
    }
}

/// FIFO of GATT requests with at most one of them in flight.
///
/// The link serializes all attribute requests, so a request is only issued after the
/// previous one completed, failed or was abandoned.
#[derive(Default)]
pub(crate) struct GattQueue {
    inner: Mutex<QueueState>,
}

impl GattQueue {
    /// Appends `request`. Returns the caller's ticket and, if the slot was free, the
    /// request to issue right away.
    pub fn push(&self, request: GattRequest) -> (Ticket, Option<Issue>) {
        let (responder, receiver) = async_channel::bounded(1);
        let mut state = self.inner.lock_blocking();
        let id = state.next_id;
        state.next_id += 1;
        state.waiting.push_back(Pending {
            id,
            request,
            responder,
        });
        let issue = if state.in_flight.is_none() {
            state.advance()
        } else {
            None
        };
        (Ticket { id, receiver }, issue)
    }

    /// Completes request `id` if it is the one in flight.
    pub fn finish(&self, id: u64, result: Result<GattReply>) -> Option<Issue> {
        let mut state = self.inner.lock_blocking();
        if state.in_flight.as_ref().map(|p| p.id) != Some(id) {
            return None;
        }
        let done = state.in_flight.take()?;
        let _ = done.responder.try_send(result);
        state.advance()
    }

    /// Completes the in-flight request if `matches` accepts it. `Err` gives the result
    /// back when nothing matched.
    pub fn complete_current(
        &self,
        matches: impl FnOnce(&GattRequest) -> bool,
        result: Result<GattReply>,
    ) -> std::result::Result<Option<Issue>, Result<GattReply>> {
        let mut state = self.inner.lock_blocking();
        match state.in_flight.take() {
            Some(done) if matches(&done.request) => {
                let _ = done.responder.try_send(result);
                Ok(state.advance())
            }
            other => {
                state.in_flight = other;
                Err(result)
            }
        }
    }

    /// Gives up on request `id`, e.g. after a timeout. Its completion, if it ever comes,
    /// no longer matches anything.
    pub fn abandon(&self, id: u64) -> Option<Issue> {
        let mut state = self.inner.lock_blocking();
        if state.in_flight.as_ref().is_some_and(|p| p.id == id) {
            state.in_flight = None;
            return state.advance();
        }
        state.waiting.retain(|p| p.id != id);
        None
    }

    /// Fails the in-flight request and every waiting one, in issue order.
    pub fn fail_all(&self, error: &Error) {
        let drained: Vec<Pending> = {
            let mut state = self.inner.lock_blocking();
            let in_flight = state.in_flight.take();
            in_flight.into_iter().chain(state.waiting.drain(..)).collect()
        };
        for pending in drained {
            let _ = pending.responder.try_send(Err(error.clone()));
        }
    }

    pub fn len(&self) -> usize {
        let state = self.inner.lock_blocking();
        state.waiting.len() + usize::from(state.in_flight.is_some())
    }
}

impl Ticket {
    /// Waits for the request's completion. Returns `None` when the optional timeout is
    /// reached first.
    pub async fn wait(self, timeout: Option<Duration>) -> Option<Result<GattReply>> {
        let recv = async {
            Some(self.receiver.recv().await.unwrap_or_else(|_| {
                Err(Error::new(ErrorKind::NotConnected, "request was dropped"))
            }))
        };
        match timeout {
            Some(dur) => {
                recv.or(async {
                    Delay::new(dur).await;
                    None
                })
                .await
            }
            None => recv.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btuuid::nordic_uart;
    use crate::CharacteristicProperties;
    use futures_lite::future::block_on;

    fn tx() -> Characteristic {
        Characteristic::new(
            nordic_uart::SERVICE,
            nordic_uart::TX,
            CharacteristicProperties::from_bits(0x08),
            [],
        )
    }

    fn write(byte: u8) -> GattRequest {
        GattRequest::WriteCharacteristic(tx(), vec![byte])
    }

    fn issued_value(issue: &Issue) -> u8 {
        match &issue.request {
            GattRequest::WriteCharacteristic(_, v) => v[0],
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn second_request_waits_for_first() {
        let queue = GattQueue::default();
        let (first, issue) = queue.push(write(1));
        let issue = issue.unwrap();
        assert_eq!(issued_value(&issue), 1);
        let (second, none) = queue.push(write(2));
        assert!(none.is_none());
        assert_eq!(queue.len(), 2);

        let next = queue.finish(issue.id, Ok(GattReply::Done)).unwrap();
        assert_eq!(issued_value(&next), 2);
        assert_eq!(next.id, second.id);
        assert_eq!(block_on(first.wait(None)).unwrap().unwrap(), GattReply::Done);

        // a stale id changes nothing
        assert!(queue.finish(issue.id, Ok(GattReply::Done)).is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn unmatched_completion_is_returned() {
        let queue = GattQueue::default();
        let (_ticket, _issue) = queue.push(write(1));
        let res = queue.complete_current(
            |req| matches!(req, GattRequest::ReadCharacteristic(_)),
            Ok(GattReply::Value(vec![9])),
        );
        assert_eq!(res.unwrap_err().unwrap(), GattReply::Value(vec![9]));
        assert_eq!(queue.len(), 1);

        let res = queue.complete_current(
            |req| matches!(req, GattRequest::WriteCharacteristic(..)),
            Ok(GattReply::Done),
        );
        assert!(res.unwrap().is_none());
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn abandon_advances_or_removes() {
        let queue = GattQueue::default();
        let (a, _) = queue.push(write(1));
        let (b, _) = queue.push(write(2));
        let (c, _) = queue.push(write(3));
        assert!(queue.abandon(b.id).is_none());
        let next = queue.abandon(a.id).unwrap();
        assert_eq!(next.id, c.id);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn fail_all_reaches_every_ticket() {
        let queue = GattQueue::default();
        let (a, _) = queue.push(write(1));
        let (b, _) = queue.push(write(2));
        queue.fail_all(&ErrorKind::NotConnected.into());
        assert_eq!(queue.len(), 0);
        for ticket in [a, b] {
            let err = block_on(ticket.wait(None)).unwrap().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotConnected);
        }
    }

    #[test]
    fn ticket_times_out() {
        let queue = GattQueue::default();
        let (a, _) = queue.push(write(1));
        assert!(block_on(a.wait(Some(Duration::from_millis(10)))).is_none());
    }
}
