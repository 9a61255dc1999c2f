//! Message passing between the parties.
//!
//! The protocols only ever need one communication pattern: every party
//! broadcasts one payload and waits for the payloads of all the others.

use async_std::channel::{unbounded, Receiver, Sender};
use async_std::task;
use tracing::trace;

use crate::algebra::RingElement;
use crate::{Error, Result};

pub trait Transport: Send {
    fn party(&self) -> usize;

    fn parties(&self) -> usize;

    /// Send `payload` to every other party and collect one payload from each.
    ///
    /// The result is indexed by sender and includes our own payload.
    fn broadcast(&mut self, payload: Vec<u8>) -> Result<Vec<Vec<u8>>>;
}

/// Broadcast a vector of ring elements and decode the vectors of all parties.
///
/// Every party must send exactly `values.len()` elements.
pub fn broadcast_values<R: RingElement, T: Transport + ?Sized>(
    transport: &mut T,
    values: &[R],
) -> Result<Vec<Vec<R>>> {
    let payloads = transport.broadcast(bincode::serialize(values)?)?;
    payloads
        .iter()
        .enumerate()
        .map(|(party, payload)| {
            let received: Vec<R> = bincode::deserialize(payload).map_err(|e| {
                Error::Transport(format!("malformed payload from party {}: {}", party, e))
            })?;
            if received.len() != values.len() {
                return Err(Error::Transport(format!(
                    "party {} sent {} elements, expected {}",
                    party,
                    received.len(),
                    values.len()
                )));
            }
            Ok(received)
        })
        .collect()
}

/// Broadcast additive shares and return the opened (summed) values.
pub fn open_values<R: RingElement, T: Transport + ?Sized>(
    transport: &mut T,
    shares: &[R],
) -> Result<Vec<R>> {
    let received = broadcast_values(transport, shares)?;
    let mut opened = vec![R::ZERO; shares.len()];
    for values in received {
        for (sum, v) in opened.iter_mut().zip(values) {
            *sum = *sum + v;
        }
    }
    Ok(opened)
}

/// In-process endpoint: one unbounded channel per ordered pair of parties.
pub struct LocalTransport {
    party: usize,
    senders: Vec<Option<Sender<Vec<u8>>>>,
    receivers: Vec<Option<Receiver<Vec<u8>>>>,
    rounds: u64,
}

pub struct LocalNetwork;

impl LocalNetwork {
    /// Fully connected network of `parties` endpoints.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(parties: usize) -> Vec<LocalTransport> {
        let mut senders: Vec<Vec<Option<Sender<Vec<u8>>>>> =
            (0..parties).map(|_| (0..parties).map(|_| None).collect()).collect();
        let mut receivers: Vec<Vec<Option<Receiver<Vec<u8>>>>> =
            (0..parties).map(|_| (0..parties).map(|_| None).collect()).collect();

        for from in 0..parties {
            for to in 0..parties {
                if from != to {
                    let (send, recv) = unbounded();
                    senders[from][to] = Some(send);
                    receivers[to][from] = Some(recv);
                }
            }
        }

        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(party, (senders, receivers))| LocalTransport {
                party,
                senders,
                receivers,
                rounds: 0,
            })
            .collect()
    }
}

impl LocalTransport {
    /// Number of broadcast rounds completed.
    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    async fn exchange(&self, payload: Vec<u8>) -> Result<Vec<Vec<u8>>> {
        for (to, sender) in self.senders.iter().enumerate() {
            if let Some(sender) = sender {
                sender
                    .send(payload.clone())
                    .await
                    .map_err(|_| Error::Transport(format!("party {} hung up", to)))?;
            }
        }

        let mut payloads = Vec::with_capacity(self.senders.len());
        for (from, receiver) in self.receivers.iter().enumerate() {
            match receiver {
                Some(receiver) => payloads.push(
                    receiver
                        .recv()
                        .await
                        .map_err(|_| Error::Transport(format!("party {} hung up", from)))?,
                ),
                None => payloads.push(payload.clone()),
            }
        }
        Ok(payloads)
    }
}

impl Transport for LocalTransport {
    fn party(&self) -> usize {
        self.party
    }

    fn parties(&self) -> usize {
        self.senders.len()
    }

    fn broadcast(&mut self, payload: Vec<u8>) -> Result<Vec<Vec<u8>>> {
        trace!(
            "party {} round {}: {} bytes",
            self.party,
            self.rounds,
            payload.len()
        );
        let payloads = task::block_on(self.exchange(payload))?;
        self.rounds += 1;
        Ok(payloads)
    }
}
