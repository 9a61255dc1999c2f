use super::*;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tracing::trace;

struct Shared<R: ShareRing> {
    dealer: Dealer<R>,
    // items generated for a party but not yet consumed by it
    queues: Vec<HashMap<RandomnessKind, VecDeque<Randomness<R>>>>,
}

/// Source that asks the dealer for every item at the moment it is needed.
///
/// The first party to request the k'th item of a kind causes it to be
/// generated; the shares of the other parties are queued until they ask.
pub struct OnDemandSource<R: ShareRing> {
    party: usize,
    key_share: R::Storage,
    shared: Arc<Mutex<Shared<R>>>,
}

impl<R: ShareRing> OnDemandSource<R> {
    pub(super) fn from_dealer(dealer: Dealer<R>) -> Vec<Self> {
        let parties = dealer.parties();
        let key_shares: Vec<R::Storage> = (0..parties).map(|p| dealer.key_share(p)).collect();
        let shared = Arc::new(Mutex::new(Shared {
            dealer,
            queues: (0..parties).map(|_| HashMap::new()).collect(),
        }));
        key_shares
            .into_iter()
            .enumerate()
            .map(|(party, key_share)| OnDemandSource {
                party,
                key_share,
                shared: shared.clone(),
            })
            .collect()
    }
}

impl<R: ShareRing> RandomnessSource<R> for OnDemandSource<R> {
    fn party(&self) -> usize {
        self.party
    }

    fn key_share(&self) -> R::Storage {
        self.key_share
    }

    fn next(&mut self, kind: RandomnessKind) -> Result<Randomness<R>> {
        // a poisoned lock means another party panicked mid-generation
        let mut guard = self.shared.lock().map_err(|_| Error::Aborted)?;
        let shared = &mut *guard;

        if let Some(item) = shared.queues[self.party]
            .get_mut(&kind)
            .and_then(|queue| queue.pop_front())
        {
            return Ok(item);
        }

        trace!("party {} generates {}", self.party, kind);
        let mut mine = None;
        for (party, item) in shared.dealer.generate(kind)?.into_iter().enumerate() {
            if party == self.party {
                mine = Some(item);
            } else {
                shared.queues[party]
                    .entry(kind)
                    .or_insert_with(VecDeque::new)
                    .push_back(item);
            }
        }
        mine.ok_or(Error::UnexpectedRandomness { expected: kind })
    }
}
