//! First-come pairing, one waiting slot per queue.

use castle_protocol::QueueKind;
use castle_session::SessionKey;
use rand::Rng;
use tracing::debug;

/// Two players matched in a queue, not yet seated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pairing {
    /// The player who was holding the slot.
    pub waiting: SessionKey,
    /// The player whose arrival completed the pair.
    pub arriving: SessionKey,
    pub queue: QueueKind,
}

impl Pairing {
    /// Assigns colors with a fair coin.
    pub fn seat<R: Rng + ?Sized>(self, rng: &mut R) -> Seating {
        Seating::flip(self.waiting, self.arriving, rng)
    }
}

/// Who plays which color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seating {
    pub white: SessionKey,
    pub black: SessionKey,
}

impl Seating {
    /// Puts `a` and `b` on a side each, decided by a fair coin.
    pub fn flip<R: Rng + ?Sized>(a: SessionKey, b: SessionKey, rng: &mut R) -> Self {
        if rng.random_bool(0.5) {
            Self { white: a, black: b }
        } else {
            Self { white: b, black: a }
        }
    }
}

/// Waiting slots for the ranked and casual queues.
///
/// Not a queue of any depth: a slot holds at most one player, and the next
/// arrival in the same queue is paired with them immediately.
#[derive(Debug, Default)]
pub struct Matchmaker {
    ranked: Option<SessionKey>,
    casual: Option<SessionKey>,
}

impl Matchmaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the slot for `queue` if it is free, or pairs `player` with
    /// whoever holds it.
    ///
    /// A player already holding the slot is left waiting.
    pub fn enqueue_or_match(&mut self, player: SessionKey, queue: QueueKind) -> Option<Pairing> {
        let slot = self.slot_mut(queue);
        match *slot {
            Some(waiting) if waiting != player => {
                *slot = None;
                debug!(%waiting, arriving = %player, %queue, "players paired");
                Some(Pairing {
                    waiting,
                    arriving: player,
                    queue,
                })
            }
            Some(_) => None,
            None => {
                *slot = Some(player);
                debug!(session = %player, %queue, "player waiting");
                None
            }
        }
    }

    /// Clears whichever slot `player` holds. Returns the queue it left.
    pub fn cancel(&mut self, player: SessionKey) -> Option<QueueKind> {
        for queue in [QueueKind::Ranked, QueueKind::Casual] {
            let slot = self.slot_mut(queue);
            if *slot == Some(player) {
                *slot = None;
                debug!(session = %player, %queue, "left queue");
                return Some(queue);
            }
        }
        None
    }

    pub fn waiting(&self, queue: QueueKind) -> Option<SessionKey> {
        match queue {
            QueueKind::Ranked => self.ranked,
            QueueKind::Casual => self.casual,
        }
    }

    pub fn is_waiting(&self, player: SessionKey) -> bool {
        self.ranked == Some(player) || self.casual == Some(player)
    }

    fn slot_mut(&mut self, queue: QueueKind) -> &mut Option<SessionKey> {
        match queue {
            QueueKind::Ranked => &mut self.ranked,
            QueueKind::Casual => &mut self.casual,
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn key(n: u64) -> SessionKey {
        SessionKey::new(n)
    }

    #[test]
    fn test_enqueue_first_player_waits() {
        let mut mm = Matchmaker::new();
        assert_eq!(mm.enqueue_or_match(key(1), QueueKind::Casual), None);
        assert_eq!(mm.waiting(QueueKind::Casual), Some(key(1)));
        assert!(mm.is_waiting(key(1)));
    }

    #[test]
    fn test_enqueue_second_player_pairs_and_clears_slot() {
        let mut mm = Matchmaker::new();
        mm.enqueue_or_match(key(1), QueueKind::Casual);
        let pairing = mm.enqueue_or_match(key(2), QueueKind::Casual).unwrap();

        assert_eq!(pairing.waiting, key(1));
        assert_eq!(pairing.arriving, key(2));
        assert_eq!(mm.waiting(QueueKind::Casual), None);
    }

    #[test]
    fn test_queues_are_independent() {
        let mut mm = Matchmaker::new();
        mm.enqueue_or_match(key(1), QueueKind::Ranked);
        assert_eq!(mm.enqueue_or_match(key(2), QueueKind::Casual), None);
        assert_eq!(mm.waiting(QueueKind::Ranked), Some(key(1)));
        assert_eq!(mm.waiting(QueueKind::Casual), Some(key(2)));
    }

    #[test]
    fn test_enqueue_same_player_twice_does_not_self_pair() {
        let mut mm = Matchmaker::new();
        mm.enqueue_or_match(key(1), QueueKind::Casual);
        assert_eq!(mm.enqueue_or_match(key(1), QueueKind::Casual), None);
        assert_eq!(mm.waiting(QueueKind::Casual), Some(key(1)));
    }

    #[test]
    fn test_cancel_frees_slot() {
        let mut mm = Matchmaker::new();
        mm.enqueue_or_match(key(1), QueueKind::Ranked);
        assert_eq!(mm.cancel(key(1)), Some(QueueKind::Ranked));
        assert_eq!(mm.cancel(key(1)), None);
        assert!(!mm.is_waiting(key(1)));
    }

    #[test]
    fn test_seating_assigns_opposite_colors() {
        let mut rng = StdRng::seed_from_u64(7);
        let pairing = Pairing {
            waiting: key(1),
            arriving: key(2),
            queue: QueueKind::Casual,
        };
        for _ in 0..20 {
            let seats = pairing.seat(&mut rng);
            assert_ne!(seats.white, seats.black);
            assert!([key(1), key(2)].contains(&seats.white));
        }
    }

    #[test]
    fn test_seating_coin_is_not_one_sided() {
        let mut rng = StdRng::seed_from_u64(11);
        let whites = (0..200)
            .filter(|_| Seating::flip(key(1), key(2), &mut rng).white == key(1))
            .count();
        assert!((60..140).contains(&whites), "got {whites} of 200");
    }
}
