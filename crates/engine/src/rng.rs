use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use std::collections::VecDeque;

/// Seeded source of dice rolls and deck shuffles.
/// All entropy in a run flows through one instance; no global RNG.
#[derive(Debug)]
pub struct Dice {
    rng: SmallRng,
    forced: VecDeque<(u8, u8)>,
}

impl Dice {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            forced: VecDeque::new(),
        }
    }
    /// Rolls two dice. Forced rolls queued by a harness are consumed
    /// first, in order.
    pub fn roll(&mut self) -> (u8, u8) {
        if let Some(roll) = self.forced.pop_front() {
            return roll;
        }
        (
            self.rng.random_range(1..=6),
            self.rng.random_range(1..=6),
        )
    }
    /// Queues fixed dice outcomes ahead of the seeded stream. Scenario
    /// harnesses use this to force movement; production runs never do.
    pub fn force(&mut self, rolls: &[(u8, u8)]) {
        self.forced.extend(rolls.iter().copied());
    }
    /// Returns a shuffled copy of the given deck.
    pub fn shuffle<T: Copy>(&mut self, items: &[T]) -> Vec<T> {
        let mut copied = items.to_vec();
        copied.shuffle(&mut self.rng);
        copied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = Dice::new(42);
        let mut b = Dice::new(42);
        for _ in 0..32 {
            assert_eq!(a.roll(), b.roll());
        }
        assert_eq!(a.shuffle(&[1, 2, 3, 4, 5]), b.shuffle(&[1, 2, 3, 4, 5]));
    }

    #[test]
    fn rolls_stay_in_range() {
        let mut dice = Dice::new(7);
        for _ in 0..100 {
            let (d1, d2) = dice.roll();
            assert!((1..=6).contains(&d1));
            assert!((1..=6).contains(&d2));
        }
    }

    #[test]
    fn forced_rolls_come_first() {
        let mut dice = Dice::new(0);
        dice.force(&[(6, 6), (1, 2)]);
        assert_eq!(dice.roll(), (6, 6));
        assert_eq!(dice.roll(), (1, 2));
    }
}
