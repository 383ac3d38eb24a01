//! QoS-tiered outgoing command queue with per-group coalescing.
//!
//! At most one instance per group key (`MV`, `PSBAS`) is queued at any time.
//! A newer instance for the same group replaces the queued one unless the
//! queued one sits in a higher tier, in which case the newer one is refused.
//! Within a tier instances leave in FIFO order; higher tiers always leave
//! first.

use std::collections::VecDeque;

use avrctl_core::error::{Error, Result};
use avrctl_core::{CommandInstance, QOS_LEVELS};

/// Outcome of [`CommandQueue::push`].
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// Nothing was queued for the group; the instance was added.
    NotCanceled,
    /// The instance replaced this previously queued one.
    Canceled(CommandInstance),
    /// A higher-tier instance for the group is already queued; the pushed
    /// instance was dropped and the queue is unchanged.
    Failed(CommandInstance),
}

/// The coalescing priority queue.
#[derive(Debug, Clone)]
pub struct CommandQueue {
    tiers: Vec<VecDeque<CommandInstance>>,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new(QOS_LEVELS)
    }
}

impl CommandQueue {
    /// Create a queue with `levels` QoS tiers.
    pub fn new(levels: u8) -> Self {
        CommandQueue {
            tiers: (0..levels.max(1)).map(|_| VecDeque::new()).collect(),
        }
    }

    /// Number of tiers.
    pub fn levels(&self) -> u8 {
        self.tiers.len() as u8
    }

    fn locate(&self, group: &str) -> Option<(usize, usize)> {
        self.tiers.iter().enumerate().find_map(|(tier, entries)| {
            entries
                .iter()
                .position(|c| c.group_key() == group)
                .map(|pos| (tier, pos))
        })
    }

    /// Queue an instance, coalescing with any instance of the same group.
    pub fn push(&mut self, command: CommandInstance) -> Result<PushOutcome> {
        let qos = command.qos() as usize;
        if qos >= self.tiers.len() {
            return Err(Error::QosOutOfRange {
                qos: command.qos(),
                levels: self.levels(),
            });
        }

        let outcome = match self.locate(command.group_key()) {
            Some((tier, pos)) if tier > qos => {
                PushOutcome::Failed(self.tiers[tier][pos].clone())
            }
            Some((tier, pos)) if tier == qos => {
                let previous = std::mem::replace(&mut self.tiers[tier][pos], command);
                PushOutcome::Canceled(previous)
            }
            Some((tier, pos)) => {
                let previous = self.tiers[tier].remove(pos);
                self.tiers[qos].push_back(command);
                match previous {
                    Some(previous) => PushOutcome::Canceled(previous),
                    None => PushOutcome::NotCanceled,
                }
            }
            None => {
                self.tiers[qos].push_back(command);
                PushOutcome::NotCanceled
            }
        };

        debug_assert!(self.check_invariant(), "group key queued in two tiers");
        Ok(outcome)
    }

    /// Remove and return the oldest instance of the highest non-empty tier.
    pub fn pop(&mut self) -> Option<CommandInstance> {
        self.tiers
            .iter_mut()
            .rev()
            .find_map(|entries| entries.pop_front())
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        for entries in &mut self.tiers {
            entries.clear();
        }
    }

    /// Total queued instances.
    pub fn len(&self) -> usize {
        self.tiers.iter().map(VecDeque::len).sum()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.tiers.iter().all(VecDeque::is_empty)
    }

    /// Whether an instance of `group` is queued.
    pub fn contains(&self, group: &str) -> bool {
        self.locate(group).is_some()
    }

    /// The queued instance for `group`, if any.
    pub fn get(&self, group: &str) -> Option<&CommandInstance> {
        self.locate(group)
            .map(|(tier, pos)| &self.tiers[tier][pos])
    }

    /// Verify that no group key is queued more than once across all tiers.
    pub fn check_invariant(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        self.tiers
            .iter()
            .flatten()
            .all(|c| seen.insert(c.group_key().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avrctl_core::{CommandEntry, CommandLookup, CommandTable};

    fn lookup() -> CommandLookup {
        let table = CommandTable::new()
            .with("PW", CommandEntry::new().name("power").choice("ON", true))
            .with("MU", CommandEntry::new().name("mute").choice("ON", true))
            .with(
                "MV",
                CommandEntry::new().name("volume").level().zero(80).range(0, 98),
            )
            .with("SI", CommandEntry::new().name("source"));
        CommandLookup::from_table(&table)
    }

    fn query(name: &str, qos: u8) -> CommandInstance {
        lookup().command(name).unwrap().query(qos)
    }

    fn volume(db: i32, qos: u8) -> CommandInstance {
        lookup().command("volume").unwrap().set(db, qos).unwrap()
    }

    #[test]
    fn push_rejects_out_of_range_qos() {
        let mut q = CommandQueue::new(5);
        let err = q.push(query("power", 0).clone()).map(|_| ());
        assert!(err.is_ok());

        let mut cmd = query("mute", 4);
        cmd.raise_qos(5);
        assert_eq!(cmd.qos(), 4);
        let mut small = CommandQueue::new(2);
        assert!(matches!(
            small.push(cmd),
            Err(Error::QosOutOfRange { qos: 4, levels: 2 })
        ));
        assert!(small.is_empty());
    }

    #[test]
    fn same_key_series_keeps_one_entry_at_the_highest_tier() {
        let mut q = CommandQueue::new(5);
        for qos in [0, 2, 1, 4, 3] {
            q.push(volume(-20, qos)).unwrap();
            assert!(q.check_invariant());
            assert_eq!(q.len(), 1);
            assert!(q.contains("MV"));
        }
        // The pushes at 1 and 3 lose to the queued higher tier.
        assert_eq!(q.pop().unwrap().qos(), 4);
        assert!(q.is_empty());
    }

    #[test]
    fn pop_serves_highest_tier_then_fifo() {
        let mut q = CommandQueue::new(5);
        q.push(query("power", 0)).unwrap();
        q.push(query("mute", 2)).unwrap();
        q.push(query("source", 2)).unwrap();
        q.push(volume(-20, 1)).unwrap();

        let order: Vec<String> = std::iter::from_fn(|| q.pop())
            .map(|c| c.body().to_string())
            .collect();
        assert_eq!(order, vec!["MU?", "SI?", "MV60", "PW?"]);
        assert!(q.pop().is_none());
    }

    #[test]
    fn same_tier_overwrites_in_place() {
        let mut q = CommandQueue::new(5);
        q.push(volume(-20, 1)).unwrap();
        q.push(query("mute", 1)).unwrap();

        let outcome = q.push(volume(-10, 1)).unwrap();
        match outcome {
            PushOutcome::Canceled(prev) => assert_eq!(prev.body(), "MV60"),
            other => panic!("expected Canceled, got {other:?}"),
        }
        assert_eq!(q.len(), 2);
        // Replacement keeps the original position ahead of MU.
        assert_eq!(q.pop().unwrap().body(), "MV70");
        assert_eq!(q.pop().unwrap().body(), "MU?");
    }

    #[test]
    fn higher_tier_push_moves_the_group_up() {
        let mut q = CommandQueue::new(5);
        q.push(volume(-20, 0)).unwrap();
        q.push(query("power", 0)).unwrap();
        q.push(query("mute", 1)).unwrap();
        assert_eq!(q.len(), 3);

        let outcome = q.push(volume(-10, 2)).unwrap();
        assert!(matches!(outcome, PushOutcome::Canceled(ref prev) if prev.body() == "MV60"));
        assert_eq!(q.len(), 3);
        assert!(q.check_invariant());

        // The moved instance leaves before everything originally queued
        // behind its predecessor.
        assert_eq!(q.pop().unwrap().body(), "MV70");
        assert_eq!(q.pop().unwrap().body(), "MU?");
        assert_eq!(q.pop().unwrap().body(), "PW?");
    }

    #[test]
    fn lower_tier_push_fails_and_leaves_queue_unchanged() {
        let mut q = CommandQueue::new(5);
        q.push(volume(-20, 3)).unwrap();

        let outcome = q.push(volume(-10, 1)).unwrap();
        match outcome {
            PushOutcome::Failed(existing) => {
                assert_eq!(existing.body(), "MV60");
                assert_eq!(existing.qos(), 3);
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(q.len(), 1);
        assert_eq!(q.get("MV").unwrap().body(), "MV60");
    }

    #[test]
    fn contains_get_and_clear() {
        let mut q = CommandQueue::default();
        assert_eq!(q.levels(), QOS_LEVELS);
        q.push(query("power", 1)).unwrap();
        assert!(q.contains("PW"));
        assert!(!q.contains("MV"));
        assert_eq!(q.get("PW").unwrap().qos(), 1);
        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn invariant_holds_under_churn() {
        let mut q = CommandQueue::new(5);
        let names = ["power", "mute", "source"];
        for round in 0..40u8 {
            let name = names[(round as usize * 7) % names.len()];
            let qos = (round * 3) % 5;
            q.push(query(name, qos)).unwrap();
            q.push(volume(-(round as i32 % 60), (round * 2) % 5)).unwrap();
            assert!(q.check_invariant());
            assert!(q.len() <= 4);
            if round % 5 == 0 {
                q.pop();
            }
        }
    }
}
