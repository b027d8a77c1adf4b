//! VoicePool: voice storage, per-pool caps and priority stealing.

use slotmap::SlotMap;

use crate::voice::{PoolId, Voice, VoiceKey};

/// Result of asking the pool for a voice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Allocation {
    Allocated(VoiceKey),
    /// Allocated by evicting `victim`, which is now fading out.
    Stolen { voice: VoiceKey, victim: VoiceKey },
    /// No room and nothing of lower priority to evict.
    Dropped,
}

impl Allocation {
    pub fn key(self) -> Option<VoiceKey> {
        match self {
            Allocation::Allocated(k) | Allocation::Stolen { voice: k, .. } => Some(k),
            Allocation::Dropped => None,
        }
    }
}

/// All live voices.
///
/// Stolen voices keep sounding while they fade but no longer count against
/// any cap, so the slot map is sized for twice the voice limit.
pub struct VoicePool {
    voices: SlotMap<VoiceKey, Voice>,
    capacity: usize,
    serial: u64,
}

impl VoicePool {
    pub fn new(capacity: usize) -> Self {
        Self {
            voices: SlotMap::with_capacity_and_key(capacity * 2),
            capacity,
            serial: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Voices currently held, including fading ones.
    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    pub fn get(&self, key: VoiceKey) -> Option<&Voice> {
        self.voices.get(key)
    }

    pub fn get_mut(&mut self, key: VoiceKey) -> Option<&mut Voice> {
        self.voices.get_mut(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (VoiceKey, &Voice)> {
        self.voices.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (VoiceKey, &mut Voice)> {
        self.voices.iter_mut()
    }

    pub fn keys(&self) -> impl Iterator<Item = VoiceKey> + '_ {
        self.voices.keys()
    }

    /// Voices counted against `pool`.
    pub fn occupancy(&self, pool: PoolId) -> usize {
        self.voices
            .values()
            .filter(|v| v.pool == pool && v.occupies())
            .count()
    }

    fn total_occupancy(&self) -> usize {
        self.voices.values().filter(|v| v.occupies()).count()
    }

    /// Find a voice to evict for a request of `priority`: the lowest
    /// priority, oldest first on ties, strictly below `priority`.
    fn victim(&self, priority: u8, pool: Option<PoolId>) -> Option<VoiceKey> {
        self.voices
            .iter()
            .filter(|(_, v)| v.occupies() && pool.map_or(true, |p| v.pool == p))
            .filter(|(_, v)| v.priority < priority)
            .min_by_key(|(_, v)| (v.priority, v.serial))
            .map(|(k, _)| k)
    }

    fn oldest_fading(&self) -> Option<VoiceKey> {
        self.voices
            .iter()
            .filter(|(_, v)| !v.occupies())
            .min_by_key(|(_, v)| v.serial)
            .map(|(k, _)| k)
    }

    /// Place `voice` in its pool, evicting a lower-priority voice when the
    /// pool (`max_voices`, 0 for no cap) or the engine is full.
    pub fn allocate(&mut self, mut voice: Voice, max_voices: u8) -> Allocation {
        let pool = voice.pool;
        let priority = voice.priority;

        let mut victim = None;
        if max_voices > 0 && self.occupancy(pool) >= max_voices as usize {
            match self.victim(priority, Some(pool)) {
                Some(v) => victim = Some(v),
                None => {
                    tracing::debug!(?pool, priority, "pool full, voice dropped");
                    return Allocation::Dropped;
                }
            }
        }
        if victim.is_none() && self.total_occupancy() >= self.capacity {
            match self.victim(priority, None) {
                Some(v) => victim = Some(v),
                None => {
                    tracing::debug!(priority, "voice limit reached, voice dropped");
                    return Allocation::Dropped;
                }
            }
        }
        if self.voices.len() >= self.capacity * 2 {
            // Slots are full of fading voices; cut the oldest one short.
            match self.oldest_fading() {
                Some(k) => {
                    tracing::trace!(voice = ?k, "fading voice cut");
                    self.voices.remove(k);
                }
                None => {
                    tracing::debug!("no free voice slots, voice dropped");
                    return Allocation::Dropped;
                }
            }
        }

        self.serial += 1;
        voice.serial = self.serial;
        if let Some(v) = victim.and_then(|k| self.voices.get_mut(k)) {
            v.steal();
        }
        let key = self.voices.insert(voice);
        match victim {
            Some(victim) => {
                tracing::trace!(?victim, "voice stolen");
                Allocation::Stolen { voice: key, victim }
            }
            None => Allocation::Allocated(key),
        }
    }

    /// Remove a voice immediately.
    pub fn remove(&mut self, key: VoiceKey) -> Option<Voice> {
        self.voices.remove(key)
    }

    /// Drop finished voices and return how many were reclaimed.
    pub fn reap(&mut self) -> usize {
        let before = self.voices.len();
        self.voices.retain(|_, v| !v.is_finished());
        before - self.voices.len()
    }

    pub fn clear(&mut self) {
        self.voices.clear();
    }
}
