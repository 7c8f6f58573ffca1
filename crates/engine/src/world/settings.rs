use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

/// Persisted per-dimension settings, shared by every `World` opened on the
/// same stored data.
///
/// The provider owns one `Arc<Settings>` and hands clones to each world it
/// backs. The reference count elects the *advancing* world: the first one to
/// acquire it advances the shared tick and persists these settings, the rest
/// are passive views.
#[derive(Debug)]
pub struct Settings {
    name: String,
    current_tick: AtomicI64,
    refs: AtomicU32,
}

impl Settings {
    pub fn new(name: impl Into<String>, current_tick: i64) -> Self {
        Self {
            name: name.into(),
            current_tick: AtomicI64::new(current_tick),
            refs: AtomicU32::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn current_tick(&self) -> i64 {
        self.current_tick.load(Ordering::Acquire)
    }

    /// Advance the shared tick by one and return the new value.
    pub fn advance_tick(&self) -> i64 {
        self.current_tick.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Register one more world on these settings. Returns `true` if the caller
    /// is the first holder and therefore the advancing instance.
    pub fn acquire(&self) -> bool {
        self.refs.fetch_add(1, Ordering::AcqRel) == 0
    }

    /// Drop one holder, returning how many remain.
    pub fn release(&self) -> u32 {
        match self
            .refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(prev) => prev - 1,
            Err(_) => {
                tracing::warn!("settings '{}' released more often than acquired", self.name);
                0
            }
        }
    }

    pub fn ref_count(&self) -> u32 {
        self.refs.load(Ordering::Acquire)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new("World", 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_acquirer_advances() {
        let settings = Settings::new("test", 10);
        assert!(settings.acquire());
        assert!(!settings.acquire());
        assert_eq!(settings.ref_count(), 2);

        assert_eq!(settings.release(), 1);
        assert_eq!(settings.release(), 0);
        assert_eq!(settings.release(), 0);

        // Ownership is re-elected once everyone let go.
        assert!(settings.acquire());
    }

    #[test]
    fn advance_tick_is_monotonic() {
        let settings = Settings::new("test", 41);
        assert_eq!(settings.advance_tick(), 42);
        assert_eq!(settings.advance_tick(), 43);
        assert_eq!(settings.current_tick(), 43);
    }
}
