//! Routines generated once and shared across scans with identical setup.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use tracing::{debug, trace};

use super::backend::{Backend, ClosureBackend};
use super::routine::Routine;
use crate::convert::TextConverter;
use crate::parse::ParserTableId;
use crate::tuple::{SlotDescriptor, TupleLayout};
use crate::Result;

/// Everything that determines a routine's behavior.
///
/// The escape character is left out: routines store string slots by
/// reference and never unescape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutineKey {
    pub slot: SlotDescriptor,
    pub tuple_size: usize,
    /// `None` when the policy skips the sentinel check.
    pub null_sentinel: Option<SmolStr>,
    pub strict_mode: bool,
    pub parsers: ParserTableId,
}

impl RoutineKey {
    pub fn new(converter: &TextConverter, layout: &TupleLayout, slot: &SlotDescriptor) -> Self {
        let policy = converter.policy();
        Self {
            slot: *slot,
            tuple_size: layout.byte_size(),
            null_sentinel: policy.check_null.then(|| policy.null_sentinel.clone()),
            strict_mode: policy.strict_mode,
            parsers: converter.parsers().id(),
        }
    }
}

/// Counter snapshot of a [`RoutineCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Misses whose generation failed; failures are not cached.
    pub failures: u64,
}

impl CacheStats {
    pub fn requests(&self) -> u64 {
        self.hits + self.misses
    }

    /// Requests answered with a routine, cached or fresh.
    pub fn generated(&self) -> u64 {
        self.requests() - self.failures
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "generated: {} out of {}", self.generated(), self.requests())
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    failures: AtomicU64,
}

/// Thread-safe map from [`RoutineKey`] to finalized routines.
///
/// One cache may serve converters with different policies and parser
/// tables; each combination gets its own entry.
pub struct RoutineCache {
    backend: Arc<dyn Backend>,
    routines: RwLock<FxHashMap<RoutineKey, Routine>>,
    counters: Counters,
}

impl RoutineCache {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            routines: RwLock::new(FxHashMap::default()),
            counters: Counters::default(),
        }
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Look up the routine for `slot`, generating and caching it on a miss.
    pub fn get_or_generate(
        &self,
        converter: &TextConverter,
        layout: &TupleLayout,
        slot: &SlotDescriptor,
    ) -> Result<Routine> {
        let key = RoutineKey::new(converter, layout, slot);
        if let Some(routine) = self.routines.read().get(&key) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            trace!(slot = slot.id, "routine cache hit");
            return Ok(routine.clone());
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        let routine = match converter.generate(layout, slot, self.backend.as_ref()) {
            Ok(routine) => routine,
            Err(err) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                return Err(err);
            }
        };
        debug!(slot = slot.id, slot_type = %slot.slot_type, "cached new routine");

        // A concurrent miss on the same key may have won; keep its routine.
        let mut routines = self.routines.write();
        Ok(routines.entry(key).or_insert(routine).clone())
    }

    pub fn len(&self) -> usize {
        self.routines.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routines.read().is_empty()
    }

    pub fn clear(&self) {
        self.routines.write().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    /// One-line report, e.g. `generated: 3 out of 4`.
    pub fn summary(&self) -> String {
        self.stats().to_string()
    }
}

impl Default for RoutineCache {
    fn default() -> Self {
        Self::new(Arc::new(ClosureBackend))
    }
}

impl fmt::Debug for RoutineCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutineCache")
            .field("routines", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ConversionPolicy;
    use crate::parse::{ParseOutcome, ParserTable};
    use crate::tuple::{SlotType, Tuple};
    use crate::Error;

    fn layout() -> TupleLayout {
        TupleLayout::builder()
            .slot(SlotType::Int)
            .slot(SlotType::Varchar { max_len: 3 })
            .slot(SlotType::Char { len: 2 })
            .build()
            .unwrap()
    }

    #[rstest::rstest]
    fn test_second_lookup_hits() {
        let layout = layout();
        let converter = TextConverter::default();
        let cache = RoutineCache::default();

        let first = cache.get_or_generate(&converter, &layout, &layout.slots()[0]).unwrap();
        let second = cache.get_or_generate(&converter, &layout, &layout.slots()[0]).unwrap();
        assert_eq!(first.name(), second.name());
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                failures: 0
            }
        );
    }

    #[rstest::rstest]
    fn test_policy_is_part_of_key() {
        let layout = layout();
        let cache = RoutineCache::default();
        let lenient = TextConverter::default();
        let strict = TextConverter::new(ConversionPolicy::new().with_strict_mode(true));

        cache.get_or_generate(&lenient, &layout, &layout.slots()[0]).unwrap();
        cache.get_or_generate(&strict, &layout, &layout.slots()[0]).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().hits, 0);
    }

    #[rstest::rstest]
    fn test_parser_table_is_part_of_key() {
        fn word_one(data: &[u8]) -> (i32, ParseOutcome) {
            match data {
                b"one" => (1, ParseOutcome::Success),
                _ => (0, ParseOutcome::Failure),
            }
        }

        let layout = layout();
        let slot = &layout.slots()[0];
        let cache = RoutineCache::default();
        let builtin = TextConverter::default();
        let words = TextConverter::default().with_parsers(ParserTable::default().with_int32(word_one));

        let builtin_routine = cache.get_or_generate(&builtin, &layout, slot).unwrap();
        let words_routine = cache.get_or_generate(&words, &layout, slot).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().hits, 0);

        let mut tuple = Tuple::new(&layout);
        assert!(!builtin_routine.invoke(b"one", tuple.as_bytes_mut()));
        assert!(words_routine.invoke(b"one", tuple.as_bytes_mut()));
        assert_eq!(tuple.get::<i32>(slot), Some(1));
    }

    #[rstest::rstest]
    #[case(ConversionPolicy::new().with_escape_char(Some(b'^')))]
    #[case(ConversionPolicy::new().with_escape_char(Some(b',')))]
    #[case(ConversionPolicy::new().with_null_sentinel("NULL"))]
    fn test_escape_char_and_unchecked_sentinel_share_an_entry(#[case] other: ConversionPolicy) {
        let layout = layout();
        let slot = &layout.slots()[1];
        let cache = RoutineCache::default();
        let unchecked = TextConverter::new(ConversionPolicy::new().with_check_null(false));

        cache.get_or_generate(&unchecked, &layout, slot).unwrap();
        let other = TextConverter::new(other.with_check_null(false));
        cache.get_or_generate(&other, &layout, slot).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().hits, 1);
    }

    #[rstest::rstest]
    fn test_sentinel_is_ignored_without_null_check() {
        let layout = layout();
        let slot = &layout.slots()[0];
        let unchecked = |sentinel: &str| {
            TextConverter::new(
                ConversionPolicy::new()
                    .with_check_null(false)
                    .with_null_sentinel(sentinel),
            )
        };
        let key = |converter: &TextConverter| RoutineKey::new(converter, &layout, slot);
        assert_eq!(key(&unchecked("\\N")), key(&unchecked("NULL")));

        let checked = TextConverter::new(ConversionPolicy::new().with_null_sentinel("NULL"));
        assert_ne!(key(&checked), key(&TextConverter::default()));
    }

    #[rstest::rstest]
    fn test_failures_are_counted_not_cached() {
        let layout = layout();
        let converter = TextConverter::default();
        let cache = RoutineCache::default();

        cache.get_or_generate(&converter, &layout, &layout.slots()[0]).unwrap();
        cache.get_or_generate(&converter, &layout, &layout.slots()[1]).unwrap();
        let err = cache
            .get_or_generate(&converter, &layout, &layout.slots()[2])
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedSlotType(SlotType::Char { len: 2 })));
        cache.get_or_generate(&converter, &layout, &layout.slots()[0]).unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.summary(), "generated: 3 out of 4");
    }

    #[rstest::rstest]
    fn test_clear_keeps_counters() {
        let layout = layout();
        let converter = TextConverter::default();
        let cache = RoutineCache::default();
        cache.get_or_generate(&converter, &layout, &layout.slots()[0]).unwrap();
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().misses, 1);
    }
}
