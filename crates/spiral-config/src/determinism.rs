use rand::{rngs::StdRng, SeedableRng};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

/// Deterministic execution switches resolved once per process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeterminismConfig {
    /// Whether deterministic execution is enabled globally.
    pub enabled: bool,
    /// Base seed used to derive per-component seeds.
    pub base_seed: u64,
    /// If true batch kernels run their samples serially instead of fanning out
    /// across the rayon pool.
    pub fix_reduction: bool,
}

impl Default for DeterminismConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_seed: 42,
            fix_reduction: false,
        }
    }
}

fn flag_enabled(raw: &str) -> bool {
    matches!(raw, "1" | "true" | "True" | "on" | "ON")
}

fn flag_disabled(raw: &str) -> bool {
    matches!(raw, "0" | "false" | "False" | "off" | "OFF")
}

impl DeterminismConfig {
    /// Builds a configuration snapshot from environment variables.
    pub fn from_env() -> Self {
        let enabled = std::env::var("SPIRAL_DETERMINISTIC")
            .ok()
            .map(|v| !flag_disabled(v.as_str()))
            .unwrap_or(false);

        let base_seed = std::env::var("SPIRAL_DETERMINISTIC_SEED")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(42);

        let fix_reduction = std::env::var("SPIRAL_DETERMINISTIC_REDUCTION")
            .ok()
            .map(|v| flag_enabled(v.as_str()))
            .unwrap_or(enabled);

        Self {
            enabled,
            base_seed,
            fix_reduction,
        }
    }

    /// Derives a deterministic seed for a given component label.
    pub fn seed_for<L: Hash>(&self, label: L) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.base_seed.hash(&mut hasher);
        label.hash(&mut hasher);
        hasher.finish()
    }
}

static CONFIG: OnceLock<DeterminismConfig> = OnceLock::new();

/// Returns the lazily initialised deterministic configuration.
pub fn config() -> &'static DeterminismConfig {
    CONFIG.get_or_init(DeterminismConfig::from_env)
}

/// Returns a RNG derived from the provided label. When determinism is disabled
/// this falls back to a random seed from the operating system.
pub fn rng_from_label(label: &str) -> StdRng {
    let cfg = config();
    if cfg.enabled {
        StdRng::seed_from_u64(cfg.seed_for(label))
    } else {
        StdRng::from_entropy()
    }
}

/// Returns a RNG seeded from an optional explicit seed, respecting deterministic
/// overrides when the seed is not provided.
pub fn rng_from_optional(seed: Option<u64>, label: &str) -> StdRng {
    match seed {
        Some(value) => StdRng::seed_from_u64(value),
        None => rng_from_label(label),
    }
}

/// Returns whether batch reductions should be forced to run serially.
pub fn lock_reduction_order() -> bool {
    let cfg = config();
    cfg.enabled && cfg.fix_reduction
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
    use std::sync::Mutex;

    fn with_env(vars: &[(&str, Option<&str>)], test: impl FnOnce()) {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        let _lock = GUARD.get_or_init(|| Mutex::new(())).lock().unwrap();

        let snapshot: Vec<(String, Option<String>)> = vars
            .iter()
            .map(|(key, value)| {
                let previous = std::env::var(key).ok();
                match value {
                    Some(val) => std::env::set_var(key, val),
                    None => std::env::remove_var(key),
                }
                ((*key).to_string(), previous)
            })
            .collect();

        let result = catch_unwind(AssertUnwindSafe(test));

        for (key, value) in snapshot {
            match value {
                Some(val) => std::env::set_var(&key, val),
                None => std::env::remove_var(&key),
            }
        }

        if let Err(err) = result {
            resume_unwind(err);
        }
    }

    #[test]
    fn defaults_disable_determinism() {
        with_env(
            &[
                ("SPIRAL_DETERMINISTIC", None),
                ("SPIRAL_DETERMINISTIC_SEED", None),
                ("SPIRAL_DETERMINISTIC_REDUCTION", None),
            ],
            || {
                let cfg = DeterminismConfig::from_env();
                assert_eq!(cfg, DeterminismConfig::default());
            },
        );
    }

    #[test]
    fn reduction_lock_follows_enable_flag_unless_overridden() {
        with_env(
            &[
                ("SPIRAL_DETERMINISTIC", Some("on")),
                ("SPIRAL_DETERMINISTIC_SEED", Some(" 1337 ")),
                ("SPIRAL_DETERMINISTIC_REDUCTION", None),
            ],
            || {
                let cfg = DeterminismConfig::from_env();
                assert!(cfg.enabled);
                assert_eq!(cfg.base_seed, 1337);
                assert!(cfg.fix_reduction);
            },
        );
        with_env(
            &[
                ("SPIRAL_DETERMINISTIC", Some("1")),
                ("SPIRAL_DETERMINISTIC_REDUCTION", Some("off")),
            ],
            || {
                let cfg = DeterminismConfig::from_env();
                assert!(cfg.enabled);
                assert!(!cfg.fix_reduction);
            },
        );
    }

    #[test]
    fn textual_false_values_disable_flags() {
        with_env(&[("SPIRAL_DETERMINISTIC", Some("False"))], || {
            let cfg = DeterminismConfig::from_env();
            assert!(!cfg.enabled);
        });
    }

    #[test]
    fn derived_seeds_are_stable_per_label() {
        let cfg = DeterminismConfig {
            enabled: true,
            base_seed: 99,
            fix_reduction: true,
        };
        assert_eq!(cfg.seed_for("dense"), cfg.seed_for("dense"));
        assert_ne!(cfg.seed_for("dense"), cfg.seed_for("embedding"));
    }

    #[test]
    fn explicit_seed_bypasses_global_config() {
        let mut first = rng_from_optional(Some(7), "ignored");
        let mut second = rng_from_optional(Some(7), "also-ignored");
        let a: u64 = first.gen();
        let b: u64 = second.gen();
        assert_eq!(a, b);
    }
}
