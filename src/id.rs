//! ID generation utilities for mailforge
//!
//! Jobs share one execution directory, so every job needs a collision-free
//! temp script name and attempt directory of its own.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Generate a unique job ID
///
/// Format: `{timestamp_ms}-{random_hex}`
/// Example: `1738300800123-a1b2c3d4`
pub fn generate_job_id() -> String {
    let timestamp = now_ms();
    let random: u32 = rand::rng().random();
    format!("{}-{:08x}", timestamp, random)
}

/// Generate a unique temp script filename for one execution.
///
/// Format: `forge_{job_id}_{random_hex}.{ext}`
pub fn generate_script_name(job_id: &str, ext: &str) -> String {
    let random: u16 = rand::rng().random();
    format!("forge_{}_{:04x}.{}", job_id, random, ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_returns_reasonable_timestamp() {
        // After 2024-01-01 in ms
        assert!(now_ms() > 1_704_067_200_000);
    }

    #[test]
    fn test_job_ids_are_unique() {
        let mut ids = std::collections::HashSet::new();
        for _ in 0..100 {
            assert!(ids.insert(generate_job_id()), "Generated duplicate ID");
        }
    }

    #[test]
    fn test_script_name_format() {
        let name = generate_script_name("123-abcd", "py");
        assert!(name.starts_with("forge_123-abcd_"));
        assert!(name.ends_with(".py"));
    }

    #[test]
    fn test_script_names_differ_per_call() {
        let a = generate_script_name("job", "py");
        let b = generate_script_name("job", "py");
        // 16 bits of randomness: a collision here is vanishingly unlikely
        assert_ne!(a, b);
    }
}
