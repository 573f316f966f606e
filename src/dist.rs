//! Process rank as exported by the distributed launcher.
//!
//! Only the main process (rank 0) touches shared on-disk state such as dataset
//! downloads. Other ranks expect the data to be in place once they read it.

const RANK_VARS: [&str; 2] = ["RANK", "LOCAL_RANK"];

/// Rank of the current process. Defaults to 0 for single-process runs.
pub fn rank() -> usize {
    for key in RANK_VARS {
        let Ok(value) = std::env::var(key) else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        return match value.parse() {
            Ok(rank) => rank,
            Err(_) => {
                log::warn!("ignoring non-numeric {}={:?}; assuming rank 0", key, value);
                0
            }
        };
    }
    0
}

pub fn is_main_process() -> bool {
    rank() == 0
}
