//! Compiled-in defaults, consulted first in the three-layer merge
//! (defaults → config file → CLI flags) described in §4.11.

pub fn num_worker_threads() -> usize {
    5
}

pub fn level() -> u32 {
    5
}

pub fn max_redirect() -> usize {
    20
}

pub fn tries() -> u32 {
    20
}

pub fn wait_ms() -> u64 {
    0
}

pub fn waitretry_ms() -> u64 {
    10_000
}

pub fn timeout_seconds() -> u64 {
    900
}

pub fn connect_timeout_seconds() -> u64 {
    90
}

pub fn read_timeout_seconds() -> u64 {
    900
}

pub fn max_memory_bytes() -> usize {
    10 * 1024 * 1024
}

pub fn restrict_file_names() -> super::RestrictFileNames {
    super::RestrictFileNames::Unix
}

pub fn user_agent_token() -> String {
    "RetrieverBot".to_string()
}

pub fn user_agent_full() -> String {
    "RetrieverBot/0.1".to_string()
}

pub fn robots_txt_cache_sec() -> u64 {
    3600
}

pub fn cut_dirs() -> usize {
    0
}

pub fn config_include_depth_limit() -> usize {
    20
}
