const DEFAULT_MAX_WORKERS: usize = 4;

fn parse_env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok()?.parse::<usize>().ok()
}

fn default_worker_count() -> usize {
    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(DEFAULT_MAX_WORKERS);
    available.min(DEFAULT_MAX_WORKERS).max(1)
}

/// OCR worker count: `SAFEDOC_OCR_WORKERS`, else the available parallelism
/// capped at four.
pub fn worker_count() -> usize {
    let workers = parse_env_usize("SAFEDOC_OCR_WORKERS")
        .filter(|v| *v > 0)
        .unwrap_or_else(default_worker_count);
    log::info!("[OCR] worker count: {}", workers);
    workers
}
