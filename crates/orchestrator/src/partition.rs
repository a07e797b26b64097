use crate::error::OrchestratorError;
use voluspa_common::Job;

/// Split `jobs` into `k` contiguous shares covering the input exactly once.
///
/// Shares hold `n / k` jobs each and the last one absorbs the remainder.
/// With fewer jobs than shares, each leading share gets one job and the
/// trailing shares are empty.
pub fn partition(jobs: Vec<Job>, k: usize) -> Result<Vec<Vec<Job>>, OrchestratorError> {
    if k == 0 {
        return Err(OrchestratorError::NoWorkers);
    }
    let size = (jobs.len() / k).max(1);

    let mut shares = Vec::with_capacity(k);
    let mut rest = jobs;
    for _ in 1..k {
        let tail = rest.split_off(size.min(rest.len()));
        shares.push(rest);
        rest = tail;
    }
    shares.push(rest);
    Ok(shares)
}
