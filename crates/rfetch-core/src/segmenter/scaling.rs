//! Dynamic scaling of segmentation knobs based on total size, applied before
//! building a Segment Plan.

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;

/// Inputs to dynamic scaling: the caller's requested knobs before adjustment.
#[derive(Debug, Clone, Copy)]
pub struct ScalingInputs {
    pub total_size: u64,
    pub worker_count: usize,
    pub segments_per_worker: usize,
}

/// Adjusted knobs: `worker_count` and `segments_per_worker` capped/scaled by
/// file size, plus the chunk size workers should read in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaledPlan {
    pub worker_count: usize,
    pub segments_per_worker: usize,
    pub read_chunk_size: usize,
}

/// Applies the size-based scaling rules from the segment-plan design:
/// bigger files get more segments per worker and a larger read chunk; small
/// files get fewer workers so they don't over-parallelize.
pub fn apply_dynamic_scaling(inputs: ScalingInputs) -> ScaledPlan {
    let total_size = inputs.total_size;

    let segments_per_worker = if total_size > 10 * GIB {
        800
    } else if total_size > 5 * GIB {
        500
    } else if total_size > GIB {
        300
    } else if total_size > 500 * MIB {
        200
    } else if total_size > 100 * MIB {
        150
    } else {
        inputs.segments_per_worker.max(1)
    };

    let read_chunk_size = if total_size > GIB {
        128 * 1024
    } else if total_size > 100 * MIB {
        64 * 1024
    } else {
        32 * 1024
    };

    let worker_count = if total_size < 10 * MIB {
        inputs.worker_count.min(5)
    } else if total_size < 100 * MIB {
        inputs.worker_count.min(10)
    } else {
        inputs.worker_count
    }
    .min(32)
    .max(1);

    ScaledPlan {
        worker_count,
        segments_per_worker,
        read_chunk_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scale(total_size: u64, worker_count: usize, segments_per_worker: usize) -> ScaledPlan {
        apply_dynamic_scaling(ScalingInputs {
            total_size,
            worker_count,
            segments_per_worker,
        })
    }

    #[test]
    fn small_file_caps_worker_count_and_keeps_caller_segments_per_worker() {
        let p = scale(5 * MIB, 16, 10);
        assert_eq!(p.worker_count, 5);
        assert_eq!(p.segments_per_worker, 10);
        assert_eq!(p.read_chunk_size, 32 * 1024);
    }

    #[test]
    fn medium_file_caps_worker_count_at_ten() {
        let p = scale(50 * MIB, 16, 10);
        assert_eq!(p.worker_count, 10);
        assert_eq!(p.segments_per_worker, 10);
    }

    #[test]
    fn above_100_mib_bumps_segments_per_worker_and_chunk_size() {
        let p = scale(150 * MIB, 4, 10);
        assert_eq!(p.segments_per_worker, 150);
        assert_eq!(p.read_chunk_size, 64 * 1024);
        assert_eq!(p.worker_count, 4);
    }

    #[test]
    fn above_1_gib_bumps_again() {
        let p = scale(2 * GIB, 4, 10);
        assert_eq!(p.segments_per_worker, 300);
        assert_eq!(p.read_chunk_size, 128 * 1024);
    }

    #[test]
    fn above_5_and_10_gib_thresholds() {
        assert_eq!(scale(6 * GIB, 4, 10).segments_per_worker, 500);
        assert_eq!(scale(11 * GIB, 4, 10).segments_per_worker, 800);
    }

    #[test]
    fn worker_count_never_exceeds_32() {
        let p = scale(50 * GIB, 64, 10);
        assert_eq!(p.worker_count, 32);
    }

    #[test]
    fn worker_count_at_least_one() {
        let p = scale(50 * GIB, 0, 10);
        assert_eq!(p.worker_count, 1);
    }
}
