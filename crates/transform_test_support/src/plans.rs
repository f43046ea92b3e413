//! Seeded plans for exercising deferral interleavings.

/// How a stream with deferred tokens is fed and resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolutionPlan {
    /// Input split into chunks of these sizes, in order.
    pub chunk_sizes: Vec<usize>,
    /// Deferral indices in resolution order.
    pub order: Vec<usize>,
    /// Deferrals that first receive a partial result.
    pub partial: Vec<bool>,
    /// Resolutions performed before the end of input is signalled.
    pub resolved_before_end: usize,
    pub summary: String,
}

impl ResolutionPlan {
    /// Everything in one chunk, resolved in stream order after the end.
    pub fn in_order(input_len: usize, deferrals: usize) -> Self {
        Self {
            chunk_sizes: vec![input_len],
            order: (0..deferrals).collect(),
            partial: vec![false; deferrals],
            resolved_before_end: 0,
            summary: format!("in_order len={input_len} deferrals={deferrals}"),
        }
    }

    /// Random chunking, resolution order, partials and end placement.
    pub fn random(input_len: usize, deferrals: usize, seed: u64) -> Self {
        let mut rng = LcgRng::new(seed);
        let chunk_sizes = random_sizes(&mut rng, input_len);
        let mut order: Vec<usize> = (0..deferrals).collect();
        for i in (1..order.len()).rev() {
            let j = rng.gen_index(i + 1);
            order.swap(i, j);
        }
        let partial = (0..deferrals).map(|_| rng.gen_ratio(1, 3)).collect();
        let resolved_before_end = rng.gen_range_usize(0, deferrals + 1);
        let summary = format!(
            "random seed=0x{seed:016x} sizes={chunk_sizes:?} order={order:?} \
             before_end={resolved_before_end}"
        );
        Self {
            chunk_sizes,
            order,
            partial,
            resolved_before_end,
            summary,
        }
    }
}

fn random_sizes(rng: &mut LcgRng, len: usize) -> Vec<usize> {
    if len == 0 {
        return vec![0];
    }
    let mut sizes = Vec::new();
    let mut remaining = len;
    while remaining > 0 {
        let size = rng.gen_range_usize(1, remaining.min(4) + 1);
        sizes.push(size);
        remaining -= size;
    }
    sizes
}

pub struct LcgRng {
    state: u64,
}

impl LcgRng {
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { 0x9e3779b97f4a7c15 } else { seed };
        Self { state }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state
    }

    pub fn gen_range_usize(&mut self, start: usize, end: usize) -> usize {
        assert!(start < end, "invalid range: {start}..{end}");
        let span = (end - start) as u64;
        (self.next_u64() % span) as usize + start
    }

    pub fn gen_index(&mut self, len: usize) -> usize {
        assert!(len > 0, "invalid length: {len}");
        self.gen_range_usize(0, len)
    }

    pub fn gen_ratio(&mut self, numerator: u32, denominator: u32) -> bool {
        assert!(denominator > 0, "invalid denominator: {denominator}");
        let roll = (self.next_u64() % denominator as u64) as u32;
        roll < numerator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_plans_are_reproducible_and_complete() {
        let a = ResolutionPlan::random(17, 5, 42);
        let b = ResolutionPlan::random(17, 5, 42);
        assert_eq!(a, b);
        assert_eq!(a.chunk_sizes.iter().sum::<usize>(), 17);
        let mut order = a.order.clone();
        order.sort_unstable();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        assert!(a.resolved_before_end <= 5);
    }
}
