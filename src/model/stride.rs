/// Distribute the pooling strides of `nb_layers` convolutional stages so that
/// repeated pooling reduces the feature axis of width `nb_features` exactly
/// to 1.
///
/// Returns `(pool_sizes, strides)`, one `[height, width]` pair per stage. The
/// product of the stride widths always equals `nb_features`: the prime
/// factors of the width are dealt out to the stages largest-first, and any
/// leftover factors are multiplied back in round-robin. Widths with fewer
/// factors than stages pad the remaining stages with stride 1.
pub fn pool_strides(nb_features: usize, nb_layers: usize) -> (Vec<[usize; 2]>, Vec<[usize; 2]>) {
    let mut factors = Vec::new();
    let mut remaining = nb_features;

    for divisor in 2..=nb_features {
        while remaining % divisor == 0 {
            remaining /= divisor;
            factors.push(divisor);
        }
    }

    factors.sort_unstable_by(|a, b| b.cmp(a));

    let mut candidates: Vec<usize> = factors.iter().take(nb_layers).copied().collect();
    let leftover = factors.split_off(candidates.len().min(factors.len()));
    candidates.resize(nb_layers, 1);

    // Leftover factors are still descending; fold each into the next stage
    // slot so none of the width is lost.
    for (i, factor) in leftover.into_iter().enumerate() {
        candidates[i % nb_layers] *= factor;
    }

    let mut pool_sizes = Vec::with_capacity(nb_layers);
    let mut strides = Vec::with_capacity(nb_layers);

    for candidate in candidates {
        pool_sizes.push([(candidate / 2).max(1), candidate]);
        strides.push([1, candidate]);
    }

    (pool_sizes, strides)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stride_product(strides: &[[usize; 2]]) -> usize {
        strides.iter().map(|s| s[1]).product()
    }

    #[test]
    fn power_of_two_width() {
        let (pool_sizes, strides) = pool_strides(1024, 4);

        assert_eq!(strides, vec![[1, 8], [1, 8], [1, 4], [1, 4]]);
        assert_eq!(pool_sizes, vec![[4, 8], [4, 8], [2, 4], [2, 4]]);
        assert_eq!(stride_product(&strides), 1024);
    }

    #[test]
    fn mixed_factors() {
        let (pool_sizes, strides) = pool_strides(60, 4);

        assert_eq!(strides, vec![[1, 5], [1, 3], [1, 2], [1, 2]]);
        assert_eq!(pool_sizes, vec![[2, 5], [1, 3], [1, 2], [1, 2]]);
        assert_eq!(stride_product(&strides), 60);
    }

    #[test]
    fn stride_product_recovers_width() {
        for width in 1..=512 {
            for layers in 1..=4 {
                let (pool_sizes, strides) = pool_strides(width, layers);
                assert_eq!(strides.len(), layers);
                assert_eq!(pool_sizes.len(), layers);
                assert_eq!(stride_product(&strides), width, "width={width} layers={layers}");
            }
        }
    }

    #[test]
    fn prime_width_pads_with_unit_strides() {
        let (pool_sizes, strides) = pool_strides(7, 4);

        assert_eq!(strides, vec![[1, 7], [1, 1], [1, 1], [1, 1]]);
        // Degenerate stages still carry a valid pooling window.
        assert_eq!(pool_sizes, vec![[3, 7], [1, 1], [1, 1], [1, 1]]);
    }

    #[test]
    fn width_one() {
        let (pool_sizes, strides) = pool_strides(1, 4);
        assert_eq!(strides, vec![[1, 1]; 4]);
        assert_eq!(pool_sizes, vec![[1, 1]; 4]);
    }

    #[test]
    fn deterministic() {
        assert_eq!(pool_strides(360, 4), pool_strides(360, 4));
    }
}
