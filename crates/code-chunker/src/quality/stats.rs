use crate::types::Chunk;

/// Share of the mean chunk size used as the rebalancing target
const TARGET_RATIO: f64 = 0.8;

pub fn mean(values: &[usize]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<usize>() as f64 / values.len() as f64
}

pub fn std_dev(values: &[usize]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values
        .iter()
        .map(|&v| {
            let d = v as f64 - m;
            d * d
        })
        .sum::<f64>()
        / values.len() as f64;
    variance.sqrt()
}

/// Standard deviation relative to the mean; zero for empty or all-zero input
pub fn coefficient_of_variation(values: &[usize]) -> f64 {
    let m = mean(values);
    if m <= 0.0 {
        0.0
    } else {
        std_dev(values) / m
    }
}

pub fn chunk_sizes(chunks: &[Chunk]) -> Vec<usize> {
    chunks.iter().map(Chunk::len).collect()
}

/// `clamp(0.8 * mean, min, max)`
pub fn target_size(sizes: &[usize], min: usize, max: usize) -> usize {
    let raw = (mean(sizes) * TARGET_RATIO).round() as usize;
    raw.clamp(min.min(max), max)
}
