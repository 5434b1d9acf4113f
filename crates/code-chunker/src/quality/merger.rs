use crate::types::{Chunk, ChunkMetadata, ChunkType, SourceText};

const SAME_TYPE_WEIGHT: f64 = 0.3;
const COMPATIBLE_TYPE_WEIGHT: f64 = 0.15;
const COMPLEXITY_WEIGHT: f64 = 0.2;
const SIZE_WEIGHT: f64 = 0.2;
const DISTANCE_WEIGHT: f64 = 0.3;

/// Separator used when merged content cannot be rebuilt from the source
const MERGE_SEPARATOR: &str = "\n\n";

/// Exact match, or both types in the same family
pub fn types_compatible(a: ChunkType, b: ChunkType) -> bool {
    use ChunkType::{Class, Code, Function, Generic, Interface, Merged, Method, OverlapSplit};

    a == b
        || matches!(
            (a, b),
            (Function | Method, Function | Method)
                | (Class | Interface, Class | Interface)
                | (Code | Generic | Merged | OverlapSplit, Code | Generic | Merged | OverlapSplit)
        )
}

/// Lines strictly between two chunks; negative when they overlap
pub fn line_gap(a: &Chunk, b: &Chunk) -> i64 {
    b.start_line() as i64 - a.end_line() as i64 - 1
}

/// Weighted similarity of two chunks in `[0, 1]`.
///
/// Type agreement, complexity ratio, size ratio and line distance each add a
/// capped share of the total.
pub fn chunk_similarity(a: &Chunk, b: &Chunk) -> f64 {
    let type_score = if a.chunk_type() == b.chunk_type() {
        SAME_TYPE_WEIGHT
    } else if types_compatible(a.chunk_type(), b.chunk_type()) {
        COMPATIBLE_TYPE_WEIGHT
    } else {
        0.0
    };

    let complexity_score = ratio(a.metadata.complexity as f64, b.metadata.complexity as f64) * COMPLEXITY_WEIGHT;
    let size_score = ratio(a.len() as f64, b.len() as f64) * SIZE_WEIGHT;
    let gap = line_gap(a, b).max(0) as f64;
    let distance_score = DISTANCE_WEIGHT / (1.0 + gap);

    (type_score + complexity_score + size_score + distance_score).clamp(0.0, 1.0)
}

/// `min / max`, with two zeros counting as identical
fn ratio(a: f64, b: f64) -> f64 {
    let hi = a.max(b);
    if hi <= 0.0 {
        1.0
    } else {
        a.min(b) / hi
    }
}

/// Collapse a run of chunks into one.
///
/// With a source whose lines every member reproduces exactly, the merged
/// content is the source slice of the union range, so gap lines are kept and
/// overlapping lines appear once. Otherwise member contents are joined with a
/// blank line, dropping lines a member repeats from its predecessor.
pub fn merge_chunks(chunks: &[Chunk], source: Option<&SourceText<'_>>) -> Option<Chunk> {
    let first = chunks.first()?;
    if chunks.len() == 1 {
        return Some(first.clone());
    }

    let start = chunks.iter().map(Chunk::start_line).min().unwrap_or(1);
    let end = chunks.iter().map(Chunk::end_line).max().unwrap_or(start);

    let content = match source {
        Some(src) if chunks.iter().all(|c| src.matches(c)) => src.slice(start, end),
        _ => join_without_repeats(chunks),
    };

    let mut merged_types: Vec<ChunkType> = Vec::new();
    for chunk in chunks {
        let own = if chunk.metadata.merged_types.is_empty() {
            vec![chunk.chunk_type()]
        } else {
            chunk.metadata.merged_types.clone()
        };
        for t in own {
            if !merged_types.contains(&t) {
                merged_types.push(t);
            }
        }
    }
    let chunk_type = if chunks.iter().all(|c| c.chunk_type() == first.chunk_type()) {
        first.chunk_type()
    } else {
        ChunkType::Merged
    };

    let mut metadata = ChunkMetadata::new(start, end, first.metadata.language.clone(), first.metadata.strategy.clone())
        .chunk_type(chunk_type)
        .file_path(first.metadata.file_path.clone());
    metadata.function_name = chunks.iter().find_map(|c| c.metadata.function_name.clone());
    metadata.class_name = chunks.iter().find_map(|c| c.metadata.class_name.clone());
    metadata.overlap_applied = chunks.iter().any(|c| c.metadata.overlap_applied);
    if chunk_type == ChunkType::Merged {
        metadata.merged_types = merged_types;
    }

    let mut merged = Chunk::new(content, metadata);
    merged.metadata.complexity = chunks.iter().map(|c| c.metadata.complexity).sum();
    Some(merged)
}

fn join_without_repeats(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    let mut covered_to = 0usize;

    for chunk in chunks {
        let lines: Vec<&str> = chunk.content.lines().collect();
        let skip = if covered_to >= chunk.start_line() {
            (covered_to - chunk.start_line() + 1).min(lines.len())
        } else {
            0
        };
        let rest = lines[skip..].join("\n");
        if !rest.is_empty() {
            if !out.is_empty() {
                out.push_str(MERGE_SEPARATOR);
            }
            out.push_str(&rest);
        }
        covered_to = covered_to.max(chunk.end_line());
    }
    out
}

/// Split a chunk into pieces of at most `target` characters.
///
/// Lines are accumulated greedily; a single-line chunk is cut by characters.
/// A single line longer than `target` still becomes its own piece.
pub fn split_chunk(chunk: &Chunk, target: usize) -> Vec<Chunk> {
    let target = target.max(1);
    if chunk.len() <= target {
        return vec![chunk.clone()];
    }

    let lines: Vec<&str> = chunk.content.lines().collect();
    if lines.len() <= 1 {
        return split_by_chars(chunk, target);
    }

    let line_no = |idx: usize| (chunk.start_line() + idx).min(chunk.end_line());
    let mut pieces = Vec::new();
    let mut piece_start = 0usize;
    let mut piece_len = 0usize;

    for (idx, line) in lines.iter().enumerate() {
        let len = line.chars().count();
        let grown = if idx == piece_start { len } else { piece_len + 1 + len };
        if idx > piece_start && grown > target {
            pieces.push(piece(chunk, &lines[piece_start..idx], line_no(piece_start), line_no(idx - 1)));
            piece_start = idx;
            piece_len = len;
        } else {
            piece_len = grown;
        }
    }
    pieces.push(piece(chunk, &lines[piece_start..], line_no(piece_start), line_no(lines.len() - 1)));
    pieces
}

fn split_by_chars(chunk: &Chunk, target: usize) -> Vec<Chunk> {
    let chars: Vec<char> = chunk.content.chars().collect();
    chars
        .chunks(target)
        .map(|part| {
            let text: String = part.iter().collect();
            let mut metadata = chunk.metadata.clone();
            metadata.merged_types.clear();
            Chunk::new(text, metadata)
        })
        .collect()
}

fn piece(chunk: &Chunk, lines: &[&str], start: usize, end: usize) -> Chunk {
    let mut metadata = chunk.metadata.clone();
    metadata.start_line = start;
    metadata.end_line = end;
    Chunk::new(lines.join("\n"), metadata)
}
