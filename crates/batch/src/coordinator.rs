//! Groups files by strategy kind and runs each group in adaptive batches.

use crate::classify::{adaptive_batch_size, GroupProfile, StrategyKind};
use crate::error::BatchError;
use crate::result::{BatchOptions, BatchResult, BatchStats};
use chunkflow_code_chunker::{FileFeatures, FileInput, ProcessingResult};
use chunkflow_guard::ProcessingGuard;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

/// Files whose features are measured to profile a group
const PROFILE_SAMPLE: usize = 10;

const UNGROUPED: &str = "all";

struct Group {
    label: String,
    kind: StrategyKind,
    indices: Vec<usize>,
}

/// Identity of a request slot, kept to report a task that never finished
struct Slot {
    language: String,
    file_path: Option<String>,
}

/// Runs many files through one [`ProcessingGuard`].
///
/// Groups run one after another; the files of a batch run concurrently up
/// to the concurrency limit. Results come back in request order.
#[derive(Debug, Clone)]
pub struct BatchCoordinator {
    guard: Arc<ProcessingGuard>,
}

impl BatchCoordinator {
    pub fn new(guard: Arc<ProcessingGuard>) -> Self {
        Self { guard }
    }

    pub fn guard(&self) -> &Arc<ProcessingGuard> {
        &self.guard
    }

    /// Process `files` group by group and batch by batch.
    ///
    /// Concurrency only spans the files of the current batch; the next batch
    /// starts once every file of the previous one has finished.
    pub async fn process_batch(&self, files: Vec<FileInput>, options: BatchOptions) -> BatchResult {
        let started = Instant::now();
        let config = self.guard.coordinator().config_store().snapshot();
        let concurrency = options
            .concurrency_limit
            .unwrap_or(config.performance.concurrency_limit)
            .max(1);
        let cap = options.batch_size.unwrap_or(config.performance.batch_size);

        let slots: Vec<Slot> = files
            .iter()
            .map(|f| Slot {
                language: f.language.clone(),
                file_path: f.file_path.clone(),
            })
            .collect();
        let groups = group_files(&files, options.group_by_strategy);
        let mut pending: Vec<Option<FileInput>> = files.into_iter().map(Some).collect();
        let mut results: Vec<Option<ProcessingResult>> = vec![None; pending.len()];
        let mut batches = Vec::new();
        let semaphore = Arc::new(Semaphore::new(concurrency));

        for group in groups {
            let profile = profile_group(&group, &mut pending);
            let batch_size = adaptive_batch_size(group.kind, profile, Some(cap));
            log::debug!(
                "Group '{}': {} files, batch size {batch_size} ({:.0} bytes avg, complexity {:.1})",
                group.label,
                group.indices.len(),
                profile.avg_size,
                profile.avg_complexity
            );

            for (batch_index, batch) in group.indices.chunks(batch_size).enumerate() {
                let batch_started = Instant::now();
                let mut handles = Vec::with_capacity(batch.len());
                for &index in batch {
                    let Some(input) = pending[index].take() else {
                        continue;
                    };
                    let guard = Arc::clone(&self.guard);
                    let semaphore = Arc::clone(&semaphore);
                    handles.push((
                        index,
                        tokio::spawn(async move {
                            // The semaphore is never closed; acquire failures are not expected.
                            let _permit = semaphore
                                .acquire_owned()
                                .await
                                .unwrap_or_else(|_| unreachable!("batch semaphore closed"));
                            guard.process_file(input).await
                        }),
                    ));
                }

                let mut stats = BatchStats {
                    group: group.label.clone(),
                    batch_index,
                    size: batch.len(),
                    duration_ms: 0,
                    success_count: 0,
                    failure_count: 0,
                };
                for (index, handle) in handles {
                    let result = match handle.await {
                        Ok(result) => result,
                        Err(join) => {
                            let err = BatchError::from(join);
                            log::error!("{err}");
                            failed_result(&slots[index], &err)
                        }
                    };
                    if result.success {
                        stats.success_count += 1;
                    } else {
                        stats.failure_count += 1;
                    }
                    results[index] = Some(result);
                }
                stats.duration_ms = elapsed_ms(batch_started);
                log::debug!(
                    "Batch {}#{} done: {} ok, {} failed in {} ms",
                    stats.group,
                    stats.batch_index,
                    stats.success_count,
                    stats.failure_count,
                    stats.duration_ms
                );
                batches.push(stats);
            }
        }

        let results: Vec<ProcessingResult> = results
            .into_iter()
            .zip(&slots)
            .map(|(result, slot)| {
                result.unwrap_or_else(|| failed_result(slot, &BatchError::Join("file was not scheduled".into())))
            })
            .collect();
        let success_count = results.iter().filter(|r| r.success).count();
        let failure_count = results.len() - success_count;
        let total_duration_ms = elapsed_ms(started);

        log::info!(
            "Processed {} files in {} batches: {success_count} ok, {failure_count} failed ({total_duration_ms} ms)",
            results.len(),
            batches.len()
        );

        BatchResult {
            results,
            success_count,
            failure_count,
            batches,
            total_duration_ms,
        }
    }
}

/// Groups in order of first appearance
fn group_files(files: &[FileInput], by_strategy: bool) -> Vec<Group> {
    if !by_strategy {
        return vec![Group {
            label: UNGROUPED.to_string(),
            kind: StrategyKind::Line,
            indices: (0..files.len()).collect(),
        }];
    }

    let mut groups: Vec<Group> = Vec::new();
    for (index, file) in files.iter().enumerate() {
        let kind = StrategyKind::classify(&file.language, file.file_path.as_deref());
        match groups.iter_mut().find(|g| g.kind == kind) {
            Some(group) => group.indices.push(index),
            None => groups.push(Group {
                label: kind.as_str().to_string(),
                kind,
                indices: vec![index],
            }),
        }
    }
    groups
}

/// Measure a sample of the group; measured features are handed on to the
/// files so they are not derived twice
#[allow(clippy::cast_precision_loss)]
fn profile_group(group: &Group, pending: &mut [Option<FileInput>]) -> GroupProfile {
    let mut total_size = 0usize;
    let mut total_complexity = 0u64;
    let mut sampled = 0usize;

    for &index in group.indices.iter().take(PROFILE_SAMPLE) {
        let Some(input) = pending[index].as_mut() else {
            continue;
        };
        if input.features.is_none() {
            input.features = Some(FileFeatures::detect(
                &input.content,
                &input.language,
                input.file_path.as_deref(),
            ));
        }
        total_size += input.content.len();
        total_complexity += input.features.as_ref().map_or(0, |f| u64::from(f.complexity));
        sampled += 1;
    }

    if sampled == 0 {
        return GroupProfile::default();
    }
    GroupProfile {
        avg_size: total_size as f64 / sampled as f64,
        avg_complexity: total_complexity as f64 / sampled as f64,
    }
}

fn failed_result(slot: &Slot, err: &BatchError) -> ProcessingResult {
    ProcessingResult::new(Vec::new(), "none", slot.language.clone(), slot.file_path.clone()).with_error(err.to_string())
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn file(path: &str) -> FileInput {
        FileInput::new("x = 1\n", "").with_path(path)
    }

    #[test]
    fn groups_keep_first_appearance_order() {
        let files = vec![file("a.py"), file("b.css"), file("c.rs"), file("d.css"), file("e.txt")];
        let groups = group_files(&files, true);
        let summary: Vec<(&str, Vec<usize>)> = groups.iter().map(|g| (g.label.as_str(), g.indices.clone())).collect();
        assert_eq!(
            summary,
            vec![("ast", vec![0, 2]), ("style", vec![1, 3]), ("line", vec![4])]
        );
    }

    #[test]
    fn ungrouped_is_a_single_group() {
        let files = vec![file("a.py"), file("b.css")];
        let groups = group_files(&files, false);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].label, "all");
        assert_eq!(groups[0].indices, vec![0, 1]);
    }

    #[test]
    fn profiling_fills_in_features() {
        let files = vec![
            FileInput::new("fn a() { if x { y() } }\n", "rust"),
            FileInput::new("fn b() {}\n", "rust"),
        ];
        let group = Group {
            label: "ast".into(),
            kind: StrategyKind::Ast,
            indices: vec![0, 1],
        };
        let mut pending: Vec<Option<FileInput>> = files.into_iter().map(Some).collect();
        let profile = profile_group(&group, &mut pending);

        assert!(profile.avg_size > 10.0);
        assert!(profile.avg_complexity >= 1.0);
        assert!(pending.iter().flatten().all(|f| f.features.is_some()));
    }
}
