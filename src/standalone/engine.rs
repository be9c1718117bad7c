use anyhow::{bail, Context, Result};
use bytes::Bytes;
use dashmap::DashMap;
use itertools::Itertools;
use log::{debug, info, warn};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use uuid::Uuid;

use crate::counters::{CounterRegistry, Counters};
use crate::standalone::input::{self, InputSplit};
use crate::standalone::Job;
use crate::utils::offset_to_bytes;
use crate::*;

// types related to this engine
type BucketIndex = u32;
type Buckets = DashMap<BucketIndex, Vec<KeyValue>>;

/// Staging directory for part files until the job commits.
pub const TEMP_DIR: &str = "_temporary";
pub const SUCCESS_MARKER: &str = "_SUCCESS";
pub const COUNTERS_FILE: &str = "_counters.json";

/// What a successful job leaves behind.
#[derive(Debug)]
pub struct JobSummary {
    pub job_id: String,
    pub output: PathBuf,
    pub part_files: Vec<PathBuf>,
    pub counters: CounterRegistry,
}

/// Runs `job` to completion and commits its output.
///
/// The output directory must not exist. If any stage fails, the output
/// directory is removed again so that nothing partial is left behind.
pub fn run_job(job: &Job) -> Result<JobSummary> {
    let engine = workload::named(&job.workload)?;
    let job_id = format!("job_local_{}", Uuid::new_v4().simple());
    let output = PathBuf::from(&job.output);

    if output.exists() {
        bail!("Output directory {} already exists", output.display());
    }
    let staging = output.join(TEMP_DIR);
    fs::create_dir_all(&staging)
        .with_context(|| format!("creating output directory {}", output.display()))?;
    info!("{}: running workload `{}`", job_id, engine.name);

    let counters = CounterRegistry::new();
    let result = perform_map(job, &engine, &counters)
        .and_then(|buckets| perform_reduce(job, &engine, &counters, &buckets, &staging))
        .and_then(|parts| commit(&output, &staging, &parts, &counters));

    match result {
        Ok(part_files) => {
            info!("{}: committed {} part files", job_id, part_files.len());
            Ok(JobSummary {
                job_id,
                output,
                part_files,
                counters,
            })
        }
        Err(e) => {
            if let Err(cleanup) = fs::remove_dir_all(&output) {
                warn!(
                    "{}: could not remove output directory {}: {}",
                    job_id,
                    output.display(),
                    cleanup
                );
            }
            Err(e)
        }
    }
}

/// Maps every input split in parallel and shuffles the (combined) map
/// output into reduce buckets by `ihash(key) % reducers`.
pub fn perform_map(job: &Job, engine: &Workload, counters: &CounterRegistry) -> Result<Buckets> {
    let files = input::list_inputs(&job.input)?;
    let splits = input::plan_splits(&files, job.split_size)?;
    info!(
        "map: {} splits over {} input files, {} threads",
        splits.len(),
        files.len(),
        job.mappers
    );

    let buckets: Buckets = Buckets::new();
    let pool = ThreadPoolBuilder::new().num_threads(job.mappers).build()?;
    pool.install(|| {
        splits
            .par_iter()
            .try_for_each(|split| map_split(job, engine, counters, split, &buckets))
    })?;

    Ok(buckets)
}

fn map_split(
    job: &Job,
    engine: &Workload,
    counters: &dyn Counters,
    split: &InputSplit,
    buckets: &Buckets,
) -> Result<()> {
    let mut buffer: Vec<KeyValue> = Vec::new();
    let mut lines = 0u64;
    let mut spills = 0u32;

    for line in split.open()? {
        let (offset, line) = line.with_context(|| format!("reading split {}", split))?;
        lines += 1;
        let map_func = engine.map_fn;
        for item in map_func(KeyValue::new(offset_to_bytes(offset), line), counters)? {
            buffer.push(item?);
        }

        if engine.combine_fn.is_some() && job.combine && buffer.len() >= job.spill_records {
            spill(job, engine, counters, std::mem::take(&mut buffer), buckets)?;
            spills += 1;
        }
    }
    if !buffer.is_empty() {
        spill(job, engine, counters, buffer, buckets)?;
        spills += 1;
    }

    debug!("map split {}: {} lines, {} spills", split, lines, spills);
    Ok(())
}

/// Runs the combiner over `pairs` (when enabled) and hands the result to
/// the reduce buckets.
fn spill(
    job: &Job,
    engine: &Workload,
    counters: &dyn Counters,
    pairs: Vec<KeyValue>,
    buckets: &Buckets,
) -> Result<()> {
    let pairs = match engine.combine_fn {
        Some(combine_func) if job.combine => combine_pairs(combine_func, pairs, counters)?,
        _ => pairs,
    };

    for (bucket_no, kvs) in pairs
        .into_iter()
        .into_group_map_by(|kv| ihash(&kv.key) % job.reducers)
    {
        #[allow(clippy::unwrap_or_default)]
        buckets.entry(bucket_no).or_insert(Vec::new()).extend(kvs);
    }
    Ok(())
}

/// Groups `pairs` by key and folds each group with `combine_func`.
pub fn combine_pairs(
    combine_func: ReduceFn,
    mut pairs: Vec<KeyValue>,
    counters: &dyn Counters,
) -> Result<Vec<KeyValue>> {
    pairs.sort_unstable_by_key(KeyValue::key);
    let mut combined = Vec::new();
    for (key, value_group) in &pairs.into_iter().chunk_by(KeyValue::key) {
        let iter = value_group.map(KeyValue::into_value);
        let value = combine_func(key.clone(), Box::new(iter), counters)?;
        combined.push(KeyValue::new(key, value));
    }
    Ok(combined)
}

/// Threads for the reduce phase: one per partition, capped by the
/// configured parallelism. `reducers` only sets the partition count.
pub fn reduce_threads(job: &Job) -> usize {
    (job.reducers as usize).min(job.mappers).max(1)
}

/// Reduces every bucket in parallel, writing one staged part file per
/// reduce partition. Returns the part file names.
pub fn perform_reduce(
    job: &Job,
    engine: &Workload,
    counters: &CounterRegistry,
    buckets: &Buckets,
    staging: &Path,
) -> Result<Vec<String>> {
    let threads = reduce_threads(job);
    info!("reduce: {} partitions, {} threads", job.reducers, threads);
    let pool = ThreadPoolBuilder::new().num_threads(threads).build()?;
    pool.install(|| {
        (0..job.reducers)
            .into_par_iter()
            .map(|reduce_id| {
                let bkt = buckets
                    .remove(&reduce_id)
                    .map(|(_, kvs)| kvs)
                    .unwrap_or_default();
                reduce_partition(engine, counters, reduce_id, bkt, staging)
            })
            .collect()
    })
}

pub fn part_name(reduce_id: BucketIndex) -> String {
    format!("part-r-{:05}", reduce_id)
}

fn reduce_partition(
    engine: &Workload,
    counters: &dyn Counters,
    reduce_id: BucketIndex,
    mut bkt: Vec<KeyValue>,
    staging: &Path,
) -> Result<String> {
    let name = part_name(reduce_id);
    let out_pathspec = staging.join(&name);
    let mut out_file = BufWriter::new(
        File::create(&out_pathspec)
            .with_context(|| format!("creating {}", out_pathspec.display()))?,
    );

    let reduce_func = engine.reduce_fn;
    let format_func = engine.format_fn;
    let mut keys = 0usize;
    // Sort so that each key's values are adjacent; part files come out ordered by key.
    bkt.sort_unstable_by_key(KeyValue::key);
    for (key, value_group) in &bkt.into_iter().chunk_by(KeyValue::key) {
        let iter = value_group.map(KeyValue::into_value);
        let out: Bytes = reduce_func(key.clone(), Box::new(iter), counters)?;
        out_file.write_all(&format_func(&key, &out)?)?;
        keys += 1;
    }
    out_file
        .flush()
        .with_context(|| format!("writing {}", out_pathspec.display()))?;

    info!("reduce {}: {} keys", name, keys);
    Ok(name)
}

/// Moves staged part files into `output`, then writes the counters file
/// and the success marker.
fn commit(
    output: &Path,
    staging: &Path,
    parts: &[String],
    counters: &CounterRegistry,
) -> Result<Vec<PathBuf>> {
    let mut committed = Vec::with_capacity(parts.len());
    for name in parts {
        let dest = output.join(name);
        fs::rename(staging.join(name), &dest)
            .with_context(|| format!("committing {}", dest.display()))?;
        committed.push(dest);
    }
    fs::remove_dir_all(staging)?;

    fs::write(
        output.join(COUNTERS_FILE),
        serde_json::to_vec_pretty(&counters.snapshot())?,
    )?;
    File::create(output.join(SUCCESS_MARKER))?;
    Ok(committed)
}
