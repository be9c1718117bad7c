use clap::Parser;

pub mod engine;
pub mod input;

/// Name reported in the job banner.
pub const JOB_NAME: &str = "online-retail-sales-analysis";

pub const DEFAULT_MAPPERS: usize = 4;
pub const DEFAULT_REDUCERS: u32 = 1;
pub const DEFAULT_SPLIT_SIZE: u64 = 64 * 1024 * 1024;
pub const DEFAULT_SPILL_RECORDS: usize = 100_000;

/// Computes total revenue, transaction count and mean revenue per country
/// from a CSV retail transaction log.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Input file, directory or glob spec
    pub input: String,

    /// Output directory, must not exist yet
    pub output: String,

    /// Number of map worker threads
    #[arg(short, long, default_value_t = DEFAULT_MAPPERS as u64,
          value_parser = clap::value_parser!(u64).range(1..=1024))]
    pub mappers: u64,

    /// Number of reduce partitions (one part file each)
    #[arg(short, long, default_value_t = DEFAULT_REDUCERS,
          value_parser = clap::value_parser!(u32).range(1..=10_000))]
    pub reducers: u32,

    /// Maximum size in bytes of one input split
    #[arg(long, default_value_t = DEFAULT_SPLIT_SIZE,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub split_size: u64,

    /// Buffered map output pairs that trigger a combine and spill
    #[arg(long, default_value_t = DEFAULT_SPILL_RECORDS as u64,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub spill_records: u64,

    /// Skip the map-side combiner
    #[arg(long)]
    pub no_combiner: bool,
}

/// Everything the engine needs to run one job.
#[derive(Debug, Clone)]
pub struct Job {
    pub input: String,
    pub output: String,
    pub workload: String,
    pub mappers: usize,
    pub reducers: u32,
    pub split_size: u64,
    pub spill_records: usize,
    pub combine: bool,
}

impl Job {
    /// A sales job with default scheduler settings.
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            workload: crate::workload::SALES.to_owned(),
            mappers: DEFAULT_MAPPERS,
            reducers: DEFAULT_REDUCERS,
            split_size: DEFAULT_SPLIT_SIZE,
            spill_records: DEFAULT_SPILL_RECORDS,
            combine: true,
        }
    }
}

impl From<Args> for Job {
    fn from(args: Args) -> Self {
        Self {
            mappers: args.mappers as usize,
            reducers: args.reducers,
            split_size: args.split_size,
            spill_records: args.spill_records as usize,
            combine: !args.no_combiner,
            ..Job::new(args.input, args.output)
        }
    }
}
