use clap::Parser;
use log::error;
use salesmr::counters::report;
use salesmr::standalone::engine::{run_job, JobSummary};
use salesmr::standalone::{Args, Job, JOB_NAME};
use std::process::ExitCode;

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init()
}

fn print_banner(job: &Job) {
    println!("=== Online Retail Sales Analysis Job Configuration ===");
    println!("Input path: {}", job.input);
    println!("Output path: {}", job.output);
    println!("Job name: {}", JOB_NAME);
    println!("======================================================");
}

fn print_summary(summary: &JobSummary) {
    println!();
    println!("=== Job Completed Successfully ===");
    println!("Job ID: {}", summary.job_id);
    println!();
    println!("{}", report(&summary.counters));
    println!();
    println!("=== Results Location ===");
    for part in &summary.part_files {
        println!("Output available at: {}", part.display());
    }
    println!("========================");
}

fn main() -> ExitCode {
    // Usage errors exit with status 2 from inside clap.
    let job = Job::from(Args::parse());
    init_logger();
    print_banner(&job);

    match run_job(&job) {
        Ok(summary) => {
            print_summary(&summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Job failed!");
            ExitCode::from(1)
        }
    }
}
