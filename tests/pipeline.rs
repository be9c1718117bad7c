use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use salesmr::counters::{CounterRegistry, MapperCounter, ReducerCounter};
use salesmr::standalone::engine::{run_job, JobSummary, COUNTERS_FILE, SUCCESS_MARKER, TEMP_DIR};
use salesmr::standalone::Job;
use tempfile::TempDir;

const HEADER: &str =
    "InvoiceNo,StockCode,Description,Quantity,InvoiceDate,UnitPrice,CustomerID,Country";

/// country -> (revenue, count, mean) as rendered in the part files.
type Rows = BTreeMap<String, (String, i64, String)>;

fn run_with(input: &str, configure: impl FnOnce(&mut Job)) -> (TempDir, JobSummary, Rows) {
    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("online_retail.csv");
    fs::write(&input_path, input).unwrap();

    let mut job = Job::new(
        input_path.to_str().unwrap(),
        dir.path().join("out").to_str().unwrap(),
    );
    configure(&mut job);
    let summary = run_job(&job).unwrap();
    let rows = read_rows(&summary.output);
    (dir, summary, rows)
}

fn run(input: &str) -> (TempDir, JobSummary, Rows) {
    run_with(input, |_| {})
}

fn read_rows(output: &Path) -> Rows {
    let mut rows = Rows::new();
    for entry in fs::read_dir(output).unwrap() {
        let path = entry.unwrap().path();
        let name = path.file_name().unwrap().to_str().unwrap().to_owned();
        if !name.starts_with("part-r-") {
            continue;
        }
        for line in fs::read_to_string(&path).unwrap().lines() {
            let fields: Vec<&str> = line.split('\t').collect();
            assert_eq!(fields.len(), 4, "bad output line {:?}", line);
            let previous = rows.insert(
                fields[0].to_owned(),
                (
                    fields[1].to_owned(),
                    fields[2].parse().unwrap(),
                    fields[3].to_owned(),
                ),
            );
            assert!(previous.is_none(), "country {} written twice", fields[0]);
        }
    }
    rows
}

fn mapper(counters: &CounterRegistry, counter: MapperCounter) -> i64 {
    counters.mapper(counter)
}

fn mapper_total(counters: &CounterRegistry) -> i64 {
    MapperCounter::ALL.iter().map(|c| counters.mapper(*c)).sum()
}

#[test]
fn happy_path() {
    let input = format!(
        "{}\n{}\n{}\n{}\n",
        HEADER,
        "536365,85123A,WHITE HANGING,6,2010-12-01 08:26,2.55,17850,United Kingdom",
        "536366,22423,GLASS JAR,2,2010-12-01 08:28,12.75,17850,United Kingdom",
        "536367,84029,KNITTED UNION,8,2010-12-01 08:34,1.85,17850,France",
    );
    let (_dir, summary, rows) = run(&input);

    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows["United Kingdom"],
        ("40.80".to_owned(), 2, "20.40".to_owned())
    );
    assert_eq!(rows["France"], ("14.80".to_owned(), 1, "14.80".to_owned()));

    let counters = &summary.counters;
    assert_eq!(mapper(counters, MapperCounter::ValidTransactionsProcessed), 3);
    assert_eq!(mapper(counters, MapperCounter::CancelledTransactions), 0);
    assert_eq!(counters.reducer(ReducerCounter::CountriesProcessed), 2);
    assert_eq!(counters.reducer(ReducerCounter::TotalTransactions), 3);
    assert_eq!(counters.reducer(ReducerCounter::TotalRevenueCents), 5560);
    assert_eq!(mapper_total(counters), 3);
}

#[test]
fn output_lines_match_exactly() {
    let (_dir, summary, _) =
        run("536367,84029,KNITTED UNION,8,2010-12-01 08:34,1.85,17850,France\n");
    let part = fs::read_to_string(&summary.part_files[0]).unwrap();
    assert_eq!(part, "France\t14.80\t1\t14.80\n");
}

#[test]
fn single_line_scenarios() {
    let cases = [
        ("C536365,X,Y,1,D,10.00,17850,France", MapperCounter::CancelledTransactions),
        ("536365,X,Y,-3,D,10.00,17850,France", MapperCounter::InvalidQuantityOrPrice),
        ("536365,X,Y,3,D,10.00,17850,", MapperCounter::MissingRequiredFields),
        ("536365,X,Y", MapperCounter::InvalidRecordLength),
    ];
    for (line, expected) in cases {
        let (_dir, summary, rows) = run(&format!("{}\n", line));
        assert!(rows.is_empty(), "{} emitted output", line);
        assert_eq!(mapper(&summary.counters, expected), 1, "{}", line);
        assert_eq!(mapper_total(&summary.counters), 1, "{}", line);
        assert_eq!(summary.counters.reducer(ReducerCounter::CountriesProcessed), 0);
    }
}

#[test]
fn quoted_description_with_comma() {
    let (_dir, summary, rows) = run("536365,X,\"A, big jar\",2,D,5.00,17850,Germany\n");
    assert_eq!(rows["Germany"], ("10.00".to_owned(), 1, "10.00".to_owned()));
    assert_eq!(
        mapper(&summary.counters, MapperCounter::ValidTransactionsProcessed),
        1
    );
}

#[test]
fn header_elsewhere_is_a_bad_record() {
    let input = format!(
        "{}\n536365,X,Y,1,D,2.00,17850,Spain\n{}\n",
        HEADER, HEADER
    );
    let (_dir, summary, rows) = run(&input);
    assert_eq!(rows.len(), 1);
    assert_eq!(mapper(&summary.counters, MapperCounter::InvalidNumericValues), 1);
    assert_eq!(mapper_total(&summary.counters), 2);
}

#[test]
fn broken_lines_do_not_stop_the_job() {
    let mut input = b"536365,X,Y,1,D,2.00,17850,Spain\n".to_vec();
    input.extend_from_slice(b"536366,X,\xff\xfe,1,D,2.00,17850,Spain\n");
    input.extend_from_slice(b"536367,X,Y,10,D,1e308,17850,Spain\n");
    input.extend_from_slice(b"536368,X,Y,3,D,1.50,17850,Spain\r\n");

    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("dirty.csv");
    fs::write(&input_path, input).unwrap();
    let job = Job::new(
        input_path.to_str().unwrap(),
        dir.path().join("out").to_str().unwrap(),
    );
    let summary = run_job(&job).unwrap();
    let rows = read_rows(&summary.output);

    assert_eq!(rows["Spain"], ("6.50".to_owned(), 2, "3.25".to_owned()));
    assert_eq!(mapper(&summary.counters, MapperCounter::ProcessingErrors), 2);
    assert_eq!(mapper_total(&summary.counters), 4);
}

#[test]
fn committed_output_layout() {
    let (_dir, summary, _) = run_with("1,X,Y,1,D,1.0,17850,France\n", |job| job.reducers = 3);

    assert!(summary.output.join(SUCCESS_MARKER).is_file());
    assert!(!summary.output.join(TEMP_DIR).exists());
    assert_eq!(summary.part_files.len(), 3);
    for (i, part) in summary.part_files.iter().enumerate() {
        assert_eq!(
            part.file_name().unwrap().to_str().unwrap(),
            format!("part-r-{:05}", i)
        );
        assert!(part.is_file());
    }

    let counters: serde_json::Value =
        serde_json::from_slice(&fs::read(summary.output.join(COUNTERS_FILE)).unwrap()).unwrap();
    let valid = counters
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["name"] == "VALID_TRANSACTIONS_PROCESSED")
        .unwrap();
    assert_eq!(valid["group"], "SALES_MAPPER");
    assert_eq!(valid["value"], 1);
}

#[test]
fn every_file_in_a_directory_may_carry_a_header() {
    let dir = tempfile::tempdir().unwrap();
    let input_dir = dir.path().join("input");
    fs::create_dir(&input_dir).unwrap();
    fs::write(
        input_dir.join("2010.csv"),
        format!("{}\n1,X,Y,2,D,1.25,17850,EIRE\n", HEADER),
    )
    .unwrap();
    fs::write(
        input_dir.join("2011.csv"),
        format!("{}\n2,X,Y,1,D,0.50,17850,EIRE\n", HEADER),
    )
    .unwrap();

    let job = Job::new(
        input_dir.to_str().unwrap(),
        dir.path().join("out").to_str().unwrap(),
    );
    let summary = run_job(&job).unwrap();
    let rows = read_rows(&summary.output);

    assert_eq!(rows["EIRE"], ("3.00".to_owned(), 2, "1.50".to_owned()));
    assert_eq!(mapper_total(&summary.counters), 2);
}

/// A dirty dataset whose valid prices are multiples of 0.25, so revenue
/// sums are exact in binary floating point whatever the merge order.
struct Dataset {
    text: String,
    lines: i64,
    valid: i64,
    revenue_cents: i64,
    per_country: BTreeMap<String, (i64, i64)>,
}

fn dataset(rows: usize) -> Dataset {
    let countries = ["United Kingdom", "France", "Germany", "EIRE", "Spain", "UK"];
    let mut text = format!("{}\n", HEADER);
    let mut data = Dataset {
        text: String::new(),
        lines: 0,
        valid: 0,
        revenue_cents: 0,
        per_country: BTreeMap::new(),
    };

    for i in 0..rows {
        let country = countries[i % countries.len()];
        let quantity = (i % 7 + 1) as i64;
        let price_quarters = (i % 5 + 1) as i64;
        let price = format!("{:.2}", price_quarters as f64 * 0.25);

        let line = match i % 10 {
            0 => format!("C{},X,Y,{},D,{},1,{}", i, quantity, price, country),
            1 => "broken,line".to_owned(),
            2 => format!("{},X,Y,{},D,{},1,", i, quantity, price),
            3 => format!("{},X,Y,lots,D,{},1,{}", i, price, country),
            4 => format!("{},X,Y,-{},D,{},1,{}", i, quantity, price, country),
            5 => format!("{},X,\"JAR, LARGE\",{},D,{},1,{}", i, quantity, price, country),
            _ => format!("{},X,Y,{},D,{},1,{}", i, quantity, price, country),
        };
        if matches!(i % 10, 5..=9) {
            let cents = quantity * price_quarters * 25;
            data.valid += 1;
            data.revenue_cents += cents;
            let entry = data.per_country.entry(country.to_owned()).or_default();
            entry.0 += cents;
            entry.1 += 1;
        }
        text.push_str(&line);
        text.push('\n');
        data.lines += 1;
    }

    data.text = text;
    data
}

fn check_invariants(data: &Dataset, summary: &JobSummary, rows: &Rows) {
    let counters = &summary.counters;
    let valid = counters.mapper(MapperCounter::ValidTransactionsProcessed);

    assert_eq!(valid, data.valid);
    assert_eq!(valid, counters.reducer(ReducerCounter::TotalTransactions));
    assert_eq!(mapper_total(counters), data.lines);
    assert_eq!(
        counters.reducer(ReducerCounter::CountriesProcessed),
        rows.len() as i64
    );
    assert_eq!(
        counters.reducer(ReducerCounter::TotalRevenueCents),
        data.revenue_cents
    );

    let expected: Rows = data
        .per_country
        .iter()
        .map(|(country, (cents, count))| {
            let revenue = format!("{}.{:02}", cents / 100, cents % 100);
            let mean = salesmr::aggregate::format_fixed2(*cents as f64 / 100.0 / *count as f64);
            (country.clone(), (revenue, *count, mean))
        })
        .collect();
    assert_eq!(rows, &expected);
}

#[test]
fn invariants_hold_on_dirty_data() {
    let data = dataset(600);
    let (_dir, summary, rows) = run(&data.text);
    check_invariants(&data, &summary, &rows);
    assert_eq!(mapper(&summary.counters, MapperCounter::CancelledTransactions), 60);
    assert_eq!(mapper(&summary.counters, MapperCounter::InvalidRecordLength), 60);
    assert_eq!(mapper(&summary.counters, MapperCounter::MissingRequiredFields), 60);
    assert_eq!(mapper(&summary.counters, MapperCounter::InvalidNumericValues), 60);
    assert_eq!(mapper(&summary.counters, MapperCounter::InvalidQuantityOrPrice), 60);
}

#[test]
fn output_is_independent_of_scheduling() {
    let data = dataset(1000);
    let (_dir, baseline, baseline_rows) = run_with(&data.text, |job| {
        job.mappers = 1;
        job.reducers = 1;
        job.combine = false;
    });
    check_invariants(&data, &baseline, &baseline_rows);

    let layouts: [(usize, u32, u64, usize, bool); 5] = [
        (4, 1, 64, 1, true),
        (4, 3, 64, 3, true),
        (2, 5, 97, 1000, true),
        (3, 2, 10, 2, false),
        (8, 7, 1 << 20, 7, true),
    ];
    for (mappers, reducers, split_size, spill_records, combine) in layouts {
        let (_dir, summary, rows) = run_with(&data.text, |job| {
            job.mappers = mappers;
            job.reducers = reducers;
            job.split_size = split_size;
            job.spill_records = spill_records;
            job.combine = combine;
        });
        check_invariants(&data, &summary, &rows);
        assert_eq!(rows, baseline_rows);
        assert_eq!(summary.part_files.len(), reducers as usize);
    }
}

#[test]
fn existing_output_directory_fails_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("in.csv");
    fs::write(&input_path, "1,X,Y,1,D,1.0,17850,France\n").unwrap();
    let output = dir.path().join("out");
    fs::create_dir(&output).unwrap();

    let job = Job::new(input_path.to_str().unwrap(), output.to_str().unwrap());
    assert!(run_job(&job).is_err());
}
