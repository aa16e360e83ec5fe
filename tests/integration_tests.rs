use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use vat_box_summary::*;

fn sheet(period: &str, headers: &[&str], rows: Vec<Vec<CellValue>>) -> RawSheet {
    RawSheet::new(
        period,
        headers.iter().map(|h| h.to_string()).collect(),
        rows.into_iter().map(RawRow::from).collect(),
    )
}

/// Quarter shaped like the workbooks finance teams hand over: every month
/// names its columns a little differently.
fn quarter() -> Vec<RawSheet> {
    vec![
        sheet(
            "Jan 2024",
            &["Date", "Customer TRN", "Supply/Purchase Value ", "VAT Value ", "Box"],
            vec![
                vec!["2024-01-02".into(), "100234".into(), "12,500.00".into(), "625.00".into(), "Box 1".into()],
                vec!["2024-01-15".into(), "100987".into(), "(1,000.00)".into(), "(50.00)".into(), "A".into()],
                vec!["2024-01-20".into(), "".into(), "3,000".into(), "0".into(), "B".into()],
            ],
        ),
        sheet(
            "Feb 2024",
            &["Invoice No", "Sales Amount", "Purchase Amount", "Tax Amount", "VAT Box"],
            vec![
                vec!["INV-7".into(), 8000i64.into(), CellValue::Empty, 400i64.into(), CellValue::Empty],
                vec!["BILL-3".into(), CellValue::Empty, 2000i64.into(), 100i64.into(), CellValue::Empty],
                vec![CellValue::Empty, CellValue::Empty, CellValue::Empty, CellValue::Empty, CellValue::Empty],
                vec!["memo".into(), "n/a".into(), CellValue::Empty, CellValue::Empty, CellValue::Empty],
            ],
        ),
        sheet(
            "Summary",
            &["Random1", "Random2"],
            vec![vec!["x".into(), "y".into()]],
        ),
        sheet(
            "Mar 2024",
            &["Net Value", "VAT", "FTA Box"],
            vec![
                vec![5000.5.into(), 250.025.into(), "box-a".into()],
                vec![700i64.into(), 35i64.into(), 6i64.into()],
                vec![CellValue::Empty, 12i64.into(), CellValue::Empty],
            ],
        ),
    ]
}

#[test]
fn test_signed_returns_net_off() {
    let report = summarize_sheets(
        &[sheet(
            "Jan",
            &["Sale Amt", "VAT", "Box"],
            vec![
                vec![1000i64.into(), 50i64.into(), "A".into()],
                vec![(-200i64).into(), (-10i64).into(), "A".into()],
            ],
        )],
        &EngineConfig::default(),
    )
    .unwrap();

    let jan = &report.periods[0];
    assert_eq!(jan.total("A").unwrap().amount, dec!(800));
    assert_eq!(jan.total("A").unwrap().vat, dec!(40));
    assert_eq!(jan.transaction_count, 2);
    assert_eq!(jan.skipped_row_count, 0);
}

#[test]
fn test_quarter_end_to_end() {
    let report = summarize_sheets(&quarter(), &EngineConfig::default()).unwrap();

    assert_eq!(report.periods.len(), 3);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].period, "Summary");
    assert!(report.failures[0].reason.contains("No usable value columns"));

    let jan = report.summary("Jan 2024").unwrap();
    assert_eq!(jan.total("A").unwrap().amount, dec!(11500));
    assert_eq!(jan.total("A").unwrap().vat, dec!(575));
    assert_eq!(jan.total("B").unwrap().amount, dec!(3000));
    assert_eq!(jan.total("D").unwrap().vat, dec!(575));

    let feb = report.summary("Feb 2024").unwrap();
    assert_eq!(feb.total("A").unwrap().amount, dec!(8000));
    assert_eq!(feb.total("C").unwrap().amount, dec!(2000));
    assert_eq!(feb.total("C").unwrap().vat, dec!(100));
    assert_eq!(feb.total("D").unwrap().vat, dec!(300));
    assert_eq!(feb.transaction_count, 2);
    assert_eq!(feb.skipped_row_count, 2);

    let mar = report.summary("Mar 2024").unwrap();
    assert_eq!(mar.total("A").unwrap().amount, dec!(5000.5));
    assert_eq!(mar.total("C").unwrap().amount, dec!(700));
    assert_eq!(mar.unassigned.vat, dec!(12));
    assert_eq!(mar.unassigned.transaction_count, 1);

    let year = report.grand_total("Q1 2024").unwrap().unwrap();
    assert_eq!(year.total("A").unwrap().amount, dec!(24500.5));
    assert_eq!(year.transaction_count, 8);
}

#[test]
fn test_unrecognized_box_defaults_to_output_box() {
    let report = summarize_sheets(
        &[sheet(
            "Apr",
            &["Supply Value", "VAT Amount", "Box"],
            vec![vec![300i64.into(), 15i64.into(), "z".into()]],
        )],
        &EngineConfig::default(),
    )
    .unwrap();
    let apr = &report.periods[0];
    assert_eq!(apr.total("A").unwrap().amount, dec!(300));
    assert_eq!(apr.unassigned.transaction_count, 0);
}

#[test]
fn test_audit_trail_from_process_sheet() {
    let pipeline = SheetPipeline::default();
    let sheets = quarter();
    let outcome = pipeline.process_sheet(&sheets[0]).unwrap();

    assert_eq!(outcome.mapping.role_of(1), ColumnRole::Ignored);
    assert_eq!(
        outcome.mapping.header_for(ColumnRole::SupplyValue),
        Some("Supply/Purchase Value ")
    );
    assert_eq!(
        outcome.rows.transactions[0].raw_box.as_deref(),
        Some("Box 1")
    );
    assert_eq!(
        outcome.rows.transactions[0].box_code,
        Some(BoxCode::new("A"))
    );
}

#[test]
fn test_custom_box_definition_from_json() {
    let config = EngineConfig::from_json(
        r#"{
            "boxes": {
                "boxes": [
                    { "code": "1", "description": "Outputs", "aggregates": ["Supply", "Vat"] },
                    { "code": "4", "description": "Inputs", "aggregates": ["Purchase", "Vat"] }
                ],
                "aliases": { "OUT": "1" },
                "default_rules": [
                    { "when": { "supply": true, "vat": true }, "box_code": "1" },
                    { "when": { "purchase": true, "vat": true }, "box_code": "4" }
                ],
                "derived": [
                    { "code": "9", "figure": "Vat", "add": ["1"], "subtract": ["4"] }
                ]
            }
        }"#,
    )
    .unwrap();

    let report = summarize_sheets(
        &[sheet(
            "2024-05",
            &["Sales", "Purchases", "VAT", "Box"],
            vec![
                vec![100i64.into(), CellValue::Empty, 5i64.into(), "out".into()],
                vec![CellValue::Empty, 60i64.into(), 3i64.into(), CellValue::Empty],
            ],
        )],
        &config,
    )
    .unwrap();

    let may = &report.periods[0];
    assert_eq!(may.total("1").unwrap().amount, dec!(100));
    assert_eq!(may.total("4").unwrap().amount, dec!(60));
    assert_eq!(may.total("9").unwrap().vat, dec!(2));
    assert!(may.total("A").is_none());
}

#[test]
fn test_suggester_places_unfamiliar_header() {
    let suggester: Arc<dyn ColumnSuggester> =
        Arc::new(StaticSuggester::new([("Amount (AED)", "supply_value")]));
    let report = VatSummaryProcessor::process_with_suggester(
        &[sheet(
            "Jun",
            &["Amount (AED)", "Tax"],
            vec![vec![900i64.into(), 45i64.into()]],
        )],
        &EngineConfig::default(),
        Some(suggester),
    )
    .unwrap();
    assert_eq!(report.periods[0].total("A").unwrap().amount, dec!(900));
}

struct StuckSuggester;

impl ColumnSuggester for StuckSuggester {
    fn suggest(&self, _: &[String], _: &[String]) -> Result<BTreeMap<String, String>> {
        std::thread::sleep(Duration::from_secs(2));
        Ok(BTreeMap::new())
    }
}

#[test]
fn test_stuck_suggester_falls_back_to_heuristics() {
    let config = EngineConfig {
        suggester_timeout_ms: 50,
        ..EngineConfig::default()
    };
    let pipeline = SheetPipeline::new(config)
        .unwrap()
        .with_suggester(Arc::new(StuckSuggester));

    let started = std::time::Instant::now();
    let outcome = pipeline
        .process_sheet(&sheet(
            "Jul",
            &["Net", "Tax", "Reference"],
            vec![vec![100i64.into(), 5i64.into(), "R-1".into()]],
        ))
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(matches!(
        outcome.mapping.collaborator(),
        CollaboratorOutcome::Failed { .. }
    ));
    assert_eq!(outcome.summary.total("A").unwrap().amount, dec!(100));
}

#[test]
fn test_report_renderings() {
    let report = summarize_sheets(&quarter(), &EngineConfig::default()).unwrap();

    let csv = report.to_csv();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 5);
    assert!(lines[0].starts_with("Period,Box A Net,Box A VAT,Box B Net"));
    assert!(lines[0].ends_with(",Status,Reason"));
    assert!(lines[1].starts_with("Jan 2024,11500.00,575.00,3000.00,0.00"));
    assert!(lines[1].ends_with(",ok,"));
    assert!(lines[4].starts_with("Summary,"));
    assert!(lines[4].contains(",failed,"));

    let json = report.to_json().unwrap();
    let back: MultiPeriodReport = serde_json::from_str(&json).unwrap();
    assert_eq!(back, report);
}

#[test]
fn test_persistence_round_trip_is_idempotent() {
    let pipeline = SheetPipeline::default();
    let report = pipeline.run(&quarter()).unwrap();
    let mut store = InMemoryStore::new();

    pipeline.persist(&report, &mut store).unwrap();
    pipeline.persist(&report, &mut store).unwrap();

    let stored = store.fetch_summaries(&PeriodRange::all()).unwrap();
    assert_eq!(stored, report.periods);

    let feb_only = store
        .fetch_summaries(&PeriodRange::single("February 2024"))
        .unwrap();
    assert_eq!(feb_only.len(), 1);
    assert_eq!(feb_only[0].period, "Feb 2024");
}

#[cfg(feature = "sqlite")]
#[test]
fn test_sqlite_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vat.db");
    let pipeline = SheetPipeline::default();
    let report = pipeline.run(&quarter()).unwrap();

    for _ in 0..2 {
        with_store(&path, Duration::from_secs(1), |store| {
            pipeline.persist(&report, store)
        })
        .unwrap();
    }

    let stored = with_store(&path, Duration::from_secs(1), |store| {
        store.fetch_summaries(&PeriodRange::between("Jan 2024", "Feb 2024"))
    })
    .unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(&stored[0], report.summary("Jan 2024").unwrap());
}

#[test]
fn test_out_of_range_totals_fail_only_their_sheet() {
    let huge = "79,228,162,514,264,337,593,543,950,335";
    let sheets = vec![
        sheet(
            "Jan 2024",
            &["Net", "Tax"],
            vec![vec![huge.into(), 1i64.into()], vec![huge.into(), 1i64.into()]],
        ),
        sheet(
            "Feb 2024",
            &["Net", "Tax", "Box"],
            vec![vec![500i64.into(), 25i64.into(), "A".into()]],
        ),
    ];

    let report = summarize_sheets(&sheets, &EngineConfig::default()).unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].period, "Jan 2024");
    assert_eq!(report.periods.len(), 1);
    assert_eq!(report.summary("Feb 2024").unwrap().total("A").unwrap().vat, dec!(25));

    let pipeline = SheetPipeline::default();
    assert_eq!(pipeline.run_parallel(&sheets).unwrap(), report);
}

#[test]
fn test_empty_workbook_is_rejected() {
    assert!(matches!(
        summarize_sheets(&[], &EngineConfig::default()),
        Err(VatSummaryError::EmptyInput)
    ));
}

fn amount_cell() -> impl Strategy<Value = CellValue> {
    prop_oneof![
        3 => (-100_000i64..100_000, 0u32..3).prop_map(|(units, scale)| {
            CellValue::Number(Decimal::new(units, scale))
        }),
        1 => Just(CellValue::Empty),
        1 => Just(CellValue::from("n/a")),
        1 => (-5_000i64..5_000).prop_map(|v| CellValue::from(format!("{},000", v))),
    ]
}

fn box_cell() -> impl Strategy<Value = CellValue> {
    prop_oneof![
        Just(CellValue::Empty),
        Just(CellValue::from("A")),
        Just(CellValue::from("Box 4")),
        Just(CellValue::from("C")),
        Just(CellValue::from("z")),
    ]
}

fn row_strategy() -> impl Strategy<Value = Vec<CellValue>> {
    (amount_cell(), amount_cell(), amount_cell(), box_cell())
        .prop_map(|(supply, purchase, vat, code)| vec![supply, purchase, vat, code])
}

const HEADERS: [&str; 4] = ["Sales Value", "Purchase Value", "VAT Amount", "Box"];

proptest! {
    #[test]
    fn prop_every_row_is_counted(rows in prop::collection::vec(row_strategy(), 0..40)) {
        let n = rows.len();
        let report = summarize_sheets(&[sheet("P", &HEADERS, rows)], &EngineConfig::default()).unwrap();
        let summary = &report.periods[0];
        prop_assert_eq!(summary.transaction_count + summary.skipped_row_count, n);

        let boxed: usize = summary
            .totals
            .iter()
            .filter(|(code, _)| code.as_str() != "D")
            .map(|(_, total)| total.transaction_count)
            .sum();
        prop_assert_eq!(boxed + summary.unassigned.transaction_count, summary.transaction_count);
    }

    #[test]
    fn prop_classification_ignores_rows(
        rows in prop::collection::vec(row_strategy(), 0..20),
        other in prop::collection::vec(row_strategy(), 0..20),
    ) {
        let config = EngineConfig::default();
        let classifier = ColumnClassifier::new(&config);
        let headers: Vec<String> = HEADERS.iter().map(|h| h.to_string()).collect();
        let first: Vec<RawRow> = rows.into_iter().map(RawRow::from).collect();
        let second: Vec<RawRow> = other.into_iter().rev().map(RawRow::from).collect();

        let a = classifier.classify("P", &headers, &first).unwrap();
        let b = classifier.classify("P", &headers, &second).unwrap();
        for column in 0..headers.len() {
            prop_assert_eq!(a.role_of(column), b.role_of(column));
        }
    }

    #[test]
    fn prop_totals_are_additive(
        rows in prop::collection::vec(row_strategy(), 0..40),
        split in 0usize..40,
    ) {
        let split = split.min(rows.len());
        let config = EngineConfig::default();
        let pipeline = SheetPipeline::new(config).unwrap();

        let whole = pipeline.process_sheet(&sheet("P", &HEADERS, rows.clone())).unwrap().summary;
        let mut parts = pipeline
            .process_sheet(&sheet("P", &HEADERS, rows[..split].to_vec()))
            .unwrap()
            .summary;
        parts
            .absorb(
                &pipeline
                    .process_sheet(&sheet("P", &HEADERS, rows[split..].to_vec()))
                    .unwrap()
                    .summary,
            )
            .unwrap();
        prop_assert_eq!(whole, parts);
    }
}
